//! Hiding string literals and comments from rewrite rules.
//!
//! Before any rule sees a fragment, every string literal and comment in it is
//! replaced by a single private-use character. No rule pattern can match
//! inside them, and since those characters are neither word characters nor
//! punctuation, they can't glue two identifiers together either. Afterwards
//! the placeholders are swapped back, translating the literal syntax for the
//! target dialect on the way.

use crate::{
    dialect::{ConversionDirection, Dialect},
    tokenizer::{tokenize, TokenKind},
};

/// The first placeholder character. Plane 15 is private use.
const BASE: u32 = 0xF_0000;

/// Is `c` one of our placeholders?
pub fn is_placeholder(c: char) -> bool {
    (c as u32) >= BASE
}

#[derive(Clone, Debug)]
struct Saved {
    kind: TokenKind,
    text: String,
}

/// Text with its literals and comments masked out.
#[derive(Clone, Debug, Default)]
pub struct Masked {
    saved: Vec<Saved>,
}

impl Masked {
    /// Mask `text`, returning the masker and the masked text.
    pub fn new(text: &str, dialect: Dialect) -> (Self, String) {
        let mut masked = Self::default();
        let text = masked.mask(text, dialect);
        (masked, text)
    }

    /// Mask another piece of text, sharing placeholders with earlier pieces.
    /// Text we can't tokenize is returned unchanged.
    pub fn mask(&mut self, text: &str, dialect: Dialect) -> String {
        let Ok(tokens) = tokenize(text, dialect) else {
            return text.to_owned();
        };
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for token in tokens {
            if matches!(
                token.kind,
                TokenKind::String | TokenKind::DollarString | TokenKind::Comment
            ) {
                out.push_str(&text[last..token.span.start]);
                out.push(self.save(token.kind, token.text));
                last = token.span.end;
            }
        }
        out.push_str(&text[last..]);
        out
    }

    fn save(&mut self, kind: TokenKind, text: &str) -> char {
        let c = char::from_u32(BASE + self.saved.len() as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
        self.saved.push(Saved {
            kind,
            text: text.to_owned(),
        });
        c
    }

    fn lookup(&self, c: char) -> Option<&Saved> {
        if !is_placeholder(c) {
            return None;
        }
        self.saved.get((c as u32 - BASE) as usize)
    }

    /// If `masked` is exactly one string literal placeholder, return the
    /// literal's contents without quotes.
    pub fn string_value(&self, masked: &str) -> Option<String> {
        let mut chars = masked.trim().chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        let saved = self.lookup(c)?;
        match saved.kind {
            TokenKind::String => Some(unquote_string(&saved.text)),
            _ => None,
        }
    }

    /// Put the original literals and comments back, unchanged.
    pub fn restore_raw(&self, masked: &str) -> String {
        self.restore_with(masked, |saved| saved.text.clone())
    }

    /// Put the literals and comments back, rewritten for the target dialect.
    pub fn restore(&self, masked: &str, direction: ConversionDirection) -> String {
        self.restore_with(masked, |saved| translate(saved, direction))
    }

    fn restore_with(&self, masked: &str, f: impl Fn(&Saved) -> String) -> String {
        let mut out = String::with_capacity(masked.len());
        for c in masked.chars() {
            match self.lookup(c) {
                Some(saved) => out.push_str(&f(saved)),
                None => out.push(c),
            }
        }
        out
    }
}

/// Rewrite one literal or comment for the target dialect.
fn translate(saved: &Saved, direction: ConversionDirection) -> String {
    let text = saved.text.as_str();
    match saved.kind {
        TokenKind::Comment if text.starts_with('#') && direction.target != Dialect::MySql => {
            format!("--{}", &text[1..])
        }
        TokenKind::String => {
            if direction.source == Dialect::MySql && direction.target != Dialect::MySql {
                // Backslash escapes and double quotes are MySQL-only.
                quote_string(&unquote_string(text))
            } else if direction.target != Dialect::SqlServer && has_prefix(text, &['N', 'n']) {
                text[1..].to_owned()
            } else {
                text.to_owned()
            }
        }
        TokenKind::DollarString if direction.target != Dialect::PostgreSql => {
            let tag_len = text[1..].find('$').map_or(1, |i| i + 2);
            let body = text.get(tag_len..text.len().saturating_sub(tag_len)).unwrap_or("");
            quote_string(body)
        }
        _ => text.to_owned(),
    }
}

fn has_prefix(text: &str, prefixes: &[char]) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if prefixes.contains(&c)) && chars.next() == Some('\'')
}

/// Write `value` as a standard single-quoted SQL string.
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// The value of a string literal in any of our dialects.
pub fn unquote_string(text: &str) -> String {
    let mut body = text;
    if body.starts_with(|c: char| c.is_ascii_alphabetic()) {
        body = &body[1..];
    }
    let Some(quote) = body.chars().next() else {
        return String::new();
    };
    let inner = body
        .get(1..body.len().saturating_sub(1))
        .unwrap_or("");
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else if c == '\\' && matches!(chars.peek(), Some('\'' | '"' | '\\')) {
            out.extend(chars.next());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn dir(source: Dialect, target: Dialect) -> ConversionDirection {
        ConversionDirection::new(source, target).unwrap()
    }

    #[test]
    fn masks_hide_literals_and_comments() {
        let (masked, text) = Masked::new("SET @x = N'END' -- ISNULL(a, b)", Dialect::SqlServer);
        assert!(!text.contains("END"));
        assert!(!text.contains("ISNULL"));
        assert!(text.starts_with("SET @x = "));
        assert_eq!(
            masked.restore_raw(&text),
            "SET @x = N'END' -- ISNULL(a, b)"
        );
        assert_eq!(
            masked.restore(&text, dir(Dialect::SqlServer, Dialect::PostgreSql)),
            "SET @x = 'END' -- ISNULL(a, b)"
        );
    }

    #[test]
    fn mysql_strings_and_comments_are_standardized() {
        let (masked, text) = Masked::new(r#"SELECT "it's", 'a\'b' # note"#, Dialect::MySql);
        assert_eq!(
            masked.restore(&text, dir(Dialect::MySql, Dialect::SqlServer)),
            "SELECT 'it''s', 'a''b' -- note"
        );
    }

    #[test]
    fn string_values_are_unquoted() {
        let (masked, text) = Masked::new("DATE_PART('year', d)", Dialect::PostgreSql);
        let arg = text[10..].split(',').next().unwrap();
        assert_eq!(masked.string_value(arg).as_deref(), Some("year"));
        assert_eq!(masked.string_value("d"), None);
    }
}
