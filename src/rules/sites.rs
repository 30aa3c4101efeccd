//! Finding function calls, postfix casts and keywords in masked text.
//!
//! All of these scanners assume that string literals and comments have
//! already been masked, so every parenthesis they see is real.

use std::ops::Range;

use crate::util::{matching_paren, split_top_level};

use super::mask::{is_placeholder, Masked};

/// Can `c` be part of an identifier or variable name?
pub(crate) fn is_word_char(c: char) -> bool {
    (c.is_alphanumeric() && !is_placeholder(c)) || matches!(c, '_' | '@' | '#' | '$')
}

/// A call to a named function, with its arguments already rewritten.
#[derive(Debug)]
pub struct CallSite<'a> {
    /// The function name as written.
    pub name: String,
    /// Arguments, split on top-level commas and trimmed.
    pub args: Vec<String>,
    /// The whole call, as it appears in the (partly rewritten) text.
    pub text: String,
    masked: &'a Masked,
}

impl<'a> CallSite<'a> {
    pub(crate) fn new(name: &str, inner: &str, masked: &'a Masked) -> Self {
        let args = if inner.trim().is_empty() {
            vec![]
        } else {
            split_top_level(inner, ',')
                .into_iter()
                .map(str::to_owned)
                .collect()
        };
        Self {
            name: name.to_owned(),
            args,
            text: format!("{}({})", name, inner),
            masked,
        }
    }

    /// Argument `i`, if present.
    pub fn arg(&self, i: usize) -> Option<&str> {
        self.args.get(i).map(String::as_str)
    }

    /// If argument `i` is a string literal, its value.
    pub fn string_arg(&self, i: usize) -> Option<String> {
        self.masked.string_value(self.arg(i)?)
    }

    /// All the arguments, joined back together.
    pub fn joined_args(&self) -> String {
        self.args.join(", ")
    }
}

/// A PostgreSQL `expr::type` cast.
#[derive(Debug)]
pub struct CastSite {
    pub expr: String,
    pub data_type: String,
    pub text: String,
}

/// Find the next call to `name` at or after byte `from`. Returns the byte
/// range of the whole call and of the text between the parentheses.
pub(crate) fn find_call(text: &str, name: &str, from: usize) -> Option<(Range<usize>, Range<usize>)> {
    let mut pos = from;
    while let Some(at) = find_word(text, name, pos) {
        let after = at + name.len();
        let open = after + (text[after..].len() - text[after..].trim_start().len());
        if text[open..].starts_with('(') {
            if let Some(close) = matching_paren(text, open) {
                return Some((at..close + 1, open + 1..close));
            }
        }
        pos = after;
    }
    None
}

/// Find `word` as a whole word, ignoring case, at or after byte `from`. A
/// word preceded by `.` is a qualified name, not the word itself.
pub(crate) fn find_word(text: &str, word: &str, from: usize) -> Option<usize> {
    let upper = text.to_ascii_uppercase();
    let word = word.to_ascii_uppercase();
    let mut pos = from;
    while let Some(i) = upper.get(pos..)?.find(&word) {
        let at = pos + i;
        let end = at + word.len();
        let before = text[..at].chars().next_back();
        let after = text[end..].chars().next();
        if !before.map_or(false, |c| is_word_char(c) || c == '.')
            && !after.map_or(false, is_word_char)
        {
            return Some(at);
        }
        pos = end;
    }
    None
}

/// Find `keyword` at parenthesis depth 0.
pub(crate) fn find_top_level(text: &str, keyword: &str) -> Option<usize> {
    let mut pos = 0;
    while let Some(at) = find_word(text, keyword, pos) {
        if paren_depth(&text[..at]) == 0 {
            return Some(at);
        }
        pos = at + keyword.len();
    }
    None
}

fn paren_depth(text: &str) -> i32 {
    text.chars().fold(0, |depth, c| match c {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Split `expr AS type` inside a `CAST(...)`.
pub(crate) fn split_cast(inner: &str) -> Option<(&str, &str)> {
    let mut pos = 0;
    let mut found = None;
    while let Some(at) = find_word(inner, "AS", pos) {
        if paren_depth(&inner[..at]) == 0 {
            found = Some(at);
        }
        pos = at + 2;
    }
    let at = found?;
    Some((inner[..at].trim(), inner[at + 2..].trim()))
}

/// Words that can continue a type name after its first word.
const TYPE_CONTINUATIONS: &[&str] = &["PRECISION", "VARYING", "WITH", "WITHOUT", "TIME", "ZONE"];

/// Find the first `::` cast at or after byte `from`. Returns the byte range
/// of the whole cast, the operand and the type.
pub(crate) fn find_cast(text: &str, from: usize) -> Option<(Range<usize>, CastSite)> {
    let mut pos = from;
    while let Some(i) = text.get(pos..)?.find("::") {
        let at = pos + i;
        pos = at + 2;
        let Some(start) = operand_start(text, at) else {
            continue;
        };
        let Some(end) = type_end(text, at + 2) else {
            continue;
        };
        let site = CastSite {
            expr: text[start..at].trim().to_owned(),
            data_type: text[at + 2..end].trim().to_owned(),
            text: text[start..end].to_owned(),
        };
        return Some((start..end, site));
    }
    None
}

/// The start of the operand that ends at byte `cast_at`: a literal
/// placeholder, a parenthesized expression or a call, or a name.
pub(crate) fn operand_start(text: &str, cast_at: usize) -> Option<usize> {
    let before = &text[..cast_at];
    let last = before.chars().next_back()?;
    let mut start = if last == ')' {
        let mut depth = 0;
        let mut open = None;
        for (i, c) in before.char_indices().rev() {
            match c {
                ')' => depth += 1,
                '(' => {
                    depth -= 1;
                    if depth == 0 {
                        open = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        open?
    } else if is_placeholder(last) {
        return Some(cast_at - last.len_utf8());
    } else {
        cast_at
    };
    // A function name, or a plain identifier or number.
    for (i, c) in before[..start].char_indices().rev() {
        if is_word_char(c) || c == '.' {
            start = i;
        } else {
            break;
        }
    }
    (start < cast_at).then_some(start)
}

/// The end of the operand starting at or after byte `from`. The mirror of
/// [`operand_start`].
pub(crate) fn operand_end(text: &str, from: usize) -> Option<usize> {
    let rest = text.get(from..)?;
    let start = from + rest.len() - rest.trim_start().len();
    let first = text[start..].chars().next()?;
    if is_placeholder(first) {
        return Some(start + first.len_utf8());
    }
    if first == '(' {
        return matching_paren(text, start).map(|close| close + 1);
    }
    let end = text[start..]
        .char_indices()
        .find(|&(_, c)| !(is_word_char(c) || c == '.'))
        .map_or(text.len(), |(i, _)| start + i);
    if end == start {
        return None;
    }
    let after = &text[end..];
    let open = end + after.len() - after.trim_start().len();
    if text[open..].starts_with('(') {
        return matching_paren(text, open).map(|close| close + 1);
    }
    Some(end)
}

fn type_end(text: &str, from: usize) -> Option<usize> {
    let word_end = |at: usize| -> Option<usize> {
        let rest = &text[at..];
        let trimmed = rest.trim_start();
        let start = at + rest.len() - trimmed.len();
        let len = trimmed
            .char_indices()
            .find(|&(_, c)| !(c.is_ascii_alphanumeric() || c == '_'))
            .map_or(trimmed.len(), |(i, _)| i);
        (len > 0 && trimmed.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_'))
            .then_some((start, start + len))
            .map(|(_, end)| end)
    };
    let mut end = word_end(from)?;
    loop {
        let rest = &text[end..];
        let trimmed = rest.trim_start();
        let skipped = end + rest.len() - trimmed.len();
        if trimmed.starts_with('(') {
            end = matching_paren(text, skipped)? + 1;
        } else if trimmed.starts_with("[]") {
            end = skipped + 2;
        } else if let Some(next) = word_end(end).filter(|&next| {
            TYPE_CONTINUATIONS
                .iter()
                .any(|w| text[skipped..next].eq_ignore_ascii_case(w))
        }) {
            end = next;
        } else {
            return Some(end);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn calls_are_found_by_whole_word() {
        let text = "CHAR_LENGTH(x) + LENGTH (y) + t.length(z)";
        let (whole, inner) = find_call(text, "length", 0).unwrap();
        assert_eq!(&text[whole], "LENGTH (y)");
        assert_eq!(&text[inner], "y");
        assert_eq!(find_call(text, "IF", 0), None);
    }

    #[test]
    fn top_level_keywords_skip_subqueries() {
        let text = "SELECT (SELECT a FROM t) INTO x FROM u";
        assert_eq!(find_top_level(text, "FROM"), Some(32));
        assert_eq!(find_top_level(text, "INTO"), Some(25));
    }

    #[test]
    fn casts_take_their_operand_and_type() {
        let (range, site) = find_cast("SELECT f(a, b)::numeric(10, 2) + 1", 0).unwrap();
        assert_eq!(site.expr, "f(a, b)");
        assert_eq!(site.data_type, "numeric(10, 2)");
        assert_eq!(range, 7..30);

        let (_, site) = find_cast("x::timestamp with time zone, y", 0).unwrap();
        assert_eq!(site.expr, "x");
        assert_eq!(site.data_type, "timestamp with time zone");

        let (_, site) = find_cast("ids::int[]", 0).unwrap();
        assert_eq!(site.data_type, "int[]");
    }

    #[test]
    fn operands_cover_calls_and_parentheses() {
        let text = "a + f(b, c) + (d * 2) - x.y";
        assert_eq!(operand_end(text, 3), Some(11));
        assert_eq!(operand_end(text, 13), Some(21));
        assert_eq!(operand_end(text, 23), Some(text.len()));
        assert_eq!(operand_start(text, 11), Some(4));
        assert_eq!(operand_end("a + -1", 3), None);
    }

    #[test]
    fn cast_arguments_split_on_the_last_as() {
        assert_eq!(
            split_cast("CAST(a AS int) AS varchar(10)"),
            Some(("CAST(a AS int)", "varchar(10)"))
        );
        assert_eq!(split_cast("a"), None);
    }
}
