//! Depth-tracking scans over significant tokens.
//!
//! Procedural SQL nests blocks in several different ways, and the closing
//! keyword is `END` in almost all of them. We find the `END` matching a given
//! opener by counting openers and closers, so that an inner `END IF` or
//! `END CATCH` never terminates an outer block early.

use std::ops::Range;

use crate::{
    dialect::Dialect,
    errors::{Error, Result},
    tokenizer::{Token, TokenKind},
    unit::{Fragment, Stmt},
};

/// Keywords that may follow `END` as part of the same closer.
fn closer_suffixes(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::SqlServer => &["TRY", "CATCH"],
        Dialect::PostgreSql | Dialect::MySql => &["IF", "LOOP", "WHILE", "REPEAT", "CASE"],
    }
}

/// Tokens of a source text, split into structure and comments.
pub(crate) struct Source<'src> {
    pub sql: &'src str,
    pub dialect: Dialect,
    /// Everything except comments.
    pub toks: Vec<Token<'src>>,
    pub comments: Vec<Token<'src>>,
}

impl<'src> Source<'src> {
    pub fn new(sql: &'src str, dialect: Dialect, tokens: Vec<Token<'src>>) -> Self {
        let (comments, toks) = tokens.into_iter().partition(|t| t.is_comment());
        Self {
            sql,
            dialect,
            toks,
            comments,
        }
    }

    pub fn len(&self) -> usize {
        self.toks.len()
    }

    /// Is token `i` the keyword `kw`?
    pub fn kw(&self, i: usize, kw: &str) -> bool {
        self.toks.get(i).map_or(false, |t| t.is_keyword(kw))
    }

    /// Is token `i` any of `kws`?
    pub fn any_kw(&self, i: usize, kws: &[&str]) -> bool {
        self.toks.get(i).map_or(false, |t| t.is_any_keyword(kws))
    }

    /// Is token `i` the punctuation `p`?
    pub fn punct(&self, i: usize, p: &str) -> bool {
        self.toks.get(i).map_or(false, |t| t.is_punct(p))
    }

    /// Byte offset where token `i` starts, or the end of the last token.
    pub fn start_of(&self, i: usize) -> usize {
        match self.toks.get(i) {
            Some(t) => t.span.start,
            None => self.toks.last().map_or(0, |t| t.span.end),
        }
    }

    /// Byte offset where token `i` ends.
    pub fn end_of(&self, i: usize) -> usize {
        self.toks.get(i).map_or(self.start_of(i), |t| t.span.end)
    }

    /// The source text covering tokens `range`, including any comments inside.
    pub fn fragment(&self, range: Range<usize>) -> Fragment {
        if range.is_empty() {
            let at = self.start_of(range.start);
            return Fragment::new("", at..at);
        }
        let span = self.toks[range.start].span.start..self.toks[range.end - 1].span.end;
        Fragment::new(&self.sql[span.clone()], span)
    }

    /// Comments lying entirely inside `bytes`, as statements.
    pub fn comments_in(&self, bytes: Range<usize>) -> Vec<Stmt> {
        self.comments
            .iter()
            .filter(|c| c.span.start >= bytes.start && c.span.end <= bytes.end)
            .map(|c| Stmt::Comment(Fragment::new(c.text, c.span.clone())))
            .collect()
    }

    /// A structural error pointing at token `i`.
    pub fn malformed(&self, i: usize, reason: impl Into<String>) -> Error {
        let start = self.start_of(i);
        Error::malformed(self.sql, start..self.end_of(i).max(start + 1), reason)
    }

    /// Could a statement begin at token `i`?
    pub fn statement_start(&self, i: usize) -> bool {
        if i == 0 {
            return true;
        }
        let prev = &self.toks[i - 1];
        prev.is_punct(";")
            || prev.is_punct(":")
            || prev.is_any_keyword(&["BEGIN", "THEN", "ELSE", "DO", "LOOP", "REPEAT"])
    }

    /// Does token `i` open a block that is closed by `END`?
    pub fn is_opener(&self, i: usize) -> bool {
        let Some(tok) = self.toks.get(i) else {
            return false;
        };
        if tok.kind != TokenKind::Word {
            return false;
        }
        let word = tok.text.to_ascii_uppercase();
        match (word.as_str(), self.dialect) {
            ("BEGIN", Dialect::SqlServer) => {
                !self.any_kw(i + 1, &["TRAN", "TRANSACTION", "DISTRIBUTED"])
            }
            ("BEGIN", _) | ("CASE", _) => true,
            ("IF", Dialect::PostgreSql) => self.statement_start(i),
            ("IF", Dialect::MySql) => self.statement_start(i) && !self.is_if_function(i),
            ("LOOP", Dialect::PostgreSql | Dialect::MySql) => true,
            ("WHILE" | "REPEAT", Dialect::MySql) => self.statement_start(i),
            _ => false,
        }
    }

    /// Is token `i` the start of a MySQL `IF(cond, a, b)` call? These take
    /// three arguments, while a parenthesized `IF (cond) THEN` never has a
    /// comma at the top level.
    fn is_if_function(&self, i: usize) -> bool {
        if !self.punct(i + 1, "(") {
            return false;
        }
        let mut depth = 0i32;
        for tok in &self.toks[i + 1..] {
            if tok.is_punct("(") {
                depth += 1;
            } else if tok.is_punct(")") {
                depth -= 1;
                if depth == 0 {
                    return false;
                }
            } else if depth == 1 && tok.is_punct(",") {
                return true;
            }
        }
        false
    }

    /// Is token `i` an `END` that closes a block?
    pub fn is_closer(&self, i: usize) -> bool {
        self.kw(i, "END")
    }

    /// Given that token `open` is an opener, find its closing `END`. Returns
    /// the index of the `END` and the index just past the whole closer
    /// (including a trailing `IF`, `LOOP`, `CATCH`, etc.).
    pub fn block_end(&self, open: usize) -> Result<(usize, usize)> {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.toks.len() {
            if self.is_closer(i) {
                let end = i;
                i += 1;
                if self.any_kw(i, closer_suffixes(self.dialect)) {
                    i += 1;
                }
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok((end, i));
                }
                continue;
            }
            if self.is_opener(i) {
                depth += 1;
            }
            i += 1;
        }
        Err(self.malformed(open, "unbalanced BEGIN/END"))
    }

    /// Find the first token in `range` at nesting depth 0 for which `pred`
    /// holds. Nested blocks are skipped entirely.
    pub fn find_at_depth0(
        &self,
        range: Range<usize>,
        pred: impl Fn(&Self, usize) -> bool,
    ) -> Result<Option<usize>> {
        let mut i = range.start;
        let mut parens = 0i32;
        while i < range.end {
            if parens == 0 && pred(self, i) {
                return Ok(Some(i));
            }
            if self.punct(i, "(") {
                parens += 1;
            } else if self.punct(i, ")") {
                parens -= 1;
            } else if self.is_opener(i) {
                let (_, past) = self.block_end(i)?;
                i = past;
                continue;
            }
            i += 1;
        }
        Ok(None)
    }
}

/// Read a possibly-qualified, possibly-bracketed name. Returns the schema, the
/// name and the index of the next token.
pub(crate) fn qualified_name(
    src: &Source<'_>,
    start: usize,
) -> Result<(Option<String>, String, usize)> {
    let mut parts = vec![];
    let mut i = start;
    loop {
        match src.toks.get(i) {
            Some(t) if matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent) => {
                parts.push(unquote(t.text));
                i += 1;
            }
            _ => return Err(src.malformed(i, "expected a routine name")),
        }
        if src.punct(i, ".") {
            i += 1;
        } else {
            break;
        }
    }
    let name = parts.pop().unwrap_or_default();
    let schema = parts.pop();
    Ok((schema, name, i))
}

/// Strip `[]`, `""` or backtick quoting from an identifier.
pub(crate) fn unquote(ident: &str) -> String {
    let bytes = ident.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(b'['), Some(b']')) | (Some(b'"'), Some(b'"')) | (Some(b'`'), Some(b'`'))
            if ident.len() >= 2 =>
        {
            ident[1..ident.len() - 1].to_owned()
        }
        _ => ident.to_owned(),
    }
}

/// The span of `piece` inside `frag`, when `piece` is a sub-slice of
/// `frag.text`.
pub(crate) fn subspan(frag: &Fragment, piece: &str) -> Range<usize> {
    let base = frag.text.as_ptr() as usize;
    let at = piece.as_ptr() as usize;
    if at >= base && at + piece.len() <= base + frag.text.len() {
        let offset = at - base;
        frag.span.start + offset..frag.span.start + offset + piece.len()
    } else {
        frag.span.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokenize;

    fn source(sql: &str, dialect: Dialect) -> Source<'_> {
        Source::new(sql, dialect, tokenize(sql, dialect).unwrap())
    }

    #[test]
    fn end_if_is_part_of_the_closer() {
        let sql = "BEGIN IF x THEN y; END IF; z; END";
        let src = source(sql, Dialect::PostgreSql);
        let (end, past) = src.block_end(0).unwrap();
        assert_eq!(end, src.len() - 1);
        assert_eq!(past, src.len());
    }

    #[test]
    fn begin_transaction_is_not_a_block() {
        let sql = "BEGIN BEGIN TRAN UPDATE t SET a = 1 COMMIT END";
        let src = source(sql, Dialect::SqlServer);
        let (end, _) = src.block_end(0).unwrap();
        assert_eq!(end, src.len() - 1);
    }

    #[test]
    fn case_expressions_nest() {
        let sql = "BEGIN SELECT CASE WHEN a THEN 1 END; END extra";
        let src = source(sql, Dialect::MySql);
        let (end, past) = src.block_end(0).unwrap();
        assert!(src.kw(end, "END"));
        assert!(src.kw(past, "extra"));
    }

    #[test]
    fn unbalanced_blocks_are_malformed() {
        let sql = "BEGIN BEGIN SELECT 1 END";
        let src = source(sql, Dialect::SqlServer);
        let err = src.block_end(0).unwrap_err();
        assert!(err.to_string().contains("unbalanced BEGIN/END"));
    }
}
