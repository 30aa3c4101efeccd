//! Convert raw procedural SQL into a series of spanned tokens.
//!
//! This is a lexer only. We never build a full parse tree for procedural SQL;
//! the segmenter walks these tokens with a small depth-tracking scanner
//! instead. What the lexer buys us is knowing, for certain, which characters
//! are inside string literals, quoted identifiers and comments, so that
//! keywords like `END` inside `'END'` or `-- END` never confuse the scanner.
//!
//! Tokens borrow their text from the source, and their spans are absolute byte
//! offsets into the original input, even when we lex a sub-range of it (like
//! the dollar-quoted body of a PostgreSQL function).

use std::ops::Range;

use crate::{
    dialect::Dialect,
    errors::{Error, Result},
};

/// What kind of token is this?
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TokenKind {
    /// A keyword or bare identifier. We don't distinguish the two here.
    Word,
    /// A T-SQL or MySQL variable, like `@id` or `@@ROWCOUNT`.
    Variable,
    /// A quoted identifier: `[x]`, `"x"` or `` `x` ``, depending on dialect.
    QuotedIdent,
    /// A string literal, including any `N`/`E` prefix.
    String,
    /// A PostgreSQL dollar-quoted string, like `$$ ... $$` or `$BODY$ ... $BODY$`.
    DollarString,
    /// A numeric literal.
    Number,
    /// Punctuation or an operator.
    Punct,
    /// A line or block comment.
    Comment,
}

/// A token, with its text and absolute location.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub span: Range<usize>,
}

impl<'src> Token<'src> {
    fn new(kind: TokenKind, (span, text): (Range<usize>, &'src str)) -> Self {
        Self { kind, text, span }
    }

    /// Is this a word matching `keyword`, ignoring case?
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Is this a word matching any of `keywords`, ignoring case?
    pub fn is_any_keyword(&self, keywords: &[&str]) -> bool {
        self.kind == TokenKind::Word && keywords.iter().any(|k| self.text.eq_ignore_ascii_case(k))
    }

    /// Is this the punctuation `p`?
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    /// Comments never affect structure.
    pub fn is_comment(&self) -> bool {
        self.kind == TokenKind::Comment
    }

    /// The text of a dollar-quoted string, without the `$tag$` delimiters,
    /// as a range into the original source.
    pub fn dollar_body_span(&self) -> Option<Range<usize>> {
        if self.kind != TokenKind::DollarString {
            return None;
        }
        let tag_len = self.text[1..].find('$')? + 2;
        Some(self.span.start + tag_len..self.span.end - tag_len)
    }
}

/// Lexical differences between dialects.
#[derive(Clone, Copy, Debug)]
pub struct LexOptions {
    /// `$tag$ ... $tag$` strings (PostgreSQL).
    pub dollar_quotes: bool,
    /// `# comment` (MySQL).
    pub hash_comments: bool,
    /// `\'` inside strings (MySQL).
    pub backslash_escapes: bool,
    /// `"x"` is a string, not an identifier (MySQL).
    pub double_quoted_strings: bool,
    /// `[x]` is a quoted identifier (SQL Server).
    pub brackets: bool,
    /// `@x` is a variable (SQL Server, MySQL).
    pub at_variables: bool,
}

impl LexOptions {
    /// The lexical rules for `dialect`.
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::SqlServer => Self {
                dollar_quotes: false,
                hash_comments: false,
                backslash_escapes: false,
                double_quoted_strings: false,
                brackets: true,
                at_variables: true,
            },
            Dialect::PostgreSql => Self {
                dollar_quotes: true,
                hash_comments: false,
                backslash_escapes: false,
                double_quoted_strings: false,
                brackets: false,
                at_variables: false,
            },
            Dialect::MySql => Self {
                dollar_quotes: false,
                hash_comments: true,
                backslash_escapes: true,
                double_quoted_strings: true,
                brackets: false,
                at_variables: true,
            },
        }
    }
}

/// Convert `sql` into a series of tokens.
pub fn tokenize(sql: &str, dialect: Dialect) -> Result<Vec<Token<'_>>> {
    tokenize_range(sql, 0..sql.len(), dialect)
}

/// Tokenize `sql[range]`, reporting spans relative to the start of `sql`.
pub fn tokenize_range(sql: &str, range: Range<usize>, dialect: Dialect) -> Result<Vec<Token<'_>>> {
    let fragment = &sql[range.clone()];
    lexer::tokens(fragment, range.start, LexOptions::for_dialect(dialect)).map_err(|err| {
        let offset = range.start + err.location.offset;
        Error::malformed(
            sql,
            offset..offset + 1,
            format!("could not tokenize input: expected {}", err.expected),
        )
    })
}

/// Drop comments, which never affect structure.
pub fn significant<'a, 'src>(tokens: &'a [Token<'src>]) -> Vec<&'a Token<'src>> {
    tokens.iter().filter(|t| !t.is_comment()).collect()
}

peg::parser! {
    grammar lexer(offset: usize, opts: LexOptions) for str {
        pub rule tokens() -> Vec<Token<'input>>
            = _ tokens:(t:token() _ { t })* { tokens }

        rule token() -> Token<'input>
            = t:spanned(<$(line_comment() / block_comment())>) { Token::new(TokenKind::Comment, t) }
            / t:spanned(<$(hash_comment())>) { Token::new(TokenKind::Comment, t) }
            / dollar_string()
            / t:spanned(<$(single_quoted())>) { Token::new(TokenKind::String, t) }
            / t:spanned(<$(double_quoted())>) {
                let kind = if opts.double_quoted_strings {
                    TokenKind::String
                } else {
                    TokenKind::QuotedIdent
                };
                Token::new(kind, t)
            }
            / t:spanned(<$("`" [^ '`']* "`")>) { Token::new(TokenKind::QuotedIdent, t) }
            / bracketed()
            / variable()
            / t:spanned(<$(number())>) { Token::new(TokenKind::Number, t) }
            / t:spanned(<$(word())>) { Token::new(TokenKind::Word, t) }
            / t:spanned(<$(punct())>) { Token::new(TokenKind::Punct, t) }

        rule line_comment() = "--" (!['\n'] [_])*
        rule block_comment() = "/*" (!"*/" [_])* "*/"
        rule hash_comment() -> ()
            = "#" (!['\n'] [_])* {? if opts.hash_comments { Ok(()) } else { Err("identifier") } }

        rule dollar_string() -> Token<'input>
            = t:spanned(<$(dollar_quoted())>) {?
                if opts.dollar_quotes {
                    Ok(Token::new(TokenKind::DollarString, t))
                } else {
                    Err("dollar-quoted string")
                }
            }
        rule dollar_quoted()
            = "$" tag:$(dollar_tag()?) "$" (!dollar_close(tag) [_])* dollar_close(tag)
        rule dollar_close(tag: &'input str) -> ()
            = "$" t:$(dollar_tag()?) "$" {? if t == tag { Ok(()) } else { Err("closing dollar quote") } }
        rule dollar_tag() = ['a'..='z' | 'A'..='Z' | '_'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '_']*

        rule single_quoted()
            = ['N' | 'n' | 'E' | 'e' | 'B' | 'b' | 'X' | 'x']? "'" ("''" / escape() / [^ '\''])* "'"
        rule double_quoted() = "\"" ("\"\"" / escape() / [^ '"'])* "\""
        rule escape() -> ()
            = "\\" [_] {? if opts.backslash_escapes { Ok(()) } else { Err("escape") } }

        rule bracketed() -> Token<'input>
            = t:spanned(<$("[" [^ ']' | '\n']* "]")>) {?
                if opts.brackets {
                    Ok(Token::new(TokenKind::QuotedIdent, t))
                } else {
                    Err("bracketed identifier")
                }
            }

        rule variable() -> Token<'input>
            = t:spanned(<$("@" "@"? word_cont()+)>) {?
                if opts.at_variables {
                    Ok(Token::new(TokenKind::Variable, t))
                } else {
                    Err("variable")
                }
            }

        rule number() = ['0'..='9']+ ("." ['0'..='9']+)? (['e' | 'E'] ['+' | '-']? ['0'..='9']+)?

        rule word() = word_start() (word_cont() / word_dollar())*
        rule word_start() = ['a'..='z' | 'A'..='Z' | '_' | '#' | '\u{80}'..='\u{10FFFF}']
        rule word_cont() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '#' | '\u{80}'..='\u{10FFFF}']
        // Only PostgreSQL allows `$` inside identifiers. Elsewhere, `END$$`
        // is a keyword followed by a custom MySQL delimiter.
        rule word_dollar() -> ()
            = "$" {? if opts.dollar_quotes { Ok(()) } else { Err("identifier") } }

        rule punct()
            = ":=" / "::" / "<>" / "!=" / "<=" / ">=" / "||" / ".." / "=>"
            // An unmatched quote is an error, not punctuation.
            / [^ ' ' | '\t' | '\r' | '\n' | '\u{0C}' | '\'' | '"' | '`']

        /// Return the absolute span along with the text matched by `r`.
        rule spanned(r: rule<&'input str>) -> (Range<usize>, &'input str)
            = s:position!() text:r() e:position!() { (s + offset..e + offset, text) }

        rule _ = [' ' | '\t' | '\r' | '\n' | '\u{0C}']*
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(sql: &str, dialect: Dialect) -> Vec<(TokenKind, &str)> {
        tokenize(sql, dialect)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn sqlserver_tokens() {
        assert_eq!(
            kinds("SET @x = N'it''s END' -- END\n[dbo].[t]", Dialect::SqlServer),
            vec![
                (TokenKind::Word, "SET"),
                (TokenKind::Variable, "@x"),
                (TokenKind::Punct, "="),
                (TokenKind::String, "N'it''s END'"),
                (TokenKind::Comment, "-- END"),
                (TokenKind::QuotedIdent, "[dbo]"),
                (TokenKind::Punct, "."),
                (TokenKind::QuotedIdent, "[t]"),
            ]
        );
    }

    #[test]
    fn postgres_dollar_quotes_and_operators() {
        let sql = "AS $BODY$ BEGIN x := y::int; END; $BODY$ LANGUAGE plpgsql";
        let tokens = tokenize(sql, Dialect::PostgreSql).unwrap();
        assert_eq!(tokens[1].kind, TokenKind::DollarString);
        let body = tokens[1].dollar_body_span().unwrap();
        assert_eq!(&sql[body], " BEGIN x := y::int; END; ");
        assert!(tokens[2].is_keyword("language"));

        let inner = tokenize("x := y::int", Dialect::PostgreSql).unwrap();
        assert!(inner[1].is_punct(":="));
        assert!(inner[3].is_punct("::"));
    }

    #[test]
    fn mysql_hash_comments_and_escapes() {
        assert_eq!(
            kinds("SET p = 'a\\'b'; # done\nEND$$", Dialect::MySql),
            vec![
                (TokenKind::Word, "SET"),
                (TokenKind::Word, "p"),
                (TokenKind::Punct, "="),
                (TokenKind::String, "'a\\'b'"),
                (TokenKind::Punct, ";"),
                (TokenKind::Comment, "# done"),
                (TokenKind::Word, "END"),
                (TokenKind::Punct, "$"),
                (TokenKind::Punct, "$"),
            ]
        );
    }

    #[test]
    fn spans_are_absolute_for_sub_ranges() {
        let sql = "xxxx BEGIN END";
        let tokens = tokenize_range(sql, 5..sql.len(), Dialect::PostgreSql).unwrap();
        assert_eq!(tokens[0].span, 5..10);
        assert_eq!(&sql[tokens[1].span.clone()], "END");
    }

    #[test]
    fn unterminated_string_is_malformed() {
        let err = tokenize("SELECT 'oops", Dialect::SqlServer).unwrap_err();
        assert!(err.is_terminal_input_error());
    }
}
