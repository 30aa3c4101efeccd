//! Segmenting T-SQL procedures.
//!
//! T-SQL is the awkward one: statements don't need a terminating `;`, and
//! `IF`/`WHILE` take a single statement (usually a `BEGIN … END` block) rather
//! than having their own closer. So we split statements by recognizing the
//! keywords that can begin one, and by knowing which of those keywords
//! continue the current statement instead.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    dialect::Dialect,
    errors::{Error, Result},
    tokenizer::{tokenize, TokenKind},
    unit::{
        Declaration, DeclarationKind, ErrorHandling, Fragment, Header, ParamMode, Parameter,
        ProcedureUnit, Returns, RoutineKind, Stmt, Terminator,
    },
    util::{split_top_level, squish},
};

use super::{
    hoist_declarations, preamble,
    scanner::{qualified_name, subspan, Source},
    starts_with_keyword, ParsedDeclaration,
};

/// Keywords that can begin a T-SQL statement.
static STATEMENT_KEYWORDS: &[&str] = &[
    "ALTER", "BEGIN", "BREAK", "CLOSE", "COMMIT", "CONTINUE", "CREATE", "DEALLOCATE", "DECLARE",
    "DELETE", "DROP", "EXEC", "EXECUTE", "FETCH", "GOTO", "IF", "INSERT", "MERGE", "OPEN",
    "PRINT", "RAISERROR", "RETURN", "ROLLBACK", "SAVE", "SELECT", "SET", "THROW", "TRUNCATE",
    "UPDATE", "USE", "WAITFOR", "WHILE", "WITH",
];

pub(super) fn segment(sql: &str) -> Result<ProcedureUnit> {
    let src = Source::new(sql, Dialect::SqlServer, tokenize(sql, Dialect::SqlServer)?);

    let (create, kind_at, or_replace) = find_header(&src).ok_or_else(|| {
        Error::malformed(
            sql,
            0..sql.len(),
            "no CREATE PROCEDURE or CREATE FUNCTION header found",
        )
    })?;
    let kind = if src.kw(kind_at, "FUNCTION") {
        RoutineKind::Function
    } else {
        RoutineKind::Procedure
    };
    let (schema, name, mut i) = qualified_name(&src, kind_at + 1)?;
    let header_text = squish(&src.fragment(create..i).text);

    // Parameters, optionally wrapped in parentheses.
    let parenthesized = src.punct(i, "(");
    if parenthesized {
        i += 1;
    }
    let mut parameters = vec![];
    while src.toks.get(i).map_or(false, |t| t.kind == TokenKind::Variable) {
        let (param, next) = parameter(&src, i)?;
        parameters.push(param);
        i = next;
        if src.punct(i, ",") {
            i += 1;
        }
    }
    if parenthesized {
        if !src.punct(i, ")") {
            return Err(src.malformed(i, "expected `)` after parameter list"));
        }
        i += 1;
    }

    // RETURNS and WITH options.
    let mut returns = None;
    let mut attributes = vec![];
    if src.kw(i, "RETURNS") {
        let end = until_as(&src, i + 1);
        let text = src.fragment(i + 1..end).text;
        returns = Some(if is_table_return(&text) {
            Returns::ResultSet(text)
        } else {
            Returns::Scalar(text)
        });
        i = end;
    }
    if src.kw(i, "WITH") {
        let end = until_as(&src, i + 1);
        attributes.push(src.fragment(i..end).text);
        i = end;
    }
    if !src.kw(i, "AS") {
        return Err(src.malformed(i, "expected AS before the routine body"));
    }
    let header_span = src.start_of(create)..src.end_of(i);
    let body_start = i + 1;

    // The body runs to the end of input, or to a `GO` batch separator.
    let body_end = (body_start..src.len())
        .find(|&k| src.kw(k, "GO"))
        .unwrap_or(src.len());
    let trailing = (body_end + 1 < src.len()).then(|| src.fragment(body_end + 1..src.len()));

    let mut body = statements(&src, body_start..body_end)?;
    body = unwrap_single_block(body);
    let error_handling = lift_try(&mut body);
    let (declarations, body) = hoist_declarations(body, &parse_declare, &|name, value| {
        format!("SET @{} = {}", name, value)
    });

    Ok(ProcedureUnit {
        dialect: Dialect::SqlServer,
        preamble: preamble(&src, 0..create, ""),
        header: Header {
            text: header_text,
            span: header_span,
            kind,
            schema,
            name,
            or_replace,
            returns,
            attributes,
        },
        parameters,
        declarations,
        body,
        error_handling,
        terminator: Terminator {
            trailing,
            ..Terminator::default()
        },
    })
}

/// Find `CREATE [OR ALTER] PROC`, `ALTER PROC` or `CREATE FUNCTION`.
fn find_header(src: &Source<'_>) -> Option<(usize, usize, bool)> {
    let routine = ["PROC", "PROCEDURE", "FUNCTION"];
    (0..src.len()).find_map(|i| {
        if src.kw(i, "CREATE") && src.kw(i + 1, "OR") && src.kw(i + 2, "ALTER") {
            src.any_kw(i + 3, &routine).then_some((i, i + 3, true))
        } else if src.any_kw(i, &["CREATE", "ALTER"]) {
            src.any_kw(i + 1, &routine)
                .then_some((i, i + 1, src.kw(i, "ALTER")))
        } else {
            None
        }
    })
}

/// `@name [AS] type [= default] [OUT | OUTPUT] [READONLY]`
fn parameter(src: &Source<'_>, start: usize) -> Result<(Parameter, usize)> {
    let mut end = start + 1;
    let mut parens = 0i32;
    while end < src.len() {
        if src.punct(end, "(") {
            parens += 1;
        } else if src.punct(end, ")") {
            if parens == 0 {
                break;
            }
            parens -= 1;
        } else if parens == 0
            && (src.punct(end, ",") || src.any_kw(end, &["AS", "WITH", "RETURNS"]))
            && !(end == start + 1 && src.kw(end, "AS"))
        {
            break;
        }
        end += 1;
    }

    let name = src.toks[start].text.trim_start_matches('@').to_owned();
    let mut type_start = start + 1;
    if src.kw(type_start, "AS") {
        type_start += 1;
    }
    let mut mode = ParamMode::In;
    let mut type_end = end;
    let mut default = None;
    let mut default_start = None;
    for k in type_start..end {
        if src.punct(k, "=") && default_start.is_none() {
            type_end = type_end.min(k);
            default_start = Some(k + 1);
        } else if src.any_kw(k, &["OUT", "OUTPUT", "READONLY"]) {
            type_end = type_end.min(k);
            if let Some(ds) = default_start.take() {
                default = Some(src.fragment(ds..k).text);
            }
            if !src.kw(k, "READONLY") {
                mode = ParamMode::Out;
            }
        }
    }
    if let Some(ds) = default_start {
        default = Some(src.fragment(ds..end).text);
    }

    let whole = src.fragment(start..end);
    Ok((
        Parameter {
            name,
            data_type: src.fragment(type_start..type_end).text,
            mode,
            default,
            text: whole.text,
            span: whole.span,
        },
        end,
    ))
}

/// Find the `AS` that introduces the body, skipping `EXECUTE AS`.
fn until_as(src: &Source<'_>, start: usize) -> usize {
    let mut parens = 0i32;
    for k in start..src.len() {
        if src.punct(k, "(") {
            parens += 1;
        } else if src.punct(k, ")") {
            parens -= 1;
        } else if parens == 0
            && (src.kw(k, "AS") && !src.any_kw(k - 1, &["EXECUTE", "EXEC"])
                || src.kw(k, "WITH") && k > start)
        {
            return k;
        }
    }
    src.len()
}

fn is_table_return(text: &str) -> bool {
    static TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(@\w+\s+)?TABLE\b").unwrap());
    TABLE.is_match(text)
}

/// A body of exactly one `BEGIN … END` is the usual way to write a procedure.
fn unwrap_single_block(body: Vec<Stmt>) -> Vec<Stmt> {
    let blocks = body
        .iter()
        .filter(|s| !matches!(s, Stmt::Comment(_)))
        .count();
    if blocks != 1 || !body.iter().any(|s| matches!(s, Stmt::Block(_))) {
        return body;
    }
    body.into_iter()
        .flat_map(|s| match s {
            Stmt::Block(inner) => inner,
            other => vec![other],
        })
        .collect()
}

/// If the whole body is one `TRY/CATCH` (perhaps after `SET NOCOUNT ON`),
/// the `CATCH` block handles errors for the entire routine.
fn lift_try(body: &mut Vec<Stmt>) -> Option<ErrorHandling> {
    let is_session_option = |s: &Stmt| {
        matches!(s, Stmt::Simple(f) if starts_with_keyword(&f.text, "SET") && squish(&f.text).to_ascii_uppercase().starts_with("SET NOCOUNT"))
    };
    let mut tries = body.iter().filter(|s| matches!(s, Stmt::Try { .. }));
    let others = body
        .iter()
        .filter(|s| !matches!(s, Stmt::Try { .. } | Stmt::Comment(_)) && !is_session_option(s))
        .count();
    if tries.next().is_none() || tries.next().is_some() || others > 0 {
        return None;
    }

    let mut handler = None;
    let mut out = vec![];
    for stmt in body.drain(..) {
        match stmt {
            Stmt::Try { body, handler: h } => {
                out.extend(body);
                handler = Some(h);
            }
            other => out.push(other),
        }
    }
    *body = out;
    handler
}

/// Parse `DECLARE @a INT = 1, @b VARCHAR(10)` into one declaration per name.
fn parse_declare(frag: &Fragment) -> Vec<ParsedDeclaration> {
    static SPECIAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^DECLARE\s+@?(\w+)\s+(?:AS\s+)?(CURSOR|TABLE)\b").unwrap()
    });
    static VARIABLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^@(\w+)\s+(?:AS\s+)?(.*?)(?:\s*=\s*(.*))?$").unwrap()
    });

    if let Some(caps) = SPECIAL.captures(&frag.text) {
        let kind = if caps[2].eq_ignore_ascii_case("CURSOR") {
            DeclarationKind::Cursor
        } else {
            DeclarationKind::Other
        };
        return vec![ParsedDeclaration {
            declaration: Declaration {
                name: caps[1].to_owned(),
                kind,
                text: frag.text.clone(),
                span: frag.span.clone(),
            },
            initializer: None,
            bare_text: frag.text.clone(),
        }];
    }

    let rest = frag.text["DECLARE".len()..].trim_start();
    split_top_level(rest, ',')
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .map(|piece| {
            let span = subspan(frag, piece);
            match VARIABLE.captures(piece) {
                Some(caps) => {
                    let name = caps[1].to_owned();
                    let data_type = caps[2].trim();
                    ParsedDeclaration {
                        declaration: Declaration {
                            name: name.clone(),
                            kind: DeclarationKind::Variable,
                            text: format!("DECLARE {}", piece),
                            span,
                        },
                        initializer: caps.get(3).map(|m| m.as_str().trim().to_owned()),
                        bare_text: format!("DECLARE @{} {}", name, data_type),
                    }
                }
                None => ParsedDeclaration {
                    declaration: Declaration {
                        name: piece.trim_start_matches('@').to_owned(),
                        kind: DeclarationKind::Other,
                        text: format!("DECLARE {}", piece),
                        span,
                    },
                    initializer: None,
                    bare_text: format!("DECLARE {}", piece),
                },
            }
        })
        .collect()
}

/// Per-statement bookkeeping for deciding whether a keyword continues the
/// current statement.
#[derive(Default)]
struct StatementState {
    first: String,
    seen_select: bool,
    seen_set: bool,
    seen_values: bool,
    seen_main: bool,
}

impl StatementState {
    /// Does token `k` begin a new statement?
    fn starts_new(&mut self, src: &Source<'_>, k: usize) -> bool {
        let tok = &src.toks[k];
        if tok.kind != TokenKind::Word {
            return false;
        }
        let word = tok.text.to_ascii_uppercase();
        if word == "VALUES" {
            self.seen_values = true;
            return false;
        }
        if !STATEMENT_KEYWORDS.contains(&word.as_str()) {
            return false;
        }
        if self.first == "MERGE" {
            return false;
        }
        let prev_is = |kws: &[&str]| src.any_kw(k - 1, kws);
        match word.as_str() {
            "SELECT" => {
                if prev_is(&["UNION", "ALL", "EXCEPT", "INTERSECT", "FOR"]) {
                    return false;
                }
                if self.first == "INSERT" && !self.seen_values && !self.seen_select {
                    self.seen_select = true;
                    return false;
                }
                if self.first == "WITH" && !self.seen_main {
                    self.seen_main = true;
                    return false;
                }
                true
            }
            "INSERT" | "UPDATE" | "DELETE" => {
                if self.first == "WITH" && !self.seen_main {
                    self.seen_main = true;
                    return false;
                }
                true
            }
            "SET" => {
                if self.first == "UPDATE" && !self.seen_set {
                    self.seen_set = true;
                    return false;
                }
                true
            }
            "EXEC" | "EXECUTE" => {
                !(self.first == "INSERT" && !self.seen_values && !self.seen_select)
                    && !src.kw(k + 1, "AS")
            }
            "WITH" => !src.punct(k + 1, "(") && !prev_is(&["ROLLBACK", "COMMIT", "TRANSACTION", "TRAN"]),
            "FETCH" => !prev_is(&["ROWS", "ROW"]),
            "IF" => !src.kw(k + 1, "EXISTS"),
            _ => true,
        }
    }
}

/// Parse the statements in `range`.
fn statements(src: &Source<'_>, range: Range<usize>) -> Result<Vec<Stmt>> {
    let upper = if range.end < src.len() {
        src.start_of(range.end)
    } else {
        usize::MAX
    };
    let mut seen = if range.start == 0 {
        0
    } else {
        src.end_of(range.start - 1)
    };

    let mut out = vec![];
    let mut i = range.start;
    while i < range.end {
        if src.punct(i, ";") {
            i += 1;
            continue;
        }
        out.extend(src.comments_in(seen..src.start_of(i)));
        let (stmt, next) = statement(src, i, range.end)?;
        out.push(stmt);
        seen = src.end_of(next - 1);
        i = next;
    }
    out.extend(src.comments_in(seen..upper));
    Ok(out)
}

/// Parse one statement starting at `i`, returning it and the index after it.
fn statement(src: &Source<'_>, i: usize, limit: usize) -> Result<(Stmt, usize)> {
    if src.kw(i, "BEGIN") && src.kw(i + 1, "TRY") {
        return try_catch(src, i);
    }
    if src.kw(i, "BEGIN") && src.is_opener(i) {
        let (end, past) = src.block_end(i)?;
        return Ok((Stmt::Block(statements(src, i + 1..end)?), past));
    }
    if src.kw(i, "IF") || src.kw(i, "WHILE") {
        let cond_end = condition_end(src, i + 1, limit)?;
        let condition = src.fragment(i + 1..cond_end);
        let (then, mut next) = branch(src, cond_end, limit)?;
        if src.kw(i, "WHILE") {
            return Ok((
                Stmt::While {
                    condition,
                    body: then,
                },
                next,
            ));
        }
        let mut otherwise = None;
        let mut peek = next;
        while src.punct(peek, ";") {
            peek += 1;
        }
        if peek < limit && src.kw(peek, "ELSE") {
            let (stmts, after) = branch(src, peek + 1, limit)?;
            otherwise = Some(stmts);
            next = after;
        }
        return Ok((
            Stmt::If {
                condition,
                then,
                otherwise,
            },
            next,
        ));
    }
    if src.any_kw(i, &["ELSE", "END"]) {
        return Err(src.malformed(i, format!("unexpected {}", src.toks[i].text)));
    }

    let end = simple_end(src, i, limit)?;
    let frag = src.fragment(i..end);
    let next = if src.punct(end, ";") { end + 1 } else { end };
    let stmt = if src.any_kw(i, &["OPEN", "FETCH", "CLOSE", "DEALLOCATE"]) {
        Stmt::Unsupported {
            fragment: frag,
            reason: "cursor operations have no mapping".to_owned(),
        }
    } else {
        Stmt::Simple(frag)
    };
    Ok((stmt, next))
}

/// The statement (or block) controlled by an `IF`, `ELSE` or `WHILE`.
fn branch(src: &Source<'_>, start: usize, limit: usize) -> Result<(Vec<Stmt>, usize)> {
    if start >= limit {
        return Err(src.malformed(start, "expected a statement"));
    }
    let (stmt, next) = statement(src, start, limit)?;
    let stmts = match stmt {
        Stmt::Block(inner) => inner,
        other => vec![other],
    };
    Ok((stmts, next))
}

/// `BEGIN TRY … END TRY BEGIN CATCH … END CATCH`
fn try_catch(src: &Source<'_>, start: usize) -> Result<(Stmt, usize)> {
    let (try_end, past_try) = src.block_end(start)?;
    if !(src.kw(past_try, "BEGIN") && src.kw(past_try + 1, "CATCH")) {
        return Err(src.malformed(start, "BEGIN TRY without BEGIN CATCH"));
    }
    let (catch_end, past_catch) = src.block_end(past_try)?;
    let handler = ErrorHandling {
        condition: None,
        statements: statements(src, past_try + 2..catch_end)?,
        span: src.start_of(past_try)..src.end_of(past_catch - 1),
    };
    Ok((
        Stmt::Try {
            body: statements(src, start + 2..try_end)?,
            handler,
        },
        past_catch,
    ))
}

/// An `IF`/`WHILE` condition ends where its statement begins.
fn condition_end(src: &Source<'_>, start: usize, limit: usize) -> Result<usize> {
    let mut parens = 0i32;
    let mut k = start;
    while k < limit {
        if src.punct(k, "(") {
            parens += 1;
        } else if src.punct(k, ")") {
            parens -= 1;
        } else if parens == 0 && k > start && src.any_kw(k, STATEMENT_KEYWORDS) {
            return Ok(k);
        } else if src.kw(k, "CASE") {
            let (_, past) = src.block_end(k)?;
            k = past;
            continue;
        }
        k += 1;
    }
    Err(src.malformed(start, "condition without a statement"))
}

/// Find where the simple statement starting at `start` ends: at a `;`, at
/// the next statement keyword, or at `ELSE`/`END`.
fn simple_end(src: &Source<'_>, start: usize, limit: usize) -> Result<usize> {
    let mut state = StatementState {
        first: src.toks[start].text.to_ascii_uppercase(),
        ..StatementState::default()
    };
    let mut parens = 0i32;
    let mut k = start + 1;
    while k < limit {
        if src.punct(k, ";") && parens == 0 {
            return Ok(k);
        }
        if src.punct(k, "(") {
            parens += 1;
        } else if src.punct(k, ")") {
            parens -= 1;
        } else if src.kw(k, "CASE") {
            let (_, past) = src.block_end(k)?;
            k = past;
            continue;
        } else if parens == 0 && (src.any_kw(k, &["ELSE", "END"]) || state.starts_new(src, k)) {
            return Ok(k);
        }
        k += 1;
    }
    Ok(limit)
}

#[cfg(test)]
mod test {
    use super::*;

    fn body(sql: &str) -> Vec<Stmt> {
        segment(sql).unwrap().body
    }

    fn texts(stmts: &[Stmt]) -> Vec<String> {
        stmts
            .iter()
            .map(|s| match s {
                Stmt::Simple(f) | Stmt::Comment(f) => f.text.clone(),
                other => format!("{other:?}"),
            })
            .collect()
    }

    #[test]
    fn statements_without_semicolons() {
        let stmts = body(
            "CREATE PROC p AS BEGIN UPDATE t SET a = 1 WHERE b = 2 INSERT INTO t (a) SELECT a FROM u UNION ALL SELECT 2 SELECT @x = 1 END",
        );
        assert_eq!(
            texts(&stmts),
            vec![
                "UPDATE t SET a = 1 WHERE b = 2",
                "INSERT INTO t (a) SELECT a FROM u UNION ALL SELECT 2",
                "SELECT @x = 1",
            ]
        );
    }

    #[test]
    fn table_hints_and_ctes_stay_together() {
        let stmts = body(
            "CREATE PROC p AS WITH c AS (SELECT 1 AS x) SELECT * FROM c WITH (NOLOCK) SELECT 2",
        );
        assert_eq!(
            texts(&stmts),
            vec!["WITH c AS (SELECT 1 AS x) SELECT * FROM c WITH (NOLOCK)", "SELECT 2"]
        );
    }

    #[test]
    fn if_else_without_blocks() {
        let stmts = body("CREATE PROC p @a INT AS IF @a > 0 SET @a = 1 ELSE IF @a < 0 BEGIN SET @a = 2 END ELSE RETURN");
        match &stmts[..] {
            [Stmt::If {
                condition,
                then,
                otherwise: Some(otherwise),
            }] => {
                assert_eq!(condition.text, "@a > 0");
                assert_eq!(texts(then), vec!["SET @a = 1"]);
                assert!(matches!(&otherwise[0], Stmt::If { otherwise: Some(_), .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn try_catch_becomes_error_handling() {
        let unit = segment(
            "CREATE PROCEDURE p AS BEGIN SET NOCOUNT ON BEGIN TRY BEGIN TRANSACTION UPDATE t SET a = 1 COMMIT TRANSACTION END TRY BEGIN CATCH ROLLBACK TRANSACTION -- log\nEND CATCH END",
        )
        .unwrap();
        assert_eq!(
            texts(&unit.body),
            vec![
                "SET NOCOUNT ON",
                "BEGIN TRANSACTION",
                "UPDATE t SET a = 1",
                "COMMIT TRANSACTION"
            ]
        );
        let handler = unit.error_handling.unwrap();
        assert_eq!(texts(&handler.statements), vec!["ROLLBACK TRANSACTION", "-- log"]);
    }

    #[test]
    fn parameters_with_defaults_and_output() {
        let unit = segment(
            "CREATE PROCEDURE [dbo].[p] (@a NVARCHAR(50) = N'x', @b AS DECIMAL(10, 2) OUTPUT) WITH RECOMPILE AS SELECT 1",
        )
        .unwrap();
        assert_eq!(unit.header.name, "p");
        assert_eq!(unit.header.text, "CREATE PROCEDURE [dbo].[p]");
        assert_eq!(unit.parameters[0].default.as_deref(), Some("N'x'"));
        assert_eq!(unit.parameters[0].data_type, "NVARCHAR(50)");
        assert_eq!(unit.parameters[1].data_type, "DECIMAL(10, 2)");
        assert_eq!(unit.parameters[1].mode, ParamMode::Out);
        assert_eq!(unit.header.attributes, vec!["WITH RECOMPILE"]);
    }

    #[test]
    fn scalar_functions_keep_their_return_type() {
        let unit =
            segment("CREATE FUNCTION dbo.f (@x INT) RETURNS INT AS BEGIN RETURN @x + 1 END").unwrap();
        assert_eq!(unit.header.kind, RoutineKind::Function);
        assert_eq!(unit.header.returns, Some(Returns::Scalar("INT".to_owned())));
        assert_eq!(texts(&unit.body), vec!["RETURN @x + 1"]);
    }

    #[test]
    fn cursor_declarations_are_flagged() {
        let unit = segment(
            "CREATE PROC p AS DECLARE c CURSOR FOR SELECT a, b FROM t OPEN c CLOSE c",
        )
        .unwrap();
        assert_eq!(unit.declarations.len(), 1);
        assert_eq!(unit.declarations[0].kind, DeclarationKind::Cursor);
        assert!(matches!(&unit.body[0], Stmt::Unsupported { .. }));
    }
}
