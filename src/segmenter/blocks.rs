//! Statement lists for dialects that end every statement with `;`.
//!
//! PL/pgSQL and MySQL stored programs have nearly the same block structure:
//! `IF … THEN … END IF`, loops closed by `END LOOP`/`END WHILE`, and nested
//! `BEGIN … END` blocks. They differ in where error handlers live, which is
//! the only place this module asks which dialect it is reading.

use std::ops::Range;

use crate::{
    dialect::Dialect,
    errors::Result,
    unit::{ErrorHandling, Fragment, Stmt},
};

use super::{mysql, scanner::Source};

/// Parse the statements in `src.toks[range]`.
pub(crate) fn statements(src: &Source<'_>, range: Range<usize>) -> Result<Vec<Stmt>> {
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
        let end = statement_end(src, i, range.end)?;
        out.extend(src.comments_in(seen..src.start_of(i)));
        out.push(statement(src, i..end)?);
        seen = src.end_of(end - 1);
        i = end;
    }
    out.extend(src.comments_in(seen..upper));
    Ok(out)
}

/// Find the `;` ending the statement starting at `start`, or `limit`.
pub(crate) fn statement_end(src: &Source<'_>, start: usize, limit: usize) -> Result<usize> {
    let mut i = start;
    while i < limit {
        if src.punct(i, ";") {
            return Ok(i);
        }
        if src.is_opener(i) {
            let (_, past) = src.block_end(i)?;
            i = past;
            continue;
        }
        i += 1;
    }
    Ok(limit)
}

/// Classify one statement.
fn statement(src: &Source<'_>, range: Range<usize>) -> Result<Stmt> {
    let first = range.start;
    if src.kw(first, "IF") && src.is_opener(first) {
        parse_if(src, range)
    } else if src.kw(first, "WHILE") {
        parse_while(src, range)
    } else if src.kw(first, "BEGIN") {
        parse_block(src, range)
    } else if src.any_kw(first, &["LOOP", "FOR", "FOREACH", "REPEAT", "CASE"]) {
        Ok(unsupported(
            src,
            range.clone(),
            format!(
                "{} statements have no structural mapping",
                src.toks[first].text.to_ascii_uppercase()
            ),
        ))
    } else if src.punct(first + 1, ":") || src.punct(first, "<") {
        Ok(unsupported(src, range, "labeled statements are not translated"))
    } else if src.dialect == Dialect::PostgreSql && src.kw(first, "DECLARE") {
        Ok(unsupported(src, range, "nested DECLARE sections are not translated"))
    } else {
        Ok(Stmt::Simple(src.fragment(range)))
    }
}

fn unsupported(src: &Source<'_>, range: Range<usize>, reason: impl Into<String>) -> Stmt {
    Stmt::Unsupported {
        fragment: src.fragment(range),
        reason: reason.into(),
    }
}

/// `IF c THEN … [ELSIF c THEN …] [ELSE …] END IF`.
fn parse_if(src: &Source<'_>, range: Range<usize>) -> Result<Stmt> {
    let (end, _) = src.block_end(range.start)?;

    let mut branches: Vec<(Fragment, Vec<Stmt>)> = vec![];
    let mut otherwise = None;
    let mut cond_start = range.start + 1;
    loop {
        let then = src
            .find_at_depth0(cond_start..end, |s, k| s.kw(k, "THEN"))?
            .ok_or_else(|| src.malformed(range.start, "IF without THEN"))?;
        let next = src.find_at_depth0(then + 1..end, |s, k| {
            s.any_kw(k, &["ELSIF", "ELSEIF", "ELSE"]) && s.statement_start(k)
        })?;
        let body_end = next.unwrap_or(end);
        branches.push((
            src.fragment(cond_start..then),
            statements(src, then + 1..body_end)?,
        ));
        match next {
            Some(k) if src.kw(k, "ELSE") => {
                otherwise = Some(statements(src, k + 1..end)?);
                break;
            }
            Some(k) => cond_start = k + 1,
            None => break,
        }
    }

    let mut result = otherwise;
    let mut stmt = None;
    for (condition, then) in branches.into_iter().rev() {
        let s = Stmt::If {
            condition,
            then,
            otherwise: result.take(),
        };
        result = Some(vec![s.clone()]);
        stmt = Some(s);
    }
    stmt.ok_or_else(|| src.malformed(range.start, "IF without THEN"))
}

/// `WHILE c LOOP … END LOOP` or `WHILE c DO … END WHILE`.
fn parse_while(src: &Source<'_>, range: Range<usize>) -> Result<Stmt> {
    let (body_kw, end) = match src.dialect {
        Dialect::MySql => {
            let (end, _) = src.block_end(range.start)?;
            let do_ = src
                .find_at_depth0(range.start + 1..end, |s, k| s.kw(k, "DO"))?
                .ok_or_else(|| src.malformed(range.start, "WHILE without DO"))?;
            (do_, end)
        }
        _ => {
            let loop_ = src
                .find_at_depth0(range.start + 1..range.end, |s, k| s.kw(k, "LOOP"))?
                .ok_or_else(|| src.malformed(range.start, "WHILE without LOOP"))?;
            let (end, _) = src.block_end(loop_)?;
            (loop_, end)
        }
    };
    Ok(Stmt::While {
        condition: src.fragment(range.start + 1..body_kw),
        body: statements(src, body_kw + 1..end)?,
    })
}

/// A nested `BEGIN … END`, possibly with a handler.
fn parse_block(src: &Source<'_>, range: Range<usize>) -> Result<Stmt> {
    let (end, _) = src.block_end(range.start)?;
    let inner = range.start + 1..end;
    match src.dialect {
        Dialect::PostgreSql => {
            let exception = src.find_at_depth0(inner.clone(), |s, k| {
                s.kw(k, "EXCEPTION") && s.statement_start(k)
            })?;
            match exception {
                Some(exc) => Ok(Stmt::Try {
                    body: statements(src, inner.start..exc)?,
                    handler: exception_handler(src, exc + 1..end)?,
                }),
                None => Ok(Stmt::Block(statements(src, inner)?)),
            }
        }
        _ => match mysql::find_exit_handler(src, inner.clone())? {
            Some((at, handler)) => {
                let mut body = statements(src, inner.start..at.start)?;
                body.extend(statements(src, at.end..inner.end)?);
                Ok(Stmt::Try { body, handler })
            }
            None => Ok(Stmt::Block(statements(src, inner)?)),
        },
    }
}

/// The `WHEN … THEN …` clauses after a PL/pgSQL `EXCEPTION`. We translate the
/// first clause; later ones are kept for review.
pub(crate) fn exception_handler(src: &Source<'_>, range: Range<usize>) -> Result<ErrorHandling> {
    let is_when = |s: &Source<'_>, k: usize| {
        s.kw(k, "WHEN") && (k == range.start || s.punct(k - 1, ";"))
    };
    let first = src
        .find_at_depth0(range.clone(), is_when)?
        .ok_or_else(|| src.malformed(range.start, "EXCEPTION without WHEN"))?;

    let mut statements_out = vec![];
    let mut condition = None;
    let mut when = first;
    let mut index = 0;
    loop {
        let then = src
            .find_at_depth0(when + 1..range.end, |s, k| s.kw(k, "THEN"))?
            .ok_or_else(|| src.malformed(when, "WHEN without THEN"))?;
        let next = src.find_at_depth0(then + 1..range.end, is_when)?;
        let clause_end = next.unwrap_or(range.end);
        if index == 0 {
            let cond = src.fragment(when + 1..then);
            if !cond.text.eq_ignore_ascii_case("OTHERS") {
                condition = Some(cond.text);
            }
            statements_out.extend(statements(src, then + 1..clause_end)?);
        } else {
            statements_out.push(unsupported(
                src,
                when..clause_end,
                "only the first exception clause is translated",
            ));
        }
        index += 1;
        match next {
            Some(k) => when = k,
            None => break,
        }
    }

    Ok(ErrorHandling {
        condition,
        statements: statements_out,
        span: src.start_of(first)..src.end_of(range.end.saturating_sub(1)),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tokenizer::tokenize;

    fn parse(sql: &str, dialect: Dialect) -> Vec<Stmt> {
        let src = Source::new(sql, dialect, tokenize(sql, dialect).unwrap());
        statements(&src, 0..src.len()).unwrap()
    }

    #[test]
    fn if_elsif_else_nests() {
        let stmts = parse(
            "IF a > 1 THEN x := 1; ELSIF a > 0 THEN x := 2; ELSE x := 3; END IF; y := 4;",
            Dialect::PostgreSql,
        );
        assert_eq!(stmts.len(), 2);
        match &stmts[0] {
            Stmt::If {
                condition,
                then,
                otherwise: Some(otherwise),
            } => {
                assert_eq!(condition.text, "a > 1");
                assert_eq!(then.len(), 1);
                match &otherwise[0] {
                    Stmt::If {
                        condition,
                        otherwise: Some(last),
                        ..
                    } => {
                        assert_eq!(condition.text, "a > 0");
                        assert_eq!(last, &vec![Stmt::Simple(Fragment::new("x := 3", 52..58))]);
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mysql_while_and_if_function() {
        let stmts = parse(
            "WHILE i < 10 DO SET x = IF(i > 5, 1, 0); SET i = i + 1; END WHILE;",
            Dialect::MySql,
        );
        match &stmts[..] {
            [Stmt::While { condition, body }] => {
                assert_eq!(condition.text, "i < 10");
                assert_eq!(body.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn postgres_exception_block() {
        let stmts = parse(
            "BEGIN UPDATE t SET a = 1; EXCEPTION WHEN OTHERS THEN ROLLBACK; RAISE; END;",
            Dialect::PostgreSql,
        );
        match &stmts[..] {
            [Stmt::Try { body, handler }] => {
                assert_eq!(body.len(), 1);
                assert_eq!(handler.condition, None);
                assert_eq!(handler.statements.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn comments_between_statements_survive() {
        let stmts = parse("-- first\nSELECT 1; /* second */ SELECT 2;", Dialect::PostgreSql);
        assert!(matches!(&stmts[0], Stmt::Comment(c) if c.text == "-- first"));
        assert!(matches!(&stmts[2], Stmt::Comment(c) if c.text == "/* second */"));
        assert_eq!(stmts.len(), 4);
    }

    #[test]
    fn loops_are_unsupported() {
        let stmts = parse("FOR r IN SELECT 1 LOOP NULL; END LOOP;", Dialect::PostgreSql);
        assert!(matches!(&stmts[0], Stmt::Unsupported { .. }));
    }
}
