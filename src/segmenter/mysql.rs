//! Segmenting MySQL stored procedures and functions.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    dialect::Dialect,
    errors::{Error, Result},
    tokenizer::{tokenize, TokenKind},
    unit::{
        Declaration, DeclarationKind, ErrorHandling, Fragment, Header, ProcedureUnit, Returns,
        RoutineKind, Terminator,
    },
    util::squish,
};

use super::{
    blocks::{statement_end, statements},
    hoist_declarations, postgres, preamble,
    scanner::{qualified_name, Source},
    ParsedDeclaration,
};

/// Replace `DELIMITER x` lines with spaces, so that byte offsets still line up
/// with the original text. Returns the new text and the custom delimiter.
pub(crate) fn blank_delimiter_lines(sql: &str) -> (String, Option<String>) {
    static DELIMITER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?im)^[ \t]*DELIMITER[ \t]+(\S+)[ \t]*$").unwrap());
    let mut delimiter = None;
    let mut out = sql.to_owned();
    for caps in DELIMITER.captures_iter(sql) {
        let whole = caps.get(0).map_or(0..0, |m| m.range());
        if &caps[1] != ";" && delimiter.is_none() {
            delimiter = Some(caps[1].to_owned());
        }
        out.replace_range(whole.clone(), &" ".repeat(whole.len()));
    }
    (out, delimiter)
}

pub(super) fn segment(sql: &str) -> Result<ProcedureUnit> {
    let (text, delimiter) = blank_delimiter_lines(sql);
    let delim = delimiter.clone().unwrap_or_default();
    let src = Source::new(&text, Dialect::MySql, tokenize(&text, Dialect::MySql)?);

    let (create, kind_at, definer) = find_header(&src).ok_or_else(|| {
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
    let mut name_at = kind_at + 1;
    if src.kw(name_at, "IF") && src.kw(name_at + 1, "NOT") && src.kw(name_at + 2, "EXISTS") {
        name_at += 3;
    }
    let (schema, name, mut i) = qualified_name(&src, name_at)?;
    let header_text = squish(&format!(
        "{} {}",
        src.fragment(create..create + 1).text,
        src.fragment(kind_at..i).text
    ));

    if !src.punct(i, "(") {
        return Err(src.malformed(i, "expected `(` after the routine name"));
    }
    let close = (i..src.len())
        .scan(0i32, |depth, k| {
            if src.punct(k, "(") {
                *depth += 1;
            } else if src.punct(k, ")") {
                *depth -= 1;
            }
            Some((k, *depth))
        })
        .find(|&(_, depth)| depth == 0)
        .map(|(k, _)| k)
        .ok_or_else(|| src.malformed(i, "unbalanced parentheses in parameter list"))?;
    let parameters = postgres::parameter_list(&src, i + 1..close)?;
    i = close + 1;

    let mut returns = None;
    let mut attributes = definer.into_iter().collect::<Vec<_>>();
    if src.kw(i, "RETURNS") {
        let end = returns_end(&src, i + 1);
        returns = Some(Returns::Scalar(src.fragment(i + 1..end).text));
        i = end;
    }
    while let Some(len) = characteristic_len(&src, i) {
        let end = (i + len).min(src.len());
        attributes.push(squish(&src.fragment(i..end).text));
        i = end;
    }
    let header_span = src.start_of(create)..src.start_of(i);

    let is_delimiter = |k: usize| {
        src.punct(k, ";")
            || (src.toks[k].kind == TokenKind::Punct
                && !delim.is_empty()
                && src.toks[k].text.chars().all(|c| delim.contains(c)))
    };

    let mut label = None;
    if i + 2 < src.len()
        && src.toks[i].kind == TokenKind::Word
        && src.punct(i + 1, ":")
        && src.kw(i + 2, "BEGIN")
    {
        label = Some(src.toks[i].text.to_owned());
        i += 2;
    }
    let (body_range, past) = if src.kw(i, "BEGIN") {
        let (end, mut past) = src.block_end(i)?;
        if let Some(label) = &label {
            if past < src.len() && src.toks[past].text.eq_ignore_ascii_case(label) {
                past += 1;
            }
        }
        (i + 1..end, past)
    } else {
        let end = (i..src.len()).find(|&k| is_delimiter(k)).unwrap_or(src.len());
        (i..end, end)
    };
    let mut rest = past;
    while rest < src.len() && is_delimiter(rest) {
        rest += 1;
    }
    let trailing = (rest < src.len()).then(|| src.fragment(rest..src.len()));

    let (error_handling, body) = match find_exit_handler(&src, body_range.clone())? {
        Some((at, handler)) => {
            let mut body = statements(&src, body_range.start..at.start)?;
            body.extend(statements(&src, at.end..body_range.end)?);
            (Some(handler), body)
        }
        None => (None, statements(&src, body_range)?),
    };
    let (declarations, body) = hoist_declarations(body, &parse_declare, &|name, value| {
        format!("SET {} = {}", name, value)
    });

    Ok(ProcedureUnit {
        dialect: Dialect::MySql,
        preamble: preamble(&src, 0..create, &delim),
        header: Header {
            text: header_text,
            span: header_span,
            kind,
            schema,
            name,
            or_replace: false,
            returns,
            attributes,
        },
        parameters,
        declarations,
        body,
        error_handling,
        terminator: Terminator {
            delimiter,
            label,
            trailing,
            ..Terminator::default()
        },
    })
}

/// Find `CREATE [DEFINER = …] PROCEDURE|FUNCTION`. Returns the index of
/// `CREATE`, of the routine keyword, and the `DEFINER` clause, if any.
fn find_header(src: &Source<'_>) -> Option<(usize, usize, Option<String>)> {
    let routine = ["PROCEDURE", "FUNCTION"];
    (0..src.len()).find_map(|i| {
        if !src.kw(i, "CREATE") {
            return None;
        }
        if src.any_kw(i + 1, &routine) {
            return Some((i, i + 1, None));
        }
        if src.kw(i + 1, "DEFINER") {
            let kind_at = (i + 2..src.len().min(i + 10)).find(|&k| src.any_kw(k, &routine))?;
            return Some((i, kind_at, Some(squish(&src.fragment(i + 1..kind_at).text))));
        }
        None
    })
}

/// How many tokens does the characteristic starting at `k` span, if any?
fn characteristic_len(src: &Source<'_>, k: usize) -> Option<usize> {
    if src.kw(k, "COMMENT") || src.kw(k, "LANGUAGE") {
        Some(2)
    } else if src.kw(k, "NOT") && src.kw(k + 1, "DETERMINISTIC") {
        Some(2)
    } else if src.kw(k, "DETERMINISTIC") {
        Some(1)
    } else if src.any_kw(k, &["CONTAINS", "NO"]) && src.kw(k + 1, "SQL") {
        Some(2)
    } else if src.any_kw(k, &["READS", "MODIFIES"]) && src.kw(k + 1, "SQL") {
        Some(3)
    } else if src.kw(k, "SQL") && src.kw(k + 1, "SECURITY") {
        Some(3)
    } else {
        None
    }
}

/// A `RETURNS` type ends at the first characteristic or at the body.
fn returns_end(src: &Source<'_>, start: usize) -> usize {
    let mut depth = 0i32;
    for k in start..src.len() {
        if src.punct(k, "(") {
            depth += 1;
        } else if src.punct(k, ")") {
            depth -= 1;
        } else if depth == 0
            && (characteristic_len(src, k).is_some() || src.any_kw(k, &["BEGIN", "RETURN"]))
        {
            return k;
        }
    }
    src.len()
}

/// Find a `DECLARE EXIT HANDLER` among the declarations that open the block
/// `range`. Returns the handler's token range (up to its `;`) and the parsed
/// handler.
pub(crate) fn find_exit_handler(
    src: &Source<'_>,
    range: Range<usize>,
) -> Result<Option<(Range<usize>, ErrorHandling)>> {
    let mut i = range.start;
    while i < range.end {
        if src.punct(i, ";") {
            i += 1;
            continue;
        }
        if !src.kw(i, "DECLARE") {
            return Ok(None);
        }
        let end = statement_end(src, i, range.end)?;
        if src.kw(i + 1, "EXIT") && src.kw(i + 2, "HANDLER") && src.kw(i + 3, "FOR") {
            let (action, condition) = handler_conditions(src, i + 4, end);
            let handled = if src.kw(action, "BEGIN") {
                let (block_end, _) = src.block_end(action)?;
                statements(src, action + 1..block_end)?
            } else {
                statements(src, action..end)?
            };
            let handler = ErrorHandling {
                condition,
                statements: handled,
                span: src.start_of(i)..src.end_of(end.saturating_sub(1)),
            };
            return Ok(Some((i..end, handler)));
        }
        i = end;
    }
    Ok(None)
}

/// Read the condition list of a handler. Returns the index of the handler's
/// action and the condition text, which is `None` for a plain `SQLEXCEPTION`.
fn handler_conditions(src: &Source<'_>, start: usize, limit: usize) -> (usize, Option<String>) {
    let mut k = start;
    let mut catch_all = true;
    while k < limit {
        if src.any_kw(k, &["SQLEXCEPTION", "SQLWARNING"]) {
            k += 1;
        } else if src.kw(k, "NOT") && src.kw(k + 1, "FOUND") {
            catch_all = false;
            k += 2;
        } else if src.kw(k, "SQLSTATE") {
            catch_all = false;
            k += if src.kw(k + 1, "VALUE") { 3 } else { 2 };
        } else if src.toks[k].kind == TokenKind::Number
            || (src.toks[k].kind == TokenKind::Word && src.punct(k + 1, ","))
        {
            catch_all = false;
            k += 1;
        } else {
            break;
        }
        if src.punct(k, ",") {
            k += 1;
        } else {
            break;
        }
    }
    let condition = (!catch_all).then(|| squish(&src.fragment(start..k).text));
    (k, condition)
}

/// Parse `DECLARE a, b INT DEFAULT 0` into one declaration per name.
fn parse_declare(frag: &Fragment) -> Vec<ParsedDeclaration> {
    static SPECIAL: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^DECLARE\s+(\w+)\s+(CURSOR|CONDITION)\b").unwrap()
    });
    static HANDLER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^DECLARE\s+(CONTINUE|EXIT|UNDO)\s+HANDLER\b").unwrap()
    });
    static VARIABLE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^DECLARE\s+(\w+(?:\s*,\s*\w+)*)\s+(.*?)(?:\s+DEFAULT\s+(.*))?$").unwrap()
    });

    let whole = |name: &str, kind| ParsedDeclaration {
        declaration: Declaration {
            name: name.to_owned(),
            kind,
            text: frag.text.clone(),
            span: frag.span.clone(),
        },
        initializer: None,
        bare_text: frag.text.clone(),
    };

    if let Some(caps) = HANDLER.captures(&frag.text) {
        let name = format!("{} HANDLER", caps[1].to_ascii_uppercase());
        return vec![whole(&name, DeclarationKind::Other)];
    }
    if let Some(caps) = SPECIAL.captures(&frag.text) {
        let kind = if caps[2].eq_ignore_ascii_case("CURSOR") {
            DeclarationKind::Cursor
        } else {
            DeclarationKind::Other
        };
        return vec![whole(&caps[1], kind)];
    }
    match VARIABLE.captures(&frag.text) {
        Some(caps) => {
            let data_type = caps[2].trim().to_owned();
            let initializer = caps.get(3).map(|m| m.as_str().trim().to_owned());
            caps[1]
                .split(',')
                .map(|name| {
                    let name = name.trim();
                    let bare_text = format!("DECLARE {} {}", name, data_type);
                    let text = match &initializer {
                        Some(value) => format!("{} DEFAULT {}", bare_text, value),
                        None => bare_text.clone(),
                    };
                    ParsedDeclaration {
                        declaration: Declaration {
                            name: name.to_owned(),
                            kind: DeclarationKind::Variable,
                            text,
                            span: frag.span.clone(),
                        },
                        initializer: initializer.clone(),
                        bare_text,
                    }
                })
                .collect()
        }
        None => vec![whole(frag.text.as_str(), DeclarationKind::Other)],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::unit::Stmt;

    #[test]
    fn delimiter_lines_are_blanked_in_place() {
        let sql = "DELIMITER //\nCREATE PROCEDURE p() BEGIN END//\nDELIMITER ;";
        let (text, delimiter) = blank_delimiter_lines(sql);
        assert_eq!(text.len(), sql.len());
        assert_eq!(delimiter.as_deref(), Some("//"));
        assert!(text.starts_with("            \nCREATE"));
    }

    #[test]
    fn multi_name_declarations_split() {
        let unit = segment(
            "CREATE PROCEDURE p() BEGIN DECLARE a, b INT DEFAULT 0; DECLARE done INT; DECLARE CONTINUE HANDLER FOR NOT FOUND SET done = 1; SELECT a; END",
        )
        .unwrap();
        let texts = unit
            .declarations
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            texts,
            vec![
                "DECLARE a INT DEFAULT 0",
                "DECLARE b INT DEFAULT 0",
                "DECLARE done INT",
                "DECLARE CONTINUE HANDLER FOR NOT FOUND SET done = 1",
            ]
        );
        assert_eq!(unit.declarations[3].kind, DeclarationKind::Other);
        assert!(unit.error_handling.is_none());
    }

    #[test]
    fn functions_with_characteristics() {
        let unit = segment(
            "CREATE DEFINER=`root`@`%` FUNCTION f(x INT) RETURNS INT DETERMINISTIC READS SQL DATA RETURN x + 1;",
        )
        .unwrap();
        assert_eq!(unit.header.kind, RoutineKind::Function);
        assert_eq!(unit.header.returns, Some(Returns::Scalar("INT".to_owned())));
        assert_eq!(
            unit.header.attributes,
            vec!["DEFINER=`root`@`%`", "DETERMINISTIC", "READS SQL DATA"]
        );
        assert!(matches!(&unit.body[..], [Stmt::Simple(f)] if f.text == "RETURN x + 1"));
    }

    #[test]
    fn exit_handler_for_sqlstate_keeps_condition() {
        let unit = segment(
            "CREATE PROCEDURE p() BEGIN DECLARE EXIT HANDLER FOR SQLSTATE '23000' SELECT 'dup'; INSERT INTO t VALUES (1); END",
        )
        .unwrap();
        let handler = unit.error_handling.unwrap();
        assert_eq!(handler.condition.as_deref(), Some("SQLSTATE '23000'"));
        assert_eq!(handler.statements.len(), 1);
        assert_eq!(unit.body.len(), 1);
    }

    #[test]
    fn labeled_bodies_keep_their_label() {
        let unit = segment(
            "DELIMITER $$\nCREATE PROCEDURE p(IN p_id INT)\nbody: BEGIN\n    IF p_id IS NULL THEN\n        LEAVE body;\n    END IF;\n    SELECT p_id;\nEND body$$\nDELIMITER ;",
        )
        .unwrap();
        assert_eq!(unit.terminator.label.as_deref(), Some("body"));
        assert_eq!(unit.body.len(), 2);
        assert!(unit.terminator.trailing.is_none());
    }
}
