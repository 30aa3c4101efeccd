//! Segmenting PL/pgSQL functions and procedures.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    dialect::Dialect,
    errors::{Error, Result},
    tokenizer::{tokenize, tokenize_range, TokenKind},
    unit::{
        Declaration, DeclarationKind, ErrorHandling, Header, ParamMode, Parameter, ProcedureUnit,
        Returns, RoutineKind, Stmt, Terminator,
    },
    util::squish,
};

use super::{
    blocks::{exception_handler, statements},
    preamble,
    scanner::{qualified_name, Source},
};

/// Keywords that start a routine attribute, after the parameter list.
static ATTRIBUTE_KEYWORDS: &[&str] = &[
    "LANGUAGE", "IMMUTABLE", "STABLE", "VOLATILE", "STRICT", "COST", "ROWS", "PARALLEL",
    "SECURITY", "EXTERNAL", "CALLED", "LEAKPROOF", "NOT", "WINDOW", "SET", "SUPPORT", "AS",
    "RETURNS",
];

pub(super) fn segment(sql: &str) -> Result<ProcedureUnit> {
    let src = Source::new(sql, Dialect::PostgreSql, tokenize(sql, Dialect::PostgreSql)?);

    let (create, kind_at, or_replace) = find_header(&src).ok_or_else(|| {
        Error::malformed(
            sql,
            0..sql.len(),
            "no CREATE FUNCTION or CREATE PROCEDURE header found",
        )
    })?;
    let kind = if src.kw(kind_at, "FUNCTION") {
        RoutineKind::Function
    } else {
        RoutineKind::Procedure
    };
    let (schema, name, mut i) = qualified_name(&src, kind_at + 1)?;
    let header_text = squish(&src.fragment(create..i).text);

    if !src.punct(i, "(") {
        return Err(src.malformed(i, "expected `(` after the routine name"));
    }
    let close = matching_paren(&src, i)?;
    let parameters = parameter_list(&src, i + 1..close)?;
    i = close + 1;

    // RETURNS, attributes and the body, in any order.
    let mut returns = None;
    let mut attributes = vec![];
    let mut terminator = Terminator::default();
    let mut body = None;
    while i < src.len() && !src.punct(i, ";") {
        if src.kw(i, "RETURNS") && !src.kw(i + 1, "NULL") {
            let end = next_attribute(&src, i + 1);
            returns = Some(classify_returns(&src.fragment(i + 1..end).text));
            i = end;
        } else if src.kw(i, "AS") {
            match src.toks.get(i + 1) {
                Some(t) if t.kind == TokenKind::DollarString => {
                    body = Some(i + 1);
                    i += 2;
                }
                _ => return Err(src.malformed(i, "expected a dollar-quoted routine body")),
            }
        } else if src.kw(i, "LANGUAGE") {
            terminator.language = src.toks.get(i + 1).map(|t| t.text.to_owned());
            i += 2;
        } else {
            let end = next_attribute(&src, i + 1);
            attributes.push(squish(&src.fragment(i..end).text));
            i = end;
        }
    }
    let header_span = src.start_of(create)..src.start_of(i.min(src.len()));
    if src.punct(i, ";") {
        i += 1;
    }
    if i < src.len() {
        terminator.trailing = Some(src.fragment(i..src.len()));
    }

    let body_at = body.ok_or_else(|| src.malformed(create, "routine has no body"))?;
    let dollar = &src.toks[body_at];
    let body_span = dollar
        .dollar_body_span()
        .ok_or_else(|| src.malformed(body_at, "expected a dollar-quoted routine body"))?;
    terminator.dollar_tag = Some(dollar.text[..dollar.text[1..].find('$').unwrap_or(0) + 2].to_owned());

    let inner = Source::new(
        sql,
        Dialect::PostgreSql,
        tokenize_range(sql, body_span.clone(), Dialect::PostgreSql)?,
    );
    let (declarations, body, error_handling) = routine_body(&inner)?;

    Ok(ProcedureUnit {
        dialect: Dialect::PostgreSql,
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
        terminator,
    })
}

fn find_header(src: &Source<'_>) -> Option<(usize, usize, bool)> {
    let routine = ["FUNCTION", "PROCEDURE"];
    (0..src.len()).find_map(|i| {
        if !src.kw(i, "CREATE") {
            None
        } else if src.kw(i + 1, "OR") && src.kw(i + 2, "REPLACE") {
            src.any_kw(i + 3, &routine).then_some((i, i + 3, true))
        } else {
            src.any_kw(i + 1, &routine).then_some((i, i + 1, false))
        }
    })
}

fn matching_paren(src: &Source<'_>, open: usize) -> Result<usize> {
    let mut depth = 0usize;
    for k in open..src.len() {
        if src.punct(k, "(") {
            depth += 1;
        } else if src.punct(k, ")") {
            depth -= 1;
            if depth == 0 {
                return Ok(k);
            }
        }
    }
    Err(src.malformed(open, "unbalanced parentheses in parameter list"))
}

/// Split `( … )` contents on top-level commas, and parse each piece.
pub(super) fn parameter_list(src: &Source<'_>, range: Range<usize>) -> Result<Vec<Parameter>> {
    let mut params = vec![];
    let mut depth = 0i32;
    let mut start = range.start;
    for k in range.clone() {
        if src.punct(k, "(") {
            depth += 1;
        } else if src.punct(k, ")") {
            depth -= 1;
        } else if depth == 0 && src.punct(k, ",") {
            params.push(parameter(src, start..k)?);
            start = k + 1;
        }
    }
    if start < range.end {
        params.push(parameter(src, start..range.end)?);
    }
    Ok(params)
}

/// `[IN | OUT | INOUT] name type [DEFAULT expr | = expr]`, which MySQL shares
/// apart from defaults.
fn parameter(src: &Source<'_>, range: Range<usize>) -> Result<Parameter> {
    let mut i = range.start;
    let mode = if src.kw(i, "OUT") {
        ParamMode::Out
    } else if src.kw(i, "INOUT") {
        ParamMode::InOut
    } else {
        ParamMode::In
    };
    if src.any_kw(i, &["IN", "OUT", "INOUT", "VARIADIC"]) {
        i += 1;
    }
    let name = src
        .toks
        .get(i)
        .filter(|t| matches!(t.kind, TokenKind::Word | TokenKind::QuotedIdent))
        .map(|t| super::scanner::unquote(t.text))
        .ok_or_else(|| src.malformed(i, "expected a parameter name"))?;
    let type_start = i + 1;
    let default_at = (type_start..range.end).find(|&k| src.kw(k, "DEFAULT") || src.punct(k, "="));
    let type_end = default_at.unwrap_or(range.end);
    if type_start >= type_end {
        return Err(src.malformed(i, "expected a parameter type"));
    }
    let whole = src.fragment(range.clone());
    Ok(Parameter {
        name,
        data_type: src.fragment(type_start..type_end).text,
        mode,
        default: default_at.map(|k| src.fragment(k + 1..range.end).text),
        text: whole.text,
        span: whole.span,
    })
}

fn next_attribute(src: &Source<'_>, start: usize) -> usize {
    let mut depth = 0i32;
    for k in start..src.len() {
        if src.punct(k, "(") {
            depth += 1;
        } else if src.punct(k, ")") {
            depth -= 1;
        } else if depth == 0
            && (src.punct(k, ";")
                || src.any_kw(k, ATTRIBUTE_KEYWORDS)
                || src.toks[k].kind == TokenKind::DollarString)
        {
            return k;
        }
    }
    src.len()
}

fn classify_returns(text: &str) -> Returns {
    let upper = squish(text).to_ascii_uppercase();
    if upper == "VOID" {
        Returns::Void
    } else if upper == "REFCURSOR" || upper == "SETOF REFCURSOR" {
        Returns::Cursors
    } else if upper.starts_with("SETOF") || upper.starts_with("TABLE") {
        Returns::ResultSet(text.to_owned())
    } else {
        Returns::Scalar(text.to_owned())
    }
}

/// The regions found inside a dollar-quoted body.
type RoutineBody = (Vec<Declaration>, Vec<Stmt>, Option<ErrorHandling>);

/// `[<<label>>] [DECLARE …] BEGIN … [EXCEPTION …] END [;]`
fn routine_body(src: &Source<'_>) -> Result<RoutineBody> {
    let mut i = 0;
    if src.punct(0, "<") && src.punct(1, "<") {
        while i < src.len() && !src.punct(i, ">") {
            i += 1;
        }
        i += 2;
    }

    let mut declarations = vec![];
    if src.kw(i, "DECLARE") {
        let begin = (i + 1..src.len())
            .find(|&k| src.kw(k, "BEGIN"))
            .ok_or_else(|| src.malformed(i, "DECLARE section without BEGIN"))?;
        let mut start = i + 1;
        for k in i + 1..begin {
            if src.punct(k, ";") {
                if start < k {
                    declarations.push(declaration(src, start..k));
                }
                start = k + 1;
            }
        }
        i = begin;
    }

    if !src.kw(i, "BEGIN") {
        return Err(src.malformed(i, "expected BEGIN"));
    }
    let (end, past) = src.block_end(i)?;
    let mut rest = past;
    while src.punct(rest, ";") || (rest < src.len() && src.toks[rest].kind == TokenKind::Word) {
        rest += 1;
    }
    if rest < src.len() {
        return Err(src.malformed(rest, "unexpected text after the routine body"));
    }

    let inner = i + 1..end;
    let exception = src.find_at_depth0(inner.clone(), |s, k| {
        s.kw(k, "EXCEPTION") && s.statement_start(k)
    })?;
    let (body, error_handling) = match exception {
        Some(exc) => (
            statements(src, inner.start..exc)?,
            Some(exception_handler(src, exc + 1..end)?),
        ),
        None => (statements(src, inner)?, None),
    };
    Ok((declarations, body, error_handling))
}

/// One PL/pgSQL declaration, like `total numeric := 0`.
fn declaration(src: &Source<'_>, range: Range<usize>) -> Declaration {
    static SHAPE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?is)^(\w+)\s+(?:CONSTANT\s+)?(.*)$").unwrap()
    });
    static CURSOR: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?i)^(?:NO\s+)?(?:SCROLL\s+)?(?:CURSOR\b|REFCURSOR\b)").unwrap());
    static OTHER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(?:ALIAS\b|RECORD\b)").unwrap());

    let frag = src.fragment(range);
    let (name, rest) = match SHAPE.captures(&frag.text) {
        Some(caps) => (caps[1].to_owned(), caps[2].to_owned()),
        None => (frag.text.clone(), String::new()),
    };
    let kind = if CURSOR.is_match(&rest) {
        DeclarationKind::Cursor
    } else if OTHER.is_match(&rest) || rest.is_empty() {
        DeclarationKind::Other
    } else {
        DeclarationKind::Variable
    };
    Declaration {
        name,
        kind,
        text: frag.text,
        span: frag.span,
    }
}
