//! Variable references, local declarations and assignments.
//!
//! Statement-shaped rules here write target variable names themselves, since
//! the left side of an assignment must never be qualified. The renaming rules
//! run last, over every expression, and only touch names the unit declares.

use regex::Captures;

use crate::{
    dialect::{ConversionDirection, Dialect},
    unit::VariableKind,
    util::split_top_level,
};

use super::{
    naming::variable_name, sites::find_top_level, types, CapturesFn, Matcher, Region, Replacement,
    Replacer, RewriteContext, RewriteRule,
};

const SQLSERVER_DECLARATION: &str =
    r"(?is)^DECLARE\s+@(?P<name>\w+)\s+(?:AS\s+)?(?P<type>.+?)(?:\s*=\s*(?P<init>.+))?$";
const POSTGRES_DECLARATION: &str = r"(?is)^(?P<name>\w+)\s+(?P<constant>CONSTANT\s+)?(?P<type>.+?)(?P<notnull>\s+NOT\s+NULL)?(?:\s*(?::=|=|\bDEFAULT\b)\s*(?P<init>.+))?$";
const MYSQL_DECLARATION: &str =
    r"(?is)^DECLARE\s+(?P<name>\w+)\s+(?P<type>.+?)(?:\s+DEFAULT\s+(?P<init>.+))?$";

pub(super) fn rules(direction: ConversionDirection) -> Vec<RewriteRule> {
    let mut rules = vec![RewriteRule::new(
        "local_declaration",
        direction,
        Region::Declaration,
        0,
        Matcher::pattern(match direction.source {
            Dialect::SqlServer => SQLSERVER_DECLARATION,
            Dialect::PostgreSql => POSTGRES_DECLARATION,
            Dialect::MySql => MYSQL_DECLARATION,
        }),
        Replacer::Captures(declaration),
    )];

    let body = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::BodyStatement, order, Matcher::pattern(re), Replacer::Captures(f))
    };
    let expr = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::BuiltinCall, order, Matcher::pattern(re), Replacer::Captures(f))
    };
    match direction.source {
        Dialect::SqlServer => {
            rules.push(body(
                "select_assignment",
                10,
                r"(?is)^SELECT\s+(?P<top>TOP\s*\(?\s*\d+\s*\)?\s+)?(?P<rest>@\w+\s*=.+)$",
                select_assignment,
            ));
            rules.push(body(
                "set_assignment",
                11,
                r"(?is)^SET\s+@(?P<name>\w+)\s*(?P<op>[-+*/%&|^]?)=\s*(?P<expr>.+)$",
                set_assignment,
            ));
            rules.push(expr("variable_reference", 900, r"(^|[^@\w])@(\w+)", sigil_reference));
        }
        Dialect::PostgreSql => {
            rules.push(body(
                "select_into",
                10,
                r"(?is)^SELECT\s+(?P<body>.+)$",
                select_into,
            ));
            rules.push(body(
                "colon_assignment",
                11,
                r"(?is)^(?P<name>[\w.]+)\s*:?=\s*(?P<expr>.+)$",
                colon_assignment,
            ));
            rules.push(expr(
                "qualified_parameter",
                890,
                r"(^|[^.\w])(\w+)\.(\w+)\b",
                qualified_parameter,
            ));
            rules.push(expr(
                "variable_reference",
                900,
                r#"([@.$"`\[0-9]*)([A-Za-z_]\w*)(\s*\()?"#,
                bare_reference,
            ));
        }
        Dialect::MySql => {
            rules.push(body(
                "select_into",
                10,
                r"(?is)^SELECT\s+(?P<body>.+)$",
                select_into,
            ));
            rules.push(body("set_assignment", 11, r"(?is)^SET\s+(?P<list>.+)$", set_list));
            rules.push(expr("session_variable", 5, r"(^|[^@\w])(@\w+)", session_variable));
            rules.push(expr(
                "variable_reference",
                900,
                r#"([@.$"`\[0-9]*)([A-Za-z_]\w*)(\s*\()?"#,
                bare_reference,
            ));
        }
    }
    rules
}

/// The target name of a variable, whether or not the unit declared it.
pub(super) fn target_name(name: &str, kind: VariableKind, ctx: &RewriteContext<'_>) -> String {
    ctx.assignee(name)
        .unwrap_or_else(|| variable_name(name, kind, ctx.direction))
}

pub(super) fn finish(text: String, reasons: Vec<String>) -> Replacement {
    if reasons.is_empty() {
        Replacement::text(text)
    } else {
        Replacement::lossy(text, reasons.join("; "))
    }
}

fn declaration(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = &caps["name"];
    if name.eq_ignore_ascii_case("DECLARE") {
        // Already in DECLARE form, so not PL/pgSQL.
        return Replacement::text(&caps[0]);
    }
    let name = target_name(name, VariableKind::Local, ctx);
    let (data_type, reason) = types::translate(&caps["type"], ctx.direction);
    let mut reasons = reason.into_iter().collect::<Vec<_>>();
    let init = caps.name("init").map(|m| m.as_str().trim());
    let constant = caps.name("constant").is_some();
    if caps.name("notnull").is_some() {
        reasons.push("NOT NULL on a variable has no equivalent".to_owned());
    }
    let text = match ctx.direction.target {
        Dialect::PostgreSql => {
            let init = init.map(|i| format!(" := {}", i)).unwrap_or_default();
            format!("{} {}{}", name, data_type, init)
        }
        Dialect::MySql => {
            if constant {
                reasons.push("constants become ordinary variables".to_owned());
            }
            let init = init.map(|i| format!(" DEFAULT {}", i)).unwrap_or_default();
            format!("DECLARE {} {}{}", name, data_type, init)
        }
        Dialect::SqlServer => {
            if constant {
                reasons.push("constants become ordinary variables".to_owned());
            }
            let init = init.map(|i| format!(" = {}", i)).unwrap_or_default();
            format!("DECLARE {} {}{}", name, data_type, init)
        }
    };
    finish(text, reasons)
}

fn assignment(name: &str, expr: &str, ctx: &RewriteContext<'_>) -> String {
    match ctx.direction.target {
        Dialect::PostgreSql => format!("{} := {}", name, expr),
        _ => format!("SET {} = {}", name, expr),
    }
}

/// `SET @x = ...`, and compound forms like `SET @x += ...`.
fn set_assignment(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let source = &caps["name"];
    let name = target_name(source, VariableKind::Local, ctx);
    let expr = caps["expr"].trim();
    let expr = match &caps["op"] {
        "" => expr.to_owned(),
        op => format!("@{} {} ({})", source, op, expr),
    };
    Replacement::text(assignment(&name, &expr, ctx))
}

/// `SELECT @a = x, @b = y FROM ...` into `SELECT x, y INTO a, b FROM ...`.
fn select_assignment(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let rest = &caps["rest"];
    let (list, tail) = match find_top_level(rest, "FROM") {
        Some(at) => (&rest[..at], rest[at..].trim()),
        None => (rest, ""),
    };
    let mut exprs = vec![];
    let mut names = vec![];
    for item in split_top_level(list, ',') {
        let Some((var, expr)) = item.split_once('=') else {
            return Replacement::unsupported("SELECT mixes variable assignments and result columns");
        };
        let var = var.trim();
        if !var.starts_with('@') {
            return Replacement::unsupported("SELECT mixes variable assignments and result columns");
        }
        names.push(target_name(var, VariableKind::Local, ctx));
        exprs.push(expr.trim().to_owned());
    }
    let mut text = format!("SELECT {} INTO {}", exprs.join(", "), names.join(", "));
    if !tail.is_empty() {
        text = format!("{} {}", text, tail);
    }
    if let Some(top) = caps.name("top") {
        let n = top
            .as_str()
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>();
        text = format!("{} LIMIT {}", text, n);
    }
    Replacement::text(text)
}

/// Clause keywords that can end an `INTO` target list.
const AFTER_INTO: &[&str] = &["FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "UNION", "FOR"];

/// `SELECT x, y INTO a, b FROM ...` into SQL Server's `SELECT @a = x, ...`.
/// PostgreSQL and MySQL share this syntax, so only SQL Server targets change.
fn select_into(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let whole = &caps[0];
    if ctx.direction.target != Dialect::SqlServer {
        return Replacement::text(whole);
    }
    let body = &caps["body"];
    let Some(into) = find_top_level(body, "INTO") else {
        return Replacement::text(whole);
    };
    let after = &body[into + "INTO".len()..];
    let end = AFTER_INTO
        .iter()
        .filter_map(|kw| find_top_level(after, kw))
        .min()
        .unwrap_or(after.len());
    let mut targets = after[..end].trim();
    let mut reasons = vec![];
    if let Some(rest) = targets.strip_prefix("STRICT ").or_else(|| targets.strip_prefix("strict ")) {
        targets = rest.trim();
        reasons.push("STRICT row count checking is not translated".to_owned());
    }
    let before = &body[..into];
    let (list, middle) = match find_top_level(before, "FROM") {
        Some(at) => (&before[..at], before[at..].trim()),
        None => (before, ""),
    };
    let exprs = split_top_level(list, ',');
    let names = split_top_level(targets, ',');
    if exprs.len() != names.len() {
        return Replacement::unsupported("SELECT INTO with a different number of columns and variables");
    }
    let assignments = names
        .iter()
        .zip(&exprs)
        .map(|(name, expr)| format!("{} = {}", target_name(name, VariableKind::Local, ctx), expr))
        .collect::<Vec<_>>()
        .join(", ");
    let tail = [middle, after[end..].trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let text = if tail.is_empty() {
        format!("SELECT {}", assignments)
    } else {
        format!("SELECT {} {}", assignments, tail)
    };
    finish(text, reasons)
}

/// PL/pgSQL `x := ...`.
fn colon_assignment(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = &caps["name"];
    let name = match name.split_once('.') {
        Some((routine, param)) if routine.eq_ignore_ascii_case(&ctx.source_routine) => param,
        Some(_) => return Replacement::unsupported("assignment to a record field"),
        None => name,
    };
    let name = target_name(name, VariableKind::Local, ctx);
    Replacement::text(assignment(&name, caps["expr"].trim(), ctx))
}

/// MySQL `SET a = 1, b = 2`, one assignment per statement in the target.
fn set_list(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let mut out = vec![];
    for item in split_top_level(&caps["list"], ',') {
        let Some((var, expr)) = item.split_once('=') else {
            return Replacement::unsupported("unrecognized SET statement");
        };
        let var = var.trim().trim_end_matches(':');
        if var.starts_with('@') {
            return Replacement::unsupported("MySQL session variables have no equivalent");
        }
        if ctx.variable(var).is_none() && var.contains(|c: char| c.is_whitespace()) {
            return Replacement::unsupported("session settings have no equivalent");
        }
        let name = target_name(var, VariableKind::Local, ctx);
        out.push(assignment(&name, expr.trim(), ctx));
    }
    Replacement::text(out.join(";\n"))
}

/// `@name` in SQL Server source.
fn sigil_reference(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let prefix = &caps[1];
    match ctx.reference(&caps[2]) {
        Some(reference) => Replacement::text(format!("{}{}", prefix, reference)),
        None if ctx.direction.target == Dialect::PostgreSql => {
            Replacement::unsupported(format!("undeclared variable @{}", &caps[2]))
        }
        None => Replacement::lossy(&caps[0], "undeclared variable kept as a MySQL session variable"),
    }
}

/// A bare name in PostgreSQL or MySQL source. Only declared names change.
///
/// The leading group soaks up anything that makes the name part of something
/// else (`@x`, `t.x`, `"x"`, `[x]`, `1e5`), and the match never extends past
/// a call's `(`, so the first argument of a call is still seen.
fn bare_reference(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let whole = &caps[0];
    if !caps[1].is_empty() || caps.get(3).is_some() {
        // Qualified, quoted, or a function call that shares a variable's name.
        return Replacement::text(whole);
    }
    match ctx.reference(&caps[2]) {
        Some(reference) => Replacement::text(reference),
        None => Replacement::text(whole),
    }
}

/// `routine.param` in PL/pgSQL, which PostgreSQL uses to tell a parameter
/// from a column.
fn qualified_parameter(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let param = &caps[3];
    if caps[2].eq_ignore_ascii_case(&ctx.source_routine) && ctx.variable(param).is_some() {
        if let Some(reference) = ctx.reference(param) {
            return Replacement::text(format!("{}{}", &caps[1], reference));
        }
    }
    Replacement::text(&caps[0])
}

/// MySQL `@name` session variables, which only MySQL has.
fn session_variable(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = &caps[2];
    let ours = ctx.variables().any(|v| v.target.eq_ignore_ascii_case(name))
        || ctx
            .result_parameter
            .as_deref()
            .map_or(false, |p| p.eq_ignore_ascii_case(name));
    if ours {
        // One of ours, already renamed for SQL Server.
        return Replacement::text(&caps[0]);
    }
    Replacement::unsupported(format!("MySQL session variable {} has no equivalent", name))
}

#[cfg(test)]
mod test {
    use crate::{config::EngineConfig, rules::Masked};

    use super::*;

    fn run(ctx: &RewriteContext<'_>, region: Region, text: &str) -> String {
        let direction = ctx.direction;
        let (masked, mut text) = Masked::new(text, direction.source);
        for rule in rules(direction).iter().filter(|r| r.region == region) {
            text = rule.apply(&text, &masked, ctx).text;
        }
        masked.restore(&text, direction)
    }

    fn dir(source: Dialect, target: Dialect) -> ConversionDirection {
        ConversionDirection::new(source, target).unwrap()
    }

    #[test]
    fn declarations_in_every_target_shape() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config)
            .with_variable("Total", VariableKind::Local);
        assert_eq!(run(&ctx, Region::Declaration, "DECLARE @Total DECIMAL(10, 2) = 0"), "total numeric(10, 2) := 0");

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::MySql), &config);
        assert_eq!(run(&ctx, Region::Declaration, "v_count integer := 0"), "DECLARE v_count INT DEFAULT 0");
        assert_eq!(run(&ctx, Region::Declaration, "DECLARE v_count INT DEFAULT 0"), "DECLARE v_count INT DEFAULT 0");

        let ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::SqlServer), &config);
        assert_eq!(run(&ctx, Region::Declaration, "DECLARE v_name VARCHAR(50)"), "DECLARE @Name NVARCHAR(50)");
    }

    #[test]
    fn assignments_and_select_into() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::MySql), &config)
            .with_variable("Total", VariableKind::Local)
            .with_variable("CustomerId", VariableKind::Parameter);
        assert_eq!(
            run(&ctx, Region::BodyStatement, "SELECT @Total = SUM(Amount) FROM Orders WHERE CustomerId = @CustomerId"),
            "SELECT SUM(Amount) INTO v_total FROM Orders WHERE CustomerId = @CustomerId"
        );
        assert_eq!(run(&ctx, Region::BodyStatement, "SET @Total += 1"), "SET v_total = @Total + (1)");
        assert_eq!(run(&ctx, Region::BuiltinCall, "@Total + (1)"), "v_total + (1)");

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config)
            .with_variable("v_total", VariableKind::Local);
        assert_eq!(
            run(&ctx, Region::BodyStatement, "SELECT count(*), max(id) INTO v_total, v_max FROM orders"),
            "SELECT @Total = count(*), @Max = max(id) FROM orders"
        );
        assert_eq!(run(&ctx, Region::BodyStatement, "v_total := v_total + 1"), "SET @Total = v_total + 1");
        assert_eq!(run(&ctx, Region::BuiltinCall, "v_total + 1"), "@Total + 1");

        let ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::PostgreSql), &config);
        assert_eq!(run(&ctx, Region::BodyStatement, "SET a = 1, b = 2"), "a := 1;\nb := 2");
    }

    #[test]
    fn only_declared_names_are_renamed() {
        let config = EngineConfig::default();
        let mut ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config)
            .with_variable("status", VariableKind::Parameter);
        ctx.source_routine = "set_status".to_owned();
        assert_eq!(
            run(&ctx, Region::BuiltinCall, "o.status = set_status.status AND status(x) = 1"),
            "o.status = @Status AND status(x) = 1"
        );

        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config);
        assert_eq!(run(&ctx, Region::BuiltinCall, "@@ROWCOUNT + @Missing"), "@@ROWCOUNT + @Missing");
    }

    #[test]
    fn mysql_session_variables_are_flagged_but_ours_are_not() {
        let config = EngineConfig::default();
        let mut ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::SqlServer), &config)
            .with_variable("v_total", VariableKind::Local);
        ctx.result_parameter = Some("@Result".to_owned());
        let (masked, text) = Masked::new("SET @Result = @Total + @counter", Dialect::MySql);
        let rule = rules(ctx.direction)
            .into_iter()
            .find(|r| r.name == "session_variable")
            .unwrap();
        let outcome = rule.apply(&text, &masked, &ctx);
        assert_eq!(outcome.text, "SET @Result = @Total + @counter");
        let reasons = outcome.notes.iter().map(|n| n.reason.as_str()).collect::<Vec<_>>();
        assert_eq!(reasons, vec!["MySQL session variable @counter has no equivalent"]);
    }

    #[test]
    fn first_call_argument_is_renamed() {
        let config = EngineConfig::default();
        let cases = [
            (Dialect::PostgreSql, Dialect::SqlServer, "customer_id", "@CustomerId"),
            (Dialect::PostgreSql, Dialect::MySql, "customer_id", "p_customer_id"),
            (Dialect::MySql, Dialect::SqlServer, "p_customer_id", "@CustomerId"),
            (Dialect::MySql, Dialect::PostgreSql, "customerId", "customer_id"),
        ];
        for (source, target, name, renamed) in cases {
            let ctx = RewriteContext::new(dir(source, target), &config)
                .with_variable(name, VariableKind::Parameter);
            assert_eq!(
                run(&ctx, Region::BuiltinCall, &format!("ABS({name}) + ROUND({name}, 2), {name}")),
                format!("ABS({renamed}) + ROUND({renamed}, 2), {renamed}"),
                "{source} to {target}",
            );
            assert_eq!(
                run(&ctx, Region::BuiltinCall, &format!("UPPER( {name} )")),
                format!("UPPER( {renamed} )"),
            );
        }
    }
}
