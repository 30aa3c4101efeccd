//! Statement shapes that differ between dialects: calling other routines,
//! result sets, `TOP` and `LIMIT`, `RETURN`, messages and loop control.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::{
    dialect::{ConversionDirection, Dialect},
    unit::{RoutineKind, VariableKind},
    util::{matching_paren, split_top_level, squish},
};

use super::{
    naming::{routine_name, split_qualified, strip_prefix},
    sites::find_top_level,
    variables::{finish, target_name},
    CapturesFn, Matcher, Region, Replacement, Replacer, RewriteContext, RewriteRule,
};

/// The label on a MySQL procedure body, so that `RETURN` can become `LEAVE`.
pub(crate) const BODY_LABEL: &str = "routine_body";

/// Reading back an identity value just after an `INSERT`.
const IDENTITY_ASSIGNMENT: &str = r"(?is)^(?:SET\s+(?P<set>@?\w+)\s*=\s*(?:SCOPE_IDENTITY\s*\(\s*\)|@@IDENTITY|LAST_INSERT_ID\s*\(\s*\))|SELECT\s+LAST_INSERT_ID\s*\(\s*\)\s+INTO\s+(?P<into>\w+))$";

static IDENTITY_TARGET: Lazy<Regex> = Lazy::new(|| Regex::new(IDENTITY_ASSIGNMENT).unwrap());

pub(super) fn rules(direction: ConversionDirection) -> Vec<RewriteRule> {
    let body = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::BodyStatement, order, Matcher::pattern(re), Replacer::Captures(f))
    };
    let source = direction.source;
    let target = direction.target;

    let mut rules = vec![
        body("return", 36, r"(?is)^RETURN(?:\s+(?P<expr>.+))?$", return_statement),
        body("cursor", 60, r"(?is)^(?:OPEN|FETCH|CLOSE|DEALLOCATE)\s+.+$", |_, _| {
            Replacement::unsupported("cursors are not translated")
        }),
    ];
    if target == Dialect::PostgreSql {
        rules.push(body("result_set", 50, r"(?is)^(?:SELECT|WITH)\b.+$", result_set));
        if source != Dialect::PostgreSql {
            rules.push(RewriteRule::new(
                "insert_identity",
                direction,
                Region::BodyStatement,
                0,
                Matcher::adjacent(r"(?is)^INSERT\s+INTO\b.+$", IDENTITY_ASSIGNMENT),
                Replacer::Pair(insert_identity),
            ));
        }
    }

    match source {
        Dialect::SqlServer => {
            if target == Dialect::PostgreSql {
                rules.push(body(
                    "row_count",
                    9,
                    r"(?is)^SET\s+@(?P<var>\w+)\s*=\s*@@ROWCOUNT$",
                    row_count,
                ));
            }
            rules.push(body(
                "session_option",
                20,
                r"(?is)^SET\s+(?P<option>NOCOUNT|XACT_ABORT|ANSI_\w+|ARITHABORT|QUOTED_IDENTIFIER|CONCAT_NULL_YIELDS_NULL|DATEFORMAT|DATEFIRST|LOCK_TIMEOUT|DEADLOCK_PRIORITY|ROWCOUNT|TRANSACTION\s+ISOLATION\s+LEVEL)\b.*$",
                session_option,
            ));
            rules.push(body("exec", 30, r"(?is)^EXEC(?:UTE)?\b\s*(?P<rest>.*)$", exec));
            rules.push(body("print", 32, r"(?is)^PRINT\s+(?P<expr>.+)$", print));
            rules.push(body("break", 37, r"(?is)^BREAK$", |_, ctx| match ctx.direction.target {
                Dialect::PostgreSql => Replacement::text("EXIT"),
                _ => Replacement::unsupported("BREAK needs a loop label in MySQL"),
            }));
            if target == Dialect::MySql {
                rules.push(body("continue", 38, r"(?is)^CONTINUE$", |_, _| {
                    Replacement::unsupported("CONTINUE needs a loop label in MySQL")
                }));
                rules.push(body("merge", 46, r"(?is)^MERGE\b.+$", |_, _| {
                    Replacement::unsupported("MySQL has no MERGE statement")
                }));
            }
            rules.push(body(
                "top",
                40,
                r"(?is)^SELECT\s+(?P<distinct>DISTINCT\s+)?TOP\s*(?:\((?P<paren>[^()]+)\)|(?P<n>\d+|@\w+))(?P<percent>\s+PERCENT)?(?P<ties>\s+WITH\s+TIES)?\s+(?P<rest>.+)$",
                top,
            ));
            rules.push(body("nested_top", 41, r"(?is)\bTOP\s*(?:\([^()]*\)|\d+)", |_, _| {
                Replacement::unsupported("TOP inside a subquery or data modification statement")
            }));
            rules.push(body(
                "output_clause",
                45,
                r"(?is)^(?:INSERT|UPDATE|DELETE|MERGE)\b.*\bOUTPUT\s+(?:INSERTED|DELETED)\..*$",
                |_, _| Replacement::unsupported("OUTPUT clauses are not translated"),
            ));
            rules.push(body("temp_table", 55, r"(?is)^CREATE\s+TABLE\s+(?P<rest>#.+)$", temp_table));
            rules.push(RewriteRule::new(
                "temp_table_name",
                direction,
                Region::BuiltinCall,
                850,
                Matcher::pattern(r"(^|[^\w#@])#(\w+)"),
                Replacer::Template("${1}${2}"),
            ));
            rules.push(body("goto", 70, r"(?is)^(?:GOTO\s+\w+|\w+:)$", |_, _| {
                Replacement::unsupported("labels and GOTO are not translated")
            }));
        }
        Dialect::PostgreSql => {
            rules.push(body(
                "get_diagnostics",
                22,
                r"(?is)^GET\s+(?:CURRENT\s+)?DIAGNOSTICS\s+(?P<var>\w+)\s*:?=\s*ROW_COUNT$",
                get_diagnostics,
            ));
            rules.push(body("other_diagnostics", 23, r"(?is)^GET\s+.+$", |_, _| {
                Replacement::unsupported("GET DIAGNOSTICS items other than ROW_COUNT are not translated")
            }));
            rules.push(body("null_statement", 23, r"(?is)^NULL$", |_, _| Replacement::text("")));
            rules.push(body("dynamic_sql", 24, r"(?is)^EXECUTE\s+.+$", |_, _| {
                Replacement::unsupported("dynamic SQL is not translated")
            }));
            rules.push(body(
                "returning_into",
                25,
                r"(?is)^(?P<insert>INSERT\b.+?)\s+RETURNING\s+(?P<col>[\w.]+)\s+INTO\s+(?:STRICT\s+)?(?P<var>\w+)$",
                returning_into,
            ));
            rules.push(body(
                "returning_other",
                26,
                r"(?is)^(?:INSERT|UPDATE|DELETE)\b.*\bRETURNING\b.*$",
                |_, _| Replacement::unsupported("RETURNING is only translated for a single column INTO a variable"),
            ));
            rules.push(body("perform", 30, r"(?is)^PERFORM\s+(?P<rest>.+)$", perform));
            rules.push(body("call", 31, r"(?is)^CALL\s+(?P<name>[^\s(]+)\s*\((?P<args>.*)\)$", call_statement));
            rules.push(body(
                "raise_notice",
                32,
                r"(?is)^RAISE\s+(?:NOTICE|INFO|LOG|DEBUG|WARNING)\s+(?P<format>\S+)(?:\s*,\s*(?P<args>.+))?$",
                raise_notice,
            ));
            rules.push(body("return_query", 35, r"(?is)^RETURN\s+(?P<kind>QUERY|NEXT)\b\s*(?P<rest>.*)$", return_query));
            rules.push(body(
                "loop_control",
                37,
                r"(?is)^(?P<keyword>EXIT|CONTINUE)(?:\s+(?P<label>\w+))??(?:\s+WHEN\s+(?P<cond>.+))?$",
                loop_control,
            ));
            rules.push(body("assert", 70, r"(?is)^ASSERT\b.*$", |_, _| {
                Replacement::unsupported("ASSERT is not translated")
            }));
        }
        Dialect::MySql => {
            rules.push(body(
                "dynamic_sql",
                24,
                r"(?is)^(?:PREPARE|EXECUTE|DEALLOCATE\s+PREPARE)\s+.+$",
                |_, _| Replacement::unsupported("dynamic SQL is not translated"),
            ));
            rules.push(body("do", 30, r"(?is)^DO\s+(?P<rest>.+)$", perform));
            rules.push(body("call", 31, r"(?is)^CALL\s+(?P<name>[^\s(]+)\s*\((?P<args>.*)\)$", call_statement));
            rules.push(body(
                "leave",
                37,
                r"(?is)^(?P<keyword>LEAVE|ITERATE)\s+(?P<label>\w+)$",
                leave,
            ));
        }
    }

    if source != Dialect::SqlServer {
        rules.push(body(
            "temp_table",
            55,
            r"(?is)^CREATE\s+TEMP(?:ORARY)?\s+TABLE\s+(?P<rest>.+)$",
            temp_table,
        ));
        if target == Dialect::SqlServer {
            rules.push(body(
                "limit",
                40,
                r"(?is)^SELECT\s+(?P<distinct>DISTINCT\s+)?(?P<body>.+?)\s+LIMIT\s+(?P<first>[\w@]+)(?:\s*,\s*(?P<second>[\w@]+))?(?:\s+OFFSET\s+(?P<offset>[\w@]+))?$",
                limit,
            ));
        }
    }
    rules
}

/// Strip a trailing keyword like `OUTPUT` from `text`.
fn strip_trailing_keyword<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let at = text.len().checked_sub(keyword.len())?;
    let tail = text.get(at..)?;
    let head = &text[..at];
    (tail.eq_ignore_ascii_case(keyword) && head.ends_with(char::is_whitespace)).then(|| head.trim_end())
}

fn split_args(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        vec![]
    } else {
        split_top_level(inner, ',')
    }
}

/// `name(args)` and nothing else.
fn single_call(text: &str) -> Option<(&str, Vec<&str>)> {
    let open = text.find('(')?;
    let name = text[..open].trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    if matching_paren(text, open)? + 1 != text.len() {
        return None;
    }
    Some((name, split_args(&text[open + 1..text.len() - 1])))
}

/// Call another routine, the way `target` calls things.
fn call(name: &str, args: &[&str], mut reasons: Vec<String>, ctx: &RewriteContext<'_>) -> Replacement {
    let (schema, routine) = split_qualified(name);
    let name = routine_name(schema.as_deref(), &routine, ctx.direction.target, ctx.config);
    let args = args.join(", ");
    let text = match ctx.direction.target {
        Dialect::SqlServer if args.is_empty() => format!("EXEC {}", name),
        Dialect::SqlServer => format!("EXEC {} {}", name, args),
        Dialect::PostgreSql => {
            reasons.push("assumes the called routine was also converted to a function".to_owned());
            format!("PERFORM {}({})", name, args)
        }
        Dialect::MySql => format!("CALL {}({})", name, args),
    };
    finish(text, reasons)
}

/// `EXEC proc @a = 1, @b OUTPUT`.
fn exec(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let rest = caps["rest"].trim();
    if rest.starts_with('(') {
        return Replacement::unsupported("dynamic SQL through EXEC(...) is not translated");
    }
    if rest.starts_with('@') {
        return Replacement::unsupported("EXEC through a variable or with a return code is not translated");
    }
    let (name, args) = match rest.find(char::is_whitespace) {
        Some(at) => (&rest[..at], rest[at..].trim()),
        None => (rest, ""),
    };
    if name.to_ascii_lowercase().ends_with("sp_executesql") {
        return Replacement::unsupported("dynamic SQL through sp_executesql is not translated");
    }

    let mut reasons: Vec<String> = vec![];
    let mut note = |reason: &str| {
        if !reasons.iter().any(|r| r == reason) {
            reasons.push(reason.to_owned());
        }
    };
    let mut positional = vec![];
    for arg in split_args(args) {
        let mut arg = arg;
        if let Some(stripped) = strip_trailing_keyword(arg, "OUTPUT").or_else(|| strip_trailing_keyword(arg, "OUT")) {
            arg = stripped;
            note("output arguments are passed as plain arguments");
        }
        if let Some((_, value)) = arg.split_once('=').filter(|(param, _)| param.trim().starts_with('@')) {
            arg = value.trim();
            note("named arguments became positional, so they must be in declaration order");
        }
        positional.push(arg);
    }
    call(name, &positional, reasons, ctx)
}

/// `CALL proc(args)`.
fn call_statement(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    call(&caps["name"], &split_args(&caps["args"]), vec![], ctx)
}

/// PL/pgSQL `PERFORM f(x)` and MySQL `DO f(x)`: call something and discard
/// the result.
fn perform(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let rest = caps["rest"].trim();
    match (ctx.direction.target, single_call(rest)) {
        (Dialect::PostgreSql, _) => Replacement::text(format!("PERFORM {}", rest)),
        (Dialect::MySql, Some(_)) => Replacement::text(format!("DO {}", rest)),
        (Dialect::SqlServer, Some((name, args))) => call(
            name,
            &args,
            vec!["assumes the called function was converted to a procedure".to_owned()],
            ctx,
        ),
        (_, None) => Replacement::unsupported("discarding the result of a query has no equivalent"),
    }
}

/// `SET NOCOUNT ON` and friends.
fn session_option(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    let option = squish(&caps["option"]).to_ascii_uppercase();
    match option.as_str() {
        "NOCOUNT" => Replacement::text(""),
        "TRANSACTION ISOLATION LEVEL" => Replacement::text(&caps[0]),
        _ => Replacement::lossy("", format!("SET {} has no equivalent and was dropped", option)),
    }
}

fn print(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let expr = caps["expr"].trim();
    match ctx.direction.target {
        Dialect::PostgreSql => Replacement::text(format!("RAISE NOTICE '%', {}", expr)),
        _ => Replacement::lossy(format!("SELECT {}", expr), "messages become a one-row result set"),
    }
}

fn raise_notice(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let format = &caps["format"];
    let mut reasons = vec![];
    let message = match caps.name("args") {
        None => format.to_owned(),
        Some(args) => {
            reasons.push("% placeholders are not substituted".to_owned());
            format!("CONCAT({}, {})", format, args.as_str().trim())
        }
    };
    let text = match ctx.direction.target {
        Dialect::SqlServer => format!("PRINT {}", message),
        _ => {
            reasons.push("messages become a one-row result set".to_owned());
            format!("SELECT {}", message)
        }
    };
    finish(text, reasons)
}

/// `SET @n = @@ROWCOUNT` in SQL Server.
fn row_count(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let var = target_name(&caps["var"], VariableKind::Local, ctx);
    Replacement::text(format!("GET DIAGNOSTICS {} = ROW_COUNT", var))
}

/// `GET DIAGNOSTICS n = ROW_COUNT` in PL/pgSQL.
fn get_diagnostics(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let var = target_name(&caps["var"], VariableKind::Local, ctx);
    match ctx.direction.target {
        Dialect::SqlServer => Replacement::text(format!("SET {} = @@ROWCOUNT", var)),
        _ => Replacement::text(format!("SET {} = ROW_COUNT()", var)),
    }
}

/// `INSERT ... RETURNING id INTO v`, when the target can't return columns.
fn returning_into(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let var = target_name(&caps["var"], VariableKind::Local, ctx);
    let identity = match ctx.direction.target {
        Dialect::SqlServer => "SCOPE_IDENTITY()",
        _ => "LAST_INSERT_ID()",
    };
    Replacement::lossy(
        format!("{};\nSET {} = {}", caps["insert"].trim(), var, identity),
        format!("assumes {} is an identity column", &caps["col"]),
    )
}

/// An `INSERT` followed by reading back the new identity value becomes one
/// `INSERT ... RETURNING ... INTO`.
fn insert_identity(insert: &str, assignment: &str, ctx: &RewriteContext<'_>) -> Replacement {
    let Some(var) = IDENTITY_TARGET
        .captures(assignment)
        .and_then(|caps| caps.name("set").or_else(|| caps.name("into")))
    else {
        return Replacement::unsupported("unrecognized identity assignment");
    };
    if find_top_level(insert, "RETURNING").is_some() || find_top_level(insert, "SELECT").is_some() {
        return Replacement::unsupported("INSERT may not insert exactly one row");
    }
    let var = var.as_str();
    let column = strip_prefix(var.trim_start_matches('@'));
    let target = target_name(var, VariableKind::Local, ctx);
    Replacement::lossy(
        format!("{} RETURNING {} INTO {}", insert.trim(), column, target),
        format!("assumes the identity column is named {}", column),
    )
}

/// PL/pgSQL `RETURN QUERY` and `RETURN NEXT`.
fn return_query(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    let rest = caps["rest"].trim();
    if caps["kind"].eq_ignore_ascii_case("NEXT") {
        return Replacement::unsupported("RETURN NEXT has no equivalent");
    }
    if rest.get(..7).map_or(false, |w| w.eq_ignore_ascii_case("EXECUTE")) {
        return Replacement::unsupported("dynamic SQL is not translated");
    }
    Replacement::text(rest)
}

fn return_statement(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let expr = caps.name("expr").map(|m| m.as_str().trim());
    if let Some(first) = expr.and_then(|e| e.split_whitespace().next()) {
        if first.eq_ignore_ascii_case("QUERY") || first.eq_ignore_ascii_case("NEXT") {
            return Replacement::text(&caps[0]);
        }
    }
    let target = ctx.direction.target;
    let exit = match (target, ctx.target_kind) {
        (Dialect::MySql, RoutineKind::Procedure) => format!("LEAVE {}", BODY_LABEL),
        _ => "RETURN".to_owned(),
    };
    let Some(expr) = expr else {
        return Replacement::text(exit);
    };
    if let Some(param) = &ctx.result_parameter {
        let set = match target {
            Dialect::PostgreSql => format!("{} := {}", param, expr),
            _ => format!("SET {} = {}", param, expr),
        };
        return Replacement::text(format!("{};\n{}", set, exit));
    }
    match (target, ctx.target_kind) {
        (Dialect::PostgreSql, _) if ctx.returns_value => Replacement::text(format!("RETURN {}", expr)),
        (Dialect::SqlServer, _) | (Dialect::MySql, RoutineKind::Function) => {
            Replacement::text(format!("RETURN {}", expr))
        }
        _ => Replacement::lossy(exit, "return codes are not translated"),
    }
}

/// A bare query in a procedure body returns a result set to the caller.
fn result_set(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    let statement = &caps[0];
    let is_query = find_top_level(statement, "INTO").is_none()
        && ["INSERT", "UPDATE", "DELETE", "MERGE"]
            .iter()
            .all(|kw| find_top_level(statement, kw).is_none());
    if is_query {
        Replacement::text(format!("RETURN QUERY {}", statement))
    } else {
        Replacement::text(statement)
    }
}

/// PL/pgSQL `EXIT [label] [WHEN cond]` and `CONTINUE ...`.
fn loop_control(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let keyword = caps["keyword"].to_ascii_uppercase();
    if caps.name("label").is_some() {
        return Replacement::unsupported("loop labels are not translated");
    }
    if ctx.direction.target != Dialect::SqlServer {
        return Replacement::unsupported(format!("{} needs a loop label in MySQL", keyword));
    }
    let word = if keyword == "EXIT" { "BREAK" } else { "CONTINUE" };
    match caps.name("cond") {
        Some(cond) => Replacement::text(format!("IF {} {}", cond.as_str().trim(), word)),
        None => Replacement::text(word),
    }
}

/// MySQL `LEAVE` of the routine body is an early return. Other labels are
/// loops, which we don't translate.
fn leave(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let leaves_body = caps["keyword"].eq_ignore_ascii_case("LEAVE")
        && ctx
            .body_label
            .as_deref()
            .map_or(false, |label| label.eq_ignore_ascii_case(&caps["label"]));
    if leaves_body {
        Replacement::text("RETURN")
    } else {
        Replacement::unsupported("loop labels are not translated")
    }
}

/// `SELECT TOP n ...` into `SELECT ... LIMIT n`.
fn top(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    if caps.name("percent").is_some() || caps.name("ties").is_some() {
        return Replacement::unsupported("TOP ... PERCENT and WITH TIES have no LIMIT equivalent");
    }
    let rest = caps["rest"].trim();
    if find_top_level(rest, "UNION").is_some() {
        return Replacement::unsupported("TOP on a UNION is not translated");
    }
    let count = caps
        .name("paren")
        .or_else(|| caps.name("n"))
        .map_or("", |m| m.as_str().trim());
    let distinct = if caps.name("distinct").is_some() { "DISTINCT " } else { "" };
    Replacement::text(format!("SELECT {}{} LIMIT {}", distinct, rest, count))
}

/// `SELECT ... LIMIT n [OFFSET m]` into `TOP` or `OFFSET ... FETCH`.
fn limit(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    let body = caps["body"].trim();
    if find_top_level(body, "UNION").is_some() {
        return Replacement::unsupported("LIMIT on a UNION is not translated");
    }
    let distinct = if caps.name("distinct").is_some() { "DISTINCT " } else { "" };
    let first = &caps["first"];
    let (count, offset) = match (caps.name("second"), caps.name("offset")) {
        (Some(count), _) => (count.as_str(), Some(first)),
        (None, Some(offset)) => (first, Some(offset.as_str())),
        (None, None) => (first, None),
    };
    match offset {
        None => Replacement::text(format!("SELECT {}TOP ({}) {}", distinct, count, body)),
        Some(offset) if find_top_level(body, "ORDER").is_some() => Replacement::text(format!(
            "SELECT {}{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            distinct, body, offset, count
        )),
        Some(_) => Replacement::unsupported("OFFSET without ORDER BY has no SQL Server equivalent"),
    }
}

/// Temporary tables: `#name` in SQL Server, `CREATE TEMP TABLE` elsewhere.
fn temp_table(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let rest = caps["rest"].trim();
    match ctx.direction.target {
        Dialect::SqlServer => Replacement::unsupported("temporary tables need # names in SQL Server"),
        Dialect::PostgreSql => Replacement::text(format!("CREATE TEMP TABLE {}", rest)),
        Dialect::MySql => Replacement::text(format!("CREATE TEMPORARY TABLE {}", rest)),
    }
}

#[cfg(test)]
mod test {
    use crate::{config::EngineConfig, rules::Masked};

    use super::*;

    fn run(ctx: &RewriteContext<'_>, text: &str) -> String {
        let direction = ctx.direction;
        let (masked, mut text) = Masked::new(text, direction.source);
        let mut rules = rules(direction);
        rules.sort_by_key(|r| r.order);
        for rule in rules.iter().filter(|r| r.region == Region::BodyStatement) {
            text = rule.apply(&text, &masked, ctx).text;
        }
        masked.restore(&text, direction)
    }

    fn dir(source: Dialect, target: Dialect) -> ConversionDirection {
        ConversionDirection::new(source, target).unwrap()
    }

    #[test]
    fn calls_use_the_target_call_syntax() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::MySql), &config);
        assert_eq!(
            run(&ctx, "EXEC dbo.UpdateStock @ProductId = 5, @Remaining OUTPUT"),
            "CALL UpdateStock(5, @Remaining)"
        );
        assert_eq!(run(&ctx, "EXEC (@sql)"), "EXEC (@sql)");

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config);
        assert_eq!(run(&ctx, "PERFORM log_event(1, v_id)"), "EXEC log_event 1, v_id");
        assert_eq!(run(&ctx, "CALL public.refresh()"), "EXEC refresh");

        let ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::PostgreSql), &config);
        assert_eq!(run(&ctx, "CALL audit(v_id)"), "PERFORM audit(v_id)");
    }

    #[test]
    fn top_and_limit() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config);
        assert_eq!(
            run(&ctx, "SELECT TOP 5 Name FROM Products ORDER BY Price DESC"),
            "RETURN QUERY SELECT Name FROM Products ORDER BY Price DESC LIMIT 5"
        );
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::MySql), &config);
        assert_eq!(run(&ctx, "SELECT TOP (10) PERCENT * FROM t"), "SELECT TOP (10) PERCENT * FROM t");

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config);
        assert_eq!(
            run(&ctx, "SELECT id FROM t ORDER BY id LIMIT 10 OFFSET 20"),
            "SELECT id FROM t ORDER BY id OFFSET 20 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        let ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::SqlServer), &config);
        assert_eq!(run(&ctx, "SELECT DISTINCT name FROM t LIMIT 1"), "SELECT DISTINCT TOP (1) name FROM t");
        assert_eq!(run(&ctx, "SELECT name FROM t LIMIT 5, 10"), "SELECT name FROM t LIMIT 5, 10");
    }

    #[test]
    fn returns_follow_the_target_routine_shape() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config);
        assert_eq!(run(&ctx, "RETURN 0"), "RETURN");
        assert_eq!(run(&ctx, "RETURN"), "RETURN");

        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::MySql), &config);
        assert_eq!(run(&ctx, "RETURN"), "LEAVE routine_body");

        let mut ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config);
        ctx.result_parameter = Some("@Result".to_owned());
        assert_eq!(run(&ctx, "RETURN v_total * 2"), "SET @Result = v_total * 2;\nRETURN");
        assert_eq!(run(&ctx, "RETURN QUERY SELECT id FROM t"), "SELECT id FROM t");
        assert_eq!(run(&ctx, "RETURN NEXT r"), "RETURN NEXT r");

        let mut ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::MySql), &config);
        ctx.target_kind = RoutineKind::Function;
        assert_eq!(run(&ctx, "RETURN v_total"), "RETURN v_total");
    }

    #[test]
    fn messages_options_and_loop_control() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config);
        assert_eq!(run(&ctx, "SET NOCOUNT ON"), "");
        assert_eq!(run(&ctx, "PRINT @Message"), "RAISE NOTICE '%', @Message");
        assert_eq!(run(&ctx, "BREAK"), "EXIT");
        assert_eq!(run(&ctx, "CREATE TABLE #Totals (Id INT)"), "CREATE TEMP TABLE #Totals (Id INT)");

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::SqlServer), &config);
        assert_eq!(run(&ctx, "EXIT WHEN v_done"), "IF v_done BREAK");
        assert_eq!(run(&ctx, "GET DIAGNOSTICS v_rows = ROW_COUNT"), "SET @Rows = @@ROWCOUNT");
        assert_eq!(run(&ctx, "NULL"), "");

        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::MySql), &config);
        assert_eq!(run(&ctx, "BREAK"), "BREAK");
        assert_eq!(run(&ctx, "OPEN order_cursor"), "OPEN order_cursor");
    }

    #[test]
    fn leaving_the_body_label_returns() {
        let config = EngineConfig::default();
        let mut ctx = RewriteContext::new(dir(Dialect::MySql, Dialect::PostgreSql), &config);
        ctx.body_label = Some("proc_body".to_owned());
        assert_eq!(run(&ctx, "LEAVE proc_body"), "RETURN");
        assert_eq!(run(&ctx, "LEAVE read_loop"), "LEAVE read_loop");
        assert_eq!(run(&ctx, "ITERATE proc_body"), "ITERATE proc_body");
    }

    #[test]
    fn identity_reads_merge_into_returning() {
        let config = EngineConfig::default();
        let ctx = RewriteContext::new(dir(Dialect::SqlServer, Dialect::PostgreSql), &config)
            .with_variable("ProductId", VariableKind::Local);
        let rules = rules(ctx.direction);
        let rule = rules.iter().find(|r| r.is_adjacent()).unwrap();
        let merged = rule
            .apply_pair("INSERT INTO Products (Name) VALUES (@Name)", "SET @ProductId = SCOPE_IDENTITY()", &ctx)
            .unwrap();
        assert_eq!(
            merged,
            Replacement::lossy(
                "INSERT INTO Products (Name) VALUES (@Name) RETURNING ProductId INTO product_id",
                "assumes the identity column is named ProductId"
            )
        );
        assert!(rule.apply_pair("UPDATE Products SET x = 1", "SET @ProductId = SCOPE_IDENTITY()", &ctx).is_none());

        let ctx = RewriteContext::new(dir(Dialect::PostgreSql, Dialect::MySql), &config);
        assert_eq!(
            run(&ctx, "INSERT INTO orders (total) VALUES (1) RETURNING id INTO v_order_id"),
            "INSERT INTO orders (total) VALUES (1);\nSET v_order_id = LAST_INSERT_ID()"
        );
    }
}
