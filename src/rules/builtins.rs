//! Built-in functions, casts and other expression-level syntax.
//!
//! Cast rules run first, while every type name in the text is still a source
//! type. Everything else runs after them and writes target syntax directly.

use regex::Captures;

use crate::{
    dialect::{ConversionDirection, Dialect},
    util::{split_top_level, squish},
};

use super::{
    mask::is_placeholder,
    naming::quote_ident,
    sites::{find_top_level, operand_end, operand_start, split_cast, CallSite, CastSite},
    types,
    variables::finish,
    CallFn, CapturesFn, Matcher, Region, Replacement, Replacer, RewriteContext, RewriteRule,
};

const LASTVAL_NOTE: &str = "lastval() returns the last sequence value used in the session, from any table";

pub(super) fn rules(direction: ConversionDirection) -> Vec<RewriteRule> {
    let call = |name: &'static str, order: u32, f: CallFn| {
        RewriteRule::new(name, direction, Region::BuiltinCall, order, Matcher::Call(name), Replacer::Call(f))
    };
    let pattern = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::BuiltinCall, order, Matcher::pattern(re), Replacer::Captures(f))
    };
    let source = direction.source;
    let target = direction.target;

    let mut rules = vec![call("CAST", 10, cast)];
    if source != Dialect::SqlServer {
        rules.push(call("COALESCE", 30, |site, ctx| match ctx.direction.target {
            Dialect::SqlServer if site.args.len() == 2 => rename(site, "ISNULL"),
            Dialect::SqlServer => {
                Replacement::unsupported("COALESCE with more than two arguments is not rewritten to ISNULL")
            }
            _ => Replacement::text(&site.text),
        }));
    }
    if target == Dialect::SqlServer {
        rules.push(pattern("boolean_literal", 60, r"(?i)(^|[^\w.@])(TRUE|FALSE)\b", boolean_literal));
        rules.push(pattern("current_date", 22, r"(?i)(^|[^\w.@])CURRENT_DATE\b(?:\s*\(\s*\))?", |caps, _| {
            Replacement::text(format!("{}CAST(GETDATE() AS DATE)", &caps[1]))
        }));
    }

    match source {
        Dialect::SqlServer => {
            rules.push(pattern("bracket_identifier", 1, r"\[([^\[\]]+)\]", quoted_identifier));
            rules.push(pattern("quoted_identifier", 1, r#""([^"]+)""#, quoted_identifier));
            rules.push(pattern("default_schema", 2, r"(?i)(^|[^\w.@\]])dbo\.", default_schema));
            rules.push(call("CONVERT", 11, sqlserver_convert));
            rules.push(call("TRY_CAST", 12, |site, ctx| {
                also(cast(site, ctx), "conversion errors are raised instead of returning NULL")
            }));
            rules.push(call("TRY_CONVERT", 12, |site, ctx| {
                also(sqlserver_convert(site, ctx), "conversion errors are raised instead of returning NULL")
            }));
            rules.push(call("ISNULL", 30, |site, _| match site.args.len() {
                2 => rename(site, "COALESCE"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("GETDATE", 20, |_, ctx| now(ctx.direction.target)));
            rules.push(call("SYSDATETIME", 20, |_, ctx| now(ctx.direction.target)));
            rules.push(call("SYSDATETIMEOFFSET", 20, |_, ctx| {
                also(now(ctx.direction.target), "the time zone offset is not kept")
            }));
            rules.push(call("GETUTCDATE", 20, |_, ctx| utc_now(ctx.direction.target)));
            rules.push(call("SYSUTCDATETIME", 20, |_, ctx| utc_now(ctx.direction.target)));
            rules.push(call("SCOPE_IDENTITY", 21, |_, ctx| last_identity(ctx.direction.target)));
            rules.push(call("DATEDIFF", 23, |site, ctx| match (site.args.as_slice(), site.arg(0).and_then(Unit::parse)) {
                ([_, start, end], Some(unit)) => difference(unit, start, end, ctx),
                ([_, _, _], None) => Replacement::unsupported("unknown date part"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("DATEADD", 23, |site, ctx| match (site.args.as_slice(), site.arg(0).and_then(Unit::parse)) {
                ([_, n, date], Some(unit)) => add(unit, n, date, ctx),
                ([_, _, _], None) => Replacement::unsupported("unknown date part"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("DATEPART", 23, |site, ctx| match (site.args.as_slice(), site.arg(0).and_then(Unit::parse)) {
                ([_, date], Some(unit)) => extract(unit, date, ctx),
                ([_, _], None) => Replacement::unsupported("unknown date part"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("EOMONTH", 23, |site, ctx| match site.args.as_slice() {
                [date] => end_of_month(date, ctx.direction.target),
                _ => Replacement::unsupported("EOMONTH with a month offset is not translated"),
            }));
            rules.push(call("LEN", 24, |site, ctx| {
                let name = match ctx.direction.target {
                    Dialect::PostgreSql => "length",
                    _ => "CHAR_LENGTH",
                };
                also(rename(site, name), "LEN ignores trailing spaces")
            }));
            rules.push(call("DATALENGTH", 24, |site, ctx| match ctx.direction.target {
                Dialect::PostgreSql => rename(site, "octet_length"),
                _ => rename(site, "LENGTH"),
            }));
            rules.push(call("NEWID", 24, |_, ctx| new_uuid(ctx.direction.target)));
            rules.push(call("CHARINDEX", 24, |site, ctx| match site.args.as_slice() {
                [needle, haystack] => position(needle, haystack, ctx.direction.target),
                [needle, haystack, start] if ctx.direction.target == Dialect::MySql => {
                    Replacement::text(format!("LOCATE({}, {}, {})", needle, haystack, start))
                }
                _ => Replacement::unsupported("CHARINDEX with a start position is not translated"),
            }));
            rules.push(call("IIF", 24, |site, ctx| match site.args.as_slice() {
                [cond, then, otherwise] => conditional(cond, then, otherwise, ctx.direction.target),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("REPLICATE", 24, |site, _| rename(site, "REPEAT")));
            rules.push(call("RAND", 24, |site, ctx| match ctx.direction.target {
                Dialect::PostgreSql if site.args.is_empty() => Replacement::text("random()"),
                Dialect::PostgreSql => Replacement::unsupported("random() takes no seed"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("STRING_AGG", 24, string_agg));
            if target == Dialect::PostgreSql {
                for name in ["YEAR", "MONTH", "DAY"] {
                    rules.push(call(name, 23, |site, ctx| match (site.args.as_slice(), Unit::parse(&site.name)) {
                        ([date], Some(unit)) => extract(unit, date, ctx),
                        _ => Replacement::text(&site.text),
                    }));
                }
                rules.push(pattern(
                    "rowcount_test",
                    849,
                    r"(?i)@@ROWCOUNT\s*(?P<op>=|>|<>|!=)\s*0\b",
                    |caps, _| {
                        let test = if &caps["op"] == "=" { "NOT FOUND" } else { "FOUND" };
                        Replacement::lossy(test, "FOUND is only set by some statements")
                    },
                ));
            }
            rules.push(pattern("system_function", 850, r"@@(?P<name>\w+)", system_function));
            rules.push(pattern(
                "table_hint",
                40,
                r"(?i)\s*\bWITH\s*\(\s*(?:NOLOCK|READUNCOMMITTED|READCOMMITTED|UPDLOCK|ROWLOCK|HOLDLOCK|READPAST|TABLOCKX?|PAGLOCK|XLOCK|NOWAIT|SERIALIZABLE|REPEATABLEREAD|INDEX\s*\([^()]*\))(?:\s*,\s*(?:\w+|INDEX\s*\([^()]*\)))*\s*\)",
                |_, _| Replacement::lossy("", "table hints were dropped"),
            ));
            rules.push(pattern("query_hint", 40, r"(?i)\s*\bOPTION\s*\([^()]*\)", |_, _| {
                Replacement::lossy("", "query hints were dropped")
            }));
            rules.push(pattern("string_concat", 70, r"(?s)^.*\+.*$", concat_plus));
            for name in ["FORMAT", "DATENAME", "PATINDEX", "STUFF", "CHOOSE", "ISNUMERIC", "OBJECT_ID", "PARSE", "TRY_PARSE"] {
                rules.push(call(name, 80, no_equivalent));
            }
        }
        Dialect::PostgreSql => {
            rules.push(pattern("quoted_identifier", 1, r#""([^"]+)""#, quoted_identifier));
            rules.push(pattern("default_schema", 2, r"(?i)(^|[^\w.@\]])public\.", default_schema));
            rules.push(RewriteRule::new(
                "postfix_cast",
                direction,
                Region::BuiltinCall,
                12,
                Matcher::PostfixCast,
                Replacer::Cast(postfix_cast),
            ));
            for name in ["NOW", "CLOCK_TIMESTAMP", "STATEMENT_TIMESTAMP", "TRANSACTION_TIMESTAMP"] {
                rules.push(call(name, 20, |_, ctx| now(ctx.direction.target)));
            }
            rules.push(call("LASTVAL", 21, |_, ctx| {
                also(last_identity(ctx.direction.target), "assumes the sequence belongs to an identity column")
            }));
            rules.push(call("CURRVAL", 21, |_, ctx| {
                also(last_identity(ctx.direction.target), "assumes the sequence belongs to an identity column")
            }));
            rules.push(call("DATE_PART", 23, |site, ctx| match site.args.as_slice() {
                [unit, expr] => match Unit::parse(&site.string_arg(0).unwrap_or_else(|| unit.clone())) {
                    Some(unit) => part_or_difference(unit, expr, ctx),
                    None => Replacement::unsupported("unknown date part"),
                },
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("EXTRACT", 23, |site, ctx| {
                let inner = site.joined_args();
                let Some(from) = find_top_level(&inner, "FROM") else {
                    return Replacement::text(&site.text);
                };
                match Unit::parse(&inner[..from]) {
                    Some(unit) => part_or_difference(unit, inner[from + 4..].trim(), ctx),
                    None => Replacement::unsupported("unknown date part"),
                }
            }));
            for name in ["LENGTH", "CHAR_LENGTH", "CHARACTER_LENGTH"] {
                rules.push(call(name, 24, |site, ctx| match ctx.direction.target {
                    Dialect::SqlServer => also(rename(site, "LEN"), "LEN ignores trailing spaces"),
                    _ => rename(site, "CHAR_LENGTH"),
                }));
            }
            rules.push(call("OCTET_LENGTH", 24, |site, ctx| match ctx.direction.target {
                Dialect::SqlServer => rename(site, "DATALENGTH"),
                _ => rename(site, "LENGTH"),
            }));
            rules.push(call("GEN_RANDOM_UUID", 24, |_, ctx| new_uuid(ctx.direction.target)));
            rules.push(call("UUID_GENERATE_V4", 24, |_, ctx| new_uuid(ctx.direction.target)));
            rules.push(call("POSITION", 24, |site, ctx| {
                let inner = site.joined_args();
                match find_top_level(&inner, "IN") {
                    Some(at) => position(inner[..at].trim(), inner[at + 2..].trim(), ctx.direction.target),
                    None => Replacement::text(&site.text),
                }
            }));
            rules.push(call("STRPOS", 24, |site, ctx| match site.args.as_slice() {
                [haystack, needle] => position(needle, haystack, ctx.direction.target),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("RANDOM", 24, |_, _| Replacement::text("RAND()")));
            rules.push(call("STRING_AGG", 24, string_agg));
            if target == Dialect::SqlServer {
                rules.push(call("REPEAT", 24, |site, _| rename(site, "REPLICATE")));
            }
            rules.push(pattern("found", 840, r"(?i)(^|[^\w.@])FOUND\b", |caps, ctx| {
                let test = match ctx.direction.target {
                    Dialect::SqlServer => "(@@ROWCOUNT > 0)",
                    _ => "(ROW_COUNT() > 0)",
                };
                Replacement::lossy(format!("{}{}", &caps[1], test), "FOUND is approximated with the last row count")
            }));
            rules.push(pattern("ilike", 40, r"(?i)\bILIKE\b", |_, _| {
                Replacement::lossy("LIKE", "case sensitivity of LIKE depends on the collation")
            }));
            rules.push(pattern("interval_literal", 41, r"(?i)\bINTERVAL\s*[\x{F0000}-\x{10FFFF}]", |_, _| {
                Replacement::unsupported("interval literals are not translated")
            }));
            rules.push(pattern("string_concat", 70, r"(?s)^.*\|\|.*$", concat_pipes));
            for name in [
                "TO_CHAR",
                "TO_DATE",
                "AGE",
                "DATE_TRUNC",
                "ARRAY_AGG",
                "UNNEST",
                "STRING_TO_ARRAY",
                "GENERATE_SERIES",
                "JSONB_BUILD_OBJECT",
                "JSON_BUILD_OBJECT",
            ] {
                rules.push(call(name, 80, no_equivalent));
            }
            if target == Dialect::SqlServer {
                rules.push(call("REGEXP_REPLACE", 80, no_equivalent));
            }
        }
        Dialect::MySql => {
            rules.push(pattern("backtick_identifier", 1, r"`([^`]+)`", quoted_identifier));
            rules.push(call("CONVERT", 11, |site, ctx| match site.args.as_slice() {
                [expr, data_type] => cast_replacement(expr, data_type, ctx),
                _ => Replacement::unsupported("character set conversion is not translated"),
            }));
            rules.push(call("IFNULL", 30, |site, ctx| match ctx.direction.target {
                Dialect::SqlServer => rename(site, "ISNULL"),
                _ => rename(site, "COALESCE"),
            }));
            rules.push(call("ISNULL", 31, |site, ctx| match (site.args.as_slice(), ctx.direction.target) {
                ([value], Dialect::SqlServer) => Replacement::text(format!("IIF({} IS NULL, 1, 0)", value)),
                ([value], _) => Replacement::text(format!("({} IS NULL)", value)),
                _ => Replacement::text(&site.text),
            }));
            for name in ["NOW", "SYSDATE", "CURRENT_TIMESTAMP", "LOCALTIME", "LOCALTIMESTAMP"] {
                rules.push(call(name, 20, |_, ctx| now(ctx.direction.target)));
            }
            rules.push(call("CURDATE", 20, |_, ctx| match ctx.direction.target {
                Dialect::SqlServer => Replacement::text("CAST(GETDATE() AS DATE)"),
                _ => Replacement::text("CURRENT_DATE"),
            }));
            rules.push(call("UTC_TIMESTAMP", 20, |_, ctx| utc_now(ctx.direction.target)));
            rules.push(call("LAST_INSERT_ID", 21, |_, ctx| match ctx.direction.target {
                Dialect::SqlServer => Replacement::text("SCOPE_IDENTITY()"),
                _ => Replacement::lossy("lastval()", LASTVAL_NOTE),
            }));
            rules.push(call("DATEDIFF", 23, |site, ctx| match site.args.as_slice() {
                [end, start] => difference(Unit::Day, start, end, ctx),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("TIMESTAMPDIFF", 23, |site, ctx| match (site.args.as_slice(), site.arg(0).and_then(Unit::parse)) {
                ([_, start, end], Some(unit)) => difference(unit, start, end, ctx),
                _ => Replacement::unsupported("unknown date part"),
            }));
            for name in ["DATE_ADD", "ADDDATE"] {
                rules.push(call(name, 23, |site, ctx| mysql_date_add(site, false, ctx)));
            }
            for name in ["DATE_SUB", "SUBDATE"] {
                rules.push(call(name, 23, |site, ctx| mysql_date_add(site, true, ctx)));
            }
            rules.push(call("DAYOFWEEK", 23, |site, ctx| match site.args.as_slice() {
                [date] => extract(Unit::DayOfWeek, date, ctx),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("DAYOFYEAR", 23, |site, ctx| match site.args.as_slice() {
                [date] => extract(Unit::DayOfYear, date, ctx),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("LAST_DAY", 23, |site, ctx| match site.args.as_slice() {
                [date] => end_of_month(date, ctx.direction.target),
                _ => Replacement::text(&site.text),
            }));
            match target {
                Dialect::SqlServer => rules.push(call("EXTRACT", 23, |site, ctx| {
                    let inner = site.joined_args();
                    let Some(from) = find_top_level(&inner, "FROM") else {
                        return Replacement::text(&site.text);
                    };
                    match Unit::parse(&inner[..from]) {
                        Some(unit) => extract(unit, inner[from + 4..].trim(), ctx),
                        None => Replacement::unsupported("unknown date part"),
                    }
                })),
                _ => {
                    for name in ["YEAR", "MONTH", "DAY"] {
                        rules.push(call(name, 23, |site, ctx| match (site.args.as_slice(), Unit::parse(&site.name)) {
                            ([date], Some(unit)) => extract(unit, date, ctx),
                            _ => Replacement::text(&site.text),
                        }));
                    }
                }
            }
            rules.push(call("CHAR_LENGTH", 24, |site, ctx| match ctx.direction.target {
                Dialect::SqlServer => also(rename(site, "LEN"), "LEN ignores trailing spaces"),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("LENGTH", 24, |site, ctx| match ctx.direction.target {
                Dialect::SqlServer => rename(site, "DATALENGTH"),
                _ => rename(site, "octet_length"),
            }));
            rules.push(call("UUID", 24, |_, ctx| new_uuid(ctx.direction.target)));
            rules.push(call("LOCATE", 24, |site, ctx| match (site.args.as_slice(), ctx.direction.target) {
                ([needle, haystack], target) => position(needle, haystack, target),
                ([_, _, _], Dialect::SqlServer) => rename(site, "CHARINDEX"),
                _ => Replacement::unsupported("LOCATE with a start position is not translated"),
            }));
            rules.push(call("INSTR", 24, |site, ctx| match site.args.as_slice() {
                [haystack, needle] => position(needle, haystack, ctx.direction.target),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("IF", 24, |site, ctx| match site.args.as_slice() {
                [cond, then, otherwise] => conditional(cond, then, otherwise, ctx.direction.target),
                _ => Replacement::text(&site.text),
            }));
            rules.push(call("RAND", 24, |site, ctx| match ctx.direction.target {
                Dialect::PostgreSql if site.args.is_empty() => Replacement::text("random()"),
                Dialect::PostgreSql => Replacement::unsupported("random() takes no seed"),
                _ => Replacement::text(&site.text),
            }));
            if target == Dialect::SqlServer {
                rules.push(call("REPEAT", 24, |site, _| rename(site, "REPLICATE")));
            }
            rules.push(call("GROUP_CONCAT", 24, group_concat));
            rules.push(pattern("null_safe_equals", 40, r"<=>", |_, ctx| match ctx.direction.target {
                Dialect::PostgreSql => Replacement::text("IS NOT DISTINCT FROM"),
                _ => Replacement::unsupported("<=> has no SQL Server equivalent"),
            }));
            rules.push(pattern("system_variable", 850, r"@@[\w.]+", |_, _| {
                Replacement::unsupported("MySQL system variables have no equivalent")
            }));
            for name in [
                "DATE_FORMAT",
                "STR_TO_DATE",
                "FIND_IN_SET",
                "JSON_EXTRACT",
                "JSON_UNQUOTE",
                "FOUND_ROWS",
                "GET_LOCK",
                "RELEASE_LOCK",
            ] {
                rules.push(call(name, 80, no_equivalent));
            }
        }
    }
    rules
}

/// Add a review note to a replacement.
fn also(replacement: Replacement, reason: &str) -> Replacement {
    match replacement {
        Replacement::Text(text) => Replacement::lossy(text, reason),
        Replacement::Lossy { text, reason: first } => Replacement::lossy(text, format!("{}; {}", first, reason)),
        unsupported => unsupported,
    }
}

fn rename(site: &CallSite<'_>, name: &str) -> Replacement {
    Replacement::text(format!("{}({})", name, site.joined_args()))
}

fn no_equivalent(site: &CallSite<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    Replacement::unsupported(format!(
        "{} has no {} equivalent",
        site.name.to_ascii_uppercase(),
        ctx.direction.target.product_name()
    ))
}

fn quoted_identifier(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    Replacement::text(quote_ident(&caps[1], ctx.direction.target))
}

fn default_schema(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    if ctx.config.strip_default_schema {
        Replacement::text(&caps[1])
    } else {
        Replacement::text(&caps[0])
    }
}

fn boolean_literal(caps: &Captures<'_>, _ctx: &RewriteContext<'_>) -> Replacement {
    let value = if caps[2].eq_ignore_ascii_case("TRUE") { "1" } else { "0" };
    Replacement::text(format!("{}{}", &caps[1], value))
}

fn now(target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => "GETDATE()",
        Dialect::PostgreSql => "now()",
        Dialect::MySql => "NOW()",
    })
}

fn utc_now(target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => "GETUTCDATE()",
        Dialect::PostgreSql => "(now() AT TIME ZONE 'utc')",
        Dialect::MySql => "UTC_TIMESTAMP()",
    })
}

fn last_identity(target: Dialect) -> Replacement {
    match target {
        Dialect::SqlServer => Replacement::text("SCOPE_IDENTITY()"),
        Dialect::PostgreSql => Replacement::lossy("lastval()", LASTVAL_NOTE),
        Dialect::MySql => Replacement::text("LAST_INSERT_ID()"),
    }
}

fn new_uuid(target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => "NEWID()",
        Dialect::PostgreSql => "gen_random_uuid()",
        Dialect::MySql => "UUID()",
    })
}

/// Where `needle` first occurs in `haystack`.
fn position(needle: &str, haystack: &str, target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => format!("CHARINDEX({}, {})", needle, haystack),
        Dialect::PostgreSql => format!("position({} IN {})", needle, haystack),
        Dialect::MySql => format!("LOCATE({}, {})", needle, haystack),
    })
}

fn conditional(cond: &str, then: &str, otherwise: &str, target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => format!("IIF({}, {}, {})", cond, then, otherwise),
        Dialect::PostgreSql => format!("CASE WHEN {} THEN {} ELSE {} END", cond, then, otherwise),
        Dialect::MySql => format!("IF({}, {}, {})", cond, then, otherwise),
    })
}

fn end_of_month(date: &str, target: Dialect) -> Replacement {
    Replacement::text(match target {
        Dialect::SqlServer => format!("EOMONTH({})", date),
        Dialect::PostgreSql => format!(
            "CAST(date_trunc('month', {}) + INTERVAL '1 month - 1 day' AS date)",
            date
        ),
        Dialect::MySql => format!("LAST_DAY({})", date),
    })
}

/// `STRING_AGG(x, sep)` in SQL Server and PostgreSQL.
fn string_agg(site: &CallSite<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    match (site.args.as_slice(), ctx.direction.target) {
        ([value, separator], Dialect::MySql) => {
            Replacement::text(format!("GROUP_CONCAT({} SEPARATOR {})", value, separator))
        }
        ([value, separator], Dialect::SqlServer) => Replacement::text(format!("STRING_AGG({}, {})", value, separator)),
        ([value, separator], Dialect::PostgreSql) => Replacement::text(format!("string_agg({}, {})", value, separator)),
        _ => Replacement::unsupported("STRING_AGG with ordering is not translated"),
    }
}

/// MySQL `GROUP_CONCAT(x [SEPARATOR sep])`.
fn group_concat(site: &CallSite<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let inner = site.joined_args();
    if site.args.len() > 1 || find_top_level(&inner, "ORDER").is_some() || find_top_level(&inner, "DISTINCT").is_some() {
        return Replacement::unsupported("GROUP_CONCAT with several values, DISTINCT or ORDER BY is not translated");
    }
    let (value, separator) = match find_top_level(&inner, "SEPARATOR") {
        Some(at) => (inner[..at].trim(), inner[at + "SEPARATOR".len()..].trim()),
        None => (inner.trim(), "','"),
    };
    match ctx.direction.target {
        Dialect::PostgreSql => Replacement::text(format!("string_agg(CAST({} AS text), {})", value, separator)),
        _ => Replacement::text(format!("STRING_AGG({}, {})", value, separator)),
    }
}

fn system_function(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = caps["name"].to_ascii_uppercase();
    let target = ctx.direction.target;
    match (name.as_str(), target) {
        ("ROWCOUNT", Dialect::MySql) => Replacement::text("ROW_COUNT()"),
        ("IDENTITY", _) => last_identity(target),
        ("SPID", Dialect::PostgreSql) => Replacement::text("pg_backend_pid()"),
        ("SPID", _) => Replacement::text("CONNECTION_ID()"),
        ("VERSION", Dialect::PostgreSql) => Replacement::text("version()"),
        ("VERSION", _) => Replacement::text("VERSION()"),
        _ => Replacement::unsupported(format!("@@{} has no {} equivalent", name, target.product_name())),
    }
}

/// MySQL only accepts a handful of type names in `CAST`.
fn is_mysql_cast_type(data_type: &str) -> bool {
    let base = data_type.split('(').next().unwrap_or_default().trim().to_ascii_uppercase();
    matches!(
        base.as_str(),
        "SIGNED" | "SIGNED INTEGER" | "UNSIGNED" | "UNSIGNED INTEGER" | "CHAR" | "NCHAR" | "BINARY"
            | "DATE" | "DATETIME" | "TIME" | "YEAR" | "DECIMAL" | "JSON" | "DOUBLE" | "FLOAT" | "REAL"
    )
}

/// The target type to cast to, and a reason if it isn't an exact match.
fn cast_type(data_type: &str, ctx: &RewriteContext<'_>) -> (String, Option<String>) {
    let direction = ctx.direction;
    if direction.source == Dialect::MySql && squish(data_type).eq_ignore_ascii_case("CHAR") {
        // MySQL `CAST(x AS CHAR)` means "as a string".
        let text = match direction.target {
            Dialect::SqlServer => "NVARCHAR(MAX)",
            _ => "text",
        };
        return (text.to_owned(), None);
    }
    let (mapped, reason) = types::translate(data_type, direction);
    if direction.target != Dialect::MySql {
        return (mapped, reason);
    }
    let cast = types::mysql_cast_type(&mapped);
    if is_mysql_cast_type(&cast) {
        (cast, None)
    } else {
        let reason = reason.unwrap_or_else(|| format!("MySQL cannot CAST to {}", cast));
        (cast, Some(reason))
    }
}

fn cast_replacement(expr: &str, data_type: &str, ctx: &RewriteContext<'_>) -> Replacement {
    let (data_type, reason) = cast_type(data_type, ctx);
    finish(format!("CAST({} AS {})", expr.trim(), data_type), reason.into_iter().collect())
}

/// `CAST(x AS type)`, which every dialect has.
fn cast(site: &CallSite<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    match split_cast(&site.joined_args()) {
        Some((expr, data_type)) => cast_replacement(expr, data_type, ctx),
        None => Replacement::text(&site.text),
    }
}

/// SQL Server `CONVERT(type, x [, style])`.
fn sqlserver_convert(site: &CallSite<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    match site.args.as_slice() {
        [data_type, expr] => cast_replacement(expr, data_type, ctx),
        [data_type, expr, _] => also(
            cast_replacement(expr, data_type, ctx),
            "the CONVERT style argument was dropped",
        ),
        _ => Replacement::text(&site.text),
    }
}

/// PostgreSQL `x::type`.
fn postfix_cast(site: &CastSite, ctx: &RewriteContext<'_>) -> Replacement {
    cast_replacement(&site.expr, &site.data_type, ctx)
}

/// A date or time unit, as used by date arithmetic and extraction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Unit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    DayOfYear,
    DayOfWeek,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Epoch,
}

impl Unit {
    /// Parse a SQL Server date part, a MySQL unit or a PostgreSQL field,
    /// quoted or not.
    fn parse(text: &str) -> Option<Unit> {
        let text = text.trim().trim_matches('\'').to_ascii_lowercase();
        Some(match text.as_str() {
            "year" | "yy" | "yyyy" | "years" => Unit::Year,
            "quarter" | "qq" | "q" => Unit::Quarter,
            "month" | "mm" | "m" | "mon" | "months" => Unit::Month,
            "week" | "wk" | "ww" | "weeks" => Unit::Week,
            "day" | "dd" | "d" | "days" => Unit::Day,
            "dayofyear" | "dy" | "y" | "doy" => Unit::DayOfYear,
            "weekday" | "dw" | "dow" | "dayofweek" => Unit::DayOfWeek,
            "hour" | "hh" | "hours" => Unit::Hour,
            "minute" | "mi" | "n" | "minutes" => Unit::Minute,
            "second" | "ss" | "s" | "seconds" => Unit::Second,
            "millisecond" | "ms" | "milliseconds" => Unit::Millisecond,
            "microsecond" | "mcs" | "microseconds" => Unit::Microsecond,
            "epoch" => Unit::Epoch,
            _ => return None,
        })
    }

    /// The SQL Server date part.
    fn sqlserver(self) -> Option<&'static str> {
        Some(match self {
            Unit::Year => "year",
            Unit::Quarter => "quarter",
            Unit::Month => "month",
            Unit::Week => "week",
            Unit::Day => "day",
            Unit::DayOfYear => "dayofyear",
            Unit::DayOfWeek => "weekday",
            Unit::Hour => "hour",
            Unit::Minute => "minute",
            Unit::Second => "second",
            Unit::Millisecond => "millisecond",
            Unit::Microsecond => "microsecond",
            Unit::Epoch => return None,
        })
    }

    /// The PostgreSQL `EXTRACT` field.
    fn postgres(self) -> &'static str {
        match self {
            Unit::Year => "YEAR",
            Unit::Quarter => "QUARTER",
            Unit::Month => "MONTH",
            Unit::Week => "WEEK",
            Unit::Day => "DAY",
            Unit::DayOfYear => "DOY",
            Unit::DayOfWeek => "DOW",
            Unit::Hour => "HOUR",
            Unit::Minute => "MINUTE",
            Unit::Second => "SECOND",
            Unit::Millisecond => "MILLISECONDS",
            Unit::Microsecond => "MICROSECONDS",
            Unit::Epoch => "EPOCH",
        }
    }

    /// The MySQL interval unit.
    fn mysql(self) -> Option<&'static str> {
        Some(match self {
            Unit::Year => "YEAR",
            Unit::Quarter => "QUARTER",
            Unit::Month => "MONTH",
            Unit::Week => "WEEK",
            Unit::Day => "DAY",
            Unit::Hour => "HOUR",
            Unit::Minute => "MINUTE",
            Unit::Second => "SECOND",
            Unit::Microsecond => "MICROSECOND",
            Unit::DayOfYear | Unit::DayOfWeek | Unit::Millisecond | Unit::Epoch => return None,
        })
    }

    /// Length in seconds, for units of fixed length.
    fn seconds(self) -> Option<u32> {
        match self {
            Unit::Week => Some(604_800),
            Unit::Day => Some(86_400),
            Unit::Hour => Some(3_600),
            Unit::Minute => Some(60),
            Unit::Second | Unit::Epoch => Some(1),
            _ => None,
        }
    }
}

/// One field of a date.
fn extract(unit: Unit, date: &str, ctx: &RewriteContext<'_>) -> Replacement {
    let replacement = match ctx.direction.target {
        Dialect::SqlServer => match unit.sqlserver() {
            Some(part) => Replacement::text(format!("DATEPART({}, {})", part, date)),
            None => return Replacement::unsupported("epoch seconds are not translated"),
        },
        Dialect::PostgreSql => Replacement::text(format!("EXTRACT({} FROM {})", unit.postgres(), date)),
        Dialect::MySql => match unit {
            Unit::DayOfYear => Replacement::text(format!("DAYOFYEAR({})", date)),
            Unit::DayOfWeek => Replacement::text(format!("DAYOFWEEK({})", date)),
            Unit::Epoch => Replacement::text(format!("UNIX_TIMESTAMP({})", date)),
            _ => match unit.mysql() {
                Some(part) => Replacement::text(format!("EXTRACT({} FROM {})", part, date)),
                None => return Replacement::unsupported("milliseconds are not translated"),
            },
        },
    };
    let postgres = [ctx.direction.source, ctx.direction.target].contains(&Dialect::PostgreSql);
    if unit == Unit::DayOfWeek && postgres {
        also(replacement, "PostgreSQL numbers days of the week from 0")
    } else {
        replacement
    }
}

/// The number of `unit`s between two dates.
fn difference(unit: Unit, start: &str, end: &str, ctx: &RewriteContext<'_>) -> Replacement {
    let exact = unit == Unit::Day;
    let replacement = match ctx.direction.target {
        Dialect::SqlServer => match unit.sqlserver().or((unit == Unit::Epoch).then_some("second")) {
            Some(part) => Replacement::text(format!("DATEDIFF({}, {}, {})", part, start, end)),
            None => return Replacement::unsupported("unknown date part"),
        },
        Dialect::PostgreSql => match unit {
            Unit::Day => Replacement::text(format!("(CAST({} AS date) - CAST({} AS date))", end, start)),
            Unit::Year => Replacement::text(format!(
                "(EXTRACT(YEAR FROM {}) - EXTRACT(YEAR FROM {}))",
                end, start
            )),
            Unit::Month => Replacement::text(format!(
                "((EXTRACT(YEAR FROM {e}) - EXTRACT(YEAR FROM {s})) * 12 + EXTRACT(MONTH FROM {e}) - EXTRACT(MONTH FROM {s}))",
                e = end,
                s = start
            )),
            _ => match unit.seconds() {
                Some(n) => Replacement::text(format!("FLOOR(EXTRACT(EPOCH FROM ({} - {})) / {})", end, start, n)),
                None => return Replacement::unsupported("date differences in this unit are not translated"),
            },
        },
        Dialect::MySql => match unit {
            Unit::Day => Replacement::text(format!("DATEDIFF({}, {})", end, start)),
            Unit::Epoch => Replacement::text(format!("TIMESTAMPDIFF(SECOND, {}, {})", start, end)),
            _ => match unit.mysql() {
                Some(part) => Replacement::text(format!("TIMESTAMPDIFF({}, {}, {})", part, start, end)),
                None => return Replacement::unsupported("date differences in this unit are not translated"),
            },
        },
    };
    if exact {
        replacement
    } else {
        also(replacement, "whole units elapsed and unit boundaries crossed can differ")
    }
}

/// `date` plus `n` `unit`s.
fn add(unit: Unit, n: &str, date: &str, ctx: &RewriteContext<'_>) -> Replacement {
    match ctx.direction.target {
        Dialect::SqlServer => match unit.sqlserver() {
            Some(part) => Replacement::text(format!("DATEADD({}, {}, {})", part, n, date)),
            None => Replacement::unsupported("unknown date part"),
        },
        Dialect::PostgreSql => {
            let interval = match unit {
                Unit::Quarter => "3 months".to_owned(),
                Unit::DayOfYear | Unit::DayOfWeek => "1 day".to_owned(),
                Unit::Epoch => "1 second".to_owned(),
                _ => format!("1 {}", unit.sqlserver().unwrap_or("day")),
            };
            Replacement::text(format!("({} + ({}) * INTERVAL '{}')", date, n, interval))
        }
        Dialect::MySql => {
            let part = match unit {
                Unit::DayOfYear | Unit::DayOfWeek => Some("DAY"),
                _ => unit.mysql(),
            };
            match part {
                Some(part) => Replacement::text(format!("DATE_ADD({}, INTERVAL {} {})", date, n, part)),
                None => Replacement::unsupported("milliseconds are not translated"),
            }
        }
    }
}

/// MySQL `DATE_ADD(d, INTERVAL n unit)` and `DATE_SUB`.
fn mysql_date_add(site: &CallSite<'_>, subtract: bool, ctx: &RewriteContext<'_>) -> Replacement {
    let [date, interval] = site.args.as_slice() else {
        return Replacement::text(&site.text);
    };
    let words = interval.split_whitespace().collect::<Vec<_>>();
    let parsed = match words.as_slice() {
        [keyword, amount @ .., unit] if keyword.eq_ignore_ascii_case("INTERVAL") && !amount.is_empty() => {
            Unit::parse(unit).map(|unit| (unit, amount.join(" ")))
        }
        _ => None,
    };
    let Some((unit, amount)) = parsed else {
        return Replacement::unsupported("compound intervals are not translated");
    };
    let amount = if subtract { format!("-({})", amount) } else { amount };
    add(unit, &amount, date, ctx)
}

/// PostgreSQL `date_part('day', a - b)` is a date difference, anything else
/// is extraction.
fn part_or_difference(unit: Unit, expr: &str, ctx: &RewriteContext<'_>) -> Replacement {
    let terms = split_top_level(expr, '-');
    match terms.as_slice() {
        [end, start] if !end.is_empty() && !start.is_empty() => also(
            difference(if unit == Unit::Epoch { Unit::Second } else { unit }, start, end, ctx),
            "assumes the operands are dates or timestamps",
        ),
        _ => extract(unit, expr, ctx),
    }
}

/// Rewrite every chain `a op b op c` with `render`, which may decline by
/// returning `None`. Repeats until nothing changes, so nested chains are
/// handled from the inside out.
fn rewrite_chains(text: &str, op: &str, render: impl Fn(&[&str]) -> Option<String>) -> String {
    let mut current = text.to_owned();
    loop {
        let next = rewrite_chains_once(&current, op, &render);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn rewrite_chains_once(text: &str, op: &str, render: &impl Fn(&[&str]) -> Option<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut search = 0;
    while let Some(i) = text.get(search..).and_then(|rest| rest.find(op)) {
        let at = search + i;
        search = at + op.len();
        let left_end = text[..at].trim_end().len();
        let Some(start) = operand_start(text, left_end).filter(|&s| s >= copied) else {
            continue;
        };
        let mut operands = vec![text[start..left_end].trim()];
        let mut end = left_end;
        let mut next_op = Some(at);
        while let Some(op_at) = next_op {
            let Some(operand_end) = operand_end(text, op_at + op.len()) else {
                break;
            };
            operands.push(text[op_at + op.len()..operand_end].trim());
            end = operand_end;
            let rest = &text[operand_end..];
            let trimmed = rest.trim_start();
            next_op = trimmed
                .starts_with(op)
                .then(|| operand_end + rest.len() - trimmed.len());
        }
        if operands.len() < 2 {
            continue;
        }
        if let Some(rendered) = render(&operands) {
            out.push_str(&text[copied..start]);
            out.push_str(&rendered);
            copied = end;
            search = end;
        }
    }
    out.push_str(&text[copied..]);
    out
}

fn is_literal(operand: &str) -> bool {
    let mut chars = operand.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if is_placeholder(c))
}

/// SQL Server `'a' + b`, when we can tell it is string concatenation.
fn concat_plus(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let target = ctx.direction.target;
    let text = rewrite_chains(&caps[0], "+", |operands| {
        if !operands.iter().any(|o| is_literal(o)) {
            return None;
        }
        Some(match target {
            Dialect::PostgreSql => operands.join(" || "),
            _ => format!("CONCAT({})", operands.join(", ")),
        })
    });
    Replacement::text(text)
}

/// PostgreSQL `a || b`.
fn concat_pipes(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let text = rewrite_chains(&caps[0], "||", |operands| Some(format!("CONCAT({})", operands.join(", "))));
    if text != caps[0] && ctx.direction.target == Dialect::SqlServer {
        Replacement::lossy(text, "CONCAT treats NULL as an empty string")
    } else {
        Replacement::text(text)
    }
}
