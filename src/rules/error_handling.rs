//! Transactions, raising errors and reading them back in a handler.
//!
//! PostgreSQL functions can't control transactions, so transaction statements
//! disappear on the way to PostgreSQL. An `EXCEPTION` block already rolls
//! back everything its `BEGIN` did.

use regex::Captures;

use crate::{
    dialect::{ConversionDirection, Dialect},
    unit::VariableKind,
    util::{split_top_level, squish},
};

use super::{
    mask::is_placeholder,
    sites::find_top_level,
    variables::{finish, target_name},
    CapturesFn, Matcher, Region, Replacement, Replacer, RewriteContext, RewriteRule,
};

/// The SQLSTATE MySQL reserves for user-defined errors.
const USER_SQLSTATE: &str = "'45000'";

/// The lowest error number `THROW` accepts.
const USER_ERROR_NUMBER: u32 = 50000;

const NO_TRANSACTIONS: &str = "PostgreSQL functions run inside the caller's transaction";

pub(super) fn rules(direction: ConversionDirection) -> Vec<RewriteRule> {
    let statement = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::ErrorHandling, order, Matcher::pattern(re), Replacer::Captures(f))
    };
    let expression = |name: &'static str, order: u32, re: &str, f: CapturesFn| {
        RewriteRule::new(name, direction, Region::BuiltinCall, order, Matcher::pattern(re), Replacer::Captures(f))
    };

    let mut rules = vec![];
    match direction.source {
        Dialect::SqlServer => {
            rules.push(statement(
                "begin_transaction",
                10,
                r"(?is)^BEGIN\s+TRAN(?:SACTION)?(?:\s+\w+)?$",
                |_, ctx| match ctx.direction.target {
                    Dialect::PostgreSql => Replacement::lossy("", NO_TRANSACTIONS),
                    _ => Replacement::text("START TRANSACTION"),
                },
            ));
            rules.push(statement(
                "commit",
                11,
                r"(?is)^COMMIT(?:\s+(?:TRAN(?:SACTION)?|WORK))?(?:\s+\w+)?$",
                |_, ctx| commit(ctx.direction.target),
            ));
            rules.push(statement(
                "rollback",
                12,
                r"(?is)^ROLLBACK(?:\s+(?:TRAN(?:SACTION)?|WORK))?(?:\s+\w+)?$",
                |_, ctx| rollback(ctx.direction.target),
            ));
            rules.push(statement(
                "save_transaction",
                13,
                r"(?is)^SAVE\s+TRAN(?:SACTION)?\s+(?P<name>\w+)$",
                |caps, ctx| match ctx.direction.target {
                    Dialect::MySql => Replacement::text(format!("SAVEPOINT {}", &caps["name"])),
                    _ => Replacement::unsupported("savepoints are not available in PostgreSQL functions"),
                },
            ));
            rules.push(statement(
                "throw",
                20,
                r"(?is)^THROW(?:\s+(?P<number>[^,]+?)\s*,\s*(?P<message>.+?)\s*,\s*(?P<state>[^,]+))?$",
                throw,
            ));
            rules.push(statement(
                "raiserror",
                21,
                r"(?is)^RAISERROR\s*\((?P<args>.+)\)(?:\s+WITH\s+\w+(?:\s*,\s*\w+)*)?$",
                raiserror,
            ));
            rules.push(expression(
                "transaction_count",
                848,
                r"(?i)@@TRANCOUNT\s*>\s*0",
                |_, _| Replacement::lossy("TRUE", "assumes a transaction is open"),
            ));
            rules.push(expression(
                "error_function",
                100,
                r"(?i)(^|[^\w.@])ERROR_(?P<name>MESSAGE|NUMBER|STATE|SEVERITY|LINE|PROCEDURE)\s*\(\s*\)",
                error_function,
            ));
        }
        Dialect::PostgreSql => {
            rules.push(statement(
                "commit",
                11,
                r"(?is)^COMMIT(?:\s+(?:WORK|TRANSACTION))?(?:\s+AND\s+(?:NO\s+)?CHAIN)?$",
                |_, ctx| commit(ctx.direction.target),
            ));
            rules.push(statement(
                "rollback",
                12,
                r"(?is)^ROLLBACK(?:\s+(?:WORK|TRANSACTION))?(?:\s+AND\s+(?:NO\s+)?CHAIN)?$",
                |_, ctx| rollback(ctx.direction.target),
            ));
            rules.push(statement("reraise", 20, r"(?is)^RAISE$", |_, ctx| {
                Replacement::text(reraise_keyword(ctx.direction.target))
            }));
            rules.push(statement(
                "raise_message",
                21,
                r"(?is)^RAISE(?:\s+EXCEPTION)?\s+(?P<body>(?:[\x{F0000}-\x{10FFFF}]|USING\b).*)$",
                raise_message,
            ));
            rules.push(statement(
                "raise_condition",
                22,
                r"(?is)^RAISE(?:\s+EXCEPTION)?\s+(?P<condition>SQLSTATE\s+[\x{F0000}-\x{10FFFF}]|\w+)(?:\s+USING\s+(?P<using>.+))?$",
                raise_condition,
            ));
            rules.push(statement(
                "stacked_diagnostics",
                23,
                r"(?is)^GET\s+STACKED\s+DIAGNOSTICS\s+(?P<items>.+)$",
                stacked_diagnostics,
            ));
            rules.push(expression("sqlerrm", 100, r"(?i)(^|[^\w.@])SQLERRM\b", |caps, ctx| {
                match ctx.direction.target {
                    Dialect::SqlServer => Replacement::text(format!("{}ERROR_MESSAGE()", &caps[1])),
                    _ => Replacement::unsupported("read MESSAGE_TEXT with GET DIAGNOSTICS CONDITION 1 instead"),
                }
            }));
            rules.push(expression(
                "sqlstate",
                101,
                r"(?i)(^|[^\w.@])SQLSTATE\b(?P<literal>\s*(?:[\x{F0000}-\x{10FFFF}]|'))?",
                |caps, ctx| match (caps.name("literal"), ctx.direction.target) {
                    (Some(_), _) => Replacement::text(&caps[0]),
                    (None, Dialect::SqlServer) => Replacement::lossy(
                        format!("{}ERROR_NUMBER()", &caps[1]),
                        "SQL Server error numbers are not SQLSTATE codes",
                    ),
                    (None, _) => {
                        Replacement::unsupported("read RETURNED_SQLSTATE with GET DIAGNOSTICS CONDITION 1 instead")
                    }
                },
            ));
        }
        Dialect::MySql => {
            rules.push(statement(
                "start_transaction",
                10,
                r"(?is)^START\s+TRANSACTION$",
                |_, ctx| match ctx.direction.target {
                    Dialect::PostgreSql => Replacement::lossy("", NO_TRANSACTIONS),
                    _ => Replacement::text("BEGIN TRANSACTION"),
                },
            ));
            rules.push(statement("commit", 11, r"(?is)^COMMIT(?:\s+WORK)?$", |_, ctx| {
                commit(ctx.direction.target)
            }));
            rules.push(statement("rollback", 12, r"(?is)^ROLLBACK(?:\s+WORK)?$", |_, ctx| {
                rollback(ctx.direction.target)
            }));
            rules.push(statement("resignal", 20, r"(?is)^RESIGNAL(?P<changes>\b.+)?$", |caps, ctx| {
                let keyword = reraise_keyword(ctx.direction.target);
                match caps.name("changes") {
                    None => Replacement::text(keyword),
                    Some(_) => Replacement::lossy(keyword, "changes RESIGNAL makes to the error were dropped"),
                }
            }));
            rules.push(statement(
                "signal",
                21,
                r"(?is)^SIGNAL\s+(?P<condition>SQLSTATE\s+(?:VALUE\s+)?(?P<state>\S+)|\w+)(?:\s+SET\s+(?P<items>.+))?$",
                signal,
            ));
            rules.push(statement(
                "diagnostics",
                23,
                r"(?is)^GET\s+(?:CURRENT\s+|STACKED\s+)?DIAGNOSTICS\s+CONDITION\s+1\s+(?P<items>.+)$",
                mysql_diagnostics,
            ));
        }
    }
    rules
}

fn commit(target: Dialect) -> Replacement {
    match target {
        Dialect::SqlServer => Replacement::text("COMMIT TRANSACTION"),
        Dialect::PostgreSql => Replacement::lossy("", NO_TRANSACTIONS),
        Dialect::MySql => Replacement::text("COMMIT"),
    }
}

fn rollback(target: Dialect) -> Replacement {
    match target {
        // An error may already have rolled back the transaction.
        Dialect::SqlServer => Replacement::text("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION"),
        Dialect::PostgreSql => Replacement::lossy("", "the exception block rolls back its own changes"),
        Dialect::MySql => Replacement::text("ROLLBACK"),
    }
}

/// Re-raise the error being handled.
fn reraise_keyword(target: Dialect) -> &'static str {
    match target {
        Dialect::SqlServer => "THROW",
        Dialect::PostgreSql => "RAISE",
        Dialect::MySql => "RESIGNAL",
    }
}

/// Can `text` be the message of a `THROW` or `SIGNAL`, which only take a
/// literal or a variable?
fn is_simple_value(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if is_placeholder(c) => true,
        _ => !text.is_empty() && text.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '@')),
    }
}

/// Raise a new error with `message`. `sqlstate` is a masked literal, and
/// `number` a SQL Server or MySQL error number.
fn raise(
    message: &str,
    sqlstate: Option<&str>,
    number: Option<u32>,
    reasons: &mut Vec<String>,
    ctx: &RewriteContext<'_>,
) -> String {
    let message = message.trim();
    if ctx.direction.target != Dialect::PostgreSql && !is_simple_value(message) {
        reasons.push("the error message must be a literal or a variable".to_owned());
    }
    match ctx.direction.target {
        Dialect::SqlServer => {
            if sqlstate.is_some() {
                reasons.push("the SQLSTATE is not kept".to_owned());
            }
            let number = number.unwrap_or(USER_ERROR_NUMBER);
            let number = if number < USER_ERROR_NUMBER {
                reasons.push(format!("error number {} is below {}", number, USER_ERROR_NUMBER));
                USER_ERROR_NUMBER
            } else {
                number
            };
            format!("THROW {}, {}, 1", number, message)
        }
        Dialect::PostgreSql => {
            if number.map_or(false, |n| n != USER_ERROR_NUMBER) {
                reasons.push("the error number is not kept".to_owned());
            }
            match sqlstate {
                Some(state) => format!("RAISE EXCEPTION USING MESSAGE = {}, ERRCODE = {}", message, state),
                None => format!("RAISE EXCEPTION USING MESSAGE = {}", message),
            }
        }
        Dialect::MySql => {
            let mut text = format!(
                "SIGNAL SQLSTATE {} SET MESSAGE_TEXT = {}",
                sqlstate.unwrap_or(USER_SQLSTATE),
                message
            );
            if let Some(number) = number.filter(|&n| n <= u32::from(u16::MAX)) {
                text.push_str(&format!(", MYSQL_ERRNO = {}", number));
            }
            text
        }
    }
}

/// SQL Server `THROW [number, message, state]`.
fn throw(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let (Some(number), Some(message)) = (caps.name("number"), caps.name("message")) else {
        return Replacement::text(reraise_keyword(ctx.direction.target));
    };
    let mut reasons = vec![];
    let number = number.as_str().trim().parse::<u32>().ok();
    if number.is_none() {
        reasons.push("a computed error number is not kept".to_owned());
    }
    let number = number.filter(|&n| n != USER_ERROR_NUMBER);
    let text = raise(message.as_str(), None, number, &mut reasons, ctx);
    finish(text, reasons)
}

/// SQL Server `RAISERROR(message, severity, state, args...)`.
fn raiserror(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let args = split_top_level(&caps["args"], ',');
    let [message, severity, _state, rest @ ..] = args.as_slice() else {
        return Replacement::unsupported("RAISERROR needs a message, severity and state");
    };
    let mut reasons = vec![];
    if !rest.is_empty() {
        reasons.push("message arguments are not substituted".to_owned());
    }
    // Severities up to 10 are informational.
    if severity.parse::<u32>().map_or(false, |s| s <= 10) {
        let text = match ctx.direction.target {
            Dialect::PostgreSql => format!("RAISE NOTICE '%', {}", message),
            _ => {
                reasons.push("messages become a one-row result set".to_owned());
                format!("SELECT {}", message)
            }
        };
        return finish(text, reasons);
    }
    let text = raise(message, None, None, &mut reasons, ctx);
    finish(text, reasons)
}

/// Split `MESSAGE = x, ERRCODE = y` into pairs.
fn options(text: &str) -> Vec<(String, &str)> {
    split_top_level(text, ',')
        .into_iter()
        .filter_map(|item| {
            let (name, value) = item.split_once('=')?;
            Some((squish(name), value.trim()))
        })
        .collect()
}

/// PL/pgSQL `RAISE EXCEPTION 'format', args USING ...` and
/// `RAISE EXCEPTION USING MESSAGE = ...`.
fn raise_message(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let body = &caps["body"];
    let (head, using) = match find_top_level(body, "USING") {
        Some(at) => (body[..at].trim(), Some(body[at + "USING".len()..].trim())),
        None => (body.trim(), None),
    };
    let mut reasons = vec![];
    let mut message = None;
    let mut sqlstate = None;
    if !head.is_empty() {
        let args = split_top_level(head, ',');
        if args.len() > 1 {
            reasons.push("% placeholders are not substituted".to_owned());
        }
        message = args.first().map(|m| m.to_string());
    }
    for (name, value) in using.map(options).unwrap_or_default() {
        match name.to_ascii_uppercase().as_str() {
            "MESSAGE" => message = Some(value.to_owned()),
            "ERRCODE" => {
                reasons.push("assumes ERRCODE is a SQLSTATE, not a condition name".to_owned());
                sqlstate = Some(value.to_owned());
            }
            other => reasons.push(format!("{} was dropped", other)),
        }
    }
    let Some(message) = message else {
        return Replacement::unsupported("RAISE without a message is not translated");
    };
    let text = raise(&message, sqlstate.as_deref(), None, &mut reasons, ctx);
    finish(text, reasons)
}

/// PL/pgSQL `RAISE unique_violation` or `RAISE SQLSTATE '22012'`.
fn raise_condition(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let condition = squish(&caps["condition"]);
    if matches!(
        condition.to_ascii_uppercase().as_str(),
        "NOTICE" | "INFO" | "LOG" | "DEBUG" | "WARNING"
    ) {
        return Replacement::text(&caps[0]);
    }
    let mut reasons = vec![];
    let mut message = None;
    for (name, value) in caps.name("using").map(|u| options(u.as_str())).unwrap_or_default() {
        match name.to_ascii_uppercase().as_str() {
            "MESSAGE" => message = Some(value.to_owned()),
            other => reasons.push(format!("{} was dropped", other)),
        }
    }
    let sqlstate = condition
        .get(..8)
        .filter(|keyword| keyword.eq_ignore_ascii_case("SQLSTATE"))
        .map(|_| condition[8..].trim().to_owned());
    let message = match (message, &sqlstate) {
        (Some(message), _) => message,
        (None, Some(_)) => "'SQL error'".to_owned(),
        (None, None) => {
            reasons.push("named conditions become a generic error".to_owned());
            format!("'{}'", condition)
        }
    };
    let text = raise(&message, sqlstate.as_deref(), None, &mut reasons, ctx);
    finish(text, reasons)
}

/// PL/pgSQL `GET STACKED DIAGNOSTICS v = MESSAGE_TEXT, ...`.
fn stacked_diagnostics(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let mut reasons = vec![];
    let mut assignments = vec![];
    for (item, var) in options(&caps["items"])
        .into_iter()
        .map(|(var, item)| (item.to_ascii_uppercase(), var))
    {
        let var = target_name(&var, VariableKind::Local, ctx);
        let value = match (item.as_str(), ctx.direction.target) {
            ("MESSAGE_TEXT", Dialect::SqlServer) => "ERROR_MESSAGE()",
            ("RETURNED_SQLSTATE", Dialect::SqlServer) => {
                reasons.push("SQL Server error numbers are not SQLSTATE codes".to_owned());
                "ERROR_NUMBER()"
            }
            ("MESSAGE_TEXT" | "RETURNED_SQLSTATE", _) => {
                assignments.push(format!("{} = {}", var, item));
                continue;
            }
            _ => {
                reasons.push(format!("{} is not available", item));
                continue;
            }
        };
        assignments.push(format!("SET {} = {}", var, value));
    }
    if assignments.is_empty() {
        return Replacement::unsupported("none of these diagnostics are available");
    }
    let text = match ctx.direction.target {
        Dialect::SqlServer => assignments.join(";\n"),
        _ => format!("GET DIAGNOSTICS CONDITION 1 {}", assignments.join(", ")),
    };
    finish(text, reasons)
}

/// MySQL `GET DIAGNOSTICS CONDITION 1 v = MESSAGE_TEXT, ...`.
fn mysql_diagnostics(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let mut reasons = vec![];
    let mut items = vec![];
    for (var, item) in options(&caps["items"]) {
        let item = item.to_ascii_uppercase();
        let var = target_name(&var, VariableKind::Local, ctx);
        match (item.as_str(), ctx.direction.target) {
            ("MESSAGE_TEXT", Dialect::SqlServer) => items.push(format!("SET {} = ERROR_MESSAGE()", var)),
            ("MYSQL_ERRNO", Dialect::SqlServer) => items.push(format!("SET {} = ERROR_NUMBER()", var)),
            ("MESSAGE_TEXT" | "RETURNED_SQLSTATE", Dialect::PostgreSql) => items.push(format!("{} = {}", var, item)),
            _ => reasons.push(format!("{} is not available", item)),
        }
    }
    if items.is_empty() {
        return Replacement::unsupported("none of these diagnostics are available");
    }
    let text = match ctx.direction.target {
        Dialect::PostgreSql => format!("GET STACKED DIAGNOSTICS {}", items.join(", ")),
        _ => items.join(";\n"),
    };
    finish(text, reasons)
}

/// MySQL `SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = ...`.
fn signal(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let Some(state) = caps.name("state") else {
        return Replacement::unsupported("SIGNAL with a named condition is not translated");
    };
    let mut reasons = vec![];
    let mut message = None;
    let mut number = None;
    for (name, value) in caps.name("items").map(|i| options(i.as_str())).unwrap_or_default() {
        match name.to_ascii_uppercase().as_str() {
            "MESSAGE_TEXT" => message = Some(value.to_owned()),
            "MYSQL_ERRNO" => number = value.parse::<u32>().ok(),
            other => reasons.push(format!("{} was dropped", other)),
        }
    }
    let message = message.unwrap_or_else(|| "'Unhandled user-defined exception condition'".to_owned());
    let text = raise(&message, Some(state.as_str()), number, &mut reasons, ctx);
    finish(text, reasons)
}

/// SQL Server `ERROR_MESSAGE()` and friends, inside a `CATCH` block.
fn error_function(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = caps["name"].to_ascii_uppercase();
    match (name.as_str(), ctx.direction.target) {
        ("MESSAGE", Dialect::PostgreSql) => Replacement::text(format!("{}SQLERRM", &caps[1])),
        ("NUMBER", Dialect::PostgreSql) => Replacement::lossy(
            format!("{}SQLSTATE", &caps[1]),
            "SQLSTATE codes are not SQL Server error numbers",
        ),
        (_, Dialect::MySql) if matches!(name.as_str(), "MESSAGE" | "NUMBER") => Replacement::unsupported(
            "read MESSAGE_TEXT or MYSQL_ERRNO with GET DIAGNOSTICS CONDITION 1 instead",
        ),
        _ => Replacement::unsupported(format!(
            "ERROR_{}() has no {} equivalent",
            name,
            ctx.direction.target.product_name()
        )),
    }
}

#[cfg(test)]
mod test {
    use crate::{config::EngineConfig, rules::Masked};

    use super::*;

    fn run(source: Dialect, target: Dialect, text: &str) -> String {
        let config = EngineConfig::default();
        let direction = ConversionDirection::new(source, target).unwrap();
        let ctx = RewriteContext::new(direction, &config)
            .with_variable("v_msg", VariableKind::Local);
        let (masked, mut text) = Masked::new(text, source);
        let mut rules = rules(direction);
        rules.sort_by_key(|r| (r.region, r.order));
        for rule in &rules {
            text = rule.apply(&text, &masked, &ctx).text;
        }
        masked.restore(&text, direction)
    }

    #[test]
    fn transactions() {
        assert_eq!(run(Dialect::SqlServer, Dialect::MySql, "BEGIN TRANSACTION"), "START TRANSACTION");
        assert_eq!(run(Dialect::SqlServer, Dialect::MySql, "COMMIT TRAN"), "COMMIT");
        assert_eq!(run(Dialect::SqlServer, Dialect::PostgreSql, "ROLLBACK TRANSACTION"), "");
        assert_eq!(
            run(Dialect::MySql, Dialect::SqlServer, "ROLLBACK"),
            "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION"
        );
        assert_eq!(run(Dialect::PostgreSql, Dialect::MySql, "COMMIT"), "COMMIT");
        assert_eq!(run(Dialect::SqlServer, Dialect::MySql, "@@TRANCOUNT > 0"), "TRUE");
    }

    #[test]
    fn reraising() {
        assert_eq!(run(Dialect::SqlServer, Dialect::PostgreSql, "THROW"), "RAISE");
        assert_eq!(run(Dialect::PostgreSql, Dialect::MySql, "RAISE"), "RESIGNAL");
        assert_eq!(run(Dialect::MySql, Dialect::SqlServer, "RESIGNAL"), "THROW");
    }

    #[test]
    fn raising_new_errors() {
        assert_eq!(
            run(Dialect::SqlServer, Dialect::PostgreSql, "THROW 50001, 'Out of stock', 1"),
            "RAISE EXCEPTION USING MESSAGE = 'Out of stock'"
        );
        assert_eq!(
            run(Dialect::SqlServer, Dialect::MySql, "THROW 50001, 'Out of stock', 1"),
            "SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'Out of stock', MYSQL_ERRNO = 50001"
        );
        assert_eq!(
            run(Dialect::SqlServer, Dialect::MySql, "RAISERROR('Bad input', 16, 1)"),
            "SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'Bad input'"
        );
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::SqlServer, "RAISE EXCEPTION 'Order % not found', p_id"),
            "THROW 50000, 'Order % not found', 1"
        );
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::MySql, "RAISE EXCEPTION USING MESSAGE = v_msg, ERRCODE = '22012'"),
            "SIGNAL SQLSTATE '22012' SET MESSAGE_TEXT = v_msg"
        );
        assert_eq!(
            run(Dialect::MySql, Dialect::PostgreSql, "SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = 'No rows'"),
            "RAISE EXCEPTION USING MESSAGE = 'No rows', ERRCODE = '45000'"
        );
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::SqlServer, "RAISE NOTICE 'x'"),
            "RAISE NOTICE 'x'"
        );
    }

    #[test]
    fn reading_the_error() {
        assert_eq!(run(Dialect::SqlServer, Dialect::PostgreSql, "SELECT ERROR_MESSAGE()"), "SELECT SQLERRM");
        assert_eq!(run(Dialect::PostgreSql, Dialect::SqlServer, "v := SQLERRM"), "v := ERROR_MESSAGE()");
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::SqlServer, "GET STACKED DIAGNOSTICS v_msg = MESSAGE_TEXT"),
            "SET @Msg = ERROR_MESSAGE()"
        );
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::MySql, "GET STACKED DIAGNOSTICS v_msg = MESSAGE_TEXT"),
            "GET DIAGNOSTICS CONDITION 1 v_msg = MESSAGE_TEXT"
        );
        assert_eq!(
            run(Dialect::PostgreSql, Dialect::MySql, "RAISE EXCEPTION USING MESSAGE = SQLSTATE"),
            "SIGNAL SQLSTATE '45000' SET MESSAGE_TEXT = SQLSTATE"
        );
    }
}
