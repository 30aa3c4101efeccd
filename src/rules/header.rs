//! Routine headers, parameters and routine attributes.

use regex::Captures;

use crate::{
    dialect::{ConversionDirection, Dialect},
    unit::{ParamMode, RoutineKind, VariableKind},
};

use super::{
    naming::{routine_name, split_qualified, variable_name},
    types, Matcher, Region, Replacement, Replacer, RewriteContext, RewriteRule,
};

const HEADER: &str = r"(?is)^(?:CREATE\s+(?:OR\s+(?:ALTER|REPLACE)\s+)?(?:DEFINER\s*=\s*\S+\s+)?|ALTER\s+)(?P<kind>PROC(?:EDURE)?|FUNCTION)\s+(?:IF\s+NOT\s+EXISTS\s+)?(?P<name>.+)$";

const SQLSERVER_PARAMETER: &str = r"(?is)^@(?P<name>\w+)\s+(?:AS\s+)?(?P<type>.+?)(?:\s*=\s*(?P<default>.+?))?(?:\s+(?P<out>OUT|OUTPUT))?(?:\s+(?P<readonly>READONLY))?$";
const POSTGRES_PARAMETER: &str = r"(?is)^(?:(?P<mode>IN|OUT|INOUT|VARIADIC)\s+)?(?P<name>\w+)\s+(?P<type>.+?)(?:\s*(?:=|\bDEFAULT\b)\s*(?P<default>.+))?$";
const MYSQL_PARAMETER: &str = r"(?is)^(?:(?P<mode>IN|OUT|INOUT)\s+)?(?P<name>\w+)\s+(?P<type>.+)$";

pub(super) fn rules(direction: ConversionDirection) -> Vec<RewriteRule> {
    let parameter = match direction.source {
        Dialect::SqlServer => SQLSERVER_PARAMETER,
        Dialect::PostgreSql => POSTGRES_PARAMETER,
        Dialect::MySql => MYSQL_PARAMETER,
    };
    vec![
        RewriteRule::new(
            "routine_header",
            direction,
            Region::Header,
            0,
            Matcher::pattern(HEADER),
            Replacer::Captures(header),
        ),
        RewriteRule::new(
            "parameter",
            direction,
            Region::Parameter,
            0,
            Matcher::pattern(parameter),
            Replacer::Captures(parameter_replacement),
        ),
    ]
}

fn header(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let name = if ctx.routine.is_empty() {
        let (schema, name) = split_qualified(&caps["name"]);
        routine_name(schema.as_deref(), &name, ctx.direction.target, ctx.config)
    } else {
        ctx.routine.clone()
    };
    let kind = match ctx.target_kind {
        RoutineKind::Procedure => "PROCEDURE",
        RoutineKind::Function => "FUNCTION",
    };
    match ctx.direction.target {
        Dialect::PostgreSql => Replacement::text(format!("CREATE OR REPLACE {} {}", kind, name)),
        _ => Replacement::text(format!("CREATE {} {}", kind, name)),
    }
}

fn parameter_replacement(caps: &Captures<'_>, ctx: &RewriteContext<'_>) -> Replacement {
    let source = ctx.direction.source;
    let target = ctx.direction.target;
    if caps.name("readonly").is_some() {
        return Replacement::unsupported("table-valued parameters have no equivalent");
    }
    let mode_word = caps.name("mode").map(|m| m.as_str().to_ascii_uppercase());
    if mode_word.as_deref() == Some("VARIADIC") {
        return Replacement::unsupported("VARIADIC parameters have no equivalent");
    }
    let mode = match (mode_word.as_deref(), caps.name("out")) {
        (_, Some(_)) | (Some("OUT"), _) => ParamMode::Out,
        (Some("INOUT"), _) => ParamMode::InOut,
        _ => ParamMode::In,
    };

    let name = &caps["name"];
    let name = ctx
        .assignee(name)
        .unwrap_or_else(|| variable_name(name, VariableKind::Parameter, ctx.direction));
    let mut reasons = vec![];
    let (data_type, reason) = types::translate(&caps["type"], ctx.direction);
    reasons.extend(reason);
    let default = caps.name("default").map(|d| d.as_str().trim());

    let text = match target {
        Dialect::PostgreSql => {
            let mode = match mode {
                ParamMode::In => "",
                ParamMode::Out => "OUT ",
                ParamMode::InOut => "INOUT ",
            };
            let default = default.map(|d| format!(" DEFAULT {}", d)).unwrap_or_default();
            format!("{}{} {}{}", mode, name, data_type, default)
        }
        Dialect::MySql => {
            if default.is_some() {
                reasons.push("MySQL parameters cannot have default values".to_owned());
            }
            let mode = match (ctx.target_kind, mode) {
                (RoutineKind::Function, ParamMode::In) => "",
                (RoutineKind::Function, _) => {
                    reasons.push("MySQL function parameters are input only".to_owned());
                    ""
                }
                (_, ParamMode::In) => "IN ",
                (_, ParamMode::Out) => "OUT ",
                (_, ParamMode::InOut) => "INOUT ",
            };
            format!("{}{} {}", mode, name, data_type)
        }
        Dialect::SqlServer => {
            let default = default.map(|d| format!(" = {}", d)).unwrap_or_default();
            let output = if mode == ParamMode::In { "" } else { " OUTPUT" };
            if mode == ParamMode::Out && source != Dialect::SqlServer {
                reasons.push("OUTPUT parameters are also inputs in SQL Server".to_owned());
            }
            format!("{} {}{}{}", name, data_type, default, output)
        }
    };
    if reasons.is_empty() {
        Replacement::text(text)
    } else {
        Replacement::lossy(text, reasons.join("; "))
    }
}

/// Translate routine attributes like `IMMUTABLE`, `DETERMINISTIC` or
/// `WITH EXECUTE AS OWNER`. Returns the translated attributes and the ones
/// with no equivalent.
pub(crate) fn attributes(attrs: &[String], direction: ConversionDirection) -> (Vec<String>, Vec<String>) {
    let mut kept = vec![];
    let mut dropped = vec![];
    // PostgreSQL takes a single volatility, so keep the least strict one.
    let mut volatility: Option<(usize, Attribute)> = None;
    for attr in attrs.iter().flat_map(|a| split_attribute(a, direction.source)) {
        let Some((meaning, mapped)) = attribute(&attr).and_then(|m| Some((m, spell(m, direction.target)?))) else {
            dropped.push(attr);
            continue;
        };
        if direction.target == Dialect::PostgreSql && meaning.is_volatility() {
            match volatility {
                Some((at, seen)) if meaning > seen => {
                    kept[at] = mapped;
                    volatility = Some((at, meaning));
                }
                Some(_) => {}
                None => {
                    volatility = Some((kept.len(), meaning));
                    kept.push(mapped);
                }
            }
        } else if !kept.contains(&mapped) {
            kept.push(mapped);
        }
    }
    (kept, dropped)
}

/// SQL Server puts several options behind one `WITH`.
fn split_attribute(attr: &str, source: Dialect) -> Vec<String> {
    let trimmed = attr.trim();
    match source {
        Dialect::SqlServer if trimmed.get(..5).map_or(false, |w| w.eq_ignore_ascii_case("WITH ")) => {
            crate::util::split_top_level(&trimmed[4..], ',')
                .into_iter()
                .map(str::to_owned)
                .collect()
        }
        _ => vec![trimmed.to_owned()],
    }
}

/// What an attribute means, independent of dialect. Volatilities are ordered
/// from strictest to least strict.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
enum Attribute {
    Immutable,
    Stable,
    Volatile,
    SecurityDefiner,
    SecurityInvoker,
}

impl Attribute {
    fn is_volatility(self) -> bool {
        matches!(self, Attribute::Immutable | Attribute::Stable | Attribute::Volatile)
    }
}

fn attribute(attr: &str) -> Option<Attribute> {
    let upper = crate::util::squish(attr).to_ascii_uppercase();
    let meaning = match upper.as_str() {
        "IMMUTABLE" | "DETERMINISTIC" | "NO SQL" | "SCHEMABINDING" => Attribute::Immutable,
        "STABLE" | "READS SQL DATA" => Attribute::Stable,
        "VOLATILE" | "NOT DETERMINISTIC" | "MODIFIES SQL DATA" => Attribute::Volatile,
        "SECURITY DEFINER" | "SQL SECURITY DEFINER" | "EXECUTE AS OWNER" => Attribute::SecurityDefiner,
        "SECURITY INVOKER" | "SQL SECURITY INVOKER" | "EXECUTE AS CALLER" => Attribute::SecurityInvoker,
        _ => return None,
    };
    Some(meaning)
}

/// How `target` writes `meaning`, if it can.
fn spell(meaning: Attribute, target: Dialect) -> Option<String> {
    let text = match (target, meaning) {
        (Dialect::PostgreSql, Attribute::Immutable) => "IMMUTABLE",
        (Dialect::PostgreSql, Attribute::Stable) => "STABLE",
        (Dialect::PostgreSql, Attribute::Volatile) => "VOLATILE",
        (Dialect::PostgreSql, Attribute::SecurityDefiner) => "SECURITY DEFINER",
        (Dialect::PostgreSql, Attribute::SecurityInvoker) => "SECURITY INVOKER",
        (Dialect::MySql, Attribute::Immutable) => "DETERMINISTIC",
        (Dialect::MySql, Attribute::Stable) => "READS SQL DATA",
        (Dialect::MySql, Attribute::Volatile) => "NOT DETERMINISTIC",
        (Dialect::MySql, Attribute::SecurityDefiner) => "SQL SECURITY DEFINER",
        (Dialect::MySql, Attribute::SecurityInvoker) => "SQL SECURITY INVOKER",
        (Dialect::SqlServer, Attribute::SecurityDefiner) => "EXECUTE AS OWNER",
        (Dialect::SqlServer, Attribute::SecurityInvoker) => "EXECUTE AS CALLER",
        (Dialect::SqlServer, _) => return None,
    };
    Some(text.to_owned())
}

#[cfg(test)]
mod test {
    use crate::{config::EngineConfig, rules::Masked};

    use super::*;

    fn run(direction: ConversionDirection, region: Region, ctx: &RewriteContext<'_>, text: &str) -> (String, usize) {
        let rule = rules(direction)
            .into_iter()
            .find(|r| r.region == region)
            .unwrap();
        let (masked, text) = Masked::new(text, direction.source);
        let outcome = rule.apply(&text, &masked, ctx);
        (masked.restore(&outcome.text, direction), outcome.notes.len())
    }

    #[test]
    fn headers_use_target_keywords() {
        let config = EngineConfig::default();
        let direction = ConversionDirection::new(Dialect::SqlServer, Dialect::PostgreSql).unwrap();
        let mut ctx = RewriteContext::new(direction, &config);
        ctx.target_kind = RoutineKind::Function;
        let (text, _) = run(direction, Region::Header, &ctx, "CREATE PROCEDURE [dbo].[GetEmployeeById]");
        assert_eq!(text, "CREATE OR REPLACE FUNCTION GetEmployeeById");
        let (again, _) = run(direction, Region::Header, &ctx, &text);
        assert_eq!(again, text);
    }

    #[test]
    fn parameters_change_sigils_modes_and_types() {
        let config = EngineConfig::default();
        let to_pg = ConversionDirection::new(Dialect::SqlServer, Dialect::PostgreSql).unwrap();
        let ctx = RewriteContext::new(to_pg, &config).with_variable("EmployeeId", VariableKind::Parameter);
        let (text, notes) = run(to_pg, Region::Parameter, &ctx, "@EmployeeId INT");
        assert_eq!((text.as_str(), notes), ("employee_id integer", 0));
        let (text, _) = run(to_pg, Region::Parameter, &ctx, "@Name NVARCHAR(50) = N'x' OUTPUT");
        assert_eq!(text, "OUT name varchar(50) DEFAULT 'x'");

        let to_mysql = ConversionDirection::new(Dialect::PostgreSql, Dialect::MySql).unwrap();
        let ctx = RewriteContext::new(to_mysql, &config);
        let (text, notes) = run(to_mysql, Region::Parameter, &ctx, "p_limit integer DEFAULT 10");
        assert_eq!((text.as_str(), notes), ("IN p_limit INT", 1));
        let (again, _) = run(to_mysql, Region::Parameter, &ctx, &text);
        assert_eq!(again, text);

        let to_ss = ConversionDirection::new(Dialect::MySql, Dialect::SqlServer).unwrap();
        let ctx = RewriteContext::new(to_ss, &config);
        let (text, _) = run(to_ss, Region::Parameter, &ctx, "INOUT p_total DECIMAL(10,2)");
        assert_eq!(text, "@Total DECIMAL(10,2) OUTPUT");
    }

    #[test]
    fn table_valued_parameters_are_unsupported() {
        let config = EngineConfig::default();
        let to_pg = ConversionDirection::new(Dialect::SqlServer, Dialect::PostgreSql).unwrap();
        let ctx = RewriteContext::new(to_pg, &config);
        let (text, notes) = run(to_pg, Region::Parameter, &ctx, "@Ids dbo.IdList READONLY");
        assert_eq!((text.as_str(), notes), ("@Ids dbo.IdList READONLY", 1));
    }

    #[test]
    fn attributes_map_by_meaning() {
        let direction = ConversionDirection::new(Dialect::PostgreSql, Dialect::MySql).unwrap();
        let (kept, dropped) = attributes(&["IMMUTABLE".to_owned(), "COST 100".to_owned()], direction);
        assert_eq!(kept, vec!["DETERMINISTIC"]);
        assert_eq!(dropped, vec!["COST 100"]);
        let direction = ConversionDirection::new(Dialect::SqlServer, Dialect::PostgreSql).unwrap();
        let (kept, dropped) = attributes(&["WITH RECOMPILE, EXECUTE AS OWNER".to_owned()], direction);
        assert_eq!(kept, vec!["SECURITY DEFINER"]);
        assert_eq!(dropped, vec!["RECOMPILE"]);
    }

    #[test]
    fn postgres_gets_one_volatility() {
        let direction = ConversionDirection::new(Dialect::MySql, Dialect::PostgreSql).unwrap();
        let attrs = ["DETERMINISTIC", "READS SQL DATA", "SQL SECURITY DEFINER"].map(str::to_owned);
        let (kept, dropped) = attributes(&attrs, direction);
        assert_eq!(kept, vec!["STABLE", "SECURITY DEFINER"]);
        assert!(dropped.is_empty());

        let direction = ConversionDirection::new(Dialect::PostgreSql, Dialect::MySql).unwrap();
        let (kept, _) = attributes(&["STABLE".to_owned()], direction);
        assert_eq!(kept, vec!["READS SQL DATA"]);
    }
}
