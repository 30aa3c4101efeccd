//! Naming conventions for each dialect.
//!
//! SQL Server variables are `@PascalCase`. PostgreSQL names are `snake_case`.
//! MySQL names are `snake_case` too, but parameters get a `p_` prefix and
//! locals a `v_` prefix, because MySQL silently prefers a variable over a
//! column with the same name.

use crate::{
    config::EngineConfig,
    dialect::{ConversionDirection, Dialect},
    unit::VariableKind,
    util::{is_c_ident, pascal_case, snake_case},
};

/// Schemas that are the default for their dialect.
const DEFAULT_SCHEMAS: &[&str] = &["dbo", "public"];

/// The target name for the variable `name`, which may still carry a sigil.
pub fn variable_name(name: &str, kind: VariableKind, direction: ConversionDirection) -> String {
    let name = name.trim_start_matches('@');
    match direction.target {
        Dialect::SqlServer => format!("@{}", pascal_case(strip_prefix(name))),
        Dialect::PostgreSql => snake_case(name),
        Dialect::MySql => {
            let snake = snake_case(name);
            let prefix = match kind {
                VariableKind::Parameter => "p_",
                VariableKind::Local => "v_",
            };
            if snake.starts_with(prefix) {
                snake
            } else {
                format!("{}{}", prefix, snake)
            }
        }
    }
}

/// Drop a `p_` or `v_` prefix, if something is left afterwards.
pub(crate) fn strip_prefix(name: &str) -> &str {
    for prefix in ["p_", "v_", "P_", "V_"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    name
}

/// Split a possibly qualified, possibly quoted name into schema and name,
/// without quotes.
pub fn split_qualified(text: &str) -> (Option<String>, String) {
    let mut parts = vec![];
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in text.trim().chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '[') => quote = Some(']'),
            (None, '"') => quote = Some('"'),
            (None, '`') => quote = Some('`'),
            (None, '.') => parts.push(std::mem::take(&mut current)),
            (None, c) if c.is_whitespace() => {}
            (None, c) => current.push(c),
        }
    }
    parts.push(current);
    let name = parts.pop().unwrap_or_default();
    (parts.pop(), name)
}

/// Quote `name` for `target` if it isn't a plain identifier.
pub fn quote_ident(name: &str, target: Dialect) -> String {
    if is_c_ident(name) {
        return name.to_owned();
    }
    match target {
        Dialect::SqlServer => format!("[{}]", name.replace(']', "]]")),
        Dialect::PostgreSql => format!("\"{}\"", name.replace('"', "\"\"")),
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
    }
}

/// The routine name as written in the target header. The routine keeps its
/// name, but loses its quoting and any default schema.
pub fn routine_name(
    schema: Option<&str>,
    name: &str,
    target: Dialect,
    config: &EngineConfig,
) -> String {
    let name = quote_ident(name, target);
    match schema {
        Some(schema)
            if !(config.strip_default_schema
                && DEFAULT_SCHEMAS.iter().any(|d| d.eq_ignore_ascii_case(schema))) =>
        {
            format!("{}.{}", quote_ident(schema, target), name)
        }
        _ => name,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dir(source: Dialect, target: Dialect) -> ConversionDirection {
        ConversionDirection::new(source, target).unwrap()
    }

    #[test]
    fn variables_follow_target_conventions() {
        let to_pg = dir(Dialect::SqlServer, Dialect::PostgreSql);
        let to_mysql = dir(Dialect::SqlServer, Dialect::MySql);
        let to_ss = dir(Dialect::PostgreSql, Dialect::SqlServer);
        assert_eq!(variable_name("@EmployeeId", VariableKind::Parameter, to_pg), "employee_id");
        assert_eq!(variable_name("@ProductId", VariableKind::Parameter, to_mysql), "p_product_id");
        assert_eq!(variable_name("@Total", VariableKind::Local, to_mysql), "v_total");
        assert_eq!(variable_name("p_order_id", VariableKind::Parameter, to_ss), "@OrderId");
        assert_eq!(variable_name("v_product_id", VariableKind::Local, to_ss), "@ProductId");
        let mysql_to_pg = dir(Dialect::MySql, Dialect::PostgreSql);
        assert_eq!(variable_name("p_status", VariableKind::Parameter, mysql_to_pg), "p_status");
    }

    #[test]
    fn routine_names_lose_default_schemas() {
        let config = EngineConfig::default();
        assert_eq!(split_qualified("[dbo].[Get Employee]"), (Some("dbo".to_owned()), "Get Employee".to_owned()));
        assert_eq!(routine_name(Some("dbo"), "GetEmployeeById", Dialect::PostgreSql, &config), "GetEmployeeById");
        assert_eq!(routine_name(Some("sales"), "Get Employee", Dialect::MySql, &config), "sales.`Get Employee`");
        let keep = EngineConfig {
            strip_default_schema: false,
            ..EngineConfig::default()
        };
        assert_eq!(routine_name(Some("dbo"), "p", Dialect::SqlServer, &keep), "dbo.p");
    }
}
