//! Request and response shapes for callers that speak JSON.
//!
//! Field names match the `/convert` and `/optimize` HTTP API this library
//! replaces, so existing clients can keep sending the same bodies. There is
//! no server here: wrap these functions in whatever transport you like.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    advisor::{analyze, OptimizationSuggestion, Priority},
    config::EngineConfig,
    convert_with,
    dialect::Dialect,
    engine::Warning,
    errors::{Context, Result},
    registry::DialectRegistry,
};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ConvertRequest {
    pub source_code: String,
    pub source_type: Dialect,
    pub target_type: Dialect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConvertResponse {
    pub converted_code: String,
    pub source_type: Dialect,
    pub target_type: Dialect,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct OptimizeRequest {
    pub sql_code: String,
    pub sql_type: Dialect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OptimizeResponse {
    /// The input, unchanged except for a leading comment block listing the
    /// suggestions.
    pub optimized_code: String,
    pub suggestions: Vec<OptimizationSuggestion>,
}

/// Convert with the built-in rules and default configuration.
pub fn convert(request: &ConvertRequest) -> Result<ConvertResponse> {
    convert_request(request, DialectRegistry::builtin(), &EngineConfig::default())
}

#[instrument(level = "debug", skip_all, fields(source = %request.source_type, target = %request.target_type))]
pub fn convert_request(
    request: &ConvertRequest,
    registry: &DialectRegistry,
    config: &EngineConfig,
) -> Result<ConvertResponse> {
    let result = convert_with(
        &request.source_code,
        request.source_type,
        request.target_type,
        registry,
        config,
    )?;
    Ok(ConvertResponse {
        converted_code: result.converted_text,
        source_type: request.source_type,
        target_type: request.target_type,
        warnings: result.warnings,
    })
}

#[instrument(level = "debug", skip_all, fields(dialect = %request.sql_type))]
pub fn optimize(request: &OptimizeRequest) -> Result<OptimizeResponse> {
    let suggestions = analyze(&request.sql_code, request.sql_type);
    let optimized_code = annotate(&request.sql_code, &suggestions);
    Ok(OptimizeResponse {
        optimized_code,
        suggestions,
    })
}

/// Handle a JSON `/convert` body, returning a JSON response body.
pub fn convert_json(body: &str) -> Result<String> {
    let request: ConvertRequest = serde_json::from_str(body).context("cannot parse conversion request")?;
    let response = convert(&request)?;
    serde_json::to_string(&response).context("cannot serialize conversion response")
}

/// Handle a JSON `/optimize` body, returning a JSON response body.
pub fn optimize_json(body: &str) -> Result<String> {
    let request: OptimizeRequest =
        serde_json::from_str(body).context("cannot parse optimization request")?;
    let response = optimize(&request)?;
    serde_json::to_string(&response).context("cannot serialize optimization response")
}

/// Put a comment block listing `suggestions` in front of `sql`.
fn annotate(sql: &str, suggestions: &[OptimizationSuggestion]) -> String {
    if suggestions.is_empty() {
        return sql.to_owned();
    }
    let mut out = String::from("-- Optimization suggestions:\n");
    for suggestion in suggestions {
        let priority = match suggestion.priority {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        let line = suggestion
            .source_span
            .as_ref()
            .map(|span| format!(" (line {})", line_of(sql, span.start)))
            .unwrap_or_default();
        out.push_str(&format!(
            "-- [{}] {:?}: {}{}\n",
            priority, suggestion.category, suggestion.message, line
        ));
    }
    out.push_str(sql);
    out
}

fn line_of(sql: &str, offset: usize) -> usize {
    sql.get(..offset).map_or(1, |before| before.matches('\n').count() + 1)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::errors::Error;

    use super::*;

    #[test]
    fn convert_round_trips_through_json() {
        let body = r#"{
            "source_code": "CREATE PROCEDURE GetCustomer @Id INT AS BEGIN SELECT Name FROM Customers WHERE Id = @Id END",
            "source_type": "sqlserver",
            "target_type": "postgres"
        }"#;
        let response: serde_json::Value = serde_json::from_str(&convert_json(body).unwrap()).unwrap();
        assert_eq!(response["source_type"], "sqlserver");
        assert_eq!(response["target_type"], "postgresql");
        assert!(response["converted_code"]
            .as_str()
            .unwrap()
            .contains("LANGUAGE plpgsql"));
        assert!(response["warnings"].is_array());
    }

    #[test]
    fn identical_dialects_are_rejected() {
        let request = ConvertRequest {
            source_code: "CREATE PROCEDURE p() BEGIN END".to_owned(),
            source_type: Dialect::MySql,
            target_type: Dialect::MySql,
        };
        assert!(matches!(convert(&request), Err(Error::UnsupportedDirection { .. })));
    }

    #[test]
    fn bad_json_is_an_error_with_context() {
        let err = convert_json(r#"{"source_code": 1}"#).unwrap_err();
        assert!(err.to_string().starts_with("cannot parse conversion request"));
        assert!(optimize_json(r#"{"sql_code": "", "sql_type": "oracle"}"#).is_err());
    }

    #[test]
    fn optimize_annotates_without_changing_code() {
        let sql = "CREATE PROCEDURE p AS\nBEGIN\n    SELECT * FROM t\nEND";
        let response = optimize(&OptimizeRequest {
            sql_code: sql.to_owned(),
            sql_type: Dialect::SqlServer,
        })
        .unwrap();
        assert!(response.optimized_code.ends_with(sql));
        assert!(response
            .optimized_code
            .contains("-- [MEDIUM] Indexing: SELECT * reads every column"));
        assert!(response.optimized_code.contains("(line 3)"));
        assert_eq!(response.suggestions.len(), 2);
    }
}
