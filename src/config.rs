//! Engine configuration.
//!
//! Everything here has a sensible default, so most callers never build an
//! [`EngineConfig`] themselves. Callers who do usually load one from JSON.

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Knobs that change how converted output is written.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Prepend a comment saying where the output came from.
    pub provenance_comment: bool,
    /// Write a `-- REVIEW:` comment above every fragment with a warning.
    pub annotate_warnings: bool,
    /// Drop `dbo.` and `public.` schema qualifiers from routine names.
    pub strip_default_schema: bool,
    /// Start SQL Server procedures with `SET NOCOUNT ON`.
    pub sqlserver_nocount: bool,
    /// Precede MySQL routines with `DROP ... IF EXISTS`.
    pub mysql_drop_if_exists: bool,
    /// One level of indentation in generated code.
    pub indent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provenance_comment: true,
            annotate_warnings: true,
            strip_default_schema: true,
            sqlserver_nocount: true,
            mysql_drop_if_exists: true,
            indent: "    ".to_owned(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from JSON. Missing fields take
    /// their default values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde can't check for us.
    pub fn validate(&self) -> Result<()> {
        if self.indent.is_empty() || !self.indent.chars().all(|c| c == ' ' || c == '\t') {
            return Err(Error::Config {
                message: format!("indent must be spaces or tabs, not {:?}", self.indent),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json(r#"{ "provenance_comment": false }"#).unwrap();
        assert!(!config.provenance_comment);
        assert!(config.annotate_warnings);
        assert_eq!(config.indent, "    ");
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        for json in [r#"{ "indent": 4 }"#, r#"{ "no_such_knob": true }"#, "{", r#"{ "indent": "xx" }"#] {
            match EngineConfig::from_json(json) {
                Err(Error::Config { .. }) => {}
                other => panic!("expected a config error for {json}, got {other:?}"),
            }
        }
    }
}
