//! Rewrite stored procedures and functions between SQL Server T-SQL,
//! PostgreSQL PL/pgSQL and MySQL, and suggest dialect-aware optimizations.
//!
//! Conversion is best-effort and rule-based. A unit is first split into
//! regions by the [`segmenter`], then each region runs through the rewrite
//! rules registered for its direction, and finally a target formatter
//! reassembles the pieces. Fragments that can't be translated are passed
//! through with a [`Warning`]; only a missing rule set or a structurally
//! broken input stops a conversion.
//!
//! ```no_run
//! use procshift::{convert, Dialect};
//!
//! let result = convert(
//!     "CREATE PROCEDURE p @Id INT AS BEGIN SELECT * FROM t WHERE Id = @Id END",
//!     Dialect::SqlServer,
//!     Dialect::PostgreSql,
//! )?;
//! println!("{}", result.converted_text);
//! # Ok::<(), procshift::Error>(())
//! ```

pub mod advisor;
pub mod config;
pub mod dialect;
pub mod engine;
pub mod errors;
pub mod format;
pub mod registry;
pub mod rules;
pub mod segmenter;
pub mod service;
pub mod tokenizer;
pub mod unit;
mod util;

pub use advisor::{analyze, OptimizationSuggestion};
pub use config::EngineConfig;
pub use dialect::{ConversionDirection, Dialect};
pub use engine::{ConversionResult, Warning};
pub use errors::{Error, Result};
pub use registry::DialectRegistry;

/// Convert `sql` from `source` to `target` using the built-in rule sets and
/// the default configuration.
pub fn convert(sql: &str, source: Dialect, target: Dialect) -> Result<ConversionResult> {
    convert_with(
        sql,
        source,
        target,
        DialectRegistry::builtin(),
        &EngineConfig::default(),
    )
}

/// Convert `sql` using a specific registry and configuration.
#[tracing::instrument(level = "debug", skip(sql, registry, config))]
pub fn convert_with(
    sql: &str,
    source: Dialect,
    target: Dialect,
    registry: &DialectRegistry,
    config: &EngineConfig,
) -> Result<ConversionResult> {
    let direction = ConversionDirection::new(source, target)?;
    let rule_set = registry.resolve(direction)?;
    let unit = segmenter::segment(sql, source)?;
    Ok(engine::apply(&unit, rule_set, config))
}
