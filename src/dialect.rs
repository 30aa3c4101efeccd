//! The SQL dialects we know how to read and write.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::{format_err, Error, Result};

/// A procedural SQL dialect.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Deserialize, Serialize)]
pub enum Dialect {
    /// Microsoft SQL Server T-SQL.
    #[serde(rename = "sqlserver")]
    SqlServer,
    /// PostgreSQL PL/pgSQL.
    #[serde(rename = "postgresql", alias = "postgres")]
    PostgreSql,
    /// MySQL stored-program SQL.
    #[serde(rename = "mysql")]
    MySql,
}

impl Dialect {
    /// Every dialect we support.
    pub const ALL: [Dialect; 3] = [Dialect::SqlServer, Dialect::PostgreSql, Dialect::MySql];

    /// A human-readable product name, used in provenance comments.
    pub fn product_name(self) -> &'static str {
        match self {
            Dialect::SqlServer => "SQL Server",
            Dialect::PostgreSql => "PostgreSQL",
            Dialect::MySql => "MySQL",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::SqlServer => write!(f, "sqlserver"),
            Dialect::PostgreSql => write!(f, "postgresql"),
            Dialect::MySql => write!(f, "mysql"),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" | "tsql" => Ok(Dialect::SqlServer),
            "postgresql" | "postgres" | "pg" => Ok(Dialect::PostgreSql),
            "mysql" => Ok(Dialect::MySql),
            _ => Err(format_err!("unknown SQL dialect: {:?}", s)),
        }
    }
}

/// An ordered `(source, target)` pair of distinct dialects.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize)]
pub struct ConversionDirection {
    pub source: Dialect,
    pub target: Dialect,
}

impl ConversionDirection {
    /// Create a new direction. Identity pairs are rejected, because there is
    /// nothing to convert.
    pub fn new(source: Dialect, target: Dialect) -> Result<Self> {
        if source == target {
            return Err(Error::unsupported_direction(source, target));
        }
        Ok(Self { source, target })
    }

    /// All six valid directions.
    pub fn all() -> impl Iterator<Item = ConversionDirection> {
        Dialect::ALL.into_iter().flat_map(|source| {
            Dialect::ALL
                .into_iter()
                .filter(move |&target| target != source)
                .map(move |target| ConversionDirection { source, target })
        })
    }

    /// The same pair, pointing the other way.
    pub fn reversed(self) -> Self {
        Self {
            source: self.target,
            target: self.source,
        }
    }
}

impl fmt::Display for ConversionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_service_names() {
        assert_eq!("sqlserver".parse::<Dialect>().unwrap(), Dialect::SqlServer);
        assert_eq!("Postgres".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert!("oracle".parse::<Dialect>().is_err());
    }

    #[test]
    fn serde_uses_service_names() {
        let json = serde_json::to_string(&Dialect::PostgreSql).unwrap();
        assert_eq!(json, "\"postgresql\"");
        let dialect: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(dialect, Dialect::PostgreSql);
    }

    #[test]
    fn six_directions_and_no_identity() {
        let all = ConversionDirection::all().collect::<Vec<_>>();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|d| d.source != d.target));
        for dialect in Dialect::ALL {
            assert!(ConversionDirection::new(dialect, dialect).is_err());
        }
    }
}
