//! Data type mappings between dialects.
//!
//! Each direction has one `phf_map!` keyed by the upper-case type name. A key
//! may include arguments, like `VARCHAR(MAX)`, which wins over the bare name.
//! In the mapped value, `(*)` means "carry the source arguments over"; a value
//! without it drops them.

use crate::{
    dialect::{ConversionDirection, Dialect},
    util::squish,
};

static SQLSERVER_TO_POSTGRES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "BIGINT" => "bigint",
    "INT" => "integer",
    "INTEGER" => "integer",
    "SMALLINT" => "smallint",
    "TINYINT" => "smallint",
    "BIT" => "boolean",
    "DECIMAL" => "numeric(*)",
    "NUMERIC" => "numeric(*)",
    "MONEY" => "numeric(19,4)",
    "SMALLMONEY" => "numeric(10,4)",
    "FLOAT" => "double precision",
    "REAL" => "real",
    "CHAR" => "char(*)",
    "NCHAR" => "char(*)",
    "VARCHAR" => "varchar(*)",
    "NVARCHAR" => "varchar(*)",
    "VARCHAR(MAX)" => "text",
    "NVARCHAR(MAX)" => "text",
    "TEXT" => "text",
    "NTEXT" => "text",
    "DATE" => "date",
    "TIME" => "time(*)",
    "DATETIME" => "timestamp(3)",
    "DATETIME2" => "timestamp(*)",
    "SMALLDATETIME" => "timestamp(0)",
    "DATETIMEOFFSET" => "timestamptz(*)",
    "UNIQUEIDENTIFIER" => "uuid",
    "BINARY" => "bytea",
    "VARBINARY" => "bytea",
    "IMAGE" => "bytea",
    "ROWVERSION" => "bytea",
    "XML" => "xml",
    "SYSNAME" => "varchar(128)",
};

static SQLSERVER_TO_MYSQL: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "BIGINT" => "BIGINT",
    "INT" => "INT",
    "INTEGER" => "INT",
    "SMALLINT" => "SMALLINT",
    "TINYINT" => "TINYINT UNSIGNED",
    "BIT" => "TINYINT(1)",
    "DECIMAL" => "DECIMAL(*)",
    "NUMERIC" => "DECIMAL(*)",
    "MONEY" => "DECIMAL(19,4)",
    "SMALLMONEY" => "DECIMAL(10,4)",
    "FLOAT" => "DOUBLE",
    "REAL" => "FLOAT",
    "CHAR" => "CHAR(*)",
    "NCHAR" => "CHAR(*)",
    "VARCHAR" => "VARCHAR(*)",
    "NVARCHAR" => "VARCHAR(*)",
    "VARCHAR(MAX)" => "LONGTEXT",
    "NVARCHAR(MAX)" => "LONGTEXT",
    "TEXT" => "LONGTEXT",
    "NTEXT" => "LONGTEXT",
    "DATE" => "DATE",
    "TIME" => "TIME",
    "DATETIME" => "DATETIME(3)",
    "DATETIME2" => "DATETIME(6)",
    "SMALLDATETIME" => "DATETIME",
    "DATETIMEOFFSET" => "DATETIME(6)",
    "UNIQUEIDENTIFIER" => "CHAR(36)",
    "BINARY" => "BINARY(*)",
    "VARBINARY" => "VARBINARY(*)",
    "VARBINARY(MAX)" => "LONGBLOB",
    "IMAGE" => "LONGBLOB",
    "XML" => "LONGTEXT",
    "SYSNAME" => "VARCHAR(128)",
};

static POSTGRES_TO_SQLSERVER: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "INTEGER" => "INT",
    "INT" => "INT",
    "INT4" => "INT",
    "BIGINT" => "BIGINT",
    "INT8" => "BIGINT",
    "SMALLINT" => "SMALLINT",
    "INT2" => "SMALLINT",
    "SERIAL" => "INT",
    "BIGSERIAL" => "BIGINT",
    "BOOLEAN" => "BIT",
    "BOOL" => "BIT",
    "NUMERIC" => "DECIMAL(*)",
    "DECIMAL" => "DECIMAL(*)",
    "REAL" => "REAL",
    "FLOAT4" => "REAL",
    "DOUBLE PRECISION" => "FLOAT",
    "FLOAT8" => "FLOAT",
    "MONEY" => "MONEY",
    "TEXT" => "NVARCHAR(MAX)",
    "VARCHAR" => "NVARCHAR(*)",
    "CHARACTER VARYING" => "NVARCHAR(*)",
    "CHAR" => "NCHAR(*)",
    "CHARACTER" => "NCHAR(*)",
    "DATE" => "DATE",
    "TIME" => "TIME(*)",
    "TIMESTAMP" => "DATETIME2(*)",
    "TIMESTAMP WITHOUT TIME ZONE" => "DATETIME2(*)",
    "TIMESTAMPTZ" => "DATETIMEOFFSET(*)",
    "TIMESTAMP WITH TIME ZONE" => "DATETIMEOFFSET(*)",
    "UUID" => "UNIQUEIDENTIFIER",
    "BYTEA" => "VARBINARY(MAX)",
    "JSON" => "NVARCHAR(MAX)",
    "JSONB" => "NVARCHAR(MAX)",
    "XML" => "XML",
};

static POSTGRES_TO_MYSQL: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "INTEGER" => "INT",
    "INT" => "INT",
    "INT4" => "INT",
    "BIGINT" => "BIGINT",
    "INT8" => "BIGINT",
    "SMALLINT" => "SMALLINT",
    "INT2" => "SMALLINT",
    "TINYINT" => "TINYINT(*)",
    "SERIAL" => "INT",
    "BIGSERIAL" => "BIGINT",
    "BOOLEAN" => "TINYINT(1)",
    "BOOL" => "TINYINT(1)",
    "NUMERIC" => "DECIMAL(*)",
    "DECIMAL" => "DECIMAL(*)",
    "REAL" => "FLOAT",
    "FLOAT4" => "FLOAT",
    "FLOAT" => "FLOAT",
    "DOUBLE PRECISION" => "DOUBLE",
    "FLOAT8" => "DOUBLE",
    "DOUBLE" => "DOUBLE",
    "MONEY" => "DECIMAL(19,4)",
    "TEXT" => "TEXT",
    "LONGTEXT" => "LONGTEXT",
    "VARCHAR" => "VARCHAR(*)",
    "CHARACTER VARYING" => "VARCHAR(*)",
    "CHAR" => "CHAR(*)",
    "CHARACTER" => "CHAR(*)",
    "DATE" => "DATE",
    "TIME" => "TIME(*)",
    "TIMESTAMP" => "DATETIME(*)",
    "DATETIME" => "DATETIME(*)",
    "TIMESTAMP WITHOUT TIME ZONE" => "DATETIME(*)",
    "TIMESTAMPTZ" => "DATETIME(*)",
    "TIMESTAMP WITH TIME ZONE" => "DATETIME(*)",
    "UUID" => "CHAR(36)",
    "BYTEA" => "LONGBLOB",
    "LONGBLOB" => "LONGBLOB",
    "JSON" => "JSON",
    "JSONB" => "JSON",
};

static MYSQL_TO_SQLSERVER: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "INT" => "INT",
    "INTEGER" => "INT",
    "BIGINT" => "BIGINT",
    "SMALLINT" => "SMALLINT",
    "MEDIUMINT" => "INT",
    "TINYINT" => "TINYINT",
    "TINYINT(1)" => "BIT",
    "BOOLEAN" => "BIT",
    "BOOL" => "BIT",
    "INT UNSIGNED" => "BIGINT",
    "BIGINT UNSIGNED" => "DECIMAL(20,0)",
    "TINYINT UNSIGNED" => "TINYINT",
    "SIGNED" => "BIGINT",
    "SIGNED INTEGER" => "BIGINT",
    "UNSIGNED" => "DECIMAL(20,0)",
    "DECIMAL" => "DECIMAL(*)",
    "NUMERIC" => "DECIMAL(*)",
    "FLOAT" => "REAL",
    "DOUBLE" => "FLOAT",
    "CHAR" => "NCHAR(*)",
    "VARCHAR" => "NVARCHAR(*)",
    "TINYTEXT" => "NVARCHAR(255)",
    "TEXT" => "NVARCHAR(MAX)",
    "MEDIUMTEXT" => "NVARCHAR(MAX)",
    "LONGTEXT" => "NVARCHAR(MAX)",
    "DATE" => "DATE",
    "TIME" => "TIME(*)",
    "DATETIME" => "DATETIME2(*)",
    "TIMESTAMP" => "DATETIME2(*)",
    "YEAR" => "SMALLINT",
    "BLOB" => "VARBINARY(MAX)",
    "LONGBLOB" => "VARBINARY(MAX)",
    "BINARY" => "BINARY(*)",
    "VARBINARY" => "VARBINARY(*)",
    "JSON" => "NVARCHAR(MAX)",
};

static MYSQL_TO_POSTGRES: phf::Map<&'static str, &'static str> = phf::phf_map! {
    "INT" => "integer",
    "INTEGER" => "integer",
    "BIGINT" => "bigint",
    "SMALLINT" => "smallint",
    "MEDIUMINT" => "integer",
    "TINYINT" => "smallint",
    "TINYINT(1)" => "boolean",
    "BOOLEAN" => "boolean",
    "BOOL" => "boolean",
    "INT UNSIGNED" => "bigint",
    "BIGINT UNSIGNED" => "numeric(20,0)",
    "TINYINT UNSIGNED" => "smallint",
    "SIGNED" => "bigint",
    "SIGNED INTEGER" => "bigint",
    "UNSIGNED" => "numeric(20,0)",
    "DECIMAL" => "numeric(*)",
    "NUMERIC" => "numeric(*)",
    "FLOAT" => "real",
    "REAL" => "real",
    "DOUBLE" => "double precision",
    "DOUBLE PRECISION" => "double precision",
    "CHAR" => "char(*)",
    "VARCHAR" => "varchar(*)",
    "TINYTEXT" => "text",
    "TEXT" => "text",
    "MEDIUMTEXT" => "text",
    "LONGTEXT" => "text",
    "DATE" => "date",
    "TIME" => "time(*)",
    "DATETIME" => "timestamp(*)",
    "TIMESTAMP" => "timestamp(*)",
    "YEAR" => "smallint",
    "BLOB" => "bytea",
    "LONGBLOB" => "bytea",
    "BINARY" => "bytea",
    "VARBINARY" => "bytea",
    "JSON" => "jsonb",
};

fn table(direction: ConversionDirection) -> &'static phf::Map<&'static str, &'static str> {
    match (direction.source, direction.target) {
        (Dialect::SqlServer, Dialect::PostgreSql) => &SQLSERVER_TO_POSTGRES,
        (Dialect::SqlServer, _) => &SQLSERVER_TO_MYSQL,
        (Dialect::PostgreSql, Dialect::SqlServer) => &POSTGRES_TO_SQLSERVER,
        (Dialect::PostgreSql, _) => &POSTGRES_TO_MYSQL,
        (Dialect::MySql, Dialect::SqlServer) => &MYSQL_TO_SQLSERVER,
        (Dialect::MySql, _) => &MYSQL_TO_POSTGRES,
    }
}

/// A type name split into its parts.
#[derive(Debug, PartialEq, Eq)]
struct TypeName {
    /// Upper case, single spaces, without arguments.
    base: String,
    args: Option<String>,
}

fn parse(text: &str) -> Option<TypeName> {
    let text = squish(text);
    if text.is_empty() || text.ends_with("[]") || text.contains('%') {
        return None;
    }
    let (base, args) = match text.find('(') {
        Some(open) => {
            let close = text.rfind(')')?;
            let base = format!("{} {}", &text[..open], &text[close + 1..]);
            (squish(&base), Some(text[open + 1..close].trim().to_owned()))
        }
        None => (text.clone(), None),
    };
    Some(TypeName {
        base: base.to_ascii_uppercase(),
        args,
    })
}

/// Translate the type `text` for `direction`. Returns `None` for types we
/// have no mapping for.
pub fn map_type(text: &str, direction: ConversionDirection) -> Option<String> {
    let parsed = parse(text)?;
    let table = table(direction);
    let with_args = parsed.args.as_ref().map(|args| {
        format!(
            "{}({})",
            parsed.base,
            args.to_ascii_uppercase().replace(' ', "")
        )
    });
    let value = with_args
        .as_deref()
        .and_then(|key| table.get(key))
        .or_else(|| table.get(parsed.base.as_str()))?;
    Some(render(value, parsed.args.as_deref(), direction.target))
}

/// Translate a type, keeping it unchanged with a reason when we can't.
pub(crate) fn translate(text: &str, direction: ConversionDirection) -> (String, Option<String>) {
    match map_type(text, direction) {
        Some(mapped) => (mapped, None),
        None => (
            text.trim().to_owned(),
            Some(format!(
                "no {} equivalent known for type {}",
                direction.target.product_name(),
                squish(text)
            )),
        ),
    }
}

fn render(value: &str, args: Option<&str>, target: Dialect) -> String {
    let Some(base) = value.strip_suffix("(*)") else {
        return value.to_owned();
    };
    match args {
        Some(args) => format!("{}({})", base, args),
        // Unbounded strings.
        None if base.eq_ignore_ascii_case("VARCHAR") || base.eq_ignore_ascii_case("NVARCHAR") => {
            match target {
                Dialect::SqlServer => format!("{}(MAX)", base),
                Dialect::MySql => "TEXT".to_owned(),
                Dialect::PostgreSql => base.to_owned(),
            }
        }
        None => base.to_owned(),
    }
}

/// MySQL only accepts a few type names in `CAST`. Map a MySQL column type to
/// the closest one.
pub fn mysql_cast_type(data_type: &str) -> String {
    let Some(parsed) = parse(data_type) else {
        return data_type.to_owned();
    };
    let base = parsed.base.trim_end_matches(" UNSIGNED");
    let args = parsed.args.map(|a| format!("({})", a)).unwrap_or_default();
    match base {
        "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" => "SIGNED".to_owned(),
        "VARCHAR" | "CHAR" => format!("CHAR{}", args),
        "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => "CHAR".to_owned(),
        "BLOB" | "LONGBLOB" | "VARBINARY" => "BINARY".to_owned(),
        _ => data_type.to_owned(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dir(source: Dialect, target: Dialect) -> ConversionDirection {
        ConversionDirection::new(source, target).unwrap()
    }

    #[test]
    fn arguments_are_carried_or_dropped() {
        let to_pg = dir(Dialect::SqlServer, Dialect::PostgreSql);
        assert_eq!(map_type("INT", to_pg).as_deref(), Some("integer"));
        assert_eq!(map_type("NVARCHAR(100)", to_pg).as_deref(), Some("varchar(100)"));
        assert_eq!(map_type("nvarchar(max)", to_pg).as_deref(), Some("text"));
        assert_eq!(map_type("DECIMAL(10, 2)", to_pg).as_deref(), Some("numeric(10, 2)"));
        assert_eq!(map_type("VARBINARY(16)", to_pg).as_deref(), Some("bytea"));
        assert_eq!(map_type("GEOGRAPHY", to_pg), None);
    }

    #[test]
    fn multi_word_and_unbounded_types() {
        let to_ss = dir(Dialect::PostgreSql, Dialect::SqlServer);
        assert_eq!(map_type("double precision", to_ss).as_deref(), Some("FLOAT"));
        assert_eq!(map_type("timestamp(3) with time zone", to_ss).as_deref(), Some("DATETIMEOFFSET(3)"));
        assert_eq!(map_type("varchar", to_ss).as_deref(), Some("NVARCHAR(MAX)"));
        assert_eq!(map_type("integer[]", to_ss), None);
        assert_eq!(map_type("employees.id%TYPE", to_ss), None);
        let to_mysql = dir(Dialect::PostgreSql, Dialect::MySql);
        assert_eq!(map_type("varchar", to_mysql).as_deref(), Some("TEXT"));
        assert_eq!(map_type("TINYINT(1)", to_mysql).as_deref(), Some("TINYINT(1)"));
    }

    #[test]
    fn mysql_display_widths_and_booleans() {
        let to_pg = dir(Dialect::MySql, Dialect::PostgreSql);
        assert_eq!(map_type("INT(11)", to_pg).as_deref(), Some("integer"));
        assert_eq!(map_type("tinyint(1)", to_pg).as_deref(), Some("boolean"));
        assert_eq!(map_type("INT UNSIGNED", to_pg).as_deref(), Some("bigint"));
    }

    #[test]
    fn round_trips_keep_common_types() {
        for (source, target) in [
            (Dialect::SqlServer, Dialect::PostgreSql),
            (Dialect::SqlServer, Dialect::MySql),
        ] {
            let there = map_type("INT", dir(source, target)).unwrap();
            let back = map_type(&there, dir(target, source)).unwrap();
            assert_eq!(back, "INT");
        }
    }

    #[test]
    fn mysql_casts() {
        assert_eq!(mysql_cast_type("INT"), "SIGNED");
        assert_eq!(mysql_cast_type("VARCHAR(20)"), "CHAR(20)");
        assert_eq!(mysql_cast_type("DECIMAL(10,2)"), "DECIMAL(10,2)");
    }
}
