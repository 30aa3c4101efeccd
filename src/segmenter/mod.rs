//! Split procedural SQL source into a [`ProcedureUnit`].
//!
//! Each dialect gets its own header and body reader, but they share the
//! tokenizer, the depth-tracking [`scanner`], and the handling of anything
//! found before the `CREATE` header.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument};

use crate::{
    dialect::Dialect,
    errors::Result,
    unit::{Declaration, Fragment, ProcedureUnit, Stmt},
};

use self::scanner::Source;

mod blocks;
mod mysql;
mod postgres;
mod scanner;
mod sqlserver;

/// Split `sql` into regions.
///
/// Fails with [`crate::errors::Error::MalformedUnit`] when there is no
/// recognizable routine header, or when `BEGIN`/`END` never balance.
#[instrument(level = "debug", skip(sql))]
pub fn segment(sql: &str, dialect: Dialect) -> Result<ProcedureUnit> {
    let unit = match dialect {
        Dialect::SqlServer => sqlserver::segment(sql)?,
        Dialect::PostgreSql => postgres::segment(sql)?,
        Dialect::MySql => mysql::segment(sql)?,
    };
    debug!(
        name = %unit.header.name,
        parameters = unit.parameters.len(),
        declarations = unit.declarations.len(),
        statements = unit.body.len(),
        has_handler = unit.error_handling.is_some(),
        "segmented procedural unit"
    );
    Ok(unit)
}

/// Setup statements that usually surround a routine definition and carry no
/// meaning of their own once the routine is converted.
static BOILERPLATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^(?:GO|SET\s+(?:ANSI_NULLS|QUOTED_IDENTIFIER|ANSI_PADDING|ANSI_WARNINGS|ARITHABORT|CONCAT_NULL_YIELDS_NULL)\b.*|DROP\s+(?:PROC|PROCEDURE|FUNCTION)\b.*|IF\s+(?:OBJECT_ID|EXISTS)\b.*\bDROP\s+(?:PROC|PROCEDURE|FUNCTION)\b.*)$",
    )
    .unwrap()
});

/// Split the tokens before the routine header into statements, and keep the
/// ones that aren't boilerplate.
///
/// Statements are separated by `;`, by `GO`, or by any of the characters in
/// `delimiter` (a MySQL custom delimiter).
pub(crate) fn preamble(src: &Source<'_>, range: Range<usize>, delimiter: &str) -> Vec<Fragment> {
    let is_separator = |i: usize| {
        let tok = &src.toks[i];
        tok.is_punct(";")
            || tok.is_keyword("GO")
            || (tok.kind == crate::tokenizer::TokenKind::Punct
                && !delimiter.is_empty()
                && tok.text.chars().all(|c| delimiter.contains(c)))
    };

    let mut out = vec![];
    let mut start = range.start;
    for i in range.clone() {
        if is_separator(i) {
            if start < i {
                out.push(src.fragment(start..i));
            }
            start = i + 1;
        }
    }
    if start < range.end {
        out.push(src.fragment(start..range.end));
    }
    out.retain(|f| !BOILERPLATE.is_match(&f.text));
    out
}

/// A `DECLARE` statement split into one declaration per name.
pub(crate) struct ParsedDeclaration {
    pub declaration: Declaration,
    /// The initial value, if any.
    pub initializer: Option<String>,
    /// The declaration without its initial value.
    pub bare_text: String,
}

/// Is `stmt` a `DECLARE` statement?
fn is_declare(stmt: &Stmt) -> Option<&Fragment> {
    match stmt {
        Stmt::Simple(f) if starts_with_keyword(&f.text, "DECLARE") => Some(f),
        _ => None,
    }
}

/// Does `text` start with `keyword`, followed by a non-identifier character?
pub(crate) fn starts_with_keyword(text: &str, keyword: &str) -> bool {
    text.len() >= keyword.len()
        && text.is_char_boundary(keyword.len())
        && text[..keyword.len()].eq_ignore_ascii_case(keyword)
        && text[keyword.len()..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_')
}

/// Move `DECLARE` statements out of `body` and into a declaration list.
///
/// Declarations at the very top of the body keep their initial values.
/// Declarations found later, or inside nested blocks, are hoisted without
/// their initial value, and an assignment built by `assign(name, value)` is
/// left where the declaration used to be.
pub(crate) fn hoist_declarations(
    body: Vec<Stmt>,
    parse: &dyn Fn(&Fragment) -> Vec<ParsedDeclaration>,
    assign: &dyn Fn(&str, &str) -> String,
) -> (Vec<Declaration>, Vec<Stmt>) {
    let mut declarations = vec![];
    let mut leading = true;
    let mut out = vec![];
    for stmt in body {
        if let Some(frag) = is_declare(&stmt) {
            for parsed in parse(frag) {
                hoist_one(parsed, leading, &mut declarations, &mut out, assign);
            }
            continue;
        }
        if !matches!(stmt, Stmt::Comment(_)) {
            leading = false;
        }
        out.push(hoist_nested(stmt, parse, assign, &mut declarations));
    }
    (declarations, out)
}

fn hoist_one(
    parsed: ParsedDeclaration,
    keep_initializer: bool,
    declarations: &mut Vec<Declaration>,
    out: &mut Vec<Stmt>,
    assign: &dyn Fn(&str, &str) -> String,
) {
    let ParsedDeclaration {
        mut declaration,
        initializer,
        bare_text,
    } = parsed;
    if !keep_initializer {
        if let Some(value) = initializer {
            out.push(Stmt::Simple(Fragment::new(
                assign(&declaration.name, &value),
                declaration.span.clone(),
            )));
            declaration.text = bare_text;
        }
    }
    declarations.push(declaration);
}

fn hoist_nested(
    stmt: Stmt,
    parse: &dyn Fn(&Fragment) -> Vec<ParsedDeclaration>,
    assign: &dyn Fn(&str, &str) -> String,
    declarations: &mut Vec<Declaration>,
) -> Stmt {
    let mut list = |stmts: Vec<Stmt>| -> Vec<Stmt> {
        let mut out = vec![];
        for stmt in stmts {
            match is_declare(&stmt) {
                Some(frag) => {
                    for parsed in parse(frag) {
                        hoist_one(parsed, false, declarations, &mut out, assign);
                    }
                }
                None => out.push(hoist_nested(stmt, parse, assign, declarations)),
            }
        }
        out
    };
    match stmt {
        Stmt::Block(stmts) => Stmt::Block(list(stmts)),
        Stmt::If {
            condition,
            then,
            otherwise,
        } => {
            let then = list(then);
            let otherwise = otherwise.map(&mut list);
            Stmt::If {
                condition,
                then,
                otherwise,
            }
        }
        Stmt::While { condition, body } => Stmt::While {
            condition,
            body: list(body),
        },
        Stmt::Try { body, mut handler } => {
            let body = list(body);
            handler.statements = list(handler.statements);
            Stmt::Try { body, handler }
        }
        other => other,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::unit::{ParamMode, RoutineKind};

    #[test]
    fn sqlserver_example_segments() {
        let sql = "CREATE PROCEDURE dbo.GetEmployeeById\n@EmployeeId INT\nAS\nBEGIN\n    SELECT * FROM Employees WHERE EmployeeId = @EmployeeId\nEND";
        let unit = segment(sql, Dialect::SqlServer).unwrap();
        assert_eq!(unit.header.kind, RoutineKind::Procedure);
        assert_eq!(unit.header.schema.as_deref(), Some("dbo"));
        assert_eq!(unit.header.name, "GetEmployeeById");
        assert_eq!(unit.parameters.len(), 1);
        assert_eq!(unit.parameters[0].name, "EmployeeId");
        assert_eq!(unit.parameters[0].data_type, "INT");
        assert_eq!(unit.body.len(), 1);
        assert!(
            matches!(&unit.body[0], Stmt::Simple(f) if f.text == "SELECT * FROM Employees WHERE EmployeeId = @EmployeeId")
        );
    }

    #[test]
    fn postgres_example_segments() {
        let sql = "CREATE OR REPLACE FUNCTION insert_product(\n    p_name TEXT,\n    p_price DECIMAL(10,2)\n)\nRETURNS INTEGER AS $$\nDECLARE\n    v_product_id INTEGER;\nBEGIN\n    INSERT INTO products (name, price) VALUES (p_name, p_price)\n    RETURNING product_id INTO v_product_id;\n    RETURN v_product_id;\nEND;\n$$ LANGUAGE plpgsql;";
        let unit = segment(sql, Dialect::PostgreSql).unwrap();
        assert!(unit.header.or_replace);
        assert_eq!(unit.header.kind, RoutineKind::Function);
        assert_eq!(unit.parameters[1].data_type, "DECIMAL(10,2)");
        assert_eq!(unit.declarations.len(), 1);
        assert_eq!(unit.declarations[0].name, "v_product_id");
        assert_eq!(unit.body.len(), 2);
        assert_eq!(unit.terminator.language.as_deref(), Some("plpgsql"));
        assert_eq!(unit.terminator.dollar_tag.as_deref(), Some("$$"));
    }

    #[test]
    fn mysql_example_segments() {
        let sql = "DELIMITER $$\n\nCREATE PROCEDURE UpdateOrderStatus(\n    IN p_order_id INT,\n    OUT p_status VARCHAR(50)\n)\nBEGIN\n    DECLARE EXIT HANDLER FOR SQLEXCEPTION\n    BEGIN\n        ROLLBACK;\n        RESIGNAL;\n    END;\n    START TRANSACTION;\n    UPDATE Orders SET Status = 'x' WHERE OrderId = p_order_id;\n    COMMIT;\nEND$$\n\nDELIMITER ;";
        let unit = segment(sql, Dialect::MySql).unwrap();
        assert_eq!(unit.parameters[1].mode, ParamMode::Out);
        let handler = unit.error_handling.as_ref().unwrap();
        assert_eq!(handler.statements.len(), 2);
        assert_eq!(unit.body.len(), 3);
        assert_eq!(unit.terminator.delimiter.as_deref(), Some("$$"));
        assert!(unit.preamble.is_empty());
    }

    #[test]
    fn nested_blocks_never_truncate_the_body() {
        for depth in 0..=5 {
            let mut body = "SELECT 1".to_owned();
            for _ in 0..depth {
                body = format!("BEGIN {} END", body);
            }
            let sql = format!("CREATE PROCEDURE p AS BEGIN {} SELECT 2 END", body);
            let unit = segment(&sql, Dialect::SqlServer).unwrap();
            let last = unit.body.last().unwrap();
            assert!(
                matches!(last, Stmt::Simple(f) if f.text == "SELECT 2"),
                "depth {depth}: {last:?}"
            );
        }
    }

    #[test]
    fn missing_header_and_unbalanced_blocks_are_malformed() {
        let err = segment("SELECT 1", Dialect::SqlServer).unwrap_err();
        assert!(err.is_terminal_input_error());
        let err = segment(
            "CREATE PROCEDURE p AS BEGIN BEGIN SELECT 1 END",
            Dialect::SqlServer,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unbalanced BEGIN/END"));
    }

    #[test]
    fn late_declarations_are_hoisted_with_assignments() {
        let sql = "CREATE PROCEDURE p AS BEGIN DECLARE @a INT = 1, @b INT SET @b = 2 IF @a = 1 BEGIN DECLARE @c INT = @b + 1 END END";
        let unit = segment(sql, Dialect::SqlServer).unwrap();
        let names = unit
            .declarations
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(unit.declarations[0].text, "DECLARE @a INT = 1");
        assert_eq!(unit.declarations[2].text, "DECLARE @c INT");
        match &unit.body[1] {
            Stmt::If { then, .. } => {
                assert!(matches!(&then[0], Stmt::Simple(f) if f.text == "SET @c = @b + 1"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn boilerplate_preamble_is_dropped() {
        let sql = "SET ANSI_NULLS ON\nGO\nSET QUOTED_IDENTIFIER ON\nGO\nUSE Sales\nGO\nCREATE PROCEDURE p AS SELECT 1\nGO";
        let unit = segment(sql, Dialect::SqlServer).unwrap();
        assert_eq!(unit.preamble.len(), 1);
        assert_eq!(unit.preamble[0].text, "USE Sales");
        assert_eq!(unit.body.len(), 1);
    }
}
