//! PL/pgSQL functions.

use std::fmt;

use super::{else_if, Handler, Item, Out, Routine, Statement, Syntax};

struct PlPgSql;

impl Syntax for PlPgSql {
    fn no_op(&self) -> &'static str {
        "NULL;"
    }

    fn write_if(
        &self,
        out: &mut Out<'_, '_>,
        condition: &Item,
        then: &[Statement],
        otherwise: Option<&[Statement]>,
    ) -> fmt::Result {
        out.notes(&condition.notes)?;
        out.line(&format!("IF {} THEN", condition.text.trim()))?;
        out.nested(|out| self.write_statements(out, then))?;
        let mut otherwise = otherwise;
        while let Some((condition, then, rest)) = else_if(otherwise) {
            out.notes(&condition.notes)?;
            out.line(&format!("ELSIF {} THEN", condition.text.trim()))?;
            out.nested(|out| self.write_statements(out, then))?;
            otherwise = rest;
        }
        if let Some(otherwise) = otherwise {
            out.line("ELSE")?;
            out.nested(|out| self.write_statements(out, otherwise))?;
        }
        out.line("END IF;")
    }

    fn write_while(&self, out: &mut Out<'_, '_>, condition: &Item, body: &[Statement]) -> fmt::Result {
        out.notes(&condition.notes)?;
        out.line(&format!("WHILE {} LOOP", condition.text.trim()))?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END LOOP;")
    }

    fn write_block(&self, out: &mut Out<'_, '_>, body: &[Statement]) -> fmt::Result {
        out.line("BEGIN")?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END;")
    }

    fn write_try(&self, out: &mut Out<'_, '_>, body: &[Statement], handler: &Handler) -> fmt::Result {
        out.line("BEGIN")?;
        out.nested(|out| self.write_statements(out, body))?;
        self.write_exception(out, handler)?;
        out.line("END;")
    }
}

impl PlPgSql {
    fn write_exception(&self, out: &mut Out<'_, '_>, handler: &Handler) -> fmt::Result {
        out.line("EXCEPTION")?;
        out.nested(|out| {
            out.line(&format!(
                "WHEN {} THEN",
                handler.condition.as_deref().unwrap_or("OTHERS")
            ))?;
            out.nested(|out| self.write_statements(out, &handler.statements))
        })
    }
}

pub(super) fn write(routine: &Routine, out: &mut Out<'_, '_>) -> fmt::Result {
    let syntax = PlPgSql;
    out.notes(&routine.header.notes)?;
    if routine.parameters.is_empty() {
        out.line(&format!("{}()", routine.header.text.trim()))?;
    } else {
        out.line(&format!("{}(", routine.header.text.trim()))?;
        out.nested(|out| out.list(&routine.parameters))?;
        out.line(")")?;
    }
    if let Some(returns) = &routine.returns {
        out.line(&format!("RETURNS {}", returns))?;
    }
    out.line("LANGUAGE plpgsql")?;
    for attribute in &routine.attributes {
        out.line(attribute)?;
    }

    let tag = if routine.mentions("$$") { "$body$" } else { "$$" };
    out.line(&format!("AS {}", tag))?;
    if !routine.declarations.is_empty() {
        out.line("DECLARE")?;
        out.nested(|out| {
            for declaration in &routine.declarations {
                out.item(declaration, ";")?;
            }
            Ok(())
        })?;
    }
    out.line("BEGIN")?;
    out.nested(|out| syntax.write_statements(out, &routine.body))?;
    if let Some(handler) = &routine.handler {
        syntax.write_exception(out, handler)?;
    }
    out.line("END;")?;
    out.line(&format!("{};", tag))
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::{config::EngineConfig, dialect::Dialect, format::render, unit::RoutineKind};

    use super::*;

    fn simple(text: &str) -> Statement {
        Statement::Simple(Item::new(text))
    }

    #[test]
    fn function_with_declarations_and_handler() {
        let mut config = EngineConfig::default();
        config.provenance_comment = false;
        let mut r = crate::format::test::routine(Dialect::PostgreSql);
        r.kind = RoutineKind::Function;
        r.header = Item::new("CREATE OR REPLACE FUNCTION get_total");
        r.parameters = vec![Item::new("customer_id integer"), Item::new("OUT total numeric")];
        r.declarations = vec![Item::new("n integer := 0")];
        r.body = vec![
            Statement::If {
                condition: Item::new("customer_id IS NULL"),
                then: vec![simple("RETURN")],
                otherwise: Some(vec![Statement::If {
                    condition: Item::new("customer_id < 0"),
                    then: vec![simple("n := 1")],
                    otherwise: None,
                }]),
            },
            simple("SELECT SUM(amount) INTO total FROM orders WHERE orders.customer_id = get_total.customer_id"),
        ];
        r.handler = Some(Handler {
            condition: None,
            statements: vec![simple("RAISE")],
        });
        assert_eq!(
            render(&r, &config),
            "\
CREATE OR REPLACE FUNCTION get_total(
    customer_id integer,
    OUT total numeric
)
LANGUAGE plpgsql
AS $$
DECLARE
    n integer := 0;
BEGIN
    IF customer_id IS NULL THEN
        RETURN;
    ELSIF customer_id < 0 THEN
        n := 1;
    END IF;
    SELECT SUM(amount) INTO total FROM orders WHERE orders.customer_id = get_total.customer_id;
EXCEPTION
    WHEN OTHERS THEN
        RAISE;
END;
$$;
"
        );
    }

    #[test]
    fn loops_and_nested_handlers() {
        let mut config = EngineConfig::default();
        config.provenance_comment = false;
        let mut r = crate::format::test::routine(Dialect::PostgreSql);
        r.returns = Some("void".to_owned());
        r.body = vec![Statement::While {
            condition: Item::new("i < 10"),
            body: vec![Statement::Try {
                body: vec![simple("i := i + 1")],
                handler: Handler {
                    condition: Some("unique_violation".to_owned()),
                    statements: vec![],
                },
            }],
        }];
        let text = render(&r, &config);
        assert!(text.contains(
            "    WHILE i < 10 LOOP\n        BEGIN\n            i := i + 1;\n        EXCEPTION\n            WHEN unique_violation THEN\n                NULL;\n        END;\n    END LOOP;\n"
        ), "{}", text);
        assert!(text.contains("RETURNS void\n"));
    }
}
