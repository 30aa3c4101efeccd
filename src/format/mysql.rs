//! MySQL stored procedures and functions, as a client script with its own
//! delimiter.

use std::fmt;

use crate::{rules::BODY_LABEL, unit::RoutineKind};

use super::{else_if, Handler, Item, Out, Routine, Statement, Syntax};

struct MySql;

impl Syntax for MySql {
    fn no_op(&self) -> &'static str {
        "DO 0;"
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
            out.line(&format!("ELSEIF {} THEN", condition.text.trim()))?;
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
        out.line(&format!("WHILE {} DO", condition.text.trim()))?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END WHILE;")
    }

    fn write_block(&self, out: &mut Out<'_, '_>, body: &[Statement]) -> fmt::Result {
        out.line("BEGIN")?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END;")
    }

    /// MySQL handlers are declarations at the top of a block.
    fn write_try(&self, out: &mut Out<'_, '_>, body: &[Statement], handler: &Handler) -> fmt::Result {
        out.line("BEGIN")?;
        out.nested(|out| {
            self.write_handler(out, handler)?;
            self.write_statements(out, body)
        })?;
        out.line("END;")
    }
}

impl MySql {
    fn write_handler(&self, out: &mut Out<'_, '_>, handler: &Handler) -> fmt::Result {
        out.line(&format!(
            "DECLARE EXIT HANDLER FOR {}",
            handler.condition.as_deref().unwrap_or("SQLEXCEPTION")
        ))?;
        self.write_block(out, &handler.statements)
    }
}

pub(super) fn write(routine: &Routine, out: &mut Out<'_, '_>) -> fmt::Result {
    let syntax = MySql;
    let delimiter = if routine.mentions("$$") { "//" } else { "$$" };
    out.line(&format!("DELIMITER {}", delimiter))?;
    if out.config().mysql_drop_if_exists {
        let kind = match routine.kind {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        };
        out.line(&format!("DROP {} IF EXISTS {}{}", kind, routine.name, delimiter))?;
    }
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
    for attribute in &routine.attributes {
        out.line(attribute)?;
    }

    let leave = format!("LEAVE {}", BODY_LABEL);
    if routine.mentions(&leave) {
        out.line(&format!("{}: BEGIN", BODY_LABEL))?;
    } else {
        out.line("BEGIN")?;
    }
    out.nested(|out| {
        for declaration in &routine.declarations {
            out.item(declaration, ";")?;
        }
        if let Some(handler) = &routine.handler {
            syntax.write_handler(out, handler)?;
        }
        syntax.write_statements(out, &routine.body)
    })?;
    out.line(&format!("END{}", delimiter))?;
    out.line("DELIMITER ;")
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::{config::EngineConfig, dialect::Dialect, format::render};

    use super::*;

    fn simple(text: &str) -> Statement {
        Statement::Simple(Item::new(text))
    }

    #[test]
    fn procedure_with_handler_and_early_exit() {
        let mut config = EngineConfig::default();
        config.provenance_comment = false;
        let mut r = crate::format::test::routine(Dialect::MySql);
        r.name = "update_status".to_owned();
        r.header = Item::new("CREATE PROCEDURE update_status");
        r.parameters = vec![Item::new("IN p_order_id INT"), Item::new("IN p_status VARCHAR(20)")];
        r.declarations = vec![Item::new("DECLARE v_count INT DEFAULT 0")];
        r.body = vec![
            Statement::If {
                condition: Item::new("p_order_id IS NULL"),
                then: vec![simple("LEAVE routine_body")],
                otherwise: None,
            },
            simple("UPDATE orders SET status = p_status WHERE id = p_order_id"),
        ];
        r.handler = Some(Handler {
            condition: None,
            statements: vec![simple("ROLLBACK"), simple("RESIGNAL")],
        });
        assert_eq!(
            render(&r, &config),
            "\
DELIMITER $$
DROP PROCEDURE IF EXISTS update_status$$
CREATE PROCEDURE update_status(
    IN p_order_id INT,
    IN p_status VARCHAR(20)
)
routine_body: BEGIN
    DECLARE v_count INT DEFAULT 0;
    DECLARE EXIT HANDLER FOR SQLEXCEPTION
    BEGIN
        ROLLBACK;
        RESIGNAL;
    END;
    IF p_order_id IS NULL THEN
        LEAVE routine_body;
    END IF;
    UPDATE orders SET status = p_status WHERE id = p_order_id;
END$$
DELIMITER ;
"
        );
    }

    #[test]
    fn functions_and_loops() {
        let mut config = EngineConfig::default();
        config.provenance_comment = false;
        config.mysql_drop_if_exists = false;
        let mut r = crate::format::test::routine(Dialect::MySql);
        r.kind = RoutineKind::Function;
        r.header = Item::new("CREATE FUNCTION f");
        r.returns = Some("INT".to_owned());
        r.attributes = vec!["DETERMINISTIC".to_owned()];
        r.body = vec![
            Statement::While {
                condition: Item::new("i < 3"),
                body: vec![simple("SET i = i + 1")],
            },
            simple("RETURN i"),
        ];
        let text = render(&r, &config);
        assert!(!text.contains("DROP"));
        assert!(text.contains("CREATE FUNCTION f()\nRETURNS INT\nDETERMINISTIC\nBEGIN\n"), "{}", text);
        assert!(text.contains("    WHILE i < 3 DO\n        SET i = i + 1;\n    END WHILE;\n"));
    }
}
