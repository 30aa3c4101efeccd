//! T-SQL procedures.

use std::fmt;

use super::{else_if, Handler, Item, Out, Routine, Statement, Syntax};

struct TSql;

impl TSql {
    /// T-SQL `IF` and `WHILE` take one statement, so we always use a block.
    fn write_body(&self, out: &mut Out<'_, '_>, body: &[Statement]) -> fmt::Result {
        out.line("BEGIN")?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END")
    }
}

impl Syntax for TSql {
    fn no_op(&self) -> &'static str {
        "PRINT '';"
    }

    fn write_if(
        &self,
        out: &mut Out<'_, '_>,
        condition: &Item,
        then: &[Statement],
        otherwise: Option<&[Statement]>,
    ) -> fmt::Result {
        out.notes(&condition.notes)?;
        out.line(&format!("IF {}", condition.text.trim()))?;
        self.write_body(out, then)?;
        let mut otherwise = otherwise;
        while let Some((condition, then, rest)) = else_if(otherwise) {
            out.notes(&condition.notes)?;
            out.line(&format!("ELSE IF {}", condition.text.trim()))?;
            self.write_body(out, then)?;
            otherwise = rest;
        }
        if let Some(otherwise) = otherwise {
            out.line("ELSE")?;
            self.write_body(out, otherwise)?;
        }
        Ok(())
    }

    fn write_while(&self, out: &mut Out<'_, '_>, condition: &Item, body: &[Statement]) -> fmt::Result {
        out.notes(&condition.notes)?;
        out.line(&format!("WHILE {}", condition.text.trim()))?;
        self.write_body(out, body)
    }

    fn write_block(&self, out: &mut Out<'_, '_>, body: &[Statement]) -> fmt::Result {
        self.write_body(out, body)
    }

    fn write_try(&self, out: &mut Out<'_, '_>, body: &[Statement], handler: &Handler) -> fmt::Result {
        out.line("BEGIN TRY")?;
        out.nested(|out| self.write_statements(out, body))?;
        out.line("END TRY")?;
        out.line("BEGIN CATCH")?;
        out.nested(|out| self.write_statements(out, &handler.statements))?;
        out.line("END CATCH")
    }
}

pub(super) fn write(routine: &Routine, out: &mut Out<'_, '_>) -> fmt::Result {
    let syntax = TSql;
    out.notes(&routine.header.notes)?;
    out.line(routine.header.text.trim())?;
    out.nested(|out| out.list(&routine.parameters))?;
    if !routine.attributes.is_empty() {
        out.line(&format!("WITH {}", routine.attributes.join(", ")))?;
    }
    out.line("AS")?;
    out.line("BEGIN")?;
    out.nested(|out| {
        if out.config().sqlserver_nocount {
            out.line("SET NOCOUNT ON;")?;
        }
        for declaration in &routine.declarations {
            out.item(declaration, ";")?;
        }
        match &routine.handler {
            Some(handler) => syntax.write_try(out, &routine.body, handler),
            None => syntax.write_statements(out, &routine.body),
        }
    })?;
    out.line("END")
}
