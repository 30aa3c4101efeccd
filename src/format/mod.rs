//! Reassemble converted pieces into source text for the target dialect.
//!
//! The engine produces a [`Routine`]: every region already rewritten, but
//! with no block structure, delimiters or routine boilerplate. Each target
//! module knows how its dialect spells a routine, and implements [`Syntax`]
//! for control flow inside a body.

mod mysql;
mod postgres;
mod sqlserver;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::EngineConfig,
    dialect::{ConversionDirection, Dialect},
    unit::RoutineKind,
    util::split_top_level,
};

/// One converted piece of text, plus the reasons it needs a human to look at
/// it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Item {
    pub text: String,
    pub notes: Vec<String>,
}

impl Item {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notes: vec![],
        }
    }

    /// An item with nothing to emit besides its notes.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A converted body statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Simple(Item),
    /// A comment, already in target syntax.
    Comment(String),
    Block(Vec<Statement>),
    If {
        condition: Item,
        then: Vec<Statement>,
        otherwise: Option<Vec<Statement>>,
    },
    While {
        condition: Item,
        body: Vec<Statement>,
    },
    Try {
        body: Vec<Statement>,
        handler: Handler,
    },
}

impl Statement {
    /// Does this statement do nothing when run?
    fn is_empty(&self) -> bool {
        match self {
            Statement::Simple(item) => item.is_empty(),
            Statement::Comment(_) => true,
            _ => false,
        }
    }

    /// Does `test` hold for any piece of text inside this statement?
    fn any_text(&self, test: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Statement::Simple(item) => test(&item.text),
            Statement::Comment(_) => false,
            Statement::Block(body) | Statement::While { body, .. } => body.iter().any(|s| s.any_text(test)),
            Statement::If {
                condition,
                then,
                otherwise,
            } => {
                test(&condition.text)
                    || then.iter().any(|s| s.any_text(test))
                    || otherwise.iter().flatten().any(|s| s.any_text(test))
            }
            Statement::Try { body, handler } => {
                body.iter().any(|s| s.any_text(test)) || handler.any_text(test)
            }
        }
    }
}

/// An error handler. `condition` is in target syntax, and `None` means "any
/// error".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handler {
    pub condition: Option<String>,
    pub statements: Vec<Statement>,
}

impl Handler {
    fn any_text(&self, test: &dyn Fn(&str) -> bool) -> bool {
        self.statements.iter().any(|s| s.any_text(test))
    }
}

/// A converted routine, ready to format.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routine {
    pub direction: ConversionDirection,
    pub kind: RoutineKind,
    /// The routine name as written in the target header.
    pub name: String,
    /// `CREATE ... name`, without parameters.
    pub header: Item,
    pub parameters: Vec<Item>,
    /// The target `RETURNS` type, if the routine needs one.
    pub returns: Option<String>,
    /// Routine attributes, already in target syntax.
    pub attributes: Vec<String>,
    pub declarations: Vec<Item>,
    pub body: Vec<Statement>,
    /// A handler around the whole body.
    pub handler: Option<Handler>,
    /// Source statements found before the routine, which we don't convert.
    pub preamble: Vec<Item>,
    /// How many warnings the conversion produced.
    pub warnings: usize,
}

impl Routine {
    /// Does `needle` appear anywhere in the body?
    pub fn mentions(&self, needle: &str) -> bool {
        self.declarations.iter().any(|d| d.text.contains(needle)) || self.any_statement(&|text| text.contains(needle))
    }

    /// Does any body statement send a result set to the caller? That is a
    /// `SELECT` that neither assigns variables nor feeds another statement.
    pub fn selects_rows(&self) -> bool {
        self.any_statement(&|text| split_top_level(text, ';').into_iter().any(is_result_select))
    }

    fn any_statement(&self, test: &dyn Fn(&str) -> bool) -> bool {
        self.body.iter().any(|s| s.any_text(test)) || self.handler.as_ref().map_or(false, |h| h.any_text(test))
    }
}

fn is_result_select(statement: &str) -> bool {
    static SELECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)^SELECT\b").unwrap());
    static ASSIGNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)\bINTO\b|^SELECT\s+@\w+\s*=").unwrap());
    SELECT.is_match(statement) && !ASSIGNS.is_match(statement)
}

/// Format `routine` as source text for its target dialect.
pub fn render(routine: &Routine, config: &EngineConfig) -> String {
    format!("{}", Formatted { routine, config })
}

struct Formatted<'a> {
    routine: &'a Routine,
    config: &'a EngineConfig,
}

impl fmt::Display for Formatted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Out {
            f,
            config: self.config,
            depth: 0,
        };
        if self.config.provenance_comment {
            provenance(self.routine, &mut out)?;
        }
        preamble(self.routine, &mut out)?;
        match self.routine.direction.target {
            Dialect::SqlServer => sqlserver::write(self.routine, &mut out),
            Dialect::PostgreSql => postgres::write(self.routine, &mut out),
            Dialect::MySql => mysql::write(self.routine, &mut out),
        }
    }
}

fn provenance(routine: &Routine, out: &mut Out<'_, '_>) -> fmt::Result {
    out.line(&format!(
        "-- Converted from {} to {} by procshift. Review before use.",
        routine.direction.source.product_name(),
        routine.direction.target.product_name(),
    ))?;
    match routine.warnings {
        0 => Ok(()),
        1 => out.line("-- 1 fragment needs review."),
        n => out.line(&format!("-- {} fragments need review.", n)),
    }
}

/// Statements before the routine are kept, commented out.
fn preamble(routine: &Routine, out: &mut Out<'_, '_>) -> fmt::Result {
    for item in &routine.preamble {
        out.notes(&item.notes)?;
        for line in item.text.lines().filter(|l| !l.trim().is_empty()) {
            out.line(&format!("-- {}", line.trim_end()))?;
        }
    }
    Ok(())
}

/// An indenting writer.
pub(crate) struct Out<'a, 'f> {
    f: &'a mut fmt::Formatter<'f>,
    config: &'a EngineConfig,
    depth: usize,
}

impl Out<'_, '_> {
    /// Write `text` at the current depth. Continuation lines lose their
    /// common indentation.
    pub(crate) fn line(&mut self, text: &str) -> fmt::Result {
        let mut lines = text.trim().lines();
        let Some(first) = lines.next() else {
            return writeln!(self.f);
        };
        let rest = lines.collect::<Vec<_>>();
        let common = rest
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.len() - l.trim_start().len())
            .min()
            .unwrap_or(0);
        self.write_indented(first.trim_end())?;
        for line in rest {
            if line.trim().is_empty() {
                writeln!(self.f)?;
            } else {
                self.write_indented(line.get(common..).unwrap_or(line).trim_end())?;
            }
        }
        Ok(())
    }

    fn write_indented(&mut self, line: &str) -> fmt::Result {
        for _ in 0..self.depth {
            self.f.write_str(&self.config.indent)?;
        }
        writeln!(self.f, "{}", line)
    }

    /// Review comments, if we're annotating.
    pub(crate) fn notes(&mut self, notes: &[String]) -> fmt::Result {
        if !self.config.annotate_warnings {
            return Ok(());
        }
        for note in notes {
            self.line(&format!("-- REVIEW: {}", note.replace('\n', " ")))?;
        }
        Ok(())
    }

    /// An item and its notes, ending with `terminator` unless it already
    /// does.
    pub(crate) fn item(&mut self, item: &Item, terminator: &str) -> fmt::Result {
        self.notes(&item.notes)?;
        if item.is_empty() {
            return Ok(());
        }
        let text = item.text.trim();
        if terminator.is_empty() || text.ends_with(terminator) {
            self.line(text)
        } else {
            self.line(&format!("{}{}", text, terminator))
        }
    }

    /// A comma-separated list, one entry per line.
    pub(crate) fn list(&mut self, items: &[Item]) -> fmt::Result {
        for (i, item) in items.iter().enumerate() {
            let comma = if i + 1 < items.len() { "," } else { "" };
            self.item(item, comma)?;
        }
        Ok(())
    }

    /// Run `body` one level deeper.
    pub(crate) fn nested<F>(&mut self, body: F) -> fmt::Result
    where
        F: FnOnce(&mut Self) -> fmt::Result,
    {
        self.depth += 1;
        let result = body(self);
        self.depth -= 1;
        result
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        self.config
    }
}

/// How a dialect spells control flow.
pub(crate) trait Syntax {
    /// A statement that does nothing, for blocks that would otherwise be
    /// empty.
    fn no_op(&self) -> &'static str;

    fn write_if(
        &self,
        out: &mut Out<'_, '_>,
        condition: &Item,
        then: &[Statement],
        otherwise: Option<&[Statement]>,
    ) -> fmt::Result;

    fn write_while(&self, out: &mut Out<'_, '_>, condition: &Item, body: &[Statement]) -> fmt::Result;

    fn write_block(&self, out: &mut Out<'_, '_>, body: &[Statement]) -> fmt::Result;

    fn write_try(&self, out: &mut Out<'_, '_>, body: &[Statement], handler: &Handler) -> fmt::Result;

    /// Write `statements` at the current depth, or a no-op if none of them
    /// do anything.
    fn write_statements(&self, out: &mut Out<'_, '_>, statements: &[Statement]) -> fmt::Result {
        for statement in statements {
            match statement {
                Statement::Simple(item) => out.item(item, ";")?,
                Statement::Comment(text) => out.line(text)?,
                Statement::Block(body) => self.write_block(out, body)?,
                Statement::If {
                    condition,
                    then,
                    otherwise,
                } => self.write_if(out, condition, then, otherwise.as_deref())?,
                Statement::While { condition, body } => self.write_while(out, condition, body)?,
                Statement::Try { body, handler } => self.write_try(out, body, handler)?,
            }
        }
        if statements.iter().all(Statement::is_empty) {
            out.line(self.no_op())?;
        }
        Ok(())
    }
}

/// If `otherwise` is a lone `IF`, it continues an `ELSE IF` chain.
pub(crate) fn else_if(otherwise: Option<&[Statement]>) -> Option<(&Item, &[Statement], Option<&[Statement]>)> {
    match otherwise {
        Some(
            [Statement::If {
                condition,
                then,
                otherwise,
            }],
        ) => Some((condition, then, otherwise.as_deref())),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(super) fn routine(target: Dialect) -> Routine {
        let source = if target == Dialect::SqlServer {
            Dialect::PostgreSql
        } else {
            Dialect::SqlServer
        };
        Routine {
            direction: ConversionDirection { source, target },
            kind: RoutineKind::Procedure,
            name: "p".to_owned(),
            header: Item::new("CREATE PROCEDURE p"),
            parameters: vec![],
            returns: None,
            attributes: vec![],
            declarations: vec![],
            body: vec![],
            handler: None,
            preamble: vec![],
            warnings: 0,
        }
    }

    #[test]
    fn continuation_lines_are_reindented() {
        let config = EngineConfig::default();
        let mut r = routine(Dialect::MySql);
        r.body = vec![Statement::Simple(Item::new(
            "SELECT a\n            FROM t\n            WHERE b = 1",
        ))];
        let text = render(&r, &config);
        assert!(text.contains("    SELECT a\n    FROM t\n    WHERE b = 1;\n"), "{}", text);
    }

    #[test]
    fn notes_become_review_comments_only_when_annotating() {
        let mut config = EngineConfig::default();
        let mut r = routine(Dialect::PostgreSql);
        r.body = vec![Statement::Simple(Item {
            text: "x := 1".to_owned(),
            notes: vec!["check this".to_owned()],
        })];
        r.warnings = 1;
        assert!(render(&r, &config).contains("-- REVIEW: check this\n"));
        assert!(render(&r, &config).contains("-- 1 fragment needs review."));
        config.annotate_warnings = false;
        config.provenance_comment = false;
        let text = render(&r, &config);
        assert!(!text.contains("REVIEW"));
        assert!(!text.contains("procshift"));
    }

    #[test]
    fn empty_bodies_get_a_no_op() {
        let config = EngineConfig::default();
        for (target, no_op) in [
            (Dialect::PostgreSql, "NULL;"),
            (Dialect::MySql, "DO 0;"),
            (Dialect::SqlServer, "PRINT '';"),
        ] {
            let mut r = routine(target);
            r.body = vec![Statement::Simple(Item {
                text: String::new(),
                notes: vec!["dropped".to_owned()],
            })];
            let text = render(&r, &config);
            assert!(text.contains(no_op), "{}", text);
        }
    }

    #[test]
    fn preamble_is_commented_out() {
        let config = EngineConfig::default();
        let mut r = routine(Dialect::PostgreSql);
        r.preamble = vec![Item::new("USE Sales")];
        let text = render(&r, &config);
        assert_eq!(text.lines().nth(1), Some("-- USE Sales"));
    }
}
