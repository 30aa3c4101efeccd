//! The structural view of one procedural SQL unit.
//!
//! A [`ProcedureUnit`] is what the segmenter produces and what the rewrite
//! engine consumes. It is deliberately shallow: expressions and most
//! statements stay as source text, and only the parts whose *shape* differs
//! between dialects (headers, parameter lists, declarations, control flow and
//! error handling) get their own structure.

use std::ops::Range;

use serde::Serialize;

use crate::dialect::Dialect;

/// A stored procedure or function, split into regions.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProcedureUnit {
    /// The dialect this unit was written in.
    pub dialect: Dialect,
    /// Statements found before the `CREATE` header that we did not recognize
    /// as boilerplate. These are reported, never silently dropped.
    pub preamble: Vec<Fragment>,
    pub header: Header,
    pub parameters: Vec<Parameter>,
    pub declarations: Vec<Declaration>,
    pub body: Vec<Stmt>,
    /// A handler covering the whole body, if there is one.
    pub error_handling: Option<ErrorHandling>,
    pub terminator: Terminator,
}

impl ProcedureUnit {
    /// Names of all parameters and local variables, as written in the source
    /// (without any `@` sigil).
    pub fn variable_names(&self) -> impl Iterator<Item = (&str, VariableKind)> {
        self.parameters
            .iter()
            .map(|p| (p.name.as_str(), VariableKind::Parameter))
            .chain(self.declarations.iter().filter_map(|d| match d.kind {
                DeclarationKind::Variable => Some((d.name.as_str(), VariableKind::Local)),
                _ => None,
            }))
    }
}

/// A piece of source text and where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub text: String,
    pub span: Range<usize>,
}

impl Fragment {
    pub fn new(text: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            text: text.into(),
            span,
        }
    }
}

/// Is this routine a procedure or a function?
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum RoutineKind {
    Procedure,
    Function,
}

/// The `CREATE ... name` part of a unit, plus everything around the parameter
/// list that describes the routine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Header {
    /// The source text from `CREATE` through the routine name, normalized to
    /// single spaces. This is the `Header` region that rules rewrite.
    pub text: String,
    pub span: Range<usize>,
    pub kind: RoutineKind,
    /// Schema qualifier, without quoting.
    pub schema: Option<String>,
    /// Routine name, without quoting.
    pub name: String,
    /// Did the source say `OR REPLACE` or `OR ALTER`?
    pub or_replace: bool,
    /// What the routine returns, if the source says.
    pub returns: Option<Returns>,
    /// Trailing attributes we recognized but do not translate, like
    /// `VOLATILE`, `COST 100` or `DETERMINISTIC`.
    pub attributes: Vec<String>,
}

/// A `RETURNS` clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Returns {
    /// `RETURNS void`.
    Void,
    /// `RETURNS integer`, etc.
    Scalar(String),
    /// `RETURNS TABLE (...)`, `RETURNS SETOF x`: one or more result sets.
    ResultSet(String),
    /// `RETURNS SETOF refcursor`: result sets returned through cursors.
    Cursors,
}

/// Parameter direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// One formal parameter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Parameter {
    /// Name without any sigil.
    pub name: String,
    pub data_type: String,
    pub mode: ParamMode,
    pub default: Option<String>,
    /// The parameter exactly as written, which is the `Parameter` region.
    pub text: String,
    pub span: Range<usize>,
}

/// Is a name a parameter or a local?
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum VariableKind {
    Parameter,
    Local,
}

/// What does a `DECLARE` declare?
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum DeclarationKind {
    /// A local variable.
    Variable,
    /// A cursor.
    Cursor,
    /// Anything else: table variables, named conditions, handlers we don't
    /// translate.
    Other,
}

/// One local declaration, normalized to declare exactly one name.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    /// The declaration in source syntax, like `DECLARE @x INT = 0` or
    /// `x integer := 0`. This is the `Declaration` region.
    pub text: String,
    pub span: Range<usize>,
}

/// A statement, or a control-flow construct containing statements.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Stmt {
    /// One plain statement, without its trailing `;`.
    Simple(Fragment),
    /// A comment standing between statements.
    Comment(Fragment),
    /// A nested `BEGIN ... END` block.
    Block(Vec<Stmt>),
    /// `IF`, with `ELSIF` chains represented as a nested `If` in `otherwise`.
    If {
        condition: Fragment,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `WHILE` loops.
    While { condition: Fragment, body: Vec<Stmt> },
    /// A protected block with a handler: `BEGIN TRY/CATCH`, a PL/pgSQL
    /// `EXCEPTION` section, or a MySQL block with an exit handler.
    Try {
        body: Vec<Stmt>,
        handler: ErrorHandling,
    },
    /// A construct we recognized but cannot translate. It is passed through
    /// verbatim with a warning.
    Unsupported { fragment: Fragment, reason: String },
}

/// An error handler.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorHandling {
    /// Which errors the handler catches, if it isn't "all of them", like
    /// `unique_violation` or `NOT FOUND`.
    pub condition: Option<String>,
    pub statements: Vec<Stmt>,
    pub span: Range<usize>,
}

/// What followed the body in the source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Terminator {
    /// PostgreSQL dollar-quote tag, like `$$` or `$BODY$`.
    pub dollar_tag: Option<String>,
    /// MySQL custom delimiter, like `$$` or `//`.
    pub delimiter: Option<String>,
    /// `LANGUAGE plpgsql`, etc.
    pub language: Option<String>,
    /// MySQL label on the routine body, as in `body: BEGIN … END body`.
    pub label: Option<String>,
    /// Any trailing text we did not recognize.
    pub trailing: Option<Fragment>,
}
