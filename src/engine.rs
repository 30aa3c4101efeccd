//! Run a segmented unit through a rule set and format the result.
//!
//! Each region of a [`ProcedureUnit`] goes through the rule groups that apply
//! to it, in a fixed order. All regions share one [`Masked`], so literals
//! masked in one place are restored consistently everywhere. Nothing here
//! fails: anything we can't translate is kept as-is and reported as a
//! [`Warning`].

use std::{collections::HashSet, fmt};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    config::EngineConfig,
    dialect::{ConversionDirection, Dialect},
    format::{self, Handler, Item, Routine, Statement},
    rules::{
        attributes,
        naming::{routine_name, variable_name},
        types, Masked, Region, Replacement, RewriteContext, RuleSet, Variable,
    },
    unit::{
        DeclarationKind, ErrorHandling, ParamMode, ProcedureUnit, Returns, RoutineKind, Stmt,
        VariableKind,
    },
    util::squish,
};

/// A bare word, not part of a variable, system function or qualified name.
static BARE_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^@\w$.])([A-Za-z_][\w$]*)").unwrap());

/// Separates the conditions of one handler.
static CONDITION_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+OR\s+|\s*,\s*").unwrap());

/// Named error conditions, as `(PostgreSQL, MySQL)`. Keys are PostgreSQL
/// condition names and MySQL handler conditions, upper-cased.
static CONDITIONS: phf::Map<&'static str, (&'static str, &'static str)> = phf::phf_map! {
    "UNIQUE_VIOLATION" => ("unique_violation", "1062"),
    "1062" => ("unique_violation", "1062"),
    "FOREIGN_KEY_VIOLATION" => ("foreign_key_violation", "1452"),
    "1452" => ("foreign_key_violation", "1452"),
    "NOT_NULL_VIOLATION" => ("not_null_violation", "1048"),
    "1048" => ("not_null_violation", "1048"),
    "DIVISION_BY_ZERO" => ("division_by_zero", "1365"),
    "1365" => ("division_by_zero", "1365"),
    "DEADLOCK_DETECTED" => ("deadlock_detected", "1213"),
    "1213" => ("deadlock_detected", "1213"),
    "NO_DATA_FOUND" => ("no_data_found", "NOT FOUND"),
    "NOT FOUND" => ("no_data_found", "NOT FOUND"),
};

/// Something in the source we couldn't convert exactly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub region: Region,
    /// The source text involved.
    pub original_fragment: String,
    pub reason: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}: {} (in `{}`)",
            self.region,
            self.reason,
            squish(&self.original_fragment)
        )
    }
}

/// A converted routine, and everything a reviewer should look at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub converted_text: String,
    pub warnings: Vec<Warning>,
}

/// Convert `unit` with `rules`.
#[instrument(level = "debug", skip_all, fields(direction = %rules.direction(), routine = %unit.header.name))]
pub fn apply(unit: &ProcedureUnit, rules: &RuleSet, config: &EngineConfig) -> ConversionResult {
    let direction = rules.direction();
    let shape = Shape::plan(unit, direction);
    debug!(?shape, "planned target routine");
    let (mut routine, mut warnings) = build(unit, rules, config, &shape);
    if shape.kind == RoutineKind::Function && direction.target == Dialect::MySql && routine.selects_rows() {
        // MySQL functions may not return result sets.
        let shape = Shape::procedure(shape.scalar, direction);
        debug!(?shape, "replanned target routine");
        let (rebuilt, mut rebuilt_warnings) = build(unit, rules, config, &shape);
        let reason = "the converted body returns a result set, which a MySQL function may not do";
        warn!(region = ?Region::Header, %reason, "conversion warning");
        rebuilt_warnings.insert(
            0,
            Warning {
                region: Region::Header,
                original_fragment: unit.header.text.trim().to_owned(),
                reason: reason.to_owned(),
            },
        );
        routine = rebuilt;
        routine.warnings = rebuilt_warnings.len();
        warnings = rebuilt_warnings;
    }
    let converted_text = format::render(&routine, config);
    debug!(warnings = warnings.len(), "converted routine");
    ConversionResult {
        converted_text,
        warnings,
    }
}

fn build(unit: &ProcedureUnit, rules: &RuleSet, config: &EngineConfig, shape: &Shape) -> (Routine, Vec<Warning>) {
    let mut engine = Engine {
        rules,
        ctx: RewriteContext::new(rules.direction(), config),
        masked: Masked::default(),
        warnings: vec![],
    };
    engine.prepare(unit, shape);
    let routine = engine.routine(unit, shape);
    (routine, engine.warnings)
}

/// What kind of routine we write, and how it hands back a scalar result.
#[derive(Debug)]
struct Shape {
    kind: RoutineKind,
    /// The source's scalar return type.
    scalar: Option<String>,
    /// Does the target itself return the scalar?
    returns_value: bool,
    /// Or does an extra output parameter carry it?
    result_parameter: Option<String>,
}

impl Shape {
    /// PostgreSQL gets functions, SQL Server gets procedures, and MySQL
    /// keeps scalar functions as functions unless the body turns out to
    /// return rows.
    fn plan(unit: &ProcedureUnit, direction: ConversionDirection) -> Self {
        let scalar = match &unit.header.returns {
            Some(Returns::Scalar(data_type)) => Some(data_type.clone()),
            _ => None,
        };
        match direction.target {
            Dialect::PostgreSql => Shape {
                kind: RoutineKind::Function,
                returns_value: scalar.is_some(),
                scalar,
                result_parameter: None,
            },
            Dialect::SqlServer => Shape::procedure(scalar, direction),
            Dialect::MySql => {
                let outputs = unit.parameters.iter().any(|p| p.mode != ParamMode::In);
                if scalar.is_some() && !outputs {
                    Shape {
                        kind: RoutineKind::Function,
                        returns_value: true,
                        scalar,
                        result_parameter: None,
                    }
                } else {
                    Shape::procedure(scalar, direction)
                }
            }
        }
    }

    /// A procedure, with an output parameter for any scalar result.
    fn procedure(scalar: Option<String>, direction: ConversionDirection) -> Self {
        Shape {
            kind: RoutineKind::Procedure,
            returns_value: false,
            result_parameter: scalar
                .as_ref()
                .map(|_| variable_name("result", VariableKind::Parameter, direction)),
            scalar,
        }
    }
}

struct Engine<'a> {
    rules: &'a RuleSet,
    ctx: RewriteContext<'a>,
    masked: Masked,
    warnings: Vec<Warning>,
}

impl<'a> Engine<'a> {
    fn direction(&self) -> ConversionDirection {
        self.ctx.direction
    }

    fn warn(&mut self, region: Region, fragment: &str, reason: impl Into<String>) {
        let warning = Warning {
            region,
            original_fragment: fragment.trim().to_owned(),
            reason: reason.into(),
        };
        warn!(region = ?warning.region, reason = %warning.reason, "conversion warning");
        self.warnings.push(warning);
    }

    /// Fill in the rewrite context: names, shape and variables.
    fn prepare(&mut self, unit: &ProcedureUnit, shape: &Shape) {
        let direction = self.direction();
        self.ctx.source_routine = unit.header.name.clone();
        self.ctx.routine = routine_name(
            unit.header.schema.as_deref(),
            &unit.header.name,
            direction.target,
            self.ctx.config,
        );
        self.ctx.target_kind = shape.kind;
        self.ctx.returns_value = shape.returns_value;
        self.ctx.result_parameter = shape.result_parameter.clone();
        self.ctx.body_label = unit.terminator.label.clone();

        // PL/pgSQL rejects variables that share a name with a column used in
        // the same query.
        let words = if direction.target == Dialect::PostgreSql {
            bare_words(unit)
        } else {
            HashSet::new()
        };
        for (name, kind) in unit.variable_names() {
            let target = variable_name(name, kind, direction);
            let collides = words.contains(&target.to_ascii_lowercase())
                && (direction.source == Dialect::SqlServer || !name.eq_ignore_ascii_case(&target));
            if collides && kind == VariableKind::Local {
                self.warn(
                    Region::Declaration,
                    name,
                    format!(
                        "local variable {} has the same name as a column, so PostgreSQL may reject references to it as ambiguous",
                        target
                    ),
                );
            }
            self.ctx.insert_variable(Variable {
                source: name.to_owned(),
                target,
                kind,
                shadowed: collides && kind == VariableKind::Parameter,
            });
        }
    }

    fn routine(&mut self, unit: &ProcedureUnit, shape: &Shape) -> Routine {
        let direction = self.direction();
        let preamble = unit
            .preamble
            .iter()
            .map(|f| self.verbatim(Region::Header, &f.text, "statements before the routine are not converted"))
            .collect();
        let header = self.rewrite(&unit.header.text, &[Region::Header]);
        let mut parameters = unit
            .parameters
            .iter()
            .map(|p| self.rewrite(&p.text, &[Region::Parameter, Region::BuiltinCall]))
            .collect::<Vec<_>>();
        if let (Some(name), Some(scalar)) = (&shape.result_parameter, &shape.scalar) {
            parameters.push(self.result_parameter(name, scalar, &unit.header.text));
        }
        let declarations = unit
            .declarations
            .iter()
            .map(|d| match d.kind {
                DeclarationKind::Variable => self.rewrite(&d.text, &[Region::Declaration, Region::BuiltinCall]),
                DeclarationKind::Cursor => self.verbatim(Region::Declaration, &d.text, "cursors are not translated"),
                DeclarationKind::Other => {
                    self.verbatim(Region::Declaration, &d.text, "this declaration is not translated")
                }
            })
            .collect();
        let body = self.statements(&unit.body);
        let handler = unit.error_handling.as_ref().map(|h| self.handler(h));

        let (kept, dropped) = attributes(&unit.header.attributes, direction);
        for attribute in dropped {
            self.warn(
                Region::Header,
                &attribute,
                format!("routine attribute has no {} equivalent", direction.target.product_name()),
            );
        }

        let mut routine = Routine {
            direction,
            kind: shape.kind,
            name: self.ctx.routine.clone(),
            header,
            parameters,
            returns: None,
            attributes: kept,
            declarations,
            body,
            handler,
            preamble,
            warnings: 0,
        };
        routine.returns = self.returns(unit, shape, &routine);
        routine.warnings = self.warnings.len();
        routine
    }

    /// The output parameter standing in for a function's return value.
    fn result_parameter(&mut self, name: &str, scalar: &str, header: &str) -> Item {
        let direction = self.direction();
        let (data_type, reason) = types::translate(scalar, direction);
        let text = match direction.target {
            Dialect::SqlServer => format!("{} {} OUTPUT", name, data_type),
            _ => format!("OUT {} {}", name, data_type),
        };
        let mut notes = vec![format!(
            "the function becomes a procedure, and its result is returned through {}",
            name
        )];
        notes.extend(reason);
        for note in &notes {
            self.warn(Region::Header, header, note.clone());
        }
        Item { text, notes }
    }

    /// The target `RETURNS` clause. PostgreSQL needs to see the converted
    /// body first, to know whether it returns rows.
    fn returns(&mut self, unit: &ProcedureUnit, shape: &Shape, routine: &Routine) -> Option<String> {
        let header = unit.header.text.as_str();
        match &unit.header.returns {
            Some(Returns::Cursors) => {
                self.warn(Region::Header, header, "results returned through cursors are not translated")
            }
            Some(Returns::ResultSet(_)) if self.direction().target != Dialect::PostgreSql => self.warn(
                Region::Header,
                header,
                "the function becomes a procedure, and its rows are returned as a result set",
            ),
            _ => {}
        }
        match self.direction().target {
            Dialect::SqlServer => None,
            Dialect::MySql if shape.returns_value => shape.scalar.as_deref().map(|t| self.return_type(t, header)),
            Dialect::MySql => None,
            Dialect::PostgreSql => {
                let has_out = unit.parameters.iter().any(|p| p.mode != ParamMode::In);
                let rows = routine.mentions("RETURN QUERY")
                    || matches!(unit.header.returns, Some(Returns::ResultSet(_)));
                if rows {
                    if has_out {
                        self.warn(
                            Region::Header,
                            header,
                            "a PostgreSQL function cannot return rows and have output parameters",
                        );
                    }
                    self.warn(
                        Region::Header,
                        header,
                        "rows are returned as SETOF record, so callers must list the result columns",
                    );
                    Some("SETOF record".to_owned())
                } else if shape.returns_value {
                    shape.scalar.as_deref().map(|t| self.return_type(t, header))
                } else if has_out {
                    None
                } else {
                    Some("void".to_owned())
                }
            }
        }
    }

    fn return_type(&mut self, scalar: &str, header: &str) -> String {
        let (data_type, reason) = types::translate(scalar, self.direction());
        if let Some(reason) = reason {
            self.warn(Region::Header, header, reason);
        }
        data_type
    }

    /// Keep `text` unconverted, with a warning.
    fn verbatim(&mut self, region: Region, text: &str, reason: &str) -> Item {
        self.warn(region, text, reason);
        Item {
            text: text.trim().to_owned(),
            notes: vec![reason.to_owned()],
        }
    }

    fn rewrite(&mut self, text: &str, regions: &[Region]) -> Item {
        let masked = self.masked.mask(text, self.direction().source);
        self.rewrite_masked(text, masked, regions)
    }

    /// Run `masked` through the rule groups for `regions`, in order. A
    /// statement handled by an error-handling rule skips the ordinary
    /// statement rules.
    fn rewrite_masked(&mut self, original: &str, masked: String, regions: &[Region]) -> Item {
        let rules = self.rules;
        let mut current = masked;
        let mut notes: Vec<String> = vec![];
        let mut handled = false;
        'regions: for &region in regions {
            if region == Region::BodyStatement && handled {
                continue;
            }
            for rule in rules.group(region).filter(|r| !r.is_adjacent()) {
                let outcome = rule.apply(&current, &self.masked, &self.ctx);
                if outcome.fired {
                    debug!(rule = rule.name, ?region, "rule fired");
                    handled |= region == Region::ErrorHandling;
                }
                for note in outcome.notes {
                    let fragment = if note.fragment.is_empty() {
                        original.to_owned()
                    } else {
                        self.masked.restore_raw(&note.fragment)
                    };
                    self.warn(region, &fragment, note.reason.clone());
                    if !notes.contains(&note.reason) {
                        notes.push(note.reason);
                    }
                }
                current = outcome.text;
                if outcome.frozen {
                    break 'regions;
                }
            }
        }
        Item {
            text: self.masked.restore(&current, self.direction()),
            notes,
        }
    }

    /// Convert a statement list. Adjacent simple statements may merge into
    /// one first.
    fn statements(&mut self, stmts: &[Stmt]) -> Vec<Statement> {
        let source = self.direction().source;
        let masked = stmts
            .iter()
            .map(|s| match s {
                Stmt::Simple(f) => Some(self.masked.mask(&f.text, source)),
                _ => None,
            })
            .collect::<Vec<_>>();
        let mut out = vec![];
        let mut i = 0;
        while i < stmts.len() {
            match (&stmts[i], &masked[i]) {
                (Stmt::Simple(fragment), Some(text)) => {
                    if let (Some(Stmt::Simple(next)), Some(Some(next_text))) =
                        (stmts.get(i + 1), masked.get(i + 1))
                    {
                        if let Some((merged, notes)) = self.merge(text, next_text) {
                            let original = format!("{};\n{}", fragment.text, next.text);
                            out.extend(self.simple(&original, merged, notes));
                            i += 2;
                            continue;
                        }
                    }
                    out.extend(self.simple(&fragment.text, text.clone(), vec![]));
                }
                (stmt, _) => out.extend(self.statement(stmt)),
            }
            i += 1;
        }
        out
    }

    /// Try the rules that merge two statements into one.
    fn merge(&self, first: &str, second: &str) -> Option<(String, Vec<String>)> {
        let rules = self.rules;
        for rule in rules.group(Region::BodyStatement).filter(|r| r.is_adjacent()) {
            match rule.apply_pair(first, second, &self.ctx) {
                Some(Replacement::Text(text)) => return Some((text, vec![])),
                Some(Replacement::Lossy { text, reason }) => return Some((text, vec![reason])),
                Some(Replacement::Unsupported { reason }) => {
                    debug!(rule = rule.name, %reason, "statements not merged");
                }
                None => {}
            }
        }
        None
    }

    /// A simple statement. Statements that rewrite to nothing are dropped,
    /// unless a reviewer needs to know about it.
    fn simple(&mut self, original: &str, masked: String, mut notes: Vec<String>) -> Option<Statement> {
        for reason in &notes {
            self.warn(Region::BodyStatement, original, reason.clone());
        }
        let mut item = self.rewrite_masked(
            original,
            masked,
            &[Region::ErrorHandling, Region::BodyStatement, Region::BuiltinCall],
        );
        notes.append(&mut item.notes);
        item.notes = notes;
        if item.is_empty() && item.notes.is_empty() {
            debug!(statement = original, "dropped statement");
            None
        } else {
            Some(Statement::Simple(item))
        }
    }

    fn statement(&mut self, stmt: &Stmt) -> Option<Statement> {
        let direction = self.direction();
        match stmt {
            Stmt::Simple(fragment) => {
                let masked = self.masked.mask(&fragment.text, direction.source);
                self.simple(&fragment.text, masked, vec![])
            }
            Stmt::Comment(fragment) => Some(Statement::Comment(comment(&fragment.text, direction.target))),
            Stmt::Block(body) => Some(Statement::Block(self.statements(body))),
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.rewrite(&condition.text, &[Region::BuiltinCall]);
                let then = self.statements(then);
                let otherwise = otherwise.as_ref().map(|o| self.statements(o));
                Some(Statement::If {
                    condition,
                    then,
                    otherwise,
                })
            }
            Stmt::While { condition, body } => {
                let condition = self.rewrite(&condition.text, &[Region::BuiltinCall]);
                let body = self.statements(body);
                Some(Statement::While { condition, body })
            }
            Stmt::Try { body, handler } => {
                let body = self.statements(body);
                let handler = self.handler(handler);
                Some(Statement::Try { body, handler })
            }
            Stmt::Unsupported { fragment, reason } => Some(Statement::Simple(self.verbatim(
                Region::BodyStatement,
                &fragment.text,
                reason,
            ))),
        }
    }

    fn handler(&mut self, handler: &ErrorHandling) -> Handler {
        let mut statements = vec![];
        let condition = match handler.condition.as_deref() {
            None => None,
            Some(condition) => {
                let (mapped, reason) = handler_condition(condition, self.direction());
                if let Some(reason) = reason {
                    self.warn(Region::ErrorHandling, condition, reason.clone());
                    statements.push(Statement::Simple(Item {
                        text: String::new(),
                        notes: vec![reason],
                    }));
                }
                mapped
            }
        };
        statements.extend(self.statements(&handler.statements));
        Handler {
            condition,
            statements,
        }
    }
}

/// Every bare word in the body, lower-cased, with literals and comments
/// masked out.
fn bare_words(unit: &ProcedureUnit) -> HashSet<String> {
    let mut texts = vec![];
    collect_texts(&unit.body, &mut texts);
    if let Some(handler) = &unit.error_handling {
        collect_texts(&handler.statements, &mut texts);
    }
    let mut words = HashSet::new();
    for text in texts {
        let (_, masked) = Masked::new(text, unit.dialect);
        for caps in BARE_WORD.captures_iter(&masked) {
            words.insert(caps[1].to_ascii_lowercase());
        }
    }
    words
}

fn collect_texts<'u>(stmts: &'u [Stmt], out: &mut Vec<&'u str>) {
    for stmt in stmts {
        match stmt {
            Stmt::Simple(f) | Stmt::Unsupported { fragment: f, .. } => out.push(&f.text),
            Stmt::Comment(_) => {}
            Stmt::Block(body) => collect_texts(body, out),
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                out.push(&condition.text);
                collect_texts(then, out);
                if let Some(otherwise) = otherwise {
                    collect_texts(otherwise, out);
                }
            }
            Stmt::While { condition, body } => {
                out.push(&condition.text);
                collect_texts(body, out);
            }
            Stmt::Try { body, handler } => {
                collect_texts(body, out);
                collect_texts(&handler.statements, out);
            }
        }
    }
}

/// Translate a line comment's marker. MySQL needs a space after `--`.
fn comment(text: &str, target: Dialect) -> String {
    let rest = match text.strip_prefix('#').or_else(|| text.strip_prefix("--")) {
        Some(rest) => rest,
        None => return text.to_owned(),
    };
    let keep = rest.is_empty()
        || rest.starts_with(char::is_whitespace)
        || (target != Dialect::MySql && text.starts_with("--"));
    if keep {
        format!("--{}", rest)
    } else {
        format!("-- {}", rest)
    }
}

/// Translate a handler condition. `None` means "any error". Returns a reason
/// when the handler will catch more or other errors than before.
fn handler_condition(condition: &str, direction: ConversionDirection) -> (Option<String>, Option<String>) {
    let target = direction.target;
    let pieces = CONDITION_SEPARATOR
        .split(condition.trim())
        .map(|p| squish(p).to_ascii_uppercase())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    if pieces
        .iter()
        .any(|p| matches!(p.as_str(), "OTHERS" | "SQLEXCEPTION" | "SQLWARNING"))
    {
        return (None, None);
    }
    if target == Dialect::SqlServer {
        return (
            None,
            Some(format!("SQL Server CATCH blocks catch every error, not only {}", squish(condition))),
        );
    }
    let mut mapped: Vec<String> = vec![];
    for piece in &pieces {
        let translated = if let Some(state) = piece.strip_prefix("SQLSTATE") {
            let state = state.trim_start();
            let state = state.strip_prefix("VALUE").map_or(state, str::trim_start);
            Some(format!("SQLSTATE {}", state))
        } else {
            CONDITIONS.get(piece.as_str()).map(|(postgres, mysql)| match target {
                Dialect::MySql => (*mysql).to_owned(),
                _ => (*postgres).to_owned(),
            })
        };
        match translated {
            Some(t) if !mapped.contains(&t) => mapped.push(t),
            Some(_) => {}
            None => {
                return (
                    None,
                    Some(format!(
                        "handler condition {} has no {} equivalent, so the handler catches every error",
                        squish(condition),
                        target.product_name()
                    )),
                )
            }
        }
    }
    let separator = if target == Dialect::MySql { ", " } else { " OR " };
    (Some(mapped.join(separator)), None)
}
