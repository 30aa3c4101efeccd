//! Rewrite rules, and how a single rule is applied to a piece of text.
//!
//! A [`RewriteRule`] belongs to one [`ConversionDirection`] and one
//! [`Region`] of a procedural unit. Rules never see string literals or
//! comments (see [`mask`]), and they never run the engine themselves: a
//! replacer is a plain function of what matched and a read-only
//! [`RewriteContext`].
//!
//! The built-in rules are grouped into families, one module each:
//!
//! - [`naming`] and [`types`]: name and data type conventions used by the
//!   other families.
//! - `header`: routine headers and parameter lists.
//! - `variables`: variable references, declarations and assignments.
//! - `statements`: statement shapes like `SELECT ... INTO`, result sets,
//!   `EXEC`/`CALL` and `TOP`/`LIMIT`.
//! - `builtins`: function calls, casts and expression-level syntax.
//! - `error_handling`: transactions, raising and re-raising errors.

use std::{collections::HashMap, fmt};

use regex::{Captures, Regex};
use serde::Serialize;

use crate::{
    config::EngineConfig,
    dialect::{ConversionDirection, Dialect},
    unit::{RoutineKind, VariableKind},
};

pub use self::{
    mask::Masked,
    sites::{CallSite, CastSite},
};

mod builtins;
mod error_handling;
mod header;
pub mod mask;
pub mod naming;
mod sets;
pub(crate) mod sites;
mod statements;
pub mod types;
mod variables;

pub use sets::builtin_rule_set;
pub(crate) use statements::BODY_LABEL;
pub(crate) use header::attributes;

/// The region of a procedural unit that a rule applies to.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum Region {
    /// `CREATE ... name`.
    Header,
    /// One formal parameter.
    Parameter,
    /// One local declaration.
    Declaration,
    /// One statement in the body, with a shape that differs by dialect.
    BodyStatement,
    /// Transaction and error statements, wherever they appear. These run
    /// before the `BodyStatement` rules.
    ErrorHandling,
    /// Expression-level rules. These run last over every region that holds
    /// expressions: declarations, parameters, statements, conditions and
    /// handlers.
    BuiltinCall,
}

/// Where a rule looks for work.
pub enum Matcher {
    /// Every match of a regular expression.
    Pattern(Regex),
    /// Every call to the named function, found with a balanced-paren scan.
    Call(&'static str),
    /// Every PostgreSQL `expr::type` cast.
    PostfixCast,
    /// Two neighbouring statements matching `first` and then `second`.
    Adjacent { first: Regex, second: Regex },
}

impl Matcher {
    /// A `Pattern` matcher. Rule patterns are static, so a bad one is a bug.
    pub fn pattern(re: &str) -> Self {
        Matcher::Pattern(compile(re))
    }

    /// An `Adjacent` matcher.
    pub fn adjacent(first: &str, second: &str) -> Self {
        Matcher::Adjacent {
            first: compile(first),
            second: compile(second),
        }
    }
}

fn compile(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|err| panic!("invalid rule pattern {:?}: {}", re, err))
}

/// Build a replacement from regex captures.
pub type CapturesFn = fn(&Captures<'_>, &RewriteContext<'_>) -> Replacement;
/// Build a replacement for a function call.
pub type CallFn = fn(&CallSite<'_>, &RewriteContext<'_>) -> Replacement;
/// Build a replacement for a postfix cast.
pub type CastFn = fn(&CastSite, &RewriteContext<'_>) -> Replacement;
/// Build one statement replacing two neighbours.
pub type PairFn = fn(&str, &str, &RewriteContext<'_>) -> Replacement;

/// What a rule puts in place of a match.
pub enum Replacer {
    /// A regex replacement template, like `COALESCE(${args})`.
    Template(&'static str),
    Captures(CapturesFn),
    Call(CallFn),
    Cast(CastFn),
    Pair(PairFn),
}

/// The result of one replacement.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Replacement {
    /// An exact translation.
    Text(String),
    /// A translation that may not behave identically, with a note for
    /// reviewers.
    Lossy { text: String, reason: String },
    /// No translation: the match is left unchanged, and we warn.
    Unsupported { reason: String },
}

impl Replacement {
    pub fn text(text: impl Into<String>) -> Self {
        Replacement::Text(text.into())
    }

    pub fn lossy(text: impl Into<String>, reason: impl Into<String>) -> Self {
        Replacement::Lossy {
            text: text.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported(reason: impl Into<String>) -> Self {
        Replacement::Unsupported {
            reason: reason.into(),
        }
    }
}

/// One rewrite rule.
pub struct RewriteRule {
    pub name: &'static str,
    pub direction: ConversionDirection,
    pub region: Region,
    /// Rules in a region run in ascending `order`.
    pub order: u32,
    pub matcher: Matcher,
    pub replacer: Replacer,
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("region", &self.region)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Why a fragment needs a human to look at it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Note {
    /// The masked text that matched.
    pub fragment: String,
    pub reason: String,
    /// `true` when the fragment was left untranslated.
    pub unsupported: bool,
}

/// What happened when a rule was applied to some text.
#[derive(Clone, Debug, Default)]
pub struct RuleOutcome {
    pub text: String,
    /// Did the matcher find anything?
    pub fired: bool,
    /// Did an unsupported match cover the entire text?
    pub frozen: bool,
    pub notes: Vec<Note>,
}

impl RuleOutcome {
    fn settle(&mut self, replacement: Replacement, matched: &str, whole: bool, out: &mut String) {
        self.fired = true;
        match replacement {
            Replacement::Text(text) => out.push_str(&text),
            Replacement::Lossy { text, reason } => {
                self.notes.push(Note {
                    fragment: matched.to_owned(),
                    reason,
                    unsupported: false,
                });
                out.push_str(&text);
            }
            Replacement::Unsupported { reason } => {
                self.notes.push(Note {
                    fragment: matched.to_owned(),
                    reason,
                    unsupported: true,
                });
                self.frozen |= whole;
                out.push_str(matched);
            }
        }
    }
}

/// Does `range` of `text` cover everything but whitespace?
fn covers(text: &str, start: usize, end: usize) -> bool {
    text[..start].trim().is_empty() && text[end..].trim().is_empty()
}

impl RewriteRule {
    pub fn new(
        name: &'static str,
        direction: ConversionDirection,
        region: Region,
        order: u32,
        matcher: Matcher,
        replacer: Replacer,
    ) -> Self {
        Self {
            name,
            direction,
            region,
            order,
            matcher,
            replacer,
        }
    }

    /// Apply this rule to masked `text`. `Adjacent` rules work on statement
    /// lists instead, and never match here.
    pub fn apply(&self, text: &str, masked: &Masked, ctx: &RewriteContext<'_>) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        let rewritten = match (&self.matcher, &self.replacer) {
            (Matcher::Pattern(re), Replacer::Template(template)) => {
                self.apply_pattern(re, text, &mut outcome, |caps| {
                    let mut out = String::new();
                    caps.expand(template, &mut out);
                    Replacement::Text(out)
                })
            }
            (Matcher::Pattern(re), Replacer::Captures(f)) => {
                self.apply_pattern(re, text, &mut outcome, |caps| f(caps, ctx))
            }
            (Matcher::Call(name), Replacer::Call(f)) => {
                self.apply_call(name, *f, text, true, masked, ctx, &mut outcome)
            }
            (Matcher::PostfixCast, Replacer::Cast(f)) => self.apply_cast(*f, text, ctx, &mut outcome),
            _ => text.to_owned(),
        };
        outcome.text = rewritten;
        outcome
    }

    /// Apply an `Adjacent` rule to two masked statements. Returns `None` if
    /// they don't match.
    pub fn apply_pair(&self, first: &str, second: &str, ctx: &RewriteContext<'_>) -> Option<Replacement> {
        match (&self.matcher, &self.replacer) {
            (Matcher::Adjacent { first: a, second: b }, Replacer::Pair(f))
                if a.is_match(first) && b.is_match(second) =>
            {
                Some(f(first, second, ctx))
            }
            _ => None,
        }
    }

    /// Is this rule applied to statement lists?
    pub fn is_adjacent(&self) -> bool {
        matches!(self.matcher, Matcher::Adjacent { .. })
    }

    fn apply_pattern(
        &self,
        re: &Regex,
        text: &str,
        outcome: &mut RuleOutcome,
        mut replace: impl FnMut(&Captures<'_>) -> Replacement,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };
            if m.as_str().is_empty() {
                continue;
            }
            out.push_str(&text[last..m.start()]);
            let replacement = replace(&caps);
            outcome.settle(replacement, m.as_str(), covers(text, m.start(), m.end()), &mut out);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_call(
        &self,
        name: &str,
        f: CallFn,
        text: &str,
        top: bool,
        masked: &Masked,
        ctx: &RewriteContext<'_>,
        outcome: &mut RuleOutcome,
    ) -> String {
        let mut out = String::with_capacity(text.len());
        let mut pos = 0;
        while let Some((whole, inner)) = sites::find_call(text, name, pos) {
            out.push_str(&text[pos..whole.start]);
            // Nested calls to the same function are rewritten first.
            let args = self.apply_call(name, f, &text[inner.clone()], false, masked, ctx, outcome);
            let site = CallSite::new(&text[whole.start..whole.start + name.len()], &args, masked);
            let whole_text = top && covers(text, whole.start, whole.end);
            outcome.settle(f(&site, ctx), &site.text, whole_text, &mut out);
            pos = whole.end;
        }
        out.push_str(&text[pos..]);
        out
    }

    fn apply_cast(
        &self,
        f: CastFn,
        text: &str,
        ctx: &RewriteContext<'_>,
        outcome: &mut RuleOutcome,
    ) -> String {
        let mut current = text.to_owned();
        let mut from = 0;
        while let Some((range, site)) = sites::find_cast(&current, from) {
            let mut replaced = String::new();
            let whole = covers(&current, range.start, range.end);
            outcome.settle(f(&site, ctx), &site.text, whole, &mut replaced);
            if replaced == site.text {
                from = range.end;
                continue;
            }
            current.replace_range(range.clone(), &replaced);
            from = range.start;
        }
        current
    }
}

/// A parameter or local variable, and what it is called in the target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variable {
    /// The name in the source, without any sigil.
    pub source: String,
    /// The name in the target, with any sigil.
    pub target: String,
    pub kind: VariableKind,
    /// Does a bare reference in the target collide with a column name?
    pub shadowed: bool,
}

/// Read-only facts about the unit being converted, shared by all rules.
#[derive(Clone, Debug)]
pub struct RewriteContext<'a> {
    pub direction: ConversionDirection,
    pub config: &'a EngineConfig,
    /// The routine name in the source, unquoted.
    pub source_routine: String,
    /// The routine name in the target, as written in the header.
    pub routine: String,
    /// Are we writing a procedure or a function?
    pub target_kind: RoutineKind,
    /// Does the target routine return a scalar value?
    pub returns_value: bool,
    /// An output parameter standing in for a scalar return value.
    pub result_parameter: Option<String>,
    /// The MySQL label on the routine body, so `LEAVE label` can return.
    pub body_label: Option<String>,
    variables: HashMap<String, Variable>,
}

impl<'a> RewriteContext<'a> {
    /// A context with no variables, for a procedure.
    pub fn new(direction: ConversionDirection, config: &'a EngineConfig) -> Self {
        Self {
            direction,
            config,
            source_routine: String::new(),
            routine: String::new(),
            target_kind: RoutineKind::Procedure,
            returns_value: false,
            result_parameter: None,
            body_label: None,
            variables: HashMap::new(),
        }
    }

    /// Add a variable, named by our target naming conventions.
    pub fn with_variable(mut self, name: &str, kind: VariableKind) -> Self {
        let target = naming::variable_name(name, kind, self.direction);
        self.insert_variable(Variable {
            source: name.to_owned(),
            target,
            kind,
            shadowed: false,
        });
        self
    }

    pub(crate) fn insert_variable(&mut self, variable: Variable) {
        self.variables
            .entry(variable_key(&variable.source))
            .or_insert(variable);
    }

    /// Look up a variable by its source name, with or without a sigil.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(&variable_key(name))
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// How to refer to the variable `name` inside an expression. Parameters
    /// whose name collides with a column are qualified with the routine name
    /// in PostgreSQL.
    pub fn reference(&self, name: &str) -> Option<String> {
        let variable = self.variable(name)?;
        if variable.shadowed
            && variable.kind == VariableKind::Parameter
            && self.direction.target == Dialect::PostgreSql
            && !self.routine.is_empty()
        {
            Some(format!("{}.{}", self.routine, variable.target))
        } else {
            Some(variable.target.clone())
        }
    }

    /// The name to use on the left of an assignment, never qualified.
    pub fn assignee(&self, name: &str) -> Option<String> {
        self.variable(name).map(|v| v.target.clone())
    }
}

fn variable_key(name: &str) -> String {
    name.trim_start_matches('@').to_ascii_lowercase()
}

/// The rules for one direction, sorted for application.
#[derive(Debug)]
pub struct RuleSet {
    direction: ConversionDirection,
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    /// Collect `rules` for `direction`. Rules for any other direction are
    /// ignored.
    pub fn new(direction: ConversionDirection, rules: Vec<RewriteRule>) -> Self {
        let mut rules = rules
            .into_iter()
            .filter(|r| r.direction == direction)
            .collect::<Vec<_>>();
        rules.sort_by_key(|r| (r.region, r.order));
        Self { direction, rules }
    }

    pub fn direction(&self) -> ConversionDirection {
        self.direction
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// The rules for `region`, in application order.
    pub fn group(&self, region: Region) -> impl Iterator<Item = &RewriteRule> {
        self.rules.iter().filter(move |r| r.region == region)
    }
}
