//! The built-in rule set for each direction.

use tracing::debug;

use crate::dialect::ConversionDirection;

use super::{builtins, error_handling, header, statements, variables, RuleSet, RewriteRule};

/// Every built-in rule for `direction`, one family after another.
pub fn builtin_rule_set(direction: ConversionDirection) -> RuleSet {
    let families: [fn(ConversionDirection) -> Vec<RewriteRule>; 5] = [
        header::rules,
        variables::rules,
        statements::rules,
        builtins::rules,
        error_handling::rules,
    ];
    let rules = families
        .iter()
        .flat_map(|family| family(direction))
        .collect::<Vec<_>>();
    debug!(%direction, count = rules.len(), "built rule set");
    RuleSet::new(direction, rules)
}
