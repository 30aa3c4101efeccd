//! Which rule set handles which direction.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    dialect::ConversionDirection,
    errors::{Error, Result},
    rules::{builtin_rule_set, RuleSet},
};

/// The registry with built-in rules for all six directions.
static BUILTIN: Lazy<DialectRegistry> = Lazy::new(|| {
    let mut registry = DialectRegistry::empty();
    for direction in ConversionDirection::all() {
        registry.register(builtin_rule_set(direction));
    }
    registry
});

/// Rule sets, keyed by direction.
///
/// A registry is built once and only read afterwards, so it can be shared
/// between threads freely.
#[derive(Debug, Default)]
pub struct DialectRegistry {
    sets: BTreeMap<ConversionDirection, RuleSet>,
}

impl DialectRegistry {
    /// A registry with no directions at all.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The process-wide registry of built-in rule sets.
    pub fn builtin() -> &'static DialectRegistry {
        &BUILTIN
    }

    /// Add `rule_set`, replacing any earlier set for the same direction.
    pub fn register(&mut self, rule_set: RuleSet) {
        let direction = rule_set.direction();
        debug!(%direction, rules = rule_set.rules().len(), "registering rule set");
        self.sets.insert(direction, rule_set);
    }

    /// The rule set for `direction`.
    pub fn resolve(&self, direction: ConversionDirection) -> Result<&RuleSet> {
        self.sets
            .get(&direction)
            .ok_or_else(|| Error::unsupported_direction(direction.source, direction.target))
    }

    /// Every registered direction, in a stable order.
    pub fn directions(&self) -> impl Iterator<Item = ConversionDirection> + '_ {
        self.sets.keys().copied()
    }
}

#[cfg(test)]
mod test {
    use crate::dialect::Dialect;

    use super::*;

    #[test]
    fn builtin_registry_covers_exactly_six_directions() {
        let registry = DialectRegistry::builtin();
        assert_eq!(registry.directions().count(), 6);
        for source in Dialect::ALL {
            for target in Dialect::ALL {
                match ConversionDirection::new(source, target) {
                    Ok(direction) => assert!(registry.resolve(direction).is_ok()),
                    Err(err) => assert!(matches!(err, Error::UnsupportedDirection { .. })),
                }
            }
        }
    }

    #[test]
    fn registering_a_direction_does_not_touch_others() {
        let to_pg = ConversionDirection::new(Dialect::SqlServer, Dialect::PostgreSql).unwrap();
        let mut registry = DialectRegistry::empty();
        registry.register(builtin_rule_set(to_pg));
        assert!(registry.resolve(to_pg).is_ok());
        assert!(matches!(
            registry.resolve(to_pg.reversed()),
            Err(Error::UnsupportedDirection { .. })
        ));
    }
}
