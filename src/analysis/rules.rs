//! Plate type rules engine
//!
//! Lexical shortcuts that settle the plate type from the recognized text alone. Rules are
//! evaluated in order and the first match wins; the learned classifier is only consulted when
//! nothing matches.

use crate::types::PlateType;

/// A single (predicate, category) entry of the decision table
#[derive(Debug, Clone, Copy)]
pub struct PlateRule {
    /// Rule identifier
    pub name: &'static str,
    /// Returns true when the rule applies to the plate code
    pub predicate: fn(&str) -> bool,
    /// Category assigned on match
    pub plate_type: PlateType,
}

impl PlateRule {
    pub fn matches(&self, code: &str) -> bool {
        (self.predicate)(code)
    }
}

/// Built-in decision table, in evaluation order.
///
/// The "粤Z" rule only covers Guangdong-registered cross-border vehicles; HK/Macao-linked plates
/// with other provincial prefixes fall through to the classifier.
pub const BUILTIN_RULES: &[PlateRule] = &[
    PlateRule {
        name: "armed_police_prefix",
        predicate: |code| code.starts_with("WJ"),
        plate_type: PlateType::WhiteSingle,
    },
    PlateRule {
        name: "new_energy_length",
        predicate: |code| code.chars().count() == 8,
        plate_type: PlateType::Green,
    },
    PlateRule {
        name: "learner",
        predicate: |code| code.contains('学'),
        plate_type: PlateType::Blue,
    },
    PlateRule {
        name: "hong_kong",
        predicate: |code| code.contains('港'),
        plate_type: PlateType::BlackHkMacao,
    },
    PlateRule {
        name: "macao",
        predicate: |code| code.contains('澳'),
        plate_type: PlateType::BlackHkMacao,
    },
    PlateRule {
        name: "police",
        predicate: |code| code.contains('警'),
        plate_type: PlateType::WhiteSingle,
    },
    PlateRule {
        name: "guangdong_z",
        predicate: |code| code.contains("粤Z"),
        plate_type: PlateType::BlackHkMacao,
    },
];

/// Classify a plate code with the built-in rules. `PlateType::Unknown` when nothing matches.
pub fn classify_by_rule(code: &str) -> PlateType {
    evaluate(BUILTIN_RULES.iter(), code)
}

fn evaluate<'a>(mut rules: impl Iterator<Item = &'a PlateRule>, code: &str) -> PlateType {
    rules
        .find(|rule| rule.matches(code))
        .map(|rule| rule.plate_type)
        .unwrap_or(PlateType::Unknown)
}

/// Rules engine: the built-in table followed by any extra rules registered at runtime
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    extra_rules: Vec<PlateRule>,
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Extra rules are evaluated after every built-in rule.
    pub fn register_rule(&mut self, rule: PlateRule) {
        self.extra_rules.push(rule);
    }

    pub fn rule_count(&self) -> usize {
        BUILTIN_RULES.len() + self.extra_rules.len()
    }

    /// Evaluate all rules against a plate code
    pub fn evaluate(&self, code: &str) -> PlateType {
        evaluate(BUILTIN_RULES.iter().chain(self.extra_rules.iter()), code)
    }

    /// Name of the first rule that matches, for diagnostics
    pub fn matching_rule(&self, code: &str) -> Option<&'static str> {
        BUILTIN_RULES
            .iter()
            .chain(self.extra_rules.iter())
            .find(|rule| rule.matches(code))
            .map(|rule| rule.name)
    }
}
