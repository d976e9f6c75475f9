//! Analysis Layer
//!
//! Plate type inference from recognized text.

pub mod rules;

pub use rules::{classify_by_rule, PlateRule, RulesEngine, BUILTIN_RULES};
