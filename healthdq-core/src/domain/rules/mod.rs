// healthdq-core/src/domain/rules/mod.rs

pub mod document;
pub mod formula;
pub mod quantity;
pub mod registry;
pub mod rule;

pub use document::{ImputationSpec, RangePolicy, ReviewSection, RuleDocument, RuleSpec};
pub use formula::{Comparison, Condition, Formula, FormulaError};
pub use quantity::{Quantity, UnitSpec};
pub use registry::{ImputationStrategy, ReviewPolicy, RuleRegistry};
pub use rule::{Rule, RuleKind, RuleKindTag, Severity};
