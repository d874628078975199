// healthdq-core/src/domain/correction/agents/mod.rs

pub mod completeness;
pub mod precision;
pub mod reusability;

pub use completeness::CompletenessAgent;
pub use precision::PrecisionAgent;
pub use reusability::ReusabilityAgent;

use super::model::{Correction, CorrectionIdSeq, Dimension};
use super::unresolved::UnresolvedIssue;
use crate::domain::dataset::Record;
use crate::domain::detection::Violation;
use crate::domain::error::DomainError;

/// What an agent produced for one record.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Proposals {
    pub corrections: Vec<Correction>,
    pub unresolved: Vec<UnresolvedIssue>,
}

impl Proposals {
    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty() && self.unresolved.is_empty()
    }

    pub fn extend(&mut self, other: Proposals) {
        self.corrections.extend(other.corrections);
        self.unresolved.extend(other.unresolved);
    }

    /// Records a per-field failure. Fatal errors are passed back to the caller.
    fn push_error(&mut self, violation: &Violation, error: DomainError) -> Result<(), DomainError> {
        match UnresolvedIssue::from_error(violation, &error) {
            Some(issue) => {
                tracing::warn!(
                    record = %violation.record_id,
                    field = %violation.field,
                    "{}",
                    issue.message
                );
                self.unresolved.push(issue);
                Ok(())
            }
            None => Err(error),
        }
    }
}

/// One quality dimension. Agents only read the record; they never write it.
pub trait CorrectionAgent: Send + Sync {
    fn dimension(&self) -> Dimension;

    /// Whether this agent owns the violation.
    fn handles(&self, violation: &Violation) -> bool;

    /// Proposes corrections for the violations this agent handles and skips the rest.
    /// Deterministic for a given record, rule set and configuration.
    fn propose(
        &self,
        record: &Record,
        violations: &[Violation],
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError>;
}
