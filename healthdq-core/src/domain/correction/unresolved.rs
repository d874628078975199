// healthdq-core/src/domain/correction/unresolved.rs

use serde::{Deserialize, Serialize};

use super::model::CorrectionId;
use crate::domain::dataset::RecordId;
use crate::domain::detection::Violation;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    Imputation,
    UnmappedCategory,
    UnmappedUnit,
    FormulaEvaluation,
    /// A correction that needs a reviewer and was not auto-applied.
    DeferredForReview,
}

/// A violation no agent could fix, left for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedIssue {
    pub record_id: RecordId,
    pub field: String,
    pub rule_index: usize,
    pub reason: UnresolvedReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_id: Option<CorrectionId>,
    pub message: String,
}

impl UnresolvedIssue {
    /// Maps a per-field agent error onto an issue. `None` for fatal errors.
    pub fn from_error(violation: &Violation, error: &DomainError) -> Option<Self> {
        let reason = match error {
            DomainError::Imputation { .. } => UnresolvedReason::Imputation,
            DomainError::UnmappedCategory { .. } => UnresolvedReason::UnmappedCategory,
            DomainError::UnmappedUnit { .. } => UnresolvedReason::UnmappedUnit,
            DomainError::FormulaEvaluation { .. } => UnresolvedReason::FormulaEvaluation,
            _ => return None,
        };
        Some(Self {
            record_id: violation.record_id.clone(),
            field: violation.field.clone(),
            rule_index: violation.rule_index,
            reason,
            correction_id: None,
            message: error.to_string(),
        })
    }
}
