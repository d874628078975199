// healthdq-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Diagnostic)]
pub enum DomainError {
    #[error("Invalid rule document: {0}")]
    #[diagnostic(
        code(healthdq::domain::config),
        help("Check rule kinds, parameter names and the fields referenced by formulas.")
    )]
    Config(String),

    #[error("Cannot impute '{field}' on record '{record_id}': {reason}")]
    #[diagnostic(
        code(healthdq::domain::imputation),
        help("Declare an imputation strategy for this field under `imputation:`.")
    )]
    Imputation {
        record_id: String,
        field: String,
        reason: String,
    },

    #[error("No canonical mapping for '{value}' in '{field}' (record '{record_id}')")]
    #[diagnostic(
        code(healthdq::domain::unmapped_category),
        help("Add the value to `synonyms` or label the record manually.")
    )]
    UnmappedCategory {
        record_id: String,
        field: String,
        value: String,
    },

    #[error("No conversion from unit '{unit}' for '{field}' (record '{record_id}')")]
    #[diagnostic(code(healthdq::domain::unmapped_unit))]
    UnmappedUnit {
        record_id: String,
        field: String,
        unit: String,
    },

    #[error("Formula for '{field}' cannot be evaluated on record '{record_id}': {reason}")]
    #[diagnostic(code(healthdq::domain::formula))]
    FormulaEvaluation {
        record_id: String,
        field: String,
        reason: String,
    },

    #[error("Ledger consistency violated: {0}")]
    #[diagnostic(
        code(healthdq::domain::ledger),
        help("Only terminal corrections can be recorded, and each decision exactly once.")
    )]
    LedgerConsistency(String),

    #[error("Record id '{0}' appears more than once in the snapshot")]
    #[diagnostic(
        code(healthdq::domain::duplicate_record),
        help("Record ids must be unique; check `id_field` in the rule document.")
    )]
    DuplicateRecord(String),

    #[error("Invalid decision: {0}")]
    #[diagnostic(code(healthdq::domain::decision))]
    Decision(String),

    #[error("Pipeline cannot {action} while {state}")]
    #[diagnostic(code(healthdq::domain::state))]
    InvalidTransition { state: String, action: String },
}

impl DomainError {
    /// Per-record, per-field errors degrade to unresolved issues. Everything else stops the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Imputation { .. }
                | Self::UnmappedCategory { .. }
                | Self::UnmappedUnit { .. }
                | Self::FormulaEvaluation { .. }
        )
    }
}
