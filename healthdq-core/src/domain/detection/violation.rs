// healthdq-core/src/domain/detection/violation.rs

use serde::{Deserialize, Serialize};

use crate::domain::dataset::{RecordId, Value};
use crate::domain::rules::{RuleKindTag, Severity};

/// Why a rule fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViolationDetail {
    Missing,
    /// A formula input is missing. The violation targets the input field.
    MissingFormulaSource { derived_field: String },
    NotNumeric,
    OutOfRange { magnitude: f64, min: f64, max: f64 },
    UnitMismatch {
        unit: String,
        canonical: Option<String>,
    },
    /// `target` is set when the value is a known synonym.
    NonCanonical { target: Option<String> },
    Inconsistent { expected: f64 },
    FormulaNotEvaluable { reason: String },
}

/// Transient evidence that one rule failed on one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub record_id: RecordId,
    pub field: String,
    pub rule_kind: RuleKindTag,
    pub rule_index: usize,
    pub rule_name: String,
    pub observed_value: Value,
    pub severity: Severity,
    pub detail: ViolationDetail,
    pub message: String,
}

impl Violation {
    pub fn is_unit_mismatch(&self) -> bool {
        matches!(self.detail, ViolationDetail::UnitMismatch { .. })
    }
}
