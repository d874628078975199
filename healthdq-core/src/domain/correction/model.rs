// healthdq-core/src/domain/correction/model.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::dataset::{CellEdit, RecordId, Value};
use crate::domain::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionId(pub u32);

impl fmt::Display for CorrectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c-{:04}", self.0)
    }
}

impl std::str::FromStr for CorrectionId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches("c-");
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| DomainError::Decision(format!("'{}' is not a correction id", s)))
    }
}

/// Hands out run-scoped correction ids in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionIdSeq {
    next: u32,
}

impl CorrectionIdSeq {
    pub fn next_id(&mut self) -> CorrectionId {
        self.next += 1;
        CorrectionId(self.next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Precision,
    Completeness,
    Reusability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Median,
    Mode,
    ConditionalCompute,
    Recompute,
    NullifyAndReimpute,
    CanonicalMap,
    UnitConversion,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Median => "median",
            Self::Mode => "mode",
            Self::ConditionalCompute => "conditional_compute",
            Self::Recompute => "recompute",
            Self::NullifyAndReimpute => "nullify_and_reimpute",
            Self::CanonicalMap => "canonical_map",
            Self::UnitConversion => "unit_conversion",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionStatus {
    Proposed,
    Accepted,
    Overridden,
    Rejected,
}

impl CorrectionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Proposed)
    }

    /// Accepted or overridden: the correction changes the record.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Accepted | Self::Overridden)
    }
}

impl fmt::Display for CorrectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Overridden => "overridden",
            Self::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecidedBy {
    Automatic,
    Human,
}

impl fmt::Display for DecidedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Human => write!(f, "human"),
        }
    }
}

/// Outcome of a review.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept,
    Override(Value),
    Reject,
}

impl Decision {
    /// Builds a decision from a status name and an optional override value.
    pub fn parse(status: &str, value: Option<Value>) -> Result<Self, DomainError> {
        match (status.trim(), value) {
            ("accept" | "accepted", None) => Ok(Self::Accept),
            ("reject" | "rejected", None) => Ok(Self::Reject),
            ("override" | "overridden", Some(v)) => Ok(Self::Override(v)),
            ("override" | "overridden", None) => Err(DomainError::Decision(
                "an override needs a value".into(),
            )),
            (other @ ("accept" | "accepted" | "reject" | "rejected"), Some(_)) => Err(
                DomainError::Decision(format!("'{}' does not take a value", other)),
            ),
            (other, _) => Err(DomainError::Decision(format!(
                "unknown status '{}' (expected accept, override or reject)",
                other
            ))),
        }
    }
}

/// A proposed change to one cell, plus its provenance and review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: CorrectionId,
    pub record_id: RecordId,
    pub field: String,
    pub rule_index: usize,
    pub dimension: Dimension,
    pub original_value: Value,
    pub proposed_value: Value,
    pub strategy: Strategy,
    /// Source fields the value was computed from, sorted. Empty if none.
    pub derived_from: Vec<String>,
    /// Same-run corrections whose values fed this one.
    #[serde(default)]
    pub depends_on: Vec<CorrectionId>,
    #[serde(default)]
    pub requires_review: bool,
    pub status: CorrectionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_by: Option<DecidedBy>,
}

impl Correction {
    #[allow(clippy::too_many_arguments)]
    pub fn propose(
        id: CorrectionId,
        record_id: RecordId,
        field: &str,
        rule_index: usize,
        dimension: Dimension,
        original_value: Value,
        proposed_value: Value,
        strategy: Strategy,
        derived_from: Vec<String>,
    ) -> Self {
        Self {
            id,
            record_id,
            field: field.to_string(),
            rule_index,
            dimension,
            original_value,
            proposed_value,
            strategy,
            derived_from,
            depends_on: Vec::new(),
            requires_review: false,
            status: CorrectionStatus::Proposed,
            override_value: None,
            decided_by: None,
        }
    }

    pub fn with_review(mut self) -> Self {
        self.requires_review = true;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == CorrectionStatus::Proposed
    }

    /// The single transition out of `proposed`.
    pub fn decide(&mut self, decision: Decision, by: DecidedBy) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::Decision(format!(
                "{} is already {}",
                self.id, self.status
            )));
        }
        match decision {
            Decision::Accept => self.status = CorrectionStatus::Accepted,
            Decision::Reject => self.status = CorrectionStatus::Rejected,
            Decision::Override(value) => {
                self.status = CorrectionStatus::Overridden;
                self.override_value = Some(value);
            }
        }
        self.decided_by = Some(by);
        Ok(())
    }

    /// Value written to the record when applied.
    pub fn applied_value(&self) -> Option<&Value> {
        match self.status {
            CorrectionStatus::Accepted => Some(&self.proposed_value),
            CorrectionStatus::Overridden => self.override_value.as_ref(),
            CorrectionStatus::Proposed | CorrectionStatus::Rejected => None,
        }
    }

    pub fn to_edit(&self) -> Option<CellEdit> {
        self.applied_value().map(|value| CellEdit {
            record_id: self.record_id.clone(),
            field: self.field.clone(),
            value: value.clone(),
        })
    }
}
