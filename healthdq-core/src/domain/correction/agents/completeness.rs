// healthdq-core/src/domain/correction/agents/completeness.rs

use std::sync::Arc;

use super::{CorrectionAgent, Proposals};
use crate::domain::correction::imputation::Imputer;
use crate::domain::correction::model::{Correction, CorrectionIdSeq, Dimension};
use crate::domain::dataset::Record;
use crate::domain::detection::Violation;
use crate::domain::error::DomainError;
use crate::domain::rules::RuleKindTag;

/// Fills missing values with the configured imputation strategy.
pub struct CompletenessAgent {
    imputer: Arc<Imputer>,
}

impl CompletenessAgent {
    pub fn new(imputer: Arc<Imputer>) -> Self {
        Self { imputer }
    }
}

impl CorrectionAgent for CompletenessAgent {
    fn dimension(&self) -> Dimension {
        Dimension::Completeness
    }

    fn handles(&self, violation: &Violation) -> bool {
        violation.rule_kind == RuleKindTag::Required
    }

    fn propose(
        &self,
        record: &Record,
        violations: &[Violation],
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut out = Proposals::default();
        for violation in violations.iter().filter(|v| self.handles(v)) {
            match self.imputer.impute(record, &violation.field) {
                Ok(imputed) => out.corrections.push(Correction::propose(
                    ids.next_id(),
                    record.id.clone(),
                    &violation.field,
                    violation.rule_index,
                    self.dimension(),
                    violation.observed_value.clone(),
                    imputed.value,
                    imputed.strategy,
                    imputed.derived_from,
                )),
                Err(e) => out.push_error(violation, e)?,
            }
        }
        Ok(out)
    }
}
