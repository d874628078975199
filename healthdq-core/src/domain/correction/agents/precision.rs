// healthdq-core/src/domain/correction/agents/precision.rs

use std::sync::Arc;
use tracing::debug;

use super::{CorrectionAgent, Proposals};
use crate::domain::correction::imputation::Imputer;
use crate::domain::correction::model::{Correction, CorrectionIdSeq, Dimension, Strategy};
use crate::domain::dataset::{Record, Value, round_to};
use crate::domain::detection::{Violation, ViolationDetail};
use crate::domain::error::DomainError;
use crate::domain::rules::{RuleKind, RuleKindTag, RuleRegistry};

/// Fixes logical inconsistencies: recomputes derived fields and
/// proposes replacements for implausible readings.
pub struct PrecisionAgent {
    registry: Arc<RuleRegistry>,
    imputer: Arc<Imputer>,
}

impl PrecisionAgent {
    pub fn new(registry: Arc<RuleRegistry>, imputer: Arc<Imputer>) -> Self {
        Self { registry, imputer }
    }

    fn recompute(
        &self,
        record: &Record,
        violation: &Violation,
    ) -> Result<(Value, Vec<String>), DomainError> {
        let Some(RuleKind::DerivedFormula {
            formula, decimals, ..
        }) = self.registry.rule(violation.rule_index).map(|r| &r.kind)
        else {
            return Err(DomainError::Config(format!(
                "rule #{} is not a derived formula",
                violation.rule_index
            )));
        };

        let raw = formula
            .eval(record)
            .map_err(|e| DomainError::FormulaEvaluation {
                record_id: record.id.to_string(),
                field: violation.field.clone(),
                reason: e.to_string(),
            })?;
        let value = decimals.map_or(raw, |d| round_to(raw, d));
        Ok((Value::Number(value), formula.inputs().to_vec()))
    }

    /// Replacement for an implausible reading: the imputed value, or null.
    fn reimpute(&self, record: &Record, violation: &Violation) -> (Value, Vec<String>) {
        match self.imputer.impute(record, &violation.field) {
            Ok(imputed) => (imputed.value, imputed.derived_from),
            Err(e) => {
                debug!(error = %e, "No replacement available, proposing null");
                (Value::Null, vec![])
            }
        }
    }
}

impl CorrectionAgent for PrecisionAgent {
    fn dimension(&self) -> Dimension {
        Dimension::Precision
    }

    fn handles(&self, violation: &Violation) -> bool {
        match (violation.rule_kind, &violation.detail) {
            (RuleKindTag::DerivedFormula, _) => true,
            (
                RuleKindTag::Range,
                ViolationDetail::OutOfRange { .. } | ViolationDetail::NotNumeric,
            ) => true,
            _ => false,
        }
    }

    fn propose(
        &self,
        record: &Record,
        violations: &[Violation],
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut out = Proposals::default();
        for violation in violations.iter().filter(|v| self.handles(v)) {
            let (strategy, outcome) = match &violation.detail {
                ViolationDetail::FormulaNotEvaluable { reason } => (
                    Strategy::Recompute,
                    Err(DomainError::FormulaEvaluation {
                        record_id: record.id.to_string(),
                        field: violation.field.clone(),
                        reason: reason.clone(),
                    }),
                ),
                ViolationDetail::OutOfRange { .. } | ViolationDetail::NotNumeric => (
                    Strategy::NullifyAndReimpute,
                    Ok(self.reimpute(record, violation)),
                ),
                _ => (Strategy::Recompute, self.recompute(record, violation)),
            };
            match outcome {
                Ok((value, derived_from)) => {
                    let correction = Correction::propose(
                        ids.next_id(),
                        record.id.clone(),
                        &violation.field,
                        violation.rule_index,
                        self.dimension(),
                        violation.observed_value.clone(),
                        value,
                        strategy,
                        derived_from,
                    );
                    // Range fixes replace a reading; a reviewer must see them.
                    out.corrections.push(if strategy == Strategy::NullifyAndReimpute {
                        correction.with_review()
                    } else {
                        correction
                    });
                }
                Err(e) => out.push_error(violation, e)?,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::correction::unresolved::UnresolvedReason;
    use crate::domain::dataset::Dataset;
    use crate::domain::detection::ViolationDetector;
    use crate::domain::rules::RuleDocument;
    use anyhow::Result;

    fn setup() -> (Arc<RuleRegistry>, Dataset) {
        let doc: RuleDocument = serde_yaml::from_str(
            r#"
fields: [weight_kg]
rules:
  - field: height_cm
    kind: range
    min: 50
    max: 250
  - field: bmi
    kind: derived_formula
    formula: "weight_kg / (height_cm / 100) ^ 2"
    decimals: 1
imputation:
  height_cm: { strategy: median }
"#,
        )
        .unwrap();
        let registry = Arc::new(RuleRegistry::load(doc).unwrap());
        let dataset = Dataset::new(vec![
            Record::new("a").with("height_cm", 160.0),
            Record::new("b").with("height_cm", 170.0),
            Record::new("c").with("height_cm", 180.0),
        ]);
        (registry, dataset)
    }

    fn agent(registry: &Arc<RuleRegistry>, dataset: &Dataset) -> PrecisionAgent {
        PrecisionAgent::new(
            registry.clone(),
            Arc::new(Imputer::fit(dataset, registry)),
        )
    }

    #[test]
    fn test_recompute_carries_formula_inputs() -> Result<()> {
        let (registry, dataset) = setup();
        let agent = agent(&registry, &dataset);
        let record = Record::new("p")
            .with("height_cm", 170.0)
            .with("weight_kg", 70.0)
            .with("bmi", 30.0);

        let violations = ViolationDetector::evaluate(&registry.rules()[1], &record);
        let out = agent.propose(&record, &violations, &mut CorrectionIdSeq::default())?;

        let c = &out.corrections[0];
        assert_eq!(c.strategy, Strategy::Recompute);
        assert_eq!(c.proposed_value, Value::Number(24.2));
        assert_eq!(c.derived_from, vec!["height_cm", "weight_kg"]);
        assert!(!c.requires_review);
        Ok(())
    }

    #[test]
    fn test_out_of_range_is_reimputed_under_review() -> Result<()> {
        let (registry, dataset) = setup();
        let agent = agent(&registry, &dataset);
        let record = Record::new("p").with("height_cm", 1700.0);

        let violations = ViolationDetector::evaluate(&registry.rules()[0], &record);
        let out = agent.propose(&record, &violations, &mut CorrectionIdSeq::default())?;

        let c = &out.corrections[0];
        assert_eq!(c.strategy, Strategy::NullifyAndReimpute);
        assert_eq!(c.original_value, Value::Number(1700.0));
        assert_eq!(c.proposed_value, Value::Number(170.0));
        assert!(c.requires_review);
        Ok(())
    }

    #[test]
    fn test_unevaluable_formula_is_unresolved() -> Result<()> {
        let (registry, dataset) = setup();
        let agent = agent(&registry, &dataset);
        let record = Record::new("p")
            .with("height_cm", 0.0)
            .with("weight_kg", 70.0)
            .with("bmi", 30.0);

        let violations = ViolationDetector::evaluate(&registry.rules()[1], &record);
        let out = agent.propose(&record, &violations, &mut CorrectionIdSeq::default())?;
        assert!(out.corrections.is_empty());
        assert_eq!(out.unresolved[0].reason, UnresolvedReason::FormulaEvaluation);
        Ok(())
    }
}
