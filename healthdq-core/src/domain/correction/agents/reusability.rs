// healthdq-core/src/domain/correction/agents/reusability.rs

use std::sync::Arc;

use super::{CorrectionAgent, Proposals};
use crate::domain::correction::model::{Correction, CorrectionIdSeq, Dimension, Strategy};
use crate::domain::dataset::{Record, Value, round_to};
use crate::domain::detection::{Violation, ViolationDetail};
use crate::domain::error::DomainError;
use crate::domain::rules::{Quantity, RuleKindTag, RuleRegistry};

// Keeps converted magnitudes free of float noise (0.1 + 0.2 style).
const CONVERSION_DECIMALS: u32 = 6;

/// Harmonizes representations: categorical synonyms and measurement units.
pub struct ReusabilityAgent {
    registry: Arc<RuleRegistry>,
}

impl ReusabilityAgent {
    pub fn new(registry: Arc<RuleRegistry>) -> Self {
        Self { registry }
    }

    fn canonical_value(&self, record: &Record, violation: &Violation) -> Result<Value, DomainError> {
        match &violation.detail {
            ViolationDetail::NonCanonical {
                target: Some(target),
            } => Ok(Value::Text(target.clone())),
            _ => Err(DomainError::UnmappedCategory {
                record_id: record.id.to_string(),
                field: violation.field.clone(),
                value: violation.observed_value.render(),
            }),
        }
    }

    fn converted_value(&self, record: &Record, violation: &Violation) -> Result<Value, DomainError> {
        let unmapped = |unit: &str| DomainError::UnmappedUnit {
            record_id: record.id.to_string(),
            field: violation.field.clone(),
            unit: unit.to_string(),
        };
        let ViolationDetail::UnitMismatch { unit, .. } = &violation.detail else {
            return Err(unmapped(""));
        };
        let spec = self
            .registry
            .rule(violation.rule_index)
            .and_then(|r| r.unit())
            .ok_or_else(|| unmapped(unit))?;
        let quantity = Quantity::parse(&violation.observed_value).ok_or_else(|| unmapped(unit))?;
        let magnitude = spec.to_canonical(&quantity).ok_or_else(|| unmapped(unit))?;
        Ok(Value::Number(round_to(magnitude, CONVERSION_DECIMALS)))
    }
}

impl CorrectionAgent for ReusabilityAgent {
    fn dimension(&self) -> Dimension {
        Dimension::Reusability
    }

    fn handles(&self, violation: &Violation) -> bool {
        violation.rule_kind == RuleKindTag::CategoricalMap
            || (violation.rule_kind == RuleKindTag::Range && violation.is_unit_mismatch())
    }

    fn propose(
        &self,
        record: &Record,
        violations: &[Violation],
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut out = Proposals::default();
        for violation in violations.iter().filter(|v| self.handles(v)) {
            let outcome = if violation.is_unit_mismatch() {
                self.converted_value(record, violation)
                    .map(|v| (v, Strategy::UnitConversion, vec![violation.field.clone()]))
            } else {
                self.canonical_value(record, violation)
                    .map(|v| (v, Strategy::CanonicalMap, vec![]))
            };
            match outcome {
                Ok((value, strategy, derived_from)) => out.corrections.push(Correction::propose(
                    ids.next_id(),
                    record.id.clone(),
                    &violation.field,
                    violation.rule_index,
                    self.dimension(),
                    violation.observed_value.clone(),
                    value,
                    strategy,
                    derived_from,
                )),
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
    use crate::domain::detection::ViolationDetector;
    use crate::domain::rules::RuleDocument;
    use anyhow::Result;

    fn registry() -> Arc<RuleRegistry> {
        let doc: RuleDocument = serde_yaml::from_str(
            r#"
rules:
  - field: sex_at_birth
    kind: categorical_map
    canonical: [male, female]
    synonyms: { M: male, F: female }
  - field: weight_kg
    kind: range
    min: 2
    max: 400
    unit: kg
    conversions: { lb: 0.45359237, g: 0.001 }
"#,
        )
        .unwrap();
        Arc::new(RuleRegistry::load(doc).unwrap())
    }

    fn propose(record: &Record) -> Result<Proposals> {
        let registry = registry();
        let agent = ReusabilityAgent::new(registry.clone());
        let violations: Vec<Violation> = registry
            .rules()
            .iter()
            .flat_map(|r| ViolationDetector::evaluate(r, record))
            .collect();
        Ok(agent.propose(record, &violations, &mut CorrectionIdSeq::default())?)
    }

    #[test]
    fn test_synonym_is_mapped_to_canonical() -> Result<()> {
        let out = propose(&Record::new("p1").with("sex_at_birth", "M"))?;
        let c = &out.corrections[0];
        assert_eq!(c.proposed_value, Value::Text("male".into()));
        assert_eq!(c.strategy, Strategy::CanonicalMap);
        assert!(out.unresolved.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_category_is_left_unresolved() -> Result<()> {
        let out = propose(&Record::new("p2").with("sex_at_birth", "X"))?;
        assert!(out.corrections.is_empty());
        assert_eq!(out.unresolved[0].reason, UnresolvedReason::UnmappedCategory);
        assert!(out.unresolved[0].message.contains("'X'"));
        Ok(())
    }

    #[test]
    fn test_units_are_converted_or_reported() -> Result<()> {
        let out = propose(&Record::new("p3").with("weight_kg", "154 lb"))?;
        let c = &out.corrections[0];
        assert_eq!(c.strategy, Strategy::UnitConversion);
        assert_eq!(c.proposed_value, Value::Number(69.853225));
        assert_eq!(c.derived_from, vec!["weight_kg"]);

        let out = propose(&Record::new("p4").with("weight_kg", "11 st"))?;
        assert_eq!(out.unresolved[0].reason, UnresolvedReason::UnmappedUnit);
        Ok(())
    }
}
