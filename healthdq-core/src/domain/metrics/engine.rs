// healthdq-core/src/domain/metrics/engine.rs

use std::collections::{BTreeMap, BTreeSet};
use tracing::instrument;

use super::snapshot::{MetricName, MetricSnapshot, Ratio, Stage};
use crate::domain::dataset::{Dataset, round_to};
use crate::domain::rules::{Quantity, RuleKind, RuleKindTag, RuleRegistry};

#[derive(Default)]
struct Tally {
    hits: u64,
    checked: u64,
}

impl Tally {
    fn count(&mut self, hit: bool) {
        self.checked += 1;
        if hit {
            self.hits += 1;
        }
    }

    fn ratio(&self, name: MetricName) -> Ratio {
        Ratio::of(self.hits, self.checked, name.empty_value())
    }
}

/// Closed-form quality ratios over a snapshot.
pub struct MetricsEngine;

impl MetricsEngine {
    #[instrument(skip_all, fields(stage = ?stage, records = dataset.len()))]
    pub fn compute(dataset: &Dataset, registry: &RuleRegistry, stage: Stage) -> MetricSnapshot {
        let mut not_null = Tally::default();
        let mut out_of_range = Tally::default();
        let mut consistent = Tally::default();
        let mut standardized = Tally::default();
        let mut aligned = Tally::default();

        // Cells, not rules: two required rules on one field count once.
        let required: BTreeSet<&str> = registry
            .rules_of(RuleKindTag::Required)
            .map(|r| r.field.as_str())
            .collect();
        let categorical: BTreeSet<&str> = registry
            .rules_of(RuleKindTag::CategoricalMap)
            .map(|r| r.field.as_str())
            .collect();

        for record in dataset.records() {
            for field in &required {
                not_null.count(!record.is_missing(field));
            }

            for rule in registry.rules() {
                let value = record.value(&rule.field);
                match &rule.kind {
                    RuleKind::Required => {}
                    RuleKind::Range { min, max, unit } => {
                        if value.is_missing() {
                            continue;
                        }
                        let quantity = Quantity::parse(value);
                        let magnitude = match (&quantity, unit) {
                            (Some(q), Some(spec)) => spec.to_canonical(q),
                            (Some(q), None) if q.unit.is_none() => Some(q.magnitude),
                            _ => None,
                        };
                        out_of_range.count(magnitude.is_none_or(|m| m < *min || m > *max));

                        if let Some(spec) = unit {
                            aligned.count(quantity.is_some_and(|q| spec.is_canonical(&q)));
                        }
                    }
                    RuleKind::CategoricalMap { canonical, .. } => {
                        if !value.is_missing() {
                            standardized.count(canonical.contains(&value.render()));
                        }
                    }
                    RuleKind::DerivedFormula {
                        formula,
                        tolerance,
                        decimals,
                    } => {
                        if value.is_missing() || formula.missing_inputs(record).next().is_some() {
                            continue;
                        }
                        let ok = match (formula.eval(record), value.as_f64()) {
                            (Ok(raw), Some(stored)) => {
                                let expected = decimals.map_or(raw, |d| round_to(raw, d));
                                (stored - expected).abs() <= *tolerance
                            }
                            _ => false,
                        };
                        consistent.count(ok);
                    }
                }
            }
        }

        // Distinct spellings per categorical field over all rows of that field.
        let distinct: u64 = categorical
            .iter()
            .map(|field| {
                dataset
                    .column(field)
                    .filter(|v| !v.is_missing())
                    .map(|v| v.render())
                    .collect::<BTreeSet<_>>()
                    .len() as u64
            })
            .sum();
        let categorical_rows = (categorical.len() * dataset.len()) as u64;

        let metrics = BTreeMap::from([
            (
                MetricName::NotNullRate,
                not_null.ratio(MetricName::NotNullRate),
            ),
            (
                MetricName::OutOfRangeRate,
                out_of_range.ratio(MetricName::OutOfRangeRate),
            ),
            (
                MetricName::LogicalConsistencyRate,
                consistent.ratio(MetricName::LogicalConsistencyRate),
            ),
            (
                MetricName::CategoricalStandardizationRate,
                standardized.ratio(MetricName::CategoricalStandardizationRate),
            ),
            (
                MetricName::UnitAlignmentRate,
                aligned.ratio(MetricName::UnitAlignmentRate),
            ),
            (
                MetricName::MissingnessIndex,
                Ratio::of(
                    not_null.checked - not_null.hits,
                    not_null.checked,
                    MetricName::MissingnessIndex.empty_value(),
                ),
            ),
            (
                MetricName::CategoricalConsistency,
                Ratio::of(
                    distinct,
                    categorical_rows,
                    MetricName::CategoricalConsistency.empty_value(),
                ),
            ),
        ]);

        MetricSnapshot {
            stage,
            record_count: dataset.len(),
            schema_fingerprint: dataset.fingerprint().clone(),
            metrics,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::{Record, Value};
    use crate::domain::detection::ViolationDetector;
    use crate::domain::rules::RuleDocument;
    use anyhow::Result;

    fn registry() -> RuleRegistry {
        let doc: RuleDocument = serde_yaml::from_str(
            r#"
fields: [weight_kg]
rules:
  - field: height_cm
    kind: required
  - field: height_cm
    kind: range
    min: 50
    max: 250
    unit: cm
    conversions: { m: 100 }
  - field: sex_at_birth
    kind: categorical_map
    canonical: [male, female]
    synonyms: { M: male }
  - field: bmi
    kind: derived_formula
    formula: "weight_kg / (height_cm / 100) ^ 2"
    decimals: 1
"#,
        )
        .unwrap();
        RuleRegistry::load(doc).unwrap()
    }

    #[test]
    fn test_rates_on_dirty_dataset() {
        let ds = Dataset::new(vec![
            Record::new("1")
                .with("height_cm", Value::Null)
                .with("weight_kg", 70.0)
                .with("bmi", 30.0)
                .with("sex_at_birth", "M"),
            Record::new("2")
                .with("height_cm", "1.7 m")
                .with("sex_at_birth", "female"),
            Record::new("3")
                .with("height_cm", 400.0)
                .with("weight_kg", 80.0)
                .with("bmi", 10.0),
            Record::new("4")
                .with("height_cm", 170.0)
                .with("weight_kg", 70.0)
                .with("bmi", 24.2),
        ]);
        let snap = MetricsEngine::compute(&ds, &registry(), Stage::Before);

        let r = |n: MetricName| snap.metrics[&n];
        let not_null = r(MetricName::NotNullRate);
        assert_eq!((not_null.numerator, not_null.denominator), (3, 4));
        // "1.7 m" converts to 170 cm: in range. 400 is not.
        assert_eq!(r(MetricName::OutOfRangeRate).value, 1.0 / 3.0);
        assert_eq!(r(MetricName::UnitAlignmentRate).value, 2.0 / 3.0);
        assert_eq!(r(MetricName::CategoricalStandardizationRate).value, 0.5);
        assert_eq!(r(MetricName::LogicalConsistencyRate).value, 0.5);
        assert_eq!(r(MetricName::MissingnessIndex).value, 0.25);
        // "M" and "female" over four rows
        let spread = r(MetricName::CategoricalConsistency);
        assert_eq!((spread.numerator, spread.denominator), (2, 4));
        assert_eq!(snap.record_count, 4);
    }

    #[test]
    fn test_clean_dataset_scores_perfect() -> Result<()> {
        let reg = registry();
        let ds = Dataset::new(vec![
            Record::new("1")
                .with("height_cm", 170.0)
                .with("weight_kg", 70.0)
                .with("bmi", 24.2)
                .with("sex_at_birth", "male"),
        ]);
        assert!(ViolationDetector::detect(&ds, &reg).is_empty());

        let snap = MetricsEngine::compute(&ds, &reg, Stage::After);
        for name in MetricName::ALL {
            if name == MetricName::CategoricalConsistency {
                continue;
            }
            let expected = if name.higher_is_better() { 1.0 } else { 0.0 };
            assert_eq!(snap.value(name), Some(expected), "{}", name);
        }
        // A single row can only ever hold one spelling.
        assert_eq!(snap.value(MetricName::CategoricalConsistency), Some(1.0));
        Ok(())
    }

    #[test]
    fn test_standardizing_synonyms_lowers_categorical_spread() {
        let reg = registry();
        let raw = Dataset::new(vec![
            Record::new("1").with("sex_at_birth", "M"),
            Record::new("2").with("sex_at_birth", "male"),
            Record::new("3").with("sex_at_birth", Value::Null),
        ]);
        let clean = Dataset::new(vec![
            Record::new("1").with("sex_at_birth", "male"),
            Record::new("2").with("sex_at_birth", "male"),
            Record::new("3").with("sex_at_birth", Value::Null),
        ]);
        let before = MetricsEngine::compute(&raw, &reg, Stage::Before);
        let after = MetricsEngine::compute(&clean, &reg, Stage::After);
        assert_eq!(before.value(MetricName::CategoricalConsistency), Some(2.0 / 3.0));
        assert_eq!(after.value(MetricName::CategoricalConsistency), Some(1.0 / 3.0));
    }

    #[test]
    fn test_empty_dataset_stays_in_bounds() {
        let snap = MetricsEngine::compute(&Dataset::new(vec![]), &registry(), Stage::Before);
        assert!(snap.metrics.values().all(|r| (0.0..=1.0).contains(&r.value)));
        assert_eq!(snap.value(MetricName::OutOfRangeRate), Some(0.0));
        assert_eq!(snap.value(MetricName::MissingnessIndex), Some(0.0));
        assert_eq!(snap.value(MetricName::CategoricalConsistency), Some(0.0));
    }
}
