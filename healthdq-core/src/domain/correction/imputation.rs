// healthdq-core/src/domain/correction/imputation.rs

use std::collections::BTreeMap;

use super::model::Strategy;
use crate::domain::dataset::{Dataset, Record, Value, round_to};
use crate::domain::error::DomainError;
use crate::domain::rules::{ImputationStrategy, RuleRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct Imputed {
    pub value: Value,
    pub strategy: Strategy,
    pub derived_from: Vec<String>,
}

/// Imputation statistics fitted once on the pre-correction snapshot.
/// Later corrections never shift a median or a mode.
#[derive(Debug, Clone)]
pub struct Imputer {
    strategies: BTreeMap<String, ImputationStrategy>,
    medians: BTreeMap<String, f64>,
    modes: BTreeMap<String, Value>,
}

impl Imputer {
    pub fn fit(snapshot: &Dataset, registry: &RuleRegistry) -> Self {
        let mut medians = BTreeMap::new();
        let mut modes = BTreeMap::new();

        for (field, strategy) in registry.imputation() {
            match strategy {
                ImputationStrategy::Median => {
                    let values: Vec<f64> = snapshot
                        .column(field)
                        .filter(|v| !v.is_missing())
                        .filter_map(Value::as_f64)
                        .collect();
                    if let Some(m) = median(values) {
                        medians.insert(field.clone(), m);
                    }
                }
                ImputationStrategy::Mode => {
                    if let Some(m) = mode(snapshot.column(field)) {
                        modes.insert(field.clone(), m);
                    }
                }
                ImputationStrategy::ConditionalCompute { .. } => {}
            }
        }

        Self {
            strategies: registry.imputation().clone(),
            medians,
            modes,
        }
    }

    pub fn has_strategy(&self, field: &str) -> bool {
        self.strategies.contains_key(field)
    }

    pub fn median(&self, field: &str) -> Option<f64> {
        self.medians.get(field).copied()
    }

    pub fn impute(&self, record: &Record, field: &str) -> Result<Imputed, DomainError> {
        let fail = |reason: String| DomainError::Imputation {
            record_id: record.id.to_string(),
            field: field.to_string(),
            reason,
        };

        match self.strategies.get(field) {
            None => Err(fail("no imputation strategy configured".into())),
            Some(ImputationStrategy::Median) => self
                .medians
                .get(field)
                .map(|m| Imputed {
                    value: Value::Number(*m),
                    strategy: Strategy::Median,
                    derived_from: vec![],
                })
                .ok_or_else(|| fail("no numeric values to take a median from".into())),
            Some(ImputationStrategy::Mode) => self
                .modes
                .get(field)
                .map(|m| Imputed {
                    value: m.clone(),
                    strategy: Strategy::Mode,
                    derived_from: vec![],
                })
                .ok_or_else(|| fail("no values to take a mode from".into())),
            Some(ImputationStrategy::ConditionalCompute {
                formula,
                decimals,
                condition,
            }) => {
                let missing: Vec<&str> = formula.missing_inputs(record).map(String::as_str).collect();
                if !missing.is_empty() {
                    return Err(fail(format!("missing inputs: {}", missing.join(", "))));
                }
                if let Some(condition) = condition
                    && !condition.holds(record).map_err(|e| fail(e.to_string()))?
                {
                    return Err(fail(format!("condition '{}' not met", condition)));
                }
                let raw = formula.eval(record).map_err(|e| fail(e.to_string()))?;
                Ok(Imputed {
                    value: Value::Number(decimals.map_or(raw, |d| round_to(raw, d))),
                    strategy: Strategy::ConditionalCompute,
                    derived_from: formula.inputs().to_vec(),
                })
            }
        }
    }
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Most frequent non-missing value. Ties go to the smallest rendering.
fn mode<'a>(values: impl Iterator<Item = &'a Value>) -> Option<Value> {
    let mut counts: BTreeMap<String, (usize, &Value)> = BTreeMap::new();
    for v in values.filter(|v| !v.is_missing()) {
        counts.entry(v.render()).or_insert((0, v)).0 += 1;
    }
    let mut best: Option<(usize, &Value)> = None;
    for (count, value) in counts.into_values() {
        if best.is_none_or(|(c, _)| count > c) {
            best = Some((count, value));
        }
    }
    best.map(|(_, v)| v.clone())
}
