// healthdq-core/src/domain/detection/detector.rs

use tracing::{debug, instrument};

use super::violation::{Violation, ViolationDetail};
use crate::domain::dataset::{Dataset, Record, Value, round_to};
use crate::domain::rules::{Quantity, Rule, RuleKind, RuleKindTag, RuleRegistry, Severity};

/// Read-only pass over a snapshot. Same input, same violations, same order.
pub struct ViolationDetector;

impl ViolationDetector {
    /// Record order × rule order. No deduplication across rule kinds.
    #[instrument(skip_all, fields(records = dataset.len(), rules = registry.rules().len()))]
    pub fn detect(dataset: &Dataset, registry: &RuleRegistry) -> Vec<Violation> {
        let violations: Vec<Violation> = dataset
            .records()
            .iter()
            .flat_map(|record| {
                registry
                    .rules()
                    .iter()
                    .flat_map(move |rule| Self::evaluate(rule, record))
            })
            .collect();
        debug!(count = violations.len(), "Detection pass finished");
        violations
    }

    /// Evaluates a single rule against a single record.
    pub fn evaluate(rule: &Rule, record: &Record) -> Vec<Violation> {
        let value = record.value(&rule.field);
        match &rule.kind {
            RuleKind::Required => {
                if value.is_missing() {
                    vec![violation(
                        rule,
                        record,
                        ViolationDetail::Missing,
                        format!("'{}' is required but missing", rule.field),
                    )]
                } else {
                    vec![]
                }
            }
            RuleKind::Range { min, max, unit } => {
                if value.is_missing() {
                    return vec![];
                }
                let Some(quantity) = Quantity::parse(value) else {
                    return vec![violation(
                        rule,
                        record,
                        ViolationDetail::NotNumeric,
                        format!("'{}' = {} is not numeric", rule.field, value),
                    )];
                };
                let canonical = unit.as_ref().map(|u| u.canonical.clone());
                if let Some(observed) = &quantity.unit
                    && canonical.as_deref() != Some(observed.as_str())
                {
                    return vec![violation(
                        rule,
                        record,
                        ViolationDetail::UnitMismatch {
                            unit: observed.clone(),
                            canonical: canonical.clone(),
                        },
                        format!(
                            "'{}' = {} is not expressed in {}",
                            rule.field,
                            value,
                            canonical.as_deref().unwrap_or("a bare number")
                        ),
                    )];
                }
                if quantity.magnitude < *min || quantity.magnitude > *max {
                    return vec![violation(
                        rule,
                        record,
                        ViolationDetail::OutOfRange {
                            magnitude: quantity.magnitude,
                            min: *min,
                            max: *max,
                        },
                        format!(
                            "'{}' = {} is outside [{}, {}]",
                            rule.field, value, min, max
                        ),
                    )];
                }
                vec![]
            }
            RuleKind::CategoricalMap {
                canonical,
                synonyms,
            } => {
                if value.is_missing() {
                    return vec![];
                }
                let rendered = value.render();
                if canonical.contains(&rendered) {
                    return vec![];
                }
                let target = synonyms.get(&rendered).cloned();
                let message = match &target {
                    Some(t) => format!("'{}' = {} is a synonym of '{}'", rule.field, value, t),
                    None => format!("'{}' = {} has no canonical mapping", rule.field, value),
                };
                let mut v = violation(
                    rule,
                    record,
                    ViolationDetail::NonCanonical {
                        target: target.clone(),
                    },
                    message,
                );
                if target.is_some() {
                    v.severity = Severity::Low;
                }
                vec![v]
            }
            RuleKind::DerivedFormula {
                formula,
                tolerance,
                decimals,
            } => {
                let missing: Vec<Violation> = formula
                    .missing_inputs(record)
                    .map(|source| Violation {
                        record_id: record.id.clone(),
                        field: source.clone(),
                        rule_kind: RuleKindTag::Required,
                        rule_index: rule.index,
                        rule_name: rule.name.clone(),
                        observed_value: record.value(source).clone(),
                        severity: rule.severity,
                        detail: ViolationDetail::MissingFormulaSource {
                            derived_field: rule.field.clone(),
                        },
                        message: format!(
                            "'{}' is needed to derive '{}' but missing",
                            source, rule.field
                        ),
                    })
                    .collect();
                if !missing.is_empty() || value.is_missing() {
                    return missing;
                }

                let expected = match formula.eval(record) {
                    Ok(raw) => decimals.map_or(raw, |d| round_to(raw, d)),
                    Err(e) => {
                        return vec![violation(
                            rule,
                            record,
                            ViolationDetail::FormulaNotEvaluable {
                                reason: e.to_string(),
                            },
                            format!("'{}' cannot be derived: {}", rule.field, e),
                        )];
                    }
                };
                let consistent = value
                    .as_f64()
                    .is_some_and(|stored| (stored - expected).abs() <= *tolerance);
                if consistent {
                    vec![]
                } else {
                    vec![violation(
                        rule,
                        record,
                        ViolationDetail::Inconsistent { expected },
                        format!(
                            "'{}' = {} but {} gives {}",
                            rule.field,
                            value,
                            formula,
                            Value::Number(expected)
                        ),
                    )]
                }
            }
        }
    }
}

fn violation(rule: &Rule, record: &Record, detail: ViolationDetail, message: String) -> Violation {
    Violation {
        record_id: record.id.clone(),
        field: rule.field.clone(),
        rule_kind: rule.tag(),
        rule_index: rule.index,
        rule_name: rule.name.clone(),
        observed_value: record.value(&rule.field).clone(),
        severity: rule.severity,
        detail,
        message,
    }
}
