// healthdq-core/src/domain/metrics/snapshot.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::dataset::{SchemaFingerprint, round_to};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    NotNullRate,
    OutOfRangeRate,
    LogicalConsistencyRate,
    CategoricalStandardizationRate,
    UnitAlignmentRate,
    MissingnessIndex,
    CategoricalConsistency,
}

impl MetricName {
    pub const ALL: [MetricName; 7] = [
        Self::NotNullRate,
        Self::OutOfRangeRate,
        Self::LogicalConsistencyRate,
        Self::CategoricalStandardizationRate,
        Self::UnitAlignmentRate,
        Self::MissingnessIndex,
        Self::CategoricalConsistency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotNullRate => "not_null_rate",
            Self::OutOfRangeRate => "out_of_range_rate",
            Self::LogicalConsistencyRate => "logical_consistency_rate",
            Self::CategoricalStandardizationRate => "categorical_standardization_rate",
            Self::UnitAlignmentRate => "unit_alignment_rate",
            Self::MissingnessIndex => "missingness_index",
            Self::CategoricalConsistency => "categorical_consistency",
        }
    }

    pub fn higher_is_better(&self) -> bool {
        !matches!(
            self,
            Self::OutOfRangeRate | Self::MissingnessIndex | Self::CategoricalConsistency
        )
    }

    /// Value reported when nothing was checked.
    pub fn empty_value(&self) -> f64 {
        if self.higher_is_better() { 1.0 } else { 0.0 }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Before,
    After,
}

/// `numerator / denominator`, with a fixed value for an empty denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: u64,
    pub denominator: u64,
    pub value: f64,
}

impl Ratio {
    pub fn of(numerator: u64, denominator: u64, empty_value: f64) -> Self {
        let value = if denominator == 0 {
            empty_value
        } else {
            numerator as f64 / denominator as f64
        };
        Self {
            numerator,
            denominator,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub stage: Stage,
    pub record_count: usize,
    pub schema_fingerprint: SchemaFingerprint,
    pub metrics: BTreeMap<MetricName, Ratio>,
}

impl MetricSnapshot {
    pub fn value(&self, name: MetricName) -> Option<f64> {
        self.metrics.get(&name).map(|r| r.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDelta {
    pub metric: MetricName,
    pub before: f64,
    pub after: f64,
    /// Percentage change; `None` when `before` is exactly zero.
    pub delta_pct: Option<f64>,
}

pub fn percent_change(before: f64, after: f64) -> Option<f64> {
    if before == 0.0 {
        None
    } else {
        Some(round_to((after - before) / before * 100.0, 6))
    }
}

/// Per-metric percentage change between two snapshots.
pub fn delta(before: &MetricSnapshot, after: &MetricSnapshot) -> Vec<MetricDelta> {
    MetricName::ALL
        .iter()
        .filter_map(|name| {
            let b = before.value(*name)?;
            let a = after.value(*name)?;
            Some(MetricDelta {
                metric: *name,
                before: b,
                after: a,
                delta_pct: percent_change(b, a),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_percentages() {
        assert_eq!(percent_change(0.80, 0.95), Some(18.75));
        assert_eq!(percent_change(0.0, 0.5), None);
        assert_eq!(percent_change(0.5, 0.25), Some(-50.0));
    }

    #[test]
    fn test_empty_ratio_defaults() {
        assert_eq!(Ratio::of(0, 0, MetricName::NotNullRate.empty_value()).value, 1.0);
        assert_eq!(Ratio::of(0, 0, MetricName::OutOfRangeRate.empty_value()).value, 0.0);
        assert_eq!(Ratio::of(0, 0, MetricName::MissingnessIndex.empty_value()).value, 0.0);
        assert_eq!(Ratio::of(3, 4, 1.0).value, 0.75);
    }

    #[test]
    fn test_null_delta_serializes_as_null() -> anyhow::Result<()> {
        let d = MetricDelta {
            metric: MetricName::OutOfRangeRate,
            before: 0.0,
            after: 0.0,
            delta_pct: percent_change(0.0, 0.0),
        };
        let json = serde_json::to_value(&d)?;
        assert!(json["delta_pct"].is_null());
        assert_eq!(json["metric"], "out_of_range_rate");
        Ok(())
    }
}
