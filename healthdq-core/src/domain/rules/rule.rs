// healthdq-core/src/domain/rules/rule.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::formula::Formula;
use super::quantity::UnitSpec;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Discriminant of a rule kind, as written in the rule document.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RuleKindTag {
    Range,
    Required,
    CategoricalMap,
    DerivedFormula,
}

impl RuleKindTag {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "range" => Some(Self::Range),
            "required" => Some(Self::Required),
            "categorical_map" => Some(Self::CategoricalMap),
            "derived_formula" => Some(Self::DerivedFormula),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Range => "range",
            Self::Required => "required",
            Self::CategoricalMap => "categorical_map",
            Self::DerivedFormula => "derived_formula",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Required | Self::DerivedFormula => Severity::High,
            Self::Range | Self::CategoricalMap => Severity::Medium,
        }
    }
}

impl fmt::Display for RuleKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compiled rule parameters. Closed set, built once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Range {
        min: f64,
        max: f64,
        unit: Option<UnitSpec>,
    },
    Required,
    CategoricalMap {
        canonical: BTreeSet<String>,
        synonyms: BTreeMap<String, String>,
    },
    DerivedFormula {
        formula: Formula,
        tolerance: f64,
        decimals: Option<u32>,
    },
}

impl RuleKind {
    pub fn tag(&self) -> RuleKindTag {
        match self {
            Self::Range { .. } => RuleKindTag::Range,
            Self::Required => RuleKindTag::Required,
            Self::CategoricalMap { .. } => RuleKindTag::CategoricalMap,
            Self::DerivedFormula { .. } => RuleKindTag::DerivedFormula,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Position in the rule document; also the evaluation order.
    pub index: usize,
    pub name: String,
    pub field: String,
    pub kind: RuleKind,
    pub severity: Severity,
}

impl Rule {
    pub fn tag(&self) -> RuleKindTag {
        self.kind.tag()
    }

    /// Formula of a `derived_formula` rule.
    pub fn formula(&self) -> Option<&Formula> {
        match &self.kind {
            RuleKind::DerivedFormula { formula, .. } => Some(formula),
            _ => None,
        }
    }

    pub fn unit(&self) -> Option<&UnitSpec> {
        match &self.kind {
            RuleKind::Range { unit, .. } => unit.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} ({} on '{}')", self.index, self.name, self.tag(), self.field)
    }
}
