// healthdq-core/src/domain/rules/quantity.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::domain::dataset::Value;

fn re_quantity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([-+]?\d+(?:\.\d+)?)\s*([A-Za-z%]+)?\s*$")
            .unwrap_or_else(|_| unreachable!())
    })
}

/// A numeric reading, optionally suffixed with a unit (`"70 kg"`).
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub magnitude: f64,
    pub unit: Option<String>,
}

impl Quantity {
    /// `None` when the value is neither a number nor `<number> [unit]` text.
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self {
                magnitude: *n,
                unit: None,
            }),
            Value::Text(text) => {
                let caps = re_quantity().captures(text)?;
                let magnitude = caps.get(1)?.as_str().parse::<f64>().ok()?;
                Some(Self {
                    magnitude,
                    unit: caps.get(2).map(|m| m.as_str().to_string()),
                })
            }
            Value::Null | Value::Bool(_) => None,
        }
    }
}

/// Canonical unit of a range rule plus the factors that convert other units into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpec {
    pub canonical: String,
    #[serde(default)]
    pub conversions: BTreeMap<String, f64>,
}

impl UnitSpec {
    pub fn factor(&self, unit: &str) -> Option<f64> {
        if unit == self.canonical {
            return Some(1.0);
        }
        self.conversions.get(unit).copied()
    }

    pub fn is_canonical(&self, quantity: &Quantity) -> bool {
        match &quantity.unit {
            None => true,
            Some(u) => u == &self.canonical,
        }
    }

    /// Magnitude expressed in the canonical unit, `None` for an unknown unit.
    pub fn to_canonical(&self, quantity: &Quantity) -> Option<f64> {
        match &quantity.unit {
            None => Some(quantity.magnitude),
            Some(u) => self.factor(u).map(|f| quantity.magnitude * f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lb_spec() -> UnitSpec {
        UnitSpec {
            canonical: "kg".into(),
            conversions: BTreeMap::from([("lb".to_string(), 0.45359237)]),
        }
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(
            Quantity::parse(&Value::Number(70.0)),
            Some(Quantity {
                magnitude: 70.0,
                unit: None
            })
        );
        assert_eq!(
            Quantity::parse(&Value::from(" 154.3 lb ")),
            Some(Quantity {
                magnitude: 154.3,
                unit: Some("lb".into())
            })
        );
        assert_eq!(Quantity::parse(&Value::from("-3")).map(|q| q.magnitude), Some(-3.0));
        assert_eq!(Quantity::parse(&Value::from("heavy")), None);
        assert_eq!(Quantity::parse(&Value::from("70 kg extra")), None);
        assert_eq!(Quantity::parse(&Value::Null), None);
    }

    #[test]
    fn test_conversion_to_canonical() {
        let spec = lb_spec();
        let lb = Quantity::parse(&Value::from("100 lb")).unwrap_or_else(|| unreachable!());
        assert!(!spec.is_canonical(&lb));
        let kg = spec.to_canonical(&lb).unwrap_or_default();
        assert!((kg - 45.359237).abs() < 1e-9);

        let stone = Quantity::parse(&Value::from("11 st")).unwrap_or_else(|| unreachable!());
        assert_eq!(spec.to_canonical(&stone), None);
    }
}
