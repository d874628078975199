// healthdq-core/src/domain/dataset/value.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar cell. Loaders map every source format onto these four shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Coerces raw text (CSV cells, FHIR strings) into the narrowest value.
    pub fn from_raw_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        if let Ok(n) = trimmed.parse::<f64>()
            && n.is_finite()
        {
            return Self::Number(n);
        }
        match trimmed {
            "true" | "TRUE" | "True" => Self::Bool(true),
            "false" | "FALSE" | "False" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    /// Absent, null, or blank text.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Null | Self::Bool(_) => None,
        }
    }

    /// Stable textual form, used for synonym lookups and ordering.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.trim().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            other => write!(f, "{}", other.render()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_semantics() {
        assert!(Value::Null.is_missing());
        assert!(Value::Text("   ".into()).is_missing());
        assert!(!Value::Number(0.0).is_missing());
        assert!(!Value::Bool(false).is_missing());
    }

    #[test]
    fn test_raw_text_coercion() {
        assert_eq!(Value::from_raw_text("70"), Value::Number(70.0));
        assert_eq!(Value::from_raw_text(" "), Value::Null);
        assert_eq!(Value::from_raw_text("true"), Value::Bool(true));
        assert_eq!(Value::from_raw_text("M"), Value::Text("M".into()));
        assert_eq!(Value::from_raw_text("NaN"), Value::Text("NaN".into()));
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(Value::Number(170.0).render(), "170");
        assert_eq!(Value::Number(24.2).render(), "24.2");
        assert_eq!(Value::Null.to_string(), "null");
    }

    #[test]
    fn test_untagged_json_roundtrip_shapes() -> anyhow::Result<()> {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 70, 1.5, "M"]"#)?;
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Bool(true),
                Value::Number(70.0),
                Value::Number(1.5),
                Value::Text("M".into())
            ]
        );
        Ok(())
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(24.221453, 1), 24.2);
        assert_eq!(round_to(24.25, 1), 24.3);
    }
}
