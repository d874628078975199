// healthdq-core/src/domain/rules/document.rs

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use validator::Validate;

use super::rule::Severity;

/// What to do with range corrections when nobody reviews the run.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Keep them proposed and report them as unresolved.
    #[default]
    Defer,
    AutoApply,
}

impl std::str::FromStr for RangePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "defer" => Ok(Self::Defer),
            "auto_apply" | "auto-apply" => Ok(Self::AutoApply),
            other => Err(format!(
                "unknown range policy '{}' (expected 'defer' or 'auto_apply')",
                other
            )),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ReviewSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub range_policy: RangePolicy,
}

/// One entry of the `rules:` list, as written by the user.
/// Kind specific parameters stay untyped here and are compiled by the registry.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct RuleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[validate(length(min = 1, message = "Rule field cannot be empty"))]
    pub field: String,

    #[validate(length(min = 1, message = "Rule kind cannot be empty"))]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,

    #[serde(flatten)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImputationSpec {
    pub strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
    /// Guard such as `if weight_kg > 0 and height_cm > 0`; the value is only
    /// computed for records where it holds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// The YAML rule document.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct RuleDocument {
    #[serde(default = "default_version")]
    pub version: String,

    /// Column holding the stable record identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,

    /// Extra fields formulas may read without a rule of their own.
    #[serde(default)]
    pub fields: Vec<String>,

    #[serde(default)]
    pub review: ReviewSection,

    #[validate(length(min = 1, message = "At least one rule is required"))]
    #[validate(nested)]
    pub rules: Vec<RuleSpec>,

    #[serde(default)]
    pub imputation: BTreeMap<String, ImputationSpec>,
}

fn default_version() -> String {
    "1".to_string()
}

impl RuleDocument {
    /// Hex SHA-256 of the canonical YAML rendering.
    /// The `review` section is run wiring, not rule content, and is left out
    /// so `--review` overrides do not change the rule version.
    pub fn digest(&self) -> Result<String, serde_yaml::Error> {
        let rules_only = Self {
            review: ReviewSection::default(),
            ..self.clone()
        };
        let canonical = serde_yaml::to_string(&rules_only)?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    const DOC: &str = r#"
version: "2024.1"
id_field: patient_id
rules:
  - field: height_cm
    kind: range
    min: 50
    max: 250
  - field: sex_at_birth
    kind: categorical_map
    severity: low
    canonical: [male, female]
    synonyms: { M: male }
imputation:
  height_cm: { strategy: median }
"#;

    #[test]
    fn test_parameters_are_captured_flat() -> Result<()> {
        let doc: RuleDocument = serde_yaml::from_str(DOC)?;
        assert_eq!(doc.rules.len(), 2);
        assert!(doc.rules[0].params.contains_key("min"));
        assert!(!doc.rules[0].params.contains_key("field"));
        assert_eq!(doc.rules[1].severity, Some(Severity::Low));
        assert_eq!(doc.review.range_policy, RangePolicy::Defer);
        assert!(doc.validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_digest_is_stable_and_content_sensitive() -> Result<()> {
        let doc: RuleDocument = serde_yaml::from_str(DOC)?;
        let same: RuleDocument = serde_yaml::from_str(DOC)?;
        assert_eq!(doc.digest()?, same.digest()?);

        let mut changed = doc.clone();
        changed.rules[0].params.insert("max".into(), serde_yaml::Value::from(300));
        assert_ne!(doc.digest()?, changed.digest()?);
        Ok(())
    }

    #[test]
    fn test_review_overrides_keep_the_digest() -> Result<()> {
        let doc: RuleDocument = serde_yaml::from_str(DOC)?;
        let mut reviewed = doc.clone();
        reviewed.review.enabled = true;
        reviewed.review.range_policy = RangePolicy::AutoApply;
        assert_eq!(doc.digest()?, reviewed.digest()?);
        Ok(())
    }

    #[test]
    fn test_empty_rule_list_fails_validation() -> Result<()> {
        let doc: RuleDocument = serde_yaml::from_str("rules: []")?;
        assert!(doc.validate().is_err());
        Ok(())
    }

    #[test]
    fn test_unknown_imputation_key_is_rejected() {
        let res: Result<RuleDocument, _> = serde_yaml::from_str(
            "rules: [{field: a, kind: required}]\nimputation: {a: {strategy: median, bogus: 1}}",
        );
        assert!(res.is_err());
    }
}
