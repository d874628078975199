// healthdq-core/src/infrastructure/config/rules.rs

use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::domain::rules::{RangePolicy, RuleDocument, RuleRegistry};
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;

pub const ENV_REVIEW: &str = "HEALTHDQ_REVIEW";
pub const ENV_RANGE_POLICY: &str = "HEALTHDQ_RANGE_POLICY";

/// Reads the YAML rule document and layers environment overrides on top.
#[instrument]
pub fn load_rule_document(path: &Path) -> Result<RuleDocument, InfrastructureError> {
    if !path.is_file() {
        return Err(InfrastructureError::ConfigNotFound(
            path.display().to_string(),
        ));
    }
    info!(path = ?path, "Loading rule document");

    let content = fs::read_to_string(path)?;
    let mut document: RuleDocument = serde_yaml::from_str(&content)?;

    // HEALTHDQ_REVIEW=1 healthdq run ... turns review on without editing the file
    apply_env_overrides(&mut document)?;
    Ok(document)
}

/// Document plus compilation: what every command needs.
pub fn load_registry(path: &Path) -> Result<RuleRegistry, QualityError> {
    let document = load_rule_document(path)?;
    Ok(RuleRegistry::load(document)?)
}

fn apply_env_overrides(document: &mut RuleDocument) -> Result<(), InfrastructureError> {
    apply_overrides(
        document,
        std::env::var(ENV_REVIEW).ok(),
        std::env::var(ENV_RANGE_POLICY).ok(),
    )
}

fn apply_overrides(
    document: &mut RuleDocument,
    review: Option<String>,
    range_policy: Option<String>,
) -> Result<(), InfrastructureError> {
    if let Some(val) = review {
        let enabled = parse_flag(&val).ok_or_else(|| {
            InfrastructureError::ConfigError(format!(
                "{} must be true/false or 1/0, got '{}'",
                ENV_REVIEW, val
            ))
        })?;
        info!(old = document.review.enabled, new = enabled, "Overriding review via ENV");
        document.review.enabled = enabled;
    }
    if let Some(val) = range_policy {
        let policy: RangePolicy = val.parse().map_err(InfrastructureError::ConfigError)?;
        info!(old = ?document.review.range_policy, new = ?policy, "Overriding range policy via ENV");
        document.review.range_policy = policy;
    }
    Ok(())
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::DomainError;
    use anyhow::Result;
    use tempfile::tempdir;

    const DOC: &str = r#"
rules:
  - field: height_cm
    kind: range
    min: 50
    max: 250
"#;

    #[test]
    fn test_overrides_are_layered() -> Result<()> {
        let mut doc: RuleDocument = serde_yaml::from_str(DOC)?;
        apply_overrides(&mut doc, Some("yes".into()), Some("auto_apply".into()))?;
        assert!(doc.review.enabled);
        assert_eq!(doc.review.range_policy, RangePolicy::AutoApply);

        let err = apply_overrides(&mut doc, None, Some("sometimes".into())).unwrap_err();
        assert!(matches!(err, InfrastructureError::ConfigError(_)));
        assert!(apply_overrides(&mut doc, Some("maybe".into()), None).is_err());
        Ok(())
    }

    #[test]
    fn test_missing_and_broken_documents() -> Result<()> {
        let dir = tempdir()?;
        let missing = load_rule_document(&dir.path().join("rules.yml"));
        assert!(matches!(missing, Err(InfrastructureError::ConfigNotFound(_))));

        let broken = dir.path().join("broken.yml");
        fs::write(&broken, "rules: [ {field: ")?;
        assert!(matches!(
            load_rule_document(&broken),
            Err(InfrastructureError::YamlError(_))
        ));
        Ok(())
    }

    #[test]
    fn test_load_registry_reports_domain_errors() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("rules.yml");
        fs::write(&path, "rules:\n  - field: x\n    kind: sometimes\n")?;
        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, QualityError::Domain(DomainError::Config(_))));

        fs::write(&path, DOC)?;
        assert_eq!(load_registry(&path)?.rules().len(), 1);
        Ok(())
    }
}
