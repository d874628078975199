// healthdq-core/src/domain/rules/registry.rs

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::{debug, instrument};
use validator::Validate;

use super::document::{ImputationSpec, RangePolicy, RuleDocument, RuleSpec};
use super::formula::{Condition, Formula};
use super::quantity::UnitSpec;
use super::rule::{Rule, RuleKind, RuleKindTag};
use crate::domain::error::DomainError;

const DEFAULT_TOLERANCE: f64 = 1e-6;

fn re_field_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap_or_else(|_| unreachable!())
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImputationStrategy {
    Median,
    Mode,
    ConditionalCompute {
        formula: Formula,
        decimals: Option<u32>,
        condition: Option<Condition>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReviewPolicy {
    pub enabled: bool,
    pub range_policy: RangePolicy,
}

/// Ordered, immutable set of compiled rules plus the imputation and review policies.
#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<Rule>,
    imputation: BTreeMap<String, ImputationStrategy>,
    review: ReviewPolicy,
    id_field: Option<String>,
    document: RuleDocument,
    digest: String,
}

impl RuleRegistry {
    #[instrument(skip(document), fields(rules = document.rules.len()))]
    pub fn load(document: RuleDocument) -> Result<Self, DomainError> {
        document
            .validate()
            .map_err(|e| DomainError::Config(e.to_string().replace('\n', "; ")))?;

        for field in document.fields.iter().chain(document.id_field.iter()) {
            check_field_name(field)?;
        }

        let mut rules = Vec::with_capacity(document.rules.len());
        for (index, spec) in document.rules.iter().enumerate() {
            rules.push(compile_rule(index, spec)?);
        }

        // Fields a formula may read: rule targets plus declared extras.
        let defined: BTreeSet<&str> = rules
            .iter()
            .map(|r| r.field.as_str())
            .chain(document.fields.iter().map(String::as_str))
            .collect();

        for rule in &rules {
            if let Some(formula) = rule.formula() {
                check_formula_inputs(&rule.field, formula.inputs(), &defined)?;
            }
        }

        let mut imputation = BTreeMap::new();
        for (field, spec) in &document.imputation {
            check_field_name(field)?;
            let strategy = compile_imputation(field, spec, &rules)?;
            if let ImputationStrategy::ConditionalCompute {
                formula, condition, ..
            } = &strategy
            {
                check_formula_inputs(field, formula.inputs(), &defined)?;
                if let Some(condition) = condition {
                    check_formula_inputs(field, condition.inputs(), &defined)?;
                }
            }
            imputation.insert(field.clone(), strategy);
        }

        let review = ReviewPolicy {
            enabled: document.review.enabled,
            range_policy: document.review.range_policy,
        };
        let id_field = document.id_field.clone();
        let digest = document
            .digest()
            .map_err(|e| DomainError::Config(format!("cannot render rule document: {}", e)))?;
        debug!(digest = %digest, "Rule document compiled");

        Ok(Self {
            rules,
            imputation,
            review,
            id_field,
            document,
            digest,
        })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn rules_of(&self, tag: RuleKindTag) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.tag() == tag)
    }

    pub fn imputation_for(&self, field: &str) -> Option<&ImputationStrategy> {
        self.imputation.get(field)
    }

    pub fn imputation(&self) -> &BTreeMap<String, ImputationStrategy> {
        &self.imputation
    }

    pub fn review(&self) -> ReviewPolicy {
        self.review
    }

    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }

    pub fn document(&self) -> &RuleDocument {
        &self.document
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn check_field_name(field: &str) -> Result<(), DomainError> {
    if re_field_name().is_match(field) {
        Ok(())
    } else {
        Err(DomainError::Config(format!("invalid field name '{}'", field)))
    }
}

fn check_formula_inputs(
    target: &str,
    inputs: &[String],
    defined: &BTreeSet<&str>,
) -> Result<(), DomainError> {
    for input in inputs {
        if input == target {
            return Err(DomainError::Config(format!(
                "formula for '{}' references its own target",
                target
            )));
        }
        if !defined.contains(input.as_str()) {
            return Err(DomainError::Config(format!(
                "formula for '{}' references undefined field '{}'",
                target, input
            )));
        }
    }
    Ok(())
}

fn compile_rule(index: usize, spec: &RuleSpec) -> Result<Rule, DomainError> {
    check_field_name(&spec.field)?;
    let tag = RuleKindTag::parse(&spec.kind).ok_or_else(|| {
        DomainError::Config(format!(
            "rule #{} on '{}': unknown kind '{}'",
            index, spec.field, spec.kind
        ))
    })?;

    let context = format!("rule #{} ({} on '{}')", index, tag, spec.field);
    let mut params = Params::new(&spec.params, &context);

    let kind = match tag {
        RuleKindTag::Required => RuleKind::Required,
        RuleKindTag::Range => {
            let min = params.required_f64("min")?;
            let max = params.required_f64("max")?;
            if min > max {
                return Err(params.error(format!("min {} is greater than max {}", min, max)));
            }
            let unit = match params.string("unit")? {
                Some(canonical) => {
                    let conversions = params.f64_map("conversions")?;
                    if let Some((unit, factor)) = conversions.iter().find(|(_, f)| **f <= 0.0) {
                        return Err(params.error(format!(
                            "conversion factor for '{}' must be positive, got {}",
                            unit, factor
                        )));
                    }
                    Some(UnitSpec {
                        canonical,
                        conversions,
                    })
                }
                None => None,
            };
            RuleKind::Range { min, max, unit }
        }
        RuleKindTag::CategoricalMap => {
            let canonical: BTreeSet<String> =
                params.required_string_list("canonical")?.into_iter().collect();
            if canonical.is_empty() {
                return Err(params.error("canonical set cannot be empty".into()));
            }
            let synonyms = params.string_map("synonyms")?;
            if let Some((from, to)) = synonyms.iter().find(|(_, to)| !canonical.contains(*to)) {
                return Err(params.error(format!(
                    "synonym '{}' maps to '{}', which is not canonical",
                    from, to
                )));
            }
            RuleKind::CategoricalMap {
                canonical,
                synonyms,
            }
        }
        RuleKindTag::DerivedFormula => {
            let source = params.required_string("formula")?;
            let formula = Formula::parse(&source).map_err(|e| params.error(e.to_string()))?;
            let tolerance = params.f64("tolerance")?.unwrap_or(DEFAULT_TOLERANCE);
            if tolerance < 0.0 {
                return Err(params.error(format!("tolerance must be >= 0, got {}", tolerance)));
            }
            let decimals = params.u32("decimals")?;
            RuleKind::DerivedFormula {
                formula,
                tolerance,
                decimals,
            }
        }
    };
    params.finish()?;

    Ok(Rule {
        index,
        name: spec
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_{}", spec.field, tag)),
        field: spec.field.clone(),
        kind,
        severity: spec.severity.unwrap_or_else(|| tag.default_severity()),
    })
}

fn compile_imputation(
    field: &str,
    spec: &ImputationSpec,
    rules: &[Rule],
) -> Result<ImputationStrategy, DomainError> {
    let strategy = match spec.strategy.as_str() {
        "median" => ImputationStrategy::Median,
        "mode" => ImputationStrategy::Mode,
        "conditional_compute" => {
            let source = spec.formula.as_deref().ok_or_else(|| {
                DomainError::Config(format!(
                    "imputation for '{}': conditional_compute requires a formula",
                    field
                ))
            })?;
            let formula = Formula::parse(source).map_err(|e| {
                DomainError::Config(format!("imputation for '{}': {}", field, e))
            })?;
            // Fall back to the rounding of a derived rule on the same field.
            let decimals = spec.decimals.or_else(|| {
                rules.iter().find_map(|r| match &r.kind {
                    RuleKind::DerivedFormula { decimals, .. } if r.field == field => *decimals,
                    _ => None,
                })
            });
            let condition = spec
                .condition
                .as_deref()
                .map(Condition::parse)
                .transpose()
                .map_err(|e| DomainError::Config(format!("imputation for '{}': {}", field, e)))?;
            return Ok(ImputationStrategy::ConditionalCompute {
                formula,
                decimals,
                condition,
            });
        }
        other => {
            return Err(DomainError::Config(format!(
                "imputation for '{}': unknown strategy '{}'",
                field, other
            )));
        }
    };
    if spec.formula.is_some() || spec.condition.is_some() {
        return Err(DomainError::Config(format!(
            "imputation for '{}': '{}' does not take a formula or condition",
            field, spec.strategy
        )));
    }
    Ok(strategy)
}

/// Typed reader over the flattened parameters of one rule.
/// Every key must be consumed; leftovers are reported by `finish`.
struct Params<'a> {
    raw: &'a BTreeMap<String, serde_yaml::Value>,
    seen: BTreeSet<&'static str>,
    context: &'a str,
}

impl<'a> Params<'a> {
    fn new(raw: &'a BTreeMap<String, serde_yaml::Value>, context: &'a str) -> Self {
        Self {
            raw,
            seen: BTreeSet::new(),
            context,
        }
    }

    fn error(&self, msg: String) -> DomainError {
        DomainError::Config(format!("{}: {}", self.context, msg))
    }

    fn take(&mut self, key: &'static str) -> Option<&'a serde_yaml::Value> {
        self.seen.insert(key);
        self.raw.get(key).filter(|v| !v.is_null())
    }

    fn f64(&mut self, key: &'static str) -> Result<Option<f64>, DomainError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .filter(|n| n.is_finite())
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a number", key))),
        }
    }

    fn required_f64(&mut self, key: &'static str) -> Result<f64, DomainError> {
        self.f64(key)?
            .ok_or_else(|| self.error(format!("missing parameter '{}'", key)))
    }

    fn u32(&mut self, key: &'static str) -> Result<Option<u32>, DomainError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a non-negative integer", key))),
        }
    }

    fn string(&mut self, key: &'static str) -> Result<Option<String>, DomainError> {
        match self.take(key) {
            None => Ok(None),
            Some(v) => scalar_string(v)
                .map(Some)
                .ok_or_else(|| self.error(format!("'{}' must be a string", key))),
        }
    }

    fn required_string(&mut self, key: &'static str) -> Result<String, DomainError> {
        self.string(key)?
            .ok_or_else(|| self.error(format!("missing parameter '{}'", key)))
    }

    fn required_string_list(&mut self, key: &'static str) -> Result<Vec<String>, DomainError> {
        let value = self
            .take(key)
            .ok_or_else(|| self.error(format!("missing parameter '{}'", key)))?;
        let seq = value
            .as_sequence()
            .ok_or_else(|| self.error(format!("'{}' must be a list", key)))?;
        seq.iter()
            .map(|item| {
                scalar_string(item)
                    .ok_or_else(|| self.error(format!("'{}' entries must be scalars", key)))
            })
            .collect()
    }

    fn string_map(&mut self, key: &'static str) -> Result<BTreeMap<String, String>, DomainError> {
        let Some(value) = self.take(key) else {
            return Ok(BTreeMap::new());
        };
        let mapping = value
            .as_mapping()
            .ok_or_else(|| self.error(format!("'{}' must be a mapping", key)))?;
        let mut out = BTreeMap::new();
        for (k, v) in mapping {
            match (scalar_string(k), scalar_string(v)) {
                (Some(k), Some(v)) => {
                    out.insert(k, v);
                }
                _ => return Err(self.error(format!("'{}' keys and values must be scalars", key))),
            }
        }
        Ok(out)
    }

    fn f64_map(&mut self, key: &'static str) -> Result<BTreeMap<String, f64>, DomainError> {
        let Some(value) = self.take(key) else {
            return Ok(BTreeMap::new());
        };
        let mapping = value
            .as_mapping()
            .ok_or_else(|| self.error(format!("'{}' must be a mapping", key)))?;
        let mut out = BTreeMap::new();
        for (k, v) in mapping {
            match (scalar_string(k), v.as_f64()) {
                (Some(k), Some(f)) => {
                    out.insert(k, f);
                }
                _ => return Err(self.error(format!("'{}' must map units to numbers", key))),
            }
        }
        Ok(out)
    }

    fn finish(self) -> Result<(), DomainError> {
        let extra: Vec<&str> = self
            .raw
            .keys()
            .map(String::as_str)
            .filter(|k| !self.seen.contains(k))
            .collect();
        if extra.is_empty() {
            Ok(())
        } else {
            Err(self.error(format!("unexpected parameter(s): {}", extra.join(", "))))
        }
    }
}

/// YAML scalars read as text: `M`, `1`, `true` all become strings.
fn scalar_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn load(yaml: &str) -> Result<RuleRegistry, DomainError> {
        let doc: RuleDocument = serde_yaml::from_str(yaml).unwrap();
        RuleRegistry::load(doc)
    }

    const VALID: &str = r#"
version: "3"
rules:
  - field: height_cm
    kind: range
    min: 50
    max: 250
    unit: cm
    conversions: { in: 2.54 }
  - field: weight_kg
    kind: required
  - field: sex_at_birth
    kind: categorical_map
    canonical: [male, female]
    synonyms: { M: male, F: female, 1: male }
  - field: bmi
    kind: derived_formula
    formula: "weight_kg / (height_cm / 100) ^ 2"
    decimals: 1
imputation:
  height_cm: { strategy: median }
  bmi: { strategy: conditional_compute, formula: "weight_kg / (height_cm / 100) ^ 2" }
"#;

    #[test]
    fn test_load_valid_document() -> Result<()> {
        let registry = load(VALID)?;
        assert_eq!(registry.rules().len(), 4);
        assert_eq!(registry.version(), "3");
        assert_eq!(registry.rules()[3].name, "bmi_derived_formula");
        assert_eq!(registry.rules_of(RuleKindTag::Range).count(), 1);

        match &registry.rules()[3].kind {
            RuleKind::DerivedFormula {
                tolerance,
                decimals,
                ..
            } => {
                assert_eq!(*tolerance, DEFAULT_TOLERANCE);
                assert_eq!(*decimals, Some(1));
            }
            other => panic!("unexpected kind {:?}", other),
        }

        match registry.imputation_for("bmi") {
            Some(ImputationStrategy::ConditionalCompute { decimals, .. }) => {
                assert_eq!(*decimals, Some(1))
            }
            other => panic!("unexpected strategy {:?}", other),
        }

        match &registry.rules()[2].kind {
            RuleKind::CategoricalMap { synonyms, .. } => {
                assert_eq!(synonyms.get("1").map(String::as_str), Some("male"))
            }
            other => panic!("unexpected kind {:?}", other),
        }
        assert_eq!(registry.review(), ReviewPolicy::default());
        Ok(())
    }

    fn assert_config_error(yaml: &str, needle: &str) {
        match load(yaml) {
            Err(DomainError::Config(msg)) => {
                assert!(msg.contains(needle), "'{}' does not mention '{}'", msg, needle)
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert_config_error("rules: [{field: a, kind: regex}]", "unknown kind 'regex'");
    }

    #[test]
    fn test_rejects_malformed_parameters() {
        assert_config_error("rules: [{field: a, kind: range, min: 1}]", "missing parameter 'max'");
        assert_config_error(
            "rules: [{field: a, kind: range, min: 5, max: 1}]",
            "greater than max",
        );
        assert_config_error(
            "rules: [{field: a, kind: range, min: low, max: 1}]",
            "'min' must be a number",
        );
        assert_config_error(
            "rules: [{field: a, kind: required, min: 1}]",
            "unexpected parameter(s): min",
        );
        assert_config_error(
            "rules: [{field: a, kind: range, min: 0, max: 1, unit: kg, conversions: {lb: 0}}]",
            "must be positive",
        );
    }

    #[test]
    fn test_rejects_non_canonical_synonym_target() {
        assert_config_error(
            "rules: [{field: sex, kind: categorical_map, canonical: [male], synonyms: {F: female}}]",
            "not canonical",
        );
    }

    #[test]
    fn test_rejects_bad_formulas() {
        assert_config_error(
            "rules: [{field: bmi, kind: derived_formula, formula: 'weight / (height'}]",
            "cannot parse formula",
        );
        assert_config_error(
            "rules: [{field: bmi, kind: derived_formula, formula: 'weight_kg * 2'}]",
            "undefined field 'weight_kg'",
        );
        assert_config_error(
            "rules: [{field: bmi, kind: derived_formula, formula: 'bmi * 2'}]",
            "its own target",
        );
        assert_config_error(
            "rules: [{field: bmi, kind: derived_formula, formula: 'w', tolerance: -1}]\nfields: [w]",
            "tolerance",
        );
    }

    #[test]
    fn test_declared_fields_satisfy_formulas() -> Result<()> {
        let registry = load(
            "fields: [weight_kg, height_cm]\nrules: [{field: bmi, kind: derived_formula, formula: 'weight_kg / (height_cm/100)^2'}]",
        )?;
        assert_eq!(
            registry.rules()[0].formula().map(|f| f.inputs().to_vec()),
            Some(vec!["height_cm".to_string(), "weight_kg".to_string()])
        );
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_field_names_and_strategies() {
        assert_config_error("rules: [{field: 'bad name', kind: required}]", "invalid field name");
        assert_config_error(
            "rules: [{field: a, kind: required}]\nimputation: {a: {strategy: mean}}",
            "unknown strategy 'mean'",
        );
        assert_config_error(
            "rules: [{field: a, kind: required}]\nimputation: {a: {strategy: conditional_compute}}",
            "requires a formula",
        );
        assert_config_error(
            "rules: [{field: a, kind: required}]\nimputation: {a: {strategy: conditional_compute, formula: 'zz + 1'}}",
            "undefined field 'zz'",
        );
    }

    #[test]
    fn test_rejects_empty_rule_list() {
        assert_config_error("rules: []", "At least one rule");
    }

    #[test]
    fn test_conditional_compute_guard_is_compiled() -> Result<()> {
        let registry = load(
            "fields: [weight_kg, height_cm]\nrules: [{field: bmi, kind: required}]\nimputation:\n  bmi:\n    strategy: conditional_compute\n    formula: 'weight_kg / (height_cm / 100) ^ 2'\n    condition: 'if weight_kg > 0 and height_cm > 0'\n",
        )?;
        match registry.imputation_for("bmi") {
            Some(ImputationStrategy::ConditionalCompute {
                condition: Some(condition),
                ..
            }) => assert_eq!(condition.inputs(), ["height_cm", "weight_kg"]),
            other => panic!("unexpected strategy {:?}", other),
        }

        assert_config_error(
            "fields: [w]\nrules: [{field: a, kind: required}]\nimputation: {a: {strategy: conditional_compute, formula: 'w', condition: 'zz > 0'}}",
            "undefined field 'zz'",
        );
        assert_config_error(
            "fields: [w]\nrules: [{field: a, kind: required}]\nimputation: {a: {strategy: conditional_compute, formula: 'w', condition: 'w + 1'}}",
            "no comparison",
        );
        assert_config_error(
            "rules: [{field: a, kind: required}]\nimputation: {a: {strategy: median, condition: 'a > 0'}}",
            "does not take a formula or condition",
        );
        Ok(())
    }
}
