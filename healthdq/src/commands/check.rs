// healthdq/src/commands/check.rs
//
// USE CASE: Validate a rule document (CI friendly, touches no data).

use std::path::PathBuf;

use healthdq_core::domain::rules::{ImputationStrategy, RangePolicy, RuleRegistry};
use healthdq_core::infrastructure::config::load_rule_document;

pub fn execute(config: PathBuf) -> anyhow::Result<()> {
    let registry = match load_rule_document(&config)
        .map_err(anyhow::Error::from)
        .and_then(|doc| RuleRegistry::load(doc).map_err(anyhow::Error::from))
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("❌ {} is invalid: {}", config.display(), e);
            std::process::exit(1);
        }
    };

    let review = registry.review();
    println!("✅ {} is valid", config.display());
    println!(
        "   Rule set {}: {} rules, review {}, range policy {}",
        registry.version(),
        registry.rules().len(),
        if review.enabled { "on" } else { "off" },
        match review.range_policy {
            RangePolicy::Defer => "defer",
            RangePolicy::AutoApply => "auto_apply",
        }
    );
    for rule in registry.rules() {
        println!("   {}, severity {}", rule, rule.severity);
    }
    let imputation: Vec<String> = registry
        .imputation()
        .iter()
        .map(|(field, strategy)| match strategy {
            ImputationStrategy::Median => format!("{} (median)", field),
            ImputationStrategy::Mode => format!("{} (mode)", field),
            ImputationStrategy::ConditionalCompute {
                condition: Some(condition),
                ..
            } => format!("{} (conditional_compute, {})", field, condition),
            ImputationStrategy::ConditionalCompute { .. } => {
                format!("{} (conditional_compute)", field)
            }
        })
        .collect();
    if !imputation.is_empty() {
        println!("   Imputation: {}", imputation.join(", "));
    }
    Ok(())
}
