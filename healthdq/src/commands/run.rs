// healthdq/src/commands/run.rs
//
// USE CASE: Detect, correct and measure one dataset.

use anyhow::{Context, anyhow};
use std::path::PathBuf;
use std::sync::Arc;

use healthdq_core::application::{
    PipelineOptions, PipelineOutcome, generate_run_id, run_quality_check,
};
use healthdq_core::domain::rules::RuleRegistry;
use healthdq_core::infrastructure::adapters::{SourceFormat, source_for};
use healthdq_core::infrastructure::config::load_rule_document;
use healthdq_core::infrastructure::store::{FsArtifactSink, load_ledger};

use crate::output;

pub struct RunArgs {
    pub input: PathBuf,
    pub config: PathBuf,
    pub format: String,
    pub out: PathBuf,
    pub review: bool,
    pub run_id: Option<String>,
    pub ledger: Option<PathBuf>,
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let start = std::time::Instant::now();

    // A. Rules (Infra -> Domain)
    println!("⚙️  Loading rules from {}...", args.config.display());
    let mut document = load_rule_document(&args.config)
        .with_context(|| format!("Failed to load rule document {:?}", args.config))?;
    if args.review {
        document.review.enabled = true;
    }
    let registry = RuleRegistry::load(document)
        .with_context(|| format!("Invalid rule document {:?}", args.config))?;
    println!(
        "   Rule set {} ({} rules), review: {}",
        registry.version(),
        registry.rules().len(),
        if registry.review().enabled { "on" } else { "off" }
    );

    // B. Adapters
    let format: SourceFormat = args.format.parse().map_err(|e: String| anyhow!(e))?;
    let source = source_for(&args.input, format);
    let sink = FsArtifactSink::new(&args.out);
    let prior_ledger = match &args.ledger {
        Some(path) => Some(
            load_ledger(path).with_context(|| format!("Failed to read ledger {:?}", path))?,
        ),
        None => None,
    };
    let options = PipelineOptions {
        run_id: args.run_id.unwrap_or_else(generate_run_id),
        prior_ledger,
    };
    println!("📥 Reading {} (run {})...", source.describe(), options.run_id);
    tracing::debug!(out = ?args.out, prior_ledger = args.ledger.is_some(), "Run options");

    // C. Pipeline (Application Layer)
    let result = run_quality_check(source.as_ref(), &sink, Arc::new(registry), options).await;

    match result {
        Ok(PipelineOutcome::Done(artifacts)) => {
            output::print_done(&artifacts, &args.out);
            println!("   Finished in {:.2?}", start.elapsed());
        }
        Ok(PipelineOutcome::AwaitingDecision { pending }) => {
            output::print_waiting(&pending, &args.out);
        }
        Err(e) => {
            eprintln!("\n💥 RUN FAILED: {}", e);
            if args.out.join("issues.json").exists() {
                eprintln!("   Issues written to {}", args.out.display());
            }
            std::process::exit(1);
        }
    }
    Ok(())
}
