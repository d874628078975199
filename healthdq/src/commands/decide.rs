// healthdq/src/commands/decide.rs
//
// USE CASE: Record one human decision on a suspended run.

use anyhow::Context;
use std::path::PathBuf;

use healthdq_core::application::apply_decision;
use healthdq_core::domain::correction::{CorrectionId, Decision};
use healthdq_core::domain::dataset::Value;
use healthdq_core::infrastructure::config::load_rule_document;
use healthdq_core::infrastructure::store::FsArtifactSink;

use crate::output;

pub async fn execute(
    id: String,
    status: String,
    value: Option<String>,
    out: PathBuf,
    config: Option<PathBuf>,
) -> anyhow::Result<()> {
    let id: CorrectionId = id.parse()?;
    let decision = Decision::parse(&status, value.as_deref().map(Value::from_raw_text))?;
    let document = match &config {
        Some(path) => Some(
            load_rule_document(path)
                .with_context(|| format!("Failed to load rule document {:?}", path))?,
        ),
        None => None,
    };

    let sink = FsArtifactSink::new(&out);
    match apply_decision(&sink, id, decision, document).await {
        Ok(outcome) => {
            let report = &outcome.report;
            println!("✅ {} {}", report.decided, report.status);
            for dep in &report.cascaded {
                println!("   ↳ {} rejected (depends on {})", dep, report.decided);
            }
            for fresh in &report.reproposed {
                println!("   ↳ {} proposed as a replacement", fresh);
            }
            if outcome.pending.is_empty() {
                println!("\n👉 Nothing left to review: healthdq resume --out {}", out.display());
            } else {
                output::print_waiting(&outcome.pending, &out);
            }
        }
        Err(e) => {
            eprintln!("❌ Decision failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
