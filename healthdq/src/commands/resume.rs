// healthdq/src/commands/resume.rs
//
// USE CASE: Finish a suspended run.

use anyhow::Context;
use std::path::PathBuf;

use healthdq_core::application::{PipelineOutcome, resume_run};
use healthdq_core::infrastructure::config::load_rule_document;
use healthdq_core::infrastructure::store::FsArtifactSink;

use crate::output;

pub async fn execute(out: PathBuf, config: Option<PathBuf>) -> anyhow::Result<()> {
    let document = match &config {
        Some(path) => Some(
            load_rule_document(path)
                .with_context(|| format!("Failed to load rule document {:?}", path))?,
        ),
        None => None,
    };

    let sink = FsArtifactSink::new(&out);
    match resume_run(&sink, document).await {
        Ok(PipelineOutcome::Done(artifacts)) => output::print_done(&artifacts, &out),
        Ok(PipelineOutcome::AwaitingDecision { pending }) => {
            output::print_waiting(&pending, &out);
            // Still blocked: signal it to scripts
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("💥 Resume failed: {}", e);
            std::process::exit(1);
        }
    }
    Ok(())
}
