// healthdq-core/src/application/mod.rs

pub mod pipeline;
pub mod proposal;
pub mod report;
pub mod run;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Lets the CLI write `use healthdq_core::application::{run_quality_check, Pipeline};`
// without knowing the file layout.

pub use pipeline::{
    Checkpoint, DecisionReport, Pipeline, PipelineOptions, PipelineOutcome, PipelineState,
};
pub use proposal::{FieldState, ProposalEngine};
pub use report::{CorrectionCounts, Issue, MetricsReport, RunArtifacts, RunMetadata};
pub use run::{DecisionOutcome, apply_decision, generate_run_id, resume_run, run_quality_check};
