// healthdq-core/src/ports/artifact_sink.rs

use crate::application::pipeline::Checkpoint;
use crate::application::report::{Issue, RunArtifacts};
use crate::error::QualityError;
use async_trait::async_trait;

/// Where run outputs and suspended sessions go.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn publish(&self, artifacts: &RunArtifacts) -> Result<(), QualityError>;

    /// Issue list alone, for runs that failed before producing anything else.
    async fn publish_issues(&self, issues: &[Issue]) -> Result<(), QualityError>;

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), QualityError>;

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, QualityError>;

    async fn clear_checkpoint(&self) -> Result<(), QualityError>;
}
