// healthdq-core/src/infrastructure/store/artifacts.rs

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::application::pipeline::Checkpoint;
use crate::application::report::{Issue, RunArtifacts};
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::{read_json, write_json};
use crate::ports::ArtifactSink;

pub const CLEANED_FILE: &str = "cleaned.json";
pub const ISSUES_FILE: &str = "issues.json";
pub const METRICS_FILE: &str = "metrics_before_after.json";
pub const LEDGER_FILE: &str = "ledger.json";
pub const META_FILE: &str = "meta.json";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Writes run outputs as JSON files into one directory.
pub struct FsArtifactSink {
    out_dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.out_dir.join(file)
    }
}

#[async_trait]
impl ArtifactSink for FsArtifactSink {
    #[instrument(skip_all, fields(out = ?self.out_dir))]
    async fn publish(&self, artifacts: &RunArtifacts) -> Result<(), QualityError> {
        write_json(&self.path(CLEANED_FILE), artifacts.cleaned.records())?;
        write_json(&self.path(ISSUES_FILE), &artifacts.issues)?;
        write_json(&self.path(METRICS_FILE), &artifacts.metrics)?;
        write_json(&self.path(LEDGER_FILE), &artifacts.ledger)?;
        // Last, so a present meta.json means a complete set
        write_json(&self.path(META_FILE), &artifacts.metadata)?;
        info!(
            calc_version = %artifacts.metadata.calc_version,
            "Artifacts published"
        );
        Ok(())
    }

    async fn publish_issues(&self, issues: &[Issue]) -> Result<(), QualityError> {
        write_json(&self.path(ISSUES_FILE), issues)?;
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), QualityError> {
        write_json(&self.path(CHECKPOINT_FILE), checkpoint)?;
        info!(state = %checkpoint.state, "Checkpoint saved");
        Ok(())
    }

    async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, QualityError> {
        Ok(read_json(&self.path(CHECKPOINT_FILE))?)
    }

    async fn clear_checkpoint(&self) -> Result<(), QualityError> {
        let path = self.path(CHECKPOINT_FILE);
        if path.exists() {
            fs::remove_file(&path).map_err(InfrastructureError::Io)?;
        }
        Ok(())
    }
}
