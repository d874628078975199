// healthdq-core/src/application/report.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::audit::{AuditLedger, CalcVersion};
use crate::domain::correction::{Correction, CorrectionStatus, UnresolvedIssue};
use crate::domain::dataset::{Dataset, SchemaFingerprint};
use crate::domain::detection::Violation;
use crate::domain::metrics::{MetricDelta, MetricSnapshot};

/// An entry of `issues.json`: either pre-correction evidence or something left for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Issue {
    Violation(Violation),
    Unresolved(UnresolvedIssue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub before: MetricSnapshot,
    pub after: MetricSnapshot,
    pub delta: Vec<MetricDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionCounts {
    pub proposed: usize,
    pub accepted: usize,
    pub overridden: usize,
    pub rejected: usize,
}

impl CorrectionCounts {
    pub fn tally(corrections: &[Correction]) -> Self {
        let mut counts = Self::default();
        for c in corrections {
            match c.status {
                CorrectionStatus::Proposed => counts.proposed += 1,
                CorrectionStatus::Accepted => counts.accepted += 1,
                CorrectionStatus::Overridden => counts.overridden += 1,
                CorrectionStatus::Rejected => counts.rejected += 1,
            }
        }
        counts
    }
}

/// `meta.json`: what is needed to reproduce and compare runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub calc_version: String,
    pub calc: CalcVersion,
    pub record_count: usize,
    pub schema_fingerprint: SchemaFingerprint,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub violations: usize,
    pub unresolved: usize,
    pub corrections: CorrectionCounts,
}

/// Everything a finished run hands to an `ArtifactSink`.
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    pub cleaned: Dataset,
    pub issues: Vec<Issue>,
    pub metrics: MetricsReport,
    pub ledger: AuditLedger,
    pub metadata: RunMetadata,
}
