// healthdq-core/src/application/pipeline.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::application::proposal::{FieldState, ProposalEngine};
use crate::application::report::{
    CorrectionCounts, Issue, MetricsReport, RunArtifacts, RunMetadata,
};
use crate::domain::audit::{AuditLedger, CalcVersion};
use crate::domain::correction::{
    Correction, CorrectionId, CorrectionIdSeq, CorrectionStatus, DecidedBy, Decision,
    UnresolvedIssue, UnresolvedReason,
};
use crate::domain::dataset::{CellEdit, Dataset, RecordId};
use crate::domain::detection::{Violation, ViolationDetector};
use crate::domain::error::DomainError;
use crate::domain::metrics::{MetricSnapshot, MetricsEngine, Stage, delta};
use crate::domain::rules::{RangePolicy, RuleDocument, RuleRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Loaded,
    Detected,
    Proposed,
    AwaitingDecision,
    AutoApplied,
    Audited,
    Measured,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loaded => "LOADED",
            Self::Detected => "DETECTED",
            Self::Proposed => "PROPOSED",
            Self::AwaitingDecision => "AWAITING_DECISION",
            Self::AutoApplied => "AUTO_APPLIED",
            Self::Audited => "AUDITED",
            Self::Measured => "MEASURED",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub run_id: String,
    /// Ledger of earlier runs; new decisions are appended to it.
    pub prior_ledger: Option<AuditLedger>,
}

#[derive(Debug)]
pub enum PipelineOutcome {
    AwaitingDecision { pending: Vec<Correction> },
    Done(Box<RunArtifacts>),
}

/// What a single human decision changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReport {
    pub decided: CorrectionId,
    pub status: CorrectionStatus,
    /// Pending dependents rejected along with an override or a rejection.
    pub cascaded: Vec<CorrectionId>,
    /// Fresh proposals for the rules of the cascaded corrections.
    pub reproposed: Vec<CorrectionId>,
}

/// A suspended run, serializable so that decisions can arrive in a later process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub calc_version: CalcVersion,
    pub document: RuleDocument,
    pub state: PipelineState,
    pub snapshot: Dataset,
    pub violations: Vec<Violation>,
    pub metrics_before: Option<MetricSnapshot>,
    pub corrections: Vec<Correction>,
    pub unresolved: Vec<UnresolvedIssue>,
    pub ledger: AuditLedger,
    /// Corrections of this run already written to the ledger.
    #[serde(default)]
    pub audited: BTreeSet<CorrectionId>,
    pub ids: CorrectionIdSeq,
    pub started_at: DateTime<Utc>,
}

/// Orchestrates one run over one immutable snapshot.
///
/// `LOADED → DETECTED → PROPOSED → (AWAITING_DECISION | AUTO_APPLIED) → AUDITED → MEASURED → DONE`,
/// with `FAILED` on the first fatal error. The ledger is written only from here.
pub struct Pipeline {
    registry: Arc<RuleRegistry>,
    calc_version: CalcVersion,
    state: PipelineState,
    snapshot: Dataset,
    violations: Vec<Violation>,
    metrics_before: Option<MetricSnapshot>,
    corrections: Vec<Correction>,
    unresolved: Vec<UnresolvedIssue>,
    ledger: AuditLedger,
    audited: BTreeSet<CorrectionId>,
    ids: CorrectionIdSeq,
    started_at: DateTime<Utc>,
}

impl Pipeline {
    /// Fails when a record id repeats in the snapshot or when the prior ledger
    /// already holds entries for `options.run_id`.
    pub fn load(
        registry: Arc<RuleRegistry>,
        snapshot: Dataset,
        options: PipelineOptions,
    ) -> Result<Self, DomainError> {
        if let Some(id) = snapshot.duplicate_id() {
            return Err(DomainError::DuplicateRecord(id.to_string()));
        }
        if let Some(prior) = &options.prior_ledger
            && prior.has_run(&options.run_id)
        {
            return Err(DomainError::LedgerConsistency(format!(
                "run {} already has ledger entries; use a new run id",
                options.run_id
            )));
        }

        let calc_version = CalcVersion::new(
            registry.version(),
            registry.digest(),
            &options.run_id,
        );
        info!(
            calc_version = %calc_version,
            records = snapshot.len(),
            "Pipeline loaded"
        );
        Ok(Self {
            registry,
            calc_version,
            state: PipelineState::Loaded,
            snapshot,
            violations: Vec::new(),
            metrics_before: None,
            corrections: Vec::new(),
            unresolved: Vec::new(),
            ledger: options.prior_ledger.unwrap_or_default(),
            audited: BTreeSet::new(),
            ids: CorrectionIdSeq::default(),
            started_at: Utc::now(),
        })
    }

    // --- ACCESSORS ---

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn calc_version(&self) -> &CalcVersion {
        &self.calc_version
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    pub fn unresolved(&self) -> &[UnresolvedIssue] {
        &self.unresolved
    }

    pub fn ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    pub fn pending(&self) -> impl Iterator<Item = &Correction> {
        self.corrections.iter().filter(|c| c.is_pending())
    }

    /// Pre-correction violations first, then what is left for a human.
    pub fn issues(&self) -> Vec<Issue> {
        self.violations
            .iter()
            .cloned()
            .map(Issue::Violation)
            .chain(self.unresolved.iter().cloned().map(Issue::Unresolved))
            .collect()
    }

    // --- STAGES ---

    /// Detects, proposes, then either stops for review or applies and finishes.
    #[instrument(skip(self), fields(run = %self.calc_version.run_id))]
    pub fn run(&mut self) -> Result<PipelineOutcome, DomainError> {
        self.expect_state(PipelineState::Loaded, "run")?;
        self.guard(|p| {
            p.detect();
            p.propose()?;

            if p.registry.review().enabled {
                p.transition(PipelineState::AwaitingDecision);
                let pending: Vec<Correction> = p.pending().cloned().collect();
                if !pending.is_empty() {
                    info!(pending = pending.len(), "Waiting for review decisions");
                    return Ok(PipelineOutcome::AwaitingDecision { pending });
                }
            } else {
                p.auto_apply()?;
            }
            p.finish().map(|a| PipelineOutcome::Done(Box::new(a)))
        })
    }

    fn detect(&mut self) {
        self.violations = ViolationDetector::detect(&self.snapshot, &self.registry);
        self.metrics_before = Some(MetricsEngine::compute(
            &self.snapshot,
            &self.registry,
            Stage::Before,
        ));
        info!(violations = self.violations.len(), "Detection finished");
        self.transition(PipelineState::Detected);
    }

    fn propose(&mut self) -> Result<(), DomainError> {
        let engine = ProposalEngine::new(self.registry.clone(), &self.snapshot);
        let proposals = engine.propose_all(&self.snapshot, &mut self.ids)?;
        self.corrections = proposals.corrections;
        self.unresolved = proposals.unresolved;
        info!(
            corrections = self.corrections.len(),
            unresolved = self.unresolved.len(),
            "Proposals ready"
        );
        self.transition(PipelineState::Proposed);
        Ok(())
    }

    /// No reviewer: accept everything except range fixes under the `defer` policy.
    fn auto_apply(&mut self) -> Result<(), DomainError> {
        let defer = self.registry.review().range_policy == RangePolicy::Defer;
        for c in &mut self.corrections {
            if c.requires_review && defer {
                warn!(
                    id = %c.id,
                    record = %c.record_id,
                    field = %c.field,
                    "Correction deferred for review"
                );
                self.unresolved.push(UnresolvedIssue {
                    record_id: c.record_id.clone(),
                    field: c.field.clone(),
                    rule_index: c.rule_index,
                    reason: UnresolvedReason::DeferredForReview,
                    correction_id: Some(c.id),
                    message: format!(
                        "{} proposes {} for '{}' and needs a reviewer",
                        c.id,
                        c.proposed_value.render(),
                        c.field
                    ),
                });
                continue;
            }
            c.decide(Decision::Accept, DecidedBy::Automatic)?;
        }
        self.transition(PipelineState::AutoApplied);
        Ok(())
    }

    /// Audits outstanding decisions, applies them and measures the result.
    fn finish(&mut self) -> Result<RunArtifacts, DomainError> {
        for c in &self.corrections {
            if c.status.is_terminal() && self.audited.insert(c.id) {
                let by = c.decided_by.unwrap_or(DecidedBy::Automatic);
                self.ledger.record(c, by, &self.calc_version)?;
            }
        }
        self.transition(PipelineState::Audited);

        let mut applied: Vec<&Correction> = self
            .corrections
            .iter()
            .filter(|c| c.status.is_applied())
            .collect();
        applied.sort_by_key(|c| c.id);
        let edits: Vec<CellEdit> = applied.iter().filter_map(|c| c.to_edit()).collect();
        let cleaned = self.snapshot.apply(&edits);

        let after = MetricsEngine::compute(&cleaned, &self.registry, Stage::After);
        let before = self
            .metrics_before
            .clone()
            .unwrap_or_else(|| MetricsEngine::compute(&self.snapshot, &self.registry, Stage::Before));
        self.transition(PipelineState::Measured);

        let metadata = RunMetadata {
            calc_version: self.calc_version.to_string(),
            calc: self.calc_version.clone(),
            record_count: self.snapshot.len(),
            schema_fingerprint: self.snapshot.fingerprint().clone(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            violations: self.violations.len(),
            unresolved: self.unresolved.len(),
            corrections: CorrectionCounts::tally(&self.corrections),
        };
        let artifacts = RunArtifacts {
            cleaned,
            issues: self.issues(),
            metrics: MetricsReport {
                delta: delta(&before, &after),
                before,
                after,
            },
            ledger: self.ledger.clone(),
            metadata,
        };
        self.transition(PipelineState::Done);
        Ok(artifacts)
    }

    // --- HUMAN REVIEW ---

    /// Records a human decision on a pending correction of this run.
    #[instrument(skip(self, decision), fields(run = %self.calc_version.run_id))]
    pub fn decide(
        &mut self,
        id: CorrectionId,
        decision: Decision,
    ) -> Result<DecisionReport, DomainError> {
        self.expect_state(PipelineState::AwaitingDecision, "decide")?;
        let pos = self.position(id)?;
        let target = &self.corrections[pos];
        if !target.is_pending() {
            return Err(DomainError::Decision(format!(
                "{} is already {}",
                id, target.status
            )));
        }
        if decision == Decision::Accept {
            for dep in &target.depends_on {
                let status = self.position(*dep).map(|p| self.corrections[p].status)?;
                if !status.is_applied() {
                    return Err(DomainError::Decision(format!(
                        "{} depends on {}, which is {}",
                        id, dep, status
                    )));
                }
            }
        }

        self.guard(|p| {
            p.corrections[pos].decide(decision, DecidedBy::Human)?;
            p.ledger
                .record(&p.corrections[pos], DecidedBy::Human, &p.calc_version)?;
            p.audited.insert(id);
            let status = p.corrections[pos].status;
            info!(id = %id, status = %status, "Decision recorded");

            let mut report = DecisionReport {
                decided: id,
                status,
                cascaded: Vec::new(),
                reproposed: Vec::new(),
            };
            if status != CorrectionStatus::Accepted {
                p.cascade(id, &mut report)?;
            }
            Ok(report)
        })
    }

    /// Rejects the pending dependents of `root`, then proposes again for their rules.
    fn cascade(&mut self, root: CorrectionId, report: &mut DecisionReport) -> Result<(), DomainError> {
        let mut affected = BTreeSet::from([root]);
        loop {
            let next: Vec<CorrectionId> = self
                .corrections
                .iter()
                .filter(|c| c.is_pending() && !affected.contains(&c.id))
                .filter(|c| c.depends_on.iter().any(|d| affected.contains(d)))
                .map(|c| c.id)
                .collect();
            if next.is_empty() {
                break;
            }
            affected.extend(next.iter().copied());
            report.cascaded.extend(next);
        }
        if report.cascaded.is_empty() {
            return Ok(());
        }

        let mut rules_by_record: BTreeMap<RecordId, BTreeSet<usize>> = BTreeMap::new();
        for id in &report.cascaded {
            let pos = self.position(*id)?;
            self.corrections[pos].decide(Decision::Reject, DecidedBy::Automatic)?;
            self.ledger
                .record(&self.corrections[pos], DecidedBy::Automatic, &self.calc_version)?;
            self.audited.insert(*id);
            let c = &self.corrections[pos];
            warn!(id = %c.id, upstream = %root, "Dependent correction rejected");
            rules_by_record
                .entry(c.record_id.clone())
                .or_default()
                .insert(c.rule_index);
        }

        let engine = ProposalEngine::new(self.registry.clone(), &self.snapshot);
        for (record_id, rules) in rules_by_record {
            let Some(original) = self.snapshot.get(&record_id) else {
                continue;
            };
            let mut working = original.clone();
            let mut state = FieldState::default();

            for c in self.corrections.iter().filter(|c| c.record_id == record_id) {
                match c.status {
                    CorrectionStatus::Rejected => {
                        if c.decided_by == Some(DecidedBy::Human) {
                            state.blocked.insert(c.field.clone());
                        }
                    }
                    _ => {
                        let value = c.applied_value().unwrap_or(&c.proposed_value).clone();
                        working.set(&c.field, value);
                        state.blocked.insert(c.field.clone());
                        state.providers.insert(c.field.clone(), c.id);
                    }
                }
            }
            for issue in self.unresolved.iter().filter(|u| u.record_id == record_id) {
                state.blocked.insert(issue.field.clone());
            }

            let rules: Vec<usize> = rules.into_iter().collect();
            let fresh = engine.propose_rules(&mut working, &rules, &mut state, &mut self.ids)?;
            report
                .reproposed
                .extend(fresh.corrections.iter().map(|c| c.id));
            self.corrections.extend(fresh.corrections);
            self.unresolved.extend(fresh.unresolved);
        }
        Ok(())
    }

    /// Finishes the run once every correction is decided; otherwise keeps waiting.
    #[instrument(skip(self), fields(run = %self.calc_version.run_id))]
    pub fn resume(&mut self) -> Result<PipelineOutcome, DomainError> {
        self.expect_state(PipelineState::AwaitingDecision, "resume")?;
        let pending: Vec<Correction> = self.pending().cloned().collect();
        if !pending.is_empty() {
            info!(pending = pending.len(), "Still waiting for review decisions");
            return Ok(PipelineOutcome::AwaitingDecision { pending });
        }
        self.guard(|p| p.finish().map(|a| PipelineOutcome::Done(Box::new(a))))
    }

    // --- CHECKPOINTS ---

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            calc_version: self.calc_version.clone(),
            document: self.registry.document().clone(),
            state: self.state,
            snapshot: self.snapshot.clone(),
            violations: self.violations.clone(),
            metrics_before: self.metrics_before.clone(),
            corrections: self.corrections.clone(),
            unresolved: self.unresolved.clone(),
            ledger: self.ledger.clone(),
            audited: self.audited.clone(),
            ids: self.ids.clone(),
            started_at: self.started_at,
        }
    }

    /// Rebuilds a suspended run. `document` replaces the stored rule document and
    /// must compile to the same digest; the run keeps the review settings it
    /// was started with.
    pub fn restore(
        checkpoint: Checkpoint,
        document: Option<RuleDocument>,
    ) -> Result<Self, DomainError> {
        let document = match document {
            Some(mut doc) => {
                doc.review = checkpoint.document.review.clone();
                doc
            }
            None => checkpoint.document,
        };
        let registry = RuleRegistry::load(document)?;
        if !checkpoint.calc_version.matches_digest(registry.digest()) {
            return Err(DomainError::Config(format!(
                "rule document digest {} does not match run {} ({})",
                &registry.digest()[..12.min(registry.digest().len())],
                checkpoint.calc_version.run_id,
                checkpoint.calc_version.short_digest()
            )));
        }
        info!(
            calc_version = %checkpoint.calc_version,
            state = %checkpoint.state,
            "Pipeline restored"
        );
        Ok(Self {
            registry: Arc::new(registry),
            calc_version: checkpoint.calc_version,
            state: checkpoint.state,
            snapshot: checkpoint.snapshot,
            violations: checkpoint.violations,
            metrics_before: checkpoint.metrics_before,
            corrections: checkpoint.corrections,
            unresolved: checkpoint.unresolved,
            ledger: checkpoint.ledger,
            audited: checkpoint.audited,
            ids: checkpoint.ids,
            started_at: checkpoint.started_at,
        })
    }

    // --- HELPERS ---

    fn transition(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Pipeline state");
        self.state = next;
    }

    fn expect_state(&self, expected: PipelineState, action: &str) -> Result<(), DomainError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition {
                state: self.state.to_string(),
                action: action.to_string(),
            })
        }
    }

    fn position(&self, id: CorrectionId) -> Result<usize, DomainError> {
        self.corrections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| DomainError::Decision(format!("unknown correction {}", id)))
    }

    /// Moves to `FAILED` when `f` hits a fatal error.
    fn guard<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DomainError>,
    ) -> Result<T, DomainError> {
        let result = f(self);
        if let Err(e) = &result
            && e.is_fatal()
        {
            error!(error = %e, state = %self.state, "Pipeline failed");
            self.state = PipelineState::Failed;
        }
        result
    }
}
