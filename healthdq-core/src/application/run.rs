// healthdq-core/src/application/run.rs

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{info, instrument, warn};

use crate::application::pipeline::{
    DecisionReport, Pipeline, PipelineOptions, PipelineOutcome,
};
use crate::domain::correction::{Correction, CorrectionId, Decision};
use crate::domain::error::DomainError;
use crate::domain::rules::{RuleDocument, RuleRegistry};
use crate::error::QualityError;
use crate::ports::{ArtifactSink, RecordSource};

/// Result of `apply_decision`: what changed and what is still open.
#[derive(Debug)]
pub struct DecisionOutcome {
    pub report: DecisionReport,
    pub pending: Vec<Correction>,
}

/// Timestamp-based run id with microseconds, e.g. `run-20261018T142501123456Z`.
/// Ids handed out by one process are strictly increasing.
pub fn generate_run_id() -> String {
    static LAST: AtomicI64 = AtomicI64::new(0);
    let now = Utc::now().timestamp_micros();
    let micros = match LAST.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(last) | Err(last) => now.max(last + 1),
    };
    let at = DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now);
    format!("run-{}", at.format("%Y%m%dT%H%M%S%6fZ"))
}

/// Loads the snapshot, runs the pipeline and hands the result to the sink:
/// artifacts when done, a checkpoint when waiting for review, the issue list on failure.
#[instrument(skip_all, fields(source = %source.describe(), run = %options.run_id))]
pub async fn run_quality_check(
    source: &dyn RecordSource,
    sink: &dyn ArtifactSink,
    registry: Arc<RuleRegistry>,
    options: PipelineOptions,
) -> Result<PipelineOutcome, QualityError> {
    let dataset = source.load(registry.id_field()).await?;
    info!(records = dataset.len(), "Snapshot loaded");

    let mut pipeline = Pipeline::load(registry, dataset, options)?;
    let outcome = pipeline.run();
    settle(&pipeline, sink, outcome).await
}

/// Applies one human decision to the suspended run and persists the new checkpoint.
#[instrument(skip(sink, decision, document))]
pub async fn apply_decision(
    sink: &dyn ArtifactSink,
    id: CorrectionId,
    decision: Decision,
    document: Option<RuleDocument>,
) -> Result<DecisionOutcome, QualityError> {
    let mut pipeline = restore(sink, document).await?;
    let report = pipeline.decide(id, decision)?;
    sink.save_checkpoint(&pipeline.checkpoint()).await?;
    Ok(DecisionOutcome {
        report,
        pending: pipeline.pending().cloned().collect(),
    })
}

/// Finishes a suspended run if nothing is pending anymore.
#[instrument(skip_all)]
pub async fn resume_run(
    sink: &dyn ArtifactSink,
    document: Option<RuleDocument>,
) -> Result<PipelineOutcome, QualityError> {
    let mut pipeline = restore(sink, document).await?;
    let outcome = pipeline.resume();
    settle(&pipeline, sink, outcome).await
}

async fn restore(
    sink: &dyn ArtifactSink,
    document: Option<RuleDocument>,
) -> Result<Pipeline, QualityError> {
    let checkpoint = sink.load_checkpoint().await?.ok_or_else(|| {
        DomainError::Decision("no run is waiting for decisions".into())
    })?;
    Ok(Pipeline::restore(checkpoint, document)?)
}

async fn settle(
    pipeline: &Pipeline,
    sink: &dyn ArtifactSink,
    outcome: Result<PipelineOutcome, DomainError>,
) -> Result<PipelineOutcome, QualityError> {
    match outcome {
        Ok(PipelineOutcome::Done(artifacts)) => {
            sink.publish(&artifacts).await?;
            sink.clear_checkpoint().await?;
            Ok(PipelineOutcome::Done(artifacts))
        }
        Ok(waiting @ PipelineOutcome::AwaitingDecision { .. }) => {
            sink.save_checkpoint(&pipeline.checkpoint()).await?;
            Ok(waiting)
        }
        Err(e) => {
            warn!(error = %e, "Run failed, publishing issues only");
            sink.publish_issues(&pipeline.issues()).await?;
            Err(e.into())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::pipeline::Checkpoint;
    use crate::application::report::{Issue, RunArtifacts};
    use crate::domain::dataset::{Dataset, Record, Value};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct InMemorySource(Dataset);

    #[async_trait]
    impl RecordSource for InMemorySource {
        async fn load(&self, _id_field: Option<&str>) -> Result<Dataset, QualityError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    #[derive(Default)]
    struct InMemorySink {
        published: Mutex<Option<RunArtifacts>>,
        issues: Mutex<Option<Vec<Issue>>>,
        checkpoint: Mutex<Option<Checkpoint>>,
    }

    #[async_trait]
    impl ArtifactSink for InMemorySink {
        async fn publish(&self, artifacts: &RunArtifacts) -> Result<(), QualityError> {
            *self.published.lock().unwrap() = Some(artifacts.clone());
            Ok(())
        }

        async fn publish_issues(&self, issues: &[Issue]) -> Result<(), QualityError> {
            *self.issues.lock().unwrap() = Some(issues.to_vec());
            Ok(())
        }

        async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), QualityError> {
            *self.checkpoint.lock().unwrap() = Some(checkpoint.clone());
            Ok(())
        }

        async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, QualityError> {
            Ok(self.checkpoint.lock().unwrap().clone())
        }

        async fn clear_checkpoint(&self) -> Result<(), QualityError> {
            *self.checkpoint.lock().unwrap() = None;
            Ok(())
        }
    }

    fn registry(review: bool) -> Arc<RuleRegistry> {
        let doc: RuleDocument = serde_yaml::from_str(&format!(
            r#"
review: {{ enabled: {} }}
rules:
  - field: height_cm
    kind: required
imputation:
  height_cm: {{ strategy: median }}
"#,
            review
        ))
        .unwrap();
        Arc::new(RuleRegistry::load(doc).unwrap())
    }

    fn source() -> InMemorySource {
        InMemorySource(Dataset::new(vec![
            Record::new("a").with("height_cm", 160.0),
            Record::new("b").with("height_cm", Value::Null),
            Record::new("c").with("height_cm", 180.0),
        ]))
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            run_id: "r1".into(),
            prior_ledger: None,
        }
    }

    #[tokio::test]
    async fn test_automatic_run_publishes_artifacts() -> Result<()> {
        let sink = InMemorySink::default();
        let outcome = run_quality_check(&source(), &sink, registry(false), options()).await?;
        assert!(matches!(outcome, PipelineOutcome::Done(_)));

        let published = sink.published.lock().unwrap().clone().unwrap();
        let b = published.cleaned.get(&"b".into()).unwrap();
        assert_eq!(b.value("height_cm"), &Value::Number(170.0));
        assert!(sink.checkpoint.lock().unwrap().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_review_round_trip_through_checkpoint() -> Result<()> {
        let sink = InMemorySink::default();
        let outcome = run_quality_check(&source(), &sink, registry(true), options()).await?;
        let PipelineOutcome::AwaitingDecision { pending } = outcome else {
            panic!("expected a suspended run");
        };
        assert!(sink.checkpoint.lock().unwrap().is_some());
        assert!(sink.published.lock().unwrap().is_none());

        let still = resume_run(&sink, None).await?;
        assert!(matches!(still, PipelineOutcome::AwaitingDecision { .. }));

        let decided = apply_decision(
            &sink,
            pending[0].id,
            Decision::Override(Value::Number(165.0)),
            None,
        )
        .await?;
        assert!(decided.pending.is_empty());

        let done = resume_run(&sink, None).await?;
        let PipelineOutcome::Done(artifacts) = done else {
            panic!("expected a finished run");
        };
        let b = artifacts.cleaned.get(&"b".into()).unwrap();
        assert_eq!(b.value("height_cm"), &Value::Number(165.0));
        assert!(sink.checkpoint.lock().unwrap().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_decision_without_checkpoint_fails() {
        let sink = InMemorySink::default();
        let err = apply_decision(&sink, CorrectionId(1), Decision::Accept, None)
            .await
            .unwrap_err();
        assert!(matches!(err, QualityError::Domain(DomainError::Decision(_))));
    }

    #[test]
    fn test_run_id_shape() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert!(id.ends_with('Z'));
        assert_eq!(id.len(), "run-20261018T142501123456Z".len());
    }

    #[test]
    fn test_run_ids_never_repeat_within_a_process() {
        let ids: Vec<String> = (0..1000).map(|_| generate_run_id()).collect();
        let unique: std::collections::BTreeSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_second_run_with_same_id_keeps_ledger_intact() -> Result<()> {
        let sink = InMemorySink::default();
        let first = run_quality_check(&source(), &sink, registry(false), options()).await?;
        let PipelineOutcome::Done(artifacts) = first else {
            panic!("expected a finished run");
        };
        let before = artifacts.ledger.len();
        assert!(before > 0);

        let reused = PipelineOptions {
            run_id: "r1".into(),
            prior_ledger: Some(artifacts.ledger.clone()),
        };
        let err = run_quality_check(&source(), &sink, registry(false), reused)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QualityError::Domain(DomainError::LedgerConsistency(_))
        ));

        let fresh = PipelineOptions {
            run_id: "r2".into(),
            prior_ledger: Some(artifacts.ledger.clone()),
        };
        let PipelineOutcome::Done(second) =
            run_quality_check(&source(), &sink, registry(false), fresh).await?
        else {
            panic!("expected a finished run");
        };
        assert_eq!(second.ledger.len(), before * 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_record_ids_fail_the_run() {
        let sink = InMemorySink::default();
        let source = InMemorySource(Dataset::new(vec![
            Record::new("p1").with("height_cm", Value::Null),
            Record::new("p2").with("height_cm", 160.0),
            Record::new("p1").with("height_cm", 180.0),
        ]));
        let err = run_quality_check(&source, &sink, registry(false), options())
            .await
            .unwrap_err();
        assert!(matches!(err, QualityError::Domain(DomainError::DuplicateRecord(_))));
        assert!(sink.published.lock().unwrap().is_none());
    }
}
