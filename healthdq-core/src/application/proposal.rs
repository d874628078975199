// healthdq-core/src/application/proposal.rs

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::domain::correction::{
    CompletenessAgent, Correction, CorrectionAgent, CorrectionId, CorrectionIdSeq, Imputer,
    PrecisionAgent, Proposals, ReusabilityAgent,
};
use crate::domain::dataset::{Dataset, Record};
use crate::domain::detection::{Violation, ViolationDetector};
use crate::domain::error::DomainError;
use crate::domain::rules::{RangePolicy, RuleRegistry};

/// Per-record bookkeeping of a proposal pass.
#[derive(Debug, Default, Clone)]
pub struct FieldState {
    /// Fields that already have a correction or an unresolved issue in this pass.
    pub blocked: BTreeSet<String>,
    /// Correction currently feeding each field of the working copy.
    pub providers: BTreeMap<String, CorrectionId>,
}

/// Runs the agents record by record, rule by rule, on a working copy of each record.
pub struct ProposalEngine {
    registry: Arc<RuleRegistry>,
    agents: Vec<Box<dyn CorrectionAgent>>,
    /// Whether corrections that need review still feed later rules.
    optimistic_review: bool,
}

impl ProposalEngine {
    /// Fits imputation on `snapshot` (the pre-correction data) and wires the three agents.
    pub fn new(registry: Arc<RuleRegistry>, snapshot: &Dataset) -> Self {
        let imputer = Arc::new(Imputer::fit(snapshot, &registry));
        let review = registry.review();
        let agents: Vec<Box<dyn CorrectionAgent>> = vec![
            Box::new(CompletenessAgent::new(imputer.clone())),
            Box::new(PrecisionAgent::new(registry.clone(), imputer)),
            Box::new(ReusabilityAgent::new(registry.clone())),
        ];
        Self {
            registry,
            agents,
            optimistic_review: review.enabled || review.range_policy == RangePolicy::AutoApply,
        }
    }

    #[instrument(skip_all, fields(records = snapshot.len()))]
    pub fn propose_all(
        &self,
        snapshot: &Dataset,
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut out = Proposals::default();
        for record in snapshot.records() {
            out.extend(self.propose_record(record, ids)?);
        }
        debug!(
            corrections = out.corrections.len(),
            unresolved = out.unresolved.len(),
            "Proposal pass finished"
        );
        Ok(out)
    }

    pub fn propose_record(
        &self,
        record: &Record,
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut working = record.clone();
        let mut state = FieldState::default();
        let all: Vec<usize> = (0..self.registry.rules().len()).collect();
        self.propose_rules(&mut working, &all, &mut state, ids)
    }

    /// Evaluates `rules` in order against `working`. Corrections that will be applied
    /// are written into `working` so later rules read them. A rule is evaluated a second
    /// time when its own corrections changed the record (source imputed, then recompute).
    pub fn propose_rules(
        &self,
        working: &mut Record,
        rules: &[usize],
        state: &mut FieldState,
        ids: &mut CorrectionIdSeq,
    ) -> Result<Proposals, DomainError> {
        let mut out = Proposals::default();

        for &index in rules {
            let Some(rule) = self.registry.rule(index) else {
                continue;
            };
            for _pass in 0..2 {
                let fresh: Vec<Violation> = ViolationDetector::evaluate(rule, working)
                    .into_iter()
                    .filter(|v| !state.blocked.contains(&v.field))
                    .collect();
                if fresh.is_empty() {
                    break;
                }

                let mut changed = false;
                for agent in &self.agents {
                    let mine: Vec<Violation> = fresh
                        .iter()
                        .filter(|v| agent.handles(v) && !state.blocked.contains(&v.field))
                        .cloned()
                        .collect();
                    if mine.is_empty() {
                        continue;
                    }
                    let proposals = agent.propose(working, &mine, ids)?;
                    for correction in proposals.corrections {
                        if let Some(c) = self.accept_into(working, state, correction) {
                            changed |= state.providers.get(&c.field) == Some(&c.id);
                            out.corrections.push(c);
                        }
                    }
                    for issue in proposals.unresolved {
                        state.blocked.insert(issue.field.clone());
                        out.unresolved.push(issue);
                    }
                }
                if !changed {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Links dependencies and updates the working copy. `None` if the field is taken.
    fn accept_into(
        &self,
        working: &mut Record,
        state: &mut FieldState,
        mut correction: Correction,
    ) -> Option<Correction> {
        if !state.blocked.insert(correction.field.clone()) {
            return None;
        }
        correction.depends_on = correction
            .derived_from
            .iter()
            .filter(|f| **f != correction.field)
            .filter_map(|f| state.providers.get(f))
            .copied()
            .collect();

        if !correction.requires_review || self.optimistic_review {
            working.set(&correction.field, correction.proposed_value.clone());
            state
                .providers
                .insert(correction.field.clone(), correction.id);
        }
        debug!(
            id = %correction.id,
            record = %correction.record_id,
            field = %correction.field,
            strategy = %correction.strategy,
            "Correction proposed"
        );
        Some(correction)
    }
}
