// healthdq-core/src/domain/audit/ledger.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::version::CalcVersion;
use crate::domain::correction::{Correction, CorrectionId, DecidedBy};
use crate::domain::dataset::RecordId;
use crate::domain::error::DomainError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub correction: Correction,
    pub calc_version: CalcVersion,
    pub decided_by: DecidedBy,
    pub timestamp: DateTime<Utc>,
    /// Entry this one replaced as the active value of the cell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<u64>,
}

#[derive(Serialize, Deserialize)]
struct LedgerFile {
    entries: Vec<AuditEntry>,
}

type CellKey = (RecordId, String);

/// Append-only log of terminal correction decisions.
/// Entries are never edited or removed; supersession only moves the active pointer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "LedgerFile", into = "LedgerFile")]
pub struct AuditLedger {
    entries: Vec<AuditEntry>,
    active: BTreeMap<CellKey, usize>,
    recorded: BTreeSet<(String, CorrectionId)>,
}

impl From<LedgerFile> for AuditLedger {
    fn from(file: LedgerFile) -> Self {
        let mut ledger = AuditLedger::default();
        for entry in file.entries {
            ledger.index(entry);
        }
        ledger
    }
}

impl From<AuditLedger> for LedgerFile {
    fn from(ledger: AuditLedger) -> Self {
        LedgerFile {
            entries: ledger.entries,
        }
    }
}

impl AuditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        correction: &Correction,
        decided_by: DecidedBy,
        calc_version: &CalcVersion,
    ) -> Result<&AuditEntry, DomainError> {
        self.record_at(correction, decided_by, calc_version, Utc::now())
    }

    /// Appends a terminal decision. Timestamps are clamped so they never go backwards.
    pub fn record_at(
        &mut self,
        correction: &Correction,
        decided_by: DecidedBy,
        calc_version: &CalcVersion,
        at: DateTime<Utc>,
    ) -> Result<&AuditEntry, DomainError> {
        if !correction.status.is_terminal() {
            return Err(DomainError::LedgerConsistency(format!(
                "{} is still proposed",
                correction.id
            )));
        }
        if self
            .recorded
            .contains(&(calc_version.run_id.clone(), correction.id))
        {
            return Err(DomainError::LedgerConsistency(format!(
                "{} was already recorded for run {}",
                correction.id, calc_version.run_id
            )));
        }

        let timestamp = match self.entries.last() {
            Some(last) if last.timestamp > at => last.timestamp,
            _ => at,
        };
        let key = (correction.record_id.clone(), correction.field.clone());
        let supersedes = if correction.status.is_applied() {
            self.active.get(&key).map(|&pos| self.entries[pos].seq)
        } else {
            None
        };

        let entry = AuditEntry {
            seq: self.entries.len() as u64 + 1,
            correction: correction.clone(),
            calc_version: calc_version.clone(),
            decided_by,
            timestamp,
            supersedes,
        };
        debug!(
            seq = entry.seq,
            correction = %correction.id,
            status = %correction.status,
            "Ledger entry appended"
        );
        let pos = self.index(entry);
        Ok(&self.entries[pos])
    }

    fn index(&mut self, entry: AuditEntry) -> usize {
        let pos = self.entries.len();
        let c = &entry.correction;
        self.recorded
            .insert((entry.calc_version.run_id.clone(), c.id));
        if c.status.is_applied() {
            self.active
                .insert((c.record_id.clone(), c.field.clone()), pos);
        }
        self.entries.push(entry);
        pos
    }

    /// Entries for one cell, oldest first.
    pub fn history(&self, record_id: &RecordId, field: &str) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| &e.correction.record_id == record_id && e.correction.field == field)
            .collect()
    }

    /// The accepted or overridden entry currently in force for a cell.
    pub fn active(&self, record_id: &RecordId, field: &str) -> Option<&AuditEntry> {
        self.active
            .get(&(record_id.clone(), field.to_string()))
            .map(|&pos| &self.entries[pos])
    }

    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn contains(&self, run_id: &str, id: CorrectionId) -> bool {
        self.recorded.contains(&(run_id.to_string(), id))
    }

    /// True when any entry was written under `run_id`.
    pub fn has_run(&self, run_id: &str) -> bool {
        self.recorded.iter().any(|(run, _)| run == run_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::correction::{Decision, Dimension, Strategy};
    use crate::domain::dataset::Value;
    use anyhow::Result;
    use chrono::Duration;

    fn correction(id: u32, value: f64) -> Correction {
        Correction::propose(
            CorrectionId(id),
            "p1".into(),
            "height_cm",
            0,
            Dimension::Completeness,
            Value::Null,
            Value::Number(value),
            Strategy::Median,
            vec![],
        )
    }

    fn decided(id: u32, value: f64, decision: Decision) -> Correction {
        let mut c = correction(id, value);
        c.decide(decision, DecidedBy::Human).unwrap();
        c
    }

    fn version(run: &str) -> CalcVersion {
        CalcVersion::new("1", "abc", run)
    }

    #[test]
    fn test_rejects_proposed_and_duplicates() -> Result<()> {
        let mut ledger = AuditLedger::new();
        assert!(matches!(
            ledger.record(&correction(1, 170.0), DecidedBy::Automatic, &version("r1")),
            Err(DomainError::LedgerConsistency(_))
        ));

        let c = decided(1, 170.0, Decision::Accept);
        ledger.record(&c, DecidedBy::Human, &version("r1"))?;
        assert!(matches!(
            ledger.record(&c, DecidedBy::Human, &version("r1")),
            Err(DomainError::LedgerConsistency(_))
        ));
        assert_eq!(ledger.len(), 1);
        Ok(())
    }

    #[test]
    fn test_supersession_keeps_history() -> Result<()> {
        let mut ledger = AuditLedger::new();
        let first = decided(1, 170.0, Decision::Accept);
        ledger.record(&first, DecidedBy::Human, &version("r1"))?;

        let rejected = decided(1, 150.0, Decision::Reject);
        ledger.record(&rejected, DecidedBy::Human, &version("r2"))?;
        assert_eq!(ledger.active(&"p1".into(), "height_cm").unwrap().seq, 1);

        let second = decided(2, 0.0, Decision::Override(Value::Number(175.0)));
        let entry = ledger.record(&second, DecidedBy::Human, &version("r2"))?;
        assert_eq!(entry.supersedes, Some(1));

        let history = ledger.history(&"p1".into(), "height_cm");
        assert_eq!(history.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(ledger.active(&"p1".into(), "height_cm").unwrap().seq, 3);
        Ok(())
    }

    #[test]
    fn test_timestamps_never_go_backwards() -> Result<()> {
        let mut ledger = AuditLedger::new();
        let now = Utc::now();
        ledger.record_at(&decided(1, 1.0, Decision::Accept), DecidedBy::Human, &version("r"), now)?;
        let entry = ledger.record_at(
            &decided(2, 2.0, Decision::Accept),
            DecidedBy::Human,
            &version("r"),
            now - Duration::seconds(30),
        )?;
        assert_eq!(entry.timestamp, now);
        Ok(())
    }

    #[test]
    fn test_serialized_ledger_rebuilds_indexes() -> Result<()> {
        let mut ledger = AuditLedger::new();
        ledger.record(&decided(1, 170.0, Decision::Accept), DecidedBy::Automatic, &version("r1"))?;

        let json = serde_json::to_string(&ledger)?;
        assert!(json.starts_with("{\"entries\":"));
        let restored: AuditLedger = serde_json::from_str(&json)?;
        assert_eq!(restored, ledger);
        assert!(restored.active(&"p1".into(), "height_cm").is_some());
        assert!(restored.contains("r1", CorrectionId(1)));
        assert!(restored.has_run("r1"));
        assert!(!restored.has_run("r2"));
        Ok(())
    }
}
