// healthdq-core/src/domain/dataset/snapshot.rs

use super::record::{Record, RecordId};
use super::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaFingerprint(pub String);

impl SchemaFingerprint {
    /// SHA-256 over the sorted, newline-joined field names.
    pub fn of_fields<'a>(fields: impl IntoIterator<Item = &'a String>) -> Self {
        let sorted: BTreeSet<&String> = fields.into_iter().collect();
        let mut hasher = Sha256::new();
        for name in sorted {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for SchemaFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single cell write, produced from an accepted correction.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdit {
    pub record_id: RecordId,
    pub field: String,
    pub value: Value,
}

/// Immutable snapshot of the records under evaluation.
/// Applying edits yields a new snapshot, the original is never touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    records: Vec<Record>,
    fingerprint: SchemaFingerprint,
}

impl Dataset {
    pub fn new(records: Vec<Record>) -> Self {
        let fingerprint = Self::fingerprint_of(&records);
        Self {
            records,
            fingerprint,
        }
    }

    fn fingerprint_of(records: &[Record]) -> SchemaFingerprint {
        let names: BTreeSet<&String> = records.iter().flat_map(|r| r.field_names()).collect();
        SchemaFingerprint::of_fields(names)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn fingerprint(&self) -> &SchemaFingerprint {
        &self.fingerprint
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// First record id seen twice, in row order.
    pub fn duplicate_id(&self) -> Option<&RecordId> {
        let mut seen = HashSet::new();
        self.records.iter().map(|r| &r.id).find(|id| !seen.insert(*id))
    }

    /// Every value stored under `field`, absent cells included as null.
    pub fn column<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.records.iter().map(move |r| r.value(field))
    }

    /// Edits land on the first record with a matching id, the same one `get` returns.
    pub fn apply(&self, edits: &[CellEdit]) -> Dataset {
        let positions: HashMap<&RecordId, usize> = self
            .records
            .iter()
            .enumerate()
            .rev()
            .map(|(i, r)| (&r.id, i))
            .collect();

        let mut records = self.records.clone();
        for edit in edits {
            if let Some(&idx) = positions.get(&edit.record_id) {
                records[idx].set(&edit.field, edit.value.clone());
            } else {
                tracing::warn!(record = %edit.record_id, field = %edit.field, "Edit targets an unknown record, skipped");
            }
        }
        Dataset::new(records)
    }
}
