// healthdq-core/src/infrastructure/adapters/mod.rs

pub mod duckdb;
pub mod fhir;
pub mod json;

pub use self::duckdb::CsvRecordSource;
pub use fhir::FhirBundleSource;
pub use json::JsonRecordSource;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::domain::dataset::{Dataset, Record, RecordId, Value};
use crate::ports::RecordSource;

/// One input row before it gets an id.
pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceFormat {
    /// Guess from the file extension.
    #[default]
    Auto,
    Json,
    Fhir,
    Csv,
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "json" => Ok(Self::Json),
            "fhir" => Ok(Self::Fhir),
            "csv" => Ok(Self::Csv),
            other => Err(format!(
                "unknown input format '{}' (expected auto, json, fhir or csv)",
                other
            )),
        }
    }
}

/// Picks the adapter for `path`.
pub fn source_for(path: &Path, format: SourceFormat) -> Box<dyn RecordSource> {
    let path: PathBuf = path.to_path_buf();
    let format = match format {
        SourceFormat::Auto => match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => SourceFormat::Csv,
            _ => SourceFormat::Json,
        },
        other => other,
    };
    match format {
        SourceFormat::Csv => Box::new(CsvRecordSource::new(path)),
        SourceFormat::Fhir => Box::new(FhirBundleSource::new(path)),
        _ => Box::new(JsonRecordSource::new(path)),
    }
}

/// Assigns ids and freezes rows into a snapshot.
/// The id comes from `id_field` when the row has one, else `row-N` (1-based).
/// A repeated id is an error naming both rows.
pub fn rows_to_dataset(rows: Vec<Row>, id_field: Option<&str>) -> Result<Dataset, String> {
    let mut first_row: HashMap<RecordId, usize> = HashMap::new();
    let mut records = Vec::with_capacity(rows.len());
    for (i, fields) in rows.into_iter().enumerate() {
        let id = id_field
            .and_then(|f| fields.get(f))
            .filter(|v| !v.is_missing())
            .map(|v| RecordId(v.render()))
            .unwrap_or_else(|| RecordId(format!("row-{}", i + 1)));
        if let Some(first) = first_row.insert(id.clone(), i + 1) {
            return Err(format!(
                "duplicate record id '{}' (rows {} and {})",
                id,
                first,
                i + 1
            ));
        }
        records.push(
            fields
                .into_iter()
                .fold(Record::new(id), |record, (k, v)| record.with(&k, v)),
        );
    }
    Ok(Dataset::new(records))
}

/// JSON scalars map one to one; nested arrays and objects are kept as their JSON text.
pub fn json_to_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
        serde_json::Value::String(s) => Value::Text(s),
        nested => Value::Text(nested.to_string()),
    }
}
