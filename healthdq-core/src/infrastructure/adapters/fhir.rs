// healthdq-core/src/infrastructure/adapters/fhir.rs

use async_trait::async_trait;
use serde_json::Value as Json;
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::{Row, json_to_value, rows_to_dataset};
use crate::domain::dataset::{Dataset, Value};
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::RecordSource;

/// FHIR element → record field. Everything else on the resource is ignored.
const PATIENT_FIELDS: [(&str, &str); 3] = [
    ("id", "patient_id"),
    ("gender", "sex_at_birth"),
    ("birthDate", "birth_date"),
];

/// A FHIR `Bundle` (or a single resource) holding `Patient` resources.
pub struct FhirBundleSource {
    path: PathBuf,
}

impl FhirBundleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for FhirBundleSource {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self, id_field: Option<&str>) -> Result<Dataset, QualityError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(InfrastructureError::Io)?;
        let bundle: Json = serde_json::from_str(&content).map_err(InfrastructureError::Json)?;
        let malformed = |reason| InfrastructureError::Source {
            path: self.path.display().to_string(),
            reason,
        };
        let rows = patient_rows(&bundle).map_err(malformed)?;
        Ok(rows_to_dataset(rows, Some(id_field.unwrap_or("patient_id"))).map_err(malformed)?)
    }

    fn describe(&self) -> String {
        format!("fhir:{}", self.path.display())
    }
}

/// Flattens the `Patient` resources of a bundle. Errors when there are none.
pub fn patient_rows(document: &Json) -> Result<Vec<Row>, String> {
    let resources: Vec<&Json> = match document.get("resourceType").and_then(Json::as_str) {
        Some("Bundle") => document
            .get("entry")
            .and_then(Json::as_array)
            .map(|entries| entries.iter().filter_map(|e| e.get("resource")).collect())
            .unwrap_or_default(),
        Some(_) => vec![document],
        None => return Err("not a FHIR resource (no resourceType)".into()),
    };

    let rows: Vec<Row> = resources
        .into_iter()
        .filter(|r| r.get("resourceType").and_then(Json::as_str) == Some("Patient"))
        .map(patient_row)
        .collect();
    debug!(patients = rows.len(), "FHIR bundle flattened");

    if rows.is_empty() {
        return Err("bundle contains no Patient resource".into());
    }
    Ok(rows)
}

fn patient_row(resource: &Json) -> Row {
    PATIENT_FIELDS
        .iter()
        .map(|(element, field)| {
            let value = resource
                .get(*element)
                .cloned()
                .map_or(Value::Null, json_to_value);
            (field.to_string(), value)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use tempfile::tempdir;

    fn bundle() -> Json {
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": [
                { "resource": { "resourceType": "Patient", "id": "p1", "gender": "female", "birthDate": "1980-04-02" } },
                { "resource": { "resourceType": "Observation", "id": "o1" } },
                { "resource": { "resourceType": "Patient", "id": "p2", "gender": "M" } }
            ]
        })
    }

    #[test]
    fn test_only_patients_are_kept() {
        let rows = patient_rows(&bundle()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["sex_at_birth"], Value::Text("female".into()));
        assert_eq!(rows[1]["birth_date"], Value::Null);
    }

    #[test]
    fn test_bundle_without_patients_is_an_error() {
        let empty = json!({ "resourceType": "Bundle", "entry": [] });
        assert!(patient_rows(&empty).is_err());
        assert!(patient_rows(&json!({ "id": 1 })).is_err());
    }

    #[tokio::test]
    async fn test_load_uses_patient_id() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bundle.json");
        std::fs::write(&path, bundle().to_string())?;

        let ds = FhirBundleSource::new(&path).load(None).await?;
        let ids: Vec<&str> = ds.records().iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
        Ok(())
    }
}
