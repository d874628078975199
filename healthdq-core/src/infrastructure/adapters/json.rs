// healthdq-core/src/infrastructure/adapters/json.rs

use async_trait::async_trait;
use serde_json::Value as Json;
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::{Row, fhir, json_to_value, rows_to_dataset};
use crate::domain::dataset::Dataset;
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::RecordSource;

/// Plain JSON records: `[{...}, ...]` or `{"records": [{...}, ...]}`.
/// Files carrying a FHIR `resourceType` are handed to the FHIR mapping.
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn malformed(&self, reason: impl Into<String>) -> QualityError {
        InfrastructureError::Source {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
        .into()
    }
}

#[async_trait]
impl RecordSource for JsonRecordSource {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self, id_field: Option<&str>) -> Result<Dataset, QualityError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(InfrastructureError::Io)?;
        let document: Json = serde_json::from_str(&content).map_err(InfrastructureError::Json)?;

        if document.get("resourceType").is_some() {
            debug!("FHIR resource detected");
            let rows = fhir::patient_rows(&document).map_err(|r| self.malformed(r))?;
            return rows_to_dataset(rows, Some(id_field.unwrap_or("patient_id")))
                .map_err(|r| self.malformed(r));
        }

        let items = match document {
            Json::Array(items) => items,
            Json::Object(mut map) => match map.remove("records") {
                Some(Json::Array(items)) => items,
                _ => return Err(self.malformed("expected a \"records\" array")),
            },
            _ => return Err(self.malformed("expected an array of objects")),
        };

        let mut rows = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let Json::Object(map) = item else {
                return Err(self.malformed(format!("record #{} is not an object", i + 1)));
            };
            rows.push(
                map.into_iter()
                    .map(|(k, v)| (k, json_to_value(v)))
                    .collect::<Row>(),
            );
        }
        rows_to_dataset(rows, id_field).map_err(|r| self.malformed(r))
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::Value;
    use anyhow::Result;
    use tempfile::tempdir;

    async fn load(body: &str, id_field: Option<&str>) -> Result<Dataset, QualityError> {
        let dir = tempdir()?;
        let path = dir.path().join("records.json");
        std::fs::write(&path, body)?;
        JsonRecordSource::new(&path).load(id_field).await
    }

    #[tokio::test]
    async fn test_array_and_wrapped_forms() -> Result<()> {
        let ds = load(r#"[{"patient_id": "p1", "height_cm": 170, "note": ""}]"#, Some("patient_id")).await?;
        let record = &ds.records()[0];
        assert_eq!(record.id.0, "p1");
        assert_eq!(record.value("height_cm"), &Value::Number(170.0));
        assert!(record.is_missing("note"));

        let ds = load(r#"{"records": [{"a": 1}, {"a": null}]}"#, None).await?;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records()[1].id.0, "row-2");
        Ok(())
    }

    #[tokio::test]
    async fn test_fhir_bundle_is_detected() -> Result<()> {
        let body = r#"{"resourceType": "Bundle", "entry": [{"resource": {"resourceType": "Patient", "id": "x9", "gender": "male"}}]}"#;
        let ds = load(body, None).await?;
        assert_eq!(ds.records()[0].id.0, "x9");
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let err = load(r#"[1, 2]"#, None).await.unwrap_err();
        assert!(matches!(
            err,
            QualityError::Infrastructure(InfrastructureError::Source { .. })
        ));
        assert!(load("{ nope", None).await.is_err());
    }

    #[tokio::test]
    async fn test_repeated_record_ids_are_refused() {
        let body = r#"[
            {"patient_id": "p1", "height_cm": null},
            {"patient_id": "p2", "height_cm": 160},
            {"patient_id": "p1", "height_cm": 180}
        ]"#;
        match load(body, Some("patient_id")).await {
            Err(QualityError::Infrastructure(InfrastructureError::Source { reason, .. })) => {
                assert!(reason.contains("'p1' (rows 1 and 3)"), "{}", reason)
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
