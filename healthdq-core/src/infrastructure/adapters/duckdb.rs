// healthdq-core/src/infrastructure/adapters/duckdb.rs

use async_trait::async_trait;
use duckdb::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::{Row, rows_to_dataset};
use crate::domain::dataset::{Dataset, Value};
use crate::error::QualityError;
use crate::infrastructure::error::InfrastructureError;
use crate::ports::RecordSource;

/// CSV files read through DuckDB's `read_csv_auto`.
/// Every column is read as text; numeric text becomes a number afterwards,
/// so a stray "n/a" in a numeric column stays visible instead of failing the load.
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    #[instrument(skip(self), fields(path = ?self.path))]
    async fn load(&self, id_field: Option<&str>) -> Result<Dataset, QualityError> {
        if !self.path.is_file() {
            return Err(InfrastructureError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("CSV file not found: {}", self.path.display()),
            ))
            .into());
        }

        // DuckDB is synchronous
        let path = self.path.clone();
        let rows = tokio::task::spawn_blocking(move || read_csv(&path))
            .await
            .map_err(|e| QualityError::Internal(format!("CSV reader task failed: {}", e)))??;
        debug!(rows = rows.len(), "CSV loaded");

        rows_to_dataset(rows, id_field).map_err(|reason| {
            InfrastructureError::Source {
                path: self.path.display().to_string(),
                reason,
            }
            .into()
        })
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

fn read_csv(path: &Path) -> Result<Vec<Row>, InfrastructureError> {
    let conn = Connection::open_in_memory()?;
    let query = format!(
        "SELECT * FROM read_csv_auto('{}', all_varchar = true)",
        path.to_string_lossy().replace('\'', "''")
    );

    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query([])?;
    let columns: Vec<String> = rows
        .as_ref()
        .map(|s| s.column_names())
        .unwrap_or_default();

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut fields = Row::new();
        for (i, name) in columns.iter().enumerate() {
            let raw: Option<String> = row.get(i)?;
            let value = raw.map_or(Value::Null, |s| Value::from_raw_text(&s));
            fields.insert(name.clone(), value);
        }
        out.push(fields);
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_csv_values_are_coerced() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("records.csv");
        std::fs::write(
            &path,
            "patient_id,height_cm,weight_kg,sex_at_birth\np1,,70,M\np2,1.7 m,n/a,female\n",
        )?;

        let ds = CsvRecordSource::new(&path).load(Some("patient_id")).await?;
        assert_eq!(ds.len(), 2);

        let p1 = ds.get(&"p1".into()).unwrap();
        assert!(p1.is_missing("height_cm"));
        assert_eq!(p1.value("weight_kg"), &Value::Number(70.0));

        let p2 = ds.get(&"p2".into()).unwrap();
        assert_eq!(p2.value("height_cm"), &Value::Text("1.7 m".into()));
        assert_eq!(p2.value("weight_kg"), &Value::Text("n/a".into()));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file() {
        let source = CsvRecordSource::new("/definitely/not/here.csv");
        assert!(source.load(None).await.is_err());
        assert!(source.describe().starts_with("csv:"));
    }
}
