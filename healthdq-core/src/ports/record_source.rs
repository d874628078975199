// healthdq-core/src/ports/record_source.rs

// What the pipeline needs to get records in. The adapter decides where they come from
// (JSON file, FHIR bundle, CSV through DuckDB...).

use crate::domain::dataset::Dataset;
use crate::error::QualityError;
use async_trait::async_trait;

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Loads one immutable snapshot. `id_field` names the column holding record ids;
    /// records without one get positional ids (`row-1`, `row-2`...).
    async fn load(&self, id_field: Option<&str>) -> Result<Dataset, QualityError>;

    /// Short label for logs ("json:data/records.json").
    fn describe(&self) -> String;
}
