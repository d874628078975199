// healthdq-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB Engine Error: {0}")]
    #[diagnostic(
        code(healthdq::infra::database::duckdb),
        help("DuckDB could not read the input. Check the CSV header and delimiter.")
    )]
    DuckDB(#[from] duckdb::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- DATABASE (CSV ingestion) ---
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(healthdq::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(healthdq::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(healthdq::infra::json))]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(healthdq::infra::config))]
    ConfigError(String),

    #[error("Rule document not found at '{0}'")]
    #[diagnostic(code(healthdq::infra::config_missing))]
    ConfigNotFound(String),

    // --- INPUT FILES ---
    #[error("Malformed input '{path}': {reason}")]
    #[diagnostic(
        code(healthdq::infra::source),
        help("JSON input must be an array of objects, {{\"records\": [...]}} or a FHIR Bundle, with unique record ids.")
    )]
    Source { path: String, reason: String },
}

// Shortcut for `?` on duckdb calls
impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDB(err))
    }
}
