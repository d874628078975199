// healthdq-core/src/ports/mod.rs

pub mod artifact_sink;
pub mod record_source;

pub use artifact_sink::ArtifactSink;
pub use record_source::RecordSource;
