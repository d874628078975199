// healthdq-core/src/infrastructure/store/mod.rs

pub mod artifacts;
pub mod ledger;

pub use artifacts::FsArtifactSink;
pub use ledger::load_ledger;
