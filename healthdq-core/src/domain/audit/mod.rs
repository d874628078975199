// healthdq-core/src/domain/audit/mod.rs

pub mod ledger;
pub mod version;

pub use ledger::{AuditEntry, AuditLedger};
pub use version::{CalcVersion, ENGINE_VERSION};
