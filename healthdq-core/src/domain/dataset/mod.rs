// healthdq-core/src/domain/dataset/mod.rs

pub mod record;
pub mod snapshot;
pub mod value;

pub use record::{Record, RecordId};
pub use snapshot::{CellEdit, Dataset, SchemaFingerprint};
pub use value::{Value, round_to};
