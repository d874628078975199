// healthdq-core/src/domain/correction/mod.rs

pub mod agents;
pub mod imputation;
pub mod model;
pub mod unresolved;

pub use agents::{
    CompletenessAgent, CorrectionAgent, PrecisionAgent, Proposals, ReusabilityAgent,
};
pub use imputation::{Imputed, Imputer};
pub use model::{
    Correction, CorrectionId, CorrectionIdSeq, CorrectionStatus, DecidedBy, Decision, Dimension,
    Strategy,
};
pub use unresolved::{UnresolvedIssue, UnresolvedReason};
