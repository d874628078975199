// healthdq-core/src/lib.rs

#![allow(missing_docs)]
// Memory safety
#![deny(unsafe_code)]
// Robustness
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (Interfaces / Traits)
// Record sources and artifact sinks the application talks to.
pub mod ports;

// 2. Domain
// Rules, detection, correction agents, audit ledger, metrics.
// Depends on nothing else in the crate.
pub mod domain;

// 3. Infrastructure (Adapters)
// YAML config, JSON/FHIR/CSV loaders, filesystem sink, checkpoints.
pub mod infrastructure;

// 4. Application (Use Cases)
// Proposal engine and the pipeline state machine.
pub mod application;

pub mod error;

// --- RE-EXPORTS (FACADE) ---
pub use error::QualityError;
