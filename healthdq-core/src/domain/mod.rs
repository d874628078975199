pub mod audit;
pub mod correction;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod rules;

// Re-exports to keep imports short elsewhere
pub use error::DomainError;
