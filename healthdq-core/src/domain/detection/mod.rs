// healthdq-core/src/domain/detection/mod.rs

pub mod detector;
pub mod violation;

pub use detector::ViolationDetector;
pub use violation::{Violation, ViolationDetail};
