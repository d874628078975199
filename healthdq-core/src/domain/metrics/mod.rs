// healthdq-core/src/domain/metrics/mod.rs

pub mod engine;
pub mod snapshot;

pub use engine::MetricsEngine;
pub use snapshot::{MetricDelta, MetricName, MetricSnapshot, Ratio, Stage, delta, percent_change};
