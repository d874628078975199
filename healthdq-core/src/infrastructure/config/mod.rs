// healthdq-core/src/infrastructure/config/mod.rs

pub mod rules;

pub use rules::{load_registry, load_rule_document};
