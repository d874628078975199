// healthdq/src/commands/mod.rs

pub mod check;
pub mod decide;
pub mod history;
pub mod resume;
pub mod run;
