//! Subcommand implementations

pub mod checkpoint;
pub mod compose;
pub mod config;
pub mod doctor;
pub mod run;
