//! Interaction event audit CLI library.
//!
//! This crate provides the CLI interface, the pipeline driver and the report
//! files for analysing interaction archives.

mod cli;
pub mod commands;
mod config;
pub mod pipeline;
pub mod report;

pub use cli::{Cli, Commands};
pub use config::Config;
