//! Command-line interface for the watch engine.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
