//! Mizan CLI library: command implementations and terminal output helpers.

pub mod commands;
pub mod output;
pub mod workspace;

pub use output::OutputFormat;
pub use workspace::Workspace;
