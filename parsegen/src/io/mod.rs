//! Side-effecting operations: filesystem layout, config, subprocesses,
//! backend invocation, and run artifact persistence.

pub mod backend;
pub mod config;
pub mod paths;
pub mod process;
pub mod prompt;
pub mod report;
pub mod sandbox;
pub mod target;
