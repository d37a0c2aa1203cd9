// Library module for bucketsync
// Re-exports modules for use in integration tests and the CLI

pub mod config;
pub mod display;
pub mod error;
pub mod fs;
pub mod sync;

pub use error::{Result, SyncError};
