pub mod config;
pub mod error;
pub mod db;
pub mod bench;
pub mod retrieve;
pub mod eval;
pub mod report;
pub mod harness;

pub use config::Config;
pub use error::{RagbenchError, Result};
pub use harness::{Harness, RunOutcome};
