//! Session module
//!
//! Configuration and the managed session that runs batches.

pub mod config;
pub mod session;

pub use config::{SessionConfig, DEFAULT_TTL_DAYS};
pub use session::{expiry_date, BatchPhase, ExecutionResult, PurgeReport, Session};
