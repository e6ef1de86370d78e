//! Blocking module
//!
//! Lock-graph inspection and termination of blocking sessions.

pub mod detector;

pub use detector::{BlockingDetector, BlockingEdge, TerminateOutcome};
