//! Ledger module
//!
//! Per-schema registry of scratch tables and their expiry dates.

pub mod ledger;

pub use ledger::{LedgerEntry, TableLedger};
