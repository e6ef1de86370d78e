//! tablekeeper - scratch-table bookkeeping for shared SQL databases
//!
//! This library tracks tables that users create by hand in PostgreSQL and
//! SQL Server databases, so they can be expired and dropped later:
//! - SQL analysis (lexer, table identifiers, statement classifier)
//! - Backend dialects and connections
//! - Per-schema table ledger
//! - Managed sessions that keep the ledger in step with executed batches
//! - Detection and termination of blocking sessions

pub mod backend;
pub mod blocking;
pub mod dialect;
pub mod error;
pub mod ledger;
pub mod session;
pub mod sql;

pub use dialect::{Dialect, DialectKind};
pub use error::{Error, Result};
pub use session::{Session, SessionConfig};
