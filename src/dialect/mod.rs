//! Backend dialects
//!
//! Everything that differs between the PostgreSQL family and the T-SQL
//! family lives behind the [`Dialect`] trait: identifier quoting and folding,
//! temp-table conventions, the ledger statements and the lock-graph queries.
//! The classifier, ledger and blocking detector are written once against it.

pub mod postgres;
pub mod sqlserver;

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use postgres::Postgres;
pub use sqlserver::SqlServer;

/// Identifier delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuoteStyle {
    /// `[name]`
    Bracket,
    /// `"name"`
    DoubleQuote,
}

impl QuoteStyle {
    /// Opening and closing delimiter
    pub fn delimiters(self) -> (char, char) {
        match self {
            QuoteStyle::Bracket => ('[', ']'),
            QuoteStyle::DoubleQuote => ('"', '"'),
        }
    }

    /// Wrap a name in this style, doubling any embedded closing delimiter
    pub fn quote(self, name: &str) -> String {
        let (open, close) = self.delimiters();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(open);
        for ch in name.chars() {
            if ch == close {
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
        out
    }
}

/// Supported backend families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    SqlServer,
}

impl DialectKind {
    /// The dialect implementation for this kind
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &Postgres,
            DialectKind::SqlServer => &SqlServer,
        }
    }

    /// Parse a dialect name or URL scheme
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "sqlserver" | "mssql" | "tsql" => Ok(DialectKind::SqlServer),
            other => Err(Error::Config(format!("unknown dialect '{}'", other))),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Postgres => write!(f, "postgres"),
            DialectKind::SqlServer => write!(f, "sqlserver"),
        }
    }
}

/// A ledger table resolved for one schema (and, for T-SQL, one user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTable {
    /// Schema the ledger lives in
    pub schema: String,
    /// Unqualified ledger table name
    pub name: String,
    /// Quoted, fully qualified name ready for SQL text
    pub qualified: String,
}

/// Capabilities and statement text for one backend family
pub trait Dialect: fmt::Debug + Send + Sync {
    fn kind(&self) -> DialectKind;

    // ========== Identifiers ==========

    /// Delimiter used when rendering bare identifiers, if any
    fn quote_style(&self) -> Option<QuoteStyle>;

    /// Delimiters accepted around identifiers
    fn identifier_quotes(&self) -> &'static [QuoteStyle];

    /// Maximum number of dot-separated segments in a table reference
    fn identifier_max_segments(&self) -> usize;

    /// Table-name prefixes marking session temp tables
    fn temp_table_sigils(&self) -> &'static [&'static str];

    /// Default schema for unqualified names
    fn default_schema(&self) -> &'static str;

    /// Whether quoted identifiers compare case-sensitively
    fn quoted_identifiers_case_sensitive(&self) -> bool;

    /// Whether `$tag$ ... $tag$` string literals exist
    fn dollar_quoting(&self) -> bool {
        false
    }

    /// Whether `SELECT ... INTO` takes `TEMP`, `TEMPORARY` or `UNLOGGED`
    /// before the table name
    fn select_into_modifiers(&self) -> bool {
        false
    }

    /// Fold a bare identifier to the dialect's default case
    fn fold_case(&self, name: &str) -> String {
        name.to_lowercase()
    }

    /// Quote a name for use in generated SQL
    fn quote_identifier(&self, name: &str) -> String {
        match self.quote_style() {
            Some(style) => style.quote(name),
            None => QuoteStyle::DoubleQuote.quote(name),
        }
    }

    // ========== Ledger ==========

    /// The ledger table for `schema`, owned by `user`
    fn ledger_table(&self, schema: &str, user: &str) -> LedgerTable;

    /// Idempotent create-if-absent of the ledger, plus read grant
    fn ledger_ddl(&self, ledger: &LedgerTable) -> String;

    /// Atomic insert-or-overwrite keyed on (table_schema, table_name)
    fn upsert_statement(
        &self,
        ledger: &LedgerTable,
        owner: &str,
        table: &str,
        created_on: NaiveDateTime,
        expires: NaiveDate,
    ) -> String;

    fn delete_statement(&self, ledger: &LedgerTable, table: &str) -> String;

    /// Rows `(table_schema, table_name)` expiring strictly before `today`
    fn expired_query(&self, ledger: &LedgerTable, today: NaiveDate) -> String;

    /// Rows `(table_owner, table_schema, table_name, created_on, expires)`
    fn entries_query(&self, ledger: &LedgerTable) -> String;

    fn drop_table_statement(&self, schema: &str, table: &str) -> String {
        format!(
            "DROP TABLE IF EXISTS {}.{}",
            self.quote_identifier(schema),
            self.quote_identifier(table)
        )
    }

    // ========== Sessions ==========

    fn current_user_query(&self) -> &'static str;

    fn session_id_query(&self) -> &'static str;

    /// Lock-manager self-join: rows `(blocked_session, blocked_user,
    /// blocking_session, blocking_user, blocked_statement,
    /// blocking_statement)` for ungranted waiters owned by the current user
    fn lock_graph_query(&self) -> &'static str;

    fn terminate_statement(&self, session_id: i64) -> String;

    /// Whether a terminate failure means the session no longer exists
    fn is_session_gone(&self, message: &str) -> bool;
}

/// Render a string as a single-quoted SQL literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
