//! Table ledger
//!
//! The ledger is a real table inside each schema that records which scratch
//! tables exist, who made them and when they expire. It is created lazily
//! the first time a schema is touched.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{Connection, Row};
use crate::dialect::{Dialect, LedgerTable};
use crate::error::{Error, Result};

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub owner: String,
    pub schema: String,
    pub table: String,
    pub created_on: NaiveDateTime,
    pub expires: NaiveDate,
}

impl LedgerEntry {
    /// Whether the entry is due for purge on `today`
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires < today
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            owner: row.require(0, "table_owner")?.to_string(),
            schema: row.require(1, "table_schema")?.to_string(),
            table: row.require(2, "table_name")?.to_string(),
            created_on: parse_timestamp(row.require(3, "created_on")?)?,
            expires: parse_date(row.require(4, "expires")?)?,
        })
    }
}

/// Ledger operations for one owner on one backend
#[derive(Debug)]
pub struct TableLedger {
    dialect: &'static dyn Dialect,
    owner: String,
    /// Schemas whose ledger is known to exist
    ensured: HashSet<String>,
}

impl TableLedger {
    pub fn new(dialect: &'static dyn Dialect, owner: impl Into<String>) -> Self {
        Self {
            dialect,
            owner: owner.into(),
            ensured: HashSet::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The ledger table backing `schema`
    pub fn table_for(&self, schema: &str) -> LedgerTable {
        self.dialect.ledger_table(schema, &self.owner)
    }

    /// Create the ledger for `schema` if it does not exist
    pub async fn ensure_ledger(&mut self, conn: &mut dyn Connection, schema: &str) -> Result<()> {
        let ledger = self.table_for(schema);
        conn.execute_batch(&self.dialect.ledger_ddl(&ledger))
            .await
            .map_err(|e| Error::LedgerUnavailable {
                ledger: ledger.qualified.clone(),
                reason: e.to_string(),
            })?;
        self.ensured.insert(schema.to_string());
        debug!(ledger = %ledger.qualified, "ledger ready");
        Ok(())
    }

    /// Insert or overwrite the entry for `(entry.schema, entry.table)`
    pub async fn upsert(&mut self, conn: &mut dyn Connection, entry: &LedgerEntry) -> Result<()> {
        let ledger = self.table_for(&entry.schema);
        let sql = self.dialect.upsert_statement(
            &ledger,
            &entry.owner,
            &entry.table,
            entry.created_on,
            entry.expires,
        );
        self.write(conn, &entry.schema, &sql).await?;
        debug!(
            ledger = %ledger.qualified,
            table = %entry.table,
            expires = %entry.expires,
            "registered table"
        );
        Ok(())
    }

    /// Delete the entry for `(schema, table)` and return the number of rows
    /// deleted; a missing entry is fine and deletes nothing
    pub async fn remove(&mut self, conn: &mut dyn Connection, schema: &str, table: &str) -> Result<u64> {
        let ledger = self.table_for(schema);
        let sql = self.dialect.delete_statement(&ledger, table);
        let deleted = self.write(conn, schema, &sql).await?;
        debug!(ledger = %ledger.qualified, table, deleted, "unregistered table");
        Ok(deleted)
    }

    /// Entries expiring strictly before `today`. Nothing is deleted.
    pub async fn purge_expired(
        &mut self,
        conn: &mut dyn Connection,
        schema: &str,
        today: NaiveDate,
    ) -> Result<Vec<(String, String)>> {
        self.ensure_cached(conn, schema).await?;
        let sql = self.dialect.expired_query(&self.table_for(schema), today);
        let rows = conn.query(&sql).await?;
        rows.iter()
            .map(|row| {
                Ok((
                    row.require(0, "table_schema")?.to_string(),
                    row.require(1, "table_name")?.to_string(),
                ))
            })
            .collect()
    }

    /// All entries in the ledger for `schema`
    pub async fn entries(&mut self, conn: &mut dyn Connection, schema: &str) -> Result<Vec<LedgerEntry>> {
        self.ensure_cached(conn, schema).await?;
        let sql = self.dialect.entries_query(&self.table_for(schema));
        let rows = conn.query(&sql).await?;
        rows.iter().map(LedgerEntry::from_row).collect()
    }

    async fn ensure_cached(&mut self, conn: &mut dyn Connection, schema: &str) -> Result<()> {
        if self.ensured.contains(schema) {
            return Ok(());
        }
        self.ensure_ledger(conn, schema).await
    }

    /// Run a ledger write. If the ledger was assumed to exist and the write
    /// fails, it may have been dropped underneath us: recreate and retry once.
    async fn write(&mut self, conn: &mut dyn Connection, schema: &str, sql: &str) -> Result<u64> {
        let was_cached = self.ensured.contains(schema);
        self.ensure_cached(conn, schema).await?;

        match conn.execute(sql).await {
            Ok(affected) => Ok(affected),
            Err(e) if was_cached => {
                warn!(schema, error = %e, "ledger write failed, re-creating ledger");
                self.ensured.remove(schema);
                self.ensure_ledger(conn, schema).await?;
                conn.execute(sql).await
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| Error::UnexpectedRow(format!("invalid timestamp '{}'", text)))
}

fn parse_date(text: &str) -> Result<NaiveDate> {
    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .ok_or_else(|| Error::UnexpectedRow(format!("invalid date '{}'", text)))
}
