//! Managed database session
//!
//! A [`Session`] owns one backend connection and ties the classifier, the
//! ledger and the blocking detector together. Each executed batch moves
//! through `Classifying -> Executing -> Registering | Failed`: intent is
//! known before the batch runs, and the ledger is only touched once the
//! backend has accepted the whole batch.

use std::fmt;

use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::SessionConfig;
use crate::backend::{self, query_scalar, Connection};
use crate::blocking::{BlockingDetector, BlockingEdge};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::ledger::{LedgerEntry, TableLedger};
use crate::sql::{classify, TableAction, TableEvent, TableIdentifier};

/// Where the session is in handling a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchPhase {
    Idle,
    Classifying,
    Executing,
    Registering,
    Failed,
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchPhase::Idle => "idle",
            BatchPhase::Classifying => "classifying",
            BatchPhase::Executing => "executing",
            BatchPhase::Registering => "registering",
            BatchPhase::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of one executed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Tables the batch created
    pub created: Vec<TableIdentifier>,
    /// Tables the batch dropped, as written
    pub dropped: Vec<TableIdentifier>,
    /// Ledger rows written
    pub registered: usize,
    /// Ledger rows actually deleted; dropping an unregistered table
    /// removes nothing
    pub removed: usize,
    /// Created on another server or database; not tracked by this ledger
    pub untracked: Vec<TableIdentifier>,
}

/// Outcome of a purge
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PurgeReport {
    /// Dropped and removed from the ledger
    pub purged: Vec<TableIdentifier>,
    /// Could not be dropped, with the reason; the ledger row stays
    pub skipped: Vec<(TableIdentifier, String)>,
}

/// A connection plus the scratch-table ledger that goes with it
pub struct Session {
    conn: Box<dyn Connection>,
    dialect: &'static dyn Dialect,
    config: SessionConfig,
    ledger: TableLedger,
    detector: BlockingDetector,
    phase: BatchPhase,
}

impl Session {
    /// Connect using `config.url`
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("no connection URL configured".to_string()))?;
        let conn = backend::connect(&url).await?;
        Self::with_connection(conn, config).await
    }

    /// Wrap an existing connection. The ledger owner is the backend's
    /// current user.
    pub async fn with_connection(mut conn: Box<dyn Connection>, mut config: SessionConfig) -> Result<Self> {
        config.dialect = conn.dialect();
        let dialect = config.dialect.dialect();
        let user = query_scalar(conn.as_mut(), dialect.current_user_query()).await?;
        info!(dialect = %config.dialect, %user, "session opened");

        Ok(Self {
            conn,
            dialect,
            config,
            ledger: TableLedger::new(dialect, user),
            detector: BlockingDetector::new(dialect),
            phase: BatchPhase::Idle,
        })
    }

    /// Close the underlying connection
    pub async fn close(self) -> Result<()> {
        debug!(user = %self.ledger.owner(), "closing session");
        self.conn.close().await
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current user; owner of every entry this session writes
    pub fn user(&self) -> &str {
        self.ledger.owner()
    }

    pub fn phase(&self) -> BatchPhase {
        self.phase
    }

    fn set_phase(&mut self, phase: BatchPhase) {
        debug!(from = %self.phase, to = %phase, "batch phase");
        self.phase = phase;
    }

    /// Run a batch and keep the ledger in step with the tables it creates and
    /// drops. On failure the backend error is returned untouched and the
    /// ledger is not modified.
    pub async fn execute(
        &mut self,
        batch: &str,
        default_schema: Option<&str>,
        ttl_days: Option<u32>,
    ) -> Result<ExecutionResult> {
        let default_schema = default_schema
            .map(str::to_string)
            .unwrap_or_else(|| self.config.effective_schema());

        self.set_phase(BatchPhase::Classifying);
        let classification = classify(batch, &default_schema, self.dialect);
        debug!(
            created = ?classification.created_names(),
            dropped = ?classification.dropped_names(),
            "classified batch"
        );

        self.set_phase(BatchPhase::Executing);
        if let Err(e) = self.conn.execute_batch(batch).await {
            self.set_phase(BatchPhase::Failed);
            warn!(error = %e, "batch failed, ledger untouched");
            return Err(e);
        }

        self.set_phase(BatchPhase::Registering);
        let mut result = ExecutionResult {
            created: classification.created.clone(),
            dropped: classification.dropped.clone(),
            ..Default::default()
        };
        let registered = self
            .apply_events(&classification.events, &default_schema, ttl_days, &mut result)
            .await;
        self.set_phase(BatchPhase::Idle);
        registered?;

        info!(
            registered = result.registered,
            removed = result.removed,
            "batch executed"
        );
        Ok(result)
    }

    /// Replay table events against the ledger in batch order, so a table
    /// created then dropped in one batch ends up unregistered
    async fn apply_events(
        &mut self,
        events: &[TableEvent],
        default_schema: &str,
        ttl_days: Option<u32>,
        result: &mut ExecutionResult,
    ) -> Result<()> {
        for event in events {
            if event.table.is_remote() {
                if event.action == TableAction::Created && !result.untracked.contains(&event.table) {
                    info!(table = %event.table, "table lives on another database, not tracked");
                    result.untracked.push(event.table.clone());
                }
                continue;
            }

            let schema = event
                .table
                .schema_name()
                .map(str::to_string)
                .unwrap_or_else(|| self.dialect.fold_case(default_schema));
            let table = event.table.table_name().to_string();

            match event.action {
                TableAction::Created => {
                    self.register(&schema, &table, ttl_days).await?;
                    result.registered += 1;
                }
                TableAction::Dropped => {
                    let deleted = self.ledger.remove(self.conn.as_mut(), &schema, &table).await?;
                    result.removed += deleted as usize;
                }
            }
        }
        Ok(())
    }

    /// Register a table created outside of `execute`, e.g. by a file import
    pub async fn register_table(
        &mut self,
        schema: &str,
        table: &str,
        ttl_days: Option<u32>,
    ) -> Result<LedgerEntry> {
        let id = parse_name(schema, table, self.dialect)?;
        let schema = id.schema_name().unwrap_or(schema).to_string();
        self.register(&schema, id.table_name(), ttl_days).await
    }

    /// Forget a table dropped outside of `execute`. Returns whether it had
    /// an entry.
    pub async fn unregister_table(&mut self, schema: &str, table: &str) -> Result<bool> {
        let id = parse_name(schema, table, self.dialect)?;
        let schema = id.schema_name().unwrap_or(schema).to_string();
        let deleted = self
            .ledger
            .remove(self.conn.as_mut(), &schema, id.table_name())
            .await?;
        Ok(deleted > 0)
    }

    async fn register(&mut self, schema: &str, table: &str, ttl_days: Option<u32>) -> Result<LedgerEntry> {
        let created_on = now();
        let ttl = ttl_days.unwrap_or(self.config.ttl_days);
        let entry = LedgerEntry {
            owner: self.ledger.owner().to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
            created_on,
            expires: expiry_date(created_on, ttl)?,
        };
        self.ledger.upsert(self.conn.as_mut(), &entry).await?;
        Ok(entry)
    }

    /// Drop every table in `schema` whose entry expired before today
    pub async fn purge_expired(&mut self, schema: &str) -> Result<PurgeReport> {
        self.purge_expired_before(schema, Local::now().date_naive()).await
    }

    /// Drop every table in `schema` whose entry expires strictly before
    /// `today`. A table that cannot be dropped is skipped and keeps its row.
    pub async fn purge_expired_before(&mut self, schema: &str, today: NaiveDate) -> Result<PurgeReport> {
        let candidates = self
            .ledger
            .purge_expired(self.conn.as_mut(), schema, today)
            .await?;

        let mut report = PurgeReport::default();
        for (schema, table) in candidates {
            let id = TableIdentifier::from_stored(&schema, &table, self.dialect);
            let drop = self.dialect.drop_table_statement(&schema, &table);

            if let Err(e) = self.conn.execute_batch(&drop).await {
                warn!(table = %id, error = %e, "could not drop expired table, skipping");
                report.skipped.push((id, e.to_string()));
                continue;
            }
            // Remove only after the drop succeeded
            match self.ledger.remove(self.conn.as_mut(), &schema, &table).await {
                Ok(_) => {
                    debug!(table = %id, "purged expired table");
                    report.purged.push(id);
                }
                Err(e) => {
                    warn!(table = %id, error = %e, "dropped table but could not clear ledger row");
                    report.skipped.push((id, e.to_string()));
                }
            }
        }

        if report.skipped.is_empty() {
            info!(schema, purged = report.purged.len(), "purge finished");
        } else {
            warn!(
                schema,
                purged = report.purged.len(),
                skipped = report.skipped.len(),
                "purge finished with skipped tables"
            );
        }
        Ok(report)
    }

    /// Ledger rows for `schema`
    pub async fn ledger_entries(&mut self, schema: &str) -> Result<Vec<LedgerEntry>> {
        self.ledger.entries(self.conn.as_mut(), schema).await
    }

    /// Sessions blocking this user's sessions
    pub async fn blocking_me(&mut self) -> Result<Vec<BlockingEdge>> {
        self.detector.blocking_me(self.conn.as_mut()).await
    }

    /// Terminate the sessions blocking this user; returns their ids
    pub async fn kill_blocks(&mut self) -> Result<Vec<i64>> {
        self.detector.kill_blocks(self.conn.as_mut()).await
    }
}

/// Validate names handed in by a caller. Each may be bare or delimited.
fn parse_name(schema: &str, table: &str, dialect: &dyn Dialect) -> Result<TableIdentifier> {
    let text = format!("{}.{}", schema, table);
    let id = TableIdentifier::parse(&text, dialect)
        .filter(|id| !id.is_remote() && id.schema.is_some())
        .ok_or_else(|| Error::InvalidIdentifier(text))?;
    Ok(id)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// `created_on`'s date plus `ttl_days`
pub fn expiry_date(created_on: NaiveDateTime, ttl_days: u32) -> Result<NaiveDate> {
    created_on
        .date()
        .checked_add_days(Days::new(u64::from(ttl_days)))
        .ok_or_else(|| Error::Internal(format!("expiry out of range for ttl {} days", ttl_days)))
}
