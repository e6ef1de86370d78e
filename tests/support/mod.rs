//! Scripted in-memory backend for integration tests
//!
//! `FakeConnection` recognizes the statements the crate generates (ledger
//! DDL, upserts, deletes, drops, terminates and the fixed queries) and keeps
//! a ledger in memory. Anything else is treated as a user batch.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Days, Local, NaiveDate};

use tablekeeper::backend::{Connection, Row};
use tablekeeper::dialect::{Dialect, DialectKind};
use tablekeeper::error::{Error, Result};
use tablekeeper::session::{Session, SessionConfig};

/// One stored ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub owner: String,
    pub schema: String,
    pub table: String,
    pub created_on: String,
    pub expires: String,
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub user: String,
    pub session_id: i64,
    /// Every statement run against the connection, in order
    pub executed: Vec<String>,
    /// Ledger rows keyed on (schema, table)
    pub ledger: BTreeMap<(String, String), StoredEntry>,
    /// Schemas whose ledger table exists
    pub ledgers: HashSet<String>,
    /// Ledger DDL fails with this message
    pub ledger_ddl_error: Option<String>,
    /// User batches containing any of these fail
    pub failing_batches: Vec<String>,
    /// Tables whose DROP fails
    pub failing_drops: Vec<String>,
    /// Rows for the lock-graph query
    pub lock_rows: Vec<Row>,
    /// Sessions that no longer exist
    pub gone_sessions: HashSet<i64>,
    /// Session ids passed to terminate
    pub terminated: Vec<i64>,
    /// Tables dropped by DROP TABLE
    pub dropped: Vec<String>,
}

pub struct FakeConnection {
    dialect: DialectKind,
    state: Arc<Mutex<FakeState>>,
}

impl FakeConnection {
    pub fn new(dialect: DialectKind, user: &str) -> (Self, Arc<Mutex<FakeState>>) {
        let state = Arc::new(Mutex::new(FakeState {
            user: user.to_string(),
            session_id: 100,
            ..Default::default()
        }));
        (
            Self {
                dialect,
                state: state.clone(),
            },
            state,
        )
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn key(&self, schema: &str, table: &str) -> (String, String) {
        match self.dialect {
            // Default collation is case-insensitive
            DialectKind::SqlServer => (schema.to_lowercase(), table.to_lowercase()),
            DialectKind::Postgres => (schema.to_string(), table.to_string()),
        }
    }

    fn sql_dialect(&self) -> &'static dyn Dialect {
        self.dialect.dialect()
    }
}

/// Single-quoted literals in order of appearance
pub fn literals(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\'' {
            continue;
        }
        let mut value = String::new();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    value.push('\'');
                } else {
                    break;
                }
            } else {
                value.push(ch);
            }
        }
        out.push(value);
    }
    out
}

fn ledger_schema(sql: &str) -> Option<String> {
    // `<schema>.__temp_log_table...` with the schema quoted either way
    let idx = sql.find("__temp_log_table")?;
    let prefix = sql[..idx].trim_end_matches(|c| c == '[' || c == '"').strip_suffix('.')?;
    let schema = prefix
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == '\'')
        .next()?;
    Some(schema.trim_matches(|c| c == '[' || c == ']' || c == '"').to_string())
}

fn backend_error(message: &str) -> Error {
    Error::Backend(message.to_string())
}

#[async_trait]
impl Connection for FakeConnection {
    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.run(sql).map(|_| ())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        self.run(sql)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        self.run_query(sql)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl FakeConnection {
    /// Run a statement, returning the rows it affected
    fn run(&self, sql: &str) -> Result<u64> {
        let dialect = self.sql_dialect();
        let mut state = self.state();
        state.executed.push(sql.to_string());

        let is_ledger = sql.contains("__temp_log_table");
        if is_ledger && (sql.starts_with("CREATE TABLE IF NOT EXISTS") || sql.starts_with("IF OBJECT_ID")) {
            if let Some(message) = &state.ledger_ddl_error {
                return Err(backend_error(message));
            }
            let schema = ledger_schema(sql).ok_or_else(|| backend_error("bad ledger ddl"))?;
            state.ledgers.insert(schema);
            return Ok(0);
        }

        if is_ledger && (sql.starts_with("INSERT INTO") || sql.starts_with("MERGE")) {
            let values = literals(sql);
            let schema = values[1].clone();
            if !state.ledgers.contains(&schema) {
                return Err(backend_error("ledger table does not exist"));
            }
            let key = self.key(&schema, &values[2]);
            state.ledger.insert(
                key,
                StoredEntry {
                    owner: values[0].clone(),
                    schema,
                    table: values[2].clone(),
                    created_on: values[3].clone(),
                    expires: values[4].clone(),
                },
            );
            return Ok(1);
        }

        if is_ledger && sql.starts_with("DELETE FROM") {
            let values = literals(sql);
            if !state.ledgers.contains(&values[0]) {
                return Err(backend_error("ledger table does not exist"));
            }
            let key = self.key(&values[0], &values[1]);
            return Ok(state.ledger.remove(&key).map_or(0, |_| 1));
        }

        if sql.starts_with("DROP TABLE IF EXISTS") {
            if state.failing_drops.iter().any(|t| sql.contains(t.as_str())) {
                return Err(backend_error("permission denied to drop table"));
            }
            state.dropped.push(sql["DROP TABLE IF EXISTS ".len()..].to_string());
            return Ok(0);
        }

        let terminate_prefix = dialect.terminate_statement(0);
        let terminate_prefix = terminate_prefix.trim_end_matches(|c: char| c.is_ascii_digit() || c == ')');
        if let Some(id) = sql.strip_prefix(terminate_prefix) {
            let id: i64 = id.trim_end_matches(')').parse().map_err(|_| backend_error("bad session id"))?;
            state.terminated.push(id);
            if state.gone_sessions.contains(&id) {
                return Err(backend_error(match self.dialect {
                    DialectKind::Postgres => "PID 0 is not a PostgreSQL server process",
                    DialectKind::SqlServer => "Process ID 0 is not an active process ID.",
                }));
            }
            return Ok(0);
        }

        if let Some(fail) = state.failing_batches.iter().find(|f| sql.contains(f.as_str())) {
            return Err(backend_error(&format!("syntax error at or near \"{}\"", fail)));
        }
        Ok(0)
    }

    fn run_query(&self, sql: &str) -> Result<Vec<Row>> {
        let dialect = self.sql_dialect();
        let state = self.state();

        if sql == dialect.current_user_query() {
            return Ok(vec![vec![Some(state.user.clone())].into_iter().collect()]);
        }
        if sql == dialect.session_id_query() {
            return Ok(vec![vec![Some(state.session_id.to_string())].into_iter().collect()]);
        }
        if sql == dialect.lock_graph_query() {
            return Ok(state.lock_rows.clone());
        }

        let values = literals(sql);
        if sql.contains("expires <") {
            let (schema, today) = (&values[0], &values[1]);
            return Ok(state
                .ledger
                .values()
                .filter(|e| self.key(&e.schema, "") == self.key(schema, "") && &e.expires < today)
                .map(|e| vec![Some(e.schema.clone()), Some(e.table.clone())].into_iter().collect())
                .collect());
        }
        if sql.contains("table_owner") {
            let schema = &values[0];
            return Ok(state
                .ledger
                .values()
                .filter(|e| self.key(&e.schema, "") == self.key(schema, ""))
                .map(|e| {
                    vec![
                        Some(e.owner.clone()),
                        Some(e.schema.clone()),
                        Some(e.table.clone()),
                        Some(e.created_on.clone()),
                        Some(e.expires.clone()),
                    ]
                    .into_iter()
                    .collect()
                })
                .collect());
        }

        Err(backend_error(&format!("unexpected query: {}", sql)))
    }
}

impl FakeState {
    /// Insert a ledger row directly, as another session would have
    pub fn seed(&mut self, dialect: DialectKind, schema: &str, table: &str, expires: NaiveDate) {
        let format = match dialect {
            DialectKind::Postgres => "%Y-%m-%d",
            DialectKind::SqlServer => "%Y%m%d",
        };
        self.ledgers.insert(schema.to_string());
        let key = match dialect {
            DialectKind::SqlServer => (schema.to_lowercase(), table.to_lowercase()),
            DialectKind::Postgres => (schema.to_string(), table.to_string()),
        };
        self.ledger.insert(
            key,
            StoredEntry {
                owner: self.user.clone(),
                schema: schema.to_string(),
                table: table.to_string(),
                created_on: "2026-01-01T00:00:00".to_string(),
                expires: expires.format(format).to_string(),
            },
        );
    }

    pub fn ledger_rows(&self) -> Vec<StoredEntry> {
        self.ledger.values().cloned().collect()
    }

    pub fn ddl_count(&self) -> usize {
        self.executed
            .iter()
            .filter(|sql| {
                sql.contains("__temp_log_table")
                    && (sql.starts_with("CREATE TABLE IF NOT EXISTS") || sql.starts_with("IF OBJECT_ID"))
            })
            .count()
    }
}

/// A session over a fresh fake backend
pub async fn session(dialect: DialectKind, user: &str) -> (Session, Arc<Mutex<FakeState>>) {
    let (conn, state) = FakeConnection::new(dialect, user);
    let config = SessionConfig::new().dialect(dialect);
    let session = Session::with_connection(Box::new(conn), config).await.unwrap();
    (session, state)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn days_from_today(days: u64) -> NaiveDate {
    today().checked_add_days(Days::new(days)).unwrap()
}

/// A lock-graph row
pub fn lock_row(blocked: i64, blocking: i64, blocked_sql: &str, blocking_sql: &str) -> Row {
    vec![
        Some(blocked.to_string()),
        Some("alice".to_string()),
        Some(blocking.to_string()),
        Some("bob".to_string()),
        Some(blocked_sql.to_string()),
        Some(blocking_sql.to_string()),
    ]
    .into_iter()
    .collect()
}
