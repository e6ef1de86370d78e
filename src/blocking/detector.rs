//! Blocking session detector and resolver
//!
//! Reads the backend's lock graph to find sessions holding locks that the
//! caller's sessions are waiting on, and terminates them on request. The
//! two calls are independent snapshots: a blocker may finish between them.

use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{query_scalar, Connection, Row};
use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// A waiter and the session holding the lock it wants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockingEdge {
    pub blocked_session: i64,
    pub blocked_user: String,
    pub blocking_session: i64,
    pub blocking_user: String,
    pub blocked_statement_text: String,
    pub blocking_statement_text: String,
}

impl BlockingEdge {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            blocked_session: parse_session_id(row.require(0, "blocked_session")?)?,
            blocked_user: row.get(1).unwrap_or_default().to_string(),
            blocking_session: parse_session_id(row.require(2, "blocking_session")?)?,
            blocking_user: row.get(3).unwrap_or_default().to_string(),
            blocked_statement_text: row.get(4).unwrap_or_default().to_string(),
            blocking_statement_text: row.get(5).unwrap_or_default().to_string(),
        })
    }
}

/// What happened to one terminate request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateOutcome {
    Terminated,
    /// The session had already ended
    AlreadyGone,
}

/// Lock-graph reader for one dialect
#[derive(Debug, Clone, Copy)]
pub struct BlockingDetector {
    dialect: &'static dyn Dialect,
}

impl BlockingDetector {
    pub fn new(dialect: &'static dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Sessions blocking waiters that belong to the current user
    pub async fn blocking_me(&self, conn: &mut dyn Connection) -> Result<Vec<BlockingEdge>> {
        let rows = conn.query(self.dialect.lock_graph_query()).await?;
        let edges = rows
            .iter()
            .map(BlockingEdge::from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(edges = edges.len(), "read lock graph");
        Ok(edges)
    }

    /// Terminate every distinct session blocking the current user, never the
    /// caller's own. Returns the targeted session ids.
    pub async fn kill_blocks(&self, conn: &mut dyn Connection) -> Result<Vec<i64>> {
        let own_session = parse_session_id(&query_scalar(conn, self.dialect.session_id_query()).await?)?;
        let edges = self.blocking_me(conn).await?;

        let targets: IndexSet<i64> = edges
            .iter()
            .map(|edge| edge.blocking_session)
            .filter(|&id| id != own_session)
            .collect();

        let mut killed = Vec::with_capacity(targets.len());
        for session_id in targets {
            let outcome = self.terminate(conn, session_id).await?;
            info!(session_id, ?outcome, "resolved blocking session");
            killed.push(session_id);
        }

        Ok(killed)
    }

    /// Issue one terminate; a session that is already gone counts as success
    pub async fn terminate(&self, conn: &mut dyn Connection, session_id: i64) -> Result<TerminateOutcome> {
        match conn
            .execute_batch(&self.dialect.terminate_statement(session_id))
            .await
        {
            Ok(()) => Ok(TerminateOutcome::Terminated),
            Err(Error::Backend(message)) if self.dialect.is_session_gone(&message) => {
                debug!(session_id, "blocking session already gone");
                Ok(TerminateOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_session_id(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| Error::UnexpectedRow(format!("invalid session id '{}'", text)))
}
