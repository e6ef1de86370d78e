//! Backend connections
//!
//! A [`Connection`] is one live session against a database. The core only
//! needs to run a batch, run a single statement and learn how many rows it
//! touched, and run a query whose columns are all text.

pub mod postgres;
pub mod sqlserver;
pub mod url;

use async_trait::async_trait;

use crate::dialect::DialectKind;
use crate::error::{Error, Result};

pub use postgres::PostgresConnection;
pub use sqlserver::SqlServerConnection;
pub use url::ConnectionUrl;

/// A result row of text cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    pub fn new(values: Vec<Option<String>>) -> Self {
        Self { values }
    }

    /// Cell at `idx`; None for SQL NULL or a missing column
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Cell at `idx`, which must be present and non-null
    pub fn require(&self, idx: usize, column: &str) -> Result<&str> {
        self.get(idx)
            .ok_or_else(|| Error::UnexpectedRow(format!("column '{}' is missing or null", column)))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: Into<String>> FromIterator<Option<S>> for Row {
    fn from_iter<I: IntoIterator<Item = Option<S>>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

/// One database session
#[async_trait]
pub trait Connection: Send {
    fn dialect(&self) -> DialectKind;

    /// Run one or more statements, discarding any rows
    async fn execute_batch(&mut self, sql: &str) -> Result<()>;

    /// Run a single statement and return the number of rows it affected
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Run a query and collect its rows
    async fn query(&mut self, sql: &str) -> Result<Vec<Row>>;

    /// Close the session
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Open a connection for a URL, picking the backend from its scheme
pub async fn connect(url: &str) -> Result<Box<dyn Connection>> {
    let parsed = ConnectionUrl::parse(url)?;
    match parsed.dialect {
        DialectKind::Postgres => Ok(Box::new(PostgresConnection::connect(&parsed).await?)),
        DialectKind::SqlServer => Ok(Box::new(SqlServerConnection::connect(&parsed).await?)),
    }
}

/// First cell of the first row
pub(crate) async fn query_scalar(conn: &mut dyn Connection, sql: &str) -> Result<String> {
    let rows = conn.query(sql).await?;
    let row = rows
        .first()
        .ok_or_else(|| Error::UnexpectedRow(format!("no rows returned by '{}'", sql)))?;
    Ok(row.require(0, "value")?.to_string())
}
