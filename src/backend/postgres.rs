//! PostgreSQL connections on tokio-postgres
//!
//! Everything goes through the simple query protocol so a multi-statement
//! batch is one round trip and every cell comes back as text.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{NoTls, SimpleQueryMessage};
use tracing::{debug, warn};

use super::{Connection, ConnectionUrl, Row};
use crate::dialect::DialectKind;
use crate::error::{Error, Result};

pub struct PostgresConnection {
    client: tokio_postgres::Client,
    /// Background task driving the socket
    conn_handle: JoinHandle<()>,
}

impl PostgresConnection {
    pub async fn connect(url: &ConnectionUrl) -> Result<Self> {
        let mut config = tokio_postgres::Config::new();
        config.host(&url.host).port(url.port_or_default());
        if let Some(user) = &url.username {
            config.user(user);
        }
        if let Some(password) = &url.password {
            config.password(password);
        }
        if !url.database.is_empty() {
            config.dbname(&url.database);
        }
        config.application_name("tablekeeper");

        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        let conn_handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(%e, "postgres connection errored");
            }
        });

        debug!(host = %url.host, database = %url.database, "connected to postgres");
        Ok(Self {
            client,
            conn_handle,
        })
    }
}

#[async_trait]
impl Connection for PostgresConnection {
    fn dialect(&self) -> DialectKind {
        DialectKind::Postgres
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let messages = self.client.simple_query(sql).await?;
        let mut rows = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                rows.push((0..row.len()).map(|i| row.get(i)).collect());
            }
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let Self {
            client,
            conn_handle,
        } = *self;
        // Dropping the client ends the connection task
        drop(client);
        conn_handle
            .await
            .map_err(|e| Error::Internal(format!("postgres connection task failed: {}", e)))?;
        debug!("closed postgres connection");
        Ok(())
    }
}
