//! SQL Server connections on tiberius

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use super::{Connection, ConnectionUrl, Row};
use crate::dialect::DialectKind;
use crate::error::{Error, Result};

pub struct SqlServerConnection {
    client: Client<Compat<TcpStream>>,
}

impl SqlServerConnection {
    pub async fn connect(url: &ConnectionUrl) -> Result<Self> {
        let mut config = Config::new();
        config.host(&url.host);
        config.port(url.port_or_default());
        if !url.database.is_empty() {
            config.database(&url.database);
        }
        if let Some(user) = &url.username {
            config.authentication(AuthMethod::sql_server(
                user,
                url.password.as_deref().unwrap_or_default(),
            ));
        }
        config.application_name("tablekeeper");
        config.trust_cert();

        let socket = TcpStream::connect(config.get_addr()).await?;
        socket.set_nodelay(true)?;
        let client = Client::connect(config, socket.compat_write())
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;

        debug!(host = %url.host, database = %url.database, "connected to sql server");
        Ok(Self { client })
    }
}

#[async_trait]
impl Connection for SqlServerConnection {
    fn dialect(&self) -> DialectKind {
        DialectKind::SqlServer
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<()> {
        // Draining every result set surfaces errors from later statements
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?.total())
    }

    async fn query(&mut self, sql: &str) -> Result<Vec<Row>> {
        let results = self.client.simple_query(sql).await?.into_results().await?;
        let mut rows = Vec::new();
        for row in results.into_iter().flatten() {
            let mut values = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                values.push(row.try_get::<&str, usize>(i)?.map(str::to_string));
            }
            rows.push(Row::new(values));
        }
        Ok(rows)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.client.close().await?;
        debug!("closed sql server connection");
        Ok(())
    }
}
