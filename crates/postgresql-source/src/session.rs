//! Run-scoped PostgreSQL connection.

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};

/// PostgreSQL connection options
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl ConnectOpts {
    /// Key/value connection string understood by `tokio_postgres::connect`.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} user={} password={} dbname={}",
            self.host,
            self.port,
            quote(&self.user),
            quote(&self.password),
            quote(&self.dbname)
        )
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// A client together with the task driving its connection.
///
/// Dropping the session aborts the connection task, so the server side is
/// released on every exit path of a run, including errors and panics.
pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
}

impl PostgresSession {
    pub async fn connect(opts: &ConnectOpts) -> Result<Self> {
        tracing::debug!(
            "Connecting to PostgreSQL at {}:{} (database: {})",
            opts.host,
            opts.port,
            opts.dbname
        );

        let (client, connection) = tokio_postgres::connect(&opts.connection_string(), NoTls)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to connect to PostgreSQL at {}:{}: {e}",
                    opts.host,
                    opts.port
                )
            })?;

        // Spawn connection handler
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {e}");
            }
        });

        Ok(Self { client, connection })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        self.connection.abort();
        tracing::debug!("PostgreSQL session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_string_quotes_values() {
        let opts = ConnectOpts {
            host: "localhost".to_string(),
            port: 5432,
            user: "app".to_string(),
            password: "it's".to_string(),
            dbname: "movies_database".to_string(),
        };
        assert_eq!(
            opts.connection_string(),
            "host=localhost port=5432 user='app' password='it\\'s' dbname='movies_database'"
        );
    }
}
