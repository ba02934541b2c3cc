use std::{future::Future, time::Duration};

use anyhow::{anyhow, Context};
use clickhouse::{Client, RowOwned, RowRead, RowWrite};
use log::{info, warn};
use serde::Serialize;

use crate::{config::ClickHouseSettings, db::sink::SinkBackend};

pub struct ClickhouseClient {
    pub client: Client,
    timeout: Duration,
}

impl ClickhouseClient {
    pub async fn new(settings: &ClickHouseSettings) -> anyhow::Result<Self> {
        info!("Connecting to ClickHouse at {}", settings.url);

        let client = Client::default()
            .with_url(settings.url.clone())
            .with_user(settings.user.clone())
            .with_password(settings.password.clone())
            .with_database(settings.database.clone());

        let this = Self {
            client,
            timeout: Duration::from_millis(settings.timeout_ms),
        };

        // Test connection with retry logic
        let mut retries = 0;
        let max_retries = 3;

        loop {
            match this.health_check().await {
                Ok(_) => {
                    info!("Successfully connected to ClickHouse");
                    break;
                },
                Err(e) => {
                    retries += 1;

                    if retries >= max_retries {
                        return Err(e.context(format!(
                            "Failed to connect to ClickHouse after {} attempts",
                            max_retries
                        )));
                    }

                    let delay = Duration::from_millis(100 * 2_u64.pow(retries));
                    warn!(
                        "Failed to connect to ClickHouse (attempt {}/{}), retrying in {:?}... Error: {:#}",
                        retries, max_retries, delay, e
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }

        Ok(this)
    }

    /// Health check - verify connection is still alive
    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.bounded(async {
            self.client
                .query("SELECT 1")
                .fetch_one::<u8>()
                .await
                .context("ClickHouse health check failed")
        })
        .await?;
        Ok(())
    }

    /// Apply the configured request timeout. Elapsed requests fail as transient.
    async fn bounded<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| anyhow!("ClickHouse request timed out after {:?}", self.timeout))?
    }
}

impl SinkBackend for ClickhouseClient {
    async fn fetch<T>(&self, query: &str) -> anyhow::Result<Vec<T>>
    where
        T: RowOwned + RowRead,
    {
        self.bounded(async {
            self.client
                .query(query)
                .fetch_all::<T>()
                .await
                .context("ClickHouse query failed")
        })
        .await
    }

    async fn command(&self, query: &str) -> anyhow::Result<()> {
        self.bounded(async {
            self.client
                .query(query)
                .execute()
                .await
                .context("ClickHouse command failed")
        })
        .await
    }

    async fn insert<T>(&self, table: &str, rows: &[T]) -> anyhow::Result<()>
    where
        T: RowOwned + RowWrite + Serialize,
    {
        self.bounded(async {
            let mut insert = self
                .client
                .insert::<T>(table)
                .await
                .with_context(|| format!("Failed to start insert into {}", table))?;
            for row in rows {
                insert
                    .write(row)
                    .await
                    .with_context(|| format!("Failed to write row into {}", table))?;
            }
            insert
                .end()
                .await
                .with_context(|| format!("Failed to insert {} rows into {}", rows.len(), table))
        })
        .await
    }
}
