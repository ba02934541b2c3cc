//! Retrying access to the analytics store.
//!
//! [`SinkBackend`] is the raw store, reading and writing `clickhouse::Row`
//! types. [`Sink`] wraps it so every call goes through the shared
//! exponential-backoff loop, retrying only transient failures.

use std::future::Future;

use anyhow::Context;
use clickhouse::{RowOwned, RowRead, RowWrite};
use serde::Serialize;

use crate::{
    config::RetrySettings,
    utils::{is_transient_error, with_retry},
};

/// Raw store operations over typed rows.
pub trait SinkBackend {
    /// Run a SELECT and return its rows.
    fn fetch<T>(&self, query: &str) -> impl Future<Output = anyhow::Result<Vec<T>>>
    where
        T: RowOwned + RowRead;

    /// Run a statement that returns no rows.
    fn command(&self, query: &str) -> impl Future<Output = anyhow::Result<()>>;

    /// Bulk insert `rows` into `table` in one request.
    fn insert<T>(&self, table: &str, rows: &[T]) -> impl Future<Output = anyhow::Result<()>>
    where
        T: RowOwned + RowWrite + Serialize;
}

pub struct Sink<B> {
    backend: B,
    retry: RetrySettings,
}

impl<B: SinkBackend> Sink<B> {
    pub fn new(backend: B, retry: RetrySettings) -> Self {
        Self { backend, retry }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn read<T>(&self, query: &str) -> anyhow::Result<Vec<T>>
    where
        T: RowOwned + RowRead,
    {
        with_retry(&self.retry, "read", is_transient_error, || {
            self.backend.fetch::<T>(query)
        })
        .await
    }

    pub async fn write(&self, query: &str) -> anyhow::Result<()> {
        with_retry(&self.retry, "write", is_transient_error, || {
            self.backend.command(query)
        })
        .await
    }

    /// Insert `rows` in one request. No-op for an empty slice.
    pub async fn insert<T>(&self, table: &str, rows: &[T]) -> anyhow::Result<()>
    where
        T: RowOwned + RowWrite + Serialize,
    {
        if rows.is_empty() {
            return Ok(());
        }

        let operation = format!("insert into {}", table);
        with_retry(&self.retry, &operation, is_transient_error, || {
            self.backend.insert(table, rows)
        })
        .await
    }

    pub async fn execute(&self, query: &str) -> anyhow::Result<()> {
        with_retry(&self.retry, "execute", is_transient_error, || {
            self.backend.command(query)
        })
        .await
    }

    pub async fn health_check(&self) -> anyhow::Result<()> {
        self.read::<u8>("SELECT 1")
            .await
            .context("Sink health check failed")?;
        Ok(())
    }

    /// True if `table` exists in the current database.
    pub async fn table_exists(&self, table: &str) -> anyhow::Result<bool> {
        let query = format!(
            "SELECT name FROM system.tables WHERE database = currentDatabase() AND name = {}",
            quote(table)
        );
        Ok(!self.read::<String>(&query).await?.is_empty())
    }
}

/// Single-quoted SQL string literal.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// True if the error says the queried table is missing.
pub fn is_missing_table(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let message = cause.to_string();
        message.contains("UNKNOWN_TABLE")
            || message.contains("doesn't exist")
            || message.contains("does not exist")
    })
}
