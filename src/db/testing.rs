//! In-memory [`SinkBackend`] for tests.
//!
//! Rows are kept as JSON values. The backend understands just enough SQL for
//! the queries this crate issues: `FROM <table>` with `column = 'literal'`
//! predicates, `system.tables` lookups and constant SELECTs. Rows that carry a
//! `version` are returned newest first.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use anyhow::{anyhow, Context};
use clickhouse::{RowOwned, RowRead, RowWrite};
use serde::Serialize;
use serde_json::Value;

use crate::db::sink::SinkBackend;

#[derive(Default)]
struct State {
    calls: usize,
    failures: VecDeque<String>,
    /// Table whose inserts always fail, with the error message
    insert_failure: Option<(String, String)>,
    tables: HashMap<String, Vec<Value>>,
    commands: Vec<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn with_tables<'a>(tables: impl IntoIterator<Item = &'a str>) -> Self {
        let backend = Self::default();
        for table in tables {
            backend.create_table(table);
        }
        backend
    }

    pub fn create_table(&self, table: &str) {
        self.state().tables.entry(table.to_string()).or_default();
    }

    /// Fail the next calls, one per message, in order.
    pub fn fail_next_with<S: Into<String>>(&self, messages: impl IntoIterator<Item = S>) {
        self.state()
            .failures
            .extend(messages.into_iter().map(Into::into));
    }

    /// Fail every insert into `table` with `message`.
    pub fn fail_inserts_into(&self, table: &str, message: &str) {
        self.state().insert_failure = Some((table.to_string(), message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.state().calls
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and pop a scripted failure, if any.
    fn begin_call(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        state.calls += 1;
        match state.failures.pop_front() {
            Some(message) => Err(anyhow!(message)),
            None => Ok(()),
        }
    }
}

fn missing_table(table: &str) -> anyhow::Error {
    anyhow!(
        "Code: 60. DB::Exception: Table default.{} doesn't exist. (UNKNOWN_TABLE)",
        table
    )
}

/// `column = 'literal'` pairs of a query.
fn equality_predicates(query: &str) -> Vec<(String, String)> {
    query
        .match_indices(" = '")
        .filter_map(|(idx, pattern)| {
            let column = query[..idx].split_whitespace().last()?;
            let rest = &query[idx + pattern.len()..];
            let value = &rest[..rest.find('\'')?];
            Some((column.to_string(), value.to_string()))
        })
        .collect()
}

fn table_name(query: &str) -> Option<String> {
    let (_, rest) = query.split_once("FROM ")?;
    let name = rest.split_whitespace().next()?;
    // Strip a database qualifier
    Some(name.rsplit('.').next().unwrap_or(name).to_string())
}

fn matches(row: &Value, predicates: &[(String, String)]) -> bool {
    predicates.iter().all(|(column, value)| match row.get(column) {
        Some(Value::String(s)) => s == value,
        Some(other) => other.to_string() == *value,
        None => true,
    })
}

impl MemoryBackend {
    fn select(&self, query: &str) -> anyhow::Result<Vec<Value>> {
        let state = self.state();
        let predicates = equality_predicates(query);

        if query.contains("system.tables") {
            let mut names: Vec<&String> = state.tables.keys().collect();
            names.sort();
            return Ok(names
                .into_iter()
                .filter(|name| {
                    predicates
                        .iter()
                        .all(|(column, value)| column != "name" || value == *name)
                })
                .map(|name| Value::String(name.clone()))
                .collect());
        }

        let Some(table) = table_name(query) else {
            // Constant SELECT such as a health check
            return Ok(vec![Value::from(1)]);
        };
        let rows = state.tables.get(&table).ok_or_else(|| missing_table(&table))?;

        let mut selected: Vec<Value> = rows
            .iter()
            .filter(|row| matches(row, &predicates))
            .cloned()
            .collect();
        selected.sort_by_key(|row| std::cmp::Reverse(row.get("version").and_then(Value::as_u64)));
        Ok(selected)
    }
}

impl SinkBackend for MemoryBackend {
    async fn fetch<T>(&self, query: &str) -> anyhow::Result<Vec<T>>
    where
        T: RowOwned + RowRead,
    {
        self.begin_call()?;
        self.select(query)?
            .into_iter()
            .map(|row| serde_json::from_value(row).context("Row does not match the requested type"))
            .collect()
    }

    async fn command(&self, query: &str) -> anyhow::Result<()> {
        self.begin_call()?;
        self.state().commands.push(query.to_string());
        Ok(())
    }

    async fn insert<T>(&self, table: &str, rows: &[T]) -> anyhow::Result<()>
    where
        T: RowOwned + RowWrite + Serialize,
    {
        self.begin_call()?;
        let mut state = self.state();
        if let Some((failing, message)) = &state.insert_failure {
            if failing == table {
                return Err(anyhow!(message.clone()));
            }
        }

        let values = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        state.tables.entry(table.to_string()).or_default().extend(values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::IndexerStateRow;

    #[test]
    fn test_equality_predicates() {
        let predicates = equality_predicates(
            "SELECT state_value FROM t FINAL WHERE chain = 'solana-mainnet' AND state_key = 'k' LIMIT 1",
        );
        assert_eq!(
            predicates,
            vec![
                ("chain".to_string(), "solana-mainnet".to_string()),
                ("state_key".to_string(), "k".to_string()),
            ]
        );
        assert_eq!(table_name("SELECT * FROM db.t FINAL"), Some("t".to_string()));
    }

    #[tokio::test]
    async fn test_fetch_filters_and_orders_by_version() {
        let backend = MemoryBackend::default();
        let rows = [
            IndexerStateRow::new("a", "x".to_string(), "c", 1),
            IndexerStateRow::new("b", "y".to_string(), "c", 3),
            IndexerStateRow::new("a", "z".to_string(), "c", 2),
        ];
        backend.insert("t", &rows).await.unwrap();

        let fetched: Vec<IndexerStateRow> = backend
            .fetch("SELECT * FROM t WHERE state_key = 'a'")
            .await
            .unwrap();
        assert_eq!(fetched.len(), 2);
        assert_eq!(fetched[0].version, 2);

        let err = backend
            .fetch::<IndexerStateRow>("SELECT * FROM missing")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("doesn't exist"));
    }

    #[tokio::test]
    async fn test_system_tables_and_constant_select() {
        let backend = MemoryBackend::with_tables(["a", "b"]);
        let names: Vec<String> = backend
            .fetch("SELECT name FROM system.tables WHERE name = 'b'")
            .await
            .unwrap();
        assert_eq!(names, vec!["b".to_string()]);

        let one: Vec<u8> = backend.fetch("SELECT 1").await.unwrap();
        assert_eq!(one, vec![1]);
    }
}
