use std::str::FromStr;

use anyhow::{bail, Context};
use config::{Config, ConfigError, Environment, File};
use log::info;
use serde::Deserialize;
use solana_pubkey::Pubkey;
use url::Url;

/// ClickHouse connection configuration.
///
/// Both tables are created externally by the migration tooling.
/// The indexer only checks that they exist at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSettings {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_trades_table")]
    pub trades_table: String,
    #[serde(default = "default_state_table")]
    pub state_table: String,
    #[serde(default = "default_clickhouse_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_trades_table() -> String {
    "dex_trades".to_string()
}

fn default_state_table() -> String {
    "solana_indexer_state".to_string()
}

fn default_clickhouse_timeout_ms() -> u64 {
    30_000
}

/// Retry tuning shared by every sink call and the gateway client.
///
/// `max_retries` counts retries after the initial attempt, so a call is tried
/// at most `max_retries + 1` times.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Archive gateway configuration.
///
/// The gateway's block ranges are expressed in block HEIGHT, not slot.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    /// Optional Solana RPC endpoint, only used to estimate the chain head for ETA logs
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Maximum number of blocks handed to the indexer per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Delay before polling again once the gateway reports no new blocks
    #[serde(default = "default_head_poll_interval_ms")]
    pub head_poll_interval_ms: u64,
}

fn default_gateway_url() -> String {
    "https://portal.sqd.dev/datasets/solana-mainnet".to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

fn default_head_poll_interval_ms() -> u64 {
    2_000
}

/// What to do with a batch whose trade insert still fails after all retries.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InsertFailurePolicy {
    /// Log a warning, drop the batch's trades and still advance the checkpoint
    #[default]
    Skip,
    /// Stop the indexer without advancing the checkpoint
    Fail,
}

/// Indexing scope: which chain, which programs, which block range.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexerSettings {
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    /// Block HEIGHT to start from when no checkpoint exists
    #[serde(default = "default_start_height")]
    pub start_height: u64,
    #[serde(default)]
    pub end_height: Option<u64>,
    /// Newline-delimited token whitelist. Unset disables filtering
    #[serde(default)]
    pub whitelist_path: Option<String>,
    #[serde(default = "default_jupiter_program_ids")]
    pub jupiter_program_ids: Vec<String>,
    #[serde(default = "default_pump_program_id")]
    pub pump_program_id: String,
    #[serde(default = "default_native_token_address")]
    pub native_token_address: String,
    #[serde(default = "default_stable_token_address")]
    pub stable_token_address: String,
    #[serde(default)]
    pub on_insert_failure: InsertFailurePolicy,
}

fn default_chain_id() -> String {
    "solana-mainnet".to_string()
}

fn default_start_height() -> u64 {
    250_000_000
}

fn default_jupiter_program_ids() -> Vec<String> {
    vec![
        "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4".to_string(),
        "JUP4Fb2cqiRUcaTHdrPC8h2gNsA2ETXiPDD33WcGuJB".to_string(),
    ]
}

fn default_pump_program_id() -> String {
    "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P".to_string()
}

fn default_native_token_address() -> String {
    "So11111111111111111111111111111111111111112".to_string()
}

fn default_stable_token_address() -> String {
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string()
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            start_height: default_start_height(),
            end_height: None,
            whitelist_path: None,
            jupiter_program_ids: default_jupiter_program_ids(),
            pump_program_id: default_pump_program_id(),
            native_token_address: default_native_token_address(),
            stable_token_address: default_stable_token_address(),
            on_insert_failure: InsertFailurePolicy::default(),
        }
    }
}

/// Root application configuration.
///
/// Loaded from an optional `config.yaml`, then overridden by `SOLEXER__*`
/// environment variables (e.g. `SOLEXER__CLICKHOUSE__PASSWORD`).
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub clickhouse: ClickHouseSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub indexer: IndexerSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("SOLEXER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("indexer.jupiter_program_ids")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }

    /// Reject settings that would only fail later, deep inside the batch loop.
    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.clickhouse.url).context("Invalid clickhouse.url")?;
        Url::parse(&self.gateway.url).context("Invalid gateway.url")?;
        if let Some(rpc_url) = &self.gateway.rpc_url {
            Url::parse(rpc_url).context("Invalid gateway.rpc_url")?;
        }

        if self.gateway.batch_size == 0 {
            bail!("gateway.batch_size must be greater than 0");
        }

        if self.indexer.jupiter_program_ids.is_empty() {
            bail!("indexer.jupiter_program_ids must list at least one program id");
        }

        let addresses = self
            .indexer
            .jupiter_program_ids
            .iter()
            .chain([
                &self.indexer.pump_program_id,
                &self.indexer.native_token_address,
                &self.indexer.stable_token_address,
            ]);
        for address in addresses {
            Pubkey::from_str(address)
                .with_context(|| format!("Invalid base58 address in config: {}", address))?;
        }

        if let Some(end_height) = self.indexer.end_height {
            if end_height < self.indexer.start_height {
                bail!(
                    "indexer.end_height ({}) is below indexer.start_height ({})",
                    end_height,
                    self.indexer.start_height
                );
            }
        }

        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            bail!("retry.initial_delay_ms must not exceed retry.max_delay_ms");
        }

        Ok(())
    }

    /// Log the effective configuration once at startup (credentials omitted).
    pub fn log_summary(&self) {
        info!("Chain: {}", self.indexer.chain_id);
        info!("Gateway: {}", self.gateway.url);
        info!(
            "Block range: {} - {} (heights, not slots), batch size {}",
            self.indexer.start_height,
            self.indexer
                .end_height
                .map(|h| h.to_string())
                .unwrap_or_else(|| "latest".to_string()),
            self.gateway.batch_size
        );
        info!(
            "Programs: jupiter {:?}, pump {}",
            self.indexer.jupiter_program_ids, self.indexer.pump_program_id
        );
        info!(
            "Reference tokens: native {}, stable {}",
            self.indexer.native_token_address, self.indexer.stable_token_address
        );
        info!(
            "ClickHouse: {} (database {}, trades table {}, state table {})",
            self.clickhouse.url,
            self.clickhouse.database,
            self.clickhouse.trades_table,
            self.clickhouse.state_table
        );
        info!(
            "Retry: {} retries, {}ms initial delay, {}ms max delay; insert failure policy {:?}",
            self.retry.max_retries,
            self.retry.initial_delay_ms,
            self.retry.max_delay_ms,
            self.indexer.on_insert_failure
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            clickhouse: ClickHouseSettings {
                url: "http://localhost:8123".to_string(),
                user: "default".to_string(),
                password: String::new(),
                database: "solana_indexer".to_string(),
                trades_table: default_trades_table(),
                state_table: default_state_table(),
                timeout_ms: default_clickhouse_timeout_ms(),
            },
            retry: RetrySettings::default(),
            gateway: GatewaySettings {
                url: default_gateway_url(),
                rpc_url: None,
                batch_size: default_batch_size(),
                request_timeout_ms: default_request_timeout_ms(),
                head_poll_interval_ms: default_head_poll_interval_ms(),
            },
            indexer: IndexerSettings::default(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(settings().validate().is_ok());
    }

    #[test]
    fn test_default_gateway_streams_from_portal() {
        let client =
            crate::gateway::PortalClient::new(&settings().gateway, RetrySettings::default()).unwrap();
        assert_eq!(
            client.stream_url().as_str(),
            "https://portal.sqd.dev/datasets/solana-mainnet/stream"
        );
    }

    #[test]
    fn test_rejects_bad_program_id() {
        let mut s = settings();
        s.indexer.pump_program_id = "not-a-pubkey".to_string();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut s = settings();
        s.indexer.start_height = 100;
        s.indexer.end_height = Some(50);
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_insert_failure_policy_parses_snake_case() {
        let policy: InsertFailurePolicy = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(policy, InsertFailurePolicy::Fail);
        assert_eq!(InsertFailurePolicy::default(), InsertFailurePolicy::Skip);
    }
}
