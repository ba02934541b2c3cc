use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// Trade source, stored in the `amm` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Amm {
    JupiterV6,
    Pump,
}

impl Amm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Amm::JupiterV6 => "jupiter_v6",
            Amm::Pump => "pump",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapType {
    Buy,
    Sell,
}

impl SwapType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapType::Buy => "buy",
            SwapType::Sell => "sell",
        }
    }
}

/// Canonical swap record produced by the normalizers.
///
/// `token_addresses[0]` is what the wallet gave up, `token_addresses[1]` what it
/// received. Every amount-like vector follows the same index order. Amounts and
/// reserves are raw integer strings, prices are decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DexTrade {
    // Identifiers
    pub transaction_hash: String,
    /// Stored as the raw slot
    pub block_number: u64,
    pub block_height: u64,
    pub block_hash: String,
    pub block_timestamp: i64,
    pub log_index: u32,

    // Topology
    pub pool_address: String,
    pub wallet_address: String,
    pub factory_address: String,
    pub lp_token_address: String,

    // Trade
    pub event_type: String, // always 'swap'
    pub amm: Amm,
    pub swap_type: SwapType,
    pub token_addresses: [String; 2],
    pub token_amounts: [String; 2],
    pub token_reserves: Vec<String>,

    // Derived values
    pub amount_native: String,
    pub amount_stable: String,
    pub prices_native: Vec<String>,
    pub prices_stable: Vec<String>,
    pub reserves_native: Vec<String>,

    pub is_reorged: u8,
}

/// Row of the ClickHouse `dex_trades` table.
///
/// Field types follow the column types, as rows are written in RowBinary.
/// Numeric columns are `Float64`, parsed from the trade's strings. Strings that
/// fail to parse are stored as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Row)]
pub struct DexTradeRow {
    pub block_number: u64,
    pub block_hash: String,
    pub block_timestamp: u64,
    pub transaction_hash: String,
    pub log_index: u64,
    pub transaction_type: String,
    pub swap_type: String,
    pub token_addresses: Vec<String>,
    pub amounts: Vec<f64>,
    pub amount_stable: f64,
    pub amount_native: f64,
    pub prices_stable: Vec<f64>,
    pub prices_native: Vec<f64>,
    pub pool_address: String,
    pub factory_address: String,
    pub lp_token_address: String,
    pub reserves: Vec<f64>,
    pub reserves_stable: Vec<f64>,
    pub reserves_native: Vec<f64>,
    pub wallet_address: String,
    pub is_reorged: bool,
    pub amm: String,
}

fn parse_f64(value: &str) -> f64 {
    value.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn parse_all<S: AsRef<str>>(values: &[S]) -> Vec<f64> {
    values.iter().map(|v| parse_f64(v.as_ref())).collect()
}

impl From<&DexTrade> for DexTradeRow {
    fn from(trade: &DexTrade) -> Self {
        Self {
            block_number: trade.block_number,
            block_hash: trade.block_hash.clone(),
            block_timestamp: trade.block_timestamp.max(0) as u64,
            transaction_hash: trade.transaction_hash.clone(),
            log_index: u64::from(trade.log_index),
            transaction_type: trade.event_type.clone(),
            swap_type: trade.swap_type.as_str().to_string(),
            token_addresses: trade.token_addresses.to_vec(),
            amounts: parse_all(&trade.token_amounts),
            amount_stable: parse_f64(&trade.amount_stable),
            amount_native: parse_f64(&trade.amount_native),
            prices_stable: parse_all(&trade.prices_stable),
            prices_native: parse_all(&trade.prices_native),
            pool_address: trade.pool_address.clone(),
            factory_address: trade.factory_address.clone(),
            lp_token_address: trade.lp_token_address.clone(),
            reserves: parse_all(&trade.token_reserves),
            // Stable valuation of reserves is not computed at ingest time
            reserves_stable: Vec::new(),
            reserves_native: parse_all(&trade.reserves_native),
            wallet_address: trade.wallet_address.clone(),
            is_reorged: trade.is_reorged != 0,
            amm: trade.amm.as_str().to_string(),
        }
    }
}
