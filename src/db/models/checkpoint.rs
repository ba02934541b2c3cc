use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::{Deserialize, Serialize};

/// State key holding the last fully processed block height.
///
/// Every value under this key is a height, so it is never corrected on read.
pub const LAST_PROCESSED_HEIGHT_KEY: &str = "last_processed_height";

/// Legacy state key whose values may be slots stored by mistake.
///
/// Only read, as a fallback when no [`LAST_PROCESSED_HEIGHT_KEY`] row exists.
pub const LAST_PROCESSED_BLOCK_KEY: &str = "last_processed_block";

/// State key holding the measured `slot - height` offset.
pub const SLOT_HEIGHT_OFFSET_KEY: &str = "slot_height_offset";

/// Indexer sync progress checkpoint.
///
/// Tracks the last block height whose batch was fully processed for a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointState {
    pub chain_id: String,
    pub last_processed_height: u64,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    /// Raw stored value when it was read as a slot and converted
    pub corrected_from: Option<u64>,
}

/// Key/value row of the `solana_indexer_state` table (ReplacingMergeTree on `version`).
#[derive(Debug, Clone, Serialize, Deserialize, Row, PartialEq)]
pub struct IndexerStateRow {
    pub state_key: String,
    pub state_value: String,
    pub chain: String,
    /// `DateTime` column, unix seconds
    pub updated_at: u32,
    /// Unix milliseconds, strictly increasing per writer
    pub version: u64,
}

impl IndexerStateRow {
    pub fn new(key: &str, value: String, chain: &str, version: u64) -> Self {
        Self {
            state_key: key.to_string(),
            state_value: value,
            chain: chain.to_string(),
            updated_at: u32::try_from(version / 1_000).unwrap_or(u32::MAX),
            version,
        }
    }

    pub fn value_as_u64(&self) -> Option<u64> {
        self.state_value.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_row_derives_seconds_from_version() {
        let row = IndexerStateRow::new(LAST_PROCESSED_HEIGHT_KEY, "5".to_string(), "c", 1_500_999);
        assert_eq!(row.updated_at, 1_500);
        assert_eq!(row.chain, "c");
        assert_eq!(row.value_as_u64(), Some(5));
    }

    #[test]
    fn test_value_parsing() {
        let mut row = IndexerStateRow::new(LAST_PROCESSED_BLOCK_KEY, " 370000000 ".to_string(), "c", 1);
        assert_eq!(row.value_as_u64(), Some(370_000_000));
        row.state_value = "n/a".to_string();
        assert_eq!(row.value_as_u64(), None);
    }
}
