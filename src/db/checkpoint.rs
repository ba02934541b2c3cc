//! Resumable progress, kept as key/value rows in the indexer state table.
//!
//! The state table is a ReplacingMergeTree keyed on `(chain, state_key)` with
//! `version` as the replacing column, so every update is a plain insert and the
//! newest version wins.
//!
//! Checkpoints are written under [`LAST_PROCESSED_HEIGHT_KEY`] and are always
//! heights. Rows under the legacy [`LAST_PROCESSED_BLOCK_KEY`] may hold slots,
//! and only those go through the slot correction.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use log::{info, warn};

use crate::{
    db::{
        models::{
            CheckpointState, IndexerStateRow, LAST_PROCESSED_BLOCK_KEY, LAST_PROCESSED_HEIGHT_KEY,
            SLOT_HEIGHT_OFFSET_KEY,
        },
        sink::{is_missing_table, quote, Sink, SinkBackend},
    },
    utils::{APPROXIMATE_SLOT_HEIGHT_OFFSET, SLOT_HEIGHT_THRESHOLD},
};

pub struct CheckpointManager<B> {
    sink: Arc<Sink<B>>,
    table: String,
    /// Height used when a chain has no checkpoint yet
    start_height: u64,
    last_version: u64,
    /// Slot-height offset, once measured or loaded
    offset: Option<u64>,
    offset_recorded: bool,
    slot_warning_logged: bool,
}

impl<B: SinkBackend> CheckpointManager<B> {
    pub fn new(sink: Arc<Sink<B>>, table: impl Into<String>, start_height: u64) -> Self {
        Self {
            sink,
            table: table.into(),
            start_height,
            last_version: 0,
            offset: None,
            offset_recorded: false,
            slot_warning_logged: false,
        }
    }

    /// Fail unless the state table exists.
    pub async fn ensure_table(&self) -> anyhow::Result<()> {
        if !self.sink.table_exists(&self.table).await? {
            anyhow::bail!("State table {} does not exist", self.table);
        }
        Ok(())
    }

    /// Latest row for `key`, `None` if there is none or the table is missing.
    async fn latest(&self, chain: &str, key: &str) -> anyhow::Result<Option<IndexerStateRow>> {
        let query = format!(
            "SELECT state_key, state_value, chain, updated_at, version FROM {} FINAL \
             WHERE chain = {} AND state_key = {} ORDER BY version DESC LIMIT 1",
            self.table,
            quote(chain),
            quote(key)
        );

        match self.sink.read::<IndexerStateRow>(&query).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(e) if is_missing_table(&e) => {
                info!("State table {} does not exist yet", self.table);
                Ok(None)
            },
            Err(e) => Err(e.context(format!("Failed to read {} from {}", key, self.table))),
        }
    }

    /// Offset used to correct a stored slot: measured, persisted, or approximate.
    async fn slot_height_offset(&self, chain: &str) -> anyhow::Result<u64> {
        if let Some(offset) = self.offset {
            return Ok(offset);
        }

        let persisted = self
            .latest(chain, SLOT_HEIGHT_OFFSET_KEY)
            .await?
            .and_then(|row| row.value_as_u64());

        Ok(persisted.unwrap_or(APPROXIMATE_SLOT_HEIGHT_OFFSET))
    }

    /// Full checkpoint row for `chain`, with legacy slots corrected to heights.
    pub async fn state(&self, chain: &str) -> anyhow::Result<Option<CheckpointState>> {
        let (row, legacy) = match self.latest(chain, LAST_PROCESSED_HEIGHT_KEY).await? {
            Some(row) => (row, false),
            None => match self.latest(chain, LAST_PROCESSED_BLOCK_KEY).await? {
                Some(row) => (row, true),
                None => return Ok(None),
            },
        };

        let Some(stored) = row.value_as_u64() else {
            warn!(
                "Ignoring unparseable checkpoint '{}' for chain {}",
                row.state_value, chain
            );
            return Ok(None);
        };

        let mut height = stored;
        let mut corrected_from = None;
        if legacy && stored > SLOT_HEIGHT_THRESHOLD {
            let offset = self.slot_height_offset(chain).await?;
            height = stored.saturating_sub(offset);
            corrected_from = Some(stored);
            warn!(
                "Checkpoint {} for chain {} looks like a slot, converting to height {} (offset {})",
                stored, chain, height, offset
            );
        }

        let updated_at =
            chrono::DateTime::from_timestamp(i64::from(row.updated_at), 0).unwrap_or_default();

        Ok(Some(CheckpointState {
            chain_id: row.chain,
            last_processed_height: height,
            version: row.version,
            updated_at,
            corrected_from,
        }))
    }

    /// Last processed block height for `chain`.
    pub async fn read(&self, chain: &str) -> anyhow::Result<Option<u64>> {
        Ok(self.state(chain).await?.map(|s| s.last_processed_height))
    }

    /// Height to resume from: one past the checkpoint, or the configured start.
    pub async fn starting_block(&self, chain: &str) -> anyhow::Result<u64> {
        match self.read(chain).await? {
            Some(height) => {
                info!("Resuming chain {} from checkpoint height {}", chain, height);
                Ok(height + 1)
            },
            None => {
                info!(
                    "No checkpoint for chain {}, starting at configured height {}",
                    chain, self.start_height
                );
                Ok(self.start_height)
            },
        }
    }

    /// Record `height` as the last fully processed block.
    ///
    /// A height above the slot threshold is written as given. The warning for it
    /// is logged once per manager.
    pub async fn write(&mut self, chain: &str, height: u64) -> anyhow::Result<()> {
        if height > SLOT_HEIGHT_THRESHOLD && !self.slot_warning_logged {
            warn!(
                "Writing checkpoint {} for chain {} which looks like a slot, not a height",
                height, chain
            );
            self.slot_warning_logged = true;
        }

        let row = IndexerStateRow::new(
            LAST_PROCESSED_HEIGHT_KEY,
            height.to_string(),
            chain,
            self.next_version(),
        );
        self.sink
            .insert(&self.table, &[row])
            .await
            .with_context(|| format!("Failed to write checkpoint {} for chain {}", height, chain))
    }

    /// Persist the measured `slot - height` offset. Only the first call per run writes.
    pub async fn record_offset(&mut self, chain: &str, offset: u64) -> anyhow::Result<()> {
        self.offset = Some(offset);
        if self.offset_recorded {
            return Ok(());
        }

        let row = IndexerStateRow::new(
            SLOT_HEIGHT_OFFSET_KEY,
            offset.to_string(),
            chain,
            self.next_version(),
        );
        self.sink
            .insert(&self.table, &[row])
            .await
            .with_context(|| format!("Failed to record slot-height offset for chain {}", chain))?;

        self.offset_recorded = true;
        info!("Recorded slot-height offset {} for chain {}", offset, chain);
        Ok(())
    }

    /// Wall-clock milliseconds, bumped to stay strictly increasing.
    fn next_version(&mut self) -> u64 {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        self.last_version = now.max(self.last_version + 1);
        self.last_version
    }
}
