//! Batch loop: pull blocks, extract trades, persist, checkpoint, report.
//!
//! Strictly sequential. A batch's trades are inserted before its checkpoint is
//! written, so a crash between the two replays the batch on restart.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::Context;
use log::{info, warn};

use crate::{
    config::{InsertFailurePolicy, Settings},
    db::{models::DexTradeRow, CheckpointManager, Sink, SinkBackend},
    gateway::{Block, BlockSource, ChainHead, SolanaRpcClient, StreamRequest},
    normalizer::ChainTokens,
    utils::{format_duration, WhitelistFilter},
    worker::parser::{parse_blocks, ParseResult, ProgramRegistry},
};

/// Sync position relative to the target height.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncProgress {
    pub percent: f64,
    pub remaining: u64,
    pub eta: Option<Duration>,
}

pub fn sync_progress(
    start_height: u64,
    current_height: u64,
    target_height: u64,
    blocks_per_second: f64,
) -> SyncProgress {
    let remaining = target_height.saturating_sub(current_height);
    if remaining == 0 {
        return SyncProgress {
            percent: 100.0,
            remaining: 0,
            eta: Some(Duration::ZERO),
        };
    }

    let span = target_height.saturating_sub(start_height).max(1) as f64;
    let done = current_height.saturating_sub(start_height) as f64;
    let eta = (blocks_per_second > 0.0)
        .then(|| Duration::from_secs_f64(remaining as f64 / blocks_per_second));

    SyncProgress {
        percent: (done / span * 100.0).clamp(0.0, 100.0),
        remaining,
        eta,
    }
}

/// Counters kept across batches of one run.
#[derive(Debug, Default)]
struct RunStats {
    batches: u64,
    blocks: u64,
    trades: u64,
}

pub struct Indexer<S, B, H = SolanaRpcClient> {
    source: S,
    sink: Arc<Sink<B>>,
    checkpoint: CheckpointManager<B>,
    whitelist: Arc<WhitelistFilter>,
    programs: ProgramRegistry,
    tokens: ChainTokens,
    rpc: Option<H>,
    chain_id: String,
    trades_table: String,
    end_height: Option<u64>,
    on_insert_failure: InsertFailurePolicy,
}

impl<S: BlockSource, B: SinkBackend, H: ChainHead> Indexer<S, B, H> {
    pub fn new(
        source: S,
        sink: Arc<Sink<B>>,
        settings: &Settings,
        whitelist: Arc<WhitelistFilter>,
    ) -> Self {
        let indexer = &settings.indexer;
        let checkpoint = CheckpointManager::new(
            sink.clone(),
            settings.clickhouse.state_table.clone(),
            indexer.start_height,
        );

        Self {
            source,
            sink,
            checkpoint,
            whitelist,
            programs: ProgramRegistry::new(&indexer.jupiter_program_ids, &indexer.pump_program_id),
            tokens: ChainTokens::new(
                indexer.native_token_address.clone(),
                indexer.stable_token_address.clone(),
            ),
            rpc: None,
            chain_id: indexer.chain_id.clone(),
            trades_table: settings.clickhouse.trades_table.clone(),
            end_height: indexer.end_height,
            on_insert_failure: indexer.on_insert_failure,
        }
    }

    /// Use `rpc` to locate the chain head for progress reporting.
    pub fn with_rpc(mut self, rpc: H) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Readiness checks, then resolve the start height and open the stream.
    /// Returns `None` when the configured range is already complete.
    async fn init(&mut self) -> anyhow::Result<Option<u64>> {
        self.sink.health_check().await?;

        if !self.sink.table_exists(&self.trades_table).await? {
            anyhow::bail!("Trades table {} does not exist", self.trades_table);
        }
        self.checkpoint.ensure_table().await?;

        let whitelisted = self.whitelist.len();
        if whitelisted > 0 {
            info!("Whitelist loaded with {} tokens", whitelisted);
        }

        let start_height = self.checkpoint.starting_block(&self.chain_id).await?;
        if let Some(end_height) = self.end_height {
            if start_height > end_height {
                info!(
                    "Chain {} already indexed up to end height {}, nothing to do",
                    self.chain_id, end_height
                );
                return Ok(None);
            }
        }

        self.source
            .open(StreamRequest {
                from_height: start_height,
                to_height: self.end_height,
                program_ids: self.programs.program_ids(),
            })
            .await
            .context("Failed to open block stream")?;

        info!(
            "Chain {} indexing from height {}{}",
            self.chain_id,
            start_height,
            self.end_height
                .map(|h| format!(" to {}", h))
                .unwrap_or_default()
        );

        Ok(Some(start_height))
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let Some(start_height) = self.init().await? else {
            return Ok(());
        };

        let started = Instant::now();
        let mut stats = RunStats::default();
        let mut offset: Option<u64> = None;
        let mut head_height: Option<u64> = None;

        while let Some(blocks) = self.source.next_batch().await? {
            let Some(last) = blocks.last().map(|b| b.header.clone()) else {
                continue;
            };

            // First block of the first batch: measure the slot-height offset
            if offset.is_none() {
                let first = &blocks[0].header;
                let measured = first.slot.saturating_sub(first.height);
                if let Err(e) = self.checkpoint.record_offset(&self.chain_id, measured).await {
                    warn!(
                        "Chain {}: Failed to record slot-height offset: {:#}",
                        self.chain_id, e
                    );
                }
                offset = Some(measured);
            }
            let current_offset = offset.unwrap_or_default();

            // Refresh the head once we catch up with the last known one
            if head_height.map_or(true, |head| last.height >= head) {
                head_height = self.chain_head_height(current_offset).await.or(head_height);
            }

            let result = parse_blocks(&blocks, &self.programs, &self.tokens, &self.whitelist);

            self.persist(&result).await?;

            if let Err(e) = self.checkpoint.write(&self.chain_id, last.height).await {
                return Err(anyhow::anyhow!(
                    "Critical: Failed to update checkpoint for chain {}: {:?}. Stopping to prevent data loss.",
                    self.chain_id, e
                ));
            }

            stats.batches += 1;
            stats.blocks += blocks.len() as u64;
            stats.trades += result.trades.len() as u64;

            self.report(&blocks, &result, &stats, started, start_height, head_height);
            info!(
                "Chain {} checkpoint saved at height {} (slot {})",
                self.chain_id, last.height, last.slot
            );
        }

        info!(
            "Chain {} stream finished: {} blocks, {} trades in {}",
            self.chain_id,
            stats.blocks,
            stats.trades,
            format_duration(started.elapsed())
        );
        Ok(())
    }

    /// Bulk insert the batch's trades, applying the insert failure policy.
    async fn persist(&self, result: &ParseResult) -> anyhow::Result<()> {
        if result.trades.is_empty() {
            return Ok(());
        }

        let rows: Vec<DexTradeRow> = result.trades.iter().map(DexTradeRow::from).collect();
        match self.sink.insert(&self.trades_table, &rows).await {
            Ok(()) => Ok(()),
            Err(e) => match self.on_insert_failure {
                InsertFailurePolicy::Skip => {
                    warn!(
                        "Chain {}: Failed to insert {} trades: {:#}. Skipping them and continuing",
                        self.chain_id,
                        rows.len(),
                        e
                    );
                    Ok(())
                },
                InsertFailurePolicy::Fail => Err(e.context(format!(
                    "Failed to insert {} trades for chain {}",
                    rows.len(),
                    self.chain_id
                ))),
            },
        }
    }

    /// Chain head as a block height, if an RPC endpoint is configured.
    async fn chain_head_height(&self, offset: u64) -> Option<u64> {
        let rpc = self.rpc.as_ref()?;
        match rpc.head_slot().await {
            Ok(slot) => Some(slot.saturating_sub(offset)),
            Err(e) => {
                warn!("Chain {}: Failed to fetch chain head: {:#}", self.chain_id, e);
                None
            },
        }
    }

    fn report(
        &self,
        blocks: &[Block],
        result: &ParseResult,
        stats: &RunStats,
        started: Instant,
        start_height: u64,
        head_height: Option<u64>,
    ) {
        let (Some(first), Some(last)) = (blocks.first(), blocks.last()) else {
            return;
        };

        info!(
            "Chain {} batch {}: {} blocks, heights {}-{}, slots {}-{}, {} instructions, {} trades (Jupiter: {}, Pump: {}, filtered: {})",
            self.chain_id,
            stats.batches,
            blocks.len(),
            first.header.height,
            last.header.height,
            first.header.slot,
            last.header.slot,
            result.instruction_count,
            result.trades.len(),
            result.jupiter_trades,
            result.pump_trades,
            result.filtered_trades
        );

        let elapsed = started.elapsed();
        let blocks_per_second = if elapsed.as_secs_f64() > 0.0 {
            stats.blocks as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        let target = self.end_height.or(head_height);
        let progress = match target {
            Some(target) => {
                let progress =
                    sync_progress(start_height, last.header.height, target, blocks_per_second);
                let eta = progress
                    .eta
                    .map(format_duration)
                    .unwrap_or_else(|| "calculating".to_string());
                format!(
                    "progress {:.2}% ({} blocks remaining), ETA {}",
                    progress.percent, progress.remaining, eta
                )
            },
            None => format!("height {}, ETA unknown", last.header.height),
        };

        info!(
            "Chain {} speed: {:.2} blocks/s, {} blocks total, running {}, {}",
            self.chain_id,
            blocks_per_second,
            stats.blocks,
            format_duration(elapsed),
            progress
        );
    }
}
