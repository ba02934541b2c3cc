//! Instruction walking for gateway block batches.
//!
//! Turns a batch of blocks into normalized, whitelisted trades in a single
//! linear pass over each block's instruction list.

use log::debug;
use rustc_hash::FxHashMap;

use crate::{
    db::models::DexTrade,
    decoder::{self, ProgramKind},
    gateway::{Block, Instruction},
    normalizer::{self, ChainTokens, InstructionContext},
    utils::WhitelistFilter,
};

/// Tracked program ids and the family each belongs to.
#[derive(Debug, Clone, Default)]
pub struct ProgramRegistry {
    programs: FxHashMap<String, ProgramKind>,
}

impl ProgramRegistry {
    pub fn new(jupiter_program_ids: &[String], pump_program_id: &str) -> Self {
        let mut programs = FxHashMap::default();
        for id in jupiter_program_ids {
            programs.insert(id.clone(), ProgramKind::Jupiter);
        }
        programs.insert(pump_program_id.to_string(), ProgramKind::Pump);
        Self { programs }
    }

    pub fn kind_of(&self, program_id: &str) -> Option<ProgramKind> {
        self.programs.get(program_id).copied()
    }

    /// Sorted program ids, for the gateway subscription.
    pub fn program_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.programs.keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Result of parsing one batch.
#[derive(Debug, Default)]
pub struct ParseResult {
    /// Accepted trades in block, transaction and instruction order
    pub trades: Vec<DexTrade>,
    /// Invocations of tracked programs in successful transactions, nested ones included
    pub instruction_count: usize,
    pub jupiter_trades: usize,
    pub pump_trades: usize,
    /// Trades dropped by the whitelist
    pub filtered_trades: usize,
    /// Event candidates whose data was not valid base58
    pub malformed: usize,
}

/// Walk each block's instructions once and collect the trades they emitted.
///
/// An instruction of a tracked program is an event candidate when an enclosing
/// instruction of the same program exists, since Anchor emits events as a
/// self-CPI. The candidate is decoded with its own program's decoder and the
/// nearest such enclosing instruction is its context. Any other tracked
/// instruction is counted as an invocation.
pub fn parse_blocks(
    blocks: &[Block],
    programs: &ProgramRegistry,
    tokens: &ChainTokens,
    whitelist: &WhitelistFilter,
) -> ParseResult {
    let mut result = ParseResult::default();

    for block in blocks {
        // Tracked instructions enclosing the current one, outermost first
        let mut ancestors: Vec<(&Instruction, ProgramKind)> = Vec::new();

        for ix in &block.instructions {
            while ancestors
                .last()
                .is_some_and(|(ancestor, _)| !ancestor.is_ancestor_of(ix))
            {
                ancestors.pop();
            }

            let Some(kind) = programs.kind_of(&ix.program_id) else {
                continue;
            };
            let anchor = ancestors
                .iter()
                .rev()
                .find(|(_, ancestor_kind)| *ancestor_kind == kind)
                .map(|(ancestor, _)| *ancestor);
            ancestors.push((ix, kind));

            let Some(transaction) = block.transaction(ix.transaction_index) else {
                debug!(
                    "Block {}: instruction {:?} references missing transaction {}",
                    block.header.height, ix.instruction_address, ix.transaction_index
                );
                continue;
            };

            if !transaction.is_success() {
                continue;
            }

            let Some(anchor) = anchor else {
                result.instruction_count += 1;
                continue;
            };

            let ctx = InstructionContext {
                block: &block.header,
                transaction,
                instruction: anchor,
            };

            let data = match bs58::decode(&ix.data).into_vec() {
                Ok(data) => data,
                Err(e) => {
                    debug!(
                        "Skipping inner instruction {:?} of {}: invalid base58 data: {}",
                        ix.instruction_address,
                        ctx.transaction_hash(),
                        e
                    );
                    result.malformed += 1;
                    continue;
                },
            };

            let Some(event) = decoder::decode(kind, &data) else {
                continue;
            };

            let trade = normalizer::normalize(&event, &ctx, tokens);
            if !whitelist.has_whitelisted_token(&trade.token_addresses) {
                result.filtered_trades += 1;
                continue;
            }

            match kind {
                ProgramKind::Jupiter => result.jupiter_trades += 1,
                ProgramKind::Pump => result.pump_trades += 1,
            }
            result.trades.push(trade);
        }
    }

    result
}
