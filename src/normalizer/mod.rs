//! Event to [`DexTrade`] normalization.
//!
//! Each program family maps its decoded event onto the canonical record in its
//! own module. Amounts stay raw integer strings, no decimals are applied.

pub mod jupiter;
pub mod pump;

use crate::{
    db::models::{DexTrade, SwapType},
    decoder::Event,
    gateway::{BlockHeader, Instruction, Transaction},
};

/// Reference tokens used to classify trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTokens {
    /// Wrapped SOL mint
    pub native: String,
    /// USDC mint
    pub stable: String,
}

impl ChainTokens {
    pub fn new(native: impl Into<String>, stable: impl Into<String>) -> Self {
        Self {
            native: native.into(),
            stable: stable.into(),
        }
    }

    pub fn is_native(&self, address: &str) -> bool {
        address == self.native
    }

    pub fn is_stable(&self, address: &str) -> bool {
        address == self.stable
    }

    /// A trade is a sell exactly when the received token is native or stable.
    pub fn swap_type(&self, received: &str) -> SwapType {
        if self.is_native(received) || self.is_stable(received) {
            SwapType::Sell
        } else {
            SwapType::Buy
        }
    }
}

/// Everything around the inner instruction that carried an event.
#[derive(Debug, Clone, Copy)]
pub struct InstructionContext<'a> {
    pub block: &'a BlockHeader,
    pub transaction: &'a Transaction,
    /// Nearest enclosing instruction of the event's own program, top-level or nested
    pub instruction: &'a Instruction,
}

impl InstructionContext<'_> {
    pub fn transaction_hash(&self) -> String {
        self.transaction.signature().unwrap_or_default().to_string()
    }

    pub fn log_index(&self) -> u32 {
        self.instruction.top_level_index().unwrap_or_default()
    }
}

pub fn normalize(event: &Event, ctx: &InstructionContext<'_>, tokens: &ChainTokens) -> DexTrade {
    match event {
        Event::JupiterSwap(swap) => jupiter::normalize(swap, ctx, tokens),
        Event::PumpTrade(trade) => pump::normalize(trade, ctx, tokens),
    }
}
