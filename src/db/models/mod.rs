pub mod checkpoint;
pub mod trade;

pub use checkpoint::{
    CheckpointState, IndexerStateRow, LAST_PROCESSED_BLOCK_KEY, LAST_PROCESSED_HEIGHT_KEY,
    SLOT_HEIGHT_OFFSET_KEY,
};
pub use trade::{Amm, DexTrade, DexTradeRow, SwapType};
