use borsh::{BorshDeserialize, BorshSerialize};
use solana_pubkey::Pubkey;

use super::strip_discriminator;

/// Jupiter V6 `SwapEvent`, emitted once per route leg.
pub const SWAP_EVENT_DISCRIMINATOR: [u8; 16] = [
    0xe4, 0x45, 0xa5, 0x2e, 0x51, 0xcb, 0x9a, 0x1d, 0x40, 0xc6, 0xcd, 0xe8, 0x26, 0x08, 0x71, 0xe2,
];

/// Jupiter `FeeEvent`. Shares the first 8 bytes with `SwapEvent`.
pub const FEE_EVENT_DISCRIMINATOR: [u8; 16] = [
    0xe4, 0x45, 0xa5, 0x2e, 0x51, 0xcb, 0x9a, 0x1d, 0x49, 0x4f, 0x4e, 0x7f, 0xb8, 0xd5, 0x0d, 0xdc,
];

/// Jupiter `SwapsEvent`. Shares the first 8 bytes with `SwapEvent`.
pub const SWAPS_EVENT_DISCRIMINATOR: [u8; 16] = [
    0xe4, 0x45, 0xa5, 0x2e, 0x51, 0xcb, 0x9a, 0x1d, 0x98, 0x2f, 0x4e, 0xeb, 0xc0, 0x60, 0x6e, 0x6a,
];

/// 32 (amm) + 32 (input_mint) + 8 (input_amount) + 32 (output_mint) + 8 (output_amount)
pub const SWAP_EVENT_LEN: usize = 112;

/// Field order must match the on-chain struct exactly.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct JupiterSwapEvent {
    pub amm: Pubkey,
    pub input_mint: Pubkey,
    pub input_amount: u64,
    pub output_mint: Pubkey,
    pub output_amount: u64,
}

pub fn decode(data: &[u8]) -> Option<JupiterSwapEvent> {
    let payload = strip_discriminator(data, &SWAP_EVENT_DISCRIMINATOR)?;
    if payload.len() < SWAP_EVENT_LEN {
        return None;
    }
    JupiterSwapEvent::deserialize(&mut &payload[..]).ok()
}
