use borsh::{BorshDeserialize, BorshSerialize};
use solana_pubkey::Pubkey;

use super::strip_discriminator;

/// Pump.fun `TradeEvent`, emitted by every buy and sell.
pub const TRADE_EVENT_DISCRIMINATOR: [u8; 16] = [
    0xe4, 0x45, 0xa5, 0x2e, 0x51, 0xcb, 0x9a, 0x1d, 0xbd, 0xdb, 0x7f, 0xd3, 0x4e, 0xe6, 0x61, 0xee,
];

/// Minimum payload length accepted before attempting to deserialize.
pub const TRADE_EVENT_MIN_LEN: usize = 230;

/// Top-level buy/sell instruction account holding the bonding curve.
pub const BONDING_CURVE_ACCOUNT_INDEX: usize = 3;

/// Field order must match the on-chain struct exactly.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct PumpTradeEvent {
    pub mint: Pubkey,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub is_buy: bool,
    pub user: Pubkey,
    pub timestamp: i64,
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub fee_recipient: Pubkey,
    pub fee_basis_points: u64,
    pub fee: u64,
    pub creator: Pubkey,
    pub creator_fee_basis_points: u64,
    pub creator_fee: u64,
    pub track_volume: bool,
    pub total_unclaimed_tokens: u64,
    pub total_claimed_tokens: u64,
    pub current_sol_volume: u64,
    pub last_update_timestamp: i64,
}

pub fn decode(data: &[u8]) -> Option<PumpTradeEvent> {
    let payload = strip_discriminator(data, &TRADE_EVENT_DISCRIMINATOR)?;
    if payload.len() < TRADE_EVENT_MIN_LEN {
        return None;
    }
    PumpTradeEvent::deserialize(&mut &payload[..]).ok()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample(is_buy: bool) -> PumpTradeEvent {
        PumpTradeEvent {
            mint: Pubkey::new_from_array([9u8; 32]),
            sol_amount: 2_000_000_000,
            token_amount: 100_000_000,
            is_buy,
            user: Pubkey::new_from_array([8u8; 32]),
            timestamp: 1_735_689_600,
            virtual_sol_reserves: 30_000_000_000,
            virtual_token_reserves: 1_073_000_000_000_000,
            real_sol_reserves: 5_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            fee_recipient: Pubkey::new_from_array([7u8; 32]),
            fee_basis_points: 95,
            fee: 19_000_000,
            creator: Pubkey::new_from_array([6u8; 32]),
            creator_fee_basis_points: 5,
            creator_fee: 1_000_000,
            track_volume: true,
            total_unclaimed_tokens: 0,
            total_claimed_tokens: 0,
            current_sol_volume: 2_000_000_000,
            last_update_timestamp: 1_735_689_600,
        }
    }

    pub(crate) fn encode(event: &PumpTradeEvent) -> Vec<u8> {
        let mut data = TRADE_EVENT_DISCRIMINATOR.to_vec();
        data.extend(borsh::to_vec(event).unwrap());
        data
    }

    #[test]
    fn test_decodes_trade_event() {
        let event = sample(false);
        let data = encode(&event);
        // 4 pubkeys, 15 eight-byte integers, 2 bools
        assert_eq!(data.len(), 16 + 4 * 32 + 15 * 8 + 2);
        assert_eq!(decode(&data), Some(event));
    }

    #[test]
    fn test_rejects_short_payload() {
        let data = encode(&sample(true));
        assert!(decode(&data[..16 + TRADE_EVENT_MIN_LEN - 1]).is_none());
    }

    #[test]
    fn test_rejects_payload_that_fails_to_deserialize() {
        // Long enough to pass the length gate, too short for the full struct
        let data = encode(&sample(true));
        assert!(decode(&data[..16 + TRADE_EVENT_MIN_LEN + 4]).is_none());
    }

    #[test]
    fn test_rejects_invalid_bool() {
        let mut data = encode(&sample(true));
        // mint (32) + sol_amount (8) + token_amount (8)
        data[16 + 48] = 2;
        assert!(decode(&data).is_none());
    }
}
