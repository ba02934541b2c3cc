use crate::{
    db::models::{Amm, DexTrade},
    decoder::{pump::BONDING_CURVE_ACCOUNT_INDEX, PumpTradeEvent},
    normalizer::{ChainTokens, InstructionContext},
    utils::ratio_string,
};

/// Map a bonding-curve `TradeEvent` onto a trade.
///
/// Buys spend SOL for the mint, sells the reverse. Reserves follow the same
/// index order as the token addresses.
pub fn normalize(
    event: &PumpTradeEvent,
    ctx: &InstructionContext<'_>,
    tokens: &ChainTokens,
) -> DexTrade {
    let mint = event.mint.to_string();
    let sol_amount = event.sol_amount.to_string();
    let token_amount = event.token_amount.to_string();
    let real_sol = event.real_sol_reserves.to_string();
    let real_token = event.real_token_reserves.to_string();

    let pool_address = ctx
        .instruction
        .accounts
        .get(BONDING_CURVE_ACCOUNT_INDEX)
        .cloned()
        .unwrap_or_else(|| mint.clone());

    let (token_addresses, token_amounts, token_reserves) = if event.is_buy {
        (
            [tokens.native.clone(), mint],
            [sol_amount.clone(), token_amount],
            vec![real_sol.clone(), real_token],
        )
    } else {
        (
            [mint, tokens.native.clone()],
            [token_amount, sol_amount.clone()],
            vec![real_token, real_sol.clone()],
        )
    };

    let swap_type = tokens.swap_type(&token_addresses[1]);

    DexTrade {
        transaction_hash: ctx.transaction_hash(),
        block_number: ctx.block.slot,
        block_height: ctx.block.height,
        block_hash: ctx.block.hash.clone(),
        // Pump events carry their own timestamp
        block_timestamp: event.timestamp,
        log_index: ctx.log_index(),

        pool_address,
        wallet_address: event.user.to_string(),
        factory_address: ctx.instruction.program_id.clone(),
        lp_token_address: String::new(),

        event_type: "swap".to_string(),
        amm: Amm::Pump,
        swap_type,
        token_addresses,
        token_amounts,
        token_reserves,

        amount_native: sol_amount,
        amount_stable: "0".to_string(),
        prices_native: vec![ratio_string(event.sol_amount, event.token_amount)],
        prices_stable: Vec::new(),
        reserves_native: vec![real_sol],

        is_reorged: 0,
    }
}
