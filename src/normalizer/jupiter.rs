use crate::{
    db::models::{Amm, DexTrade},
    decoder::JupiterSwapEvent,
    normalizer::{ChainTokens, InstructionContext},
    utils::ratio_string,
};

/// Map a route-leg `SwapEvent` onto a trade. The event's own input/output order
/// is kept: index 0 spent, index 1 received.
pub fn normalize(
    event: &JupiterSwapEvent,
    ctx: &InstructionContext<'_>,
    tokens: &ChainTokens,
) -> DexTrade {
    let token_in = event.input_mint.to_string();
    let token_out = event.output_mint.to_string();

    let price = ratio_string(event.input_amount, event.output_amount);
    let swap_type = tokens.swap_type(&token_out);

    let amount_native = if tokens.is_native(&token_in) {
        event.input_amount.to_string()
    } else if tokens.is_native(&token_out) {
        event.output_amount.to_string()
    } else {
        "0".to_string()
    };

    // Stable valuation only when one side is the stablecoin itself
    let (amount_stable, prices_stable) = if tokens.is_stable(&token_in) {
        (
            event.input_amount.to_string(),
            vec![ratio_string(event.input_amount, event.output_amount)],
        )
    } else if tokens.is_stable(&token_out) {
        (
            event.output_amount.to_string(),
            vec![ratio_string(event.output_amount, event.input_amount)],
        )
    } else {
        ("0".to_string(), Vec::new())
    };

    DexTrade {
        transaction_hash: ctx.transaction_hash(),
        block_number: ctx.block.slot,
        block_height: ctx.block.height,
        block_hash: ctx.block.hash.clone(),
        block_timestamp: ctx.block.timestamp,
        log_index: ctx.log_index(),

        pool_address: event.amm.to_string(),
        wallet_address: ctx.transaction.fee_payer().unwrap_or_default().to_string(),
        factory_address: ctx.instruction.program_id.clone(),
        lp_token_address: String::new(),

        event_type: "swap".to_string(),
        amm: Amm::JupiterV6,
        swap_type,
        token_addresses: [token_in, token_out],
        token_amounts: [
            event.input_amount.to_string(),
            event.output_amount.to_string(),
        ],
        token_reserves: Vec::new(),

        amount_native,
        amount_stable,
        prices_native: vec![price],
        prices_stable,
        reserves_native: Vec::new(),

        is_reorged: 0,
    }
}
