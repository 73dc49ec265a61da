use alloy::primitives::Address;

use crate::ingest::types::TokenTransfer;

/// Select the transfers that represent the sender genuinely giving up tokens
/// in a swap.
///
/// A transfer qualifies when it originates from the transaction sender and is
/// not addressed to the zero address. A qualifying transfer is still dropped
/// when the same transaction contains a matching burn: a transfer of the same
/// token and amount, sent by this transfer's recipient to the zero address.
/// That pattern is a liquidity removal or intermediate burn, not the sender
/// retaining value.
///
/// An empty result means the transaction is not a swap candidate; callers
/// must stop before issuing any provider calls.
pub fn qualifying_transfers(transfers: &[TokenTransfer], sender: Address) -> Vec<TokenTransfer> {
    transfers
        .iter()
        .filter(|t| t.from == sender && t.to != Address::ZERO)
        .filter(|t| !canceled_by_burn(t, transfers))
        .cloned()
        .collect()
}

/// True when another log in the same transaction burns the exact amount of
/// the exact token that `entry` delivered to its recipient.
fn canceled_by_burn(entry: &TokenTransfer, transfers: &[TokenTransfer]) -> bool {
    transfers.iter().any(|burn| {
        burn.to == Address::ZERO
            && burn.token == entry.token
            && burn.from == entry.to
            && burn.amount == entry.amount
    })
}
