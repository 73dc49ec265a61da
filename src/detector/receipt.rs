use alloy::primitives::{Address, U256};
use bigdecimal::BigDecimal;
use serde::Deserialize;

use super::amount::wei_to_native;
use crate::ingest::types::TxEvent;

/// The two provider queries the core needs. Implemented over an RPC client
/// in `crate::provider`; tests inject a mock.
pub trait ChainProvider {
    /// Transaction count (nonce) of `address` as of `block`.
    fn transaction_count(
        &self,
        address: Address,
        block: u64,
    ) -> impl std::future::Future<Output = eyre::Result<u64>> + Send;

    /// Native balance of `address` as of `block`, in wei.
    fn native_balance(
        &self,
        address: Address,
        block: u64,
    ) -> impl std::future::Future<Output = eyre::Result<U256>> + Send;
}

/// How native receipts are detected on a chain. Chosen once at
/// configuration-resolution time, never re-decided per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReceiptStrategy {
    /// `balance(N) - balance(N-1)` of the sender, via provider queries.
    BalanceDiff,
    /// Sum of Withdrawal events emitted by the wrapped-native contract.
    WithdrawalEvents,
    /// Sum of wrapped-native transfers to the zero address, for chains whose
    /// wrapped token represents unwrapping as a burn instead of an event.
    BurnToZero,
}

/// Compute how much native value the sender actually received in this
/// transaction, in native units. May be negative under the balance-diff
/// strategy (the sender spent more than it got back); callers treat anything
/// not strictly positive as "no receipt".
pub async fn native_received<P: ChainProvider>(
    strategy: ReceiptStrategy,
    provider: &P,
    tx: &TxEvent,
    wrapped_native: Address,
) -> eyre::Result<BigDecimal> {
    match strategy {
        ReceiptStrategy::BalanceDiff => {
            let after = provider.native_balance(tx.sender, tx.block_number).await?;
            let before = provider
                .native_balance(tx.sender, tx.block_number.saturating_sub(1))
                .await?;
            Ok(wei_to_native(after) - wei_to_native(before))
        }
        ReceiptStrategy::WithdrawalEvents => {
            let total = tx
                .withdrawals
                .iter()
                .filter(|w| w.contract == wrapped_native)
                .fold(U256::ZERO, |acc, w| acc.saturating_add(w.amount));
            Ok(wei_to_native(total))
        }
        ReceiptStrategy::BurnToZero => {
            let total = tx
                .transfers
                .iter()
                .filter(|t| t.token == wrapped_native && t.to == Address::ZERO)
                .fold(U256::ZERO, |acc, t| acc.saturating_add(t.amount));
            Ok(wei_to_native(total))
        }
    }
}
