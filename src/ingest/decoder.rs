use alloy::primitives::U256;
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;

use super::types::{TokenTransfer, Withdrawal as WithdrawalLog};

// Event ABIs via alloy's sol! macro: gives us SIGNATURE_HASH constants and
// typed topic layouts for the two log shapes the detector consumes.
sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
    event Withdrawal(address indexed src, uint256 wad);
}

/// Attempt to decode a log as an ERC-20 Transfer event.
///
/// Returns `None` when the log doesn't match the Transfer signature or is
/// malformed. Any contract qualifies; the classifier decides relevance.
pub fn decode_transfer_log(log: &Log) -> Option<TokenTransfer> {
    let inner = &log.inner;
    let topics = inner.data.topics();
    if topics.len() != 3 || topics[0] != Transfer::SIGNATURE_HASH {
        return None;
    }

    let data = inner.data.data.as_ref();
    if data.len() < 32 {
        return None;
    }

    Some(TokenTransfer {
        token: inner.address,
        from: alloy::primitives::Address::from_word(topics[1]),
        to: alloy::primitives::Address::from_word(topics[2]),
        amount: U256::from_be_slice(&data[..32]),
    })
}

/// Attempt to decode a log as a wrapped-native Withdrawal event.
pub fn decode_withdrawal_log(log: &Log) -> Option<WithdrawalLog> {
    let inner = &log.inner;
    let topics = inner.data.topics();
    if topics.len() != 2 || topics[0] != Withdrawal::SIGNATURE_HASH {
        return None;
    }

    let data = inner.data.data.as_ref();
    if data.len() < 32 {
        return None;
    }

    Some(WithdrawalLog {
        contract: inner.address,
        src: alloy::primitives::Address::from_word(topics[1]),
        amount: U256::from_be_slice(&data[..32]),
    })
}

/// Decode one transaction's receipt logs into the transfer and withdrawal
/// lists the engine consumes, preserving log order.
pub fn decode_receipt_logs(logs: &[Log]) -> (Vec<TokenTransfer>, Vec<WithdrawalLog>) {
    let mut transfers = Vec::new();
    let mut withdrawals = Vec::new();
    for log in logs {
        if let Some(transfer) = decode_transfer_log(log) {
            transfers.push(transfer);
        } else if let Some(withdrawal) = decode_withdrawal_log(log) {
            withdrawals.push(withdrawal);
        }
    }
    (transfers, withdrawals)
}
