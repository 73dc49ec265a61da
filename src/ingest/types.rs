use alloy::primitives::{Address, B256, U256};

/// One decoded ERC-20 Transfer log within a transaction.
#[derive(Debug, Clone)]
pub struct TokenTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// One decoded wrapped-native Withdrawal log within a transaction.
#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub contract: Address,
    pub src: Address,
    pub amount: U256,
}

/// One transaction's worth of decoded events, in blockchain order.
/// This is the unit the detection engine consumes.
#[derive(Debug, Clone)]
pub struct TxEvent {
    pub chain_id: u64,
    pub sender: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub timestamp: u64,
    pub transfers: Vec<TokenTransfer>,
    pub withdrawals: Vec<Withdrawal>,
}
