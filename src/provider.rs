use alloy::primitives::{Address, U256};
use alloy::providers::Provider;
use std::time::Duration;

use crate::detector::receipt::ChainProvider;

/// RPC-backed implementation of the queries the engine needs.
///
/// Every call carries a bounded timeout; the engine treats a timeout like any
/// other provider failure and classifies the transaction as a non-candidate.
pub struct RpcChainProvider<P> {
    inner: P,
    timeout: Duration,
}

impl<P> RpcChainProvider<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl<P: Provider> ChainProvider for RpcChainProvider<P> {
    async fn transaction_count(&self, address: Address, block: u64) -> eyre::Result<u64> {
        let call = async {
            self.inner
                .get_transaction_count(address)
                .block_id(block.into())
                .await
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| eyre::eyre!("get_transaction_count failed: {}", e)),
            Err(_) => Err(eyre::eyre!(
                "get_transaction_count timed out after {:?}",
                self.timeout
            )),
        }
    }

    async fn native_balance(&self, address: Address, block: u64) -> eyre::Result<U256> {
        let call = async {
            self.inner
                .get_balance(address)
                .block_id(block.into())
                .await
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| eyre::eyre!("get_balance failed: {}", e)),
            Err(_) => Err(eyre::eyre!(
                "get_balance timed out after {:?}",
                self.timeout
            )),
        }
    }
}
