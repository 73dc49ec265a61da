use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::detector::amount::parse_address;
use crate::detector::receipt::ReceiptStrategy;

/// Immutable per-chain parameters the engine reads at evaluation time.
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub chain_id: u64,
    pub name: String,
    /// Chainlink native/USD aggregator used by the threshold refresh.
    pub native_usd_aggregator: Address,
    pub wrapped_native: Address,
    pub min_native_threshold: BigDecimal,
    pub receipt_strategy: ReceiptStrategy,
}

/// Versioned holder of the current chain parameters.
///
/// The engine reads a fresh snapshot per transaction; the price-refresh task
/// swaps in a new one when the USD-denominated threshold is re-converted.
/// A failed refresh leaves the previous snapshot in place.
pub struct ChainState {
    snapshot: RwLock<Arc<ChainSnapshot>>,
}

impl ChainState {
    /// Resolve parameters for a chain id. Unknown ids are a hard error: the
    /// detector must not run with undefined thresholds.
    pub fn for_chain(chain_id: u64) -> eyre::Result<Self> {
        let builtin = builtin_params(chain_id)
            .ok_or_else(|| eyre::eyre!("Unsupported chain id {}", chain_id))?;

        let snapshot = ChainSnapshot {
            chain_id,
            name: builtin.name.to_string(),
            native_usd_aggregator: parse_address(builtin.native_usd_aggregator)?,
            wrapped_native: parse_address(builtin.wrapped_native)?,
            min_native_threshold: BigDecimal::from_str(builtin.min_native_threshold)
                .map_err(|e| eyre::eyre!("Bad builtin threshold for chain {}: {}", chain_id, e))?,
            receipt_strategy: builtin.receipt_strategy,
        };

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Current snapshot. Cheap; callers must not cache it across transactions.
    pub fn current(&self) -> Arc<ChainSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Publish a new snapshot with an updated native-unit threshold.
    pub fn set_min_native_threshold(&self, threshold: BigDecimal) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        next.min_native_threshold = threshold;
        *guard = Arc::new(next);
    }

    /// Override selected parameters from configuration before the detector
    /// starts. Applied once at startup, never mid-stream.
    pub fn apply_overrides(
        &self,
        min_native_threshold: Option<BigDecimal>,
        receipt_strategy: Option<ReceiptStrategy>,
    ) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        if let Some(threshold) = min_native_threshold {
            next.min_native_threshold = threshold;
        }
        if let Some(strategy) = receipt_strategy {
            next.receipt_strategy = strategy;
        }
        *guard = Arc::new(next);
    }
}

struct BuiltinParams {
    name: &'static str,
    native_usd_aggregator: &'static str,
    wrapped_native: &'static str,
    min_native_threshold: &'static str,
    receipt_strategy: ReceiptStrategy,
}

/// Built-in table of supported chains. Thresholds are defaults in native
/// units, superseded at runtime by the USD conversion in `crate::price`.
fn builtin_params(chain_id: u64) -> Option<BuiltinParams> {
    let params = match chain_id {
        1 => BuiltinParams {
            name: "ethereum",
            native_usd_aggregator: "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419",
            wrapped_native: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2",
            min_native_threshold: "30",
            receipt_strategy: ReceiptStrategy::WithdrawalEvents,
        },
        10 => BuiltinParams {
            name: "optimism",
            native_usd_aggregator: "0x13e3Ee699D1909E989722E753853AE30b17e08c5",
            wrapped_native: "0x4200000000000000000000000000000000000006",
            min_native_threshold: "30",
            receipt_strategy: ReceiptStrategy::WithdrawalEvents,
        },
        56 => BuiltinParams {
            name: "bnbchain",
            native_usd_aggregator: "0x0567F2323251f0Aab15c8dFb1967E4e8A7D42aeE",
            wrapped_native: "0xbb4CdB9CBd36B01bD1cBaEbF2De08d9173bc095c",
            min_native_threshold: "173",
            receipt_strategy: ReceiptStrategy::WithdrawalEvents,
        },
        137 => BuiltinParams {
            name: "polygon",
            native_usd_aggregator: "0xAB594600376Ec9fD91F8e885dADF0CE036862dE0",
            wrapped_native: "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270",
            min_native_threshold: "49139",
            receipt_strategy: ReceiptStrategy::WithdrawalEvents,
        },
        250 => BuiltinParams {
            name: "fantom",
            native_usd_aggregator: "0xf4766552D15AE4d256Ad41B6cf2933482B0680dc",
            wrapped_native: "0x21be370D5312f44cB42ce377BC9b8a0cEF1A4C83",
            min_native_threshold: "115045",
            receipt_strategy: ReceiptStrategy::BurnToZero,
        },
        42161 => BuiltinParams {
            name: "arbitrum",
            native_usd_aggregator: "0x639Fe6ab55C921f74e7fac1ee960C0B6293ba612",
            wrapped_native: "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1",
            min_native_threshold: "30",
            receipt_strategy: ReceiptStrategy::BalanceDiff,
        },
        43114 => BuiltinParams {
            name: "avalanche",
            native_usd_aggregator: "0x0A77230d17318075983913bC2145DB16C7366156",
            wrapped_native: "0xB31f66AA3C1e785363F0875A1B74E27b85FD66c7",
            min_native_threshold: "3096",
            receipt_strategy: ReceiptStrategy::WithdrawalEvents,
        },
        _ => return None,
    };
    Some(params)
}

/// Whether the chain id is in the built-in table.
pub fn is_supported(chain_id: u64) -> bool {
    builtin_params(chain_id).is_some()
}
