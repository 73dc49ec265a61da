use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use std::sync::atomic::{AtomicU64, Ordering};

use super::window::{AddressState, TokenMovement};

/// Process-wide monotone counters behind the anomaly score.
///
/// Injected rather than ambient so tests can start from a clean pair. Both
/// values only grow; they reset only when the process restarts.
#[derive(Debug, Default)]
pub struct SwapCounters {
    native_swaps: AtomicU64,
    alerts: AtomicU64,
}

impl SwapCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one observed native swap. Called exactly once per transaction
    /// that produced a non-zero native receipt, before the new-address gate.
    pub fn record_native_swap(&self) -> u64 {
        self.native_swaps.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_alert(&self) -> u64 {
        self.alerts.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn native_swaps(&self) -> u64 {
        self.native_swaps.load(Ordering::Relaxed)
    }

    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }

    /// alerts / swaps. Both counters are monotone and an alert is only ever
    /// recorded for a counted swap, so the ratio stays within [0, 1].
    pub fn anomaly_score(&self) -> f64 {
        let swaps = self.native_swaps();
        if swaps == 0 {
            return 0.0;
        }
        self.alerts() as f64 / swaps as f64
    }
}

/// Structured alert record handed to the findings transport.
#[derive(Debug, Clone)]
pub struct SwapAlert {
    pub chain_id: u64,
    pub attacker: Address,
    pub total_native_received: BigDecimal,
    pub swap_count: usize,
    pub first_block: u64,
    pub first_timestamp: u64,
    pub last_block: u64,
    pub last_timestamp: u64,
    pub tokens_swapped: Vec<TokenMovement>,
    pub anomaly_score: f64,
}

/// Decide whether the address's current window crosses the alerting bar.
///
/// The window is left untouched on alert; later qualifying swaps from the
/// same address keep growing it and may alert again with an updated score.
pub fn evaluate(
    chain_id: u64,
    attacker: Address,
    state: &AddressState,
    min_native_threshold: &BigDecimal,
    min_swap_count: usize,
    counters: &SwapCounters,
) -> Option<SwapAlert> {
    if state.total_native_received < *min_native_threshold || state.swap_count() < min_swap_count {
        return None;
    }

    counters.record_alert();

    Some(SwapAlert {
        chain_id,
        attacker,
        total_native_received: state.total_native_received.clone(),
        swap_count: state.swap_count(),
        first_block: state.window_start().block_number,
        first_timestamp: state.window_start().timestamp,
        last_block: state.window_end().block_number,
        last_timestamp: state.window_end().timestamp,
        tokens_swapped: state.movements().cloned().collect(),
        anomaly_score: counters.anomaly_score(),
    })
}
