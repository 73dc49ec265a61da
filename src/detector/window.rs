use alloy::primitives::{Address, B256};
use bigdecimal::BigDecimal;
use std::collections::HashMap;

/// One token leg of a swap, kept for alert metadata.
#[derive(Debug, Clone)]
pub struct TokenMovement {
    pub token: Address,
    pub amount: BigDecimal,
    pub tx_hash: B256,
}

/// One transaction's contribution to an address's swap history.
#[derive(Debug, Clone)]
pub struct SwapRecord {
    pub block_number: u64,
    pub timestamp: u64,
    pub tokens_swapped: Vec<TokenMovement>,
}

/// Per-address aggregate over the current window.
/// Invariant: `swaps` is never empty while the entry exists in the store.
#[derive(Debug, Clone)]
pub struct AddressState {
    pub total_native_received: BigDecimal,
    pub swaps: Vec<SwapRecord>,
}

impl AddressState {
    pub fn swap_count(&self) -> usize {
        self.swaps.len()
    }

    pub fn window_start(&self) -> &SwapRecord {
        &self.swaps[0]
    }

    pub fn window_end(&self) -> &SwapRecord {
        &self.swaps[self.swaps.len() - 1]
    }

    /// All token movements across the window, in arrival order.
    pub fn movements(&self) -> impl Iterator<Item = &TokenMovement> {
        self.swaps.iter().flat_map(|s| s.tokens_swapped.iter())
    }
}

/// Which branch of the merge fired, observable by callers and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// First qualifying swap seen for this address.
    Created,
    /// The new swap landed within the window; totals accumulated.
    Extended,
    /// The gap exceeded the max inter-swap interval; the old window was
    /// discarded wholesale and a fresh one started.
    Reset,
}

/// Address-keyed store of swap windows with a sliding-window merge policy.
pub struct WindowStore {
    records: HashMap<Address, AddressState>,
    max_gap_secs: u64,
}

impl WindowStore {
    pub fn new(max_gap_secs: u64) -> Self {
        Self {
            records: HashMap::new(),
            max_gap_secs,
        }
    }

    /// Merge one swap into the sender's window.
    ///
    /// Extends the existing window when the gap from the last recorded swap
    /// stays within `max_gap_secs`; otherwise the stale window is replaced by
    /// a fresh one holding only the new swap. The two windows are never
    /// merged even though they share the address key.
    pub fn merge(
        &mut self,
        sender: Address,
        native_received: BigDecimal,
        swap: SwapRecord,
    ) -> MergeOutcome {
        match self.records.get_mut(&sender) {
            None => {
                self.records.insert(sender, fresh_state(native_received, swap));
                MergeOutcome::Created
            }
            Some(state) => {
                debug_assert!(!state.swaps.is_empty(), "address state with empty history");
                let last_ts = state.window_end().timestamp;
                if swap.timestamp <= last_ts + self.max_gap_secs {
                    state.total_native_received += native_received;
                    state.swaps.push(swap);
                    MergeOutcome::Extended
                } else {
                    *state = fresh_state(native_received, swap);
                    MergeOutcome::Reset
                }
            }
        }
    }

    pub fn get(&self, sender: &Address) -> Option<&AddressState> {
        self.records.get(sender)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every window whose last swap is older than the max gap relative
    /// to `now`. Only the gap from now matters; a long-lived window whose
    /// latest swap is recent survives regardless of when it started.
    /// Returns the number of evicted addresses.
    pub fn sweep(&mut self, now: u64) -> usize {
        let before = self.records.len();
        let max_gap = self.max_gap_secs;
        self.records
            .retain(|_, state| match state.swaps.last() {
                Some(last) => last.timestamp + max_gap >= now,
                None => false,
            });
        before - self.records.len()
    }
}

fn fresh_state(native_received: BigDecimal, swap: SwapRecord) -> AddressState {
    AddressState {
        total_native_received: native_received,
        swaps: vec![swap],
    }
}
