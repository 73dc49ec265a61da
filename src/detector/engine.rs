use bigdecimal::{BigDecimal, Zero};
use std::sync::Arc;

use crate::chains::ChainState;
use crate::ingest::types::TxEvent;

use super::alert::{self, SwapAlert, SwapCounters};
use super::amount::u256_to_decimal;
use super::classifier;
use super::queue::ConfirmationQueue;
use super::receipt::{self, ChainProvider};
use super::window::{SwapRecord, TokenMovement, WindowStore};

/// Tunables for the detection pipeline, loaded from configuration.
#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Senders with a nonce above this are not "new" and never alerted on.
    pub low_nonce_threshold: u64,
    /// Minimum swaps in the window before an alert may fire.
    pub min_swap_count: usize,
    /// Maximum gap between consecutive swaps in one window, in seconds.
    pub max_swap_gap_secs: u64,
    /// Run the eviction sweep every this many blocks.
    pub sweep_cadence_blocks: u64,
    /// When set, transactions wait for this many distinct subsequent blocks
    /// before being processed.
    pub confirmation_delay_blocks: Option<u64>,
}

/// The stateful classification-and-aggregation engine for one chain.
///
/// Consumes transactions in stream order. Every classification stage fails
/// closed (returns "not a candidate") before any state mutation, so a partial
/// failure never leaves the window store inconsistent.
pub struct SwapEngine<P> {
    provider: P,
    chain: Arc<ChainState>,
    counters: Arc<SwapCounters>,
    settings: DetectionSettings,
    store: WindowStore,
    queue: ConfirmationQueue,
    last_sweep_timestamp: Option<u64>,
}

impl<P: ChainProvider> SwapEngine<P> {
    pub fn new(
        provider: P,
        chain: Arc<ChainState>,
        counters: Arc<SwapCounters>,
        settings: DetectionSettings,
    ) -> Self {
        let store = WindowStore::new(settings.max_swap_gap_secs);
        Self {
            provider,
            chain,
            counters,
            settings,
            store,
            queue: ConfirmationQueue::new(),
            last_sweep_timestamp: None,
        }
    }

    pub fn store(&self) -> &WindowStore {
        &self.store
    }

    pub fn counters(&self) -> &SwapCounters {
        &self.counters
    }

    /// Process one transaction from the stream. Returns any alerts raised.
    pub async fn process(&mut self, tx: TxEvent) -> eyre::Result<Vec<SwapAlert>> {
        self.maybe_sweep(tx.block_number, tx.timestamp);

        // Optional confirmation lag: buffer until enough distinct blocks
        // have been observed, then process the released head.
        let tx = match self.settings.confirmation_delay_blocks {
            Some(delay) => match self.queue.admit(tx, delay) {
                Some(eligible) => eligible,
                None => return Ok(Vec::new()),
            },
            None => tx,
        };

        // Stage 1: classify. An empty result stops everything before any
        // provider call is issued.
        let qualifying = classifier::qualifying_transfers(&tx.transfers, tx.sender);
        if qualifying.is_empty() {
            return Ok(Vec::new());
        }

        let snapshot = self.chain.current();

        // Stage 2: native receipt.
        let native_received = match receipt::native_received(
            snapshot.receipt_strategy,
            &self.provider,
            &tx,
            snapshot.wrapped_native,
        )
        .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    chain_id = snapshot.chain_id,
                    tx_hash = %tx.tx_hash,
                    error = %e,
                    "Native receipt lookup failed, treating as non-candidate"
                );
                return Ok(Vec::new());
            }
        };
        if native_received <= BigDecimal::zero() {
            return Ok(Vec::new());
        }

        // Counted once per transaction with a real native receipt, before
        // the new-address gate. Never retried, never double-counted.
        self.counters.record_native_swap();

        // Stage 3: new-address gate.
        let nonce = match self
            .provider
            .transaction_count(tx.sender, tx.block_number)
            .await
        {
            Ok(nonce) => nonce,
            Err(e) => {
                tracing::warn!(
                    chain_id = snapshot.chain_id,
                    sender = %tx.sender,
                    error = %e,
                    "Nonce lookup failed, treating as non-candidate"
                );
                return Ok(Vec::new());
            }
        };
        if nonce > self.settings.low_nonce_threshold {
            return Ok(Vec::new());
        }

        // Stage 4: merge into the sender's window.
        let movements = qualifying
            .iter()
            .map(|t| TokenMovement {
                token: t.token,
                amount: u256_to_decimal(t.amount),
                tx_hash: tx.tx_hash,
            })
            .collect();
        let record = SwapRecord {
            block_number: tx.block_number,
            timestamp: tx.timestamp,
            tokens_swapped: movements,
        };
        let outcome = self.store.merge(tx.sender, native_received, record);
        tracing::debug!(
            sender = %tx.sender,
            block = tx.block_number,
            outcome = ?outcome,
            tracked = self.store.len(),
            "Swap merged"
        );

        // Stage 5: threshold evaluation against the current snapshot.
        let state = match self.store.get(&tx.sender) {
            Some(state) => state,
            None => return Ok(Vec::new()),
        };
        let alert = alert::evaluate(
            snapshot.chain_id,
            tx.sender,
            state,
            &snapshot.min_native_threshold,
            self.settings.min_swap_count,
            &self.counters,
        );

        Ok(alert.into_iter().collect())
    }

    /// Eviction sweep on a block-number cadence, at most once per distinct
    /// timestamp so repeated transactions in one block sweep only once.
    fn maybe_sweep(&mut self, block_number: u64, timestamp: u64) {
        let cadence = self.settings.sweep_cadence_blocks;
        if cadence == 0 || block_number % cadence != 0 {
            return;
        }
        if self.last_sweep_timestamp == Some(timestamp) {
            return;
        }
        self.last_sweep_timestamp = Some(timestamp);
        let evicted = self.store.sweep(timestamp);
        if evicted > 0 {
            tracing::debug!(
                block = block_number,
                evicted,
                remaining = self.store.len(),
                "Evicted stale address windows"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::receipt::ReceiptStrategy;
    use crate::ingest::types::{TokenTransfer, Withdrawal};
    use alloy::primitives::{Address, B256, U256};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicU64, Ordering};

    const ONE: u64 = 1_000_000_000_000_000_000;

    struct MockProvider {
        nonce: u64,
        fail_nonce: bool,
        nonce_calls: AtomicU64,
        balance_calls: AtomicU64,
    }

    impl MockProvider {
        fn with_nonce(nonce: u64) -> Self {
            Self {
                nonce,
                fail_nonce: false,
                nonce_calls: AtomicU64::new(0),
                balance_calls: AtomicU64::new(0),
            }
        }
    }

    impl ChainProvider for MockProvider {
        async fn transaction_count(&self, _address: Address, _block: u64) -> eyre::Result<u64> {
            self.nonce_calls.fetch_add(1, Ordering::Relaxed);
            if self.fail_nonce {
                return Err(eyre::eyre!("rpc timeout"));
            }
            Ok(self.nonce)
        }

        async fn native_balance(&self, _address: Address, _block: u64) -> eyre::Result<U256> {
            self.balance_calls.fetch_add(1, Ordering::Relaxed);
            Ok(U256::ZERO)
        }
    }

    fn settings() -> DetectionSettings {
        DetectionSettings {
            low_nonce_threshold: 150,
            min_swap_count: 3,
            max_swap_gap_secs: 1800,
            sweep_cadence_blocks: 10_000,
            confirmation_delay_blocks: None,
        }
    }

    fn chain_with_threshold(threshold: &str) -> Arc<ChainState> {
        let chain = ChainState::for_chain(1).unwrap();
        chain.apply_overrides(
            Some(BigDecimal::from_str(threshold).unwrap()),
            Some(ReceiptStrategy::WithdrawalEvents),
        );
        Arc::new(chain)
    }

    fn engine(provider: MockProvider, threshold: &str) -> SwapEngine<MockProvider> {
        SwapEngine::new(
            provider,
            chain_with_threshold(threshold),
            Arc::new(SwapCounters::new()),
            settings(),
        )
    }

    /// A swap tx: sender gives up `token`, receives `native_units` via a
    /// wrapped-native withdrawal.
    fn swap_tx(
        sender: Address,
        token: Address,
        block: u64,
        timestamp: u64,
        native_units: u64,
    ) -> TxEvent {
        let weth = crate::chains::ChainState::for_chain(1)
            .unwrap()
            .current()
            .wrapped_native;
        TxEvent {
            chain_id: 1,
            sender,
            tx_hash: B256::repeat_byte(block as u8),
            block_number: block,
            timestamp,
            transfers: vec![TokenTransfer {
                token,
                from: sender,
                to: Address::repeat_byte(0xbb),
                amount: U256::from(100u64),
            }],
            withdrawals: vec![Withdrawal {
                contract: weth,
                src: sender,
                amount: U256::from(native_units) * U256::from(ONE),
            }],
        }
    }

    #[tokio::test]
    async fn test_alert_fires_on_third_swap_crossing_threshold() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        // Block 100: +15 native, count 1 -> no alert.
        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(1), 100, 1000, 15))
            .await
            .unwrap();
        assert!(alerts.is_empty());

        // Block 101: +10 native, count 2 -> still below min swap count.
        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(2), 101, 1012, 10))
            .await
            .unwrap();
        assert!(alerts.is_empty());

        // Block 102: +10 native, cumulative 35 >= 30, count 3 -> one alert.
        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(3), 102, 1024, 10))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);

        let alert = &alerts[0];
        assert_eq!(alert.attacker, sender);
        assert_eq!(alert.total_native_received, BigDecimal::from(35));
        assert_eq!(alert.swap_count, 3);
        assert_eq!(alert.first_block, 100);
        assert_eq!(alert.last_block, 102);
        assert_eq!(alert.tokens_swapped.len(), 3);
        assert_eq!(engine.counters().native_swaps(), 3);
        assert_eq!(engine.counters().alerts(), 1);
    }

    #[tokio::test]
    async fn test_stale_gap_resets_window_and_suppresses_alert() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        engine
            .process(swap_tx(sender, Address::repeat_byte(1), 100, 1000, 15))
            .await
            .unwrap();
        engine
            .process(swap_tx(sender, Address::repeat_byte(2), 101, 1012, 10))
            .await
            .unwrap();
        // Block 102 arrives past the max gap: the window starts over.
        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(3), 102, 1012 + 1801, 10))
            .await
            .unwrap();
        assert!(alerts.is_empty());

        let state = engine.store().get(&sender).unwrap();
        assert_eq!(state.total_native_received, BigDecimal::from(10));
        assert_eq!(state.swap_count(), 1);
    }

    #[tokio::test]
    async fn test_no_provider_calls_without_qualifying_transfers() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        let tx = TxEvent {
            chain_id: 1,
            sender,
            tx_hash: B256::repeat_byte(1),
            block_number: 100,
            timestamp: 1000,
            transfers: vec![], // nothing from the sender
            withdrawals: vec![],
        };
        let alerts = engine.process(tx).await.unwrap();
        assert!(alerts.is_empty());
        assert_eq!(engine.provider.nonce_calls.load(Ordering::Relaxed), 0);
        assert_eq!(engine.provider.balance_calls.load(Ordering::Relaxed), 0);
        assert_eq!(engine.counters().native_swaps(), 0);
    }

    #[tokio::test]
    async fn test_gate_filters_established_address_but_counts_swap() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(151), "30");

        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(1), 100, 1000, 50))
            .await
            .unwrap();
        assert!(alerts.is_empty());
        // The swap was observed (denominator grows) but no state was created.
        assert_eq!(engine.counters().native_swaps(), 1);
        assert!(engine.store().get(&sender).is_none());
    }

    #[tokio::test]
    async fn test_zero_native_receipt_is_not_counted() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        let mut tx = swap_tx(sender, Address::repeat_byte(1), 100, 1000, 15);
        tx.withdrawals.clear();
        let alerts = engine.process(tx).await.unwrap();
        assert!(alerts.is_empty());
        assert_eq!(engine.counters().native_swaps(), 0);
        assert!(engine.store().get(&sender).is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_fails_closed() {
        let sender = Address::repeat_byte(0xaa);
        let mut provider = MockProvider::with_nonce(5);
        provider.fail_nonce = true;
        let mut engine = engine(provider, "30");

        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(1), 100, 1000, 50))
            .await
            .unwrap();
        assert!(alerts.is_empty());
        assert!(engine.store().get(&sender).is_none());
    }

    #[tokio::test]
    async fn test_repeat_alerts_with_growing_window() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        for i in 0..3u64 {
            engine
                .process(swap_tx(sender, Address::repeat_byte(1), 100 + i, 1000 + i, 15))
                .await
                .unwrap();
        }
        // Fourth swap: the window was not cleared by the first alert.
        let alerts = engine
            .process(swap_tx(sender, Address::repeat_byte(1), 103, 1003, 15))
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].swap_count, 4);
        assert_eq!(alerts[0].total_native_received, BigDecimal::from(60));
        assert_eq!(engine.counters().alerts(), 2);
    }

    #[tokio::test]
    async fn test_sweep_runs_on_cadence_block() {
        let sender = Address::repeat_byte(0xaa);
        let mut engine = engine(MockProvider::with_nonce(5), "30");

        engine
            .process(swap_tx(sender, Address::repeat_byte(1), 9_999, 1000, 15))
            .await
            .unwrap();
        assert!(engine.store().get(&sender).is_some());

        // A non-candidate transaction at the cadence block, far in the
        // future, still triggers the sweep.
        let tx = TxEvent {
            chain_id: 1,
            sender: Address::repeat_byte(0xcc),
            tx_hash: B256::repeat_byte(9),
            block_number: 10_000,
            timestamp: 1000 + 1801,
            transfers: vec![],
            withdrawals: vec![],
        };
        engine.process(tx).await.unwrap();
        assert!(engine.store().get(&sender).is_none());
    }

    #[tokio::test]
    async fn test_confirmation_delay_buffers_processing() {
        let sender = Address::repeat_byte(0xaa);
        let mut settings = settings();
        settings.confirmation_delay_blocks = Some(2);
        let mut engine = SwapEngine::new(
            MockProvider::with_nonce(5),
            chain_with_threshold("30"),
            Arc::new(SwapCounters::new()),
            settings,
        );

        // Buffered: only one distinct block seen so far.
        engine
            .process(swap_tx(sender, Address::repeat_byte(1), 100, 1000, 15))
            .await
            .unwrap();
        assert!(engine.store().get(&sender).is_none());

        engine
            .process(swap_tx(sender, Address::repeat_byte(2), 101, 1012, 10))
            .await
            .unwrap();
        assert!(engine.store().get(&sender).is_none());

        // Third distinct block releases the head (block 100's swap).
        engine
            .process(swap_tx(sender, Address::repeat_byte(3), 102, 1024, 10))
            .await
            .unwrap();
        let state = engine.store().get(&sender).unwrap();
        assert_eq!(state.swap_count(), 1);
        assert_eq!(state.total_native_received, BigDecimal::from(15));
    }
}
