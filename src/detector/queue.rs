use std::collections::VecDeque;

use crate::ingest::types::TxEvent;

/// FIFO that delays transactions by a number of block confirmations.
///
/// A transaction becomes eligible once `delay` distinct block numbers have
/// been observed on the stream. Order is preserved exactly; once the delay is
/// reached the queue releases one transaction per admission, so its length
/// stays bounded by the traffic of the first `delay` blocks.
pub struct ConfirmationQueue {
    pending: VecDeque<TxEvent>,
    anchor_block: u64,
    distinct_blocks: u64,
}

impl ConfirmationQueue {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            anchor_block: 0,
            distinct_blocks: 0,
        }
    }

    /// Push a transaction; return the head transaction if enough distinct
    /// blocks have been seen, otherwise keep buffering.
    pub fn admit(&mut self, tx: TxEvent, delay: u64) -> Option<TxEvent> {
        let block = tx.block_number;
        self.pending.push_back(tx);

        if self.distinct_blocks >= delay {
            return self.pending.pop_front();
        }
        if block != self.anchor_block {
            self.distinct_blocks += 1;
            self.anchor_block = block;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl Default for ConfirmationQueue {
    fn default() -> Self {
        Self::new()
    }
}
