use std::collections::VecDeque;
use std::sync::Arc;

use super::Transaction;

/// Fixed-capacity FIFO that evicts its oldest element on overflow.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning whatever fell off the front.
    pub fn push(&mut self, item: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.items.iter()
    }
}

/// Recent-history windows handed to readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSnapshot {
    /// Insertion order, oldest first.
    pub transactions: Vec<Arc<Transaction>>,
    /// Most recent first.
    pub anomalies: Vec<Arc<Transaction>>,
}

/// Two bounded windows: every accepted transaction, and anomalies only.
///
/// Entries are shared `Arc`s, so a snapshot is a copy of pointers rather than
/// of transactions. Duplicate ids are stored as separate entries.
#[derive(Debug, Clone)]
pub struct WindowedEventStore {
    all: RingBuffer<Arc<Transaction>>,
    anomalies: RingBuffer<Arc<Transaction>>,
}

impl WindowedEventStore {
    pub fn new(max_transactions: usize, max_anomalies: usize) -> Self {
        Self {
            all: RingBuffer::new(max_transactions),
            anomalies: RingBuffer::new(max_anomalies),
        }
    }

    pub fn insert(&mut self, tx: Arc<Transaction>) {
        if tx.is_anomaly {
            self.anomalies.push(Arc::clone(&tx));
        }
        self.all.push(tx);
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            transactions: self.all.iter().cloned().collect(),
            anomalies: self.anomalies.iter().rev().cloned().collect(),
        }
    }
}
