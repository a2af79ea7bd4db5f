// store/src/write_behind.rs
//
// The write-behind buffer of §4.5: drains a bounded channel of
// `WriteEvent`s, batches them by size or time, and resolves each
// referenced address through a `Backend` before committing dependent
// rows — never the other way around, so a transaction or block row is
// never written against an address id that doesn't exist yet.

use crate::backend::{AddressResolution, Backend, FlushBatch};
use crate::error::StoreError;
use crate::models::WriteEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone)]
struct RetryEntry {
    pubkey_hex: String,
    height: u64,
    attempts: u32,
}

/// A handle workers and the pause controller use without owning the
/// buffer itself: the sending half of its channel, and a live depth
/// counter (`mpsc` does not expose queue length directly).
#[derive(Clone)]
pub struct WriteQueueHandle {
    sender: mpsc::Sender<WriteEvent>,
    depth: Arc<AtomicUsize>,
}

impl WriteQueueHandle {
    /// Enqueue an event, blocking if the queue is full. Per §5's queue
    /// policy, puts never drop events.
    pub async fn send(&self, event: WriteEvent) -> Result<(), mpsc::error::SendError<WriteEvent>> {
        self.sender.send(event).await?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current number of events sitting in the queue, used by the pause
    /// controller's hysteresis check.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// Drains `WriteQueueHandle`'s channel, flushing batches to a `Backend`.
pub struct WriteBehindBuffer<B: Backend> {
    backend: B,
    receiver: mpsc::Receiver<WriteEvent>,
    depth: Arc<AtomicUsize>,
    batch_size: usize,
    batch_timeout: Duration,
    max_retries: u32,
    retry_map: HashMap<String, RetryEntry>,
    deferred: VecDeque<WriteEvent>,
}

impl<B: Backend> WriteBehindBuffer<B> {
    /// Create a buffer and the handle used to feed it. `queue_size` is
    /// the channel's bound (`ScannerConfig::queue_size`).
    pub fn new(
        backend: B,
        queue_size: usize,
        batch_size: usize,
        batch_timeout: Duration,
        max_retries: u32,
    ) -> (Self, WriteQueueHandle) {
        let (sender, receiver) = mpsc::channel(queue_size.max(1));
        let depth = Arc::new(AtomicUsize::new(0));
        let handle = WriteQueueHandle {
            sender,
            depth: depth.clone(),
        };
        let buffer = Self {
            backend,
            receiver,
            depth,
            batch_size,
            batch_timeout,
            max_retries,
            retry_map: HashMap::new(),
            deferred: VecDeque::new(),
        };
        (buffer, handle)
    }

    /// Run until the channel is closed and every pending batch — including
    /// any address deferred by a failed resolution round — has been
    /// flushed. A deferred event is retried on every subsequent tick, even
    /// after the channel closes, until it resolves or exhausts its retries.
    pub async fn run(mut self) -> Result<(), StoreError> {
        let mut batch: Vec<WriteEvent> = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut closed = false;

        loop {
            if closed {
                if self.deferred.is_empty() {
                    break;
                }
                ticker.tick().await;
                self.flush(Vec::new()).await?;
                continue;
            }

            tokio::select! {
                biased;
                event = self.receiver.recv() => {
                    match event {
                        Some(event) => {
                            self.depth.fetch_sub(1, Ordering::Relaxed);
                            batch.push(event);
                            if batch.len() >= self.batch_size {
                                self.flush(std::mem::take(&mut batch)).await?;
                            }
                        }
                        None => {
                            closed = true;
                            if !batch.is_empty() {
                                self.flush(std::mem::take(&mut batch)).await?;
                            }
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(std::mem::take(&mut batch)).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Flush one batch: hand every referenced address (retry-map entries
    /// from a prior flush first) plus the dependent rows to the backend
    /// as a single unit — `Backend::flush_batch` resolves addresses and
    /// commits dependent rows atomically — then defer whatever failed to
    /// resolve this round to the next flush.
    async fn flush(&mut self, batch: Vec<WriteEvent>) -> Result<(), StoreError> {
        let mut events: Vec<WriteEvent> = self.deferred.drain(..).collect();
        events.extend(batch);

        let mut address_info: HashMap<String, (String, u64)> = self
            .retry_map
            .iter()
            .map(|(key, entry)| (key.clone(), (entry.pubkey_hex.clone(), entry.height)))
            .collect();

        for event in &events {
            if let (Some(key), Some(pubkey)) = (event.address_key(), event.pubkey_hex()) {
                let height = event.height();
                address_info
                    .entry(key)
                    .and_modify(|(_, h)| *h = (*h).max(height))
                    .or_insert_with(|| (pubkey.to_string(), height));
            }
        }

        let addresses = address_info
            .iter()
            .map(|(key, (pubkey_hex, height))| AddressResolution {
                address_key: key.clone(),
                pubkey_hex: pubkey_hex.clone(),
                height: *height,
            })
            .collect();

        let mut transactions = Vec::new();
        let mut address_blocks = Vec::new();
        let mut scanned_blocks = Vec::new();

        for event in &events {
            match event {
                WriteEvent::BlockScanned { height, had_p2pk } => {
                    scanned_blocks.push((*height, *had_p2pk));
                }
                WriteEvent::AddressSeen { .. } => {
                    // The address row itself is written during resolution;
                    // nothing further to commit for this variant.
                }
                WriteEvent::Transaction { .. } => {
                    let key = event
                        .address_key()
                        .expect("Transaction events carry an address_key");
                    transactions.push((key, event.clone()));
                }
                WriteEvent::AddressBlock { .. } => {
                    let key = event
                        .address_key()
                        .expect("AddressBlock events carry an address_key");
                    address_blocks.push((key, event.clone()));
                }
            }
        }

        let outcome = self
            .backend
            .flush_batch(FlushBatch {
                addresses,
                transactions,
                address_blocks,
                scanned_blocks,
            })
            .await?;

        let mut next_retry_map: HashMap<String, RetryEntry> = HashMap::new();
        for (key, (pubkey_hex, height)) in &address_info {
            if let Some(e) = outcome.failed.get(key) {
                let attempts = self.retry_map.get(key).map(|r| r.attempts).unwrap_or(0) + 1;
                if attempts > self.max_retries {
                    return Err(StoreError::AddressResolutionExhausted {
                        address_key: key.clone(),
                        attempts,
                    });
                }
                tracing::warn!(
                    address_key = %key,
                    attempts,
                    max_retries = self.max_retries,
                    error = %e,
                    "address resolution failed, deferring to next flush"
                );
                next_retry_map.insert(
                    key.clone(),
                    RetryEntry {
                        pubkey_hex: pubkey_hex.clone(),
                        height: *height,
                        attempts,
                    },
                );
            }
        }
        self.retry_map = next_retry_map;

        for event in events {
            if let Some(key) = event.address_key() {
                if outcome.failed.contains_key(&key) {
                    self.deferred.push_back(event);
                }
            }
        }

        Ok(())
    }
}
