// distributor/src/lib.rs
//
// The single task that keeps every worker's queue topped up to a target
// depth, pulling heights from one ingress queue in strictly increasing
// order. Heights land on workers in a quasi-random subsequence; the
// system only guarantees global ordering of the ingress stream itself.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Sleep between idle polls of the ingress queue, mirroring the
/// small-sleep-to-prevent-busy-waiting shape of the loop this is based on.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Sleep when ingress is empty but workers are still draining.
const DRAIN_WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// The sending half of a worker's queue, paired with a depth counter the
/// distributor tops up and the worker decrements on pop.
#[derive(Clone)]
pub struct WorkerQueueHandle {
    sender: mpsc::Sender<u64>,
    depth: Arc<AtomicUsize>,
}

impl WorkerQueueHandle {
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Attempt a non-blocking push, incrementing depth on success. Used
    /// by the distributor, which must never block on a full worker queue.
    fn try_send(&self, height: u64) -> Result<(), mpsc::error::TrySendError<u64>> {
        self.sender.try_send(height)?;
        self.depth.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// The receiving half a worker pops heights from.
pub struct WorkerQueueReceiver {
    receiver: mpsc::Receiver<u64>,
    depth: Arc<AtomicUsize>,
}

impl WorkerQueueReceiver {
    pub async fn recv(&mut self) -> Option<u64> {
        let height = self.receiver.recv().await?;
        self.depth.fetch_sub(1, Ordering::Relaxed);
        Some(height)
    }
}

/// Create a bounded worker queue of the given capacity (typically
/// `target_depth`, since a full queue is meant to mean "at target").
pub fn worker_queue(capacity: usize) -> (WorkerQueueHandle, WorkerQueueReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let depth = Arc::new(AtomicUsize::new(0));
    (
        WorkerQueueHandle {
            sender,
            depth: depth.clone(),
        },
        WorkerQueueReceiver { receiver, depth },
    )
}

/// Distributes block heights from a single ingress queue across an
/// ordered list of worker queues.
pub struct Distributor {
    ingress: mpsc::Receiver<u64>,
    workers: Vec<WorkerQueueHandle>,
    target_depth: usize,
    stop: Arc<AtomicBool>,
}

impl Distributor {
    pub fn new(
        ingress: mpsc::Receiver<u64>,
        workers: Vec<WorkerQueueHandle>,
        target_depth: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            ingress,
            workers,
            target_depth,
            stop,
        }
    }

    /// Run until the ingress queue is closed and drained and every worker
    /// queue reports zero depth, or until the stop flag is set.
    pub async fn run(mut self) {
        tracing::info!(
            target_depth = self.target_depth,
            workers = self.workers.len(),
            "distributor started"
        );

        loop {
            if self.stop.load(Ordering::Relaxed) {
                tracing::info!("distributor stopping on signal");
                break;
            }

            let mut ingress_closed = false;
            let mut moved_any = false;

            for (i, worker) in self.workers.iter().enumerate() {
                while worker.depth() < self.target_depth {
                    match self.ingress.try_recv() {
                        Ok(height) => {
                            // The distributor is the sole producer for
                            // this worker's queue, so `depth() <
                            // target_depth` above guarantees room as long
                            // as the queue was constructed with capacity
                            // >= target_depth. A failure here would mean
                            // that precondition was violated.
                            worker
                                .try_send(height)
                                .expect("worker queue capacity must be >= target_depth");
                            moved_any = true;
                        }
                        Err(mpsc::error::TryRecvError::Empty) => break,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            ingress_closed = true;
                            break;
                        }
                    }
                }
                if ingress_closed {
                    tracing::debug!(worker = i, "ingress closed while topping up");
                }
            }

            let all_workers_empty = self.workers.iter().all(|w| w.depth() == 0);
            if ingress_closed && all_workers_empty {
                tracing::info!("all queues empty, distribution complete");
                break;
            }

            if !moved_any {
                let wait = if ingress_closed {
                    DRAIN_WAIT_INTERVAL
                } else {
                    IDLE_POLL_INTERVAL
                };
                tokio::time::sleep(wait).await;
            }
        }
    }
}
