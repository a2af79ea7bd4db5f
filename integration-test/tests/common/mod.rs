// integration-test/tests/common/mod.rs
//
// Shared plumbing for wiring one height through a real `Distributor` into
// a single worker queue, the way `worker/tests/worker.rs` does it —
// `WorkerQueueHandle::try_send` is crate-private to `distributor`, so
// feeding a queue always goes through a real distributor run.

use distributor::{worker_queue, Distributor, WorkerQueueReceiver};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub async fn queue_with_heights(heights: &[u64]) -> WorkerQueueReceiver {
    let (ingress_tx, ingress_rx) = tokio::sync::mpsc::channel(heights.len().max(1));
    let (handle, receiver) = worker_queue(heights.len().max(1));
    for height in heights {
        ingress_tx.send(*height).await.unwrap();
    }
    drop(ingress_tx);

    let distributor = Distributor::new(
        ingress_rx,
        vec![handle],
        heights.len().max(1),
        Arc::new(AtomicBool::new(false)),
    );
    tokio::spawn(distributor.run());

    receiver
}
