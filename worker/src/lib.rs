// worker/src/lib.rs
//
// Per-worker block processing: fetch a block, classify its outputs and
// spent inputs, and emit P2PK sightings onto the write-behind queue. A
// worker never touches storage directly — all persistence goes through
// `store::WriteQueueHandle` so referential ordering stays the writer's
// responsibility alone.

use classifier::{classify_script, is_plausibly_p2pk_input, quick_scan_block};
use distributor::WorkerQueueReceiver;
use node::{NodeClient, NodeError, RawTx};
use scan_metrics::Metrics;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::{WriteEvent, WriteQueueHandle};
use thiserror::Error;

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("write queue closed")]
    WriteQueueClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for WorkerError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        WorkerError::WriteQueueClosed
    }
}

/// The suspension flag the Pause Controller sets/clears and every worker
/// polls between blocks. Cheap to clone; all clones share one `AtomicBool`.
#[derive(Clone, Default)]
pub struct PauseFlag(Arc<AtomicBool>);

impl PauseFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, paused: bool) {
        self.0.store(paused, Ordering::Relaxed);
    }
}

/// One worker's processing loop over its dedicated queue.
pub struct Worker<N: NodeClient> {
    id: usize,
    node: Arc<N>,
    queue: WorkerQueueReceiver,
    write_queue: WriteQueueHandle,
    pause: PauseFlag,
    stop: Arc<AtomicBool>,
    quick_scan: bool,
    batch_rpc: bool,
    metrics: Arc<Metrics>,
}

impl<N: NodeClient> Worker<N> {
    pub fn new(
        id: usize,
        node: Arc<N>,
        queue: WorkerQueueReceiver,
        write_queue: WriteQueueHandle,
        pause: PauseFlag,
        stop: Arc<AtomicBool>,
        quick_scan: bool,
        batch_rpc: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id,
            node,
            queue,
            write_queue,
            pause,
            stop,
            quick_scan,
            batch_rpc,
            metrics,
        }
    }

    /// Run until the queue closes and drains, or the stop signal fires.
    pub async fn run(mut self) {
        tracing::info!(worker = self.id, "worker started");

        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let height = match self.queue.recv().await {
                Some(h) => h,
                None => break,
            };

            while self.pause.is_paused() {
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
            }

            match self.process_height(height).await {
                Ok(()) => self.metrics.record_block_scanned(),
                Err(e) => {
                    tracing::error!(worker = self.id, height, error = %e, "block processing failed, skipping");
                    self.metrics.record_block_failed();
                }
            }
        }

        tracing::info!(worker = self.id, "worker stopped");
    }

    async fn process_height(&mut self, height: u64) -> Result<(), WorkerError> {
        let block = self.node.get_block_at(height).await?;

        if self.quick_scan && !quick_scan_block(&block) {
            self.write_queue
                .send(WriteEvent::BlockScanned {
                    height,
                    had_p2pk: false,
                })
                .await?;
            return Ok(());
        }

        let mut prev_cache: HashMap<String, RawTx> = HashMap::new();
        let mut block_addresses_seen: HashSet<String> = HashSet::new();
        let mut had_p2pk = false;
        let mut tx_count: u64 = 0;
        let mut addresses_found: u64 = 0;

        for tx in &block.tx {
            tx_count += 1;
            let mut seen_outputs: HashSet<String> = HashSet::new();
            let mut seen_inputs: HashSet<String> = HashSet::new();

            for vout in &tx.vout {
                if let Some(kind) = classify_script(&vout.script_pub_key) {
                    let pubkey_hex = kind.hex().to_string();
                    if seen_outputs.insert(pubkey_hex.clone()) {
                        had_p2pk = true;
                        if block_addresses_seen.insert(pubkey_hex.clone()) {
                            addresses_found += 1;
                        }
                        self.emit_sighting(
                            &pubkey_hex,
                            &tx.txid,
                            height,
                            block.time,
                            false,
                            vout.n,
                            vout.amount_satoshi(),
                        )
                        .await?;
                    }
                }
            }

            // Collect previous txids this tx's inputs need, skipping
            // inputs the length heuristic rules out and anything already
            // cached from earlier in this block.
            let mut to_fetch: Vec<String> = Vec::new();
            for vin in &tx.vin {
                if vin.is_coinbase() {
                    continue;
                }
                let asm = vin.script_sig.as_ref().map(|s| s.asm.as_str());
                if !is_plausibly_p2pk_input(asm) {
                    continue;
                }
                if let Some(prev_txid) = &vin.txid {
                    if !prev_cache.contains_key(prev_txid) && !to_fetch.contains(prev_txid) {
                        to_fetch.push(prev_txid.clone());
                    }
                }
            }

            if !to_fetch.is_empty() {
                self.fetch_prev_txs(&to_fetch, &mut prev_cache).await;
            }

            for vin in &tx.vin {
                if vin.is_coinbase() {
                    continue;
                }
                let asm = vin.script_sig.as_ref().map(|s| s.asm.as_str());
                if !is_plausibly_p2pk_input(asm) {
                    continue;
                }
                let (Some(prev_txid), Some(prev_vout)) = (&vin.txid, vin.vout) else {
                    continue;
                };
                let Some(prev_tx) = prev_cache.get(prev_txid) else {
                    continue;
                };
                let Some(prev_out) = prev_tx.vout.get(prev_vout as usize) else {
                    continue;
                };
                if let Some(kind) = classify_script(&prev_out.script_pub_key) {
                    let pubkey_hex = kind.hex().to_string();
                    if seen_inputs.insert(pubkey_hex.clone()) {
                        had_p2pk = true;
                        if block_addresses_seen.insert(pubkey_hex.clone()) {
                            addresses_found += 1;
                        }
                        self.emit_sighting(
                            &pubkey_hex,
                            &tx.txid,
                            height,
                            block.time,
                            true,
                            prev_vout,
                            prev_out.amount_satoshi(),
                        )
                        .await?;
                    }
                }
            }
        }

        self.write_queue
            .send(WriteEvent::BlockScanned { height, had_p2pk })
            .await?;

        self.metrics.record_transactions_processed(tx_count);
        if addresses_found > 0 {
            self.metrics.record_p2pk_addresses_found(addresses_found);
        }

        Ok(())
    }

    /// Fetch unknown previous transactions, batched or one at a time per
    /// configuration. Entries that fail to fetch (or come back `None`)
    /// are simply absent from the cache; their inputs are skipped rather
    /// than failing the whole block.
    async fn fetch_prev_txs(&self, txids: &[String], cache: &mut HashMap<String, RawTx>) {
        if self.batch_rpc {
            match self.node.get_txs_batch(txids).await {
                Ok(fetched) => {
                    for (txid, maybe_tx) in txids.iter().zip(fetched) {
                        if let Some(raw_tx) = maybe_tx {
                            cache.insert(txid.clone(), raw_tx);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "batched previous-tx fetch failed");
                }
            }
        } else {
            for txid in txids {
                match self.node.get_tx(txid).await {
                    Ok(raw_tx) => {
                        cache.insert(txid.clone(), raw_tx);
                    }
                    Err(e) => {
                        tracing::debug!(txid, error = %e, "previous-tx fetch failed");
                    }
                }
            }
        }
    }

    /// Emit the `AddressSeen`/`Transaction`/`AddressBlock` triple for one
    /// P2PK sighting. `Transaction` is already deduplicated per txid per
    /// direction by the caller; a repeated `AddressBlock` for the same
    /// address within a block is harmless; the writer's insert is
    /// `ON CONFLICT DO NOTHING` on `(address_id, height)`.
    #[allow(clippy::too_many_arguments)]
    async fn emit_sighting(
        &self,
        pubkey_hex: &str,
        txid: &str,
        height: u64,
        block_time: u64,
        is_input: bool,
        index: u32,
        amount_satoshi: u64,
    ) -> Result<(), WorkerError> {
        self.write_queue
            .send(WriteEvent::AddressSeen {
                pubkey_hex: pubkey_hex.to_string(),
                height,
            })
            .await?;
        self.write_queue
            .send(WriteEvent::Transaction {
                pubkey_hex: pubkey_hex.to_string(),
                txid: txid.to_string(),
                height,
                block_time,
                is_input,
                index,
                amount_satoshi,
            })
            .await?;
        self.write_queue
            .send(WriteEvent::AddressBlock {
                pubkey_hex: pubkey_hex.to_string(),
                height,
                is_input,
                amount_satoshi,
                txid: txid.to_string(),
            })
            .await?;
        Ok(())
    }
}
