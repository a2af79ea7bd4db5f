// pipeline/src/supervisor.rs
//
// Wires every stage together and owns the startup/shutdown sequence of
// §4.7: read progress → populate ingress → launch writer, distributor,
// workers, pause controller, console → run until drained or stopped →
// drain writer → commit final progress.

use crate::console::{self, ConsoleCommand, HELP_TEXT};
use crate::pause::{PauseControlHandle, PauseController};
use anyhow::{Context, Result};
use config::Config;
use distributor::{worker_queue, Distributor};
use node::{BitcoinCoreClient, NodeClient};
use scan_metrics::Metrics;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::{PgBackend, PgProgressStore, ProgressStore, WriteBehindBuffer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use worker::{PauseFlag, Worker};

/// How often the progress-commit task wakes to check whether enough
/// blocks have completed since the last save.
const PROGRESS_TICK: Duration = Duration::from_secs(5);
/// Bound on the graceful shutdown drain, per §4.7.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(300);
/// Capacity of the ingress channel the height feeder writes into; small
/// relative to the block range since the distributor only ever wants
/// `target_depth` heights ahead per worker.
const INGRESS_CAPACITY: usize = 4096;

pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(self) -> Result<()> {
        let scanner = &self.config.scanner;
        let metrics = Arc::new(Metrics::new());

        let node = Arc::new(
            BitcoinCoreClient::new(
                &self.config.bitcoin,
                scanner.max_retries,
                Duration::from_secs(scanner.retry_delay_secs),
                Duration::from_secs(scanner.connection_timeout_secs),
                scanner.rpc_batch_size,
            )
            .context("failed to build node client")?,
        );

        let database_url = self.config.database.database_url();
        let writer_backend = PgBackend::connect(&database_url)
            .await
            .context("failed to connect writer backend")?;
        writer_backend
            .ensure_schema()
            .await
            .context("failed to ensure schema")?;
        let read_backend = PgBackend::connect(&database_url)
            .await
            .context("failed to connect read backend")?;
        let progress_store =
            PgProgressStore::new(read_backend.pool().clone(), scanner.scanner_id.clone());

        let stored_progress = progress_store.load().await?;
        let start = scanner.start_block.unwrap_or_else(|| {
            if scanner.reset {
                1
            } else {
                stored_progress.map(|h| h + 1).unwrap_or(1)
            }
        });
        let end = match scanner.end_block {
            Some(end) => end,
            None => node.get_chain_tip().await.context("failed to read chain tip")?,
        };

        tracing::info!(start, end, "scan range resolved");

        let (buffer, write_queue) = WriteBehindBuffer::new(
            writer_backend,
            scanner.queue_size,
            scanner.batch_size,
            Duration::from_secs(1),
            scanner.max_retries,
        );
        let writer_handle = tokio::spawn(buffer.run());

        let stop = Arc::new(AtomicBool::new(false));

        let (ingress_tx, ingress_rx) = mpsc::channel::<u64>(INGRESS_CAPACITY);
        let feeder_stop = stop.clone();
        let feeder = tokio::spawn(async move {
            for height in start..=end {
                if feeder_stop.load(Ordering::Relaxed) {
                    break;
                }
                if ingress_tx.send(height).await.is_err() {
                    break;
                }
            }
        });

        let mut worker_queue_handles = Vec::with_capacity(scanner.threads);
        let mut worker_handles = Vec::with_capacity(scanner.threads);
        let pause_flag = PauseFlag::new();

        for id in 0..scanner.threads {
            let (handle, receiver) = worker_queue(scanner.target_depth);
            worker_queue_handles.push(handle);

            let worker = Worker::new(
                id,
                node.clone(),
                receiver,
                write_queue.clone(),
                pause_flag.clone(),
                stop.clone(),
                scanner.quick_scan,
                scanner.batch_rpc,
                metrics.clone(),
            );
            worker_handles.push(tokio::spawn(worker.run()));
        }

        let distributor = Distributor::new(
            ingress_rx,
            worker_queue_handles,
            scanner.target_depth,
            stop.clone(),
        );
        let distributor_handle = tokio::spawn(distributor.run());

        let pause_control = PauseControlHandle::new(pause_flag);
        let pause_controller = PauseController::new(
            pause_control.clone(),
            write_queue.clone(),
            metrics.clone(),
            scanner.auto_pause_enabled,
            scanner.pause_threshold,
            scanner.resume_threshold,
            stop.clone(),
        );
        let pause_handle = tokio::spawn(pause_controller.run());

        let committed = Arc::new(AtomicU64::new(start.saturating_sub(1)));
        let progress_handle = spawn_progress_ticker(
            read_backend.clone(),
            progress_store.clone(),
            metrics.clone(),
            stop.clone(),
            committed.clone(),
            scanner.progress_update_interval,
        );

        let mut console_rx = console::spawn_listener();
        let mut console_closed = false;
        let mut drained = false;

        let drain = {
            let distributor_handle = distributor_handle;
            let mut worker_handles = worker_handles;
            tokio::spawn(async move {
                let _ = distributor_handle.await;
                for handle in worker_handles.drain(..) {
                    let _ = handle.await;
                }
            })
        };
        tokio::pin!(drain);

        loop {
            tokio::select! {
                result = &mut drain => {
                    drained = true;
                    result.context("drain task panicked")?;
                    tracing::info!("scan range exhausted, shutting down");
                    break;
                }
                cmd = console_rx.recv(), if !console_closed => {
                    match cmd {
                        Some(ConsoleCommand::Quit) => {
                            tracing::info!("quit requested, stopping");
                            stop.store(true, Ordering::Relaxed);
                        }
                        Some(ConsoleCommand::TogglePause) => {
                            let now_paused = pause_control.toggle_manual();
                            tracing::info!(paused = now_paused, "manual pause toggled");
                        }
                        Some(ConsoleCommand::Status) => {
                            let snap = metrics.snapshot();
                            tracing::info!(
                                blocks_scanned = snap.blocks_scanned,
                                blocks_failed = snap.blocks_failed,
                                write_queue_depth = write_queue.depth(),
                                paused = pause_control.is_paused(),
                                "status"
                            );
                        }
                        Some(ConsoleCommand::Integrity) => {
                            let snap = metrics.snapshot();
                            tracing::info!(
                                retries_exhausted = snap.retries_exhausted,
                                "integrity summary: fatal address-resolution halts recorded by this process"
                            );
                        }
                        Some(ConsoleCommand::Metrics) => {
                            let snap = metrics.snapshot();
                            tracing::info!(?snap, "metrics");
                        }
                        Some(ConsoleCommand::QueueDepth) => {
                            tracing::info!(depth = write_queue.depth(), "write queue depth");
                        }
                        Some(ConsoleCommand::Help) => {
                            tracing::info!("{}", HELP_TEXT);
                        }
                        None => {
                            console_closed = true;
                        }
                    }
                }
            }
        }

        if stop.load(Ordering::Relaxed) && !drained {
            match tokio::time::timeout(SHUTDOWN_BUDGET, &mut drain).await {
                Ok(result) => { result.context("drain task panicked")?; }
                Err(_) => {
                    tracing::warn!("shutdown budget exceeded, forcing termination");
                    drain.abort();
                }
            }
        }
        let _ = feeder.await;

        // The pause controller holds its own `WriteQueueHandle` clone;
        // it must be gone before dropping ours, or the writer's channel
        // never sees its last sender disappear and `run()` blocks forever.
        // Awaiting (rather than just calling) `abort()` ensures the task
        // has actually been torn down, not merely scheduled for it.
        pause_handle.abort();
        let _ = pause_handle.await;
        progress_handle.abort();
        let _ = progress_handle.await;
        drop(write_queue);

        let writer_result = writer_handle.await.context("writer task panicked")?;

        // §4.7: shutdown always performs a final progress update before
        // returning, so the last up-to-`progress_update_interval` blocks
        // of high-water mark aren't lost on an otherwise clean drain.
        let last_committed = committed.load(Ordering::Relaxed);
        match read_backend.max_contiguous_scanned_height(last_committed).await {
            Ok(new_height) if new_height > last_committed => {
                let advanced = new_height - last_committed;
                if let Err(e) = progress_store.save(new_height, advanced).await {
                    tracing::error!(error = %e, "failed to persist final scan progress");
                } else {
                    tracing::info!(height = new_height, "final progress committed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "failed to compute final contiguous progress"),
        }

        if let Err(store::StoreError::AddressResolutionExhausted { .. }) = &writer_result {
            metrics.record_retry_exhausted();
        }
        writer_result.context("writer halted on a fatal store error")?;

        Ok(())
    }
}

fn spawn_progress_ticker(
    read_backend: PgBackend,
    progress_store: PgProgressStore,
    metrics: Arc<Metrics>,
    stop: Arc<AtomicBool>,
    committed: Arc<AtomicU64>,
    interval_blocks: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        let mut blocks_at_last_save = 0u64;

        loop {
            ticker.tick().await;
            if stop.load(Ordering::Relaxed) {
                break;
            }

            let blocks_scanned = metrics.snapshot().blocks_scanned;
            if blocks_scanned.saturating_sub(blocks_at_last_save) < interval_blocks {
                continue;
            }

            let last_committed = committed.load(Ordering::Relaxed);
            match store::Backend::max_contiguous_scanned_height(&read_backend, last_committed).await {
                Ok(new_height) if new_height > last_committed => {
                    let advanced = new_height - last_committed;
                    if let Err(e) = progress_store.save(new_height, advanced).await {
                        tracing::error!(error = %e, "failed to persist scan progress");
                        continue;
                    }
                    committed.store(new_height, Ordering::Relaxed);
                    blocks_at_last_save = blocks_scanned;
                    tracing::debug!(height = new_height, "progress committed");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "failed to compute contiguous progress"),
            }
        }
    })
}
