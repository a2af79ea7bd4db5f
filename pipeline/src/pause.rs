// pipeline/src/pause.rs
//
// The automatic/manual pause controller of §4.6: a periodic task that
// compares the write queue's depth against `pause_threshold`/
// `resume_threshold` and flips a shared `worker::PauseFlag` accordingly,
// with an operator-driven manual override that takes priority over the
// automatic decision until the operator clears it.

use scan_metrics::Metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::WriteQueueHandle;
use worker::PauseFlag;

const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// The handle the console and supervisor share to request a manual
/// pause/resume. `toggle_manual` flips both the override flag and the
/// pause flag in lockstep: setting the override suppresses automatic
/// resume while manually paused, clearing it immediately hands control
/// back to the automatic controller on its next tick.
#[derive(Clone)]
pub struct PauseControlHandle {
    flag: PauseFlag,
    manual_override: Arc<AtomicBool>,
}

impl PauseControlHandle {
    pub fn new(flag: PauseFlag) -> Self {
        Self {
            flag,
            manual_override: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.flag.is_paused()
    }

    pub fn is_manual(&self) -> bool {
        self.manual_override.load(Ordering::Relaxed)
    }

    /// Operator `p` command: toggle the manual override. Pausing sets
    /// both the override and the flag; resuming clears both, handing
    /// control straight back to the automatic controller.
    pub fn toggle_manual(&self) -> bool {
        let now_paused = !self.flag.is_paused();
        self.flag.set(now_paused);
        self.manual_override.store(now_paused, Ordering::Relaxed);
        now_paused
    }
}

/// The periodic hysteresis check of §4.6: pause when the write queue
/// grows past `pause_threshold`, resume once it drains below
/// `resume_threshold`. Skipped entirely while a manual override is in
/// effect, and entirely inert when `enabled` is false (still ticks, so
/// the metrics gauge keeps updating).
pub struct PauseController {
    control: PauseControlHandle,
    write_queue: WriteQueueHandle,
    metrics: Arc<Metrics>,
    enabled: bool,
    pause_threshold: usize,
    resume_threshold: usize,
    stop: Arc<AtomicBool>,
}

impl PauseController {
    pub fn new(
        control: PauseControlHandle,
        write_queue: WriteQueueHandle,
        metrics: Arc<Metrics>,
        enabled: bool,
        pause_threshold: usize,
        resume_threshold: usize,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            control,
            write_queue,
            metrics,
            enabled,
            pause_threshold,
            resume_threshold,
            stop,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        loop {
            ticker.tick().await;
            if self.stop.load(Ordering::Relaxed) {
                break;
            }

            let depth = self.write_queue.depth();
            self.metrics.set_write_queue_depth(depth as u64);

            if !self.enabled || self.control.is_manual() {
                continue;
            }

            let paused = self.control.flag.is_paused();
            if !paused && depth >= self.pause_threshold {
                self.control.flag.set(true);
                self.metrics.record_pause_event();
                tracing::warn!(depth, threshold = self.pause_threshold, "auto-pause engaged");
            } else if paused && depth <= self.resume_threshold {
                self.control.flag.set(false);
                tracing::info!(depth, threshold = self.resume_threshold, "auto-pause released");
            }
        }
    }
}
