// pipeline/src/console.rs
//
// The operator's single-letter command surface of §6.1: a blocking stdin
// reader on its own task, forwarding parsed commands over an `mpsc`
// channel to the supervisor loop, which is the only place allowed to act
// on them.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    TogglePause,
    Status,
    Integrity,
    Metrics,
    QueueDepth,
    Help,
}

impl ConsoleCommand {
    fn from_line(line: &str) -> Option<Self> {
        match line.trim() {
            "q" => Some(Self::Quit),
            "p" => Some(Self::TogglePause),
            "s" => Some(Self::Status),
            "i" => Some(Self::Integrity),
            "m" => Some(Self::Metrics),
            "u" => Some(Self::QueueDepth),
            "h" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Spawn the stdin-reading task. Returns the receiving half the
/// supervisor's main loop selects on; the task exits (closing the
/// channel) when stdin reaches EOF, e.g. when the process isn't attached
/// to an interactive terminal.
pub fn spawn_listener() -> mpsc::Receiver<ConsoleCommand> {
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(cmd) = ConsoleCommand::from_line(&line) {
                        if tx.send(cmd).await.is_err() {
                            break;
                        }
                    } else if !line.trim().is_empty() {
                        tracing::debug!(%line, "unrecognized console command, press h for help");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "console stdin read failed");
                    break;
                }
            }
        }
    });

    rx
}

pub const HELP_TEXT: &str = "\
q: quit        p: toggle pause   s: status
i: integrity   m: metrics        u: queue depth
h: this help";
