// pipeline/src/lib.rs
//
// Entry point for the scanning pipeline: loads configuration, wires every
// stage together through `Supervisor`, and runs until the scan range is
// exhausted or the operator requests a stop.

mod console;
mod pause;
mod supervisor;

pub use console::ConsoleCommand;
pub use pause::{PauseControlHandle, PauseController};
pub use supervisor::Supervisor;

use anyhow::Result;
use config::Config;

/// Run the scanner to completion (or until stopped) with the given
/// configuration.
pub async fn run_scanner(config: Config) -> Result<()> {
    Supervisor::new(config).run().await
}
