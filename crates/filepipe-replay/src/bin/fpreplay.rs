// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replay a recorded client trace against live files.
//!
//! ```bash
//! fpreplay session.csv
//! fpreplay session.csv.zst --speed 10 --root /tmp/replay
//! ```
//!
//! Prints per-action average durations (recorded and replayed) on success.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use filepipe_replay::{replay_trace, ActionStats, LocalClientFactory, ReplayConfig};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to the recorded trace (CSV, optionally zstd-compressed).
    trace: PathBuf,

    /// Speed multiplier applied to recorded inter-arrival gaps.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Directory replayed file URLs are mapped under.
    #[arg(long, default_value = ".")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = ReplayConfig { trace_path: cli.trace, speed: cli.speed };
    let factory = Arc::new(LocalClientFactory::new(cli.root));

    if let Err(err) = replay_trace(config, factory).await {
        eprintln!("Error: {err:#}");
        return ExitCode::FAILURE;
    }

    if let Err(err) = ActionStats::global().report(&mut io::stdout()) {
        eprintln!("Error: failed to print statistics: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
