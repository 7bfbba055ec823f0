// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Replay orchestration: one worker task per recorded file, each preserving
//! the recorded inter-arrival gaps and finishing through the two-barrier
//! termination protocol.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info};

use filepipe::{File, FileClient, LocalFileClient};

use crate::barrier::barrier;
use crate::executor::ActionExecutor;
use crate::reader::TraceReader;
use crate::stats::ActionStats;
use crate::types::ActionStream;

/// Replay configuration.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to the recorded trace (CSV, optionally zstd-compressed).
    pub trace_path: PathBuf,

    /// Speed multiplier applied to recorded inter-arrival gaps
    /// (1.0 = recorded pacing, 2.0 = twice as fast).
    pub speed: f64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        ReplayConfig { trace_path: PathBuf::new(), speed: 1.0 }
    }
}

/// Produces the client backing each replayed file object.
///
/// Implementations decide what a trace file-id maps to; the default targets
/// the local filesystem.
pub trait ClientFactory: Send + Sync {
    fn create(&self, file_id: u64) -> Arc<dyn FileClient>;
}

/// Factory mapping every replayed file onto a [`LocalFileClient`] rooted at
/// one directory.
pub struct LocalClientFactory {
    root: PathBuf,
}

impl LocalClientFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalClientFactory { root: root.into() }
    }
}

impl ClientFactory for LocalClientFactory {
    fn create(&self, _file_id: u64) -> Arc<dyn FileClient> {
        Arc::new(LocalFileClient::new(self.root.clone()))
    }
}

/// Replay a trace, recording statistics into the global registry.
pub async fn replay_trace(config: ReplayConfig, factory: Arc<dyn ClientFactory>) -> Result<()> {
    let stats = ActionStats::global();
    replay_trace_with(config, factory, stats).await
}

/// Replay a trace against an explicit statistics registry.
pub async fn replay_trace_with(
    config: ReplayConfig,
    factory: Arc<dyn ClientFactory>,
    stats: Arc<ActionStats>,
) -> Result<()> {
    if !(config.speed > 0.0) {
        bail!("replay speed must be positive, got {}", config.speed);
    }

    let reader = TraceReader::from_file_with(&config.trace_path, &stats)
        .with_context(|| format!("failed to load trace {}", config.trace_path.display()))?;
    info!(
        files = reader.file_count(),
        actions = reader.len(),
        speed = config.speed,
        "starting replay"
    );

    let mut workers = FuturesUnordered::new();
    for (file_id, stream) in reader.into_streams() {
        if stream.is_empty() {
            continue;
        }
        let file = File::new(factory.create(file_id));
        file.set_property("BundledClose", "true");
        let stats = stats.clone();
        let speed = config.speed;
        workers.push(tokio::spawn(async move {
            run_file_worker(file_id, file, stream, speed, stats).await
        }));
    }

    while let Some(joined) = workers.next().await {
        joined.context("replay worker panicked")??;
    }

    info!("replay complete");
    Ok(())
}

/// Drive all recorded actions of one file.
///
/// `prevstop` tracks the recorded timeline: it advances to each action's
/// recorded start and then by the wall-clock seconds the submission itself
/// took, so synchronous submissions (Open, the Close barrier wait) eat into
/// later gaps. This drifts against wall time exactly like the recorded
/// pacing the traces were produced under.
async fn run_file_worker(
    file_id: u64,
    file: File,
    actions: ActionStream,
    speed: f64,
    stats: Arc<ActionStats>,
) -> Result<()> {
    let (ending_gate, ending_guard) = barrier();
    let (closing_gate, closing_guard) = barrier();
    let mut closing = Some(closing_guard);

    let mut prevstop = actions.first_start().unwrap_or(0);
    for record in actions {
        if record.start > prevstop {
            let gap = (record.start - prevstop) as f64 / speed;
            debug!(file_id, gap, "sleeping out inter-arrival gap");
            sleep(Duration::from_secs_f64(gap)).await;
        }
        prevstop = record.start;

        let timer = Instant::now();
        ActionExecutor::new(&file, &record)
            .execute(stats.clone(), ending_guard.clone(), &mut closing, &closing_gate)
            .await
            .with_context(|| format!("failed to replay {} on file {}", record.action, file_id))?;
        prevstop += timer.elapsed().as_secs();
    }

    // Release the worker's own barrier references, then wait for every
    // completion handler to release theirs.
    drop(ending_guard);
    closing.take();
    ending_gate.wait().await;
    drop(file);

    debug!(file_id, "worker finished");
    Ok(())
}
