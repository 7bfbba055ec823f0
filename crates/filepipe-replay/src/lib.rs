// SPDX-License-Identifier: Apache-2.0 OR MIT

//! filepipe-replay: session replay for recorded client workloads.
//!
//! Parses a CSV trace of prior client activity and reconstructs it against
//! live file objects through the `filepipe` operation algebra:
//!
//! - one worker task per recorded file, preserving inter-arrival gaps;
//! - a two-barrier protocol ordering the terminal `Close` after every other
//!   call on the same file, and the worker's exit after everything;
//! - reference vs. replayed latency statistics keyed by action name.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use filepipe_replay::{replay_trace, ActionStats, LocalClientFactory, ReplayConfig};
//!
//! # tokio_test::block_on(async {
//! let config = ReplayConfig {
//!     trace_path: "session.csv".into(),
//!     speed: 1.0,
//! };
//! let factory = Arc::new(LocalClientFactory::new("/tmp/replay"));
//! replay_trace(config, factory).await.unwrap();
//! ActionStats::global().report(&mut std::io::stdout()).unwrap();
//! # });
//! ```
//!
//! Execution is pluggable: implement [`ClientFactory`] to point replayed
//! file objects at any [`filepipe::FileClient`].

pub mod barrier;
pub mod driver;
mod executor;
pub mod reader;
pub mod stats;
pub mod types;

pub use barrier::{barrier, Barrier, BarrierGuard};
pub use driver::{replay_trace, replay_trace_with, ClientFactory, LocalClientFactory, ReplayConfig};
pub use reader::TraceReader;
pub use stats::ActionStats;
pub use types::{ActionKind, ActionRecord, ActionStream};
