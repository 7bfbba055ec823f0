// src/lib.rs
//
// Crate root — module wiring plus the public re-exports.

//! Composable asynchronous operation pipelines for a remote file-access
//! client.
//!
//! Operations are once-use values: constructors produce an unhandled
//! [`Operation`], attaching a response handler or composing with [`then`]
//! yields a [`HandledOperation`], and a [`Pipeline`] runs the chain to a
//! single final [`Status`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use filepipe::{
//!     open, read, close, run_async, AccessMode, File, Flow, HostList, OpResponse, OpenFlags,
//!     Status,
//! };
//! # async fn demo(client: Arc<dyn filepipe::FileClient>) {
//! let file = File::new(client);
//! let pipeline = open(&file, "proto://host/data.bin", OpenFlags::READ, AccessMode::NONE)
//!     .then(read(&file, 0, 4096).handler(|status: &Status, _resp: &OpResponse, _hosts: &HostList| {
//!         if status.is_ok() { Flow::Continue } else { Flow::Stop(status.clone()) }
//!     }))
//!     .then(close(&file));
//! let status = run_async(pipeline, 30).await;
//! # let _ = status;
//! # }
//! ```
//!
//! [`then`]: Operation::then

pub mod error;
pub mod file;
mod handler;
pub mod local_client;
pub mod ops;
pub mod pipeline;
pub mod status;

pub use error::Error;
pub use file::{
    AccessMode, CallOutcome, ChunkInfo, File, FileClient, HostList, OpResponse, OpenFlags,
    PageInfo, StatInfo, VectorReadInfo, PAGE_SIZE,
};
pub use local_client::LocalFileClient;
pub use ops::{
    close, open, pg_read, pg_write, read, stat, sync, truncate, vector_read, vector_write, write,
    Flow, HandledOperation, IntoHandled, OpKind, Operation, ResponseHandler,
};
pub use pipeline::{run_async, run_async_with, wait_for, Pipeline, PipelineStatus};
pub use status::{code, Status, StatusKind};
