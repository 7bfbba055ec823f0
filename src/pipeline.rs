// src/pipeline.rs
//
// Terminal runners for operation chains. A `Pipeline` is a move-only holder
// of a handled head; running it consumes it, so a pipeline cannot be started
// twice. The driving task owns the operation baton exclusively between
// submission and dispatch.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::handler::{Deadline, FinalFn, PipelineHandler};
use crate::ops::{HandledOperation, IntoHandled, Operation};
use crate::status::{code, Status};

/// A linear chain of handled operations sharing one completion promise.
pub struct Pipeline {
    head: Option<HandledOperation>,
}

impl Pipeline {
    /// A pipeline with no operations; running it resolves Ok immediately.
    pub fn empty() -> Self {
        Pipeline { head: None }
    }
}

impl From<HandledOperation> for Pipeline {
    fn from(op: HandledOperation) -> Self {
        Pipeline { head: Some(op) }
    }
}

impl From<Operation> for Pipeline {
    fn from(op: Operation) -> Self {
        Pipeline { head: Some(op.into_handled()) }
    }
}

/// Future resolving with the pipeline's final status.
pub struct PipelineStatus {
    rx: oneshot::Receiver<Status>,
}

impl Future for PipelineStatus {
    type Output = Status;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Status> {
        Pin::new(&mut self.rx).poll(cx).map(|res| {
            res.unwrap_or_else(|_| {
                Status::error_msg(code::ABORTED, "pipeline task dropped its completion promise")
            })
        })
    }
}

/// Schedule a pipeline for execution and return its status future.
/// Non-blocking; must be called within a tokio runtime.
///
/// `timeout` is the whole-pipeline deadline in seconds (0 = none).
pub fn run_async(pipeline: impl Into<Pipeline>, timeout: u16) -> PipelineStatus {
    submit(pipeline.into(), timeout, None)
}

/// Like [`run_async`] but additionally invokes `final_cb` exactly once with
/// the terminal status, before the returned future resolves.
pub fn run_async_with<F>(pipeline: impl Into<Pipeline>, timeout: u16, final_cb: F) -> PipelineStatus
where
    F: FnOnce(&Status) + Send + Sync + 'static,
{
    submit(pipeline.into(), timeout, Some(Box::new(final_cb)))
}

/// Schedule a pipeline and await its final status.
pub async fn wait_for(pipeline: impl Into<Pipeline>, timeout: u16) -> Status {
    run_async(pipeline, timeout).await
}

fn submit(pipeline: Pipeline, timeout: u16, final_cb: Option<FinalFn>) -> PipelineStatus {
    let (tx, rx) = oneshot::channel();
    match pipeline.head {
        None => {
            let status = Status::ok();
            if let Some(f) = final_cb {
                f(&status);
            }
            let _ = tx.send(status);
        }
        Some(mut head) => {
            head.handler.assign(Deadline::new(timeout), Some(tx), final_cb);
            tokio::spawn(drive(head));
        }
    }
    PipelineStatus { rx }
}

/// Owns the baton: issue the current operation, hand the outcome to its
/// handler, continue with whatever operation the dispatch yields.
async fn drive(mut op: HandledOperation) {
    loop {
        let outcome = op.issue().await;
        match PipelineHandler::handle_response(op, outcome) {
            Some(next) => op = next,
            None => break,
        }
    }
}
