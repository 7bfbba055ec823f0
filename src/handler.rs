// src/handler.rs
//
// The pipeline handler is the single continuation every call completion runs
// through. It owns the link to the next operation, the user handler, the
// recovery routine, and the completion promise; at each step it decides
// whether the chain advances, retries, recovers, or terminates.
//
// Ownership is a baton: exactly one holder exists at any instant. The
// driving loop in `pipeline.rs` owns the current operation (and with it the
// handler) between submission and dispatch; `handle_response` consumes both
// and either hands back a successor or finishes the pipeline.

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::Error;
use crate::file::CallOutcome;
use crate::ops::{Flow, HandledOperation, RecoveryFn, ResponseHandler};
use crate::status::Status;

/// Monotonic pipeline deadline fixed when the pipeline is started.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// A deadline `timeout_secs` from now; 0 means no deadline at all.
    pub(crate) fn new(timeout_secs: u16) -> Self {
        let expires =
            (timeout_secs > 0).then(|| Instant::now() + Duration::from_secs(u64::from(timeout_secs)));
        Deadline { expires }
    }

    /// Whole seconds left, `Ok(0)` when unbounded, `Err` once passed.
    /// Sub-second remainders round up so an almost-expired deadline still
    /// reaches the client as a 1-second limit.
    pub(crate) fn remaining(&self) -> Result<u16, Error> {
        match self.expires {
            None => Ok(0),
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    return Err(Error::OperationExpired);
                }
                let secs = (at - now).as_secs_f64().ceil() as u64;
                Ok(secs.min(u64::from(u16::MAX)) as u16)
            }
        }
    }

    #[cfg(test)]
    fn expired() -> Self {
        Deadline { expires: Some(Instant::now() - Duration::from_secs(1)) }
    }
}

pub(crate) type FinalFn = Box<dyn FnOnce(&Status) + Send + Sync>;
pub(crate) type Promise = oneshot::Sender<Status>;

pub struct PipelineHandler {
    /// The user's handler for the current operation, if any.
    response_handler: Option<Box<dyn ResponseHandler>>,
    /// Next operation in the chain, owned.
    next_operation: Option<Box<HandledOperation>>,
    /// Recovery routine for the current operation; consumed on first use.
    recovery: Option<RecoveryFn>,
    /// Pipeline deadline, traveling along the chain.
    deadline: Deadline,
    /// Single-shot completion promise, traveling along the chain.
    promise: Option<Promise>,
    /// Callback invoked exactly once at the end of the pipeline.
    final_cb: Option<FinalFn>,
}

impl PipelineHandler {
    pub(crate) fn new(
        response_handler: Option<Box<dyn ResponseHandler>>,
        recovery: Option<RecoveryFn>,
    ) -> Self {
        PipelineHandler {
            response_handler,
            next_operation: None,
            recovery,
            deadline: Deadline::default(),
            promise: None,
            final_cb: None,
        }
    }

    /// Append an operation at the deepest free `next` slot. Walking the chain
    /// here is what makes composition associative.
    pub(crate) fn add_operation(&mut self, op: HandledOperation) {
        match &mut self.next_operation {
            Some(next) => next.handler.add_operation(op),
            None => self.next_operation = Some(Box::new(op)),
        }
    }

    /// Move the traveling state (deadline, promise, final callback) into this
    /// handler before its operation is submitted.
    pub(crate) fn assign(
        &mut self,
        deadline: Deadline,
        promise: Option<Promise>,
        final_cb: Option<FinalFn>,
    ) {
        self.deadline = deadline;
        self.promise = promise;
        self.final_cb = final_cb;
    }

    pub(crate) fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Terminal event: fire the final callback and fulfill the promise, each
    /// exactly once, then drop.
    fn finish(mut self, status: Status) {
        if let Some(f) = self.final_cb.take() {
            f(&status);
        }
        if let Some(tx) = self.promise.take() {
            let _ = tx.send(status);
        }
    }

    /// Dispatch one completed call. Consumes the operation and its handler;
    /// returns the operation to run next, or `None` when the pipeline is
    /// finished.
    pub(crate) fn handle_response(
        current: HandledOperation,
        outcome: CallOutcome,
    ) -> Option<HandledOperation> {
        let HandledOperation { file, kind, timeout, handler } = current;
        let mut handler = *handler;
        let CallOutcome { status, response, hosts } = outcome;

        if let Some(user) = handler.response_handler.as_mut() {
            match user.on_response(&status, &response, &hosts) {
                Flow::Stop(final_status) => {
                    // Remaining tail is dropped with the handler.
                    handler.finish(final_status);
                    return None;
                }
                Flow::Repeat => {
                    // Re-home the handler into the same operation; arguments,
                    // deadline, promise and final callback are all unchanged.
                    return Some(HandledOperation {
                        file,
                        kind,
                        timeout,
                        handler: Box::new(handler),
                    });
                }
                Flow::Continue => {}
            }
        }

        if !status.is_ok() {
            if let Some(recover) = handler.recovery.take() {
                match recover(&status) {
                    Ok(mut replacement) => {
                        // Splice: the existing tail continues after the
                        // recovery chain.
                        if let Some(tail) = handler.next_operation.take() {
                            replacement.handler.add_operation(*tail);
                        }
                        replacement.handler.assign(
                            handler.deadline,
                            handler.promise.take(),
                            handler.final_cb.take(),
                        );
                        return Some(replacement);
                    }
                    Err(err) => {
                        debug!(error = %err, "recovery routine declined, proceeding without it");
                    }
                }
            }
        }

        match handler.next_operation.take() {
            Some(mut next) if status.is_ok() => {
                next.handler.assign(
                    handler.deadline,
                    handler.promise.take(),
                    handler.final_cb.take(),
                );
                Some(*next)
            }
            _ => {
                handler.finish(status);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_deadline_never_expires() {
        let deadline = Deadline::new(0);
        assert_eq!(deadline.remaining().unwrap(), 0);
    }

    #[test]
    fn fresh_deadline_reports_remaining_seconds() {
        let deadline = Deadline::new(30);
        let left = deadline.remaining().unwrap();
        assert!(left >= 29 && left <= 30, "left = {left}");
    }

    #[test]
    fn passed_deadline_is_an_error() {
        let deadline = Deadline::expired();
        assert!(matches!(deadline.remaining(), Err(Error::OperationExpired)));
    }
}
