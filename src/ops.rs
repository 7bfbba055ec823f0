// src/ops.rs
//
// The operation algebra: typed once-use values describing one pending
// asynchronous call. An `Operation` has no continuation yet; attaching a
// handler or composing it into a chain turns it into a `HandledOperation`.
// Every compositional consumer takes its inputs by value, so reuse of a
// consumed operation is a compile error.

use bytes::Bytes;
use tracing::debug;

use crate::file::{AccessMode, CallOutcome, File, HostList, OpResponse, OpenFlags};
use crate::handler::PipelineHandler;
use crate::status::{code, Status};

/// Control flow yielded by a response handler.
///
/// `Stop` and `Repeat` are the two non-local signals: `Stop(s)` finishes the
/// pipeline with `s` and drops the remaining tail; `Repeat` re-submits the
/// current operation with identical arguments.
pub enum Flow {
    Continue,
    Stop(Status),
    Repeat,
}

/// A user response handler. Invoked once per completed call with the status,
/// the typed payload, and the hosts involved.
pub trait ResponseHandler: Send + Sync {
    fn on_response(&mut self, status: &Status, response: &OpResponse, hosts: &HostList) -> Flow;
}

impl<F> ResponseHandler for F
where
    F: FnMut(&Status, &OpResponse, &HostList) -> Flow + Send + Sync,
{
    fn on_response(&mut self, status: &Status, response: &OpResponse, hosts: &HostList) -> Flow {
        self(status, response, hosts)
    }
}

/// Recovery routine: maps a failed status to a replacement chain that is
/// spliced in front of the remaining tail. Returning `Err` means "no
/// recovery after all".
pub type RecoveryFn = Box<dyn FnOnce(&Status) -> anyhow::Result<HandledOperation> + Send + Sync>;

/// Argument tuple for each of the ten supported calls.
#[derive(Debug, Clone)]
pub enum OpKind {
    Open { url: String, flags: OpenFlags, mode: AccessMode },
    Close,
    Stat { force: bool },
    Read { offset: u64, length: u32 },
    PgRead { offset: u64, length: u32 },
    Write { offset: u64, data: Bytes },
    PgWrite { offset: u64, data: Bytes },
    Sync,
    Truncate { size: u64 },
    VectorRead { chunks: Vec<(u64, u32)> },
    VectorWrite { chunks: Vec<(u64, Bytes)> },
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Open { .. } => "Open",
            OpKind::Close => "Close",
            OpKind::Stat { .. } => "Stat",
            OpKind::Read { .. } => "Read",
            OpKind::PgRead { .. } => "PgRead",
            OpKind::Write { .. } => "Write",
            OpKind::PgWrite { .. } => "PgWrite",
            OpKind::Sync => "Sync",
            OpKind::Truncate { .. } => "Truncate",
            OpKind::VectorRead { .. } => "VectorRead",
            OpKind::VectorWrite { .. } => "VectorWrite",
        }
    }
}

/// A pending call without a continuation.
pub struct Operation {
    file: File,
    kind: OpKind,
    timeout: u16,
    recovery: Option<RecoveryFn>,
}

/// A pending call that owns its [`PipelineHandler`] continuation.
pub struct HandledOperation {
    pub(crate) file: File,
    pub(crate) kind: OpKind,
    pub(crate) timeout: u16,
    pub(crate) handler: Box<PipelineHandler>,
}

/// Conversion into the handled state. An unhandled operation gets an empty
/// synthesized handler so a chain can continue through it.
pub trait IntoHandled {
    fn into_handled(self) -> HandledOperation;
}

impl IntoHandled for HandledOperation {
    fn into_handled(self) -> HandledOperation {
        self
    }
}

impl IntoHandled for Operation {
    fn into_handled(self) -> HandledOperation {
        HandledOperation {
            file: self.file,
            kind: self.kind,
            timeout: self.timeout,
            handler: Box::new(PipelineHandler::new(None, self.recovery)),
        }
    }
}

impl Operation {
    fn new(file: &File, kind: OpKind) -> Self {
        Operation { file: file.clone(), kind, timeout: 0, recovery: None }
    }

    /// Per-operation timeout in seconds; 0 falls back to the pipeline
    /// deadline.
    pub fn with_timeout(mut self, secs: u16) -> Self {
        self.timeout = secs;
        self
    }

    /// Install a recovery routine run when this operation fails.
    pub fn with_recovery<F, T>(mut self, recovery: F) -> Self
    where
        F: FnOnce(&Status) -> anyhow::Result<T> + Send + Sync + 'static,
        T: IntoHandled,
    {
        self.recovery = Some(Box::new(move |status| {
            recovery(status).map(IntoHandled::into_handled)
        }));
        self
    }

    /// Attach a response handler, producing a handled operation. Consumes
    /// both inputs; a handled operation cannot take a second handler.
    pub fn handler<H: ResponseHandler + 'static>(self, handler: H) -> HandledOperation {
        HandledOperation {
            file: self.file,
            kind: self.kind,
            timeout: self.timeout,
            handler: Box::new(PipelineHandler::new(Some(Box::new(handler)), self.recovery)),
        }
    }

    /// Chain `next` after this operation.
    pub fn then<T: IntoHandled>(self, next: T) -> HandledOperation {
        self.into_handled().then(next)
    }
}

impl HandledOperation {
    /// Chain `next` after the deepest operation already reachable from this
    /// one, keeping composition associative.
    pub fn then<T: IntoHandled>(mut self, next: T) -> HandledOperation {
        self.handler.add_operation(next.into_handled());
        self
    }

    pub fn with_timeout(mut self, secs: u16) -> Self {
        self.timeout = secs;
        self
    }

    /// Submit the underlying call and await its outcome. A passed pipeline
    /// deadline converts to an `OperationExpired` failure without touching
    /// the client.
    pub(crate) async fn issue(&self) -> CallOutcome {
        let remaining = match self.handler.deadline().remaining() {
            Ok(secs) => secs,
            Err(_) => {
                return CallOutcome::error(Status::error_msg(
                    code::OPERATION_EXPIRED,
                    "pipeline deadline passed before submission",
                ));
            }
        };
        let timeout = effective_timeout(self.timeout, remaining);
        debug!(op = self.kind.name(), timeout, "submitting operation");

        let client = self.file.client();
        match &self.kind {
            OpKind::Open { url, flags, mode } => client.open(url, *flags, *mode, timeout).await,
            OpKind::Close => client.close(timeout).await,
            OpKind::Stat { force } => client.stat(*force, timeout).await,
            OpKind::Read { offset, length } => client.read(*offset, *length, timeout).await,
            OpKind::PgRead { offset, length } => client.pg_read(*offset, *length, timeout).await,
            OpKind::Write { offset, data } => client.write(*offset, data.clone(), timeout).await,
            OpKind::PgWrite { offset, data } => {
                client.pg_write(*offset, data.clone(), timeout).await
            }
            OpKind::Sync => client.sync(timeout).await,
            OpKind::Truncate { size } => client.truncate(*size, timeout).await,
            OpKind::VectorRead { chunks } => client.vector_read(chunks.clone(), timeout).await,
            OpKind::VectorWrite { chunks } => client.vector_write(chunks.clone(), timeout).await,
        }
    }
}

/// Per-call timeout actually handed to the client: the operation's own value
/// bounded by whatever the pipeline deadline leaves (0 = unbounded).
fn effective_timeout(own: u16, remaining: u16) -> u16 {
    match (own, remaining) {
        (0, r) => r,
        (t, 0) => t,
        (t, r) => t.min(r),
    }
}

pub fn open(file: &File, url: impl Into<String>, flags: OpenFlags, mode: AccessMode) -> Operation {
    Operation::new(file, OpKind::Open { url: url.into(), flags, mode })
}

pub fn close(file: &File) -> Operation {
    Operation::new(file, OpKind::Close)
}

pub fn stat(file: &File, force: bool) -> Operation {
    Operation::new(file, OpKind::Stat { force })
}

pub fn read(file: &File, offset: u64, length: u32) -> Operation {
    Operation::new(file, OpKind::Read { offset, length })
}

pub fn pg_read(file: &File, offset: u64, length: u32) -> Operation {
    Operation::new(file, OpKind::PgRead { offset, length })
}

pub fn write(file: &File, offset: u64, data: Bytes) -> Operation {
    Operation::new(file, OpKind::Write { offset, data })
}

pub fn pg_write(file: &File, offset: u64, data: Bytes) -> Operation {
    Operation::new(file, OpKind::PgWrite { offset, data })
}

pub fn sync(file: &File) -> Operation {
    Operation::new(file, OpKind::Sync)
}

pub fn truncate(file: &File, size: u64) -> Operation {
    Operation::new(file, OpKind::Truncate { size })
}

pub fn vector_read(file: &File, chunks: Vec<(u64, u32)>) -> Operation {
    Operation::new(file, OpKind::VectorRead { chunks })
}

pub fn vector_write(file: &File, chunks: Vec<(u64, Bytes)>) -> Operation {
    Operation::new(file, OpKind::VectorWrite { chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_timeout_prefers_tighter_bound() {
        assert_eq!(effective_timeout(0, 0), 0);
        assert_eq!(effective_timeout(0, 30), 30);
        assert_eq!(effective_timeout(10, 0), 10);
        assert_eq!(effective_timeout(10, 3), 3);
        assert_eq!(effective_timeout(3, 10), 3);
    }

    #[test]
    fn op_kind_names() {
        assert_eq!(OpKind::Close.name(), "Close");
        assert_eq!(OpKind::Read { offset: 0, length: 1 }.name(), "Read");
        assert_eq!(OpKind::VectorWrite { chunks: Vec::new() }.name(), "VectorWrite");
    }
}
