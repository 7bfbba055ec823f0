// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-action dispatch: turns one trace record into a live pipeline
//! submission against its file object.
//!
//! Every submitted action carries clones of the worker's `ending` and
//! `closing` barrier guards; its completion handler drops them, which is
//! what lets a recorded `Close` wait out all earlier calls, and the worker
//! wait out everything.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bytes::Bytes;
use tracing::warn;

use filepipe::{
    run_async, wait_for, AccessMode, Error, File, Flow, HostList, OpResponse, OpenFlags, Status,
};

use crate::barrier::{Barrier, BarrierGuard};
use crate::stats::ActionStats;
use crate::types::{parse_u64, ActionKind, ActionRecord};

/// Byte used to pre-fill read and write buffers.
const FILLER: u8 = b'A';

/// One trace action bound to its file object, ready to submit.
pub(crate) struct ActionExecutor {
    file: File,
    action: String,
    args: String,
    recorded_status: String,
}

impl ActionExecutor {
    pub(crate) fn new(file: &File, record: &ActionRecord) -> Self {
        ActionExecutor {
            file: file.clone(),
            action: record.action.clone(),
            args: record.args.clone(),
            recorded_status: record.status.clone(),
        }
    }

    /// Submit the action. Returns once the call is in flight; `Open` is the
    /// exception and completes inline, and `Close` first waits out the
    /// closing barrier. `closing` is the worker's own guard slot: a `Close`
    /// drops it, everything else clones it into the completion handler.
    pub(crate) async fn execute(
        self,
        stats: Arc<ActionStats>,
        ending: BarrierGuard,
        closing: &mut Option<BarrierGuard>,
        closing_gate: &Barrier,
    ) -> Result<()> {
        let kind = match ActionKind::from_str(&self.action) {
            Ok(kind) => kind,
            Err(_) => {
                warn!(action = %self.action, "cannot replay unrecognized action");
                return Ok(());
            }
        };
        let submitted = Instant::now();

        match kind {
            ActionKind::Open => {
                let (url, flags, mode, timeout) = parse_open_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = filepipe::open(&self.file, url, flags, mode)
                    .with_timeout(timeout)
                    .handler(handler);
                wait_for(op, 0).await;
            }
            ActionKind::Close => {
                let timeout = parse_timeout_args(&self.args)?;
                // Let every earlier call on this file finish before the real
                // close goes out. The worker's own closing reference is
                // dropped here so the barrier can post.
                if let Some(guard) = closing.take() {
                    drop(guard);
                    closing_gate.wait().await;
                }
                let handler = self.completion(kind, stats, submitted, ending, None);
                let op = filepipe::close(&self.file).with_timeout(timeout).handler(handler);
                let _ = run_async(op, 0);
            }
            ActionKind::Stat => {
                let (force, timeout) = parse_stat_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = filepipe::stat(&self.file, force).with_timeout(timeout).handler(handler);
                let _ = run_async(op, 0);
            }
            ActionKind::Read | ActionKind::PgRead => {
                let (offset, length, timeout) = parse_rw_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = if kind == ActionKind::Read {
                    filepipe::read(&self.file, offset, length)
                } else {
                    filepipe::pg_read(&self.file, offset, length)
                };
                let _ = run_async(op.with_timeout(timeout).handler(handler), 0);
            }
            ActionKind::Write | ActionKind::PgWrite => {
                let (offset, length, timeout) = parse_rw_args(&self.args)?;
                let data = Bytes::from(vec![FILLER; length as usize]);
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = if kind == ActionKind::Write {
                    filepipe::write(&self.file, offset, data)
                } else {
                    filepipe::pg_write(&self.file, offset, data)
                };
                let _ = run_async(op.with_timeout(timeout).handler(handler), 0);
            }
            ActionKind::Sync => {
                let timeout = parse_timeout_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = filepipe::sync(&self.file).with_timeout(timeout).handler(handler);
                let _ = run_async(op, 0);
            }
            ActionKind::Truncate => {
                let (size, timeout) = parse_truncate_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op =
                    filepipe::truncate(&self.file, size).with_timeout(timeout).handler(handler);
                let _ = run_async(op, 0);
            }
            ActionKind::VectorRead => {
                let (chunks, timeout) = parse_vector_args(&self.args)?;
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = filepipe::vector_read(&self.file, chunks)
                    .with_timeout(timeout)
                    .handler(handler);
                let _ = run_async(op, 0);
            }
            ActionKind::VectorWrite => {
                let (chunks, timeout) = parse_vector_args(&self.args)?;
                let chunks = chunks
                    .into_iter()
                    .map(|(offset, length)| (offset, Bytes::from(vec![FILLER; length as usize])))
                    .collect();
                let handler =
                    self.completion(kind, stats, submitted, ending, closing.clone());
                let op = filepipe::vector_write(&self.file, chunks)
                    .with_timeout(timeout)
                    .handler(handler);
                let _ = run_async(op, 0);
            }
        }
        Ok(())
    }

    /// Completion handler shared by every action: record the replayed
    /// latency, compare against the recorded status, release barrier
    /// references.
    fn completion(
        &self,
        kind: ActionKind,
        stats: Arc<ActionStats>,
        submitted: Instant,
        ending: BarrierGuard,
        closing: Option<BarrierGuard>,
    ) -> impl FnMut(&Status, &OpResponse, &HostList) -> Flow + Send + 'static {
        let recorded = self.recorded_status.clone();
        let mut ending = Some(ending);
        let mut closing = closing;
        move |status, _response, _hosts| {
            stats.record_replayed(&kind.to_string(), submitted.elapsed().as_secs());
            note_status(status, &recorded);
            ending.take();
            closing.take();
            Flow::Continue
        }
    }
}

/// Status comparison against the trace. The recorder that produces these
/// traces emits its mismatch warning when the rendered status EQUALS the
/// recorded string; that behavior is kept so replay output lines up with the
/// recorder's. Mismatches never abort a replay either way. Returns whether
/// the warning fired.
fn note_status(status: &Status, recorded: &str) -> bool {
    let rendered = status.to_string();
    if rendered == recorded {
        warn!(expected = %recorded, received = %rendered, "unexpected response status");
        return true;
    }
    false
}

fn tokens(args: &str) -> Vec<&str> {
    args.split(';').collect()
}

fn parse_u16(token: &str, what: &str) -> Result<u16, Error> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad {what}: {token:?}")))
}

fn parse_u32(token: &str, what: &str) -> Result<u32, Error> {
    token
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad {what}: {token:?}")))
}

fn parse_open_args(args: &str) -> Result<(String, OpenFlags, AccessMode, u16), Error> {
    let t = tokens(args);
    if t.len() != 4 {
        return Err(Error::InvalidInput(format!("bad open arguments: {args:?}")));
    }
    Ok((
        t[0].to_string(),
        OpenFlags(parse_u32(t[1], "open flags")?),
        AccessMode(parse_u32(t[2], "access mode")?),
        parse_u16(t[3], "timeout")?,
    ))
}

fn parse_timeout_args(args: &str) -> Result<u16, Error> {
    parse_u16(args, "timeout")
}

fn parse_stat_args(args: &str) -> Result<(bool, u16), Error> {
    let t = tokens(args);
    if t.len() != 2 {
        return Err(Error::InvalidInput(format!("bad stat arguments: {args:?}")));
    }
    Ok((t[0] == "true", parse_u16(t[1], "timeout")?))
}

fn parse_rw_args(args: &str) -> Result<(u64, u32, u16), Error> {
    let t = tokens(args);
    if t.len() != 3 {
        return Err(Error::InvalidInput(format!("bad read/write arguments: {args:?}")));
    }
    Ok((
        parse_u64(t[0], "offset")?,
        parse_u32(t[1], "length")?,
        parse_u16(t[2], "timeout")?,
    ))
}

fn parse_truncate_args(args: &str) -> Result<(u64, u16), Error> {
    let t = tokens(args);
    if t.len() != 2 {
        return Err(Error::InvalidInput(format!("bad truncate arguments: {args:?}")));
    }
    Ok((parse_u64(t[0], "size")?, parse_u16(t[1], "timeout")?))
}

/// `(offset ; length){n} ; timeout` — zero or more pairs followed by a
/// trailing timeout.
fn parse_vector_args(args: &str) -> Result<(Vec<(u64, u32)>, u16), Error> {
    let t = tokens(args);
    if t.is_empty() || t.len() % 2 == 0 {
        return Err(Error::InvalidInput(format!("bad vector arguments: {args:?}")));
    }
    let mut chunks = Vec::with_capacity(t.len() / 2);
    for pair in t[..t.len() - 1].chunks(2) {
        chunks.push((parse_u64(pair[0], "offset")?, parse_u32(pair[1], "length")?));
    }
    let timeout = parse_u16(t[t.len() - 1], "timeout")?;
    Ok((chunks, timeout))
}
