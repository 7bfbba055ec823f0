// tests/common/mod.rs
//
// Shared scripted client for pipeline tests: records every invocation and
// replies with queued statuses (OK once the script runs out).

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use filepipe::{
    AccessMode, CallOutcome, ChunkInfo, FileClient, OpResponse, OpenFlags, PageInfo, StatInfo,
    Status, VectorReadInfo,
};

pub struct ScriptedClient {
    calls: Arc<Mutex<Vec<String>>>,
    statuses: Mutex<VecDeque<Status>>,
    delay: Option<Duration>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        ScriptedClient {
            calls: Arc::new(Mutex::new(Vec::new())),
            statuses: Mutex::new(VecDeque::new()),
            delay: None,
        }
    }

    /// Statuses handed out call by call; OK after the script is exhausted.
    pub fn with_statuses(statuses: Vec<Status>) -> Self {
        let client = Self::new();
        *client.statuses.lock().unwrap() = statuses.into();
        client
    }

    /// Delay every call by `delay` before replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn reply(&self, response: OpResponse) -> CallOutcome {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or_else(Status::ok);
        if status.is_ok() {
            CallOutcome { status, response, hosts: vec!["mockhost".to_string()] }
        } else {
            CallOutcome::error(status)
        }
    }
}

#[async_trait]
impl FileClient for ScriptedClient {
    async fn open(&self, url: &str, _flags: OpenFlags, _mode: AccessMode, timeout: u16)
        -> CallOutcome
    {
        self.record(format!("Open {url} t{timeout}"));
        self.reply(OpResponse::None).await
    }

    async fn close(&self, timeout: u16) -> CallOutcome {
        self.record(format!("Close t{timeout}"));
        self.reply(OpResponse::None).await
    }

    async fn stat(&self, force: bool, timeout: u16) -> CallOutcome {
        self.record(format!("Stat {force} t{timeout}"));
        self.reply(OpResponse::Stat(StatInfo { size: 42, mtime_secs: 0 })).await
    }

    async fn read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome {
        self.record(format!("Read {offset}+{length} t{timeout}"));
        self.reply(OpResponse::Chunk(ChunkInfo {
            offset,
            data: Bytes::from(vec![0u8; length as usize]),
        }))
        .await
    }

    async fn pg_read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome {
        self.record(format!("PgRead {offset}+{length} t{timeout}"));
        self.reply(OpResponse::Page(PageInfo {
            offset,
            data: Bytes::from(vec![0u8; length as usize]),
            checksums: Vec::new(),
        }))
        .await
    }

    async fn write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome {
        self.record(format!("Write {offset}+{} t{timeout}", data.len()));
        self.reply(OpResponse::None).await
    }

    async fn pg_write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome {
        self.record(format!("PgWrite {offset}+{} t{timeout}", data.len()));
        self.reply(OpResponse::None).await
    }

    async fn sync(&self, timeout: u16) -> CallOutcome {
        self.record(format!("Sync t{timeout}"));
        self.reply(OpResponse::None).await
    }

    async fn truncate(&self, size: u64, timeout: u16) -> CallOutcome {
        self.record(format!("Truncate {size} t{timeout}"));
        self.reply(OpResponse::None).await
    }

    async fn vector_read(&self, chunks: Vec<(u64, u32)>, timeout: u16) -> CallOutcome {
        self.record(format!("VectorRead {} t{timeout}", chunks.len()));
        self.reply(OpResponse::Vector(VectorReadInfo::default())).await
    }

    async fn vector_write(&self, chunks: Vec<(u64, Bytes)>, timeout: u16) -> CallOutcome {
        self.record(format!("VectorWrite {} t{timeout}", chunks.len()));
        self.reply(OpResponse::None).await
    }
}
