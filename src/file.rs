// src/file.rs
//
// The downstream collaborator contract: a `FileClient` exposes one
// asynchronous entry point per supported call and reports every outcome as a
// `CallOutcome` (status + typed response + host list). The pipeline engine
// never interprets responses itself; it only routes them to user handlers.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::status::Status;

/// Hosts involved in serving a call, most significant last.
pub type HostList = Vec<String>;

/// Page granularity for `PgRead`/`PgWrite` checksums.
pub const PAGE_SIZE: usize = 4096;

/// Open flags bitmask carried by `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const NONE: OpenFlags = OpenFlags(0);
    pub const READ: OpenFlags = OpenFlags(1 << 0);
    pub const WRITE: OpenFlags = OpenFlags(1 << 1);
    pub const UPDATE: OpenFlags = OpenFlags(1 << 2);
    pub const NEW: OpenFlags = OpenFlags(1 << 3);
    pub const DELETE: OpenFlags = OpenFlags(1 << 4);
    pub const MAKE_PATH: OpenFlags = OpenFlags(1 << 5);
    pub const APPEND: OpenFlags = OpenFlags(1 << 6);

    pub fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

/// Access mode bitmask carried by `Open`. Interpreted by the client; the
/// engine treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessMode(pub u32);

impl AccessMode {
    pub const NONE: AccessMode = AccessMode(0);
}

/// Metadata returned by `Stat`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatInfo {
    pub size: u64,
    pub mtime_secs: u64,
}

/// One contiguous chunk returned by `Read` or inside a `VectorRead`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    pub offset: u64,
    pub data: Bytes,
}

impl ChunkInfo {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// `PgRead` payload: the bytes plus one crc32 per [`PAGE_SIZE`] page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub offset: u64,
    pub data: Bytes,
    pub checksums: Vec<u32>,
}

/// `VectorRead` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorReadInfo {
    pub chunks: Vec<ChunkInfo>,
}

impl VectorReadInfo {
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(ChunkInfo::len).sum()
    }
}

/// Typed success payload handed to response handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResponse {
    None,
    Stat(StatInfo),
    Chunk(ChunkInfo),
    Page(PageInfo),
    Vector(VectorReadInfo),
}

/// Everything a completed call reports back.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub status: Status,
    pub response: OpResponse,
    pub hosts: HostList,
}

impl CallOutcome {
    pub fn ok(response: OpResponse) -> Self {
        CallOutcome { status: Status::ok(), response, hosts: Vec::new() }
    }

    pub fn error(status: Status) -> Self {
        CallOutcome { status, response: OpResponse::None, hosts: Vec::new() }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.hosts.push(host.into());
        self
    }
}

/// Per-file asynchronous entry points of the underlying I/O client.
///
/// Timeouts are plain seconds; 0 means "no limit". A client must report
/// failures through the returned outcome's status rather than panicking.
#[async_trait]
pub trait FileClient: Send + Sync {
    async fn open(&self, url: &str, flags: OpenFlags, mode: AccessMode, timeout: u16)
        -> CallOutcome;

    async fn close(&self, timeout: u16) -> CallOutcome;

    async fn stat(&self, force: bool, timeout: u16) -> CallOutcome;

    async fn read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome;

    async fn pg_read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome;

    async fn write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome;

    async fn pg_write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome;

    async fn sync(&self, timeout: u16) -> CallOutcome;

    async fn truncate(&self, size: u64, timeout: u16) -> CallOutcome;

    async fn vector_read(&self, chunks: Vec<(u64, u32)>, timeout: u16) -> CallOutcome;

    async fn vector_write(&self, chunks: Vec<(u64, Bytes)>, timeout: u16) -> CallOutcome;

    /// Set a client property (e.g. `"BundledClose"`). Returns false when the
    /// client does not recognize the property.
    fn set_property(&self, _name: &str, _value: &str) -> bool {
        false
    }
}

/// Handle to one remote file. Cheap to clone; operations constructed from it
/// share the underlying client.
#[derive(Clone)]
pub struct File {
    client: Arc<dyn FileClient>,
}

impl File {
    pub fn new(client: Arc<dyn FileClient>) -> Self {
        File { client }
    }

    pub fn set_property(&self, name: &str, value: &str) -> bool {
        self.client.set_property(name, value)
    }

    pub(crate) fn client(&self) -> &Arc<dyn FileClient> {
        &self.client
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flags_combine() {
        let flags = OpenFlags::READ | OpenFlags::WRITE;
        assert!(flags.contains(OpenFlags::READ));
        assert!(flags.contains(OpenFlags::WRITE));
        assert!(!flags.contains(OpenFlags::NEW));
    }

    #[test]
    fn vector_read_totals() {
        let info = VectorReadInfo {
            chunks: vec![
                ChunkInfo { offset: 0, data: Bytes::from_static(b"abc") },
                ChunkInfo { offset: 10, data: Bytes::from_static(b"de") },
            ],
        };
        assert_eq!(info.total_bytes(), 5);
    }
}
