// src/local_client.rs
//
// FileClient implementation over the local filesystem. URLs are mapped to
// paths under a configurable root, so recorded remote workloads can be
// replayed against a directory tree. Supports the "BundledClose" property:
// close defers until every in-flight call has drained.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::debug;

use crate::file::{
    AccessMode, CallOutcome, ChunkInfo, FileClient, OpResponse, OpenFlags, PageInfo, StatInfo,
    VectorReadInfo, PAGE_SIZE,
};
use crate::status::{code, Status};

pub struct LocalFileClient {
    root: PathBuf,
    state: tokio::sync::Mutex<Option<fs::File>>,
    props: Mutex<HashMap<String, String>>,
    inflight: AtomicUsize,
    drained: Notify,
}

impl LocalFileClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileClient {
            root: root.into(),
            state: tokio::sync::Mutex::new(None),
            props: Mutex::new(HashMap::new()),
            inflight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    /// Strip `scheme://authority` and resolve the remaining path under the
    /// client root.
    fn url_to_path(&self, url: &str) -> PathBuf {
        let path = match url.find("://") {
            Some(idx) => {
                let rest = &url[idx + 3..];
                match rest.find('/') {
                    Some(slash) => &rest[slash + 1..],
                    None => "",
                }
            }
            None => url.trim_start_matches('/'),
        };
        self.root.join(path)
    }

    fn bundled_close(&self) -> bool {
        self.props
            .lock()
            .unwrap()
            .get("BundledClose")
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    fn track(&self) -> InflightGuard<'_> {
        self.inflight.fetch_add(1, Ordering::AcqRel);
        InflightGuard { client: self }
    }

    async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            if self.inflight.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
    }

    async fn read_at(file: &mut fs::File, offset: u64, length: u32) -> std::io::Result<Bytes> {
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; length as usize];
        let mut filled = 0;
        while filled < buf.len() {
            let n = file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(Bytes::from(buf))
    }

    async fn write_at(file: &mut fs::File, offset: u64, data: &[u8]) -> std::io::Result<()> {
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(data).await
    }
}

struct InflightGuard<'a> {
    client: &'a LocalFileClient,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        if self.client.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.client.drained.notify_waiters();
        }
    }
}

fn status_from_io(err: &std::io::Error) -> Status {
    let code = match err.kind() {
        std::io::ErrorKind::NotFound => code::NOT_FOUND,
        _ => code::IO_ERROR,
    };
    Status::error_msg(code, err.to_string())
}

fn outcome(res: std::io::Result<OpResponse>) -> CallOutcome {
    match res {
        Ok(response) => CallOutcome::ok(response).with_host("localhost"),
        Err(err) => CallOutcome::error(status_from_io(&err)),
    }
}

fn not_open() -> CallOutcome {
    CallOutcome::error(Status::error_msg(code::NOT_OPEN, "file is not open"))
}

/// Bound a call by its per-call timeout (0 = unbounded).
async fn bounded<F>(timeout: u16, call: F) -> CallOutcome
where
    F: std::future::Future<Output = CallOutcome>,
{
    if timeout == 0 {
        return call.await;
    }
    match tokio::time::timeout(Duration::from_secs(u64::from(timeout)), call).await {
        Ok(out) => out,
        Err(_) => CallOutcome::error(Status::error_msg(code::OPERATION_EXPIRED, "call timed out")),
    }
}

fn page_checksums(data: &[u8]) -> Vec<u32> {
    data.chunks(PAGE_SIZE).map(crc32fast::hash).collect()
}

fn mtime_secs(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl FileClient for LocalFileClient {
    async fn open(&self, url: &str, flags: OpenFlags, _mode: AccessMode, timeout: u16)
        -> CallOutcome
    {
        let _guard = self.track();
        let path = self.url_to_path(url);
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            if state.is_some() {
                return CallOutcome::error(Status::error_msg(
                    code::INVALID_ARGS,
                    "file is already open",
                ));
            }
            debug!(url, path = %path.display(), "opening local file");
            if flags.contains(OpenFlags::MAKE_PATH) {
                if let Some(parent) = path.parent() {
                    if let Err(err) = fs::create_dir_all(parent).await {
                        return CallOutcome::error(status_from_io(&err));
                    }
                }
            }
            let writable = flags.contains(OpenFlags::WRITE)
                || flags.contains(OpenFlags::UPDATE)
                || flags.contains(OpenFlags::NEW)
                || flags.contains(OpenFlags::DELETE)
                || flags.contains(OpenFlags::APPEND);
            let mut options = fs::OpenOptions::new();
            options
                .read(true)
                .write(writable)
                .create(flags.contains(OpenFlags::NEW) || flags.contains(OpenFlags::DELETE))
                .truncate(flags.contains(OpenFlags::DELETE))
                .append(flags.contains(OpenFlags::APPEND));
            match options.open(&path).await {
                Ok(file) => {
                    *state = Some(file);
                    CallOutcome::ok(OpResponse::None).with_host("localhost")
                }
                Err(err) => CallOutcome::error(status_from_io(&err)),
            }
        })
        .await
    }

    async fn close(&self, timeout: u16) -> CallOutcome {
        bounded(timeout, async {
            if self.bundled_close() {
                self.wait_drained().await;
            }
            let mut state = self.state.lock().await;
            match state.take() {
                Some(file) => {
                    drop(file);
                    CallOutcome::ok(OpResponse::None).with_host("localhost")
                }
                None => not_open(),
            }
        })
        .await
    }

    async fn stat(&self, _force: bool, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let state = self.state.lock().await;
            let Some(file) = state.as_ref() else { return not_open() };
            outcome(file.metadata().await.map(|meta| {
                OpResponse::Stat(StatInfo { size: meta.len(), mtime_secs: mtime_secs(&meta) })
            }))
        })
        .await
    }

    async fn read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            let Some(file) = state.as_mut() else { return not_open() };
            outcome(
                Self::read_at(file, offset, length)
                    .await
                    .map(|data| OpResponse::Chunk(ChunkInfo { offset, data })),
            )
        })
        .await
    }

    async fn pg_read(&self, offset: u64, length: u32, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            let Some(file) = state.as_mut() else { return not_open() };
            outcome(Self::read_at(file, offset, length).await.map(|data| {
                let checksums = page_checksums(&data);
                OpResponse::Page(PageInfo { offset, data, checksums })
            }))
        })
        .await
    }

    async fn write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            let Some(file) = state.as_mut() else { return not_open() };
            outcome(Self::write_at(file, offset, &data).await.map(|_| OpResponse::None))
        })
        .await
    }

    async fn pg_write(&self, offset: u64, data: Bytes, timeout: u16) -> CallOutcome {
        self.write(offset, data, timeout).await
    }

    async fn sync(&self, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let state = self.state.lock().await;
            let Some(file) = state.as_ref() else { return not_open() };
            outcome(file.sync_all().await.map(|_| OpResponse::None))
        })
        .await
    }

    async fn truncate(&self, size: u64, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let state = self.state.lock().await;
            let Some(file) = state.as_ref() else { return not_open() };
            outcome(file.set_len(size).await.map(|_| OpResponse::None))
        })
        .await
    }

    async fn vector_read(&self, chunks: Vec<(u64, u32)>, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            let Some(file) = state.as_mut() else { return not_open() };
            let mut info = VectorReadInfo::default();
            for (offset, length) in chunks {
                match Self::read_at(file, offset, length).await {
                    Ok(data) => info.chunks.push(ChunkInfo { offset, data }),
                    Err(err) => return CallOutcome::error(status_from_io(&err)),
                }
            }
            CallOutcome::ok(OpResponse::Vector(info)).with_host("localhost")
        })
        .await
    }

    async fn vector_write(&self, chunks: Vec<(u64, Bytes)>, timeout: u16) -> CallOutcome {
        let _guard = self.track();
        bounded(timeout, async {
            let mut state = self.state.lock().await;
            let Some(file) = state.as_mut() else { return not_open() };
            for (offset, data) in chunks {
                if let Err(err) = Self::write_at(file, offset, &data).await {
                    return CallOutcome::error(status_from_io(&err));
                }
            }
            CallOutcome::ok(OpResponse::None).with_host("localhost")
        })
        .await
    }

    fn set_property(&self, name: &str, value: &str) -> bool {
        self.props.lock().unwrap().insert(name.to_string(), value.to_string());
        true
    }
}

impl LocalFileClient {
    /// Root directory replayed URLs resolve under.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
