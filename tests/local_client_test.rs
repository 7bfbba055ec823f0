// tests/local_client_test.rs
//
// LocalFileClient against a real temporary directory: URL mapping, the full
// call surface, and pipeline submission end to end.

use std::sync::Arc;

use bytes::Bytes;
use filepipe::{
    close, code, open, sync, wait_for, write, AccessMode, File, FileClient, LocalFileClient,
    OpResponse, OpenFlags, PAGE_SIZE,
};

fn rw_flags() -> OpenFlags {
    OpenFlags::NEW | OpenFlags::WRITE | OpenFlags::MAKE_PATH
}

#[tokio::test]
async fn full_call_surface_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let client = LocalFileClient::new(dir.path());

    let out = client.open("test://host/data/file.bin", rw_flags(), AccessMode::NONE, 0).await;
    assert!(out.status.is_ok(), "open failed: {}", out.status);
    assert_eq!(out.hosts, vec!["localhost".to_string()]);

    let out = client.write(0, Bytes::from_static(b"hello world"), 0).await;
    assert!(out.status.is_ok());

    let out = client.sync(0).await;
    assert!(out.status.is_ok());

    let out = client.stat(true, 0).await;
    match out.response {
        OpResponse::Stat(info) => assert_eq!(info.size, 11),
        other => panic!("expected stat info, got {other:?}"),
    }

    let out = client.read(6, 5, 0).await;
    match out.response {
        OpResponse::Chunk(chunk) => {
            assert_eq!(chunk.offset, 6);
            assert_eq!(&chunk.data[..], b"world");
        }
        other => panic!("expected chunk, got {other:?}"),
    }

    // Reads past the end come back truncated rather than failing.
    let out = client.read(6, 64, 0).await;
    match out.response {
        OpResponse::Chunk(chunk) => assert_eq!(&chunk.data[..], b"world"),
        other => panic!("expected chunk, got {other:?}"),
    }

    // Zero-length read: OK with zero bytes.
    let out = client.read(0, 0, 0).await;
    match out.response {
        OpResponse::Chunk(chunk) => assert!(chunk.is_empty()),
        other => panic!("expected chunk, got {other:?}"),
    }

    let out = client.pg_read(0, 11, 0).await;
    match out.response {
        OpResponse::Page(page) => {
            assert_eq!(&page.data[..], b"hello world");
            assert_eq!(page.checksums, vec![crc32fast::hash(b"hello world")]);
        }
        other => panic!("expected page, got {other:?}"),
    }

    let out = client
        .vector_write(vec![(0, Bytes::from_static(b"HELLO")), (6, Bytes::from_static(b"WORLD"))], 0)
        .await;
    assert!(out.status.is_ok());

    let out = client.vector_read(vec![(0, 5), (6, 5)], 0).await;
    match out.response {
        OpResponse::Vector(info) => {
            assert_eq!(info.chunks.len(), 2);
            assert_eq!(&info.chunks[0].data[..], b"HELLO");
            assert_eq!(&info.chunks[1].data[..], b"WORLD");
            assert_eq!(info.total_bytes(), 10);
        }
        other => panic!("expected vector info, got {other:?}"),
    }

    let out = client.truncate(5, 0).await;
    assert!(out.status.is_ok());
    let out = client.stat(true, 0).await;
    match out.response {
        OpResponse::Stat(info) => assert_eq!(info.size, 5),
        other => panic!("expected stat info, got {other:?}"),
    }

    let out = client.close(0).await;
    assert!(out.status.is_ok());

    // Calls after close fail with a not-open status.
    let out = client.read(0, 1, 0).await;
    assert_eq!(out.status.code, code::NOT_OPEN);
    let out = client.close(0).await;
    assert_eq!(out.status.code, code::NOT_OPEN);
}

#[tokio::test]
async fn opening_a_missing_file_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let client = LocalFileClient::new(dir.path());

    let out = client
        .open("test://host/absent.bin", OpenFlags::READ, AccessMode::NONE, 0)
        .await;
    assert_eq!(out.status.code, code::NOT_FOUND);
}

#[tokio::test]
async fn double_open_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let client = LocalFileClient::new(dir.path());

    let out = client.open("test://h/a.bin", rw_flags(), AccessMode::NONE, 0).await;
    assert!(out.status.is_ok());
    let out = client.open("test://h/a.bin", rw_flags(), AccessMode::NONE, 0).await;
    assert_eq!(out.status.code, code::INVALID_ARGS);
}

#[tokio::test]
async fn page_checksums_split_on_page_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let client = LocalFileClient::new(dir.path());

    client.open("test://h/pages.bin", rw_flags(), AccessMode::NONE, 0).await;
    let payload = vec![0x5au8; PAGE_SIZE + 100];
    let out = client.write(0, Bytes::from(payload.clone()), 0).await;
    assert!(out.status.is_ok());

    let out = client.pg_read(0, (PAGE_SIZE + 100) as u32, 0).await;
    match out.response {
        OpResponse::Page(page) => {
            assert_eq!(page.checksums.len(), 2);
            assert_eq!(page.checksums[0], crc32fast::hash(&payload[..PAGE_SIZE]));
            assert_eq!(page.checksums[1], crc32fast::hash(&payload[PAGE_SIZE..]));
        }
        other => panic!("expected page, got {other:?}"),
    }
}

#[tokio::test]
async fn pipeline_runs_against_the_local_client() {
    let dir = tempfile::tempdir().unwrap();
    let client: Arc<dyn FileClient> = Arc::new(LocalFileClient::new(dir.path()));
    let file = File::new(client);
    assert!(file.set_property("BundledClose", "true"));

    let pipeline = open(&file, "test://host/run/out.bin", rw_flags(), AccessMode::NONE)
        .then(write(&file, 0, Bytes::from_static(b"payload")))
        .then(sync(&file))
        .then(close(&file));
    let status = wait_for(pipeline, 30).await;
    assert!(status.is_ok(), "pipeline failed: {status}");

    let written = std::fs::read(dir.path().join("run/out.bin")).unwrap();
    assert_eq!(written, b"payload");
}
