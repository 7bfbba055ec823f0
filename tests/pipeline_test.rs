// tests/pipeline_test.rs
//
// End-to-end coverage of the operation algebra and pipeline handler:
// chaining, stop/repeat control flow, recovery splicing, promise/final
// agreement, and deadline behavior, all against a scripted client.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use common::ScriptedClient;
use filepipe::{
    close, code, open, read, run_async, run_async_with, stat, sync, wait_for, write, AccessMode,
    File, Flow, HostList, OpResponse, OpenFlags, Pipeline, Status,
};

fn file_over(client: &Arc<ScriptedClient>) -> File {
    File::new(client.clone())
}

#[tokio::test]
async fn chain_executes_in_submission_order() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let pipeline = open(&file, "proto://h/data.bin", OpenFlags::READ, AccessMode::NONE)
        .then(write(&file, 0, Bytes::from_static(b"abcd")))
        .then(close(&file));
    let status = wait_for(pipeline, 0).await;

    assert!(status.is_ok());
    assert_eq!(
        client.calls(),
        vec!["Open proto://h/data.bin t0", "Write 0+4 t0", "Close t0"]
    );
}

#[tokio::test]
async fn composition_is_associative() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    // (a.then(b)).then(c.then(d)) must flatten into a-b-c-d.
    let left = stat(&file, false).then(sync(&file));
    let right = write(&file, 8, Bytes::from_static(b"x")).then(close(&file));
    let status = wait_for(left.then(right), 0).await;

    assert!(status.is_ok());
    assert_eq!(
        client.calls(),
        vec!["Stat false t0", "Sync t0", "Write 8+1 t0", "Close t0"]
    );
}

#[tokio::test]
async fn stop_suppresses_remaining_operations() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let head = read(&file, 0, 128).handler(
        |_s: &Status, _r: &OpResponse, _h: &HostList| Flow::Stop(Status::ok()),
    );
    let pipeline = head.then(write(&file, 0, Bytes::from_static(b"zz"))).then(close(&file));
    let status = wait_for(pipeline, 0).await;

    assert!(status.is_ok());
    assert_eq!(client.calls(), vec!["Read 0+128 t0"]);
}

#[tokio::test]
async fn stop_status_becomes_the_final_status() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let head = read(&file, 0, 16).handler(|_s: &Status, _r: &OpResponse, _h: &HostList| {
        Flow::Stop(Status::error_msg(code::IO_ERROR, "gave up"))
    });
    let status = wait_for(head.then(close(&file)), 0).await;

    assert!(!status.is_ok());
    assert_eq!(status.code, code::IO_ERROR);
    assert_eq!(client.calls(), vec!["Read 0+16 t0"]);
}

#[tokio::test]
async fn repeat_resubmits_with_identical_arguments() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let invocations = Arc::new(AtomicUsize::new(0));
    let seen = invocations.clone();
    let head = read(&file, 7, 64).handler(move |_s: &Status, _r: &OpResponse, _h: &HostList| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Flow::Repeat
        } else {
            Flow::Continue
        }
    });
    let status = wait_for(head, 0).await;

    assert!(status.is_ok());
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    assert_eq!(client.calls(), vec!["Read 7+64 t0", "Read 7+64 t0"]);
}

#[tokio::test]
async fn repeat_preserves_the_chain_tail() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let first = Arc::new(AtomicUsize::new(0));
    let seen = first.clone();
    let head = read(&file, 0, 8).handler(move |_s: &Status, _r: &OpResponse, _h: &HostList| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 { Flow::Repeat } else { Flow::Continue }
    });
    let status = wait_for(head.then(close(&file)), 0).await;

    assert!(status.is_ok());
    assert_eq!(client.calls(), vec!["Read 0+8 t0", "Read 0+8 t0", "Close t0"]);
}

#[tokio::test]
async fn recovery_replaces_the_failed_operation() {
    // First call fails, everything afterwards succeeds.
    let client = Arc::new(ScriptedClient::with_statuses(vec![Status::error(code::NOT_FOUND)]));
    let file = file_over(&client);

    let recovery_file = file.clone();
    let pipeline = open(&file, "proto://h/bad", OpenFlags::READ, AccessMode::NONE)
        .with_recovery(move |_s: &Status| {
            Ok(open(&recovery_file, "proto://h/good", OpenFlags::READ, AccessMode::NONE))
        })
        .then(read(&file, 0, 32))
        .then(close(&file));
    let status = wait_for(pipeline, 0).await;

    assert!(status.is_ok());
    assert_eq!(
        client.calls(),
        vec!["Open proto://h/bad t0", "Open proto://h/good t0", "Read 0+32 t0", "Close t0"]
    );
}

#[tokio::test]
async fn recovery_chain_splices_before_the_original_tail() {
    // Recovery chain A-B plus original tail C-D runs as A-B-C-D.
    let client = Arc::new(ScriptedClient::with_statuses(vec![Status::error(code::IO_ERROR)]));
    let file = file_over(&client);

    let recovery_file = file.clone();
    let pipeline = open(&file, "proto://h/bad", OpenFlags::READ, AccessMode::NONE)
        .with_recovery(move |_s: &Status| {
            Ok(open(&recovery_file, "proto://h/good", OpenFlags::READ, AccessMode::NONE)
                .then(stat(&recovery_file, true)))
        })
        .then(read(&file, 0, 4))
        .then(close(&file));
    let status = wait_for(pipeline, 0).await;

    assert!(status.is_ok());
    assert_eq!(
        client.calls(),
        vec![
            "Open proto://h/bad t0",
            "Open proto://h/good t0",
            "Stat true t0",
            "Read 0+4 t0",
            "Close t0"
        ]
    );
}

#[tokio::test]
async fn declined_recovery_terminates_with_the_original_status() {
    let client = Arc::new(ScriptedClient::with_statuses(vec![Status::error(code::NOT_FOUND)]));
    let file = file_over(&client);

    let pipeline = open(&file, "proto://h/bad", OpenFlags::READ, AccessMode::NONE)
        .with_recovery(|_s: &Status| -> anyhow::Result<filepipe::Operation> {
            anyhow::bail!("nothing to be done")
        })
        .then(read(&file, 0, 4));
    let status = wait_for(pipeline, 0).await;

    assert_eq!(status.code, code::NOT_FOUND);
    assert_eq!(client.calls(), vec!["Open proto://h/bad t0"]);
}

#[tokio::test]
async fn failure_without_recovery_skips_the_tail() {
    let client = Arc::new(ScriptedClient::with_statuses(vec![Status::error(code::IO_ERROR)]));
    let file = file_over(&client);

    let status = wait_for(read(&file, 0, 16).then(close(&file)), 0).await;

    assert_eq!(status.code, code::IO_ERROR);
    assert_eq!(client.calls(), vec!["Read 0+16 t0"]);
}

#[tokio::test]
async fn final_callback_fires_once_with_the_promised_status() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let fired = Arc::new(AtomicUsize::new(0));
    let final_status: Arc<Mutex<Option<Status>>> = Arc::new(Mutex::new(None));
    let fired_in_cb = fired.clone();
    let status_in_cb = final_status.clone();

    let pipeline = read(&file, 0, 8).then(close(&file));
    let status = run_async_with(pipeline, 0, move |s: &Status| {
        fired_in_cb.fetch_add(1, Ordering::SeqCst);
        *status_in_cb.lock().unwrap() = Some(s.clone());
    })
    .await;

    assert!(status.is_ok());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(final_status.lock().unwrap().as_ref(), Some(&status));
}

#[tokio::test]
async fn empty_pipeline_resolves_ok_immediately() {
    let status = run_async(Pipeline::empty(), 0).await;
    assert!(status.is_ok());
}

#[tokio::test]
async fn passed_deadline_expires_the_next_submission() {
    // Each call takes ~1.2s while the whole pipeline is allowed 1s: the
    // second operation must die at submission without reaching the client.
    let client =
        Arc::new(ScriptedClient::new().with_delay(Duration::from_millis(1200)));
    let file = file_over(&client);

    let status = wait_for(read(&file, 0, 4).then(write(&file, 0, Bytes::from_static(b"x"))), 1).await;

    assert_eq!(status.code, code::OPERATION_EXPIRED);
    assert_eq!(client.calls().len(), 1);
}

#[tokio::test]
async fn per_operation_timeout_reaches_the_client() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let status = wait_for(read(&file, 0, 4).with_timeout(7), 0).await;
    assert!(status.is_ok());
    assert_eq!(client.calls(), vec!["Read 0+4 t7"]);
}

#[tokio::test]
async fn pipeline_deadline_bounds_unlimited_operations() {
    let client = Arc::new(ScriptedClient::new());
    let file = file_over(&client);

    let status = wait_for(read(&file, 0, 4), 5).await;
    assert!(status.is_ok());

    let calls = client.calls();
    assert_eq!(calls.len(), 1);
    // The remaining pipeline budget (about 5s) is forwarded per call.
    assert!(calls[0] == "Read 0+4 t5" || calls[0] == "Read 0+4 t4", "got {}", calls[0]);
}
