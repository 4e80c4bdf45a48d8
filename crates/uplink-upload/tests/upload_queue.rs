//! Integration tests for the upload manager.
//!
//! These drive the full pipeline (queue, worker, bridge, retry timers)
//! against in-memory fakes. Timing-sensitive tests run on a paused clock.
//!
//! # What is tested
//!
//! - FIFO order and the single transfer slot
//! - Retry with backoff, attempt exhaustion, permanent failures
//! - Pause and remove of the active item
//! - Commit failure and commit-only resume
//! - Image transform through the full pipeline, pause while transforming
//!   or committing
//! - Progress monotonicity and simulated progress
//! - Enqueue validation and queue-drained signalling

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use uplink_core::{
    StaticIdentity, UploadError, UploadEvent, UploadManagerPort, UploadPayload, UploadStatus,
};

use common::{
    FakeObjectStore, PutScript, config, harness, harness_with, noise_png, status_of,
    text_payload, transform_config, wait_for,
};

// ── Scheduling ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_fifo_single_transfer() {
    let h = harness();
    let gate_a = Arc::new(Notify::new());
    let gate_b = Arc::new(Notify::new());
    h.store.script([
        PutScript::Gate(Arc::clone(&gate_a)),
        PutScript::Gate(Arc::clone(&gate_b)),
    ]);

    let ids = assert_ok!(
        h.manager
            .enqueue(vec![
                text_payload("a.txt", 100),
                text_payload("b.txt", 200),
                text_payload("c.txt", 300),
            ])
            .await
    );
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    let snap = wait_for(&h.manager, "a transferring", |s| {
        status_of(s, &a) == UploadStatus::Transferring
    })
    .await;
    assert_eq!(snap.active_id, Some(a));
    assert_eq!(status_of(&snap, &b), UploadStatus::Pending);
    assert_eq!(status_of(&snap, &c), UploadStatus::Pending);

    gate_a.notify_one();
    let snap = wait_for(&h.manager, "b transferring", |s| {
        status_of(s, &b) == UploadStatus::Transferring
    })
    .await;
    assert_eq!(status_of(&snap, &a), UploadStatus::Completed);
    assert_eq!(status_of(&snap, &c), UploadStatus::Pending);

    gate_b.notify_one();
    wait_for(&h.manager, "all completed", |s| s.completed_count == 3).await;

    let records = h.metadata.records();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);

    // No snapshot ever showed two items holding the slot.
    for event in h.events.events() {
        if let UploadEvent::QueueSnapshot { snapshot } = event {
            let active = snapshot
                .items
                .iter()
                .filter(|item| item.status.occupies_slot())
                .count();
            assert!(active <= 1, "two active items in {snapshot:#?}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_remote_path_reaches_metadata_record() {
    let h = harness();
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("notes.md", 64).with_folder("folder-9")])
            .await
    );

    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;
    let item = snap.get(&ids[0]).unwrap();

    let puts = h.store.puts();
    let records = h.metadata.records();
    assert_eq!(puts.len(), 1);
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record.remote_path, puts[0].path);
    assert_eq!(item.remote_path.as_deref(), Some(record.remote_path.as_str()));
    assert!(record.remote_path.starts_with("user-1/"));
    assert!(record.remote_path.ends_with(".md"));
    assert_eq!(record.owner_id, "user-1");
    assert_eq!(record.size, 64);
    assert_eq!(record.content_type, "text/plain");
    assert_eq!(record.folder_id.as_deref(), Some("folder-9"));
    assert_eq!(puts[0].auth_token, "token-1");
    assert_eq!(item.progress_percent, 100);
}

// ── Retry ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retries_after_backoff() {
    let h = harness();
    h.store
        .script([PutScript::Fail(UploadError::network("connection reset"))]);
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 100)]).await);
    let id = ids[0];

    let snap = wait_for(&h.manager, "retrying", |s| {
        matches!(status_of(s, &id), UploadStatus::Retrying { .. })
    })
    .await;
    let observed_at = Instant::now();
    let item = snap.get(&id).unwrap();
    assert_eq!(
        item.status,
        UploadStatus::Retrying {
            attempt: 1,
            delay_ms: 2000
        }
    );
    assert_eq!(item.attempt_count, 1);
    assert!(item.last_error.as_deref().unwrap().contains("connection reset"));
    assert_eq!(snap.active_id, None);

    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;
    assert!(observed_at.elapsed() >= Duration::from_millis(1900));
    let item = snap.get(&id).unwrap();
    assert_eq!(item.attempt_count, 1);
    assert_eq!(item.epoch, 2);
    assert_eq!(h.store.put_count(), 2);

    assert!(h.events.events().iter().any(|event| matches!(
        event,
        UploadEvent::RetryScheduled {
            attempt: 1,
            max_attempts: 3,
            delay_ms: 2000,
            ..
        }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_end_in_failed() {
    let h = harness();
    h.store.script([
        PutScript::Fail(UploadError::network("down")),
        PutScript::Fail(UploadError::network("down")),
        PutScript::Fail(UploadError::network("down")),
    ]);
    let started = Instant::now();
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 10)]).await);

    let snap = wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;
    let item = snap.get(&ids[0]).unwrap();
    assert_eq!(item.status, UploadStatus::Failed);
    assert_eq!(item.attempt_count, 3);
    assert!(item.last_error.is_some());
    assert_eq!(h.store.put_count(), 3);
    // Backoffs of 2s and 4s were waited out.
    assert!(started.elapsed() >= Duration::from_secs(6));
    assert!(h.metadata.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_permanent_rejection_is_not_retried() {
    let h = harness();
    h.store.script([PutScript::Fail(UploadError::server_rejected(
        "Duplicate",
        409,
    ))]);
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 10)]).await);

    let snap = wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;
    let item = snap.get(&ids[0]).unwrap();
    assert_eq!(item.attempt_count, 1);
    assert!(item.last_error.as_deref().unwrap().contains("already exists"));
    assert_eq!(h.store.put_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_signed_out_fails_without_transfer() {
    let h = harness_with(FakeObjectStore::new(), StaticIdentity::signed_out(), config());
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 10)]).await);

    let snap = wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;
    let item = snap.get(&ids[0]).unwrap();
    assert_eq!(item.attempt_count, 1);
    assert!(item.last_error.as_deref().unwrap().contains("logged in"));
    assert_eq!(h.store.put_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resume_failed_item_gets_fresh_budget() {
    let h = harness();
    h.store
        .script([PutScript::Fail(UploadError::permanent_rejection("nope"))]);
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 10)]).await);
    wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;

    assert_ok!(h.manager.resume(&ids[0]).await);
    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;
    let item = snap.get(&ids[0]).unwrap();
    assert_eq!(item.attempt_count, 0);
    assert!(item.last_error.is_none());
}

// ── Pause / remove ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_pause_active_starts_next() {
    let h = harness();
    let gate = Arc::new(Notify::new());
    h.store.script([PutScript::Gate(Arc::clone(&gate))]);
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 100), text_payload("b.txt", 100)])
            .await
    );
    let (a, b) = (ids[0], ids[1]);

    wait_for(&h.manager, "a transferring", |s| {
        status_of(s, &a) == UploadStatus::Transferring
    })
    .await;
    assert_ok!(h.manager.pause(&a).await);

    let snap = wait_for(&h.manager, "b completed", |s| {
        status_of(s, &b) == UploadStatus::Completed
    })
    .await;
    let paused = snap.get(&a).unwrap();
    assert_eq!(paused.status, UploadStatus::Paused);
    assert_eq!(paused.attempt_count, 0);
    assert!(paused.last_error.is_none());

    // Pausing twice is rejected.
    assert!(matches!(
        h.manager.pause(&a).await,
        Err(UploadError::InvalidTransition { .. })
    ));

    assert_ok!(h.manager.resume(&a).await);
    let snap = wait_for(&h.manager, "a completed", |s| {
        status_of(s, &a) == UploadStatus::Completed
    })
    .await;
    assert_eq!(snap.get(&a).unwrap().epoch, 2);
    assert_eq!(h.metadata.records().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_pending_keeps_it_out_of_the_slot() {
    let h = harness();
    let gate = Arc::new(Notify::new());
    h.store.script([PutScript::Gate(Arc::clone(&gate))]);
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 10), text_payload("b.txt", 10)])
            .await
    );
    let (a, b) = (ids[0], ids[1]);

    wait_for(&h.manager, "a transferring", |s| {
        status_of(s, &a) == UploadStatus::Transferring
    })
    .await;
    assert_ok!(h.manager.pause(&b).await);
    gate.notify_one();

    let snap = wait_for(&h.manager, "a completed", |s| {
        status_of(s, &a) == UploadStatus::Completed
    })
    .await;
    assert_eq!(status_of(&snap, &b), UploadStatus::Paused);
    assert_eq!(h.store.put_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_remove_active_starts_next() {
    let h = harness();
    let gate = Arc::new(Notify::new());
    h.store.script([PutScript::Gate(Arc::clone(&gate))]);
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 100), text_payload("b.txt", 100)])
            .await
    );
    let (a, b) = (ids[0], ids[1]);

    wait_for(&h.manager, "a transferring", |s| {
        status_of(s, &a) == UploadStatus::Transferring
    })
    .await;
    assert_ok!(h.manager.remove(&a).await);

    let snap = wait_for(&h.manager, "b completed", |s| {
        status_of(s, &b) == UploadStatus::Completed
    })
    .await;
    assert!(snap.get(&a).is_none());
    assert!(h.manager.get(&a).await.is_none());
    assert!(
        h.events
            .events()
            .iter()
            .any(|event| matches!(event, UploadEvent::ItemRemoved { id } if *id == a))
    );
    assert!(matches!(
        h.manager.remove(&a).await,
        Err(UploadError::NotInQueue { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_clear_completed_keeps_failed() {
    let h = harness();
    h.store
        .script([PutScript::Fail(UploadError::permanent_rejection("nope"))]);
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("bad.txt", 10), text_payload("good.txt", 10)])
            .await
    );
    wait_for(&h.manager, "settled", |s| {
        s.failed_count == 1 && s.completed_count == 1
    })
    .await;

    assert_eq!(assert_ok!(h.manager.clear_completed().await), 1);
    let snap = h.manager.snapshot().await;
    assert_eq!(snap.len(), 1);
    assert_eq!(snap.items[0].id, ids[0]);
    assert_eq!(assert_ok!(h.manager.clear_completed().await), 0);
}

// ── Commit ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_commit_failure_then_resume_commits_only() {
    let h = harness();
    h.metadata.fail_next(UploadError::metadata_commit("db down"));
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 50)]).await);
    let id = ids[0];

    let snap = wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;
    let item = snap.get(&id).unwrap();
    assert_eq!(item.attempt_count, 1);
    assert!(item.last_error.as_deref().unwrap().contains("could not be saved"));
    assert_eq!(h.store.put_count(), 1);
    let landed_path = item.remote_path.clone().unwrap();

    assert_ok!(h.manager.resume(&id).await);
    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;

    // The object was not sent again.
    assert_eq!(h.store.put_count(), 1);
    let records = h.metadata.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].remote_path, landed_path);
    assert_eq!(snap.get(&id).unwrap().remote_path.as_deref(), Some(landed_path.as_str()));
}

#[tokio::test(start_paused = true)]
async fn test_pause_while_committing_resumes_commit_only() {
    let h = harness();
    let gate = Arc::new(Notify::new());
    h.metadata.gate_next(Arc::clone(&gate));
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 50), text_payload("b.txt", 50)])
            .await
    );
    let (a, b) = (ids[0], ids[1]);

    let snap = wait_for(&h.manager, "a committing", |s| {
        status_of(s, &a) == UploadStatus::Committing
    })
    .await;
    let landed_path = snap.get(&a).unwrap().remote_path.clone().unwrap();
    assert_ok!(h.manager.pause(&a).await);

    let snap = wait_for(&h.manager, "b completed", |s| {
        status_of(s, &b) == UploadStatus::Completed
    })
    .await;
    let paused = snap.get(&a).unwrap();
    assert_eq!(paused.status, UploadStatus::Paused);
    assert_eq!(paused.attempt_count, 0);
    assert!(paused.last_error.is_none());
    assert_eq!(h.store.put_count(), 2);
    let records = h.metadata.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "b.txt");

    assert_ok!(h.manager.resume(&a).await);
    wait_for(&h.manager, "a completed", |s| {
        status_of(s, &a) == UploadStatus::Completed
    })
    .await;

    // The object already landed, so only the commit ran again.
    assert_eq!(h.store.put_count(), 2);
    let records = h.metadata.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].name, "a.txt");
    assert_eq!(records[1].remote_path, landed_path);

    let second_epoch: Vec<_> = h
        .events
        .item_updates(&a)
        .into_iter()
        .filter(|item| item.epoch == 2)
        .collect();
    assert!(
        second_epoch
            .iter()
            .any(|item| item.status == UploadStatus::Committing)
    );
    assert!(
        second_epoch
            .iter()
            .all(|item| item.status != UploadStatus::Transferring)
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_commit_metadata_error_is_not_retried() {
    let h = harness();
    h.metadata.fail_next(UploadError::network("db unreachable"));
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 50)]).await);

    let snap = wait_for(&h.manager, "failed", |s| s.failed_count == 1).await;
    assert_eq!(snap.get(&ids[0]).unwrap().attempt_count, 1);
    assert_eq!(h.store.put_count(), 1);
}

// ── Transform ──────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_image_is_transformed_before_transfer() {
    let h = harness_with(
        FakeObjectStore::new(),
        StaticIdentity::new("user-1", "token-1"),
        transform_config(),
    );
    let photo = noise_png("photo.png", 2600, 700);
    let original_len = photo.len();
    let ids = assert_ok!(h.manager.enqueue(vec![photo]).await);
    let id = ids[0];

    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;
    let item = snap.get(&id).unwrap();

    let puts = h.store.puts();
    assert_eq!(puts.len(), 1);
    let sent = puts[0].body.len() as u64;
    assert!(sent < original_len);
    assert!(sent <= 1024 * 1024);
    assert_eq!(puts[0].content_type, "image/jpeg");

    assert_eq!(item.original_byte_length, original_len);
    assert_eq!(item.transformed_byte_length, Some(sent));
    assert_eq!(item.bytes_transferred, sent);

    // The record describes the bytes that were actually stored.
    let records = h.metadata.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].size, sent);
    assert_eq!(records[0].content_type, "image/jpeg");
    assert_eq!(records[0].remote_path, puts[0].path);

    assert!(
        h.events
            .item_updates(&id)
            .iter()
            .any(|update| update.status == UploadStatus::Transforming)
    );
    let applied = h.events.events().into_iter().find_map(|event| match event {
        UploadEvent::TransformApplied {
            id: applied_id,
            original_bytes,
            transformed_bytes,
            ..
        } if applied_id == id => Some((original_bytes, transformed_bytes)),
        _ => None,
    });
    assert_eq!(applied, Some((original_len, sent)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pause_while_transforming_frees_slot() {
    let h = harness_with(
        FakeObjectStore::new(),
        StaticIdentity::new("user-1", "token-1"),
        transform_config(),
    );
    let ids = assert_ok!(
        h.manager
            .enqueue(vec![noise_png("huge.png", 3000, 2400), text_payload("b.txt", 10)])
            .await
    );
    let (a, b) = (ids[0], ids[1]);

    wait_for(&h.manager, "a transforming", |s| {
        status_of(s, &a) == UploadStatus::Transforming
    })
    .await;
    assert_ok!(h.manager.pause(&a).await);

    let snap = wait_for(&h.manager, "b completed", |s| {
        status_of(s, &b) == UploadStatus::Completed
    })
    .await;
    let paused = snap.get(&a).unwrap();
    assert_eq!(paused.status, UploadStatus::Paused);
    assert_eq!(paused.attempt_count, 0);
    assert!(paused.last_error.is_none());
    let names: Vec<String> = h.metadata.records().into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["b.txt".to_string()]);

    assert_ok!(h.manager.resume(&a).await);
    wait_for(&h.manager, "a completed", |s| {
        status_of(s, &a) == UploadStatus::Completed
    })
    .await;
    let records = h.metadata.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].name, "huge.png");
    assert_eq!(records[1].content_type, "image/jpeg");
}

// ── Progress ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_progress_never_regresses_within_epoch() {
    let h = harness();
    let gate = Arc::new(Notify::new());
    h.store.script([
        PutScript::Fail(UploadError::network("reset")),
        PutScript::Gate(Arc::clone(&gate)),
    ]);
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("a.txt", 1000)]).await);
    let id = ids[0];

    wait_for(&h.manager, "second attempt halfway", |s| {
        s.get(&id)
            .is_some_and(|item| item.epoch == 2 && item.progress_percent >= 50)
    })
    .await;
    gate.notify_one();
    wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;

    let updates = h.events.item_updates(&id);
    assert!(updates.iter().any(|item| item.epoch == 1));
    for pair in updates.windows(2) {
        if pair[0].epoch == pair[1].epoch {
            assert!(
                pair[1].progress_percent >= pair[0].progress_percent,
                "percent regressed within epoch {}: {} -> {}",
                pair[0].epoch,
                pair[0].progress_percent,
                pair[1].progress_percent
            );
        } else {
            assert!(pair[1].epoch > pair[0].epoch);
        }
    }
    assert_eq!(updates.last().unwrap().progress_percent, 100);
}

#[tokio::test(start_paused = true)]
async fn test_simulated_progress_for_opaque_transfer() {
    let gate = Arc::new(Notify::new());
    let store = FakeObjectStore::with_native_progress(false);
    store.script([PutScript::Gate(Arc::clone(&gate))]);
    let h = harness_with(
        store,
        StaticIdentity::new("user-1", "token-1"),
        config().with_chunk_threshold(16),
    );
    let ids = assert_ok!(h.manager.enqueue(vec![text_payload("big.bin", 4096)]).await);
    let id = ids[0];

    let snap = wait_for(&h.manager, "simulated progress", |s| {
        s.get(&id)
            .is_some_and(|item| item.progress_simulated && item.progress_percent > 0)
    })
    .await;
    assert!(snap.get(&id).unwrap().progress_percent <= 95);

    // Long after the curve flattens it still has not claimed completion.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let item = h.manager.get(&id).await.unwrap();
    assert_eq!(item.status, UploadStatus::Transferring);
    assert!((90..=95).contains(&item.progress_percent));

    gate.notify_one();
    let snap = wait_for(&h.manager, "completed", |s| s.completed_count == 1).await;
    assert_eq!(snap.get(&id).unwrap().progress_percent, 100);
}

// ── Enqueue / drain ────────────────────────────────────────────────

#[tokio::test]
async fn test_enqueue_rejects_empty_payload() {
    let h = harness();
    let err = assert_err!(
        h.manager
            .enqueue(vec![
                text_payload("ok.txt", 1),
                UploadPayload::new("empty.txt", "text/plain", Vec::<u8>::new()),
            ])
            .await
    );
    assert!(matches!(err, UploadError::EmptyPayload { .. }));
    assert!(h.manager.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_enqueue_rejects_when_full() {
    let h = harness_with(
        FakeObjectStore::new(),
        StaticIdentity::new("user-1", "token-1"),
        config().with_max_queue_size(1),
    );
    let err = assert_err!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 1), text_payload("b.txt", 1)])
            .await
    );
    assert_eq!(err, UploadError::queue_full(1));
}

#[tokio::test(start_paused = true)]
async fn test_drained_event_after_last_item() {
    let h = harness();
    assert_ok!(
        h.manager
            .enqueue(vec![text_payload("a.txt", 10), text_payload("b.txt", 10)])
            .await
    );
    wait_for(&h.manager, "completed", |s| s.completed_count == 2).await;

    // The drained signal follows the final snapshot.
    for _ in 0..100 {
        if matches!(h.events.events().last(), Some(UploadEvent::QueueDrained)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let events = h.events.events();
    let drained = events
        .iter()
        .filter(|event| matches!(event, UploadEvent::QueueDrained))
        .count();
    assert_eq!(drained, 1);
    assert!(matches!(events.last(), Some(UploadEvent::QueueDrained)));
}
