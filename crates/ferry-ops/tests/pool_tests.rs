mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use common::{GatedFs, make_files, wait_until};
use ferry_core::{EngineConfig, LocalFileSystem, OutcomeTag, TransferItem, TransferOutcome};
use ferry_ops::{PoolError, RequestId, SlotStatus, Submission, TransferPool, TransferRequest};
use tempfile::TempDir;

type Outcomes = Arc<Mutex<Vec<(String, TransferOutcome)>>>;

fn request(item: TransferItem, label: &str, outcomes: &Outcomes) -> TransferRequest {
    let outcomes = Arc::clone(outcomes);
    let label = label.to_string();
    TransferRequest::new(vec![item], false).on_complete(move |outcome| {
        outcomes.lock().unwrap().push((label, outcome));
    })
}

fn config(workers: usize) -> EngineConfig {
    EngineConfig::builder().workers(workers).build().unwrap()
}

#[tokio::test]
async fn test_concurrency_is_bounded_and_all_requests_served() {
    let temp = TempDir::new().unwrap();
    let names = ["a", "b", "c", "d", "e"];
    let sources = make_files(&temp.path().join("src"), &names);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let mut pool = TransferPool::new(gated.clone(), &config(2)).unwrap();
    let outcomes: Outcomes = Arc::default();

    let mut submissions = Vec::new();
    for (source, name) in sources.iter().zip(names) {
        let item = TransferItem::into_directory(source, &dst);
        submissions.push(pool.submit(request(item, name, &outcomes)).unwrap());
    }

    assert!(matches!(submissions[0], Submission::Dispatched { .. }));
    assert!(matches!(submissions[1], Submission::Dispatched { .. }));
    assert_eq!(
        submissions[4],
        Submission::Queued {
            id: submissions[4].id(),
            position: 2
        }
    );

    wait_until(|| gated.entered.load(Ordering::SeqCst) == 2);
    assert_eq!(pool.backlog_len(), 3);
    assert!(
        pool.slot_statuses()
            .iter()
            .all(|(_, status)| *status == SlotStatus::Running)
    );
    let active = pool.active_transfers();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|t| t.items_total == 1 && t.items_done == 0));

    gated.open();
    while pool.next_completion().await.is_some() {}

    assert!(pool.is_idle());
    assert_eq!(outcomes.lock().unwrap().len(), 5);
    assert!(gated.max_active.load(Ordering::SeqCst) <= 2);
    assert!(names.iter().all(|n| dst.join(n).exists()));
}

#[tokio::test]
async fn test_backlog_is_fifo() {
    let temp = TempDir::new().unwrap();
    let names = ["1", "2", "3", "4"];
    let sources = make_files(&temp.path().join("src"), &names);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let mut pool = TransferPool::new(gated.clone(), &config(1)).unwrap();
    let outcomes: Outcomes = Arc::default();

    for (source, name) in sources.iter().zip(names) {
        pool.submit(request(TransferItem::into_directory(source, &dst), name, &outcomes))
            .unwrap();
    }
    assert_eq!(pool.backlog_len(), 3);

    gated.open();
    while pool.next_completion().await.is_some() {}

    let order: Vec<String> = outcomes.lock().unwrap().iter().map(|(l, _)| l.clone()).collect();
    assert_eq!(order, names);
    assert_eq!(*gated.order.lock().unwrap(), sources);
}

#[tokio::test]
async fn test_empty_request_completes_without_slot() {
    let mut pool = TransferPool::new(Arc::new(LocalFileSystem::new()), &config(1)).unwrap();
    let outcomes: Outcomes = Arc::default();
    let sink = Arc::clone(&outcomes);

    let submission = pool
        .submit(TransferRequest::new(Vec::new(), true).on_complete(move |outcome| {
            sink.lock().unwrap().push(("empty".into(), outcome));
        }))
        .unwrap();

    assert!(matches!(submission, Submission::Immediate { .. }));
    assert!(!pool.is_idle());
    assert_eq!(pool.next_completion().await, Some(submission.id()));

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes[0].1.tag, OutcomeTag::FinishedAll);
    assert!(pool.slot_statuses().iter().all(|(_, s)| *s == SlotStatus::Idle));
}

#[tokio::test]
async fn test_cancel_queued_request() {
    let temp = TempDir::new().unwrap();
    let sources = make_files(&temp.path().join("src"), &["running", "queued"]);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let mut pool = TransferPool::new(gated.clone(), &config(1)).unwrap();
    let outcomes: Outcomes = Arc::default();

    pool.submit(request(TransferItem::into_directory(&sources[0], &dst), "running", &outcomes))
        .unwrap();
    let queued = pool
        .submit(request(TransferItem::into_directory(&sources[1], &dst), "queued", &outcomes))
        .unwrap();

    assert!(pool.cancel(queued.id()));
    assert_eq!(pool.backlog_len(), 0);
    assert!(!pool.cancel(RequestId(999)));

    gated.open();
    while pool.next_completion().await.is_some() {}

    let outcomes = outcomes.lock().unwrap();
    let (_, cancelled) = outcomes.iter().find(|(l, _)| l == "queued").unwrap();
    assert_eq!(cancelled.tag, OutcomeTag::ForcedToStop);
    assert_eq!(cancelled.remaining.len(), 1);
    assert!(!dst.join("queued").exists());
    assert!(dst.join("running").exists());
}

#[tokio::test]
async fn test_cancel_running_request() {
    let temp = TempDir::new().unwrap();
    let sources = make_files(&temp.path().join("src"), &["1", "2", "3"]);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let mut pool = TransferPool::new(gated.clone(), &config(1)).unwrap();
    let outcomes: Outcomes = Arc::default();
    let sink = Arc::clone(&outcomes);

    let items = sources
        .iter()
        .map(|s| TransferItem::into_directory(s, &dst))
        .collect();
    let submission = pool
        .submit(TransferRequest::new(items, false).on_complete(move |outcome| {
            sink.lock().unwrap().push(("batch".into(), outcome));
        }))
        .unwrap();

    // Item 1 is mid-copy when the stop arrives
    wait_until(|| gated.entered.load(Ordering::SeqCst) == 1);
    assert!(pool.cancel(submission.id()));
    gated.open();
    while pool.next_completion().await.is_some() {}

    let outcomes = outcomes.lock().unwrap();
    let outcome = &outcomes[0].1;
    assert_eq!(outcome.tag, OutcomeTag::ForcedToStop);
    assert_eq!(outcome.pasted.len(), 1);
    assert_eq!(outcome.remaining.len(), 2);
    assert!(!dst.join("2").exists());
}

#[tokio::test]
async fn test_backlog_bound() {
    let temp = TempDir::new().unwrap();
    let sources = make_files(&temp.path().join("src"), &["1", "2", "3"]);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let config = EngineConfig::builder()
        .workers(1usize)
        .max_backlog(Some(1usize))
        .build()
        .unwrap();
    let mut pool = TransferPool::new(gated.clone(), &config).unwrap();
    let outcomes: Outcomes = Arc::default();

    let mut results = Vec::new();
    for source in &sources {
        results.push(pool.submit(request(TransferItem::into_directory(source, &dst), "r", &outcomes)));
    }

    assert!(matches!(results[0], Ok(Submission::Dispatched { .. })));
    assert!(matches!(results[1], Ok(Submission::Queued { .. })));
    assert!(matches!(results[2], Err(PoolError::BacklogFull { capacity: 1 })));

    gated.open();
    while pool.next_completion().await.is_some() {}
    assert_eq!(outcomes.lock().unwrap().len(), 2);
}

#[test]
fn test_teardown_stops_everything() {
    let temp = TempDir::new().unwrap();
    let sources = make_files(&temp.path().join("src"), &["1", "2", "3"]);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let mut pool = TransferPool::new(gated.clone(), &config(1)).unwrap();
    let outcomes: Outcomes = Arc::default();

    let items: Vec<TransferItem> = sources[..2]
        .iter()
        .map(|s| TransferItem::into_directory(s, &dst))
        .collect();
    let sink = Arc::clone(&outcomes);
    pool.submit(TransferRequest::new(items, false).on_complete(move |outcome| {
        sink.lock().unwrap().push(("running".into(), outcome));
    }))
    .unwrap();
    pool.submit(request(TransferItem::into_directory(&sources[2], &dst), "queued", &outcomes))
        .unwrap();

    wait_until(|| gated.entered.load(Ordering::SeqCst) == 1);
    // Let the in-flight copy finish once teardown has asked for a stop
    let opener = {
        let gated = Arc::clone(&gated);
        std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            gated.open();
        })
    };
    pool.teardown();
    opener.join().unwrap();

    let outcomes = outcomes.lock().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, o)| o.tag == OutcomeTag::ForcedToStop));
    let (_, running) = outcomes.iter().find(|(l, _)| l == "running").unwrap();
    assert_eq!(running.pasted.len(), 1);
    assert!(!dst.join("2").exists());
    assert!(!dst.join("3").exists());

    assert!(matches!(
        pool.submit(TransferRequest::new(Vec::new(), false)),
        Err(PoolError::ShutDown)
    ));
}

#[test]
fn test_teardown_detaches_stuck_worker_after_timeout() {
    let temp = TempDir::new().unwrap();
    let sources = make_files(&temp.path().join("src"), &["stuck"]);
    let dst = temp.path().join("dst");
    fs::create_dir(&dst).unwrap();

    let gated = Arc::new(GatedFs::default());
    let config = EngineConfig::builder()
        .workers(2usize)
        .shutdown_timeout_ms(100u64)
        .build()
        .unwrap();
    let mut pool = TransferPool::new(gated.clone(), &config).unwrap();
    let outcomes: Outcomes = Arc::default();

    pool.submit(request(TransferItem::into_directory(&sources[0], &dst), "stuck", &outcomes))
        .unwrap();
    wait_until(|| gated.entered.load(Ordering::SeqCst) == 1);

    let started = std::time::Instant::now();
    pool.teardown();
    let elapsed = started.elapsed();

    assert!(elapsed >= std::time::Duration::from_millis(100));
    assert!(elapsed < std::time::Duration::from_secs(3));
    // The stuck request never reported back
    assert!(outcomes.lock().unwrap().is_empty());
    assert!(pool.is_shut_down());

    gated.open();
}
