//! End-to-end scheduling behaviour of the orchestrator against a scripted
//! media server

mod common;

use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use chat_media_fetcher::app::{
    DownloadStatus, OrchestratorConfig, RequestOutcome, TimeRemaining, CANCELLED_MESSAGE,
};

use common::{
    collect_until, orchestrator, payload, progressive_key, settle, stream_key, ScriptedFetcher,
    MIB,
};

const KIB: u64 = 1024;

fn running(snapshot: &chat_media_fetcher::app::StateSnapshot) -> usize {
    snapshot.count(DownloadStatus::Starting) + snapshot.count(DownloadStatus::Downloading)
}

#[tokio::test]
async fn test_twelve_mib_resource_takes_three_ranges() {
    let key = stream_key("holiday.mp4", 12 * MIB);
    let data = payload(12 * MIB);
    let fetcher = ScriptedFetcher::new().serve(&key, data.clone(), "video/mp4");
    let (orchestrator, fetcher, sink) = orchestrator(OrchestratorConfig::default(), fetcher);

    assert_eq!(orchestrator.request_download(&key), RequestOutcome::Started);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let ranges: Vec<(u64, Option<u64>)> = fetcher
        .requests_for(&key)
        .iter()
        .map(|request| (request.start, request.end))
        .collect();
    assert_eq!(
        ranges,
        vec![
            (0, Some(5_242_879)),
            (5_242_880, Some(10_485_759)),
            (10_485_760, Some(12_582_911)),
        ]
    );

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Completed);
    assert_eq!(state.progress, 100.0);
    assert_eq!(state.downloaded_size, 12 * MIB);
    assert_eq!(state.total_size, 12 * MIB);
    assert_eq!(state.time_remaining, TimeRemaining::Done);
    assert!(!state.in_progress);
    assert!(state.saved_path.is_some());

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "holiday.mp4");
    assert_eq!(files[0].mime_type, "video/mp4");
    assert!(files[0].bytes == data);
}

#[tokio::test]
async fn test_duplicate_request_is_single_flight() {
    let key = stream_key("clip.mp4", 12 * KIB);
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(10))
        .serve(&key, payload(12 * KIB), "video/mp4");
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    assert_eq!(orchestrator.request_download(&key), RequestOutcome::Started);
    assert_eq!(
        orchestrator.request_download(&key),
        RequestOutcome::AlreadyInProgress
    );
    settle(&orchestrator, &[key.clone()]).await;

    let starts: Vec<u64> = fetcher.requests_for(&key).iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![0, 4 * KIB, 8 * KIB]);
    assert_eq!(sink.files().len(), 1);

    // A finished key may be downloaded again
    assert_eq!(orchestrator.request_download(&key), RequestOutcome::Started);
    settle(&orchestrator, &[key.clone()]).await;
    assert_eq!(sink.files().len(), 2);
}

#[tokio::test]
async fn test_waiting_keys_start_in_request_order() {
    let keys: Vec<String> = ["a.mp4", "b.mp4", "c.mp4"]
        .iter()
        .map(|name| stream_key(name, 8 * KIB))
        .collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(5));
    for key in &keys {
        fetcher = fetcher.serve(key, payload(8 * KIB), "video/mp4");
    }
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(1);
    let (orchestrator, _fetcher, sink) = orchestrator(config, fetcher);

    assert_eq!(orchestrator.request_download(&keys[0]), RequestOutcome::Started);
    assert_eq!(orchestrator.request_download(&keys[1]), RequestOutcome::Queued);
    assert_eq!(orchestrator.request_download(&keys[2]), RequestOutcome::Queued);
    assert_eq!(orchestrator.request_download(&keys[2]), RequestOutcome::Queued);
    assert_eq!(orchestrator.queued_keys(), vec![keys[1].clone(), keys[2].clone()]);

    let waiting = orchestrator.state(&keys[1]).unwrap();
    assert_eq!(waiting.status, DownloadStatus::Queued);
    assert_eq!(waiting.time_remaining, TimeRemaining::Waiting);
    assert!(waiting.in_progress);

    settle(&orchestrator, &keys).await;

    let saved: Vec<String> = sink.files().into_iter().map(|f| f.file_name).collect();
    assert_eq!(saved, vec!["a.mp4", "b.mp4", "c.mp4"]);
    assert!(orchestrator.queued_keys().is_empty());
    assert!(orchestrator.active_keys().is_empty());
}

#[tokio::test]
async fn test_active_runs_never_exceed_limit() {
    let keys: Vec<String> = (0..5)
        .map(|i| stream_key(&format!("part{}.mp4", i), 16 * KIB))
        .collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(5));
    for key in &keys {
        fetcher = fetcher.serve(key, payload(16 * KIB), "video/mp4");
    }
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(2);
    let (orchestrator, _fetcher, _sink) = orchestrator(config, fetcher);

    let watched = keys.clone();
    let collector = tokio::spawn(collect_until(orchestrator.subscribe(), move |snapshot| {
        snapshot.all_terminal(watched.iter().map(String::as_str))
    }));

    for key in &keys {
        orchestrator.request_download(key);
    }
    assert_eq!(orchestrator.active_keys().len(), 2);
    assert_eq!(orchestrator.queued_keys().len(), 3);

    let snapshots = collector.await.unwrap();
    assert!(!snapshots.is_empty());
    for snapshot in &snapshots {
        assert!(running(snapshot) <= 2, "limit exceeded: {:?}", snapshot);
    }

    let last = snapshots.last().unwrap();
    assert_eq!(last.count(DownloadStatus::Completed), 5);
}

#[tokio::test]
async fn test_raising_limit_drains_queue() {
    let keys: Vec<String> = (0..4)
        .map(|i| stream_key(&format!("raise{}.mp4", i), 8 * KIB))
        .collect();
    let mut fetcher = ScriptedFetcher::new().with_delay(Duration::from_millis(20));
    for key in &keys {
        fetcher = fetcher.serve(key, payload(8 * KIB), "video/mp4");
    }
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(1);
    let (orchestrator, _fetcher, _sink) = orchestrator(config, fetcher);

    for key in &keys {
        orchestrator.request_download(key);
    }
    assert_eq!(orchestrator.active_keys(), vec![keys[0].clone()]);

    assert_ok!(orchestrator.set_max_concurrency(3));
    assert_eq!(orchestrator.max_concurrency(), Some(3));
    assert_eq!(orchestrator.active_keys().len(), 3);
    assert_eq!(orchestrator.queued_keys(), vec![keys[3].clone()]);

    assert_err!(orchestrator.set_max_concurrency(0));
    assert_eq!(orchestrator.max_concurrency(), Some(3));

    let snapshot = settle(&orchestrator, &keys).await;
    assert_eq!(snapshot.count(DownloadStatus::Completed), 4);
}

#[tokio::test]
async fn test_lowering_limit_requeues_newest_run() {
    let first = stream_key("first.mp4", 32 * KIB);
    let second = stream_key("second.mp4", 32 * KIB);
    let second_data = payload(32 * KIB);
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(20))
        .serve(&first, payload(32 * KIB), "video/mp4")
        .serve(&second, second_data.clone(), "video/mp4");
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(2);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    let updates = orchestrator.subscribe();
    assert_eq!(orchestrator.request_download(&first), RequestOutcome::Started);
    assert_eq!(orchestrator.request_download(&second), RequestOutcome::Started);

    // Let the second run fetch at least one chunk before evicting it
    let watched = second.clone();
    collect_until(updates, move |snapshot| {
        snapshot
            .get(&watched)
            .map_or(false, |state| state.downloaded_size > 0)
    })
    .await;

    assert_ok!(orchestrator.set_max_concurrency(1));

    let evicted = orchestrator.state(&second).unwrap();
    assert_eq!(evicted.status, DownloadStatus::Queued);
    assert!(evicted.need_restarted);
    assert!(evicted.in_progress);
    assert_eq!(evicted.progress, 0.0);
    assert_eq!(evicted.downloaded_size, 0);
    assert_eq!(orchestrator.active_keys(), vec![first.clone()]);
    assert_eq!(orchestrator.queued_keys(), vec![second.clone()]);

    let kept = orchestrator.state(&first).unwrap();
    assert!(!kept.need_restarted);
    assert!(kept.status.is_running());

    let snapshot = settle(&orchestrator, &[first.clone(), second.clone()]).await;
    assert_eq!(snapshot.get(&first).unwrap().status, DownloadStatus::Completed);
    let restarted = snapshot.get(&second).unwrap();
    assert_eq!(restarted.status, DownloadStatus::Completed);
    assert!(!restarted.need_restarted);

    // Restart began again from offset 0
    let starts_at_zero = fetcher
        .requests_for(&second)
        .iter()
        .filter(|request| request.start == 0)
        .count();
    assert_eq!(starts_at_zero, 2);

    let saved = sink
        .files()
        .into_iter()
        .find(|file| file.file_name == "second.mp4")
        .unwrap();
    assert!(saved.bytes == second_data);
    assert_eq!(sink.files().len(), 2);
}

#[tokio::test]
async fn test_gap_fails_download_without_saving() {
    let key = stream_key("gappy.mp4", 12 * KIB);
    let fetcher = ScriptedFetcher::new()
        .serve(&key, payload(12 * KIB), "video/mp4")
        .gap_at(&key, 4 * KIB);
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    orchestrator.request_download(&key);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert_eq!(state.progress, 0.0);
    assert!(!state.in_progress);
    assert!(state.error_message.as_deref().unwrap().contains("Gap"));
    assert!(sink.files().is_empty());

    // Nothing is requested past the failing chunk
    assert_eq!(fetcher.requests_for(&key).len(), 2);
}

#[tokio::test]
async fn test_failed_run_drains_queue_and_retry_restarts_from_zero() {
    let broken = stream_key("broken.mp4", 8 * KIB);
    let waiting = stream_key("waiting.mp4", 8 * KIB);
    let fetcher = ScriptedFetcher::new()
        .serve(&broken, payload(8 * KIB), "video/mp4")
        .gap_at(&broken, 4 * KIB)
        .serve(&waiting, payload(8 * KIB), "video/mp4");
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(1);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    assert_eq!(orchestrator.request_download(&broken), RequestOutcome::Started);
    assert_eq!(orchestrator.request_download(&waiting), RequestOutcome::Queued);

    let snapshot = settle(&orchestrator, &[broken.clone(), waiting.clone()]).await;
    assert_eq!(snapshot.get(&broken).unwrap().status, DownloadStatus::Error);
    assert_eq!(snapshot.get(&waiting).unwrap().status, DownloadStatus::Completed);
    assert_eq!(sink.files().len(), 1);

    // Retry is a fresh request that starts over at offset 0
    assert_eq!(orchestrator.request_download(&broken), RequestOutcome::Started);
    let retried = orchestrator.state(&broken).unwrap();
    assert_eq!(retried.status, DownloadStatus::Starting);
    assert!(retried.error_message.is_none());

    let snapshot = settle(&orchestrator, &[broken.clone()]).await;
    assert_eq!(snapshot.get(&broken).unwrap().status, DownloadStatus::Error);

    let starts: Vec<u64> = fetcher.requests_for(&broken).iter().map(|r| r.start).collect();
    assert_eq!(starts, vec![0, 4 * KIB, 0, 4 * KIB]);
    assert!(orchestrator.active_keys().is_empty());
    assert!(orchestrator.queued_keys().is_empty());
}

#[tokio::test]
async fn test_total_changing_mid_download_fails_without_saving() {
    let key = stream_key("shifting.mp4", 8 * KIB);
    let fetcher = ScriptedFetcher::new()
        .serve(&key, payload(8 * KIB), "video/mp4")
        .total_changes_at(&key, 4 * KIB, 9 * KIB);
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    orchestrator.request_download(&key);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert_eq!(state.progress, 0.0);
    assert!(!state.in_progress);
    assert_eq!(
        state.error_message.as_deref(),
        Some("Total size differs: expected 8192 bytes, server reported 9216 bytes")
    );
    assert_eq!(fetcher.requests_for(&key).len(), 2);
    assert!(sink.files().is_empty());
}

#[tokio::test]
async fn test_server_error_fails_download() {
    let key = stream_key("missing.mp4", 12 * KIB);
    let fetcher = ScriptedFetcher::new()
        .serve(&key, payload(12 * KIB), "video/mp4")
        .fail_with(&key, 500);
    let (orchestrator, _fetcher, sink) = orchestrator(OrchestratorConfig::default(), fetcher);

    orchestrator.request_download(&key);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert_eq!(state.error_message.as_deref(), Some("HTTP error! status: 500"));
    assert!(sink.files().is_empty());
}

#[tokio::test]
async fn test_malformed_key_fails_without_fetching() {
    let key = "https://web.telegram.org/k/photo/123".to_string();
    let (orchestrator, fetcher, sink) =
        orchestrator(OrchestratorConfig::default(), ScriptedFetcher::new());

    assert_eq!(orchestrator.request_download(&key), RequestOutcome::Started);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert!(state
        .error_message
        .as_deref()
        .unwrap()
        .contains("Invalid video URL format"));
    assert!(fetcher.requests().is_empty());
    assert!(sink.files().is_empty());
    assert!(orchestrator.active_keys().is_empty());
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_hundred() {
    let key = stream_key("steady.mp4", 10 * KIB + 7);
    let fetcher = ScriptedFetcher::new().serve(&key, payload(10 * KIB + 7), "video/mp4");
    let config = OrchestratorConfig::default().with_chunk_size(KIB);
    let (orchestrator, _fetcher, _sink) = orchestrator(config, fetcher);

    let watched = key.clone();
    let collector = tokio::spawn(collect_until(orchestrator.subscribe(), move |snapshot| {
        snapshot
            .get(&watched)
            .map_or(false, |state| state.status.is_terminal())
    }));
    orchestrator.request_download(&key);
    let snapshots = collector.await.unwrap();

    let progress: Vec<f64> = snapshots
        .iter()
        .filter_map(|snapshot| snapshot.get(&key))
        .map(|state| state.progress)
        .collect();
    assert!(progress.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
    assert_eq!(progress.last().copied(), Some(100.0));

    let downloading = snapshots
        .iter()
        .filter_map(|snapshot| snapshot.get(&key))
        .filter(|state| state.status == DownloadStatus::Downloading)
        .count();
    // One update once the key is parsed, then one per chunk
    assert_eq!(downloading, 12);
}

#[tokio::test]
async fn test_parsed_key_moves_to_downloading_before_first_chunk() {
    let key = stream_key("early.mp4", 8 * KIB);
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(10))
        .serve(&key, payload(8 * KIB), "video/mp4");
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, _fetcher, _sink) = orchestrator(config, fetcher);

    let watched = key.clone();
    let collector = tokio::spawn(collect_until(orchestrator.subscribe(), move |snapshot| {
        snapshot
            .get(&watched)
            .map_or(false, |state| state.status.is_terminal())
    }));
    orchestrator.request_download(&key);
    let snapshots = collector.await.unwrap();

    let states: Vec<_> = snapshots
        .iter()
        .filter_map(|snapshot| snapshot.get(&key))
        .collect();
    assert_eq!(states[0].status, DownloadStatus::Starting);

    let first_downloading = states
        .iter()
        .find(|state| state.status == DownloadStatus::Downloading)
        .unwrap();
    assert_eq!(first_downloading.downloaded_size, 0);
    assert_eq!(first_downloading.total_size, 8 * KIB);
    assert_eq!(first_downloading.file_name.as_deref(), Some("early.mp4"));
}

#[tokio::test]
async fn test_progressive_resource_learns_total_from_response() {
    let key = progressive_key(77);
    let data = payload(10 * KIB);
    let fetcher = ScriptedFetcher::new()
        .serve(&key, data.clone(), "video/webm")
        .limit_open_ranges(&key, 4 * KIB);
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, fetcher, sink) = orchestrator(config, fetcher);

    orchestrator.request_download(&key);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Completed);
    assert_eq!(state.total_size, 10 * KIB);

    let requests = fetcher.requests_for(&key);
    assert_eq!(requests[0].start, 0);
    assert_eq!(requests[0].end, None);
    assert_eq!(requests.last().unwrap().end, Some(10 * KIB - 1));

    let files = sink.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].file_name, "video_77.webm");
    assert_eq!(files[0].mime_type, "video/webm");
    assert!(files[0].bytes == data);
}

#[tokio::test]
async fn test_progressive_rejects_non_video_response() {
    let key = progressive_key(78);
    let fetcher = ScriptedFetcher::new().serve(&key, payload(KIB), "text/html");
    let (orchestrator, _fetcher, sink) = orchestrator(OrchestratorConfig::default(), fetcher);

    orchestrator.request_download(&key);
    let snapshot = settle(&orchestrator, &[key.clone()]).await;

    let state = snapshot.get(&key).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert!(state.error_message.as_deref().unwrap().contains("text/html"));
    assert!(sink.files().is_empty());
}

#[tokio::test]
async fn test_shutdown_cancels_active_and_queued() {
    let active = stream_key("long.mp4", 64 * KIB);
    let waiting = stream_key("next.mp4", 8 * KIB);
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(20))
        .serve(&active, payload(64 * KIB), "video/mp4")
        .serve(&waiting, payload(8 * KIB), "video/mp4");
    let config = OrchestratorConfig::default()
        .with_chunk_size(4 * KIB)
        .with_max_concurrency(1);
    let (orchestrator, _fetcher, sink) = orchestrator(config, fetcher);

    assert_eq!(orchestrator.request_download(&active), RequestOutcome::Started);
    assert_eq!(orchestrator.request_download(&waiting), RequestOutcome::Queued);

    orchestrator.shutdown();
    assert!(orchestrator.is_shutting_down());
    assert_eq!(
        orchestrator.request_download(&stream_key("late.mp4", KIB)),
        RequestOutcome::ShuttingDown
    );

    let snapshot = settle(&orchestrator, &[active.clone(), waiting.clone()]).await;
    for key in [&active, &waiting] {
        let state = snapshot.get(key).unwrap();
        assert_eq!(state.status, DownloadStatus::Error);
        assert_eq!(state.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert!(!state.in_progress);
    }

    // The cancelled run winds down without touching the recorded state
    tokio::time::sleep(Duration::from_millis(60)).await;
    let state = orchestrator.state(&active).unwrap();
    assert_eq!(state.status, DownloadStatus::Error);
    assert!(sink.files().is_empty());
    assert!(orchestrator.active_keys().is_empty());
    assert!(orchestrator.queued_keys().is_empty());
}

#[tokio::test]
async fn test_clear_finished_keeps_running_entries() {
    let done = stream_key("done.mp4", 4 * KIB);
    let slow = stream_key("slow.mp4", 64 * KIB);
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(10))
        .serve(&done, payload(4 * KIB), "video/mp4")
        .serve(&slow, payload(64 * KIB), "video/mp4");
    let config = OrchestratorConfig::default().with_chunk_size(4 * KIB);
    let (orchestrator, _fetcher, _sink) = orchestrator(config, fetcher);

    orchestrator.request_download(&done);
    orchestrator.store_thumbnail(&done, "data:image/jpeg;base64,AAAA");
    settle(&orchestrator, &[done.clone()]).await;
    orchestrator.request_download(&slow);

    assert_eq!(orchestrator.clear_finished(), 1);
    assert!(orchestrator.state(&done).is_none());
    assert!(orchestrator.state(&slow).is_some());

    orchestrator.shutdown();
}
