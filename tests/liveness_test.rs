//! Integration tests for the liveness monitor: one tick demotes streams
//! whose on-disk evidence went stale, exactly once, and leaves healthy
//! streams alone.

mod common;

use common::{wait_until, TestHarness};
use hivecast::config::Config;
use hivecast::monitor::LivenessMonitor;
use hivecast::transcode::MASTER_PLAYLIST;
use hivecast_common::StreamId;
use std::path::Path;
use std::sync::Arc;

fn monitor_for(h: &TestHarness) -> LivenessMonitor {
    LivenessMonitor::new(
        h.pool.clone(),
        Arc::clone(&h.coordinator),
        h.config.media.clone(),
        h.config.liveness.clone(),
        h.config.transcode.primary_tier().to_string(),
    )
}

/// Write a healthy-looking stream directory for a session.
fn write_stream_dir(root: &Path, stream_id: &str) {
    let stream_dir = root.join("live").join(stream_id);
    let tier = stream_dir.join("source");
    std::fs::create_dir_all(&tier).unwrap();
    std::fs::write(stream_dir.join(MASTER_PLAYLIST), "#EXTM3U\n").unwrap();
    std::fs::write(tier.join("index.m3u8"), "#EXTM3U\n").unwrap();
    std::fs::write(tier.join("segment_0.ts"), b"data").unwrap();
}

fn harness_with_media_root(root: &Path) -> TestHarness {
    let mut config = Config::default();
    config.media.root = root.to_path_buf();
    TestHarness::with_config(config)
}

#[tokio::test]
async fn tick_demotes_stream_without_evidence() {
    let media = tempfile::tempdir().unwrap();
    let h = harness_with_media_root(media.path());
    h.seed_account("alice", "abc123");
    h.publish("sess1", "abc123").await.unwrap();
    let announcer = h.announcer.clone();
    wait_until(
        || announcer.live.lock().unwrap().len() == 1,
        "stream started announcement",
    )
    .await;

    // No stream directory was ever written: the stream is silently dead.
    let monitor = monitor_for(&h);
    monitor.tick().await;

    let record = h.record("alice");
    assert!(!record.is_live);
    assert_eq!(record.viewer_count, 0);
    assert_eq!(record.stream_id, Some(StreamId::new("sess1")));

    let announcer = h.announcer.clone();
    wait_until(
        || announcer.ended.lock().unwrap().len() == 1,
        "stale stream ended announcement",
    )
    .await;
}

#[tokio::test]
async fn tick_leaves_fresh_stream_alone() {
    let media = tempfile::tempdir().unwrap();
    let h = harness_with_media_root(media.path());
    h.seed_account("alice", "abc123");
    h.publish("sess1", "abc123").await.unwrap();
    write_stream_dir(media.path(), "sess1");

    let monitor = monitor_for(&h);
    monitor.tick().await;

    assert!(h.record("alice").is_live);
    assert!(h.announcer.ended.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tick_is_exactly_once_per_stale_stream() {
    let media = tempfile::tempdir().unwrap();
    let h = harness_with_media_root(media.path());
    h.seed_account("alice", "abc123");
    h.publish("sess1", "abc123").await.unwrap();
    let announcer = h.announcer.clone();
    wait_until(
        || announcer.live.lock().unwrap().len() == 1,
        "stream started announcement",
    )
    .await;

    let monitor = monitor_for(&h);
    // The stream goes stale once; later ticks see it already offline.
    monitor.tick().await;
    monitor.tick().await;
    monitor.tick().await;

    let announcer = h.announcer.clone();
    wait_until(
        || announcer.ended.lock().unwrap().len() == 1,
        "ended announcement",
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.announcer.ended.lock().unwrap().len(), 1);
    assert_eq!(h.transcoder.stopped.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn tick_racing_publish_done_dispatches_once() {
    let media = tempfile::tempdir().unwrap();
    let h = harness_with_media_root(media.path());
    h.seed_account("alice", "abc123");
    h.publish("sess1", "abc123").await.unwrap();
    let announcer = h.announcer.clone();
    wait_until(
        || announcer.live.lock().unwrap().len() == 1,
        "stream started announcement",
    )
    .await;

    let monitor = monitor_for(&h);
    let id = StreamId::new("sess1");
    // A liveness tick firing while an explicit end is in flight must not
    // double the side effects.
    let (_, done) = tokio::join!(monitor.tick(), h.coordinator.publish_done(&id));
    let _ = done.unwrap();

    assert!(!h.record("alice").is_live);

    let announcer = h.announcer.clone();
    wait_until(
        || announcer.ended.lock().unwrap().len() == 1,
        "single ended announcement",
    )
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(h.announcer.ended.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn tick_handles_multiple_streams_independently() {
    let media = tempfile::tempdir().unwrap();
    let h = harness_with_media_root(media.path());
    h.seed_account("alice", "key-alice");
    h.seed_account("bob", "key-bob");
    h.publish("sess-a", "key-alice").await.unwrap();
    h.publish("sess-b", "key-bob").await.unwrap();

    // Only alice's stream has fresh evidence.
    write_stream_dir(media.path(), "sess-a");

    let monitor = monitor_for(&h);
    monitor.tick().await;

    assert!(h.record("alice").is_live);
    assert!(!h.record("bob").is_live);
}
