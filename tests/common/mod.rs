//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an in-memory record store, a
//! recording transcoder, and a recording announcer into a real
//! [`StreamCoordinator`]. The [`TestHarness::with_server`] constructor also
//! starts Axum on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use hivecast::config::Config;
use hivecast::effects::{PostRef, SideEffectDispatcher, StreamAnnouncer, Thumbnailer};
use hivecast::ingest::{PublishGrant, PublishRequest};
use hivecast::lifecycle::{LifecycleError, StreamCoordinator};
use hivecast::server::{create_router, AppContext};
use hivecast::transcode::{JobStatus, StreamTranscoder, TranscodeError};
use hivecast_common::{ChannelInfo, StreamId};
use hivecast_db::models::StreamKeyRecord;
use hivecast_db::pool::{init_memory_pool, DbPool};
use hivecast_db::queries::stream_keys;

/// Transcoder double that records every start/stop and tracks active jobs.
#[derive(Default)]
pub struct RecordingTranscoder {
    pub active: DashMap<String, ()>,
    pub started: Mutex<Vec<String>>,
    pub stopped: Mutex<Vec<String>>,
    pub fail_start: AtomicBool,
    /// Highest number of simultaneously active jobs ever observed.
    pub max_active: Mutex<usize>,
}

#[async_trait]
impl StreamTranscoder for RecordingTranscoder {
    async fn start(&self, stream_id: &StreamId, _input_url: &str) -> Result<(), TranscodeError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TranscodeError::BinaryMissing);
        }
        self.started.lock().unwrap().push(stream_id.to_string());
        self.active.insert(stream_id.to_string(), ());

        let mut max = self.max_active.lock().unwrap();
        *max = (*max).max(self.active.len());
        Ok(())
    }

    async fn stop(&self, stream_id: &StreamId) {
        self.stopped.lock().unwrap().push(stream_id.to_string());
        self.active.remove(stream_id.as_str());
    }

    fn status(&self, stream_id: &StreamId) -> JobStatus {
        if self.active.contains_key(stream_id.as_str()) {
            JobStatus::Active
        } else {
            JobStatus::Inactive
        }
    }
}

/// Announcer double recording dispatched side effects.
#[derive(Default)]
pub struct RecordingAnnouncer {
    pub live: Mutex<Vec<String>>,
    pub ended: Mutex<Vec<String>>,
    pub fail_live: AtomicBool,
}

#[async_trait]
impl StreamAnnouncer for RecordingAnnouncer {
    async fn announce_live(
        &self,
        stream_id: &StreamId,
        channel: &ChannelInfo,
        _thumbnail: Option<&Path>,
    ) -> anyhow::Result<PostRef> {
        if self.fail_live.load(Ordering::SeqCst) {
            anyhow::bail!("simulated publish failure");
        }
        self.live.lock().unwrap().push(stream_id.to_string());
        Ok(PostRef {
            author: channel.hive_account.clone(),
            permlink: format!("hivecast-{}", stream_id),
        })
    }

    async fn announce_ended(
        &self,
        _post: &PostRef,
        stream_id: &StreamId,
        _duration: Duration,
    ) -> anyhow::Result<()> {
        self.ended.lock().unwrap().push(stream_id.to_string());
        Ok(())
    }
}

struct NoThumbnailer;

#[async_trait]
impl Thumbnailer for NoThumbnailer {
    async fn capture(&self, _stream_id: &StreamId) -> anyhow::Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Test harness wrapping a fully-constructed coordinator backed by an
/// in-memory database and recording doubles at every external seam.
pub struct TestHarness {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub coordinator: Arc<StreamCoordinator>,
    pub transcoder: Arc<RecordingTranscoder>,
    pub announcer: Arc<RecordingAnnouncer>,
}

impl TestHarness {
    /// Create a new harness with default configuration and in-memory DB.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Create a new harness with a custom configuration and in-memory DB.
    pub fn with_config(config: Config) -> Self {
        let pool = init_memory_pool().expect("failed to create in-memory pool");
        let transcoder = Arc::new(RecordingTranscoder::default());
        let announcer = Arc::new(RecordingAnnouncer::default());

        let effects = Arc::new(
            SideEffectDispatcher::new(
                Arc::clone(&announcer) as Arc<dyn StreamAnnouncer>,
                Arc::new(NoThumbnailer),
            )
            .with_retry(1, Duration::ZERO),
        );

        let coordinator = Arc::new(StreamCoordinator::new(
            pool.clone(),
            Arc::clone(&transcoder) as Arc<dyn StreamTranscoder>,
            effects,
            config.ingest.clone(),
        ));

        Self {
            pool,
            config: Arc::new(config),
            coordinator,
            transcoder,
            announcer,
        }
    }

    /// Start an Axum server on a random port and return the harness
    /// together with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();

        let ctx = AppContext {
            pool: harness.pool.clone(),
            config: Arc::clone(&harness.config),
            coordinator: Arc::clone(&harness.coordinator),
            transcoder: Arc::clone(&harness.transcoder) as Arc<dyn StreamTranscoder>,
        };
        let app = create_router(ctx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (harness, addr)
    }

    /// Create a stream key record with a known credential.
    pub fn seed_account(&self, account: &str, key: &str) {
        let conn = self.pool.get().unwrap();
        stream_keys::create_stream_key(&conn, account, key).unwrap();
    }

    /// Fetch the current record for an account.
    pub fn record(&self, account: &str) -> StreamKeyRecord {
        let conn = self.pool.get().unwrap();
        stream_keys::find_by_account(&conn, account)
            .unwrap()
            .expect("account not seeded")
    }

    /// Run a publish attempt for a session announcing the given key.
    pub async fn publish(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<PublishGrant, LifecycleError> {
        self.coordinator
            .authenticate_publish(&PublishRequest {
                session_id: StreamId::new(session_id),
                stream_path: format!("/live/{}", key),
                args: Default::default(),
            })
            .await
    }
}

/// Poll until `cond` holds, failing the test after two seconds.
pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}
