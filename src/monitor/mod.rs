//! Filesystem-evidence liveness reconciliation.
//!
//! The ingest server's own "done publishing" event is not always delivered
//! (abrupt network loss, crash). The freshness of the HLS output on disk is
//! the ground truth of actual encoding activity, so the monitor
//! periodically walks every record marked live and demotes the ones whose
//! files have gone quiet.

use dashmap::DashMap;
use hivecast_common::StreamId;
use hivecast_db::pool::DbPool;
use hivecast_db::queries::stream_keys;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{LivenessConfig, MediaConfig};
use crate::lifecycle::StreamCoordinator;
use crate::transcode::MASTER_PLAYLIST;

/// Freshness classification of one stream's on-disk evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    /// Evidence of active encoding.
    Active,
    /// No evidence; the string names the failed check.
    Stale(String),
}

/// Age thresholds for the staleness checks.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub index_stale: Duration,
    pub segment_stale: Duration,
}

impl From<&LivenessConfig> for Thresholds {
    fn from(config: &LivenessConfig) -> Self {
        Self {
            index_stale: Duration::from_secs(config.index_stale_secs),
            segment_stale: Duration::from_secs(config.segment_stale_secs),
        }
    }
}

/// Classify the on-disk evidence for one stream directory.
///
/// Checks run cheapest-first: directory, master playlist, primary tier
/// index, index freshness, segment presence, segment freshness. A
/// filesystem error counts as stale — an orphaned live record is worse
/// than a spuriously ended stream.
pub fn classify_stream_dir(
    stream_dir: &Path,
    primary_tier: &str,
    now: SystemTime,
    thresholds: &Thresholds,
) -> Liveness {
    if !stream_dir.exists() {
        return Liveness::Stale("directory_not_found".into());
    }
    if !stream_dir.join(MASTER_PLAYLIST).exists() {
        return Liveness::Stale("manifest_not_found".into());
    }

    let tier_dir = stream_dir.join(primary_tier);
    let index_path = tier_dir.join("index.m3u8");
    if !index_path.exists() {
        return Liveness::Stale("index_not_found".into());
    }

    match file_age(&index_path, now) {
        Ok(age) if age > thresholds.index_stale => {
            return Liveness::Stale(format!("index_stale_{:.1}s", age.as_secs_f64()));
        }
        Ok(_) => {}
        Err(e) => return Liveness::Stale(format!("fs_error_{}", e.kind())),
    }

    let newest_segment = match newest_segment_age(&tier_dir, now) {
        Ok(age) => age,
        Err(e) => return Liveness::Stale(format!("fs_error_{}", e.kind())),
    };
    match newest_segment {
        None => Liveness::Stale("no_segment_files".into()),
        Some(age) if age > thresholds.segment_stale => {
            Liveness::Stale(format!("segment_stale_{:.1}s", age.as_secs_f64()))
        }
        Some(_) => Liveness::Active,
    }
}

fn file_age(path: &Path, now: SystemTime) -> std::io::Result<Duration> {
    let mtime = std::fs::metadata(path)?.modified()?;
    // A file touched "after" now (clock skew) is as fresh as it gets.
    Ok(now.duration_since(mtime).unwrap_or(Duration::ZERO))
}

/// Age of the most recently modified `.ts` segment, or None when the tier
/// has no segments at all.
fn newest_segment_age(tier_dir: &Path, now: SystemTime) -> std::io::Result<Option<Duration>> {
    let mut newest: Option<Duration> = None;
    for entry in std::fs::read_dir(tier_dir)? {
        let path = entry?.path();
        if !path.extension().is_some_and(|ext| ext == "ts") {
            continue;
        }
        let age = file_age(&path, now)?;
        newest = Some(match newest {
            Some(current) if current < age => current,
            _ => age,
        });
    }
    Ok(newest)
}

/// Periodic reconciliation of declared-live records against disk evidence.
pub struct LivenessMonitor {
    pool: DbPool,
    coordinator: Arc<StreamCoordinator>,
    media: MediaConfig,
    config: LivenessConfig,
    primary_tier: String,
    /// Stream ids with a check currently in flight; prevents a slow check
    /// from racing a second one for the same id.
    in_flight: Arc<DashMap<String, ()>>,
}

impl LivenessMonitor {
    pub fn new(
        pool: DbPool,
        coordinator: Arc<StreamCoordinator>,
        media: MediaConfig,
        config: LivenessConfig,
        primary_tier: String,
    ) -> Self {
        Self {
            pool,
            coordinator,
            media,
            config,
            primary_tier,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Spawn the reconciliation loop.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// Run one reconciliation pass over every record marked live.
    pub async fn tick(&self) {
        let live = {
            let conn = match hivecast_db::pool::get_conn(&self.pool) {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::error!("Liveness tick could not reach the record store: {}", e);
                    return;
                }
            };
            match stream_keys::list_live(&conn, None, None, i64::MAX, 0) {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!("Liveness tick failed to list live streams: {}", e);
                    return;
                }
            }
        };

        tracing::debug!(live = live.len(), "Liveness tick");

        for record in live {
            let Some(stream_id) = record.stream_id else {
                tracing::warn!(account = %record.hive_account,
                    "Live record without stream id, skipping");
                continue;
            };
            self.check_stream(&stream_id).await;
        }
    }

    /// Check one stream, at most once concurrently per id.
    async fn check_stream(&self, stream_id: &StreamId) {
        if self
            .in_flight
            .insert(stream_id.to_string(), ())
            .is_some()
        {
            tracing::debug!(stream_id = %stream_id, "Liveness check already in flight");
            return;
        }

        let verdict = self.classify(stream_id).await;

        match verdict {
            Liveness::Active => {
                tracing::debug!(stream_id = %stream_id, "Stream evidence fresh");
            }
            Liveness::Stale(reason) => {
                tracing::info!(stream_id = %stream_id, reason = %reason,
                    "Stream evidence stale, ending");
                if let Err(e) = self
                    .coordinator
                    .stale_detected(stream_id, reason)
                    .await
                {
                    tracing::error!(stream_id = %stream_id,
                        "Failed to end stale stream: {}", e);
                }
            }
        }

        self.in_flight.remove(stream_id.as_str());
    }

    async fn classify(&self, stream_id: &StreamId) -> Liveness {
        let stream_dir: PathBuf = self.media.stream_dir(stream_id.as_str());
        let primary = self.primary_tier.clone();
        let thresholds = Thresholds::from(&self.config);

        // Directory walks are blocking; keep them off the runtime workers.
        tokio::task::spawn_blocking(move || {
            classify_stream_dir(&stream_dir, &primary, SystemTime::now(), &thresholds)
        })
        .await
        .unwrap_or_else(|e| Liveness::Stale(format!("fs_error_join_{}", e)))
    }
}
