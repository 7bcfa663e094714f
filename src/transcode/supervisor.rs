//! Transcoding process supervision.
//!
//! One external ffmpeg process per live stream. The supervisor owns process
//! lifetime: it prepares the working directory and master playlist, spawns
//! the process with captured output, and tears the directory down once the
//! process has actually exited — never while it may still be writing.
//!
//! An unexpected exit is only recorded here; deciding that the stream is
//! over belongs to the liveness monitor, which reads filesystem evidence and
//! is immune to transient process restarts.

use async_trait::async_trait;
use dashmap::DashMap;
use hivecast_common::StreamId;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;

use crate::config::{MediaConfig, TranscodeConfig};
use crate::transcode::profiles::{self, MASTER_PLAYLIST};

/// Errors raised while launching a transcode job.
#[derive(Debug, thiserror::Error)]
pub enum TranscodeError {
    #[error("transcoder binary not found on PATH")]
    BinaryMissing,

    #[error("failed to prepare stream workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("failed to spawn transcoder: {0}")]
    Spawn(std::io::Error),
}

/// Observed state of a stream's transcode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// A process is tracked for this stream.
    Active,
    /// No job tracked and no abnormal exit recorded.
    Inactive,
    /// The process exited abnormally since the job was last started.
    Error { code: Option<i32> },
}

/// External transcoder invocation boundary.
///
/// The lifecycle coordinator only ever talks to this trait; the ffmpeg
/// implementation below is swapped out in tests.
#[async_trait]
pub trait StreamTranscoder: Send + Sync {
    /// Start a transcode job reading from `input_url`. Any prior job for the
    /// same stream id is stopped first.
    async fn start(&self, stream_id: &StreamId, input_url: &str) -> Result<(), TranscodeError>;

    /// Request termination of a job. Does not wait for process exit;
    /// directory cleanup runs from the exit callback. Unknown ids are a
    /// no-op apart from removing any leftover artifacts.
    async fn stop(&self, stream_id: &StreamId);

    /// Report the job state for a stream id.
    fn status(&self, stream_id: &StreamId) -> JobStatus;
}

struct TranscodeJob {
    dir: PathBuf,
    pid: Option<u32>,
    stop_requested: Arc<AtomicBool>,
    kill_tx: Option<oneshot::Sender<()>>,
}

/// ffmpeg-backed [`StreamTranscoder`].
pub struct TranscodeSupervisor {
    media: MediaConfig,
    config: TranscodeConfig,
    jobs: Arc<DashMap<String, TranscodeJob>>,
    last_exit: Arc<DashMap<String, Option<i32>>>,
}

impl TranscodeSupervisor {
    pub fn new(media: MediaConfig, config: TranscodeConfig) -> Self {
        Self {
            media,
            config,
            jobs: Arc::new(DashMap::new()),
            last_exit: Arc::new(DashMap::new()),
        }
    }

    fn resolve_binary(&self) -> Result<PathBuf, TranscodeError> {
        match &self.config.ffmpeg_path {
            Some(path) => Ok(path.clone()),
            None => which::which("ffmpeg").map_err(|_| TranscodeError::BinaryMissing),
        }
    }

    /// Create the stream working directory, per-tier subdirectories, and the
    /// master playlist.
    async fn prepare_workspace(&self, stream_dir: &PathBuf) -> Result<(), TranscodeError> {
        for tier in &self.config.tiers {
            tokio::fs::create_dir_all(stream_dir.join(&tier.name)).await?;
        }
        tokio::fs::write(
            stream_dir.join(MASTER_PLAYLIST),
            profiles::master_playlist(&self.config.tiers),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StreamTranscoder for TranscodeSupervisor {
    async fn start(&self, stream_id: &StreamId, input_url: &str) -> Result<(), TranscodeError> {
        // At most one job per stream id; a replaced job is stopped first.
        if self.jobs.contains_key(stream_id.as_str()) {
            tracing::warn!(stream_id = %stream_id, "Transcode job already tracked, replacing");
            self.stop(stream_id).await;
        }

        let binary = self.resolve_binary()?;
        let stream_dir = self.media.stream_dir(stream_id.as_str());
        self.prepare_workspace(&stream_dir).await?;

        let args = profiles::build_ffmpeg_args(
            input_url,
            &stream_dir,
            &self.config.tiers,
            self.config.hls_time,
            self.config.hls_list_size,
        );

        tracing::info!(stream_id = %stream_id, input = input_url, "Starting transcoder");
        tracing::debug!(stream_id = %stream_id, ?args, "Transcoder arguments");

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        // Pump process output into logs without ever blocking on it.
        if let Some(stdout) = child.stdout.take() {
            let id = stream_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stream_id = %id, "transcoder: {}", line);
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let id = stream_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(stream_id = %id, "transcoder: {}", line);
                }
            });
        }

        let stop_requested = Arc::new(AtomicBool::new(false));
        let (kill_tx, kill_rx) = oneshot::channel();

        self.last_exit.remove(stream_id.as_str());
        self.jobs.insert(
            stream_id.to_string(),
            TranscodeJob {
                dir: stream_dir.clone(),
                pid: child.id(),
                stop_requested: Arc::clone(&stop_requested),
                kill_tx: Some(kill_tx),
            },
        );

        // Exit waiter: records abnormal exits and performs the deferred
        // directory cleanup once the process is really gone.
        let jobs = Arc::clone(&self.jobs);
        let last_exit = Arc::clone(&self.last_exit);
        let id = stream_id.to_string();
        tokio::spawn(async move {
            let status = async {
                tokio::select! {
                    res = child.wait() => return res,
                    _ = kill_rx => {}
                }
                // No graceful signal reached the process; force kill and
                // wait for the real exit.
                let _ = child.start_kill();
                child.wait().await
            }
            .await;

            jobs.remove(&id);
            let stopped = stop_requested.load(Ordering::SeqCst);

            match status {
                Ok(st) if stopped => {
                    tracing::info!(stream_id = %id, status = %st, "Transcoder stopped");
                    if let Err(e) = tokio::fs::remove_dir_all(&stream_dir).await {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            tracing::warn!(stream_id = %id, "Failed to remove stream dir: {}", e);
                        }
                    }
                }
                Ok(st) if st.success() => {
                    tracing::info!(stream_id = %id, "Transcoder exited cleanly");
                }
                Ok(st) => {
                    tracing::warn!(stream_id = %id, status = %st, "Transcoder exited abnormally");
                    last_exit.insert(id.clone(), st.code());
                }
                Err(e) => {
                    tracing::error!(stream_id = %id, "Failed to observe transcoder exit: {}", e);
                    last_exit.insert(id.clone(), None);
                }
            }
        });

        Ok(())
    }

    async fn stop(&self, stream_id: &StreamId) {
        if let Some(mut job) = self.jobs.get_mut(stream_id.as_str()) {
            job.stop_requested.store(true, Ordering::SeqCst);

            #[cfg(unix)]
            if let Some(pid) = job.pid {
                send_sigterm(pid);
                return;
            }

            // No graceful signal available; have the waiter force-kill.
            if let Some(tx) = job.kill_tx.take() {
                let _ = tx.send(());
            }
            return;
        }

        // No tracked job: just make sure no artifacts linger (a crashed
        // process leaves its directory behind with no exit callback to
        // clean it).
        let dir = self.media.stream_dir(stream_id.as_str());
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(stream_id = %stream_id, "Failed to remove stream dir: {}", e);
            }
        }
    }

    fn status(&self, stream_id: &StreamId) -> JobStatus {
        if self.jobs.contains_key(stream_id.as_str()) {
            return JobStatus::Active;
        }
        if let Some(code) = self.last_exit.get(stream_id.as_str()) {
            return JobStatus::Error { code: *code };
        }
        JobStatus::Inactive
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::debug!(pid, "SIGTERM delivery failed (process already gone?): {}", e);
    }
}
