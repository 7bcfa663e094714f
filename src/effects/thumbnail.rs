//! Still-frame thumbnail capture for live streams.
//!
//! Extracts a single frame from the most recent primary-tier segment with
//! ffmpeg. Every failure mode degrades to "no thumbnail" — announcements
//! never fail because an image could not be produced.

use async_trait::async_trait;
use hivecast_common::StreamId;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::{MediaConfig, TranscodeConfig};

/// External thumbnail extractor boundary.
#[async_trait]
pub trait Thumbnailer: Send + Sync {
    /// Produce a thumbnail for a live stream, or `None` when no usable
    /// source material exists yet.
    async fn capture(&self, stream_id: &StreamId) -> anyhow::Result<Option<PathBuf>>;
}

/// ffmpeg-backed [`Thumbnailer`].
pub struct FfmpegThumbnailer {
    media: MediaConfig,
    primary_tier: String,
    ffmpeg_path: Option<PathBuf>,
    /// Bounding box for the captured frame.
    max_resolution: (u32, u32),
}

impl FfmpegThumbnailer {
    pub fn new(media: MediaConfig, transcode: &TranscodeConfig) -> Self {
        Self {
            media,
            primary_tier: transcode.primary_tier().to_string(),
            ffmpeg_path: transcode.ffmpeg_path.clone(),
            max_resolution: (640, 360),
        }
    }

    /// Most recently modified segment file in the stream's primary tier.
    fn newest_segment(&self, stream_id: &StreamId) -> Option<PathBuf> {
        let tier_dir = self
            .media
            .stream_dir(stream_id.as_str())
            .join(&self.primary_tier);

        let entries = std::fs::read_dir(&tier_dir).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "ts"))
            .filter_map(|p| {
                let mtime = std::fs::metadata(&p).ok()?.modified().ok()?;
                Some((p, mtime))
            })
            .max_by_key(|(_, mtime)| *mtime)
            .map(|(p, _)| p)
    }
}

#[async_trait]
impl Thumbnailer for FfmpegThumbnailer {
    async fn capture(&self, stream_id: &StreamId) -> anyhow::Result<Option<PathBuf>> {
        let Some(segment) = self.newest_segment(stream_id) else {
            tracing::debug!(stream_id = %stream_id, "No segment files yet, skipping thumbnail");
            return Ok(None);
        };

        let binary = match &self.ffmpeg_path {
            Some(path) => path.clone(),
            None => match which::which("ffmpeg") {
                Ok(path) => path,
                Err(_) => {
                    tracing::warn!("ffmpeg not found, skipping thumbnail capture");
                    return Ok(None);
                }
            },
        };

        let thumbnail_dir = self.media.thumbnail_dir();
        tokio::fs::create_dir_all(&thumbnail_dir).await?;
        let output = thumbnail_dir.join(format!("{}_current.jpg", stream_id));

        let (w, h) = self.max_resolution;
        let status = Command::new(binary)
            .args([
                "-i",
                &segment.to_string_lossy(),
                // Skip the first second to avoid black frames.
                "-ss",
                "1",
                "-vframes",
                "1",
                "-vf",
                &format!(
                    "scale={w}:{h}:force_original_aspect_ratio=decrease,\
                     pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
                ),
                "-q:v",
                "2",
                "-y",
                &output.to_string_lossy(),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            tracing::warn!(stream_id = %stream_id, status = %status,
                "Thumbnail extraction failed");
            return Ok(None);
        }

        Ok(Some(output))
    }
}
