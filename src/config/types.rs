use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transcode::QualityTier;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub media: MediaConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub liveness: LivenessConfig,

    #[serde(default)]
    pub hive: HiveConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path to the SQLite record store.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_db_path() -> PathBuf {
    PathBuf::from("hivecast.db")
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Root directory for media output. Live stream working directories are
    /// created under `{root}/live/{stream_id}`, thumbnails under
    /// `{root}/thumbnails`.
    #[serde(default = "default_media_root")]
    pub root: PathBuf,
}

fn default_media_root() -> PathBuf {
    PathBuf::from("./media")
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            root: default_media_root(),
        }
    }
}

impl MediaConfig {
    /// Working directory for one live stream.
    pub fn stream_dir(&self, stream_id: &str) -> PathBuf {
        self.root.join("live").join(stream_id)
    }

    /// Directory holding captured stream thumbnails.
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.root.join("thumbnails")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Base URL of the external RTMP ingest server; the transcoder pulls its
    /// input from `{rtmp_url}/live/{stream_id}`.
    #[serde(default = "default_rtmp_url")]
    pub rtmp_url: String,
}

fn default_rtmp_url() -> String {
    "rtmp://127.0.0.1:1935".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            rtmp_url: default_rtmp_url(),
        }
    }
}

impl IngestConfig {
    /// RTMP input locator for a live session.
    pub fn input_url(&self, stream_id: &str) -> String {
        format!("{}/live/{}", self.rtmp_url.trim_end_matches('/'), stream_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Explicit path to the ffmpeg binary; resolved from PATH when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// HLS segment duration in seconds.
    #[serde(default = "default_hls_time")]
    pub hls_time: u32,

    /// Number of segments kept in each tier playlist.
    #[serde(default = "default_hls_list_size")]
    pub hls_list_size: u32,

    /// Rendition ladder, highest quality first. The first entry is the
    /// primary tier used for liveness checks and thumbnail capture.
    #[serde(default = "crate::transcode::default_ladder")]
    pub tiers: Vec<QualityTier>,
}

fn default_hls_time() -> u32 {
    2
}
fn default_hls_list_size() -> u32 {
    8
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            hls_time: default_hls_time(),
            hls_list_size: default_hls_list_size(),
            tiers: crate::transcode::default_ladder(),
        }
    }
}

impl TranscodeConfig {
    /// Name of the primary quality tier.
    pub fn primary_tier(&self) -> &str {
        self.tiers.first().map(|t| t.name.as_str()).unwrap_or("source")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reconciliation tick interval.
    #[serde(default = "default_liveness_interval")]
    pub interval_secs: u64,

    /// Maximum age of the primary tier index playlist before the stream is
    /// considered stale.
    #[serde(default = "default_index_stale")]
    pub index_stale_secs: u64,

    /// Maximum age of the newest segment file before the stream is
    /// considered stale.
    #[serde(default = "default_segment_stale")]
    pub segment_stale_secs: u64,
}

fn default_true() -> bool {
    true
}
fn default_liveness_interval() -> u64 {
    30
}
fn default_index_stale() -> u64 {
    60
}
fn default_segment_stale() -> u64 {
    40
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_liveness_interval(),
            index_stale_secs: default_index_stale(),
            segment_stale_secs: default_segment_stale(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HiveConfig {
    /// Enable announcement posts. When disabled the dispatcher still runs,
    /// but announcements go to a no-op sink.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the publisher service that signs and broadcasts posts on
    /// behalf of the configured community account.
    #[serde(default)]
    pub publisher_url: Option<String>,

    /// Base URL used to build watch links embedded in announcement posts.
    #[serde(default = "default_watch_base_url")]
    pub watch_base_url: String,
}

fn default_watch_base_url() -> String {
    "http://localhost:3000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.transcode.hls_time, 2);
        assert_eq!(config.transcode.tiers.len(), 4);
        assert_eq!(config.transcode.primary_tier(), "source");
        assert!(config.liveness.enabled);
        assert!(!config.hive.enabled);
    }

    #[test]
    fn test_media_paths() {
        let media = MediaConfig {
            root: PathBuf::from("/srv/media"),
        };
        assert_eq!(
            media.stream_dir("SESSID"),
            PathBuf::from("/srv/media/live/SESSID")
        );
        assert_eq!(media.thumbnail_dir(), PathBuf::from("/srv/media/thumbnails"));
    }

    #[test]
    fn test_input_url_trims_trailing_slash() {
        let ingest = IngestConfig {
            rtmp_url: "rtmp://10.0.0.1:1935/".to_string(),
        };
        assert_eq!(ingest.input_url("abc"), "rtmp://10.0.0.1:1935/live/abc");
    }
}
