//! Channel metadata and stream health types shared across hivecast.

use serde::{Deserialize, Serialize};

/// Publicly visible channel metadata attached to a stream key record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelInfo {
    /// Owning Hive account name.
    pub hive_account: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
}

impl ChannelInfo {
    /// Title shown when the broadcaster never set one.
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled Stream")
    }
}

/// Coarse health classification reported by the status API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Transcoder running, no failures observed.
    Good,
    /// No transcode job tracked for a live stream.
    Warning,
    /// Transcoder exited abnormally.
    Error,
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthState::Good => write!(f, "good"),
            HealthState::Warning => write!(f, "warning"),
            HealthState::Error => write!(f, "error"),
        }
    }
}
