//! Side-effect dispatch for stream lifecycle transitions.
//!
//! The coordinator commits its state transition first and hands the
//! announcement work here afterwards; nothing in this module may block or
//! unwind a transition. Failures are retried a bounded number of times,
//! then logged and dropped.

pub mod thumbnail;

pub use thumbnail::{FfmpegThumbnailer, Thumbnailer};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hivecast_common::{ChannelInfo, StreamId};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Reference to a published announcement post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRef {
    pub author: String,
    pub permlink: String,
}

/// External publishing interface: create and update one social post per
/// stream.
#[async_trait]
pub trait StreamAnnouncer: Send + Sync {
    /// Publish the "stream started" announcement; returns a reference used
    /// for the end-of-stream update.
    async fn announce_live(
        &self,
        stream_id: &StreamId,
        channel: &ChannelInfo,
        thumbnail: Option<&Path>,
    ) -> anyhow::Result<PostRef>;

    /// Update the announcement post to its ended form.
    async fn announce_ended(
        &self,
        post: &PostRef,
        stream_id: &StreamId,
        duration: Duration,
    ) -> anyhow::Result<()>;
}

/// No-op announcer used when announcements are disabled.
pub struct NullAnnouncer;

#[async_trait]
impl StreamAnnouncer for NullAnnouncer {
    async fn announce_live(
        &self,
        stream_id: &StreamId,
        channel: &ChannelInfo,
        _thumbnail: Option<&Path>,
    ) -> anyhow::Result<PostRef> {
        tracing::debug!(stream_id = %stream_id, account = %channel.hive_account,
            "Announcements disabled, skipping live post");
        Ok(PostRef {
            author: channel.hive_account.clone(),
            permlink: String::new(),
        })
    }

    async fn announce_ended(
        &self,
        _post: &PostRef,
        stream_id: &StreamId,
        _duration: Duration,
    ) -> anyhow::Result<()> {
        tracing::debug!(stream_id = %stream_id, "Announcements disabled, skipping end update");
        Ok(())
    }
}

struct AnnouncementPost {
    post: PostRef,
    created_at: DateTime<Utc>,
}

/// At-most-once-per-transition dispatcher for announcement posts and
/// thumbnail capture.
pub struct SideEffectDispatcher {
    announcer: Arc<dyn StreamAnnouncer>,
    thumbnailer: Arc<dyn Thumbnailer>,
    posts: DashMap<String, AnnouncementPost>,
    attempts: u32,
    backoff: Duration,
}

impl SideEffectDispatcher {
    pub fn new(announcer: Arc<dyn StreamAnnouncer>, thumbnailer: Arc<dyn Thumbnailer>) -> Self {
        Self {
            announcer,
            thumbnailer,
            posts: DashMap::new(),
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }

    /// Override the retry policy (tests use a zero backoff).
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Announce a stream going live. Thumbnail capture failure is
    /// non-fatal: the post simply goes out without an image.
    pub async fn stream_started(&self, stream_id: &StreamId, channel: &ChannelInfo) {
        let thumbnail = match self.thumbnailer.capture(stream_id).await {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(stream_id = %stream_id, "Thumbnail capture failed: {}", e);
                None
            }
        };

        for attempt in 1..=self.attempts {
            match self
                .announcer
                .announce_live(stream_id, channel, thumbnail.as_deref())
                .await
            {
                Ok(post) => {
                    tracing::info!(stream_id = %stream_id, author = %post.author,
                        permlink = %post.permlink, "Announcement post created");
                    self.posts.insert(
                        stream_id.to_string(),
                        AnnouncementPost {
                            post,
                            created_at: Utc::now(),
                        },
                    );
                    return;
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(stream_id = %stream_id, attempt,
                        "Announcement post failed, retrying: {}", e);
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    tracing::error!(stream_id = %stream_id,
                        "Giving up on announcement post: {}", e);
                }
            }
        }
    }

    /// Update the announcement post for an ended stream.
    ///
    /// The in-memory reference is dropped only once the update succeeds.
    /// A missing reference (post never created, or the process restarted
    /// and lost the index) is logged and skipped.
    pub async fn stream_ended(&self, stream_id: &StreamId) {
        let (post, created_at) = match self.posts.get(stream_id.as_str()) {
            Some(entry) => (entry.post.clone(), entry.created_at),
            None => {
                tracing::info!(stream_id = %stream_id,
                    "No announcement post tracked for ended stream");
                return;
            }
        };

        let duration = (Utc::now() - created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        for attempt in 1..=self.attempts {
            match self
                .announcer
                .announce_ended(&post, stream_id, duration)
                .await
            {
                Ok(()) => {
                    tracing::info!(stream_id = %stream_id, permlink = %post.permlink,
                        duration = %format_duration(duration), "Announcement post updated");
                    self.posts.remove(stream_id.as_str());
                    return;
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(stream_id = %stream_id, attempt,
                        "Announcement update failed, retrying: {}", e);
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => {
                    tracing::error!(stream_id = %stream_id,
                        "Giving up on announcement update: {}", e);
                }
            }
        }
    }

    /// Number of streams with a tracked announcement post.
    pub fn tracked_posts(&self) -> usize {
        self.posts.len()
    }
}

/// Format a stream duration as whole hours and minutes, e.g. `2h 35m`.
pub fn format_duration(duration: Duration) -> String {
    let total_minutes = duration.as_secs() / 60;
    format!("{}h {}m", total_minutes / 60, total_minutes % 60)
}
