//! Hive announcement publishing.
//!
//! Implements [`StreamAnnouncer`] against a publisher service: an
//! operator-run endpoint that signs and broadcasts posts on behalf of the
//! configured community account. Hivecast builds the post content; all
//! cryptography stays on the other side of this HTTP boundary.

use async_trait::async_trait;
use chrono::Utc;
use hivecast_common::{ChannelInfo, StreamId};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::config::HiveConfig;
use crate::effects::{format_duration, PostRef, StreamAnnouncer};

/// Connection timeout for publisher requests.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the announcement publisher service.
pub struct HiveClient {
    client: Client,
    publisher_url: String,
    watch_base_url: String,
}

#[derive(Debug, Serialize)]
struct CreatePostRequest<'a> {
    author: &'a str,
    permlink: &'a str,
    title: &'a str,
    body: &'a str,
    tags: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct UpdatePostRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatePostResponse {
    author: String,
    permlink: String,
}

impl HiveClient {
    pub fn new(config: &HiveConfig) -> anyhow::Result<Self> {
        let publisher_url = config
            .publisher_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("hive.publisher_url is required when hive.enabled"))?
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .timeout(CONNECTION_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Ok(Self {
            client,
            publisher_url,
            watch_base_url: config.watch_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn watch_url(&self, channel: &ChannelInfo) -> String {
        format!("{}/watch/{}", self.watch_base_url, channel.hive_account)
    }
}

#[async_trait]
impl StreamAnnouncer for HiveClient {
    async fn announce_live(
        &self,
        stream_id: &StreamId,
        channel: &ChannelInfo,
        thumbnail: Option<&Path>,
    ) -> anyhow::Result<PostRef> {
        let permlink = format!("hivecast-{}-{}", stream_id, Utc::now().timestamp());
        let title = format!("\u{1F534} {}", channel.display_title());

        let mut body = format!(
            "{} is now live: {}\n\nStarted: {}\nWatch: {}\n",
            channel.hive_account,
            channel.display_title(),
            Utc::now().to_rfc2822(),
            self.watch_url(channel),
        );
        if let Some(lang) = &channel.language {
            body.push_str(&format!("Language: {}\n", lang));
        }

        let image = thumbnail.map(|p| p.to_string_lossy().into_owned());
        let request = CreatePostRequest {
            author: &channel.hive_account,
            permlink: &permlink,
            title: &title,
            body: &body,
            tags: &["hivecast", "livestream"],
            image: image.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/api/posts", self.publisher_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            anyhow::bail!("publisher rejected post ({}): {}", status, error);
        }

        let created: CreatePostResponse = response.json().await?;
        Ok(PostRef {
            author: created.author,
            permlink: created.permlink,
        })
    }

    async fn announce_ended(
        &self,
        post: &PostRef,
        _stream_id: &StreamId,
        duration: Duration,
    ) -> anyhow::Result<()> {
        let body = format!(
            "Stream ended.\n\nDuration: {}\nEnded: {}\n",
            format_duration(duration),
            Utc::now().to_rfc2822(),
        );

        let response = self
            .client
            .put(format!(
                "{}/api/posts/{}/{}",
                self.publisher_url, post.author, post.permlink
            ))
            .json(&UpdatePostRequest { body: &body })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            anyhow::bail!("publisher rejected post update ({}): {}", status, error);
        }

        Ok(())
    }
}
