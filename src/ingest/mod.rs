//! Ingest-side data types and path handling.
//!
//! The RTMP server is an external component; it drives the lifecycle
//! coordinator through plain method calls (translated from its publish /
//! unpublish / disconnect callbacks by the hook routes in
//! [`crate::server`]). This module holds the request/response types for
//! that boundary plus the stream-path helpers.

use hivecast_common::StreamId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An authenticated-publish attempt as announced by the ingest server.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishRequest {
    /// Ingest session id; becomes the stream id on success.
    pub session_id: StreamId,
    /// Announced stream path; the last segment carries the stream key.
    pub stream_path: String,
    /// Extra connection arguments (unused today, logged for diagnostics).
    #[serde(default)]
    pub args: HashMap<String, String>,
}

/// Result of an accepted publish attempt.
#[derive(Debug, Clone, Serialize)]
pub struct PublishGrant {
    /// Account that owns the stream key.
    pub hive_account: String,
    /// Canonical path the ingest server must rewrite the session to, so
    /// path-derived lookups downstream stay stable.
    pub canonical_path: String,
}

/// Extract the stream key from an announced stream path.
///
/// The key is the last non-empty path segment: `/live/abc123` → `abc123`.
pub fn extract_stream_key(stream_path: &str) -> Option<&str> {
    stream_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
}

/// Canonical publish path for an authenticated session.
pub fn canonical_stream_path(stream_id: &StreamId) -> String {
    format!("/live/{}", stream_id)
}
