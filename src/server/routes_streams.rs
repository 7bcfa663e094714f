//! Public stream listing and status routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use hivecast_common::{HealthState, StreamId};
use hivecast_db::models::StreamKeyRecord;
use hivecast_db::queries::stream_keys;
use serde::{Deserialize, Serialize};

use crate::server::AppContext;
use crate::transcode::JobStatus;

pub fn stream_routes() -> Router<AppContext> {
    Router::new()
        .route("/streams", get(list_streams))
        .route("/streams/:stream_id/status", get(stream_status))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    language: Option<String>,
    category: Option<String>,
    page: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StreamSummary {
    id: String,
    username: String,
    title: String,
    description: Option<String>,
    language: Option<String>,
    category: Option<String>,
    start_time: Option<DateTime<Utc>>,
    viewers: i64,
    thumbnail: String,
    is_live: bool,
}

#[derive(Debug, Serialize)]
struct Pagination {
    current_page: i64,
    total_pages: i64,
    total_streams: i64,
}

#[derive(Debug, Serialize)]
struct StreamListResponse {
    streams: Vec<StreamSummary>,
    pagination: Pagination,
}

fn summarize(record: &StreamKeyRecord) -> StreamSummary {
    let id = record
        .stream_id
        .as_ref()
        .map(|s| s.to_string())
        .unwrap_or_default();
    StreamSummary {
        thumbnail: format!("/thumbnails/{}_current.jpg", id),
        id,
        username: record.hive_account.clone(),
        title: record.channel_info().display_title().to_string(),
        description: record.description.clone(),
        language: record.language.clone(),
        category: record.category.clone(),
        start_time: record.stream_started,
        viewers: record.viewer_count,
        is_live: record.is_live,
    }
}

/// List live streams with optional language/category filters, paginated.
async fn list_streams(
    State(ctx): State<AppContext>,
    Query(query): Query<ListQuery>,
) -> Result<Json<StreamListResponse>, StatusCode> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let conn = ctx
        .pool
        .get()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let total = stream_keys::count_live(
        &conn,
        query.language.as_deref(),
        query.category.as_deref(),
    )
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let records = stream_keys::list_live(
        &conn,
        query.language.as_deref(),
        query.category.as_deref(),
        limit,
        offset,
    )
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(StreamListResponse {
        streams: records.iter().map(summarize).collect(),
        pagination: Pagination {
            current_page: page,
            total_pages: (total + limit - 1) / limit,
            total_streams: total,
        },
    }))
}

#[derive(Debug, Serialize)]
struct Statistics {
    viewers: i64,
    uptime_secs: i64,
    start_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct TierInfo {
    name: String,
    width: u32,
    height: u32,
    bitrate_kbps: u32,
}

#[derive(Debug, Serialize)]
struct Health {
    status: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    last_check: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct StreamStatusResponse {
    id: String,
    online: bool,
    username: String,
    title: String,
    description: Option<String>,
    language: Option<String>,
    category: Option<String>,
    statistics: Statistics,
    quality: Vec<TierInfo>,
    health: Health,
    thumbnail: String,
}

/// Detailed status for one live stream.
///
/// Unknown ids and ended streams are both a plain 404; the API does not
/// distinguish "never existed" from "no longer live".
async fn stream_status(
    State(ctx): State<AppContext>,
    Path(stream_id): Path<String>,
) -> Result<Json<StreamStatusResponse>, StatusCode> {
    let stream_id = StreamId::new(stream_id);

    let conn = ctx
        .pool
        .get()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let record = stream_keys::find_by_stream_id(&conn, &stream_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|r| r.is_live)
        .ok_or(StatusCode::NOT_FOUND)?;

    let uptime_secs = record
        .stream_started
        .map(|started| (Utc::now() - started).num_seconds().max(0))
        .unwrap_or(0);

    let (health_status, detail) = match ctx.transcoder.status(&stream_id) {
        JobStatus::Active => (HealthState::Good, None),
        JobStatus::Inactive => (HealthState::Warning, Some("no transcode job".to_string())),
        JobStatus::Error { code } => (
            HealthState::Error,
            Some(format!("transcoder exited (code {:?})", code)),
        ),
    };

    Ok(Json(StreamStatusResponse {
        id: stream_id.to_string(),
        online: true,
        username: record.hive_account.clone(),
        title: record.channel_info().display_title().to_string(),
        description: record.description.clone(),
        language: record.language.clone(),
        category: record.category.clone(),
        statistics: Statistics {
            viewers: record.viewer_count,
            uptime_secs,
            start_time: record.stream_started,
        },
        quality: ctx
            .config
            .transcode
            .tiers
            .iter()
            .map(|t| TierInfo {
                name: t.name.clone(),
                width: t.width,
                height: t.height,
                bitrate_kbps: t.bitrate_kbps,
            })
            .collect(),
        health: Health {
            status: health_status,
            detail,
            last_check: Utc::now(),
        },
        thumbnail: format!("/thumbnails/{}_current.jpg", stream_id),
    }))
}
