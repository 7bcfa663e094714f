//! Channel management routes: stream key issuance and channel metadata.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use hivecast_common::ChannelInfo;
use hivecast_db::queries::stream_keys;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::server::AppContext;

pub fn channel_routes() -> Router<AppContext> {
    Router::new()
        .route("/channels/:account", get(get_channel))
        .route("/channels/:account", put(update_channel))
        .route("/channels/:account/key", post(issue_key))
}

#[derive(Debug, Serialize)]
struct ChannelResponse {
    hive_account: String,
    title: Option<String>,
    description: Option<String>,
    language: Option<String>,
    category: Option<String>,
    is_live: bool,
    viewer_count: i64,
}

/// Public channel metadata. Never exposes the stream key.
async fn get_channel(
    State(ctx): State<AppContext>,
    Path(account): Path<String>,
) -> Result<Json<ChannelResponse>, StatusCode> {
    let conn = ctx
        .pool
        .get()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let record = stream_keys::find_by_account(&conn, &account)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ChannelResponse {
        hive_account: record.hive_account,
        title: record.title,
        description: record.description,
        language: record.language,
        category: record.category,
        is_live: record.is_live,
        viewer_count: record.viewer_count,
    }))
}

#[derive(Debug, Deserialize)]
struct ChannelUpdate {
    title: Option<String>,
    description: Option<String>,
    language: Option<String>,
    category: Option<String>,
}

/// Update channel metadata; omitted fields are left unchanged.
async fn update_channel(
    State(ctx): State<AppContext>,
    Path(account): Path<String>,
    Json(update): Json<ChannelUpdate>,
) -> Result<StatusCode, StatusCode> {
    let conn = ctx
        .pool
        .get()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let info = ChannelInfo {
        hive_account: account,
        title: update.title,
        description: update.description,
        language: update.language,
        category: update.category,
    };

    let updated = stream_keys::update_channel_info(&conn, &info)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if updated {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Serialize)]
struct IssueKeyResponse {
    hive_account: String,
    stream_key: String,
}

/// Issue (or rotate) the stream key for an account.
async fn issue_key(
    State(ctx): State<AppContext>,
    Path(account): Path<String>,
) -> Result<Json<IssueKeyResponse>, StatusCode> {
    let conn = ctx
        .pool
        .get()
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    let stream_key = auth::issue_stream_key(&conn, &account)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(IssueKeyResponse {
        hive_account: account,
        stream_key,
    }))
}
