//! Ingest server callback routes.
//!
//! The external RTMP server translates its publish / unpublish / disconnect
//! events into these hooks. `publish` is synchronous authorization: a non-2xx
//! response makes the media server reject the session; the 200 body carries
//! the canonical path the session must be rewritten to.

use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use hivecast_common::StreamId;
use serde::{Deserialize, Serialize};

use crate::ingest::{PublishGrant, PublishRequest};
use crate::lifecycle::LifecycleError;
use crate::server::AppContext;

pub fn hook_routes() -> Router<AppContext> {
    Router::new()
        .route("/publish", post(publish))
        .route("/publish_done", post(publish_done))
        .route("/disconnect", post(disconnect))
}

#[derive(Debug, Serialize)]
struct RejectBody {
    error: String,
}

fn reject(status: StatusCode, error: &str) -> (StatusCode, Json<RejectBody>) {
    (
        status,
        Json(RejectBody {
            error: error.to_string(),
        }),
    )
}

/// Authorize a publish attempt.
async fn publish(
    State(ctx): State<AppContext>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishGrant>, (StatusCode, Json<RejectBody>)> {
    match ctx.coordinator.authenticate_publish(&request).await {
        Ok(grant) => Ok(Json(grant)),
        Err(LifecycleError::CredentialMissing) => Err(reject(
            StatusCode::BAD_REQUEST,
            "no stream key in publish path",
        )),
        Err(LifecycleError::Unauthorized) => {
            Err(reject(StatusCode::UNAUTHORIZED, "invalid stream key"))
        }
        Err(LifecycleError::LaunchFailure(e)) => {
            tracing::error!("Rejecting publish, transcoder launch failed: {}", e);
            Err(reject(StatusCode::SERVICE_UNAVAILABLE, "transcoder unavailable"))
        }
        Err(e) => {
            tracing::error!("Rejecting publish, internal error: {}", e);
            Err(reject(StatusCode::INTERNAL_SERVER_ERROR, "internal error"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionRef {
    session_id: StreamId,
}

#[derive(Debug, Serialize)]
struct EndAck {
    ended: bool,
}

/// The ingest server finished a publish.
async fn publish_done(
    State(ctx): State<AppContext>,
    Json(body): Json<SessionRef>,
) -> Json<EndAck> {
    let ended = ctx
        .coordinator
        .publish_done(&body.session_id)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(stream_id = %body.session_id, "publish_done failed: {}", e);
            false
        });
    Json(EndAck { ended })
}

/// An ingest connection closed, with or without a preceding publish_done.
async fn disconnect(
    State(ctx): State<AppContext>,
    Json(body): Json<SessionRef>,
) -> Json<EndAck> {
    let ended = ctx
        .coordinator
        .connection_done(&body.session_id)
        .await
        .unwrap_or_else(|e| {
            tracing::error!(stream_id = %body.session_id, "disconnect cleanup failed: {}", e);
            false
        });
    Json(EndAck { ended })
}
