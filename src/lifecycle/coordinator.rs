//! The stream lifecycle coordinator.

use chrono::Utc;
use dashmap::DashMap;
use hivecast_common::{Error as CommonError, StreamId};
use hivecast_db::pool::DbPool;
use hivecast_db::queries::stream_keys;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::auth;
use crate::config::IngestConfig;
use crate::effects::SideEffectDispatcher;
use crate::ingest::{self, PublishGrant, PublishRequest};
use crate::lifecycle::{EndTrigger, LifecycleError, StreamEvent};
use crate::transcode::StreamTranscoder;

/// Central state machine for stream lifecycles.
///
/// Transitions for the same account are serialized through a per-account
/// async mutex; different accounts proceed fully in parallel. The database
/// record is only ever touched through the two atomic statements in
/// `hivecast_db::queries::stream_keys`, so readers never observe a
/// half-applied transition and duplicate end events resolve to no-ops.
pub struct StreamCoordinator {
    pool: DbPool,
    transcoder: Arc<dyn StreamTranscoder>,
    effects: Arc<SideEffectDispatcher>,
    ingest: IngestConfig,
    /// Per-account transition locks, created on first use.
    locks: DashMap<String, Arc<Mutex<()>>>,
    events: broadcast::Sender<StreamEvent>,
}

impl StreamCoordinator {
    pub fn new(
        pool: DbPool,
        transcoder: Arc<dyn StreamTranscoder>,
        effects: Arc<SideEffectDispatcher>,
        ingest: IngestConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pool,
            transcoder,
            effects,
            ingest,
            locks: DashMap::new(),
            events,
        }
    }

    /// Subscribe to committed lifecycle transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    fn account_lock(&self, hive_account: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(hive_account.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Authenticate a publish attempt and, on success, bring the stream
    /// live: record update, transcoder launch, side-effect dispatch.
    ///
    /// All-or-nothing: a rejected attempt leaves no live-session state
    /// behind. The transcoder is launched before the record flips live so
    /// a launch failure needs no rollback.
    pub async fn authenticate_publish(
        &self,
        request: &PublishRequest,
    ) -> Result<PublishGrant, LifecycleError> {
        let stream_id = &request.session_id;
        tracing::info!(stream_id = %stream_id, path = %request.stream_path,
            "Publish attempt");

        let stream_key = ingest::extract_stream_key(&request.stream_path)
            .ok_or(LifecycleError::CredentialMissing)?;

        // Fail closed: any validation problem rejects the session.
        let record = {
            let conn = self.conn().map_err(|_| LifecycleError::Unauthorized)?;
            match auth::validate_stream_key(&conn, stream_key) {
                Ok(record) => record,
                Err(CommonError::Unauthorized) => return Err(LifecycleError::Unauthorized),
                Err(e) => {
                    tracing::error!(stream_id = %stream_id,
                        "Credential lookup failed, rejecting session: {}", e);
                    return Err(LifecycleError::Unauthorized);
                }
            }
        };

        let hive_account = record.hive_account.clone();
        let lock = self.account_lock(&hive_account);
        let _guard = lock.lock().await;

        // Reconnect storm: a new publish can win the record while the old
        // session is still draining. Last writer wins; the replaced job is
        // stopped here, and the old session's eventual end event becomes a
        // no-op against the updated record.
        let prior = {
            let conn = self.conn()?;
            stream_keys::find_by_account(&conn, &hive_account)?
        };
        if let Some(prior) = prior {
            if prior.is_live {
                if let Some(old_id) = prior.stream_id.filter(|old| old != stream_id) {
                    tracing::warn!(stream_id = %stream_id, replaced = %old_id,
                        account = %hive_account, "Replacing live session");
                    self.transcoder.stop(&old_id).await;
                }
            }
        }

        let input_url = self.ingest.input_url(stream_id.as_str());
        self.transcoder
            .start(stream_id, &input_url)
            .await
            .map_err(|e| LifecycleError::LaunchFailure(e.to_string()))?;

        // Commit the live session as one atomic update. On failure the
        // freshly started job is torn down again so nothing survives the
        // rejected attempt.
        let committed = {
            let conn = self.conn()?;
            stream_keys::begin_live_session(&conn, &hive_account, stream_id, Utc::now())
        };
        if let Err(e) = committed {
            tracing::error!(stream_id = %stream_id, account = %hive_account,
                "Failed to persist live session, rejecting: {}", e);
            self.transcoder.stop(stream_id).await;
            return Err(match e {
                CommonError::NotFound(_) => LifecycleError::RecordNotFound(hive_account),
                other => LifecycleError::Store(other),
            });
        }

        tracing::info!(stream_id = %stream_id, account = %hive_account, "Stream live");

        // Side effects run detached; they must never block or unwind the
        // committed transition.
        let effects = Arc::clone(&self.effects);
        let channel = record.channel_info();
        let effect_id = stream_id.clone();
        tokio::spawn(async move {
            effects.stream_started(&effect_id, &channel).await;
        });

        let _ = self.events.send(StreamEvent::Started {
            stream_id: stream_id.clone(),
            hive_account: hive_account.clone(),
        });

        Ok(PublishGrant {
            hive_account,
            canonical_path: ingest::canonical_stream_path(stream_id),
        })
    }

    /// The ingest server reported the publish finished.
    pub async fn publish_done(&self, stream_id: &StreamId) -> Result<bool, LifecycleError> {
        self.end_stream(stream_id, EndTrigger::Unpublish).await
    }

    /// The ingest connection closed (possibly without a publish-done).
    pub async fn connection_done(&self, stream_id: &StreamId) -> Result<bool, LifecycleError> {
        self.end_stream(stream_id, EndTrigger::Disconnect).await
    }

    /// The liveness monitor classified the stream stale.
    pub async fn stale_detected(
        &self,
        stream_id: &StreamId,
        reason: String,
    ) -> Result<bool, LifecycleError> {
        self.end_stream(stream_id, EndTrigger::Stale(reason)).await
    }

    /// Shared end-of-stream path. Returns true when this call performed the
    /// transition; duplicate or late events for ids that are not the
    /// record's current live session are no-ops.
    async fn end_stream(
        &self,
        stream_id: &StreamId,
        trigger: EndTrigger,
    ) -> Result<bool, LifecycleError> {
        // Resolve the owning account first so the end runs under the same
        // lock as any racing publish for that account.
        let record = {
            let conn = self.conn()?;
            stream_keys::find_by_stream_id(&conn, stream_id)?
        };
        let Some(record) = record else {
            tracing::debug!(stream_id = %stream_id, trigger = %trigger,
                "End event for unknown stream id, ignoring");
            return Ok(false);
        };

        let lock = self.account_lock(&record.hive_account);
        let _guard = lock.lock().await;

        // The conditional update is the idempotency arbiter: it only fires
        // when this id is still the record's live session.
        let ended = {
            let conn = self.conn()?;
            stream_keys::end_live_session(&conn, stream_id)?
        };
        if !ended {
            tracing::debug!(stream_id = %stream_id, trigger = %trigger,
                "End event for non-live session, ignoring");
            return Ok(false);
        }

        tracing::info!(stream_id = %stream_id, account = %record.hive_account,
            trigger = %trigger, "Stream ended");

        // Stop the transcoder; artifact cleanup runs from its exit callback
        // (or immediately when no process is tracked anymore).
        self.transcoder.stop(stream_id).await;

        let effects = Arc::clone(&self.effects);
        let effect_id = stream_id.clone();
        tokio::spawn(async move {
            effects.stream_ended(&effect_id).await;
        });

        let _ = self.events.send(StreamEvent::Ended {
            stream_id: stream_id.clone(),
            hive_account: record.hive_account,
            trigger: trigger.to_string(),
        });

        Ok(true)
    }

    fn conn(&self) -> Result<hivecast_db::pool::PooledConnection, CommonError> {
        hivecast_db::pool::get_conn(&self.pool)
    }
}
