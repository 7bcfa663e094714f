//! Stream lifecycle coordination.
//!
//! The coordinator is the only writer of live-session state: it admits
//! publish attempts, drives streams through idle → live → ended, starts and
//! stops the transcoder, and hands committed transitions to the side-effect
//! dispatcher.

mod coordinator;
mod error;

pub use coordinator::StreamCoordinator;
pub use error::LifecycleError;

use hivecast_common::StreamId;

/// What caused a live stream to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndTrigger {
    /// The ingest server reported the publish finished.
    Unpublish,
    /// The ingest connection dropped.
    Disconnect,
    /// The liveness monitor classified the stream stale.
    Stale(String),
}

impl std::fmt::Display for EndTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndTrigger::Unpublish => write!(f, "unpublish"),
            EndTrigger::Disconnect => write!(f, "disconnect"),
            EndTrigger::Stale(reason) => write!(f, "stale:{}", reason),
        }
    }
}

/// Lifecycle transition notification, broadcast after the transition has
/// been committed.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Started {
        stream_id: StreamId,
        hive_account: String,
    },
    Ended {
        stream_id: StreamId,
        hive_account: String,
        trigger: String,
    },
}
