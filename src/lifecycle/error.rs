//! Lifecycle error taxonomy.

use hivecast_common::Error as CommonError;

/// Errors surfaced by lifecycle operations.
///
/// Authentication failures reject the ingest session and leave no state
/// behind; launch failures mean the stream never reached live.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The announced stream path carried no credential segment.
    #[error("no stream key present in publish path")]
    CredentialMissing,

    /// The credential did not validate. Covers unknown keys, revoked keys,
    /// and lookup errors — doubt never admits a session.
    #[error("stream key rejected")]
    Unauthorized,

    /// The external transcoder could not be launched.
    #[error("failed to launch transcoder: {0}")]
    LaunchFailure(String),

    /// No stream key record exists for the resolved account.
    #[error("no stream key record for account {0}")]
    RecordNotFound(String),

    /// Record store failure outside the authentication path.
    #[error(transparent)]
    Store(#[from] CommonError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            LifecycleError::CredentialMissing.to_string(),
            "no stream key present in publish path"
        );
        assert_eq!(LifecycleError::Unauthorized.to_string(), "stream key rejected");
        assert_eq!(
            LifecycleError::LaunchFailure("spawn failed".into()).to_string(),
            "failed to launch transcoder: spawn failed"
        );
    }
}
