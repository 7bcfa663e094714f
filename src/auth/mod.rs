//! Stream key issuance and validation.
//!
//! A stream key is the secret credential a broadcaster pastes into their
//! streaming software; it authorizes exactly one Hive account to publish.
//! Keys are 32 random bytes, hex encoded.

use hivecast_common::{Error, Result};
use hivecast_db::models::StreamKeyRecord;
use hivecast_db::queries::stream_keys;
use rand::RngCore;
use rusqlite::Connection;

/// Length of a stream key in raw bytes (64 hex chars once encoded).
const STREAM_KEY_BYTES: usize = 32;

/// Generate a fresh random stream key.
pub fn generate_stream_key() -> String {
    let mut bytes = [0u8; STREAM_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Issue a stream key for an account, creating the record when the account
/// has none and rotating the credential otherwise.
pub fn issue_stream_key(conn: &Connection, hive_account: &str) -> Result<String> {
    let key = generate_stream_key();

    if stream_keys::find_by_account(conn, hive_account)?.is_some() {
        stream_keys::rotate_stream_key(conn, hive_account, &key)?;
        tracing::info!(account = %hive_account, "Rotated stream key");
    } else {
        stream_keys::create_stream_key(conn, hive_account, &key)?;
        tracing::info!(account = %hive_account, "Created stream key");
    }

    Ok(key)
}

/// Validate a presented credential.
///
/// Returns the owning record only when the key exists and has not been
/// revoked, and bumps `last_used` on success. Anything else is
/// `Unauthorized` — a lookup that cannot be completed must never admit the
/// session.
pub fn validate_stream_key(conn: &Connection, stream_key: &str) -> Result<StreamKeyRecord> {
    let record = stream_keys::find_by_key(conn, stream_key)?.ok_or(Error::Unauthorized)?;

    if !record.is_active {
        tracing::warn!(account = %record.hive_account, "Publish attempt with revoked stream key");
        return Err(Error::Unauthorized);
    }

    stream_keys::touch_last_used(conn, &record.hive_account)?;
    Ok(record)
}
