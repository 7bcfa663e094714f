//! Stream key query operations.
//!
//! CRUD on the `stream_keys` table plus the two atomic live-session
//! statements the lifecycle coordinator relies on:
//!
//! - [`begin_live_session`] applies the whole `{stream_id, is_live,
//!   stream_started, viewer_count}` update as one statement so concurrent
//!   readers never observe a half-written live session.
//! - [`end_live_session`] is a conditional update (`WHERE stream_id = ? AND
//!   is_live = 1`) whose affected-row count is the idempotency arbiter for
//!   duplicate or late end events.

use chrono::{DateTime, Utc};
use hivecast_common::{ChannelInfo, Error, Result, StreamId};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::models::StreamKeyRecord;

/// Create a stream key record for an account.
///
/// Fails with a database error if the account already has one; use
/// [`rotate_stream_key`] to replace an existing credential.
pub fn create_stream_key(
    conn: &Connection,
    hive_account: &str,
    stream_key: &str,
) -> Result<StreamKeyRecord> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO stream_keys (id, hive_account, stream_key, is_active, created_at, updated_at)
         VALUES (?, ?, ?, 1, ?, ?)",
        params![&id, hive_account, stream_key, &now, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    find_by_account(conn, hive_account)?
        .ok_or_else(|| Error::internal("stream key vanished after insert"))
}

/// Replace the credential for an existing account.
///
/// Returns false when the account has no record.
pub fn rotate_stream_key(conn: &Connection, hive_account: &str, stream_key: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE stream_keys SET stream_key = ?, updated_at = ? WHERE hive_account = ?",
            params![stream_key, Utc::now().to_rfc3339(), hive_account],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

/// Look up a record by its secret credential, active or not.
pub fn find_by_key(conn: &Connection, stream_key: &str) -> Result<Option<StreamKeyRecord>> {
    find_one(
        conn,
        &format!(
            "SELECT {} FROM stream_keys WHERE stream_key = ?",
            StreamKeyRecord::COLUMNS
        ),
        params![stream_key],
    )
}

/// Look up a record by owning account.
pub fn find_by_account(conn: &Connection, hive_account: &str) -> Result<Option<StreamKeyRecord>> {
    find_one(
        conn,
        &format!(
            "SELECT {} FROM stream_keys WHERE hive_account = ?",
            StreamKeyRecord::COLUMNS
        ),
        params![hive_account],
    )
}

/// Look up a record by its current or most recent stream id.
pub fn find_by_stream_id(
    conn: &Connection,
    stream_id: &StreamId,
) -> Result<Option<StreamKeyRecord>> {
    find_one(
        conn,
        &format!(
            "SELECT {} FROM stream_keys WHERE stream_id = ?",
            StreamKeyRecord::COLUMNS
        ),
        params![stream_id.as_str()],
    )
}

/// Record that a credential was presented.
pub fn touch_last_used(conn: &Connection, hive_account: &str) -> Result<()> {
    conn.execute(
        "UPDATE stream_keys SET last_used = ?, updated_at = ? WHERE hive_account = ?",
        params![
            Utc::now().to_rfc3339(),
            Utc::now().to_rfc3339(),
            hive_account
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Mark an account's record live for a new publish session.
///
/// One statement updates every live-session field together; a concurrent
/// reader sees either the previous session or the new one, never a mix.
/// Last writer wins when two publishes race for the same account.
pub fn begin_live_session(
    conn: &Connection,
    hive_account: &str,
    stream_id: &StreamId,
    started: DateTime<Utc>,
) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let affected = conn
        .execute(
            "UPDATE stream_keys
             SET stream_id = ?, is_live = 1, stream_started = ?, viewer_count = 0,
                 last_used = ?, updated_at = ?
             WHERE hive_account = ?",
            params![
                stream_id.as_str(),
                started.to_rfc3339(),
                &now,
                &now,
                hive_account
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if affected == 0 {
        return Err(Error::not_found(format!("stream key for {}", hive_account)));
    }
    Ok(())
}

/// Mark the session with the given stream id offline.
///
/// Returns true when this call actually ended the session. A stale or
/// duplicate end event (the record's `stream_id` moved on, or the session
/// is already offline) affects zero rows and returns false. `stream_id`
/// itself is left in place as the last-session pointer.
pub fn end_live_session(conn: &Connection, stream_id: &StreamId) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE stream_keys
             SET is_live = 0, viewer_count = 0, updated_at = ?
             WHERE stream_id = ? AND is_live = 1",
            params![Utc::now().to_rfc3339(), stream_id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

/// List live streams, optionally filtered by language/category, ordered by
/// viewer count, paginated.
pub fn list_live(
    conn: &Connection,
    language: Option<&str>,
    category: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<StreamKeyRecord>> {
    let sql = format!(
        "SELECT {} FROM stream_keys
         WHERE is_live = 1
           AND (?1 IS NULL OR language = ?1)
           AND (?2 IS NULL OR category = ?2)
         ORDER BY viewer_count DESC, stream_started ASC
         LIMIT ?3 OFFSET ?4",
        StreamKeyRecord::COLUMNS
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(params![language, category, limit, offset], |row| {
            StreamKeyRecord::from_row(row)
        })
        .map_err(|e| Error::database(e.to_string()))?;

    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Count live streams matching the given filters.
pub fn count_live(
    conn: &Connection,
    language: Option<&str>,
    category: Option<&str>,
) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM stream_keys
         WHERE is_live = 1
           AND (?1 IS NULL OR language = ?1)
           AND (?2 IS NULL OR category = ?2)",
        params![language, category],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Update channel metadata; None fields are left unchanged.
pub fn update_channel_info(conn: &Connection, info: &ChannelInfo) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE stream_keys
             SET title = COALESCE(?, title),
                 description = COALESCE(?, description),
                 language = COALESCE(?, language),
                 category = COALESCE(?, category),
                 updated_at = ?
             WHERE hive_account = ?",
            params![
                info.title,
                info.description,
                info.language,
                info.category,
                Utc::now().to_rfc3339(),
                info.hive_account
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

/// Revoke a credential without deleting the record.
pub fn revoke(conn: &Connection, hive_account: &str) -> Result<bool> {
    let affected = conn
        .execute(
            "UPDATE stream_keys SET is_active = 0, updated_at = ? WHERE hive_account = ?",
            params![Utc::now().to_rfc3339(), hive_account],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(affected > 0)
}

fn find_one(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<StreamKeyRecord>> {
    match conn.query_row(sql, params, |row| StreamKeyRecord::from_row(row)) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;

    fn setup() -> crate::pool::DbPool {
        init_memory_pool().unwrap()
    }

    #[test]
    fn test_create_and_find() {
        let pool = setup();
        let conn = pool.get().unwrap();

        let record = create_stream_key(&conn, "alice", "abc123").unwrap();
        assert_eq!(record.hive_account, "alice");
        assert!(record.is_active);
        assert!(!record.is_live);
        assert!(record.stream_id.is_none());

        let by_key = find_by_key(&conn, "abc123").unwrap().unwrap();
        assert_eq!(by_key.hive_account, "alice");

        assert!(find_by_key(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate_account_fails() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "key1").unwrap();
        assert!(create_stream_key(&conn, "alice", "key2").is_err());
    }

    #[test]
    fn test_rotate_stream_key() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "old").unwrap();
        assert!(rotate_stream_key(&conn, "alice", "new").unwrap());
        assert!(find_by_key(&conn, "old").unwrap().is_none());
        assert!(find_by_key(&conn, "new").unwrap().is_some());

        assert!(!rotate_stream_key(&conn, "bob", "x").unwrap());
    }

    #[test]
    fn test_begin_live_session_sets_all_fields() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "abc123").unwrap();
        let started = Utc::now();
        begin_live_session(&conn, "alice", &StreamId::new("sess1"), started).unwrap();

        let record = find_by_account(&conn, "alice").unwrap().unwrap();
        assert!(record.is_live);
        assert_eq!(record.stream_id, Some(StreamId::new("sess1")));
        assert_eq!(record.viewer_count, 0);
        assert!(record.stream_started.is_some());
        assert!(record.last_used.is_some());
    }

    #[test]
    fn test_begin_live_session_unknown_account() {
        let pool = setup();
        let conn = pool.get().unwrap();

        let err = begin_live_session(&conn, "ghost", &StreamId::new("s"), Utc::now());
        assert!(err.is_err());
    }

    #[test]
    fn test_end_live_session_idempotent() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "abc123").unwrap();
        begin_live_session(&conn, "alice", &StreamId::new("sess1"), Utc::now()).unwrap();

        assert!(end_live_session(&conn, &StreamId::new("sess1")).unwrap());
        // Second end for the same id is a no-op.
        assert!(!end_live_session(&conn, &StreamId::new("sess1")).unwrap());
        // An id the record never had is a no-op too.
        assert!(!end_live_session(&conn, &StreamId::new("other")).unwrap());

        let record = find_by_account(&conn, "alice").unwrap().unwrap();
        assert!(!record.is_live);
        // stream_id survives as the last-session pointer.
        assert_eq!(record.stream_id, Some(StreamId::new("sess1")));
    }

    #[test]
    fn test_end_live_session_stale_id_after_reconnect() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "abc123").unwrap();
        begin_live_session(&conn, "alice", &StreamId::new("sessA"), Utc::now()).unwrap();
        // Reconnect storm: a second session wins the record.
        begin_live_session(&conn, "alice", &StreamId::new("sessB"), Utc::now()).unwrap();

        // The loser's end event must not touch the record.
        assert!(!end_live_session(&conn, &StreamId::new("sessA")).unwrap());
        let record = find_by_account(&conn, "alice").unwrap().unwrap();
        assert!(record.is_live);
        assert_eq!(record.stream_id, Some(StreamId::new("sessB")));

        assert!(end_live_session(&conn, &StreamId::new("sessB")).unwrap());
    }

    #[test]
    fn test_list_live_filters_and_pagination() {
        let pool = setup();
        let conn = pool.get().unwrap();

        for (account, lang, viewers) in [("alice", "EN_US", 5), ("bob", "DE_DE", 9), ("carol", "EN_US", 2)]
        {
            create_stream_key(&conn, account, &format!("key-{}", account)).unwrap();
            update_channel_info(
                &conn,
                &ChannelInfo {
                    hive_account: account.to_string(),
                    language: Some(lang.to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
            begin_live_session(&conn, account, &StreamId::new(format!("s-{}", account)), Utc::now())
                .unwrap();
            conn.execute(
                "UPDATE stream_keys SET viewer_count = ? WHERE hive_account = ?",
                params![viewers, account],
            )
            .unwrap();
        }
        // dave is offline and must never show up.
        create_stream_key(&conn, "dave", "key-dave").unwrap();

        let all = list_live(&conn, None, None, 50, 0).unwrap();
        assert_eq!(all.len(), 3);
        // Ordered by viewer count, descending.
        assert_eq!(all[0].hive_account, "bob");

        let english = list_live(&conn, Some("EN_US"), None, 50, 0).unwrap();
        assert_eq!(english.len(), 2);
        assert_eq!(count_live(&conn, Some("EN_US"), None).unwrap(), 2);

        let page2 = list_live(&conn, None, None, 2, 2).unwrap();
        assert_eq!(page2.len(), 1);
    }

    #[test]
    fn test_update_channel_info_partial() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "abc123").unwrap();
        update_channel_info(
            &conn,
            &ChannelInfo {
                hive_account: "alice".into(),
                title: Some("First title".into()),
                category: Some("gaming".into()),
                ..Default::default()
            },
        )
        .unwrap();
        // Updating only the title must leave the category alone.
        update_channel_info(
            &conn,
            &ChannelInfo {
                hive_account: "alice".into(),
                title: Some("Second title".into()),
                ..Default::default()
            },
        )
        .unwrap();

        let record = find_by_account(&conn, "alice").unwrap().unwrap();
        assert_eq!(record.title.as_deref(), Some("Second title"));
        assert_eq!(record.category.as_deref(), Some("gaming"));
    }

    #[test]
    fn test_revoke() {
        let pool = setup();
        let conn = pool.get().unwrap();

        create_stream_key(&conn, "alice", "abc123").unwrap();
        assert!(revoke(&conn, "alice").unwrap());

        let record = find_by_key(&conn, "abc123").unwrap().unwrap();
        assert!(!record.is_active);
    }
}
