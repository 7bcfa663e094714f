//! Record types stored in the hivecast database.

use chrono::{DateTime, Utc};
use hivecast_common::{ChannelInfo, KeyId, StreamId};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stream key record: the publish credential plus the live-session state
/// for a single Hive account.
///
/// `stream_id` is set when a publish session is authenticated and is never
/// cleared on stream end; it doubles as the lookup key for recently-ended
/// streams. `is_live == true` implies both `stream_id` and `stream_started`
/// are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamKeyRecord {
    pub id: KeyId,
    pub hive_account: String,
    /// Secret publish credential (64 hex chars).
    pub stream_key: String,
    /// Ingest session id of the current or most recent live session.
    pub stream_id: Option<StreamId>,
    /// Credential revocation flag.
    pub is_active: bool,
    pub is_live: bool,
    pub viewer_count: i64,
    pub stream_started: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamKeyRecord {
    /// Column list matching [`StreamKeyRecord::from_row`]. Keep in sync.
    pub const COLUMNS: &'static str = "id, hive_account, stream_key, stream_id, is_active, \
         is_live, viewer_count, stream_started, last_used, title, description, language, \
         category, created_at, updated_at";

    /// Map a row selected with [`StreamKeyRecord::COLUMNS`] into a record.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: KeyId::from(
                Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_else(|_| Uuid::nil()),
            ),
            hive_account: row.get(1)?,
            stream_key: row.get(2)?,
            stream_id: row.get::<_, Option<String>>(3)?.map(StreamId::from),
            is_active: row.get(4)?,
            is_live: row.get(5)?,
            viewer_count: row.get(6)?,
            stream_started: parse_ts(row.get::<_, Option<String>>(7)?),
            last_used: parse_ts(row.get::<_, Option<String>>(8)?),
            title: row.get(9)?,
            description: row.get(10)?,
            language: row.get(11)?,
            category: row.get(12)?,
            created_at: parse_ts(Some(row.get::<_, String>(13)?)).unwrap_or_else(Utc::now),
            updated_at: parse_ts(Some(row.get::<_, String>(14)?)).unwrap_or_else(Utc::now),
        })
    }

    /// Channel metadata view used by announcements and the public API.
    pub fn channel_info(&self) -> ChannelInfo {
        ChannelInfo {
            hive_account: self.hive_account.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            language: self.language.clone(),
            category: self.category.clone(),
        }
    }
}

fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
