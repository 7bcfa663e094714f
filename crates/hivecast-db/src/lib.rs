//! SQLite record store for hivecast.
//!
//! One table carries the whole persistent state: `stream_keys`, one row per
//! Hive account, holding the publish credential, the live-session fields the
//! coordinator mutates, and the channel metadata shown by the public API.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

pub use models::StreamKeyRecord;
pub use pool::{get_conn, init_memory_pool, init_pool, DbPool, PooledConnection};
