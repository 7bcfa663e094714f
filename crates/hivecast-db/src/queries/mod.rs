//! Query modules for the hivecast record store.

pub mod stream_keys;
