//! Integration tests for the public HTTP API: stream listing, stream
//! status, and channel management.

mod common;

use common::TestHarness;
use serde_json::Value;

#[tokio::test]
async fn health_check() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn stream_status_unknown_id_is_not_found() {
    let (_h, addr) = TestHarness::with_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/streams/ghost/status"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stream_status_ended_stream_is_not_found() {
    let (h, addr) = TestHarness::with_server().await;
    h.seed_account("alice", "abc123");
    h.publish("sess1", "abc123").await.unwrap();
    h.coordinator
        .publish_done(&hivecast_common::StreamId::new("sess1"))
        .await
        .unwrap();

    // Ended streams look exactly like unknown ones from the outside.
    let resp = reqwest::get(format!("http://{addr}/api/streams/sess1/status"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stream_status_reports_live_stream() {
    let (h, addr) = TestHarness::with_server().await;
    h.seed_account("alice", "abc123");
    {
        let conn = h.pool.get().unwrap();
        hivecast_db::queries::stream_keys::update_channel_info(
            &conn,
            &hivecast_common::ChannelInfo {
                hive_account: "alice".into(),
                title: Some("Morning show".into()),
                language: Some("EN_US".into()),
                ..Default::default()
            },
        )
        .unwrap();
    }
    h.publish("sess1", "abc123").await.unwrap();

    let resp = reqwest::get(format!("http://{addr}/api/streams/sess1/status"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["online"], true);
    assert_eq!(body["username"], "alice");
    assert_eq!(body["title"], "Morning show");
    assert_eq!(body["language"], "EN_US");
    assert_eq!(body["statistics"]["viewers"], 0);
    // The recording transcoder tracks an active job: health is good.
    assert_eq!(body["health"]["status"], "good");
    assert_eq!(body["quality"][0]["name"], "source");
    assert_eq!(body["quality"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn list_streams_filters_and_paginates() {
    let (h, addr) = TestHarness::with_server().await;
    for (account, lang) in [("alice", "EN_US"), ("bob", "DE_DE"), ("carol", "EN_US")] {
        h.seed_account(account, &format!("key-{account}"));
        let conn = h.pool.get().unwrap();
        hivecast_db::queries::stream_keys::update_channel_info(
            &conn,
            &hivecast_common::ChannelInfo {
                hive_account: account.into(),
                language: Some(lang.into()),
                ..Default::default()
            },
        )
        .unwrap();
        drop(conn);
        h.publish(&format!("sess-{account}"), &format!("key-{account}"))
            .await
            .unwrap();
    }
    // dave has a key but is offline.
    h.seed_account("dave", "key-dave");

    let resp = reqwest::get(format!("http://{addr}/api/streams"))
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["streams"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["total_streams"], 3);

    let resp = reqwest::get(format!("http://{addr}/api/streams?language=EN_US"))
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["streams"].as_array().unwrap().len(), 2);

    let resp = reqwest::get(format!("http://{addr}/api/streams?limit=2&page=2"))
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["streams"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["total_pages"], 2);
}

#[tokio::test]
async fn channel_key_issue_and_rotate() {
    let (_h, addr) = TestHarness::with_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{addr}/api/channels/alice/key"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let first_key = body["stream_key"].as_str().unwrap().to_string();
    assert_eq!(first_key.len(), 64);

    // Issuing again rotates the credential.
    let resp = client
        .post(format!("http://{addr}/api/channels/alice/key"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_ne!(body["stream_key"].as_str().unwrap(), first_key);
}

#[tokio::test]
async fn channel_metadata_update_and_fetch() {
    let (h, addr) = TestHarness::with_server().await;
    h.seed_account("alice", "abc123");
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("http://{addr}/api/channels/alice"))
        .json(&serde_json::json!({
            "title": "Evening news",
            "category": "news"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("http://{addr}/api/channels/alice"))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["title"], "Evening news");
    assert_eq!(body["category"], "news");
    assert_eq!(body["is_live"], false);
    // The credential never leaves through this route.
    assert!(body.get("stream_key").is_none());

    let resp = client
        .put(format!("http://{addr}/api/channels/ghost"))
        .json(&serde_json::json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
