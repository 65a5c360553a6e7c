use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use spotify_remote_rs::{AuthClient, DeviceReconciler, PlaybackClient, SessionError};

const STATE: &str = "shared-secret";
const BOT_NAME: &str = "music-bot";

async fn reconciler_with(
    server: &MockServer,
    attempts: u32,
    poll_interval: Duration,
) -> DeviceReconciler {
    let http = Arc::new(reqwest::Client::new());
    let auth = Arc::new(AuthClient::new(http.clone(), &server.uri(), STATE, &server.uri()));

    Mock::given(method("GET"))
        .and(path(format!("/access-token/{}", STATE)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "warm-token",
            "refresh_token": "warm-refresh"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/tracks/2TpxZ7JUBn3uw46aR7qd6V"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "probe" })))
        .mount(server)
        .await;
    auth.current_credential().await.unwrap();

    let client = Arc::new(PlaybackClient::new(http, &server.uri(), auth, 50));
    DeviceReconciler::new(client, BOT_NAME, poll_interval, attempts)
}

async fn reconciler(server: &MockServer, attempts: u32) -> DeviceReconciler {
    reconciler_with(server, attempts, Duration::from_millis(10)).await
}

fn device_list(bot_active: bool) -> serde_json::Value {
    json!({
        "devices": [
            { "id": "tv", "name": "Living Room TV", "is_active": !bot_active },
            { "id": "bot-id", "name": BOT_NAME, "is_active": bot_active }
        ]
    })
}

#[tokio::test]
async fn test_absent_bot_device_is_none_not_an_error() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 3).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .mount(&server)
        .await;

    assert_eq!(reconciler.bot_device_id().await.unwrap(), None);
}

#[tokio::test]
async fn test_switch_transfers_when_bot_is_inactive() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 3).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_list(false)))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/me/player"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    reconciler.switch_to_device().await.unwrap();
}

#[tokio::test]
async fn test_switch_is_a_noop_when_bot_is_already_active() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 3).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_list(true)))
        .mount(&server)
        .await;
    // A redundant transfer would interrupt audio.
    Mock::given(method("PUT"))
        .and(path("/me/player"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    reconciler.switch_to_device().await.unwrap();
}

#[tokio::test]
async fn test_switch_fails_when_bot_never_registered() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 3).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [ { "id": "tv", "name": "Living Room TV", "is_active": true } ]
        })))
        .mount(&server)
        .await;

    assert!(matches!(
        reconciler.switch_to_device().await,
        Err(SessionError::DeviceNotRegistered(name)) if name == BOT_NAME
    ));
}

#[tokio::test]
async fn test_registration_wait_succeeds_on_a_later_poll() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 5).await;

    // Empty on the first two polls, registered on the third.
    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_list(false)))
        .mount(&server)
        .await;

    let id = reconciler.wait_for_registration().await.unwrap();
    assert_eq!(id, "bot-id");
}

#[tokio::test]
async fn test_registration_wait_gives_up_after_the_last_attempt() {
    let server = MockServer::start().await;
    let reconciler = reconciler(&server, 3).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .expect(3)
        .mount(&server)
        .await;

    assert!(matches!(
        reconciler.wait_for_registration().await,
        Err(SessionError::DecoderTimeout)
    ));
}

#[tokio::test]
async fn test_registration_timeout_reports_without_a_trailing_sleep() {
    let server = MockServer::start().await;
    let reconciler = reconciler_with(&server, 3, Duration::from_millis(100)).await;

    Mock::given(method("GET"))
        .and(path("/me/player/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "devices": [] })))
        .expect(3)
        .mount(&server)
        .await;

    // Three attempts separated by two 100 ms sleeps; a sleep after the
    // final attempt would push this past 300 ms.
    let started = std::time::Instant::now();
    assert!(matches!(
        reconciler.wait_for_registration().await,
        Err(SessionError::DecoderTimeout)
    ));
    assert!(
        started.elapsed() < Duration::from_millis(290),
        "timeout took {:?}, which includes a sleep after the last attempt",
        started.elapsed()
    );
}
