//! Station data source behaviour against a mock HTTP server.

use serde_json::json;
use std::time::Duration;
use weather_relay::error::FetchError;
use weather_relay::fetch::{BasicClient, fetch_payload};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_fetch_json_object() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "temperature": 5.2, "date": "14:30" })),
        )
        .mount(&mock_server)
        .await;

    let client = BasicClient::new().unwrap();
    let url = format!("{}/wx.json", mock_server.uri());
    let payload = fetch_payload(&client, &url, Duration::from_secs(5))
        .await
        .expect("fetch should succeed");

    assert_eq!(payload["temperature"], json!(5.2));
    assert_eq!(payload["date"], json!("14:30"));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wx.json"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BasicClient::new().unwrap();
    let url = format!("{}/wx.json", mock_server.uri());
    let result = fetch_payload(&client, &url, Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::Status(s)) if s.as_u16() == 503));
}

#[tokio::test]
async fn test_array_body_is_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2, 3])))
        .mount(&mock_server)
        .await;

    let client = BasicClient::new().unwrap();
    let result = fetch_payload(&client, &mock_server.uri(), Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::NotAnObject)));
}

#[tokio::test]
async fn test_malformed_body_is_an_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&mock_server)
        .await;

    let client = BasicClient::new().unwrap();
    let result = fetch_payload(&client, &mock_server.uri(), Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::Transport(_))));
}

#[tokio::test]
async fn test_slow_station_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "date": "14:30" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let client = BasicClient::new().unwrap();
    let result = fetch_payload(&client, &mock_server.uri(), Duration::from_millis(200)).await;

    assert!(matches!(result, Err(FetchError::Timeout(_))));
}

#[tokio::test]
async fn test_invalid_url() {
    let client = BasicClient::new().unwrap();
    let result = fetch_payload(&client, "not a url", Duration::from_secs(1)).await;
    assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
}
