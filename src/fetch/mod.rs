//! Station data source: one HTTP GET per station, JSON object body.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use serde_json::Value;
use std::time::Duration;

use crate::error::FetchError;
use crate::validator::RawPayload;

/// Fetches and decodes one station payload.
///
/// The whole exchange (connect, headers, body) is bounded by `timeout`.
/// Non-2xx responses and bodies that are not JSON objects are errors.
pub async fn fetch_payload<C: HttpClient>(
    client: &C,
    url: &str,
    timeout: Duration,
) -> Result<RawPayload, FetchError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    tokio::time::timeout(timeout, exchange(client, req))
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
}

async fn exchange<C: HttpClient>(
    client: &C,
    req: reqwest::Request,
) -> Result<RawPayload, FetchError> {
    let resp = client.execute(req).await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status));
    }

    match resp.json::<Value>().await? {
        Value::Object(map) => Ok(map),
        _ => Err(FetchError::NotAnObject),
    }
}
