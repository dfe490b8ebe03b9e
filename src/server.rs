//! HTTP and WebSocket front end.
//!
//! `/ws` streams `full-state` and `state-diff` events to each client and
//! answers trend requests sent over the same socket. The trend queries are
//! also exposed as plain JSON POST routes.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::broadcast::{ChannelBroadcaster, Snapshot, wire_snapshot};
use crate::error::TrendError;
use crate::store::StationStateStore;
use crate::trend::{
    CsvStore, DaySummary, HistoricalData, HistoryFilter, TrendData, TrendService,
};

const GREETING: &str = "Serving you fresh weather data throughout the day. Enjoy!";

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<StationStateStore>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub trends: Arc<TrendService<CsvStore>>,
}

#[derive(Debug, Deserialize)]
pub struct TrendRequest {
    pub station: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub station: String,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct HistoricalRequest {
    pub station: String,
    #[serde(default)]
    pub filter: HistoryFilter,
}

/// Requests a client may send over the WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event")]
enum ClientRequest {
    #[serde(rename = "fetch24HourTrend")]
    Trend(TrendRequest),
    #[serde(rename = "fetch24HourTrendLastYear")]
    TrendLastYear(TrendRequest),
    #[serde(rename = "searchByDate")]
    Search(SearchRequest),
    #[serde(rename = "fetchHistoricalData")]
    Historical(HistoricalRequest),
}

impl IntoResponse for TrendError {
    fn into_response(self) -> Response {
        if self.is_client_error() {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
        } else {
            error!(error = %self, "Trend query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Error querying data" })),
            )
                .into_response()
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { GREETING }))
        .route("/state", get(get_state))
        .route("/ws", get(ws_handler))
        .route("/fetch24HourTrend", post(post_trend))
        .route("/fetch24HourTrendLastYear", post(post_trend_last_year))
        .route("/searchByDate", post(post_search))
        .route("/fetchHistoricalData", post(post_historical))
        .layer(cors)
        .with_state(state)
}

/// Serves until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn get_state(State(state): State<AppState>) -> Json<Snapshot> {
    Json(wire_snapshot(&state.store))
}

async fn post_trend(
    State(state): State<AppState>,
    Json(req): Json<TrendRequest>,
) -> Result<Json<TrendData>, TrendError> {
    let data = state
        .trends
        .trend_24h(&req.station, &req.kind, Local::now().naive_local())
        .await?;
    Ok(Json(data))
}

async fn post_trend_last_year(
    State(state): State<AppState>,
    Json(req): Json<TrendRequest>,
) -> Result<Json<TrendData>, TrendError> {
    let data = state
        .trends
        .trend_24h_last_year(&req.station, &req.kind, Local::now().naive_local())
        .await?;
    Ok(Json(data))
}

async fn post_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<DaySummary>, TrendError> {
    let day = state.trends.search_by_date(&req.station, req.date).await?;
    Ok(Json(day))
}

async fn post_historical(
    State(state): State<AppState>,
    Json(req): Json<HistoricalRequest>,
) -> Result<Json<HistoricalData>, TrendError> {
    let data = state
        .trends
        .historical(&req.station, req.filter, Local::now().naive_local())
        .await?;
    Ok(Json(data))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let mut subscription = state.broadcaster.connect();
    debug!(
        subscribers = state.broadcaster.subscriber_count(),
        "WebSocket client connected"
    );

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let reply = answer(&state, text.as_str()).await;
                    if sink.send(Message::Text(reply.to_string().into())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
    }

    debug!("WebSocket client disconnected");
}

/// Runs a socket request and wraps the result as a `trendData` event.
async fn answer(state: &AppState, text: &str) -> Value {
    let now = Local::now().naive_local();
    let result = match serde_json::from_str::<ClientRequest>(text) {
        Ok(ClientRequest::Trend(req)) => state
            .trends
            .trend_24h(&req.station, &req.kind, now)
            .await
            .map(|d| json!(d)),
        Ok(ClientRequest::TrendLastYear(req)) => state
            .trends
            .trend_24h_last_year(&req.station, &req.kind, now)
            .await
            .map(|d| json!(d)),
        Ok(ClientRequest::Search(req)) => state
            .trends
            .search_by_date(&req.station, req.date)
            .await
            .map(|d| json!(d)),
        Ok(ClientRequest::Historical(req)) => state
            .trends
            .historical(&req.station, req.filter, now)
            .await
            .map(|d| json!(d)),
        Err(e) => {
            debug!(error = %e, "Unrecognised client message");
            return json!({ "event": "trendData", "data": { "error": "Unrecognised request" } });
        }
    };

    let data = match result {
        Ok(data) => data,
        Err(e) if e.is_client_error() => json!({ "error": e.to_string() }),
        Err(e) => {
            error!(error = %e, "Trend query failed");
            json!({ "error": "Error querying data" })
        }
    };
    json!({ "event": "trendData", "data": data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freshness::Thresholds;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::{TimeZone, Utc};
    use tower::util::ServiceExt;

    fn state(history: &std::path::Path) -> AppState {
        let store = Arc::new(StationStateStore::new());
        AppState {
            broadcaster: Arc::new(ChannelBroadcaster::new(store.clone())),
            store,
            trends: Arc::new(TrendService::new(
                CsvStore::new(history),
                vec!["Skodje".to_string()],
            )),
        }
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_root_greeting() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_endpoint_returns_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let app_state = state(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        app_state.store.upsert("Skodje", |r| {
            r.mark_valid(Vec::new(), now, now, &Thresholds::default())
        });

        let response = router(app_state)
            .oneshot(Request::builder().uri("/state").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["Skodje"]["status"], json!("green"));
    }

    #[tokio::test]
    async fn test_trend_unknown_station_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fetch24HourTrend")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"station":"Atlantis","type":"temperature"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            json!("No database configuration found for station: Atlantis")
        );
    }

    #[tokio::test]
    async fn test_search_by_date_reads_history() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("station=Skodje");
        std::fs::create_dir_all(&day_dir).unwrap();
        std::fs::write(
            day_dir.join("date=2024-06-10.csv"),
            "date,time,temperature,daily_rainfall,max_gust_current_day\n\
             2024-06-10,10:00:00,4.5,0.4,18\n\
             2024-06-10,23:00:00,3.0,2.1,36\n",
        )
        .unwrap();

        let response = router(state(dir.path()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/searchByDate")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"station":"Skodje","date":"2024-06-10"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["maxGust"], json!("10.0"));
        assert_eq!(body["dailyRainfall"], json!("2.1"));
    }

    #[tokio::test]
    async fn test_historical_without_filter_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = router(state(dir.path()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fetchHistoricalData")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"station":"Skodje"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(
            body["error"],
            json!("Please specify at least one filter: last24hours, last30days, or last365days")
        );
    }

    #[tokio::test]
    async fn test_historical_reads_history() {
        let dir = tempfile::tempdir().unwrap();
        let day_dir = dir.path().join("station=Skodje");
        std::fs::create_dir_all(&day_dir).unwrap();
        let today = Local::now().date_naive();
        std::fs::write(
            day_dir.join(format!("date={today}.csv")),
            format!(
                "date,time,temperature,rain_rate,daily_rainfall,gust_windspeed\n\
                 {today},00:00:00,4.5,0.7,1.2,36\n"
            ),
        )
        .unwrap();

        let response = router(state(dir.path()))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/fetchHistoricalData")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"station":"Skodje","filter":{"last30days":true}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["station"], json!("Skodje"));
        assert_eq!(body["data"]["last30days"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["last30daysSummary"]["maxGust"], json!("10.0"));
        assert_eq!(body["data"]["last30daysSummary"]["maxRainRate"], json!("0.7"));
        assert!(body["data"].get("last24hours").is_none());
    }

    #[tokio::test]
    async fn test_socket_request_answers_trend_data() {
        let dir = tempfile::tempdir().unwrap();
        let app_state = state(dir.path());
        let reply = answer(
            &app_state,
            r#"{"event":"fetch24HourTrend","station":"Skodje","type":"snowfall"}"#,
        )
        .await;
        assert_eq!(reply["event"], json!("trendData"));
        assert_eq!(reply["data"]["error"], json!("Invalid type requested: snowfall"));
    }
}
