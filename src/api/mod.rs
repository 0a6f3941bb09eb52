//! Local HTTP control surface
//!
//! Health, version, a state snapshot, a Server-Sent Events stream of channel
//! changes, config read/validate/replace, serial port switching, and
//! simulated button presses / slider moves.
//! Default: http://127.0.0.1:8765

use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::capabilities::Capabilities;
use crate::config::AppConfig;
use crate::control::DeckControl;
use crate::deck::{BUTTON_COUNT, SLIDER_COUNT, SLIDER_MAX};
use crate::events::{EventHub, StateChangeEvent, Subscription};
use crate::link::SerialStatus;
use crate::ports::{list_ports, PortInfo};

/// Default API port
pub const DEFAULT_API_PORT: u16 = 8765;

/// Version of the HTTP surface, bumped on breaking route changes
pub const API_VERSION: &str = "1.0.0";

/// How often an idle event stream checks for disconnect and shutdown
const PUMP_SLICE: Duration = Duration::from_millis(250);

/// Shared state for API handlers
pub struct ApiState {
    /// Live config, mapping and serial link
    pub control: Arc<DeckControl>,
    pub hub: Arc<EventHub>,
    pub caps: Capabilities,
    /// Idle time before the event stream sends a heartbeat comment
    pub heartbeat: Duration,
    /// Ends every open event stream
    pub shutdown: CancellationToken,
}

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub serial: SerialStatus,
    pub has_sample: bool,
    pub sliders: [u16; SLIDER_COUNT],
    pub buttons: [bool; BUTTON_COUNT],
    pub button_mask: u8,
    pub mapping_revision: u64,
    pub subscribers: usize,
}

#[derive(Debug, Deserialize)]
pub struct SetSliderRequest {
    pub value: u16,
}

#[derive(Debug, Deserialize)]
pub struct SelectSerialRequest {
    #[serde(default)]
    pub port: String,
    /// Keeps the current baud rate when absent
    pub baud: Option<u32>,
}

/// API error response
#[derive(Debug, Serialize)]
struct ApiError {
    #[serde(skip)]
    status: StatusCode,
    error: String,
}

impl ApiError {
    fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }

    fn internal(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// What the event pump hands to an SSE connection
#[derive(Debug, Clone, PartialEq)]
enum StreamItem {
    Change(StateChangeEvent),
    Heartbeat,
}

/// Build the API router
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/version", get(version))
        .route("/api/state", get(get_state))
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/config/validate", put(validate_config))
        .route("/api/ports", get(get_ports))
        .route("/api/serial/select", post(select_serial))
        .route("/api/events", get(events_sse))
        .route("/api/buttons/:index/press", post(press_button))
        .route("/api/sliders/:index", post(set_slider))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /api/health - Health check endpoint
async fn health_check() -> &'static str {
    "ok"
}

/// GET /api/version
async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "app": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "api": API_VERSION,
    }))
}

/// GET /api/state - Latest stored frame plus serial status
async fn get_state(State(state): State<Arc<ApiState>>) -> Json<StateResponse> {
    let link = state.control.link();
    let frame_store = link.slot().store();
    let frame = frame_store.get();

    Json(StateResponse {
        serial: link.status(),
        has_sample: frame_store.has_sample(),
        sliders: *frame.sliders(),
        buttons: *frame.buttons(),
        button_mask: frame.button_mask(),
        mapping_revision: state.control.mapping().revision(),
        subscribers: state.hub.subscriber_count(),
    })
}

/// GET /api/config - Effective configuration (file plus command-line overrides)
async fn get_config(State(state): State<Arc<ApiState>>) -> Json<AppConfig> {
    Json(state.control.config())
}

/// PUT /api/config - Validate, save and apply a whole configuration.
///
/// The body is YAML or JSON (JSON is valid YAML).
async fn put_config(
    State(state): State<Arc<ApiState>>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let config =
        AppConfig::from_yaml(&body).map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;

    state
        .control
        .replace(config)
        .await
        .map_err(|e| ApiError::internal(format!("{:#}", e)))?;

    info!("Configuration replaced via API");
    Ok(Json(serde_json::json!({ "applied": true })))
}

/// PUT /api/config/validate - Check a configuration without applying it
async fn validate_config(body: String) -> Result<Json<serde_json::Value>, ApiError> {
    AppConfig::from_yaml(&body).map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;
    Ok(Json(serde_json::json!({ "valid": true })))
}

/// GET /api/ports - Serial ports present on the system
async fn get_ports() -> Result<Json<Vec<PortInfo>>, ApiError> {
    tokio::task::spawn_blocking(list_ports)
        .await
        .map_err(|e| ApiError::internal(format!("Port enumeration task failed: {}", e)))?
        .map(Json)
        .map_err(|e| ApiError::internal(format!("{:#}", e)))
}

/// POST /api/serial/select - Reconnect to another port and persist it
async fn select_serial(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SelectSerialRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let port = req.port.trim();
    if port.is_empty() {
        return Err(ApiError::bad_request("Missing port"));
    }
    let baud = req.baud.unwrap_or_else(|| state.control.config().serial.baud);

    state
        .control
        .select_serial(port, baud)
        .await
        .map_err(|e| ApiError::bad_request(format!("{:#}", e)))?;

    info!("Serial port switched to {} @ {} baud via API", port, baud);
    Ok(Json(serde_json::json!({ "ok": true, "port": port, "baud": baud })))
}

/// POST /api/buttons/:index/press - Run a button's actions as if pressed
async fn press_button(
    Path(index): Path<usize>,
    State(state): State<Arc<ApiState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if index >= BUTTON_COUNT {
        return Err(ApiError::bad_request(format!(
            "Invalid button index {} (0-{})",
            index,
            BUTTON_COUNT - 1
        )));
    }

    let mapping = state.control.mapping().mapping();
    let executor = state.control.mapping().executor();
    let caps = state.caps.clone();

    // actions may include delays
    tokio::task::spawn_blocking(move || executor.simulate_press(&mapping, &caps, index))
        .await
        .map_err(|e| ApiError::internal(format!("Button task failed: {}", e)))?;

    info!("Simulated press on button {}", index);
    Ok(Json(serde_json::json!({ "ok": true, "button": index })))
}

/// POST /api/sliders/:index - Move one slider of the stored frame to a raw value
async fn set_slider(
    Path(index): Path<usize>,
    State(state): State<Arc<ApiState>>,
    Json(req): Json<SetSliderRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mapping = state.control.mapping().mapping();
    let executor = state.control.mapping().executor();
    let stored = state.control.link().slot().store().get();

    if !executor.simulate_slider(&mapping, &state.caps, &stored, index, req.value) {
        return Err(ApiError::bad_request(format!(
            "Invalid slider {} / value {} (index 0-{}, value 0-{})",
            index,
            req.value,
            SLIDER_COUNT - 1,
            SLIDER_MAX
        )));
    }

    Ok(Json(serde_json::json!({ "ok": true, "slider": index, "value": req.value })))
}

/// GET /api/events - SSE stream of slider/button changes
async fn events_sse(
    State(state): State<Arc<ApiState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();
    let (tx, rx) = mpsc::channel(64);
    let heartbeat = state.heartbeat;
    let shutdown = state.shutdown.clone();

    debug!("Event stream client connected");
    tokio::task::spawn_blocking(move || pump_events(subscription, tx, heartbeat, shutdown));

    let stream = ReceiverStream::new(rx).filter_map(|item| match item {
        StreamItem::Change(change) => {
            let name = match &change {
                StateChangeEvent::SliderChanged { .. } => "slider",
                StateChangeEvent::ButtonChanged { .. } => "button",
            };
            match Event::default().event(name).json_data(&change) {
                Ok(event) => Some(Ok(event)),
                Err(e) => {
                    warn!("Dropping unserializable event: {}", e);
                    None
                }
            }
        }
        StreamItem::Heartbeat => Some(Ok(Event::default().comment("heartbeat"))),
    });

    Sse::new(stream)
}

/// Drain one subscription into an SSE connection until the client goes
/// away or the server shuts down. Runs on a blocking thread.
fn pump_events(
    subscription: Subscription,
    tx: mpsc::Sender<StreamItem>,
    heartbeat: Duration,
    shutdown: CancellationToken,
) {
    let mut last_sent = Instant::now();

    while !shutdown.is_cancelled() && !tx.is_closed() {
        let item = match subscription.pop_next(PUMP_SLICE.min(heartbeat)) {
            Some(change) => StreamItem::Change(change),
            None if last_sent.elapsed() >= heartbeat => StreamItem::Heartbeat,
            None => continue,
        };

        if tx.blocking_send(item).is_err() {
            break;
        }
        last_sent = Instant::now();
    }

    debug!("Event stream client disconnected");
}

/// Start the API server; runs until `shutdown` fires
pub async fn start_server(state: Arc<ApiState>, host: &str, port: u16) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server on {}", addr))?;
    info!("Starting API server on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{ConsoleBackend, MasterAudio};
    use crate::config::SerialOverrides;
    use crate::deck::ChannelFrame;
    use crate::link::tests::fake_link;
    use crate::pipeline::SharedMapping;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
serial: { port: COM1 }
mapping:
  sliders: [master]
  buttons: [null, null, "text:from api"]
"#;

    fn state() -> (Arc<ApiState>, Arc<ConsoleBackend>, TempDir) {
        let config = AppConfig::from_yaml(CONFIG).unwrap();
        let link = fake_link();
        link.slot().store().set(
            ChannelFrame::default()
                .with_slider(0, 500)
                .with_slider(1, 700)
                .with_button(3, true),
        );

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml").to_string_lossy().to_string();
        let mapping = Arc::new(SharedMapping::new(
            config.to_mapping().unwrap(),
            config.tuning(),
        ));
        let control = DeckControl::new(link, mapping, config, SerialOverrides::default(), path);

        let backend = Arc::new(ConsoleBackend::new());
        let state = Arc::new(ApiState {
            control: Arc::new(control),
            hub: Arc::new(EventHub::new()),
            caps: Capabilities::from_backend(backend.clone()),
            heartbeat: Duration::from_millis(50),
            shutdown: CancellationToken::new(),
        });
        (state, backend, dir)
    }

    fn json_request(method: &str, uri: &str, body: impl Into<String>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.into()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _, _dir) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_state_snapshot() {
        let (state, _, _dir) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/state").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["sliders"][1], 700);
        assert_eq!(json["buttons"][3], true);
        assert_eq!(json["button_mask"], 8);
        assert_eq!(json["has_sample"], true);
        assert_eq!(json["serial"]["running"], false);
        assert_eq!(json["serial"]["generation"], 0);
        assert_eq!(json["mapping_revision"], 0);
    }

    #[tokio::test]
    async fn test_press_button_runs_actions() {
        let (state, backend, _dir) = state();
        let response = build_router(state)
            .oneshot(
                Request::post("/api/buttons/2/press")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(backend.typed(), vec!["from api".to_string()]);
    }

    #[tokio::test]
    async fn test_press_button_out_of_range() {
        let (state, _, _dir) = state();
        let response = build_router(state)
            .oneshot(
                Request::post("/api/buttons/5/press")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_set_slider_goes_through_threshold() {
        let (state, backend, _dir) = state();
        let router = build_router(state);
        backend.set_volume(0.25).unwrap();

        let request = |value: u32| {
            json_request("POST", "/api/sliders/0", format!("{{\"value\": {}}}", value))
        };

        // 5 counts from the stored 500 is under the delta threshold
        let small = router.clone().oneshot(request(505)).await.unwrap();
        assert_eq!(small.status(), StatusCode::OK);
        assert_eq!(backend.volume().unwrap(), 0.25);

        let full = router.clone().oneshot(request(1023)).await.unwrap();
        assert_eq!(full.status(), StatusCode::OK);
        assert_eq!(backend.volume().unwrap(), 1.0);

        let too_big = router.oneshot(request(2000)).await.unwrap();
        assert_eq!(too_big.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_version() {
        let (state, _, _dir) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(json["api"], API_VERSION);
    }

    #[tokio::test]
    async fn test_get_config() {
        let (state, _, _dir) = state();
        let response = build_router(state)
            .oneshot(Request::get("/api/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["serial"]["port"], "COM1");
        assert_eq!(json["mapping"]["sliders"][0], "master");
    }

    #[tokio::test]
    async fn test_put_config_saves_and_applies() {
        let (state, _, _dir) = state();
        let router = build_router(state.clone());
        let body = r#"{"serial": {"port": "COM1"}, "mapping": {"sliders": [null, "spotify.exe"]}}"#;

        let response = router
            .oneshot(json_request("PUT", "/api/config", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["applied"], true);

        assert_eq!(state.control.mapping().revision(), 1);
        assert_eq!(state.control.mapping().mapping().slider(0), None);
        let saved = AppConfig::load(state.control.path()).await.unwrap();
        assert_eq!(saved, state.control.config());
    }

    #[tokio::test]
    async fn test_put_config_rejects_invalid() {
        let (state, _, _dir) = state();
        let router = build_router(state.clone());

        for body in ["{not json", r#"{"mapping": {"buttons": ["explode"]}}"#] {
            let response = router
                .clone()
                .oneshot(json_request("PUT", "/api/config", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        assert_eq!(state.control.mapping().revision(), 0);
        assert!(AppConfig::load(state.control.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_config_does_not_apply() {
        let (state, _, _dir) = state();
        let router = build_router(state.clone());

        let valid = r#"{"mapping": {"buttons": ["media:next"]}}"#;
        let response = router
            .clone()
            .oneshot(json_request("PUT", "/api/config/validate", valid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["valid"], true);

        let invalid = r#"{"mapping": {"buttons": ["delay:soon"]}}"#;
        let response = router
            .oneshot(json_request("PUT", "/api/config/validate", invalid))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(state.control.mapping().revision(), 0);
        assert!(AppConfig::load(state.control.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_select_serial() {
        let (state, _, _dir) = state();
        let router = build_router(state.clone());

        let select = r#"{"port": "COM7", "baud": 9600}"#;
        let response = router
            .clone()
            .oneshot(json_request("POST", "/api/serial/select", select))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.control.config().serial.port, "COM7");
        assert_eq!(state.control.link().status().generation, 1);
        let saved = AppConfig::load(state.control.path()).await.unwrap();
        assert_eq!(saved.serial.baud, 9600);

        let missing = router
            .clone()
            .oneshot(json_request("POST", "/api/serial/select", r#"{"baud": 9600}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let failing = router
            .oneshot(json_request("POST", "/api/serial/select", r#"{"port": "missing3"}"#))
            .await
            .unwrap();
        assert_eq!(failing.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.control.config().serial.port, "COM7");
    }

    #[tokio::test]
    async fn test_event_stream_heartbeat_comment() {
        let (state, _, _dir) = state();
        let shutdown = state.shutdown.clone();
        let response = build_router(state)
            .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8_lossy(&chunk);
        assert!(text.starts_with(':'), "unexpected frame: {:?}", text);
        assert!(text.contains("heartbeat"));

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_pump_forwards_events_and_heartbeats() {
        let hub = EventHub::new();
        let subscription = hub.subscribe();
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let change = StateChangeEvent::ButtonChanged {
            id: 0,
            pressed: true,
            previous: false,
            timestamp: 1,
        };
        hub.publish(&change);

        let pump = {
            let shutdown = shutdown.clone();
            tokio::task::spawn_blocking(move || {
                pump_events(subscription, tx, Duration::from_millis(20), shutdown)
            })
        };

        assert_eq!(rx.recv().await, Some(StreamItem::Change(change)));
        assert_eq!(rx.recv().await, Some(StreamItem::Heartbeat));

        shutdown.cancel();
        pump.await.unwrap();
    }

    #[tokio::test]
    async fn test_pump_stops_when_client_leaves() {
        let hub = EventHub::new();
        let subscription = hub.subscribe();
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        tokio::task::spawn_blocking(move || {
            pump_events(subscription, tx, Duration::from_secs(60), CancellationToken::new())
        })
        .await
        .unwrap();
        assert_eq!(hub.subscriber_count(), 0);
    }
}
