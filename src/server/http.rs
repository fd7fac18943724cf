//! REST Front-End
//!
//! JSON routes over the same engine, plus a WebSocket bridge for pub/sub.
//! Responses follow the `{success, value?, error?, count?}` shape on every
//! path; CORS is wide open and OPTIONS preflights short-circuit.

use std::io;
use std::time::Duration;

use axum::{
    extract::{
        rejection::JsonRejection,
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::AppState;
use crate::config::parse_duration;

pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self, listener: TcpListener) -> io::Result<()> {
        info!(addr = %listener.local_addr()?, "rest front-end listening");
        axum::serve(listener, router(self.state)).await
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/cache/{key}",
            put(set_value).get(get_value).delete(delete_value),
        )
        .route("/list/{key}", post(list_push).delete(list_pop))
        .route("/set/{key}", post(set_add).get(set_members))
        .route("/hash/{key}/{field}", put(hash_set).get(hash_get))
        .route("/subscribe/{channel}", get(subscribe_ws))
        .route("/publish/{channel}", post(publish_message))
        .route("/eval", post(eval_script))
        .route("/info", get(info_endpoint))
        .route("/ping", get(ping))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ApiResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn ok() -> ApiResult {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            value: None,
            error: None,
            count: None,
        }),
    )
}

fn ok_value(value: serde_json::Value) -> ApiResult {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            value: Some(value),
            error: None,
            count: None,
        }),
    )
}

fn ok_count(count: usize) -> ApiResult {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            value: None,
            error: None,
            count: Some(count),
        }),
    )
}

fn err(status: StatusCode, message: &str) -> ApiResult {
    (
        status,
        Json(ApiResponse {
            success: false,
            value: None,
            error: Some(message.to_string()),
            count: None,
        }),
    )
}

#[derive(Debug, Deserialize)]
struct CacheRequest {
    value: String,
    #[serde(default)]
    ttl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PublishRequest {
    message: String,
}

#[derive(Debug, Deserialize)]
struct EvalRequest {
    script: String,
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
}

/// Parse the optional ttl field of a request body. Unlike the text
/// protocol, a malformed literal here is a client error.
fn parse_ttl(ttl: Option<&str>) -> Result<Duration, ()> {
    match ttl {
        None | Some("") => Ok(Duration::ZERO),
        Some(literal) => parse_duration(literal).map_err(|_| ()),
    }
}

async fn set_value(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<CacheRequest>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(req)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    let Ok(ttl) = parse_ttl(req.ttl.as_deref()) else {
        return err(StatusCode::BAD_REQUEST, "Invalid TTL format");
    };

    state.cache.set(&key, Bytes::from(req.value), ttl);
    ok()
}

async fn get_value(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    match state.cache.get(&key) {
        Some(v) => ok_value(json!(String::from_utf8_lossy(&v).into_owned())),
        None => err(StatusCode::NOT_FOUND, "Key not found"),
    }
}

async fn delete_value(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    state.cache.delete(&key);
    ok()
}

async fn list_push(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(values)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON array");
    };
    ok_count(state.cache.lpush(&key, &values))
}

async fn list_pop(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    match state.cache.lpop(&key) {
        Some(v) => ok_value(json!(v)),
        None => err(StatusCode::NOT_FOUND, "List empty or not found"),
    }
}

async fn set_add(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<Vec<String>>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(members)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON array");
    };
    ok_count(state.cache.sadd(&key, &members))
}

async fn set_members(State(state): State<AppState>, Path(key): Path<String>) -> ApiResult {
    ok_value(json!(state.cache.smembers(&key)))
}

async fn hash_set(
    State(state): State<AppState>,
    Path((key, field)): Path<(String, String)>,
    payload: Result<Json<CacheRequest>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(req)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    state.cache.hset(&key, &field, &req.value);
    ok()
}

async fn hash_get(
    State(state): State<AppState>,
    Path((key, field)): Path<(String, String)>,
) -> ApiResult {
    match state.cache.hget(&key, &field) {
        Some(v) => ok_value(json!(v)),
        None => err(StatusCode::NOT_FOUND, "Field not found"),
    }
}

async fn publish_message(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(req)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    ok_count(state.cache.publish(&channel, &req.message))
}

async fn eval_script(
    State(state): State<AppState>,
    payload: Result<Json<EvalRequest>, JsonRejection>,
) -> ApiResult {
    let Ok(Json(req)) = payload else {
        return err(StatusCode::BAD_REQUEST, "Invalid JSON");
    };
    match &state.script {
        Some(engine) => ok_value(json!(engine.eval(&req.script, &req.keys, &req.args))),
        None => err(StatusCode::BAD_REQUEST, "Lua scripting disabled"),
    }
}

async fn info_endpoint(State(state): State<AppState>) -> ApiResult {
    ok_value(json!({
        "keys": state.cache.len(),
        "replicas": 0,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.metrics.uptime().as_secs(),
    }))
}

async fn ping() -> ApiResult {
    ok_value(json!("PONG"))
}

async fn subscribe_ws(
    ws: WebSocketUpgrade,
    Path(channel): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_subscription(socket, channel, state))
}

/// Bridge a WebSocket to a pub/sub sink: each published frame becomes one
/// text frame. The socket is held open until the client goes away.
async fn handle_subscription(socket: WebSocket, channel: String, state: AppState) {
    let id = state.cache.pubsub().next_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    state.cache.subscribe(&channel, id, tx);
    debug!(channel, subscriber = id, "websocket subscribed");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = String::from_utf8_lossy(&frame).into_owned();
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_)) = stream.next().await {}

    state.cache.pubsub().unsubscribe_all(id);
    send_task.abort();
    debug!(channel, subscriber = id, "websocket unsubscribed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_shape_omits_empty_fields() {
        let (_, Json(body)) = ok();
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"success":true}"#);

        let (_, Json(body)) = ok_count(3);
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"success":true,"count":3}"#
        );

        let (status, Json(body)) = err(StatusCode::NOT_FOUND, "Key not found");
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"success":false,"error":"Key not found"}"#
        );
    }

    #[test]
    fn test_parse_ttl_body_field() {
        assert_eq!(parse_ttl(None), Ok(Duration::ZERO));
        assert_eq!(parse_ttl(Some("")), Ok(Duration::ZERO));
        assert_eq!(parse_ttl(Some("100ms")), Ok(Duration::from_millis(100)));
        assert_eq!(parse_ttl(Some("5m")), Ok(Duration::from_secs(300)));
        assert!(parse_ttl(Some("banana")).is_err());
    }
}
