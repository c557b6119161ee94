use crate::config::{ProxyConfig, ReasoningConfig};
use crate::error::ProxyError;
use crate::logging::{RequestLogger, SharedLogger};
use crate::models::{model_list, resolve_model};
use crate::proxy::{self, ProxyResult, SseStream};
use crate::translate::types::{ChatCompletionRequest, ChatErrorResponse, ModelList};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Per-request override for reasoning display.
pub const SHOW_REASONING_HEADER: &str = "x-show-reasoning";
/// Per-request override for backend thinking mode.
pub const THINKING_MODE_HEADER: &str = "x-thinking-mode";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
    pub logger: SharedLogger,
    /// Unix seconds, reported as `created` in the model list.
    pub started_at: i64,
}

impl AppState {
    pub fn new(config: ProxyConfig, client: reqwest::Client, logger: SharedLogger) -> Self {
        Self {
            config,
            client,
            logger,
            started_at: chrono::Utc::now().timestamp(),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(handle_chat_completions))
        .route("/v1/models", get(handle_models))
        .route("/health", get(handle_health))
        .fallback(handle_not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let logger = state
        .logger
        .for_request(uuid::Uuid::new_v4().simple().to_string());

    let req: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            logger.error("server", format!("Failed to parse request: {}", e));
            return error_response(&ProxyError::invalid_request(format!(
                "could not parse body: {}",
                e
            )));
        }
    };

    let resolved = match resolve_model(&state.config, &req.model) {
        Ok(m) => m,
        Err(e) => {
            logger.warn("server", e.to_string());
            return error_response(&e);
        }
    };

    let reasoning = state.config.reasoning.with_overrides(
        header_flag(&headers, SHOW_REASONING_HEADER),
        header_flag(&headers, THINKING_MODE_HEADER),
    );
    let is_streaming = req.stream.unwrap_or(false);

    logger.info(
        "server",
        format!(
            "Request: model={} backend_model={} streaming={} messages={} show_reasoning={} thinking={}",
            req.model,
            resolved.backend_name(),
            is_streaming,
            req.messages.len(),
            reasoning.show,
            reasoning.thinking_mode
        ),
    );

    if is_streaming {
        handle_streaming(&state, &req, resolved.backend_name(), reasoning, &logger).await
    } else {
        handle_non_streaming(&state, &req, resolved.backend_name(), reasoning, &logger).await
    }
}

async fn handle_non_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    backend_model: &str,
    reasoning: ReasoningConfig,
    logger: &RequestLogger,
) -> Response {
    let result = proxy::proxy_non_streaming(
        req,
        backend_model,
        reasoning,
        &state.config,
        &state.client,
        logger,
    )
    .await;

    match result {
        Ok(ProxyResult::Success(resp)) => Json(resp).into_response(),
        Ok(ProxyResult::Error(err, status)) => relay_error(err, status),
        Err(e) => {
            logger.error("server", format!("Proxy error: {}", e));
            error_response(&e)
        }
    }
}

async fn handle_streaming(
    state: &AppState,
    req: &ChatCompletionRequest,
    backend_model: &str,
    reasoning: ReasoningConfig,
    logger: &RequestLogger,
) -> Response {
    let result = proxy::proxy_streaming(
        req,
        backend_model,
        reasoning,
        &state.config,
        &state.client,
        logger,
    )
    .await;

    match result {
        Ok(ProxyResult::Success(stream)) => sse_response(stream),
        Ok(ProxyResult::Error(err, status)) => relay_error(err, status),
        Err(e) => {
            logger.error("server", format!("Streaming setup error: {}", e));
            error_response(&e)
        }
    }
}

/// Commit event-stream headers and hand the frame stream to the body.
fn sse_response(stream: SseStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("x-accel-buffering", "no")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn relay_error(err: ChatErrorResponse, status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(err)).into_response()
}

fn error_response(err: &ProxyError) -> Response {
    relay_error(err.to_response(), err.status_code())
}

/// Parse a boolean override header. Unknown values are ignored.
fn header_flag(headers: &HeaderMap, name: &str) -> Option<bool> {
    let value = headers.get(name)?.to_str().ok()?.trim().to_ascii_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.config.backend.name,
        "reasoning_display": state.config.reasoning.show,
        "thinking_mode": state.config.reasoning.thinking_mode
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(model_list(&state.config, state.started_at))
}

async fn handle_not_found(method: Method, uri: Uri) -> Response {
    let err = ChatErrorResponse::new(
        "invalid_request_error",
        format!("Endpoint {} {} not found", method, uri.path()),
        Some(404.into()),
    );
    (StatusCode::NOT_FOUND, Json(err)).into_response()
}
