use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use think_proxy::config::{
    BackendConfig, DefaultsConfig, ParamsConfig, ProxyConfig, ReasoningConfig,
};
use think_proxy::{build_router, AppState, SharedLogger, StreamTranscoder, TranscoderOptions};

const API_KEY_ENV: &str = "THINK_PROXY_TEST_KEY";

// ────────────────────────────────────────────────────────────────
// Transcoder properties (no network)
// ────────────────────────────────────────────────────────────────

fn delta_line(delta: Value) -> String {
    format!("data: {}\n\n", json!({"choices": [{"index": 0, "delta": delta}]}))
}

fn run_transcoder(input: &[&[u8]], show_reasoning: bool) -> Vec<String> {
    let mut transcoder = StreamTranscoder::new(TranscoderOptions { show_reasoning });
    let mut frames = Vec::new();
    for chunk in input {
        frames.extend(transcoder.push_chunk(chunk));
    }
    frames.extend(transcoder.finish());
    frames
}

fn contents(frames: &[String]) -> Vec<String> {
    frames
        .iter()
        .filter_map(|f| f.strip_prefix("data: ")?.strip_suffix("\n\n"))
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .filter_map(|v| v["choices"][0]["delta"]["content"].as_str().map(String::from))
        .collect()
}

#[test]
fn test_reasoning_scenario_end_to_end() {
    let input = format!(
        "{}{}data: [DONE]\n\n",
        delta_line(json!({"reasoning_content": "ab"})),
        delta_line(json!({"content": "X"}))
    );
    let frames = run_transcoder(&[input.as_bytes()], true);

    assert_eq!(contents(&frames), vec!["<think>\nab", "\n</think>\n\nX"]);
    assert_eq!(frames.last().map(String::as_str), Some("data: [DONE]\n\n"));
}

#[test]
fn test_split_boundary_invariance() {
    let input = format!(
        "{}{}{}: comment\n\ndata: {{broken\n\n{}data: [DONE]\n\n",
        delta_line(json!({"role": "assistant", "content": ""})),
        delta_line(json!({"reasoning_content": "über "})),
        delta_line(json!({"reasoning_content": "denken"})),
        delta_line(json!({"content": "fertig"}))
    );
    let bytes = input.as_bytes();
    let whole = run_transcoder(&[bytes], true);

    for split in 0..=bytes.len() {
        let (a, b) = bytes.split_at(split);
        assert_eq!(run_transcoder(&[a, b], true), whole, "split at byte {split}");
    }
}

#[test]
fn test_malformed_json_passes_through() {
    let frames = run_transcoder(&[b"data: {not json\ndata: [DONE]\n"], true);
    assert_eq!(frames, vec!["data: {not json\n\n", "data: [DONE]\n\n"]);
}

#[test]
fn test_think_markers_always_balance() {
    let kinds = [
        json!({"reasoning_content": "r"}),
        json!({"content": "c"}),
        json!({"reasoning_content": "r", "content": "c"}),
        json!({"role": "assistant"}),
    ];

    // Every sequence of up to four deltas, under each way a stream can end.
    let base = kinds.len();
    let mut sequences: Vec<Vec<usize>> = Vec::new();
    for len in 0..=4u32 {
        for n in 0..base.pow(len) {
            sequences.push((0..len).map(|i| n / base.pow(i) % base).collect());
        }
    }
    assert_eq!(sequences.len(), 1 + 4 + 16 + 64 + 256);

    for seq in &sequences {
        let body: String = seq.iter().map(|&k| delta_line(kinds[k].clone())).collect();

        for ending in ["done", "eof", "error"] {
            let mut t = StreamTranscoder::new(TranscoderOptions {
                show_reasoning: true,
            });
            let mut out: String = t.push_chunk(body.as_bytes()).concat();
            out += &match ending {
                "done" => t.push_chunk(b"data: [DONE]\n\n").concat(),
                "eof" => t.finish().concat(),
                _ => t.fail("backend went away").concat(),
            };

            assert_eq!(
                out.matches("<think>").count(),
                out.matches("</think>").count(),
                "sequence {seq:?} ending {ending}"
            );
            assert_eq!(out.matches("[DONE]").count(), 1);
        }
    }
}

#[test]
fn test_hidden_reasoning_always_has_content_field() {
    let input = [
        delta_line(json!({"reasoning_content": "r"})),
        delta_line(json!({"reasoning_content": "r", "content": "c"})),
        delta_line(json!({})),
        delta_line(json!({"content": null})),
    ]
    .concat();
    let frames = run_transcoder(&[input.as_bytes()], false);

    let events: Vec<Value> = frames
        .iter()
        .filter_map(|f| f.strip_prefix("data: ")?.strip_suffix("\n\n"))
        .filter_map(|p| serde_json::from_str(p).ok())
        .collect();
    assert_eq!(events.len(), 4);
    for event in &events {
        let delta = &event["choices"][0]["delta"];
        assert!(delta["content"].is_string(), "content missing in {event}");
        assert!(delta.get("reasoning_content").is_none());
    }
    assert_eq!(contents(&frames), vec!["", "c", "", ""]);
}

// ────────────────────────────────────────────────────────────────
// End-to-end through the HTTP server with a mock backend
// ────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MockBackend {
    last_request: Arc<Mutex<Option<Value>>>,
    sse_body: Arc<String>,
}

async fn mock_completions(State(mock): State<MockBackend>, Json(body): Json<Value>) -> Response {
    *mock.last_request.lock().unwrap() = Some(body.clone());

    if body["model"] == "broken-model" {
        let err = json!({"error": {"message": "model is overloaded", "type": "server_error"}});
        return (StatusCode::SERVICE_UNAVAILABLE, Json(err)).into_response();
    }

    if body["stream"] == true {
        return Response::builder()
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(axum::body::Body::from(mock.sse_body.as_str().to_owned()))
            .unwrap();
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1,
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "4",
                "reasoning_content": "2 + 2"
            },
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    }))
    .into_response()
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start(sse_body: &str, show: bool) -> (String, MockBackend) {
    std::env::set_var(API_KEY_ENV, "test-key");

    let mock = MockBackend {
        last_request: Arc::default(),
        sse_body: Arc::new(sse_body.to_string()),
    };
    let backend_url = serve(
        Router::new()
            .route("/v1/chat/completions", post(mock_completions))
            .with_state(mock.clone()),
    )
    .await;

    let mut models = HashMap::new();
    models.insert("gpt-4o".to_string(), "deepseek-ai/deepseek-r1".to_string());
    let config = ProxyConfig {
        port: 0,
        backend: BackendConfig {
            name: "mock".to_string(),
            base_url: Some(format!("{backend_url}/v1")),
            api_key_env: Some(API_KEY_ENV.to_string()),
        },
        models,
        allowed_models: vec!["broken-model".to_string()],
        reasoning: ReasoningConfig {
            show,
            thinking_mode: true,
        },
        defaults: DefaultsConfig::default(),
        params: ParamsConfig::default(),
    };
    let state = Arc::new(AppState::new(
        config,
        reqwest::Client::new(),
        SharedLogger::in_memory(),
    ));
    (serve(build_router(state)).await, mock)
}

fn backend_stream() -> String {
    format!(
        "{}{}{}data: [DONE]\n\n",
        delta_line(json!({"role": "assistant", "reasoning_content": "Let me "})),
        delta_line(json!({"reasoning_content": "think."})),
        delta_line(json!({"content": "Done."}))
    )
}

#[tokio::test]
async fn test_streaming_through_proxy() {
    let (proxy_url, mock) = start(&backend_stream(), true).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .json(&json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let headers = resp.headers().clone();
    assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let body = resp.text().await.unwrap();
    let frames: Vec<String> = body.split_inclusive("\n\n").map(String::from).collect();
    assert_eq!(
        contents(&frames),
        vec!["<think>\nLet me ", "think.", "\n</think>\n\nDone."]
    );
    assert!(body.ends_with("data: [DONE]\n\n"));
    assert!(!body.contains("reasoning_content"));

    let sent = mock.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(sent["model"], "deepseek-ai/deepseek-r1");
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["chat_template_kwargs"]["thinking"], true);
    assert_eq!(sent["max_tokens"], 9024);
}

#[tokio::test]
async fn test_header_overrides_hide_reasoning() {
    let (proxy_url, mock) = start(&backend_stream(), true).await;

    let body = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .header("x-show-reasoning", "false")
        .header("x-thinking-mode", "off")
        .json(&json!({"model": "gpt-4o", "messages": [], "stream": true}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames: Vec<String> = body.split_inclusive("\n\n").map(String::from).collect();
    assert_eq!(contents(&frames), vec!["", "", "Done."]);
    assert!(!body.contains("<think>"));

    let sent = mock.last_request.lock().unwrap().clone().unwrap();
    assert!(sent.get("chat_template_kwargs").is_none());
}

#[tokio::test]
async fn test_stream_without_done_is_closed_by_proxy() {
    let unfinished = delta_line(json!({"reasoning_content": "still going"}));
    let (proxy_url, _) = start(&unfinished, true).await;

    let body = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "messages": [], "stream": true}))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames: Vec<String> = body.split_inclusive("\n\n").map(String::from).collect();
    assert_eq!(contents(&frames), vec!["<think>\nstill going", "\n</think>"]);
    assert!(body.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn test_non_streaming_wraps_reasoning() {
    let (proxy_url, _) = start("", true).await;

    let resp: Value = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .json(&json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "2+2"}]}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["model"], "gpt-4o");
    assert_eq!(
        resp["choices"][0]["message"]["content"],
        "<think>\n2 + 2\n</think>\n\n4"
    );
    assert!(resp["choices"][0]["message"].get("reasoning_content").is_none());
    assert_eq!(resp["usage"]["total_tokens"], 7);
}

#[tokio::test]
async fn test_backend_error_is_relayed() {
    let (proxy_url, _) = start("", true).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .json(&json!({"model": "broken-model", "messages": [], "stream": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["message"], "model is overloaded");
}

#[tokio::test]
async fn test_unknown_model_is_rejected() {
    let (proxy_url, mock) = start("", true).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .json(&json!({"model": "claude-3-opus", "messages": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "model_not_found");
    assert!(mock.last_request.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_invalid_body_is_bad_request() {
    let (proxy_url, _) = start("", true).await;

    let resp = reqwest::Client::new()
        .post(format!("{proxy_url}/v1/chat/completions"))
        .header("content-type", "application/json")
        .body("{\"messages\": ")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn test_models_health_and_fallback() {
    let (proxy_url, _) = start("", true).await;
    let client = reqwest::Client::new();

    let models: Value = client
        .get(format!("{proxy_url}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["broken-model", "gpt-4o"]);

    let health: Value = client
        .get(format!("{proxy_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["reasoning_display"], true);
    assert_eq!(health["thinking_mode"], true);

    let missing = client
        .get(format!("{proxy_url}/v1/engines"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["message"], "Endpoint GET /v1/engines not found");
    assert_eq!(body["error"]["code"], 404);
}
