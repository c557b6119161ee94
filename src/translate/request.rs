//! Translate client Chat Completions requests into backend requests.
//!
//! The backend model name is resolved before translation. Sampling defaults
//! are filled in, unwanted parameters are dropped, and thinking mode is
//! requested through `chat_template_kwargs`.

use serde_json::json;

use super::types::{BackendRequest, ChatCompletionRequest};

/// Per-request knobs that shape the backend request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub default_temperature: f64,
    pub default_max_tokens: u64,
    /// Ask the backend chat template to emit reasoning.
    pub thinking_mode: bool,
    /// Client parameters never forwarded to the backend.
    pub drop_params: Vec<String>,
}

/// Translate a client request into the backend request.
/// Pure function: `backend_model` is the already-resolved target model.
pub fn client_to_backend(
    req: &ChatCompletionRequest,
    backend_model: &str,
    options: &RequestOptions,
) -> BackendRequest {
    let mut extra = req.extra.clone();
    for param in &options.drop_params {
        extra.remove(param);
    }
    // Set explicitly below, a passthrough copy would clash when flattened.
    let client_kwargs = extra.remove("chat_template_kwargs");

    let chat_template_kwargs = if options.thinking_mode {
        let mut kwargs = client_kwargs
            .and_then(|v| v.as_object().cloned())
            .unwrap_or_default();
        kwargs.insert("thinking".to_string(), json!(true));
        Some(serde_json::Value::Object(kwargs))
    } else {
        client_kwargs
    };

    BackendRequest {
        model: backend_model.to_string(),
        messages: req.messages.clone(),
        temperature: req.temperature.unwrap_or(options.default_temperature),
        max_tokens: req.max_tokens.unwrap_or(options.default_max_tokens),
        stream: req.stream.unwrap_or(false),
        chat_template_kwargs,
        extra,
    }
}
