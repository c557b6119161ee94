use super::reasoning::wrap_complete;
use super::types::{ChatCompletionResponse, ChatErrorResponse};

/// Translate a complete backend response into the client-facing response.
/// Pure function: `client_model` is the model name the client asked for.
pub fn backend_to_client(
    mut resp: ChatCompletionResponse,
    client_model: &str,
    show_reasoning: bool,
) -> ChatCompletionResponse {
    for choice in &mut resp.choices {
        let message = &mut choice.message;
        let reasoning = message.reasoning_content.take();
        message.content = Some(wrap_complete(
            reasoning.as_deref(),
            message.content.as_deref(),
            show_reasoning,
        ));
    }

    resp.object = "chat.completion".to_string();
    resp.model = client_model.to_string();
    resp
}

/// Normalise a backend error body into the OpenAI error shape.
///
/// Falls back to a generic `api_error` carrying the status and a prefix of
/// the raw body when the backend did not send a JSON error object.
pub fn backend_error_to_client(status: u16, body: &str) -> ChatErrorResponse {
    if let Ok(mut err) = serde_json::from_str::<ChatErrorResponse>(body) {
        if err.error.error_type.is_empty() {
            err.error.error_type = error_type_for_status(status).to_string();
        }
        return err;
    }

    ChatErrorResponse::new(
        error_type_for_status(status),
        format!("Backend returned status {}: {}", status, truncate(body, 500)),
        Some(status.into()),
    )
}

fn error_type_for_status(status: u16) -> &'static str {
    match status {
        400 | 404 | 422 => "invalid_request_error",
        401 | 403 => "authentication_error",
        429 => "rate_limit_error",
        _ => "api_error",
    }
}

/// Cut `s` to at most `max` bytes on a char boundary.
pub fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
