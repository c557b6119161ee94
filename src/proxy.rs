use crate::config::{ProxyConfig, ReasoningConfig};
use crate::error::{ProxyError, Result};
use crate::logging::RequestLogger;
use crate::translate::request::client_to_backend;
use crate::translate::response::{backend_error_to_client, backend_to_client, truncate};
use crate::translate::streaming::{StreamTranscoder, TranscoderOptions};
use crate::translate::types::{
    BackendRequest, ChatCompletionRequest, ChatCompletionResponse, ChatErrorResponse,
};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::fmt::Display;
use std::pin::Pin;

/// Outcome of a proxied call: either the translated payload or an error body
/// to relay with the backend's status code.
pub enum ProxyResult<T> {
    Success(T),
    Error(ChatErrorResponse, u16),
}

/// Outbound event-stream body: ready-to-write `data: ...\n\n` frames.
pub type SseStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send>>;

/// Forward a non-streaming request to the backend.
pub async fn proxy_non_streaming(
    req: &ChatCompletionRequest,
    backend_model: &str,
    reasoning: ReasoningConfig,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
) -> Result<ProxyResult<ChatCompletionResponse>> {
    let options = config.request_options(reasoning.thinking_mode);
    let mut backend_req = client_to_backend(req, backend_model, &options);
    backend_req.stream = false;

    let response = send_to_backend(&backend_req, config, client, logger).await?;

    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| {
        ProxyError::provider(format!("Failed to read response body: {}", e))
    })?;

    logger.debug(
        "proxy",
        format!("Response status={} body_len={}", status, body.len()),
    );

    if status >= 400 {
        let err = backend_error_to_client(status, &body);
        logger.warn("proxy", format!("Backend error: {}", err.error.message));
        return Ok(ProxyResult::Error(err, status));
    }

    let backend_resp: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| {
        ProxyError::translation(format!(
            "Failed to parse backend response: {}. Body: {}",
            e,
            truncate(&body, 300)
        ))
    })?;

    let resp = backend_to_client(backend_resp, &req.model, reasoning.show);

    if let Some(ref usage) = resp.usage {
        logger.info(
            "proxy",
            format!(
                "Completed: in={} out={} tokens",
                usage.prompt_tokens, usage.completion_tokens
            ),
        );
    }

    Ok(ProxyResult::Success(resp))
}

/// Forward a streaming request, returning the rewritten event stream.
///
/// Backend errors that arrive before the stream starts are returned as
/// [`ProxyResult::Error`] so the client gets a plain JSON error and status.
pub async fn proxy_streaming(
    req: &ChatCompletionRequest,
    backend_model: &str,
    reasoning: ReasoningConfig,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
) -> Result<ProxyResult<SseStream>> {
    let options = config.request_options(reasoning.thinking_mode);
    let mut backend_req = client_to_backend(req, backend_model, &options);
    backend_req.stream = true;

    let response = send_to_backend(&backend_req, config, client, logger).await?;

    let status = response.status().as_u16();
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        logger.warn(
            "proxy",
            format!("Streaming error status={}: {}", status, truncate(&body, 300)),
        );
        return Ok(ProxyResult::Error(backend_error_to_client(status, &body), status));
    }

    let stream = transcode_stream(
        response.bytes_stream(),
        reasoning.transcoder_options(),
        logger.clone(),
    );
    Ok(ProxyResult::Success(Box::pin(stream)))
}

async fn send_to_backend(
    backend_req: &BackendRequest,
    config: &ProxyConfig,
    client: &reqwest::Client,
    logger: &RequestLogger,
) -> Result<reqwest::Response> {
    let api_key = config.resolve_api_key()?;
    let base_url = config.effective_base_url()?;
    let url = format!("{}/chat/completions", base_url);

    logger.info(
        "proxy",
        format!(
            "POST {} model={} stream={}",
            url, backend_req.model, backend_req.stream
        ),
    );

    let mut request = client
        .post(&url)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json");
    if backend_req.stream {
        request = request.header("Accept", "text/event-stream");
    }

    request
        .json(backend_req)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Request failed: {}", e)))
}

/// Pump a backend byte stream through a [`StreamTranscoder`].
///
/// Reading stops at `[DONE]`. A transport error ends the stream with an
/// error frame. Dropping the returned stream (client went away) drops the
/// backend body with it.
pub fn transcode_stream<S, E>(
    byte_stream: S,
    options: TranscoderOptions,
    logger: RequestLogger,
) -> impl Stream<Item = std::result::Result<Bytes, std::io::Error>> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut guard = DisconnectGuard::new(logger.clone());
        let mut transcoder = StreamTranscoder::new(options);
        let mut failure: Option<String> = None;

        tokio::pin!(byte_stream);

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            };

            for frame in transcoder.push_chunk(&chunk) {
                yield Ok(Bytes::from(frame));
            }

            if transcoder.is_finished() {
                break;
            }
        }

        let final_frames = match failure {
            Some(message) => {
                logger.error("stream", format!("Backend stream error: {}", message));
                transcoder.fail(&message)
            }
            None => transcoder.finish(),
        };
        for frame in final_frames {
            yield Ok(Bytes::from(frame));
        }

        guard.completed = true;
        let stats = transcoder.stats();
        logger.info_with_context(
            "stream",
            "Stream completed",
            serde_json::json!({
                "events": stats.events,
                "passthrough": stats.passthrough,
                "skipped": stats.skipped,
                "auto_closed_reasoning": stats.auto_closed
            }),
        );
    }
}

/// Logs when the outbound stream is dropped before it finished.
struct DisconnectGuard {
    logger: RequestLogger,
    completed: bool,
}

impl DisconnectGuard {
    fn new(logger: RequestLogger) -> Self {
        Self {
            logger,
            completed: false,
        }
    }
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        if !self.completed {
            tracing::info!(request_id = %self.logger.request_id(), "Client disconnected mid-stream");
            self.logger
                .warn("stream", "Client disconnected, backend stream released");
        }
    }
}
