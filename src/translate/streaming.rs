//! State machine that rewrites a backend Chat Completions event stream.
//!
//! The [`StreamTranscoder`] is fed raw body chunks from the backend. It frames
//! them into lines, classifies each `data:` line, folds `reasoning_content`
//! into `content` under `<think>` markers, and returns the outbound wire
//! frames (`data: ...\n\n`) in inbound order. It owns all per-request
//! streaming state and performs no I/O.

use serde_json::{json, Map, Value};

use super::framing::LineFramer;
use super::reasoning::{combine_delta, THINK_CLOSE_AT_END};

/// Payload that marks the end of an event stream.
pub const DONE_PAYLOAD: &str = "[DONE]";

/// Top-level chunk fields copied onto synthetic chunks.
const IDENTITY_FIELDS: [&str; 4] = ["id", "object", "created", "model"];

/// Classification of one complete inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Blank lines, comments, `event:`/`id:` fields.
    Ignore,
    /// `data: [DONE]`
    Terminate,
    Parsed(Value),
    /// A `data:` line whose payload is not JSON. Holds the line as received.
    Unparseable(String),
}

/// Classify a single line of the backend stream.
pub fn classify_line(line: &str) -> Frame {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Frame::Ignore;
    }

    let Some(payload) = trimmed.strip_prefix("data:") else {
        return Frame::Ignore;
    };
    let payload = payload.trim();

    if payload == DONE_PAYLOAD {
        return Frame::Terminate;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Frame::Parsed(value),
        Err(_) => Frame::Unparseable(line.trim_end_matches('\r').to_string()),
    }
}

/// Format a payload as one outbound event.
pub fn data_frame(payload: &str) -> String {
    format!("data: {payload}\n\n")
}

/// Per-request transcoder settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscoderOptions {
    /// Fold `reasoning_content` into `content` inside `<think>` blocks.
    /// When false, reasoning is dropped.
    pub show_reasoning: bool,
}

/// Counters reported once the stream is done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscoderStats {
    pub events: u64,
    pub passthrough: u64,
    pub skipped: u64,
    pub auto_closed: bool,
}

/// Rewrites one backend event stream.
///
/// Usage:
///   let mut transcoder = StreamTranscoder::new(options);
///   for chunk in body {
///       for frame in transcoder.push_chunk(&chunk) {
///           // write frame to the client
///       }
///   }
///   let final_frames = transcoder.finish(); // or transcoder.fail(&err)
#[derive(Debug)]
pub struct StreamTranscoder {
    options: TranscoderOptions,
    framer: LineFramer,
    reasoning_open: bool,
    finished: bool,
    identity: Map<String, Value>,
    stats: TranscoderStats,
}

impl StreamTranscoder {
    pub fn new(options: TranscoderOptions) -> Self {
        Self {
            options,
            framer: LineFramer::new(),
            reasoning_open: false,
            finished: false,
            identity: Map::new(),
            stats: TranscoderStats::default(),
        }
    }

    pub fn reasoning_open(&self) -> bool {
        self.reasoning_open
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn stats(&self) -> TranscoderStats {
        self.stats
    }

    /// Feed one raw body chunk, returning the outbound frames it produced.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::new();
        for line in self.framer.push(chunk) {
            frames.append(&mut self.process_line(&line));
            if self.finished {
                break;
            }
        }
        frames
    }

    /// Process one complete line.
    pub fn process_line(&mut self, line: &str) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        match classify_line(line) {
            Frame::Ignore => Vec::new(),
            Frame::Terminate => self.finalize(),
            Frame::Unparseable(raw) => {
                tracing::debug!(line = %raw, "Passing through unparseable event");
                self.stats.passthrough += 1;
                vec![format!("{raw}\n\n")]
            }
            Frame::Parsed(event) => match self.rewrite_event(event) {
                Ok(frame) => {
                    self.stats.events += 1;
                    vec![frame]
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping event that failed to re-serialize");
                    self.stats.skipped += 1;
                    Vec::new()
                }
            },
        }
    }

    /// The backend stream ended normally.
    ///
    /// Flushes an unterminated last line, closes any open reasoning block
    /// and emits `[DONE]`, unless the stream already terminated.
    pub fn finish(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        let mut frames = Vec::new();
        if let Some(rest) = self.framer.finish() {
            frames.append(&mut self.process_line(&rest));
        }
        frames.append(&mut self.finalize());
        frames
    }

    /// The backend stream failed. Emits one error frame and `[DONE]`.
    pub fn fail(&mut self, message: &str) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut frames = Vec::new();
        if self.reasoning_open {
            frames.push(self.close_reasoning_frame());
        }
        let error = json!({ "error": { "message": message } });
        frames.push(data_frame(&error.to_string()));
        frames.push(data_frame(DONE_PAYLOAD));
        frames
    }

    fn finalize(&mut self) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut frames = Vec::new();
        if self.reasoning_open {
            frames.push(self.close_reasoning_frame());
        }
        frames.push(data_frame(DONE_PAYLOAD));
        frames
    }

    fn rewrite_event(&mut self, mut event: Value) -> serde_json::Result<String> {
        self.remember_identity(&event);

        if let Some(delta) = event
            .pointer_mut("/choices/0/delta")
            .and_then(Value::as_object_mut)
        {
            let reasoning = delta.remove("reasoning_content");
            let combined = combine_delta(
                reasoning.as_ref().and_then(Value::as_str),
                delta.get("content").and_then(Value::as_str),
                self.reasoning_open,
                self.options.show_reasoning,
            );
            self.reasoning_open = combined.reasoning_open;
            delta.insert("content".to_string(), Value::String(combined.content));
        }

        Ok(data_frame(&serde_json::to_string(&event)?))
    }

    fn remember_identity(&mut self, event: &Value) {
        let Some(object) = event.as_object() else {
            return;
        };
        for field in IDENTITY_FIELDS {
            if let Some(value) = object.get(field) {
                self.identity.insert(field.to_string(), value.clone());
            }
        }
    }

    fn close_reasoning_frame(&mut self) -> String {
        self.reasoning_open = false;
        self.stats.auto_closed = true;

        let mut chunk = self.identity.clone();
        chunk
            .entry("object")
            .or_insert_with(|| Value::String("chat.completion.chunk".to_string()));
        chunk.insert(
            "choices".to_string(),
            json!([{
                "index": 0,
                "delta": { "content": THINK_CLOSE_AT_END },
                "finish_reason": null
            }]),
        );
        data_frame(&Value::Object(chunk).to_string())
    }
}
