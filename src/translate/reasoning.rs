//! Folding a separate reasoning channel into the single text channel.
//!
//! Reasoning backends stream chain-of-thought in `reasoning_content` and the
//! answer in `content`, interleaved across chunks. Chat front-ends only read
//! `content`, so reasoning runs are wrapped in `<think>` markers instead.

pub const THINK_OPEN: &str = "<think>\n";
pub const THINK_CLOSE: &str = "\n</think>\n\n";
/// Close marker used when the stream ends while a block is still open.
pub const THINK_CLOSE_AT_END: &str = "\n</think>";

/// Result of combining one delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combined {
    /// Text for the outbound `content` field. Empty when nothing arrived.
    pub content: String,
    /// Whether a reasoning block is open after this delta.
    pub reasoning_open: bool,
}

/// Combine one delta's `reasoning_content` and `content` into outbound text.
///
/// Empty strings are treated as absent. With `show_reasoning` off the
/// reasoning is dropped and the open flag is never set.
pub fn combine_delta(
    reasoning: Option<&str>,
    content: Option<&str>,
    reasoning_open: bool,
    show_reasoning: bool,
) -> Combined {
    let content = content.filter(|s| !s.is_empty());

    if !show_reasoning {
        return Combined {
            content: content.unwrap_or_default().to_string(),
            reasoning_open: false,
        };
    }

    let reasoning = reasoning.filter(|s| !s.is_empty());
    let mut text = String::new();
    let mut open = reasoning_open;

    if let Some(reasoning) = reasoning {
        if !open {
            text.push_str(THINK_OPEN);
            open = true;
        }
        text.push_str(reasoning);
    }

    if let Some(content) = content {
        if open {
            text.push_str(THINK_CLOSE);
            open = false;
        }
        text.push_str(content);
    }

    Combined {
        content: text,
        reasoning_open: open,
    }
}

/// Wrap a complete (non-streamed) answer.
pub fn wrap_complete(reasoning: Option<&str>, content: Option<&str>, show_reasoning: bool) -> String {
    let content = content.unwrap_or_default();
    match reasoning.filter(|r| show_reasoning && !r.is_empty()) {
        Some(reasoning) => format!("{THINK_OPEN}{reasoning}{THINK_CLOSE}{content}"),
        None => content.to_string(),
    }
}
