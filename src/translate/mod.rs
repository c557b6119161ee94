//! Translation between client-facing and backend Chat Completions shapes.
//!
//! The core of the proxy: reshapes requests, complete responses and streamed
//! events. All translation functions are pure (no I/O).

pub mod framing;
pub mod reasoning;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;
