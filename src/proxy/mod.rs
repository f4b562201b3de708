//! HTTP proxy server module.
//!
//! This module provides the OpenAI-compatible HTTP API that rewrites
//! requests for the upstream provider and scrubs reasoning segments from
//! its responses.

pub mod augment;
mod handlers;
mod server;
pub mod sse;
mod stream;

pub use augment::{augment_request, MAX_TOKENS_FLOOR};
pub use server::{build_http_client, create_router, run_server, AppState};
pub use sse::{FrameParser, SseFrame};
