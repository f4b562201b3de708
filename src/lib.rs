//! thinkgate - reasoning-scrubbing OpenAI-compatible proxy
//!
//! This library provides the core functionality for the thinkgate proxy:
//! model-name resolution, request augmentation for NIM-class upstreams,
//! and removal of `<think>…</think>` reasoning segments from streamed and
//! buffered responses.

pub mod config;
pub mod error;
pub mod proxy;
pub mod scrub;

pub use config::{Config, ModelMap};
pub use error::{Error, Result};
