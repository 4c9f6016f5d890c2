//! Realtime session orchestration
//!
//! This module provides the `RealtimeSession` abstraction that manages:
//! - The connection phase machine (idle → connecting → connected → closed)
//! - The strict connect sequence (credential → media → SDP exchange)
//! - The event pump feeding the transcript reducer
//! - Idempotent teardown from every exit path

mod config;
mod session;

pub use config::{SessionConfig, SessionMode};
pub use session::{Phase, RealtimeSession, SessionStats};
