//! Error types for the clock.
//!
//! Only construction failures ever reach the host. Everything that goes wrong
//! per frame or per minute is logged and swallowed by the runtime.

use crate::common::{MinuteIndex, RequestId};
use thiserror::Error;

/// Errors surfaced by the clock's public API.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("renderer failed to initialise: {0}")]
    RendererInit(String),

    #[error("render failed: {0}")]
    Render(String),

    #[error("the geometry worker is no longer running")]
    WorkerGone,

    #[error("the clock is not running")]
    NotRunning,
}

/// A failed geometry generation.
///
/// Always carries the keys of the request it answers, so the caller can match
/// it against the label that asked for it.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("geometry for {minute_index} ({request_id}) failed: {message}")]
pub struct GeometryError {
    pub request_id: RequestId,
    pub minute_index: MinuteIndex,
    pub message: String,
}

impl GeometryError {
    pub fn new(request_id: RequestId, minute_index: MinuteIndex, message: impl Into<String>) -> Self {
        Self {
            request_id,
            minute_index,
            message: message.into(),
        }
    }
}

pub type Result<T, E = ClockError> = std::result::Result<T, E>;
