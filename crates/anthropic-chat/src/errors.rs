//! Error taxonomy and cancellation plumbing.
//!
//! The set of call outcomes is closed: every failure `send` or `stream` can
//! produce is one of the five [`ChatError`] variants, and none of them is
//! retried internally. Configuration problems surface earlier, from client
//! construction, as [`ConfigError`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

/// Failure of a chat completion call.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The API reported an error, either through the JSON error envelope
    /// (at any status code) or through a non-2xx status without one.
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The transport failed before a usable response or event arrived.
    #[error("network error: {0}")]
    Network(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A response body or stream frame failed to decode.
    #[error("decoding error: {0}")]
    Decoding(#[from] serde_json::Error),

    /// Cooperative cancellation was observed before the call finished.
    #[error("cancelled")]
    Cancelled,

    /// The event stream carried an explicit error event.
    #[error("stream error: {0}")]
    Stream(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(error: reqwest::Error) -> Self {
        ChatError::Network(Box::new(error))
    }
}

/// Client construction failed before any call could be made.
#[derive(Debug, Error)]
#[error("configuration error: {message}")]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Abort signal shared between callers and in-flight operations.
#[derive(Clone, Debug)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Abort controller that owns the underlying signal.
#[derive(Clone, Debug)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self {
            signal: AbortSignal {
                flag: Arc::new(AtomicBool::new(false)),
            },
        }
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.abort();
    }
}

impl Default for AbortController {
    fn default() -> Self {
        Self::new()
    }
}
