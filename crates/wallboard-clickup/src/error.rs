//! Error types for the polling pipeline
//!
//! Only configuration, transport, HTTP and decode failures ever reach the
//! published `PollState`. Malformed task data never produces an error: the
//! normalizer degrades it to absent display data instead.

use serde::Serialize;

pub type Result<T> = std::result::Result<T, WallboardError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum WallboardError {
    /// Required credential or list id missing, or the credential is unusable
    #[error("Missing ClickUp configuration: {message}")]
    Configuration { message: String },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("ClickUp API error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Unexpected response from ClickUp: {message}")]
    Decode { message: String },

    /// A fetch cycle was superseded or the poller was stopped.
    /// Never surfaced to consumers.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl WallboardError {
    pub fn configuration(message: impl Into<String>) -> Self {
        WallboardError::Configuration {
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, WallboardError::Cancelled)
    }

    /// Whether the next scheduled cycle may recover from this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WallboardError::Transport { .. }
                | WallboardError::Upstream { .. }
                | WallboardError::Decode { .. }
        )
    }
}
