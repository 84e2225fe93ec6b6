//! Error types for the conversational interface.

use parley_core::error::ParleyError;

/// Errors from the chat engine.
///
/// The first four variants classify a failed turn. Everything except
/// `Unclassified` carries text meant for the user.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Credential, deployment, input or a template variable is missing.
    #[error("{0}")]
    MissingParameters(String),
    /// The credential cannot reach the deployment's workspace.
    #[error("{0}")]
    Unauthorized(String),
    /// Message decoded from a structured remote API error.
    #[error("{0}")]
    RemoteApi(String),
    /// Anything else; logged, never shown.
    #[error("unclassified failure: {0}")]
    Unclassified(String),
    #[error("this deployment does not accept images")]
    ImagesNotSupported,
    #[error("unsupported upload: {0}")]
    UnsupportedUpload(String),
    #[error("payload too large: {size} bytes exceeds {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error("configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// The advisory to display, or `None` for failures that stay in the logs.
    pub fn advisory(&self) -> Option<String> {
        match self {
            ChatError::Unclassified(_) => None,
            other => Some(other.to_string()),
        }
    }
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::PayloadTooLarge { size, limit } => {
                ChatError::PayloadTooLarge { size, limit }
            }
            ParleyError::UnsupportedUpload(msg) => ChatError::UnsupportedUpload(msg),
            other => ChatError::Config(other.to_string()),
        }
    }
}
