//! Conversation context assembly.
//!
//! Appends the user's turn to the transcript, resolves the document
//! reference, and cuts the transcript down to the sliding window that is
//! actually submitted to the deployment.

use parley_core::types::Message;
use tracing::{debug, warn};

use crate::client::{DeploymentClient, FileRef};
use crate::error::ChatError;
use crate::session::Session;

/// The most recent `limit` entries of `history`, oldest first.
pub fn window(history: &[Message], limit: usize) -> &[Message] {
    let start = history.len().saturating_sub(limit);
    &history[start..]
}

/// Context submitted with one remote call.
#[derive(Debug, Clone, Copy)]
pub struct BoundedContext<'a> {
    pub messages: &'a [Message],
    pub file_refs: &'a [FileRef],
}

/// Builds the per-turn context from a session.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    /// Maximum number of transcript entries submitted per turn.
    pub history_window: usize,
}

impl ContextBuilder {
    /// A zero window is raised to one so every turn carries its own input.
    pub fn new(history_window: usize) -> Self {
        Self {
            history_window: history_window.max(1),
        }
    }

    /// Convert a staged document, if any, into the session's file reference.
    ///
    /// Each upload is converted once; the reference is reused on later turns
    /// until another document is staged. On failure the document stays
    /// staged and the previous reference is kept.
    pub async fn resolve_file_refs(
        &self,
        session: &mut Session,
        client: &dyn DeploymentClient,
    ) -> Result<(), ChatError> {
        let Some(document) = session.pending_document.as_ref() else {
            return Ok(());
        };
        let credential = session
            .credential()
            .ok_or_else(|| ChatError::Unclassified("no credential for conversion".to_string()))?;

        match client.convert_document(document, credential).await {
            Ok(file_ref) => {
                debug!(
                    session_id = %session.id,
                    file = %document.file_name,
                    file_ref = %file_ref,
                    "Document converted"
                );
                session.file_refs = vec![file_ref];
                session.pending_document = None;
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %session.id,
                    file = %document.file_name,
                    error = %e,
                    "Document conversion failed"
                );
                Err(ChatError::Unclassified(e.to_string()))
            }
        }
    }

    /// Append the user's text, then the staged image as its own message.
    ///
    /// The staged image is consumed so it rides along with this turn only.
    pub fn append_user_turn(&self, session: &mut Session, input: &str) {
        session.history.push(Message::user_text(input));
        if let Some(image) = session.pending_image.take() {
            session.history.push(Message::user_image(image.into_data_uri()));
        }
    }

    /// The windowed transcript and file references for the next call.
    pub fn bounded<'a>(&self, session: &'a Session) -> BoundedContext<'a> {
        BoundedContext {
            messages: window(&session.history, self.history_window),
            file_refs: &session.file_refs,
        }
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(20)
    }
}
