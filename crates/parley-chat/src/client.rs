//! Contract for the remote deployment service.
//!
//! The orchestrator never talks HTTP itself; it drives a `DeploymentClient`
//! which resolves template variables, converts uploaded documents into file
//! references and invokes the deployment.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parley_core::types::{Citation, Message};

use crate::media::DocumentUpload;

/// Opaque id of a converted document, usable by the invoke call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the remote call needs for one turn.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    pub credential: &'a str,
    pub deployment_key: &'a str,
    /// Bounded history, oldest first.
    pub messages: &'a [Message],
    /// `None` for deployments that take no template variables.
    pub variables: Option<&'a BTreeMap<String, String>>,
    pub file_refs: &'a [FileRef],
}

/// A generated reply and its retrieval sources, in the order returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeReply {
    pub text: String,
    pub sources: Vec<Citation>,
}

/// Failures reported by a `DeploymentClient`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// The credential cannot reach the deployment's workspace.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Structured API error; `body` is the raw JSON payload.
    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Remote deployment service used by the orchestrator.
#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Names of the template variables the deployment declares.
    async fn resolve_variables(
        &self,
        credential: &str,
        deployment_key: &str,
    ) -> Result<Vec<String>, RemoteError>;

    /// Upload a document and return the reference the invoke call accepts.
    async fn convert_document(
        &self,
        document: &DocumentUpload,
        credential: &str,
    ) -> Result<FileRef, RemoteError>;

    /// Run one turn against the deployment.
    async fn invoke_deployment(
        &self,
        request: &InvokeRequest<'_>,
    ) -> Result<InvokeReply, RemoteError>;
}
