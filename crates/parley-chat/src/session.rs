//! Per-user conversation state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parley_core::config::DeploymentConfig;
use parley_core::types::Message;
use uuid::Uuid;

use crate::client::FileRef;
use crate::error::ChatError;
use crate::media::{DocumentUpload, StagedImage};

/// Whether the credential has been checked against the active deployment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Access {
    /// No credential yet, or not checked since it last changed.
    Unverified,
    /// The credential reaches the deployment, which declares these variables.
    Granted { variables: Vec<String> },
    /// The credential was refused; turns are blocked until it changes.
    Denied,
}

/// State of one user's conversation with one active deployment.
///
/// Owned by the caller and lent to the orchestrator for every operation.
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_turn_at: Option<DateTime<Utc>>,
    pub(crate) deployment: DeploymentConfig,
    pub(crate) credential: Option<String>,
    pub(crate) access: Access,
    pub(crate) variable_bindings: BTreeMap<String, String>,
    pub(crate) pending_document: Option<DocumentUpload>,
    pub(crate) file_refs: Vec<FileRef>,
    pub(crate) pending_image: Option<StagedImage>,
    pub(crate) history: Vec<Message>,
}

impl Session {
    /// An empty session for `deployment`.
    pub fn new(deployment: DeploymentConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            last_turn_at: None,
            deployment,
            credential: None,
            access: Access::Unverified,
            variable_bindings: BTreeMap::new(),
            pending_document: None,
            file_refs: Vec::new(),
            pending_image: None,
            history: Vec::new(),
        }
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    pub fn has_credential(&self) -> bool {
        self.credential.as_deref().is_some_and(|c| !c.is_empty())
    }

    pub fn access(&self) -> &Access {
        &self.access
    }

    /// Variables the active deployment declares, once access is granted.
    pub fn declared_variables(&self) -> &[String] {
        match &self.access {
            Access::Granted { variables } => variables,
            _ => &[],
        }
    }

    /// Variables that must be bound before this deployment can be sent to.
    pub fn required_variables(&self) -> &[String] {
        if self.deployment.variant.requires_variables() {
            self.declared_variables()
        } else {
            &[]
        }
    }

    pub fn variable_bindings(&self) -> &BTreeMap<String, String> {
        &self.variable_bindings
    }

    /// Bind a template variable. Blank values are ignored, so a cleared
    /// field never unbinds or binds a variable. Deployments without template
    /// variables take no bindings.
    ///
    /// Returns whether the binding was recorded.
    pub fn bind_variable(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        if value.is_empty() || !self.deployment.variant.requires_variables() {
            return false;
        }
        self.variable_bindings.insert(name.into(), value);
        true
    }

    /// Stage a document for conversion on the next send.
    pub fn stage_document(&mut self, document: DocumentUpload) {
        self.pending_document = Some(document);
    }

    pub fn has_pending_document(&self) -> bool {
        self.pending_document.is_some()
    }

    /// File references attached to every turn until a new document arrives.
    pub fn file_refs(&self) -> &[FileRef] {
        &self.file_refs
    }

    /// Stage an image for the next send.
    pub fn stage_image(&mut self, image: StagedImage) -> Result<(), ChatError> {
        if !self.deployment.variant.accepts_images() {
            return Err(ChatError::ImagesNotSupported);
        }
        self.pending_image = Some(image);
        Ok(())
    }

    pub fn has_pending_image(&self) -> bool {
        self.pending_image.is_some()
    }

    /// Full transcript, oldest first.
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Clear the transcript. Credential, bindings and staged uploads stay.
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub(crate) fn credential(&self) -> Option<&str> {
        self.credential.as_deref().filter(|c| !c.is_empty())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("deployment", &self.deployment.key)
            .field(
                "credential",
                &self.credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access", &self.access)
            .field("variable_bindings", &self.variable_bindings)
            .field("pending_document", &self.pending_document)
            .field("file_refs", &self.file_refs)
            .field("pending_image", &self.pending_image)
            .field("history_len", &self.history.len())
            .finish()
    }
}
