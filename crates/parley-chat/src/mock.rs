//! Scriptable in-memory deployment client.
//!
//! Returns queued replies or failures and records every call, so the
//! orchestrator can be exercised without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use parley_core::types::{Citation, Message};

use crate::client::{DeploymentClient, FileRef, InvokeReply, InvokeRequest, RemoteError};
use crate::media::DocumentUpload;

/// Owned copy of one `invoke_deployment` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvoke {
    pub credential: String,
    pub deployment_key: String,
    pub messages: Vec<Message>,
    pub variables: Option<BTreeMap<String, String>>,
    pub file_refs: Vec<FileRef>,
}

#[derive(Default)]
struct MockState {
    variables: Vec<String>,
    access_error: Option<RemoteError>,
    conversion_errors: VecDeque<RemoteError>,
    replies: VecDeque<Result<InvokeReply, RemoteError>>,
    resolve_calls: usize,
    conversions: Vec<String>,
    invocations: Vec<RecordedInvoke>,
}

/// Mock deployment client for testing.
#[derive(Default)]
pub struct MockDeploymentClient {
    state: Mutex<MockState>,
}

impl MockDeploymentClient {
    /// A client whose deployment declares no variables and which answers
    /// every turn with `"ok"`.
    pub fn new() -> Self {
        Self::default()
    }

    /// A client whose deployment declares `variables`.
    pub fn with_variables(variables: &[&str]) -> Self {
        let client = Self::new();
        client.lock().variables = variables.iter().map(|v| v.to_string()).collect();
        client
    }

    /// Refuse every credential until [`MockDeploymentClient::grant_access`].
    pub fn deny_access(&self) {
        self.lock().access_error = Some(RemoteError::Unauthorized(
            "token has no access to this workspace".to_string(),
        ));
    }

    pub fn grant_access(&self) {
        self.lock().access_error = None;
    }

    /// Fail variable resolution with `error` until access is granted again.
    pub fn fail_resolution(&self, error: RemoteError) {
        self.lock().access_error = Some(error);
    }

    pub fn fail_next_conversion(&self, error: RemoteError) {
        self.lock().conversion_errors.push_back(error);
    }

    /// Queue a successful reply.
    pub fn push_reply(&self, text: &str, sources: Vec<Citation>) {
        self.lock().replies.push_back(Ok(InvokeReply {
            text: text.to_string(),
            sources,
        }));
    }

    /// Queue a failed invocation.
    pub fn push_error(&self, error: RemoteError) {
        self.lock().replies.push_back(Err(error));
    }

    pub fn resolve_count(&self) -> usize {
        self.lock().resolve_calls
    }

    pub fn conversion_count(&self) -> usize {
        self.lock().conversions.len()
    }

    /// File names passed to `convert_document`, in call order.
    pub fn converted_files(&self) -> Vec<String> {
        self.lock().conversions.clone()
    }

    pub fn invocations(&self) -> Vec<RecordedInvoke> {
        self.lock().invocations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread can only poison this with test data.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DeploymentClient for MockDeploymentClient {
    async fn resolve_variables(
        &self,
        _credential: &str,
        _deployment_key: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let mut state = self.lock();
        state.resolve_calls += 1;
        match &state.access_error {
            Some(err) => Err(err.clone()),
            None => Ok(state.variables.clone()),
        }
    }

    async fn convert_document(
        &self,
        document: &DocumentUpload,
        _credential: &str,
    ) -> Result<FileRef, RemoteError> {
        let mut state = self.lock();
        if let Some(err) = state.conversion_errors.pop_front() {
            return Err(err);
        }
        state.conversions.push(document.file_name.clone());
        Ok(FileRef(format!("file_{}", state.conversions.len())))
    }

    async fn invoke_deployment(
        &self,
        request: &InvokeRequest<'_>,
    ) -> Result<InvokeReply, RemoteError> {
        let mut state = self.lock();
        state.invocations.push(RecordedInvoke {
            credential: request.credential.to_string(),
            deployment_key: request.deployment_key.to_string(),
            messages: request.messages.to_vec(),
            variables: request.variables.cloned(),
            file_refs: request.file_refs.to_vec(),
        });
        state.replies.pop_front().unwrap_or_else(|| {
            Ok(InvokeReply {
                text: "ok".to_string(),
                sources: Vec::new(),
            })
        })
    }
}
