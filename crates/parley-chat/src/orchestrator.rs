//! Session orchestrator: gates sends, builds context and executes turns.
//!
//! Every mutating operation borrows the `Session` mutably, so one session
//! can never have two turns in flight.

use std::sync::Arc;

use chrono::Utc;
use parley_core::config::{ChatConfig, DeploymentConfig};
use parley_core::types::Message;
use tracing::{debug, error, info, warn};

use crate::client::{DeploymentClient, InvokeRequest, RemoteError};
use crate::context::ContextBuilder;
use crate::error::ChatError;
use crate::gate;
use crate::media::{DocumentUpload, StagedImage};
use crate::response::TurnReply;
use crate::session::{Access, Session};

/// Drives conversations against a remote deployment.
pub struct SessionOrchestrator {
    client: Arc<dyn DeploymentClient>,
    context: ContextBuilder,
    config: ChatConfig,
}

impl SessionOrchestrator {
    pub fn new(client: Arc<dyn DeploymentClient>, config: ChatConfig) -> Self {
        Self {
            client,
            context: ContextBuilder::new(config.history_window),
            config,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Create an empty session for `deployment`.
    pub fn start_session(&self, deployment: DeploymentConfig) -> Session {
        let session = Session::new(deployment);
        info!(
            session_id = %session.id,
            deployment = %session.deployment().key,
            "Session started"
        );
        session
    }

    /// Store (or overwrite) the credential and check it against the active
    /// deployment.
    ///
    /// Returns the variables the deployment declares.
    pub async fn enter_credential(
        &self,
        session: &mut Session,
        credential: &str,
    ) -> Result<Vec<String>, ChatError> {
        session.credential = Some(credential.to_string());
        session.access = Access::Unverified;
        self.refresh_access(session).await
    }

    /// Switch the active deployment.
    ///
    /// Clears the transcript and the variable bindings; the credential is
    /// kept and re-checked against the new deployment.
    pub async fn select_deployment(
        &self,
        session: &mut Session,
        deployment: DeploymentConfig,
    ) -> Result<(), ChatError> {
        if session.deployment == deployment {
            return Ok(());
        }

        info!(
            session_id = %session.id,
            from = %session.deployment.key,
            to = %deployment.key,
            "Switching deployment"
        );
        if !deployment.variant.accepts_images() {
            session.pending_image = None;
        }
        session.deployment = deployment;
        session.reset_history();
        session.variable_bindings.clear();
        session.access = Access::Unverified;

        if session.has_credential() {
            self.refresh_access(session).await?;
        }
        Ok(())
    }

    /// Encode and stage an image for the next turn.
    pub fn stage_image(
        &self,
        session: &mut Session,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<(), ChatError> {
        let image = StagedImage::from_bytes(file_name, bytes, self.config.max_image_bytes)?;
        session.stage_image(image)?;
        debug!(session_id = %session.id, file = %file_name, "Image staged");
        Ok(())
    }

    /// Stage a document; it is converted on the next send.
    pub fn stage_document(
        &self,
        session: &mut Session,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), ChatError> {
        let document = DocumentUpload::new(file_name, bytes)?;
        debug!(session_id = %session.id, ?document, "Document staged");
        session.stage_document(document);
        Ok(())
    }

    /// Clear the transcript of `session`.
    pub fn reset_history(&self, session: &mut Session) {
        info!(
            session_id = %session.id,
            dropped = session.history.len(),
            "History reset"
        );
        session.reset_history();
    }

    /// Run one user turn.
    ///
    /// Once the gate passes, the user's message is in the transcript
    /// whatever happens next. Only a successful reply appends an assistant
    /// message, so failed turns leave the user message unanswered.
    pub async fn execute_turn(
        &self,
        session: &mut Session,
        input: &str,
    ) -> Result<TurnReply, ChatError> {
        if session.access == Access::Denied {
            return Err(ChatError::Unauthorized(
                self.config.authorization_advisory.clone(),
            ));
        }

        // Presence first: a gated turn makes no remote call.
        if let Err(rejection) = gate::check_presence(session, input) {
            return Err(self.gated(session, rejection));
        }
        if session.access == Access::Unverified {
            self.refresh_access(session).await?;
        }
        if let Err(rejection) = gate::check_variables(session, session.required_variables()) {
            return Err(self.gated(session, rejection));
        }

        if let Err(e) = self
            .context
            .resolve_file_refs(session, self.client.as_ref())
            .await
        {
            error!(session_id = %session.id, error = %e, "Turn aborted before send");
            return Err(e);
        }

        self.context.append_user_turn(session, input);
        session.last_turn_at = Some(Utc::now());

        let result = {
            let bounded = self.context.bounded(session);
            let request = InvokeRequest {
                // Presence checked by the gate.
                credential: session.credential().unwrap_or_default(),
                deployment_key: &session.deployment.key,
                messages: bounded.messages,
                variables: session
                    .deployment
                    .variant
                    .requires_variables()
                    .then_some(&session.variable_bindings),
                file_refs: bounded.file_refs,
            };
            info!(
                session_id = %session.id,
                deployment = %request.deployment_key,
                messages = request.messages.len(),
                files = request.file_refs.len(),
                "Invoking deployment"
            );
            self.client.invoke_deployment(&request).await
        };

        match result {
            Ok(reply) => {
                debug!(
                    session_id = %session.id,
                    reply_len = reply.text.len(),
                    sources = reply.sources.len(),
                    "Reply received"
                );
                session.history.push(Message::assistant_text(reply.text.as_str()));
                Ok(TurnReply {
                    reply: reply.text,
                    citations: reply.sources,
                })
            }
            // Access is only judged by variable resolution; a refused
            // invoke is an API error like any other.
            Err(RemoteError::Unauthorized(body)) => Err(api_failure(session, None, &body)),
            Err(RemoteError::Api { status, body }) => {
                Err(api_failure(session, Some(status), &body))
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Deployment call failed");
                Err(ChatError::Unclassified(e.to_string()))
            }
        }
    }

    fn gated(&self, session: &Session, rejection: gate::GateRejection) -> ChatError {
        debug!(session_id = %session.id, ?rejection, "Send gated");
        ChatError::MissingParameters(self.config.missing_parameters_advisory.clone())
    }

    /// Resolve the deployment's variables with the session's credential.
    async fn refresh_access(&self, session: &mut Session) -> Result<Vec<String>, ChatError> {
        let Some(credential) = session.credential() else {
            return Err(ChatError::MissingParameters(
                self.config.missing_parameters_advisory.clone(),
            ));
        };

        let result = self
            .client
            .resolve_variables(credential, &session.deployment.key)
            .await;

        match result {
            Ok(variables) => {
                info!(
                    session_id = %session.id,
                    deployment = %session.deployment.key,
                    variables = ?variables,
                    "Access granted"
                );
                session.access = Access::Granted {
                    variables: variables.clone(),
                };
                Ok(variables)
            }
            Err(e @ (RemoteError::Unauthorized(_) | RemoteError::Api { .. })) => {
                warn!(
                    session_id = %session.id,
                    deployment = %session.deployment.key,
                    error = %e,
                    "Access denied"
                );
                session.access = Access::Denied;
                Err(ChatError::Unauthorized(
                    self.config.authorization_advisory.clone(),
                ))
            }
            Err(e) => {
                error!(session_id = %session.id, error = %e, "Variable resolution failed");
                Err(ChatError::Unclassified(e.to_string()))
            }
        }
    }
}

fn api_failure(session: &Session, status: Option<u16>, body: &str) -> ChatError {
    match decode_api_error(body) {
        Some(message) => {
            warn!(session_id = %session.id, ?status, %message, "Deployment returned an error");
            ChatError::RemoteApi(message)
        }
        None => {
            error!(session_id = %session.id, ?status, %body, "Undecodable API error");
            ChatError::Unclassified("API error with undecodable body".to_string())
        }
    }
}

/// Pull the `error` field out of a structured API error body.
fn decode_api_error(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDeploymentClient;
    use parley_core::types::DeploymentVariant;

    fn tutor() -> DeploymentConfig {
        DeploymentConfig {
            name: "Tutor".to_string(),
            key: "tutor".to_string(),
            variant: DeploymentVariant::Tutor,
        }
    }

    fn exam_checker() -> DeploymentConfig {
        DeploymentConfig {
            name: "Exam Checker".to_string(),
            key: "exam-checker".to_string(),
            variant: DeploymentVariant::ExamChecker,
        }
    }

    fn orchestrator(client: &Arc<MockDeploymentClient>) -> SessionOrchestrator {
        SessionOrchestrator::new(client.clone(), ChatConfig::default())
    }

    // ---- decode_api_error ----

    #[test]
    fn test_decode_api_error_string() {
        assert_eq!(
            decode_api_error(r#"{"error":"rate limited"}"#).as_deref(),
            Some("rate limited")
        );
    }

    #[test]
    fn test_decode_api_error_non_string() {
        assert_eq!(
            decode_api_error(r#"{"error":{"code":42}}"#).as_deref(),
            Some(r#"{"code":42}"#)
        );
    }

    #[test]
    fn test_decode_api_error_missing_or_invalid() {
        assert!(decode_api_error(r#"{"message":"nope"}"#).is_none());
        assert!(decode_api_error(r#"{"error":null}"#).is_none());
        assert!(decode_api_error("<html>502</html>").is_none());
    }

    // ---- Credential ----

    #[tokio::test]
    async fn test_enter_credential_grants_access() {
        let client = Arc::new(MockDeploymentClient::with_variables(&["subject"]));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(exam_checker());

        let vars = orch.enter_credential(&mut session, "tok1").await.unwrap();

        assert_eq!(vars, vec!["subject".to_string()]);
        assert!(session.has_credential());
        assert_eq!(session.required_variables(), ["subject".to_string()]);
    }

    #[tokio::test]
    async fn test_enter_credential_denied_blocks_turns() {
        let client = Arc::new(MockDeploymentClient::new());
        client.deny_access();
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        let err = orch.enter_credential(&mut session, "bad").await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
        assert_eq!(session.access(), &Access::Denied);

        let err = orch.execute_turn(&mut session, "Hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
        assert!(session.history().is_empty());
        assert!(client.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_corrected_credential_unblocks() {
        let client = Arc::new(MockDeploymentClient::new());
        client.deny_access();
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        let _ = orch.enter_credential(&mut session, "bad").await;

        client.grant_access();
        orch.enter_credential(&mut session, "good").await.unwrap();
        let reply = orch.execute_turn(&mut session, "Hello").await.unwrap();

        assert_eq!(reply.reply, "ok");
        assert_eq!(client.invocations()[0].credential, "good");
    }

    #[tokio::test]
    async fn test_transport_failure_during_resolution_is_silent_and_retried() {
        let client = Arc::new(MockDeploymentClient::new());
        client.fail_resolution(RemoteError::Transport("dns".to_string()));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        let err = orch.enter_credential(&mut session, "tok1").await.unwrap_err();
        assert!(matches!(err, ChatError::Unclassified(_)));
        assert_eq!(session.access(), &Access::Unverified);

        client.grant_access();
        orch.execute_turn(&mut session, "Hello").await.unwrap();
        assert_eq!(client.resolve_count(), 2);
    }

    #[tokio::test]
    async fn test_api_error_during_resolution_counts_as_denied() {
        let client = Arc::new(MockDeploymentClient::new());
        client.fail_resolution(RemoteError::Api {
            status: 404,
            body: r#"{"error":"deployment not found"}"#.to_string(),
        });
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        let err = orch.enter_credential(&mut session, "tok1").await.unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
        assert_eq!(session.access(), &Access::Denied);
    }

    #[tokio::test]
    async fn test_turn_without_credential_is_gated() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        let err = orch.execute_turn(&mut session, "Hello").await.unwrap_err();

        assert!(matches!(err, ChatError::MissingParameters(_)));
        assert_eq!(
            err.advisory().as_deref(),
            Some("Please provide all the necessary parameters")
        );
        assert_eq!(client.resolve_count(), 0);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_refused_invoke_is_api_error_and_does_not_block() {
        let client = Arc::new(MockDeploymentClient::new());
        client.push_error(RemoteError::Unauthorized(
            r#"{"error":"Monthly quota exceeded for this workspace"}"#.to_string(),
        ));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();

        let err = orch.execute_turn(&mut session, "Hello").await.unwrap_err();

        assert!(matches!(err, ChatError::RemoteApi(_)));
        assert_eq!(
            err.advisory().as_deref(),
            Some("Monthly quota exceeded for this workspace")
        );
        assert!(matches!(session.access(), Access::Granted { .. }));
        assert_eq!(session.history(), &[Message::user_text("Hello")]);

        let reply = orch.execute_turn(&mut session, "Again").await.unwrap();
        assert_eq!(reply.reply, "ok");
        assert_eq!(session.history().len(), 3);
    }

    #[tokio::test]
    async fn test_refused_invoke_with_plain_body_is_unclassified() {
        let client = Arc::new(MockDeploymentClient::new());
        client.push_error(RemoteError::Unauthorized("Forbidden".to_string()));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();

        let err = orch.execute_turn(&mut session, "Hello").await.unwrap_err();

        assert!(err.advisory().is_none());
        assert!(matches!(session.access(), Access::Granted { .. }));
    }

    #[tokio::test]
    async fn test_empty_input_gated_before_access_refresh() {
        let client = Arc::new(MockDeploymentClient::new());
        client.fail_resolution(RemoteError::Transport("dns".to_string()));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        assert!(orch.enter_credential(&mut session, "tok1").await.is_err());
        assert_eq!(session.access(), &Access::Unverified);
        assert_eq!(client.resolve_count(), 1);

        let err = orch.execute_turn(&mut session, "").await.unwrap_err();

        assert!(matches!(err, ChatError::MissingParameters(_)));
        assert_eq!(
            err.advisory().as_deref(),
            Some("Please provide all the necessary parameters")
        );
        assert_eq!(client.resolve_count(), 1);
        assert!(session.history().is_empty());
    }

    // ---- Deployment switching ----

    #[tokio::test]
    async fn test_select_deployment_clears_history_and_bindings() {
        let client = Arc::new(MockDeploymentClient::with_variables(&["subject"]));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(exam_checker());
        orch.enter_credential(&mut session, "tok1").await.unwrap();
        session.bind_variable("subject", "math");
        orch.execute_turn(&mut session, "Hello").await.unwrap();
        assert_eq!(session.history().len(), 2);

        orch.select_deployment(&mut session, tutor()).await.unwrap();

        assert!(session.history().is_empty());
        assert!(session.variable_bindings().is_empty());
        assert!(session.has_credential());
        assert_eq!(session.deployment().key, "tutor");
        assert!(matches!(session.access(), Access::Granted { .. }));
        assert_eq!(client.resolve_count(), 2);
    }

    #[tokio::test]
    async fn test_select_same_deployment_is_noop() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();
        orch.execute_turn(&mut session, "Hello").await.unwrap();

        orch.select_deployment(&mut session, tutor()).await.unwrap();

        assert_eq!(session.history().len(), 2);
        assert_eq!(client.resolve_count(), 1);
    }

    #[tokio::test]
    async fn test_select_deployment_without_credential_skips_resolution() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        orch.select_deployment(&mut session, exam_checker())
            .await
            .unwrap();

        assert_eq!(client.resolve_count(), 0);
        assert_eq!(session.access(), &Access::Unverified);
    }

    #[tokio::test]
    async fn test_switch_to_tutor_drops_staged_image() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(exam_checker());
        orch.stage_image(&mut session, "a.png", b"abc").unwrap();

        orch.select_deployment(&mut session, tutor()).await.unwrap();

        assert!(!session.has_pending_image());
    }

    // ---- Staging ----

    #[test]
    fn test_stage_image_respects_config_limit() {
        let client = Arc::new(MockDeploymentClient::new());
        let config = ChatConfig {
            max_image_bytes: 2,
            ..ChatConfig::default()
        };
        let orch = SessionOrchestrator::new(client, config);
        let mut session = orch.start_session(exam_checker());

        let err = orch.stage_image(&mut session, "a.png", b"abc").unwrap_err();
        assert!(matches!(err, ChatError::PayloadTooLarge { .. }));
        assert!(!session.has_pending_image());
    }

    #[test]
    fn test_stage_image_tutor_rejected() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        let err = orch.stage_image(&mut session, "a.png", b"abc").unwrap_err();
        assert!(matches!(err, ChatError::ImagesNotSupported));
    }

    #[test]
    fn test_stage_document_validates_type() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());

        assert!(orch
            .stage_document(&mut session, "slides.pptx", vec![1])
            .is_err());
        assert!(!session.has_pending_document());

        orch.stage_document(&mut session, "plan.pdf", vec![1]).unwrap();
        assert!(session.has_pending_document());
    }

    // ---- Turn bookkeeping ----

    #[tokio::test]
    async fn test_turn_sets_last_turn_at() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();
        assert!(session.last_turn_at.is_none());

        orch.execute_turn(&mut session, "Hello").await.unwrap();

        assert!(session.last_turn_at.is_some());
    }

    #[tokio::test]
    async fn test_tutor_sends_no_variables() {
        let client = Arc::new(MockDeploymentClient::with_variables(&["subject"]));
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();

        orch.execute_turn(&mut session, "Hello").await.unwrap();

        assert_eq!(client.invocations()[0].variables, None);
    }

    #[tokio::test]
    async fn test_history_window_from_config() {
        let client = Arc::new(MockDeploymentClient::new());
        let config = ChatConfig {
            history_window: 3,
            ..ChatConfig::default()
        };
        let orch = SessionOrchestrator::new(client.clone(), config);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();

        orch.execute_turn(&mut session, "one").await.unwrap();
        orch.execute_turn(&mut session, "two").await.unwrap();

        let calls = client.invocations();
        assert_eq!(calls[1].messages.len(), 3);
        assert_eq!(calls[1].messages[0], Message::assistant_text("ok"));
        assert_eq!(calls[1].messages[2], Message::user_text("two"));
    }

    #[tokio::test]
    async fn test_reset_history_keeps_credential() {
        let client = Arc::new(MockDeploymentClient::new());
        let orch = orchestrator(&client);
        let mut session = orch.start_session(tutor());
        orch.enter_credential(&mut session, "tok1").await.unwrap();
        orch.execute_turn(&mut session, "Hello").await.unwrap();

        orch.reset_history(&mut session);

        assert!(session.history().is_empty());
        assert!(session.has_credential());
        orch.execute_turn(&mut session, "Again").await.unwrap();
        assert_eq!(client.invocations()[1].messages, vec![Message::user_text("Again")]);
    }
}
