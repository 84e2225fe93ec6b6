//! Line-oriented chat front-end.
//!
//! Owns the single `Session` and feeds parsed commands to the orchestrator.
//! Output goes to any `Write` so the loop can be driven from tests.

use std::io::Write;
use std::path::Path;

use parley_chat::{visible_transcript, Access, ChatError, Session, SessionOrchestrator};
use parley_core::config::DeploymentConfig;
use parley_core::types::Role;

use crate::command::{Command, HELP};

/// Whether the loop should keep reading input.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl<W: Write> {
    orchestrator: SessionOrchestrator,
    deployments: Vec<DeploymentConfig>,
    session: Session,
    out: W,
}

impl<W: Write> Repl<W> {
    pub fn new(
        orchestrator: SessionOrchestrator,
        deployments: Vec<DeploymentConfig>,
        initial: DeploymentConfig,
        out: W,
    ) -> Self {
        let session = orchestrator.start_session(initial);
        Self {
            orchestrator,
            deployments,
            session,
            out,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.out
    }

    pub async fn handle(&mut self, command: Command) -> std::io::Result<Flow> {
        match command {
            Command::Say(text) => self.say(&text).await?,
            Command::Token(token) => self.set_token(&token).await?,
            Command::Var { name, value } => {
                if self.session.bind_variable(name.as_str(), value) {
                    writeln!(self.out, "Bound {name}.")?;
                } else {
                    writeln!(self.out, "Ignored {name}: empty value or no variables on this deployment.")?;
                }
            }
            Command::Upload(path) => self.upload(&path).await?,
            Command::Image(path) => self.image(&path).await?,
            Command::Deployment(name) => self.switch(&name).await?,
            Command::Deployments => {
                for d in &self.deployments {
                    let marker = if *d == *self.session.deployment() { "*" } else { " " };
                    writeln!(self.out, "{marker} {} ({})", d.name, d.variant.as_str())?;
                }
            }
            Command::Reset => {
                self.orchestrator.reset_history(&mut self.session);
                writeln!(self.out, "Conversation cleared.")?;
            }
            Command::Status => self.status()?,
            Command::Help => writeln!(self.out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn say(&mut self, text: &str) -> std::io::Result<()> {
        match self.orchestrator.execute_turn(&mut self.session, text).await {
            Ok(turn) => {
                writeln!(self.out, "{}", turn.reply)?;
                if let Some(panel) = turn.citation_panel() {
                    writeln!(self.out, "\nSources:\n{panel}")?;
                }
                Ok(())
            }
            Err(err) => self.report(&err),
        }
    }

    async fn set_token(&mut self, token: &str) -> std::io::Result<()> {
        match self.orchestrator.enter_credential(&mut self.session, token).await {
            Ok(variables) if self.session.deployment().variant.requires_variables() && !variables.is_empty() => {
                writeln!(self.out, "Token accepted. Set variables with /var: {}", variables.join(", "))
            }
            Ok(_) => writeln!(self.out, "Token accepted."),
            Err(err) => self.report(&err),
        }
    }

    async fn upload(&mut self, path: &Path) -> std::io::Result<()> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return writeln!(self.out, "Cannot read {}: {e}", path.display()),
        };
        match self
            .orchestrator
            .stage_document(&mut self.session, &file_name(path), bytes)
        {
            Ok(()) => writeln!(self.out, "Document attached."),
            Err(err) => self.report(&err),
        }
    }

    async fn image(&mut self, path: &Path) -> std::io::Result<()> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return writeln!(self.out, "Cannot read {}: {e}", path.display()),
        };
        match self
            .orchestrator
            .stage_image(&mut self.session, &file_name(path), &bytes)
        {
            Ok(()) => writeln!(self.out, "Image attached to the next message."),
            Err(err) => self.report(&err),
        }
    }

    async fn switch(&mut self, name: &str) -> std::io::Result<()> {
        let Some(deployment) = self.deployments.iter().find(|d| d.name == name).cloned() else {
            return writeln!(self.out, "Unknown deployment '{name}'. See /deployments.");
        };
        match self
            .orchestrator
            .select_deployment(&mut self.session, deployment)
            .await
        {
            Ok(()) => writeln!(self.out, "Now chatting with {name}."),
            Err(err) => self.report(&err),
        }
    }

    fn status(&mut self) -> std::io::Result<()> {
        let access = match self.session.access() {
            Access::Unverified if self.session.has_credential() => "unverified",
            Access::Unverified => "no token",
            Access::Granted { .. } => "granted",
            Access::Denied => "denied",
        };
        writeln!(self.out, "Deployment: {}", self.session.deployment().name)?;
        writeln!(self.out, "Access: {access}")?;
        let required = self.session.required_variables();
        if !required.is_empty() {
            let bindings = self.session.variable_bindings();
            for name in required {
                let value = bindings.get(name).map(String::as_str).unwrap_or("<unset>");
                writeln!(self.out, "  {name} = {value}")?;
            }
        }
        if self.session.has_pending_document() {
            writeln!(self.out, "Document: pending upload")?;
        } else if !self.session.file_refs().is_empty() {
            writeln!(self.out, "Document: attached")?;
        }
        if self.session.has_pending_image() {
            writeln!(self.out, "Image: pending")?;
        }
        for (role, text) in visible_transcript(self.session.history()) {
            let who = match role {
                Role::User => "you",
                Role::Assistant => "bot",
            };
            writeln!(self.out, "[{who}] {text}")?;
        }
        Ok(())
    }

    /// Print the advisory for `err`; unclassified failures were already logged.
    fn report(&mut self, err: &ChatError) -> std::io::Result<()> {
        match err.advisory() {
            Some(advisory) => writeln!(self.out, "! {advisory}"),
            None => Ok(()),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parley_chat::{MockDeploymentClient, RemoteError};
    use parley_core::config::ChatConfig;
    use parley_core::types::{Citation, DeploymentVariant};

    fn deployments() -> Vec<DeploymentConfig> {
        vec![
            DeploymentConfig {
                name: "Tutor".to_string(),
                key: "tutor".to_string(),
                variant: DeploymentVariant::Tutor,
            },
            DeploymentConfig {
                name: "Exam Checker".to_string(),
                key: "exam-checker".to_string(),
                variant: DeploymentVariant::ExamChecker,
            },
        ]
    }

    fn repl(client: Arc<MockDeploymentClient>) -> Repl<Vec<u8>> {
        let orchestrator = SessionOrchestrator::new(client, ChatConfig::default());
        let all = deployments();
        let first = all[0].clone();
        Repl::new(orchestrator, all, first, Vec::new())
    }

    fn output(repl: Repl<Vec<u8>>) -> String {
        String::from_utf8(repl.into_output()).unwrap()
    }

    #[tokio::test]
    async fn test_message_without_token_shows_advisory() {
        let mut repl = repl(Arc::new(MockDeploymentClient::new()));
        repl.handle(Command::Say("Hello".to_string())).await.unwrap();
        assert!(output(repl).contains("! Please provide all the necessary parameters"));
    }

    #[tokio::test]
    async fn test_reply_and_sources_printed() {
        let client = Arc::new(MockDeploymentClient::new());
        client.push_reply(
            "Hi there",
            vec![Citation {
                document_name: "plan.pdf".to_string(),
                page_number: 2,
                excerpt: "Doel".to_string(),
            }],
        );
        let mut repl = repl(client);
        repl.handle(Command::Token("tok".to_string())).await.unwrap();
        repl.handle(Command::Say("Hello".to_string())).await.unwrap();
        let out = output(repl);
        assert!(out.contains("Token accepted."));
        assert!(out.contains("Hi there"));
        assert!(out.contains("**1. plan.pdf - page 2:**\nDoel"));
    }

    #[tokio::test]
    async fn test_unclassified_failure_prints_nothing() {
        let client = Arc::new(MockDeploymentClient::new());
        client.push_error(RemoteError::Transport("connection reset".to_string()));
        let mut repl = repl(client);
        repl.handle(Command::Token("tok".to_string())).await.unwrap();
        repl.handle(Command::Say("Hello".to_string())).await.unwrap();
        let out = output(repl);
        assert!(!out.contains('!'));
        assert!(!out.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_switch_and_bind_variables() {
        let client = Arc::new(MockDeploymentClient::with_variables(&["subject"]));
        let mut repl = repl(client.clone());
        repl.handle(Command::Token("tok".to_string())).await.unwrap();
        repl.handle(Command::Deployment("Exam Checker".to_string()))
            .await
            .unwrap();
        repl.handle(Command::Var {
            name: "subject".to_string(),
            value: "math".to_string(),
        })
        .await
        .unwrap();
        repl.handle(Command::Say("Check this".to_string())).await.unwrap();

        assert_eq!(repl.session().deployment().key, "exam-checker");
        let invocations = client.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(
            invocations[0].variables.as_ref().unwrap().get("subject").map(String::as_str),
            Some("math")
        );
        let out = output(repl);
        assert!(out.contains("Now chatting with Exam Checker."));
        assert!(out.contains("Bound subject."));
    }

    #[tokio::test]
    async fn test_unknown_deployment() {
        let mut repl = repl(Arc::new(MockDeploymentClient::new()));
        repl.handle(Command::Deployment("Nope".to_string())).await.unwrap();
        assert!(output(repl).contains("Unknown deployment 'Nope'"));
    }

    #[tokio::test]
    async fn test_upload_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"meeting notes").unwrap();

        let client = Arc::new(MockDeploymentClient::new());
        let mut repl = repl(client.clone());
        repl.handle(Command::Upload(path)).await.unwrap();
        assert!(repl.session().has_pending_document());

        repl.handle(Command::Token("tok".to_string())).await.unwrap();
        repl.handle(Command::Say("Summarize".to_string())).await.unwrap();
        assert_eq!(client.converted_files(), vec!["notes.txt"]);
    }

    #[tokio::test]
    async fn test_image_rejected_on_tutor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let mut repl = repl(Arc::new(MockDeploymentClient::new()));
        repl.handle(Command::Image(path)).await.unwrap();
        assert!(!repl.session().has_pending_image());
        assert!(output(repl).contains("! this deployment does not accept images"));
    }

    #[tokio::test]
    async fn test_missing_file_reported() {
        let mut repl = repl(Arc::new(MockDeploymentClient::new()));
        repl.handle(Command::Upload("/definitely/not/here.pdf".into()))
            .await
            .unwrap();
        assert!(output(repl).contains("Cannot read /definitely/not/here.pdf"));
    }

    #[tokio::test]
    async fn test_status_lists_transcript_and_quit() {
        let mut repl = repl(Arc::new(MockDeploymentClient::new()));
        repl.handle(Command::Token("tok".to_string())).await.unwrap();
        repl.handle(Command::Say("Hello".to_string())).await.unwrap();
        repl.handle(Command::Status).await.unwrap();
        assert_eq!(repl.handle(Command::Quit).await.unwrap(), Flow::Quit);
        let out = output(repl);
        assert!(out.contains("Access: granted"));
        assert!(out.contains("[you] Hello"));
        assert!(out.contains("[bot] ok"));
    }
}
