//! Conversation session orchestration for Parley.
//!
//! Gates sends until the credential, deployment and template variables are
//! present, builds the bounded multi-modal context for each turn, invokes the
//! remote deployment and classifies failures without corrupting the
//! transcript.

pub mod client;
pub mod context;
pub mod error;
pub mod gate;
pub mod media;
pub mod mock;
pub mod orchestrator;
pub mod response;
pub mod session;

pub use client::{DeploymentClient, FileRef, InvokeReply, InvokeRequest, RemoteError};
pub use context::{window, BoundedContext, ContextBuilder};
pub use error::ChatError;
pub use gate::{can_send, GateRejection};
pub use media::{DocumentUpload, StagedImage};
pub use mock::{MockDeploymentClient, RecordedInvoke};
pub use orchestrator::SessionOrchestrator;
pub use response::{format_citations, visible_transcript, TurnReply};
pub use session::{Access, Session};
