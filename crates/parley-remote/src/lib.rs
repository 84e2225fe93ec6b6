//! HTTP client for the remote deployment API.
//!
//! Implements `parley_chat::DeploymentClient` over the deployment service's
//! REST endpoints: deployment config lookup, file upload and invoke.

pub mod client;
pub mod wire;

pub use client::HttpDeploymentClient;
