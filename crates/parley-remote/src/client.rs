use std::time::Duration;

use async_trait::async_trait;
use parley_chat::{DeploymentClient, DocumentUpload, FileRef, InvokeReply, InvokeRequest, RemoteError};
use parley_core::config::RemoteConfig;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::wire::{
    declared_variables, ConfigRequest, InvokeBody, InvokeOptions, InvokeResponse, UploadedFile,
    WireMessage,
};

const CONFIG_PATH: &str = "/v2/deployments/get_config";
const FILES_PATH: &str = "/v2/files";
const INVOKE_PATH: &str = "/v2/deployments/invoke";

/// `DeploymentClient` over the hosted deployment HTTP API.
#[derive(Clone)]
pub struct HttpDeploymentClient {
    http: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for HttpDeploymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDeploymentClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpDeploymentClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RemoteError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a 2xx JSON body, classifying everything else.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        credential: &str,
    ) -> Result<T, RemoteError> {
        let response = request
            .header("Authorization", format!("Bearer {credential}"))
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

fn classify_status(status: StatusCode, body: String) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            warn!(status = status.as_u16(), "Deployment API refused credential");
            RemoteError::Unauthorized(body)
        }
        _ => {
            warn!(status = status.as_u16(), "Deployment API returned an error");
            RemoteError::Api {
                status: status.as_u16(),
                body,
            }
        }
    }
}

#[async_trait]
impl DeploymentClient for HttpDeploymentClient {
    async fn resolve_variables(
        &self,
        credential: &str,
        deployment_key: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let request = self
            .http
            .post(self.url(CONFIG_PATH))
            .json(&ConfigRequest { key: deployment_key });
        let config: serde_json::Value = self.send_json(request, credential).await?;
        let variables = declared_variables(&config);
        debug!(deployment = deployment_key, count = variables.len(), "Resolved deployment variables");
        Ok(variables)
    }

    async fn convert_document(
        &self,
        document: &DocumentUpload,
        credential: &str,
    ) -> Result<FileRef, RemoteError> {
        let part = reqwest::multipart::Part::bytes(document.bytes.clone())
            .file_name(document.file_name.clone())
            .mime_str(document.mime)
            .map_err(|e| RemoteError::Transport(format!("Invalid MIME type: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("purpose", "retrieval");

        let request = self.http.post(self.url(FILES_PATH)).multipart(form);
        let uploaded: UploadedFile = self.send_json(request, credential).await?;
        debug!(file = %document.file_name, id = %uploaded.id, "Uploaded document");
        Ok(FileRef(uploaded.id))
    }

    async fn invoke_deployment(
        &self,
        request: &InvokeRequest<'_>,
    ) -> Result<InvokeReply, RemoteError> {
        let body = InvokeBody {
            key: request.deployment_key,
            messages: request.messages.iter().map(WireMessage::from).collect(),
            inputs: request.variables,
            file_ids: request.file_refs.iter().map(FileRef::as_str).collect(),
            invoke_options: InvokeOptions {
                include_retrievals: true,
            },
        };

        debug!(
            deployment = request.deployment_key,
            messages = body.messages.len(),
            files = body.file_ids.len(),
            "Invoking deployment"
        );

        let http_request = self.http.post(self.url(INVOKE_PATH)).json(&body);
        let response: InvokeResponse = self.send_json(http_request, request.credential).await?;

        let text = response
            .reply_text()
            .ok_or_else(|| RemoteError::Decode("response has no choices".to_string()))?
            .to_string();

        Ok(InvokeReply {
            text,
            sources: response.citations(),
        })
    }
}
