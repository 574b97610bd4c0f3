//! Executes operations against the management endpoint.
//!
//! Read-only operations ride an idempotent, cacheable GET; everything else,
//! composites included, goes over POST so intermediaries can never retry or
//! cache a side-effecting request. Every dispatch resolves to exactly one
//! outcome: the result tree, an operation failure, or a transport error.

use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace, warn};

use super::address_path;
use super::process_state::{NoopStrategy, ProcessState, ProcessStateStrategy};
use crate::codec::{self, process_dmr, process_upload, HttpMethod, APPLICATION_DMR_ENCODED};
use crate::error::DispatchError;
use crate::model::{keys, Composite, CompositeResult, ModelNode, Operation};

const CLIENT_NAME_HEADER: &str = "X-Management-Client-Name";
const CLIENT_NAME: &str = "HAL";

/// Operations eligible for the GET transport.
const READ_ONLY_OPERATIONS: [&str; 4] = [
    "read-resource",
    "read-attribute",
    "read-resource-description",
    "read-content",
];

/// Parameters that may ride the GET transport as query parameters.
const GET_PARAMETERS: [&str; 5] = ["recursive", "proxies", "operations", "inherited", "locale"];

// ================================================================== endpoints

/// Where requests go: the management interface plus the upload endpoint
/// next to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    management: String,
    upload: String,
}

/// Deserializes through the constructors so configured URLs get the same
/// trailing-slash normalization; `upload` is optional and derived when
/// absent.
impl<'de> Deserialize<'de> for Endpoints {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            management: String,
            #[serde(default)]
            upload: Option<String>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let endpoints = Endpoints::new(raw.management);
        Ok(match raw.upload {
            Some(upload) => endpoints.with_upload(upload),
            None => endpoints,
        })
    }
}

impl Endpoints {
    /// Derives the upload endpoint from the management URL by appending
    /// `-upload`, the server's convention.
    pub fn new(management: impl Into<String>) -> Self {
        let management = trim_slash(management.into());
        let upload = format!("{management}-upload");
        Self { management, upload }
    }

    pub fn with_upload(mut self, upload: impl Into<String>) -> Self {
        self.upload = trim_slash(upload.into());
        self
    }

    pub fn management(&self) -> &str {
        &self.management
    }

    pub fn upload(&self) -> &str {
        &self.upload
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

// ================================================================= dispatcher

/// The management client. Holds one HTTP client, the endpoint configuration
/// and the process-state strategy selected for the session; safe to share
/// across callers, no per-call state.
pub struct Dispatcher {
    client: reqwest::Client,
    endpoints: Endpoints,
    strategy: Box<dyn ProcessStateStrategy + Send + Sync>,
    process_state_tx: Option<UnboundedSender<ProcessState>>,
}

impl Dispatcher {
    pub fn new(endpoints: Endpoints) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            strategy: Box::new(NoopStrategy),
            process_state_tx: None,
        }
    }

    /// Uses a preconfigured client, e.g. one carrying credentials or cookies.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Selects the process-state strategy for the session topology.
    pub fn with_strategy(
        mut self,
        strategy: impl ProcessStateStrategy + Send + Sync + 'static,
    ) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Publishes non-empty process states detected in successful responses.
    pub fn with_process_state_channel(mut self, tx: UnboundedSender<ProcessState>) -> Self {
        self.process_state_tx = Some(tx);
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // ------------------------------------------------------ execution

    /// Executes one operation and resolves to its `result` tree.
    pub async fn execute(&self, operation: &Operation) -> Result<ModelNode, DispatchError> {
        if operation.name().is_empty() {
            return Err(DispatchError::InvalidRequest {
                reason: "operation name must not be empty".to_string(),
            });
        }
        let envelope = if eligible_for_get(operation) {
            let url = self.get_url(operation);
            self.dispatch_get(&url, &operation.to_string()).await?
        } else {
            self.dispatch_post(operation.to_node(), &operation.to_string())
                .await?
        };
        Ok(envelope.get(keys::RESULT).clone())
    }

    /// Executes a batch as one round trip and splits the response into
    /// index-aligned per-step envelopes. An empty batch is not dispatched.
    pub async fn execute_composite(
        &self,
        composite: &Composite,
    ) -> Result<CompositeResult, DispatchError> {
        if composite.is_empty() {
            return Ok(CompositeResult::empty());
        }
        let envelope = self
            .dispatch_post(composite.to_node(), &composite.to_string())
            .await?;
        Ok(CompositeResult::from_result_node(
            envelope.get(keys::RESULT),
            composite.len(),
        ))
    }

    /// Uploads content to the upload endpoint as `multipart/form-data`: the
    /// file part plus an `operation` part carrying the encoded operation.
    pub async fn upload(
        &self,
        content: Vec<u8>,
        filename: &str,
        operation: &Operation,
    ) -> Result<ModelNode, DispatchError> {
        let encoded = encode_request(&operation.to_node())?;
        let form = Form::new()
            .part(
                "file",
                Part::bytes(content).file_name(filename.to_string()),
            )
            .text("operation", encoded);

        debug!("POST {} (upload {filename})", self.endpoints.upload);
        let response = self
            .client
            .post(&self.endpoints.upload)
            .header(reqwest::header::ACCEPT, APPLICATION_DMR_ENCODED)
            .header(CLIENT_NAME_HEADER, CLIENT_NAME)
            .multipart(form)
            .send()
            .await?;

        let (status, content_type, body) = split_response(response).await?;
        classify_status(
            status,
            self.endpoints.upload.clone(),
            format!("upload {filename} for {operation}"),
            body.clone(),
        )?;
        let envelope = process_upload(&content_type, &body);
        self.into_outcome(envelope).map(|e| e.get(keys::RESULT).clone())
    }

    // ------------------------------------------------------ transports

    async fn dispatch_get(&self, url: &str, summary: &str) -> Result<ModelNode, DispatchError> {
        debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, APPLICATION_DMR_ENCODED)
            .header(reqwest::header::CONTENT_TYPE, APPLICATION_DMR_ENCODED)
            .header(CLIENT_NAME_HEADER, CLIENT_NAME)
            .send()
            .await?;
        let (status, content_type, body) = split_response(response).await?;
        classify_status(status, url.to_string(), summary.to_string(), body.clone())?;
        self.into_outcome(process_dmr(HttpMethod::Get, &content_type, &body))
    }

    async fn dispatch_post(
        &self,
        node: ModelNode,
        summary: &str,
    ) -> Result<ModelNode, DispatchError> {
        let payload = encode_request(&node)?;
        debug!("POST {} ({summary})", self.endpoints.management);
        trace!("payload: {payload}");
        let response = self
            .client
            .post(&self.endpoints.management)
            .header(reqwest::header::ACCEPT, APPLICATION_DMR_ENCODED)
            .header(reqwest::header::CONTENT_TYPE, APPLICATION_DMR_ENCODED)
            .header(CLIENT_NAME_HEADER, CLIENT_NAME)
            .body(payload)
            .send()
            .await?;
        let (status, content_type, body) = split_response(response).await?;
        classify_status(
            status,
            self.endpoints.management.clone(),
            summary.to_string(),
            body.clone(),
        )?;
        self.into_outcome(process_dmr(HttpMethod::Post, &content_type, &body))
    }

    /// Splits a decoded envelope into the failed or success channel; on
    /// success, publishes any detected process state first.
    fn into_outcome(&self, envelope: ModelNode) -> Result<ModelNode, DispatchError> {
        if envelope.is_failure() {
            let description = envelope.failure_description();
            debug!("operation failed: {description}");
            return Err(DispatchError::OperationFailed { description });
        }
        if self.strategy.accepts(&envelope) {
            let process_state = self.strategy.process(&envelope);
            if !process_state.is_empty() {
                debug!("{} server(s) need attention", process_state.len());
                if let Some(tx) = &self.process_state_tx {
                    if tx.send(process_state).is_err() {
                        warn!("process state receiver dropped");
                    }
                }
            }
        }
        Ok(envelope)
    }

    // ------------------------------------------------------ url building

    fn get_url(&self, operation: &Operation) -> String {
        let mut url = format!(
            "{}{}?operation={}",
            self.endpoints.management,
            address_path(operation.address()),
            urlencoding::encode(operation.name())
        );
        for name in GET_PARAMETERS {
            let value = operation.param(name);
            if value.is_defined() {
                if let Ok(text) = value.as_string() {
                    url.push('&');
                    url.push_str(name);
                    url.push('=');
                    url.push_str(&urlencoding::encode(&text));
                }
            }
        }
        url
    }
}

/// Encodes a request body. A tree the wire format cannot carry is a
/// malformed request, never sent.
fn encode_request(node: &ModelNode) -> Result<String, DispatchError> {
    codec::to_base64(node).map_err(|error| DispatchError::InvalidRequest {
        reason: error.to_string(),
    })
}

/// Whether an operation may ride the GET transport: a read-only name, only
/// whitelisted parameters, no operation headers.
fn eligible_for_get(operation: &Operation) -> bool {
    READ_ONLY_OPERATIONS.contains(&operation.name())
        && !operation.has_headers()
        && operation
            .param_names()
            .iter()
            .all(|name| GET_PARAMETERS.contains(name))
}

async fn split_response(
    response: reqwest::Response,
) -> Result<(u16, String, String), DispatchError> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().await?;
    trace!("status {status}, content type '{content_type}', {} bytes", body.len());
    Ok((status, content_type, body))
}

/// The status table. Only 200 proceeds to payload decoding.
fn classify_status(
    status: u16,
    url: String,
    request: String,
    body: String,
) -> Result<(), DispatchError> {
    match status {
        200 => Ok(()),
        401 | 403 | 0 => Err(DispatchError::AuthenticationRequired { status }),
        404 => Err(DispatchError::InterfaceNotFound { url }),
        503 => Err(DispatchError::ServiceUnavailable),
        _ => Err(DispatchError::UnexpectedStatus {
            status,
            request,
            body,
        }),
    }
}
