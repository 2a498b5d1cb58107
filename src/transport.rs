//! Direct and relayed HTTP transports for agent calls.
//!
//! The negotiation client talks to agents through the [`Transport`] seam so
//! the same flow runs against a live HTTP stack or an in-memory double in
//! tests. Two implementations ship here:
//!
//! - [`HttpTransport`]: a direct reqwest-backed call.
//! - [`RelayTransport`]: forwards the request as a `{url, method, headers,
//!   body}` envelope to a relay endpoint that performs the call server-side,
//!   for callers whose direct path is blocked by cross-origin policy.
//!
//! The fallback policy (direct first, one relay attempt on transport failure)
//! belongs to the negotiation client, not the transports themselves.

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::Serialize;
use std::collections::HashMap;
use url::Url;

/// A request to an agent endpoint, transport-agnostic.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub method: Method,
    pub url: Url,
    /// Header name/value pairs, already resolved. The client omits headers
    /// with unresolved placeholders before handing the request over.
    pub headers: Vec<(String, String)>,
    /// JSON body text for POST/PUT calls.
    pub body: Option<String>,
}

/// An agent's response, enough for the negotiation flow: status, declared
/// content type, and the raw body.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl AgentResponse {
    /// Whether this response is a payment challenge.
    pub fn is_payment_required(&self) -> bool {
        self.status == StatusCode::PAYMENT_REQUIRED
    }
}

/// Transport-level failure: the request never produced an HTTP response.
/// HTTP error statuses are responses, not transport failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Network failure: {0}")]
    Network(#[source] reqwest::Error),
    #[error("Relay rejected the request: {0}")]
    Relay(String),
}

/// Executes an [`AgentRequest`] and returns the agent's response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError>;
}

/// Direct reqwest-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        HttpTransport { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .header(http::header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await.map_err(TransportError::Network)?;
        into_agent_response(response).await
    }
}

/// The envelope the relay endpoint accepts. Mirrors the relay's contract:
/// `{url, method, headers, body}` posted as JSON.
#[derive(Debug, Serialize)]
struct RelayEnvelope<'a> {
    url: &'a str,
    method: &'a str,
    headers: HashMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

/// Transport that performs the call through a relay endpoint.
#[derive(Debug, Clone)]
pub struct RelayTransport {
    client: reqwest::Client,
    relay_url: Url,
}

impl RelayTransport {
    pub fn new(client: reqwest::Client, relay_url: Url) -> Self {
        RelayTransport { client, relay_url }
    }
}

#[async_trait]
impl Transport for RelayTransport {
    async fn execute(&self, request: &AgentRequest) -> Result<AgentResponse, TransportError> {
        let envelope = RelayEnvelope {
            url: request.url.as_str(),
            method: request.method.as_str(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
            body: request.body.as_deref(),
        };
        let response = self
            .client
            .post(self.relay_url.clone())
            .json(&envelope)
            .send()
            .await
            .map_err(TransportError::Network)?;
        if response.status() == StatusCode::BAD_REQUEST {
            // The relay itself refused the envelope; that is not an agent
            // response and must not be mistaken for one.
            let text = response.text().await.unwrap_or_default();
            return Err(TransportError::Relay(text));
        }
        into_agent_response(response).await
    }
}

/// Sends through the direct transport, with exactly one relay attempt if the
/// direct path fails at the transport level. HTTP error statuses come back as
/// responses and are never relayed.
pub async fn send_with_fallback(
    direct: &dyn Transport,
    relay: Option<&dyn Transport>,
    request: &AgentRequest,
) -> Result<AgentResponse, TransportError> {
    match direct.execute(request).await {
        Ok(response) => Ok(response),
        Err(err) => {
            let Some(relay) = relay else {
                return Err(err);
            };
            tracing::warn!(url = %request.url, error = %err, "direct transport failed, trying relay");
            relay.execute(request).await
        }
    }
}

async fn into_agent_response(response: reqwest::Response) -> Result<AgentResponse, TransportError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(TransportError::Network)?
        .to_vec();
    Ok(AgentResponse {
        status,
        content_type,
        body,
    })
}
