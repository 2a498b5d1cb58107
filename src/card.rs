//! Agent card and calling-convention descriptor types.
//!
//! An agent card is the self-description an agent publishes: what it does,
//! where its task endpoint lives, how it wants to be called, and how it wants
//! payment proof delivered. The negotiation client consumes a distilled
//! [`CallDescriptor`] rather than the card itself.

use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use crate::price::PriceInput;
use crate::transport::{AgentRequest, Transport, TransportError, send_with_fallback};

/// An agent card, A2A-style. Unknown fields are ignored; every section is
/// optional except the name and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Endpoints>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calling: Option<CallingConvention>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSection>,
}

/// One capability an agent advertises, with optional pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_card: Option<Url>,
}

/// How the agent wants to be called: method, extra headers, and the encoding
/// it expects for the proof-of-payment header value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallingConvention {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Static payment defaults the agent declares on its card. Informational;
/// the authoritative price and payee always come from the 402 challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Encoding for the proof-of-payment header value.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ProofEncoding {
    /// Base64 of the textual transaction hash. The default when a card
    /// declares no convention.
    #[default]
    Base64,
    /// The textual transaction hash as-is.
    Raw,
}

impl ProofEncoding {
    /// Maps a card's declared `calling.format` onto an encoding. Absence or
    /// an unrecognized value means the default.
    pub fn from_declared(format: Option<&str>) -> Self {
        match format.map(str::trim) {
            Some("raw") | Some("hex") => ProofEncoding::Raw,
            _ => ProofEncoding::Base64,
        }
    }
}

/// Everything the negotiation client needs to issue one agent call.
#[derive(Debug, Clone)]
pub struct CallDescriptor {
    /// Display name, used in the payment description.
    pub agent_name: String,
    pub method: Method,
    pub url: Url,
    /// Declared headers, possibly containing unresolved `{...}` placeholders.
    pub headers: Vec<(String, String)>,
    /// Request parameters: query string for GET/DELETE, JSON body otherwise.
    pub params: serde_json::Value,
    pub proof_encoding: ProofEncoding,
}

impl CallDescriptor {
    pub fn new(agent_name: impl Into<String>, method: Method, url: Url) -> Self {
        CallDescriptor {
            agent_name: agent_name.into(),
            method,
            url,
            headers: Vec::new(),
            params: serde_json::Value::Null,
            proof_encoding: ProofEncoding::default(),
        }
    }

    /// Builds a descriptor for an agent card's task endpoint, honoring the
    /// card's calling convention where declared.
    pub fn for_card(card: &AgentCard) -> Option<Self> {
        let url = card.endpoints.as_ref()?.task.clone()?;
        let calling = card.calling.as_ref();
        let method = calling
            .and_then(|c| c.method.as_deref())
            .and_then(|m| m.to_uppercase().parse::<Method>().ok())
            .unwrap_or(Method::POST);
        let headers = calling
            .map(|c| {
                c.headers
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let proof_encoding =
            ProofEncoding::from_declared(calling.and_then(|c| c.format.as_deref()));
        Some(CallDescriptor {
            agent_name: card.name.clone(),
            method,
            url,
            headers,
            params: serde_json::Value::Null,
            proof_encoding,
        })
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

/// Errors produced while fetching an agent card.
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Agent card endpoint answered {0}")]
    HttpStatus(http::StatusCode),
    #[error("Agent card is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Fetches and parses an agent card, trying the direct transport first and
/// falling back to the relay once on transport failure.
pub async fn fetch_agent_card(
    direct: &dyn Transport,
    relay: Option<&dyn Transport>,
    url: &Url,
) -> Result<AgentCard, CardError> {
    let request = AgentRequest {
        method: Method::GET,
        url: url.clone(),
        headers: vec![("Accept".to_string(), "application/json".to_string())],
        body: None,
    };
    let response = send_with_fallback(direct, relay, &request).await?;
    if !response.status.is_success() {
        return Err(CardError::HttpStatus(response.status));
    }
    serde_json::from_slice(&response.body).map_err(CardError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_card() -> serde_json::Value {
        json!({
            "name": "Summarizer",
            "description": "Summarizes documents",
            "version": "1.2.0",
            "capabilities": [{
                "name": "summarize",
                "description": "Summarize a document",
                "pricing": { "price": "0.001", "currency": "ETH" }
            }],
            "endpoints": {
                "task": "https://agent.example/task",
                "agentCard": "https://agent.example/card"
            },
            "calling": {
                "method": "post",
                "headers": { "X-Payment": "{X_PAYMENT}" },
                "format": "base64"
            },
            "payment": { "currency": "ETH", "network": "sepolia" }
        })
    }

    #[test]
    fn card_parses_with_unknown_fields_ignored() {
        let mut value = sample_card();
        value["@context"] = json!("https://example.org/a2a");
        let card: AgentCard = serde_json::from_value(value).unwrap();
        assert_eq!(card.name, "Summarizer");
        assert_eq!(card.capabilities.len(), 1);
        assert_eq!(
            card.capabilities[0].pricing.as_ref().unwrap().price,
            Some(PriceInput::from("0.001"))
        );
    }

    #[test]
    fn descriptor_honors_calling_convention() {
        let card: AgentCard = serde_json::from_value(sample_card()).unwrap();
        let descriptor = CallDescriptor::for_card(&card).unwrap();
        assert_eq!(descriptor.method, Method::POST);
        assert_eq!(descriptor.url.as_str(), "https://agent.example/task");
        assert_eq!(
            descriptor.headers,
            vec![("X-Payment".to_string(), "{X_PAYMENT}".to_string())]
        );
        assert_eq!(descriptor.proof_encoding, ProofEncoding::Base64);
    }

    #[test]
    fn descriptor_defaults_without_convention() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Plain",
            "description": "No convention",
            "endpoints": { "task": "https://agent.example/run" }
        }))
        .unwrap();
        let descriptor = CallDescriptor::for_card(&card).unwrap();
        assert_eq!(descriptor.method, Method::POST);
        assert_eq!(descriptor.proof_encoding, ProofEncoding::Base64);
        assert!(descriptor.headers.is_empty());
    }

    #[test]
    fn card_without_task_endpoint_yields_no_descriptor() {
        let card: AgentCard = serde_json::from_value(json!({
            "name": "Cardless",
            "description": "No endpoints"
        }))
        .unwrap();
        assert!(CallDescriptor::for_card(&card).is_none());
    }

    #[test]
    fn raw_format_selects_raw_encoding() {
        assert_eq!(ProofEncoding::from_declared(Some("raw")), ProofEncoding::Raw);
        assert_eq!(ProofEncoding::from_declared(Some("hex")), ProofEncoding::Raw);
        assert_eq!(ProofEncoding::from_declared(None), ProofEncoding::Base64);
        assert_eq!(
            ProofEncoding::from_declared(Some("base64")),
            ProofEncoding::Base64
        );
    }
}
