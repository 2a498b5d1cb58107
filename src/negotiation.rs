//! The call → challenge → pay → retry state machine.
//!
//! One invocation of [`NegotiationClient::call`] performs at most one original
//! request, one payment, and one retry:
//!
//! ```text
//! Idle → Sent → Success
//!             → ChallengeReceived → Paying → PaymentConfirmed → Retried → Success
//!             → TransportFailure → relay fallback (once) → …
//! ```
//!
//! A payment challenge is an HTTP 402 whose body parses into a
//! [`PaymentDemand`]. The demanded price is normalized, settled through the
//! signing provider, and, once final, the original request is re-issued
//! carrying the proof-of-payment header. A second 402 after payment is a
//! terminal failure — the client never pays twice for one logical call.

use std::sync::Arc;
use tracing::instrument;

use crate::card::{CallDescriptor, ProofEncoding};
use crate::config::NegotiationConfig;
use crate::demand::{DemandError, PaymentDemand};
use crate::price::PriceError;
use crate::signer::{SignerError, SigningProvider};
use crate::transport::{
    AgentRequest, AgentResponse, RelayTransport, Transport, TransportError, send_with_fallback,
};
use crate::types::{Address, ReceiptId, TransactionHash, U256};
use crate::util::b64_encode;

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;

/// Name of the proof-of-payment header.
pub const PAYMENT_HEADER: &str = "X-Payment";

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[A-Za-z0-9_-]+\}").expect("valid regex"));

/// Negotiation failures, classified before they reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The request produced no HTTP response, on the direct path and (when
    /// configured) on the single relay fallback.
    #[error("Transport failure: {0}")]
    Transport(#[source] TransportError),
    /// The 402 body did not yield a usable payment demand.
    #[error(transparent)]
    MalformedDemand(#[from] DemandError),
    /// The demanded price was unusable or above the ceiling. No payment was
    /// attempted.
    #[error(transparent)]
    Price(#[from] PriceError),
    /// The caller declined to sign. Never retried.
    #[error("Payment cancelled by user")]
    UserCancelled,
    #[error("Insufficient funds for payment")]
    InsufficientFunds,
    #[error("Wrong network: {0}")]
    NetworkMismatch(String),
    /// The transfer was submitted or executed and failed.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),
    /// Finality was not confirmed within the configured window. Distinct from
    /// a rejected transaction; the payment may still confirm later.
    #[error("Timed out waiting for payment finality")]
    FinalityTimeout,
    /// The agent demanded payment again after being paid. Terminal.
    #[error("Agent demanded payment again after being paid")]
    UnexpectedSecondChallenge,
}

/// The single payment made during a negotiation, if one was needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentProof {
    pub transaction: TransactionHash,
    /// Receipt minted by the settlement ledger, when observable.
    pub receipt_id: Option<ReceiptId>,
    pub amount: U256,
    pub pay_to: Address,
}

/// Result of a completed negotiation: the agent's final response and the
/// payment that unlocked it, if any.
#[derive(Debug)]
pub struct NegotiationOutcome {
    pub response: AgentResponse,
    pub payment: Option<PaymentProof>,
}

/// Drives the pay-per-call flow against a direct transport, an optional
/// relay, and a signing provider.
///
/// Each call is an independent state machine; the client holds no per-call
/// state, so concurrent calls only share the transports and the provider.
pub struct NegotiationClient {
    direct: Arc<dyn Transport>,
    relay: Option<Arc<dyn Transport>>,
    signer: Arc<dyn SigningProvider>,
    config: NegotiationConfig,
}

impl NegotiationClient {
    /// When no relay transport is supplied but the config names a relay URL,
    /// a [`RelayTransport`] is built from it, so `PAYCALL_RELAY_URL` takes
    /// effect through [`NegotiationConfig::from_env`]. An explicit `relay`
    /// argument always wins.
    pub fn new(
        direct: Arc<dyn Transport>,
        relay: Option<Arc<dyn Transport>>,
        signer: Arc<dyn SigningProvider>,
        config: NegotiationConfig,
    ) -> Self {
        let relay = relay.or_else(|| {
            config.relay_url.as_ref().map(|url| {
                Arc::new(RelayTransport::new(reqwest::Client::new(), url.clone()))
                    as Arc<dyn Transport>
            })
        });
        NegotiationClient {
            direct,
            relay,
            signer,
            config,
        }
    }

    /// Performs one pay-per-call invocation as described by `descriptor`.
    ///
    /// Non-402 responses are returned as-is, whatever their status; deciding
    /// what a 500 means is the caller's business. A 402 triggers exactly one
    /// payment and exactly one retry.
    #[instrument(skip_all, fields(agent = %descriptor.agent_name, url = %descriptor.url))]
    pub async fn call(
        &self,
        descriptor: &CallDescriptor,
    ) -> Result<NegotiationOutcome, NegotiationError> {
        let request = build_request(descriptor, None)?;
        let response = self.send(&request).await?;
        tracing::debug!(status = %response.status, "original request answered");

        if !response.is_payment_required() {
            return Ok(NegotiationOutcome {
                response,
                payment: None,
            });
        }

        // ChallengeReceived: parse the demand and normalize the price before
        // any value moves. Failure here aborts with no payment attempted.
        let demand = PaymentDemand::parse(&response.body)?;
        let amount = demand.price.to_wei()?;
        tracing::info!(pay_to = %demand.pay_to, amount = %amount, "payment challenge received");

        // Paying. Calls to the signing provider are serialized within the
        // flow: propose, then await finality, never both in flight.
        let description = format!("Payment for Agent: {}", descriptor.agent_name);
        let transaction = self
            .signer
            .propose_payment(demand.pay_to, amount, &description)
            .await
            .map_err(classify_signer_error)?;
        tracing::info!(transaction = %transaction, "payment submitted");

        let finality = tokio::time::timeout(
            self.config.finality_timeout,
            self.signer
                .wait_for_finality(transaction, self.config.finality_timeout),
        )
        .await
        .map_err(|_| NegotiationError::FinalityTimeout)?
        .map_err(classify_signer_error)?;
        tracing::info!(transaction = %finality.transaction, receipt_id = ?finality.receipt_id, "payment final");

        let proof = PaymentProof {
            transaction: finality.transaction,
            receipt_id: finality.receipt_id,
            amount,
            pay_to: demand.pay_to,
        };

        // Retried: one re-issue carrying the proof; a second challenge is
        // terminal, never another payment.
        let proof_value = encode_proof(&finality.transaction, descriptor.proof_encoding);
        let retry = build_request(descriptor, Some(&proof_value))?;
        let response = self.send(&retry).await?;
        tracing::debug!(status = %response.status, "retried request answered");

        if response.is_payment_required() {
            return Err(NegotiationError::UnexpectedSecondChallenge);
        }
        Ok(NegotiationOutcome {
            response,
            payment: Some(proof),
        })
    }

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, NegotiationError> {
        send_with_fallback(self.direct.as_ref(), self.relay.as_deref(), request)
            .await
            .map_err(NegotiationError::Transport)
    }
}

/// Encodes a finalized transaction hash per the callee's declared convention.
fn encode_proof(transaction: &TransactionHash, encoding: ProofEncoding) -> String {
    match encoding {
        ProofEncoding::Base64 => b64_encode(transaction.to_string()),
        ProofEncoding::Raw => transaction.to_string(),
    }
}

/// Materializes the descriptor into a concrete request.
///
/// Declared headers holding an unresolved `{...}` placeholder are omitted
/// until a payment proof exists, then resolved with it. The proof header
/// itself is added on the retry when no declared header already carries it.
/// GET/DELETE parameters go to the query string, POST/PUT parameters to a
/// JSON body.
fn build_request(
    descriptor: &CallDescriptor,
    proof: Option<&str>,
) -> Result<AgentRequest, NegotiationError> {
    let mut headers = Vec::new();
    let mut proof_carried = false;
    for (name, value) in &descriptor.headers {
        if PLACEHOLDER.is_match(value) {
            let Some(proof) = proof else { continue };
            headers.push((name.clone(), PLACEHOLDER.replace_all(value, proof).to_string()));
            proof_carried = proof_carried || name.eq_ignore_ascii_case(PAYMENT_HEADER);
        } else {
            headers.push((name.clone(), value.clone()));
        }
    }
    if let Some(proof) = proof {
        if !proof_carried {
            headers.push((PAYMENT_HEADER.to_string(), proof.to_string()));
        }
    }

    let mut url = descriptor.url.clone();
    let mut body = None;
    if descriptor.method == Method::GET || descriptor.method == Method::DELETE {
        if let serde_json::Value::Object(params) = &descriptor.params {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                match value {
                    serde_json::Value::String(s) => pairs.append_pair(key, s),
                    other => pairs.append_pair(key, &other.to_string()),
                };
            }
        }
    } else if !descriptor.params.is_null() {
        body = Some(descriptor.params.to_string());
    }

    Ok(AgentRequest {
        method: descriptor.method.clone(),
        url,
        headers,
        body,
    })
}

fn classify_signer_error(err: SignerError) -> NegotiationError {
    match err {
        SignerError::Cancelled => NegotiationError::UserCancelled,
        SignerError::InsufficientFunds => NegotiationError::InsufficientFunds,
        SignerError::NetworkMismatch(network) => NegotiationError::NetworkMismatch(network),
        SignerError::Timeout => NegotiationError::FinalityTimeout,
        SignerError::Rejected(reason) => NegotiationError::PaymentFailed(reason),
    }
}
