//! Pay-per-call plumbing for an agent marketplace.
//!
//! Callers invoke third-party HTTP services ("agents") that may answer with
//! `402 Payment Required` before serving a result. This crate provides the two
//! halves that make such a call complete:
//!
//! - A [`ledger::SettlementLedger`] that accepts value transfers, mints one
//!   non-transferable receipt per payment, tracks referral attribution, and
//!   supports batched multi-recipient payment with exact refund of overpayment.
//! - A [`negotiation::NegotiationClient`] that issues the original request,
//!   detects a payment challenge, parses the demanded price, settles it through
//!   a signing provider, waits for finality, and retries the request carrying
//!   proof of payment.
//!
//! # Modules
//!
//! - [`ledger`] — the settlement ledger: payments, receipts, referrer stats.
//! - [`demand`] — parser for the heterogeneous 402 response bodies agents emit.
//! - [`price`] — conversion of quoted prices into smallest-unit amounts.
//! - [`negotiation`] — the call → challenge → pay → retry state machine.
//! - [`card`] — agent card and calling-convention descriptor types.
//! - [`transport`] — direct and relayed HTTP transports.
//! - [`signer`] — the signing-provider seam, plus a ledger-backed implementation.
//! - [`config`] — negotiation client configuration.
//! - [`types`] — shared newtypes (receipt ids, transaction hashes, timestamps).
//!
//! # Example
//!
//! A negotiation is driven by a [`card::CallDescriptor`] obtained from an agent
//! card, a [`transport::Transport`] pair, and a [`signer::SigningProvider`]:
//!
//! ```ignore
//! let client = NegotiationClient::new(direct, Some(relay), signer, config);
//! let outcome = client.call(&descriptor).await?;
//! ```

pub mod card;
pub mod config;
pub mod demand;
pub mod ledger;
pub mod negotiation;
pub mod price;
pub mod signer;
pub mod transport;
pub mod types;
pub mod util;
