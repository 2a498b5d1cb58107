//! Parser for the heterogeneous bodies agents attach to a payment challenge.
//!
//! There is no single wire format in the wild: some agents answer a 402 with
//! an offers collection in the x402 style, some nest the payment fields under
//! a `payment` key, and some put them at the top level. The parser tries one
//! serde shape per known variant, in priority order, first success wins.
//!
//! Whatever the shape, a demand is only accepted if it carries both a
//! well-formed payee address and an amount field. Nothing is guessed or
//! defaulted: a demand missing either is [`DemandError::Malformed`].

use serde::Deserialize;
use std::str::FromStr;

use crate::price::PriceInput;
use crate::types::Address;

/// A parsed payment demand, constructed fresh per negotiation attempt.
///
/// Never cached across calls: agents may quote a different price per request.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDemand {
    /// Destination of the payment.
    pub pay_to: Address,
    /// The quoted price, verbatim; normalized later by [`PriceInput::to_wei`].
    pub price: PriceInput,
    /// Settlement currency, if declared.
    pub currency: Option<String>,
    /// Settlement network, if declared.
    pub network: Option<String>,
    /// Human-readable description of what is being paid for.
    pub description: Option<String>,
}

/// Errors produced while extracting a demand from a challenge body.
#[derive(Debug, thiserror::Error)]
pub enum DemandError {
    /// No recognized shape yielded both a payee address and an amount.
    #[error("Malformed payment demand: {0}")]
    Malformed(String),
}

/// One offer inside an offers-collection body, or the payment fields of a
/// nested or flat body. Field aliases cover the encodings seen in the wild.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOffer {
    #[serde(alias = "payTo")]
    address: Option<String>,
    #[serde(alias = "maxAmountRequired", alias = "amount")]
    price: Option<PriceInput>,
    currency: Option<String>,
    network: Option<String>,
    description: Option<String>,
}

/// Offers-collection shape: `{"accepts": [ ... ]}`. The first offer wins.
#[derive(Debug, Deserialize)]
struct OffersBody {
    accepts: Vec<RawOffer>,
}

/// Singly-nested shape: payment fields one level under `"payment"`.
#[derive(Debug, Deserialize)]
struct NestedBody {
    payment: RawOffer,
}

impl RawOffer {
    fn into_demand(self) -> Result<PaymentDemand, DemandError> {
        let address = self
            .address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| DemandError::Malformed("missing payee address".to_string()))?;
        let pay_to = Address::from_str(address.trim())
            .map_err(|_| DemandError::Malformed(format!("invalid payee address: {address}")))?;
        let price = self
            .price
            .ok_or_else(|| DemandError::Malformed("missing amount field".to_string()))?;
        Ok(PaymentDemand {
            pay_to,
            price,
            currency: self.currency,
            network: self.network,
            description: self.description,
        })
    }
}

impl PaymentDemand {
    /// Extracts a demand from a challenge body of unknown shape.
    ///
    /// Shapes are tried in priority order: offers collection, then nested,
    /// then flat. A shape only matches if it yields both required fields, so
    /// a body that structurally resembles one shape but lacks a payee or an
    /// amount falls through to the next before failing as malformed.
    pub fn parse(body: &[u8]) -> Result<Self, DemandError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| DemandError::Malformed(format!("not a JSON body: {e}")))?;
        Self::from_value(&value)
    }

    /// Same as [`PaymentDemand::parse`], for an already-decoded JSON value.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DemandError> {
        if let Ok(offers) = OffersBody::deserialize(value) {
            if let Some(first) = offers.accepts.into_iter().next() {
                if let Ok(demand) = first.into_demand() {
                    return Ok(demand);
                }
            }
        }
        if let Ok(nested) = NestedBody::deserialize(value) {
            if let Ok(demand) = nested.payment.into_demand() {
                return Ok(demand);
            }
        }
        RawOffer::deserialize(value)
            .map_err(|e| DemandError::Malformed(e.to_string()))?
            .into_demand()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYEE: &str = "0x00000000000000000000000000000000000000aa";

    fn parse(value: serde_json::Value) -> Result<PaymentDemand, DemandError> {
        PaymentDemand::from_value(&value)
    }

    #[test]
    fn flat_shape() {
        let demand = parse(json!({"address": PAYEE, "price": "0.001"})).unwrap();
        assert_eq!(demand.pay_to, Address::from_str(PAYEE).unwrap());
        assert_eq!(demand.price, PriceInput::from("0.001"));
    }

    #[test]
    fn flat_shape_numeric_price() {
        let demand = parse(json!({"address": PAYEE, "price": 0.5})).unwrap();
        assert_eq!(demand.price, PriceInput::Number(0.5));
    }

    #[test]
    fn nested_shape() {
        let demand = parse(json!({
            "error": "Payment required",
            "payment": {
                "address": PAYEE,
                "price": "0.01",
                "currency": "ETH",
                "network": "sepolia"
            }
        }))
        .unwrap();
        assert_eq!(demand.pay_to, Address::from_str(PAYEE).unwrap());
        assert_eq!(demand.currency.as_deref(), Some("ETH"));
        assert_eq!(demand.network.as_deref(), Some("sepolia"));
    }

    #[test]
    fn offers_shape_with_pay_to_alias() {
        let demand = parse(json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "base",
                "payTo": PAYEE,
                "maxAmountRequired": "10000000000000000",
                "description": "agent call"
            }]
        }))
        .unwrap();
        assert_eq!(demand.pay_to, Address::from_str(PAYEE).unwrap());
        assert_eq!(demand.price, PriceInput::from("10000000000000000"));
        assert_eq!(demand.description.as_deref(), Some("agent call"));
    }

    #[test]
    fn amount_alias_accepted() {
        let demand = parse(json!({"address": PAYEE, "amount": "0.2"})).unwrap();
        assert_eq!(demand.price, PriceInput::from("0.2"));
    }

    #[test]
    fn offers_take_priority_over_flat() {
        let other = "0x00000000000000000000000000000000000000bb";
        let demand = parse(json!({
            "address": other,
            "price": "9",
            "accepts": [{"payTo": PAYEE, "amount": "1"}]
        }))
        .unwrap();
        assert_eq!(demand.pay_to, Address::from_str(PAYEE).unwrap());
        assert_eq!(demand.price, PriceInput::from("1"));
    }

    #[test]
    fn incomplete_offer_falls_through_to_flat() {
        let demand = parse(json!({
            "address": PAYEE,
            "price": "3",
            "accepts": [{"network": "base"}]
        }))
        .unwrap();
        assert_eq!(demand.pay_to, Address::from_str(PAYEE).unwrap());
        assert_eq!(demand.price, PriceInput::from("3"));
    }

    #[test]
    fn missing_payee_is_malformed() {
        assert!(parse(json!({"price": "0.001"})).is_err());
    }

    #[test]
    fn empty_payee_is_malformed() {
        assert!(parse(json!({"address": "  ", "price": "0.001"})).is_err());
    }

    #[test]
    fn invalid_payee_is_malformed() {
        assert!(parse(json!({"address": "not-an-address", "price": "0.001"})).is_err());
    }

    #[test]
    fn missing_amount_is_malformed() {
        assert!(parse(json!({"address": PAYEE})).is_err());
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(PaymentDemand::parse(b"Payment required").is_err());
    }
}
