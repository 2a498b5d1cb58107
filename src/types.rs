//! Shared newtypes used across the ledger and the negotiation client.
//!
//! Amounts are unsigned 256-bit smallest-unit integers ([`U256`]), addresses
//! are fixed-width EVM addresses ([`Address`]). The types here wrap the raw
//! primitives where the wire format or the domain meaning calls for it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::time::{SystemTime, UNIX_EPOCH};

pub use alloy_primitives::{Address, U256};

/// Identifier of a minted receipt. Dense, 1-based, assigned by the ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub u64);

impl Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ReceiptId {
    fn from(value: u64) -> Self {
        ReceiptId(value)
    }
}

/// A 32-byte transaction hash, encoded as 0x-prefixed hex string on the wire.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransactionHash(pub [u8; 32]);

static TX_HASH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("invalid regex"));

impl TransactionHash {
    /// Parses a `0x`-prefixed 64-hex-character transaction hash.
    pub fn parse(s: &str) -> Option<Self> {
        if !TX_HASH_REGEX.is_match(s) {
            return None;
        }
        let bytes = hex::decode(s.trim_start_matches("0x")).ok()?;
        let array: [u8; 32] = bytes.try_into().ok()?;
        Some(TransactionHash(array))
    }
}

impl Debug for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionHash(0x{})", hex::encode(self.0))
    }
}

impl Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for TransactionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TransactionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TransactionHash::parse(&s)
            .ok_or_else(|| serde::de::Error::custom("Invalid transaction hash format"))
    }
}

/// A Unix timestamp in seconds, as recorded on payment records.
///
/// Serialized as a stringified integer to avoid loss of precision in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    /// The current wall-clock time. Falls back to the epoch if the system
    /// clock reads as pre-1970, which keeps record creation infallible.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        UnixTimestamp(secs)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let ts = s
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom("timestamp must be a non-negative integer"))?;
        Ok(UnixTimestamp(ts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_hash_roundtrip() {
        let s = "0x4242424242424242424242424242424242424242424242424242424242424242";
        let hash = TransactionHash::parse(s).unwrap();
        assert_eq!(hash.to_string(), s);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{s}\""));
        let back: TransactionHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn transaction_hash_rejects_malformed() {
        assert!(TransactionHash::parse("0x1234").is_none());
        assert!(TransactionHash::parse("not-a-hash").is_none());
        assert!(
            TransactionHash::parse(
                "4242424242424242424242424242424242424242424242424242424242424242"
            )
            .is_none()
        );
    }

    #[test]
    fn receipt_id_serializes_transparent() {
        let id = ReceiptId(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }
}
