//! Conversion of quoted prices into smallest-unit amounts.
//!
//! Agents quote prices in whatever form their tooling produces: a decimal
//! string in display units (`"0.001"`), a bare number, or an integer that is
//! already denominated in the smallest unit. [`PriceInput::to_wei`] folds all
//! of these into a single [`U256`] smallest-unit amount, or rejects the quote.
//!
//! Two guards apply on every path:
//! - non-numeric or non-positive quotes fail with [`PriceError::Format`];
//! - quotes whose display-unit equivalent exceeds [`MAX_DISPLAY_UNITS`] fail
//!   with [`PriceError::TooLarge`], so a malformed or hostile demand cannot
//!   drain a wallet.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::ops::Mul;
use std::str::FromStr;

use crate::types::U256;

/// Decimal places of the settlement currency: one display unit is `10^18`
/// smallest units (the wei convention).
pub const DISPLAY_UNIT_DECIMALS: u32 = 18;

/// Ceiling on a single demanded price, in display units.
pub const MAX_DISPLAY_UNITS: u64 = 1000;

/// Values at or above this magnitude are taken to be already expressed in the
/// smallest unit. `10^15` smallest units is 0.001 display units, far above any
/// plausible display-unit quote and far below any plausible smallest-unit one.
pub const SMALLEST_UNIT_THRESHOLD: &str = "1000000000000000";

static THRESHOLD: Lazy<Decimal> =
    Lazy::new(|| Decimal::from_str(SMALLEST_UNIT_THRESHOLD).expect("valid decimal"));
static MAX_DISPLAY: Lazy<Decimal> = Lazy::new(|| Decimal::from(MAX_DISPLAY_UNITS));
static MAX_WEI: Lazy<U256> = Lazy::new(|| {
    U256::from(MAX_DISPLAY_UNITS).mul(U256::from(10).pow(U256::from(DISPLAY_UNIT_DECIMALS)))
});
static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.\-]+").expect("valid regex"));

/// Errors produced while normalizing a quoted price.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    /// The quote is not a usable number: unparsable, zero, negative, or more
    /// precise than the settlement currency can represent.
    #[error("Invalid price format: {0}")]
    Format(String),
    /// The quote exceeds the [`MAX_DISPLAY_UNITS`] display-unit ceiling.
    #[error("Price exceeds the {MAX_DISPLAY_UNITS}-unit ceiling: {0}")]
    TooLarge(String),
}

/// A price as it appears in a payment demand, before normalization.
///
/// Demands carry prices either as JSON strings or as JSON numbers; both are
/// preserved verbatim until [`PriceInput::to_wei`] is called, since the
/// smallest-unit-vs-display-unit decision needs the original magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Text(String),
    Number(f64),
}

impl Display for PriceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceInput::Text(s) => write!(f, "{}", s),
            PriceInput::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        PriceInput::Text(value.to_string())
    }
}

impl From<f64> for PriceInput {
    fn from(value: f64) -> Self {
        PriceInput::Number(value)
    }
}

impl PriceInput {
    /// Normalizes the quote into a smallest-unit amount.
    ///
    /// Magnitude at or above [`SMALLEST_UNIT_THRESHOLD`] means the value is
    /// already in smallest units and must be integral; anything below is a
    /// display-unit quote and is scaled by `10^18`. The conversion is exact
    /// decimal arithmetic, never floating point.
    pub fn to_wei(&self) -> Result<U256, PriceError> {
        let parsed = match self {
            PriceInput::Text(s) => {
                // Strip currency symbols and grouping separators.
                let cleaned = NON_NUMERIC.replace_all(s, "").to_string();
                Decimal::from_str(&cleaned)
                    .map_err(|_| PriceError::Format(self.to_string()))?
            }
            PriceInput::Number(n) => {
                Decimal::from_f64(*n).ok_or_else(|| PriceError::Format(self.to_string()))?
            }
        };

        if parsed.is_sign_negative() || parsed.is_zero() {
            return Err(PriceError::Format(self.to_string()));
        }

        let wei = if parsed >= *THRESHOLD {
            // Already smallest-unit. Fractional smallest units do not exist.
            let normalized = parsed.normalize();
            if normalized.scale() > 0 {
                return Err(PriceError::Format(self.to_string()));
            }
            U256::from(normalized.mantissa().unsigned_abs())
        } else {
            if parsed > *MAX_DISPLAY {
                return Err(PriceError::TooLarge(self.to_string()));
            }
            let scale = parsed.scale();
            if scale > DISPLAY_UNIT_DECIMALS {
                return Err(PriceError::Format(self.to_string()));
            }
            let multiplier = U256::from(10).pow(U256::from(DISPLAY_UNIT_DECIMALS - scale));
            U256::from(parsed.mantissa().unsigned_abs()).mul(multiplier)
        };

        if wei > *MAX_WEI {
            return Err(PriceError::TooLarge(self.to_string()));
        }
        Ok(wei)
    }
}
