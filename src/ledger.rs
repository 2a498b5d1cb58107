//! The settlement ledger: value transfers, receipts, and referral attribution.
//!
//! The ledger records one immutable [`PaymentRecord`] per accepted payment and
//! mints a non-transferable receipt for it, owned by the payer. Batched
//! payments settle several recipients in one call and refund any overpayment
//! exactly. Referral codes attached to payments are counted per code, with
//! empty codes excluded from all statistics.
//!
//! Every mutating call is a single atomic transition: all validation happens
//! before the first state change, so a failed call leaves the ledger exactly
//! as it was. The guarantee comes from `&mut self` exclusivity plus the
//! validate-then-apply discipline inside each operation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

use crate::types::{Address, ReceiptId, U256, UnixTimestamp};

/// Upper bound on the payment description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Upper bound on a referrer code, in characters.
pub const MAX_REFERRER_CODE_LEN: usize = 100;

/// Probability of the common rarity class, in percent. The remainder is rare.
pub const COMMON_PROBABILITY: u8 = 70;

/// Errors surfaced verbatim by ledger operations. Any error aborts the
/// enclosing call with no state change.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Payment value must be greater than zero.
    #[error("Payment amount must be greater than 0")]
    InvalidAmount,
    /// The recipient is the zero address.
    #[error("Invalid recipient")]
    InvalidRecipient,
    /// Batch arrays differ in length.
    #[error("Arrays length mismatch")]
    ArrayLengthMismatch,
    /// The value supplied does not cover the sum of batch amounts.
    #[error("Insufficient value: need {required}, supplied {supplied}")]
    InsufficientValue { required: U256, supplied: U256 },
    /// No receipt exists under the given id.
    #[error("Token does not exist: {0}")]
    TokenNotFound(ReceiptId),
    /// Description exceeds [`MAX_DESCRIPTION_LEN`] characters.
    #[error("Description too long: {0} characters")]
    DescriptionTooLong(usize),
    /// Referrer code exceeds [`MAX_REFERRER_CODE_LEN`] characters.
    #[error("Referrer code too long: {0} characters")]
    ReferrerCodeTooLong(usize),
    /// An amount sum does not fit in 256 bits. Wrapping here would mint
    /// receipts against value the payer never supplied.
    #[error("Amount overflow")]
    AmountOverflow,
}

/// Rarity class assigned to a receipt at creation, via an independent
/// weighted draw per payment.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
}

/// One accepted payment. Immutable once created, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: ReceiptId,
    pub payer: Address,
    pub recipient: Address,
    pub amount: U256,
    pub description: String,
    /// Trimmed referrer code; empty when the payment carried none.
    pub referrer_code: String,
    pub rarity: Rarity,
    pub timestamp: UnixTimestamp,
}

/// One entry of a batch payment.
#[derive(Debug, Clone)]
pub struct BatchEntry {
    pub recipient: Address,
    pub amount: U256,
    pub description: String,
}

/// Result of a successful batch payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Receipt ids minted for the batch, in entry order.
    pub receipt_ids: Vec<ReceiptId>,
    /// Excess value returned to the payer, exactly `value - sum(amounts)`.
    pub refund: U256,
}

#[derive(Debug, Default)]
struct ReferrerStat {
    count: u64,
    receipt_ids: Vec<ReceiptId>,
}

/// The settlement ledger. Generic over the randomness source used for the
/// rarity draw so tests can seed it; defaults to OS-seeded [`StdRng`].
#[derive(Debug)]
pub struct SettlementLedger<R: Rng = StdRng> {
    /// Records in id order; the receipt with id `n` lives at index `n - 1`.
    records: Vec<PaymentRecord>,
    tokens_by_owner: HashMap<Address, Vec<ReceiptId>>,
    payments_by_recipient: HashMap<Address, Vec<ReceiptId>>,
    referrer_stats: HashMap<String, ReferrerStat>,
    /// Codes in first-seen order, for stable listings.
    referrer_list: Vec<String>,
    /// Value credited to each address by completed calls, refunds included.
    credits: HashMap<Address, U256>,
    value_received: U256,
    value_disbursed: U256,
    rng: R,
}

impl SettlementLedger<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }
}

impl Default for SettlementLedger<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> SettlementLedger<R> {
    /// Creates a ledger with an explicit randomness source for the rarity
    /// draw. Use a seeded rng for deterministic tests.
    pub fn with_rng(rng: R) -> Self {
        SettlementLedger {
            records: Vec::new(),
            tokens_by_owner: HashMap::new(),
            payments_by_recipient: HashMap::new(),
            referrer_stats: HashMap::new(),
            referrer_list: Vec::new(),
            credits: HashMap::new(),
            value_received: U256::ZERO,
            value_disbursed: U256::ZERO,
            rng,
        }
    }

    /// Accepts a payment of `value` from `payer`, forwards the full value to
    /// `recipient`, and mints one receipt owned by the payer.
    ///
    /// A non-empty `referrer_code` (after trimming) attributes the payment to
    /// that code. Record creation and the transfer happen in one atomic step.
    #[instrument(skip(self), fields(payer = %payer, recipient = %recipient, value = %value))]
    pub fn make_payment(
        &mut self,
        payer: Address,
        recipient: Address,
        description: &str,
        referrer_code: &str,
        value: U256,
    ) -> Result<ReceiptId, LedgerError> {
        self.validate_entry(recipient, value, description)?;
        let referrer = validate_referrer(referrer_code)?;
        let received = self
            .value_received
            .checked_add(value)
            .ok_or(LedgerError::AmountOverflow)?;

        self.value_received = received;
        let id = self.mint(payer, recipient, value, description.to_string(), referrer);
        self.credit(recipient, value);
        tracing::info!(id = %id, "payment settled");
        Ok(id)
    }

    /// Settles a batch of payments in one call, minting one receipt per entry
    /// and refunding `value - sum(amounts)` to the payer.
    ///
    /// All-or-nothing: any invalid entry, or `sum(amounts) > value`, fails the
    /// whole call before anything is minted or moved.
    #[instrument(skip_all, fields(payer = %payer, entries = recipients.len(), value = %value))]
    pub fn make_batch_payment(
        &mut self,
        payer: Address,
        recipients: &[Address],
        amounts: &[U256],
        descriptions: &[String],
        value: U256,
    ) -> Result<BatchOutcome, LedgerError> {
        if recipients.len() != amounts.len() || recipients.len() != descriptions.len() {
            return Err(LedgerError::ArrayLengthMismatch);
        }

        let mut total = U256::ZERO;
        for ((recipient, amount), description) in
            recipients.iter().zip(amounts).zip(descriptions)
        {
            self.validate_entry(*recipient, *amount, description)?;
            total = total
                .checked_add(*amount)
                .ok_or(LedgerError::AmountOverflow)?;
        }
        if total > value {
            return Err(LedgerError::InsufficientValue {
                required: total,
                supplied: value,
            });
        }
        let received = self
            .value_received
            .checked_add(value)
            .ok_or(LedgerError::AmountOverflow)?;

        // Validation is complete: apply every entry, then the refund.
        self.value_received = received;
        let mut receipt_ids = Vec::with_capacity(recipients.len());
        for ((recipient, amount), description) in
            recipients.iter().zip(amounts).zip(descriptions)
        {
            let id = self.mint(payer, *recipient, *amount, description.clone(), None);
            self.credit(*recipient, *amount);
            receipt_ids.push(id);
        }
        let refund = value - total;
        if refund > U256::ZERO {
            self.credit(payer, refund);
        }
        tracing::info!(minted = receipt_ids.len(), refund = %refund, "batch settled");
        Ok(BatchOutcome {
            receipt_ids,
            refund,
        })
    }

    fn validate_entry(
        &self,
        recipient: Address,
        amount: U256,
        description: &str,
    ) -> Result<(), LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount);
        }
        if recipient == Address::ZERO {
            return Err(LedgerError::InvalidRecipient);
        }
        let len = description.chars().count();
        if len > MAX_DESCRIPTION_LEN {
            return Err(LedgerError::DescriptionTooLong(len));
        }
        Ok(())
    }

    /// Creates the record and receipt for one validated payment. Infallible:
    /// callers must have finished all validation.
    fn mint(
        &mut self,
        payer: Address,
        recipient: Address,
        amount: U256,
        description: String,
        referrer: Option<String>,
    ) -> ReceiptId {
        let id = ReceiptId(self.records.len() as u64 + 1);
        let rarity = self.draw_rarity();
        let referrer_code = referrer.unwrap_or_default();
        self.records.push(PaymentRecord {
            id,
            payer,
            recipient,
            amount,
            description,
            referrer_code: referrer_code.clone(),
            rarity,
            timestamp: UnixTimestamp::now(),
        });
        self.tokens_by_owner.entry(payer).or_default().push(id);
        self.payments_by_recipient
            .entry(recipient)
            .or_default()
            .push(id);
        if !referrer_code.is_empty() {
            let stat = match self.referrer_stats.entry(referrer_code.clone()) {
                std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                std::collections::hash_map::Entry::Vacant(e) => {
                    self.referrer_list.push(referrer_code);
                    e.insert(ReferrerStat::default())
                }
            };
            stat.count += 1;
            stat.receipt_ids.push(id);
        }
        id
    }

    fn credit(&mut self, account: Address, amount: U256) {
        *self.credits.entry(account).or_insert(U256::ZERO) += amount;
        self.value_disbursed += amount;
    }

    /// One independent weighted draw per payment.
    fn draw_rarity(&mut self) -> Rarity {
        if self.rng.random_range(0..100u8) < COMMON_PROBABILITY {
            Rarity::Common
        } else {
            Rarity::Rare
        }
    }

    // Queries. None of these mutate state.

    /// Whether a receipt exists under the given id.
    pub fn exists(&self, id: ReceiptId) -> bool {
        id.0 >= 1 && (id.0 as usize) <= self.records.len()
    }

    /// Owner of a receipt. Unknown ids fail with [`LedgerError::TokenNotFound`],
    /// distinct from a receipt merely belonging to someone else.
    pub fn owner_of(&self, id: ReceiptId) -> Result<Address, LedgerError> {
        self.record(id).map(|r| r.payer)
    }

    /// The full payment record behind a receipt.
    pub fn payment_info(&self, id: ReceiptId) -> Result<&PaymentRecord, LedgerError> {
        self.record(id)
    }

    /// Receipts owned by an address, in mint order.
    pub fn tokens_by_owner(&self, owner: Address) -> &[ReceiptId] {
        self.tokens_by_owner
            .get(&owner)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of receipts owned by an address.
    pub fn balance_of(&self, owner: Address) -> usize {
        self.tokens_by_owner(owner).len()
    }

    /// Payments received by an address, in mint order.
    pub fn payments_by_recipient(&self, recipient: Address) -> &[ReceiptId] {
        self.payments_by_recipient
            .get(&recipient)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All referrer codes with their payment counts, in first-seen order.
    /// Empty codes never appear here.
    pub fn referrer_stats(&self) -> Vec<(&str, u64)> {
        self.referrer_list
            .iter()
            .map(|code| {
                let count = self
                    .referrer_stats
                    .get(code)
                    .map(|s| s.count)
                    .unwrap_or(0);
                (code.as_str(), count)
            })
            .collect()
    }

    /// Payments attributed to a referrer code, in mint order.
    pub fn referrer_payments(&self, code: &str) -> &[ReceiptId] {
        self.referrer_stats
            .get(code)
            .map(|s| s.receipt_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Number of payments attributed to a referrer code.
    pub fn referrer_count(&self, code: &str) -> u64 {
        self.referrer_stats.get(code).map(|s| s.count).unwrap_or(0)
    }

    /// Number of distinct referrer codes seen.
    pub fn referrer_list_len(&self) -> usize {
        self.referrer_list.len()
    }

    /// Number of receipts minted with the given rarity.
    pub fn rarity_count(&self, rarity: Rarity) -> usize {
        self.records.iter().filter(|r| r.rarity == rarity).count()
    }

    /// Total receipts minted. Equal to the highest assigned id.
    pub fn total_supply(&self) -> u64 {
        self.records.len() as u64
    }

    /// Value currently held by the ledger: received minus disbursed. Zero
    /// after every complete call, since value is forwarded in the same step.
    pub fn balance(&self) -> U256 {
        self.value_received - self.value_disbursed
    }

    /// Value credited to an address by completed calls, refunds included.
    pub fn credited(&self, account: Address) -> U256 {
        self.credits
            .get(&account)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn record(&self, id: ReceiptId) -> Result<&PaymentRecord, LedgerError> {
        if !self.exists(id) {
            return Err(LedgerError::TokenNotFound(id));
        }
        Ok(&self.records[id.0 as usize - 1])
    }
}

/// Trims and bounds-checks a referrer code. Empty after trimming means the
/// payment carries no attribution.
fn validate_referrer(code: &str) -> Result<Option<String>, LedgerError> {
    let trimmed = code.trim();
    let len = trimmed.chars().count();
    if len > MAX_REFERRER_CODE_LEN {
        return Err(LedgerError::ReferrerCodeTooLong(len));
    }
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}
