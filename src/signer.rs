//! The signing-provider seam.
//!
//! A signing provider is the single external authority that can move value on
//! the caller's behalf: it proposes a transfer and reports when the resulting
//! transaction is final. The negotiation client serializes its calls to the
//! provider within a flow and classifies every failure before surfacing it —
//! no raw provider error text reaches the end user.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::keccak256;

use crate::ledger::{LedgerError, SettlementLedger};
use crate::types::{Address, ReceiptId, TransactionHash, U256};

/// Classified signing-provider failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignerError {
    /// The caller declined to sign.
    #[error("Payment cancelled by user")]
    Cancelled,
    /// The caller's balance does not cover the transfer.
    #[error("Insufficient funds")]
    InsufficientFunds,
    /// The provider is connected to a different network than the demand names.
    #[error("Wrong network: {0}")]
    NetworkMismatch(String),
    /// Finality was not reached within the allowed window.
    #[error("Timed out waiting for finality")]
    Timeout,
    /// The transaction was submitted or executed and failed, with a
    /// classified reason.
    #[error("Transaction failed: {0}")]
    Rejected(String),
}

/// Proof that a transaction reached finality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalityReceipt {
    pub transaction: TransactionHash,
    /// Receipt id minted by the settlement ledger for this payment, when the
    /// provider can observe it.
    pub receipt_id: Option<ReceiptId>,
}

/// Proposes value transfers and awaits their finality.
///
/// Calls for one logical payment must not be issued concurrently; the
/// negotiation client serializes them per flow.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// Proposes a transfer of `amount` smallest units to `recipient`,
    /// settling through the marketplace's ledger program, and returns the
    /// submitted transaction's hash.
    async fn propose_payment(
        &self,
        recipient: Address,
        amount: U256,
        description: &str,
    ) -> Result<TransactionHash, SignerError>;

    /// Waits until the transaction is confirmed irreversible, up to `timeout`.
    async fn wait_for_finality(
        &self,
        transaction: TransactionHash,
        timeout: Duration,
    ) -> Result<FinalityReceipt, SignerError>;
}

/// A signing provider settling directly against an in-process
/// [`SettlementLedger`]. Finality is immediate.
///
/// Used in tests and local development, where it stands in for a wallet
/// driving the on-ledger settlement program.
#[derive(Clone)]
pub struct LedgerSigner {
    payer: Address,
    ledger: Arc<Mutex<SettlementLedger>>,
    pending: Arc<Mutex<HashMap<TransactionHash, ReceiptId>>>,
}

impl LedgerSigner {
    pub fn new(payer: Address, ledger: Arc<Mutex<SettlementLedger>>) -> Self {
        LedgerSigner {
            payer,
            ledger,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn synthesize_hash(&self, recipient: Address, amount: U256, id: ReceiptId) -> TransactionHash {
        let mut preimage = Vec::with_capacity(20 + 20 + 32 + 8);
        preimage.extend_from_slice(self.payer.as_slice());
        preimage.extend_from_slice(recipient.as_slice());
        preimage.extend_from_slice(&amount.to_be_bytes::<32>());
        preimage.extend_from_slice(&id.0.to_be_bytes());
        TransactionHash(keccak256(&preimage).0)
    }
}

#[async_trait]
impl SigningProvider for LedgerSigner {
    async fn propose_payment(
        &self,
        recipient: Address,
        amount: U256,
        description: &str,
    ) -> Result<TransactionHash, SignerError> {
        let id = {
            let mut ledger = self
                .ledger
                .lock()
                .map_err(|_| SignerError::Rejected("ledger lock poisoned".to_string()))?;
            ledger
                .make_payment(self.payer, recipient, description, "", amount)
                .map_err(classify_ledger_error)?
        };
        let hash = self.synthesize_hash(recipient, amount, id);
        self.pending
            .lock()
            .map_err(|_| SignerError::Rejected("ledger lock poisoned".to_string()))?
            .insert(hash, id);
        Ok(hash)
    }

    async fn wait_for_finality(
        &self,
        transaction: TransactionHash,
        _timeout: Duration,
    ) -> Result<FinalityReceipt, SignerError> {
        let pending = self
            .pending
            .lock()
            .map_err(|_| SignerError::Rejected("ledger lock poisoned".to_string()))?;
        let receipt_id = pending.get(&transaction).copied().ok_or_else(|| {
            SignerError::Rejected(format!("unknown transaction: {transaction}"))
        })?;
        Ok(FinalityReceipt {
            transaction,
            receipt_id: Some(receipt_id),
        })
    }
}

fn classify_ledger_error(err: LedgerError) -> SignerError {
    match err {
        LedgerError::InsufficientValue { .. } => SignerError::InsufficientFunds,
        other => SignerError::Rejected(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::repeat_byte(byte)
    }

    #[tokio::test]
    async fn ledger_signer_settles_and_reports_receipt() {
        let ledger = Arc::new(Mutex::new(SettlementLedger::new()));
        let signer = LedgerSigner::new(addr(1), ledger.clone());

        let hash = signer
            .propose_payment(addr(2), U256::from(1000), "test")
            .await
            .unwrap();
        let receipt = signer
            .wait_for_finality(hash, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(receipt.transaction, hash);
        assert_eq!(receipt.receipt_id, Some(ReceiptId(1)));
        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.total_supply(), 1);
        assert_eq!(ledger.owner_of(ReceiptId(1)).unwrap(), addr(1));
    }

    #[tokio::test]
    async fn rejected_payment_is_classified() {
        let ledger = Arc::new(Mutex::new(SettlementLedger::new()));
        let signer = LedgerSigner::new(addr(1), ledger);

        let err = signer
            .propose_payment(Address::ZERO, U256::from(1000), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Rejected(_)));
    }

    #[tokio::test]
    async fn unknown_transaction_has_no_finality() {
        let ledger = Arc::new(Mutex::new(SettlementLedger::new()));
        let signer = LedgerSigner::new(addr(1), ledger);
        let err = signer
            .wait_for_finality(TransactionHash([9; 32]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Rejected(_)));
    }
}
