//! Payment sink boundary.
//!
//! The sink moves value out of the service to the payee's external account.
//! It is only ever invoked by `withdraw_refund`, after the payee's balance has
//! been cleared.

use crate::error::PayoutError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rental_types::{amount_serde, Amount, Identity};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

/// Confirmation returned by a sink for a completed payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub payout_id: String,
    pub payee: Identity,
    #[serde(with = "amount_serde")]
    pub amount: Amount,
    pub paid_at: DateTime<Utc>,
}

/// Pluggable payout rail.
#[async_trait]
pub trait PayoutSink: Send + Sync {
    fn rail(&self) -> &'static str;

    async fn pay(&self, payee: &Identity, amount: Amount) -> Result<PayoutReceipt, PayoutError>;
}

/// Sink that accepts every payout and keeps the receipts.
#[derive(Debug, Default)]
pub struct RecordingSink {
    receipts: Mutex<Vec<PayoutReceipt>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn receipts(&self) -> Vec<PayoutReceipt> {
        self.receipts
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Sum paid to `payee` so far.
    pub fn total_paid(&self, payee: &Identity) -> Amount {
        self.receipts()
            .iter()
            .filter(|r| &r.payee == payee)
            .map(|r| r.amount)
            .sum()
    }
}

#[async_trait]
impl PayoutSink for RecordingSink {
    fn rail(&self) -> &'static str {
        "recording"
    }

    async fn pay(&self, payee: &Identity, amount: Amount) -> Result<PayoutReceipt, PayoutError> {
        let receipt = PayoutReceipt {
            payout_id: Uuid::new_v4().to_string(),
            payee: payee.clone(),
            amount,
            paid_at: Utc::now(),
        };
        self.receipts
            .lock()
            .map_err(|_| PayoutError::Unavailable("receipt log poisoned".into()))?
            .push(receipt.clone());
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_keeps_receipts() {
        let sink = RecordingSink::new();
        let payee = Identity::new("renter");

        let receipt = sink.pay(&payee, 40).await.unwrap();
        sink.pay(&payee, 2).await.unwrap();
        sink.pay(&Identity::new("other"), 9).await.unwrap();

        assert_eq!(receipt.amount, 40);
        assert_eq!(sink.receipts().len(), 3);
        assert_eq!(sink.total_paid(&payee), 42);
    }
}
