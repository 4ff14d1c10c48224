use std::future::Future;

use autopool_model::{Amount, PayoutBatch, TransactionRef};

/// In-process simulated payment rail.
pub mod memory;

/// HTTP payment relay.
#[cfg(feature = "relay")]
pub mod relay;

pub use memory::MemoryGateway;

#[cfg(feature = "relay")]
pub use relay::RelayGateway;

/// Confirmation of a batch by the payment rail.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Receipt {
    /// Transaction id.
    pub transaction_id: String,
    /// Block the transaction was confirmed in.
    pub confirmed_block: u64,
}

impl Receipt {
    /// Reference to record on the confirmed ledger entries.
    pub fn transaction_ref(&self) -> TransactionRef {
        TransactionRef {
            id: self.transaction_id.clone(),
            block: self.confirmed_block,
        }
    }
}

/// Status of a batch on the payment rail.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Submitted, not confirmed yet.
    InFlight {
        /// Transaction id, if already known.
        #[serde(default)]
        transaction_id: Option<String>,
    },
    /// Confirmed.
    Confirmed(Receipt),
    /// Rejected. Nothing of the batch has been paid.
    Failed {
        /// Reason.
        reason: String,
    },
}

/// Payment rail executing payout batches.
///
/// Submissions are idempotent by key: submitting a key twice never pays twice.
pub trait PaymentGateway: Send + Sync {
    /// Maximum number of payments in one batch.
    fn max_batch_size(&self) -> usize;

    /// Funds available for payouts.
    fn available_balance(&self) -> impl Future<Output = crate::Result<Amount>> + Send;

    /// Submit a batch under the given idempotency key.
    ///
    /// # Errors
    /// Returns [`Error::GatewayRejected`](crate::Error::GatewayRejected) if the rail
    /// rejects the batch.
    fn submit_batch(
        &self,
        key: &str,
        batch: &PayoutBatch,
    ) -> impl Future<Output = crate::Result<BatchStatus>> + Send;

    /// Status of the batch submitted under the key, `None` if unknown to the rail.
    fn batch_status(
        &self,
        key: &str,
    ) -> impl Future<Output = crate::Result<Option<BatchStatus>>> + Send;
}
