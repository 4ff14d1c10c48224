use std::collections::HashMap;

use autopool_model::{Address, Amount, PayoutBatch};
use tokio::sync::Mutex;

use super::{BatchStatus, PaymentGateway, Receipt};

/// Behavior of the simulated rail for the next submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Mode {
    /// Confirm every funded batch.
    #[default]
    Confirm,
    /// Accept batches but never answer.
    Stall,
    /// Reject every batch.
    Reject(String),
}

#[derive(Debug, Default)]
struct State {
    balance: Amount,
    block: u64,
    mode: Mode,
    batches: HashMap<String, (PayoutBatch, BatchStatus)>,
    submissions: usize,
    paid: HashMap<Address, Amount>,
}

/// In-process simulated payment rail.
#[derive(Debug)]
pub struct MemoryGateway {
    max_batch_size: usize,
    state: Mutex<State>,
}

impl MemoryGateway {
    /// Create a simulated rail holding `balance`.
    pub fn new(balance: Amount, max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            state: Mutex::new(State {
                balance,
                ..Default::default()
            }),
        }
    }

    /// Set the behavior for the next submissions.
    pub async fn set_mode(&self, mode: Mode) {
        self.state.lock().await.mode = mode;
    }

    /// Set the balance.
    pub async fn set_balance(&self, balance: Amount) {
        self.state.lock().await.balance = balance;
    }

    /// Current balance.
    pub async fn balance(&self) -> Amount {
        self.state.lock().await.balance
    }

    /// Number of submissions received, duplicates included.
    pub async fn submissions(&self) -> usize {
        self.state.lock().await.submissions
    }

    /// Total paid to the address.
    pub async fn paid_to(&self, address: &Address) -> Amount {
        self.state
            .lock()
            .await
            .paid
            .get(address)
            .copied()
            .unwrap_or_default()
    }

    /// Confirm a stalled batch, as if the transaction had finally landed.
    pub async fn confirm_in_flight(&self, key: &str) -> crate::Result<Receipt> {
        let mut state = self.state.lock().await;
        let batch = match state.batches.get(key) {
            Some((batch, BatchStatus::InFlight { .. })) => batch.clone(),
            _ => return Err(crate::Error::unknown(format!("batch `{key}` is not in flight"))),
        };
        let receipt = state.pay(&batch)?;
        state
            .batches
            .insert(key.to_string(), (batch, BatchStatus::Confirmed(receipt.clone())));
        Ok(receipt)
    }
}

impl State {
    fn pay(&mut self, batch: &PayoutBatch) -> crate::Result<Receipt> {
        let total = batch.total()?;
        self.balance = self
            .balance
            .checked_sub(total)
            .ok_or_else(|| crate::Error::unknown("balance underflow"))?;
        for (recipient, amount) in batch.recipients().iter().zip(batch.amounts()) {
            let paid = self.paid.entry(recipient.clone()).or_default();
            *paid = paid
                .checked_add(*amount)
                .ok_or(autopool_model::Error::Overflow)?;
        }
        self.block = self.block.saturating_add(1);
        Ok(Receipt {
            transaction_id: format!("sim-{}", self.block),
            confirmed_block: self.block,
        })
    }
}

impl PaymentGateway for MemoryGateway {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn available_balance(&self) -> crate::Result<Amount> {
        Ok(self.state.lock().await.balance)
    }

    async fn submit_batch(&self, key: &str, batch: &PayoutBatch) -> crate::Result<BatchStatus> {
        batch.validate(self.max_batch_size)?;
        let mut state = self.state.lock().await;
        state.submissions = state.submissions.saturating_add(1);

        let existing = state.batches.get(key).map(|(_, status)| status.clone());
        let status = match existing {
            Some(status) => status,
            None => {
                let status = match state.mode.clone() {
                    Mode::Reject(reason) => BatchStatus::Failed { reason },
                    Mode::Stall => BatchStatus::InFlight {
                        transaction_id: None,
                    },
                    Mode::Confirm if batch.total()? > state.balance => BatchStatus::Failed {
                        reason: "insufficient balance".to_string(),
                    },
                    Mode::Confirm => BatchStatus::Confirmed(state.pay(batch)?),
                };
                state
                    .batches
                    .insert(key.to_string(), (batch.clone(), status.clone()));
                tracing::debug!(key, ?status, "simulated batch");
                if let BatchStatus::InFlight { .. } = status {
                    drop(state);
                    return std::future::pending().await;
                }
                status
            }
        };

        match status {
            BatchStatus::Failed { reason } => Err(crate::Error::GatewayRejected {
                key: key.to_string(),
                reason,
            }),
            status => Ok(status),
        }
    }

    async fn batch_status(&self, key: &str) -> crate::Result<Option<BatchStatus>> {
        Ok(self
            .state
            .lock()
            .await
            .batches
            .get(key)
            .map(|(_, status)| status.clone()))
    }
}

#[cfg(test)]
mod tests {
    use autopool_model::{test::address, Payout, RewardTag};

    use super::*;

    fn batch(amount: Amount) -> crate::Result<PayoutBatch> {
        let payouts = [Payout::to_platform(&address(0), amount, RewardTag::PlatformFee)];
        Ok(PayoutBatch::try_new(&payouts, 50)?)
    }

    #[tokio::test]
    async fn submissions_are_idempotent() -> crate::Result<()> {
        let gateway = MemoryGateway::new(100, 50);
        let first = gateway.submit_batch("0x01#0", &batch(30)?).await?;
        let second = gateway.submit_batch("0x01#0", &batch(30)?).await?;
        assert_eq!(first, second);
        assert!(matches!(first, BatchStatus::Confirmed(_)));
        assert_eq!(gateway.balance().await, 70);
        assert_eq!(gateway.paid_to(&address(0)).await, 30);
        assert_eq!(gateway.submissions().await, 2);
        Ok(())
    }

    #[tokio::test]
    async fn unfunded_batches_are_rejected() -> crate::Result<()> {
        let gateway = MemoryGateway::new(10, 50);
        let result = gateway.submit_batch("0x01#0", &batch(30)?).await;
        assert!(matches!(result, Err(crate::Error::GatewayRejected { .. })));
        assert!(matches!(
            gateway.batch_status("0x01#0").await?,
            Some(BatchStatus::Failed { .. })
        ));
        assert_eq!(gateway.balance().await, 10);
        assert_eq!(gateway.batch_status("0x02#0").await?, None);
        Ok(())
    }
}
