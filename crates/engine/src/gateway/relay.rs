use std::time::Duration;

use autopool_model::{Address, Amount, PayoutBatch, RewardTag};
use reqwest::{IntoUrl, StatusCode, Url};

use super::{BatchStatus, PaymentGateway};

enum Path {
    Balance,
    Batches,
}

impl Path {
    fn to_uri(&self) -> &str {
        match self {
            Self::Balance => "balance",
            Self::Batches => "batches",
        }
    }
}

#[derive(serde::Serialize)]
struct SubmitRequest<'a> {
    key: &'a str,
    recipients: &'a [Address],
    amounts: &'a [Amount],
    tags: &'a [RewardTag],
}

#[derive(serde::Deserialize)]
struct Balance {
    available: Amount,
}

#[derive(serde::Deserialize)]
struct Rejection {
    #[serde(default)]
    reason: Option<String>,
}

/// Client of the HTTP payment relay in front of the payment contract.
#[derive(Debug, Clone)]
pub struct RelayGateway {
    base: Url,
    client: reqwest::Client,
    max_batch_size: usize,
}

impl RelayGateway {
    /// Create a new relay client. Every request is bounded by `timeout`.
    pub fn try_new(
        base: impl IntoUrl,
        timeout: Duration,
        max_batch_size: usize,
    ) -> crate::Result<Self> {
        Ok(Self {
            base: base.into_url()?,
            client: reqwest::Client::builder().timeout(timeout).build()?,
            max_batch_size,
        })
    }

    fn url(&self, path: Path) -> crate::Result<Url> {
        Ok(self.base.join(path.to_uri())?)
    }

    fn batch_url(&self, key: &str) -> crate::Result<Url> {
        let mut url = self.url(Path::Batches)?;
        url.path_segments_mut()
            .map_err(|_| crate::Error::config("relay url cannot be a base"))?
            .push(key);
        Ok(url)
    }
}

impl PaymentGateway for RelayGateway {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn available_balance(&self) -> crate::Result<Amount> {
        let balance: Balance = self
            .client
            .get(self.url(Path::Balance)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(balance.available)
    }

    async fn submit_batch(&self, key: &str, batch: &PayoutBatch) -> crate::Result<BatchStatus> {
        batch.validate(self.max_batch_size)?;
        let request = SubmitRequest {
            key,
            recipients: batch.recipients(),
            amounts: batch.amounts(),
            tags: batch.tags(),
        };
        let response = self
            .client
            .post(self.url(Path::Batches)?)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        if status.is_client_error() {
            let reason = response
                .json::<Rejection>()
                .await
                .ok()
                .and_then(|rejection| rejection.reason)
                .unwrap_or_else(|| status.to_string());
            return Err(crate::Error::GatewayRejected {
                key: key.to_string(),
                reason,
            });
        }
        if !status.is_success() {
            return Err(crate::Error::transport(format!(
                "relay answered {status} for batch `{key}`"
            )));
        }
        match response.json::<BatchStatus>().await? {
            BatchStatus::Failed { reason } => Err(crate::Error::GatewayRejected {
                key: key.to_string(),
                reason,
            }),
            status => Ok(status),
        }
    }

    async fn batch_status(&self, key: &str) -> crate::Result<Option<BatchStatus>> {
        let response = self.client.get(self.batch_url(key)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.error_for_status()?.json().await?;
        Ok(Some(status))
    }
}
