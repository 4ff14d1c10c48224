use std::time::Duration;

use autopool_engine::{
    config::GatewayKind,
    gateway::{MemoryGateway, RelayGateway},
    model::{Amount, PayoutBatch},
    BatchStatus, Config, PaymentGateway,
};

/// Payment gateway selected by the config.
#[derive(Debug)]
pub enum AnyGateway {
    /// HTTP payment relay.
    Relay(RelayGateway),
    /// Simulated rail, nothing leaves the process.
    Simulated(MemoryGateway),
}

impl AnyGateway {
    /// Create the gateway described by the config.
    pub fn try_new(config: &Config, timeout: Duration) -> eyre::Result<Self> {
        let max_batch_size = config.gateway.max_batch_size;
        match config.gateway.kind {
            GatewayKind::Relay => {
                let url = config.relay_url()?.clone();
                tracing::info!(%url, "using the payment relay");
                Ok(Self::Relay(RelayGateway::try_new(
                    url,
                    timeout,
                    max_batch_size,
                )?))
            }
            GatewayKind::Simulated => {
                tracing::warn!("using the simulated payment rail, nothing will be paid");
                Ok(Self::Simulated(MemoryGateway::new(
                    Amount::from(config.gateway.simulated_balance),
                    max_batch_size,
                )))
            }
        }
    }
}

impl PaymentGateway for AnyGateway {
    fn max_batch_size(&self) -> usize {
        match self {
            Self::Relay(gateway) => gateway.max_batch_size(),
            Self::Simulated(gateway) => gateway.max_batch_size(),
        }
    }

    async fn available_balance(&self) -> autopool_engine::Result<Amount> {
        match self {
            Self::Relay(gateway) => gateway.available_balance().await,
            Self::Simulated(gateway) => gateway.available_balance().await,
        }
    }

    async fn submit_batch(
        &self,
        key: &str,
        batch: &PayoutBatch,
    ) -> autopool_engine::Result<BatchStatus> {
        match self {
            Self::Relay(gateway) => gateway.submit_batch(key, batch).await,
            Self::Simulated(gateway) => gateway.submit_batch(key, batch).await,
        }
    }

    async fn batch_status(&self, key: &str) -> autopool_engine::Result<Option<BatchStatus>> {
        match self {
            Self::Relay(gateway) => gateway.batch_status(key).await,
            Self::Simulated(gateway) => gateway.batch_status(key).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use autopool_engine::config::GatewayConfig;

    use super::*;

    #[test]
    fn gateway_follows_the_config() -> eyre::Result<()> {
        let mut config = Config {
            gateway: GatewayConfig {
                kind: GatewayKind::Simulated,
                max_batch_size: 7,
                ..Default::default()
            },
            ..Default::default()
        };
        let gateway = AnyGateway::try_new(&config, Duration::from_secs(1))?;
        assert!(matches!(gateway, AnyGateway::Simulated(_)));
        assert_eq!(gateway.max_batch_size(), 7);

        config.gateway.kind = GatewayKind::Relay;
        assert!(AnyGateway::try_new(&config, Duration::from_secs(1)).is_err());

        config.gateway.url = Some("http://127.0.0.1:8080/v1/".parse()?);
        let gateway = AnyGateway::try_new(&config, Duration::from_secs(1))?;
        assert!(matches!(gateway, AnyGateway::Relay(_)));
        Ok(())
    }
}
