/// Engine Error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model Error.
    #[error("model: {0}")]
    Model(#[from] autopool_model::Error),
    /// Configuration error.
    #[error("config: {0}")]
    Config(String),
    /// The gateway did not answer a submission in time.
    ///
    /// The batch may still land, so its key must be looked up before any retry.
    #[error("gateway timeout: batch `{0}`")]
    GatewayTimeout(String),
    /// The gateway rejected a batch.
    #[error("gateway rejected batch `{key}`: {reason}")]
    GatewayRejected {
        /// Idempotency key.
        key: String,
        /// Reason.
        reason: String,
    },
    /// A batch is still in flight on the payment rail.
    #[error("batch `{0}` is in flight")]
    InFlight(String),
    /// The event has payments rejected by the rail that must be re-armed first.
    #[error("event `{event}` has {failed} failed payments")]
    Unsettled {
        /// Event id.
        event: String,
        /// Number of failed entries.
        failed: usize,
    },
    /// Transport error.
    #[error("transport: {0}")]
    Transport(String),
    /// Json error.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// IO error.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Url parse error.
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
    /// Reqwest error.
    #[cfg(feature = "relay")]
    #[error("reqwest: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Unknown error.
    #[error("unknown: {0}")]
    Unknown(String),
}

impl Error {
    /// Create an unknown error.
    pub fn unknown(msg: impl ToString) -> Self {
        Self::Unknown(msg.to_string())
    }

    /// Create a transport error.
    pub fn transport(msg: impl ToString) -> Self {
        Self::Transport(msg.to_string())
    }

    /// Create a configuration error.
    pub fn config(msg: impl ToString) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether replaying the event later may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(err) => matches!(
                err,
                autopool_model::Error::InsufficientFunds { .. }
                    | autopool_model::Error::UnknownParticipant(_)
            ),
            Self::GatewayTimeout(_) | Self::InFlight(_) | Self::Transport(_) | Self::Io(_) => true,
            #[cfg(feature = "relay")]
            Self::Reqwest(err) => err.is_timeout() || err.is_connect(),
            Self::Config(_)
            | Self::GatewayRejected { .. }
            | Self::Unsettled { .. }
            | Self::Json(_)
            | Self::Url(_)
            | Self::Unknown(_) => false,
        }
    }
}
