#![deny(missing_docs)]
#![deny(unreachable_pub)]

//! Asynchronous orchestration of the auto-pool compensation engine.
//!
//! The [`Engine`] turns qualifying events into ledger decisions and settles the decided
//! payments on the payment rail through a [`PaymentGateway`]. Ledger storage, the placement
//! queue and the gateway are injected behind traits.

/// Error type.
pub mod error;

/// Configuration.
pub mod config;

/// Ledger storage.
pub mod store;

/// Placement queue.
pub mod queue;

/// Payment gateways.
pub mod gateway;

/// Event processing.
pub mod engine;

/// Reconciliation.
pub mod reconcile;


pub use autopool_model as model;
pub use config::Config;
pub use engine::{Engine, Outcome};
pub use error::Error;
pub use gateway::{BatchStatus, PaymentGateway, Receipt};
pub use queue::PlacementQueue;
pub use reconcile::{QueueDrift, ReconciliationReport, Reconciler};
pub use store::LedgerStore;

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
