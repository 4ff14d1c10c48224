/// Place a participant into a pool tree.
pub mod place;

/// Layered income distribution.
pub mod distribute;

/// Tree progression.
pub mod progress;

/// Level income waterfall.
pub mod retopup;

/// Ledger Action.
#[must_use = "actions do nothing unless you `execute` them"]
pub trait LedgerAction {
    /// The type of the execution report of the action.
    type Report;

    /// Execute.
    fn execute(self) -> crate::Result<Self::Report>;
}
