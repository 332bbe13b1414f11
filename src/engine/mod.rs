//! Engine module
//!
//! [`LedgerEngine`] applies balance mutations one account at a time and
//! records each one atomically with the new balance.

mod ledger;
mod state;

pub use ledger::{Applied, LedgerEngine};
pub use state::ApplyPhase;
