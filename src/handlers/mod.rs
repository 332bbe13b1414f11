//! Command Handlers module
//!
//! Transport-agnostic entry points. Each handler turns a command into engine
//! or store calls and shapes the result; side logging goes to the audit queue.

mod account_handler;
mod adjustment_handler;
mod commands;
mod query_handler;
mod scan_handler;

#[cfg(test)]
mod tests;

pub use account_handler::AccountHandler;
pub use adjustment_handler::AdjustmentHandler;
pub use commands::*;
pub use query_handler::{QueryHandler, AUTOMATION_HISTORY_LIMIT};
pub use scan_handler::ScanHandler;
