//! Baker reward distribution: computes each delegator's share of a cycle's
//! rewards, expands liquidity pools into their providers, and pays everyone
//! in counter-ordered batches of transfers.

pub mod clients;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

pub use config::PayoutSettings;
pub use services::{PayoutEngine, PayoutQueue};
pub use utils::errors::PayoutError;
