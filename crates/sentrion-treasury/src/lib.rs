//! Governance fee gating, tiered pricing, and signed receipts (C8).

mod config;
mod error;
mod fees;
mod treasury;

pub use config::TreasuryConfig;
pub use error::{TreasuryError, TreasuryResult};
pub use fees::compute_fee;
pub use treasury::Treasury;
