//! Session history (C3) and behavioural chain analysis (C4).

mod chain;
mod config;
mod state;

pub use chain::{ChainAnalyser, ChainMatch};
pub use config::SessionConfig;
pub use state::SessionStore;
