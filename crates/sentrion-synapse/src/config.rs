use std::time::Duration;

/// Tunables for the session-history window (C3).
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub window: Duration,
    pub max_count: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_count: 50,
        }
    }
}
