use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-session runtime tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Longest silence tolerated while waiting on a request. Every message
    /// routed to the call restarts the window.
    pub response_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}
