//! Bridge configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default window a caller waits for a response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of answered call ids remembered for duplicate detection.
pub const DEFAULT_ANSWERED_HISTORY: usize = 256;

/// Configuration shared by the host bridge and the guest runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long `call` waits for a matching response before failing.
    pub call_timeout: Duration,
    /// How many answered call ids are remembered so a replayed call is not
    /// answered twice.
    pub answered_history: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            answered_history: DEFAULT_ANSWERED_HISTORY,
        }
    }
}

impl BridgeConfig {
    /// Override the call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Override how many answered call ids are remembered.
    pub fn with_answered_history(mut self, capacity: usize) -> Self {
        self.answered_history = capacity;
        self
    }
}
