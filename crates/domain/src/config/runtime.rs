use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batch dispatch & recovery
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Capacity of each client's outbound event channel.  Events published
    /// to a full channel are dropped.
    #[serde(default = "d_256")]
    pub client_buffer: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            client_buffer: d_256(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Delay before a rejected logon stops its sessions, giving the engine
    /// time to finish its own teardown.
    #[serde(default = "d_100")]
    pub stop_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stop_delay_ms: d_100(),
        }
    }
}

fn d_256() -> usize {
    256
}
fn d_100() -> u64 {
    100
}
