//! Client settings, filled from the command line by the binary.

use shared::VIEW_RANGE;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub server_addr: String,
    pub name: String,
    /// Simulated one-way latency is half of this.
    pub fake_ping_ms: u64,
    /// Cells around the local player that get a mirror.
    pub view_range: u32,
    pub tick_rate: u32,
    /// Seed of the request bot.
    pub seed: u64,
    pub request_interval: Duration,
}

impl ClientConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            name: "novice".to_string(),
            fake_ping_ms: 0,
            view_range: VIEW_RANGE,
            tick_rate: 30,
            seed: 7,
            request_interval: Duration::from_millis(400),
        }
    }
}
