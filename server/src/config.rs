//! Server and world settings.
//!
//! Plain structs so the library and its tests never go through argument
//! parsing; the binary fills them from its command line.

use shared::{Coordinate, REPLICATION_RANGE};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct WorldConfig {
    pub map_name: String,
    pub map_width: i32,
    pub map_height: i32,
    /// Cells around a player whose entities are replicated to it.
    pub replication_range: u32,
    pub monster_count: usize,
    pub seed: u64,
    /// Seconds between HP/SP regeneration steps.
    pub regen_interval: f32,
    /// Seconds before a dead monster comes back.
    pub respawn_delay: f32,
    /// Seconds a dead player waits before reviving.
    pub revive_delay: f32,
    pub spawn_point: Coordinate,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_name: "prt_fild08".to_string(),
            map_width: 128,
            map_height: 128,
            replication_range: REPLICATION_RANGE,
            monster_count: 24,
            seed: 0x5eed,
            regen_interval: 6.0,
            respawn_delay: 10.0,
            revive_delay: 5.0,
            spawn_point: Coordinate::new(64, 64),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub tick_rate: u32,
    pub max_clients: usize,
    pub persist_interval: Duration,
    pub world: WorldConfig,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tick_rate: 20,
            max_clients: 32,
            persist_interval: Duration::from_secs(30),
            world: WorldConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "127.0.0.1:8080");
        assert_eq!(config.tick_duration(), Duration::from_millis(50));
        assert!(config.world.spawn_point.x < config.world.map_width);
    }

    #[test]
    fn test_zero_tick_rate_does_not_divide_by_zero() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.tick_duration(), Duration::from_secs(1));
    }
}
