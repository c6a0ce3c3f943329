//! Periodic character persistence hook.
//!
//! Storage formats are someone else's problem; the world only hands out a
//! [`CharacterRecord`] per logged-in player on the interval the network loop
//! drives.

use log::debug;
use serde::{Deserialize, Serialize};
use shared::stats::StatType;
use shared::Coordinate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub name: String,
    pub map: String,
    pub position: Coordinate,
    pub base_level: i32,
    pub job_level: i32,
    /// Base terms of the raisable attributes.
    pub attributes: Vec<(StatType, i32)>,
    pub hp: i32,
    pub sp: i32,
    pub base_exp: u32,
    pub job_exp: u32,
    pub status_points: i32,
    pub skill_points: i32,
}

pub trait Persistence {
    fn persist(&mut self, record: &CharacterRecord);
}

/// Writes records to the log.
#[derive(Debug, Default)]
pub struct LogPersistence {
    saved: u64,
}

impl LogPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved(&self) -> u64 {
        self.saved
    }
}

impl Persistence for LogPersistence {
    fn persist(&mut self, record: &CharacterRecord) {
        self.saved += 1;
        debug!(
            "Persisted {} on {} at ({}, {}) lv {}/{} hp {} sp {}",
            record.name,
            record.map,
            record.position.x,
            record.position.y,
            record.base_level,
            record.job_level,
            record.hp,
            record.sp
        );
    }
}
