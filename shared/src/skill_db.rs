//! Static skill table.

use crate::error::SkillError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkillId(pub u16);

impl SkillId {
    pub const BASH: SkillId = SkillId(1);
    pub const FIRE_BOLT: SkillId = SkillId(2);
    pub const HEAL: SkillId = SkillId(3);
    pub const STORM_GUST: SkillId = SkillId(4);
    pub const FIRST_AID: SkillId = SkillId(5);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillTargetKind {
    Entity,
    Ground,
    SelfOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillEffect {
    PhysicalDamage,
    MagicDamage,
    Heal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkillDefinition {
    pub id: SkillId,
    pub name: &'static str,
    pub max_level: u8,
    pub target: SkillTargetKind,
    pub effect: SkillEffect,
    /// Cells between user and target.
    pub range: u32,
    /// Radius around a ground target; 0 for single target.
    pub area: u32,
    pub sp_cost_base: i32,
    pub sp_cost_per_level: i32,
    /// Seconds before stat scaling.
    pub cast_time_base: f32,
    pub cast_time_per_level: f32,
    /// Seconds the user stays locked after the effect lands.
    pub animation_delay: f32,
    /// Seconds before the same skill may be requested again.
    pub reuse_cooldown: f32,
    pub power_base: i32,
    pub power_per_level: i32,
}

impl SkillDefinition {
    pub fn validate_level(&self, level: u8) -> Result<(), SkillError> {
        if level == 0 || level > self.max_level {
            return Err(SkillError::InvalidLevel {
                skill: self.id,
                level,
            });
        }
        Ok(())
    }

    pub fn sp_cost(&self, level: u8) -> i32 {
        self.sp_cost_base + self.sp_cost_per_level * level.saturating_sub(1) as i32
    }

    /// Cast time before the user's cast-time multiplier.
    pub fn cast_time(&self, level: u8) -> f32 {
        self.cast_time_base + self.cast_time_per_level * level.saturating_sub(1) as f32
    }

    /// Percent of the user's attack (or flat heal amount).
    pub fn power(&self, level: u8) -> i32 {
        self.power_base + self.power_per_level * level.saturating_sub(1) as i32
    }
}

static SKILLS: [SkillDefinition; 5] = [
    SkillDefinition {
        id: SkillId::BASH,
        name: "Bash",
        max_level: 10,
        target: SkillTargetKind::Entity,
        effect: SkillEffect::PhysicalDamage,
        range: 1,
        area: 0,
        sp_cost_base: 8,
        sp_cost_per_level: 0,
        cast_time_base: 0.0,
        cast_time_per_level: 0.0,
        animation_delay: 0.6,
        reuse_cooldown: 0.0,
        power_base: 130,
        power_per_level: 30,
    },
    SkillDefinition {
        id: SkillId::FIRE_BOLT,
        name: "Fire Bolt",
        max_level: 10,
        target: SkillTargetKind::Entity,
        effect: SkillEffect::MagicDamage,
        range: 9,
        area: 0,
        sp_cost_base: 12,
        sp_cost_per_level: 2,
        cast_time_base: 0.7,
        cast_time_per_level: 0.7,
        animation_delay: 1.0,
        reuse_cooldown: 0.0,
        power_base: 100,
        power_per_level: 100,
    },
    SkillDefinition {
        id: SkillId::HEAL,
        name: "Heal",
        max_level: 10,
        target: SkillTargetKind::Entity,
        effect: SkillEffect::Heal,
        range: 9,
        area: 0,
        sp_cost_base: 13,
        sp_cost_per_level: 3,
        cast_time_base: 0.0,
        cast_time_per_level: 0.0,
        animation_delay: 1.0,
        reuse_cooldown: 1.0,
        power_base: 40,
        power_per_level: 40,
    },
    SkillDefinition {
        id: SkillId::STORM_GUST,
        name: "Storm Gust",
        max_level: 10,
        target: SkillTargetKind::Ground,
        effect: SkillEffect::MagicDamage,
        range: 9,
        area: 4,
        sp_cost_base: 78,
        sp_cost_per_level: 0,
        cast_time_base: 6.0,
        cast_time_per_level: 1.0,
        animation_delay: 5.0,
        reuse_cooldown: 5.0,
        power_base: 140,
        power_per_level: 40,
    },
    SkillDefinition {
        id: SkillId::FIRST_AID,
        name: "First Aid",
        max_level: 1,
        target: SkillTargetKind::SelfOnly,
        effect: SkillEffect::Heal,
        range: 0,
        area: 0,
        sp_cost_base: 3,
        sp_cost_per_level: 0,
        cast_time_base: 0.0,
        cast_time_per_level: 0.0,
        animation_delay: 0.3,
        reuse_cooldown: 0.0,
        power_base: 5,
        power_per_level: 0,
    },
];

pub fn lookup(id: SkillId) -> Result<&'static SkillDefinition, SkillError> {
    SKILLS
        .iter()
        .find(|skill| skill.id == id)
        .ok_or(SkillError::UnknownSkill(id))
}

pub fn all() -> &'static [SkillDefinition] {
    &SKILLS
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert_eq!(lookup(SkillId::FIRE_BOLT).unwrap().name, "Fire Bolt");
        assert_eq!(
            lookup(SkillId(999)).unwrap_err(),
            SkillError::UnknownSkill(SkillId(999))
        );
    }

    #[test]
    fn test_level_scaling() {
        let bolt = lookup(SkillId::FIRE_BOLT).unwrap();
        assert_approx_eq!(bolt.cast_time(3), 2.1, 1e-5);
        assert_eq!(bolt.sp_cost(3), 16);
        assert_eq!(bolt.power(3), 300);
    }

    #[test]
    fn test_level_validation() {
        let aid = lookup(SkillId::FIRST_AID).unwrap();
        assert!(aid.validate_level(1).is_ok());
        assert!(aid.validate_level(0).is_err());
        assert!(aid.validate_level(2).is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let mut ids: Vec<SkillId> = all().iter().map(|s| s.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), all().len());
    }
}
