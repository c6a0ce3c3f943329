//! Battle-capable state of a player or monster
//!
//! A [`Character`] owns the entity's stat graph, its current HP/SP, in-flight
//! skill executions, reuse cooldowns and, for players, experience and unspent
//! points. It only mutates; telling observers about the mutation is the
//! world's job.

use log::warn;
use shared::skill::{CooldownSet, SkillExecutionList};
use shared::skill_db::SkillDefinition;
use shared::stat_graph::{StatChange, StatGraph};
use shared::stats::{ConditionContext, ConditionalStatSet, Element, Race, StatType};
use shared::{EntityId, SkillId, SkillTarget};

pub const MAX_BASE_LEVEL: i32 = 99;
pub const MAX_JOB_LEVEL: i32 = 50;

/// Base experience needed to leave `level`.
pub fn base_exp_to_next(level: i32) -> u32 {
    let level = level.max(1) as u32;
    20 + level * level * 10
}

/// Job experience needed to leave `level`.
pub fn job_exp_to_next(level: i32) -> u32 {
    30 * level.max(1) as u32
}

/// Status points granted for reaching `level`.
pub fn status_points_for_level(level: i32) -> i32 {
    level / 5 + 3
}

/// Player-only progression state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Progression {
    pub base_exp: u32,
    pub job_exp: u32,
    pub status_points: i32,
    pub skill_points: i32,
}

/// A request that arrived while the user was busy with another skill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedSkill {
    pub skill: SkillId,
    pub level: u8,
    pub target: SkillTarget,
}

#[derive(Debug, Clone)]
pub struct Character {
    stats: StatGraph,
    hp: i32,
    sp: i32,
    pub race: Race,
    pub element: Element,
    pub conditional: ConditionalStatSet,
    pub executions: SkillExecutionList,
    pub cooldowns: CooldownSet,
    pub queued: Option<QueuedSkill>,
    pub progression: Option<Progression>,
    pub last_attacker: Option<EntityId>,
    regen_elapsed: f32,
}

impl Character {
    /// Starts at full HP and SP.
    pub fn new(stats: StatGraph, race: Race, element: Element) -> Self {
        let hp = stats.int(StatType::MaxHp);
        let sp = stats.int(StatType::MaxSp);
        Self {
            stats,
            hp,
            sp,
            race,
            element,
            conditional: ConditionalStatSet::new(),
            executions: SkillExecutionList::new(),
            cooldowns: CooldownSet::new(),
            queued: None,
            progression: None,
            last_attacker: None,
            regen_elapsed: 0.0,
        }
    }

    pub fn with_progression(mut self, progression: Progression) -> Self {
        self.progression = Some(progression);
        self
    }

    pub fn stats(&self) -> &StatGraph {
        &self.stats
    }

    pub fn hp(&self) -> i32 {
        self.hp
    }

    pub fn sp(&self) -> i32 {
        self.sp
    }

    pub fn max_hp(&self) -> i32 {
        self.stats.int(StatType::MaxHp)
    }

    pub fn max_sp(&self) -> i32 {
        self.stats.int(StatType::MaxSp)
    }

    pub fn level(&self) -> i32 {
        self.stats.int(StatType::BaseLevel)
    }

    pub fn job_level(&self) -> i32 {
        self.stats.int(StatType::JobLevel)
    }

    pub fn move_speed(&self) -> f32 {
        self.stats.float(StatType::MoveSpeed)
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0
    }

    pub fn hp_percent(&self) -> u8 {
        let max = self.max_hp();
        if max <= 0 {
            return 0;
        }
        ((self.hp.max(0) as i64 * 100) / max as i64).min(100) as u8
    }

    /// Writes HP, clamping to `[0, max]` with a warning. Returns true when the
    /// stored value changed.
    pub fn set_hp(&mut self, value: i32) -> bool {
        let max = self.max_hp();
        let clamped = value.clamp(0, max.max(0));
        if clamped != value {
            warn!("HP {} outside [0, {}], clamped to {}", value, max, clamped);
        }
        let changed = clamped != self.hp;
        self.hp = clamped;
        changed
    }

    pub fn set_sp(&mut self, value: i32) -> bool {
        let max = self.max_sp();
        let clamped = value.clamp(0, max.max(0));
        if clamped != value {
            warn!("SP {} outside [0, {}], clamped to {}", value, max, clamped);
        }
        let changed = clamped != self.sp;
        self.sp = clamped;
        changed
    }

    /// Returns the HP actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let lost = amount.max(0).min(self.hp);
        self.hp -= lost;
        lost
    }

    /// Returns the HP actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if self.is_dead() {
            return 0;
        }
        let gained = amount.max(0).min(self.max_hp() - self.hp).max(0);
        self.hp += gained;
        gained
    }

    pub fn spend_sp(&mut self, amount: i32) -> bool {
        if amount > self.sp {
            return false;
        }
        self.sp -= amount;
        true
    }

    pub fn restore(&mut self) {
        self.hp = self.max_hp();
        self.sp = self.max_sp();
    }

    /// Writes a base attribute through the graph and keeps HP/SP inside the
    /// new maxima.
    pub fn set_base_stat(&mut self, stat: StatType, value: f64) -> Vec<StatChange> {
        let changes = self.stats.set_base(stat, value);
        self.fit_pools();
        changes
    }

    pub fn add_bonus(&mut self, stat: StatType, delta: f64) -> Vec<StatChange> {
        let changes = self.stats.add_bonus(stat, delta);
        self.fit_pools();
        changes
    }

    fn fit_pools(&mut self) {
        self.hp = self.hp.min(self.max_hp());
        self.sp = self.sp.min(self.max_sp());
    }

    /// Cast time after the user's multiplier.
    pub fn cast_time(&self, definition: &SkillDefinition, level: u8) -> f32 {
        definition.cast_time(level) * self.stats.float(StatType::CastTimeMultiplier)
    }

    pub fn condition_context(&self, target: Option<&Character>) -> ConditionContext {
        ConditionContext {
            target_race: target.map(|t| t.race),
            target_element: target.map(|t| t.element),
            weapon: None,
            hp_percent: self.hp_percent(),
        }
    }

    /// Accumulates `dt` and applies one regeneration step every `interval`
    /// seconds. Returns which pools changed.
    pub fn regenerate(&mut self, dt: f32, interval: f32) -> (bool, bool) {
        if self.is_dead() {
            self.regen_elapsed = 0.0;
            return (false, false);
        }
        self.regen_elapsed += dt;
        if self.regen_elapsed < interval {
            return (false, false);
        }
        self.regen_elapsed -= interval;

        let hp_before = self.hp;
        let sp_before = self.sp;
        self.hp = (self.hp + self.stats.int(StatType::HpRegen)).min(self.max_hp());
        self.sp = (self.sp + self.stats.int(StatType::SpRegen)).min(self.max_sp());
        (self.hp != hp_before, self.sp != sp_before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::skill_db;

    fn novice() -> Character {
        let mut stats = StatGraph::standard().unwrap();
        stats.set_base(StatType::BaseLevel, 10.0);
        stats.set_base(StatType::Vit, 10.0);
        stats.set_base(StatType::Int, 10.0);
        Character::new(stats, Race::DemiHuman, Element::Neutral)
    }

    #[test]
    fn test_starts_full() {
        let character = novice();
        assert!(character.max_hp() > 0);
        assert_eq!(character.hp(), character.max_hp());
        assert_eq!(character.sp(), character.max_sp());
        assert_eq!(character.hp_percent(), 100);
    }

    #[test]
    fn test_set_hp_clamps() {
        let mut character = novice();
        let max = character.max_hp();

        assert!(character.set_hp(-5));
        assert_eq!(character.hp(), 0);
        assert!(character.is_dead());

        assert!(character.set_hp(max + 100));
        assert_eq!(character.hp(), max);
        assert!(!character.set_hp(max));
    }

    #[test]
    fn test_damage_and_heal_stop_at_bounds() {
        let mut character = novice();
        let max = character.max_hp();

        assert_eq!(character.take_damage(max + 50), max);
        assert!(character.is_dead());
        assert_eq!(character.heal(10), 0);

        character.set_hp(1);
        assert_eq!(character.heal(max * 2), max - 1);
    }

    #[test]
    fn test_lowering_vit_shrinks_hp() {
        let mut character = novice();
        let changes = character.set_base_stat(StatType::Vit, 1.0);
        assert!(changes.iter().any(|c| c.stat == StatType::MaxHp));
        assert_eq!(character.hp(), character.max_hp());
    }

    #[test]
    fn test_cast_time_scales_with_dex() {
        let mut character = novice();
        let bolt = skill_db::lookup(SkillId::FIRE_BOLT).unwrap();
        assert_approx_eq!(character.cast_time(bolt, 1), 0.7, 1e-5);

        character.set_base_stat(StatType::Dex, 75.0);
        assert_approx_eq!(character.cast_time(bolt, 1), 0.35, 1e-5);
    }

    #[test]
    fn test_regeneration_waits_for_interval() {
        let mut character = novice();
        character.set_hp(1);
        character.set_sp(0);

        assert_eq!(character.regenerate(2.0, 6.0), (false, false));
        assert_eq!(character.regenerate(4.5, 6.0), (true, true));
        assert!(character.hp() > 1);
        assert!(character.sp() > 0);
    }

    #[test]
    fn test_exp_tables_grow() {
        assert_eq!(base_exp_to_next(1), 30);
        assert!(base_exp_to_next(10) > base_exp_to_next(9));
        assert_eq!(job_exp_to_next(2), 60);
        assert_eq!(status_points_for_level(10), 5);
    }
}
