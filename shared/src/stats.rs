//! Numeric combat attributes.
//!
//! A [`Stat`] is a base term plus an additive bonus and a percent bonus. The
//! total is cached and recomputed synchronously on every write; the write
//! reports whether the total changed so the owner can raise a notification.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatType {
    // Base attributes, written directly.
    Str,
    Agi,
    Vit,
    Int,
    Dex,
    Luk,
    BaseLevel,
    JobLevel,
    MoveSpeed,
    // Derived attributes, computed by the stat graph.
    MaxHp,
    MaxSp,
    HpRegen,
    SpRegen,
    Atk,
    Matk,
    Def,
    Hit,
    Flee,
    Crit,
    CastTimeMultiplier,
    AttackDelay,
}

impl StatType {
    pub const ALL: [StatType; 21] = [
        StatType::Str,
        StatType::Agi,
        StatType::Vit,
        StatType::Int,
        StatType::Dex,
        StatType::Luk,
        StatType::BaseLevel,
        StatType::JobLevel,
        StatType::MoveSpeed,
        StatType::MaxHp,
        StatType::MaxSp,
        StatType::HpRegen,
        StatType::SpRegen,
        StatType::Atk,
        StatType::Matk,
        StatType::Def,
        StatType::Hit,
        StatType::Flee,
        StatType::Crit,
        StatType::CastTimeMultiplier,
        StatType::AttackDelay,
    ];

    /// Attributes a player can spend status points on.
    pub const RAISABLE: [StatType; 6] = [
        StatType::Str,
        StatType::Agi,
        StatType::Vit,
        StatType::Int,
        StatType::Dex,
        StatType::Luk,
    ];

    pub fn is_base(&self) -> bool {
        matches!(
            self,
            StatType::Str
                | StatType::Agi
                | StatType::Vit
                | StatType::Int
                | StatType::Dex
                | StatType::Luk
                | StatType::BaseLevel
                | StatType::JobLevel
                | StatType::MoveSpeed
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            StatType::CastTimeMultiplier | StatType::AttackDelay | StatType::MoveSpeed
        )
    }

    pub fn is_raisable(&self) -> bool {
        Self::RAISABLE.contains(self)
    }
}

/// Typed value carried by stat updates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum StatValue {
    Int(i32),
    Float(f32),
}

impl StatValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            StatValue::Int(v) => *v as f64,
            StatValue::Float(v) => *v as f64,
        }
    }
}

/// Numeric representation of a stat total.
pub trait StatNumber: Copy + PartialEq + Default + Debug {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl StatNumber for i32 {
    /// Integer stats floor fractional intermediates.
    fn from_f64(value: f64) -> Self {
        value.floor() as i32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl StatNumber for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stat<T: StatNumber> {
    base: T,
    bonus: T,
    percent: i32,
    total: T,
}

impl<T: StatNumber> Stat<T> {
    pub fn new(base: T) -> Self {
        let mut stat = Self {
            base,
            ..Self::default()
        };
        stat.recompute();
        stat
    }

    pub fn base(&self) -> T {
        self.base
    }

    pub fn bonus(&self) -> T {
        self.bonus
    }

    pub fn percent(&self) -> i32 {
        self.percent
    }

    /// Zero until the first computation.
    pub fn total(&self) -> T {
        self.total
    }

    pub fn set_base(&mut self, value: T) -> bool {
        self.base = value;
        self.recompute()
    }

    pub fn add_bonus(&mut self, delta: T) -> bool {
        self.bonus = T::from_f64(self.bonus.to_f64() + delta.to_f64());
        self.recompute()
    }

    pub fn add_percent(&mut self, delta: i32) -> bool {
        self.percent += delta;
        self.recompute()
    }

    /// Returns true when the total differs from the previously observed one.
    pub fn recompute(&mut self) -> bool {
        let raw = (self.base.to_f64() + self.bonus.to_f64()) * (1.0 + self.percent as f64 / 100.0);
        let total = T::from_f64(raw);
        let changed = total != self.total;
        self.total = total;
        changed
    }
}

/// All stats of one entity.
#[derive(Debug, Clone, Default)]
pub struct StatBlock {
    ints: HashMap<StatType, Stat<i32>>,
    floats: HashMap<StatType, Stat<f32>>,
}

impl StatBlock {
    pub fn new() -> Self {
        let mut block = Self::default();
        for stat in StatType::ALL {
            if stat.is_float() {
                block.floats.insert(stat, Stat::default());
            } else {
                block.ints.insert(stat, Stat::default());
            }
        }
        block
    }

    pub fn int(&self, stat: StatType) -> i32 {
        self.ints.get(&stat).map(|s| s.total()).unwrap_or_default()
    }

    pub fn float(&self, stat: StatType) -> f32 {
        self.floats.get(&stat).map(|s| s.total()).unwrap_or_default()
    }

    pub fn base(&self, stat: StatType) -> f64 {
        if stat.is_float() {
            self.floats.get(&stat).map(|s| s.base().to_f64()).unwrap_or_default()
        } else {
            self.ints.get(&stat).map(|s| s.base().to_f64()).unwrap_or_default()
        }
    }

    /// Total as a float, for formulas.
    pub fn value(&self, stat: StatType) -> f64 {
        self.get(stat).as_f64()
    }

    pub fn get(&self, stat: StatType) -> StatValue {
        if stat.is_float() {
            StatValue::Float(self.float(stat))
        } else {
            StatValue::Int(self.int(stat))
        }
    }

    pub fn set_base(&mut self, stat: StatType, value: f64) -> bool {
        if stat.is_float() {
            self.floats.entry(stat).or_default().set_base(f32::from_f64(value))
        } else {
            self.ints.entry(stat).or_default().set_base(i32::from_f64(value))
        }
    }

    pub fn add_bonus(&mut self, stat: StatType, delta: f64) -> bool {
        if stat.is_float() {
            self.floats.entry(stat).or_default().add_bonus(f32::from_f64(delta))
        } else {
            self.ints.entry(stat).or_default().add_bonus(i32::from_f64(delta))
        }
    }

    pub fn add_percent(&mut self, stat: StatType, delta: i32) -> bool {
        if stat.is_float() {
            self.floats.entry(stat).or_default().add_percent(delta)
        } else {
            self.ints.entry(stat).or_default().add_percent(delta)
        }
    }

    /// Every stat and its current total, in declaration order.
    pub fn all(&self) -> Vec<(StatType, StatValue)> {
        StatType::ALL.iter().map(|stat| (*stat, self.get(*stat))).collect()
    }
}

/// Status points needed to raise a base attribute by one from `current`.
pub fn status_point_cost(current: i32) -> i32 {
    (current - 1).max(0) / 10 + 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Race {
    Formless,
    Undead,
    Brute,
    Plant,
    Insect,
    Fish,
    Demon,
    DemiHuman,
    Angel,
    Dragon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Neutral,
    Water,
    Earth,
    Fire,
    Wind,
    Poison,
    Holy,
    Dark,
    Ghost,
    Undead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeaponType {
    None,
    Dagger,
    Sword,
    Spear,
    Axe,
    Mace,
    Staff,
    Bow,
}

/// When a conditional modifier applies. Equal conditions are equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    TargetRace(Race),
    TargetElement(Element),
    WeaponType(WeaponType),
    HpBelowPercent(u8),
}

/// What a condition is evaluated against at use time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionContext {
    pub target_race: Option<Race>,
    pub target_element: Option<Element>,
    pub weapon: Option<WeaponType>,
    pub hp_percent: u8,
}

impl Condition {
    pub fn holds(&self, context: &ConditionContext) -> bool {
        match self {
            Condition::TargetRace(race) => context.target_race == Some(*race),
            Condition::TargetElement(element) => context.target_element == Some(*element),
            Condition::WeaponType(weapon) => context.weapon == Some(*weapon),
            Condition::HpBelowPercent(threshold) => context.hp_percent < *threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionalStat {
    pub stat: StatType,
    pub condition: Condition,
    pub value: i32,
}

/// At most one entry per (stat, condition); merging sums values and an entry
/// whose sum returns to zero is dropped.
#[derive(Debug, Clone, Default)]
pub struct ConditionalStatSet {
    entries: Vec<ConditionalStat>,
}

impl ConditionalStatSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, modifier: ConditionalStat) {
        if let Some(index) = self
            .entries
            .iter()
            .position(|e| e.stat == modifier.stat && e.condition == modifier.condition)
        {
            self.entries[index].value += modifier.value;
            if self.entries[index].value == 0 {
                self.entries.swap_remove(index);
            }
        } else if modifier.value != 0 {
            self.entries.push(modifier);
        }
    }

    pub fn remove(&mut self, modifier: ConditionalStat) {
        self.add(ConditionalStat {
            value: -modifier.value,
            ..modifier
        });
    }

    /// Sum of every modifier on `stat` whose condition holds.
    pub fn value_for(&self, stat: StatType, context: &ConditionContext) -> i32 {
        self.entries
            .iter()
            .filter(|e| e.stat == stat && e.condition.holds(context))
            .map(|e| e.value)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConditionalStat> {
        self.entries.iter()
    }
}
