//! Dependency graph between base and derived stats.
//!
//! Every derived stat is produced by a [`StatFormula`] that names its inputs
//! explicitly. The graph is built once, sorted topologically and rejected if
//! it contains a cycle. A write to any stat recomputes everything reachable
//! from it in topological order before returning, so no stale total can be
//! observed afterwards.

use crate::error::StatGraphError;
use crate::stats::{StatBlock, StatType, StatValue};
use std::collections::{HashMap, HashSet, VecDeque};

pub type FormulaFn = fn(&StatBlock) -> f64;

#[derive(Clone, Copy)]
pub struct StatFormula {
    pub target: StatType,
    pub inputs: &'static [StatType],
    pub compute: FormulaFn,
}

impl std::fmt::Debug for StatFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatFormula")
            .field("target", &self.target)
            .field("inputs", &self.inputs)
            .finish()
    }
}

/// A stat whose total moved, with the value it ended on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatChange {
    pub stat: StatType,
    pub value: StatValue,
}

#[derive(Debug, Clone)]
pub struct StatGraph {
    stats: StatBlock,
    formulas: HashMap<StatType, StatFormula>,
    dependents: HashMap<StatType, Vec<StatType>>,
    order: Vec<StatType>,
    rank: HashMap<StatType, usize>,
}

impl StatGraph {
    pub fn new(formulas: &[StatFormula]) -> Result<Self, StatGraphError> {
        let mut by_target = HashMap::new();
        let mut dependents: HashMap<StatType, Vec<StatType>> = HashMap::new();

        for formula in formulas {
            if formula.target.is_base() {
                return Err(StatGraphError::FormulaOnBaseStat(formula.target));
            }
            if by_target.insert(formula.target, *formula).is_some() {
                return Err(StatGraphError::DuplicateFormula {
                    target: formula.target,
                });
            }
            for input in formula.inputs {
                dependents.entry(*input).or_default().push(formula.target);
            }
        }

        let order = Self::topological_order(&dependents)?;
        let rank = order.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        let mut graph = Self {
            stats: StatBlock::new(),
            formulas: by_target,
            dependents,
            order,
            rank,
        };
        graph.recompute_all();
        Ok(graph)
    }

    /// Graph with the standard formula set.
    pub fn standard() -> Result<Self, StatGraphError> {
        Self::new(&standard_formulas())
    }

    fn topological_order(
        dependents: &HashMap<StatType, Vec<StatType>>,
    ) -> Result<Vec<StatType>, StatGraphError> {
        let mut indegree: HashMap<StatType, usize> =
            StatType::ALL.iter().map(|s| (*s, 0)).collect();
        for targets in dependents.values() {
            for target in targets {
                *indegree.entry(*target).or_default() += 1;
            }
        }

        // Seed in declaration order so the result is deterministic.
        let mut ready: VecDeque<StatType> = StatType::ALL
            .iter()
            .copied()
            .filter(|s| indegree.get(s) == Some(&0))
            .collect();
        let mut order = Vec::with_capacity(StatType::ALL.len());

        while let Some(stat) = ready.pop_front() {
            order.push(stat);
            for target in dependents.get(&stat).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = indegree.get_mut(target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*target);
                    }
                }
            }
        }

        if order.len() < indegree.len() {
            let stuck = StatType::ALL
                .iter()
                .copied()
                .find(|s| !order.contains(s))
                .unwrap_or(StatType::MaxHp);
            return Err(StatGraphError::Cycle(stuck));
        }
        Ok(order)
    }

    pub fn stats(&self) -> &StatBlock {
        &self.stats
    }

    pub fn get(&self, stat: StatType) -> StatValue {
        self.stats.get(stat)
    }

    pub fn int(&self, stat: StatType) -> i32 {
        self.stats.int(stat)
    }

    pub fn float(&self, stat: StatType) -> f32 {
        self.stats.float(stat)
    }

    pub fn has_formula(&self, stat: StatType) -> bool {
        self.formulas.contains_key(&stat)
    }

    /// Stats recomputed directly when `stat` changes.
    pub fn dependents_of(&self, stat: StatType) -> &[StatType] {
        self.dependents.get(&stat).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn order(&self) -> &[StatType] {
        &self.order
    }

    /// Replaces the base term of `stat`. Formula-driven stats cannot be
    /// written this way and are left untouched.
    pub fn set_base(&mut self, stat: StatType, value: f64) -> Vec<StatChange> {
        if self.has_formula(stat) {
            log::error!("Refusing to write base of formula-driven stat {:?}", stat);
            return Vec::new();
        }
        let changed = self.stats.set_base(stat, value);
        self.cascade(stat, changed)
    }

    pub fn add_bonus(&mut self, stat: StatType, delta: f64) -> Vec<StatChange> {
        let changed = self.stats.add_bonus(stat, delta);
        self.cascade(stat, changed)
    }

    pub fn add_percent(&mut self, stat: StatType, delta: i32) -> Vec<StatChange> {
        let changed = self.stats.add_percent(stat, delta);
        self.cascade(stat, changed)
    }

    /// Recomputes every derived stat.
    pub fn recompute_all(&mut self) -> Vec<StatChange> {
        let mut changes = Vec::new();
        for stat in self.order.clone() {
            if self.recompute(stat) {
                push_change(&mut changes, stat, self.stats.get(stat));
            }
        }
        changes
    }

    fn recompute(&mut self, stat: StatType) -> bool {
        match self.formulas.get(&stat) {
            Some(formula) => {
                let value = (formula.compute)(&self.stats);
                self.stats.set_base(stat, value)
            }
            None => false,
        }
    }

    fn cascade(&mut self, root: StatType, root_changed: bool) -> Vec<StatChange> {
        let mut changes = Vec::new();
        if !root_changed {
            return changes;
        }
        push_change(&mut changes, root, self.stats.get(root));

        let mut reachable = HashSet::new();
        let mut frontier = vec![root];
        while let Some(stat) = frontier.pop() {
            for dependent in self.dependents_of(stat) {
                if reachable.insert(*dependent) {
                    frontier.push(*dependent);
                }
            }
        }

        let mut pending: Vec<StatType> = reachable.into_iter().collect();
        pending.sort_by_key(|s| self.rank.get(s).copied().unwrap_or(usize::MAX));

        for stat in pending {
            if self.recompute(stat) {
                push_change(&mut changes, stat, self.stats.get(stat));
            }
        }
        changes
    }
}

/// Last write wins when the same stat shows up twice.
fn push_change(changes: &mut Vec<StatChange>, stat: StatType, value: StatValue) {
    match changes.iter_mut().find(|c| c.stat == stat) {
        Some(existing) => existing.value = value,
        None => changes.push(StatChange { stat, value }),
    }
}

fn max_hp(s: &StatBlock) -> f64 {
    let level = s.value(StatType::BaseLevel);
    let vit = s.value(StatType::Vit);
    35.0 + level * 5.0 + 0.7 * level * (level + 1.0) / 2.0 * (1.0 + vit * 0.01)
}

fn max_sp(s: &StatBlock) -> f64 {
    let level = s.value(StatType::BaseLevel);
    let int = s.value(StatType::Int);
    (10.0 + level * 2.0) * (1.0 + int * 0.01)
}

fn hp_regen(s: &StatBlock) -> f64 {
    (s.value(StatType::MaxHp) / 200.0).floor().max(1.0) + (s.value(StatType::Vit) / 5.0).floor()
}

fn sp_regen(s: &StatBlock) -> f64 {
    1.0 + (s.value(StatType::MaxSp) / 100.0).floor() + (s.value(StatType::Int) / 6.0).floor()
}

fn atk(s: &StatBlock) -> f64 {
    let str = s.value(StatType::Str);
    let bonus = (str / 10.0).floor();
    str + bonus * bonus + (s.value(StatType::Dex) / 5.0).floor() + (s.value(StatType::Luk) / 5.0).floor()
}

fn matk(s: &StatBlock) -> f64 {
    let int = s.value(StatType::Int);
    let bonus = (int / 7.0).floor();
    int + bonus * bonus
}

fn def(s: &StatBlock) -> f64 {
    (s.value(StatType::Vit) / 2.0).floor()
}

fn hit(s: &StatBlock) -> f64 {
    s.value(StatType::BaseLevel) + s.value(StatType::Dex)
}

fn flee(s: &StatBlock) -> f64 {
    s.value(StatType::BaseLevel) + s.value(StatType::Agi)
}

fn crit(s: &StatBlock) -> f64 {
    1.0 + s.value(StatType::Luk) * 0.3
}

fn cast_time_multiplier(s: &StatBlock) -> f64 {
    (1.0 - s.value(StatType::Dex) / 150.0).max(0.0)
}

fn attack_delay(s: &StatBlock) -> f64 {
    let agi = s.value(StatType::Agi);
    let dex = s.value(StatType::Dex);
    (1.0 - (agi * 4.0 + dex) / 1000.0).max(0.2)
}

pub fn standard_formulas() -> Vec<StatFormula> {
    vec![
        StatFormula {
            target: StatType::MaxHp,
            inputs: &[StatType::BaseLevel, StatType::Vit],
            compute: max_hp,
        },
        StatFormula {
            target: StatType::MaxSp,
            inputs: &[StatType::BaseLevel, StatType::Int],
            compute: max_sp,
        },
        StatFormula {
            target: StatType::HpRegen,
            inputs: &[StatType::MaxHp, StatType::Vit],
            compute: hp_regen,
        },
        StatFormula {
            target: StatType::SpRegen,
            inputs: &[StatType::MaxSp, StatType::Int],
            compute: sp_regen,
        },
        StatFormula {
            target: StatType::Atk,
            inputs: &[StatType::Str, StatType::Dex, StatType::Luk],
            compute: atk,
        },
        StatFormula {
            target: StatType::Matk,
            inputs: &[StatType::Int],
            compute: matk,
        },
        StatFormula {
            target: StatType::Def,
            inputs: &[StatType::Vit],
            compute: def,
        },
        StatFormula {
            target: StatType::Hit,
            inputs: &[StatType::BaseLevel, StatType::Dex],
            compute: hit,
        },
        StatFormula {
            target: StatType::Flee,
            inputs: &[StatType::BaseLevel, StatType::Agi],
            compute: flee,
        },
        StatFormula {
            target: StatType::Crit,
            inputs: &[StatType::Luk],
            compute: crit,
        },
        StatFormula {
            target: StatType::CastTimeMultiplier,
            inputs: &[StatType::Dex],
            compute: cast_time_multiplier,
        },
        StatFormula {
            target: StatType::AttackDelay,
            inputs: &[StatType::Agi, StatType::Dex],
            compute: attack_delay,
        },
    ]
}
