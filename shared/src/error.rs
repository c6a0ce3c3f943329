//! Error types shared by the server and client crates.
//!
//! None of these are ever allowed to unwind through a tick. Callers log them
//! and carry on with the next entity.

use crate::entity::EntityId;
use crate::skill_db::SkillId;
use crate::stats::StatType;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatGraphError {
    #[error("stat dependency cycle detected through {0:?}")]
    Cycle(StatType),
    #[error("formula for {target:?} registered twice")]
    DuplicateFormula { target: StatType },
    #[error("{0:?} is a base attribute and cannot have a formula")]
    FormulaOnBaseStat(StatType),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillError {
    #[error("unknown skill {0:?}")]
    UnknownSkill(SkillId),
    #[error("skill {skill:?} does not have level {level}")]
    InvalidLevel { skill: SkillId, level: u8 },
    #[error("skill {0:?} is still on reuse cooldown")]
    OnCooldown(SkillId),
    #[error("not enough SP: need {required}, have {available}")]
    InsufficientSp { required: i32, available: i32 },
    #[error("skill {0:?} cannot be used on that target")]
    InvalidTarget(SkillId),
    #[error("target is out of range ({distance} > {range})")]
    OutOfRange { distance: u32, range: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("entity {0} does not exist")]
    UnknownEntity(EntityId),
    #[error("connection {0} is not logged in")]
    UnknownConnection(u32),
    #[error("connection {0} is already logged in")]
    DuplicateLogin(u32),
    #[error("entity {0} cannot take part in combat")]
    NotBattleCapable(EntityId),
    #[error("{0:?} cannot be raised with status points")]
    InvalidStatForUpdate(StatType),
    #[error("not enough status points: need {required}, have {available}")]
    InsufficientStatusPoints { required: i32, available: i32 },
    #[error("entity {0} is dead")]
    Dead(EntityId),
    #[error("entity {0} cannot move while casting")]
    Busy(EntityId),
    #[error("entity {0} is not a pickup")]
    NotAPickup(EntityId),
    #[error("out of reach ({distance} > {range})")]
    OutOfReach { distance: u32, range: u32 },
    #[error("unknown monster class {0}")]
    UnknownMonsterClass(u16),
    #[error("grid rejected the request: {0}")]
    Grid(String),
    #[error(transparent)]
    Skill(#[from] SkillError),
    #[error(transparent)]
    StatGraph(#[from] StatGraphError),
}
