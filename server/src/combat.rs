//! Skill use, damage, death and experience.

use crate::character::{
    base_exp_to_next, job_exp_to_next, status_points_for_level, Character, QueuedSkill,
    MAX_BASE_LEVEL, MAX_JOB_LEVEL,
};
use crate::monster::{self, CHASE_RANGE};
use crate::replication::ExpState;
use crate::world::{notify, ClientId, EntityRole, PendingRespawn, PendingRevive, ServerEntity, World};
use log::{debug, info, warn};
use shared::skill::{CastRequest, ExecutionEvent, ExecutionHandle};
use shared::skill_db::{self, SkillDefinition, SkillEffect, SkillTargetKind};
use shared::stats::{status_point_cost, StatType};
use shared::{
    EntityId, EntityKind, RemovalReason, SkillError, SkillId, SkillTarget, WorldError,
};

/// What a successful skill request turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillOutcome {
    Casting(ExecutionHandle),
    /// No cast time; the effect already landed.
    Executed(ExecutionHandle),
    /// The user was busy with another skill.
    Queued,
}

fn hostile(a: EntityKind, b: EntityKind) -> bool {
    matches!(
        (a, b),
        (EntityKind::Player, EntityKind::Monster) | (EntityKind::Monster, EntityKind::Player)
    )
}

/// Monsters use skills for free.
fn sp_cost(character: &Character, definition: &SkillDefinition, level: u8) -> i32 {
    if character.progression.is_some() {
        definition.sp_cost(level)
    } else {
        0
    }
}

/// Damage dealt or HP restored before the defender's pool is touched.
pub(crate) fn skill_amount(
    attacker: &Character,
    defender: &Character,
    definition: &SkillDefinition,
    level: u8,
) -> i32 {
    let context = attacker.condition_context(Some(defender));
    let power = definition.power(level);
    let stats = attacker.stats();
    match definition.effect {
        SkillEffect::PhysicalDamage => {
            let atk = stats.int(StatType::Atk)
                + attacker.conditional.value_for(StatType::Atk, &context);
            (atk * power / 100 - defender.stats().int(StatType::Def)).max(1)
        }
        SkillEffect::MagicDamage => {
            let matk = stats.int(StatType::Matk)
                + attacker.conditional.value_for(StatType::Matk, &context);
            (matk * power / 100 - defender.stats().int(StatType::Int) / 2).max(1)
        }
        SkillEffect::Heal => power + stats.int(StatType::Matk) / 2,
    }
}

impl World {
    pub fn request_skill(
        &mut self,
        client_id: ClientId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
    ) -> Result<SkillOutcome, WorldError> {
        let user = self.player_entity(client_id)?;
        self.use_skill(user, skill, level, target)
    }

    pub(crate) fn use_skill(
        &mut self,
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
    ) -> Result<SkillOutcome, WorldError> {
        let definition = skill_db::lookup(skill)?;
        definition.validate_level(level)?;
        let target = self.validate_target(user, definition, target)?;

        let entity = self
            .entities
            .get_mut(&user)
            .ok_or(WorldError::UnknownEntity(user))?;
        let owner = entity.owner();
        let character = entity
            .character
            .as_mut()
            .ok_or(WorldError::NotBattleCapable(user))?;
        if character.is_dead() {
            return Err(WorldError::Dead(user));
        }
        if character.cooldowns.is_cooling_down(skill) {
            return Err(SkillError::OnCooldown(skill).into());
        }
        let cost = sp_cost(character, definition, level);
        if character.sp() < cost {
            return Err(SkillError::InsufficientSp {
                required: cost,
                available: character.sp(),
            }
            .into());
        }

        if character.executions.is_busy() && character.executions.find_casting(skill).is_none() {
            character.queued = Some(QueuedSkill {
                skill,
                level,
                target,
            });
            if let Some(observer) = owner.and_then(|c| self.observers.get_mut(&c)) {
                observer.queue.enqueue_skill_queued(skill, level);
            }
            debug!("{} queued {}", user, definition.name);
            return Ok(SkillOutcome::Queued);
        }

        let cast_time = character.cast_time(definition, level);
        let handle = character
            .executions
            .request(CastRequest {
                user,
                target,
                skill,
                level,
                cast_time,
            })
            .handle();
        self.stop_entity(user);

        if cast_time > 0.0 {
            notify(&mut self.observers, user, |queue| {
                queue.enqueue_cast_progress(user, skill, level, target, cast_time, cast_time)
            });
            Ok(SkillOutcome::Casting(handle))
        } else {
            self.finish_cast(user, handle);
            Ok(SkillOutcome::Executed(handle))
        }
    }

    /// Resolves self-targeted skills and rejects targets the skill cannot
    /// reach or affect.
    fn validate_target(
        &self,
        user: EntityId,
        definition: &SkillDefinition,
        target: SkillTarget,
    ) -> Result<SkillTarget, WorldError> {
        let user_entity = self
            .entities
            .get(&user)
            .ok_or(WorldError::UnknownEntity(user))?;
        let invalid = || WorldError::from(SkillError::InvalidTarget(definition.id));

        let position = match definition.target {
            SkillTargetKind::SelfOnly => return Ok(SkillTarget::Entity(user)),
            SkillTargetKind::Entity => {
                let SkillTarget::Entity(id) = target else {
                    return Err(invalid());
                };
                let target_entity = self
                    .entities
                    .get(&id)
                    .ok_or(WorldError::UnknownEntity(id))?;
                if !target_entity.kind().is_battle_capable() {
                    return Err(WorldError::NotBattleCapable(id));
                }
                if !target_entity.is_alive() {
                    return Err(WorldError::Dead(id));
                }
                let offensive = definition.effect != SkillEffect::Heal;
                if offensive != hostile(user_entity.kind(), target_entity.kind()) {
                    return Err(invalid());
                }
                target_entity.position
            }
            SkillTargetKind::Ground => {
                let SkillTarget::Ground(cell) = target else {
                    return Err(invalid());
                };
                if !self.grid.are_coordinates_valid(cell) {
                    return Err(invalid());
                }
                cell
            }
        };

        let distance = user_entity.position.distance(&position);
        if distance > definition.range {
            return Err(SkillError::OutOfRange {
                distance,
                range: definition.range,
            }
            .into());
        }
        Ok(target)
    }

    pub(crate) fn advance_skills(&mut self, dt: f32) {
        let mut finished = Vec::new();
        for entity in self.entities.values_mut() {
            let Some(character) = entity.character.as_mut() else {
                continue;
            };
            for event in character.executions.advance(dt) {
                match event {
                    ExecutionEvent::CastFinished(handle) => finished.push((entity.id, handle)),
                    ExecutionEvent::Abandoned(handle) => {
                        warn!("Execution {:?} of {} never landed", handle, entity.id)
                    }
                    ExecutionEvent::Removed(_) => {}
                }
            }
            character.cooldowns.advance(dt);
        }

        for (user, handle) in finished {
            self.finish_cast(user, handle);
        }
    }

    /// Reissues skills requested while their user was busy.
    pub(crate) fn issue_queued_skills(&mut self) {
        let ready: Vec<(EntityId, QueuedSkill)> = self
            .entities
            .values_mut()
            .filter_map(|entity| {
                let character = entity.character.as_mut()?;
                if character.executions.is_busy() {
                    return None;
                }
                character.queued.take().map(|queued| (entity.id, queued))
            })
            .collect();

        for (user, queued) in ready {
            if let Err(e) = self.use_skill(user, queued.skill, queued.level, queued.target) {
                debug!("Dropped queued {:?} of {}: {}", queued.skill, user, e);
            }
        }
    }

    /// Lands a skill whose cast is over.
    fn finish_cast(&mut self, user: EntityId, handle: ExecutionHandle) {
        let Some(character) = self
            .entities
            .get_mut(&user)
            .and_then(|e| e.character.as_mut())
        else {
            return;
        };
        let Some(execution) = character.executions.get(handle).cloned() else {
            return;
        };
        let (Some(target), Ok(definition)) = (execution.target, skill_db::lookup(execution.skill))
        else {
            character.executions.remove(handle);
            return;
        };
        if character.is_dead() {
            character.executions.remove(handle);
            return;
        }

        let cost = sp_cost(character, definition, execution.level);
        if !character.spend_sp(cost) {
            character.executions.remove(handle);
            warn!("{} ran out of SP before {} landed", user, definition.name);
            return;
        }
        character
            .executions
            .start_execution(handle, definition.animation_delay);
        if definition.reuse_cooldown > 0.0 {
            character
                .cooldowns
                .start(execution.skill, definition.reuse_cooldown);
        }
        if cost > 0 {
            self.publish_sp(user);
        }

        let amount = self.apply_effect(user, definition, execution.level, target);
        let (skill, level, animation) = (execution.skill, execution.level, definition.animation_delay);
        notify(&mut self.observers, user, |queue| {
            queue.enqueue_skill_executed(user, skill, level, target, animation, amount)
        });
    }

    fn apply_effect(
        &mut self,
        user: EntityId,
        definition: &SkillDefinition,
        level: u8,
        target: SkillTarget,
    ) -> i32 {
        match target {
            SkillTarget::Entity(id) => self.apply_to(user, id, definition, level),
            SkillTarget::Ground(center) => {
                let Some(user_kind) = self.entities.get(&user).map(ServerEntity::kind) else {
                    return 0;
                };
                let victims: Vec<EntityId> = self
                    .grid
                    .occupants_in_range(center, definition.area)
                    .into_iter()
                    .filter(|id| {
                        self.entities
                            .get(id)
                            .is_some_and(|e| hostile(user_kind, e.kind()))
                    })
                    .collect();
                victims
                    .into_iter()
                    .map(|id| self.apply_to(user, id, definition, level))
                    .sum()
            }
        }
    }

    /// Returns the HP actually lost or restored.
    fn apply_to(
        &mut self,
        user: EntityId,
        target: EntityId,
        definition: &SkillDefinition,
        level: u8,
    ) -> i32 {
        let attacker = self.entities.get(&user).and_then(|e| e.character.as_ref());
        let defender = self.entities.get(&target).and_then(|e| e.character.as_ref());
        let amount = match (attacker, defender) {
            (Some(attacker), Some(defender)) if !defender.is_dead() => {
                skill_amount(attacker, defender, definition, level)
            }
            _ => {
                debug!("{} of {} found no living target {}", definition.name, user, target);
                return 0;
            }
        };

        let Some(entity) = self.entities.get_mut(&target) else {
            return 0;
        };
        let Some(defender) = entity.character.as_mut() else {
            return 0;
        };
        let applied = match definition.effect {
            SkillEffect::Heal => defender.heal(amount),
            SkillEffect::PhysicalDamage | SkillEffect::MagicDamage => {
                defender.last_attacker = Some(user);
                if let EntityRole::Monster(brain) = &mut entity.role {
                    brain.target = Some(user);
                }
                defender.take_damage(amount)
            }
        };
        let died = defender.is_dead();

        self.publish_hp(target);
        if died {
            self.kill(target, Some(user));
        }
        applied
    }

    pub(crate) fn kill(&mut self, id: EntityId, killer: Option<EntityId>) {
        self.stop_entity(id);
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if let Some(character) = entity.character.as_mut() {
            character.executions.clear();
            character.queued = None;
        }
        let position = entity.position;

        match entity.role.clone() {
            EntityRole::Monster(brain) => {
                self.despawn(id, RemovalReason::Died);
                let Some(class) = monster::class(brain.class_id) else {
                    return;
                };
                if let Some(killer) = killer {
                    self.award_exp(killer, class.base_exp, class.job_exp);
                }
                self.drop_pickup(class.drop_item, position);
                self.respawns.push(PendingRespawn {
                    class_id: brain.class_id,
                    spawn: brain.spawn,
                    remaining: self.config.respawn_delay,
                });
                info!("{} {} died", class.name, id);
            }
            EntityRole::Player { .. } => {
                self.revivals.push(PendingRevive {
                    entity: id,
                    remaining: self.config.revive_delay,
                });
                info!("Player {} died", id);
            }
            EntityRole::Pickup { .. } => {}
        }
    }

    /// Adds experience and applies every level it pays for.
    pub(crate) fn award_exp(&mut self, id: EntityId, base_exp: u32, job_exp: u32) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let owner = entity.owner();
        let Some(character) = entity.character.as_mut() else {
            return;
        };
        let Some(progression) = character.progression.as_mut() else {
            return;
        };
        progression.base_exp += base_exp;
        progression.job_exp += job_exp;

        let mut changes = Vec::new();
        let mut base_level = None;
        loop {
            let level = character.level();
            let needed = base_exp_to_next(level);
            let Some(progression) = character.progression.as_mut() else {
                break;
            };
            if level >= MAX_BASE_LEVEL || progression.base_exp < needed {
                break;
            }
            progression.base_exp -= needed;
            progression.status_points += status_points_for_level(level + 1);
            changes.extend(character.set_base_stat(StatType::BaseLevel, (level + 1) as f64));
            base_level = Some(level + 1);
        }

        let mut job_level = None;
        loop {
            let level = character.job_level();
            let needed = job_exp_to_next(level);
            let Some(progression) = character.progression.as_mut() else {
                break;
            };
            if level >= MAX_JOB_LEVEL || progression.job_exp < needed {
                break;
            }
            progression.job_exp -= needed;
            progression.skill_points += 1;
            changes.extend(character.set_base_stat(StatType::JobLevel, (level + 1) as f64));
            job_level = Some(level + 1);
        }

        if base_level.is_some() {
            character.restore();
        }
        let (level, current_job) = (character.level(), character.job_level());
        let costs: Vec<(StatType, i32)> = StatType::RAISABLE
            .iter()
            .map(|stat| (*stat, status_point_cost(character.stats().int(*stat))))
            .collect();
        let Some(progression) = character.progression.clone() else {
            return;
        };

        self.publish_stat_changes(id, &changes);
        if let Some(observer) = owner.and_then(|c| self.observers.get_mut(&c)) {
            observer.queue.enqueue_exp(ExpState {
                base_exp: progression.base_exp,
                base_exp_next: base_exp_to_next(level),
                job_exp: progression.job_exp,
                job_exp_next: job_exp_to_next(current_job),
            });
            if base_level.is_some() || job_level.is_some() {
                observer
                    .queue
                    .enqueue_remaining_points(progression.status_points, progression.skill_points);
            }
            if base_level.is_some() {
                for (stat, cost) in costs {
                    observer.queue.enqueue_stat_cost(stat, cost);
                }
            }
        }
        if let Some(level) = base_level {
            notify(&mut self.observers, id, |queue| queue.enqueue_base_level_up(id, level));
            self.publish_hp(id);
            self.publish_sp(id);
            info!("{} reached base level {}", id, level);
        }
        if let Some(level) = job_level {
            notify(&mut self.observers, id, |queue| queue.enqueue_job_level_up(id, level));
            info!("{} reached job level {}", id, level);
        }
    }

    pub(crate) fn run_monster_ai(&mut self, dt: f32) {
        let monsters: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| matches!(e.role, EntityRole::Monster(_)) && e.is_alive())
            .map(|e| e.id)
            .collect();
        for id in monsters {
            self.think(id, dt);
        }
    }

    fn think(&mut self, id: EntityId, dt: f32) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let EntityRole::Monster(brain) = &entity.role else {
            return;
        };
        let position = entity.position;
        let busy = entity
            .character
            .as_ref()
            .is_some_and(|c| c.executions.is_busy());

        if let Some(target) = brain.target {
            let chase = self
                .entities
                .get(&target)
                .filter(|t| t.is_alive() && t.position.in_range(&position, CHASE_RANGE))
                .map(|t| t.position);
            match chase {
                Some(target_position) => {
                    if busy {
                        return;
                    }
                    let result = if position.distance(&target_position) <= 1 {
                        self.use_skill(id, SkillId::BASH, 1, SkillTarget::Entity(target))
                            .map(|_| ())
                    } else if entity.path.destination() != Some(target_position) {
                        self.move_entity(id, target_position).map(|_| ())
                    } else {
                        Ok(())
                    };
                    if let Err(e) = result {
                        debug!("Monster {} could not chase {}: {}", id, target, e);
                    }
                    return;
                }
                None => {
                    if let Some(EntityRole::Monster(brain)) =
                        self.entities.get_mut(&id).map(|e| &mut e.role)
                    {
                        brain.target = None;
                    }
                }
            }
        }

        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if !entity.path.has_finished() || busy {
            return;
        }
        let EntityRole::Monster(brain) = &mut entity.role else {
            return;
        };
        let radius = monster::class(brain.class_id)
            .map(|c| c.wander_radius)
            .unwrap_or_default();
        if let Some(destination) = brain.wander(dt, radius, &*self.grid, &mut self.rng) {
            if let Err(e) = self.move_entity(id, destination) {
                debug!("Monster {} could not wander: {}", id, e);
            }
        }
    }
}
