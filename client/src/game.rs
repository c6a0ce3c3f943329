//! Client mirror of the world.
//!
//! Holds what the server told this connection about the entities around the
//! local player, plus the player's own personal data. Packets only ever
//! overwrite mirrored data; [`ClientGameState::tick`] keeps paths, casts and
//! reuse cooldowns moving between authoritative corrections and runs the
//! visibility lifecycle.

use crate::visibility::{MirrorSink, Observed, RangeSight, VisibilityLifecycle};
use log::{debug, info, warn};
use shared::skill::{CooldownSet, ExecutionEvent, SkillExecution, SkillExecutionList};
use shared::skill_db;
use shared::{
    Coordinate, Direction, EntityId, EntityKind, EntitySnapshot, LocalPlayerSnapshot, Packet,
    Path, RemovalReason, SkillId, SkillTarget, StatType, StatValue,
};
use std::collections::BTreeMap;

/// Mirrored copy of one server entity.
#[derive(Debug, Clone)]
pub struct ClientEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub class_id: u16,
    pub name: String,
    pub position: Coordinate,
    pub direction: Direction,
    pub path: Path,
    pub move_speed: f32,
    pub level: i32,
    pub hp: i32,
    pub max_hp: i32,
    pub sp: i32,
    pub max_sp: i32,
    pub stats: BTreeMap<StatType, StatValue>,
    pub executions: SkillExecutionList,
    /// Set once the server stopped replicating the entity.
    pub removed: Option<RemovalReason>,
}

impl ClientEntity {
    pub fn from_snapshot(snapshot: EntitySnapshot) -> Self {
        Self {
            id: snapshot.id,
            kind: snapshot.kind,
            class_id: snapshot.class_id,
            name: snapshot.name,
            position: snapshot.position,
            direction: snapshot.direction,
            path: Path::new(snapshot.path),
            move_speed: snapshot.move_speed,
            level: snapshot.level,
            hp: snapshot.hp,
            max_hp: snapshot.max_hp,
            sp: snapshot.sp,
            max_sp: snapshot.max_sp,
            stats: BTreeMap::new(),
            executions: SkillExecutionList::new(),
            removed: None,
        }
    }

    /// Overwrites the replicated fields. Executions and stats survive, since a
    /// snapshot does not carry them.
    fn apply_snapshot(&mut self, snapshot: EntitySnapshot) {
        let executions = std::mem::take(&mut self.executions);
        let stats = std::mem::take(&mut self.stats);
        *self = Self::from_snapshot(snapshot);
        self.executions = executions;
        self.stats = stats;
    }

    fn advance_path(&mut self, dt: f32) {
        if let Some(heading) = self.path.heading() {
            self.direction = heading;
        }
        if let Some(last) = self.path.advance(dt, self.move_speed).last() {
            self.position = *last;
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.kind.is_battle_capable() || self.hp > 0
    }

    pub fn stat(&self, stat: StatType) -> Option<StatValue> {
        self.stats.get(&stat).copied()
    }

    /// Elapsed fraction of the cast in progress, if any.
    pub fn cast_bar(&self) -> Option<f32> {
        self.executions
            .iter()
            .find(|execution| execution.is_casting())
            .map(|execution| execution.cast.fraction())
    }
}

/// Data only the owning player receives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersonalData {
    pub stat_costs: BTreeMap<StatType, i32>,
    pub status_points: i32,
    pub skill_points: i32,
    pub base_exp: u32,
    pub base_exp_next: u32,
    pub job_exp: u32,
    pub job_exp_next: u32,
    pub job_level: i32,
    /// Last skill the server put in our queue.
    pub queued_skill: Option<(SkillId, u8)>,
}

pub struct ClientGameState {
    pub client_id: Option<u32>,
    pub local_entity: Option<EntityId>,
    pub personal: PersonalData,
    pub tick: u64,
    entities: BTreeMap<EntityId, ClientEntity>,
    cooldowns: CooldownSet,
    visibility: VisibilityLifecycle,
    sight: RangeSight,
}

impl ClientGameState {
    pub fn new(view_range: u32) -> Self {
        Self {
            client_id: None,
            local_entity: None,
            personal: PersonalData::default(),
            tick: 0,
            entities: BTreeMap::new(),
            cooldowns: CooldownSet::new(),
            visibility: VisibilityLifecycle::new(),
            sight: RangeSight::new(view_range),
        }
    }

    pub fn entity(&self, id: EntityId) -> Option<&ClientEntity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &ClientEntity> {
        self.entities.values()
    }

    pub fn local_player(&self) -> Option<&ClientEntity> {
        self.local_entity.and_then(|id| self.entities.get(&id))
    }

    pub fn has_mirror(&self, id: EntityId) -> bool {
        self.visibility.has_mirror(id)
    }

    pub fn is_awaiting_removal(&self, id: EntityId) -> bool {
        self.visibility.is_awaiting_removal(id)
    }

    pub fn mirrors(&self) -> Vec<EntityId> {
        self.visibility.mirrors().collect()
    }

    pub fn cast_bar(&self, id: EntityId) -> Option<f32> {
        self.entities.get(&id).and_then(ClientEntity::cast_bar)
    }

    pub fn is_cooling_down(&self, skill: SkillId) -> bool {
        self.cooldowns.is_cooling_down(skill)
    }

    /// Whether the local player could ask for `skill` right now.
    pub fn can_request_skill(&self, skill: SkillId) -> bool {
        match self.local_player() {
            Some(player) => {
                player.is_alive() && !player.executions.is_busy() && !self.is_cooling_down(skill)
            }
            None => false,
        }
    }

    pub fn apply_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected {
                client_id,
                entity_id,
            } => {
                info!("Connected as client {} controlling entity {}", client_id, entity_id);
                self.client_id = Some(client_id);
                self.local_entity = Some(entity_id);
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.client_id = None;
                self.local_entity = None;
            }
            Packet::EntitySnapshot(snapshot) => self.apply_snapshot(snapshot),
            Packet::LocalPlayerSnapshot(snapshot) => self.apply_local_snapshot(snapshot),
            Packet::PathUpdate {
                id,
                position,
                path,
                move_speed,
            } => {
                if let Some(entity) = self.tracked_mut(id, "path update") {
                    entity.position = position;
                    entity.path = Path::new(path);
                    entity.move_speed = move_speed;
                }
            }
            Packet::StatUpdate { id, stat, value } => {
                if let Some(entity) = self.tracked_mut(id, "stat update") {
                    entity.stats.insert(stat, value);
                    if stat == StatType::BaseLevel {
                        entity.level = value.as_f64() as i32;
                    }
                }
            }
            Packet::StatCostUpdate { stat, cost } => {
                self.personal.stat_costs.insert(stat, cost);
            }
            Packet::RemainingPoints {
                status_points,
                skill_points,
            } => {
                self.personal.status_points = status_points;
                self.personal.skill_points = skill_points;
            }
            Packet::HpUpdate { id, hp, max_hp } => {
                if let Some(entity) = self.tracked_mut(id, "HP update") {
                    entity.hp = hp;
                    entity.max_hp = max_hp;
                }
            }
            Packet::SpUpdate { id, sp, max_sp } => {
                if let Some(entity) = self.tracked_mut(id, "SP update") {
                    entity.sp = sp;
                    entity.max_sp = max_sp;
                }
            }
            Packet::ExpUpdate {
                base_exp,
                base_exp_next,
                job_exp,
                job_exp_next,
            } => {
                self.personal.base_exp = base_exp;
                self.personal.base_exp_next = base_exp_next;
                self.personal.job_exp = job_exp;
                self.personal.job_exp_next = job_exp_next;
            }
            Packet::BaseLevelUp { id, level } => {
                if let Some(entity) = self.tracked_mut(id, "base level-up") {
                    entity.level = level;
                    info!("{} reached base level {}", entity.name, level);
                }
            }
            Packet::JobLevelUp { id, level } => {
                if Some(id) == self.local_entity {
                    self.personal.job_level = level;
                    info!("Reached job level {}", level);
                }
            }
            Packet::SkillCastProgress {
                user,
                skill,
                level,
                target,
                remaining,
                max,
            } => {
                let target = self.resolve_target(target);
                if let Some(entity) = self.tracked_mut(user, "cast progress") {
                    entity
                        .executions
                        .apply_cast_progress(user, skill, level, target, remaining, max);
                }
            }
            Packet::SkillExecuted {
                user,
                skill,
                level,
                target,
                animation,
                amount,
            } => {
                let target = self.resolve_target(target);
                if Some(user) == self.local_entity {
                    self.start_local_cooldown(skill);
                    if self.personal.queued_skill.map(|(queued, _)| queued) == Some(skill) {
                        self.personal.queued_skill = None;
                    }
                }
                if let Some(entity) = self.tracked_mut(user, "executed skill") {
                    entity
                        .executions
                        .apply_executed(user, skill, level, target, animation);
                    debug!("{} used {:?} for {}", entity.name, skill, amount);
                }
            }
            Packet::SkillQueued { skill, level } => {
                debug!("{:?} queued behind the current action", skill);
                self.personal.queued_skill = Some((skill, level));
            }
            Packet::EntityRemoved { id, reason } => self.mark_removed(id, reason),
            Packet::PickupRemoved { id } => self.mark_removed(id, RemovalReason::Despawned),
            Packet::Connect { .. }
            | Packet::Request { .. }
            | Packet::Heartbeat
            | Packet::Disconnect => {
                warn!("Ignoring client-bound copy of a server-bound packet");
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: EntitySnapshot) {
        match self.entities.get_mut(&snapshot.id) {
            Some(entity) => entity.apply_snapshot(snapshot),
            None => {
                debug!("Entity {} ({}) replicated", snapshot.id, snapshot.name);
                self.entities
                    .insert(snapshot.id, ClientEntity::from_snapshot(snapshot));
            }
        }
    }

    fn apply_local_snapshot(&mut self, snapshot: LocalPlayerSnapshot) {
        let id = snapshot.entity.id;
        if self.local_entity.is_some_and(|local| local != id) {
            warn!("Local snapshot for entity {} while controlling another", id);
        }
        self.local_entity = Some(id);
        self.apply_snapshot(snapshot.entity);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.stats = snapshot.stats.into_iter().collect();
        }

        self.personal.stat_costs = snapshot.stat_costs.into_iter().collect();
        self.personal.status_points = snapshot.status_points;
        self.personal.skill_points = snapshot.skill_points;
        self.personal.base_exp = snapshot.base_exp;
        self.personal.base_exp_next = snapshot.base_exp_next;
        self.personal.job_exp = snapshot.job_exp;
        self.personal.job_exp_next = snapshot.job_exp_next;
        self.personal.job_level = snapshot.job_level;
    }

    /// Entity the server still replicates; anything else is logged and
    /// skipped.
    fn tracked_mut(&mut self, id: EntityId, what: &str) -> Option<&mut ClientEntity> {
        match self.entities.get_mut(&id) {
            Some(entity) if entity.removed.is_none() => Some(entity),
            _ => {
                debug!("Dropping {} for untracked entity {}", what, id);
                None
            }
        }
    }

    /// Ground targets always resolve; entity targets only while the entity
    /// is known here, mirrored or not.
    fn resolve_target(&self, target: SkillTarget) -> Option<SkillTarget> {
        match target {
            SkillTarget::Entity(id) if !self.entities.contains_key(&id) => {
                debug!("Skill target {} is not visible here", id);
                None
            }
            target => Some(target),
        }
    }

    fn start_local_cooldown(&mut self, skill: SkillId) {
        match skill_db::lookup(skill) {
            Ok(definition) => self.cooldowns.start(skill, definition.reuse_cooldown),
            Err(e) => warn!("{}", e),
        }
    }

    fn mark_removed(&mut self, id: EntityId, reason: RemovalReason) {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                debug!("Entity {} removed by server ({:?})", id, reason);
                entity.removed = Some(reason);
                if reason == RemovalReason::Died {
                    entity.hp = 0;
                    entity.path = Path::empty();
                    entity.executions.clear();
                }
            }
            None => debug!("Removal of unknown entity {}", id),
        }
        if Some(id) == self.local_entity && reason != RemovalReason::OutOfSight {
            info!("Local player removed ({:?})", reason);
        }
    }

    /// Advances the mirror by `dt` seconds.
    pub fn tick(&mut self, dt: f32, sink: &mut dyn MirrorSink) {
        self.tick += 1;

        for entity in self.entities.values_mut() {
            entity.advance_path(dt);
        }

        if let Some(origin) = self.local_player().map(|player| player.position) {
            let observed: Vec<Observed> = self
                .entities
                .values()
                .map(|entity| Observed {
                    id: entity.id,
                    position: entity.position,
                    path_finished: entity.path.has_finished(),
                    tracked: entity.removed.is_none(),
                })
                .collect();
            self.visibility.update(origin, &observed, &self.sight, sink);
        }

        // Server-removed entities live on only as long as their mirror does.
        let visibility = &self.visibility;
        self.entities
            .retain(|id, entity| entity.removed.is_none() || visibility.has_mirror(*id));

        for entity in self.entities.values_mut() {
            if !entity.kind.is_battle_capable() {
                continue;
            }
            for event in entity.executions.advance(dt) {
                if let ExecutionEvent::Abandoned(handle) = event {
                    debug!(
                        "Cast {:?} of entity {} never confirmed, dropped",
                        handle, entity.id
                    );
                }
            }
        }

        self.cooldowns.advance(dt);
    }

    /// Executions of the local player, for logging.
    pub fn local_executions(&self) -> Vec<&SkillExecution> {
        self.local_player()
            .map(|player| player.executions.iter().collect())
            .unwrap_or_default()
    }

    pub fn reset(&mut self, sink: &mut dyn MirrorSink) {
        self.visibility.clear(sink);
        self.entities.clear();
        self.cooldowns = CooldownSet::new();
        self.personal = PersonalData::default();
        self.local_entity = None;
        self.client_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visibility::LogSink;
    use assert_approx_eq::assert_approx_eq;

    const LOCAL: EntityId = 1;

    fn snapshot(id: EntityId, kind: EntityKind, x: i32, path: Vec<Coordinate>) -> EntitySnapshot {
        EntitySnapshot {
            id,
            kind,
            class_id: 1002,
            name: format!("entity-{}", id),
            map: "prt_fild08".to_string(),
            position: Coordinate::new(x, 0),
            direction: Direction::South,
            path,
            move_speed: 0.2,
            level: 1,
            hp: 40,
            max_hp: 50,
            sp: 10,
            max_sp: 10,
        }
    }

    fn local_snapshot() -> LocalPlayerSnapshot {
        LocalPlayerSnapshot {
            entity: snapshot(LOCAL, EntityKind::Player, 0, Vec::new()),
            stats: vec![(StatType::Vit, StatValue::Int(5))],
            stat_costs: vec![(StatType::Vit, 2)],
            status_points: 48,
            skill_points: 0,
            base_exp: 0,
            base_exp_next: 30,
            job_exp: 0,
            job_exp_next: 30,
            job_level: 1,
        }
    }

    fn walk(from: i32, to: i32) -> Vec<Coordinate> {
        (from..=to).map(|x| Coordinate::new(x, 0)).collect()
    }

    fn logged_in() -> ClientGameState {
        let mut game = ClientGameState::new(5);
        game.apply_packet(Packet::Connected {
            client_id: 1,
            entity_id: LOCAL,
        });
        game.apply_packet(Packet::LocalPlayerSnapshot(local_snapshot()));
        game
    }

    #[test]
    fn test_local_snapshot_fills_personal_data() {
        let game = logged_in();

        assert_eq!(game.client_id, Some(1));
        assert_eq!(game.personal.status_points, 48);
        assert_eq!(game.personal.stat_costs.get(&StatType::Vit), Some(&2));
        let player = game.local_player().unwrap();
        assert_eq!(player.stat(StatType::Vit), Some(StatValue::Int(5)));
    }

    #[test]
    fn test_updates_overwrite_mirrored_data() {
        let mut game = logged_in();
        game.apply_packet(Packet::HpUpdate {
            id: LOCAL,
            hp: 12,
            max_hp: 60,
        });
        game.apply_packet(Packet::StatUpdate {
            id: LOCAL,
            stat: StatType::Vit,
            value: StatValue::Int(6),
        });
        game.apply_packet(Packet::StatCostUpdate {
            stat: StatType::Vit,
            cost: 3,
        });
        game.apply_packet(Packet::RemainingPoints {
            status_points: 46,
            skill_points: 1,
        });
        game.apply_packet(Packet::JobLevelUp { id: LOCAL, level: 2 });

        let player = game.local_player().unwrap();
        assert_eq!((player.hp, player.max_hp), (12, 60));
        assert_eq!(player.stat(StatType::Vit), Some(StatValue::Int(6)));
        assert_eq!(game.personal.stat_costs.get(&StatType::Vit), Some(&3));
        assert_eq!(game.personal.status_points, 46);
        assert_eq!(game.personal.job_level, 2);
    }

    #[test]
    fn test_updates_for_unknown_entities_are_ignored() {
        let mut game = logged_in();
        game.apply_packet(Packet::HpUpdate {
            id: 99,
            hp: 1,
            max_hp: 1,
        });
        game.apply_packet(Packet::EntityRemoved {
            id: 99,
            reason: RemovalReason::OutOfSight,
        });
        assert!(game.entity(99).is_none());
    }

    #[test]
    fn test_path_update_moves_entity() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            2,
            Vec::new(),
        )));
        game.apply_packet(Packet::PathUpdate {
            id: 2,
            position: Coordinate::new(2, 0),
            path: walk(2, 4),
            move_speed: 0.2,
        });

        game.tick(0.25, &mut sink);
        assert_eq!(game.entity(2).unwrap().position, Coordinate::new(3, 0));
        assert_eq!(game.entity(2).unwrap().direction, Direction::East);
        game.tick(0.25, &mut sink);
        assert_eq!(game.entity(2).unwrap().position, Coordinate::new(4, 0));
        assert!(game.entity(2).unwrap().path.has_finished());
    }

    #[test]
    fn test_cast_progress_merges_into_one_entry() {
        let mut game = logged_in();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Player,
            1,
            Vec::new(),
        )));
        for remaining in [1.2, 0.8] {
            game.apply_packet(Packet::SkillCastProgress {
                user: 2,
                skill: SkillId::FIRE_BOLT,
                level: 3,
                target: SkillTarget::Entity(LOCAL),
                remaining,
                max: 2.1,
            });
        }

        let caster = game.entity(2).unwrap();
        assert_eq!(caster.executions.len(), 1);
        let execution = caster.executions.iter().next().unwrap();
        assert!(execution.is_casting());
        assert_approx_eq!(execution.cast.remaining(), 0.8);
        assert_eq!(execution.target, Some(SkillTarget::Entity(LOCAL)));
    }

    #[test]
    fn test_cast_bar_advances_locally() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            1,
            Vec::new(),
        )));
        game.apply_packet(Packet::SkillCastProgress {
            user: 2,
            skill: SkillId::FIRE_BOLT,
            level: 1,
            target: SkillTarget::Entity(LOCAL),
            remaining: 1.0,
            max: 1.0,
        });
        game.tick(0.0, &mut sink);
        assert_approx_eq!(game.cast_bar(2).unwrap(), 0.0);

        game.tick(0.5, &mut sink);
        assert_approx_eq!(game.cast_bar(2).unwrap(), 0.5);
    }

    #[test]
    fn test_cast_finished_locally_waits_for_confirmation() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            1,
            Vec::new(),
        )));
        game.apply_packet(Packet::SkillCastProgress {
            user: 2,
            skill: SkillId::FIRE_BOLT,
            level: 1,
            target: SkillTarget::Entity(LOCAL),
            remaining: 0.2,
            max: 0.7,
        });
        game.tick(0.0, &mut sink);
        game.tick(0.5, &mut sink);
        assert_eq!(game.entity(2).unwrap().executions.len(), 1);
        assert!(game.cast_bar(2).is_none());

        game.apply_packet(Packet::SkillExecuted {
            user: 2,
            skill: SkillId::FIRE_BOLT,
            level: 1,
            target: SkillTarget::Entity(LOCAL),
            animation: 1.0,
            amount: 20,
        });
        assert_eq!(game.entity(2).unwrap().executions.len(), 1);
        game.tick(1.1, &mut sink);
        assert!(game.entity(2).unwrap().executions.is_empty());
    }

    #[test]
    fn test_executed_without_visible_cast_or_target() {
        let mut game = logged_in();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Player,
            1,
            Vec::new(),
        )));
        game.apply_packet(Packet::SkillExecuted {
            user: 2,
            skill: SkillId::BASH,
            level: 1,
            target: SkillTarget::Entity(77),
            animation: 0.6,
            amount: 14,
        });

        let execution = game.entity(2).unwrap().executions.iter().next().cloned().unwrap();
        assert!(execution.has_execution_started);
        assert_eq!(execution.target, None);
    }

    #[test]
    fn test_local_skill_starts_reuse_cooldown() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::SkillQueued {
            skill: SkillId::HEAL,
            level: 1,
        });
        game.apply_packet(Packet::SkillExecuted {
            user: LOCAL,
            skill: SkillId::HEAL,
            level: 1,
            target: SkillTarget::Entity(LOCAL),
            animation: 1.0,
            amount: 30,
        });
        assert!(game.is_cooling_down(SkillId::HEAL));
        assert!(game.personal.queued_skill.is_none());
        assert!(!game.can_request_skill(SkillId::HEAL));

        game.tick(1.1, &mut sink);
        assert!(!game.is_cooling_down(SkillId::HEAL));
        assert!(game.can_request_skill(SkillId::HEAL));
    }

    #[test]
    fn test_removed_walker_is_kept_until_path_ends() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            3,
            walk(3, 5),
        )));
        game.tick(0.0, &mut sink);
        assert!(game.has_mirror(2));

        game.apply_packet(Packet::EntityRemoved {
            id: 2,
            reason: RemovalReason::OutOfSight,
        });
        game.tick(0.1, &mut sink);
        assert!(game.has_mirror(2));
        assert!(game.is_awaiting_removal(2));

        game.tick(0.5, &mut sink);
        assert!(!game.has_mirror(2));
        assert!(game.entity(2).is_none());
        assert_eq!(sink.despawned, 1);
    }

    #[test]
    fn test_snapshot_after_removal_keeps_mirror() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            3,
            walk(3, 5),
        )));
        game.tick(0.0, &mut sink);
        game.apply_packet(Packet::EntityRemoved {
            id: 2,
            reason: RemovalReason::OutOfSight,
        });
        game.tick(0.1, &mut sink);

        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            4,
            walk(4, 5),
        )));
        game.tick(1.0, &mut sink);
        assert!(game.has_mirror(2));
        assert!(!game.is_awaiting_removal(2));
        assert_eq!(sink.despawned, 0);
    }

    #[test]
    fn test_pickup_removal_despawns_finished_pickup() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            3,
            EntityKind::Pickup,
            1,
            Vec::new(),
        )));
        game.tick(0.0, &mut sink);
        game.apply_packet(Packet::PickupRemoved { id: 3 });
        game.tick(0.0, &mut sink);

        assert!(game.entity(3).is_none());
        assert!(!game.has_mirror(3));
    }

    #[test]
    fn test_removal_outside_view_range_forgets_entity() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        for id in 10..20 {
            game.apply_packet(Packet::EntitySnapshot(snapshot(
                id,
                EntityKind::Monster,
                7,
                Vec::new(),
            )));
        }
        game.tick(0.0, &mut sink);
        assert!(!game.has_mirror(10));
        assert!(game.entity(10).is_some());

        for id in 10..20 {
            game.apply_packet(Packet::EntityRemoved {
                id,
                reason: RemovalReason::Died,
            });
        }
        game.tick(0.5, &mut sink);

        assert!((10..20).all(|id| game.entity(id).is_none()));
        assert_eq!(game.entities().count(), 1);
        assert_eq!(sink.despawned, 0);
    }

    #[test]
    fn test_executions_run_outside_view_range() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.apply_packet(Packet::EntitySnapshot(snapshot(
            2,
            EntityKind::Monster,
            7,
            Vec::new(),
        )));
        for _ in 0..5 {
            game.apply_packet(Packet::SkillExecuted {
                user: 2,
                skill: SkillId::BASH,
                level: 1,
                target: SkillTarget::Entity(LOCAL),
                animation: 0.6,
                amount: 9,
            });
            for _ in 0..4 {
                game.tick(0.5, &mut sink);
            }
        }

        assert!(!game.has_mirror(2));
        assert!(game.entity(2).unwrap().executions.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut game = logged_in();
        let mut sink = LogSink::default();
        game.tick(0.0, &mut sink);
        assert!(game.has_mirror(LOCAL));

        game.reset(&mut sink);
        assert!(game.local_player().is_none());
        assert!(game.mirrors().is_empty());
    }
}
