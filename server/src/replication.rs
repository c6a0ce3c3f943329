//! Per-connection replication queue
//!
//! Collects every mutation one connection should hear about during a tick and
//! turns them into a minimal packet set when the tick ends. Each category holds
//! at most one pending item per key; a second enqueue before the flush simply
//! overwrites the first.
//!
//! Precedence applied at flush time:
//! - a full snapshot of an entity drops that entity's pending path, stat, HP
//!   and SP updates;
//! - the local player's own snapshot drops every pending stat, stat-cost,
//!   remaining-points and experience update of the connection, plus the
//!   generic snapshot of the local entity;
//! - a pickup removal drops the pending snapshot of that pickup.
//!
//! Entity removal and re-appearance are ordered, so they are resolved when
//! enqueued instead: a removal cancels every pending state update for the
//! entity and a later snapshot cancels the removal. One-shot skill events stay
//! queued ahead of the removal.
//!
//! The queue never carries anything across a flush. Whatever was superseded
//! before the flush is gone, because the next authoritative state already
//! covers it.

use log::trace;
use shared::{
    Coordinate, EntityId, EntitySnapshot, LocalPlayerSnapshot, Packet, RemovalReason, SkillId,
    SkillTarget, StatType, StatValue,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
struct PathState {
    position: Coordinate,
    path: Vec<Coordinate>,
    move_speed: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CastState {
    level: u8,
    target: SkillTarget,
    remaining: f32,
    max: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpState {
    pub base_exp: u32,
    pub base_exp_next: u32,
    pub job_exp: u32,
    pub job_exp_next: u32,
}

#[derive(Debug, Default)]
pub struct ReplicationQueue {
    local_entity: Option<EntityId>,
    local_snapshot: Option<LocalPlayerSnapshot>,
    snapshots: BTreeMap<EntityId, EntitySnapshot>,
    paths: BTreeMap<EntityId, PathState>,
    stats: BTreeMap<(EntityId, StatType), StatValue>,
    stat_costs: BTreeMap<StatType, i32>,
    remaining_points: Option<(i32, i32)>,
    hp: BTreeMap<EntityId, (i32, i32)>,
    sp: BTreeMap<EntityId, (i32, i32)>,
    exp: Option<ExpState>,
    base_level_ups: BTreeMap<EntityId, i32>,
    job_level_ups: BTreeMap<EntityId, i32>,
    cast_progress: BTreeMap<(EntityId, SkillId), CastState>,
    /// One-shot skill events, kept in the order they happened.
    skill_events: Vec<Packet>,
    removals: BTreeMap<EntityId, RemovalReason>,
    pickup_removals: BTreeSet<EntityId>,
}

impl ReplicationQueue {
    pub fn new(local_entity: Option<EntityId>) -> Self {
        Self {
            local_entity,
            ..Self::default()
        }
    }

    pub fn local_entity(&self) -> Option<EntityId> {
        self.local_entity
    }

    pub fn set_local_entity(&mut self, entity: Option<EntityId>) {
        self.local_entity = entity;
    }

    pub fn enqueue_snapshot(&mut self, snapshot: EntitySnapshot) {
        self.removals.remove(&snapshot.id);
        self.snapshots.insert(snapshot.id, snapshot);
    }

    /// Ignored unless the snapshot belongs to this connection's own entity.
    pub fn enqueue_local_snapshot(&mut self, snapshot: LocalPlayerSnapshot) {
        if self.local_entity != Some(snapshot.entity.id) {
            log::error!(
                "Local snapshot for {} queued on connection owning {:?}",
                snapshot.entity.id,
                self.local_entity
            );
            return;
        }
        self.removals.remove(&snapshot.entity.id);
        self.local_snapshot = Some(snapshot);
    }

    pub fn enqueue_path(
        &mut self,
        id: EntityId,
        position: Coordinate,
        path: Vec<Coordinate>,
        move_speed: f32,
    ) {
        self.paths.insert(
            id,
            PathState {
                position,
                path,
                move_speed,
            },
        );
    }

    pub fn enqueue_stat(&mut self, id: EntityId, stat: StatType, value: StatValue) {
        self.stats.insert((id, stat), value);
    }

    pub fn enqueue_stat_cost(&mut self, stat: StatType, cost: i32) {
        self.stat_costs.insert(stat, cost);
    }

    pub fn enqueue_remaining_points(&mut self, status_points: i32, skill_points: i32) {
        self.remaining_points = Some((status_points, skill_points));
    }

    pub fn enqueue_hp(&mut self, id: EntityId, hp: i32, max_hp: i32) {
        self.hp.insert(id, (hp, max_hp));
    }

    pub fn enqueue_sp(&mut self, id: EntityId, sp: i32, max_sp: i32) {
        self.sp.insert(id, (sp, max_sp));
    }

    pub fn enqueue_exp(&mut self, exp: ExpState) {
        self.exp = Some(exp);
    }

    pub fn enqueue_base_level_up(&mut self, id: EntityId, level: i32) {
        self.base_level_ups.insert(id, level);
    }

    pub fn enqueue_job_level_up(&mut self, id: EntityId, level: i32) {
        self.job_level_ups.insert(id, level);
    }

    pub fn enqueue_cast_progress(
        &mut self,
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
        remaining: f32,
        max: f32,
    ) {
        self.cast_progress.insert(
            (user, skill),
            CastState {
                level,
                target,
                remaining,
                max,
            },
        );
    }

    pub fn enqueue_skill_executed(
        &mut self,
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
        animation: f32,
        amount: i32,
    ) {
        // The cast is over; a stale progress update would restart it.
        self.cast_progress.remove(&(user, skill));
        self.skill_events.push(Packet::SkillExecuted {
            user,
            skill,
            level,
            target,
            animation,
            amount,
        });
    }

    pub fn enqueue_skill_queued(&mut self, skill: SkillId, level: u8) {
        self.skill_events.push(Packet::SkillQueued { skill, level });
    }

    pub fn enqueue_removal(&mut self, id: EntityId, reason: RemovalReason) {
        self.snapshots.remove(&id);
        self.paths.remove(&id);
        self.stats.retain(|(entity, _), _| *entity != id);
        self.hp.remove(&id);
        self.sp.remove(&id);
        self.base_level_ups.remove(&id);
        self.job_level_ups.remove(&id);
        self.cast_progress.retain(|(user, _), _| *user != id);
        self.removals.insert(id, reason);
    }

    pub fn enqueue_pickup_removed(&mut self, id: EntityId) {
        self.removals.remove(&id);
        self.pickup_removals.insert(id);
    }

    pub fn has_snapshot(&self, id: EntityId) -> bool {
        self.snapshots.contains_key(&id)
            || self
                .local_snapshot
                .as_ref()
                .is_some_and(|s| s.entity.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.local_snapshot.is_none()
            && self.snapshots.is_empty()
            && self.paths.is_empty()
            && self.stats.is_empty()
            && self.stat_costs.is_empty()
            && self.remaining_points.is_none()
            && self.hp.is_empty()
            && self.sp.is_empty()
            && self.exp.is_none()
            && self.base_level_ups.is_empty()
            && self.job_level_ups.is_empty()
            && self.cast_progress.is_empty()
            && self.skill_events.is_empty()
            && self.removals.is_empty()
            && self.pickup_removals.is_empty()
    }

    /// Resolves precedence, emits one packet per surviving item and clears
    /// every category.
    pub fn flush(&mut self) -> Vec<Packet> {
        let mut queue = std::mem::replace(self, Self::new(self.local_entity));
        queue.apply_precedence();

        let mut packets = Vec::new();

        if let Some(snapshot) = queue.local_snapshot {
            packets.push(Packet::LocalPlayerSnapshot(snapshot));
        }
        packets.extend(queue.snapshots.into_values().map(Packet::EntitySnapshot));
        packets.extend(queue.paths.into_iter().map(|(id, state)| Packet::PathUpdate {
            id,
            position: state.position,
            path: state.path,
            move_speed: state.move_speed,
        }));
        packets.extend(
            queue
                .stats
                .into_iter()
                .map(|((id, stat), value)| Packet::StatUpdate { id, stat, value }),
        );
        packets.extend(
            queue
                .stat_costs
                .into_iter()
                .map(|(stat, cost)| Packet::StatCostUpdate { stat, cost }),
        );
        if let Some((status_points, skill_points)) = queue.remaining_points {
            packets.push(Packet::RemainingPoints {
                status_points,
                skill_points,
            });
        }
        packets.extend(
            queue
                .hp
                .into_iter()
                .map(|(id, (hp, max_hp))| Packet::HpUpdate { id, hp, max_hp }),
        );
        packets.extend(
            queue
                .sp
                .into_iter()
                .map(|(id, (sp, max_sp))| Packet::SpUpdate { id, sp, max_sp }),
        );
        if let Some(exp) = queue.exp {
            packets.push(Packet::ExpUpdate {
                base_exp: exp.base_exp,
                base_exp_next: exp.base_exp_next,
                job_exp: exp.job_exp,
                job_exp_next: exp.job_exp_next,
            });
        }
        packets.extend(
            queue
                .base_level_ups
                .into_iter()
                .map(|(id, level)| Packet::BaseLevelUp { id, level }),
        );
        packets.extend(
            queue
                .job_level_ups
                .into_iter()
                .map(|(id, level)| Packet::JobLevelUp { id, level }),
        );
        packets.extend(queue.cast_progress.into_iter().map(|((user, skill), cast)| {
            Packet::SkillCastProgress {
                user,
                skill,
                level: cast.level,
                target: cast.target,
                remaining: cast.remaining,
                max: cast.max,
            }
        }));
        packets.extend(queue.skill_events);
        packets.extend(
            queue
                .removals
                .into_iter()
                .map(|(id, reason)| Packet::EntityRemoved { id, reason }),
        );
        packets.extend(
            queue
                .pickup_removals
                .into_iter()
                .map(|id| Packet::PickupRemoved { id }),
        );

        if !packets.is_empty() {
            trace!("Flushed {} packets", packets.len());
        }
        packets
    }

    fn apply_precedence(&mut self) {
        for id in self.snapshots.keys() {
            self.paths.remove(id);
            self.hp.remove(id);
            self.sp.remove(id);
            self.stats.retain(|(entity, _), _| entity != id);
        }

        if let Some(local) = &self.local_snapshot {
            let id = local.entity.id;
            self.snapshots.remove(&id);
            self.paths.remove(&id);
            self.hp.remove(&id);
            self.sp.remove(&id);
            self.stats.clear();
            self.stat_costs.clear();
            self.remaining_points = None;
            self.exp = None;
        }

        for id in &self.pickup_removals {
            self.snapshots.remove(id);
        }
    }
}
