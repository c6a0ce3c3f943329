//! Authoritative world state
//!
//! Owns every entity on the map, one [`Observer`] per logged-in connection and
//! the grid the entities stand on. All mutation happens inside public
//! operations or [`World::tick`]; each mutation is pushed into the replication
//! queues of the observers that can see the entity, and [`World::flush`] turns
//! those queues into packets once per tick.
//!
//! Combat, experience and monster behaviour live in `combat.rs` as a second
//! `impl World` block.

use crate::character::{
    base_exp_to_next, job_exp_to_next, Character, Progression,
};
use crate::config::WorldConfig;
use crate::monster::{self, MonsterBrain};
use crate::persistence::{CharacterRecord, Persistence};
use crate::replication::ReplicationQueue;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::grid::{Grid, MapGrid, PathResult};
use shared::stat_graph::{StatChange, StatGraph};
use shared::stats::{
    status_point_cost, Condition, ConditionalStat, Element, Race, StatType,
};
use shared::{
    Coordinate, Direction, EntityId, EntityKind, EntitySnapshot, LocalPlayerSnapshot, Packet,
    Path, RemovalReason, WorldError, DEFAULT_MOVE_SPEED,
};
use std::collections::{BTreeMap, BTreeSet};

pub type ClientId = u32;

/// Status points a fresh character starts with.
pub const STARTING_STATUS_POINTS: i32 = 48;
/// Flat attack of the starting weapon.
pub const STARTING_WEAPON_ATK: f64 = 15.0;
/// Cells a player may reach to pick something up.
pub const PICKUP_RANGE: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum EntityRole {
    Player { client_id: ClientId },
    Monster(MonsterBrain),
    Pickup { item_id: u16 },
}

#[derive(Debug, Clone)]
pub struct ServerEntity {
    pub id: EntityId,
    pub name: String,
    pub position: Coordinate,
    pub direction: Direction,
    pub path: Path,
    /// `None` for entities that never fight.
    pub character: Option<Character>,
    pub role: EntityRole,
}

impl ServerEntity {
    pub fn kind(&self) -> EntityKind {
        match self.role {
            EntityRole::Player { .. } => EntityKind::Player,
            EntityRole::Monster(_) => EntityKind::Monster,
            EntityRole::Pickup { .. } => EntityKind::Pickup,
        }
    }

    /// Connection controlling the entity.
    pub fn owner(&self) -> Option<ClientId> {
        match self.role {
            EntityRole::Player { client_id } => Some(client_id),
            _ => None,
        }
    }

    pub fn class_id(&self) -> u16 {
        match &self.role {
            EntityRole::Player { .. } => 0,
            EntityRole::Monster(brain) => brain.class_id,
            EntityRole::Pickup { item_id } => *item_id,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.character.as_ref().is_some_and(|c| !c.is_dead())
    }

    pub fn move_speed(&self) -> f32 {
        self.character
            .as_ref()
            .map(Character::move_speed)
            .unwrap_or_default()
    }

    pub fn snapshot(&self, map: &str) -> EntitySnapshot {
        let character = self.character.as_ref();
        EntitySnapshot {
            id: self.id,
            kind: self.kind(),
            class_id: self.class_id(),
            name: self.name.clone(),
            map: map.to_string(),
            position: self.position,
            direction: self.direction,
            path: if self.path.has_finished() {
                Vec::new()
            } else {
                self.path.remaining().to_vec()
            },
            move_speed: self.move_speed(),
            level: character.map(Character::level).unwrap_or_default(),
            hp: character.map(Character::hp).unwrap_or_default(),
            max_hp: character.map(Character::max_hp).unwrap_or_default(),
            sp: character.map(Character::sp).unwrap_or_default(),
            max_sp: character.map(Character::max_sp).unwrap_or_default(),
        }
    }

    /// Only players carry the personal data this needs.
    pub fn local_snapshot(&self, map: &str) -> Option<LocalPlayerSnapshot> {
        let character = self.character.as_ref()?;
        let progression = character.progression.as_ref()?;
        let stats = character.stats();
        Some(LocalPlayerSnapshot {
            entity: self.snapshot(map),
            stats: stats.stats().all(),
            stat_costs: StatType::RAISABLE
                .iter()
                .map(|stat| (*stat, status_point_cost(stats.int(*stat))))
                .collect(),
            status_points: progression.status_points,
            skill_points: progression.skill_points,
            base_exp: progression.base_exp,
            base_exp_next: base_exp_to_next(character.level()),
            job_exp: progression.job_exp,
            job_exp_next: job_exp_to_next(character.job_level()),
            job_level: character.job_level(),
        })
    }

    pub fn record(&self, map: &str) -> Option<CharacterRecord> {
        let character = self.character.as_ref()?;
        let progression = character.progression.as_ref()?;
        Some(CharacterRecord {
            name: self.name.clone(),
            map: map.to_string(),
            position: self.position,
            base_level: character.level(),
            job_level: character.job_level(),
            attributes: StatType::RAISABLE
                .iter()
                .map(|stat| (*stat, character.stats().stats().base(*stat) as i32))
                .collect(),
            hp: character.hp(),
            sp: character.sp(),
            base_exp: progression.base_exp,
            job_exp: progression.job_exp,
            status_points: progression.status_points,
            skill_points: progression.skill_points,
        })
    }
}

/// A logged-in connection and what it currently knows about.
#[derive(Debug)]
pub struct Observer {
    pub client_id: ClientId,
    pub entity: EntityId,
    pub queue: ReplicationQueue,
    /// Other entities this connection has a snapshot of.
    pub in_view: BTreeSet<EntityId>,
}

impl Observer {
    fn new(client_id: ClientId, entity: EntityId) -> Self {
        Self {
            client_id,
            entity,
            queue: ReplicationQueue::new(Some(entity)),
            in_view: BTreeSet::new(),
        }
    }

    pub fn sees(&self, id: EntityId) -> bool {
        self.entity == id || self.in_view.contains(&id)
    }
}

/// Runs `enqueue` on the queue of every observer that can see `about`.
pub(crate) fn notify(
    observers: &mut BTreeMap<ClientId, Observer>,
    about: EntityId,
    mut enqueue: impl FnMut(&mut ReplicationQueue),
) {
    for observer in observers.values_mut().filter(|o| o.sees(about)) {
        enqueue(&mut observer.queue);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRespawn {
    pub class_id: u16,
    pub spawn: Coordinate,
    pub remaining: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRevive {
    pub entity: EntityId,
    pub remaining: f32,
}

pub struct World {
    pub(crate) config: WorldConfig,
    tick: u64,
    pub(crate) grid: Box<dyn Grid + Send>,
    template: StatGraph,
    next_entity_id: EntityId,
    pub(crate) entities: BTreeMap<EntityId, ServerEntity>,
    pub(crate) observers: BTreeMap<ClientId, Observer>,
    pub(crate) respawns: Vec<PendingRespawn>,
    pub(crate) revivals: Vec<PendingRevive>,
    pub(crate) rng: StdRng,
}

impl World {
    pub fn new(config: WorldConfig) -> Result<Self, WorldError> {
        let grid = MapGrid::new(&config.map_name, config.map_width, config.map_height);
        Self::with_grid(config, Box::new(grid))
    }

    /// World on an externally provided grid. Populates it with
    /// `monster_count` monsters.
    pub fn with_grid(config: WorldConfig, grid: Box<dyn Grid + Send>) -> Result<Self, WorldError> {
        let template = StatGraph::standard()?;
        let rng = StdRng::seed_from_u64(config.seed);
        let mut world = Self {
            config,
            tick: 0,
            grid,
            template,
            next_entity_id: 1,
            entities: BTreeMap::new(),
            observers: BTreeMap::new(),
            respawns: Vec::new(),
            revivals: Vec::new(),
            rng,
        };
        world.populate();
        Ok(world)
    }

    fn populate(&mut self) {
        let classes = monster::classes();
        for i in 0..self.config.monster_count {
            let class = &classes[i % classes.len()];
            let position = self.random_position();
            if let Err(e) = self.spawn_monster(class.id, position) {
                error!("Failed to place {}: {}", class.name, e);
            }
        }
        info!(
            "Populated {} with {} monsters",
            self.grid.name(),
            self.config.monster_count
        );
    }

    fn random_position(&mut self) -> Coordinate {
        for _ in 0..16 {
            let candidate = Coordinate::new(
                self.rng.gen_range(0..self.config.map_width.max(1)),
                self.rng.gen_range(0..self.config.map_height.max(1)),
            );
            if self.grid.are_coordinates_valid(candidate) {
                return candidate;
            }
        }
        self.config.spawn_point
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn map_name(&self) -> &str {
        self.grid.name()
    }

    pub fn grid(&self) -> &dyn Grid {
        &*self.grid
    }

    pub fn entity(&self, id: EntityId) -> Option<&ServerEntity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut ServerEntity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &ServerEntity> {
        self.entities.values()
    }

    pub fn observer(&self, client_id: ClientId) -> Option<&Observer> {
        self.observers.get(&client_id)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Entity controlled by `client_id`.
    pub fn player_entity(&self, client_id: ClientId) -> Result<EntityId, WorldError> {
        self.observers
            .get(&client_id)
            .map(|o| o.entity)
            .ok_or(WorldError::UnknownConnection(client_id))
    }

    fn allocate_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub(crate) fn insert_entity(&mut self, entity: ServerEntity) -> EntityId {
        let id = entity.id;
        self.grid.move_occupant(id, None, Some(entity.position));
        self.entities.insert(id, entity);
        id
    }

    fn new_player_character(&self) -> Character {
        let mut stats = self.template.clone();
        stats.set_base(StatType::BaseLevel, 1.0);
        stats.set_base(StatType::JobLevel, 1.0);
        for stat in StatType::RAISABLE {
            stats.set_base(stat, 1.0);
        }
        stats.set_base(StatType::MoveSpeed, DEFAULT_MOVE_SPEED as f64);
        stats.add_bonus(StatType::Atk, STARTING_WEAPON_ATK);

        let mut character = Character::new(stats, Race::DemiHuman, Element::Neutral)
            .with_progression(Progression {
                status_points: STARTING_STATUS_POINTS,
                ..Progression::default()
            });
        character.conditional.add(ConditionalStat {
            stat: StatType::Atk,
            condition: Condition::TargetRace(Race::Plant),
            value: 5,
        });
        character
    }

    pub fn login(&mut self, client_id: ClientId, name: &str) -> Result<EntityId, WorldError> {
        if self.observers.contains_key(&client_id) {
            error!("Connection {} tried to log in twice", client_id);
            return Err(WorldError::DuplicateLogin(client_id));
        }

        let id = self.allocate_id();
        let entity = ServerEntity {
            id,
            name: name.to_string(),
            position: self.config.spawn_point,
            direction: Direction::default(),
            path: Path::empty(),
            character: Some(self.new_player_character()),
            role: EntityRole::Player { client_id },
        };
        self.insert_entity(entity);

        let mut observer = Observer::new(client_id, id);
        let map = self.grid.name().to_string();
        if let Some(snapshot) = self.entities.get(&id).and_then(|e| e.local_snapshot(&map)) {
            observer.queue.enqueue_local_snapshot(snapshot);
        }
        self.observers.insert(client_id, observer);
        self.refresh_views();

        info!("{} logged in as entity {} (connection {})", name, id, client_id);
        Ok(id)
    }

    pub fn logout(&mut self, client_id: ClientId) -> Result<(), WorldError> {
        let observer = self
            .observers
            .remove(&client_id)
            .ok_or(WorldError::UnknownConnection(client_id))?;
        self.revivals.retain(|r| r.entity != observer.entity);
        if let Some(entity) = self.despawn(observer.entity, RemovalReason::LoggedOut) {
            info!("{} logged out", entity.name);
        }
        Ok(())
    }

    /// Removes an entity and tells everyone who could see it.
    pub(crate) fn despawn(&mut self, id: EntityId, reason: RemovalReason) -> Option<ServerEntity> {
        let entity = self.entities.remove(&id)?;
        self.grid.move_occupant(id, Some(entity.position), None);
        for observer in self.observers.values_mut() {
            if observer.in_view.remove(&id) {
                observer.queue.enqueue_removal(id, reason);
            }
        }
        Some(entity)
    }

    pub fn spawn_monster(&mut self, class_id: u16, position: Coordinate) -> Result<EntityId, WorldError> {
        let class = monster::class(class_id).ok_or(WorldError::UnknownMonsterClass(class_id))?;
        if !self.grid.are_coordinates_valid(position) {
            return Err(WorldError::Grid(format!(
                "({}, {}) is outside {}",
                position.x,
                position.y,
                self.grid.name()
            )));
        }

        let id = self.allocate_id();
        let character = class.character(&self.template);
        self.insert_entity(ServerEntity {
            id,
            name: class.name.to_string(),
            position,
            direction: Direction::default(),
            path: Path::empty(),
            character: Some(character),
            role: EntityRole::Monster(MonsterBrain::new(class_id, position)),
        });
        debug!("Spawned {} {} at ({}, {})", class.name, id, position.x, position.y);
        Ok(id)
    }

    pub(crate) fn drop_pickup(&mut self, item_id: u16, position: Coordinate) -> EntityId {
        let id = self.allocate_id();
        self.insert_entity(ServerEntity {
            id,
            name: format!("item {}", item_id),
            position,
            direction: Direction::default(),
            path: Path::empty(),
            character: None,
            role: EntityRole::Pickup { item_id },
        })
    }

    pub fn request_move(&mut self, client_id: ClientId, target: Coordinate) -> Result<PathResult, WorldError> {
        let id = self.player_entity(client_id)?;
        self.move_entity(id, target)
    }

    pub(crate) fn move_entity(&mut self, id: EntityId, target: Coordinate) -> Result<PathResult, WorldError> {
        if !self.grid.are_coordinates_valid(target) {
            return Err(WorldError::Grid(format!(
                "({}, {}) is outside {}",
                target.x,
                target.y,
                self.grid.name()
            )));
        }

        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::UnknownEntity(id))?;
        match &entity.character {
            Some(character) if character.is_dead() => return Err(WorldError::Dead(id)),
            Some(character) if character.executions.is_casting() => {
                return Err(WorldError::Busy(id))
            }
            Some(_) => {}
            None => return Err(WorldError::NotBattleCapable(id)),
        }

        let from = entity.position;
        let result = self.grid.find_and_set_path(&mut entity.path, from, target);
        match result {
            PathResult::Found => {
                let cells = entity.path.cells().to_vec();
                let speed = entity.move_speed();
                notify(&mut self.observers, id, |queue| {
                    queue.enqueue_path(id, from, cells.clone(), speed)
                });
            }
            PathResult::AlreadyThere => {}
            PathResult::NoPath | PathResult::InvalidTarget => {
                debug!(
                    "No path for {} from ({}, {}) to ({}, {}): {:?}",
                    id, from.x, from.y, target.x, target.y, result
                );
            }
        }
        Ok(result)
    }

    /// Stops an entity on the cell it currently occupies.
    pub(crate) fn stop_entity(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if entity.path.has_finished() {
            return;
        }
        entity.path = Path::empty();
        let position = entity.position;
        let speed = entity.move_speed();
        notify(&mut self.observers, id, |queue| {
            queue.enqueue_path(id, position, vec![position], speed)
        });
    }

    /// Spends status points to raise a base attribute by one. Returns the new
    /// base value.
    pub fn raise_stat(&mut self, client_id: ClientId, stat: StatType) -> Result<i32, WorldError> {
        if !stat.is_raisable() {
            error!("Connection {} asked to raise {:?}", client_id, stat);
            return Err(WorldError::InvalidStatForUpdate(stat));
        }
        let id = self.player_entity(client_id)?;
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(WorldError::UnknownEntity(id))?;
        let character = entity
            .character
            .as_mut()
            .ok_or(WorldError::NotBattleCapable(id))?;

        let current = character.stats().stats().base(stat) as i32;
        let cost = status_point_cost(current);
        let available = character
            .progression
            .as_ref()
            .map(|p| p.status_points)
            .unwrap_or_default();
        if available < cost {
            return Err(WorldError::InsufficientStatusPoints {
                required: cost,
                available,
            });
        }

        let changes = character.set_base_stat(stat, (current + 1) as f64);
        let (status_points, skill_points) = match character.progression.as_mut() {
            Some(progression) => {
                progression.status_points -= cost;
                (progression.status_points, progression.skill_points)
            }
            None => (0, 0),
        };

        self.publish_stat_changes(id, &changes);
        if let Some(observer) = self.observers.get_mut(&client_id) {
            observer
                .queue
                .enqueue_stat_cost(stat, status_point_cost(current + 1));
            observer
                .queue
                .enqueue_remaining_points(status_points, skill_points);
        }
        debug!("{} raised {:?} to {}", id, stat, current + 1);
        Ok(current + 1)
    }

    /// Picks up a dropped item. Returns its item id.
    pub fn pick_up(&mut self, client_id: ClientId, pickup: EntityId) -> Result<u16, WorldError> {
        let id = self.player_entity(client_id)?;
        let player = self.entities.get(&id).ok_or(WorldError::UnknownEntity(id))?;
        if !player.is_alive() {
            return Err(WorldError::Dead(id));
        }
        let position = player.position;

        let target = self
            .entities
            .get(&pickup)
            .ok_or(WorldError::UnknownEntity(pickup))?;
        let EntityRole::Pickup { item_id } = target.role else {
            return Err(WorldError::NotAPickup(pickup));
        };
        let distance = position.distance(&target.position);
        if distance > PICKUP_RANGE {
            return Err(WorldError::OutOfReach {
                distance,
                range: PICKUP_RANGE,
            });
        }

        if let Some(item) = self.entities.remove(&pickup) {
            self.grid.move_occupant(pickup, Some(item.position), None);
        }
        for observer in self.observers.values_mut() {
            if observer.in_view.remove(&pickup) {
                observer.queue.enqueue_pickup_removed(pickup);
            }
        }
        info!("{} picked up item {} ({})", id, item_id, pickup);
        Ok(item_id)
    }

    /// Sends stat deltas to the owner and pool maxima to every observer.
    pub(crate) fn publish_stat_changes(&mut self, id: EntityId, changes: &[StatChange]) {
        if changes.is_empty() {
            return;
        }
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        if let Some(observer) = entity.owner().and_then(|c| self.observers.get_mut(&c)) {
            for change in changes {
                observer.queue.enqueue_stat(id, change.stat, change.value);
            }
        }
        if changes.iter().any(|c| c.stat == StatType::MaxHp) {
            self.publish_hp(id);
        }
        if changes.iter().any(|c| c.stat == StatType::MaxSp) {
            self.publish_sp(id);
        }
    }

    pub(crate) fn publish_hp(&mut self, id: EntityId) {
        let Some(character) = self.entities.get(&id).and_then(|e| e.character.as_ref()) else {
            return;
        };
        let (hp, max_hp) = (character.hp(), character.max_hp());
        notify(&mut self.observers, id, |queue| queue.enqueue_hp(id, hp, max_hp));
    }

    pub(crate) fn publish_sp(&mut self, id: EntityId) {
        let Some(character) = self.entities.get(&id).and_then(|e| e.character.as_ref()) else {
            return;
        };
        let (sp, max_sp) = (character.sp(), character.max_sp());
        notify(&mut self.observers, id, |queue| queue.enqueue_sp(id, sp, max_sp));
    }

    /// Advances the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f32) {
        self.tick += 1;
        self.advance_movement(dt);
        self.advance_skills(dt);
        self.issue_queued_skills();
        self.regenerate(dt);
        self.run_monster_ai(dt);
        self.advance_timers(dt);
        self.refresh_views();
    }

    fn advance_movement(&mut self, dt: f32) {
        for entity in self.entities.values_mut() {
            if entity.path.has_finished() || !entity.is_alive() {
                continue;
            }
            let speed = entity.move_speed();
            let entered = entity.path.advance(dt, speed);
            let Some(last) = entered.last().copied() else {
                continue;
            };
            if let Some(direction) = Direction::between(&entity.position, &last) {
                entity.direction = direction;
            }
            self.grid
                .move_occupant(entity.id, Some(entity.position), Some(last));
            entity.position = last;
        }
    }

    fn regenerate(&mut self, dt: f32) {
        let interval = self.config.regen_interval;
        let mut changed = Vec::new();
        for entity in self.entities.values_mut() {
            if let Some(character) = entity.character.as_mut() {
                let (hp, sp) = character.regenerate(dt, interval);
                if hp || sp {
                    changed.push((entity.id, hp, sp));
                }
            }
        }
        for (id, hp, sp) in changed {
            if hp {
                self.publish_hp(id);
            }
            if sp {
                self.publish_sp(id);
            }
        }
    }

    fn advance_timers(&mut self, dt: f32) {
        let mut due = Vec::new();
        self.respawns.retain_mut(|respawn| {
            respawn.remaining -= dt;
            if respawn.remaining <= 0.0 {
                due.push((respawn.class_id, respawn.spawn));
                false
            } else {
                true
            }
        });
        for (class_id, spawn) in due {
            if let Err(e) = self.spawn_monster(class_id, spawn) {
                warn!("Respawn of class {} failed: {}", class_id, e);
            }
        }

        let mut revived = Vec::new();
        self.revivals.retain_mut(|revive| {
            revive.remaining -= dt;
            if revive.remaining <= 0.0 {
                revived.push(revive.entity);
                false
            } else {
                true
            }
        });
        for id in revived {
            if let Some(character) = self.entities.get_mut(&id).and_then(|e| e.character.as_mut()) {
                let half = character.max_hp() / 2;
                character.set_hp(half.max(1));
                info!("{} revived", id);
                self.publish_hp(id);
            }
        }
    }

    /// Snapshots entities entering each observer's range and removes the
    /// ones that left it.
    pub(crate) fn refresh_views(&mut self) {
        let range = self.config.replication_range;
        let map = self.grid.name().to_string();
        for observer in self.observers.values_mut() {
            let Some(center) = self.entities.get(&observer.entity).map(|e| e.position) else {
                continue;
            };
            let visible: BTreeSet<EntityId> = self
                .grid
                .occupants_in_range(center, range)
                .into_iter()
                .filter(|id| *id != observer.entity)
                .collect();

            for id in visible.difference(&observer.in_view) {
                if let Some(entity) = self.entities.get(id) {
                    observer.queue.enqueue_snapshot(entity.snapshot(&map));
                }
            }
            for id in observer.in_view.difference(&visible) {
                observer.queue.enqueue_removal(*id, RemovalReason::OutOfSight);
            }
            observer.in_view = visible;
        }
    }

    /// Drains every observer's queue. Connections with nothing to hear are
    /// left out.
    pub fn flush(&mut self) -> Vec<(ClientId, Vec<Packet>)> {
        self.observers
            .values_mut()
            .filter_map(|observer| {
                let packets = observer.queue.flush();
                (!packets.is_empty()).then_some((observer.client_id, packets))
            })
            .collect()
    }

    /// Hands every player's record to `persistence`. Returns how many were
    /// written.
    pub fn persist_all(&self, persistence: &mut dyn Persistence) -> usize {
        let map = self.grid.name();
        let mut count = 0;
        for observer in self.observers.values() {
            if let Some(record) = self.entities.get(&observer.entity).and_then(|e| e.record(map)) {
                persistence.persist(&record);
                count += 1;
            }
        }
        count
    }
}
