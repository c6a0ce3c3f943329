//! Request sequencing and the headless request bot

use crate::game::ClientGameState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::skill_db;
use shared::stats::StatType;
use shared::{Coordinate, EntityKind, PlayerInput, PlayerRequest, SkillId, SkillTarget};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Stamps outgoing requests with a sequence number and a timestamp.
pub struct InputManager {
    next_sequence: u32,
}

impl InputManager {
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }

    pub fn next_input(&mut self, request: PlayerRequest) -> PlayerInput {
        let input = PlayerInput {
            sequence: self.next_sequence,
            timestamp: Self::get_timestamp(),
            request,
        };
        self.next_sequence += 1;
        input
    }

    /// Sequence the next request will carry.
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    fn get_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Cells the bot wanders per move request.
const WANDER_RADIUS: i32 = 6;

/// Seeded stand-in for a player at the keyboard.
///
/// Picks up nearby loot first, then spends status points, then attacks the
/// closest visible monster, and otherwise wanders.
pub struct Bot {
    rng: StdRng,
}

impl Bot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn decide(&mut self, game: &ClientGameState) -> Option<PlayerRequest> {
        let player = game.local_player()?;
        if !player.is_alive() || player.executions.is_busy() {
            return None;
        }

        let nearest = |kind: EntityKind| {
            game.entities()
                .filter(|entity| entity.kind == kind && entity.removed.is_none())
                .filter(|entity| entity.is_alive() && game.has_mirror(entity.id))
                .min_by_key(|entity| (entity.position.distance(&player.position), entity.id))
        };

        if let Some(pickup) = nearest(EntityKind::Pickup) {
            if pickup.position.distance(&player.position) <= 2 {
                return Some(PlayerRequest::PickUp { pickup: pickup.id });
            }
        }

        if let Some(stat) = self.affordable_stat(game) {
            return Some(PlayerRequest::RaiseStat { stat });
        }

        if let Some(monster) = nearest(EntityKind::Monster) {
            if let Some(request) = self.attack(game, monster.id, monster.position, player.position) {
                return Some(request);
            }
            if self.rng.gen_bool(0.7) {
                return Some(PlayerRequest::Move {
                    target: monster.position,
                });
            }
        }

        let target = Coordinate::new(
            player.position.x + self.rng.gen_range(-WANDER_RADIUS..=WANDER_RADIUS),
            player.position.y + self.rng.gen_range(-WANDER_RADIUS..=WANDER_RADIUS),
        );
        Some(PlayerRequest::Move { target })
    }

    fn affordable_stat(&mut self, game: &ClientGameState) -> Option<StatType> {
        let stat = StatType::RAISABLE[self.rng.gen_range(0..StatType::RAISABLE.len())];
        let cost = *game.personal.stat_costs.get(&stat)?;
        (cost <= game.personal.status_points).then_some(stat)
    }

    fn attack(
        &mut self,
        game: &ClientGameState,
        monster: shared::EntityId,
        at: Coordinate,
        from: Coordinate,
    ) -> Option<PlayerRequest> {
        let skill = if self.rng.gen_bool(0.5) {
            SkillId::BASH
        } else {
            SkillId::FIRE_BOLT
        };
        let definition = skill_db::lookup(skill).ok()?;
        let sp = game.local_player()?.sp;
        if !game.can_request_skill(skill)
            || from.distance(&at) > definition.range
            || sp < definition.sp_cost(1)
        {
            return None;
        }
        Some(PlayerRequest::UseSkill {
            skill,
            level: 1,
            target: SkillTarget::Entity(monster),
        })
    }
}
