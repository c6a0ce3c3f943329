//! Integration tests for the replication core
//!
//! These tests drive the shared state machines, the server world and the
//! client mirror together, including the datagram encoding in between.

use client::visibility::{LogSink, MirrorSink, Observed, RangeSight, VisibilityLifecycle};
use client::ClientGameState;
use server::{ReplicationQueue, World, WorldConfig};
use shared::skill::SkillExecutionList;
use shared::stat_graph::StatGraph;
use shared::{
    decode_datagram, encode_datagrams, Coordinate, Direction, EntityId, EntityKind,
    EntitySnapshot, Packet, PlayerRequest, RemovalReason, SkillId, SkillTarget, StatType,
    StatValue, MAX_DATAGRAM_SIZE,
};

fn quiet_world() -> World {
    World::new(WorldConfig {
        monster_count: 0,
        ..WorldConfig::default()
    })
    .unwrap()
}

fn monster_snapshot(id: EntityId) -> EntitySnapshot {
    EntitySnapshot {
        id,
        kind: EntityKind::Monster,
        class_id: 1002,
        name: "Poring".to_string(),
        map: "prt_fild08".to_string(),
        position: Coordinate::new(3, 3),
        direction: Direction::South,
        path: Vec::new(),
        move_speed: 0.4,
        level: 1,
        hp: 50,
        max_hp: 50,
        sp: 0,
        max_sp: 0,
    }
}

/// Sends one flush of `world` through the wire format into `game`.
fn deliver(world: &mut World, client_id: u32, game: &mut ClientGameState) -> usize {
    let mut delivered = 0;
    for (target, packets) in world.flush() {
        if target != client_id {
            continue;
        }
        for datagram in encode_datagrams(&packets, MAX_DATAGRAM_SIZE).unwrap() {
            for packet in decode_datagram(&datagram).unwrap() {
                game.apply_packet(packet);
                delivered += 1;
            }
        }
    }
    delivered
}

/// STAT GRAPH TESTS
mod stat_graph_tests {
    use super::*;

    /// Level 20 and Vitality 40 against the standard MaxHP formula
    #[test]
    fn max_hp_for_known_inputs() {
        let mut stats = StatGraph::standard().unwrap();
        stats.set_base(StatType::BaseLevel, 20.0);
        stats.set_base(StatType::Vit, 40.0);

        let expected = (35.0 + 20.0 * 5.0 + 0.7 * 20.0 * 21.0 / 2.0 * (1.0 + 40.0 * 0.01_f64)).floor();
        assert_eq!(stats.int(StatType::MaxHp), expected as i32);
        assert_eq!(stats.int(StatType::MaxHp), 340);
    }

    /// Only the final Vitality matters, not the writes that led there
    #[test]
    fn cascade_is_path_independent() {
        let mut stepped = StatGraph::standard().unwrap();
        stepped.set_base(StatType::BaseLevel, 12.0);
        for vit in [5.0, 30.0, 10.0] {
            stepped.set_base(StatType::Vit, vit);
        }

        let mut direct = StatGraph::standard().unwrap();
        direct.set_base(StatType::BaseLevel, 12.0);
        direct.set_base(StatType::Vit, 10.0);

        assert_eq!(stepped.int(StatType::MaxHp), direct.int(StatType::MaxHp));
        assert_eq!(stepped.get(StatType::HpRegen), direct.get(StatType::HpRegen));
    }

    /// Writing the same value again changes nothing and reports nothing
    #[test]
    fn unchanged_write_reports_no_change() {
        let mut stats = StatGraph::standard().unwrap();
        stats.set_base(StatType::Vit, 9.0);
        assert!(stats.set_base(StatType::Vit, 9.0).is_empty());
    }
}

/// SKILL EXECUTION TESTS
mod skill_tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    /// Two cast-progress messages for the same cast leave one entry
    #[test]
    fn cast_progress_merges() {
        let mut executions = SkillExecutionList::new();
        for remaining in [1.2, 0.8] {
            executions.apply_cast_progress(
                5,
                SkillId::FIRE_BOLT,
                4,
                Some(SkillTarget::Entity(9)),
                remaining,
                2.8,
            );
        }

        assert_eq!(executions.len(), 1);
        let execution = executions.iter().next().unwrap();
        assert!(execution.is_casting());
        assert_approx_eq!(execution.cast.remaining(), 0.8);
    }

    /// An executed event without an observed cast starts in the executing phase
    #[test]
    fn executed_without_cast_starts_executing() {
        let mut executions = SkillExecutionList::new();
        executions.apply_executed(5, SkillId::BASH, 1, None, 0.6);

        assert!(!executions.is_casting());
        assert!(executions.is_animation_locked());
        executions.advance(0.7);
        assert!(executions.is_empty());
    }
}

/// REPLICATION QUEUE TESTS
mod replication_tests {
    use super::*;

    /// An HP delta followed by a snapshot of the same entity sends only the snapshot
    #[test]
    fn snapshot_supersedes_hp_delta() {
        let mut queue = ReplicationQueue::new(Some(1));
        queue.enqueue_hp(7, 30, 50);
        queue.enqueue_snapshot(monster_snapshot(7));

        let packets = queue.flush();
        assert_eq!(packets.len(), 1);
        assert!(matches!(packets[0], Packet::EntitySnapshot(ref s) if s.id == 7));
    }

    /// A path update and a snapshot of the same entity send only the snapshot
    #[test]
    fn snapshot_supersedes_path() {
        let mut queue = ReplicationQueue::new(Some(1));
        queue.enqueue_path(7, Coordinate::new(3, 3), vec![Coordinate::new(3, 3), Coordinate::new(4, 3)], 0.4);
        queue.enqueue_stat(7, StatType::Atk, StatValue::Int(20));
        queue.enqueue_snapshot(monster_snapshot(7));
        queue.enqueue_hp(8, 10, 10);

        let packets = queue.flush();
        assert_eq!(packets.len(), 2);
        assert!(packets
            .iter()
            .all(|p| !matches!(p, Packet::PathUpdate { .. } | Packet::StatUpdate { .. })));
    }

    /// Flushing is idempotent once drained
    #[test]
    fn flush_is_idempotent() {
        let mut queue = ReplicationQueue::new(None);
        assert!(queue.flush().is_empty());

        queue.enqueue_hp(3, 1, 2);
        queue.enqueue_hp(3, 2, 2);
        let packets = queue.flush();
        assert_eq!(packets, vec![Packet::HpUpdate { id: 3, hp: 2, max_hp: 2 }]);
        assert!(queue.flush().is_empty());
    }
}

/// VISIBILITY TESTS
mod visibility_tests {
    use super::*;

    #[derive(Default)]
    struct Counting {
        despawned: Vec<EntityId>,
    }

    impl MirrorSink for Counting {
        fn spawn(&mut self, _id: EntityId, _position: Coordinate) {}

        fn despawn(&mut self, id: EntityId) {
            self.despawned.push(id);
        }
    }

    /// A walker leaving view is destroyed only after its path completes, and
    /// never if it comes back first
    #[test]
    fn deferred_removal_and_reentry() {
        let origin = Coordinate::new(0, 0);
        let sight = RangeSight::new(4);
        let mut lifecycle = VisibilityLifecycle::new();
        let mut sink = Counting::default();
        let at = |x: i32, path_finished: bool| Observed {
            id: 2,
            position: Coordinate::new(x, 0),
            path_finished,
            tracked: true,
        };

        lifecycle.update(origin, &[at(4, false)], &sight, &mut sink);
        lifecycle.update(origin, &[at(5, false)], &sight, &mut sink);
        assert!(lifecycle.has_mirror(2));
        lifecycle.update(origin, &[at(4, false)], &sight, &mut sink);
        lifecycle.update(origin, &[at(4, true)], &sight, &mut sink);
        assert!(sink.despawned.is_empty());

        lifecycle.update(origin, &[at(5, false)], &sight, &mut sink);
        assert!(sink.despawned.is_empty());
        lifecycle.update(origin, &[at(6, true)], &sight, &mut sink);
        assert_eq!(sink.despawned, vec![2]);
    }
}

/// WORLD TO CLIENT TESTS
mod end_to_end_tests {
    use super::*;

    /// Login, a second player appearing, and both being mirrored
    #[test]
    fn players_see_each_other() {
        let mut world = quiet_world();
        let mut alice = ClientGameState::new(14);
        let mut sink = LogSink::default();

        world.login(1, "alice").unwrap();
        alice.apply_packet(Packet::Connected {
            client_id: 1,
            entity_id: world.player_entity(1).unwrap(),
        });
        let bob = world.login(2, "bob").unwrap();
        assert!(deliver(&mut world, 1, &mut alice) > 0);

        alice.tick(0.05, &mut sink);
        assert_eq!(alice.local_player().unwrap().name, "alice");
        assert!(alice.has_mirror(bob));
        assert_eq!(alice.personal.status_points, 48);
    }

    /// Raising a stat reaches the client as stat, cost and point updates
    #[test]
    fn raise_stat_round_trip() {
        let mut world = quiet_world();
        let mut game = ClientGameState::new(14);
        let me = world.login(1, "alice").unwrap();
        deliver(&mut world, 1, &mut game);

        server::network::apply_request(&mut world, 1, &PlayerRequest::RaiseStat { stat: StatType::Vit })
            .unwrap();
        deliver(&mut world, 1, &mut game);

        let player = game.entity(me).unwrap();
        assert_eq!(player.stat(StatType::Vit), Some(StatValue::Int(2)));
        assert_eq!(game.personal.status_points, 46);
        assert_eq!(game.personal.stat_costs.get(&StatType::Vit), Some(&2));
        assert_eq!(player.max_hp, world.entity(me).unwrap().character.as_ref().unwrap().max_hp());
    }

    /// Movement replicates as a path the client walks on its own
    #[test]
    fn movement_is_mirrored() {
        let mut world = quiet_world();
        let mut alice = ClientGameState::new(14);
        let mut sink = LogSink::default();
        world.login(1, "alice").unwrap();
        let bob = world.login(2, "bob").unwrap();
        deliver(&mut world, 1, &mut alice);

        let spawn = world.config().spawn_point;
        let target = Coordinate::new(spawn.x + 3, spawn.y);
        world.request_move(2, target).unwrap();
        deliver(&mut world, 1, &mut alice);

        for _ in 0..40 {
            world.tick(0.05);
            alice.tick(0.05, &mut sink);
            deliver(&mut world, 1, &mut alice);
        }
        assert_eq!(world.entity(bob).unwrap().position, target);
        assert_eq!(alice.entity(bob).unwrap().position, target);
    }

    /// Logging out removes the mirror on the other side
    #[test]
    fn logout_removes_mirror() {
        let mut world = quiet_world();
        let mut alice = ClientGameState::new(14);
        let mut sink = LogSink::default();
        world.login(1, "alice").unwrap();
        let bob = world.login(2, "bob").unwrap();
        deliver(&mut world, 1, &mut alice);
        alice.tick(0.05, &mut sink);
        assert!(alice.has_mirror(bob));

        world.logout(2).unwrap();
        deliver(&mut world, 1, &mut alice);
        assert_eq!(alice.entity(bob).unwrap().removed, Some(RemovalReason::LoggedOut));

        alice.tick(0.05, &mut sink);
        assert!(!alice.has_mirror(bob));
        assert!(alice.entity(bob).is_none());
    }

    /// A skill cast by another player shows up as a cast bar, then resolves
    #[test]
    fn remote_cast_is_mirrored() {
        let mut world = quiet_world();
        let mut alice = ClientGameState::new(14);
        let mut sink = LogSink::default();
        let me = world.login(1, "alice").unwrap();
        let bob = world.login(2, "bob").unwrap();
        deliver(&mut world, 1, &mut alice);
        alice.tick(0.0, &mut sink);

        assert!(world
            .request_skill(2, SkillId::BASH, 1, SkillTarget::Entity(me))
            .is_err());
        world
            .request_skill(2, SkillId::FIRST_AID, 1, SkillTarget::Entity(bob))
            .unwrap();
        deliver(&mut world, 1, &mut alice);

        let caster = alice.entity(bob).unwrap();
        assert_eq!(caster.executions.len(), 1);
        assert!(caster.executions.is_animation_locked());

        for _ in 0..30 {
            world.tick(0.05);
            alice.tick(0.05, &mut sink);
            deliver(&mut world, 1, &mut alice);
        }
        assert!(alice.entity(bob).unwrap().executions.is_empty());
    }
}
