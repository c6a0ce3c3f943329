//! Protocol and simulation types shared by the authoritative server and the
//! predicting client.
//!
//! Everything in here is pure computation: no sockets, no clocks. The server
//! drives these types from its tick loop and the client replays the parts it
//! needs for local prediction.

pub mod entity;
pub mod error;
pub mod grid;
pub mod skill;
pub mod skill_db;
pub mod stat_graph;
pub mod stats;

pub use entity::{
    Coordinate, Direction, EntityId, EntityKind, EntitySnapshot, LocalPlayerSnapshot, Path,
    RemovalReason,
};
pub use error::{SkillError, StatGraphError, WorldError};
pub use skill::SkillTarget;
pub use skill_db::SkillId;
pub use stats::{StatType, StatValue};

use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
/// Cells around a player the server replicates.
pub const REPLICATION_RANGE: u32 = 16;
/// Cells around the local player the client keeps mirrors for.
pub const VIEW_RANGE: u32 = 14;
/// Seconds per cell for a freshly created character.
pub const DEFAULT_MOVE_SPEED: f32 = 0.15;
pub const MAX_DATAGRAM_SIZE: usize = 8192;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PlayerRequest {
    Move { target: Coordinate },
    UseSkill { skill: SkillId, level: u8, target: SkillTarget },
    RaiseStat { stat: StatType },
    PickUp { pickup: EntityId },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    Connect {
        client_version: u32,
        name: String,
    },
    Request {
        sequence: u32,
        timestamp: u64,
        request: PlayerRequest,
    },
    /// Keeps an idle connection from timing out.
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
        entity_id: EntityId,
    },
    Disconnected {
        reason: String,
    },
    EntitySnapshot(EntitySnapshot),
    LocalPlayerSnapshot(LocalPlayerSnapshot),
    PathUpdate {
        id: EntityId,
        position: Coordinate,
        path: Vec<Coordinate>,
        move_speed: f32,
    },
    StatUpdate {
        id: EntityId,
        stat: StatType,
        value: StatValue,
    },
    StatCostUpdate {
        stat: StatType,
        cost: i32,
    },
    RemainingPoints {
        status_points: i32,
        skill_points: i32,
    },
    HpUpdate {
        id: EntityId,
        hp: i32,
        max_hp: i32,
    },
    SpUpdate {
        id: EntityId,
        sp: i32,
        max_sp: i32,
    },
    ExpUpdate {
        base_exp: u32,
        base_exp_next: u32,
        job_exp: u32,
        job_exp_next: u32,
    },
    BaseLevelUp {
        id: EntityId,
        level: i32,
    },
    JobLevelUp {
        id: EntityId,
        level: i32,
    },
    SkillCastProgress {
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
        remaining: f32,
        max: f32,
    },
    SkillExecuted {
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: SkillTarget,
        animation: f32,
        amount: i32,
    },
    SkillQueued {
        skill: SkillId,
        level: u8,
    },
    EntityRemoved {
        id: EntityId,
        reason: RemovalReason,
    },
    PickupRemoved {
        id: EntityId,
    },
}

impl Packet {
    /// Entity the packet is about, when it is about exactly one.
    pub fn subject(&self) -> Option<EntityId> {
        match self {
            Packet::EntitySnapshot(snapshot) => Some(snapshot.id),
            Packet::LocalPlayerSnapshot(snapshot) => Some(snapshot.entity.id),
            Packet::PathUpdate { id, .. }
            | Packet::StatUpdate { id, .. }
            | Packet::HpUpdate { id, .. }
            | Packet::SpUpdate { id, .. }
            | Packet::BaseLevelUp { id, .. }
            | Packet::JobLevelUp { id, .. }
            | Packet::EntityRemoved { id, .. }
            | Packet::PickupRemoved { id } => Some(*id),
            Packet::SkillCastProgress { user, .. } | Packet::SkillExecuted { user, .. } => {
                Some(*user)
            }
            _ => None,
        }
    }
}

/// A client request tagged with its send order.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInput {
    pub sequence: u32,
    pub timestamp: u64,
    pub request: PlayerRequest,
}

/// Packs server packets into as few datagrams as fit `limit` bytes each.
///
/// A datagram is a bincode `Vec<Packet>`; packet order is kept across
/// datagrams. A single packet larger than `limit` still goes out alone.
pub fn encode_datagrams(packets: &[Packet], limit: usize) -> Result<Vec<Vec<u8>>, bincode::Error> {
    // bincode prefixes a sequence with its u64 length
    const LENGTH_PREFIX: u64 = 8;

    let mut datagrams = Vec::new();
    let mut batch: Vec<&Packet> = Vec::new();
    let mut batch_size = LENGTH_PREFIX;
    for packet in packets {
        let size = bincode::serialized_size(packet)?;
        if !batch.is_empty() && batch_size + size > limit as u64 {
            datagrams.push(bincode::serialize(&batch)?);
            batch.clear();
            batch_size = LENGTH_PREFIX;
        }
        batch.push(packet);
        batch_size += size;
    }
    if !batch.is_empty() {
        datagrams.push(bincode::serialize(&batch)?);
    }
    Ok(datagrams)
}

pub fn decode_datagram(bytes: &[u8]) -> Result<Vec<Packet>, bincode::Error> {
    bincode::deserialize(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: EntityId) -> EntitySnapshot {
        EntitySnapshot {
            id,
            kind: EntityKind::Monster,
            class_id: 1002,
            name: "Poring".to_string(),
            map: "prt_fild08".to_string(),
            position: Coordinate::new(10, 12),
            direction: Direction::East,
            path: vec![Coordinate::new(10, 12), Coordinate::new(11, 12)],
            move_speed: 0.4,
            level: 1,
            hp: 50,
            max_hp: 50,
            sp: 0,
            max_sp: 0,
        }
    }

    #[test]
    fn test_packet_serialization_connect() {
        let packet = Packet::Connect {
            client_version: 42,
            name: "novice".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();

        match deserialized {
            Packet::Connect {
                client_version,
                name,
            } => {
                assert_eq!(client_version, 42);
                assert_eq!(name, "novice");
            }
            _ => panic!("Wrong packet type after deserialization"),
        }
    }

    #[test]
    fn test_packet_serialization_skill_request() {
        let packet = Packet::Request {
            sequence: 123,
            timestamp: 456789,
            request: PlayerRequest::UseSkill {
                skill: SkillId::STORM_GUST,
                level: 10,
                target: SkillTarget::Ground(Coordinate::new(4, 5)),
            },
        };

        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(deserialized, packet);
    }

    #[test]
    fn test_snapshot_fits_in_datagram() {
        let packet = Packet::EntitySnapshot(snapshot(7));
        let serialized = bincode::serialize(&packet).unwrap();
        assert!(serialized.len() < MAX_DATAGRAM_SIZE);
    }

    #[test]
    fn test_packet_subject() {
        assert_eq!(Packet::EntitySnapshot(snapshot(7)).subject(), Some(7));
        assert_eq!(
            Packet::SkillExecuted {
                user: 3,
                skill: SkillId::BASH,
                level: 1,
                target: SkillTarget::Entity(4),
                animation: 0.6,
                amount: 20,
            }
            .subject(),
            Some(3)
        );
        assert_eq!(
            Packet::RemainingPoints {
                status_points: 3,
                skill_points: 1
            }
            .subject(),
            None
        );
    }

    #[test]
    fn test_datagrams_keep_order_and_limit() {
        let packets: Vec<Packet> = (1..=40).map(|id| Packet::EntitySnapshot(snapshot(id))).collect();
        let limit = 512;
        let datagrams = encode_datagrams(&packets, limit).unwrap();

        assert!(datagrams.len() > 1);
        assert!(datagrams.iter().all(|d| d.len() <= limit));
        let decoded: Vec<Packet> = datagrams
            .iter()
            .flat_map(|d| decode_datagram(d).unwrap())
            .collect();
        assert_eq!(decoded, packets);
    }

    #[test]
    fn test_no_packets_no_datagrams() {
        assert!(encode_datagrams(&[], MAX_DATAGRAM_SIZE).unwrap().is_empty());
    }

    #[test]
    fn test_view_range_inside_replication_range() {
        assert!(VIEW_RANGE < REPLICATION_RANGE);
    }
}
