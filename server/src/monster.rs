//! Monster classes and their wandering behaviour.

use crate::character::Character;
use rand::Rng;
use shared::grid::Grid;
use shared::stat_graph::StatGraph;
use shared::stats::{Element, Race, StatType};
use shared::{Coordinate, EntityId};

#[derive(Debug, Clone, PartialEq)]
pub struct MonsterClass {
    pub id: u16,
    pub name: &'static str,
    pub level: i32,
    pub str: i32,
    pub agi: i32,
    pub vit: i32,
    pub int: i32,
    pub dex: i32,
    /// Seconds per cell.
    pub move_speed: f32,
    pub base_exp: u32,
    pub job_exp: u32,
    pub race: Race,
    pub element: Element,
    /// Item left behind on death.
    pub drop_item: u16,
    /// Cells it strays from its spawn point.
    pub wander_radius: i32,
}

static CLASSES: [MonsterClass; 3] = [
    MonsterClass {
        id: 1002,
        name: "Poring",
        level: 1,
        str: 1,
        agi: 1,
        vit: 1,
        int: 0,
        dex: 6,
        move_speed: 0.4,
        base_exp: 27,
        job_exp: 20,
        race: Race::Plant,
        element: Element::Water,
        drop_item: 909,
        wander_radius: 5,
    },
    MonsterClass {
        id: 1063,
        name: "Lunatic",
        level: 3,
        str: 10,
        agi: 3,
        vit: 3,
        int: 0,
        dex: 8,
        move_speed: 0.2,
        base_exp: 40,
        job_exp: 30,
        race: Race::Brute,
        element: Element::Neutral,
        drop_item: 705,
        wander_radius: 6,
    },
    MonsterClass {
        id: 1007,
        name: "Fabre",
        level: 2,
        str: 8,
        agi: 2,
        vit: 4,
        int: 0,
        dex: 7,
        move_speed: 0.4,
        base_exp: 30,
        job_exp: 24,
        race: Race::Insect,
        element: Element::Earth,
        drop_item: 914,
        wander_radius: 4,
    },
];

pub fn class(id: u16) -> Option<&'static MonsterClass> {
    CLASSES.iter().find(|class| class.id == id)
}

pub fn classes() -> &'static [MonsterClass] {
    &CLASSES
}

impl MonsterClass {
    /// Fresh character built on a copy of the validated stat graph.
    pub fn character(&self, template: &StatGraph) -> Character {
        let mut stats = template.clone();
        stats.set_base(StatType::BaseLevel, self.level as f64);
        stats.set_base(StatType::Str, self.str as f64);
        stats.set_base(StatType::Agi, self.agi as f64);
        stats.set_base(StatType::Vit, self.vit as f64);
        stats.set_base(StatType::Int, self.int as f64);
        stats.set_base(StatType::Dex, self.dex as f64);
        stats.set_base(StatType::MoveSpeed, self.move_speed as f64);
        Character::new(stats, self.race, self.element)
    }
}

/// Per-monster AI state.
#[derive(Debug, Clone, PartialEq)]
pub struct MonsterBrain {
    pub class_id: u16,
    pub spawn: Coordinate,
    /// Seconds until the next wander decision.
    pub idle: f32,
    /// Who it is fighting back against.
    pub target: Option<EntityId>,
}

/// Seconds a monster idles between wander steps.
pub const WANDER_IDLE: (f32, f32) = (2.0, 6.0);
/// Cells a monster chases an attacker before giving up.
pub const CHASE_RANGE: u32 = 9;

impl MonsterBrain {
    pub fn new(class_id: u16, spawn: Coordinate) -> Self {
        Self {
            class_id,
            spawn,
            idle: 0.0,
            target: None,
        }
    }

    /// Counts down the idle timer; returns a destination once it runs out.
    pub fn wander(
        &mut self,
        dt: f32,
        radius: i32,
        grid: &dyn Grid,
        rng: &mut impl Rng,
    ) -> Option<Coordinate> {
        self.idle -= dt;
        if self.idle > 0.0 {
            return None;
        }
        self.idle = rng.gen_range(WANDER_IDLE.0..WANDER_IDLE.1);

        let destination = Coordinate::new(
            self.spawn.x + rng.gen_range(-radius..=radius),
            self.spawn.y + rng.gen_range(-radius..=radius),
        );
        grid.are_coordinates_valid(destination).then_some(destination)
    }
}
