//! Which entities have a local mirror.
//!
//! The visible set is recomputed from the mirrored data every tick, so it does
//! not matter whether a path update or a snapshot arrived first. Mirrors are
//! created as soon as an entity becomes visible. An entity that stops being
//! visible keeps its mirror until its current path has played out, and an
//! entity that comes back before that never loses it.

use log::{debug, info};
use shared::{Coordinate, EntityId};
use std::collections::BTreeSet;

/// Range and line-of-sight collaborator.
pub trait SightQuery {
    fn can_see(&self, from: Coordinate, to: Coordinate) -> bool;
}

/// Plain square range, no occlusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSight {
    pub range: u32,
}

impl RangeSight {
    pub fn new(range: u32) -> Self {
        Self { range }
    }
}

impl SightQuery for RangeSight {
    fn can_see(&self, from: Coordinate, to: Coordinate) -> bool {
        from.in_range(&to, self.range)
    }
}

/// Whatever instantiates and destroys the presentation of a mirror.
pub trait MirrorSink {
    fn spawn(&mut self, id: EntityId, position: Coordinate);
    fn despawn(&mut self, id: EntityId);
}

/// Logs mirror creation and destruction; used by the headless binary.
#[derive(Debug, Default)]
pub struct LogSink {
    pub spawned: u64,
    pub despawned: u64,
}

impl MirrorSink for LogSink {
    fn spawn(&mut self, id: EntityId, position: Coordinate) {
        self.spawned += 1;
        info!("Mirror {} appears at ({}, {})", id, position.x, position.y);
    }

    fn despawn(&mut self, id: EntityId) {
        self.despawned += 1;
        info!("Mirror {} disappears", id);
    }
}

/// One entity as the lifecycle sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observed {
    pub id: EntityId,
    pub position: Coordinate,
    pub path_finished: bool,
    /// False once the server said the entity is gone. Such an entity can
    /// still hold a mirror while it finishes walking, but is never visible.
    pub tracked: bool,
}

#[derive(Debug, Default)]
pub struct VisibilityLifecycle {
    mirrored: BTreeSet<EntityId>,
    awaiting_removal: BTreeSet<EntityId>,
}

impl VisibilityLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_mirror(&self, id: EntityId) -> bool {
        self.mirrored.contains(&id)
    }

    pub fn is_awaiting_removal(&self, id: EntityId) -> bool {
        self.awaiting_removal.contains(&id)
    }

    pub fn mirrors(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.mirrored.iter().copied()
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrored.len()
    }

    /// Runs one tick of the lifecycle and returns the ids whose mirror was
    /// torn down.
    ///
    /// Entities missing from `entities` altogether have nothing left to
    /// play out and lose their mirror right away.
    pub fn update<'a>(
        &mut self,
        origin: Coordinate,
        entities: impl IntoIterator<Item = &'a Observed>,
        sight: &dyn SightQuery,
        sink: &mut dyn MirrorSink,
    ) -> Vec<EntityId> {
        let mut known = BTreeSet::new();
        let mut finished = BTreeSet::new();
        let mut visible = BTreeSet::new();

        for observed in entities {
            known.insert(observed.id);
            if observed.path_finished {
                finished.insert(observed.id);
            }
            if !observed.tracked || !sight.can_see(origin, observed.position) {
                continue;
            }
            visible.insert(observed.id);

            if self.awaiting_removal.remove(&observed.id) {
                debug!("Entity {} came back before its mirror was removed", observed.id);
            }
            if self.mirrored.insert(observed.id) {
                sink.spawn(observed.id, observed.position);
            }
        }

        for id in &self.mirrored {
            if !visible.contains(id) && self.awaiting_removal.insert(*id) {
                debug!("Entity {} left view, removal deferred", id);
            }
        }

        let ready: Vec<EntityId> = self
            .awaiting_removal
            .iter()
            .copied()
            .filter(|id| !known.contains(id) || finished.contains(id))
            .collect();
        for id in &ready {
            self.awaiting_removal.remove(id);
            self.mirrored.remove(id);
            sink.despawn(*id);
        }
        ready
    }

    /// Drops every mirror at once, e.g. after a disconnect.
    pub fn clear(&mut self, sink: &mut dyn MirrorSink) {
        for id in std::mem::take(&mut self.mirrored) {
            sink.despawn(id);
        }
        self.awaiting_removal.clear();
    }
}
