//! Skill execution state machine.
//!
//! An execution moves through `Casting -> Executing -> Finished`. The server
//! drives it from requests; the client mirrors it from cast-progress and
//! executed messages and keeps ticking it locally between corrections. Both
//! ends go through the same lookup-then-merge entry point so a second message
//! for a skill already being cast overwrites the existing entry instead of
//! adding another one.

use crate::entity::{Coordinate, EntityId};
use crate::skill_db::SkillId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How long an entry whose cast finished may wait for the executed
/// confirmation before it is dropped.
pub const EXECUTION_CONFIRMATION_GRACE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Timer {
    remaining: f32,
    max: f32,
}

impl Timer {
    pub fn new(duration: f32) -> Self {
        let duration = duration.max(0.0);
        Self {
            remaining: duration,
            max: duration,
        }
    }

    pub fn finished() -> Self {
        Self::default()
    }

    /// Partially elapsed timer, as reported by an authoritative update.
    pub fn with_remaining(remaining: f32, max: f32) -> Self {
        let remaining = remaining.max(0.0);
        Self {
            remaining,
            max: max.max(remaining),
        }
    }

    /// Returns true on the call that finishes the timer.
    pub fn advance(&mut self, dt: f32) -> bool {
        if self.is_finished() {
            return false;
        }
        self.remaining = (self.remaining - dt).max(0.0);
        self.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.remaining <= 0.0
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Elapsed fraction in `[0, 1]`.
    pub fn fraction(&self) -> f32 {
        if self.max <= 0.0 {
            1.0
        } else {
            1.0 - self.remaining / self.max
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SkillTarget {
    Entity(EntityId),
    Ground(Coordinate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionPhase {
    Casting,
    Executing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExecutionHandle(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct SkillExecution {
    pub handle: ExecutionHandle,
    pub skill: SkillId,
    pub level: u8,
    pub user: EntityId,
    /// `None` when the target could not be resolved by the observer.
    pub target: Option<SkillTarget>,
    pub cast: Timer,
    /// Not started until the effect actually lands.
    pub animation: Option<Timer>,
    pub has_execution_started: bool,
    /// Built from a partial update; fields other than the cast timer are
    /// best effort.
    pub placeholder: bool,
    awaiting_confirmation: f32,
}

impl SkillExecution {
    fn new(handle: ExecutionHandle, user: EntityId, skill: SkillId, level: u8) -> Self {
        Self {
            handle,
            skill,
            level,
            user,
            target: None,
            cast: Timer::finished(),
            animation: None,
            has_execution_started: false,
            placeholder: false,
            awaiting_confirmation: 0.0,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        if !self.has_execution_started {
            return ExecutionPhase::Casting;
        }
        match &self.animation {
            Some(timer) if timer.is_finished() => ExecutionPhase::Finished,
            _ => ExecutionPhase::Executing,
        }
    }

    pub fn is_casting(&self) -> bool {
        self.phase() == ExecutionPhase::Casting
    }

    /// True when the cast finished but nobody started the animation yet.
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.has_execution_started && self.animation.is_none()
    }
}

/// A server-side request to use a skill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CastRequest {
    pub user: EntityId,
    pub target: SkillTarget,
    pub skill: SkillId,
    pub level: u8,
    /// Cast time after stat scaling.
    pub cast_time: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    CastFinished(ExecutionHandle),
    Removed(ExecutionHandle),
    /// Cast finished locally but the effect was never confirmed.
    Abandoned(ExecutionHandle),
}

/// What `merge_or_create` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged(ExecutionHandle),
    Created(ExecutionHandle),
}

impl MergeOutcome {
    pub fn handle(&self) -> ExecutionHandle {
        match self {
            MergeOutcome::Merged(handle) | MergeOutcome::Created(handle) => *handle,
        }
    }
}

/// In-flight executions of one user.
#[derive(Debug, Clone, Default)]
pub struct SkillExecutionList {
    next_handle: u32,
    executions: Vec<SkillExecution>,
}

impl SkillExecutionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SkillExecution> {
        self.executions.iter()
    }

    pub fn get(&self, handle: ExecutionHandle) -> Option<&SkillExecution> {
        self.executions.iter().find(|e| e.handle == handle)
    }

    pub fn get_mut(&mut self, handle: ExecutionHandle) -> Option<&mut SkillExecution> {
        self.executions.iter_mut().find(|e| e.handle == handle)
    }

    pub fn is_casting(&self) -> bool {
        self.executions.iter().any(SkillExecution::is_casting)
    }

    pub fn is_animation_locked(&self) -> bool {
        self.executions
            .iter()
            .any(|e| e.phase() == ExecutionPhase::Executing)
    }

    pub fn is_busy(&self) -> bool {
        self.is_casting() || self.is_animation_locked()
    }

    /// The entry currently casting `skill`, if any.
    pub fn find_casting(&self, skill: SkillId) -> Option<ExecutionHandle> {
        self.executions
            .iter()
            .find(|e| e.skill == skill && e.is_casting())
            .map(|e| e.handle)
    }

    /// The entry for `skill` still waiting for its effect to land: casting,
    /// or finished casting without an animation yet.
    pub fn find_unconfirmed(&self, skill: SkillId) -> Option<ExecutionHandle> {
        self.executions
            .iter()
            .find(|e| e.skill == skill && (e.is_casting() || e.is_awaiting_confirmation()))
            .map(|e| e.handle)
    }

    /// Applies `merge` to the entry found by `existing`, or appends the
    /// entry built by `create`.
    pub fn merge_or_create(
        &mut self,
        existing: Option<ExecutionHandle>,
        merge: impl FnOnce(&mut SkillExecution),
        create: impl FnOnce(ExecutionHandle) -> SkillExecution,
    ) -> MergeOutcome {
        if let Some(execution) = existing.and_then(|handle| self.get_mut(handle)) {
            merge(execution);
            return MergeOutcome::Merged(execution.handle);
        }

        let handle = ExecutionHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.executions.push(create(handle));
        MergeOutcome::Created(handle)
    }

    /// Authoritative request. A second request for a skill that is still
    /// casting overwrites that entry's cast timer and targeting.
    pub fn request(&mut self, request: CastRequest) -> MergeOutcome {
        let existing = self.find_casting(request.skill);
        self.merge_or_create(
            existing,
            |execution| {
                execution.cast = Timer::new(request.cast_time);
                execution.target = Some(request.target);
                execution.level = request.level;
                if execution.cast.is_finished() {
                    execution.has_execution_started = true;
                }
            },
            |handle| {
                let mut execution =
                    SkillExecution::new(handle, request.user, request.skill, request.level);
                execution.target = Some(request.target);
                execution.cast = Timer::new(request.cast_time);
                execution.has_execution_started = execution.cast.is_finished();
                execution
            },
        )
    }

    /// Cast-progress update from the server.
    pub fn apply_cast_progress(
        &mut self,
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: Option<SkillTarget>,
        remaining: f32,
        max: f32,
    ) -> MergeOutcome {
        let existing = self.find_casting(skill);
        let outcome = self.merge_or_create(
            existing,
            |execution| {
                execution.cast = Timer::with_remaining(remaining, max);
                execution.level = level;
                if target.is_some() {
                    execution.target = target;
                }
            },
            |handle| {
                let mut execution = SkillExecution::new(handle, user, skill, level);
                execution.cast = Timer::with_remaining(remaining, max);
                execution.target = target;
                execution.placeholder = true;
                execution
            },
        );
        if let MergeOutcome::Created(_) = outcome {
            debug!(
                "No local cast of {:?} by {}, created placeholder entry",
                skill, user
            );
        }
        outcome
    }

    /// Executed event from the server. Creates the entry straight in the
    /// executing phase when the cast was never observed.
    pub fn apply_executed(
        &mut self,
        user: EntityId,
        skill: SkillId,
        level: u8,
        target: Option<SkillTarget>,
        animation: f32,
    ) -> MergeOutcome {
        let existing = self.find_unconfirmed(skill);
        self.merge_or_create(
            existing,
            |execution| {
                execution.cast = Timer::with_remaining(0.0, execution.cast.max());
                execution.has_execution_started = true;
                execution.animation = Some(Timer::new(animation));
                execution.level = level;
                if target.is_some() {
                    execution.target = target;
                }
            },
            |handle| {
                let mut execution = SkillExecution::new(handle, user, skill, level);
                execution.target = target;
                execution.has_execution_started = true;
                execution.animation = Some(Timer::new(animation));
                execution
            },
        )
    }

    /// Starts the animation-cooldown of an execution whose effect landed.
    pub fn start_execution(&mut self, handle: ExecutionHandle, animation: f32) -> bool {
        match self.get_mut(handle) {
            Some(execution) => {
                execution.cast = Timer::with_remaining(0.0, execution.cast.max());
                execution.has_execution_started = true;
                execution.animation = Some(Timer::new(animation));
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, handle: ExecutionHandle) -> Option<SkillExecution> {
        let index = self.executions.iter().position(|e| e.handle == handle)?;
        Some(self.executions.remove(index))
    }

    pub fn clear(&mut self) {
        self.executions.clear();
    }

    /// Advances every timer by `dt` and drops finished entries.
    pub fn advance(&mut self, dt: f32) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();

        for execution in &mut self.executions {
            if !execution.has_execution_started {
                if execution.cast.advance(dt) || execution.cast.is_finished() {
                    execution.has_execution_started = true;
                    events.push(ExecutionEvent::CastFinished(execution.handle));
                }
                continue;
            }

            match execution.animation.as_mut() {
                Some(animation) => {
                    animation.advance(dt);
                    if animation.is_finished() {
                        events.push(ExecutionEvent::Removed(execution.handle));
                    }
                }
                None => {
                    execution.awaiting_confirmation += dt;
                    if execution.awaiting_confirmation > EXECUTION_CONFIRMATION_GRACE {
                        events.push(ExecutionEvent::Abandoned(execution.handle));
                    }
                }
            }
        }

        self.executions.retain(|execution| {
            execution.phase() != ExecutionPhase::Finished
                && execution.awaiting_confirmation <= EXECUTION_CONFIRMATION_GRACE
        });
        events
    }
}

/// Per-skill reuse cooldowns, ticked independently of executions.
#[derive(Debug, Clone, Default)]
pub struct CooldownSet {
    timers: HashMap<SkillId, Timer>,
}

impl CooldownSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, skill: SkillId, duration: f32) {
        if duration > 0.0 {
            self.timers.insert(skill, Timer::new(duration));
        }
    }

    pub fn is_cooling_down(&self, skill: SkillId) -> bool {
        self.timers.contains_key(&skill)
    }

    pub fn remaining(&self, skill: SkillId) -> f32 {
        self.timers.get(&skill).map(Timer::remaining).unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Returns the skills whose cooldown expired this call, sorted.
    pub fn advance(&mut self, dt: f32) -> Vec<SkillId> {
        let mut expired = Vec::new();
        for (skill, timer) in self.timers.iter_mut() {
            timer.advance(dt);
            if timer.is_finished() {
                expired.push(*skill);
            }
        }
        for skill in &expired {
            self.timers.remove(skill);
        }
        expired.sort();
        expired
    }
}
