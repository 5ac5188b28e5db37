//! Collaborator events.
//!
//! Audio, UI, and spawn systems live outside this crate; the mechanics
//! notify them through these fire-and-forget events. Emission is never
//! awaited and a missing listener is not an error.
//!
//! Icon events are edge-triggered: [`ShowHomingIcon`] and
//! [`HideHomingIcon`] fire only when the locked target changes, never
//! repeatedly while a lock holds.

use bevy::prelude::*;

/// What a spatial sound cue is for. The host maps these to actual audio
/// assets.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundKind {
    /// A homing target was locked.
    LockOn,
    /// A homing attack launched toward a target.
    Homing,
    /// A no-target air dash fired.
    Dash,
    /// The character attached to a rail.
    RailEnter,
    /// The character jumped off a rail.
    RailJump,
    /// A rail boost fired.
    RailBoost,
}

/// Request to play a positional sound cue.
#[derive(Event, Debug, Clone, Copy)]
pub struct PlaySpatialSound {
    /// The character that caused the cue.
    pub source: Entity,
    pub kind: SoundKind,
    /// World position to play at.
    pub position: Vec3,
}

/// The lock-on reticle should appear over `target`.
#[derive(Event, Debug, Clone, Copy)]
pub struct ShowHomingIcon {
    pub target: Entity,
}

/// The lock-on reticle over `target` should disappear.
#[derive(Event, Debug, Clone, Copy)]
pub struct HideHomingIcon {
    pub target: Entity,
}

/// A character attached to a rail.
#[derive(Event, Debug, Clone, Copy)]
pub struct RailEntered {
    pub character: Entity,
    pub rail: Entity,
}

/// A character detached from a rail by reaching an open end.
#[derive(Event, Debug, Clone, Copy)]
pub struct RailExited {
    pub character: Entity,
    pub rail: Entity,
}

/// A character jumped off a rail.
#[derive(Event, Debug, Clone, Copy)]
pub struct RailJumpedOff {
    pub character: Entity,
    pub rail: Entity,
}

/// A homing attack reached an enemy target. The host owns despawning and
/// any score or effect logic.
#[derive(Event, Debug, Clone, Copy)]
pub struct TargetDestroyed {
    pub target: Entity,
    /// The attacking character.
    pub by: Entity,
}
