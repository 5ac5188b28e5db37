//! # `rail_character_controller`
//!
//! 3D platformer character mechanics on top of a pluggable physics backend:
//! ground-adaptive locomotion, a homing-attack lock-on/dash system, and
//! rail-grinding traversal (attach to a spline, slide along it, switch
//! rails, launch off).
//!
//! This crate provides the traversal/attack decision logic and the
//! velocity/orientation math only. Rendering, audio playback, UI widgets
//! and the collision backend itself are external collaborators: spatial
//! queries go through the [`backend::SpatialQueryBackend`] trait, and
//! audio/UI reactions are raised as fire-and-forget [`events`].
//!
//! ## Architecture
//!
//! Each simulation tick runs an explicit ordered pipeline:
//! 1. Ground probe resolves footing and ground normal
//! 2. Body orientation blends toward the ground (or upright while falling)
//! 3. Homing target acquisition and the attack state machine (airborne only)
//! 4. Rail entry detection, in-rail update, side-rail detection/switching
//! 5. The custom velocity solver integrates free movement
//!
//! The ordering is load-bearing: rail entry reads the grounded flag the
//! ground probe just wrote, and homing must settle before rail detection so
//! the two traversal modes stay mutually exclusive. The pipeline is encoded
//! as [`CharacterTickSet`], not by call-order convention.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bevy::prelude::*;
//! use rail_character_controller::prelude::*;
//!
//! # #[cfg(feature = "rapier3d")]
//! App::new()
//!     .add_plugins(DefaultPlugins)
//!     .add_plugins(RailCharacterPlugin::<Rapier3dBackend>::default())
//!     .run();
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod collision;
pub mod config;
pub mod events;
pub mod ground;
pub mod homing;
pub mod intent;
pub mod movement;
pub mod rail;
pub mod spline;
pub mod state;

#[cfg(feature = "rapier3d")]
pub mod rapier;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::SpatialQueryBackend;
    pub use crate::collision::CollisionData;
    pub use crate::config::{
        CharacterMotion, ControllerConfig, HomingConfig, MovementMode, RailConfig,
    };
    pub use crate::events::{
        HideHomingIcon, PlaySpatialSound, RailEntered, RailExited, RailJumpedOff, ShowHomingIcon,
        SoundKind, TargetDestroyed,
    };
    pub use crate::homing::{Attackable, HomingAttack, HomingPhase, TargetKind};
    pub use crate::intent::{MovementIntent, RailSide};
    pub use crate::rail::{GrindRail, RailAttachment, RailBoost, RailSwitchState};
    pub use crate::spline::RailSpline;
    pub use crate::state::{Airborne, Grinding, Grounded, HomingLocked};
    pub use crate::{CharacterTickSet, RailCharacterPlugin};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, Rapier3dCharacterBundle};
}

/// Ordered phases of the per-tick character pipeline.
///
/// The sets are chained in [`FixedUpdate`]; systems added to a later set can
/// rely on every earlier phase having run this tick. Ground resolution must
/// precede homing, and homing must precede rail detection, because rail
/// entry reads the freshly written grounded flag and the traversal modes
/// are mutually exclusive.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacterTickSet {
    /// Timer ticking and jump-request buffering.
    Preparation,
    /// Ground probe.
    Sensors,
    /// Orientation blending, landing momentum, ground sticking.
    Orientation,
    /// Homing target acquisition and attack state machine.
    Homing,
    /// Rail entry/update/side detection/switching and boosts.
    Rail,
    /// Free-movement velocity solver, jumps, run boost.
    Movement,
    /// State marker sync and intent cleanup.
    FinalApplication,
}

/// Main plugin for the character mechanics.
///
/// Generic over a physics backend `B` which provides spatial queries and
/// body accessors (see [`backend::SpatialQueryBackend`]).
pub struct RailCharacterPlugin<B: backend::SpatialQueryBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::SpatialQueryBackend> Default for RailCharacterPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::SpatialQueryBackend> Plugin for RailCharacterPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<config::CharacterMotion>();
        app.register_type::<config::ControllerConfig>();
        app.register_type::<config::HomingConfig>();
        app.register_type::<config::RailConfig>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<homing::HomingAttack>();
        app.register_type::<homing::Attackable>();
        app.register_type::<rail::GrindRail>();
        app.register_type::<rail::RailAttachment>();
        app.register_type::<rail::RailSwitchState>();
        app.register_type::<rail::RailBoost>();
        app.register_type::<rail::RailCooldown>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::Grinding>();
        app.register_type::<state::HomingLocked>();

        // Collaborator events (fire-and-forget, never awaited)
        app.add_event::<events::PlaySpatialSound>();
        app.add_event::<events::ShowHomingIcon>();
        app.add_event::<events::HideHomingIcon>();
        app.add_event::<events::RailEntered>();
        app.add_event::<events::RailExited>();
        app.add_event::<events::RailJumpedOff>();
        app.add_event::<events::TargetDestroyed>();

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        // The tick pipeline. See CharacterTickSet for the ordering contract.
        app.configure_sets(
            FixedUpdate,
            (
                CharacterTickSet::Preparation,
                CharacterTickSet::Sensors,
                CharacterTickSet::Orientation,
                CharacterTickSet::Homing,
                CharacterTickSet::Rail,
                CharacterTickSet::Movement,
                CharacterTickSet::FinalApplication,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (intent::buffer_jump_requests, rail::tick_rail_cooldowns)
                .in_set(CharacterTickSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            ground::update_ground_sensor::<B>.in_set(CharacterTickSet::Sensors),
        );
        app.add_systems(
            FixedUpdate,
            (
                ground::blend_orientation::<B>,
                ground::apply_landing_momentum::<B>,
                ground::stick_to_ground::<B>,
            )
                .chain()
                .in_set(CharacterTickSet::Orientation),
        );
        app.add_systems(
            FixedUpdate,
            (homing::update_target_lock::<B>, homing::update_attack::<B>)
                .chain()
                .in_set(CharacterTickSet::Homing),
        );
        app.add_systems(
            FixedUpdate,
            (
                rail::detect_rail_entry::<B>,
                rail::update_rail_boost::<B>,
                rail::update_grind::<B>,
                rail::detect_side_rails::<B>,
                rail::apply_rail_switch::<B>,
            )
                .chain()
                .in_set(CharacterTickSet::Rail),
        );
        app.add_systems(
            FixedUpdate,
            (
                movement::apply_run_boost::<B>,
                movement::solve_velocity::<B>,
                movement::apply_jump::<B>,
            )
                .chain()
                .in_set(CharacterTickSet::Movement),
        );
        app.add_systems(
            FixedUpdate,
            (state::sync_state_markers, intent::expire_jump_requests)
                .in_set(CharacterTickSet::FinalApplication),
        );
    }
}
