//! State marker components.
//!
//! These markers mirror the current physical state of a character so that
//! game systems can filter queries with `With<Grounded>` and friends
//! instead of inspecting the motion hub. They are kept in sync at the end
//! of every tick by [`sync_state_markers`].

use bevy::prelude::*;

use crate::config::CharacterMotion;
use crate::homing::HomingAttack;
use crate::rail::RailAttachment;

/// Marker component indicating the character is grounded.
///
/// Mutually exclusive with [`Airborne`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating the character is airborne.
///
/// Mutually exclusive with [`Grounded`]. A grinding character counts as
/// airborne; the rail holds it, not the ground.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component indicating the character is attached to a rail.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grinding;

/// Marker component indicating the character has a homing target locked.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct HomingLocked;

/// Keeps the state markers in sync with the motion hub, rail attachment,
/// and homing state.
pub fn sync_state_markers(
    mut commands: Commands,
    query: Query<(
        Entity,
        &CharacterMotion,
        Has<RailAttachment>,
        Option<&HomingAttack>,
        Has<Grounded>,
        Has<Airborne>,
        Has<Grinding>,
        Has<HomingLocked>,
    )>,
) {
    for (entity, motion, attached, homing, grounded, airborne, grinding, locked) in query.iter() {
        let is_grounded = motion.is_grounded() && !attached;
        if is_grounded && !grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !is_grounded && !airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        if attached != grinding {
            if attached {
                commands.entity(entity).insert(Grinding);
            } else {
                commands.entity(entity).remove::<Grinding>();
            }
        }

        let has_lock = homing.is_some_and(|h| h.target.is_some());
        if has_lock != locked {
            if has_lock {
                commands.entity(entity).insert(HomingLocked);
            } else {
                commands.entity(entity).remove::<HomingLocked>();
            }
        }
    }
}
