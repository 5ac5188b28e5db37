//! Ground sensing and body orientation.
//!
//! The ground probe casts along the body's local -up, so a character
//! running through a loop keeps "finding ground" above its head. There is
//! no walkable-angle limit: any hit counts as ground, and the orientation
//! blend tilts the body to match whatever the normal says.

use bevy::prelude::*;

use crate::backend::SpatialQueryBackend;
use crate::config::{CharacterMotion, ControllerConfig, MovementMode};
use crate::rail::RailAttachment;

/// Blend factor for a frame-rate independent interp toward a target.
#[inline]
pub(crate) fn interp_alpha(speed: f32, dt: f32) -> f32 {
    (speed * dt).clamp(0.0, 1.0)
}

/// Build a rotation whose +Y is `up` and whose forward (-Z) is `forward`
/// projected into the plane of `up`.
pub(crate) fn frame_from_up(up: Vec3, forward: Vec3) -> Quat {
    let forward_planar = (forward - up * forward.dot(up)).normalize_or_zero();
    let forward_planar = if forward_planar == Vec3::ZERO {
        // Forward is parallel to up; pick any tangent.
        up.cross(Vec3::X).normalize_or_zero().cross(up)
    } else {
        forward_planar
    };
    let right = forward_planar.cross(up).normalize_or_zero();
    if right == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    Quat::from_mat3(&Mat3::from_cols(right, up, -forward_planar))
}

/// Probe for ground along the body's -up axis and resolve the contact
/// into the motion hub.
///
/// A probe miss is the normal airborne outcome, not an error. Grinding
/// characters are skipped; the rail holds them and the probe would only
/// find the rail itself.
pub fn update_ground_sensor<B: SpatialQueryBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    let entities: Vec<(Entity, ControllerConfig, bool)> = world
        .query::<(Entity, &ControllerConfig, Has<RailAttachment>, &CharacterMotion)>()
        .iter(world)
        .map(|(e, config, attached, _)| (e, *config, attached))
        .collect();

    for (entity, config, attached) in entities {
        if attached {
            if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
                motion.ground = None;
                motion.ground_normal = Vec3::ZERO;
                motion.was_in_air = true;
                motion.time_since_grounded = f32::MAX;
            }
            continue;
        }

        let position = B::position(world, entity);
        let down = B::rotation(world, entity) * Vec3::NEG_Y;
        let hit = B::raycast(world, position, down, config.ground_probe_distance, entity);
        let velocity = B::velocity(world, entity);

        let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) else {
            continue;
        };
        match hit {
            Some(contact) => {
                let normal = contact.normal;
                // Steep surfaces shed slow characters instead of letting
                // them idle on a wall.
                let planar = velocity - normal * velocity.dot(normal);
                let too_slow_for_slope = normal.y < config.slope_angle_limit
                    && planar.length_squared() < config.slope_speed_limit_sq;
                if too_slow_for_slope {
                    motion.ground = None;
                    motion.ground_normal = Vec3::ZERO;
                    motion.was_in_air = true;
                    motion.time_since_grounded += dt;
                    if motion.movement_mode == MovementMode::Walking {
                        motion.movement_mode = MovementMode::Falling;
                    }
                } else {
                    motion.ground_normal = normal;
                    motion.ground = Some(contact);
                    motion.time_since_grounded = 0.0;
                }
            }
            None => {
                motion.ground = None;
                motion.ground_normal = Vec3::ZERO;
                motion.was_in_air = true;
                motion.time_since_grounded += dt;
                if motion.movement_mode == MovementMode::Walking {
                    motion.movement_mode = MovementMode::Falling;
                }
            }
        }
    }
}

/// Blend the body rotation toward its target frame.
///
/// Grounded: align up with the ground normal, keeping the current
/// heading. Falling: recover toward yaw-only upright. Flying is left
/// alone; grinding and homing set the rotation directly.
pub fn blend_orientation<B: SpatialQueryBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    let entities: Vec<(Entity, ControllerConfig, MovementMode, Vec3)> = world
        .query::<(Entity, &ControllerConfig, &CharacterMotion)>()
        .iter(world)
        .map(|(e, config, motion)| (e, *config, motion.movement_mode, motion.ground_normal))
        .collect();

    for (entity, config, mode, ground_normal) in entities {
        if mode == MovementMode::Flying {
            continue;
        }
        let rotation = B::rotation(world, entity);
        let forward = rotation * Vec3::NEG_Z;

        let target = match mode {
            MovementMode::Walking if ground_normal != Vec3::ZERO => {
                frame_from_up(ground_normal, forward)
            }
            // Falling, or grounded with no usable normal yet: upright.
            _ => frame_from_up(Vec3::Y, forward),
        };
        let blended = rotation.slerp(target, interp_alpha(config.orientation_interp_speed, dt));
        B::set_rotation(world, entity, blended);
    }
}

/// Convert fall momentum into ground speed on the first grounded tick.
pub fn apply_landing_momentum<B: SpatialQueryBackend>(world: &mut World) {
    let entities: Vec<(Entity, ControllerConfig)> = world
        .query::<(Entity, &ControllerConfig, &CharacterMotion)>()
        .iter(world)
        .filter(|(_, _, motion)| {
            motion.is_grounded()
                && motion.was_in_air
                && motion.movement_mode != MovementMode::Flying
        })
        .map(|(e, config, _)| (e, *config))
        .collect();

    for (entity, config) in entities {
        let velocity = B::velocity(world, entity);
        let Some(motion) = world.get::<CharacterMotion>(entity) else {
            continue;
        };
        let normal = motion.ground_normal;

        let into_surface = (-velocity.dot(normal)).max(0.0);
        let planar = velocity - normal * velocity.dot(normal);
        let new_velocity = match planar.try_normalize() {
            Some(dir) => dir * (planar.length() + into_surface * config.landing_conversion),
            None => Vec3::ZERO,
        };
        B::set_velocity(world, entity, new_velocity);

        if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
            motion.was_in_air = false;
            motion.movement_mode = MovementMode::Walking;
        }
    }
}

/// Keep a walking character glued to the surface.
///
/// A short secondary probe confirms the surface is still directly under
/// the feet, then the velocity component along the normal is removed so
/// crests and dips don't fling the body off.
pub fn stick_to_ground<B: SpatialQueryBackend>(world: &mut World) {
    let entities: Vec<(Entity, ControllerConfig)> = world
        .query::<(Entity, &ControllerConfig, &CharacterMotion)>()
        .iter(world)
        .filter(|(_, _, motion)| {
            motion.movement_mode == MovementMode::Walking && motion.is_grounded()
        })
        .map(|(e, config, _)| (e, *config))
        .collect();

    for (entity, config) in entities {
        let position = B::position(world, entity);
        let down = B::rotation(world, entity) * Vec3::NEG_Y;
        let Some(contact) =
            B::raycast(world, position, down, config.stick_probe_distance, entity)
        else {
            continue;
        };

        let velocity = B::velocity(world, entity);
        let away = velocity.dot(contact.normal);
        if away > 0.0 {
            B::set_velocity(
                world,
                entity,
                velocity - contact.normal * away * config.sticking_factor,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_from_up_flat_ground_keeps_heading() {
        let frame = frame_from_up(Vec3::Y, Vec3::X);
        assert!(((frame * Vec3::NEG_Z) - Vec3::X).length() < 1e-4);
        assert!(((frame * Vec3::Y) - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn frame_from_up_projects_forward_onto_surface() {
        // 45 degree slope facing +X, heading +X
        let normal = Vec3::new(-1.0, 1.0, 0.0).normalize();
        let frame = frame_from_up(normal, Vec3::X);
        let forward = frame * Vec3::NEG_Z;
        assert!(forward.dot(normal).abs() < 1e-4);
        assert!(forward.x > 0.5);
    }

    #[test]
    fn frame_from_up_handles_forward_parallel_to_up() {
        let frame = frame_from_up(Vec3::Y, Vec3::Y);
        let up = frame * Vec3::Y;
        assert!((up - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn frame_from_up_inverted_surface() {
        // Ceiling: up points down, the body flips to hang.
        let frame = frame_from_up(Vec3::NEG_Y, Vec3::X);
        assert!(((frame * Vec3::Y) - Vec3::NEG_Y).length() < 1e-4);
    }

    #[test]
    fn interp_alpha_clamps() {
        assert_eq!(interp_alpha(10.0, 1.0), 1.0);
        assert!((interp_alpha(10.0, 1.0 / 60.0) - 10.0 / 60.0).abs() < 1e-6);
    }
}
