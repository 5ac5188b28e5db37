//! The custom velocity solver, ground jumps, and the run boost.
//!
//! The solver replaces standard accelerate/brake integration with an
//! explicit seven-step pipeline and, crucially, no walkable-floor-angle
//! rejection: whatever surface the ground probe reports is a floor, so
//! the character can run on near-vertical and overhanging geometry.
//! Jumps launch along the body's own up axis rather than world up.

use bevy::prelude::*;

use crate::backend::SpatialQueryBackend;
use crate::config::{CharacterMotion, ControllerConfig, MovementMode};
use crate::intent::MovementIntent;

/// Below this speed braking just stops the body outright.
const BRAKE_TO_STOP_SPEED: f32 = 10.0;

pub(crate) struct SolveParams {
    pub dt: f32,
    pub max_speed: f32,
    pub acceleration: f32,
    pub max_acceleration: f32,
    /// Floor for the analog speed factor while input is held.
    pub analog_input_modifier: f32,
    pub friction: f32,
    pub braking_deceleration: f32,
    pub fluid_friction: f32,
    pub force_max_acceleration: bool,
    /// Direction used by force-max-accel when both the input and the
    /// velocity are degenerate (the body's facing).
    pub fallback_direction: Vec3,
}

/// One tick of the velocity pipeline.
///
/// Steps, in order: clamp the requested acceleration; optionally force it
/// to max along the best available direction; resolve the effective max
/// speed from analog input; brake when there is no input or the body is
/// over-speed; otherwise apply direction-change drag; apply fluid
/// damping; integrate and clamp. A body already over max keeps its own
/// speed as the cap rather than being snapped down.
pub(crate) fn calc_velocity(
    velocity: Vec3,
    input: Vec3,
    params: &SolveParams,
) -> Vec3 {
    let dt = params.dt;
    let mut velocity = velocity;

    // (1) Requested acceleration, clamped.
    let mut acceleration = (input * params.acceleration)
        .clamp_length_max(params.max_acceleration);

    // (2) Force-max-accel direction fallback chain.
    if params.force_max_acceleration {
        let direction = acceleration
            .try_normalize()
            .or_else(|| velocity.try_normalize())
            .unwrap_or(params.fallback_direction);
        acceleration = direction * params.max_acceleration;
    }

    // (3) Analog-modified effective max speed, floored so a barely
    // deflected stick still walks at a usable pace.
    let analog = input.length().min(1.0);
    let max_speed = if analog > 0.0 {
        params.max_speed * analog.max(params.analog_input_modifier)
    } else {
        params.max_speed
    };

    let zero_acceleration = acceleration.length_squared() < 1e-6;
    let over_max = velocity.length_squared() > max_speed * max_speed;

    if zero_acceleration || over_max {
        // (4) Braking: friction-weighted exponential decay toward zero.
        let old_velocity = velocity;
        if let Some(direction) = velocity.try_normalize() {
            let braking = -params.friction * velocity - direction * params.braking_deceleration;
            velocity += braking * dt;
            // Stop outright on reversal or a crawl.
            if velocity.dot(old_velocity) <= 0.0
                || velocity.length_squared() < BRAKE_TO_STOP_SPEED * BRAKE_TO_STOP_SPEED
            {
                velocity = Vec3::ZERO;
            }
        }
        // Braking triggered purely by over-speed while still pushing
        // along the velocity must not undershoot max.
        if over_max
            && velocity.length_squared() < max_speed * max_speed
            && acceleration.dot(old_velocity) > 0.0
        {
            velocity = old_velocity.normalize_or_zero() * max_speed;
        }
    } else {
        // (5) Direction-change drag: low friction turns sharply, high
        // friction resists.
        let direction = acceleration.normalize_or_zero();
        let speed = velocity.length();
        velocity -= (velocity - direction * speed) * (dt * params.friction).min(1.0);
    }

    // (6) Fluid damping.
    if params.fluid_friction > 0.0 {
        velocity *= 1.0 - (params.fluid_friction * dt).min(1.0);
    }

    // (7) Integrate and clamp. Over-speed keeps its own magnitude as the
    // cap instead of snapping down.
    let cap = if velocity.length_squared() > max_speed * max_speed {
        velocity.length()
    } else {
        max_speed
    };
    velocity += acceleration * dt;
    velocity.clamp_length_max(cap)
}

/// Decide whether a jump along `jump_dir` is allowed under a plane
/// constraint: directions within the 60-120 degree band around the
/// constraint plane are rejected.
pub(crate) fn jump_allowed(jump_dir: Vec3, plane_constraint_normal: Option<Vec3>) -> bool {
    match plane_constraint_normal {
        Some(normal) => normal.dot(jump_dir).abs() >= 0.5,
        None => true,
    }
}

/// Run boost: raise the speed cap while the boost input is held.
///
/// The rising edge also launches the body forward at the boosted cap; the
/// falling edge only restores the cap and lets braking shed the excess.
pub fn apply_run_boost<B: SpatialQueryBackend>(world: &mut World) {
    let entities: Vec<(Entity, ControllerConfig, bool, bool)> = world
        .query::<(Entity, &ControllerConfig, &MovementIntent, &CharacterMotion)>()
        .iter(world)
        .filter(|(_, _, _, motion)| motion.movement_mode == MovementMode::Walking)
        .map(|(e, config, intent, _)| {
            (
                e,
                *config,
                intent.boost_pressed && !intent.boost_pressed_prev,
                !intent.boost_pressed && intent.boost_pressed_prev,
            )
        })
        .collect();

    for (entity, config, started, released) in entities {
        if started {
            let forward = B::rotation(world, entity) * Vec3::NEG_Z;
            B::set_velocity(world, entity, forward * config.max_boost_speed);
            if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
                motion.max_speed = config.max_boost_speed;
            }
        } else if released {
            if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
                motion.max_speed = config.max_run_speed;
            }
        }
    }
}

/// Integrate free movement through the velocity pipeline.
///
/// Flying bodies are skipped; the rail or homing systems own their
/// velocity this tick. The solver works on the component of velocity in
/// the support plane (the ground plane when walking, the horizontal
/// plane when falling) and leaves the normal component to gravity.
pub fn solve_velocity<B: SpatialQueryBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    let entities: Vec<(Entity, ControllerConfig, MovementMode, Vec3, f32, Vec3)> = world
        .query::<(Entity, &ControllerConfig, &CharacterMotion, &MovementIntent)>()
        .iter(world)
        .filter(|(_, _, motion, _)| motion.movement_mode != MovementMode::Flying)
        .map(|(e, config, motion, intent)| {
            (
                e,
                *config,
                motion.movement_mode,
                motion.ground_normal,
                motion.max_speed,
                intent.move_input,
            )
        })
        .collect();

    for (entity, config, mode, ground_normal, max_speed, move_input) in entities {
        let up = match mode {
            MovementMode::Walking if ground_normal != Vec3::ZERO => ground_normal,
            _ => Vec3::Y,
        };
        let (friction, braking_deceleration) = match mode {
            MovementMode::Walking => (config.friction, config.braking_deceleration),
            _ => (config.air_friction, config.air_braking_deceleration),
        };

        let velocity = B::velocity(world, entity);
        let normal_part = up * velocity.dot(up);
        let planar = velocity - normal_part;
        let input = move_input - up * move_input.dot(up);
        let fallback = (B::rotation(world, entity) * Vec3::NEG_Z).normalize_or_zero();

        let params = SolveParams {
            dt,
            max_speed,
            acceleration: config.acceleration,
            max_acceleration: config.max_acceleration,
            analog_input_modifier: config.analog_input_modifier,
            friction,
            braking_deceleration,
            fluid_friction: config.fluid_friction,
            force_max_acceleration: config.force_max_acceleration,
            fallback_direction: fallback,
        };
        let solved = calc_velocity(planar, input, &params);
        B::set_velocity(world, entity, solved + normal_part);
    }
}

/// Ground jump along the body's local up axis.
///
/// Consumes the buffered jump request when the character is grounded or
/// within coyote time. The launch direction comes from the orientation
/// quaternion, so a body running inside a loop jumps toward the loop's
/// center, not toward the sky.
pub fn apply_jump<B: SpatialQueryBackend>(world: &mut World) {
    let entities: Vec<(Entity, ControllerConfig)> = world
        .query::<(Entity, &ControllerConfig, &CharacterMotion, &MovementIntent)>()
        .iter(world)
        .filter(|(_, config, motion, intent)| {
            intent.has_jump_request()
                && motion.movement_mode != MovementMode::Flying
                && (motion.is_grounded() || motion.time_since_grounded <= config.coyote_time)
        })
        .map(|(e, config, _, _)| (e, *config))
        .collect();

    for (entity, config) in entities {
        let jump_dir = (B::rotation(world, entity) * Vec3::Y).normalize_or_zero();
        if !jump_allowed(jump_dir, config.plane_constraint_normal) {
            // Constrained out; leave the request buffered in case the
            // orientation recovers before the buffer expires.
            continue;
        }
        let consumed = world
            .get_mut::<MovementIntent>(entity)
            .map(|mut intent| intent.take_jump_request().is_some())
            .unwrap_or(false);
        if !consumed {
            continue;
        }

        let velocity = B::velocity(world, entity);
        let planed = velocity - jump_dir * velocity.dot(jump_dir);
        B::set_velocity(world, entity, planed + jump_dir * config.jump_speed);

        if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
            motion.movement_mode = MovementMode::Falling;
            motion.was_in_air = true;
            motion.ground = None;
            motion.ground_normal = Vec3::ZERO;
            motion.time_since_grounded = f32::MAX;
        }
        debug!("jump fired along {jump_dir:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(dt: f32) -> SolveParams {
        SolveParams {
            dt,
            max_speed: 1800.0,
            acceleration: 2048.0,
            max_acceleration: 2048.0,
            analog_input_modifier: 0.0,
            friction: 8.0,
            braking_deceleration: 2048.0,
            fluid_friction: 0.0,
            force_max_acceleration: false,
            fallback_direction: Vec3::NEG_Z,
        }
    }

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn accelerates_from_rest_toward_input() {
        let v = calc_velocity(Vec3::ZERO, Vec3::X, &params(DT));
        assert!(v.x > 0.0);
        assert!(v.y.abs() < 1e-6 && v.z.abs() < 1e-6);
        assert!((v.x - 2048.0 * DT).abs() < 1e-3);
    }

    #[test]
    fn no_input_brakes_to_zero() {
        let mut v = Vec3::new(300.0, 0.0, 0.0);
        for _ in 0..600 {
            v = calc_velocity(v, Vec3::ZERO, &params(DT));
        }
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn braking_decay_is_monotonic() {
        let mut v = Vec3::new(1000.0, 0.0, 0.0);
        let mut last = v.length();
        for _ in 0..30 {
            v = calc_velocity(v, Vec3::ZERO, &params(DT));
            assert!(v.length() <= last);
            last = v.length();
        }
    }

    #[test]
    fn speed_clamped_at_max() {
        let mut v = Vec3::ZERO;
        for _ in 0..2000 {
            v = calc_velocity(v, Vec3::X, &params(DT));
        }
        assert!(v.length() <= 1800.0 + 1e-3);
        assert!(v.length() > 1700.0);
    }

    #[test]
    fn over_speed_while_accelerating_along_velocity_stays_at_max() {
        // Slightly over max, still pushing the same way: braking must
        // settle exactly at max, not below it.
        let p = params(DT);
        let v = calc_velocity(Vec3::new(1850.0, 0.0, 0.0), Vec3::X, &p);
        assert!((v.length() - p.max_speed).abs() < 30.0, "got {}", v.length());
        assert!(v.length() >= p.max_speed - 1e-3);
    }

    #[test]
    fn over_speed_keeps_own_magnitude_as_cap() {
        // Way over max with no input: one braking tick reduces speed but
        // never snaps straight to max.
        let v = calc_velocity(Vec3::new(5000.0, 0.0, 0.0), Vec3::ZERO, &params(DT));
        assert!(v.length() < 5000.0);
        assert!(v.length() > 1800.0);
    }

    #[test]
    fn direction_change_drag_turns_velocity() {
        let v0 = Vec3::new(500.0, 0.0, 0.0);
        let v = calc_velocity(v0, Vec3::Z, &params(DT));
        assert!(v.z > 0.0);
        // Speed is roughly preserved through the turn.
        assert!((v.length() - v0.length()).abs() < 100.0);
    }

    #[test]
    fn higher_friction_redirects_faster() {
        let v0 = Vec3::new(500.0, 0.0, 0.0);
        let mut low = params(DT);
        low.friction = 1.0;
        let mut high = params(DT);
        high.friction = 16.0;
        let turned_low = calc_velocity(v0, Vec3::Z, &low);
        let turned_high = calc_velocity(v0, Vec3::Z, &high);
        // Higher friction redirects more of the velocity per tick.
        assert!(turned_high.x < turned_low.x);
    }

    #[test]
    fn analog_input_lowers_effective_max() {
        let mut v = Vec3::ZERO;
        let p = params(DT);
        for _ in 0..2000 {
            v = calc_velocity(v, Vec3::X * 0.5, &p);
        }
        assert!(v.length() <= 0.5 * p.max_speed + 1e-3);
        assert!(v.length() > 0.4 * p.max_speed);
    }

    #[test]
    fn analog_modifier_floors_the_speed_factor() {
        // Barely deflected stick: the effective max floors at the
        // modifier instead of crawling at the raw magnitude.
        let mut v = Vec3::ZERO;
        let mut p = params(DT);
        p.analog_input_modifier = 0.7;
        for _ in 0..2000 {
            v = calc_velocity(v, Vec3::X * 0.35, &p);
        }
        assert!(v.length() <= 0.7 * p.max_speed + 1e-3, "got {}", v.length());
        assert!(v.length() > 0.6 * p.max_speed);
    }

    #[test]
    fn force_max_accel_falls_back_to_velocity_direction() {
        let mut p = params(DT);
        p.force_max_acceleration = true;
        // No input but moving along +Z: full acceleration follows the
        // velocity direction.
        let v = calc_velocity(Vec3::new(0.0, 0.0, 100.0), Vec3::ZERO, &p);
        assert!(v.z > 100.0);
    }

    #[test]
    fn force_max_accel_falls_back_to_facing_at_rest() {
        let mut p = params(DT);
        p.force_max_acceleration = true;
        p.fallback_direction = Vec3::X;
        let v = calc_velocity(Vec3::ZERO, Vec3::ZERO, &p);
        assert!(v.x > 0.0);
    }

    #[test]
    fn fluid_friction_damps_velocity() {
        let mut p = params(DT);
        p.fluid_friction = 2.0;
        let braked = calc_velocity(Vec3::new(1000.0, 0.0, 0.0), Vec3::ZERO, &params(DT));
        let damped = calc_velocity(Vec3::new(1000.0, 0.0, 0.0), Vec3::ZERO, &p);
        assert!(damped.length() < braked.length());
    }

    #[test]
    fn jump_allowed_without_constraint() {
        assert!(jump_allowed(Vec3::Y, None));
        assert!(jump_allowed(Vec3::NEG_Y, None));
    }

    #[test]
    fn jump_rejected_inside_constraint_band() {
        let normal = Vec3::Z;
        // Body up lies in the constraint plane: 90 degrees off, rejected.
        assert!(!jump_allowed(Vec3::Y, Some(normal)));
        // 75 degrees off: |cos| < 0.5, still rejected.
        let dir = Quat::from_rotation_x(75_f32.to_radians()) * Vec3::Z;
        assert!(!jump_allowed(dir, Some(normal)));
        // 45 degrees off: allowed.
        let dir = Quat::from_rotation_x(45_f32.to_radians()) * Vec3::Z;
        assert!(jump_allowed(dir, Some(normal)));
        // Aligned or anti-aligned with the normal: allowed.
        assert!(jump_allowed(Vec3::Z, Some(normal)));
        assert!(jump_allowed(Vec3::NEG_Z, Some(normal)));
    }
}
