//! Character configuration and the central motion state component.
//!
//! This module defines the core state hub for characters ([`CharacterMotion`])
//! and the tuning components for ground movement, homing attacks, and rail
//! grinding.

use bevy::prelude::*;

use crate::collision::CollisionData;

/// How the velocity solver treats the character this tick.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MovementMode {
    /// On the ground; velocity follows the surface.
    #[default]
    Walking,
    /// In the air under gravity.
    Falling,
    /// Constrained motion with gravity suppressed (grinding, homing).
    Flying,
}

/// Core character motion component.
///
/// This is the **central hub** for per-character motion state. It holds
/// RESULT states written by the sensor and traversal systems, not raw
/// measurements: the resolved ground contact, the active movement mode,
/// and the effective speed cap after boosts.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct CharacterMotion {
    /// Ground contact resolved by the ground probe this tick.
    /// None means the probe missed (airborne).
    #[reflect(ignore)]
    pub ground: Option<CollisionData>,
    /// Normal of the ground contact. Zero while airborne.
    pub ground_normal: Vec3,
    /// Set while airborne; consumed by the landing momentum conversion
    /// on the first grounded tick.
    pub was_in_air: bool,
    /// Seconds since the ground probe last hit (for coyote time).
    pub time_since_grounded: f32,
    /// Current movement mode. Grinding and homing force [`MovementMode::Flying`].
    pub movement_mode: MovementMode,
    /// Effective max ground speed this tick. Starts at
    /// [`ControllerConfig::max_run_speed`] and is raised while the run
    /// boost is held.
    pub max_speed: f32,
}

impl Default for CharacterMotion {
    fn default() -> Self {
        Self {
            ground: None,
            ground_normal: Vec3::ZERO,
            // Spawning counts as airborne; the first grounded tick runs
            // the landing path and settles into Walking.
            was_in_air: true,
            time_since_grounded: f32::MAX,
            movement_mode: MovementMode::Falling,
            max_speed: 1800.0,
        }
    }
}

impl CharacterMotion {
    /// Create new motion state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the ground probe hit this tick.
    #[inline]
    pub fn is_grounded(&self) -> bool {
        self.ground.is_some()
    }

    /// Get the ground entity if grounded.
    pub fn ground_entity(&self) -> Option<Entity> {
        self.ground.as_ref().and_then(|g| g.entity)
    }

    /// Get the distance to the ground contact, or `f32::MAX` when airborne.
    pub fn ground_distance(&self) -> f32 {
        self.ground.as_ref().map(|g| g.distance).unwrap_or(f32::MAX)
    }
}

/// Tuning parameters for ground movement and the velocity solver.
///
/// Speeds and distances are in world units; the defaults assume the
/// centimeter-scale worlds the mechanics were tuned for.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct ControllerConfig {
    // === Speed ===
    /// Max ground speed while running normally.
    pub max_run_speed: f32,
    /// Max ground speed while the run boost is held.
    pub max_boost_speed: f32,
    /// Acceleration rate applied along the input direction (units/second^2).
    pub acceleration: f32,
    /// Requested-acceleration clamp for the solver.
    pub max_acceleration: f32,
    /// Braking deceleration when no input (units/second^2).
    pub braking_deceleration: f32,
    /// Friction factor for braking decay and direction-change drag while
    /// grounded.
    pub friction: f32,
    /// Friction while airborne. Zero keeps air momentum.
    pub air_friction: f32,
    /// Braking deceleration while airborne.
    pub air_braking_deceleration: f32,
    /// When set, any input accelerates at full max_acceleration along
    /// the input direction (falling back to velocity, then facing).
    pub force_max_acceleration: bool,
    /// Fluid friction factor applied each tick. Zero disables damping.
    pub fluid_friction: f32,
    /// Floor for the analog speed factor while any input is held: a
    /// barely deflected stick still moves at this fraction of max speed.
    pub analog_input_modifier: f32,

    // === Jump ===
    /// Jump launch speed along the body-up axis.
    pub jump_speed: f32,
    /// Coyote time duration in seconds. While the air dash is still
    /// armed, an airborne jump press is claimed by the dash first; the
    /// coyote jump fires only once the dash is spent.
    pub coyote_time: f32,
    /// Jump buffer duration in seconds.
    pub jump_buffer_time: f32,
    /// Plane constraint normal. When set, jumps whose direction lies
    /// too close to the constraint plane are rejected.
    pub plane_constraint_normal: Option<Vec3>,

    // === Ground sensing ===
    /// Ground probe length along body -up.
    pub ground_probe_distance: f32,
    /// Short probe length for the ground sticking pass.
    pub stick_probe_distance: f32,
    /// How strongly velocity is pulled into the surface while sticking.
    pub sticking_factor: f32,
    /// Multiplier converting fall speed into ground speed on landing.
    pub landing_conversion: f32,
    /// Squared-speed floor below which steep slopes reject walking.
    pub slope_speed_limit_sq: f32,
    /// Vertical normal component below which a surface counts as steep.
    pub slope_angle_limit: f32,
    /// Slerp speed for orienting the body to the ground frame.
    pub orientation_interp_speed: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            // Speed
            max_run_speed: 1800.0,
            max_boost_speed: 2500.0,
            acceleration: 2048.0,
            max_acceleration: 2048.0,
            braking_deceleration: 2048.0,
            friction: 8.0,
            air_friction: 0.0,
            air_braking_deceleration: 0.0,
            force_max_acceleration: false,
            fluid_friction: 0.0,
            analog_input_modifier: 0.7,

            // Jump
            jump_speed: 700.0,
            coyote_time: 0.15,
            jump_buffer_time: 0.1,
            plane_constraint_normal: None,

            // Ground sensing
            ground_probe_distance: 60.0,
            stick_probe_distance: 5.0,
            sticking_factor: 1.0,
            landing_conversion: 2.0,
            slope_speed_limit_sq: 500.0,
            slope_angle_limit: 0.5,
            orientation_interp_speed: 10.0,
        }
    }
}

impl ControllerConfig {
    /// Create a config tuned for a responsive player character.
    pub fn player() -> Self {
        Self::default()
    }

    /// Builder: set run and boost max speeds.
    pub fn with_speeds(mut self, run: f32, boost: f32) -> Self {
        self.max_run_speed = run;
        self.max_boost_speed = boost;
        self
    }

    /// Builder: set acceleration and friction.
    pub fn with_acceleration(mut self, acceleration: f32, friction: f32) -> Self {
        self.acceleration = acceleration;
        self.max_acceleration = acceleration;
        self.friction = friction;
        self
    }

    /// Builder: set jump speed.
    pub fn with_jump_speed(mut self, speed: f32) -> Self {
        self.jump_speed = speed;
        self
    }

    /// Builder: set coyote time.
    pub fn with_coyote_time(mut self, time: f32) -> Self {
        self.coyote_time = time;
        self
    }

    /// Builder: set jump buffer time.
    pub fn with_jump_buffer_time(mut self, time: f32) -> Self {
        self.jump_buffer_time = time;
        self
    }

    /// Builder: constrain movement to a plane.
    pub fn with_plane_constraint(mut self, normal: Vec3) -> Self {
        self.plane_constraint_normal = Some(normal.normalize_or_zero());
        self
    }

    /// Builder: set the ground probe length.
    pub fn with_ground_probe_distance(mut self, distance: f32) -> Self {
        self.ground_probe_distance = distance;
        self
    }
}

/// Tuning parameters for the homing attack.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct HomingConfig {
    /// Search radius for attackable targets.
    pub radius: f32,
    /// Approach step per tick while homing (units/tick).
    pub speed: f32,
    /// Distance at which the target counts as reached.
    pub min_threshold: f32,
    /// Upward launch speed applied when an enemy target is destroyed.
    /// The no-target dash launches forward at twice this.
    pub up_force: f32,
    /// Max angle (degrees) between facing and target direction for a
    /// lock. The boundary is inclusive.
    pub min_view_angle_deg: f32,
}

impl Default for HomingConfig {
    fn default() -> Self {
        Self {
            radius: 500.0,
            speed: 10.0,
            min_threshold: 100.0,
            up_force: 700.0,
            min_view_angle_deg: 95.0,
        }
    }
}

impl HomingConfig {
    /// Builder: set the search radius.
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Builder: set the view angle threshold in degrees.
    pub fn with_view_angle(mut self, degrees: f32) -> Self {
        self.min_view_angle_deg = degrees;
        self
    }

    /// Speed of the no-target forward dash.
    #[inline]
    pub fn dash_speed(&self) -> f32 {
        self.up_force * 2.0
    }
}

/// Tuning parameters for rail grinding.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct RailConfig {
    /// Height the body rides above the curve.
    pub rail_offset: f32,
    /// Launch speed along rail-up when jumping off.
    pub jump_height: f32,
    /// Speed cap while grinding (unboosted).
    pub max_rail_speed: f32,
    /// Speed cap while a rail boost is active.
    pub boost_max_speed: f32,
    /// Duration of a rail boost in seconds.
    pub boost_duration: f32,
    /// Scales the pitch-driven acceleration along the rail.
    pub acceleration_multiplier: f32,
    /// Downward sweep length for rail entry detection.
    pub probe_distance: f32,
    /// Sweep sphere radius for rail entry detection.
    pub probe_radius: f32,
    /// Lateral sweep length for side-rail detection.
    pub side_probe_distance: f32,
    /// Sweep sphere radius for side-rail detection.
    pub side_probe_radius: f32,
    /// Seconds after detaching during which the exited rail is ignored
    /// by the entry probe.
    pub reentry_cooldown: f32,
    /// Step size for the arc-distance entry scan.
    pub scan_step: f32,
    /// Euclidean tolerance for the arc-distance entry scan.
    pub scan_tolerance: f32,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            rail_offset: 70.0,
            jump_height: 300.0,
            max_rail_speed: 2000.0,
            boost_max_speed: 2500.0,
            boost_duration: 2.0,
            acceleration_multiplier: 5.0,
            probe_distance: 100.0,
            probe_radius: 30.0,
            side_probe_distance: 250.0,
            side_probe_radius: 30.0,
            reentry_cooldown: 0.3,
            scan_step: 1.0,
            scan_tolerance: 0.5,
        }
    }
}

impl RailConfig {
    /// Builder: set the riding offset above the curve.
    pub fn with_rail_offset(mut self, offset: f32) -> Self {
        self.rail_offset = offset;
        self
    }

    /// Builder: set the grinding speed cap.
    pub fn with_max_rail_speed(mut self, speed: f32) -> Self {
        self.max_rail_speed = speed;
        self
    }

    /// Builder: set boost cap and duration.
    pub fn with_boost(mut self, max_speed: f32, duration: f32) -> Self {
        self.boost_max_speed = max_speed;
        self.boost_duration = duration;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motion_default_is_airborne() {
        let motion = CharacterMotion::new();
        assert!(!motion.is_grounded());
        assert_eq!(motion.movement_mode, MovementMode::Falling);
        assert_eq!(motion.ground_distance(), f32::MAX);
    }

    #[test]
    fn motion_grounded_after_contact() {
        let mut motion = CharacterMotion::new();
        motion.ground = Some(CollisionData::new(10.0, Vec3::Y, Vec3::ZERO, None));
        motion.ground_normal = Vec3::Y;
        assert!(motion.is_grounded());
        assert_eq!(motion.ground_distance(), 10.0);
    }

    #[test]
    fn config_boost_exceeds_run_speed() {
        let config = ControllerConfig::default();
        assert!(config.max_boost_speed > config.max_run_speed);
    }

    #[test]
    fn config_plane_constraint_normalized() {
        let config = ControllerConfig::default().with_plane_constraint(Vec3::new(0.0, 0.0, 10.0));
        assert!((config.plane_constraint_normal.unwrap().length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn homing_dash_speed_doubles_up_force() {
        let config = HomingConfig::default();
        assert_eq!(config.dash_speed(), 1400.0);
    }

    #[test]
    fn rail_builder_overrides() {
        let config = RailConfig::default().with_boost(3000.0, 1.5);
        assert_eq!(config.boost_max_speed, 3000.0);
        assert_eq!(config.boost_duration, 1.5);
        assert_eq!(config.rail_offset, RailConfig::default().rail_offset);
    }
}
