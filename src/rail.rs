//! Rail grinding: entry detection, the per-tick grind update, side-rail
//! switching, boosts, and jump-off.
//!
//! A rail is any entity carrying [`GrindRail`]. The character references
//! it through a transient [`RailAttachment`] holding the rail entity id
//! and the current arc distance; the reference is non-owning and the rail
//! is looked up fresh every tick. While attached the character is in
//! [`MovementMode::Flying`] with gravity suppressed, and the rail systems
//! own position, rotation, and velocity outright.

use bevy::prelude::*;

use crate::backend::SpatialQueryBackend;
use crate::config::{CharacterMotion, MovementMode, RailConfig};
use crate::events::{PlaySpatialSound, RailEntered, RailExited, RailJumpedOff, SoundKind};
use crate::homing::HomingAttack;
use crate::intent::{MovementIntent, RailSide};
use crate::spline::RailSpline;

/// Below this speed the grind direction flips instead of stalling.
const LOW_SPEED_FLIP_THRESHOLD: f32 = 1.0;

/// Piecewise-linear remap of the travel pitch into a distance-advance
/// weight: grinding straight down advances 1.15x, straight up 0.55x.
#[inline]
pub(crate) fn pitch_advance_weight(pitch: f32) -> f32 {
    0.85 - 0.3 * pitch.clamp(-1.0, 1.0)
}

/// A grindable rail in the world.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct GrindRail {
    pub spline: RailSpline,
    /// Speed floor enforced when a character lands on this rail.
    pub min_grind_speed: f32,
}

impl GrindRail {
    pub fn new(spline: RailSpline) -> Self {
        Self {
            spline,
            min_grind_speed: 500.0,
        }
    }

    /// Builder: set the speed floor.
    pub fn with_min_grind_speed(mut self, speed: f32) -> Self {
        self.min_grind_speed = speed;
        self
    }
}

/// Transient attachment of a character to a rail. Present while grinding,
/// removed on exit.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct RailAttachment {
    /// The rail entity. Non-owning; checked for existence each tick.
    pub rail: Entity,
    /// Arc distance along the rail. Stays in `[0, length]` except during
    /// the single wrap tick on a closed loop.
    pub distance: f32,
    /// True when traveling against the curve's tangent.
    pub backwards: bool,
}

impl Default for RailAttachment {
    fn default() -> Self {
        Self {
            rail: Entity::PLACEHOLDER,
            distance: 0.0,
            backwards: false,
        }
    }
}

/// A side rail detected by the lateral sweeps.
#[derive(Reflect, Debug, Clone, Copy)]
pub struct SideRailCandidate {
    pub rail: Entity,
    /// Where the lateral sweep hit the rail.
    pub impact_point: Vec3,
    /// Re-entry reference point: the impact offset backward by the
    /// current velocity, so the switch lands slightly behind the hit.
    pub target_point: Vec3,
}

/// Side-rail candidates and switch eligibility for a character.
#[derive(Component, Reflect, Debug, Clone, Copy)]
#[reflect(Component)]
pub struct RailSwitchState {
    pub left: Option<SideRailCandidate>,
    pub right: Option<SideRailCandidate>,
    /// Cleared when a switch fires; re-enabled once off the rail.
    pub can_switch: bool,
}

impl Default for RailSwitchState {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
            can_switch: true,
        }
    }
}

impl RailSwitchState {
    pub fn candidate(&self, side: RailSide) -> Option<SideRailCandidate> {
        match side {
            RailSide::Left => self.left,
            RailSide::Right => self.right,
        }
    }
}

/// One-shot timed rail boost. Inserting a fresh one replaces the pending
/// revert, so back-to-back boosts extend rather than stack.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct RailBoost {
    #[reflect(ignore)]
    pub timer: Timer,
}

impl Default for RailBoost {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl RailBoost {
    pub fn new(duration: f32) -> Self {
        Self {
            timer: Timer::from_seconds(duration, TimerMode::Once),
        }
    }
}

/// Re-entry suppression for a just-exited rail.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct RailCooldown {
    pub rail: Entity,
    #[reflect(ignore)]
    pub timer: Timer,
}

impl Default for RailCooldown {
    fn default() -> Self {
        Self {
            rail: Entity::PLACEHOLDER,
            timer: Timer::from_seconds(0.3, TimerMode::Once),
        }
    }
}

/// Ticks re-entry cooldowns and removes expired ones.
pub fn tick_rail_cooldowns(
    mut commands: Commands,
    time: Res<Time<Fixed>>,
    mut query: Query<(Entity, &mut RailCooldown)>,
) {
    for (entity, mut cooldown) in query.iter_mut() {
        cooldown.timer.tick(time.delta());
        if cooldown.timer.finished() {
            commands.entity(entity).remove::<RailCooldown>();
        }
    }
}

/// Rails currently transparent to this character's rail probes.
fn ignored_rails(world: &World, entity: Entity) -> Vec<Entity> {
    world
        .get::<RailCooldown>(entity)
        .map(|c| vec![c.rail])
        .unwrap_or_default()
}

/// Orientation frame for riding the rail at `distance`, flipped around
/// the rail up when traveling backwards.
fn rail_frame(spline: &RailSpline, distance: f32, backwards: bool) -> Quat {
    let rotation = spline.rotation_at_distance(distance);
    if backwards {
        Quat::from_axis_angle(spline.up_at_distance(distance), std::f32::consts::PI) * rotation
    } else {
        rotation
    }
}

/// Probe below airborne characters for a rail to land on.
///
/// A probe miss or a failed arc scan is silent; nothing changes and the
/// character keeps falling.
pub fn detect_rail_entry<B: SpatialQueryBackend>(world: &mut World) {
    let characters: Vec<(Entity, RailConfig)> = world
        .query_filtered::<(Entity, &RailConfig, &CharacterMotion), Without<RailAttachment>>()
        .iter(world)
        .filter(|(_, _, motion)| !motion.is_grounded())
        .map(|(e, config, _)| (e, *config))
        .collect();

    for (entity, config) in characters {
        // Homing owns the body while a dash is in flight.
        if world
            .get::<HomingAttack>(entity)
            .is_some_and(|a| a.is_homing())
        {
            continue;
        }

        let position = B::position(world, entity);
        let down = B::rotation(world, entity) * Vec3::NEG_Y;
        let ignore = ignored_rails(world, entity);
        let Some(hit) = B::sphere_sweep(
            world,
            position,
            down,
            config.probe_distance,
            config.probe_radius,
            entity,
            &ignore,
        ) else {
            continue;
        };
        let Some(rail_entity) = hit.entity else {
            continue;
        };
        let Some(rail) = world.get::<GrindRail>(rail_entity) else {
            continue;
        };
        let Some(distance) =
            rail.spline
                .scan_distance_to(hit.point, config.scan_step, config.scan_tolerance)
        else {
            continue;
        };

        attach_to_rail::<B>(world, entity, rail_entity, distance, &config);
    }
}

/// Snap a character onto a rail at the given arc distance.
fn attach_to_rail<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    rail_entity: Entity,
    distance: f32,
    config: &RailConfig,
) {
    let Some(rail) = world.get::<GrindRail>(rail_entity) else {
        return;
    };
    let spline = rail.spline.clone();
    let min_grind_speed = rail.min_grind_speed;

    let forward = B::rotation(world, entity) * Vec3::NEG_Z;
    let tangent = spline.tangent_at_distance(distance);
    let backwards = forward.dot(tangent) < 0.0;

    let velocity = B::velocity(world, entity);
    let speed = velocity.length().max(min_grind_speed);
    let travel = if backwards { -tangent } else { tangent };
    B::set_velocity(world, entity, travel * speed);

    let up = spline.up_at_distance(distance);
    let snapped = spline.location_at_distance(distance) + up * config.rail_offset;
    B::set_position(world, entity, snapped);
    B::set_rotation(world, entity, rail_frame(&spline, distance, backwards));
    B::set_gravity_scale(world, entity, 0.0);

    if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
        motion.movement_mode = MovementMode::Flying;
        motion.ground = None;
        motion.ground_normal = Vec3::ZERO;
    }
    world.entity_mut(entity).insert((
        RailAttachment {
            rail: rail_entity,
            distance,
            backwards,
        },
        RailSwitchState::default(),
    ));
    world.send_event(RailEntered {
        character: entity,
        rail: rail_entity,
    });
    world.send_event(PlaySpatialSound {
        source: entity,
        kind: SoundKind::RailEnter,
        position: snapped,
    });
    debug!("attached to rail {rail_entity:?} at distance {distance:.1}");
}

/// Start boosts on the boost rising edge and expire active ones.
///
/// Runs before [`update_grind`] so a boost started this tick already
/// raises the speed cap this tick.
pub fn update_rail_boost<B: SpatialQueryBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    let delta = std::time::Duration::from_secs_f32(dt);

    // Expire finished boosts.
    let expired: Vec<Entity> = {
        let mut finished = Vec::new();
        let mut query = world.query::<(Entity, &mut RailBoost)>();
        for (entity, mut boost) in query.iter_mut(world) {
            boost.timer.tick(delta);
            if boost.timer.finished() {
                finished.push(entity);
            }
        }
        finished
    };
    for entity in expired {
        world.entity_mut(entity).remove::<RailBoost>();
        debug!("rail boost expired on {entity:?}");
    }

    // Boost rising edge while grinding.
    let starters: Vec<(Entity, RailConfig, Vec3, bool)> = world
        .query::<(Entity, &RailConfig, &MovementIntent, &RailAttachment)>()
        .iter(world)
        .filter(|(_, _, intent, _)| intent.boost_pressed && !intent.boost_pressed_prev)
        .map(|(e, config, intent, attachment)| {
            (e, *config, intent.move_input, attachment.backwards)
        })
        .collect();

    for (entity, config, move_input, backwards) in starters {
        let velocity = B::velocity(world, entity);
        // Boost along the held input, or the facing when the stick is
        // neutral; if that opposes current travel, the grind direction
        // flips with it.
        let direction = move_input
            .try_normalize()
            .unwrap_or_else(|| (B::rotation(world, entity) * Vec3::NEG_Z).normalize_or_zero());
        if direction == Vec3::ZERO {
            continue;
        }
        let opposes = velocity.length_squared() > 0.0 && direction.dot(velocity) < 0.0;
        B::set_velocity(world, entity, direction * config.boost_max_speed);
        if opposes {
            if let Some(mut attachment) = world.get_mut::<RailAttachment>(entity) {
                attachment.backwards = !backwards;
            }
        }
        // Reinsert: a fresh timer replaces any pending revert.
        let position = B::position(world, entity);
        world
            .entity_mut(entity)
            .insert(RailBoost::new(config.boost_duration));
        world.send_event(PlaySpatialSound {
            source: entity,
            kind: SoundKind::RailBoost,
            position,
        });
    }
}

/// The per-tick grind update: jump-off, speed integration, advancing the
/// arc distance, and end-of-rail handling.
pub fn update_grind<B: SpatialQueryBackend>(world: &mut World) {
    let dt = B::fixed_timestep(world);
    let characters: Vec<(Entity, RailConfig, RailAttachment, bool)> = world
        .query::<(Entity, &RailConfig, &RailAttachment, Has<RailBoost>)>()
        .iter(world)
        .map(|(e, config, attachment, boosted)| (e, *config, *attachment, boosted))
        .collect();

    for (entity, config, attachment, boosted) in characters {
        let Some(rail) = world.get::<GrindRail>(attachment.rail) else {
            // Attachment invariantly implies a live rail.
            debug_assert!(false, "rail attachment to a missing rail");
            detach::<B>(world, entity, attachment.rail, &config);
            continue;
        };
        let spline = rail.spline.clone();

        // Jump-off consumes the buffered jump before anything else.
        let jumped = world
            .get_mut::<MovementIntent>(entity)
            .map(|mut intent| intent.take_jump_request().is_some())
            .unwrap_or(false);
        if jumped {
            jump_off_rail::<B>(world, entity, &spline, &attachment, &config);
            continue;
        }

        let max_speed = if boosted {
            config.boost_max_speed
        } else {
            config.max_rail_speed
        };

        let velocity = B::velocity(world, entity);
        let mut backwards = attachment.backwards;
        let mut speed = velocity.length();
        let tangent = spline.tangent_at_distance(attachment.distance);
        let travel = if backwards { -tangent } else { tangent };

        // Downhill feeds the grind, uphill bleeds it.
        speed -= travel.y * config.acceleration_multiplier;
        if speed < LOW_SPEED_FLIP_THRESHOLD {
            backwards = !backwards;
            speed = LOW_SPEED_FLIP_THRESHOLD;
        }
        speed = speed.clamp(0.0, max_speed);
        let travel = if backwards { -tangent } else { tangent };
        B::set_velocity(world, entity, travel * speed);

        let advance = speed * dt * pitch_advance_weight(travel.y);
        let raw_distance = attachment.distance + if backwards { -advance } else { advance };

        let length = spline.total_length();
        let past_end = raw_distance < 0.0 || raw_distance > length;
        if past_end && !spline.is_closed() {
            // Open end: launch forward at current speed and let physics
            // take it from there.
            detach::<B>(world, entity, attachment.rail, &config);
            continue;
        }
        // The wrap on a closed loop maps onto the opposite end; an open
        // rail can't reach here out of range.
        let new_distance = spline.normalize_distance(raw_distance);

        let up = spline.up_at_distance(new_distance);
        B::set_position(
            world,
            entity,
            spline.location_at_distance(new_distance) + up * config.rail_offset,
        );
        B::set_rotation(world, entity, rail_frame(&spline, new_distance, backwards));

        if let Some(mut stored) = world.get_mut::<RailAttachment>(entity) {
            stored.distance = new_distance;
            stored.backwards = backwards;
        }
    }
}

/// Launch off the rail from a jump input.
fn jump_off_rail<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    spline: &RailSpline,
    attachment: &RailAttachment,
    config: &RailConfig,
) {
    let velocity = B::velocity(world, entity);
    let up = spline.up_at_distance(attachment.distance);
    let horizontal = velocity - up * velocity.dot(up);
    let launch = -horizontal + up * config.jump_height;
    B::set_velocity(world, entity, launch);

    remove_attachment::<B>(world, entity, attachment.rail, config, MovementMode::Falling);
    let position = B::position(world, entity);
    world.send_event(RailJumpedOff {
        character: entity,
        rail: attachment.rail,
    });
    world.send_event(PlaySpatialSound {
        source: entity,
        kind: SoundKind::RailJump,
        position,
    });
    debug!("jumped off rail {:?}", attachment.rail);
}

/// Detach at an open rail end, keeping the current velocity as the
/// forward launch.
fn detach<B: SpatialQueryBackend>(world: &mut World, entity: Entity, rail: Entity, config: &RailConfig) {
    remove_attachment::<B>(world, entity, rail, config, MovementMode::Walking);
    world.send_event(RailExited {
        character: entity,
        rail,
    });
    debug!("detached from rail {rail:?}");
}

/// Shared exit path: restore gravity and movement mode, drop the
/// attachment, and suppress re-entry against the same rail briefly.
fn remove_attachment<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    rail: Entity,
    config: &RailConfig,
    mode: MovementMode,
) {
    B::set_gravity_scale(world, entity, 1.0);
    if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
        motion.movement_mode = mode;
    }
    world
        .entity_mut(entity)
        .remove::<(RailAttachment, RailBoost)>()
        .insert(RailCooldown {
            rail,
            timer: Timer::from_seconds(config.reentry_cooldown, TimerMode::Once),
        });
}

/// Lateral sweeps for switchable rails on either side.
pub fn detect_side_rails<B: SpatialQueryBackend>(world: &mut World) {
    // Off-rail: clear candidates and re-enable switching.
    let idle: Vec<Entity> = world
        .query_filtered::<Entity, (With<RailSwitchState>, Without<RailAttachment>)>()
        .iter(world)
        .collect();
    for entity in idle {
        if let Some(mut state) = world.get_mut::<RailSwitchState>(entity) {
            state.left = None;
            state.right = None;
            state.can_switch = true;
        }
    }

    let grinding: Vec<(Entity, RailConfig, Entity)> = world
        .query::<(Entity, &RailConfig, &RailAttachment, &RailSwitchState)>()
        .iter(world)
        .map(|(e, config, attachment, _)| (e, *config, attachment.rail))
        .collect();

    for (entity, config, current_rail) in grinding {
        let position = B::position(world, entity);
        let right = B::rotation(world, entity) * Vec3::X;
        let velocity = B::velocity(world, entity);

        let mut sides = [None, None];
        for (slot, direction) in sides.iter_mut().zip([right, -right]) {
            let hit = B::sphere_sweep(
                world,
                position,
                direction,
                config.side_probe_distance,
                config.side_probe_radius,
                entity,
                &[current_rail],
            );
            *slot = hit.and_then(|hit| {
                let rail = hit.entity?;
                if rail == current_rail || world.get::<GrindRail>(rail).is_none() {
                    return None;
                }
                Some(SideRailCandidate {
                    rail,
                    impact_point: hit.point,
                    target_point: hit.point - velocity,
                })
            });
        }

        if let Some(mut state) = world.get_mut::<RailSwitchState>(entity) {
            state.right = sides[0];
            state.left = sides[1];
        }
    }
}

/// Perform a requested switch onto a detected side rail.
pub fn apply_rail_switch<B: SpatialQueryBackend>(world: &mut World) {
    let requests: Vec<(Entity, RailConfig, SideRailCandidate)> = world
        .query::<(
            Entity,
            &RailConfig,
            &RailAttachment,
            &RailSwitchState,
            &MovementIntent,
        )>()
        .iter(world)
        .filter_map(|(e, config, _, state, intent)| {
            if !state.can_switch {
                return None;
            }
            let side = intent.switch_rail?;
            let candidate = state.candidate(side)?;
            Some((e, *config, candidate))
        })
        .collect();

    for (entity, config, candidate) in requests {
        let Some(rail) = world.get::<GrindRail>(candidate.rail) else {
            continue;
        };
        let Some(distance) = rail.spline.closest_distance_to(candidate.target_point) else {
            continue;
        };

        attach_to_rail::<B>(world, entity, candidate.rail, distance, &config);
        if let Some(mut state) = world.get_mut::<RailSwitchState>(entity) {
            state.can_switch = false;
            state.left = None;
            state.right = None;
        }
        debug!("switched to rail {:?}", candidate.rail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_weight_endpoints() {
        assert!((pitch_advance_weight(-1.0) - 1.15).abs() < 1e-6);
        assert!((pitch_advance_weight(1.0) - 0.55).abs() < 1e-6);
        assert!((pitch_advance_weight(0.0) - 0.85).abs() < 1e-6);
    }

    #[test]
    fn pitch_weight_clamps_out_of_range() {
        assert_eq!(pitch_advance_weight(-5.0), pitch_advance_weight(-1.0));
        assert_eq!(pitch_advance_weight(5.0), pitch_advance_weight(1.0));
    }

    #[test]
    fn downhill_advances_faster_than_uphill() {
        assert!(pitch_advance_weight(-0.5) > pitch_advance_weight(0.5));
    }

    #[test]
    fn rail_frame_flips_when_backwards() {
        let spline = RailSpline::new([Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0)], false);
        let forward = rail_frame(&spline, 50.0, false) * Vec3::NEG_Z;
        let backward = rail_frame(&spline, 50.0, true) * Vec3::NEG_Z;
        assert!((forward - Vec3::X).length() < 1e-4);
        assert!((backward - Vec3::NEG_X).length() < 1e-4);
    }

    #[test]
    fn grind_rail_builder() {
        let rail = GrindRail::new(RailSpline::default()).with_min_grind_speed(800.0);
        assert_eq!(rail.min_grind_speed, 800.0);
    }

    #[test]
    fn switch_state_candidate_lookup() {
        let candidate = SideRailCandidate {
            rail: Entity::PLACEHOLDER,
            impact_point: Vec3::ZERO,
            target_point: Vec3::ZERO,
        };
        let state = RailSwitchState {
            left: Some(candidate),
            right: None,
            can_switch: true,
        };
        assert!(state.candidate(RailSide::Left).is_some());
        assert!(state.candidate(RailSide::Right).is_none());
    }
}
