//! Homing attack: target lock-on, the airborne dash, and the homing dash
//! itself.
//!
//! Target selection runs every airborne tick: a volumetric query at the
//! homing radius, filtered to [`Attackable`] entities, nearest by squared
//! distance, then gated by the forward view angle. The state machine is
//! reentrant per tick and only emits icon/sound events on transitions, so
//! the external UI never sees duplicate show/hide calls for an unchanged
//! lock.

use bevy::prelude::*;

use crate::backend::SpatialQueryBackend;
use crate::config::{CharacterMotion, HomingConfig, MovementMode};
use crate::events::{
    HideHomingIcon, PlaySpatialSound, ShowHomingIcon, SoundKind, TargetDestroyed,
};
use crate::intent::MovementIntent;
use crate::rail::RailAttachment;

/// Sphere radius used for the blocking sweep while homing.
const HOMING_SWEEP_RADIUS: f32 = 10.0;

/// What a homing hit does to the target.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetKind {
    /// Destructible; a hit destroys it and pops the character upward.
    #[default]
    Enemy,
    /// Lock-on-able but indestructible (springs, grapple points). A hit
    /// merely stops the dash.
    Gimmick,
}

/// Tag making an entity a valid homing target.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Attackable {
    pub kind: TargetKind,
}

impl Attackable {
    pub fn enemy() -> Self {
        Self {
            kind: TargetKind::Enemy,
        }
    }

    pub fn gimmick() -> Self {
        Self {
            kind: TargetKind::Gimmick,
        }
    }
}

/// Phases of the attack state machine.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HomingPhase {
    /// No lock, no dash in flight.
    #[default]
    Idle,
    /// A target is locked; a jump input starts the homing dash.
    Locked,
    /// The no-target forward dash launched this tick.
    Dashing,
    /// Moving toward the locked target with gravity suppressed.
    Homing,
    /// Dash spent; waiting for a landing to re-arm.
    Cooldown,
}

/// Attack state for a character.
///
/// `target` is a non-owning handle; existence is checked every tick and a
/// despawned target aborts the dash.
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct HomingAttack {
    pub phase: HomingPhase,
    pub target: Option<Entity>,
    /// Whether the airborne dash is currently available.
    pub can_dash: bool,
}

impl Default for HomingAttack {
    fn default() -> Self {
        Self {
            phase: HomingPhase::Idle,
            target: None,
            can_dash: true,
        }
    }
}

impl HomingAttack {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the homing dash is steering the body.
    #[inline]
    pub fn is_homing(&self) -> bool {
        self.phase == HomingPhase::Homing
    }
}

/// Step linearly from `current` toward `target` without overshooting.
pub(crate) fn move_towards(current: Vec3, target: Vec3, max_step: f32) -> Vec3 {
    let delta = target - current;
    let distance = delta.length();
    if distance <= max_step || distance <= f32::EPSILON {
        target
    } else {
        current + delta / distance * max_step
    }
}

/// Best-effort world position of a (possibly non-physics) target entity.
fn target_position(world: &World, entity: Entity) -> Option<Vec3> {
    if let Some(global) = world.get::<GlobalTransform>(entity) {
        return Some(global.translation());
    }
    world.get::<Transform>(entity).map(|t| t.translation)
}

/// Acquire, retain, or drop the homing lock.
///
/// Only airborne characters in the Idle or Locked phases scan; grounding
/// or grinding drops the lock. Lock changes fire hide-then-show icon
/// events plus a lock-on sound, and nothing when the lock is unchanged.
pub fn update_target_lock<B: SpatialQueryBackend>(world: &mut World) {
    let characters: Vec<(Entity, HomingConfig, HomingPhase, Option<Entity>, bool, bool)> = world
        .query::<(
            Entity,
            &HomingConfig,
            &HomingAttack,
            &CharacterMotion,
            Has<RailAttachment>,
        )>()
        .iter(world)
        .map(|(e, config, attack, motion, attached)| {
            (
                e,
                *config,
                attack.phase,
                attack.target,
                motion.is_grounded(),
                attached,
            )
        })
        .collect();

    for (entity, config, phase, previous, grounded, attached) in characters {
        let scanning = matches!(phase, HomingPhase::Idle | HomingPhase::Locked);
        if !scanning {
            continue;
        }

        let selected = if grounded || attached {
            None
        } else {
            select_target::<B>(world, entity, &config)
        };

        if selected == previous {
            continue;
        }

        let position = B::position(world, entity);
        if let Some(old) = previous {
            world.send_event(HideHomingIcon { target: old });
        }
        if let Some(new) = selected {
            world.send_event(ShowHomingIcon { target: new });
            world.send_event(PlaySpatialSound {
                source: entity,
                kind: SoundKind::LockOn,
                position,
            });
            debug!("homing lock acquired: {new:?}");
        }

        if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
            attack.target = selected;
            attack.phase = if selected.is_some() {
                HomingPhase::Locked
            } else {
                HomingPhase::Idle
            };
        }
    }
}

/// Nearest attackable entity inside radius and view angle, or `None`.
///
/// Ties between equidistant candidates break by query order, which is
/// backend-defined and not stability-guaranteed.
fn select_target<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    config: &HomingConfig,
) -> Option<Entity> {
    let position = B::position(world, entity);
    let forward = B::rotation(world, entity) * Vec3::NEG_Z;
    let candidates = B::sphere_overlap(world, position, config.radius, entity);

    let mut best: Option<(Entity, f32)> = None;
    for candidate in candidates {
        if world.get::<Attackable>(candidate).is_none() {
            continue;
        }
        let Some(target_pos) = target_position(world, candidate) else {
            continue;
        };
        let to_target = target_pos - position;
        let distance_sq = to_target.length_squared();
        if distance_sq > config.radius * config.radius {
            continue;
        }
        let Some(dir) = to_target.try_normalize() else {
            continue;
        };
        // Inclusive at the threshold: a target exactly at the view angle
        // still locks.
        let angle = forward.dot(dir).clamp(-1.0, 1.0).acos().to_degrees();
        if angle > config.min_view_angle_deg {
            continue;
        }
        if best.is_none_or(|(_, best_sq)| distance_sq < best_sq) {
            best = Some((candidate, distance_sq));
        }
    }
    best.map(|(e, _)| e)
}

/// Drive the attack state machine: dash starts, the homing approach, and
/// cooldown re-arming.
pub fn update_attack<B: SpatialQueryBackend>(world: &mut World) {
    let characters: Vec<Entity> = world
        .query_filtered::<Entity, (With<HomingAttack>, With<HomingConfig>, With<CharacterMotion>)>()
        .iter(world)
        .collect();

    for entity in characters {
        // The rail systems own jump input while grinding.
        if world.get::<RailAttachment>(entity).is_some() {
            continue;
        }
        let Some(attack) = world.get::<HomingAttack>(entity) else {
            continue;
        };
        let phase = attack.phase;
        let target = attack.target;
        let can_dash = attack.can_dash;
        let Some(config) = world.get::<HomingConfig>(entity).copied() else {
            continue;
        };
        let Some(motion) = world.get::<CharacterMotion>(entity) else {
            continue;
        };
        let grounded = motion.is_grounded();

        match phase {
            HomingPhase::Homing => {
                update_homing_motion::<B>(world, entity, target, &config);
            }
            HomingPhase::Dashing => {
                // The launch fired last tick; spend the dash.
                if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
                    attack.phase = HomingPhase::Cooldown;
                }
            }
            HomingPhase::Cooldown => {
                if grounded {
                    if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
                        attack.phase = HomingPhase::Idle;
                        attack.can_dash = true;
                    }
                }
            }
            HomingPhase::Locked => {
                if take_jump(world, entity) {
                    start_homing::<B>(world, entity, target, &config);
                }
            }
            HomingPhase::Idle => {
                if !grounded && can_dash && take_jump(world, entity) {
                    start_dash::<B>(world, entity, &config);
                }
            }
        }
    }
}

/// Consume the buffered jump request if one is pending.
fn take_jump(world: &mut World, entity: Entity) -> bool {
    world
        .get_mut::<MovementIntent>(entity)
        .map(|mut intent| intent.take_jump_request().is_some())
        .unwrap_or(false)
}

fn start_homing<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    target: Option<Entity>,
    _config: &HomingConfig,
) {
    let Some(target) = target else {
        debug_assert!(false, "locked phase without a target");
        return;
    };
    let Some(target_pos) = target_position(world, target) else {
        // Target vanished between lock and jump; drop the lock.
        abort_homing::<B>(world, entity, Some(target));
        return;
    };

    let position = B::position(world, entity);
    if let Some(dir) = (target_pos - position).try_normalize() {
        let facing = Transform::default().looking_to(dir, Vec3::Y).rotation;
        B::set_rotation(world, entity, facing);
    }
    B::set_gravity_scale(world, entity, 0.0);
    world.send_event(PlaySpatialSound {
        source: entity,
        kind: SoundKind::Homing,
        position,
    });
    if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
        motion.movement_mode = MovementMode::Flying;
    }
    if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
        attack.phase = HomingPhase::Homing;
    }
    debug!("homing dash started toward {target:?}");
}

fn start_dash<B: SpatialQueryBackend>(world: &mut World, entity: Entity, config: &HomingConfig) {
    let position = B::position(world, entity);
    let forward = B::rotation(world, entity) * Vec3::NEG_Z;
    B::set_velocity(world, entity, forward * config.dash_speed());
    world.send_event(PlaySpatialSound {
        source: entity,
        kind: SoundKind::Dash,
        position,
    });
    if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
        attack.phase = HomingPhase::Dashing;
        attack.can_dash = false;
    }
}

/// One tick of the homing approach.
fn update_homing_motion<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    target: Option<Entity>,
    config: &HomingConfig,
) {
    let Some(target) = target else {
        debug_assert!(false, "homing phase without a target");
        abort_homing::<B>(world, entity, None);
        return;
    };
    let Some(target_pos) = target_position(world, target) else {
        abort_homing::<B>(world, entity, None);
        return;
    };

    let position = B::position(world, entity);
    let to_target = target_pos - position;
    let distance = to_target.length();

    if distance <= config.min_threshold {
        finish_homing::<B>(world, entity, target, config);
        return;
    }

    // Abort if geometry blocks the path this tick.
    if let Some(dir) = to_target.try_normalize() {
        let step = config.speed.min(distance);
        if let Some(hit) = B::sphere_sweep(
            world,
            position,
            dir,
            step,
            HOMING_SWEEP_RADIUS,
            entity,
            &[target],
        ) {
            if hit.entity != Some(target) {
                abort_homing::<B>(world, entity, Some(target));
                return;
            }
        }
    }

    let next = move_towards(position, target_pos, config.speed);
    B::set_position(world, entity, next);
    B::set_velocity(world, entity, Vec3::ZERO);
}

/// Terminal handling for a reached target.
fn finish_homing<B: SpatialQueryBackend>(
    world: &mut World,
    entity: Entity,
    target: Entity,
    config: &HomingConfig,
) {
    let kind = world.get::<Attackable>(target).map(|a| a.kind);
    restore_free_movement::<B>(world, entity);

    match kind {
        Some(TargetKind::Enemy) => {
            let up = B::rotation(world, entity) * Vec3::Y;
            B::set_velocity(world, entity, up * config.up_force);
            world.send_event(TargetDestroyed { target, by: entity });
            world.send_event(HideHomingIcon { target });
            if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
                attack.phase = HomingPhase::Idle;
                attack.target = None;
                // An enemy bounce re-arms the dash for chaining.
                attack.can_dash = true;
            }
            debug!("homing hit destroyed {target:?}");
        }
        _ => {
            B::set_velocity(world, entity, Vec3::ZERO);
            world.send_event(HideHomingIcon { target });
            if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
                attack.phase = HomingPhase::Idle;
                attack.target = None;
            }
        }
    }
}

/// Identical restore path for a despawned target or a blocked sweep.
fn abort_homing<B: SpatialQueryBackend>(world: &mut World, entity: Entity, target: Option<Entity>) {
    restore_free_movement::<B>(world, entity);
    if let Some(target) = target {
        world.send_event(HideHomingIcon { target });
    }
    if let Some(mut attack) = world.get_mut::<HomingAttack>(entity) {
        attack.phase = HomingPhase::Idle;
        attack.target = None;
    }
    debug!("homing dash aborted");
}

fn restore_free_movement<B: SpatialQueryBackend>(world: &mut World, entity: Entity) {
    B::set_gravity_scale(world, entity, 1.0);
    if let Some(mut motion) = world.get_mut::<CharacterMotion>(entity) {
        motion.movement_mode = MovementMode::Falling;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_towards_steps_without_overshoot() {
        let target = Vec3::new(1000.0, 0.0, 0.0);
        let mut position = Vec3::ZERO;
        let mut last_distance = position.distance(target);
        for _ in 0..200 {
            position = move_towards(position, target, 10.0);
            let distance = position.distance(target);
            assert!(distance <= last_distance);
            last_distance = distance;
        }
        // 200 steps of 10 covers 2000 units; we must be exactly there.
        assert_eq!(position, target);
    }

    #[test]
    fn move_towards_snaps_within_step() {
        let next = move_towards(Vec3::ZERO, Vec3::new(3.0, 0.0, 0.0), 10.0);
        assert_eq!(next, Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn approach_from_1000_terminates_at_threshold() {
        // Start 1000 units out, 10 units per tick, stop threshold 100:
        // termination triggers once distance <= 100, never negative.
        let target = Vec3::new(1000.0, 0.0, 0.0);
        let mut position = Vec3::ZERO;
        let mut ticks = 0;
        while position.distance(target) > 100.0 {
            position = move_towards(position, target, 10.0);
            ticks += 1;
            assert!(ticks < 1000, "did not terminate");
        }
        let final_distance = position.distance(target);
        assert!(final_distance <= 100.0);
        assert!(final_distance >= 0.0);
        assert_eq!(ticks, 90);
    }

    #[test]
    fn attackable_presets() {
        assert_eq!(Attackable::enemy().kind, TargetKind::Enemy);
        assert_eq!(Attackable::gimmick().kind, TargetKind::Gimmick);
    }

    #[test]
    fn default_attack_is_idle_and_armed() {
        let attack = HomingAttack::new();
        assert_eq!(attack.phase, HomingPhase::Idle);
        assert!(attack.target.is_none());
        assert!(attack.can_dash);
    }
}
