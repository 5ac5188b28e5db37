//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D. Enable
//! with the `rapier3d` feature (on by default). The host app is expected
//! to add `RapierPhysicsPlugin` itself; this backend only adapts the
//! query and body-accessor surface.

use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::SpatialQueryBackend;
use crate::collision::CollisionData;
use crate::config::{CharacterMotion, ControllerConfig, HomingConfig, RailConfig};
use crate::homing::HomingAttack;
use crate::intent::MovementIntent;

/// Rapier3D physics backend.
///
/// Spatial queries go through `RapierContext`; body state lives in the
/// standard `Velocity`, `GravityScale`, and `Transform` components.
pub struct Rapier3dBackend;

impl SpatialQueryBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn raycast(
        world: &mut World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Entity,
    ) -> Option<CollisionData> {
        let mut state: SystemState<ReadRapierContext> = SystemState::new(world);
        let rapier_context = state.get(world);
        let context = rapier_context.single().ok()?;

        let filter = QueryFilter::default()
            .exclude_rigid_body(exclude)
            .exclude_sensors();
        context
            .cast_ray_and_get_normal(origin, direction, max_distance, true, filter)
            .map(|(hit_entity, intersection)| {
                CollisionData::new(
                    intersection.time_of_impact,
                    intersection.normal,
                    intersection.point,
                    Some(hit_entity),
                )
            })
    }

    fn sphere_sweep(
        world: &mut World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        exclude: Entity,
        ignore: &[Entity],
    ) -> Option<CollisionData> {
        let mut state: SystemState<ReadRapierContext> = SystemState::new(world);
        let rapier_context = state.get(world);
        let context = rapier_context.single().ok()?;

        let predicate = |entity: Entity| !ignore.contains(&entity);
        let filter = QueryFilter::default()
            .exclude_rigid_body(exclude)
            .exclude_sensors()
            .predicate(&predicate);
        let shape = Collider::ball(radius);
        context
            .cast_shape(
                origin,
                Quat::IDENTITY,
                direction,
                &*shape.raw,
                ShapeCastOptions {
                    max_time_of_impact: max_distance,
                    stop_at_penetration: false,
                    ..default()
                },
                filter,
            )
            .map(|(hit_entity, hit)| {
                let normal = hit.details.map(|d| d.normal1).unwrap_or(-direction);
                let point = hit
                    .details
                    .map(|d| d.witness1)
                    .unwrap_or(origin + direction * hit.time_of_impact);
                CollisionData::new(hit.time_of_impact, normal, point, Some(hit_entity))
            })
    }

    fn sphere_overlap(
        world: &mut World,
        center: Vec3,
        radius: f32,
        exclude: Entity,
    ) -> Vec<Entity> {
        let mut state: SystemState<ReadRapierContext> = SystemState::new(world);
        let rapier_context = state.get(world);
        let Ok(context) = rapier_context.single() else {
            return Vec::new();
        };

        let mut hits = Vec::new();
        let shape = Collider::ball(radius);
        context.intersect_shape(
            center,
            Quat::IDENTITY,
            &*shape.raw,
            QueryFilter::default().exclude_rigid_body(exclude),
            |entity| {
                hits.push(entity);
                true
            },
        );
        hits
    }

    fn velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.translation())
            })
            .unwrap_or(Vec3::ZERO)
    }

    fn set_position(world: &mut World, entity: Entity, position: Vec3) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.translation = position;
        }
    }

    fn rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.to_scale_rotation_translation().1)
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat) {
        if let Some(mut transform) = world.get_mut::<Transform>(entity) {
            transform.rotation = rotation;
        }
    }

    fn gravity_scale(world: &World, entity: Entity) -> f32 {
        world.get::<GravityScale>(entity).map(|g| g.0).unwrap_or(1.0)
    }

    fn set_gravity_scale(world: &mut World, entity: Entity, scale: f32) {
        if let Some(mut gravity) = world.get_mut::<GravityScale>(entity) {
            gravity.0 = scale;
        }
    }
}

/// Plugin for the Rapier3D backend.
///
/// Intentionally empty: the query surface runs through `RapierContext`
/// on demand, and the host owns `RapierPhysicsPlugin` setup (timestep
/// mode, gravity, debug rendering).
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, _app: &mut App) {}
}

/// Everything a playable character needs on top of a `Transform`.
#[derive(Bundle)]
pub struct Rapier3dCharacterBundle {
    pub rigid_body: RigidBody,
    pub collider: Collider,
    pub velocity: Velocity,
    pub gravity_scale: GravityScale,
    pub locked_axes: LockedAxes,
    pub ccd: Ccd,
    pub motion: CharacterMotion,
    pub config: ControllerConfig,
    pub homing_config: HomingConfig,
    pub rail_config: RailConfig,
    pub intent: MovementIntent,
    pub attack: HomingAttack,
}

impl Default for Rapier3dCharacterBundle {
    fn default() -> Self {
        Self::new(Collider::capsule_y(40.0, 30.0))
    }
}

impl Rapier3dCharacterBundle {
    pub fn new(collider: Collider) -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            collider,
            velocity: Velocity::zero(),
            gravity_scale: GravityScale(1.0),
            // Orientation is driven by the controller, not the solver.
            locked_axes: LockedAxes::ROTATION_LOCKED,
            ccd: Ccd::enabled(),
            motion: CharacterMotion::default(),
            config: ControllerConfig::default(),
            homing_config: HomingConfig::default(),
            rail_config: RailConfig::default(),
            intent: MovementIntent::default(),
            attack: HomingAttack::default(),
        }
    }

    /// Builder: replace the controller config.
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }
}
