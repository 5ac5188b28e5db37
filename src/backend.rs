//! Physics backend abstraction.
//!
//! This module defines the trait that physics backends must implement to
//! work with the character systems. All spatial queries (raycasts, sphere
//! sweeps, overlap queries) and body accessors go through it, which allows
//! swapping the physics engine (Rapier3D included) or driving the whole
//! pipeline from a deterministic scripted backend in tests.

use bevy::prelude::*;

use crate::collision::CollisionData;

/// Trait for physics backend implementations.
///
/// The character systems are exclusive systems; every method receives the
/// ECS [`World`] and operates on it directly. Queries are synchronous and
/// resolve within the current tick.
///
/// Query misses return `None` and are a normal outcome, never an error.
pub trait SpatialQueryBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Cast a ray and return the first hit.
    ///
    /// `exclude` is the casting character (never self-hit).
    fn raycast(
        world: &mut World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        exclude: Entity,
    ) -> Option<CollisionData>;

    /// Sweep a sphere along a direction and return the first hit.
    ///
    /// `ignore` lists additional entities transparent to this sweep (the
    /// currently grinded rail during side-rail detection, a just-exited
    /// rail during its re-entry cooldown).
    fn sphere_sweep(
        world: &mut World,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        exclude: Entity,
        ignore: &[Entity],
    ) -> Option<CollisionData>;

    /// Collect all entities overlapping a sphere.
    ///
    /// Result ordering is backend-defined and NOT stability-guaranteed;
    /// callers that need determinism must impose their own order.
    fn sphere_overlap(world: &mut World, center: Vec3, radius: f32, exclude: Entity) -> Vec<Entity>;

    /// Get the current linear velocity of a body.
    fn velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of a body.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Get the current world position of a body.
    fn position(world: &World, entity: Entity) -> Vec3;

    /// Set the world position of a body (used while the character is
    /// constrained to a rail or homing toward a target).
    fn set_position(world: &mut World, entity: Entity, position: Vec3);

    /// Get the current world rotation of a body.
    fn rotation(world: &World, entity: Entity) -> Quat;

    /// Set the world rotation of a body.
    fn set_rotation(world: &mut World, entity: Entity, rotation: Quat);

    /// Get the gravity scale of a body (1.0 = full gravity).
    fn gravity_scale(world: &World, entity: Entity) -> f32;

    /// Set the gravity scale of a body. Grinding and homing suppress
    /// gravity by setting this to 0.
    fn set_gravity_scale(world: &mut World, entity: Entity, scale: f32);

    /// Get the fixed timestep delta time.
    fn fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.delta_secs())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}
