//! Rapier-backed character body driven by the floating-capsule motor.
//!
//! The body is a rotation-locked dynamic rigid body with gravity disabled; the motor
//! owns vertical motion and commits a linear velocity every fixed step. Contacts from
//! the narrow phase are forwarded to the motor before each step.
#![forbid(unsafe_code)]

use character_motor::{
    CastHit, CharacterMotor, Collision, ColliderGeometry, ContactPoint, GroundInfo, LayerMask,
    MotorBody, MotorConfig, MotorDebugSink, MotorStepOutput, ShapeCaster, SurfaceRef,
};
use physics_rapier::PhysicsWorld;
use rapier3d::math::{Isometry, Point, Vector};
use rapier3d::parry::query::{RayCast, ShapeCastOptions};
use rapier3d::prelude::{
    Ball, Collider, ColliderBuilder, ColliderHandle, Group, InteractionGroups, QueryFilter, Ray,
    Real, RigidBodyBuilder, RigidBodyHandle, SharedShape,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, PartialEq)]
pub enum CharacterBodyError {
    #[error("delta time must be finite and positive, got {0}")]
    InvalidDeltaTime(Real),
    #[error("character rigid body {0:?} is not in the physics world")]
    MissingBody(RigidBodyHandle),
    #[error("character collider {0:?} is not in the physics world")]
    MissingCollider(ColliderHandle),
}

/// Motor host over a [`PhysicsWorld`] for one character body.
///
/// Queries skip every collider attached to the character's own body.
pub struct RapierHost<'w> {
    world: &'w mut PhysicsWorld,
    body: RigidBodyHandle,
}

impl<'w> RapierHost<'w> {
    pub fn new(world: &'w mut PhysicsWorld, body: RigidBodyHandle) -> Self {
        Self { world, body }
    }

    fn filter(&self, layers: LayerMask) -> QueryFilter<'static> {
        QueryFilter::default()
            .exclude_sensors()
            .exclude_rigid_body(self.body)
            .groups(InteractionGroups::new(
                Group::ALL,
                Group::from_bits_truncate(layers.bits()),
            ))
    }
}

impl ShapeCaster for RapierHost<'_> {
    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layers: LayerMask,
    ) -> Option<CastHit> {
        let ray = Ray::new(origin, direction);
        let (surface, hit) = self.world.query_pipeline().cast_ray_and_get_normal(
            self.world.bodies(),
            self.world.colliders(),
            &ray,
            max_distance,
            true,
            self.filter(layers),
        )?;
        Some(CastHit {
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            surface,
        })
    }

    fn cast_sphere(
        &self,
        origin: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
        layers: LayerMask,
    ) -> Option<CastHit> {
        let shape = Ball::new(radius);
        let shape_pos = Isometry::translation(origin.x, origin.y, origin.z);
        let (surface, hit) = self.world.query_pipeline().cast_shape(
            self.world.bodies(),
            self.world.colliders(),
            &shape_pos,
            &direction,
            &shape,
            ShapeCastOptions::with_max_time_of_impact(max_distance),
            self.filter(layers),
        )?;
        Some(CastHit {
            point: hit.witness1,
            normal: hit.normal1.into_inner(),
            surface,
        })
    }

    fn cast_ray_against(
        &self,
        surface: SurfaceRef,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Option<CastHit> {
        let collider = self.world.colliders().get(surface)?;
        let ray = Ray::new(origin, direction);
        let hit = collider
            .shape()
            .cast_ray_and_get_normal(collider.position(), &ray, max_distance, true)?;
        Some(CastHit {
            point: ray.point_at(hit.time_of_impact),
            normal: hit.normal,
            surface,
        })
    }

    fn surface_position(&self, surface: SurfaceRef) -> Option<Vector<Real>> {
        self.world
            .colliders()
            .get(surface)
            .map(|collider| collider.position().translation.vector)
    }
}

impl MotorBody for RapierHost<'_> {
    fn position(&self) -> Vector<Real> {
        self.world
            .bodies()
            .get(self.body)
            .map(|body| *body.translation())
            .unwrap_or_else(Vector::zeros)
    }

    fn velocity(&self) -> Vector<Real> {
        self.world
            .bodies()
            .get(self.body)
            .map(|body| *body.linvel())
            .unwrap_or_else(Vector::zeros)
    }

    fn set_velocity(&mut self, velocity: Vector<Real>) {
        if let Some(body) = self.world.bodies_mut().get_mut(self.body) {
            body.set_linvel(velocity, true);
        }
    }

    fn move_position(&mut self, delta: Vector<Real>) {
        if let Some(body) = self.world.bodies_mut().get_mut(self.body) {
            let translation = *body.translation();
            body.set_translation(translation + delta, true);
        }
    }
}

fn capsule_collider(geometry: &ColliderGeometry) -> Collider {
    ColliderBuilder::capsule_y(geometry.capsule_half_segment(), geometry.radius)
        .translation(geometry.center_offset)
        .friction(0.0)
        .build()
}

pub struct CharacterBody {
    body: RigidBodyHandle,
    collider: ColliderHandle,
    motor: CharacterMotor,
}

impl CharacterBody {
    /// Inserts the body and its capsule with the feet at `position`.
    pub fn spawn(world: &mut PhysicsWorld, motor: CharacterMotor, position: Vector<Real>) -> Self {
        let body = world.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(position)
                .lock_rotations()
                .gravity_scale(0.0)
                .ccd_enabled(true)
                .build(),
        );
        let collider = world.insert_collider_with_parent(capsule_collider(motor.geometry()), body);
        let geometry = motor.geometry();
        info!(
            target: "character_body",
            height = geometry.height as f64,
            radius = geometry.radius as f64,
            step_height = geometry.step_height as f64,
            "spawned character body"
        );
        Self {
            body,
            collider,
            motor,
        }
    }

    pub fn body(&self) -> RigidBodyHandle {
        self.body
    }

    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }

    pub fn motor(&self) -> &CharacterMotor {
        &self.motor
    }

    pub fn motor_mut(&mut self) -> &mut CharacterMotor {
        &mut self.motor
    }

    pub fn position(&self, world: &PhysicsWorld) -> Result<Vector<Real>, CharacterBodyError> {
        world
            .bodies()
            .get(self.body)
            .map(|body| *body.translation())
            .ok_or(CharacterBodyError::MissingBody(self.body))
    }

    /// Linear velocity of the body after the last physics step, collisions included.
    pub fn velocity(&self, world: &PhysicsWorld) -> Result<Vector<Real>, CharacterBodyError> {
        world
            .bodies()
            .get(self.body)
            .map(|body| *body.linvel())
            .ok_or(CharacterBodyError::MissingBody(self.body))
    }

    pub fn speed(&self, world: &PhysicsWorld) -> Result<Real, CharacterBodyError> {
        Ok(self.velocity(world)?.norm())
    }

    pub fn direction(&self, world: &PhysicsWorld) -> Result<Vector<Real>, CharacterBodyError> {
        Ok(self
            .velocity(world)?
            .try_normalize(Real::EPSILON)
            .unwrap_or_else(Vector::zeros))
    }

    fn check_handles(&self, world: &PhysicsWorld) -> Result<(), CharacterBodyError> {
        if world.bodies().get(self.body).is_none() {
            return Err(CharacterBodyError::MissingBody(self.body));
        }
        if world.colliders().get(self.collider).is_none() {
            return Err(CharacterBodyError::MissingCollider(self.collider));
        }
        Ok(())
    }

    /// Queues the current narrow-phase contacts of the capsule on the motor.
    /// Returns the number of collisions accepted.
    pub fn gather_contacts(&mut self, world: &PhysicsWorld) -> usize {
        let mut accepted = 0;
        for group in world.contacts_with(self.collider) {
            let contacts = group
                .points
                .into_iter()
                .map(|(point, normal)| ContactPoint { point, normal })
                .collect();
            if self.motor.push_collision(Collision::new(Some(group.other), contacts)) {
                accepted += 1;
            }
        }
        accepted
    }

    /// Runs one motor step. Call before stepping the physics world.
    pub fn step(
        &mut self,
        world: &mut PhysicsWorld,
        dt: Real,
    ) -> Result<MotorStepOutput, CharacterBodyError> {
        self.prepare_step(world, dt)?;
        let mut host = RapierHost::new(world, self.body);
        Ok(self.motor.step(&mut host, dt))
    }

    pub fn step_observed(
        &mut self,
        world: &mut PhysicsWorld,
        dt: Real,
        sink: &mut dyn MotorDebugSink,
    ) -> Result<MotorStepOutput, CharacterBodyError> {
        self.prepare_step(world, dt)?;
        let mut host = RapierHost::new(world, self.body);
        Ok(self.motor.step_observed(&mut host, dt, sink))
    }

    fn prepare_step(&mut self, world: &PhysicsWorld, dt: Real) -> Result<(), CharacterBodyError> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(CharacterBodyError::InvalidDeltaTime(dt));
        }
        self.check_handles(world)?;
        self.gather_contacts(world);
        Ok(())
    }

    pub fn move_by_delta(
        &self,
        world: &mut PhysicsWorld,
        delta: Vector<Real>,
        align_to_ground: bool,
        restrict_to_ground: bool,
    ) -> Result<bool, CharacterBodyError> {
        self.check_handles(world)?;
        let mut host = RapierHost::new(world, self.body);
        Ok(self
            .motor
            .move_by_delta(&mut host, delta, align_to_ground, restrict_to_ground))
    }

    pub fn probe_ground(
        &self,
        world: &mut PhysicsWorld,
        offset: Vector<Real>,
        use_refined_normal: bool,
    ) -> Result<GroundInfo, CharacterBodyError> {
        self.check_handles(world)?;
        let host = RapierHost::new(world, self.body);
        Ok(self.motor.probe_ground(&host, offset, use_refined_normal))
    }

    /// Applies a new motor configuration and resizes the capsule to match.
    pub fn reconfigure(
        &mut self,
        world: &mut PhysicsWorld,
        config: MotorConfig,
    ) -> Result<(), CharacterBodyError> {
        self.check_handles(world)?;
        self.motor.configure(config);
        let geometry = *self.motor.geometry();
        let collider = world
            .colliders_mut()
            .get_mut(self.collider)
            .ok_or(CharacterBodyError::MissingCollider(self.collider))?;
        collider.set_shape(SharedShape::capsule_y(
            geometry.capsule_half_segment(),
            geometry.radius,
        ));
        collider.set_translation_wrt_parent(geometry.center_offset);
        debug!(
            target: "character_body",
            height = geometry.height as f64,
            radius = geometry.radius as f64,
            "resized character capsule"
        );
        Ok(())
    }
}
