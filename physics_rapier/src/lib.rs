//! Rapier world ownership and the queries character bodies run against it.
#![forbid(unsafe_code)]

use rapier3d::prelude::*;

/// Contact points between one collider and a single other collider, with normals
/// pointing towards the queried collider.
#[derive(Clone, Debug, PartialEq)]
pub struct ContactGroup {
    pub other: ColliderHandle,
    pub points: Vec<(Point<Real>, Vector<Real>)>,
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseMultiSap,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
}

impl PhysicsWorld {
    pub fn new(gravity: Vector<Real>) -> Self {
        Self {
            gravity,
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseMultiSap::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    pub fn bodies(&self) -> &RigidBodySet {
        &self.bodies
    }

    pub fn bodies_mut(&mut self) -> &mut RigidBodySet {
        &mut self.bodies
    }

    pub fn colliders(&self) -> &ColliderSet {
        &self.colliders
    }

    pub fn colliders_mut(&mut self) -> &mut ColliderSet {
        &mut self.colliders
    }

    pub fn narrow_phase(&self) -> &NarrowPhase {
        &self.narrow_phase
    }

    pub fn query_pipeline(&self) -> &QueryPipeline {
        &self.query_pipeline
    }

    pub fn step(&mut self, dt: Real) {
        self.integration_parameters.dt = dt;
        let physics_hooks = ();
        let event_handler = ();
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            Some(&mut self.query_pipeline),
            &physics_hooks,
            &event_handler,
        );
        self.query_pipeline.update(&self.colliders);
    }

    /// Refreshes query acceleration structures without advancing the simulation.
    pub fn update_queries(&mut self) {
        self.query_pipeline.update(&self.colliders);
    }

    pub fn insert_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.colliders.insert(collider)
    }

    pub fn insert_body(&mut self, body: RigidBody) -> RigidBodyHandle {
        self.bodies.insert(body)
    }

    pub fn insert_collider_with_parent(
        &mut self,
        collider: Collider,
        parent: RigidBodyHandle,
    ) -> ColliderHandle {
        self.colliders
            .insert_with_parent(collider, parent, &mut self.bodies)
    }

    /// Inserts a position-driven kinematic body carrying `collider`.
    pub fn insert_kinematic_platform(
        &mut self,
        collider: Collider,
        translation: Vector<Real>,
    ) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(translation)
            .build();
        let body = self.insert_body(body);
        let collider = self.insert_collider_with_parent(collider, body);
        (body, collider)
    }

    /// Schedules a kinematic body to reach `translation` on the next step.
    pub fn set_kinematic_translation(
        &mut self,
        handle: RigidBodyHandle,
        translation: Vector<Real>,
    ) -> bool {
        let Some(body) = self.bodies.get_mut(handle) else {
            return false;
        };
        body.set_next_kinematic_translation(translation);
        true
    }

    pub fn remove_body(&mut self, handle: RigidBodyHandle) -> Option<RigidBody> {
        self.bodies.remove(
            handle,
            &mut self.island_manager,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        )
    }

    /// Active contacts touching `collider`, grouped by the other collider.
    pub fn contacts_with(&self, collider: ColliderHandle) -> Vec<ContactGroup> {
        let mut groups = Vec::new();
        for pair in self.narrow_phase.contact_pairs_with(collider) {
            if !pair.has_any_active_contact {
                continue;
            }
            let (other, flip) = if pair.collider1 == collider {
                (pair.collider2, true)
            } else {
                (pair.collider1, false)
            };
            let mut points = Vec::new();
            for manifold in &pair.manifolds {
                let normal = if flip {
                    -manifold.data.normal
                } else {
                    manifold.data.normal
                };
                points.extend(
                    manifold
                        .data
                        .solver_contacts
                        .iter()
                        .map(|contact| (contact.point, normal)),
                );
            }
            if !points.is_empty() {
                groups.push(ContactGroup { other, points });
            }
        }
        groups
    }
}
