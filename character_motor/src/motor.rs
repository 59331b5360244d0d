//! Character motor: runs ground sensing, transitions and velocity integration once per
//! fixed step and commits the result to the host body.

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use tracing::{debug, trace, warn};

use crate::config::MotorConfig;
use crate::contacts::{evaluate_contacts, Collision, CollisionQueue, ContactSummary};
use crate::debug::{
    MotorDebugSink, COLOR_CONTACT, COLOR_CONTACT_FLAT, COLOR_GROUND_PROBE, COLOR_SLOPE,
    COLOR_VELOCITY,
};
use crate::geometry::{ColliderGeometry, GroundThresholds};
use crate::ground_state::{GroundStateTracker, GroundTransition, SurfaceConnection};
use crate::host::{MotorBody, MotorHost, ShapeCaster, SurfaceRef};
use crate::sensor::{self, GroundInfo, ProbeSettings};
use crate::velocity::{
    accumulate_fall_speed, align_to_normal, update_active_velocity, StepCorrection,
};

const CONTACT_NORMAL_DRAW_LENGTH: Real = 0.1;

/// Result of one motor step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorStepOutput {
    /// Velocity committed to the body.
    pub velocity: Vector<Real>,
    /// Floating correction of this step; part of `velocity` when snapping to ground.
    pub step_velocity: Vector<Real>,
    pub is_on_ground: bool,
    pub transition: Option<GroundTransition>,
}

type GroundListener = Box<dyn FnMut(GroundTransition) + Send>;

pub struct CharacterMotor {
    config: MotorConfig,
    geometry: ColliderGeometry,
    thresholds: GroundThresholds,
    tracker: GroundStateTracker,
    connection: SurfaceConnection,
    collisions: CollisionQueue,
    contact_scratch: Vec<Collision>,
    last_contacts: ContactSummary,
    active_velocity: Vector<Real>,
    active_velocity_target: Vector<Real>,
    gravity_speed: Real,
    is_on_ground: bool,
    is_on_flat_ground: bool,
    ground_normal: Vector<Real>,
    ground_point: Point<Real>,
    slope_normal: Vector<Real>,
    ground_step_velocity: Vector<Real>,
    is_touching_ceiling: bool,
    committed_velocity: Vector<Real>,
    listeners: Vec<GroundListener>,
}

impl Default for CharacterMotor {
    fn default() -> Self {
        Self::new(MotorConfig::default())
    }
}

impl CharacterMotor {
    pub fn new(config: MotorConfig) -> Self {
        let config = config.sanitized();
        let geometry = ColliderGeometry::from_config(&config);
        let thresholds = GroundThresholds::from_config(&config, &geometry);
        Self {
            collisions: CollisionQueue::with_capacity(config.max_queued_collisions),
            contact_scratch: Vec::with_capacity(config.max_queued_collisions),
            config,
            geometry,
            thresholds,
            tracker: GroundStateTracker::new(),
            connection: SurfaceConnection::default(),
            last_contacts: ContactSummary::default(),
            active_velocity: Vector::zeros(),
            active_velocity_target: Vector::zeros(),
            gravity_speed: 0.0,
            is_on_ground: false,
            is_on_flat_ground: false,
            ground_normal: Vector::y(),
            ground_point: Point::origin(),
            slope_normal: Vector::y(),
            ground_step_velocity: Vector::zeros(),
            is_touching_ceiling: false,
            committed_velocity: Vector::zeros(),
            listeners: Vec::new(),
        }
    }

    pub fn config(&self) -> MotorConfig {
        self.config
    }

    /// Applies a whole configuration: values are clamped and derived geometry is
    /// recomputed before the call returns.
    pub fn configure(&mut self, config: MotorConfig) {
        self.config = config.sanitized();
        self.geometry = ColliderGeometry::from_config(&self.config);
        self.thresholds = GroundThresholds::from_config(&self.config, &self.geometry);
        self.collisions
            .set_capacity(self.config.max_queued_collisions);
    }

    pub fn configure_with(&mut self, edit: impl FnOnce(&mut MotorConfig)) {
        let mut config = self.config;
        edit(&mut config);
        self.configure(config);
    }

    /// Clears runtime state; configuration and listeners are kept.
    pub fn reset_state(&mut self) {
        self.tracker.reset();
        self.connection.reset();
        self.collisions.clear();
        self.last_contacts = ContactSummary::default();
        self.active_velocity = Vector::zeros();
        self.active_velocity_target = Vector::zeros();
        self.gravity_speed = 0.0;
        self.is_on_ground = false;
        self.is_on_flat_ground = false;
        self.ground_normal = Vector::y();
        self.ground_point = Point::origin();
        self.slope_normal = Vector::y();
        self.ground_step_velocity = Vector::zeros();
        self.is_touching_ceiling = false;
        self.committed_velocity = Vector::zeros();
    }

    pub fn geometry(&self) -> &ColliderGeometry {
        &self.geometry
    }

    pub fn thresholds(&self) -> &GroundThresholds {
        &self.thresholds
    }

    pub fn desired_ground_distance(&self) -> Real {
        self.thresholds.desired_ground_distance
    }

    pub fn is_on_ground(&self) -> bool {
        self.is_on_ground
    }

    pub fn is_on_flat_ground(&self) -> bool {
        self.is_on_flat_ground
    }

    pub fn ground_state_changed(&self) -> bool {
        self.tracker.state_changed()
    }

    pub fn ground_normal(&self) -> Vector<Real> {
        self.ground_normal
    }

    pub fn ground_point(&self) -> Point<Real> {
        self.ground_point
    }

    pub fn ground_surface(&self) -> Option<SurfaceRef> {
        self.connection.surface()
    }

    pub fn slope_normal(&self) -> Vector<Real> {
        self.slope_normal
    }

    pub fn is_touching_ceiling(&self) -> bool {
        self.is_touching_ceiling
    }

    pub fn last_contacts(&self) -> &ContactSummary {
        &self.last_contacts
    }

    /// Velocity the body actually has, read back from the host after the physics
    /// step resolved collisions.
    pub fn velocity<H: MotorBody + ?Sized>(&self, host: &H) -> Vector<Real> {
        host.velocity()
    }

    pub fn speed<H: MotorBody + ?Sized>(&self, host: &H) -> Real {
        host.velocity().norm()
    }

    /// Unit vector of the body velocity, zero while at rest.
    pub fn direction<H: MotorBody + ?Sized>(&self, host: &H) -> Vector<Real> {
        host.velocity()
            .try_normalize(Real::EPSILON)
            .unwrap_or_else(Vector::zeros)
    }

    /// Velocity handed to the host on the last step, before collision response.
    pub fn committed_velocity(&self) -> Vector<Real> {
        self.committed_velocity
    }

    pub fn active_velocity(&self) -> Vector<Real> {
        self.active_velocity
    }

    pub fn active_velocity_target(&self) -> Vector<Real> {
        self.active_velocity_target
    }

    pub fn gravity_speed(&self) -> Real {
        self.gravity_speed
    }

    pub fn connected_velocity(&self) -> Vector<Real> {
        self.connection.velocity()
    }

    pub fn ground_step_velocity(&self) -> Vector<Real> {
        self.ground_step_velocity
    }

    pub fn queued_collisions(&self) -> usize {
        self.collisions.len()
    }

    /// Buffers a collision for the next step. Returns `false` if the queue is full.
    pub fn push_collision(&mut self, collision: Collision) -> bool {
        self.collisions.push(collision)
    }

    pub fn on_ground_transition(&mut self, listener: impl FnMut(GroundTransition) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Sets the velocity the active velocity approaches from the next step on.
    pub fn move_by_velocity_target(&mut self, velocity: Vector<Real>) {
        self.active_velocity_target = velocity;
    }

    pub fn move_by_direction(&mut self, direction: Vector<Real>, speed: Real) {
        self.move_by_velocity_target(direction * speed);
    }

    /// Sets both the active velocity and its target, skipping smoothing.
    pub fn set_active_velocity(&mut self, velocity: Vector<Real>) {
        self.active_velocity = velocity;
        self.active_velocity_target = velocity;
    }

    pub fn clear_active_velocity(&mut self) {
        self.active_velocity = Vector::zeros();
    }

    /// Displaces the body directly.
    ///
    /// With `align_to_ground` the delta follows the current slope while grounded. With
    /// `restrict_to_ground` the move is dropped entirely if the destination would not be
    /// grounded. Returns whether the displacement was applied.
    pub fn move_by_delta<H: MotorHost + ?Sized>(
        &self,
        host: &mut H,
        delta: Vector<Real>,
        align_to_ground: bool,
        restrict_to_ground: bool,
    ) -> bool {
        let delta = if align_to_ground && self.is_on_ground {
            align_to_normal(delta, self.slope_normal)
        } else {
            delta
        };
        if restrict_to_ground {
            let predicted = self.probe_at(&*host, host.position(), delta, false);
            if !predicted.is_on_ground {
                debug!(
                    target: "character_motor",
                    "move_by_delta dropped: destination is not grounded"
                );
                return false;
            }
        }
        host.move_position(delta);
        true
    }

    /// Probes for ground below the collider center shifted by `offset`.
    pub fn probe_ground<H: MotorHost + ?Sized>(
        &self,
        host: &H,
        offset: Vector<Real>,
        use_refined_normal: bool,
    ) -> GroundInfo {
        self.probe_at(host, host.position(), offset, use_refined_normal)
    }

    pub fn step<H: MotorHost + ?Sized>(&mut self, host: &mut H, dt: Real) -> MotorStepOutput {
        self.step_inner(host, dt, None)
    }

    /// Same as [`CharacterMotor::step`], emitting the lines enabled in the debug config.
    pub fn step_observed<H: MotorHost + ?Sized>(
        &mut self,
        host: &mut H,
        dt: Real,
        sink: &mut dyn MotorDebugSink,
    ) -> MotorStepOutput {
        self.step_inner(host, dt, Some(sink))
    }

    fn step_inner<H: MotorHost + ?Sized>(
        &mut self,
        host: &mut H,
        dt: Real,
        sink: Option<&mut dyn MotorDebugSink>,
    ) -> MotorStepOutput {
        let sink = if self.config.debug.any() { sink } else { None };
        // The queue is emptied before anything else so no event outlives this step.
        let mut collisions = std::mem::take(&mut self.contact_scratch);
        self.collisions.drain_into(&mut collisions);
        let output = self.run_step(host, dt, sink, &collisions);
        self.contact_scratch = collisions;
        output
    }

    fn run_step<H: MotorHost + ?Sized>(
        &mut self,
        host: &mut H,
        dt: Real,
        mut sink: Option<&mut dyn MotorDebugSink>,
        collisions: &[Collision],
    ) -> MotorStepOutput {
        if !(dt.is_finite() && dt > 0.0) {
            warn!(
                target: "character_motor",
                dt = dt as f64,
                "motor step skipped: delta time must be positive"
            );
            return MotorStepOutput {
                velocity: self.committed_velocity,
                step_velocity: Vector::zeros(),
                is_on_ground: self.is_on_ground,
                transition: None,
            };
        }

        if let Some(sink) = sink.as_deref_mut() {
            self.draw_contacts(sink, collisions);
        }
        self.last_contacts = evaluate_contacts(collisions, self.thresholds.min_ground_angle_dot);
        self.is_touching_ceiling = self.last_contacts.touching_ceiling;

        let position = host.position();
        self.reset_ground(position);

        let ground = self.probe_at(
            &*host,
            position,
            Vector::zeros(),
            self.config.use_refined_ground_normal,
        );
        if ground.is_on_ground {
            self.ground_normal = ground.normal;
            self.ground_point = ground.point;
            self.refresh_connection(&*host, &ground, dt);
        }
        self.is_on_ground = ground.is_on_ground;
        self.is_on_flat_ground = ground.is_on_ground
            && ground.normal.y > self.thresholds.min_flat_ground_angle_dot;

        let transition = self.update_ground_state();
        if ground.is_on_ground {
            let extra_offset = self.connection.position_delta().y;
            self.ground_step_velocity = self.step_velocity(ground.distance, dt, extra_offset, false);
        }

        let velocity = self.integrate(&*host, position, dt);

        if let Some(sink) = sink.as_deref_mut() {
            self.draw_step(sink, position, velocity);
        }

        let committed = if self.config.snap_to_ground {
            velocity + self.ground_step_velocity
        } else {
            velocity
        };
        host.set_velocity(committed);
        self.committed_velocity = committed;
        trace!(
            target: "character_motor",
            grounded = self.is_on_ground,
            vx = committed.x as f64,
            vy = committed.y as f64,
            vz = committed.z as f64,
            "motor step"
        );

        MotorStepOutput {
            velocity: committed,
            step_velocity: self.ground_step_velocity,
            is_on_ground: self.is_on_ground,
            transition,
        }
    }

    fn reset_ground(&mut self, position: Vector<Real>) {
        self.is_on_ground = false;
        self.is_on_flat_ground = false;
        self.ground_normal = Vector::y();
        self.ground_point = Point::from(position);
        self.ground_step_velocity = Vector::zeros();
    }

    fn probe_settings(&self, use_refined_normal: bool) -> ProbeSettings {
        ProbeSettings {
            threshold_distance: self
                .thresholds
                .threshold_distance(self.tracker.uses_extra_threshold()),
            max_distance: self.thresholds.total_probe_distance,
            thickness: self.config.ground_probe_thickness,
            layers: self.config.ground_layers,
            use_refined_normal,
        }
    }

    fn probe_at<C: ShapeCaster + ?Sized>(
        &self,
        caster: &C,
        position: Vector<Real>,
        offset: Vector<Real>,
        use_refined_normal: bool,
    ) -> GroundInfo {
        let origin = self.geometry.center(position) + offset;
        sensor::probe_ground(caster, origin, &self.probe_settings(use_refined_normal))
    }

    fn refresh_connection<C: ShapeCaster + ?Sized>(
        &mut self,
        caster: &C,
        ground: &GroundInfo,
        dt: Real,
    ) {
        let Some(surface) = ground.surface else {
            return;
        };
        match caster.surface_position(surface) {
            Some(surface_position) => self.connection.update(
                surface,
                surface_position,
                self.tracker.was_on_ground(),
                dt,
            ),
            None => self.connection.reset(),
        }
    }

    fn update_ground_state(&mut self) -> Option<GroundTransition> {
        let transition = self.tracker.update(self.is_on_ground);
        match transition {
            Some(GroundTransition::Gained) => {
                debug!(
                    target: "character_motor::ground",
                    fall_speed = self.gravity_speed as f64,
                    "gained ground contact"
                );
                self.gravity_speed = 0.0;
            }
            Some(GroundTransition::Lost) => {
                debug!(target: "character_motor::ground", "lost ground contact");
            }
            None => {}
        }
        if let Some(transition) = transition {
            for listener in &mut self.listeners {
                listener(transition);
            }
        }
        transition
    }

    fn step_correction(&self) -> StepCorrection {
        StepCorrection {
            half_height: self.geometry.half_height,
            step_height: self.geometry.step_height,
            step_up_smooth: self.config.step_up_smooth,
            step_down_smooth: self.config.step_down_smooth,
        }
    }

    fn step_velocity(
        &self,
        ground_distance: Real,
        dt: Real,
        extra_offset: Real,
        no_smoothing: bool,
    ) -> Vector<Real> {
        let instantaneous =
            no_smoothing || self.tracker.state_changed() || self.is_touching_ceiling;
        self.step_correction()
            .velocity(ground_distance, dt, extra_offset, instantaneous)
    }

    fn integrate<C: ShapeCaster + ?Sized>(
        &mut self,
        caster: &C,
        position: Vector<Real>,
        dt: Real,
    ) -> Vector<Real> {
        let control_ratio = if self.is_on_ground {
            1.0
        } else {
            self.config.air_control
        };
        self.active_velocity = update_active_velocity(
            self.active_velocity,
            self.active_velocity_target,
            self.config.velocity_mode,
            self.config.speed_change_rate,
            control_ratio,
            dt,
        );

        // Slope sampling is not performed; the slope follows the probed ground normal.
        self.slope_normal = self.ground_normal;
        let aligned = if self.is_on_ground {
            align_to_normal(self.active_velocity, self.slope_normal)
        } else {
            self.active_velocity
        };
        let mut velocity = aligned + self.connection.velocity();

        if !self.is_on_ground {
            if self.config.enable_gravity {
                self.gravity_speed = accumulate_fall_speed(
                    self.gravity_speed,
                    self.config.gravity_accel,
                    self.config.max_fall_speed,
                    dt,
                );
                velocity.y -= self.gravity_speed;
            }
            if self.config.predict_ground_when_falling && velocity.y < 0.0 {
                let predicted = self.probe_at(caster, position, velocity * dt, false);
                if predicted.is_on_ground {
                    self.ground_step_velocity =
                        self.step_velocity(predicted.distance, dt, 0.0, true);
                }
            }
        } else if self.config.restrict_to_ground {
            let predicted = self.probe_at(caster, position, velocity * dt, false);
            if !predicted.is_on_ground {
                // Step correction still applies at commit.
                velocity.x = 0.0;
                velocity.z = 0.0;
            }
        }
        velocity
    }

    fn draw_contacts(&self, sink: &mut dyn MotorDebugSink, collisions: &[Collision]) {
        if !self.config.debug.contacts {
            return;
        }
        for contact in collisions.iter().flat_map(|collision| &collision.contacts) {
            let color = if contact.normal.y > self.thresholds.min_flat_ground_angle_dot {
                COLOR_CONTACT_FLAT
            } else {
                COLOR_CONTACT
            };
            sink.draw_line(
                contact.point,
                contact.point + contact.normal * CONTACT_NORMAL_DRAW_LENGTH,
                color,
            );
        }
    }

    fn draw_step(&self, sink: &mut dyn MotorDebugSink, position: Vector<Real>, velocity: Vector<Real>) {
        let debug = self.config.debug;
        let origin = Point::from(position);
        if debug.ground_probe {
            let center = self.geometry.center(position);
            sink.draw_line(
                center,
                center - Vector::y() * self.thresholds.desired_ground_distance,
                COLOR_GROUND_PROBE,
            );
        }
        if debug.slope {
            sink.draw_line(origin, origin + self.slope_normal, COLOR_SLOPE);
        }
        if debug.velocity {
            sink.draw_line(origin, origin + velocity, COLOR_VELOCITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VelocityMode;
    use crate::contacts::ContactPoint;
    use crate::debug::DebugLines;
    use crate::host::test_support::{surface, TestFloor, TestHost};
    use crate::host::MotorBody;
    use std::sync::{Arc, Mutex};

    const DT: Real = 0.02;

    fn tilted_floor(normal: Vector<Real>) -> TestFloor {
        TestFloor {
            normal,
            ..TestFloor::flat(0.0)
        }
    }

    #[test]
    fn transitions_are_edge_triggered() {
        let mut motor = CharacterMotor::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        motor.on_ground_transition(move |transition| sink.lock().unwrap().push(transition));

        let mut host = TestHost::on_floor(Vector::zeros());
        let mut per_step = Vec::new();
        for grounded in [true, true, false, false, true] {
            host.floor = grounded.then(|| TestFloor::flat(0.0));
            per_step.push(motor.step(&mut host, DT).transition);
            assert_eq!(motor.is_on_ground(), grounded);
            assert_eq!(motor.ground_state_changed(), per_step.last().unwrap().is_some());
        }

        assert_eq!(
            per_step,
            vec![
                None,
                None,
                Some(GroundTransition::Lost),
                None,
                Some(GroundTransition::Gained)
            ]
        );
        assert_eq!(
            *seen.lock().unwrap(),
            vec![GroundTransition::Lost, GroundTransition::Gained]
        );
    }

    #[test]
    fn landing_resets_fall_speed() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::in_void(Vector::zeros());
        for _ in 0..3 {
            let output = motor.step(&mut host, DT);
            assert!(!output.is_on_ground);
        }
        assert!((motor.gravity_speed() - 1.2).abs() < 1.0e-4);
        assert!(host.velocity().y < -1.0);

        host.floor = Some(TestFloor::flat(0.0));
        let output = motor.step(&mut host, DT);
        assert_eq!(output.transition, Some(GroundTransition::Gained));
        assert_eq!(motor.gravity_speed(), 0.0);
    }

    #[test]
    fn fall_speed_is_capped_at_max() {
        let mut motor = CharacterMotor::new(MotorConfig {
            max_fall_speed: 1.0,
            ..Default::default()
        });
        let mut host = TestHost::in_void(Vector::zeros());
        for _ in 0..20 {
            motor.step(&mut host, DT);
        }
        assert_eq!(motor.gravity_speed(), 1.0);
        assert!((host.velocity().y + 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn disabled_gravity_leaves_vertical_velocity_alone() {
        let mut motor = CharacterMotor::new(MotorConfig {
            enable_gravity: false,
            ..Default::default()
        });
        let mut host = TestHost::in_void(Vector::zeros());
        let output = motor.step(&mut host, DT);
        assert_eq!(output.velocity, Vector::zeros());
        assert_eq!(motor.gravity_speed(), 0.0);
    }

    #[test]
    fn smoothing_limits_speed_change_per_step() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        motor.move_by_velocity_target(Vector::new(100.0, 0.0, 0.0));
        let output = motor.step(&mut host, DT);

        assert!(motor.active_velocity().norm() <= 1.0 + 1.0e-5);
        assert!((output.velocity.x - 1.0).abs() < 1.0e-4);
        assert_eq!(motor.active_velocity_target(), Vector::new(100.0, 0.0, 0.0));
    }

    #[test]
    fn air_control_limits_airborne_steering() {
        let mut motor = CharacterMotor::new(MotorConfig {
            air_control: 0.25,
            ..Default::default()
        });
        let mut host = TestHost::in_void(Vector::zeros());
        motor.move_by_direction(Vector::x(), 10.0);
        motor.step(&mut host, DT);
        assert!((motor.active_velocity().x - 0.25).abs() < 1.0e-5);
    }

    #[test]
    fn clear_active_velocity_keeps_target() {
        let mut motor = CharacterMotor::default();
        motor.set_active_velocity(Vector::new(0.0, 0.0, 4.0));
        assert_eq!(motor.active_velocity(), Vector::new(0.0, 0.0, 4.0));
        motor.clear_active_velocity();
        assert_eq!(motor.active_velocity(), Vector::zeros());
        assert_eq!(motor.active_velocity_target(), Vector::new(0.0, 0.0, 4.0));
    }

    #[test]
    fn standing_on_moving_surface_inherits_its_velocity() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        motor.step(&mut host, DT);
        assert_eq!(motor.ground_surface(), Some(surface(1)));

        if let Some(floor) = host.floor.as_mut() {
            floor.surface_position = Vector::new(0.1, 0.0, 0.0);
        }
        let output = motor.step(&mut host, DT);
        assert!((motor.connected_velocity().x - 5.0).abs() < 1.0e-3);
        assert!((output.velocity.x - 5.0).abs() < 1.0e-3);

        if let Some(floor) = host.floor.as_mut() {
            floor.surface = surface(2);
            floor.surface_position = Vector::new(7.0, 0.0, 0.0);
        }
        let output = motor.step(&mut host, DT);
        assert_eq!(motor.ground_surface(), Some(surface(2)));
        assert_eq!(motor.connected_velocity(), Vector::zeros());
        assert!(output.velocity.x.abs() < 1.0e-6);
    }

    #[test]
    fn step_velocity_smooths_descent() {
        let mut motor = CharacterMotor::new(MotorConfig {
            step_down_smooth: 4.0,
            ..Default::default()
        });
        let mut host = TestHost::on_floor(Vector::new(0.0, 0.2, 0.0));
        let output = motor.step(&mut host, DT);
        assert!(output.is_on_ground);
        assert!((output.step_velocity.y + 2.5).abs() < 1.0e-3);
        assert!((output.velocity.y + 2.5).abs() < 1.0e-3);
    }

    #[test]
    fn ceiling_contact_forces_instant_correction() {
        let mut motor = CharacterMotor::new(MotorConfig {
            step_down_smooth: 4.0,
            ..Default::default()
        });
        assert!(motor.push_collision(Collision::new(
            None,
            vec![ContactPoint {
                point: Point::new(0.0, 2.0, 0.0),
                normal: -Vector::y(),
            }],
        )));
        let mut host = TestHost::on_floor(Vector::new(0.0, 0.2, 0.0));
        let output = motor.step(&mut host, DT);
        assert!(motor.is_touching_ceiling());
        assert!((output.step_velocity.y + 10.0).abs() < 1.0e-2);
        assert_eq!(motor.queued_collisions(), 0);
    }

    #[test]
    fn snap_disabled_commits_integrated_velocity() {
        let mut motor = CharacterMotor::new(MotorConfig {
            snap_to_ground: false,
            ..Default::default()
        });
        let mut host = TestHost::on_floor(Vector::new(0.0, 0.2, 0.0));
        let output = motor.step(&mut host, DT);
        assert!(output.step_velocity.y < 0.0);
        assert_eq!(output.velocity, Vector::zeros());
        assert_eq!(host.velocity(), Vector::zeros());
    }

    #[test]
    fn predictive_probe_lands_at_floating_height() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::new(0.0, 0.4, 0.0));
        motor.set_active_velocity(Vector::new(0.0, -20.0, 0.0));
        let output = motor.step(&mut host, DT);

        assert!(!output.is_on_ground);
        assert!(output.step_velocity.y > 0.0);
        assert!(output.velocity.y > -20.4);
        let landed_y = host.position.y + output.velocity.y * DT;
        assert!(landed_y.abs() < 1.0e-3);
    }

    #[test]
    fn falling_without_prediction_keeps_full_fall_velocity() {
        let mut motor = CharacterMotor::new(MotorConfig {
            predict_ground_when_falling: false,
            ..Default::default()
        });
        let mut host = TestHost::on_floor(Vector::new(0.0, 0.4, 0.0));
        motor.set_active_velocity(Vector::new(0.0, -20.0, 0.0));
        let output = motor.step(&mut host, DT);
        assert_eq!(output.step_velocity, Vector::zeros());
        assert!((output.velocity.y + 20.4).abs() < 1.0e-4);
    }

    #[test]
    fn restriction_stops_horizontal_motion_at_ledge() {
        let config = MotorConfig {
            restrict_to_ground: true,
            velocity_mode: VelocityMode::Raw,
            ..Default::default()
        };
        let ledge = TestFloor {
            max_x: Some(0.5),
            ..TestFloor::flat(0.0)
        };

        let mut motor = CharacterMotor::new(config);
        let mut host = TestHost::on_floor(Vector::new(0.45, 0.0, 0.0));
        host.floor = Some(ledge);
        motor.move_by_velocity_target(Vector::new(10.0, 0.0, 0.0));
        let output = motor.step(&mut host, DT);
        assert!(output.is_on_ground);
        assert_eq!(output.velocity.x, 0.0);
        assert_eq!(output.velocity.y, output.step_velocity.y);

        let mut motor = CharacterMotor::new(config);
        let mut host = TestHost::on_floor(Vector::zeros());
        host.floor = Some(ledge);
        motor.move_by_velocity_target(Vector::new(10.0, 0.0, 0.0));
        let output = motor.step(&mut host, DT);
        assert!((output.velocity.x - 10.0).abs() < 1.0e-4);
    }

    #[test]
    fn restricted_move_by_delta_is_all_or_nothing() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        host.floor = Some(TestFloor {
            max_x: Some(0.5),
            ..TestFloor::flat(0.0)
        });
        motor.step(&mut host, DT);

        assert!(!motor.move_by_delta(&mut host, Vector::new(2.0, 0.0, 0.0), true, true));
        assert_eq!(host.position, Vector::zeros());

        assert!(motor.move_by_delta(&mut host, Vector::new(0.3, 0.0, 0.0), true, true));
        assert!((host.position.x - 0.3).abs() < 1.0e-6);

        assert!(motor.move_by_delta(&mut host, Vector::new(2.0, 0.0, 0.0), false, false));
        assert!((host.position.x - 2.3).abs() < 1.0e-5);
    }

    #[test]
    fn move_by_delta_follows_slope_when_grounded() {
        let normal = Vector::new(-1.0, 1.0, 0.0).normalize();
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        host.floor = Some(tilted_floor(normal));
        motor.step(&mut host, DT);
        assert_eq!(motor.slope_normal(), normal);

        assert!(motor.move_by_delta(&mut host, Vector::new(1.0, 0.0, 0.0), true, false));
        assert!((host.position.norm() - 1.0).abs() < 1.0e-5);
        assert!(host.position.y > 0.5);
    }

    #[test]
    fn slope_alignment_keeps_walking_speed() {
        let normal = Vector::new(0.0, 0.8, 0.6);
        let mut motor = CharacterMotor::new(MotorConfig {
            velocity_mode: VelocityMode::Raw,
            snap_to_ground: false,
            ..Default::default()
        });
        let mut host = TestHost::on_floor(Vector::zeros());
        host.floor = Some(tilted_floor(normal));
        motor.move_by_velocity_target(Vector::new(0.0, 0.0, -3.0));
        let output = motor.step(&mut host, DT);

        assert!((output.velocity.norm() - 3.0).abs() < 1.0e-4);
        assert!(output.velocity.dot(&normal).abs() < 1.0e-4);
        assert!((motor.speed(&host) - 3.0).abs() < 1.0e-4);
        assert!((motor.direction(&host).norm() - 1.0).abs() < 1.0e-5);
        assert_eq!(motor.velocity(&host), motor.committed_velocity());

        // The body lost its speed to something the motor never saw.
        host.velocity = Vector::new(0.0, 0.0, -0.5);
        assert!((motor.speed(&host) - 0.5).abs() < 1.0e-6);
        assert_eq!(motor.direction(&host), Vector::new(0.0, 0.0, -1.0));
        assert!((motor.committed_velocity().norm() - 3.0).abs() < 1.0e-4);

        host.velocity = Vector::zeros();
        assert_eq!(motor.direction(&host), Vector::zeros());
    }

    #[test]
    fn flat_ground_uses_flat_angle_limit() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        motor.step(&mut host, DT);
        assert!(motor.is_on_flat_ground());

        let steep = Vector::new(70.0_f32.to_radians().sin(), 70.0_f32.to_radians().cos(), 0.0);
        host.floor = Some(tilted_floor(steep));
        motor.step(&mut host, DT);
        assert!(motor.is_on_ground());
        assert!(!motor.is_on_flat_ground());
    }

    #[test]
    fn probe_ground_reports_offset_positions() {
        let motor = CharacterMotor::default();
        let host = TestHost::on_floor(Vector::zeros());
        let here = motor.probe_ground(&host, Vector::zeros(), false);
        assert!(here.is_on_ground);
        assert!((here.distance - 1.15).abs() < 1.0e-4);

        let above = motor.probe_ground(&host, Vector::new(0.0, 5.0, 0.0), false);
        assert!(!above.is_on_ground);
    }

    #[test]
    fn invalid_delta_time_is_skipped_and_queue_cleared() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        for dt in [0.0, -0.1, Real::NAN] {
            motor.push_collision(Collision::default());
            let output = motor.step(&mut host, dt);
            assert_eq!(output.transition, None);
            assert_eq!(motor.queued_collisions(), 0);
            assert_eq!(host.velocity(), Vector::zeros());
        }
    }

    #[test]
    fn debug_sink_does_not_change_simulation() {
        let config = MotorConfig {
            debug: crate::config::MotorDebugConfig {
                velocity: true,
                ground_probe: true,
                slope: true,
                contacts: true,
            },
            ..Default::default()
        };
        let mut plain = CharacterMotor::new(config);
        let mut observed = CharacterMotor::new(config);
        let mut plain_host = TestHost::on_floor(Vector::new(0.0, 0.1, 0.0));
        let mut observed_host = plain_host.clone();
        let mut lines = DebugLines::default();

        for _ in 0..4 {
            let contact = Collision::new(
                Some(surface(1)),
                vec![ContactPoint {
                    point: Point::origin(),
                    normal: Vector::y(),
                }],
            );
            plain.push_collision(contact.clone());
            observed.push_collision(contact);
            plain.move_by_velocity_target(Vector::new(2.0, 0.0, 1.0));
            observed.move_by_velocity_target(Vector::new(2.0, 0.0, 1.0));

            let a = plain.step(&mut plain_host, DT);
            let b = observed.step_observed(&mut observed_host, DT, &mut lines);
            assert_eq!(a, b);
        }

        assert!(lines.lines.iter().any(|line| line.color == COLOR_GROUND_PROBE));
        assert!(lines.lines.iter().any(|line| line.color == COLOR_CONTACT_FLAT));
        assert!(lines.lines.iter().any(|line| line.color == COLOR_VELOCITY));
        assert!(lines.lines.iter().any(|line| line.color == COLOR_SLOPE));
    }

    #[test]
    fn disabled_debug_config_draws_nothing() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        let mut lines = DebugLines::default();
        motor.push_collision(Collision::new(
            Some(surface(1)),
            vec![ContactPoint {
                point: Point::origin(),
                normal: Vector::y(),
            }],
        ));
        motor.move_by_velocity_target(Vector::new(1.0, 0.0, 0.0));
        let output = motor.step_observed(&mut host, DT, &mut lines);

        assert!(output.is_on_ground);
        assert!(lines.lines.is_empty());
    }

    #[test]
    fn extra_threshold_keeps_ground_until_lost() {
        // Feet 0.25 above the floor: beyond the plain threshold, inside the extended one.
        let hover = Vector::new(0.0, 0.25, 0.0);

        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        assert!(motor.step(&mut host, DT).is_on_ground);
        host.position = hover;
        let output = motor.step(&mut host, DT);
        assert!(output.is_on_ground);
        assert_eq!(output.transition, None);

        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        assert!(motor.step(&mut host, DT).is_on_ground);
        host.floor = None;
        assert_eq!(
            motor.step(&mut host, DT).transition,
            Some(GroundTransition::Lost)
        );
        host.floor = Some(TestFloor::flat(0.0));
        host.position = hover;
        let output = motor.step(&mut host, DT);
        assert!(!output.is_on_ground);
        assert_eq!(output.transition, None);

        host.position = Vector::zeros();
        assert_eq!(
            motor.step(&mut host, DT).transition,
            Some(GroundTransition::Gained)
        );
        host.position = hover;
        assert!(motor.step(&mut host, DT).is_on_ground);
    }

    #[test]
    fn configure_clamps_and_recomputes_geometry() {
        let mut motor = CharacterMotor::default();
        motor.configure_with(|config| config.height = 0.2);
        assert_eq!(motor.config().step_height, 0.2);
        assert_eq!(motor.geometry().step_height, 0.2);
        assert_eq!(motor.geometry().half_height, 0.0);
        assert!((motor.desired_ground_distance() - 0.2 * 1.01).abs() < 1.0e-6);

        motor.configure(MotorConfig {
            max_queued_collisions: 1,
            ..Default::default()
        });
        assert!(motor.push_collision(Collision::default()));
        assert!(!motor.push_collision(Collision::default()));
    }

    #[test]
    fn reset_state_returns_to_spawn_defaults() {
        let mut motor = CharacterMotor::default();
        let mut host = TestHost::on_floor(Vector::zeros());
        motor.set_active_velocity(Vector::new(1.0, 0.0, 0.0));
        motor.step(&mut host, DT);
        motor.push_collision(Collision::default());

        motor.reset_state();
        assert!(!motor.is_on_ground());
        assert_eq!(motor.active_velocity(), Vector::zeros());
        assert_eq!(motor.committed_velocity(), Vector::zeros());
        assert_eq!(motor.ground_surface(), None);
        assert_eq!(motor.queued_collisions(), 0);
        assert_eq!(motor.ground_normal(), Vector::y());
    }
}
