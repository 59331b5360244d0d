//! Velocity blending, slope alignment, gravity and floating step correction.

use std::f32::consts::PI;

use rapier3d::math::Vector;
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::Real;

use crate::config::VelocityMode;

const ALIGN_EPSILON: Real = 1.0e-6;

/// Moves `current` towards `target` by at most `max_delta`.
pub fn move_towards(current: Vector<Real>, target: Vector<Real>, max_delta: Real) -> Vector<Real> {
    let delta = target - current;
    let distance = delta.norm();
    if distance <= max_delta || distance == 0.0 {
        return target;
    }
    current + delta * (max_delta / distance)
}

/// Advances the active velocity one step towards its target.
///
/// `control_ratio` scales the change rate (1 grounded, the air control fraction airborne).
pub fn update_active_velocity(
    current: Vector<Real>,
    target: Vector<Real>,
    mode: VelocityMode,
    speed_change_rate: Real,
    control_ratio: Real,
    dt: Real,
) -> Vector<Real> {
    if current == Vector::zeros() && target == Vector::zeros() {
        return current;
    }
    match mode {
        VelocityMode::Raw => target,
        VelocityMode::Simple => {
            move_towards(current, target, speed_change_rate * control_ratio * dt)
        }
    }
}

/// Rotates `velocity` by the minimal rotation taking up onto `normal`, keeping its speed.
pub fn align_to_normal(velocity: Vector<Real>, normal: Vector<Real>) -> Vector<Real> {
    let speed = velocity.norm();
    if speed <= ALIGN_EPSILON || normal.norm_squared() <= ALIGN_EPSILON {
        return velocity;
    }
    let rotation = UnitQuaternion::rotation_between(&Vector::y(), &normal)
        .unwrap_or_else(|| UnitQuaternion::from_axis_angle(&Vector::x_axis(), PI));
    let aligned = rotation * (velocity / speed);
    aligned.normalize() * speed
}

/// Adds one step of gravity to the fall speed, capped at `max_fall_speed`.
pub fn accumulate_fall_speed(
    fall_speed: Real,
    gravity_accel: Real,
    max_fall_speed: Real,
    dt: Real,
) -> Real {
    (fall_speed + gravity_accel * dt).min(max_fall_speed)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepCorrection {
    pub half_height: Real,
    pub step_height: Real,
    pub step_up_smooth: Real,
    pub step_down_smooth: Real,
}

impl StepCorrection {
    /// Vertical velocity that brings the collider center to its floating height.
    ///
    /// Positive when the capsule sits too low. `instantaneous` closes the whole gap
    /// in one step; otherwise the gap is divided by the up or down smoothing factor.
    pub fn velocity(
        &self,
        ground_distance: Real,
        dt: Real,
        extra_offset: Real,
        instantaneous: bool,
    ) -> Vector<Real> {
        let required_delta = self.required_delta(ground_distance, extra_offset);
        let speed = if instantaneous {
            required_delta / dt
        } else {
            let smooth = if required_delta > 0.0 {
                self.step_up_smooth
            } else {
                self.step_down_smooth
            };
            required_delta / (dt * smooth)
        };
        Vector::y() * speed
    }

    pub fn required_delta(&self, ground_distance: Real, extra_offset: Real) -> Real {
        (self.half_height + self.step_height + extra_offset) - ground_distance
    }
}
