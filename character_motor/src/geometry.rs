//! Collider dimensions and the ground distances derived from them.

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

use crate::config::MotorConfig;

/// Capsule layout for a character of `height` that floats `step_height` above the floor.
///
/// The capsule only covers the part of the character above the step height; the
/// gap below it is held open by the step correction velocity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColliderGeometry {
    pub height: Real,
    pub step_height: Real,
    /// Capsule height (tip to tip).
    pub capsule_height: Real,
    /// Half of `capsule_height`, measured from the collider center.
    pub half_height: Real,
    /// Capsule radius; never exceeds `half_height`.
    pub radius: Real,
    /// Collider center relative to the body origin (the feet).
    pub center_offset: Vector<Real>,
}

impl ColliderGeometry {
    pub fn from_config(config: &MotorConfig) -> Self {
        let height = config.height.max(0.0);
        let step_height = config.step_height.clamp(0.0, height);
        let capsule_height = height - step_height;
        let half_height = capsule_height * 0.5;
        let radius = (config.thickness * 0.5).clamp(0.0, half_height);
        let [x, y, z] = config.collider_offset;
        let center_offset = Vector::new(x, y, z) + Vector::y() * (height * 0.5 + step_height * 0.5);
        Self {
            height,
            step_height,
            capsule_height,
            half_height,
            radius,
            center_offset,
        }
    }

    /// Half length of the capsule's inner segment (between sphere centers).
    pub fn capsule_half_segment(&self) -> Real {
        (self.half_height - self.radius).max(0.0)
    }

    /// World-space collider center for a body whose origin sits at `body_position`.
    pub fn center(&self, body_position: Vector<Real>) -> Point<Real> {
        Point::from(body_position + self.center_offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundThresholds {
    /// Distance from the collider center to the floor the motor floats at.
    pub desired_ground_distance: Real,
    /// Extra snap allowance used while grounded.
    pub extra_ground_threshold: Real,
    /// Full ground probe range from the collider center.
    pub total_probe_distance: Real,
    /// Contact normals with an up component above this count as ground.
    pub min_ground_angle_dot: Real,
    /// Ground normals with an up component above this count as flat ground.
    pub min_flat_ground_angle_dot: Real,
}

impl GroundThresholds {
    pub fn from_config(config: &MotorConfig, geometry: &ColliderGeometry) -> Self {
        let desired_ground_distance = (geometry.half_height + geometry.step_height)
            * (1.0 + config.ground_check_tolerance.max(0.0));
        Self {
            desired_ground_distance,
            extra_ground_threshold: geometry
                .step_height
                .max(config.min_extra_ground_threshold),
            total_probe_distance: desired_ground_distance + config.ground_probe_distance.max(0.0),
            min_ground_angle_dot: config.ground_angle_limit.to_radians().cos(),
            min_flat_ground_angle_dot: config.flat_ground_angle_limit.to_radians().cos(),
        }
    }

    /// Ground threshold distance, optionally widened by the extra snap allowance.
    pub fn threshold_distance(&self, use_extra: bool) -> Real {
        if use_extra {
            self.desired_ground_distance + self.extra_ground_threshold
        } else {
            self.desired_ground_distance
        }
    }
}
