//! Motor configuration, TOML loading and value clamping.

use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Upper bound for `speed_change_rate`.
pub const MAX_SPEED_CHANGE: Real = 300.0;

const MIN_STEP_SMOOTH: Real = 1.0;
const MAX_ANGLE_LIMIT_DEG: Real = 90.0;

#[derive(Debug, Error)]
pub enum MotorConfigError {
    #[error("motor config parse failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("motor config serialize failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// How the active velocity approaches its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMode {
    /// Active velocity is replaced by the target every step.
    Raw,
    /// Active velocity moves towards the target at a bounded rate.
    #[default]
    Simple,
}

/// Bit mask of collision layers that count as ground.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(u32::MAX);

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorDebugConfig {
    pub velocity: bool,
    pub ground_probe: bool,
    pub slope: bool,
    pub contacts: bool,
}

impl MotorDebugConfig {
    pub fn any(&self) -> bool {
        self.velocity || self.ground_probe || self.slope || self.contacts
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Total character height in meters, step height included.
    pub height: Real,
    /// Capsule thickness (twice the radius) in meters.
    pub thickness: Real,
    /// Local offset applied to the collider center.
    pub collider_offset: [Real; 3],
    pub velocity_mode: VelocityMode,
    /// Maximum active velocity change per second.
    pub speed_change_rate: Real,
    /// Fraction of `speed_change_rate` available while airborne (0..=1).
    pub air_control: Real,
    pub enable_gravity: bool,
    pub gravity_accel: Real,
    pub max_fall_speed: Real,
    pub ground_layers: LayerMask,
    /// Adds the floating step correction to the committed velocity.
    pub snap_to_ground: bool,
    /// Contact normals within this angle (degrees) of up count as ground.
    pub ground_angle_limit: Real,
    /// Ground normals within this angle (degrees) of up count as flat ground.
    pub flat_ground_angle_limit: Real,
    /// Probe range below the desired ground distance.
    pub ground_probe_distance: Real,
    /// Sphere cast thickness for ground probing; 0 uses a ray.
    pub ground_probe_thickness: Real,
    /// Lower bound for the extra snap threshold; the larger of this and the step height is used.
    pub min_extra_ground_threshold: Real,
    /// Fraction added to the desired ground distance to absorb float error.
    pub ground_check_tolerance: Real,
    /// Zero horizontal velocity when the next position would leave the ground.
    pub restrict_to_ground: bool,
    pub step_height: Real,
    pub step_up_smooth: Real,
    pub step_down_smooth: Real,
    /// Re-query the hit surface with a thin ray for a sharper ground normal.
    pub use_refined_ground_normal: bool,
    /// Probe at the next position while falling to land without sinking.
    pub predict_ground_when_falling: bool,
    /// Collision events buffered per step; extra events are dropped.
    pub max_queued_collisions: usize,
    pub debug: MotorDebugConfig,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            height: 2.0,
            thickness: 1.0,
            collider_offset: [0.0; 3],
            velocity_mode: VelocityMode::Simple,
            speed_change_rate: 50.0,
            air_control: 0.0,
            enable_gravity: true,
            gravity_accel: 20.0,
            max_fall_speed: 20.0,
            ground_layers: LayerMask::default(),
            snap_to_ground: true,
            ground_angle_limit: 90.0,
            flat_ground_angle_limit: 60.0,
            ground_probe_distance: 10.0,
            ground_probe_thickness: 0.1,
            min_extra_ground_threshold: 0.25,
            ground_check_tolerance: 0.01,
            restrict_to_ground: false,
            step_height: 0.3,
            step_up_smooth: 1.0,
            step_down_smooth: 1.0,
            use_refined_ground_normal: true,
            predict_ground_when_falling: true,
            max_queued_collisions: 64,
            debug: MotorDebugConfig::default(),
        }
    }
}

impl MotorConfig {
    /// Parses a (possibly partial) TOML table; missing keys keep their defaults.
    pub fn parse_toml(text: &str) -> Result<Self, MotorConfigError> {
        let config: Self = toml::from_str(text)?;
        Ok(config.sanitized())
    }

    pub fn to_toml(&self) -> Result<String, MotorConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Returns a copy with every value clamped into its valid range.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let height = clamp_field("height", self.height, defaults.height, 0.0, Real::INFINITY);
        let mut collider_offset = self.collider_offset;
        for component in &mut collider_offset {
            if !component.is_finite() {
                warn!(
                    target: "character_motor::config",
                    "collider_offset component is not finite; using 0"
                );
                *component = 0.0;
            }
        }
        Self {
            height,
            thickness: clamp_field(
                "thickness",
                self.thickness,
                defaults.thickness,
                0.0,
                Real::INFINITY,
            ),
            collider_offset,
            velocity_mode: self.velocity_mode,
            speed_change_rate: clamp_field(
                "speed_change_rate",
                self.speed_change_rate,
                defaults.speed_change_rate,
                0.0,
                MAX_SPEED_CHANGE,
            ),
            air_control: clamp_field("air_control", self.air_control, defaults.air_control, 0.0, 1.0),
            enable_gravity: self.enable_gravity,
            gravity_accel: clamp_field(
                "gravity_accel",
                self.gravity_accel,
                defaults.gravity_accel,
                0.0,
                Real::INFINITY,
            ),
            max_fall_speed: clamp_field(
                "max_fall_speed",
                self.max_fall_speed,
                defaults.max_fall_speed,
                0.0,
                Real::INFINITY,
            ),
            ground_layers: self.ground_layers,
            snap_to_ground: self.snap_to_ground,
            ground_angle_limit: clamp_field(
                "ground_angle_limit",
                self.ground_angle_limit,
                defaults.ground_angle_limit,
                0.0,
                MAX_ANGLE_LIMIT_DEG,
            ),
            flat_ground_angle_limit: clamp_field(
                "flat_ground_angle_limit",
                self.flat_ground_angle_limit,
                defaults.flat_ground_angle_limit,
                0.0,
                MAX_ANGLE_LIMIT_DEG,
            ),
            ground_probe_distance: clamp_field(
                "ground_probe_distance",
                self.ground_probe_distance,
                defaults.ground_probe_distance,
                0.0,
                Real::INFINITY,
            ),
            ground_probe_thickness: clamp_field(
                "ground_probe_thickness",
                self.ground_probe_thickness,
                defaults.ground_probe_thickness,
                0.0,
                Real::INFINITY,
            ),
            min_extra_ground_threshold: clamp_field(
                "min_extra_ground_threshold",
                self.min_extra_ground_threshold,
                defaults.min_extra_ground_threshold,
                0.0,
                Real::INFINITY,
            ),
            ground_check_tolerance: clamp_field(
                "ground_check_tolerance",
                self.ground_check_tolerance,
                defaults.ground_check_tolerance,
                0.0,
                Real::INFINITY,
            ),
            restrict_to_ground: self.restrict_to_ground,
            // Clamped against the already sanitized height.
            step_height: clamp_field(
                "step_height",
                self.step_height,
                defaults.step_height.min(height),
                0.0,
                height,
            ),
            step_up_smooth: clamp_field(
                "step_up_smooth",
                self.step_up_smooth,
                defaults.step_up_smooth,
                MIN_STEP_SMOOTH,
                Real::INFINITY,
            ),
            step_down_smooth: clamp_field(
                "step_down_smooth",
                self.step_down_smooth,
                defaults.step_down_smooth,
                MIN_STEP_SMOOTH,
                Real::INFINITY,
            ),
            use_refined_ground_normal: self.use_refined_ground_normal,
            predict_ground_when_falling: self.predict_ground_when_falling,
            max_queued_collisions: self.max_queued_collisions.max(1),
            debug: self.debug,
        }
    }
}

fn clamp_field(name: &'static str, value: Real, default: Real, min: Real, max: Real) -> Real {
    let clamped = if value.is_finite() {
        value.clamp(min, max)
    } else {
        default
    };
    if clamped != value {
        warn!(
            target: "character_motor::config",
            field = name,
            value = value as f64,
            clamped = clamped as f64,
            "motor config value out of range"
        );
    }
    clamped
}
