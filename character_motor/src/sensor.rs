//! Downward ground probing.

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;

use crate::config::LayerMask;
use crate::host::{ShapeCaster, SurfaceRef};

/// Height above a thick-cast hit point the refinement ray starts from.
pub const REFINED_NORMAL_LIFT: Real = 0.01;
/// Length of the refinement ray.
pub const REFINED_NORMAL_RANGE: Real = 0.1;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroundInfo {
    pub is_on_ground: bool,
    pub normal: Vector<Real>,
    pub point: Point<Real>,
    /// Vertical gap between the probe origin and the hit point.
    pub distance: Real,
    pub surface: Option<SurfaceRef>,
}

impl GroundInfo {
    pub fn empty() -> Self {
        Self {
            is_on_ground: false,
            normal: Vector::y(),
            point: Point::origin(),
            distance: 0.0,
            surface: None,
        }
    }
}

impl Default for GroundInfo {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProbeSettings {
    /// Hits farther than this (vertically) are not ground.
    pub threshold_distance: Real,
    pub max_distance: Real,
    /// Sphere cast diameter; 0 or less casts a ray.
    pub thickness: Real,
    pub layers: LayerMask,
    pub use_refined_normal: bool,
}

/// Casts down from `origin` and reports ground within `settings.threshold_distance`.
pub fn probe_ground<C: ShapeCaster + ?Sized>(
    caster: &C,
    origin: Point<Real>,
    settings: &ProbeSettings,
) -> GroundInfo {
    let down = -Vector::y();
    let hit = if settings.thickness <= 0.0 {
        caster.cast_ray(origin, down, settings.max_distance, settings.layers)
    } else {
        caster.cast_sphere(
            origin,
            settings.thickness * 0.5,
            down,
            settings.max_distance,
            settings.layers,
        )
    };
    let Some(hit) = hit else {
        return GroundInfo::empty();
    };

    let distance = (origin.y - hit.point.y).max(0.0);
    if distance > settings.threshold_distance {
        return GroundInfo {
            distance,
            ..GroundInfo::empty()
        };
    }

    let mut normal = hit.normal;
    if settings.use_refined_normal && settings.thickness > 0.0 {
        let lifted = hit.point + Vector::y() * REFINED_NORMAL_LIFT;
        if let Some(refined) =
            caster.cast_ray_against(hit.surface, lifted, down, REFINED_NORMAL_RANGE)
        {
            normal = refined.normal;
        }
    }

    GroundInfo {
        is_on_ground: true,
        normal,
        point: hit.point,
        distance,
        surface: Some(hit.surface),
    }
}
