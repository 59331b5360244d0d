//! Interfaces the motor consumes from the hosting physics engine.

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::{ColliderHandle, Real};

use crate::config::LayerMask;

/// Opaque reference to the collider a query hit.
pub type SurfaceRef = ColliderHandle;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    pub point: Point<Real>,
    pub normal: Vector<Real>,
    pub surface: SurfaceRef,
}

/// Scene queries used by ground probing.
pub trait ShapeCaster {
    fn cast_ray(
        &self,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
        layers: LayerMask,
    ) -> Option<CastHit>;

    fn cast_sphere(
        &self,
        origin: Point<Real>,
        radius: Real,
        direction: Vector<Real>,
        max_distance: Real,
        layers: LayerMask,
    ) -> Option<CastHit>;

    /// Ray cast against `surface` alone.
    fn cast_ray_against(
        &self,
        surface: SurfaceRef,
        origin: Point<Real>,
        direction: Vector<Real>,
        max_distance: Real,
    ) -> Option<CastHit>;

    /// World translation of `surface`, or `None` if it no longer exists.
    fn surface_position(&self, surface: SurfaceRef) -> Option<Vector<Real>>;
}

/// Rigid body the motor drives. Positions are the body origin (the character's feet).
pub trait MotorBody {
    fn position(&self) -> Vector<Real>;
    fn velocity(&self) -> Vector<Real>;
    fn set_velocity(&mut self, velocity: Vector<Real>);
    fn move_position(&mut self, delta: Vector<Real>);
}

pub trait MotorHost: ShapeCaster + MotorBody {}

impl<T: ShapeCaster + MotorBody + ?Sized> MotorHost for T {}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn surface(index: u32) -> SurfaceRef {
        ColliderHandle::from_raw_parts(index, 0)
    }

    /// Infinite horizontal floor, optionally cut off beyond `max_x`.
    #[derive(Clone, Copy, Debug)]
    pub(crate) struct TestFloor {
        pub height: Real,
        pub normal: Vector<Real>,
        pub refined_normal: Option<Vector<Real>>,
        pub surface: SurfaceRef,
        pub surface_position: Vector<Real>,
        pub max_x: Option<Real>,
    }

    impl TestFloor {
        pub(crate) fn flat(height: Real) -> Self {
            Self {
                height,
                normal: Vector::y(),
                refined_normal: None,
                surface: surface(1),
                surface_position: Vector::zeros(),
                max_x: None,
            }
        }

        fn covers(&self, origin: &Point<Real>) -> bool {
            self.max_x.map_or(true, |max_x| origin.x <= max_x)
        }
    }

    #[derive(Clone, Debug)]
    pub(crate) struct TestHost {
        pub floor: Option<TestFloor>,
        pub position: Vector<Real>,
        pub velocity: Vector<Real>,
    }

    impl TestHost {
        pub(crate) fn on_floor(position: Vector<Real>) -> Self {
            Self {
                floor: Some(TestFloor::flat(0.0)),
                position,
                velocity: Vector::zeros(),
            }
        }

        pub(crate) fn in_void(position: Vector<Real>) -> Self {
            Self {
                floor: None,
                position,
                velocity: Vector::zeros(),
            }
        }

        fn hit_floor(&self, origin: Point<Real>, lift: Real, max_distance: Real) -> Option<CastHit> {
            let floor = self.floor?;
            if !floor.covers(&origin) || origin.y < floor.height {
                return None;
            }
            let travel = origin.y - floor.height - lift;
            if travel > max_distance {
                return None;
            }
            Some(CastHit {
                point: Point::new(origin.x, floor.height, origin.z),
                normal: floor.normal,
                surface: floor.surface,
            })
        }
    }

    impl ShapeCaster for TestHost {
        fn cast_ray(
            &self,
            origin: Point<Real>,
            _direction: Vector<Real>,
            max_distance: Real,
            _layers: LayerMask,
        ) -> Option<CastHit> {
            self.hit_floor(origin, 0.0, max_distance)
        }

        fn cast_sphere(
            &self,
            origin: Point<Real>,
            radius: Real,
            _direction: Vector<Real>,
            max_distance: Real,
            _layers: LayerMask,
        ) -> Option<CastHit> {
            self.hit_floor(origin, radius, max_distance)
        }

        fn cast_ray_against(
            &self,
            surface: SurfaceRef,
            origin: Point<Real>,
            direction: Vector<Real>,
            max_distance: Real,
        ) -> Option<CastHit> {
            let floor = self.floor?;
            if floor.surface != surface {
                return None;
            }
            let hit = self.cast_ray(origin, direction, max_distance, LayerMask::ALL)?;
            Some(CastHit {
                normal: floor.refined_normal.unwrap_or(floor.normal),
                ..hit
            })
        }

        fn surface_position(&self, surface: SurfaceRef) -> Option<Vector<Real>> {
            self.floor
                .filter(|floor| floor.surface == surface)
                .map(|floor| floor.surface_position)
        }
    }

    impl MotorBody for TestHost {
        fn position(&self) -> Vector<Real> {
            self.position
        }

        fn velocity(&self) -> Vector<Real> {
            self.velocity
        }

        fn set_velocity(&mut self, velocity: Vector<Real>) {
            self.velocity = velocity;
        }

        fn move_position(&mut self, delta: Vector<Real>) {
            self.position += delta;
        }
    }
}
