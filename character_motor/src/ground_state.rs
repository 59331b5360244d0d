//! Grounded/airborne transitions and connected surface tracking.

use rapier3d::math::Vector;
use rapier3d::prelude::Real;
use tracing::debug;

use crate::host::SurfaceRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroundTransition {
    Gained,
    Lost,
}

/// Edge detector over the per-step grounded flag.
///
/// The first observation only sets the baseline. The extra snap threshold is
/// enabled on landing and disabled on leaving the ground.
#[derive(Clone, Debug)]
pub struct GroundStateTracker {
    was_on_ground: Option<bool>,
    changed: bool,
    use_extra_threshold: bool,
}

impl Default for GroundStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundStateTracker {
    pub fn new() -> Self {
        Self {
            was_on_ground: None,
            changed: false,
            use_extra_threshold: true,
        }
    }

    pub fn update(&mut self, is_on_ground: bool) -> Option<GroundTransition> {
        let transition = match (self.was_on_ground, is_on_ground) {
            (Some(false), true) => Some(GroundTransition::Gained),
            (Some(true), false) => Some(GroundTransition::Lost),
            _ => None,
        };
        match transition {
            Some(GroundTransition::Gained) => self.use_extra_threshold = true,
            Some(GroundTransition::Lost) => self.use_extra_threshold = false,
            None => {}
        }
        self.changed = transition.is_some();
        self.was_on_ground = Some(is_on_ground);
        transition
    }

    /// Grounded flag from the last update (false before the first one).
    pub fn was_on_ground(&self) -> bool {
        self.was_on_ground.unwrap_or(false)
    }

    /// True exactly on the update where the grounded flag flipped.
    pub fn state_changed(&self) -> bool {
        self.changed
    }

    pub fn uses_extra_threshold(&self) -> bool {
        self.use_extra_threshold
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Motion of the surface the character stands on.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SurfaceConnection {
    surface: Option<SurfaceRef>,
    previous_position: Vector<Real>,
    position_delta: Vector<Real>,
    velocity: Vector<Real>,
}

impl SurfaceConnection {
    pub fn surface(&self) -> Option<SurfaceRef> {
        self.surface
    }

    pub fn velocity(&self) -> Vector<Real> {
        self.velocity
    }

    /// Surface displacement measured on the last grounded update.
    pub fn position_delta(&self) -> Vector<Real> {
        self.position_delta
    }

    /// Records the supporting surface for this step.
    ///
    /// A different surface restarts tracking with zero velocity. The same surface
    /// yields its displacement over `dt`, measured only if the character was
    /// already grounded last step.
    pub fn update(
        &mut self,
        surface: SurfaceRef,
        surface_position: Vector<Real>,
        was_on_ground: bool,
        dt: Real,
    ) {
        if self.surface != Some(surface) {
            debug!(
                target: "character_motor::ground",
                surface = ?surface,
                "connected to new ground surface"
            );
            self.surface = Some(surface);
            self.previous_position = surface_position;
            self.position_delta = Vector::zeros();
            self.velocity = Vector::zeros();
            return;
        }
        if was_on_ground {
            self.position_delta = surface_position - self.previous_position;
            self.velocity = self.position_delta / dt;
        } else {
            self.position_delta = Vector::zeros();
        }
        self.previous_position = surface_position;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
