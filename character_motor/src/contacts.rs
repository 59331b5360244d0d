//! Per-step collision contacts: buffering and ground/ceiling evaluation.

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use tracing::warn;

use crate::host::SurfaceRef;

/// Margin applied to normal up-components before classifying a contact.
pub const CONTACT_NORMAL_EPSILON: Real = 0.001;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactPoint {
    pub point: Point<Real>,
    /// Contact normal pointing away from the other collider.
    pub normal: Vector<Real>,
}

/// All contact points reported against one other collider during a step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Collision {
    pub surface: Option<SurfaceRef>,
    pub contacts: Vec<ContactPoint>,
}

impl Collision {
    pub fn new(surface: Option<SurfaceRef>, contacts: Vec<ContactPoint>) -> Self {
        Self { surface, contacts }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContactKind {
    Ground,
    Ceiling,
    Other,
}

pub fn classify_contact(normal: &Vector<Real>, min_ground_angle_dot: Real) -> ContactKind {
    if normal.y > min_ground_angle_dot + CONTACT_NORMAL_EPSILON {
        ContactKind::Ground
    } else if normal.y < -CONTACT_NORMAL_EPSILON {
        ContactKind::Ceiling
    } else {
        ContactKind::Other
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContactSummary {
    pub has_any_contact: bool,
    pub touching_ground: bool,
    pub touching_ceiling: bool,
    /// Mean of per-collision ground normals; up when there is no ground contact.
    pub ground_normal: Vector<Real>,
    /// Mean height of all ground contact points.
    pub ground_height: Real,
}

impl Default for ContactSummary {
    fn default() -> Self {
        Self {
            has_any_contact: false,
            touching_ground: false,
            touching_ceiling: false,
            ground_normal: Vector::y(),
            ground_height: 0.0,
        }
    }
}

/// Classifies every contact and averages ground normals per collision, then across
/// collisions, so each colliding body weighs the same regardless of its point count.
pub fn evaluate_contacts(collisions: &[Collision], min_ground_angle_dot: Real) -> ContactSummary {
    let mut summary = ContactSummary::default();
    let mut normal_sum = Vector::zeros();
    let mut ground_collisions = 0usize;
    let mut ground_points = 0usize;

    for collision in collisions {
        let mut collision_normal_sum = Vector::zeros();
        let mut collision_ground_points = 0usize;
        for contact in &collision.contacts {
            summary.has_any_contact = true;
            match classify_contact(&contact.normal, min_ground_angle_dot) {
                ContactKind::Ground => {
                    collision_normal_sum += contact.normal;
                    collision_ground_points += 1;
                    ground_points += 1;
                    let n = ground_points as Real;
                    summary.ground_height += (contact.point.y - summary.ground_height) / n;
                }
                ContactKind::Ceiling => summary.touching_ceiling = true,
                ContactKind::Other => {}
            }
        }
        if collision_ground_points > 0 {
            normal_sum += collision_normal_sum / collision_ground_points as Real;
            ground_collisions += 1;
        }
    }

    if ground_collisions > 0 {
        summary.touching_ground = true;
        summary.ground_normal = normal_sum / ground_collisions as Real;
    }
    summary
}

/// Collision events delivered by the host between steps. Bounded; drained once per step.
#[derive(Clone, Debug)]
pub struct CollisionQueue {
    events: Vec<Collision>,
    capacity: usize,
    dropped: usize,
}

impl CollisionQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        if self.events.len() > self.capacity {
            self.dropped += self.events.len() - self.capacity;
            self.events.truncate(self.capacity);
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Queues a collision; returns `false` when the queue is full and the event was dropped.
    pub fn push(&mut self, collision: Collision) -> bool {
        if self.events.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.events.push(collision);
        true
    }

    /// Moves every queued event into `out` (cleared first), leaving the queue empty.
    /// Both buffers keep their allocations.
    pub fn drain_into(&mut self, out: &mut Vec<Collision>) {
        if self.dropped > 0 {
            warn!(
                target: "character_motor::contacts",
                dropped = self.dropped,
                capacity = self.capacity,
                "collision queue overflowed; events dropped"
            );
            self.dropped = 0;
        }
        out.clear();
        out.append(&mut self.events);
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped = 0;
    }
}
