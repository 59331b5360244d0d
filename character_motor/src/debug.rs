//! Optional geometry observer for motor debugging.

use rapier3d::math::Point;
use rapier3d::prelude::Real;

pub type DebugColor = [f32; 4];

pub const COLOR_GROUND_PROBE: DebugColor = [0.2, 0.9, 0.2, 1.0];
pub const COLOR_SLOPE: DebugColor = [0.2, 0.9, 0.9, 1.0];
pub const COLOR_VELOCITY: DebugColor = [0.95, 0.9, 0.1, 1.0];
pub const COLOR_CONTACT_FLAT: DebugColor = [1.0, 1.0, 1.0, 1.0];
pub const COLOR_CONTACT: DebugColor = [0.5, 0.5, 0.5, 1.0];

/// Receives lines the motor emits while stepping. Stepping without a sink
/// produces the same simulation results.
pub trait MotorDebugSink {
    fn draw_line(&mut self, start: Point<Real>, end: Point<Real>, color: DebugColor);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: [f32; 3],
    pub end: [f32; 3],
    pub color: DebugColor,
}

#[derive(Clone, Debug, Default)]
pub struct DebugLines {
    pub lines: Vec<DebugLine>,
}

impl MotorDebugSink for DebugLines {
    fn draw_line(&mut self, start: Point<Real>, end: Point<Real>, color: DebugColor) {
        self.lines.push(DebugLine {
            start: [start.x, start.y, start.z],
            end: [end.x, end.y, end.z],
            color,
        });
    }
}
