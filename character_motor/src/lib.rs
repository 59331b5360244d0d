#![forbid(unsafe_code)]
//! Kinematic floating-capsule character motor.
//!
//! The motor keeps a capsule hovering `step_height` above the ground, detects
//! ground with a downward probe, follows slopes and moving platforms, and commits
//! one velocity per fixed step to a host body. Physics access goes through the
//! [`host::ShapeCaster`] and [`host::MotorBody`] traits.

pub mod config;
pub mod contacts;
pub mod debug;
pub mod geometry;
pub mod ground_state;
pub mod host;
pub mod motor;
pub mod sensor;
pub mod velocity;

pub use config::{LayerMask, MotorConfig, MotorConfigError, MotorDebugConfig, VelocityMode};
pub use contacts::{Collision, ContactPoint, ContactSummary};
pub use debug::{DebugLine, DebugLines, MotorDebugSink};
pub use geometry::{ColliderGeometry, GroundThresholds};
pub use ground_state::GroundTransition;
pub use host::{CastHit, MotorBody, MotorHost, ShapeCaster, SurfaceRef};
pub use motor::{CharacterMotor, MotorStepOutput};
pub use sensor::GroundInfo;
