//! Narrow interface to the physics collaborator.
//!
//! The core never owns rigid-body dynamics. It describes bodies and joints,
//! reads back their pose, and writes muscle lengths. Any engine that can do
//! that implements [`Simulation`].

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("unknown body handle {0:?}")]
    UnknownBody(BodyHandle),
    #[error("unknown joint handle {0:?}")]
    UnknownJoint(JointHandle),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

/// Opaque reference to a rigid body owned by the simulation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct BodyHandle {
    pub index: u32,
    pub generation: u32,
}

/// Opaque reference to a joint constraint owned by the simulation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct JointHandle {
    pub index: u32,
    pub generation: u32,
}

/// Either kind of handle, for grouped add/remove.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Handle {
    Body(BodyHandle),
    Joint(JointHandle),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub friction: f32,
    pub restitution: f32,
    pub density: f32,
}

/// Collision filtering in the category/mask/group style.
/// Bodies sharing a negative group never collide with each other.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollisionFilter {
    pub category: u32,
    pub mask: u32,
    pub group: i32,
}

/// Rectangle body, axis along its length, created at rest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodySpec {
    pub center: Vec2,
    pub length: f32,
    pub width: f32,
    pub material: Material,
    pub filter: CollisionFilter,
}

/// Distance constraint between two local anchor points.
/// Anchors are offsets along each body's axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointSpec {
    pub body_a: BodyHandle,
    pub body_b: BodyHandle,
    pub anchor_a: f32,
    pub anchor_b: f32,
    pub length: f32,
    pub stiffness: f32,
}

/// Pose and velocity of one body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub angle: f32,
}

pub trait Simulation {
    /// Create a body. It takes part in physics only after [`Simulation::add_group`].
    fn create_body(&mut self, spec: &BodySpec) -> Result<BodyHandle, SimError>;

    fn create_joint(&mut self, spec: &JointSpec) -> Result<JointHandle, SimError>;

    /// Register a set of handles with the world in one step.
    fn add_group(&mut self, handles: &[Handle]) -> Result<(), SimError>;

    /// Remove and destroy a set of handles in one step.
    fn remove_group(&mut self, handles: &[Handle]) -> Result<(), SimError>;

    fn body_state(&self, body: BodyHandle) -> Result<BodyState, SimError>;

    fn joint_length(&self, joint: JointHandle) -> Result<f32, SimError>;

    fn set_joint_length(&mut self, joint: JointHandle, length: f32) -> Result<(), SimError>;

    /// Height of the ground surface in screen coordinates (y grows downward).
    fn ground_y(&self) -> f32;

    /// Horizontal extent used to normalize heights.
    fn width(&self) -> f32;

    /// Advance physics by one fixed tick.
    fn step(&mut self, dt: f32);
}
