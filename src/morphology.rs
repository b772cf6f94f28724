use glam::{vec2, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::sim::{BodyHandle, BodySpec, CollisionFilter, JointSpec, Material};

#[derive(Debug, Error, PartialEq)]
pub enum MorphologyError {
    #[error("{field} must be finite and positive, got {value}")]
    NonPositive { field: &'static str, value: f32 },
    #[error("spawn position must be finite, got ({x}, {y})")]
    BadSpawn { x: f32, y: f32 },
}

/// User-facing body configuration. Missing fields take the defaults below;
/// a missing spawn point is derived from the arena size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyParams {
    pub left_leg_length: f32,
    pub left_leg_width: f32,
    pub right_leg_length: f32,
    pub right_leg_width: f32,
    pub body_length: f32,
    pub body_width: f32,
    pub spawn: Option<Vec2>,
}

impl Default for MorphologyParams {
    fn default() -> Self {
        Self {
            left_leg_length: 60.0,
            left_leg_width: 10.0,
            right_leg_length: 60.0,
            right_leg_width: 10.0,
            body_length: 100.0,
            body_width: 20.0,
            spawn: None,
        }
    }
}

impl MorphologyParams {
    pub fn validate(&self) -> Result<(), MorphologyError> {
        let dims = [
            ("left_leg_length", self.left_leg_length),
            ("left_leg_width", self.left_leg_width),
            ("right_leg_length", self.right_leg_length),
            ("right_leg_width", self.right_leg_width),
            ("body_length", self.body_length),
            ("body_width", self.body_width),
        ];
        for (field, value) in dims {
            if !value.is_finite() || value <= 0.0 {
                return Err(MorphologyError::NonPositive { field, value });
            }
        }
        if let Some(spawn) = self.spawn {
            if !spawn.is_finite() {
                return Err(MorphologyError::BadSpawn {
                    x: spawn.x,
                    y: spawn.y,
                });
            }
        }
        Ok(())
    }

    /// Validate and pin down the spawn point for an arena of the given size.
    pub fn resolve(&self, arena_width: f32, arena_height: f32) -> Result<Morphology, MorphologyError> {
        self.validate()?;
        let spawn = self
            .spawn
            .unwrap_or_else(|| vec2(arena_width * 0.1, arena_height * 0.8));
        if !spawn.is_finite() {
            return Err(MorphologyError::BadSpawn {
                x: spawn.x,
                y: spawn.y,
            });
        }
        Ok(Morphology {
            left_leg_length: self.left_leg_length,
            left_leg_width: self.left_leg_width,
            right_leg_length: self.right_leg_length,
            right_leg_width: self.right_leg_width,
            body_length: self.body_length,
            body_width: self.body_width,
            spawn,
        })
    }
}

/// Validated geometry of one runner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Morphology {
    pub left_leg_length: f32,
    pub left_leg_width: f32,
    pub right_leg_length: f32,
    pub right_leg_width: f32,
    pub body_length: f32,
    pub body_width: f32,
    pub spawn: Vec2,
}

/// Body specs in creation order: torso, left leg, right leg.
pub struct BodyPlan {
    pub body: BodySpec,
    pub left_leg: BodySpec,
    pub right_leg: BodySpec,
}

/// Joint specs in creation order.
pub struct JointPlan {
    pub left_joint: JointSpec,
    pub right_joint: JointSpec,
    pub left_muscle: JointSpec,
    pub right_muscle: JointSpec,
}

impl Morphology {
    /// Legs start below the torso ends and get pulled up to the hips on the first ticks.
    pub fn body_plan(&self) -> BodyPlan {
        let inset = config::ANCHOR_INSET;
        let material = Material {
            friction: config::BODY_FRICTION,
            restitution: config::BODY_RESTITUTION,
            density: config::BODY_DENSITY,
        };
        let filter = |category| CollisionFilter {
            category,
            mask: config::GROUND_CATEGORY,
            group: config::RUNNER_GROUP,
        };

        let hip = self.body_length * 0.5 * inset;
        let drop = self.body_width * 2.0;
        let left_center = self.spawn + vec2(-(hip + self.left_leg_length * 0.5 * inset), drop);
        let right_center = self.spawn + vec2(hip + self.right_leg_length * 0.5 * inset, drop);

        BodyPlan {
            body: BodySpec {
                center: self.spawn,
                length: self.body_length,
                width: self.body_width,
                material,
                filter: filter(config::BODY_CATEGORY),
            },
            left_leg: BodySpec {
                center: left_center,
                length: self.left_leg_length,
                width: self.left_leg_width,
                material,
                filter: filter(config::LEFT_LEG_CATEGORY),
            },
            right_leg: BodySpec {
                center: right_center,
                length: self.right_leg_length,
                width: self.right_leg_width,
                material,
                filter: filter(config::RIGHT_LEG_CATEGORY),
            },
        }
    }

    /// Two rigid hips plus two muscles running from each leg's outer end to the torso center.
    pub fn joint_plan(&self, body: BodyHandle, left_leg: BodyHandle, right_leg: BodyHandle) -> JointPlan {
        let inset = config::ANCHOR_INSET;
        let half_body = self.body_length * 0.5 * inset;
        let half_left = self.left_leg_length * 0.5 * inset;
        let half_right = self.right_leg_length * 0.5 * inset;

        JointPlan {
            left_joint: JointSpec {
                body_a: left_leg,
                body_b: body,
                anchor_a: half_left,
                anchor_b: -half_body,
                length: 0.0,
                stiffness: 1.0,
            },
            right_joint: JointSpec {
                body_a: right_leg,
                body_b: body,
                anchor_a: -half_right,
                anchor_b: half_body,
                length: 0.0,
                stiffness: 1.0,
            },
            left_muscle: JointSpec {
                body_a: left_leg,
                body_b: body,
                anchor_a: -half_left,
                anchor_b: 0.0,
                length: self.rest_muscle_length(self.left_leg_length),
                stiffness: 1.0,
            },
            right_muscle: JointSpec {
                body_a: right_leg,
                body_b: body,
                anchor_a: half_right,
                anchor_b: 0.0,
                length: self.rest_muscle_length(self.right_leg_length),
                stiffness: 1.0,
            },
        }
    }

    fn rest_muscle_length(&self, leg_length: f32) -> f32 {
        (config::ANCHOR_INSET * (leg_length * 0.5 + self.body_length * 0.5))
            .clamp(config::MUSCLE_MIN_LENGTH, config::MUSCLE_MAX_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_spawn_relative_to_arena() {
        let m = MorphologyParams::default().resolve(1000.0, 500.0).unwrap();
        assert_eq!(m.spawn, vec2(100.0, 400.0));
        assert_eq!(m.body_length, 100.0);
        assert_eq!(m.left_leg_length, 60.0);
    }

    #[test]
    fn explicit_spawn_wins_over_arena_default() {
        let params = MorphologyParams {
            spawn: Some(vec2(12.0, 34.0)),
            ..Default::default()
        };
        assert_eq!(params.resolve(1000.0, 500.0).unwrap().spawn, vec2(12.0, 34.0));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let params: MorphologyParams = serde_json::from_str(r#"{"body_length": 80.0}"#).unwrap();
        assert_eq!(params.body_length, 80.0);
        assert_eq!(params.body_width, 20.0);
        assert_eq!(params.spawn, None);
    }

    #[test]
    fn non_positive_dimensions_are_rejected() {
        let params = MorphologyParams {
            right_leg_width: 0.0,
            ..Default::default()
        };
        assert_eq!(
            params.validate(),
            Err(MorphologyError::NonPositive {
                field: "right_leg_width",
                value: 0.0
            })
        );

        let params = MorphologyParams {
            body_length: f32::NAN,
            ..Default::default()
        };
        assert!(params.resolve(100.0, 100.0).is_err());
    }

    #[test]
    fn hip_anchors_line_up_horizontally() {
        let m = MorphologyParams::default().resolve(1000.0, 500.0).unwrap();
        let plan = m.body_plan();
        let dummy = BodyHandle {
            index: 0,
            generation: 0,
        };
        let joints = m.joint_plan(dummy, dummy, dummy);

        let left_anchor = plan.left_leg.center.x + joints.left_joint.anchor_a;
        let left_hip = plan.body.center.x + joints.left_joint.anchor_b;
        assert!((left_anchor - left_hip).abs() < 1e-4);

        let right_anchor = plan.right_leg.center.x + joints.right_joint.anchor_a;
        let right_hip = plan.body.center.x + joints.right_joint.anchor_b;
        assert!((right_anchor - right_hip).abs() < 1e-4);

        assert!(plan.left_leg.center.y > plan.body.center.y);
        assert_eq!(plan.left_leg.center.y, plan.right_leg.center.y);
    }

    #[test]
    fn rest_muscles_start_inside_operating_range() {
        let m = MorphologyParams::default().resolve(1000.0, 500.0).unwrap();
        let dummy = BodyHandle {
            index: 0,
            generation: 0,
        };
        let joints = m.joint_plan(dummy, dummy, dummy);
        for muscle in [joints.left_muscle, joints.right_muscle] {
            assert!((muscle.length - 64.0).abs() < 1e-4);
            assert!(muscle.length >= config::MUSCLE_MIN_LENGTH);
            assert!(muscle.length <= config::MUSCLE_MAX_LENGTH);
        }
    }
}
