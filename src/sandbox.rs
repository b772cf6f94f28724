//! Minimal deterministic world used to exercise the evolutionary core.
//!
//! Bodies are rods: two Verlet endpoints held at a fixed distance. Joints are
//! distance constraints between points along rod axes. The only collider is a
//! flat ground line. Velocities are reported as displacement per tick.

use glam::{vec2, Vec2};

use crate::config;
use crate::sim::{
    BodyHandle, BodySpec, BodyState, Handle, JointHandle, JointSpec, Material, SimError, Simulation,
};

const VELOCITY_RETAIN: f32 = 0.999;

/// Slot storage with generational handles and a free list.
struct Arena<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_list: Vec<u32>,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn spawn(&mut self, item: T) -> (u32, u32) {
        if let Some(index) = self.free_list.pop() {
            let idx = index as usize;
            self.slots[idx] = Some(item);
            (index, self.generations[idx])
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Some(item));
            self.generations.push(0);
            (index, 0)
        }
    }

    fn contains(&self, index: u32, generation: u32) -> bool {
        self.get(index, generation).is_some()
    }

    fn despawn(&mut self, index: u32, generation: u32) -> bool {
        let idx = index as usize;
        if self.contains(index, generation) {
            self.slots[idx] = None;
            self.generations[idx] += 1;
            self.free_list.push(index);
            true
        } else {
            false
        }
    }

    fn get(&self, index: u32, generation: u32) -> Option<&T> {
        let idx = index as usize;
        if idx < self.slots.len() && self.generations[idx] == generation {
            self.slots[idx].as_ref()
        } else {
            None
        }
    }

    fn get_mut(&mut self, index: u32, generation: u32) -> Option<&mut T> {
        let idx = index as usize;
        if idx < self.slots.len() && self.generations[idx] == generation {
            self.slots[idx].as_mut()
        } else {
            None
        }
    }

    fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

struct Rod {
    ends: [Vec2; 2],
    prev_ends: [Vec2; 2],
    half_length: f32,
    half_width: f32,
    material: Material,
    in_world: bool,
}

impl Rod {
    fn center(&self) -> Vec2 {
        (self.ends[0] + self.ends[1]) * 0.5
    }

    fn prev_center(&self) -> Vec2 {
        (self.prev_ends[0] + self.prev_ends[1]) * 0.5
    }

    fn angle(&self) -> f32 {
        let axis = self.ends[1] - self.ends[0];
        axis.y.atan2(axis.x)
    }

    /// Interpolation weight of an axis offset between the two ends.
    fn weight(&self, offset: f32) -> f32 {
        (0.5 + offset / (2.0 * self.half_length)).clamp(0.0, 1.0)
    }

    fn point(&self, offset: f32) -> Vec2 {
        let t = self.weight(offset);
        self.ends[0].lerp(self.ends[1], t)
    }

    fn nudge(&mut self, offset: f32, correction: Vec2) {
        let t = self.weight(offset);
        let norm = (1.0 - t) * (1.0 - t) + t * t;
        self.ends[0] += correction * ((1.0 - t) / norm);
        self.ends[1] += correction * (t / norm);
    }

    fn keep_length(&mut self) {
        let delta = self.ends[1] - self.ends[0];
        let d = delta.length();
        if d < 1e-6 {
            return;
        }
        let push = delta * ((d - 2.0 * self.half_length) / d) * 0.5;
        self.ends[0] += push;
        self.ends[1] -= push;
    }
}

struct Joint {
    spec: JointSpec,
    in_world: bool,
}

/// Rod-and-constraint world with a flat floor.
pub struct Sandbox {
    bodies: Arena<Rod>,
    joints: Arena<Joint>,
    width: f32,
    ground_y: f32,
    gravity: f32,
    pub tick_count: u64,
}

impl Sandbox {
    pub fn new(width: f32, ground_y: f32) -> Self {
        Self {
            bodies: Arena::new(),
            joints: Arena::new(),
            width,
            ground_y,
            gravity: config::GRAVITY,
            tick_count: 0,
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.count()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.count()
    }

    fn check(&self, handle: Handle) -> Result<(), SimError> {
        match handle {
            Handle::Body(b) if !self.bodies.contains(b.index, b.generation) => {
                Err(SimError::UnknownBody(b))
            }
            Handle::Joint(j) if !self.joints.contains(j.index, j.generation) => {
                Err(SimError::UnknownJoint(j))
            }
            _ => Ok(()),
        }
    }

    fn rod(&self, body: BodyHandle) -> Result<&Rod, SimError> {
        self.bodies
            .get(body.index, body.generation)
            .ok_or(SimError::UnknownBody(body))
    }

    fn integrate(&mut self, dt: f32) {
        let gravity = vec2(0.0, self.gravity * dt * dt);
        for rod in self.bodies.slots.iter_mut().flatten() {
            if !rod.in_world {
                continue;
            }
            for i in 0..2 {
                let pos = rod.ends[i];
                let step = (pos - rod.prev_ends[i]) * VELOCITY_RETAIN;
                rod.prev_ends[i] = pos;
                rod.ends[i] = pos + step + gravity;
            }
        }
    }

    fn solve_joints(&mut self) {
        for slot in 0..self.joints.slots.len() {
            let spec = match &self.joints.slots[slot] {
                Some(joint) if joint.in_world => joint.spec,
                _ => continue,
            };
            let (pa, pb) = match (
                self.bodies.get(spec.body_a.index, spec.body_a.generation),
                self.bodies.get(spec.body_b.index, spec.body_b.generation),
            ) {
                (Some(a), Some(b)) if a.in_world && b.in_world => {
                    (a.point(spec.anchor_a), b.point(spec.anchor_b))
                }
                _ => continue,
            };

            let delta = pb - pa;
            let d = delta.length();
            if d < 1e-6 {
                continue;
            }
            let correction = delta * ((d - spec.length) / d) * 0.5 * spec.stiffness;

            if let Some(a) = self.bodies.get_mut(spec.body_a.index, spec.body_a.generation) {
                a.nudge(spec.anchor_a, correction);
            }
            if let Some(b) = self.bodies.get_mut(spec.body_b.index, spec.body_b.generation) {
                b.nudge(spec.anchor_b, -correction);
            }
        }
    }

    fn collide_ground(&mut self) {
        let ground_y = self.ground_y;
        for rod in self.bodies.slots.iter_mut().flatten() {
            if !rod.in_world {
                continue;
            }
            let floor = ground_y - rod.half_width;
            for i in 0..2 {
                if rod.ends[i].y > floor {
                    let fall = rod.ends[i].y - rod.prev_ends[i].y;
                    rod.ends[i].y = floor;
                    rod.prev_ends[i].y = floor + fall * rod.material.restitution;
                    // Full friction pins the contact point horizontally.
                    let slide = rod.ends[i].x - rod.prev_ends[i].x;
                    rod.ends[i].x -= slide * rod.material.friction.clamp(0.0, 1.0);
                }
            }
        }
    }
}

impl Simulation for Sandbox {
    fn create_body(&mut self, spec: &BodySpec) -> Result<BodyHandle, SimError> {
        if !(spec.length.is_finite() && spec.length > 0.0)
            || !(spec.width.is_finite() && spec.width > 0.0)
            || !spec.center.is_finite()
        {
            return Err(SimError::InvalidGeometry(format!(
                "body {}x{} at {:?}",
                spec.length, spec.width, spec.center
            )));
        }
        let half = vec2(spec.length * 0.5, 0.0);
        let ends = [spec.center - half, spec.center + half];
        let (index, generation) = self.bodies.spawn(Rod {
            ends,
            prev_ends: ends,
            half_length: spec.length * 0.5,
            half_width: spec.width * 0.5,
            material: spec.material,
            in_world: false,
        });
        Ok(BodyHandle { index, generation })
    }

    fn create_joint(&mut self, spec: &JointSpec) -> Result<JointHandle, SimError> {
        self.rod(spec.body_a)?;
        self.rod(spec.body_b)?;
        if !(spec.length.is_finite() && spec.length >= 0.0)
            || !(spec.stiffness > 0.0 && spec.stiffness <= 1.0)
        {
            return Err(SimError::InvalidGeometry(format!(
                "joint length {} stiffness {}",
                spec.length, spec.stiffness
            )));
        }
        let (index, generation) = self.joints.spawn(Joint {
            spec: *spec,
            in_world: false,
        });
        Ok(JointHandle { index, generation })
    }

    fn add_group(&mut self, handles: &[Handle]) -> Result<(), SimError> {
        for handle in handles {
            self.check(*handle)?;
        }
        for handle in handles {
            match handle {
                Handle::Body(b) => {
                    if let Some(rod) = self.bodies.get_mut(b.index, b.generation) {
                        rod.in_world = true;
                    }
                }
                Handle::Joint(j) => {
                    if let Some(joint) = self.joints.get_mut(j.index, j.generation) {
                        joint.in_world = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn remove_group(&mut self, handles: &[Handle]) -> Result<(), SimError> {
        for handle in handles {
            self.check(*handle)?;
        }
        for handle in handles {
            match handle {
                Handle::Body(b) => {
                    self.bodies.despawn(b.index, b.generation);
                }
                Handle::Joint(j) => {
                    self.joints.despawn(j.index, j.generation);
                }
            }
        }
        Ok(())
    }

    fn body_state(&self, body: BodyHandle) -> Result<BodyState, SimError> {
        let rod = self.rod(body)?;
        Ok(BodyState {
            position: rod.center(),
            velocity: rod.center() - rod.prev_center(),
            angle: rod.angle(),
        })
    }

    fn joint_length(&self, joint: JointHandle) -> Result<f32, SimError> {
        self.joints
            .get(joint.index, joint.generation)
            .map(|j| j.spec.length)
            .ok_or(SimError::UnknownJoint(joint))
    }

    fn set_joint_length(&mut self, joint: JointHandle, length: f32) -> Result<(), SimError> {
        let j = self
            .joints
            .get_mut(joint.index, joint.generation)
            .ok_or(SimError::UnknownJoint(joint))?;
        j.spec.length = length;
        Ok(())
    }

    fn ground_y(&self) -> f32 {
        self.ground_y
    }

    fn width(&self) -> f32 {
        self.width
    }

    fn step(&mut self, dt: f32) {
        self.integrate(dt);
        for _ in 0..config::CONSTRAINT_ITERATIONS {
            self.solve_joints();
            for rod in self.bodies.slots.iter_mut().flatten() {
                if rod.in_world {
                    rod.keep_length();
                }
            }
            self.collide_ground();
        }
        self.tick_count += 1;
    }
}
