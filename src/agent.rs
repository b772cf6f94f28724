use rand::Rng;
use thiserror::Error;

use crate::brain::{BrainError, NeuralController};
use crate::config;
use crate::morphology::Morphology;
use crate::sim::{BodyHandle, Handle, JointHandle, JointSpec, SimError, Simulation};

#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Brain(#[from] BrainError),
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error("agent {0} is not attached to a simulation")]
    Detached(usize),
    #[error("controller produced {actual} outputs, runner needs {expected}")]
    OutputCount { expected: usize, actual: usize },
}

/// Everything one runner owns inside the simulation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunnerHandles {
    pub body: BodyHandle,
    pub left_leg: BodyHandle,
    pub right_leg: BodyHandle,
    pub left_joint: JointHandle,
    pub right_joint: JointHandle,
    pub left_muscle: JointHandle,
    pub right_muscle: JointHandle,
}

impl RunnerHandles {
    pub fn group(&self) -> [Handle; 7] {
        [
            Handle::Body(self.body),
            Handle::Body(self.left_leg),
            Handle::Body(self.right_leg),
            Handle::Joint(self.left_joint),
            Handle::Joint(self.right_joint),
            Handle::Joint(self.left_muscle),
            Handle::Joint(self.right_muscle),
        ]
    }
}

/// Muscle lengths written during one `act` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MuscleCommand {
    pub left: f32,
    pub right: f32,
}

/// One bipedal runner: a body plan plus the controller that drives it.
#[derive(Debug)]
pub struct Agent {
    pub id: usize,
    /// Raw episode score. Signed and unbounded.
    pub score: f64,
    /// Share of the generation's score, set once per generation.
    pub fitness: f64,
    morphology: Morphology,
    brain: NeuralController,
    handles: Option<RunnerHandles>,
}

impl Agent {
    pub fn new(id: usize, morphology: Morphology, rng: &mut impl Rng) -> Self {
        Self::with_brain(id, morphology, NeuralController::for_runner(rng))
    }

    pub fn with_brain(id: usize, morphology: Morphology, brain: NeuralController) -> Self {
        Self {
            id,
            score: 0.0,
            fitness: 0.0,
            morphology,
            brain,
            handles: None,
        }
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn brain(&self) -> &NeuralController {
        &self.brain
    }

    pub fn handles(&self) -> Option<&RunnerHandles> {
        self.handles.as_ref()
    }

    pub fn is_attached(&self) -> bool {
        self.handles.is_some()
    }

    /// Same body and an independent copy of the controller, outside any simulation.
    pub fn clone_detached(&self) -> Self {
        Self::with_brain(self.id, self.morphology, self.brain.clone())
    }

    /// Create the body, both legs, both hips and both muscles and register them as one group.
    /// Attaching an attached agent does nothing.
    pub fn attach(&mut self, sim: &mut impl Simulation) -> Result<(), AgentError> {
        if self.handles.is_some() {
            return Ok(());
        }
        let mut created = Vec::with_capacity(7);
        match self.build(sim, &mut created) {
            Ok(handles) => {
                self.handles = Some(handles);
                Ok(())
            }
            Err(err) => {
                // Nothing half-built is left behind.
                let _ = sim.remove_group(&created);
                Err(err)
            }
        }
    }

    fn build(
        &self,
        sim: &mut impl Simulation,
        created: &mut Vec<Handle>,
    ) -> Result<RunnerHandles, AgentError> {
        let bodies = self.morphology.body_plan();
        let body = sim.create_body(&bodies.body)?;
        created.push(Handle::Body(body));
        let left_leg = sim.create_body(&bodies.left_leg)?;
        created.push(Handle::Body(left_leg));
        let right_leg = sim.create_body(&bodies.right_leg)?;
        created.push(Handle::Body(right_leg));

        let joints = self.morphology.joint_plan(body, left_leg, right_leg);
        let mut joint = |spec: &JointSpec| -> Result<JointHandle, AgentError> {
            let handle = sim.create_joint(spec)?;
            created.push(Handle::Joint(handle));
            Ok(handle)
        };
        let left_joint = joint(&joints.left_joint)?;
        let right_joint = joint(&joints.right_joint)?;
        let left_muscle = joint(&joints.left_muscle)?;
        let right_muscle = joint(&joints.right_muscle)?;

        let handles = RunnerHandles {
            body,
            left_leg,
            right_leg,
            left_joint,
            right_joint,
            left_muscle,
            right_muscle,
        };
        sim.add_group(&handles.group())?;
        Ok(handles)
    }

    /// Remove the whole group from the simulation, then release the controller.
    /// Safe to call again on a detached agent. If removal fails the agent stays attached.
    pub fn detach(&mut self, sim: &mut impl Simulation) -> Result<(), AgentError> {
        if let Some(handles) = &self.handles {
            sim.remove_group(&handles.group())?;
            self.handles = None;
        }
        self.brain.release();
        Ok(())
    }

    /// Tear the agent down for good. Bodies and controller go together.
    pub fn retire(mut self, sim: &mut impl Simulation) -> Result<(), AgentError> {
        self.detach(sim)
    }

    fn attached(&self) -> Result<&RunnerHandles, AgentError> {
        self.handles.as_ref().ok_or(AgentError::Detached(self.id))
    }

    /// Controller inputs, in order: body, left leg and right leg height above ground
    /// (scaled by arena width), body velocity x and y, left and right muscle length
    /// (scaled), body angle, left leg angle, right leg angle.
    pub fn sense(&self, sim: &impl Simulation) -> Result<[f32; config::BRAIN_INPUTS], AgentError> {
        let h = self.attached()?;
        let ground = sim.ground_y();
        let scale = sim.width();

        let body = sim.body_state(h.body)?;
        let left = sim.body_state(h.left_leg)?;
        let right = sim.body_state(h.right_leg)?;
        let left_muscle = sim.joint_length(h.left_muscle)?;
        let right_muscle = sim.joint_length(h.right_muscle)?;

        Ok([
            (ground - body.position.y) / scale,
            (ground - left.position.y) / scale,
            (ground - right.position.y) / scale,
            body.velocity.x,
            body.velocity.y,
            left_muscle / config::MUSCLE_NORMALIZER,
            right_muscle / config::MUSCLE_NORMALIZER,
            body.angle,
            left.angle,
            right.angle,
        ])
    }

    /// One control decision: each output above the threshold lengthens its muscle.
    pub fn act(&mut self, sim: &mut impl Simulation) -> Result<MuscleCommand, AgentError> {
        let inputs = self.sense(&*sim)?;
        let outputs = self.brain.predict(&inputs)?;
        let (Some(&left_out), Some(&right_out)) = (outputs.first(), outputs.get(1)) else {
            return Err(AgentError::OutputCount {
                expected: config::BRAIN_OUTPUTS,
                actual: outputs.len(),
            });
        };
        let h = *self.attached()?;

        let left = muscle_target(sim.joint_length(h.left_muscle)?, left_out);
        let right = muscle_target(sim.joint_length(h.right_muscle)?, right_out);
        sim.set_joint_length(h.left_muscle, left)?;
        sim.set_joint_length(h.right_muscle, right)?;

        Ok(MuscleCommand { left, right })
    }

    /// Accumulate this tick's score and return the increment.
    pub fn update_fitness_score(&mut self, sim: &impl Simulation) -> Result<f64, AgentError> {
        let h = self.attached()?;
        let body = sim.body_state(h.body)?;
        let delta = score_delta(
            body.position.x - self.morphology.spawn.x,
            body.velocity.x,
            body.angle,
        );
        self.score += delta;
        Ok(delta)
    }

    /// Child keeps our body; its controller is spliced from both parents.
    pub fn crossover(&self, partner: &Agent, rng: &mut impl Rng) -> Result<Agent, AgentError> {
        let brain = self.brain.crossover(&partner.brain, rng)?;
        Ok(Agent::with_brain(self.id, self.morphology, brain))
    }

    pub fn mutate(&mut self, rng: &mut impl Rng) -> Result<(), AgentError> {
        self.brain
            .mutate(rng, config::MUTATION_RATE, config::MUTATION_SIGMA)?;
        Ok(())
    }
}

/// Step a muscle toward longer or shorter, kept inside its operating range.
pub fn muscle_target(current: f32, output: f32) -> f32 {
    let shift = if output > config::MOTOR_THRESHOLD {
        config::MUSCLE_STEP
    } else {
        -config::MUSCLE_STEP
    };
    (current + shift).clamp(config::MUSCLE_MIN_LENGTH, config::MUSCLE_MAX_LENGTH)
}

/// Displacement from spawn times horizontal velocity, weighted up while the torso is level.
pub fn score_delta(displacement: f32, velocity: f32, tilt: f32) -> f64 {
    let balance = if tilt.abs() < config::BALANCE_ANGLE {
        config::BALANCED_WEIGHT
    } else {
        config::UNBALANCED_WEIGHT
    };
    displacement as f64 * balance * velocity as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::MorphologyParams;
    use crate::sandbox::Sandbox;
    use crate::sim::{BodySpec, BodyState};
    use glam::{vec2, Vec2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn morphology() -> Morphology {
        MorphologyParams::default()
            .resolve(config::ARENA_WIDTH, config::ARENA_HEIGHT)
            .unwrap()
    }

    /// Simulation whose body poses are set directly by the test.
    #[derive(Default)]
    struct Puppet {
        bodies: Vec<BodyState>,
        joints: Vec<f32>,
        poses: HashMap<u32, BodyState>,
        removed: usize,
        fail_joints: bool,
        fail_removal: bool,
    }

    impl Simulation for Puppet {
        fn create_body(&mut self, spec: &BodySpec) -> Result<BodyHandle, SimError> {
            self.bodies.push(BodyState {
                position: spec.center,
                velocity: Vec2::ZERO,
                angle: 0.0,
            });
            Ok(BodyHandle {
                index: self.bodies.len() as u32 - 1,
                generation: 0,
            })
        }

        fn create_joint(&mut self, spec: &JointSpec) -> Result<JointHandle, SimError> {
            if self.fail_joints {
                return Err(SimError::InvalidGeometry("joint".into()));
            }
            self.joints.push(spec.length);
            Ok(JointHandle {
                index: self.joints.len() as u32 - 1,
                generation: 0,
            })
        }

        fn add_group(&mut self, _handles: &[Handle]) -> Result<(), SimError> {
            Ok(())
        }

        fn remove_group(&mut self, handles: &[Handle]) -> Result<(), SimError> {
            if self.fail_removal {
                return Err(SimError::InvalidGeometry("removal".into()));
            }
            self.removed += handles.len();
            Ok(())
        }

        fn body_state(&self, body: BodyHandle) -> Result<BodyState, SimError> {
            if let Some(pose) = self.poses.get(&body.index) {
                return Ok(*pose);
            }
            self.bodies
                .get(body.index as usize)
                .copied()
                .ok_or(SimError::UnknownBody(body))
        }

        fn joint_length(&self, joint: JointHandle) -> Result<f32, SimError> {
            self.joints
                .get(joint.index as usize)
                .copied()
                .ok_or(SimError::UnknownJoint(joint))
        }

        fn set_joint_length(&mut self, joint: JointHandle, length: f32) -> Result<(), SimError> {
            let slot = self
                .joints
                .get_mut(joint.index as usize)
                .ok_or(SimError::UnknownJoint(joint))?;
            *slot = length;
            Ok(())
        }

        fn ground_y(&self) -> f32 {
            500.0
        }

        fn width(&self) -> f32 {
            1000.0
        }

        fn step(&mut self, _dt: f32) {}
    }

    #[test]
    fn new_agent_starts_detached_with_runner_controller() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let agent = Agent::new(3, morphology(), &mut rng);
        assert_eq!(agent.id, 3);
        assert_eq!(agent.score, 0.0);
        assert_eq!(agent.brain().shape(), [10, 25, 2]);
        assert!(!agent.is_attached());
    }

    #[test]
    fn attach_and_detach_move_the_whole_group() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut world = Sandbox::new(config::ARENA_WIDTH, config::GROUND_Y);
        let mut agent = Agent::new(0, morphology(), &mut rng);

        agent.attach(&mut world).unwrap();
        agent.attach(&mut world).unwrap();
        assert_eq!(world.body_count(), 3);
        assert_eq!(world.joint_count(), 4);

        agent.detach(&mut world).unwrap();
        assert_eq!(world.body_count(), 0);
        assert_eq!(world.joint_count(), 0);
        assert!(agent.brain().is_released());

        agent.detach(&mut world).unwrap();
        assert!(!agent.is_attached());
    }

    #[test]
    fn failed_attach_cleans_up_created_bodies() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut sim = Puppet {
            fail_joints: true,
            ..Default::default()
        };
        let mut agent = Agent::new(0, morphology(), &mut rng);

        assert!(matches!(agent.attach(&mut sim), Err(AgentError::Sim(_))));
        assert!(!agent.is_attached());
        assert_eq!(sim.removed, 3);
    }

    #[test]
    fn failed_detach_keeps_handles_and_controller() {
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        let mut sim = Puppet::default();
        let mut agent = Agent::new(0, morphology(), &mut rng);
        agent.attach(&mut sim).unwrap();

        sim.fail_removal = true;
        assert!(matches!(agent.detach(&mut sim), Err(AgentError::Sim(_))));
        assert!(agent.is_attached());
        assert!(!agent.brain().is_released());

        sim.fail_removal = false;
        agent.detach(&mut sim).unwrap();
        assert!(!agent.is_attached());
        assert!(agent.brain().is_released());
        assert_eq!(sim.removed, 7);
    }

    #[test]
    fn single_output_controller_cannot_drive_both_legs() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let brain = NeuralController::new(config::BRAIN_INPUTS, 4, 1, &mut rng).unwrap();
        let mut sim = Puppet::default();
        let mut agent = Agent::with_brain(0, morphology(), brain);
        agent.attach(&mut sim).unwrap();

        assert_eq!(
            agent.act(&mut sim),
            Err(AgentError::OutputCount {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn sense_reports_inputs_in_fixed_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut sim = Puppet::default();
        let mut agent = Agent::new(0, morphology(), &mut rng);
        agent.attach(&mut sim).unwrap();
        let h = *agent.handles().unwrap();

        sim.poses.insert(
            h.body.index,
            BodyState {
                position: vec2(300.0, 400.0),
                velocity: vec2(1.5, -0.5),
                angle: 0.1,
            },
        );
        sim.poses.insert(
            h.left_leg.index,
            BodyState {
                position: vec2(250.0, 450.0),
                velocity: Vec2::ZERO,
                angle: -0.3,
            },
        );
        sim.poses.insert(
            h.right_leg.index,
            BodyState {
                position: vec2(350.0, 480.0),
                velocity: Vec2::ZERO,
                angle: 0.7,
            },
        );

        let inputs = agent.sense(&sim).unwrap();
        let expected = [0.1, 0.05, 0.02, 1.5, -0.5, 64.0 / 70.0, 64.0 / 70.0, 0.1, -0.3, 0.7];
        for (got, want) in inputs.iter().zip(expected) {
            assert!((got - want).abs() < 1e-5, "{got} != {want}");
        }
    }

    #[test]
    fn detached_agent_cannot_sense() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let agent = Agent::new(9, morphology(), &mut rng);
        let sim = Puppet::default();
        assert_eq!(agent.sense(&sim), Err(AgentError::Detached(9)));
    }

    #[test]
    fn muscles_step_by_threshold_and_stay_in_range() {
        assert_eq!(muscle_target(50.0, 0.9), 52.0);
        assert_eq!(muscle_target(50.0, 0.1), 48.0);
        assert_eq!(muscle_target(50.0, 0.5), 48.0);
        assert_eq!(muscle_target(69.0, 1.0), config::MUSCLE_MAX_LENGTH);
        assert_eq!(muscle_target(26.0, 0.0), config::MUSCLE_MIN_LENGTH);
    }

    #[test]
    fn act_writes_muscle_lengths_back() {
        let mut rng = ChaCha8Rng::seed_from_u64(6);
        let mut sim = Puppet::default();
        let mut agent = Agent::new(0, morphology(), &mut rng);
        agent.attach(&mut sim).unwrap();
        let h = *agent.handles().unwrap();

        let command = agent.act(&mut sim).unwrap();
        assert_eq!(sim.joint_length(h.left_muscle), Ok(command.left));
        assert_eq!(sim.joint_length(h.right_muscle), Ok(command.right));
        for len in [command.left, command.right] {
            assert!((len - 62.0).abs() < 1e-4 || (len - 66.0).abs() < 1e-4);
        }
    }

    #[test]
    fn score_rewards_level_forward_motion() {
        assert_eq!(score_delta(10.0, 2.0, 0.0), 40.0);
        assert_eq!(score_delta(10.0, 2.0, 0.5), 10.0);
        assert_eq!(score_delta(10.0, -2.0, 0.0), -40.0);
        // Moving further backward while already behind the spawn point scores positive.
        assert_eq!(score_delta(-10.0, -2.0, -0.1), 40.0);
    }

    #[test]
    fn update_fitness_score_accumulates() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut sim = Puppet::default();
        let mut agent = Agent::new(0, morphology(), &mut rng);
        agent.attach(&mut sim).unwrap();
        let body = agent.handles().unwrap().body;
        let spawn = agent.morphology().spawn;

        sim.poses.insert(
            body.index,
            BodyState {
                position: spawn + vec2(5.0, 0.0),
                velocity: vec2(1.0, 0.0),
                angle: 0.0,
            },
        );
        assert_eq!(agent.update_fitness_score(&sim), Ok(10.0));
        assert_eq!(agent.update_fitness_score(&sim), Ok(10.0));
        assert_eq!(agent.score, 20.0);
    }

    #[test]
    fn crossover_child_keeps_body_and_splices_brains() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let a = Agent::new(1, morphology(), &mut rng);
        let b = Agent::new(2, morphology(), &mut rng);

        let child = a.crossover(&b, &mut rng).unwrap();
        assert_eq!(child.id, 1);
        assert_eq!(child.score, 0.0);
        assert_eq!(child.morphology(), a.morphology());
        assert!(!child.is_attached());

        let ours = a.brain().input_weights().as_slice();
        let theirs = b.brain().input_weights().as_slice();
        let spliced = child.brain().input_weights().as_slice();
        let cut = spliced
            .iter()
            .zip(ours)
            .position(|(c, o)| c != o)
            .unwrap_or(spliced.len());
        assert_eq!(&spliced[..cut], &ours[..cut]);
        assert_eq!(&spliced[cut..], &theirs[cut..]);
    }

    #[test]
    fn clone_detached_is_independent() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let mut world = Sandbox::new(config::ARENA_WIDTH, config::GROUND_Y);
        let mut agent = Agent::new(4, morphology(), &mut rng);
        agent.attach(&mut world).unwrap();
        agent.score = 12.0;

        let mut copy = agent.clone_detached();
        assert!(!copy.is_attached());
        assert_eq!(copy.score, 0.0);
        assert_eq!(copy.brain(), agent.brain());

        copy.mutate(&mut rng).unwrap();
        copy.detach(&mut world).unwrap();
        assert!(!agent.brain().is_released());
        assert_eq!(world.body_count(), 3);
    }
}
