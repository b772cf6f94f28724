use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentError};
use crate::config;
use crate::morphology::{Morphology, MorphologyError};
use crate::sim::Simulation;
use crate::stats::EvolutionStats;

#[derive(Debug, Error, PartialEq)]
pub enum PopulationError {
    #[error("population size must be positive")]
    Empty,
    #[error(transparent)]
    Morphology(#[from] MorphologyError),
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// How raw scores were turned into selection weights for one generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitnessNormalization {
    /// `score / total_score`; every value already a probability.
    Proportional,
    /// Negative scores counted as zero, then renormalized.
    Clamped,
    /// Nothing positive to go on; every agent equally likely.
    Uniform,
}

/// What one completed episode looked like, captured before its agents are retired.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationSummary {
    pub generation: u32,
    pub total_score: f64,
    pub mean_score: f64,
    pub best_score: f64,
    pub best_id: usize,
    pub normalization: FitnessNormalization,
    pub fitness: Vec<f64>,
}

/// Fixed-size generation of runners plus the state that carries across generations.
pub struct Population {
    size: usize,
    agents: Vec<Agent>,
    generation: u32,
    morphology: Morphology,
    rng: ChaCha8Rng,
    total_score: f64,
    pub stats: EvolutionStats,
}

impl Population {
    /// `size` fresh agents with ids `0..size`, none attached yet.
    pub fn new(size: usize, morphology: Morphology, seed: u64) -> Result<Self, PopulationError> {
        if size == 0 {
            return Err(PopulationError::Empty);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let agents = (0..size)
            .map(|id| Agent::new(id, morphology, &mut rng))
            .collect();
        Ok(Self {
            size,
            agents,
            generation: 1,
            morphology,
            rng,
            total_score: 0.0,
            stats: EvolutionStats::new(config::STATS_CAPACITY),
        })
    }

    /// Reassemble a population from checkpointed parts.
    pub(crate) fn from_parts(
        agents: Vec<Agent>,
        generation: u32,
        morphology: Morphology,
        rng: ChaCha8Rng,
        stats: EvolutionStats,
    ) -> Result<Self, PopulationError> {
        if agents.is_empty() {
            return Err(PopulationError::Empty);
        }
        Ok(Self {
            size: agents.len(),
            agents,
            generation,
            morphology,
            rng,
            total_score: 0.0,
            stats,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn morphology(&self) -> &Morphology {
        &self.morphology
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    /// Sum of raw scores from the last `assign_fitness`.
    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub(crate) fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub(crate) fn rng(&self) -> &ChaCha8Rng {
        &self.rng
    }

    pub fn attach_all(&mut self, sim: &mut impl Simulation) -> Result<(), PopulationError> {
        for agent in &mut self.agents {
            agent.attach(sim)?;
        }
        Ok(())
    }

    /// Every live agent senses, acts and scores once, in id order.
    pub fn step(&mut self, sim: &mut impl Simulation) -> Result<(), PopulationError> {
        for agent in &mut self.agents {
            agent.act(sim)?;
            agent.update_fitness_score(&*sim)?;
        }
        Ok(())
    }

    /// Advance physics and then the agents, `ticks` times.
    pub fn run_episode(&mut self, sim: &mut impl Simulation, ticks: u32) -> Result<(), PopulationError> {
        for _ in 0..ticks {
            sim.step(config::FIXED_DT);
            self.step(sim)?;
        }
        Ok(())
    }

    /// Turn this generation's scores into selection weights that sum to one.
    pub fn assign_fitness(&mut self) -> FitnessNormalization {
        let total: f64 = self.agents.iter().map(|a| a.score).sum();
        self.total_score = total;

        if total > 0.0 && total.is_finite() {
            let proportional: Vec<f64> = self.agents.iter().map(|a| a.score / total).collect();
            if proportional.iter().all(|f| (0.0..=1.0).contains(f)) {
                for (agent, fitness) in self.agents.iter_mut().zip(proportional) {
                    agent.fitness = fitness;
                }
                return FitnessNormalization::Proportional;
            }
        }

        let clamped: Vec<f64> = self
            .agents
            .iter()
            .map(|a| if a.score > 0.0 { a.score } else { 0.0 })
            .collect();
        let clamped_total: f64 = clamped.iter().sum();

        if clamped_total > 0.0 && clamped_total.is_finite() {
            warn!(
                generation = self.generation,
                total_score = total,
                "mixed-sign scores, clamping negatives before selection"
            );
            for (agent, score) in self.agents.iter_mut().zip(clamped) {
                agent.fitness = score / clamped_total;
            }
            return FitnessNormalization::Clamped;
        }

        warn!(
            generation = self.generation,
            total_score = total,
            "no positive scores, selecting uniformly"
        );
        let share = 1.0 / self.size as f64;
        for agent in &mut self.agents {
            agent.fitness = share;
        }
        FitnessNormalization::Uniform
    }

    /// Roulette-wheel pick. Agents with no fitness are never chosen; if rounding
    /// leaves the draw unspent the last eligible agent wins.
    pub fn select_index(&mut self) -> usize {
        let mut r: f64 = self.rng.gen();
        let mut chosen = 0;
        for (i, agent) in self.agents.iter().enumerate() {
            if agent.fitness <= 0.0 {
                continue;
            }
            chosen = i;
            r -= agent.fitness;
            if r <= 0.0 {
                break;
            }
        }
        chosen
    }

    /// Fitness-proportionate pick, returned as a detached copy.
    pub fn select_one(&mut self) -> Agent {
        let index = self.select_index();
        self.agents[index].clone_detached()
    }

    /// The live agent with the highest score; ties go to the lowest id.
    pub fn best(&self) -> &Agent {
        let mut best = &self.agents[0];
        for agent in &self.agents[1..] {
            if agent.score > best.score {
                best = agent;
            }
        }
        best
    }

    fn summarize(&self, normalization: FitnessNormalization) -> GenerationSummary {
        let best = self.best();
        GenerationSummary {
            generation: self.generation,
            total_score: self.total_score,
            mean_score: self.total_score / self.size as f64,
            best_score: best.score,
            best_id: best.id,
            normalization,
            fitness: self.agents.iter().map(|a| a.fitness).collect(),
        }
    }

    /// Breed the next generation from this one's scores and swap it into the simulation.
    ///
    /// Once breeding succeeds the swap always completes. An old agent that fails to
    /// retire is reported as the error after the new generation is attached; its
    /// group stays in the simulation whole.
    pub fn evolve(&mut self, sim: &mut impl Simulation) -> Result<GenerationSummary, PopulationError> {
        let normalization = self.assign_fitness();
        let summary = self.summarize(normalization);
        self.stats.record(&summary);

        let mut next = Vec::with_capacity(self.size);
        for i in 0..self.size {
            let parent_a = self.select_one();
            let parent_b = self.select_one();
            let mut child = parent_a.crossover(&parent_b, &mut self.rng)?;
            child.mutate(&mut self.rng)?;
            child.id = i;
            debug!(
                "[{}({:.2}), {}({:.2})] => {}",
                parent_a.id,
                self.agents[parent_a.id].fitness,
                parent_b.id,
                self.agents[parent_b.id].fitness,
                i
            );
            next.push(child);
        }

        // The new generation is live from here on, even if retiring the old one fails.
        let old = std::mem::replace(&mut self.agents, next);
        self.generation += 1;
        let mut retire_error = None;
        for agent in old {
            let id = agent.id;
            if let Err(err) = agent.retire(sim) {
                warn!(id, "failed to retire agent: {err}");
                retire_error.get_or_insert(err);
            }
        }
        self.attach_all(sim)?;
        if let Some(err) = retire_error {
            return Err(err.into());
        }

        info!(
            generation = summary.generation,
            best = summary.best_score,
            mean = summary.mean_score,
            fitness = ?summary.normalization,
            "generation complete"
        );
        Ok(summary)
    }
}
