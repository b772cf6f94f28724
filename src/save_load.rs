use std::fs;
use std::path::Path;

use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::Agent;
use crate::brain::{BrainError, BrainSnapshot, NeuralController};
use crate::config;
use crate::morphology::Morphology;
use crate::population::{Population, PopulationError};
use crate::stats::EvolutionStats;

const CHECKPOINT_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("agent {id}: {source}")]
    Brain { id: usize, source: BrainError },
    #[error(transparent)]
    Controller(#[from] BrainError),
    #[error(transparent)]
    Population(#[from] PopulationError),
    #[error("unsupported checkpoint version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid checkpoint: {0}")]
    Invalid(String),
}

pub fn controller_to_json(brain: &NeuralController) -> Result<String, PersistError> {
    Ok(serde_json::to_string(&brain.snapshot()?)?)
}

/// Accepts records with or without a `version` field.
pub fn controller_from_json(json: &str) -> Result<NeuralController, PersistError> {
    let snapshot: BrainSnapshot = serde_json::from_str(json)?;
    Ok(NeuralController::from_snapshot(&snapshot)?)
}

pub fn save_controller(brain: &NeuralController, path: impl AsRef<Path>) -> Result<(), PersistError> {
    fs::write(path, controller_to_json(brain)?)?;
    Ok(())
}

pub fn load_controller(path: impl AsRef<Path>) -> Result<NeuralController, PersistError> {
    controller_from_json(&fs::read_to_string(path)?)
}

#[derive(Clone, Serialize, Deserialize)]
struct SerdAgent {
    id: usize,
    morphology: Morphology,
    brain: BrainSnapshot,
}

/// Everything needed to resume evolution at a generation boundary.
#[derive(Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    version: u32,
    generation: u32,
    morphology: Morphology,
    agents: Vec<SerdAgent>,
    rng: ChaCha8Rng,
    stats: EvolutionStats,
}

impl Checkpoint {
    pub fn from_population(pop: &Population) -> Result<Self, PersistError> {
        let agents = pop
            .agents()
            .iter()
            .map(|agent| -> Result<SerdAgent, PersistError> {
                Ok(SerdAgent {
                    id: agent.id,
                    morphology: *agent.morphology(),
                    brain: agent
                        .brain()
                        .snapshot()
                        .map_err(|source| PersistError::Brain { id: agent.id, source })?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            version: CHECKPOINT_VERSION,
            generation: pop.generation(),
            morphology: *pop.morphology(),
            agents,
            rng: pop.rng().clone(),
            stats: pop.stats.clone(),
        })
    }

    /// Rebuild a detached population. Any bad controller fails the whole load.
    pub fn restore(&self) -> Result<Population, PersistError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(PersistError::UnsupportedVersion(self.version));
        }

        let runner_shape = [config::BRAIN_INPUTS, config::BRAIN_HIDDEN, config::BRAIN_OUTPUTS];
        let mut agents = Vec::with_capacity(self.agents.len());
        for (i, saved) in self.agents.iter().enumerate() {
            if saved.id != i {
                return Err(PersistError::Invalid(format!(
                    "agent at position {i} has id {}",
                    saved.id
                )));
            }
            let brain = NeuralController::from_snapshot(&saved.brain)
                .map_err(|source| PersistError::Brain { id: i, source })?;
            if brain.shape() != runner_shape {
                return Err(PersistError::Brain {
                    id: i,
                    source: BrainError::ShapeMismatch {
                        ours: brain.shape(),
                        theirs: runner_shape,
                    },
                });
            }
            agents.push(Agent::with_brain(saved.id, saved.morphology, brain));
        }

        Ok(Population::from_parts(
            agents,
            self.generation,
            self.morphology,
            self.rng.clone(),
            self.stats.clone(),
        )?)
    }
}

pub fn save_to_file(pop: &Population, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let bytes = bincode::serialize(&Checkpoint::from_population(pop)?)?;
    fs::write(path, bytes)?;
    Ok(())
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<Population, PersistError> {
    let bytes = fs::read(path)?;
    let checkpoint: Checkpoint = bincode::deserialize(&bytes)?;
    checkpoint.restore()
}
