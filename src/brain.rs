use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;

/// Errors raised by controller inference, breeding and loading.
#[derive(Debug, Error, PartialEq)]
pub enum BrainError {
    #[error("expected {expected} inputs, got {actual}")]
    InvalidInput { expected: usize, actual: usize },
    #[error("invalid {matrix} weight length: expected {expected}, got {actual}")]
    Format {
        matrix: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("node counts must be positive, got {input}x{hidden}x{output}")]
    ZeroNodes {
        input: usize,
        hidden: usize,
        output: usize,
    },
    #[error("controller shapes differ: {ours:?} vs {theirs:?}")]
    ShapeMismatch { ours: [usize; 3], theirs: [usize; 3] },
    #[error("controller weights have been released")]
    Released,
    #[error("unsupported brain format version {0}")]
    UnsupportedVersion(u32),
}

/// Dense row-major matrix of connection weights with a fixed shape.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl WeightMatrix {
    /// Every entry drawn independently from a standard normal distribution.
    pub fn random(rows: usize, cols: usize, rng: &mut impl Rng) -> Self {
        let data = (0..rows * cols)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();
        Self { rows, cols, data }
    }

    /// Rebuild a matrix from a flattened row-major buffer.
    pub fn from_flat(
        rows: usize,
        cols: usize,
        data: Vec<f32>,
        matrix: &'static str,
    ) -> Result<Self, BrainError> {
        if data.len() != rows * cols {
            return Err(BrainError::Format {
                matrix,
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Builds a replacement matrix of the same shape.
    fn map(&self, mut f: impl FnMut(f32) -> f32) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|w| f(*w)).collect(),
        }
    }

    /// `sigmoid(input · self)` for a single row vector of length `rows`.
    fn activate(&self, input: &[f32]) -> Vec<f32> {
        (0..self.cols)
            .map(|col| {
                let sum: f32 = input
                    .iter()
                    .enumerate()
                    .map(|(row, x)| x * self.data[row * self.cols + col])
                    .sum();
                sigmoid(sum)
            })
            .collect()
    }

    fn release(&mut self) {
        self.data = Vec::new();
    }
}

/// Fixed three-layer feed-forward network: input -> hidden -> output.
#[derive(Clone, Debug, PartialEq)]
pub struct NeuralController {
    input_nodes: usize,
    hidden_nodes: usize,
    output_nodes: usize,
    input_weights: WeightMatrix,
    output_weights: WeightMatrix,
    released: bool,
}

impl NeuralController {
    pub fn new(
        input_nodes: usize,
        hidden_nodes: usize,
        output_nodes: usize,
        rng: &mut impl Rng,
    ) -> Result<Self, BrainError> {
        check_nodes(input_nodes, hidden_nodes, output_nodes)?;
        Ok(Self::random(input_nodes, hidden_nodes, output_nodes, rng))
    }

    /// Controller sized for the bipedal runner's sensors and muscles.
    pub fn for_runner(rng: &mut impl Rng) -> Self {
        Self::random(config::BRAIN_INPUTS, config::BRAIN_HIDDEN, config::BRAIN_OUTPUTS, rng)
    }

    /// Node counts must already be known to be positive.
    fn random(input_nodes: usize, hidden_nodes: usize, output_nodes: usize, rng: &mut impl Rng) -> Self {
        Self {
            input_nodes,
            hidden_nodes,
            output_nodes,
            input_weights: WeightMatrix::random(input_nodes, hidden_nodes, rng),
            output_weights: WeightMatrix::random(hidden_nodes, output_nodes, rng),
            released: false,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.input_nodes, self.hidden_nodes, self.output_nodes]
    }

    pub fn input_weights(&self) -> &WeightMatrix {
        &self.input_weights
    }

    pub fn output_weights(&self) -> &WeightMatrix {
        &self.output_weights
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Feed one input vector forward through both layers.
    pub fn predict(&self, input: &[f32]) -> Result<Vec<f32>, BrainError> {
        if self.released {
            return Err(BrainError::Released);
        }
        if input.len() != self.input_nodes {
            return Err(BrainError::InvalidInput {
                expected: self.input_nodes,
                actual: input.len(),
            });
        }
        let hidden = self.input_weights.activate(input);
        Ok(self.output_weights.activate(&hidden))
    }

    /// Drop the weight storage. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.input_weights.release();
        self.output_weights.release();
        self.released = true;
    }

    /// Single-point crossover with a uniformly drawn cut in the input weights.
    pub fn crossover(&self, partner: &Self, rng: &mut impl Rng) -> Result<Self, BrainError> {
        let cut = rng.gen_range(0..self.input_weights.len().max(1));
        self.crossover_at(partner, cut)
    }

    /// Child takes our weights before `input_cut` and the partner's from it onward.
    /// The output weights are cut at the same proportion of their length.
    pub fn crossover_at(&self, partner: &Self, input_cut: usize) -> Result<Self, BrainError> {
        if self.released || partner.released {
            return Err(BrainError::Released);
        }
        if self.shape() != partner.shape() {
            return Err(BrainError::ShapeMismatch {
                ours: self.shape(),
                theirs: partner.shape(),
            });
        }

        let in_len = self.input_weights.len();
        let out_len = self.output_weights.len();
        let input_cut = input_cut.min(in_len);
        let output_cut = input_cut * out_len / in_len;

        Ok(Self {
            input_nodes: self.input_nodes,
            hidden_nodes: self.hidden_nodes,
            output_nodes: self.output_nodes,
            input_weights: WeightMatrix {
                rows: self.input_nodes,
                cols: self.hidden_nodes,
                data: splice(
                    self.input_weights.as_slice(),
                    partner.input_weights.as_slice(),
                    input_cut,
                ),
            },
            output_weights: WeightMatrix {
                rows: self.hidden_nodes,
                cols: self.output_nodes,
                data: splice(
                    self.output_weights.as_slice(),
                    partner.output_weights.as_slice(),
                    output_cut,
                ),
            },
            released: false,
        })
    }

    /// Perturb each weight with probability `rate` by gaussian noise scaled by `sigma`.
    /// Both matrices are replaced wholesale.
    pub fn mutate(&mut self, rng: &mut impl Rng, rate: f32, sigma: f32) -> Result<(), BrainError> {
        if self.released {
            return Err(BrainError::Released);
        }
        let mut perturb = |w: f32| {
            if rng.gen::<f32>() < rate {
                w + rng.sample::<f32, _>(StandardNormal) * sigma
            } else {
                w
            }
        };
        let input_weights = self.input_weights.map(&mut perturb);
        let output_weights = self.output_weights.map(&mut perturb);
        self.input_weights = input_weights;
        self.output_weights = output_weights;
        Ok(())
    }

    pub fn snapshot(&self) -> Result<BrainSnapshot, BrainError> {
        if self.released {
            return Err(BrainError::Released);
        }
        Ok(BrainSnapshot {
            version: config::BRAIN_FORMAT_VERSION,
            input_nodes: self.input_nodes,
            hidden_nodes: self.hidden_nodes,
            output_nodes: self.output_nodes,
            input_weights: self.input_weights.data.clone(),
            output_weights: self.output_weights.data.clone(),
        })
    }

    /// Rebuild a controller, rejecting any snapshot whose weights don't fit its node counts.
    pub fn from_snapshot(snapshot: &BrainSnapshot) -> Result<Self, BrainError> {
        if snapshot.version > config::BRAIN_FORMAT_VERSION {
            return Err(BrainError::UnsupportedVersion(snapshot.version));
        }
        check_nodes(
            snapshot.input_nodes,
            snapshot.hidden_nodes,
            snapshot.output_nodes,
        )?;
        let input_weights = WeightMatrix::from_flat(
            snapshot.input_nodes,
            snapshot.hidden_nodes,
            snapshot.input_weights.clone(),
            "input",
        )?;
        let output_weights = WeightMatrix::from_flat(
            snapshot.hidden_nodes,
            snapshot.output_nodes,
            snapshot.output_weights.clone(),
            "output",
        )?;
        Ok(Self {
            input_nodes: snapshot.input_nodes,
            hidden_nodes: snapshot.hidden_nodes,
            output_nodes: snapshot.output_nodes,
            input_weights,
            output_weights,
            released: false,
        })
    }
}

/// Serialized controller record. Weights are flattened row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrainSnapshot {
    #[serde(default = "default_brain_version")]
    pub version: u32,
    pub input_nodes: usize,
    pub hidden_nodes: usize,
    pub output_nodes: usize,
    pub input_weights: Vec<f32>,
    pub output_weights: Vec<f32>,
}

// Records written before the version field existed are treated as v1.
fn default_brain_version() -> u32 {
    1
}

fn check_nodes(input: usize, hidden: usize, output: usize) -> Result<(), BrainError> {
    if input == 0 || hidden == 0 || output == 0 {
        return Err(BrainError::ZeroNodes {
            input,
            hidden,
            output,
        });
    }
    Ok(())
}

fn splice(ours: &[f32], theirs: &[f32], cut: usize) -> Vec<f32> {
    ours[..cut].iter().chain(&theirs[cut..]).copied().collect()
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
