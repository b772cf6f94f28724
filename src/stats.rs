//! Rolling per-generation statistics for the evolution run.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::population::{FitnessNormalization, GenerationSummary};

/// The most recent per-generation values of one metric, oldest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl ScoreHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// History that outlives each generation swap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStats {
    pub best_score: ScoreHistory,
    pub mean_score: ScoreHistory,
    pub total_score: ScoreHistory,
    pub all_time_best: Option<f64>,
    pub all_time_best_generation: u32,
    /// Generations whose fitness could not be used as-is.
    pub fallback_generations: u32,
}

impl EvolutionStats {
    pub fn new(capacity: usize) -> Self {
        Self {
            best_score: ScoreHistory::new(capacity),
            mean_score: ScoreHistory::new(capacity),
            total_score: ScoreHistory::new(capacity),
            all_time_best: None,
            all_time_best_generation: 0,
            fallback_generations: 0,
        }
    }

    pub fn record(&mut self, summary: &GenerationSummary) {
        self.best_score.push(summary.best_score);
        self.mean_score.push(summary.mean_score);
        self.total_score.push(summary.total_score);

        if self.all_time_best.map_or(true, |best| summary.best_score > best) {
            self.all_time_best = Some(summary.best_score);
            self.all_time_best_generation = summary.generation;
        }
        if summary.normalization != FitnessNormalization::Proportional {
            self.fallback_generations += 1;
        }
    }
}
