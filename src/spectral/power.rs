use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ReductionError, Result};
use crate::graph::DirectedGraph;
use crate::numeric::DenseVector;

const DEFAULT_TOLERANCE: f64 = 1e-13;
const DEFAULT_CAP_OFFSET: f64 = 3e-7;
const DEFAULT_NOISE_FLOOR: f64 = 1e-3;
const DEFAULT_CHECK_INTERVAL: usize = 10;

/// Parameters shared by the power iteration and the resolvent expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Teleport probability δ (`1 - alpha`).
    pub damping: f64,
    /// Convergence is checked every `check_interval` iterations.
    pub check_interval: usize,
    /// Relative-difference threshold ε.
    pub tolerance: f64,
    /// Added to δ in the iteration cap so that δ → 0 stays finite.
    pub cap_offset: f64,
    /// Below this relative difference, a checkpoint that fails to improve by
    /// `1 + δ/2` ends the iteration.
    pub noise_floor: f64,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self::with_damping(0.15)
    }
}

impl PowerConfig {
    pub fn with_damping(damping: f64) -> Self {
        Self {
            damping,
            check_interval: DEFAULT_CHECK_INTERVAL,
            tolerance: DEFAULT_TOLERANCE,
            cap_offset: DEFAULT_CAP_OFFSET,
            noise_floor: DEFAULT_NOISE_FLOOR,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(ReductionError::InvalidDamping(self.damping));
        }
        Ok(())
    }

    /// `2·⌈-ln(ε)/(δ+c)⌉`, saturating at `usize::MAX` when ε is 0.
    pub fn max_iterations(&self) -> usize {
        let steps = (-self.tolerance.ln() / (self.damping + self.cap_offset)).ceil();
        (steps.max(0.0) as usize).saturating_mul(2)
    }

    fn interval(&self) -> usize {
        self.check_interval.max(1)
    }
}

/// Which operator the iteration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Transpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    /// Relative difference stalled below the noise floor.
    NoiseFloor,
    IterationCap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerOutcome {
    /// Mass removed by the leak set in the last iteration.
    pub leaked: f64,
    pub iterations: usize,
    pub quality_rel: f64,
    pub stop: StopReason,
}

/// Power iteration on the damped operator with a leak set whose entries are
/// zeroed after every multiply.
pub struct PowerIteration<'a> {
    graph: &'a DirectedGraph,
    config: PowerConfig,
}

impl<'a> PowerIteration<'a> {
    pub fn new(graph: &'a DirectedGraph, config: PowerConfig) -> Self {
        Self { graph, config }
    }

    /// Iterates `vector` in place towards the leading eigenvector of the
    /// operator restricted to the complement of `leak`.
    ///
    /// For the forward direction `leaked` is the mass zeroed on the leak set;
    /// for the transpose direction it is `1 - Σ` of the iterate before
    /// renormalisation.
    pub fn run(
        &self,
        vector: &mut DenseVector,
        leak: &[usize],
        direction: Direction,
    ) -> Result<PowerOutcome> {
        self.config.validate()?;
        let graph = self.graph;
        let damping = self.config.damping;
        let interval = self.config.interval();
        let max_iter = self.config.max_iterations();
        let stall_factor = 1.0 + damping / 2.0;

        if vector.normalize_sum() == 0.0 {
            return Err(ReductionError::VanishingMass { iteration: 0 });
        }
        let mut previous = vector.clone();
        let mut leaked = absorb_leak(vector, leak, direction, 0)?;

        let mut quality_rel = f64::INFINITY;
        let mut stop = StopReason::IterationCap;
        let mut iterations = 0;

        for i in 0..=max_iter {
            iterations = i + 1;
            vector.swap(&mut previous);
            match direction {
                Direction::Forward => graph.multiply(damping, vector, &previous, true)?,
                Direction::Transpose => {
                    graph.multiply_transpose(damping, vector, &previous, true)?
                }
            }
            leaked = absorb_leak(vector, leak, direction, iterations)?;

            if i % interval == 0 || i == max_iter {
                let quality = vector.diff_norm1(&previous)?;
                let last_rel = quality_rel;
                quality_rel = vector.diff_norm_rel(&previous)?;
                debug!(
                    "power {:?} iter {:5}: quality {:.10e} rel {:.10e} leaked {:.16}",
                    direction, i, quality, quality_rel, leaked
                );
                if quality_rel < self.config.tolerance {
                    stop = StopReason::Converged;
                    break;
                }
                if quality_rel < self.config.noise_floor && quality_rel * stall_factor > last_rel {
                    stop = StopReason::NoiseFloor;
                    break;
                }
            }
        }

        Ok(PowerOutcome {
            leaked,
            iterations,
            quality_rel,
            stop,
        })
    }
}

/// Zeroes the leak set, renormalises, and returns the leaked estimate.
fn absorb_leak(
    vector: &mut DenseVector,
    leak: &[usize],
    direction: Direction,
    iteration: usize,
) -> Result<f64> {
    let mut leaked = 0.0;
    for &node in leak {
        leaked += vector[node];
        vector[node] = 0.0;
    }
    let norm = vector.normalize_sum();
    if norm == 0.0 {
        return Err(ReductionError::VanishingMass { iteration });
    }
    Ok(match direction {
        Direction::Forward => leaked,
        Direction::Transpose => 1.0 - norm,
    })
}
