//! Masking Field - multi-scale competitive network
//!
//! One shunting field per scale, finest first. Each iteration:
//!
//! 1. Gaussian lateral inhibition from every other position of the scale.
//! 2. One shunting step: the positive part of `gated input - lateral`
//!    excites (plus recurrent self-excitation), the negative part inhibits
//!    together with a term proportional to total scale activation.
//! 3. Transmitter gates habituate to their own position's activation.
//! 4. Scales are blended by coupling weight after resampling onto each
//!    other's resolution.
//!
//! Every item drives the cells it projects onto with its working-memory
//! trace; an item that breaks from its predecessor cuts the drive of its
//! first cell, so runs settle into plateaus separated by dips.
//!
//! The field settles when no activation moves more than the convergence
//! threshold in one iteration. Chunk boundaries are the low local minima of
//! the settled activations, snapped to the item onsets under them.

use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::boundary::{cell_items, merge_boundaries, BoundaryDetector};
use crate::config::ChunkingConfig;
use crate::error::{ChunkingError, ChunkingResult};
use crate::pattern::TemporalPattern;
use crate::shunting::ShuntingDynamics;
use crate::state::ActivationState;
use crate::transmitter::TransmitterGates;

/// Outcome of one `process` or `process_time_step` call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaskingResult {
    /// Activations per scale, finest first.
    pub activations: Vec<Vec<f64>>,
    /// Gate levels per scale (empty when gates are disabled).
    pub gates: Vec<Vec<f64>>,
    /// Chunk boundaries as sequence indices, strictly increasing.
    pub boundaries: Vec<usize>,
    /// Scale that produced each boundary.
    pub boundary_scales: Vec<usize>,
    pub converged: bool,
    /// Simulated time elapsed when the run stopped.
    pub convergence_time: f64,
    pub iterations: usize,
    /// Largest change in the final iteration.
    pub residual: f64,
    pub max_activation: f64,
    /// Activation-weighted mean cell of the finest scale.
    pub center_of_mass: f64,
}

impl MaskingResult {
    /// At least one boundary was found.
    pub fn has_boundaries(&self) -> bool {
        !self.boundaries.is_empty()
    }

    pub fn scale_count(&self) -> usize {
        self.activations.len()
    }
}

/// State of one scale.
#[derive(Clone, Debug)]
struct ScaleField {
    activation: ActivationState,
    gates: Option<TransmitterGates>,
    lateral: Vec<f64>,
    input: Vec<f64>,
    /// Gaussian weight by cell distance.
    kernel: Vec<f64>,
}

impl ScaleField {
    fn new(size: usize, config: &ChunkingConfig, dynamics: &ShuntingDynamics) -> Self {
        let two_sigma_sq = 2.0 * config.lateral_sigma * config.lateral_sigma;
        let kernel = (0..size)
            .map(|d| (-((d * d) as f64) / two_sigma_sq).exp())
            .collect();
        Self {
            activation: dynamics.rest_state(size),
            gates: config
                .enable_transmitter_gates
                .then(|| TransmitterGates::from_config(size, config)),
            lateral: vec![0.0; size],
            input: vec![0.0; size],
            kernel,
        }
    }

    fn size(&self) -> usize {
        self.activation.len()
    }

    fn reset(&mut self, dynamics: &ShuntingDynamics) {
        self.activation = dynamics.rest_state(self.size());
        if let Some(gates) = &mut self.gates {
            gates.reset_all();
        }
        self.lateral.iter_mut().for_each(|v| *v = 0.0);
        self.input.iter_mut().for_each(|v| *v = 0.0);
    }

    /// Drive each cell with the mean trace of the items it covers, cut by
    /// the strongest onset among them. A gap cell carries the trace of the
    /// item before it, so a run of identical items is one plateau.
    fn project(&mut self, weights: &[f64], onsets: &[f64]) {
        let size = self.size();
        let len = weights.len();
        for (f, input) in self.input.iter_mut().enumerate() {
            let items = cell_items(f, size, len);
            *input = if items.is_empty() {
                items.start.checked_sub(1).map(|i| weights[i]).unwrap_or(0.0)
            } else {
                let trace = weights[items.clone()].iter().sum::<f64>() / items.len() as f64;
                let onset = onsets[items].iter().copied().fold(0.0, f64::max);
                trace * (1.0 - onset)
            };
        }
    }

    /// Steps a-c for this scale. Returns the stepped activations.
    fn advance(
        &mut self,
        dynamics: &ShuntingDynamics,
        params: &FieldParams,
        dt: f64,
    ) -> ActivationState {
        let size = self.size();
        let gated = match &self.gates {
            Some(gates) => gates.gate_inputs(&self.input),
            None => self.input.clone(),
        };
        let signal: Vec<f64> = self.activation.as_slice().iter().map(|&x| x.max(0.0)).collect();
        let total: f64 = signal.iter().sum();

        for i in 0..size {
            let mut sum = 0.0;
            for (j, &s) in signal.iter().enumerate() {
                if j != i {
                    sum += self.kernel[i.abs_diff(j)] * s;
                }
            }
            self.lateral[i] = params.lateral_strength * sum;
        }

        let mut excitation = Vec::with_capacity(size);
        let mut inhibition = Vec::with_capacity(size);
        for i in 0..size {
            let net = gated[i] - self.lateral[i];
            excitation.push(net.max(0.0) + params.self_excitation * signal[i]);
            inhibition.push(params.global_inhibition * total + (-net).max(0.0));
        }

        let next = dynamics.step(&self.activation, &excitation, &inhibition, dt);
        if let Some(gates) = &mut self.gates {
            let drive: Vec<f64> = next.as_slice().iter().map(|&x| x.max(0.0)).collect();
            gates.advance(&drive, dt);
        }
        next
    }
}

#[derive(Clone, Copy, Debug)]
struct FieldParams {
    self_excitation: f64,
    lateral_strength: f64,
    global_inhibition: f64,
}

/// Multi-scale competitive field.
#[derive(Clone, Debug)]
pub struct MaskingField {
    scales: Vec<ScaleField>,
    field_sizes: Vec<usize>,
    /// `coupling[s][t]`: weight of scale t when blending into scale s.
    coupling: Vec<Vec<f64>>,
    dynamics: ShuntingDynamics,
    detector: BoundaryDetector,
    params: FieldParams,
    convergence_threshold: f64,
    max_iterations: usize,
    time_step: f64,
    multi_scale: bool,

    /// Simulated time since the last reset.
    elapsed: f64,
    /// Iterations since the last reset.
    iterations: usize,
    /// Onset strength per item of the most recently projected sequence.
    onsets: Vec<f64>,
}

impl MaskingField {
    /// Create a field at rest with one scale per active field size.
    pub fn new(config: &ChunkingConfig) -> Self {
        let dynamics = ShuntingDynamics::from_config(config);
        let field_sizes = config.active_field_sizes().to_vec();
        let scales = field_sizes
            .iter()
            .map(|&size| ScaleField::new(size, config, &dynamics))
            .collect();
        let n = field_sizes.len();
        let coupling = (0..n)
            .map(|s| (0..n).map(|t| config.coupling.between(s, t)).collect())
            .collect();

        Self {
            scales,
            field_sizes,
            coupling,
            dynamics,
            detector: BoundaryDetector::new(config.boundary_threshold, config.boundary_contrast),
            params: FieldParams {
                self_excitation: config.self_excitation,
                lateral_strength: config.lateral_inhibition_strength,
                global_inhibition: config.global_inhibition,
            },
            convergence_threshold: config.convergence_threshold,
            max_iterations: config.max_iterations,
            time_step: config.time_step,
            multi_scale: config.enable_multi_scale && n > 1,
            elapsed: 0.0,
            iterations: 0,
            onsets: Vec::new(),
        }
    }

    // =========================================================================
    // PROCESSING
    // =========================================================================

    /// Restart from rest, then iterate until converged or out of iterations.
    ///
    /// Running out of iterations is not an error: boundaries are taken from
    /// the final state and the result is marked non-convergent.
    pub fn process(&mut self, pattern: &TemporalPattern) -> ChunkingResult<MaskingResult> {
        self.reset();
        self.project(pattern);
        if pattern.is_empty() {
            return Ok(self.result(true, 0.0));
        }

        let mut residual = f64::INFINITY;
        let mut converged = false;
        while self.iterations < self.max_iterations {
            residual = self.iterate(self.time_step)?;
            if residual < self.convergence_threshold {
                converged = true;
                break;
            }
        }

        let result = self.result(converged, residual);
        if converged {
            debug!(
                iterations = result.iterations,
                boundaries = ?result.boundaries,
                "masking field converged"
            );
        } else {
            warn!(
                iterations = result.iterations,
                residual,
                "masking field did not converge; using final state"
            );
        }
        Ok(result)
    }

    /// Exactly one iteration from the current state, for caller-paced
    /// streaming. `converged` reports whether this step moved less than
    /// the convergence threshold.
    pub fn process_time_step(
        &mut self,
        pattern: &TemporalPattern,
        dt: f64,
    ) -> ChunkingResult<MaskingResult> {
        self.project(pattern);
        let residual = self.iterate(dt)?;
        Ok(self.result(residual < self.convergence_threshold, residual))
    }

    /// Set every scale's input from the pattern: item weights (the
    /// working-memory trace) as drive, item onsets as the cuts between runs.
    fn project(&mut self, pattern: &TemporalPattern) {
        let weights: Vec<f64> = (0..pattern.len()).map(|i| pattern.weight(i)).collect();
        self.onsets = (0..pattern.len()).map(|i| pattern.onset(i)).collect();
        for scale in &mut self.scales {
            scale.project(&weights, &self.onsets);
        }
    }

    /// One iteration over all scales. Returns the largest activation change.
    fn iterate(&mut self, dt: f64) -> ChunkingResult<f64> {
        let stepped: Vec<ActivationState> = self
            .scales
            .iter_mut()
            .map(|scale| scale.advance(&self.dynamics, &self.params, dt))
            .collect();

        let next = if self.multi_scale {
            self.couple(&stepped)
        } else {
            stepped
        };

        let mut residual: f64 = 0.0;
        for (scale, (state, field)) in next.into_iter().zip(self.scales.iter_mut()).enumerate() {
            if !state.is_finite() {
                return Err(ChunkingError::InvariantViolation(format!(
                    "non-finite activation on scale {} after {} iterations",
                    scale, self.iterations
                )));
            }
            residual = residual.max(state.max_abs_diff(&field.activation));
            field.activation = state;
        }

        self.iterations += 1;
        self.elapsed += dt;
        Ok(residual)
    }

    /// Coupling-weighted mean of every scale, resampled to each resolution.
    fn couple(&self, stepped: &[ActivationState]) -> Vec<ActivationState> {
        (0..stepped.len())
            .map(|s| {
                let size = stepped[s].len();
                let mut acc = vec![0.0; size];
                let mut weight_sum = 0.0;
                for (t, source) in stepped.iter().enumerate() {
                    let w = self.coupling[s][t];
                    weight_sum += w;
                    let src = source.as_slice();
                    for (i, a) in acc.iter_mut().enumerate() {
                        *a += w * src[i * src.len() / size];
                    }
                }
                let blended = acc.into_iter().map(|a| a / weight_sum).collect();
                ActivationState::from_values(
                    blended,
                    self.dynamics.floor(),
                    self.dynamics.ceiling(),
                )
            })
            .collect()
    }

    fn result(&self, converged: bool, residual: f64) -> MaskingResult {
        let per_scale: Vec<Vec<usize>> = self
            .scales
            .iter()
            .map(|scale| self.detector.local_minima(scale.activation.as_slice()))
            .collect();
        let (boundaries, boundary_scales) =
            merge_boundaries(&per_scale, &self.field_sizes, &self.onsets);

        MaskingResult {
            activations: self.activations(),
            gates: self.gate_levels(),
            boundaries,
            boundary_scales,
            converged,
            convergence_time: self.elapsed,
            iterations: self.iterations,
            residual: if residual.is_finite() { residual } else { 0.0 },
            max_activation: self
                .scales
                .iter()
                .map(|scale| scale.activation.max_value())
                .fold(self.dynamics.floor(), f64::max),
            center_of_mass: self
                .scales
                .first()
                .map(|scale| scale.activation.center_of_mass())
                .unwrap_or(0.0),
        }
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Back to rest: activations at zero, gates full, clock at zero.
    pub fn reset(&mut self) {
        for scale in &mut self.scales {
            scale.reset(&self.dynamics);
        }
        self.elapsed = 0.0;
        self.iterations = 0;
        self.onsets.clear();
    }

    /// Activations per scale, finest first.
    pub fn activations(&self) -> Vec<Vec<f64>> {
        self.scales.iter().map(|s| s.activation.to_vec()).collect()
    }

    /// Gate levels per scale; empty for a scale without gates.
    pub fn gate_levels(&self) -> Vec<Vec<f64>> {
        self.scales
            .iter()
            .map(|s| s.gates.as_ref().map(|g| g.levels().to_vec()).unwrap_or_default())
            .collect()
    }

    /// Depleted gate count per scale.
    pub fn depleted_gates(&self) -> Vec<usize> {
        self.scales
            .iter()
            .map(|s| s.gates.as_ref().map(|g| g.depleted_count()).unwrap_or(0))
            .collect()
    }

    /// Current input projection per scale.
    pub fn inputs(&self) -> Vec<Vec<f64>> {
        self.scales.iter().map(|s| s.input.clone()).collect()
    }

    /// Current lateral inhibition per scale.
    pub fn lateral_inhibition(&self) -> Vec<Vec<f64>> {
        self.scales.iter().map(|s| s.lateral.clone()).collect()
    }

    /// Cell count per scale, finest first.
    pub fn field_sizes(&self) -> &[usize] {
        &self.field_sizes
    }

    pub fn scale_count(&self) -> usize {
        self.scales.len()
    }

    /// Simulated time since the last reset.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Iterations run since the last reset.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}
