//! Engine configuration

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ChunkingError, ChunkingResult};

/// Which instar rule adapts learned templates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InstarRule {
    /// Only the winning row moves toward the input.
    HardCompetition,
    /// Row sum is bounded by 1 at steady state.
    SelfNormalizing,
}

/// Weights used to blend activations between scales.
///
/// The defaults are a heuristic; only the qualitative ordering
/// (self > adjacent > distant) matters for multi-scale behaviour.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CouplingWeights {
    /// Weight of a scale on itself.
    pub self_weight: f64,
    /// Weight between neighbouring scales.
    pub adjacent_weight: f64,
    /// Weight between scales two or more apart.
    pub distant_weight: f64,
}

impl CouplingWeights {
    /// Weight between scale `a` and scale `b`.
    pub fn between(&self, a: usize, b: usize) -> f64 {
        match a.abs_diff(b) {
            0 => self.self_weight,
            1 => self.adjacent_weight,
            _ => self.distant_weight,
        }
    }
}

impl Default for CouplingWeights {
    fn default() -> Self {
        Self {
            self_weight: 1.0,
            adjacent_weight: 0.5,
            distant_weight: 0.1,
        }
    }
}

/// Configuration for the chunking engine.
///
/// Immutable once handed to a component; every constructor expects a
/// config that passed [`ChunkingConfig::validate`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkingConfig {
    /// Dimension of every sequence item.
    pub item_dimension: usize,

    /// Longest chunk the classifier sees (flattened pattern is
    /// `max_sequence_length * item_dimension`). Must cover
    /// `working_memory_capacity`, or chunks would be cut short.
    pub max_sequence_length: usize,

    /// Number of masking-field scales.
    pub scale_count: usize,

    /// Field size per scale, finest first. Must be non-increasing.
    pub field_sizes: Vec<usize>,

    /// Passive decay rate (A).
    pub decay_rate: f64,

    /// Upper activation bound (B).
    pub ceiling: f64,

    /// Lower activation bound. Zero or negative.
    ///
    /// This is `-C` of the shunting equation: inhibition scales with
    /// `x - floor = x + C`, and the equilibrium `(B·E - C·I) / (A + E + I)`
    /// reads `(B·E + floor·I) / (A + E + I)`.
    pub floor: f64,

    /// Recurrent on-center gain.
    pub self_excitation: f64,

    /// Gain of the Gaussian lateral inhibition.
    pub lateral_inhibition_strength: f64,

    /// Width of the lateral inhibition kernel, in field cells.
    pub lateral_sigma: f64,

    /// Gain of inhibition proportional to total scale activation.
    pub global_inhibition: f64,

    /// Activation below which a local minimum counts as a boundary.
    pub boundary_threshold: f64,

    /// Depth a boundary cell must sit below both neighbours.
    pub boundary_contrast: f64,

    /// Largest per-iteration activation change counted as converged.
    pub convergence_threshold: f64,

    /// Iteration cap for `process`.
    pub max_iterations: usize,

    /// Integration step of the masking field (simulated ms).
    pub time_step: f64,

    /// Blend weights between scales.
    pub coupling: CouplingWeights,

    /// Transmitter recovery rate (epsilon).
    pub transmitter_recovery_rate: f64,

    /// Linear transmitter depletion (lambda).
    pub transmitter_linear_depletion: f64,

    /// Quadratic transmitter depletion (mu).
    pub transmitter_quadratic_depletion: f64,

    /// Gate level under which a gate counts as depleted.
    pub gate_depletion_threshold: f64,

    /// Primacy decay rate (gamma).
    pub primacy_gamma: f64,

    /// Recency boost magnitude (delta).
    pub primacy_delta: f64,

    /// Number of most-recent positions that get the recency boost.
    pub recency_span: usize,

    /// Items held before FIFO eviction.
    pub working_memory_capacity: usize,

    /// How many times faster working memory integrates than the field.
    pub working_memory_time_scale: f64,

    /// Instar learning rate (eta).
    pub learning_rate: f64,

    /// Rule used when templates adapt.
    pub instar_rule: InstarRule,

    /// Element-wise tolerance for learned-chunk deduplication.
    pub chunk_tolerance: f64,

    pub enable_transmitter_gates: bool,
    pub enable_multi_scale: bool,
    pub enable_chunking: bool,

    /// Batch size at which sequences go to the worker pool.
    pub batch_parallel_threshold: usize,

    /// Fixed size of the worker pool.
    pub worker_threads: usize,
}

impl ChunkingConfig {
    /// Standard list-learning configuration (three scales: 20/10/5).
    pub fn list_learning_defaults() -> Self {
        Self {
            item_dimension: 10,
            max_sequence_length: 20,
            scale_count: 3,
            field_sizes: vec![20, 10, 5],
            decay_rate: 1.0,
            ceiling: 1.0,
            floor: 0.0,
            self_excitation: 0.2,
            lateral_inhibition_strength: 0.3,
            lateral_sigma: 1.5,
            global_inhibition: 0.05,
            boundary_threshold: 0.3,
            boundary_contrast: 1e-3,
            convergence_threshold: 1e-4,
            max_iterations: 2000,
            time_step: 0.05,
            coupling: CouplingWeights::default(),
            transmitter_recovery_rate: 0.1,
            transmitter_linear_depletion: 0.1,
            transmitter_quadratic_depletion: 0.05,
            gate_depletion_threshold: 0.3,
            primacy_gamma: 0.1,
            primacy_delta: 0.3,
            recency_span: 2,
            working_memory_capacity: 20,
            working_memory_time_scale: 5.0,
            learning_rate: 0.1,
            instar_rule: InstarRule::HardCompetition,
            chunk_tolerance: 0.1,
            enable_transmitter_gates: true,
            enable_multi_scale: true,
            enable_chunking: true,
            batch_parallel_threshold: 4,
            worker_threads: 4,
        }
    }

    /// Longer frames of 13 spectral coefficients over four scales.
    pub fn speech_defaults() -> Self {
        Self {
            item_dimension: 13,
            max_sequence_length: 64,
            scale_count: 4,
            field_sizes: vec![32, 16, 8, 4],
            lateral_sigma: 2.0,
            working_memory_capacity: 64,
            primacy_gamma: 0.05,
            ..Self::list_learning_defaults()
        }
    }

    /// One scale, no cross-scale coupling.
    pub fn single_scale(field_size: usize, item_dimension: usize) -> Self {
        Self {
            item_dimension,
            scale_count: 1,
            field_sizes: vec![field_size],
            enable_multi_scale: false,
            ..Self::list_learning_defaults()
        }
    }

    pub fn with_item_dimension(mut self, item_dimension: usize) -> Self {
        self.item_dimension = item_dimension;
        self
    }

    pub fn with_field_sizes(mut self, field_sizes: Vec<usize>) -> Self {
        self.scale_count = field_sizes.len();
        self.field_sizes = field_sizes;
        self
    }

    pub fn with_boundary_threshold(mut self, threshold: f64) -> Self {
        self.boundary_threshold = threshold;
        self
    }

    pub fn with_max_sequence_length(mut self, max_sequence_length: usize) -> Self {
        self.max_sequence_length = max_sequence_length;
        self
    }

    pub fn with_working_memory_capacity(mut self, capacity: usize) -> Self {
        self.working_memory_capacity = capacity;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_coupling(mut self, coupling: CouplingWeights) -> Self {
        self.coupling = coupling;
        self
    }

    /// Flattened pattern length handed to the classifier.
    pub fn flattened_dimension(&self) -> usize {
        self.max_sequence_length * self.item_dimension
    }

    /// Field sizes of the scales that actually run.
    pub fn active_field_sizes(&self) -> &[usize] {
        if self.enable_multi_scale {
            &self.field_sizes
        } else {
            &self.field_sizes[..self.field_sizes.len().min(1)]
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> ChunkingResult<()> {
        positive_count("item_dimension", self.item_dimension)?;
        positive_count("max_sequence_length", self.max_sequence_length)?;
        positive_count("scale_count", self.scale_count)?;
        positive_count("working_memory_capacity", self.working_memory_capacity)?;
        positive_count("max_iterations", self.max_iterations)?;
        positive_count("batch_parallel_threshold", self.batch_parallel_threshold)?;
        positive_count("worker_threads", self.worker_threads)?;

        if self.working_memory_capacity > self.max_sequence_length {
            return Err(ChunkingError::invalid_config(
                "working_memory_capacity",
                format!(
                    "{} items do not fit max_sequence_length {}",
                    self.working_memory_capacity, self.max_sequence_length
                ),
            ));
        }

        if self.field_sizes.len() != self.scale_count {
            return Err(ChunkingError::invalid_config(
                "field_sizes",
                format!(
                    "{} sizes given for {} scales",
                    self.field_sizes.len(),
                    self.scale_count
                ),
            ));
        }
        if self.field_sizes.contains(&0) {
            return Err(ChunkingError::invalid_config(
                "field_sizes",
                "every scale needs at least one cell",
            ));
        }
        if self.field_sizes.windows(2).any(|w| w[1] > w[0]) {
            return Err(ChunkingError::invalid_config(
                "field_sizes",
                format!("must be non-increasing, got {:?}", self.field_sizes),
            ));
        }

        let floats = [
            ("decay_rate", self.decay_rate),
            ("ceiling", self.ceiling),
            ("floor", self.floor),
            ("self_excitation", self.self_excitation),
            ("lateral_inhibition_strength", self.lateral_inhibition_strength),
            ("lateral_sigma", self.lateral_sigma),
            ("global_inhibition", self.global_inhibition),
            ("boundary_threshold", self.boundary_threshold),
            ("boundary_contrast", self.boundary_contrast),
            ("convergence_threshold", self.convergence_threshold),
            ("time_step", self.time_step),
            ("transmitter_recovery_rate", self.transmitter_recovery_rate),
            ("transmitter_linear_depletion", self.transmitter_linear_depletion),
            ("transmitter_quadratic_depletion", self.transmitter_quadratic_depletion),
            ("gate_depletion_threshold", self.gate_depletion_threshold),
            ("primacy_gamma", self.primacy_gamma),
            ("primacy_delta", self.primacy_delta),
            ("working_memory_time_scale", self.working_memory_time_scale),
            ("learning_rate", self.learning_rate),
            ("chunk_tolerance", self.chunk_tolerance),
            ("coupling.self_weight", self.coupling.self_weight),
            ("coupling.adjacent_weight", self.coupling.adjacent_weight),
            ("coupling.distant_weight", self.coupling.distant_weight),
        ];
        for (field, value) in floats {
            if !value.is_finite() {
                return Err(ChunkingError::invalid_config(field, "must be finite"));
            }
        }

        strictly_positive("decay_rate", self.decay_rate)?;
        strictly_positive("ceiling", self.ceiling)?;
        strictly_positive("lateral_sigma", self.lateral_sigma)?;
        strictly_positive("convergence_threshold", self.convergence_threshold)?;
        strictly_positive("time_step", self.time_step)?;
        strictly_positive("transmitter_recovery_rate", self.transmitter_recovery_rate)?;
        strictly_positive("working_memory_time_scale", self.working_memory_time_scale)?;
        strictly_positive("coupling.self_weight", self.coupling.self_weight)?;

        non_negative("self_excitation", self.self_excitation)?;
        non_negative("lateral_inhibition_strength", self.lateral_inhibition_strength)?;
        non_negative("global_inhibition", self.global_inhibition)?;
        non_negative("boundary_contrast", self.boundary_contrast)?;
        non_negative("transmitter_linear_depletion", self.transmitter_linear_depletion)?;
        non_negative("transmitter_quadratic_depletion", self.transmitter_quadratic_depletion)?;
        non_negative("primacy_gamma", self.primacy_gamma)?;
        non_negative("primacy_delta", self.primacy_delta)?;
        non_negative("chunk_tolerance", self.chunk_tolerance)?;
        non_negative("coupling.adjacent_weight", self.coupling.adjacent_weight)?;
        non_negative("coupling.distant_weight", self.coupling.distant_weight)?;

        if self.floor > 0.0 {
            return Err(ChunkingError::invalid_config("floor", "must be <= 0"));
        }
        if self.boundary_threshold <= self.floor || self.boundary_threshold > self.ceiling {
            return Err(ChunkingError::invalid_config(
                "boundary_threshold",
                "must lie in (floor, ceiling]",
            ));
        }
        if !(0.0..=1.0).contains(&self.gate_depletion_threshold) {
            return Err(ChunkingError::invalid_config(
                "gate_depletion_threshold",
                "must be in [0, 1]",
            ));
        }
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(ChunkingError::invalid_config(
                "learning_rate",
                "must be in (0, 1]",
            ));
        }
        if self.time_step * self.decay_rate > 1.0 {
            return Err(ChunkingError::invalid_config(
                "time_step",
                "time_step * decay_rate must not exceed 1",
            ));
        }
        if self.time_step * self.working_memory_time_scale * self.decay_rate > 1.0 {
            return Err(ChunkingError::invalid_config(
                "working_memory_time_scale",
                "working-memory step * decay_rate must not exceed 1",
            ));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::list_learning_defaults()
    }
}

fn positive_count(field: &'static str, value: usize) -> ChunkingResult<()> {
    if value == 0 {
        return Err(ChunkingError::invalid_config(field, "must be > 0"));
    }
    Ok(())
}

fn strictly_positive(field: &'static str, value: f64) -> ChunkingResult<()> {
    if value <= 0.0 {
        return Err(ChunkingError::invalid_config(field, "must be > 0"));
    }
    Ok(())
}

fn non_negative(field: &'static str, value: f64) -> ChunkingResult<()> {
    if value < 0.0 {
        return Err(ChunkingError::invalid_config(field, "must be >= 0"));
    }
    Ok(())
}
