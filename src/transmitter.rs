//! Habituative transmitter gates
//!
//! ```text
//! dz/dt = ε·(1 - z) - z·(λ·x + μ·x²)
//! ```
//!
//! A gate recovers toward 1 while its position is quiet and depletes while
//! it fires, so a position that wins continuously loses its own drive.

use crate::config::ChunkingConfig;
use crate::state::GateState;

/// Per-position gain control for one field.
#[derive(Clone, Debug, PartialEq)]
pub struct TransmitterGates {
    levels: GateState,
    recovery_rate: f64,
    linear_depletion: f64,
    quadratic_depletion: f64,
    depletion_threshold: f64,
}

impl TransmitterGates {
    /// Create `size` fully recovered gates.
    pub fn new(
        size: usize,
        recovery_rate: f64,
        linear_depletion: f64,
        quadratic_depletion: f64,
        depletion_threshold: f64,
    ) -> Self {
        Self {
            levels: GateState::gates(size),
            recovery_rate,
            linear_depletion,
            quadratic_depletion,
            depletion_threshold,
        }
    }

    pub fn from_config(size: usize, config: &ChunkingConfig) -> Self {
        Self::new(
            size,
            config.transmitter_recovery_rate,
            config.transmitter_linear_depletion,
            config.transmitter_quadratic_depletion,
            config.gate_depletion_threshold,
        )
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &GateState {
        &self.levels
    }

    #[inline]
    fn derivative(&self, z: f64, signal: f64) -> f64 {
        let s = signal.max(0.0);
        self.recovery_rate * (1.0 - z)
            - z * (self.linear_depletion * s + self.quadratic_depletion * s * s)
    }

    /// One Euler step of the given levels. Pure.
    ///
    /// Positions past the end of `signals` see a quiet signal.
    pub fn update(&self, levels: &GateState, signals: &[f64], dt: f64) -> GateState {
        let values = (0..levels.len())
            .map(|i| {
                let z = levels.get(i);
                let s = signals.get(i).copied().unwrap_or(0.0);
                z + dt * self.derivative(z, s)
            })
            .collect();
        GateState::from_values(values, 0.0, 1.0)
    }

    /// Advance the owned levels one step.
    pub fn advance(&mut self, signals: &[f64], dt: f64) {
        self.levels = self.update(&self.levels, signals, dt);
    }

    /// Multiply inputs by gate levels; inputs past the gate count pass through.
    pub fn apply_gate(inputs: &[f64], levels: &GateState) -> Vec<f64> {
        inputs
            .iter()
            .enumerate()
            .map(|(i, &u)| if i < levels.len() { u * levels.get(i) } else { u })
            .collect()
    }

    /// Gate `inputs` with the owned levels.
    pub fn gate_inputs(&self, inputs: &[f64]) -> Vec<f64> {
        Self::apply_gate(inputs, &self.levels)
    }

    /// Steady-state level under a constant signal.
    pub fn equilibrium(&self, signal: f64) -> f64 {
        let s = signal.max(0.0);
        self.recovery_rate
            / (self.recovery_rate + self.linear_depletion * s + self.quadratic_depletion * s * s)
    }

    pub fn is_depleted(&self, idx: usize) -> bool {
        self.levels.get(idx) < self.depletion_threshold
    }

    pub fn has_depleted_gates(&self) -> bool {
        self.depleted_count() > 0
    }

    pub fn depleted_count(&self) -> usize {
        self.levels.count_below(self.depletion_threshold)
    }

    /// Restore only the gates under the depletion threshold.
    pub fn reset_depleted(&mut self) {
        for i in 0..self.levels.len() {
            if self.is_depleted(i) {
                self.levels.set(i, 1.0);
            }
        }
    }

    /// Restore every gate.
    pub fn reset_all(&mut self) {
        self.levels.fill(1.0);
    }
}
