//! Shunting on-center/off-surround dynamics
//!
//! ```text
//! dx/dt = -A·x + (B - x)·E - (x - F)·I
//! ```
//!
//! A is the passive decay, B the ceiling and F the floor (F <= 0, so the
//! inhibitory term saturates at `x = F`). The textbook form writes the
//! inhibitory term as `-(x + C)·I`; here `F = -C`. Integration is forward
//! Euler and every result is clamped into `[F, B]`.

use crate::config::ChunkingConfig;
use crate::state::ActivationState;

/// Bounded nonlinear integrator. Pure: holds parameters only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShuntingDynamics {
    decay_rate: f64,
    ceiling: f64,
    floor: f64,
}

impl ShuntingDynamics {
    pub fn new(decay_rate: f64, ceiling: f64, floor: f64) -> Self {
        debug_assert!(floor <= ceiling);
        Self {
            decay_rate,
            ceiling,
            floor,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.decay_rate, config.ceiling, config.floor)
    }

    #[inline]
    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    #[inline]
    pub fn floor(&self) -> f64 {
        self.floor
    }

    /// Fresh activation state of `len` positions at rest.
    pub fn rest_state(&self, len: usize) -> ActivationState {
        ActivationState::at_rest(len, self.floor, self.ceiling)
    }

    /// Right-hand side of the shunting equation.
    #[inline]
    pub fn derivative(&self, x: f64, excitation: f64, inhibition: f64) -> f64 {
        -self.decay_rate * x + (self.ceiling - x) * excitation - (x - self.floor) * inhibition
    }

    /// One Euler step of a single position.
    #[inline]
    pub fn step_value(&self, x: f64, excitation: f64, inhibition: f64, dt: f64) -> f64 {
        (x + dt * self.derivative(x, excitation, inhibition)).clamp(self.floor, self.ceiling)
    }

    /// One Euler step of a whole field. Returns the replacement state.
    ///
    /// Positions past the end of `excitation` or `inhibition` see zero input.
    pub fn step(
        &self,
        current: &ActivationState,
        excitation: &[f64],
        inhibition: &[f64],
        dt: f64,
    ) -> ActivationState {
        let values = (0..current.len())
            .map(|i| {
                let e = excitation.get(i).copied().unwrap_or(0.0);
                let inh = inhibition.get(i).copied().unwrap_or(0.0);
                self.step_value(current.get(i), e, inh, dt)
            })
            .collect();
        ActivationState::from_values(values, self.floor, self.ceiling)
    }

    /// Steady state for constant inputs, `(B·E + F·I) / (A + E + I)`, clamped.
    ///
    /// Defined as 0 when the denominator vanishes.
    pub fn equilibrium(&self, excitation: f64, inhibition: f64) -> f64 {
        let denom = self.decay_rate + excitation + inhibition;
        if denom == 0.0 {
            return 0.0;
        }
        ((self.ceiling * excitation + self.floor * inhibition) / denom)
            .clamp(self.floor, self.ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converges_to_equilibrium() {
        let dynamics = ShuntingDynamics::new(1.0, 1.0, 0.0);
        let mut x = 0.0;
        for _ in 0..5000 {
            x = dynamics.step_value(x, 0.8, 0.3, 0.01);
        }
        let expected = dynamics.equilibrium(0.8, 0.3);
        assert!((expected - 0.8 / 2.1).abs() < 1e-12);
        assert!((x - expected).abs() < 1e-6, "x={} expected={}", x, expected);
    }

    #[test]
    fn test_negative_floor_equilibrium() {
        let dynamics = ShuntingDynamics::new(1.0, 1.0, -0.5);
        let mut state = dynamics.rest_state(3);
        for _ in 0..4000 {
            state = dynamics.step(&state, &[0.8, 0.0, 0.0], &[0.3, 2.0, 0.0], 0.01);
        }
        assert!((state.get(0) - (0.8 - 0.15) / 2.1).abs() < 1e-6);
        // Pure inhibition drives toward the floor, never past it.
        assert!(state.get(1) < 0.0 && state.get(1) >= -0.5);
        assert!(state.get(2).abs() < 1e-12);
    }

    #[test]
    fn test_boundedness_under_huge_inputs() {
        let dynamics = ShuntingDynamics::new(1.0, 1.0, -0.2);
        let mut state = dynamics.rest_state(4);
        let excitation = [1e9, 0.0, 1e9, 5.0];
        let inhibition = [0.0, 1e9, 1e9, 0.0];
        for _ in 0..50 {
            state = dynamics.step(&state, &excitation, &inhibition, 0.5);
            assert!(state.within_bounds());
            assert!(state.is_finite());
        }
    }

    #[test]
    fn test_zero_denominator_equilibrium() {
        let dynamics = ShuntingDynamics::new(0.0, 1.0, 0.0);
        assert_eq!(dynamics.equilibrium(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_missing_inputs_treated_as_zero() {
        let dynamics = ShuntingDynamics::new(1.0, 1.0, 0.0);
        let state = ActivationState::from_values(vec![0.5, 0.5], 0.0, 1.0);
        let next = dynamics.step(&state, &[], &[], 0.1);
        assert!((next.get(0) - 0.45).abs() < 1e-12);
    }
}
