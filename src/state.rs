//! Field State - bounded per-position values for activations and gates
//!
//! The atomic unit of field storage. Every write is clamped into
//! `[lower, upper]`, so a state can never hold a value outside its bounds.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bounded vector of per-position values.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FieldState {
    values: Vec<f64>,
    lower: f64,
    upper: f64,
}

/// Activations of one field: values in `[floor, ceiling]`.
pub type ActivationState = FieldState;

/// Transmitter gate levels: values in `[0, 1]`.
pub type GateState = FieldState;

impl FieldState {
    /// Create a state filled with `initial` (clamped).
    pub fn filled(len: usize, initial: f64, lower: f64, upper: f64) -> Self {
        debug_assert!(lower <= upper);
        Self {
            values: vec![initial.clamp(lower, upper); len],
            lower,
            upper,
        }
    }

    /// Create a state at rest: zero clamped into the bounds.
    pub fn at_rest(len: usize, lower: f64, upper: f64) -> Self {
        Self::filled(len, 0.0, lower, upper)
    }

    /// Create a gate state, fully recovered.
    pub fn gates(len: usize) -> Self {
        Self::filled(len, 1.0, 0.0, 1.0)
    }

    /// Create from raw values (clamped).
    pub fn from_values(values: Vec<f64>, lower: f64, upper: f64) -> Self {
        let mut state = Self {
            values,
            lower,
            upper,
        };
        for v in &mut state.values {
            *v = v.clamp(lower, upper);
        }
        state
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn lower(&self) -> f64 {
        self.lower
    }

    #[inline]
    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Get value at index.
    #[inline]
    pub fn get(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    /// Set value at index (clamped).
    #[inline]
    pub fn set(&mut self, idx: usize, value: f64) {
        self.values[idx] = value.clamp(self.lower, self.upper);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.clone()
    }

    /// Set every position to `value` (clamped).
    pub fn fill(&mut self, value: f64) {
        let v = value.clamp(self.lower, self.upper);
        self.values.iter_mut().for_each(|x| *x = v);
    }

    /// Sum of rectified values, `sum(max(x, 0))`.
    pub fn total_positive(&self) -> f64 {
        self.values.iter().map(|&v| v.max(0.0)).sum()
    }

    /// Largest value, or the lower bound when empty.
    pub fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(self.lower, f64::max)
    }

    /// Largest absolute difference against another state of equal length.
    pub fn max_abs_diff(&self, other: &FieldState) -> f64 {
        debug_assert_eq!(self.len(), other.len());
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Activation-weighted mean position (rectified). Zero for a silent field.
    pub fn center_of_mass(&self) -> f64 {
        let total = self.total_positive();
        if total <= 0.0 {
            return 0.0;
        }
        self.values
            .iter()
            .enumerate()
            .map(|(i, &v)| i as f64 * v.max(0.0))
            .sum::<f64>()
            / total
    }

    /// Count positions strictly below `threshold`.
    pub fn count_below(&self, threshold: f64) -> usize {
        self.values.iter().filter(|&&v| v < threshold).count()
    }

    /// True when no position is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.values.iter().all(|v| v.is_finite())
    }

    /// True when every value sits inside the bounds.
    pub fn within_bounds(&self) -> bool {
        self.values
            .iter()
            .all(|&v| v >= self.lower && v <= self.upper)
    }
}
