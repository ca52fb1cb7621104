//! Instar learning - competitive template adaptation
//!
//! Self-normalizing form, for one row `W` driven by input `x` and a
//! postsynaptic winner activity `c`:
//!
//! ```text
//! dW_i/dt = η·f(c)·[(1 - W_i)·x_i - W_i·Σ_k x_k]
//! ```
//!
//! with `f(c) = max(c, 0)`. At steady state `W_i = x_i / (x_i + Σx)`, so the
//! row sum never exceeds 1. The hard-competition form moves only the
//! winning row straight toward the input: `W += η·(x - W)`.

use crate::config::{ChunkingConfig, InstarRule};

/// Weight adaptation for the row that won competition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstarLearning {
    rule: InstarRule,
    learning_rate: f64,
}

impl InstarLearning {
    pub fn new(rule: InstarRule, learning_rate: f64) -> Self {
        Self {
            rule,
            learning_rate,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.instar_rule, config.learning_rate)
    }

    pub fn rule(&self) -> InstarRule {
        self.rule
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// One self-normalizing step of `row`. Pure.
    ///
    /// Negative presynaptic values are treated as silent, and the result is
    /// clamped to `[0, 1]`.
    pub fn update(row: &[f64], presynaptic: &[f64], postsynaptic: f64, rate: f64) -> Vec<f64> {
        let gain = rate * postsynaptic.max(0.0);
        if gain == 0.0 {
            return row.to_vec();
        }
        let total: f64 = presynaptic.iter().map(|&x| x.max(0.0)).sum();
        row.iter()
            .enumerate()
            .map(|(i, &w)| {
                let x = presynaptic.get(i).copied().unwrap_or(0.0).max(0.0);
                (w + gain * ((1.0 - w) * x - w * total)).clamp(0.0, 1.0)
            })
            .collect()
    }

    /// Move `row` a fraction `rate` of the way toward `presynaptic`.
    ///
    /// A convex combination, so non-negative rows fed non-negative input
    /// stay non-negative.
    pub fn move_toward(row: &[f64], presynaptic: &[f64], rate: f64) -> Vec<f64> {
        row.iter()
            .zip(presynaptic)
            .map(|(&w, &x)| w + rate * (x - w))
            .collect()
    }

    /// Adapt one row under the configured rule.
    pub fn adapt(&self, row: &[f64], presynaptic: &[f64], postsynaptic: f64) -> Vec<f64> {
        match self.rule {
            InstarRule::HardCompetition => Self::move_toward(row, presynaptic, self.learning_rate),
            InstarRule::SelfNormalizing => {
                Self::update(row, presynaptic, postsynaptic, self.learning_rate)
            }
        }
    }

    /// Adapt only the winning row of `weights`; every other row is left
    /// untouched. Out-of-range winners are ignored.
    pub fn update_winner(
        &self,
        weights: &mut [Vec<f64>],
        winner: usize,
        presynaptic: &[f64],
        postsynaptic: f64,
    ) {
        if let Some(row) = weights.get_mut(winner) {
            *row = self.adapt(row, presynaptic, postsynaptic);
        }
    }

    /// Steady-state self-normalizing row for a constant input.
    pub fn steady_state(presynaptic: &[f64]) -> Vec<f64> {
        let total: f64 = presynaptic.iter().map(|&x| x.max(0.0)).sum();
        presynaptic
            .iter()
            .map(|&x| {
                let x = x.max(0.0);
                if x + total == 0.0 {
                    0.0
                } else {
                    x / (x + total)
                }
            })
            .collect()
    }
}
