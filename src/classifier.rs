//! Classifier contract consumed by the engine
//!
//! The engine hands each finished chunk, flattened to a fixed-length
//! vector, to a [`CategoryClassifier`]. Any category-learning algorithm can
//! sit behind the trait. [`InstarCategorizer`] is a small reference
//! implementation.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{ChunkingConfig, InstarRule};
use crate::instar::InstarLearning;
use crate::pattern::{dot, norm};

/// Answer from a classifier.
///
/// The engine only understands `Success` and `NoMatch`; the other two are
/// intermediate states of ARTMAP-style learners and are rejected as a
/// contract breach when they reach it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClassifierOutcome {
    Success { category: usize, activation: f64 },
    NoMatch,
    MapFieldMismatch { category: usize },
    MatchTrackingSearch { vigilance: f64 },
}

impl ClassifierOutcome {
    pub fn category(&self) -> Option<usize> {
        match self {
            Self::Success { category, .. } => Some(*category),
            _ => None,
        }
    }
}

/// Pattern to category learner.
///
/// `predict` must not change state. If one classifier is shared across
/// threads, the caller serializes access to it.
pub trait CategoryClassifier {
    fn learn(&mut self, pattern: &[f64]) -> ClassifierOutcome;
    fn predict(&self, pattern: &[f64]) -> ClassifierOutcome;
    fn category_count(&self) -> usize;
    fn clear(&mut self);
}

impl<C: CategoryClassifier + ?Sized> CategoryClassifier for Box<C> {
    fn learn(&mut self, pattern: &[f64]) -> ClassifierOutcome {
        (**self).learn(pattern)
    }

    fn predict(&self, pattern: &[f64]) -> ClassifierOutcome {
        (**self).predict(pattern)
    }

    fn category_count(&self) -> usize {
        (**self).category_count()
    }

    fn clear(&mut self) {
        (**self).clear()
    }
}

/// Cosine-choice categorizer with a vigilance test.
///
/// The best-matching template wins; if its cosine similarity reaches the
/// vigilance it adapts toward the input, otherwise a new category is
/// committed (unless the category cap is reached).
#[derive(Clone, Debug)]
pub struct InstarCategorizer {
    templates: Vec<Vec<f64>>,
    vigilance: f64,
    max_categories: Option<usize>,
    instar: InstarLearning,
}

impl InstarCategorizer {
    pub fn new(vigilance: f64, learning_rate: f64) -> Self {
        Self {
            templates: Vec::new(),
            vigilance,
            max_categories: None,
            instar: InstarLearning::new(InstarRule::HardCompetition, learning_rate),
        }
    }

    /// Uses the configured instar rule and learning rate.
    pub fn from_config(config: &ChunkingConfig, vigilance: f64) -> Self {
        Self {
            instar: InstarLearning::from_config(config),
            ..Self::new(vigilance, config.learning_rate)
        }
    }

    pub fn with_max_categories(mut self, max: usize) -> Self {
        self.max_categories = Some(max);
        self
    }

    pub fn vigilance(&self) -> f64 {
        self.vigilance
    }

    pub fn templates(&self) -> &[Vec<f64>] {
        &self.templates
    }

    /// Best template by cosine similarity; the earliest wins a tie.
    fn choose(&self, pattern: &[f64]) -> Option<(usize, f64)> {
        let pattern_norm = norm(pattern);
        if pattern_norm == 0.0 {
            return None;
        }
        let mut best: Option<(usize, f64)> = None;
        for (index, template) in self.templates.iter().enumerate() {
            let template_norm = norm(template);
            if template_norm == 0.0 {
                continue;
            }
            let similarity = dot(template, pattern) / (template_norm * pattern_norm);
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((index, similarity));
            }
        }
        best
    }

    fn at_capacity(&self) -> bool {
        self.max_categories
            .is_some_and(|max| self.templates.len() >= max)
    }
}

impl CategoryClassifier for InstarCategorizer {
    fn learn(&mut self, pattern: &[f64]) -> ClassifierOutcome {
        if norm(pattern) == 0.0 {
            return ClassifierOutcome::NoMatch;
        }
        match self.choose(pattern) {
            Some((category, similarity)) if similarity >= self.vigilance => {
                self.instar
                    .update_winner(&mut self.templates, category, pattern, similarity);
                ClassifierOutcome::Success {
                    category,
                    activation: similarity,
                }
            }
            _ if self.at_capacity() => ClassifierOutcome::NoMatch,
            _ => {
                self.templates.push(pattern.to_vec());
                ClassifierOutcome::Success {
                    category: self.templates.len() - 1,
                    activation: 1.0,
                }
            }
        }
    }

    fn predict(&self, pattern: &[f64]) -> ClassifierOutcome {
        match self.choose(pattern) {
            Some((category, similarity)) if similarity >= self.vigilance => {
                ClassifierOutcome::Success {
                    category,
                    activation: similarity,
                }
            }
            _ => ClassifierOutcome::NoMatch,
        }
    }

    fn category_count(&self) -> usize {
        self.templates.len()
    }

    fn clear(&mut self) {
        self.templates.clear();
    }
}
