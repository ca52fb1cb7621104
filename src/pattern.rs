//! Temporal Pattern - immutable ordered sequence of vector items
//!
//! Items share one backing buffer, so sub-ranges are views, not copies.

use std::ops::Range;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ChunkingError, ChunkingResult};

/// Ordered sequence of fixed-dimension items with optional per-item weights.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalPattern {
    items: Arc<Vec<Vec<f64>>>,
    weights: Option<Arc<Vec<f64>>>,
    range: Range<usize>,
    dimension: usize,
}

impl TemporalPattern {
    /// Build a pattern, checking that every item has the same dimension
    /// and only finite values.
    pub fn new(items: Vec<Vec<f64>>) -> ChunkingResult<Self> {
        let dimension = items.first().map(Vec::len).unwrap_or(0);
        Self::with_dimension(items, dimension)
    }

    /// Build a pattern whose items must all have `dimension` entries.
    pub fn with_dimension(items: Vec<Vec<f64>>, dimension: usize) -> ChunkingResult<Self> {
        for (index, item) in items.iter().enumerate() {
            if item.len() != dimension {
                return Err(ChunkingError::dimension_mismatch(dimension, item.len()));
            }
            if item.iter().any(|v| !v.is_finite()) {
                return Err(ChunkingError::NonFiniteValue { index });
            }
        }
        let len = items.len();
        Ok(Self {
            items: Arc::new(items),
            weights: None,
            range: 0..len,
            dimension,
        })
    }

    /// Build a pattern carrying one weight per item.
    pub fn with_weights(items: Vec<Vec<f64>>, weights: Vec<f64>) -> ChunkingResult<Self> {
        if weights.len() != items.len() {
            return Err(ChunkingError::dimension_mismatch(items.len(), weights.len()));
        }
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(ChunkingError::NonFiniteValue { index });
        }
        let mut pattern = Self::new(items)?;
        pattern.weights = Some(Arc::new(weights));
        Ok(pattern)
    }

    /// Assemble from items that were validated on the way into the crate.
    pub(crate) fn from_validated(
        items: Vec<Vec<f64>>,
        weights: Option<Vec<f64>>,
        dimension: usize,
    ) -> Self {
        debug_assert!(items.iter().all(|item| item.len() == dimension));
        let len = items.len();
        Self {
            items: Arc::new(items),
            weights: weights.map(Arc::new),
            range: 0..len,
            dimension,
        }
    }

    /// Empty pattern of the given item dimension.
    pub fn empty(dimension: usize) -> Self {
        Self {
            items: Arc::new(Vec::new()),
            weights: None,
            range: 0..0,
            dimension,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Item at position `idx` of this view.
    #[inline]
    pub fn item(&self, idx: usize) -> &[f64] {
        &self.items[self.range.start + idx]
    }

    pub fn items(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.items[self.range.clone()].iter().map(Vec::as_slice)
    }

    /// Weight of position `idx`; 1.0 when the pattern carries no weights.
    #[inline]
    pub fn weight(&self, idx: usize) -> f64 {
        self.weights
            .as_ref()
            .map(|w| w[self.range.start + idx])
            .unwrap_or(1.0)
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_ref().map(|w| &w[self.range.clone()])
    }

    pub fn has_weights(&self) -> bool {
        self.weights.is_some()
    }

    /// View of a sub-range. Shares the backing buffer.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let start = (self.range.start + range.start).min(self.range.end);
        let end = (self.range.start + range.end).clamp(start, self.range.end);
        Self {
            items: Arc::clone(&self.items),
            weights: self.weights.clone(),
            range: start..end,
            dimension: self.dimension,
        }
    }

    /// Owned copy of the items in this view.
    pub fn to_items(&self) -> Vec<Vec<f64>> {
        self.items[self.range.clone()].to_vec()
    }

    /// Same length, and every value within `tolerance` of its counterpart.
    pub fn approx_eq(&self, other: &TemporalPattern, tolerance: f64) -> bool {
        self.len() == other.len()
            && self.dimension == other.dimension
            && self
                .items()
                .zip(other.items())
                .all(|(a, b)| a.iter().zip(b).all(|(x, y)| (x - y).abs() <= tolerance))
    }

    /// Concatenate items into one vector of `max_items * dimension` values,
    /// zero-padded. Items beyond `max_items` are dropped.
    pub fn flatten(&self, max_items: usize) -> Vec<f64> {
        let mut flat = vec![0.0; max_items * self.dimension];
        for (i, item) in self.items().take(max_items).enumerate() {
            flat[i * self.dimension..(i + 1) * self.dimension].copy_from_slice(item);
        }
        flat
    }

    /// How much item `idx` differs from its predecessor, in [0, 1].
    ///
    /// The first item is always fully salient. Otherwise `1 - cos`, with
    /// zero vectors handled explicitly.
    pub fn salience(&self, idx: usize) -> f64 {
        if idx == 0 {
            return 1.0;
        }
        let a = self.item(idx);
        let b = self.item(idx - 1);
        let norm_a = norm(a);
        let norm_b = norm(b);
        match (norm_a == 0.0, norm_b == 0.0) {
            (true, true) => 0.0,
            (true, false) | (false, true) => 1.0,
            (false, false) => {
                let cos = dot(a, b) / (norm_a * norm_b);
                (1.0 - cos).clamp(0.0, 1.0)
            }
        }
    }

    /// Onset strength of item `idx`: its salience, except that the first
    /// item has nothing to break from and scores 0.
    pub fn onset(&self, idx: usize) -> f64 {
        if idx == 0 {
            0.0
        } else {
            self.salience(idx)
        }
    }
}

impl PartialEq for TemporalPattern {
    fn eq(&self, other: &Self) -> bool {
        self.dimension == other.dimension
            && self.len() == other.len()
            && self.items().eq(other.items())
            && self.weights() == other.weights()
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}
