//! Working Memory - item-and-order store with a primacy gradient
//!
//! A ring buffer of items. Once full, the oldest item is evicted. Each slot
//! carries an activation trace that relaxes toward the primacy weight of its
//! position; time only advances when the caller steps it.

use crate::config::ChunkingConfig;
use crate::error::{ChunkingError, ChunkingResult};
use crate::pattern::TemporalPattern;
use crate::shunting::ShuntingDynamics;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Read-only snapshot of working memory.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorkingMemoryState {
    /// Items oldest-first, weighted by their activation trace.
    pub pattern: TemporalPattern,
    /// Target primacy weight per position.
    pub primacy: Vec<f64>,
}

/// Fixed-capacity item store.
#[derive(Clone, Debug)]
pub struct WorkingMemory {
    /// Ring buffer slots.
    items: Vec<Vec<f64>>,
    timestamps: Vec<f64>,
    trace: Vec<f64>,

    /// Slot of the oldest item.
    head: usize,
    len: usize,

    capacity: usize,
    dimension: usize,
    gamma: f64,
    delta: f64,
    recency_span: usize,
    time_scale: f64,
    dynamics: ShuntingDynamics,

    /// Items evicted since the last clear.
    evicted: u64,
}

impl WorkingMemory {
    /// Create an empty store holding up to `working_memory_capacity` items.
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            items: Vec::with_capacity(config.working_memory_capacity),
            timestamps: Vec::with_capacity(config.working_memory_capacity),
            trace: Vec::with_capacity(config.working_memory_capacity),
            head: 0,
            len: 0,
            capacity: config.working_memory_capacity,
            dimension: config.item_dimension,
            gamma: config.primacy_gamma,
            delta: config.primacy_delta,
            recency_span: config.recency_span,
            time_scale: config.working_memory_time_scale,
            dynamics: ShuntingDynamics::from_config(config),
            evicted: 0,
        }
    }

    // =========================================================================
    // WRITING
    // =========================================================================

    /// Append an item. Evicts the oldest item when full.
    pub fn store_item(&mut self, item: &[f64], timestamp: f64) -> ChunkingResult<()> {
        if item.len() != self.dimension {
            return Err(ChunkingError::dimension_mismatch(self.dimension, item.len()));
        }
        if item.iter().any(|v| !v.is_finite()) {
            return Err(ChunkingError::NonFiniteValue { index: self.len });
        }

        if self.items.len() < self.capacity {
            self.items.push(item.to_vec());
            self.timestamps.push(timestamp);
            self.trace.push(0.0);
            self.len += 1;
        } else {
            // Full: overwrite the oldest slot, which becomes the newest.
            let slot = self.head;
            self.items[slot].copy_from_slice(item);
            self.timestamps[slot] = timestamp;
            self.trace[slot] = 0.0;
            self.head = (self.head + 1) % self.capacity;
            self.evicted += 1;
        }
        Ok(())
    }

    /// Clear, then store every item with timestamps 0, 1, 2, ...
    pub fn store_sequence(&mut self, pattern: &TemporalPattern) -> ChunkingResult<()> {
        if !pattern.is_empty() && pattern.dimension() != self.dimension {
            return Err(ChunkingError::dimension_mismatch(
                self.dimension,
                pattern.dimension(),
            ));
        }
        self.clear();
        for (i, item) in pattern.items().enumerate() {
            self.store_item(item, i as f64)?;
        }
        Ok(())
    }

    /// Empty the store.
    pub fn clear(&mut self) {
        self.items.clear();
        self.timestamps.clear();
        self.trace.clear();
        self.head = 0;
        self.len = 0;
        self.evicted = 0;
    }

    // =========================================================================
    // DYNAMICS
    // =========================================================================

    /// Primacy weight of position `p` (0 = oldest) when `len` items are held.
    ///
    /// `exp(-γ·p) · (1 + δ·recency(p))`, where recency is 1 for the last
    /// `recency_span` positions.
    pub fn primacy_weight(&self, p: usize, len: usize) -> f64 {
        let recency = if p + self.recency_span >= len { 1.0 } else { 0.0 };
        (-self.gamma * p as f64).exp() * (1.0 + self.delta * recency)
    }

    /// Primacy weights of the current contents, oldest first.
    pub fn primacy_weights(&self) -> Vec<f64> {
        (0..self.len).map(|p| self.primacy_weight(p, self.len)).collect()
    }

    /// Advance every trace one shunting step toward its primacy weight.
    ///
    /// Working memory integrates `time_scale` times faster than the caller's
    /// clock.
    pub fn step(&mut self, dt: f64) {
        let wm_dt = dt * self.time_scale;
        for p in 0..self.len {
            let slot = self.slot(p);
            let target = self.primacy_weight(p, self.len);
            self.trace[slot] = self.dynamics.step_value(self.trace[slot], target, 0.0, wm_dt);
        }
    }

    /// Jump every trace to its steady state.
    pub fn settle(&mut self) {
        for p in 0..self.len {
            let slot = self.slot(p);
            let target = self.primacy_weight(p, self.len);
            self.trace[slot] = self.dynamics.equilibrium(target, 0.0);
        }
    }

    // =========================================================================
    // READING
    // =========================================================================

    #[inline]
    fn slot(&self, p: usize) -> usize {
        (self.head + p) % self.capacity
    }

    /// The last `n` items as a pattern, oldest first, weighted by trace.
    pub fn read_window(&self, n: usize) -> TemporalPattern {
        let n = n.min(self.len);
        let skip = self.len - n;
        let mut items = Vec::with_capacity(n);
        let mut weights = Vec::with_capacity(n);
        for p in skip..self.len {
            let slot = self.slot(p);
            items.push(self.items[slot].clone());
            weights.push(self.trace[slot]);
        }
        TemporalPattern::from_validated(items, Some(weights), self.dimension)
    }

    /// Everything held, oldest first.
    pub fn current_contents(&self) -> TemporalPattern {
        self.read_window(self.len)
    }

    /// Snapshot of contents plus the primacy gradient.
    pub fn snapshot(&self) -> WorkingMemoryState {
        WorkingMemoryState {
            pattern: self.current_contents(),
            primacy: self.primacy_weights(),
        }
    }

    /// Activation trace, oldest first.
    pub fn activations(&self) -> Vec<f64> {
        (0..self.len).map(|p| self.trace[self.slot(p)]).collect()
    }

    /// Timestamps, oldest first.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.len).map(|p| self.timestamps[self.slot(p)]).collect()
    }

    /// Items currently held.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Items held before the oldest is evicted.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    /// Items evicted since creation or the last clear.
    pub fn evicted_count(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> ChunkingConfig {
        ChunkingConfig::default()
            .with_item_dimension(2)
            .with_working_memory_capacity(capacity)
    }

    fn item(v: f64) -> Vec<f64> {
        vec![v, -v]
    }

    #[test]
    fn test_fifo_eviction() {
        let mut wm = WorkingMemory::new(&config(100));
        for i in 0..500 {
            wm.store_item(&item(i as f64), i as f64).unwrap();
        }

        assert_eq!(wm.len(), 100);
        assert!(wm.is_full());
        assert_eq!(wm.evicted_count(), 400);

        let contents = wm.current_contents();
        assert_eq!(contents.len(), 100);
        for (p, it) in contents.items().enumerate() {
            assert_eq!(it[0], (400 + p) as f64);
        }
        assert_eq!(wm.timestamps()[0], 400.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut wm = WorkingMemory::new(&config(4));
        let err = wm.store_item(&[1.0, 2.0, 3.0], 0.0).unwrap_err();
        assert!(matches!(
            err,
            ChunkingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
        assert!(wm.is_empty());
    }

    #[test]
    fn test_primacy_gradient() {
        let wm = WorkingMemory::new(&config(10));
        let len = 6;
        let weights: Vec<f64> = (0..len).map(|p| wm.primacy_weight(p, len)).collect();

        assert_eq!(weights[0], 1.0);
        // Primacy: decreasing until the recency span.
        for p in 1..4 {
            assert!(weights[p] < weights[p - 1]);
        }
        // Recency: last two boosted by (1 + delta).
        let expected = (-0.1f64 * 4.0).exp() * 1.3;
        assert!((weights[4] - expected).abs() < 1e-12);
        assert!(weights[4] > weights[3]);
    }

    #[test]
    fn test_step_converges_to_settled_trace() {
        let mut stepped = WorkingMemory::new(&config(8));
        let mut settled = WorkingMemory::new(&config(8));
        for i in 0..5 {
            stepped.store_item(&item(i as f64), i as f64).unwrap();
            settled.store_item(&item(i as f64), i as f64).unwrap();
        }
        for _ in 0..400 {
            stepped.step(0.05);
        }
        settled.settle();

        for (a, b) in stepped.activations().iter().zip(settled.activations()) {
            assert!((a - b).abs() < 1e-6);
        }
        // Trace keeps the primacy ordering of its targets.
        let trace = settled.activations();
        assert!(trace[0] > trace[1] && trace[1] > trace[2]);
    }

    #[test]
    fn test_store_sequence_replaces_contents() {
        let mut wm = WorkingMemory::new(&config(8));
        wm.store_item(&item(9.0), 0.0).unwrap();

        let pattern = TemporalPattern::new(vec![item(1.0), item(2.0)]).unwrap();
        wm.store_sequence(&pattern).unwrap();
        assert_eq!(wm.len(), 2);
        assert_eq!(wm.timestamps(), vec![0.0, 1.0]);
        assert_eq!(wm.current_contents().item(0), item(1.0).as_slice());

        wm.clear();
        assert!(wm.current_contents().is_empty());
    }

    #[test]
    fn test_read_window_chronological() {
        let mut wm = WorkingMemory::new(&config(3));
        for i in 0..5 {
            wm.store_item(&item(i as f64), i as f64).unwrap();
        }
        let window = wm.read_window(2);
        assert_eq!(window.len(), 2);
        assert_eq!(window.item(0)[0], 3.0);
        assert_eq!(window.item(1)[0], 4.0);
    }
}
