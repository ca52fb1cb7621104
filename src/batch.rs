//! Batch segmentation on a fixed-size worker pool
//!
//! Small batches run on the calling thread. From `parallel_threshold`
//! sequences upward, each sequence is segmented by its own Segmenter on a
//! rayon pool, so no mutable state crosses sequences. Results come back in
//! input order either way.

use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use crate::config::ChunkingConfig;
use crate::error::{ChunkingError, ChunkingResult};
use crate::pattern::TemporalPattern;
use crate::segmenter::{Segmentation, Segmenter};

/// Lazily built worker pool.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    threads: usize,
    parallel_threshold: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl WorkerPool {
    /// Create a pool description; threads start with the first parallel batch.
    pub fn new(threads: usize, parallel_threshold: usize) -> Self {
        Self {
            threads,
            parallel_threshold,
            pool: None,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.worker_threads, config.batch_parallel_threshold)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// True when a batch of `batch_len` goes to the pool.
    pub fn should_parallelize(&self, batch_len: usize) -> bool {
        batch_len >= self.parallel_threshold
    }

    /// True once the first parallel batch has built the pool.
    pub fn is_started(&self) -> bool {
        self.pool.is_some()
    }

    fn pool(&mut self) -> ChunkingResult<Arc<ThreadPool>> {
        if let Some(pool) = &self.pool {
            return Ok(Arc::clone(pool));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("chunking-worker-{}", i))
            .build()
            .map_err(|e| ChunkingError::WorkerPool(e.to_string()))?;
        info!(threads = self.threads, "batch worker pool started");
        let pool = Arc::new(pool);
        self.pool = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// Segment every pattern on a fresh Segmenter. Output order matches
    /// input order; the first error in input order is returned.
    pub fn segment_all(
        &mut self,
        config: &ChunkingConfig,
        patterns: &[TemporalPattern],
    ) -> ChunkingResult<Vec<Segmentation>> {
        let results: Vec<ChunkingResult<Segmentation>> = if self.should_parallelize(patterns.len())
        {
            debug!(batch = patterns.len(), "segmenting batch in parallel");
            let pool = self.pool()?;
            pool.install(|| {
                patterns
                    .par_iter()
                    .map(|pattern| Segmenter::new(config).segment(pattern))
                    .collect()
            })
        } else {
            debug!(batch = patterns.len(), "segmenting batch sequentially");
            patterns
                .iter()
                .map(|pattern| Segmenter::new(config).segment(pattern))
                .collect()
        };
        results.into_iter().collect()
    }
}
