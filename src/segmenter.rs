//! Segmenter - working memory feeding the masking field
//!
//! Owns one WorkingMemory and one MaskingField. Whole sequences are loaded,
//! settled and run to convergence; streamed items advance both one step at
//! a time. A Segmenter never talks to a classifier, so independent
//! sequences can be segmented on independent Segmenters in parallel.

use tracing::debug;

use crate::chunk::{extract_chunks, largest_chunk, Chunk};
use crate::config::ChunkingConfig;
use crate::error::{ChunkingError, ChunkingResult};
use crate::masking_field::{MaskingField, MaskingResult};
use crate::pattern::TemporalPattern;
use crate::working_memory::WorkingMemory;

/// A segmented sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Segmentation {
    /// Working-memory contents the field ran on.
    pub pattern: TemporalPattern,
    pub masking: MaskingResult,
    /// Chunks tiling `pattern`.
    pub chunks: Vec<Chunk>,
}

impl Segmentation {
    /// The chunk handed to the classifier.
    pub fn largest_chunk(&self) -> Option<&Chunk> {
        largest_chunk(&self.chunks)
    }
}

#[derive(Clone, Debug)]
pub struct Segmenter {
    working_memory: WorkingMemory,
    masking_field: MaskingField,
    item_dimension: usize,
    enable_chunking: bool,
}

impl Segmenter {
    /// Fresh working memory and masking field for one sequence.
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            working_memory: WorkingMemory::new(config),
            masking_field: MaskingField::new(config),
            item_dimension: config.item_dimension,
            enable_chunking: config.enable_chunking,
        }
    }

    /// Load a whole sequence and run the field to convergence.
    ///
    /// Sequences longer than working-memory capacity keep only their most
    /// recent items.
    pub fn segment(&mut self, pattern: &TemporalPattern) -> ChunkingResult<Segmentation> {
        if !pattern.is_empty() && pattern.dimension() != self.item_dimension {
            return Err(ChunkingError::dimension_mismatch(
                self.item_dimension,
                pattern.dimension(),
            ));
        }
        self.working_memory.store_sequence(pattern)?;
        self.segment_contents()
    }

    /// Settle whatever working memory holds and run the field to
    /// convergence on it.
    pub fn segment_contents(&mut self) -> ChunkingResult<Segmentation> {
        self.working_memory.settle();
        let contents = self.working_memory.current_contents();
        let masking = self.masking_field.process(&contents)?;
        let segmentation = self.chunk(contents, masking);
        debug!(
            items = segmentation.pattern.len(),
            chunks = segmentation.chunks.len(),
            converged = segmentation.masking.converged,
            "sequence segmented"
        );
        Ok(segmentation)
    }

    /// Store one streamed item and advance everything one step.
    pub fn push_item(
        &mut self,
        item: &[f64],
        timestamp: f64,
        dt: f64,
    ) -> ChunkingResult<Segmentation> {
        self.working_memory.store_item(item, timestamp)?;
        self.advance(dt)
    }

    /// Advance working memory and the field one step with no new item.
    pub fn advance(&mut self, dt: f64) -> ChunkingResult<Segmentation> {
        self.working_memory.step(dt);
        let contents = self.working_memory.current_contents();
        let masking = self.masking_field.process_time_step(&contents, dt)?;
        Ok(self.chunk(contents, masking))
    }

    fn chunk(&self, pattern: TemporalPattern, masking: MaskingResult) -> Segmentation {
        let chunks = if self.enable_chunking {
            extract_chunks(&pattern, &masking.boundaries)
        } else {
            extract_chunks(&pattern, &[])
        };
        Segmentation {
            pattern,
            masking,
            chunks,
        }
    }

    /// Empty working memory and return the field to rest.
    pub fn reset(&mut self) {
        self.working_memory.clear();
        self.masking_field.reset();
    }

    pub fn working_memory(&self) -> &WorkingMemory {
        &self.working_memory
    }

    pub fn masking_field(&self) -> &MaskingField {
        &self.masking_field
    }
}
