//! Temporal Chunking - segmenting item streams into learned chunks
//!
//! Items flow one way per cycle:
//!
//! ```text
//! items -> WorkingMemory -> MaskingField -> boundaries -> chunks -> classifier
//! ```
//!
//! # Core Types
//!
//! - **ShuntingDynamics**: bounded on-center/off-surround integrator
//! - **TransmitterGates**: habituative gain that depletes under sustained firing
//! - **WorkingMemory**: ring buffer of items with a primacy gradient
//! - **MaskingField**: multi-scale competitive field whose settled activations
//!   mark chunk boundaries
//! - **InstarLearning**: template adaptation for the winning row
//! - **TemporalEngine**: learn / predict / streaming orchestration
//!
//! # Architecture: Memory / Field / Classifier
//!
//! 1. **WorkingMemory** holds the recent items. Each slot carries a trace
//!    that relaxes toward its primacy weight, so early items (and the last
//!    few) dominate.
//! 2. **MaskingField** is driven by each item's trace, cut wherever an item
//!    breaks from its predecessor. Competition within and across scales
//!    settles into plateaus over runs, and the low local minima between
//!    them snap back to the item onsets as chunk boundaries.
//! 3. **Classifier** - anything implementing [`CategoryClassifier`] - sees the
//!    largest chunk, flattened to `max_sequence_length * item_dimension`.
//!
//! Whole sequences are processed with `learn_temporal` / `predict_temporal`.
//! Streams are fed item by item with `process_sequence_item`; the chunk is
//! classified once the field settles on a boundary.
//!
//! Batches of sequences are segmented on a fixed-size worker pool once they
//! reach `batch_parallel_threshold`. Classification stays on the calling
//! thread, in input order.
//!
//! # Example: Learning a Sequence
//!
//! ```rust
//! use temporal_chunking::{ChunkingConfig, InstarCategorizer, TemporalEngine, TemporalPattern};
//!
//! fn one_hot(i: usize) -> Vec<f64> {
//!     let mut v = vec![0.0; 10];
//!     v[i] = 1.0;
//!     v
//! }
//!
//! // 1. Engine with the list-learning defaults and the reference classifier
//! let config = ChunkingConfig::list_learning_defaults();
//! let classifier = InstarCategorizer::from_config(&config, 0.9);
//! let mut engine = TemporalEngine::new(config, classifier).unwrap();
//!
//! // 2. Seven distinct items
//! let sequence = TemporalPattern::new((0..7).map(one_hot).collect()).unwrap();
//!
//! // 3. Segment, classify and remember the largest chunk
//! let result = engine.learn_temporal(&sequence).unwrap();
//! assert!(result.converged);
//! assert!(!result.boundaries.is_empty());
//! assert!(result.has_new_chunks());
//!
//! // 4. Predicting the same sequence finds the same category
//! let again = engine.predict_temporal(&sequence).unwrap();
//! assert_eq!(again.category, result.category);
//! ```

mod batch;
mod boundary;
mod chunk;
mod classifier;
mod config;
mod engine;
mod error;
mod instar;
mod masking_field;
mod observer;
mod pattern;
mod segmenter;
mod shunting;
mod state;
mod transmitter;
mod working_memory;

pub use batch::WorkerPool;
pub use boundary::{
    cell_items, field_to_sequence, merge_boundaries, sequence_to_field, BoundaryDetector,
};
pub use chunk::{extract_chunks, largest_chunk, Chunk, ChunkUpdate, LearnedChunk, LearnedChunkSet};
pub use classifier::{CategoryClassifier, ClassifierOutcome, InstarCategorizer};
pub use config::{ChunkingConfig, CouplingWeights, InstarRule};
pub use engine::{TemporalEngine, TemporalResult};
pub use error::{ChunkingError, ChunkingResult};
pub use instar::InstarLearning;
pub use masking_field::{MaskingField, MaskingResult};
pub use observer::{ChannelObserver, EngineEvent, EngineObserver, EngineState, FnObserver};
pub use pattern::TemporalPattern;
pub use segmenter::{Segmentation, Segmenter};
pub use shunting::ShuntingDynamics;
pub use state::{ActivationState, FieldState, GateState};
pub use transmitter::TransmitterGates;
pub use working_memory::{WorkingMemory, WorkingMemoryState};
