//! Temporal Engine - learn / predict / stream orchestration
//!
//! Single-shot calls load a whole sequence, run the masking field to
//! convergence, pick the largest chunk and hand it to the classifier.
//! Streaming calls feed one item per step through a small state machine:
//!
//! ```text
//! Idle --item--> Accumulating --converged with boundary / end--> ChunkReady
//!   ^                                                               |
//!   +------------------ reset_temporal_state / next item -----------+
//! ```

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::batch::WorkerPool;
use crate::chunk::{Chunk, ChunkUpdate, LearnedChunkSet};
use crate::classifier::{CategoryClassifier, ClassifierOutcome, InstarCategorizer};
use crate::config::ChunkingConfig;
use crate::error::{ChunkingError, ChunkingResult};
use crate::masking_field::MaskingResult;
use crate::observer::{EngineEvent, EngineObserver, EngineState};
use crate::pattern::TemporalPattern;
use crate::segmenter::{Segmentation, Segmenter};
use crate::working_memory::WorkingMemoryState;

/// Outcome of one engine call.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalResult {
    /// Category the classifier assigned, if it matched.
    pub category: Option<usize>,
    /// Classifier activation for that category.
    pub activation: f64,
    /// Chunk handed to the classifier.
    pub chunk: Option<Chunk>,
    /// Every chunk of the segmented sequence.
    pub chunks: Vec<Chunk>,
    pub boundaries: Vec<usize>,
    pub converged: bool,
    pub iterations: usize,
    /// Learned templates added by this call.
    pub new_chunks: usize,
    /// Engine state after the call.
    pub state: EngineState,
    pub masking: Option<MaskingResult>,
}

impl TemporalResult {
    fn empty(state: EngineState) -> Self {
        Self {
            category: None,
            activation: 0.0,
            chunk: None,
            chunks: Vec::new(),
            boundaries: Vec::new(),
            converged: false,
            iterations: 0,
            new_chunks: 0,
            state,
            masking: None,
        }
    }

    /// Describes a segmentation that did not reach the classifier.
    fn pending(segmentation: Segmentation, state: EngineState) -> Self {
        let Segmentation {
            masking, chunks, ..
        } = segmentation;
        Self {
            boundaries: masking.boundaries.clone(),
            converged: masking.converged,
            iterations: masking.iterations,
            chunks,
            masking: Some(masking),
            ..Self::empty(state)
        }
    }

    /// This call added at least one learned template.
    pub fn has_new_chunks(&self) -> bool {
        self.new_chunks > 0
    }

    /// A chunk went to the classifier in this call.
    pub fn chunk_processed(&self) -> bool {
        self.chunk.is_some()
    }

    /// The classifier assigned a category.
    pub fn is_match(&self) -> bool {
        self.category.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mode {
    Learn,
    Predict,
}

/// The chunking engine.
///
/// Owns its working memory, masking field and learned chunk set; the
/// classifier is supplied by the caller.
pub struct TemporalEngine<C: CategoryClassifier = InstarCategorizer> {
    config: ChunkingConfig,
    classifier: C,
    segmenter: Segmenter,
    learned: LearnedChunkSet,
    pool: WorkerPool,
    observers: Vec<Arc<dyn EngineObserver>>,
    state: EngineState,
    /// Simulated time of the current stream.
    clock: f64,
}

impl<C: CategoryClassifier> TemporalEngine<C> {
    /// Validate the configuration and build the engine.
    pub fn new(config: ChunkingConfig, classifier: C) -> ChunkingResult<Self> {
        config.validate()?;
        debug!(
            scales = config.active_field_sizes().len(),
            item_dimension = config.item_dimension,
            "temporal engine created"
        );
        Ok(Self {
            segmenter: Segmenter::new(&config),
            learned: LearnedChunkSet::from_config(&config),
            pool: WorkerPool::from_config(&config),
            observers: Vec::new(),
            state: EngineState::Idle,
            clock: 0.0,
            classifier,
            config,
        })
    }

    // =========================================================================
    // PUB/SUB
    // =========================================================================

    /// Register an observer for engine events.
    pub fn subscribe(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observers.push(observer);
    }

    fn notify(&self, event: EngineEvent) {
        for observer in &self.observers {
            observer.on_event(event.clone());
        }
    }

    fn transition(&mut self, to: EngineState) {
        if self.state != to {
            debug!(from = ?self.state, to = ?to, "engine state changed");
            let from = self.state;
            self.state = to;
            self.notify(EngineEvent::StateChanged { from, to });
        }
    }

    // =========================================================================
    // SINGLE-SHOT
    // =========================================================================

    /// Segment `pattern`, learn its largest chunk.
    pub fn learn_temporal(&mut self, pattern: &TemporalPattern) -> ChunkingResult<TemporalResult> {
        self.single_shot(pattern, Mode::Learn)
    }

    /// Segment `pattern`, classify its largest chunk without learning.
    pub fn predict_temporal(
        &mut self,
        pattern: &TemporalPattern,
    ) -> ChunkingResult<TemporalResult> {
        self.single_shot(pattern, Mode::Predict)
    }

    fn single_shot(
        &mut self,
        pattern: &TemporalPattern,
        mode: Mode,
    ) -> ChunkingResult<TemporalResult> {
        self.reset_temporal_state();
        let segmentation = self.segmenter.segment(pattern)?;
        self.finish(segmentation, mode, EngineState::Idle)
    }

    /// Learn each pattern; results in input order.
    ///
    /// Large batches are segmented in parallel. The engine's own working
    /// memory and field are left untouched.
    pub fn learn_temporal_batch(
        &mut self,
        patterns: &[TemporalPattern],
    ) -> ChunkingResult<Vec<TemporalResult>> {
        self.batch(patterns, Mode::Learn)
    }

    /// Predict each pattern; results in input order. Nothing is learned.
    pub fn predict_temporal_batch(
        &mut self,
        patterns: &[TemporalPattern],
    ) -> ChunkingResult<Vec<TemporalResult>> {
        self.batch(patterns, Mode::Predict)
    }

    fn batch(
        &mut self,
        patterns: &[TemporalPattern],
        mode: Mode,
    ) -> ChunkingResult<Vec<TemporalResult>> {
        let segmentations = self.pool.segment_all(&self.config, patterns)?;
        let state = self.state;
        segmentations
            .into_iter()
            .map(|segmentation| self.finish(segmentation, mode, state))
            .collect()
    }

    /// Hand the largest chunk to the classifier and assemble the result.
    fn finish(
        &mut self,
        segmentation: Segmentation,
        mode: Mode,
        state: EngineState,
    ) -> ChunkingResult<TemporalResult> {
        self.report(&segmentation.masking, segmentation.pattern.len());

        let Some(chunk) = segmentation.largest_chunk().cloned() else {
            return Ok(TemporalResult::pending(segmentation, state));
        };

        let flat = chunk.flatten(self.config.max_sequence_length);
        let outcome = match mode {
            Mode::Learn => self.classifier.learn(&flat),
            Mode::Predict => self.classifier.predict(&flat),
        };
        let (category, activation) = match outcome {
            ClassifierOutcome::Success {
                category,
                activation,
            } => (Some(category), activation),
            ClassifierOutcome::NoMatch => (None, 0.0),
            ClassifierOutcome::MapFieldMismatch { category } => {
                return Err(ChunkingError::InvalidState(format!(
                    "classifier reported a map-field mismatch on category {}",
                    category
                )))
            }
            ClassifierOutcome::MatchTrackingSearch { vigilance } => {
                return Err(ChunkingError::InvalidState(format!(
                    "classifier left a match-tracking search open at vigilance {}",
                    vigilance
                )))
            }
        };

        let new_template = mode == Mode::Learn && self.update_learned_chunks(&chunk.pattern);
        self.notify(EngineEvent::ChunkReady {
            range: chunk.range(),
            new_template,
        });

        Ok(TemporalResult {
            category,
            activation,
            chunk: Some(chunk),
            new_chunks: usize::from(new_template),
            ..TemporalResult::pending(segmentation, state)
        })
    }

    /// Merge into the learned set. True when a new template was added.
    fn update_learned_chunks(&mut self, pattern: &TemporalPattern) -> bool {
        match self.learned.update(pattern) {
            ChunkUpdate::Added(index) => {
                info!(
                    index,
                    items = pattern.len(),
                    total = self.learned.len(),
                    "learned new chunk"
                );
                true
            }
            ChunkUpdate::Merged(index) => {
                debug!(index, "chunk merged into existing template");
                false
            }
            ChunkUpdate::Ignored => false,
        }
    }

    fn report(&self, masking: &MaskingResult, sequence_length: usize) {
        if !masking.converged && masking.iterations > 0 {
            warn!(
                iterations = masking.iterations,
                residual = masking.residual,
                "segmenting with a non-converged field"
            );
            self.notify(EngineEvent::NonConvergence {
                iterations: masking.iterations,
                residual: masking.residual,
            });
        }
        if masking.has_boundaries() {
            self.notify(EngineEvent::BoundariesDetected {
                boundaries: masking.boundaries.clone(),
                sequence_length,
            });
        }
        let threshold = self.config.gate_depletion_threshold;
        let per_scale: Vec<usize> = masking
            .gates
            .iter()
            .map(|gates| gates.iter().filter(|&&z| z < threshold).count())
            .collect();
        if per_scale.iter().any(|&n| n > 0) {
            self.notify(EngineEvent::GatesDepleted { per_scale });
        }
    }

    // =========================================================================
    // STREAMING
    // =========================================================================

    /// Feed one item and advance the dynamics one step.
    ///
    /// The chunk is only classified once the field has converged with at
    /// least one boundary. An item arriving after that starts a new
    /// sequence.
    pub fn process_sequence_item(&mut self, item: &[f64]) -> ChunkingResult<TemporalResult> {
        if item.len() != self.config.item_dimension {
            return Err(ChunkingError::dimension_mismatch(
                self.config.item_dimension,
                item.len(),
            ));
        }
        if item.iter().any(|v| !v.is_finite()) {
            return Err(ChunkingError::NonFiniteValue {
                index: self.segmenter.working_memory().len(),
            });
        }
        if self.state == EngineState::ChunkReady {
            self.reset_temporal_state();
        }

        let dt = self.config.time_step;
        let segmentation = self.segmenter.push_item(item, self.clock, dt)?;
        self.clock += dt;
        self.transition(EngineState::Accumulating);
        self.after_step(segmentation)
    }

    /// Advance time with no new item. Only meaningful while accumulating.
    pub fn tick(&mut self) -> ChunkingResult<TemporalResult> {
        if self.state != EngineState::Accumulating {
            return Ok(TemporalResult::empty(self.state));
        }
        let dt = self.config.time_step;
        let segmentation = self.segmenter.advance(dt)?;
        self.clock += dt;
        self.after_step(segmentation)
    }

    /// Treat the stream so far as a finished sequence: settle, run the field
    /// to convergence and learn the largest chunk.
    pub fn end_sequence(&mut self) -> ChunkingResult<TemporalResult> {
        if self.state != EngineState::Accumulating {
            return Ok(TemporalResult::empty(self.state));
        }
        let segmentation = self.segmenter.segment_contents()?;
        self.transition(EngineState::ChunkReady);
        self.finish(segmentation, Mode::Learn, EngineState::ChunkReady)
    }

    fn after_step(&mut self, segmentation: Segmentation) -> ChunkingResult<TemporalResult> {
        let masking = &segmentation.masking;
        trace!(
            items = segmentation.pattern.len(),
            iterations = masking.iterations,
            residual = masking.residual,
            "stream step"
        );
        if masking.converged && masking.has_boundaries() {
            self.transition(EngineState::ChunkReady);
            self.finish(segmentation, Mode::Learn, EngineState::ChunkReady)
        } else {
            Ok(TemporalResult::pending(segmentation, self.state))
        }
    }

    // =========================================================================
    // STATE
    // =========================================================================

    /// Clear the stream: working memory, masking field and clock.
    pub fn reset_temporal_state(&mut self) {
        self.segmenter.reset();
        self.clock = 0.0;
        self.transition(EngineState::Idle);
    }

    /// Back to a freshly built engine: stream, learned chunks and classifier.
    pub fn reset(&mut self) {
        self.reset_temporal_state();
        self.learned.clear();
        self.classifier.clear();
    }

    /// Would `learn_temporal(pattern)` add a learned chunk? Segments on
    /// scratch state; the engine is not modified.
    pub fn would_create_new_chunk(&self, pattern: &TemporalPattern) -> ChunkingResult<bool> {
        if pattern.is_empty() {
            return Ok(false);
        }
        let segmentation = Segmenter::new(&self.config).segment(pattern)?;
        Ok(segmentation
            .largest_chunk()
            .is_some_and(|chunk| self.learned.would_add(&chunk.pattern)))
    }

    /// Snapshot of the stream held in working memory.
    pub fn working_memory_contents(&self) -> WorkingMemoryState {
        self.segmenter.working_memory().snapshot()
    }

    /// Current masking-field activations per scale, finest first.
    pub fn masking_field_activations(&self) -> Vec<Vec<f64>> {
        self.segmenter.masking_field().activations()
    }

    /// Learned chunk templates, in the order they were first seen.
    pub fn temporal_chunks(&self) -> Vec<TemporalPattern> {
        self.learned.templates()
    }

    /// The learned chunk set itself.
    pub fn learned_chunks(&self) -> &LearnedChunkSet {
        &self.learned
    }

    /// Current streaming state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// The classifier collaborator.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Mutable access to the classifier, e.g. to seed categories.
    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::FnObserver;
    use std::sync::Mutex;

    fn one_hot(i: usize, dim: usize) -> Vec<f64> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    fn distinct(len: usize) -> TemporalPattern {
        TemporalPattern::new((0..len).map(|i| one_hot(i % 10, 10)).collect()).unwrap()
    }

    fn engine() -> TemporalEngine {
        let config = ChunkingConfig::default();
        let classifier = InstarCategorizer::from_config(&config, 0.9);
        TemporalEngine::new(config, classifier).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ChunkingConfig::default().with_field_sizes(vec![5, 10]);
        let err = TemporalEngine::new(config, InstarCategorizer::new(0.9, 0.1)).err();
        assert!(matches!(
            err,
            Some(ChunkingError::InvalidConfig {
                field: "field_sizes",
                ..
            })
        ));
    }

    #[test]
    fn test_learn_then_predict() {
        let mut engine = engine();
        let pattern = distinct(7);

        let learned = engine.learn_temporal(&pattern).unwrap();
        assert!(learned.chunk_processed());
        assert!(learned.has_new_chunks());
        assert_eq!(learned.category, Some(0));
        assert_eq!(learned.state, EngineState::Idle);
        assert_eq!(engine.temporal_chunks().len(), 1);

        let predicted = engine.predict_temporal(&pattern).unwrap();
        assert_eq!(predicted.category, Some(0));
        assert!(!predicted.has_new_chunks());
        assert_eq!(engine.classifier().category_count(), 1);

        // Learning the same sequence again merges, it does not grow.
        let again = engine.learn_temporal(&pattern).unwrap();
        assert!(!again.has_new_chunks());
        assert_eq!(engine.learned_chunks().get(0).unwrap().occurrences, 2);
    }

    #[test]
    fn test_would_create_new_chunk_is_read_only() {
        let mut engine = engine();
        let pattern = distinct(7);

        assert!(engine.would_create_new_chunk(&pattern).unwrap());
        assert!(engine.learned_chunks().is_empty());
        assert!(engine.working_memory_contents().pattern.is_empty());

        engine.learn_temporal(&pattern).unwrap();
        assert!(!engine.would_create_new_chunk(&pattern).unwrap());
        assert!(!engine.would_create_new_chunk(&TemporalPattern::empty(10)).unwrap());
    }

    #[test]
    fn test_streaming_state_machine() {
        let mut engine = engine();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        engine.subscribe(Arc::new(FnObserver(move |event| {
            if let EngineEvent::StateChanged { to, .. } = event {
                sink.lock().unwrap().push(to);
            }
        })));

        let first = engine.process_sequence_item(&one_hot(0, 10)).unwrap();
        assert_eq!(first.state, EngineState::Accumulating);
        assert!(!first.chunk_processed());

        for i in 1..7 {
            engine.process_sequence_item(&one_hot(i, 10)).unwrap();
        }
        let max_ticks = engine.config().max_iterations;
        let mut ready = None;
        for _ in 0..max_ticks {
            let result = engine.tick().unwrap();
            if result.state == EngineState::ChunkReady {
                ready = Some(result);
                break;
            }
        }
        let ready = ready.expect("stream never produced a chunk");
        assert!(ready.converged);
        assert!(ready.chunk_processed());
        assert!(!ready.boundaries.is_empty());

        // Ticking in ChunkReady does nothing; a new item starts over.
        assert!(!engine.tick().unwrap().chunk_processed());
        let restarted = engine.process_sequence_item(&one_hot(3, 10)).unwrap();
        assert_eq!(restarted.state, EngineState::Accumulating);
        assert_eq!(engine.working_memory_contents().pattern.len(), 1);

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                EngineState::Accumulating,
                EngineState::ChunkReady,
                EngineState::Idle,
                EngineState::Accumulating,
            ]
        );
    }

    #[test]
    fn test_end_sequence_processes_contents() {
        let mut engine = engine();
        assert!(!engine.end_sequence().unwrap().chunk_processed());

        for i in 0..5 {
            engine.process_sequence_item(&one_hot(i, 10)).unwrap();
        }
        let result = engine.end_sequence().unwrap();
        assert_eq!(result.state, EngineState::ChunkReady);
        assert!(result.chunk_processed());
        assert!(result.converged);
    }

    #[test]
    fn test_streaming_rejects_bad_item_without_side_effects() {
        let mut engine = engine();
        engine.process_sequence_item(&one_hot(0, 10)).unwrap();

        assert!(matches!(
            engine.process_sequence_item(&[1.0; 3]),
            Err(ChunkingError::DimensionMismatch {
                expected: 10,
                actual: 3
            })
        ));
        let mut bad = one_hot(1, 10);
        bad[4] = f64::INFINITY;
        assert!(matches!(
            engine.process_sequence_item(&bad),
            Err(ChunkingError::NonFiniteValue { index: 1 })
        ));
        assert_eq!(engine.working_memory_contents().pattern.len(), 1);
        assert_eq!(engine.state(), EngineState::Accumulating);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut engine = engine();
        engine.learn_temporal(&distinct(7)).unwrap();
        engine.process_sequence_item(&one_hot(0, 10)).unwrap();

        engine.reset();
        assert_eq!(engine.state(), EngineState::Idle);
        assert!(engine.temporal_chunks().is_empty());
        assert_eq!(engine.classifier().category_count(), 0);
        assert!(engine.working_memory_contents().pattern.is_empty());
        assert!(engine
            .masking_field_activations()
            .iter()
            .all(|scale| scale.iter().all(|&x| x == 0.0)));
    }
}
