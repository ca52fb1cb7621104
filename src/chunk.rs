//! Chunks and the learned chunk set
//!
//! Boundaries cut a sequence into contiguous, non-overlapping chunks that
//! together cover every item. Accepted chunks become templates in a
//! [`LearnedChunkSet`]; a chunk close to an existing template refines that
//! template instead of adding a new one.

use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::{ChunkingConfig, InstarRule};
use crate::instar::InstarLearning;
use crate::pattern::TemporalPattern;

/// Contiguous run of items `[start, end)` from a sequence.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Chunk {
    pub start: usize,
    pub end: usize,
    pub pattern: TemporalPattern,
}

impl Chunk {
    /// Number of items in the chunk.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Item range within the source sequence.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Zero-padded concatenation of the items, as the classifier sees it.
    pub fn flatten(&self, max_items: usize) -> Vec<f64> {
        self.pattern.flatten(max_items)
    }
}

/// Cut `pattern` at `boundaries`.
///
/// Boundaries that are out of order or outside `[1, len-1]` are skipped, so
/// the chunks always tile the sequence exactly. An empty pattern has no
/// chunks; no boundaries gives one chunk spanning everything.
pub fn extract_chunks(pattern: &TemporalPattern, boundaries: &[usize]) -> Vec<Chunk> {
    let len = pattern.len();
    if len == 0 {
        return Vec::new();
    }

    let mut chunks = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    for &b in boundaries {
        if b > start && b < len {
            chunks.push(Chunk {
                start,
                end: b,
                pattern: pattern.slice(start..b),
            });
            start = b;
        }
    }
    chunks.push(Chunk {
        start,
        end: len,
        pattern: pattern.slice(start..len),
    });
    chunks
}

/// Longest chunk; the earliest wins a tie.
pub fn largest_chunk(chunks: &[Chunk]) -> Option<&Chunk> {
    chunks
        .iter()
        .fold(None, |best: Option<&Chunk>, c| match best {
            Some(b) if b.len() >= c.len() => Some(b),
            _ => Some(c),
        })
}

/// One accepted chunk template.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LearnedChunk {
    pub template: TemporalPattern,
    /// Times this template has been seen, including the first.
    pub occurrences: usize,
}

/// What [`LearnedChunkSet::update`] did with a chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ChunkUpdate {
    /// Stored as a new template at this index.
    Added(usize),
    /// Merged into the existing template at this index.
    Merged(usize),
    /// Empty chunks are never stored.
    Ignored,
}

impl ChunkUpdate {
    /// A new template was stored.
    pub fn is_new(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Growable set of chunk templates, deduplicated by element-wise tolerance.
#[derive(Clone, Debug)]
pub struct LearnedChunkSet {
    chunks: Vec<LearnedChunk>,
    tolerance: f64,
    instar: InstarLearning,
}

impl LearnedChunkSet {
    /// Empty set; matched chunks are merged with `instar`.
    pub fn new(tolerance: f64, instar: InstarLearning) -> Self {
        Self {
            chunks: Vec::new(),
            tolerance,
            instar,
        }
    }

    /// Tolerance, instar rule and learning rate from the config.
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_tolerance, InstarLearning::from_config(config))
    }

    /// Rule used when a chunk merges into a template.
    pub fn instar_rule(&self) -> InstarRule {
        self.instar.rule()
    }

    /// First template within tolerance of `pattern` at every position.
    pub fn find_match(&self, pattern: &TemporalPattern) -> Option<usize> {
        self.chunks
            .iter()
            .position(|c| c.template.approx_eq(pattern, self.tolerance))
    }

    /// True when `update` would add a new template.
    pub fn would_add(&self, pattern: &TemporalPattern) -> bool {
        !pattern.is_empty() && self.find_match(pattern).is_none()
    }

    /// Merge `pattern` into its matching template, or append it.
    pub fn update(&mut self, pattern: &TemporalPattern) -> ChunkUpdate {
        if pattern.is_empty() {
            return ChunkUpdate::Ignored;
        }
        match self.find_match(pattern) {
            Some(index) => {
                let instar = self.instar;
                let chunk = &mut self.chunks[index];
                let merged: Vec<Vec<f64>> = chunk
                    .template
                    .items()
                    .zip(pattern.items())
                    .map(|(row, item)| instar.adapt(row, item, 1.0))
                    .collect();
                chunk.template =
                    TemporalPattern::from_validated(merged, None, pattern.dimension());
                chunk.occurrences += 1;
                ChunkUpdate::Merged(index)
            }
            None => {
                self.chunks.push(LearnedChunk {
                    template: TemporalPattern::from_validated(
                        pattern.to_items(),
                        None,
                        pattern.dimension(),
                    ),
                    occurrences: 1,
                });
                ChunkUpdate::Added(self.chunks.len() - 1)
            }
        }
    }

    /// Template at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&LearnedChunk> {
        self.chunks.get(index)
    }

    /// Learned chunks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LearnedChunk> + '_ {
        self.chunks.iter()
    }

    /// Templates as patterns, in insertion order.
    pub fn templates(&self) -> Vec<TemporalPattern> {
        self.chunks.iter().map(|c| c.template.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Forget every template.
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hard(rate: f64) -> InstarLearning {
        InstarLearning::new(InstarRule::HardCompetition, rate)
    }

    fn sequence(values: &[f64]) -> TemporalPattern {
        TemporalPattern::new(values.iter().map(|&v| vec![v, 1.0 - v]).collect()).unwrap()
    }

    #[test]
    fn test_chunks_cover_sequence() {
        let pattern = sequence(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        for boundaries in [vec![], vec![3], vec![1, 2, 6], vec![1, 2, 3, 4, 5, 6]] {
            let chunks = extract_chunks(&pattern, &boundaries);
            assert_eq!(chunks.len(), boundaries.len() + 1);
            assert_eq!(chunks[0].start, 0);
            assert_eq!(chunks.last().unwrap().end, 7);
            for pair in chunks.windows(2) {
                assert_eq!(pair[0].end, pair[1].start);
            }
            let rebuilt: Vec<Vec<f64>> = chunks.iter().flat_map(|c| c.pattern.to_items()).collect();
            assert_eq!(rebuilt, pattern.to_items());
        }
    }

    #[test]
    fn test_invalid_boundaries_skipped() {
        let pattern = sequence(&[0.0, 0.1, 0.2, 0.3]);
        let chunks = extract_chunks(&pattern, &[0, 2, 2, 1, 4, 9]);
        let ranges: Vec<_> = chunks.iter().map(Chunk::range).collect();
        assert_eq!(ranges, vec![0..2, 2..4]);
        assert!(extract_chunks(&TemporalPattern::empty(2), &[1]).is_empty());
    }

    #[test]
    fn test_largest_chunk_prefers_earliest() {
        let pattern = sequence(&[0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let chunks = extract_chunks(&pattern, &[2, 3, 5]);
        // Lengths 2, 1, 2, 2.
        let largest = largest_chunk(&chunks).unwrap();
        assert_eq!(largest.range(), 0..2);
        assert!(largest_chunk(&[]).is_none());
    }

    #[test]
    fn test_near_duplicates_merge() {
        let mut set = LearnedChunkSet::new(0.1, hard(0.5));
        assert_eq!(set.update(&sequence(&[0.2, 0.4])), ChunkUpdate::Added(0));
        assert_eq!(set.update(&sequence(&[0.25, 0.35])), ChunkUpdate::Merged(0));
        assert_eq!(set.len(), 1);

        let learned = set.get(0).unwrap();
        assert_eq!(learned.occurrences, 2);
        assert!((learned.template.item(0)[0] - 0.225).abs() < 1e-12);
        assert!((learned.template.item(1)[0] - 0.375).abs() < 1e-12);
    }

    #[test]
    fn test_distinct_or_longer_chunks_append() {
        let mut set = LearnedChunkSet::new(0.1, hard(0.5));
        set.update(&sequence(&[0.2, 0.4]));
        assert!(set.would_add(&sequence(&[0.8, 0.4])));
        assert!(set.would_add(&sequence(&[0.2, 0.4, 0.6])));
        assert!(!set.would_add(&sequence(&[0.2, 0.45])));
        assert!(!set.would_add(&TemporalPattern::empty(2)));

        assert_eq!(set.update(&sequence(&[0.2, 0.4, 0.6])), ChunkUpdate::Added(1));
        assert_eq!(set.update(&TemporalPattern::empty(2)), ChunkUpdate::Ignored);
        assert_eq!(set.len(), 2);

        set.clear();
        assert!(set.is_empty());
    }

    #[test]
    fn test_merge_follows_configured_rule() {
        let config = ChunkingConfig {
            instar_rule: InstarRule::SelfNormalizing,
            learning_rate: 0.5,
            ..ChunkingConfig::default()
        };
        let mut normalizing = LearnedChunkSet::from_config(&config);
        let mut competitive = LearnedChunkSet::from_config(&ChunkingConfig {
            instar_rule: InstarRule::HardCompetition,
            ..config.clone()
        });
        assert_eq!(normalizing.instar_rule(), InstarRule::SelfNormalizing);

        for set in [&mut normalizing, &mut competitive] {
            set.update(&sequence(&[0.2]));
            assert_eq!(set.update(&sequence(&[0.25])), ChunkUpdate::Merged(0));
        }

        // Item [0.2, 0.8] merged with [0.25, 0.75] at rate 0.5.
        let competitive = competitive.get(0).unwrap().template.item(0).to_vec();
        assert!((competitive[0] - 0.225).abs() < 1e-12);
        assert!((competitive[1] - 0.775).abs() < 1e-12);
        let normalizing = normalizing.get(0).unwrap().template.item(0).to_vec();
        assert!((normalizing[0] - 0.2).abs() < 1e-12);
        assert!((normalizing[1] - 0.475).abs() < 1e-12);
    }
}
