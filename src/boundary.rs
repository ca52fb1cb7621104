//! Chunk boundary extraction from a settled field.
//!
//! A boundary is an interior local minimum that sits under the boundary
//! threshold. Field positions are mapped back to the item onsets they cover
//! and merged across scales, finest scale first.

use std::collections::BTreeMap;
use std::ops::Range;

/// Finds local minima under threshold in one scale's activations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundaryDetector {
    threshold: f64,
    contrast: f64,
}

impl BoundaryDetector {
    /// `contrast` is the depth a minimum must have below both neighbours.
    pub fn new(threshold: f64, contrast: f64) -> Self {
        Self {
            threshold,
            contrast,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Interior field positions that are boundaries. Strictly increasing.
    pub fn local_minima(&self, activation: &[f64]) -> Vec<usize> {
        if activation.len() < 3 {
            return Vec::new();
        }
        (1..activation.len() - 1)
            .filter(|&i| {
                let x = activation[i];
                x < self.threshold
                    && x + self.contrast < activation[i - 1]
                    && x + self.contrast < activation[i + 1]
            })
            .collect()
    }
}

/// First sequence index represented by `field_pos`: `ceil(f·L/F)`.
pub fn field_to_sequence(field_pos: usize, field_size: usize, sequence_length: usize) -> usize {
    (field_pos * sequence_length).div_ceil(field_size)
}

/// Field cell that sequence position `i` projects onto: `floor(i·F/L)`.
pub fn sequence_to_field(i: usize, field_size: usize, sequence_length: usize) -> usize {
    i * field_size / sequence_length
}

/// Sequence items that project onto `field_pos`. Empty for the gap cells
/// of a field larger than the sequence.
pub fn cell_items(field_pos: usize, field_size: usize, sequence_length: usize) -> Range<usize> {
    let start = field_to_sequence(field_pos, field_size, sequence_length).min(sequence_length);
    let end = field_to_sequence(field_pos + 1, field_size, sequence_length).min(sequence_length);
    start..end.max(start)
}

/// Item in `items` with the strongest onset, earliest on ties. Item 0 and
/// items with no onset never qualify.
fn strongest_onset(onsets: &[f64], items: Range<usize>) -> Option<usize> {
    items
        .filter(|&i| i > 0 && onsets[i] > 0.0)
        .fold(None, |best, i| match best {
            Some(b) if onsets[b] >= onsets[i] => Some(b),
            _ => Some(i),
        })
}

/// Sorted, de-duplicated boundaries in `[1, L-1]`, plus the scale that
/// first produced each one.
///
/// `per_scale[s]` holds field positions of scale `s`; `onsets[i]` is how
/// sharply item `i` breaks from its predecessor. Each field minimum snaps
/// to the strongest onset among the items its cell covers; a minimum over
/// a cell with no onset marks no boundary. Scales are visited in order, so
/// a boundary found by several scales is credited to the finest.
pub fn merge_boundaries(
    per_scale: &[Vec<usize>],
    field_sizes: &[usize],
    onsets: &[f64],
) -> (Vec<usize>, Vec<usize>) {
    let sequence_length = onsets.len();
    let mut merged: BTreeMap<usize, usize> = BTreeMap::new();
    for (scale, positions) in per_scale.iter().enumerate() {
        let size = field_sizes[scale];
        for &pos in positions {
            let items = cell_items(pos, size, sequence_length);
            if let Some(idx) = strongest_onset(onsets, items) {
                merged.entry(idx).or_insert(scale);
            }
        }
    }
    merged.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_minimum_under_threshold() {
        let detector = BoundaryDetector::new(0.3, 1e-3);
        let field = [0.5, 0.1, 0.5, 0.4, 0.45, 0.2, 0.25];
        // 0.4 is a minimum but above threshold; edges never count.
        assert_eq!(detector.local_minima(&field), vec![1, 5]);
    }

    #[test]
    fn test_plateaus_and_dust_are_not_minima() {
        let detector = BoundaryDetector::new(0.1, 1e-3);
        let field = [0.3, 0.0, 0.0, 1e-19, 0.0, 0.2];
        assert!(detector.local_minima(&field).is_empty());
        assert!(detector.local_minima(&[0.5, 0.0]).is_empty());
    }

    #[test]
    fn test_field_sequence_mapping() {
        // 7 items on 20 cells occupy 0, 2, 5, 8, 11, 14, 17.
        let cells: Vec<usize> = (0..7).map(|i| sequence_to_field(i, 20, 7)).collect();
        assert_eq!(cells, vec![0, 2, 5, 8, 11, 14, 17]);
        assert_eq!(field_to_sequence(3, 20, 7), 2);
        assert_eq!(cell_items(0, 20, 7), 0..1);
        assert_eq!(cell_items(2, 20, 7), 1..2);
        // Gap cell between items 0 and 1.
        assert!(cell_items(1, 20, 7).is_empty());
        // Coarser than the sequence: several items per cell.
        assert_eq!(cell_items(2, 5, 20), 8..12);
        assert_eq!(cell_items(19, 20, 3), 3..3);
    }

    #[test]
    fn test_merge_prefers_finer_scale() {
        let onsets = [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let per_scale = vec![vec![4], vec![1, 4], vec![1]];
        let (boundaries, scales) = merge_boundaries(&per_scale, &[20, 10, 5], &onsets);
        // scale 0 cell 4 -> item 2, scale 1 cells 1, 4 -> items 1, 4,
        // scale 2 cell 1 covers items 2 and 3 -> earliest, already taken
        assert_eq!(boundaries, vec![1, 2, 4]);
        assert_eq!(scales, vec![1, 0, 1]);
    }

    #[test]
    fn test_minimum_snaps_to_strongest_onset() {
        let onsets = [0.0, 0.0, 0.0, 0.2, 0.9, 0.9, 0.0, 0.0, 0.0];
        // Cell 1 of 3 covers items 3..6.
        let (boundaries, _) = merge_boundaries(&[vec![1]], &[3], &onsets);
        assert_eq!(boundaries, vec![4]);

        // Inside a run: no onset under the cell, no boundary.
        let onsets = [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0];
        let (boundaries, _) = merge_boundaries(&[vec![1]], &[3], &onsets);
        assert!(boundaries.is_empty());
    }

    #[test]
    fn test_merge_drops_out_of_range() {
        let onsets = [0.0, 1.0, 1.0];
        // Cell 0 covers only item 0, cell 19 covers nothing.
        let (boundaries, _) = merge_boundaries(&[vec![0, 19]], &[20], &onsets);
        assert!(boundaries.is_empty());
        // Gap cell 3 of 20 over 10 items.
        let (boundaries, _) = merge_boundaries(&[vec![3]], &[20], &[1.0; 10]);
        assert!(boundaries.is_empty());
        let (boundaries, _) = merge_boundaries(&[vec![5]], &[20], &[0.0]);
        assert!(boundaries.is_empty());
    }
}
