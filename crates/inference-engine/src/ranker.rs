//! Top-K label ranking

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::labels::LabelTable;
use crate::InferenceError;

/// Number of results reported per frame
pub const DEFAULT_TOP_K: usize = 4;

/// A label with its score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedLabel {
    pub label: String,
    pub score: f32,
}

/// Heap entry. Ordered so that the *weakest* candidate compares greatest,
/// which puts it at the top of `BinaryHeap` for eviction.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    score: f32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lower score is weaker; on ties the later index is weaker
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Fixed-capacity min-heap keeping the K best scores seen so far
#[derive(Debug, Clone)]
pub struct TopK {
    capacity: usize,
    heap: BinaryHeap<Candidate>,
}

impl TopK {
    /// Create a ranker holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Offer one score; evicts the weakest entry once over capacity
    pub fn push(&mut self, index: usize, score: f32) {
        if self.capacity == 0 {
            return;
        }
        self.heap.push(Candidate { index, score });
        if self.heap.len() > self.capacity {
            self.heap.pop();
        }
    }

    /// Offer every score in order
    pub fn extend(&mut self, scores: &[f32]) {
        for (index, &score) in scores.iter().enumerate() {
            self.push(index, score);
        }
    }

    /// Drain into `(index, score)` pairs, best first
    pub fn drain_sorted(&mut self) -> Vec<(usize, f32)> {
        // Ascending by "weakness" is descending by score
        std::mem::take(&mut self.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.index, c.score))
            .collect()
    }
}

/// Rank `scores` against `labels`, returning at most `k` entries, best first
pub fn rank(labels: &LabelTable, scores: &[f32], k: usize) -> Result<Vec<RankedLabel>, InferenceError> {
    labels.ensure_width(scores.len())?;

    let mut top = TopK::new(k.min(scores.len()));
    top.extend(scores);

    Ok(top
        .drain_sorted()
        .into_iter()
        .map(|(index, score)| RankedLabel {
            label: labels[index].to_string(),
            score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pets() -> LabelTable {
        ["cat", "dog", "bird", "fish"].into_iter().collect()
    }

    #[test]
    fn test_ranks_pets() {
        let ranked = rank(&pets(), &[0.1, 0.7, 0.05, 0.15], DEFAULT_TOP_K).unwrap();
        let pairs: Vec<_> = ranked.iter().map(|r| (r.label.as_str(), r.score)).collect();
        assert_eq!(
            pairs,
            vec![("dog", 0.7), ("fish", 0.15), ("cat", 0.1), ("bird", 0.05)]
        );
    }

    #[test]
    fn test_keeps_only_k() {
        let mut top = TopK::new(2);
        top.extend(&[0.3, 0.9, 0.1, 0.5, 0.2]);
        assert_eq!(top.len(), 2);
        assert_eq!(top.drain_sorted(), vec![(1, 0.9), (3, 0.5)]);
        assert!(top.is_empty());
    }

    #[test]
    fn test_fewer_than_k() {
        let labels: LabelTable = ["a", "b"].into_iter().collect();
        let ranked = rank(&labels, &[0.2, 0.8], 4).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].label, "b");
    }

    #[test]
    fn test_ties_keep_earlier_label() {
        let mut top = TopK::new(2);
        top.extend(&[0.5, 0.5, 0.5]);
        assert_eq!(top.drain_sorted(), vec![(0, 0.5), (1, 0.5)]);
    }

    #[test]
    fn test_zero_capacity() {
        let mut top = TopK::new(0);
        top.extend(&[1.0, 2.0]);
        assert!(top.drain_sorted().is_empty());
    }

    #[test]
    fn test_unbounded_k() {
        let mut top = TopK::new(usize::MAX);
        top.extend(&[0.2, 0.4]);
        assert_eq!(top.drain_sorted(), vec![(1, 0.4), (0, 0.2)]);

        let ranked = rank(&pets(), &[0.1, 0.7, 0.05, 0.15], usize::MAX).unwrap();
        assert_eq!(ranked.len(), 4);
        assert_eq!(ranked[0].label, "dog");
    }

    #[test]
    fn test_length_mismatch() {
        let err = rank(&pets(), &[0.1, 0.2], 4).unwrap_err();
        assert!(matches!(err, InferenceError::LabelMismatch { labels: 4, outputs: 2 }));
    }

    proptest! {
        #[test]
        fn matches_full_sort(scores in prop::collection::vec(-1000.0f32..1000.0, 0..64), k in 0usize..8) {
            let mut expected: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
            // Stable: equal scores keep ascending index order
            expected.sort_by(|a, b| b.1.total_cmp(&a.1));
            expected.truncate(k);

            let mut top = TopK::new(k);
            top.extend(&scores);
            let got = top.drain_sorted();

            prop_assert_eq!(got.len(), k.min(scores.len()));
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn duplicates_keep_true_top(value in -10.0f32..10.0, n in 1usize..20) {
            let mut scores = vec![value; n];
            scores.push(value + 1.0);
            let mut top = TopK::new(DEFAULT_TOP_K);
            top.extend(&scores);
            let got = top.drain_sorted();
            prop_assert_eq!(got[0], (n, value + 1.0));
            prop_assert_eq!(got.len(), DEFAULT_TOP_K.min(n + 1));
        }
    }
}
