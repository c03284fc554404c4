//! Bounded top-k queue with an exposed score threshold.
//!
//! The queue keeps the k best-scored documents seen so far in a
//! min-heap and publishes the k-th best score through [`TopkQueue::threshold`].
//! Cursor-walking algorithms read that threshold to skip documents that
//! cannot enter the result set.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::base::{DocId, Score};

/// One scored result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub score: Score,
    pub docid: DocId,
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the heap's peek is the lowest score.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.score.total_cmp(&self.score)
    }
}

/// Min-heap of at most `k` entries plus the running threshold.
pub struct TopkQueue {
    threshold: Score,
    k: usize,
    heap: BinaryHeap<Entry>,
    results: Vec<Entry>,
}

impl TopkQueue {
    pub fn new(k: usize) -> Self {
        Self {
            threshold: 0.0,
            k,
            heap: BinaryHeap::with_capacity(k + 1),
            results: Vec::new(),
        }
    }

    /// Whether a document scoring `score` would currently make the cut.
    #[inline(always)]
    pub fn would_enter(&self, score: Score) -> bool {
        score > self.threshold
    }

    /// Offers a scored document; returns whether it was accepted.
    pub fn insert(&mut self, score: Score, docid: DocId) -> bool {
        if !self.would_enter(score) {
            return false;
        }
        self.heap.push(Entry { score, docid });
        if self.heap.len() <= self.k {
            if self.heap.len() == self.k {
                if let Some(min) = self.heap.peek() {
                    self.threshold = min.score;
                }
            }
        } else {
            self.heap.pop();
            if let Some(min) = self.heap.peek() {
                self.threshold = min.score;
            }
        }
        true
    }

    /// Sorts the retained entries by descending score and drops any
    /// non-positive tail. Must be called before [`TopkQueue::topk`].
    pub fn finalize(&mut self) {
        self.threshold = if self.heap.len() == self.k {
            self.heap.peek().map_or(0.0, |min| min.score)
        } else {
            0.0
        };
        let mut sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        if let Some(cut) = sorted.iter().position(|entry| entry.score <= 0.0) {
            sorted.truncate(cut);
        }
        self.results = sorted;
    }

    /// The finalized results, best first.
    pub fn topk(&self) -> &[Entry] {
        &self.results
    }

    /// Seeds the threshold from an external lower bound.
    ///
    /// A small slack is subtracted so that ties produced by a different
    /// scoring path are not lost to rounding.
    pub fn set_threshold(&mut self, t: Score) {
        self.threshold = (t - 0.0001).max(0.0);
    }

    /// Current k-th best score; the skip oracle for early termination.
    #[inline]
    pub fn threshold(&self) -> Score {
        self.threshold
    }

    pub fn capacity(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.results.clear();
        self.threshold = 0.0;
    }
}
