//! Document-at-a-time evaluation: ranked OR and ranked AND.

use super::ScoredCursor;
use crate::base::DocId;
use crate::topk::TopkQueue;

/// Disjunctive retrieval: every document holding at least one query
/// term is scored with the sum of its term contributions.
///
/// `sentinel` is the index's `num_docs`; exhausted cursors report it.
pub fn ranked_or(cursors: &mut [ScoredCursor], sentinel: DocId, topk: &mut TopkQueue) {
    loop {
        let candidate = cursors
            .iter()
            .fold(sentinel, |min, cursor| min.min(cursor.docid()));
        if candidate == sentinel {
            return;
        }
        let mut score = 0.0;
        for cursor in cursors.iter_mut() {
            if cursor.docid() == candidate {
                score += cursor.score();
                cursor.next();
            }
        }
        topk.insert(score, candidate);
    }
}

/// Conjunctive retrieval: only documents holding every query term are
/// scored.
///
/// The shortest list leads; every other cursor is probed with
/// `next_geq`, and a mismatch advances the leader past the probe's
/// landing point.
pub fn ranked_and(cursors: &mut Vec<ScoredCursor>, sentinel: DocId, topk: &mut TopkQueue) {
    if cursors.is_empty() {
        return;
    }
    cursors.sort_by_key(|cursor| cursor.size());

    'candidates: loop {
        let candidate = cursors[0].docid();
        if candidate == sentinel {
            return;
        }
        for i in 1..cursors.len() {
            cursors[i].next_geq(candidate);
            if cursors[i].docid() != candidate {
                let landing = cursors[i].docid();
                cursors[0].next_geq(landing);
                continue 'candidates;
            }
        }
        let mut score = 0.0;
        for cursor in cursors.iter_mut() {
            score += cursor.score();
        }
        topk.insert(score, candidate);
        cursors[0].next();
    }
}
