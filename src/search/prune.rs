//! Disjunctive retrieval with upper-bound pruning.
//!
//! Cursors start out active; whenever the queue's threshold grows past
//! the sum an entire suffix of cursors could still contribute, those
//! cursors turn passive and are only probed at candidates surfaced by
//! the remaining active ones. Results match plain `ranked_or` as long
//! as every cursor's `max_score` really bounds its contributions.

use super::ScoredCursor;
use crate::base::DocId;
use crate::topk::TopkQueue;

pub fn ranked_or_prune(cursors: Vec<ScoredCursor>, sentinel: DocId, topk: &mut TopkQueue) {
    let mut active = cursors;
    active.retain(|cursor| cursor.docid() != sentinel);
    // Longest lists are the first to turn passive.
    active.sort_by_key(|cursor| cursor.size());

    let mut passive: Vec<ScoredCursor> = Vec::new();
    let mut passive_bound = 0.0;

    while !active.is_empty() {
        let candidate = active
            .iter()
            .fold(sentinel, |min, cursor| min.min(cursor.docid()));
        if candidate == sentinel {
            return;
        }

        let mut score = 0.0;
        passive.retain_mut(|cursor| {
            cursor.next_geq(candidate);
            if cursor.docid() == candidate {
                score += cursor.score();
            }
            cursor.docid() != sentinel
        });
        active.retain_mut(|cursor| {
            if cursor.docid() == candidate {
                score += cursor.score();
                cursor.next();
            }
            cursor.docid() != sentinel
        });

        topk.insert(score, candidate);

        let demote = active
            .last()
            .is_some_and(|last| last.max_score() + passive_bound < topk.threshold());
        if demote {
            if let Some(demoted) = active.pop() {
                passive_bound += demoted.max_score();
                passive.push(demoted);
            }
        }
    }
}
