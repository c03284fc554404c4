//! Ranked retrieval over index cursors.
//!
//! A [`Scorer`] turns `(docid, freq)` into a per-term contribution; a
//! [`ScoredCursor`] pairs one posting-list cursor with that function.
//! The algorithms in [`daat`] and [`prune`] drive scored cursors into a
//! [`TopkQueue`](crate::topk::TopkQueue).

pub mod daat;
pub mod prune;

use log::debug;

use crate::base::{DocId, Score, TermId};
use crate::index::BlockFreqIndex;
use crate::postings::DocumentEnumerator;
use crate::query::QueryRequest;
use crate::topk::{Entry, TopkQueue};
use crate::Result;

pub use daat::{ranked_and, ranked_or};
pub use prune::ranked_or_prune;

/// Per-term scoring function; must be pure and thread-safe.
pub type TermScoreFn<'a> = Box<dyn Fn(DocId, u32) -> Score + Send + Sync + 'a>;

/// Produces the scoring function for one query term.
pub trait Scorer: Send + Sync {
    fn term_scorer(&self, term_id: TermId, term_weight: Score) -> TermScoreFn<'_>;
}

/// Precomputed per-term score upper bounds, built elsewhere.
pub trait WandData: Send + Sync {
    fn max_term_weight(&self, term_id: TermId) -> Score;
}

/// Scores each posting as the term frequency times the query weight.
/// The identity scorer of impact-ordered indexes.
pub struct FreqScorer;

impl Scorer for FreqScorer {
    fn term_scorer(&self, _term_id: TermId, term_weight: Score) -> TermScoreFn<'_> {
        Box::new(move |_docid, freq| freq as Score * term_weight)
    }
}

/// One posting-list cursor wrapped with its term's scoring function.
pub struct ScoredCursor<'a> {
    cursor: DocumentEnumerator<'a>,
    score_fn: TermScoreFn<'a>,
    max_score: Score,
}

impl<'a> ScoredCursor<'a> {
    pub fn new(cursor: DocumentEnumerator<'a>, score_fn: TermScoreFn<'a>, max_score: Score) -> Self {
        Self {
            cursor,
            score_fn,
            max_score,
        }
    }

    #[inline]
    pub fn docid(&self) -> DocId {
        self.cursor.docid()
    }

    /// Contribution of this term at the current docid.
    pub fn score(&mut self) -> Score {
        let docid = self.cursor.docid();
        let freq = self.cursor.freq();
        (self.score_fn)(docid, freq)
    }

    pub fn next(&mut self) {
        self.cursor.next();
    }

    pub fn next_geq(&mut self, target: DocId) {
        self.cursor.next_geq(target);
    }

    pub fn size(&self) -> u64 {
        self.cursor.size()
    }

    /// Upper bound on any score this cursor can produce.
    pub fn max_score(&self) -> Score {
        self.max_score
    }
}

/// Opens one scored cursor per request term. Terms outside the index
/// are dropped.
pub fn make_scored_cursors<'a>(
    index: &'a BlockFreqIndex,
    scorer: &'a dyn Scorer,
    request: &QueryRequest,
) -> Result<Vec<ScoredCursor<'a>>> {
    let mut cursors = Vec::with_capacity(request.term_ids().len());
    for (&term_id, &weight) in request.term_ids().iter().zip(request.term_weights()) {
        if term_id as usize >= index.size() {
            debug!("discarding term {term_id} outside the index");
            continue;
        }
        let cursor = index.list(term_id as usize)?;
        cursors.push(ScoredCursor::new(
            cursor,
            scorer.term_scorer(term_id, weight),
            Score::INFINITY,
        ));
    }
    Ok(cursors)
}

/// Like [`make_scored_cursors`], with per-cursor upper bounds taken
/// from the wand data.
pub fn make_max_scored_cursors<'a>(
    index: &'a BlockFreqIndex,
    scorer: &'a dyn Scorer,
    wand_data: &dyn WandData,
    request: &QueryRequest,
) -> Result<Vec<ScoredCursor<'a>>> {
    let mut cursors = Vec::with_capacity(request.term_ids().len());
    for (&term_id, &weight) in request.term_ids().iter().zip(request.term_weights()) {
        if term_id as usize >= index.size() {
            debug!("discarding term {term_id} outside the index");
            continue;
        }
        let cursor = index.list(term_id as usize)?;
        cursors.push(ScoredCursor::new(
            cursor,
            scorer.term_scorer(term_id, weight),
            wand_data.max_term_weight(term_id) * weight,
        ));
    }
    Ok(cursors)
}

fn seeded_queue(request: &QueryRequest) -> TopkQueue {
    let mut topk = TopkQueue::new(request.k());
    if let Some(threshold) = request.threshold() {
        topk.set_threshold(threshold);
    }
    topk
}

/// Runs disjunctive retrieval for `request` and returns the sorted
/// top-k results.
pub fn evaluate_ranked_or(
    index: &BlockFreqIndex,
    scorer: &dyn Scorer,
    request: &QueryRequest,
) -> Result<Vec<Entry>> {
    let mut cursors = make_scored_cursors(index, scorer, request)?;
    let mut topk = seeded_queue(request);
    ranked_or(&mut cursors, index.num_docs() as DocId, &mut topk);
    topk.finalize();
    Ok(topk.topk().to_vec())
}

/// Runs conjunctive retrieval for `request`.
pub fn evaluate_ranked_and(
    index: &BlockFreqIndex,
    scorer: &dyn Scorer,
    request: &QueryRequest,
) -> Result<Vec<Entry>> {
    let mut cursors = make_scored_cursors(index, scorer, request)?;
    let mut topk = seeded_queue(request);
    ranked_and(&mut cursors, index.num_docs() as DocId, &mut topk);
    topk.finalize();
    Ok(topk.topk().to_vec())
}

/// Runs disjunctive retrieval with upper-bound pruning. Produces the
/// same results as [`evaluate_ranked_or`].
pub fn evaluate_ranked_or_prune(
    index: &BlockFreqIndex,
    scorer: &dyn Scorer,
    wand_data: &dyn WandData,
    request: &QueryRequest,
) -> Result<Vec<Entry>> {
    let cursors = make_max_scored_cursors(index, scorer, wand_data, request)?;
    let mut topk = seeded_queue(request);
    ranked_or_prune(cursors, index.num_docs() as DocId, &mut topk);
    topk.finalize();
    Ok(topk.topk().to_vec())
}
