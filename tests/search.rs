use std::sync::Arc;

use rstest::rstest;

use block_index::base::{Score, TermId};
use block_index::codec::{BlockCodec, PackedCodec, VarintCodec};
use block_index::query::QueryContainer;
use block_index::search::{
    evaluate_ranked_and, evaluate_ranked_or, evaluate_ranked_or_prune, FreqScorer, Scorer,
    WandData,
};
use block_index::topk::Entry;
use helpers::corpus::TestCorpus;

/// Initialize the logger
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Upper bounds computed from the corpus itself.
struct CorpusBounds<'a> {
    corpus: &'a TestCorpus,
}

impl WandData for CorpusBounds<'_> {
    fn max_term_weight(&self, term_id: TermId) -> Score {
        self.corpus.max_freq(term_id)
    }
}

fn compare_results(observed: &[Entry], expected: &[Entry]) {
    assert_eq!(
        observed.len(),
        expected.len(),
        "result sizes differ: {observed:?} vs {expected:?}"
    );
    for (i, (obs, exp)) in observed.iter().zip(expected).enumerate() {
        assert_eq!(obs.docid, exp.docid, "docid differs at rank {i}");
        ntest::assert_about_eq!(obs.score as f64, exp.score as f64, 1e-3);
    }
}

fn weighted_request(
    query: &[(TermId, Score)],
    k: usize,
) -> block_index::query::QueryRequest {
    // Repeat each term as many times as its integer weight so the
    // request's duplicate folding reproduces the weights.
    let mut ids = Vec::new();
    for &(term_id, weight) in query {
        for _ in 0..weight as usize {
            ids.push(term_id);
        }
    }
    QueryContainer::from_term_ids(ids)
        .query(k, block_index::query::RequestFlagSet::all())
        .unwrap()
}

fn folded_query(query: &[(TermId, Score)]) -> Vec<(TermId, Score)> {
    use std::collections::BTreeMap;
    let mut folded = BTreeMap::new();
    for &(term_id, weight) in query {
        *folded.entry(term_id).or_insert(0.0) += weight;
    }
    folded.into_iter().collect()
}

#[rstest]
#[case::packed(Arc::new(PackedCodec::default()) as Arc<dyn BlockCodec>, 100, 1000, 50.0, 10)]
#[case::packed_k1(Arc::new(PackedCodec::default()) as Arc<dyn BlockCodec>, 100, 1000, 50.0, 1)]
#[case::small_blocks(Arc::new(PackedCodec::new(4)) as Arc<dyn BlockCodec>, 60, 500, 20.0, 10)]
#[case::varint(Arc::new(VarintCodec::default()) as Arc<dyn BlockCodec>, 500, 500, 5.0, 10)]
fn test_ranked_or_matches_brute_force(
    #[case] codec: Arc<dyn BlockCodec>,
    #[case] vocabulary_size: usize,
    #[case] num_docs: u64,
    #[case] lambda_words: f32,
    #[case] k: usize,
) {
    init_logger();
    let corpus = TestCorpus::new(vocabulary_size, num_docs, lambda_words, 50, Some(1), codec);
    let scorer = FreqScorer;

    for doc in [10usize, 42, 333] {
        let query = folded_query(&corpus.query_from_document(doc));
        let request = weighted_request(&query, k);
        let expected = corpus.brute_force_or(&query, k);

        let observed = evaluate_ranked_or(&corpus.index, &scorer, &request).unwrap();
        compare_results(&observed, &expected);

        let bounds = CorpusBounds { corpus: &corpus };
        let pruned =
            evaluate_ranked_or_prune(&corpus.index, &scorer, &bounds, &request).unwrap();
        compare_results(&pruned, &expected);
    }
}

#[test]
fn test_topk_matches_full_sort() {
    use rand::SeedableRng;
    use rand_distr::{Distribution, LogNormal};

    let mut rng = rand::rngs::StdRng::seed_from_u64(17);
    let log_normal = LogNormal::new(0.0, 1.0).unwrap();

    let top_k = 10;
    let mut queue = block_index::topk::TopkQueue::new(top_k);
    let mut scored: Vec<(f32, u32)> = Vec::new();
    for docid in 0..10_000u32 {
        let score = log_normal.sample(&mut rng) as f32;
        queue.insert(score, docid);
        scored.push((score, docid));
    }

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    queue.finalize();
    let observed = queue.topk();
    assert_eq!(observed.len(), top_k);
    for (entry, &(score, _)) in observed.iter().zip(&scored[..top_k]) {
        ntest::assert_about_eq!(entry.score as f64, score as f64, 1e-6);
    }
}

#[test]
fn test_ranked_and_matches_brute_force() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let corpus = TestCorpus::new(30, 2000, 8.0, 12, Some(5), codec);
    let scorer = FreqScorer;

    for doc in [0usize, 100, 999] {
        let query = folded_query(&corpus.query_from_document(doc));
        let request = weighted_request(&query, 10);
        let expected = corpus.brute_force_and(&query, 10);
        let observed = evaluate_ranked_and(&corpus.index, &scorer, &request).unwrap();
        compare_results(&observed, &expected);
    }
}

#[test]
fn test_two_list_scenario() {
    // docid 3 and 7 both score 3 with uniform weights; docid 1 scores 1.
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let mut builder = block_index::index::Builder::new(
        10,
        block_index::bits::elias_fano::GlobalParameters::default(),
        codec,
    );
    builder.add_posting_list(&[1, 3, 5], &[1, 2, 1]).unwrap();
    builder.add_posting_list(&[2, 3, 7], &[1, 1, 3]).unwrap();
    let index = builder.build();

    let request = QueryContainer::from_term_ids(vec![0, 1])
        .query(3, block_index::query::RequestFlagSet::all())
        .unwrap();
    let results = evaluate_ranked_or(&index, &FreqScorer, &request).unwrap();

    assert_eq!(results.len(), 3);
    let top_two: Vec<u32> = results[..2].iter().map(|e| e.docid).collect();
    assert!(top_two.contains(&3) && top_two.contains(&7));
    assert!(results[..2].iter().all(|e| e.score == 3.0));
    // Third place is one of the score-1 documents; which one is
    // implementation-defined but stable.
    assert_eq!(results[2].score, 1.0);
    assert!([1, 2, 5].contains(&results[2].docid));
}

#[test]
fn test_persisted_threshold_prunes_low_scores() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let corpus = TestCorpus::new(50, 500, 20.0, 30, Some(9), codec);
    let query = folded_query(&corpus.query_from_document(20));
    let unseeded = corpus.brute_force_or(&query, 10);

    // Seed the queue with the true 10th score: the same documents must
    // come back.
    let mut ids = Vec::new();
    for &(term_id, weight) in &query {
        for _ in 0..weight as usize {
            ids.push(term_id);
        }
    }
    let mut container = QueryContainer::from_term_ids(ids);
    container.add_threshold(10, unseeded.last().unwrap().score);
    let request = container
        .query(10, block_index::query::RequestFlagSet::all())
        .unwrap();
    assert!(request.threshold().is_some());

    let observed = evaluate_ranked_or(&corpus.index, &FreqScorer, &request).unwrap();
    // The same documents come back; ranks may differ among tied scores
    // because the seeded queue evolves differently.
    let normalize = |entries: &[block_index::topk::Entry]| {
        let mut entries: Vec<(u32, u32)> =
            entries.iter().map(|e| (e.docid, e.score as u32)).collect();
        entries.sort_unstable();
        entries
    };
    assert_eq!(normalize(&observed), normalize(&unseeded));
}

#[test]
fn test_scorer_trait_object() {
    // A caller-provided scorer that ignores frequencies.
    struct ConstantScorer;
    impl Scorer for ConstantScorer {
        fn term_scorer(
            &self,
            _term_id: TermId,
            term_weight: Score,
        ) -> block_index::search::TermScoreFn<'_> {
            Box::new(move |_docid, _freq| term_weight)
        }
    }

    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let mut builder = block_index::index::Builder::new(
        5,
        block_index::bits::elias_fano::GlobalParameters::default(),
        codec,
    );
    builder.add_posting_list(&[0, 1, 2], &[9, 9, 9]).unwrap();
    let index = builder.build();

    let request = QueryContainer::from_term_ids(vec![0])
        .query(2, block_index::query::RequestFlagSet::all())
        .unwrap();
    let results = evaluate_ranked_or(&index, &ConstantScorer, &request).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|entry| entry.score == 1.0));
}
