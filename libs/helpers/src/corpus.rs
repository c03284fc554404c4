//! Random corpora with a brute-force search reference.

use std::cmp::min;
use std::collections::HashMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, Poisson};

use block_index::base::{DocId, Score, TermId};
use block_index::bits::elias_fano::GlobalParameters;
use block_index::codec::BlockCodec;
use block_index::index::{BlockFreqIndex, Builder};
use block_index::topk::{Entry, TopkQueue};

pub struct TermOccurrence {
    pub term_id: TermId,
    pub freq: u32,
}

pub struct TestDocument {
    pub terms: Vec<TermOccurrence>,
}

/// Draws one document: a Poisson-sized sample of distinct terms with
/// small frequencies.
pub fn create_document(
    lambda_words: f32,
    max_words: usize,
    vocabulary_size: usize,
    rng: &mut dyn RngCore,
) -> TestDocument {
    let poisson = Poisson::new(lambda_words).unwrap();
    let num_words = 1 + poisson.sample(rng) as usize;

    let num_terms = min(min(num_words, max_words), vocabulary_size);
    let term_ids = rand::seq::index::sample(rng, vocabulary_size, num_terms).into_vec();

    TestDocument {
        terms: term_ids
            .into_iter()
            .map(|term_id| TermOccurrence {
                term_id: term_id as TermId,
                freq: 1 + rng.next_u32() % 5,
            })
            .collect(),
    }
}

/// A generated corpus together with its built index.
pub struct TestCorpus {
    pub vocabulary_size: usize,
    pub num_docs: u64,
    pub documents: Vec<TestDocument>,
    pub postings: HashMap<TermId, Vec<(DocId, u32)>>,
    pub index: BlockFreqIndex,
}

impl TestCorpus {
    pub fn new(
        vocabulary_size: usize,
        num_docs: u64,
        lambda_words: f32,
        max_words: usize,
        seed: Option<u64>,
        codec: Arc<dyn BlockCodec>,
    ) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut documents = Vec::new();
        let mut postings = HashMap::<TermId, Vec<(DocId, u32)>>::new();
        for docid in 0..num_docs {
            let document = create_document(lambda_words, max_words, vocabulary_size, &mut rng);
            for term in &document.terms {
                postings
                    .entry(term.term_id)
                    .or_default()
                    .push((docid as DocId, term.freq));
            }
            documents.push(document);
        }

        let mut builder = Builder::new(num_docs, GlobalParameters::default(), codec);
        for term_id in 0..vocabulary_size as TermId {
            // Every term gets a list; absent terms get a placeholder
            // posting so list ids stay aligned with term ids.
            match postings.get(&term_id) {
                Some(list) => {
                    let docs: Vec<DocId> = list.iter().map(|&(d, _)| d).collect();
                    let freqs: Vec<u32> = list.iter().map(|&(_, f)| f).collect();
                    builder.add_posting_list(&docs, &freqs).unwrap();
                }
                None => {
                    builder.add_posting_list(&[0], &[1]).unwrap();
                    // Keep the reference model consistent with the list.
                    postings.insert(term_id, vec![(0, 1)]);
                }
            }
        }

        Self {
            vocabulary_size,
            num_docs,
            documents,
            postings,
            index: builder.build(),
        }
    }

    /// Per-term posting list, already sorted by docid.
    pub fn term_postings(&self, term_id: TermId) -> &[(DocId, u32)] {
        self.postings.get(&term_id).map_or(&[], Vec::as_slice)
    }

    /// Builds a query from the terms of one document.
    pub fn query_from_document(&self, docid: usize) -> Vec<(TermId, Score)> {
        self.documents[docid]
            .terms
            .iter()
            .map(|term| (term.term_id, term.freq as Score))
            .collect()
    }

    /// Exhaustive disjunctive search with `score = freq * weight`.
    pub fn brute_force_or(&self, query: &[(TermId, Score)], k: usize) -> Vec<Entry> {
        let mut scores = HashMap::<DocId, Score>::new();
        for &(term_id, weight) in query {
            for &(docid, freq) in self.term_postings(term_id) {
                *scores.entry(docid).or_insert(0.0) += freq as Score * weight;
            }
        }
        let mut topk = TopkQueue::new(k);
        let mut entries: Vec<_> = scores.into_iter().collect();
        entries.sort_by_key(|&(docid, _)| docid);
        for (docid, score) in entries {
            topk.insert(score, docid);
        }
        topk.finalize();
        topk.topk().to_vec()
    }

    /// Exhaustive conjunctive search with `score = freq * weight`.
    pub fn brute_force_and(&self, query: &[(TermId, Score)], k: usize) -> Vec<Entry> {
        let mut scores = HashMap::<DocId, (usize, Score)>::new();
        for &(term_id, weight) in query {
            for &(docid, freq) in self.term_postings(term_id) {
                let entry = scores.entry(docid).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += freq as Score * weight;
            }
        }
        let mut topk = TopkQueue::new(k);
        let mut entries: Vec<_> = scores.into_iter().collect();
        entries.sort_by_key(|&(docid, _)| docid);
        for (docid, (matched, score)) in entries {
            if matched == query.len() {
                topk.insert(score, docid);
            }
        }
        topk.finalize();
        topk.topk().to_vec()
    }

    /// True per-term upper bound: the largest frequency in the list.
    pub fn max_freq(&self, term_id: TermId) -> Score {
        self.term_postings(term_id)
            .iter()
            .map(|&(_, freq)| freq)
            .max()
            .unwrap_or(0) as Score
    }
}
