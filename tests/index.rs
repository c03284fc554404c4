use std::sync::Arc;

use rstest::rstest;
use temp_dir::TempDir;

use block_index::bits::elias_fano::GlobalParameters;
use block_index::codec::{BlockCodec, PackedCodec, VarintCodec};
use block_index::index::{BlockFreqIndex, Builder, StreamBuilder};
use helpers::corpus::TestCorpus;

/// Initialize the logger
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn check_round_trip(corpus: &TestCorpus) {
    for term_id in 0..corpus.vocabulary_size as u32 {
        let expected = corpus.term_postings(term_id);
        let mut list = corpus.index.list(term_id as usize).unwrap();
        assert_eq!(list.size(), expected.len() as u64, "term {term_id}");
        for (i, &(docid, freq)) in expected.iter().enumerate() {
            assert_eq!(list.docid(), docid, "term {term_id}, entry {i}");
            assert_eq!(list.freq(), freq, "term {term_id}, entry {i}");
            list.next();
        }
        assert_eq!(list.docid(), corpus.num_docs as u32);
    }
}

#[rstest]
#[case::packed(Arc::new(PackedCodec::default()) as Arc<dyn BlockCodec>, 100, 1000, 50.0)]
#[case::packed_small_blocks(Arc::new(PackedCodec::new(4)) as Arc<dyn BlockCodec>, 50, 300, 20.0)]
#[case::varint(Arc::new(VarintCodec::default()) as Arc<dyn BlockCodec>, 100, 1000, 50.0)]
fn test_index_round_trip(
    #[case] codec: Arc<dyn BlockCodec>,
    #[case] vocabulary_size: usize,
    #[case] num_docs: u64,
    #[case] lambda_words: f32,
) {
    init_logger();
    let corpus = TestCorpus::new(vocabulary_size, num_docs, lambda_words, 60, Some(42), codec);
    check_round_trip(&corpus);
}

#[test]
fn test_next_geq_matches_linear_scan() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::new(8));
    let corpus = TestCorpus::new(40, 500, 30.0, 30, Some(7), codec);

    for term_id in 0..corpus.vocabulary_size as u32 {
        let postings = corpus.term_postings(term_id);
        for target in (0..corpus.num_docs as u32).step_by(13) {
            let mut list = corpus.index.list(term_id as usize).unwrap();
            list.next_geq(target);
            let expected = postings
                .iter()
                .map(|&(docid, _)| docid)
                .find(|&docid| docid >= target)
                .unwrap_or(corpus.num_docs as u32);
            assert_eq!(list.docid(), expected, "term {term_id}, target {target}");
        }
    }
}

#[test]
fn test_move_to_position() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::new(16));
    let corpus = TestCorpus::new(20, 400, 40.0, 40, Some(3), codec);

    for term_id in 0..corpus.vocabulary_size as u32 {
        let postings = corpus.term_postings(term_id);
        let mut list = corpus.index.list(term_id as usize).unwrap();
        let n = postings.len() as u64;
        for i in [n - 1, 0, n / 2, n / 3] {
            list.move_to_position(i);
            assert_eq!(list.position(), i);
            assert_eq!(list.docid(), postings[i as usize].0);
            assert_eq!(list.freq(), postings[i as usize].1);
        }
    }
}

#[test]
fn test_stream_builder_file_round_trip() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let corpus = TestCorpus::new(60, 800, 25.0, 40, Some(11), codec.clone());

    let mut stream = StreamBuilder::new(800, GlobalParameters::default(), codec.clone()).unwrap();
    for term_id in 0..corpus.vocabulary_size as u32 {
        let postings = corpus.term_postings(term_id);
        let docs: Vec<u32> = postings.iter().map(|&(d, _)| d).collect();
        let freqs: Vec<u32> = postings.iter().map(|&(_, f)| f).collect();
        stream.add_posting_list(&docs, &freqs).unwrap();
    }

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corpus.idx");
    stream.build(&path).unwrap();

    for index in [
        BlockFreqIndex::open(&path, codec.clone()).unwrap(),
        BlockFreqIndex::in_memory(&path, codec.clone()).unwrap(),
    ] {
        assert_eq!(index.size(), corpus.vocabulary_size);
        assert_eq!(index.num_docs(), 800);
        for term_id in 0..corpus.vocabulary_size as u32 {
            let expected = corpus.term_postings(term_id);
            let mut list = index.list(term_id as usize).unwrap();
            for &(docid, freq) in expected {
                assert_eq!((list.docid(), list.freq()), (docid, freq));
                list.next();
            }
        }
        index.warmup(0);
    }
}

#[test]
fn test_merge_stream_builders() {
    init_logger();
    let codec: Arc<dyn BlockCodec> = Arc::new(VarintCodec::default());
    let params = GlobalParameters::default();

    let lists: Vec<(Vec<u32>, Vec<u32>)> = vec![
        (vec![1, 3, 5], vec![1, 2, 1]),
        (vec![2, 3, 7], vec![1, 1, 3]),
        (vec![0, 9], vec![4, 4]),
        ((0..400).collect(), vec![1; 400]),
    ];

    let mut first = StreamBuilder::new(1000, params, codec.clone()).unwrap();
    first.add_posting_list(&lists[0].0, &lists[0].1).unwrap();
    first.add_posting_list(&lists[1].0, &lists[1].1).unwrap();
    let mut second = StreamBuilder::new(1000, params, codec.clone()).unwrap();
    second.add_posting_list(&lists[2].0, &lists[2].1).unwrap();
    second.add_posting_list(&lists[3].0, &lists[3].1).unwrap();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("merged.idx");
    StreamBuilder::merge_into(vec![first, second], &path).unwrap();

    let index = BlockFreqIndex::open(&path, codec).unwrap();
    assert_eq!(index.size(), 4);
    for (i, (docs, freqs)) in lists.iter().enumerate() {
        let mut list = index.list(i).unwrap();
        assert_eq!(list.size(), docs.len() as u64);
        for (&docid, &freq) in docs.iter().zip(freqs) {
            assert_eq!((list.docid(), list.freq()), (docid, freq));
            list.next();
        }
        assert_eq!(list.docid(), 1000);
    }
}

#[test]
fn test_merge_rejects_num_docs_mismatch() {
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::default());
    let params = GlobalParameters::default();
    let mut first = StreamBuilder::new(10, params, codec.clone()).unwrap();
    first.add_posting_list(&[1], &[1]).unwrap();
    let mut second = StreamBuilder::new(20, params, codec.clone()).unwrap();
    second.add_posting_list(&[1], &[1]).unwrap();

    let dir = TempDir::new().unwrap();
    let err = StreamBuilder::merge_into(vec![first, second], &dir.path().join("bad.idx"));
    assert!(matches!(err, Err(block_index::Error::MergeMismatch)));
}

#[test]
fn test_builder_and_stream_builder_agree_on_bytes() {
    // The in-memory builder and the on-disk layout must decode the
    // same postings for the same input.
    let codec: Arc<dyn BlockCodec> = Arc::new(PackedCodec::new(32));
    let params = GlobalParameters::default();
    let docs: Vec<u32> = (0..100).map(|i| i * 5 + 2).collect();
    let freqs: Vec<u32> = (0..100).map(|i| i % 7 + 1).collect();

    let mut builder = Builder::new(600, params, codec.clone());
    builder.add_posting_list(&docs, &freqs).unwrap();
    let memory_index = builder.build();

    let mut stream = StreamBuilder::new(600, params, codec.clone()).unwrap();
    stream.add_posting_list(&docs, &freqs).unwrap();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("single.idx");
    stream.build(&path).unwrap();
    let file_index = BlockFreqIndex::open(&path, codec).unwrap();

    let mut memory_list = memory_index.list(0).unwrap();
    let mut file_list = file_index.list(0).unwrap();
    for _ in 0..memory_list.size() {
        assert_eq!(memory_list.docid(), file_list.docid());
        assert_eq!(memory_list.freq(), file_list.freq());
        memory_list.next();
        file_list.next();
    }
}
