use std::io::Cursor;
use std::io::Write;

use block_index::query::{QueryContainer, QueryReader, RequestFlagSet, Selection};

#[test]
fn test_reader_auto_detects_json() {
    let lines = concat!(
        "{\"id\":\"q1\",\"query\":\"hello world\",\"term_ids\":[4,2,4]}\n",
        "{\"query\":\"second\",\"thresholds\":[{\"k\":5,\"score\":1.5}]}\n",
    );
    let mut reader = QueryReader::new(Box::new(Cursor::new(lines.to_owned())));

    let first = reader.next().unwrap().unwrap();
    assert_eq!(first.id(), Some("q1"));
    let request = first.query(5, RequestFlagSet::all()).unwrap();
    assert_eq!(request.term_ids(), &[2, 4]);
    assert_eq!(request.term_weights(), &[1.0, 2.0]);

    let second = reader.next().unwrap().unwrap();
    assert_eq!(second.threshold(5), Some(1.5));
    assert!(reader.next().unwrap().is_none());
}

#[test]
fn test_reader_auto_detects_colon() {
    let mut reader = QueryReader::new(Box::new(Cursor::new("42:the quick fox\nbare query\n")));
    let first = reader.next().unwrap().unwrap();
    assert_eq!(first.id(), Some("42"));
    assert_eq!(first.string(), Some("the quick fox"));
    let second = reader.next().unwrap().unwrap();
    assert_eq!(second.string(), Some("bare query"));
}

#[test]
fn test_reader_from_file() {
    let dir = temp_dir::TempDir::new().unwrap();
    let path = dir.path().join("queries.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "1:alpha").unwrap();
    writeln!(file, "2:beta").unwrap();
    drop(file);

    let mut reader = QueryReader::from_file(&path).unwrap();
    let mut ids = Vec::new();
    while let Some(query) = reader.next().unwrap() {
        ids.push(query.id().unwrap().to_owned());
    }
    assert_eq!(ids, vec!["1", "2"]);
}

#[test]
fn test_reader_map_rewrites_queries() {
    let reader = QueryReader::new(Box::new(Cursor::new("one\ntwo\n"))).map(|mut query| {
        let rewritten = format!("{}!", query.string().unwrap_or_default());
        query.set_string(rewritten);
        query
    });
    let mut reader = reader;
    assert_eq!(reader.next().unwrap().unwrap().string(), Some("one!"));
    assert_eq!(reader.next().unwrap().unwrap().string(), Some("two!"));
}

#[test]
fn test_reader_filters_pass_through() {
    // Filter predicates are evaluated but every query is still yielded.
    let reader =
        QueryReader::new(Box::new(Cursor::new("keep\ndrop\n"))).filter(|query| {
            query.string() == Some("keep")
        });
    let mut reader = reader;
    let seen: Vec<String> = std::iter::from_fn(|| {
        reader
            .next()
            .unwrap()
            .map(|q| q.string().unwrap_or_default().to_owned())
    })
    .collect();
    assert_eq!(seen, vec!["keep", "drop"]);
}

#[test]
fn test_selection_survives_json_round_trip() {
    let mut container = QueryContainer::from_term_ids(vec![10, 20, 30]);
    container.add_selection(
        7,
        Selection {
            selected_terms: vec![1],
            selected_pairs: vec![(0, 2)],
        },
    );
    container.add_threshold(7, 0.25);

    let round_tripped = QueryContainer::from_json(&container.to_json_string()).unwrap();
    assert_eq!(round_tripped.selection(7), container.selection(7));
    assert_eq!(round_tripped.threshold(7), Some(0.25));
    assert_eq!(round_tripped.term_ids(), container.term_ids());
}

#[test]
fn test_request_selection_uses_original_positions() {
    // Positions refer to the query before duplicates are folded.
    let mut container = QueryContainer::from_term_ids(vec![9, 9, 4]);
    container.add_selection(
        3,
        Selection {
            selected_terms: vec![0, 1],
            selected_pairs: vec![(1, 2)],
        },
    );
    let request = container.query(3, RequestFlagSet::all()).unwrap();
    let selection = request.selection().unwrap();
    assert_eq!(selection.selected_terms, vec![9]);
    assert_eq!(selection.selected_pairs, vec![(9, 4)]);

    let mut flags = RequestFlagSet::all();
    flags.remove(block_index::query::RequestFlag::Selection);
    assert!(container.query(3, flags).unwrap().selection().is_none());
}
