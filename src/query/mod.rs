//! Query model: heterogeneous inputs, persisted metadata, and the
//! immutable request handed to the evaluators.
//!
//! A [`QueryContainer`] accumulates whatever is known about a query
//! (raw text, processed terms, resolved term ids, per-k thresholds and
//! term selections) from JSON lines, the colon format, or explicit
//! lists. [`QueryContainer::query`] freezes it into a [`QueryRequest`]
//! with sorted unique term ids and per-term weights.

pub mod reader;

use std::collections::BTreeMap;
use std::ops::{BitAnd, BitOr, BitXor};

use serde::{Deserialize, Serialize};

use crate::base::{Score, TermId, TermPosition};
use crate::error::{Error, Result};

pub use reader::QueryReader;

/// A predetermined subset of terms and term pairs to evaluate for one
/// value of `k`.
///
/// Both lists are kept sorted and deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection<T> {
    pub selected_terms: Vec<T>,
    pub selected_pairs: Vec<(T, T)>,
}

/// Aspects of a container a request is allowed to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RequestFlag {
    Threshold = 0b001,
    Weights = 0b010,
    Selection = 0b100,
}

/// Bit set over [`RequestFlag`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestFlagSet {
    flags: u32,
}

impl RequestFlagSet {
    /// All flags raised.
    pub fn all() -> Self {
        Self { flags: 0b111 }
    }

    pub fn contains(&self, flag: RequestFlag) -> bool {
        self.flags & flag as u32 == flag as u32
    }

    pub fn remove(&mut self, flag: RequestFlag) {
        self.flags ^= flag as u32;
    }
}

impl From<RequestFlag> for RequestFlagSet {
    fn from(flag: RequestFlag) -> Self {
        Self { flags: flag as u32 }
    }
}

impl BitOr<RequestFlag> for RequestFlagSet {
    type Output = RequestFlagSet;
    fn bitor(self, rhs: RequestFlag) -> RequestFlagSet {
        RequestFlagSet {
            flags: self.flags | rhs as u32,
        }
    }
}

impl BitAnd<RequestFlag> for RequestFlagSet {
    type Output = RequestFlagSet;
    fn bitand(self, rhs: RequestFlag) -> RequestFlagSet {
        RequestFlagSet {
            flags: self.flags & rhs as u32,
        }
    }
}

impl BitXor<RequestFlag> for RequestFlagSet {
    type Output = RequestFlagSet;
    fn bitxor(self, rhs: RequestFlag) -> RequestFlagSet {
        RequestFlagSet {
            flags: self.flags ^ rhs as u32,
        }
    }
}

// Note: both operators fold to the left operand; `rhs` is ignored.
// Kept as-is for compatibility with existing callers; use
// `RequestFlagSet::all()` or set-on-the-left chaining for real unions.
impl BitOr for RequestFlag {
    type Output = RequestFlagSet;
    fn bitor(self, _rhs: RequestFlag) -> RequestFlagSet {
        RequestFlagSet {
            flags: self as u32 | self as u32,
        }
    }
}

impl BitAnd for RequestFlag {
    type Output = RequestFlagSet;
    fn bitand(self, _rhs: RequestFlag) -> RequestFlagSet {
        RequestFlagSet {
            flags: self as u32 & self as u32,
        }
    }
}

/// One term produced by an external parsing function.
pub struct ParsedTerm {
    pub term: String,
    pub id: TermId,
}

/// Tokenizer plus lexicon lookup, supplied by the caller.
pub type ParseFn<'a> = dyn Fn(&str) -> Vec<ParsedTerm> + 'a;

/// Per-term normalization (stemming, stopping); `None` drops the term.
pub type TermProcessorFn<'a> = dyn Fn(String) -> Option<String> + 'a;

#[derive(Serialize, Deserialize)]
struct JsonThreshold {
    k: usize,
    score: Score,
}

#[derive(Serialize, Deserialize)]
struct JsonSelection {
    k: usize,
    intersections: Vec<u64>,
}

/// Wire shape of one query line; unknown fields are ignored.
#[derive(Default, Serialize, Deserialize)]
struct JsonQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terms: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    term_ids: Option<Vec<TermId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thresholds: Option<Vec<JsonThreshold>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selections: Option<Vec<JsonSelection>>,
}

/// Mutable query representation; at least one of the raw string,
/// processed terms, or term ids is present once constructed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryContainer {
    id: Option<String>,
    query_string: Option<String>,
    processed_terms: Option<Vec<String>>,
    term_ids: Option<Vec<TermId>>,
    thresholds: Vec<(usize, Score)>,
    selections: Vec<(usize, Selection<TermPosition>)>,
}

impl QueryContainer {
    /// Container holding only a raw query string.
    pub fn raw(query_string: impl Into<String>) -> Self {
        Self {
            query_string: Some(query_string.into()),
            ..Self::default()
        }
    }

    /// Container holding processed terms, optionally filtered through a
    /// term processor.
    pub fn from_terms(terms: Vec<String>, processor: Option<&TermProcessorFn>) -> Self {
        let processed = match processor {
            Some(processor) => terms.into_iter().filter_map(processor).collect(),
            None => terms,
        };
        Self {
            processed_terms: Some(processed),
            ..Self::default()
        }
    }

    /// Container holding resolved term ids.
    pub fn from_term_ids(term_ids: Vec<TermId>) -> Self {
        Self {
            term_ids: Some(term_ids),
            ..Self::default()
        }
    }

    /// Parses one JSON object (one line of a query file).
    pub fn from_json(line: &str) -> Result<Self> {
        let json: JsonQuery = serde_json::from_str(line).map_err(|source| Error::Json {
            line: line.to_owned(),
            source,
        })?;
        if json.query.is_none() && json.terms.is_none() && json.term_ids.is_none() {
            return Err(Error::MissingQueryContent(line.to_owned()));
        }
        let mut query = Self {
            id: json.id,
            query_string: json.query,
            processed_terms: json.terms,
            term_ids: json.term_ids,
            thresholds: Vec::new(),
            selections: Vec::new(),
        };
        for threshold in json.thresholds.unwrap_or_default() {
            query.thresholds.push((threshold.k, threshold.score));
        }
        for selection in json.selections.unwrap_or_default() {
            let mut decoded = Selection::default();
            for mask in selection.intersections {
                match decode_intersection(mask)? {
                    Intersection::Single(position) => decoded.selected_terms.push(position),
                    Intersection::Pair(left, right) => decoded.selected_pairs.push((left, right)),
                }
            }
            query.selections.push((selection.k, decoded));
        }
        Ok(query)
    }

    /// Parses the `id:query text` format; a line without a colon is all
    /// query text.
    pub fn from_colon_format(line: &str) -> Self {
        match line.split_once(':') {
            Some((id, rest)) => Self {
                id: Some(id.to_owned()),
                query_string: Some(rest.to_owned()),
                ..Self::default()
            },
            None => Self::raw(line),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn set_string(&mut self, query_string: impl Into<String>) -> &mut Self {
        self.query_string = Some(query_string.into());
        self
    }

    pub fn terms(&self) -> Option<&[String]> {
        self.processed_terms.as_deref()
    }

    pub fn term_ids(&self) -> Option<&[TermId]> {
        self.term_ids.as_deref()
    }

    /// Threshold persisted for `k`, if any.
    pub fn threshold(&self, k: usize) -> Option<Score> {
        self.thresholds
            .iter()
            .find(|(entry_k, _)| *entry_k == k)
            .map(|(_, score)| *score)
    }

    pub fn thresholds(&self) -> &[(usize, Score)] {
        &self.thresholds
    }

    /// Selection persisted for `k`, if any.
    pub fn selection(&self, k: usize) -> Option<&Selection<TermPosition>> {
        self.selections
            .iter()
            .find(|(entry_k, _)| *entry_k == k)
            .map(|(_, selection)| selection)
    }

    pub fn selections(&self) -> &[(usize, Selection<TermPosition>)] {
        &self.selections
    }

    /// Resolves the raw query string into processed terms and term ids.
    pub fn parse(&mut self, parse_fn: &ParseFn) -> Result<&mut Self> {
        let query_string = self.query_string.as_deref().ok_or(Error::MissingQueryString)?;
        let parsed = parse_fn(query_string);
        let mut processed_terms = Vec::with_capacity(parsed.len());
        let mut term_ids = Vec::with_capacity(parsed.len());
        for term in parsed {
            processed_terms.push(term.term);
            term_ids.push(term.id);
        }
        self.processed_terms = Some(processed_terms);
        self.term_ids = Some(term_ids);
        Ok(self)
    }

    /// Upserts the threshold for `k`. Returns `true` when an existing
    /// entry was replaced, `false` on first insert.
    pub fn add_threshold(&mut self, k: usize, score: Score) -> bool {
        if let Some(entry) = self.thresholds.iter_mut().find(|(entry_k, _)| *entry_k == k) {
            entry.1 = score;
            return true;
        }
        self.thresholds.push((k, score));
        false
    }

    /// Upserts the selection for `k`. Returns `true` when an existing
    /// entry was replaced, `false` on first insert.
    pub fn add_selection(&mut self, k: usize, selection: Selection<TermPosition>) -> bool {
        if let Some(entry) = self.selections.iter_mut().find(|(entry_k, _)| *entry_k == k) {
            entry.1 = selection;
            return true;
        }
        self.selections.push((k, selection));
        false
    }

    /// Retains only the terms (and term ids) at the given positions.
    pub fn filter_terms(&mut self, positions: &[TermPosition]) -> Result<()> {
        let len = match (&self.processed_terms, &self.term_ids) {
            (Some(terms), _) => terms.len(),
            (None, Some(ids)) => ids.len(),
            (None, None) => return Ok(()),
        };
        for &position in positions {
            if position >= len {
                return Err(Error::TermPositionOutOfRange { position, len });
            }
        }
        if let Some(terms) = &mut self.processed_terms {
            let filtered: Vec<String> = positions.iter().map(|&p| terms[p].clone()).collect();
            *terms = filtered;
        }
        if let Some(ids) = &mut self.term_ids {
            let filtered: Vec<TermId> = positions.iter().map(|&p| ids[p]).collect();
            *ids = filtered;
        }
        Ok(())
    }

    /// Materializes an immutable request for retrieving `k` results.
    pub fn query(&self, k: usize, flags: RequestFlagSet) -> Result<QueryRequest> {
        QueryRequest::new(self, k, flags)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.to_wire()).unwrap_or(serde_json::Value::Null)
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.to_wire()).unwrap_or_default()
    }

    pub fn to_json_string_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.to_wire()).unwrap_or_default()
    }

    fn to_wire(&self) -> JsonQuery {
        let thresholds = if self.thresholds.is_empty() {
            None
        } else {
            Some(
                self.thresholds
                    .iter()
                    .map(|&(k, score)| JsonThreshold { k, score })
                    .collect(),
            )
        };
        let selections = if self.selections.is_empty() {
            None
        } else {
            Some(
                self.selections
                    .iter()
                    .map(|(k, selection)| {
                        let mut intersections: Vec<u64> = selection
                            .selected_terms
                            .iter()
                            .map(|&position| 1u64 << position)
                            .chain(
                                selection
                                    .selected_pairs
                                    .iter()
                                    .map(|&(left, right)| (1u64 << left) | (1u64 << right)),
                            )
                            .collect();
                        intersections.sort_unstable();
                        JsonSelection {
                            k: *k,
                            intersections,
                        }
                    })
                    .collect(),
            )
        };
        JsonQuery {
            id: self.id.clone(),
            query: self.query_string.clone(),
            terms: self.processed_terms.clone(),
            term_ids: self.term_ids.clone(),
            thresholds,
            selections,
        }
    }
}

enum Intersection {
    Single(TermPosition),
    Pair(TermPosition, TermPosition),
}

fn decode_intersection(mask: u64) -> Result<Intersection> {
    match mask.count_ones() {
        1 => Ok(Intersection::Single(mask.trailing_zeros() as TermPosition)),
        2 => {
            let left = mask.trailing_zeros() as TermPosition;
            let right = (63 - mask.leading_zeros()) as TermPosition;
            Ok(Intersection::Pair(left, right))
        }
        _ => Err(Error::InvalidSelectionMask(mask)),
    }
}

/// Immutable, evaluator-ready form of a query.
///
/// Term ids are sorted and unique; a term occurring more than once in
/// the source query contributes its multiplicity as weight.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    k: usize,
    term_ids: Vec<TermId>,
    term_weights: Vec<Score>,
    threshold: Option<Score>,
    selection: Option<Selection<TermId>>,
}

impl QueryRequest {
    fn new(container: &QueryContainer, k: usize, flags: RequestFlagSet) -> Result<Self> {
        let source_ids = container.term_ids().ok_or(Error::QueryNotParsed)?;

        let mut counts = BTreeMap::new();
        for &term_id in source_ids {
            *counts.entry(term_id).or_insert(0usize) += 1;
        }
        let mut term_ids = Vec::with_capacity(counts.len());
        let mut term_weights = Vec::with_capacity(counts.len());
        for (term_id, count) in counts {
            term_ids.push(term_id);
            term_weights.push(count as Score);
        }

        let mut selection = None;
        if flags.contains(RequestFlag::Selection) {
            if let Some(positional) = container.selection(k) {
                selection = Some(resolve_selection(positional, source_ids)?);
            }
        }

        let threshold = if flags.contains(RequestFlag::Threshold) {
            container.threshold(k)
        } else {
            None
        };

        if !flags.contains(RequestFlag::Weights) {
            term_weights.fill(1.0);
        }

        Ok(Self {
            k,
            term_ids,
            term_weights,
            threshold,
            selection,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn term_ids(&self) -> &[TermId] {
        &self.term_ids
    }

    pub fn term_weights(&self) -> &[Score] {
        &self.term_weights
    }

    pub fn threshold(&self) -> Option<Score> {
        self.threshold
    }

    pub fn selection(&self) -> Option<&Selection<TermId>> {
        self.selection.as_ref()
    }
}

/// Translates position-based selections into term-id selections via the
/// original (pre-deduplication) term id list.
fn resolve_selection(
    positional: &Selection<TermPosition>,
    source_ids: &[TermId],
) -> Result<Selection<TermId>> {
    let lookup = |position: TermPosition| -> Result<TermId> {
        source_ids
            .get(position)
            .copied()
            .ok_or(Error::TermPositionOutOfRange {
                position,
                len: source_ids.len(),
            })
    };
    let mut selected_terms = positional
        .selected_terms
        .iter()
        .map(|&p| lookup(p))
        .collect::<Result<Vec<_>>>()?;
    selected_terms.sort_unstable();
    selected_terms.dedup();
    let mut selected_pairs = positional
        .selected_pairs
        .iter()
        .map(|&(l, r)| Ok((lookup(l)?, lookup(r)?)))
        .collect::<Result<Vec<_>>>()?;
    selected_pairs.sort_unstable();
    selected_pairs.dedup();
    Ok(Selection {
        selected_terms,
        selected_pairs,
    })
}
