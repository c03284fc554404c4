//! Shared type aliases for the index and query layers.

/// Document identifier, in `[0, num_docs)` for a given index.
pub type DocId = u32;

/// Identifier of a term in the vocabulary.
pub type TermId = u32;

/// A relevance score.
pub type Score = f32;

/// Position of a term within the original (pre-deduplication) query.
pub type TermPosition = usize;
