//! Error types for index construction and query evaluation.

use thiserror::Error;

/// Top-level error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// An empty posting list was handed to a builder.
    #[error("posting list must be nonempty")]
    EmptyPostingList,

    /// A selection mask selects zero or more than two term positions.
    #[error("selection mask {0:#b} must select one or two terms")]
    InvalidSelectionMask(u64),

    /// A term position does not exist in the query.
    #[error("term position {position} out of range for query of length {len}")]
    TermPositionOutOfRange { position: usize, len: usize },

    /// `parse` was called on a container without a raw query string.
    #[error("cannot parse, query string not set")]
    MissingQueryString,

    /// A query was materialized before its term identifiers were resolved.
    #[error("query not parsed")]
    QueryNotParsed,

    /// A query line carried none of the recognized content fields.
    #[error("query must have either a raw string, terms, or term ids: {0}")]
    MissingQueryContent(String),

    /// A query line could not be decoded as JSON.
    #[error("malformed query JSON `{line}`: {source}")]
    Json {
        line: String,
        source: serde_json::Error,
    },

    /// Stream builders being merged disagree on document count or codec
    /// parameters.
    #[error("merge inputs disagree on num_docs or global parameters")]
    MergeMismatch,

    /// The on-disk index does not decode to a consistent layout.
    #[error("corrupted index: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
