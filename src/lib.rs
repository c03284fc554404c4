//! Query-evaluation core of an inverted-index search engine.
//!
//! The crate covers three tightly coupled pieces: a memory-mapped,
//! block-compressed posting-list container with an Elias-Fano endpoint
//! directory ([`index`]), a bounded top-k queue whose threshold doubles
//! as an early-termination oracle ([`topk`]), and a query model that
//! normalizes heterogeneous inputs into evaluator-ready requests
//! ([`query`]). Retrieval algorithms live in [`search`]; index
//! construction from raw documents, tokenization, and concrete ranking
//! models are external collaborators.

pub mod base;
pub mod bits;
pub mod codec;
pub mod error;
pub mod index;
pub mod live_block;
pub mod postings;
pub mod query;
pub mod search;
pub mod source;
pub mod topk;

pub use error::{Error, Result};
