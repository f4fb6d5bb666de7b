//! # Pattern Corpus
//!
//! Typed Strudel pattern records and the read-only corpus that holds them.
//! A corpus is validated in full when it is loaded: a missing field, a
//! wrongly typed value, an empty id or a duplicate id rejects the whole
//! source.

pub mod corpus;
pub mod error;
pub mod record;

pub use corpus::PatternCorpus;
pub use error::{PatternError, Result};
pub use record::PatternRecord;
