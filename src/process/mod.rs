//! Processing stages.
//!
//! Each stage is a [crate::step::Mapper] meant to be run through a [crate::step::MapStep]:
//!
//! - [tokenize::Tokenize] splits a column of sentences into a padded token matrix,
//! - [index_encode::IndexEncode] replaces values by their vocabulary index,
//! - [embedding::Embedding] replaces words by their vector.
pub mod embedding;
pub mod index_encode;
pub mod tokenize;

pub use embedding::{Embedded, Embedding, Glove};
pub use index_encode::{encode_with_vocabulary, IndexEncode, Indices, Symbol, VOCABULARY_SUFFIX};
pub use tokenize::{TokenWidth, Tokenize, Tokenizer, WordTokenizer};
