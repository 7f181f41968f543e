/*! Tokenization

Turns a column of sentences into a matrix of tokens, one row per sentence,
right-padded with empty tokens up to the longest tokenization of the column.

Markup tags (`<e1>`, `</e1>`...) are kept as single tokens,
the text between them is split on Unicode word boundaries and lower-cased.
!*/
use lazy_static::lazy_static;
use ndarray::{ArrayD, IxDyn};
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::error::Error;
use crate::step::{
    MapStep, Mapper, OutputLayout, SourceArray, Step, DEFAULT_BATCH_SIZE,
};
use crate::store::{ArrayDescriptor, Batch, DType};

lazy_static! {
    static ref TAG: Regex = Regex::new(r"<[^>]+>").expect("tag pattern is valid");
}

/// Text to tokens.
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Default tokenizer: tags kept whole, words and punctuation lower-cased.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTokenizer;

impl WordTokenizer {
    fn split(chunk: &str, tokens: &mut Vec<String>) {
        tokens.extend(
            chunk
                .split_word_bounds()
                .filter(|word| !word.trim().is_empty())
                .map(str::to_lowercase),
        );
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();
        let mut last = 0;
        for tag in TAG.find_iter(text) {
            Self::split(&text[last..tag.start()], &mut tokens);
            tokens.push(tag.as_str().to_string());
            last = tag.end();
        }
        Self::split(&text[last..], &mut tokens);
        tokens
    }
}

/// Map stage tokenizing a 1-D text array into a 2-D padded token array.
#[derive(Debug, Clone, Default)]
pub struct Tokenize<T = WordTokenizer> {
    tokenizer: T,
}

impl Tokenize<WordTokenizer> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Tokenizer + Clone> Tokenize<T> {
    pub fn with_tokenizer(tokenizer: T) -> Self {
        Self { tokenizer }
    }

    /// Wrap into a [MapStep] sizing its output after the longest tokenization.
    pub fn into_step(self) -> MapStep<Self, TokenWidth<T>> {
        let layout = TokenWidth {
            tokenizer: self.tokenizer.clone(),
        };
        MapStep::with_layout(self, layout)
    }
}

impl<T> Step for Tokenize<T> {
    fn name(&self) -> &'static str {
        "Tokenize"
    }
}

impl<T: Tokenizer> Mapper for Tokenize<T> {
    fn apply(&mut self, batch: Batch, output: &ArrayDescriptor) -> Result<Batch, Error> {
        let sentences = text_column(batch)?;
        let width = output.row_elements();

        let mut tokens = Vec::with_capacity(sentences.len() * width);
        for sentence in sentences.iter() {
            let mut row = self.tokenizer.tokenize(sentence);
            if row.len() > width {
                return Err(Error::Transform(format!(
                    "{:?} has {} tokens, target rows hold {}",
                    sentence,
                    row.len(),
                    width
                )));
            }
            row.resize(width, String::new());
            tokens.extend(row);
        }

        let tokens = ArrayD::from_shape_vec(IxDyn(&[sentences.len(), width]), tokens)?;
        Ok(tokens.into())
    }
}

/// `(rows, longest tokenization)` text layout.
#[derive(Debug, Clone)]
pub struct TokenWidth<T> {
    tokenizer: T,
}

impl<T: Tokenizer> OutputLayout for TokenWidth<T> {
    fn output_shape(&self, source: &mut SourceArray<'_>) -> Result<Vec<usize>, Error> {
        let rows = source.descriptor().len();
        let mut width = 0;
        source.for_each_batch(DEFAULT_BATCH_SIZE, |batch| {
            for sentence in text_column(batch)?.iter() {
                width = width.max(self.tokenizer.tokenize(sentence).len());
            }
            Ok(())
        })?;
        Ok(vec![rows, width])
    }

    fn output_dtype(&self, _: &ArrayDescriptor) -> DType {
        DType::Str
    }
}

/// A batch of sentences: 1-D text.
fn text_column(batch: Batch) -> Result<ArrayD<String>, Error> {
    if batch.shape().len() != 1 {
        return Err(Error::Transform(format!(
            "expected a column of sentences, got shape {:?}",
            batch.shape()
        )));
    }
    batch.into_array::<String>()
}
