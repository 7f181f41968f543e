//! Vocabulary index encoding.
//!
//! Replaces each value of a 1-D array by its index in a vocabulary.
//! Values not yet in the vocabulary are appended to it, so indices follow first-seen order.
//!
//! [encode_with_vocabulary] stores the vocabulary next to the encoded array, as a 1-D array
//! of the source dtype named `<target>_vocabulary`. Loading it back with [IndexEncode::load]
//! gives compatible indices to arrays encoded later on (a test split after a train split).
use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::step::{MapStep, Mapper, OutputLayout, SourceArray, Step};
use crate::store::{split, ArrayDescriptor, ArrayRef, Batch, Container, DType, Element};

/// Appended to the name of an encoded array to name its vocabulary.
pub const VOCABULARY_SUFFIX: &str = "_vocabulary";

/// A hashable array value.
///
/// Floats are compared by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symbol {
    Int(i64),
    Float(u64),
    Text(String),
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol::Text(s.to_string())
    }
}

impl From<i64> for Symbol {
    fn from(v: i64) -> Self {
        Symbol::Int(v)
    }
}

impl From<f64> for Symbol {
    fn from(v: f64) -> Self {
        Symbol::Float(v.to_bits())
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexEncode {
    vocabulary: Vec<Symbol>,
    lookup: HashMap<Symbol, i32>,
}

impl IndexEncode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known vocabulary. Duplicates keep their first index.
    pub fn with_vocabulary(vocabulary: Vec<Symbol>) -> Result<Self, Error> {
        let mut encoder = Self::new();
        for symbol in vocabulary {
            encoder.encode(symbol)?;
        }
        Ok(encoder)
    }

    /// Start from the values of a 1-D batch, in order.
    pub fn from_batch(batch: Batch) -> Result<Self, Error> {
        if batch.shape().len() != 1 {
            return Err(Error::InvalidArgument(format!(
                "a vocabulary is a 1-D array, got shape {:?}",
                batch.shape()
            )));
        }
        Self::with_vocabulary(symbols(batch))
    }

    /// Start from the vocabulary stored at `path` (`<container>.sets/<array>`).
    pub fn load(path: &str) -> Result<Self, Error> {
        let array = split(path)?;
        let mut container = Container::open_existing(&array.container)?;
        let encoder = Self::from_batch(container.read_all(&array.name)?)?;
        info!(
            "loaded {} vocabulary entries from {}",
            encoder.vocabulary.len(),
            array
        );
        Ok(encoder)
    }

    pub fn vocabulary(&self) -> &[Symbol] {
        &self.vocabulary
    }

    /// The vocabulary as a 1-D array of `dtype`, the dtype of the encoded source.
    pub fn vocabulary_batch(&self, dtype: DType) -> Result<Batch, Error> {
        let v = &self.vocabulary;
        match dtype {
            DType::U8 => collect(v, dtype, |s| match s {
                Symbol::Int(i) => u8::try_from(*i).ok(),
                _ => None,
            }),
            DType::I32 => collect(v, dtype, |s| match s {
                Symbol::Int(i) => i32::try_from(*i).ok(),
                _ => None,
            }),
            DType::I64 => collect(v, dtype, |s| match s {
                Symbol::Int(i) => Some(*i),
                _ => None,
            }),
            DType::F32 => collect(v, dtype, |s| match s {
                Symbol::Float(bits) => Some(f64::from_bits(*bits) as f32),
                _ => None,
            }),
            DType::F64 => collect(v, dtype, |s| match s {
                Symbol::Float(bits) => Some(f64::from_bits(*bits)),
                _ => None,
            }),
            DType::Str => collect(v, dtype, |s| match s {
                Symbol::Text(t) => Some(t.clone()),
                _ => None,
            }),
        }
    }

    /// Index of `symbol`, adding it to the vocabulary if needed.
    pub fn encode(&mut self, symbol: Symbol) -> Result<i32, Error> {
        if let Some(idx) = self.lookup.get(&symbol) {
            return Ok(*idx);
        }
        let idx = i32::try_from(self.vocabulary.len()).map_err(|_| {
            Error::Transform("vocabulary does not fit in i32 indices".to_string())
        })?;
        debug!("new symbol {:?} -> {}", symbol, idx);
        self.lookup.insert(symbol.clone(), idx);
        self.vocabulary.push(symbol);
        Ok(idx)
    }

    pub fn into_step(self) -> MapStep<Self, Indices> {
        MapStep::with_layout(self, Indices)
    }
}

impl Step for IndexEncode {
    fn name(&self) -> &'static str {
        "IndexEncode"
    }
}

impl Mapper for IndexEncode {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        if batch.shape().len() != 1 {
            return Err(Error::Transform(format!(
                "index encoding needs a 1-D array, got shape {:?}",
                batch.shape()
            )));
        }
        let rows = batch.rows();
        let encoded = symbols(batch)
            .into_iter()
            .map(|symbol| self.encode(symbol))
            .collect::<Result<Vec<i32>, Error>>()?;
        Batch::from_vec(&[rows], encoded)
    }
}

/// `(rows,)` of `i32`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Indices;

impl OutputLayout for Indices {
    fn output_shape(&self, source: &mut SourceArray<'_>) -> Result<Vec<usize>, Error> {
        Ok(vec![source.descriptor().len()])
    }

    fn output_dtype(&self, _: &ArrayDescriptor) -> DType {
        DType::I32
    }
}

/// Name of the vocabulary array of `target`.
pub fn vocabulary_ref(target: &ArrayRef) -> ArrayRef {
    ArrayRef::new(
        target.container.clone(),
        format!("{}{}", target.name, VOCABULARY_SUFFIX),
    )
}

/// Index-encode `source` into `target` and store the vocabulary next to `target`.
///
/// When `target` is already up to date, the stored vocabulary is loaded instead.
/// Returns the encoder holding the vocabulary of `target`.
pub fn encode_with_vocabulary(
    encoder: IndexEncode,
    source: &str,
    target: &str,
    overwrite: bool,
    batch_size: usize,
) -> Result<IndexEncode, Error> {
    let source_ref = split(source)?;
    let vocabulary = vocabulary_ref(&split(target)?);
    let dtype = Container::open_existing(&source_ref.container)?
        .descriptor(&source_ref.name)?
        .dtype;

    let mut step = encoder.into_step();
    let mut container = step.call(source, target, overwrite, batch_size)?;
    if step.skipped() {
        if container.contains(&vocabulary.name) {
            debug!("reading stored vocabulary {}", vocabulary);
            return IndexEncode::from_batch(container.read_all(&vocabulary.name)?);
        }
        warn!("{} is up to date but has no stored vocabulary", target);
        return Ok(step.into_mapper());
    }

    let encoder = step.into_mapper();
    if container.contains(&vocabulary.name) {
        container.remove(&vocabulary.name)?;
    }
    container.create_with(&vocabulary.name, &encoder.vocabulary_batch(dtype)?)?;
    container.flush()?;
    info!(
        "stored {} vocabulary entries in {}",
        encoder.vocabulary.len(),
        vocabulary
    );
    Ok(encoder)
}

fn collect<T, F>(symbols: &[Symbol], dtype: DType, convert: F) -> Result<Batch, Error>
where
    T: Element,
    F: Fn(&Symbol) -> Option<T>,
{
    let values = symbols
        .iter()
        .map(|s| {
            convert(s).ok_or_else(|| {
                Error::Transform(format!("vocabulary entry {:?} is not a {} value", s, dtype))
            })
        })
        .collect::<Result<Vec<T>, Error>>()?;
    Batch::from_vec(&[values.len()], values)
}

fn symbols(batch: Batch) -> Vec<Symbol> {
    match batch {
        Batch::U8(a) => a.iter().map(|v| Symbol::Int(i64::from(*v))).collect(),
        Batch::I32(a) => a.iter().map(|v| Symbol::Int(i64::from(*v))).collect(),
        Batch::I64(a) => a.iter().map(|v| Symbol::Int(*v)).collect(),
        Batch::F32(a) => a.iter().map(|v| Symbol::from(f64::from(*v))).collect(),
        Batch::F64(a) => a.iter().map(|v| Symbol::from(*v)).collect(),
        Batch::Str(a) => a.iter().cloned().map(Symbol::Text).collect(),
    }
}
