/*! Word embeddings

[Embedding] replaces every word of a text array by a vector from a lookup table,
adding a trailing axis of the table's dimension. Unknown words get the average vector of the table.

[Glove] reads tables in the GloVe text format (`word v1 v2 ... vd`, one word per line),
from a local file or a downloaded one, and memoizes the parsed table in its stage folder.
!*/
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use log::{info, warn};

use crate::config::Config;
use crate::download::open_maybe_gz;
use crate::error::Error;
use crate::step::{MapStep, Mapper, OutputLayout, SourceArray, Step};
use crate::store::{ArrayDescriptor, Batch, DType};

/// Dimensions of the published GloVe 6B vectors.
pub const GLOVE_DIMENSIONS: [usize; 4] = [50, 100, 200, 300];

pub type Table = HashMap<String, Vec<f32>>;

#[derive(Debug, Clone)]
pub struct Embedding {
    table: Table,
    dimension: usize,
    average: Vec<f32>,
}

impl Embedding {
    /// Every vector of `table` must have `dimension` entries.
    pub fn new(table: Table, dimension: usize) -> Result<Self, Error> {
        if dimension == 0 {
            return Err(Error::InvalidArgument(
                "embedding dimension must be positive".to_string(),
            ));
        }
        if let Some((word, vector)) = table.iter().find(|(_, v)| v.len() != dimension) {
            return Err(Error::InvalidArgument(format!(
                "embedding of {:?} has {} entries, expected {}",
                word,
                vector.len(),
                dimension
            )));
        }

        let mut average = vec![0f32; dimension];
        for vector in table.values() {
            for (acc, v) in average.iter_mut().zip(vector) {
                *acc += v;
            }
        }
        if table.is_empty() {
            warn!("empty embedding table, every word maps to the zero vector");
        } else {
            let n = table.len() as f32;
            average.iter_mut().for_each(|acc| *acc /= n);
        }

        Ok(Self {
            table,
            dimension,
            average,
        })
    }

    /// Build a table from parallel word and vector lists. Later duplicates win.
    pub fn from_pairs(words: Vec<String>, vectors: Vec<Vec<f32>>, dimension: usize) -> Result<Self, Error> {
        if words.len() != vectors.len() {
            return Err(Error::InvalidArgument(format!(
                "{} words for {} vectors",
                words.len(),
                vectors.len()
            )));
        }
        Self::new(words.into_iter().zip(vectors).collect(), dimension)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn contains(&self, word: &str) -> bool {
        self.table.contains_key(word)
    }

    /// Vector of `word`, or the average vector for unknown words.
    pub fn lookup(&self, word: &str) -> &[f32] {
        self.table
            .get(word)
            .map(Vec::as_slice)
            .unwrap_or(&self.average)
    }

    pub fn average(&self) -> &[f32] {
        &self.average
    }

    pub fn into_step(self) -> MapStep<Self, Embedded> {
        let layout = Embedded {
            dimension: self.dimension,
        };
        MapStep::with_layout(self, layout)
    }
}

impl Step for Embedding {
    fn name(&self) -> &'static str {
        "Embedding"
    }
}

impl Mapper for Embedding {
    fn apply(&mut self, batch: Batch, _: &ArrayDescriptor) -> Result<Batch, Error> {
        let mut shape = batch.shape().to_vec();
        shape.push(self.dimension);
        let words = batch.into_array::<String>()?;

        let mut vectors = Vec::with_capacity(words.len() * self.dimension);
        for word in words.iter() {
            vectors.extend_from_slice(self.lookup(word));
        }
        Batch::from_vec(&shape, vectors)
    }
}

/// Source shape plus a trailing axis of the embedding dimension, as `f32`.
#[derive(Debug, Clone, Copy)]
pub struct Embedded {
    dimension: usize,
}

impl OutputLayout for Embedded {
    fn output_shape(&self, source: &mut SourceArray<'_>) -> Result<Vec<usize>, Error> {
        let mut shape = source.descriptor().shape.clone();
        shape.push(self.dimension);
        Ok(shape)
    }

    fn output_dtype(&self, _: &ArrayDescriptor) -> DType {
        DType::F32
    }
}

/// Loader of GloVe-format embedding tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct Glove;

impl Step for Glove {
    fn name(&self) -> &'static str {
        "Glove"
    }
}

impl Glove {
    /// Load the table at `source`, a local path or an http(s) url.
    ///
    /// Urls are downloaded into the stage folder first.
    /// The parsed table is cached under `embeddings-<dimension>`.
    pub fn load(&self, config: &Config, source: &str, dimension: usize) -> Result<Embedding, Error> {
        if !GLOVE_DIMENSIONS.contains(&dimension) {
            warn!(
                "dimension {} is not one of the published GloVe dimensions {:?}",
                dimension, GLOVE_DIMENSIONS
            );
        }
        let path = if source.starts_with("http://") || source.starts_with("https://") {
            self.download(config, source)?
        } else {
            Path::new(source).to_path_buf()
        };

        let basename = format!("embeddings-{}", dimension);
        let key = (path.to_string_lossy().into_owned(), dimension);
        let table = self.cached(config, &basename, &key, || {
            info!("parsing embeddings from {:?}", path);
            Self::parse(open_maybe_gz(&path)?, dimension)
        })?;
        Embedding::new(table, dimension)
    }

    /// Parse `word v1 ... vd` lines. Blank lines are skipped.
    pub fn parse<R: BufRead>(reader: R, dimension: usize) -> Result<Table, Error> {
        let mut table = Table::new();
        for (nb, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let word = match fields.next() {
                Some(w) => w,
                None => continue,
            };
            let vector = fields
                .map(|v| {
                    v.parse::<f32>().map_err(|e| {
                        Error::InvalidArgument(format!("line {}: {:?}: {}", nb + 1, v, e))
                    })
                })
                .collect::<Result<Vec<f32>, Error>>()?;
            if vector.len() != dimension {
                return Err(Error::InvalidArgument(format!(
                    "line {}: {} values for dimension {}",
                    nb + 1,
                    vector.len(),
                    dimension
                )));
            }
            table.insert(word.to_string(), vector);
        }
        info!("parsed {} embeddings of dimension {}", table.len(), dimension);
        Ok(table)
    }
}
