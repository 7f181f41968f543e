//! Batched map step.
//!
//! Streams a source array through a stage's [Mapper] in fixed-size batches and writes the results
//! into a target array, creating it if needed.
//! A complete target is considered up to date unless `overwrite` is set.
//! Targets are marked incomplete while they are written, so a run that failed halfway is redone by the next call.
//!
//! The shape and dtype of a newly created target come from an [OutputLayout] strategy,
//! by default the ones of the source ([Preserve]).
use std::path::Path;

use log::{debug, info, warn};

use super::Step;
use crate::error::Error;
use crate::store::{split, ArrayDescriptor, ArrayRef, Batch, Container, DType};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Per-batch transformation of a map stage.
pub trait Mapper: Step {
    /// Map a batch of rows.
    ///
    /// `output` describes the target array. The returned batch must have as many rows as `batch`.
    fn apply(&mut self, batch: Batch, output: &ArrayDescriptor) -> Result<Batch, Error>;
}

/// Shape and dtype of an array created by a map step.
pub trait OutputLayout {
    fn output_shape(&self, source: &mut SourceArray<'_>) -> Result<Vec<usize>, Error> {
        Ok(source.descriptor().shape.clone())
    }

    fn output_dtype(&self, input: &ArrayDescriptor) -> DType {
        input.dtype
    }
}

/// Same shape and dtype as the source.
#[derive(Debug, Clone, Copy, Default)]
pub struct Preserve;

impl OutputLayout for Preserve {}

/// Read access to the source array while its output layout is computed.
pub struct SourceArray<'a> {
    container: &'a mut Container,
    name: &'a str,
    descriptor: ArrayDescriptor,
}

impl<'a> SourceArray<'a> {
    pub fn new(container: &'a mut Container, name: &'a str) -> Result<Self, Error> {
        let descriptor = container.descriptor(name)?.clone();
        Ok(Self {
            container,
            name,
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &ArrayDescriptor {
        &self.descriptor
    }

    /// Visit the source in consecutive batches of at most `batch_size` rows.
    pub fn for_each_batch<F>(&mut self, batch_size: usize, mut f: F) -> Result<(), Error>
    where
        F: FnMut(Batch) -> Result<(), Error>,
    {
        let len = self.descriptor.len();
        let mut offset = 0;
        while offset < len {
            let end = (offset + batch_size).min(len);
            f(self.container.read_rows(self.name, offset..end)?)?;
            offset = end;
        }
        Ok(())
    }
}

/// Open containers of one invocation.
///
/// Source and target share a single handle when they live in the same file.
enum Handles {
    Shared(Container),
    Split { source: Container, target: Container },
}

impl Handles {
    fn source(&mut self) -> &mut Container {
        match self {
            Handles::Shared(c) => c,
            Handles::Split { source, .. } => source,
        }
    }

    fn target(&mut self) -> &mut Container {
        match self {
            Handles::Shared(c) => c,
            Handles::Split { target, .. } => target,
        }
    }

    /// Keep the target handle, closing the source one.
    fn into_target(self) -> Container {
        match self {
            Handles::Shared(c) => c,
            Handles::Split { target, .. } => target,
        }
    }
}

/// A [Mapper] run over on-disk arrays, with an [OutputLayout] for the arrays it creates.
pub struct MapStep<M, L = Preserve> {
    mapper: M,
    layout: L,
    skipped: bool,
}

impl<M: Mapper> MapStep<M, Preserve> {
    pub fn new(mapper: M) -> Self {
        Self::with_layout(mapper, Preserve)
    }
}

impl<M: Mapper, L: OutputLayout> MapStep<M, L> {
    pub fn with_layout(mapper: M, layout: L) -> Self {
        Self {
            mapper,
            layout,
            skipped: false,
        }
    }

    /// Whether the last call found its target up to date and mapped nothing.
    pub fn skipped(&self) -> bool {
        self.skipped
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut M {
        &mut self.mapper
    }

    pub fn into_mapper(self) -> M {
        self.mapper
    }

    /// [MapStep::call] with `overwrite = false` and the default batch size.
    pub fn call_default(&mut self, source: &str, target: &str) -> Result<Container, Error> {
        self.call(source, target, false, DEFAULT_BATCH_SIZE)
    }

    /// Map the array at `source` into the array at `target`.
    ///
    /// Both are `<container>.sets/<array>` paths, possibly in the same container.
    /// Returns the (open) target container.
    pub fn call(
        &mut self,
        source: &str,
        target: &str,
        overwrite: bool,
        batch_size: usize,
    ) -> Result<Container, Error> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument(
                "batch size must be positive".to_string(),
            ));
        }
        let source = split(source)?;
        let target = split(target)?;
        let stage = self.mapper.name();

        let mut handles = Self::open(&source, &target)?;
        self.skipped = false;

        if handles.target().contains(&target.name) {
            if !overwrite && handles.target().is_complete(&target.name)? {
                info!("[{}] skipping existing array {}", stage, target);
                self.skipped = true;
                return Ok(handles.into_target());
            }
            if overwrite {
                warn!("[{}] overwriting array {}", stage, target);
            } else {
                warn!("[{}] redoing incomplete array {}", stage, target);
            }
        }

        let source_descriptor = handles.source().descriptor(&source.name)?.clone();
        let existing = handles.target().descriptor(&target.name).ok().cloned();
        let output = match &existing {
            Some(descriptor) => descriptor.clone(),
            None => self.describe_output(handles.source(), &source.name)?,
        };
        if output.shape.is_empty() || output.len() != source_descriptor.len() {
            let mut expected = output.shape.clone();
            match expected.first_mut() {
                Some(rows) => *rows = source_descriptor.len(),
                None => expected.push(source_descriptor.len()),
            }
            return Err(Error::ShapeMismatch {
                expected,
                actual: output.shape,
            });
        }
        if existing.is_some() {
            handles.target().set_complete(&target.name, false)?;
        } else {
            handles.target().create_pending(&target.name, output.clone())?;
        }

        info!(
            "[{}] mapping {} {} into {} {}",
            stage, source, source_descriptor, target, output
        );
        self.map_batches(&mut handles, &source.name, &target.name, &output, batch_size)?;
        handles.target().set_complete(&target.name, true)?;
        handles.target().flush()?;

        let container = handles.into_target();
        if existing.is_some() && output.dtype.is_text() {
            container.compact_if_sparse()
        } else {
            Ok(container)
        }
    }

    /// Validate the source and open both containers.
    fn open(source: &ArrayRef, target: &ArrayRef) -> Result<Handles, Error> {
        let source_container = Container::open_existing(&source.container)?;
        if !source_container.contains(&source.name) {
            return Err(Error::MissingInput(format!(
                "input file {:?} has no array {:?}",
                source.container, source.name
            )));
        }

        if same_file(&source.container, &target.container) {
            debug!("source and target share {:?}", source.container);
            Ok(Handles::Shared(source_container))
        } else {
            Ok(Handles::Split {
                source: source_container,
                target: Container::open(&target.container)?,
            })
        }
    }

    fn describe_output(
        &self,
        container: &mut Container,
        name: &str,
    ) -> Result<ArrayDescriptor, Error> {
        let mut source = SourceArray::new(container, name)?;
        let dtype = self.layout.output_dtype(source.descriptor());
        let shape = self.layout.output_shape(&mut source)?;
        Ok(ArrayDescriptor::new(shape, dtype))
    }

    /// Stream the source through the mapper, writing results in increasing offset order.
    fn map_batches(
        &mut self,
        handles: &mut Handles,
        source: &str,
        target: &str,
        output: &ArrayDescriptor,
        batch_size: usize,
    ) -> Result<(), Error> {
        let len = handles.source().descriptor(source)?.len();
        let mut offset = 0;
        while offset < len {
            let end = (offset + batch_size).min(len);
            let batch = handles.source().read_rows(source, offset..end)?;
            let mapped = self.mapper.apply(batch, output)?;
            if mapped.rows() != end - offset {
                return Err(Error::RowCountMismatch {
                    expected: end - offset,
                    actual: mapped.rows(),
                });
            }
            handles.target().write_rows(target, offset, &mapped)?;
            debug!("[{}] wrote rows {}..{}", self.mapper.name(), offset, end);
            offset = end;
        }
        Ok(())
    }
}

/// Whether two container paths point to the same file.
///
/// Paths are compared as given unless both files exist, in which case they are canonicalized.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
