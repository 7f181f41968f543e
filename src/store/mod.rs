/*!
# Persistent array store

Typed, shaped arrays living in container files, addressed by `<container>.sets/<array>` paths.

- [path] splits array paths into an [ArrayRef],
- [Container] holds the open file and performs row-slice reads and writes,
- [Batch] is the in-memory form of consecutive rows.
!*/
mod batch;
mod container;
mod dtype;
pub mod path;

pub use batch::Batch;
pub use container::{ArrayDescriptor, Container, HEADER_SIZE, MAGIC, VERSION};
pub use dtype::{DType, Element, FixedElement, STR_SLOT_SIZE};
pub use path::{split, ArrayRef, CONTAINER_SUFFIX};
