/*! # Sets

Step-wise preprocessing of array datasets stored on disk.

Arrays live in `.sets` containers and are addressed by `<container>.sets/<array>` paths.
Map stages ([process]) stream a source array batch by batch into a target array, skipping targets that already exist,
and stages keep their cached computations and downloads in their own folder under the configured root.

```no_run
use sets::process::Tokenize;

let mut step = Tokenize::new().into_step();
step.call_default("data/train.sets/sentences", "data/train.sets/tokens")?;
# Ok::<(), sets::error::Error>(())
```
!*/
pub mod cache;
pub mod config;
pub mod download;
pub mod error;
pub mod process;
pub mod step;
pub mod store;

pub use error::Error;
