//! Pipeline steps.
//!
//! Every stage implements the light [step::Step] trait, which provides its cache folder and download helper.
//! Stages that map an on-disk array batch by batch implement [map_step::Mapper] and run through [map_step::MapStep].
pub mod map_step;
#[allow(clippy::module_inception)]
pub mod step;

pub use map_step::{
    MapStep, Mapper, OutputLayout, Preserve, SourceArray, DEFAULT_BATCH_SIZE,
};
pub use step::Step;
