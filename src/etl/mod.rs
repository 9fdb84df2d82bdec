//! Raw merger: extraction of the three sources and their merge into one
//! denormalized, time-sorted record set.

pub mod dates;
pub mod merge;
pub mod sources;

pub use merge::{describe, load, transform, MergedDescription};
pub use sources::{extract, RawSources, SourcePaths};
