//! # annotation-index
//!
//! Builds a bidirectional index between Java annotations and the compiled
//! classes that use them, by decoding class files straight from class
//! directories and jars. Nothing is loaded or executed.
//!
//! ## Architecture
//!
//! - **decoder**: class file bytes to a `ClassDescriptor` (name, interfaces, annotation occurrences)
//! - **index**: annotation -> classes, class -> annotations, class -> interfaces
//! - **resolve**: one-level propagation of interface annotations onto implementing classes
//! - **archive**: lazy class-file entry streams from directories and jars
//! - **session**: decode + ingest loop with failure policy and optional parallel decoding
//! - **store**: LMDB snapshot of an index
//! - **cli** / **config** / **logging**: command-line surface

mod constant_pool;
mod reader;

pub mod archive;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod index;
pub mod logging;
pub mod resolve;
pub mod session;
pub mod store;

pub use crate::decoder::{AnnotationOccurrence, AnnotationSite, ClassDescriptor, ScanOptions, decode, decode_from};
pub use crate::error::{CrossReferenceError, DecodeError, ScanError, Unresolved};
pub use crate::index::AnnotationIndex;
pub use crate::resolve::CrossReference;
pub use crate::session::{FailurePolicy, ScanSession, ScanSummary, SessionConfig};

#[cfg(test)]
#[path = "../tests/support/mod.rs"]
mod support;
