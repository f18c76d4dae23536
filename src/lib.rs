//! # DAS
//!
//! Reader, writer and validator for DAS scoped 3D asset files.
//!
//! A DAS file stores buffers, mesh primitives, morph targets, models,
//! keyframe animations, skeletons and scenes as a sequence of text-delimited
//! scopes with little-endian binary field values. The reader streams the file
//! in bounded chunks that never split a scope delimiter, so files of any size
//! are parsed in a single forward pass.
//!
//! ## Modules
//!
//! - [`util`] - Errors and math helpers
//! - [`das`] - Low-level format: chunked stream, grammar, reader, writer
//! - [`graph`] - In-memory entity graph
//! - [`validate`] - Cross-reference and hierarchy checks
//!
//! ## Example
//!
//! ```ignore
//! use das::prelude::*;
//!
//! let parsed = das::read_file("crate.das")?;
//! let report = parsed.graph.validate();
//! for issue in &report.issues {
//!     println!("{}: {}", issue.severity(), issue);
//! }
//! ```

pub mod util;
pub mod das;
pub mod graph;
pub mod validate;

// Re-export commonly used types
pub use util::{Error, Location, Result};
pub use das::{read_file, read_file_with, read_from, write_file, ParseOutput, ReaderConfig, ScopeWriter};
pub use graph::{Entity, EntityGraph};
pub use validate::{validate, Issue, Severity, ValidationReport};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{Error, Result, Mat4, Quat, Vec3};
    pub use crate::das::{read_file, read_from, write_file, ParseOutput, ReaderConfig, ScopeWriter};
    pub use crate::graph::*;
    pub use crate::validate::{Issue, Severity, ValidationReport};
}
