//! Utility types and functions for DAS.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Location`] - Position context carried by parse errors
//! - Math type re-exports from glam

mod error;
mod math;

pub use error::*;
pub use math::*;
