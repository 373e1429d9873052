//! Utility types shared by every encoder.
//!
//! This module contains fundamental types used throughout the library:
//! - [`Encodable`] - Fixed-width little-endian element encoding
//! - [`Error`] / [`Result`] - Error handling
//! - [`Diagnostics`] - Non-fatal problems collected during a run
//! - Math type re-exports from glam and [`BBox3f`]

mod pod;
mod error;
mod math;
mod diagnostics;

pub use pod::*;
pub use error::*;
pub use math::*;
pub use diagnostics::*;
