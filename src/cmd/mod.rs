//! Command-line entry points.

pub mod consolidate;
pub mod crop;
pub mod transcribe;
