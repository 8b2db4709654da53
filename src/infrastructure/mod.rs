//! Infrastructure layer: file formats at the edges of the pipeline.
//!
//! Loads tables from CSV or JSON, reads declarative rule files and writes
//! rendered tables back out.

pub mod config;
pub mod persistence;

pub use config::*;
pub use persistence::*;
