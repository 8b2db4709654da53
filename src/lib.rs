//! cellfmt - declarative cell formatting for tabular data
//!
//! Rules target columns and rows of a table and either format values,
//! substitute text for missing or zero values, or color cells from a
//! palette. Rules of the same kind that overlap resolve last-wins, and
//! rendering never mutates the source table.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::*;
pub use infrastructure::*;
