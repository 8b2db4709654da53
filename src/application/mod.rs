//! Application layer: the formatting session callers interact with.
//!
//! Coordinates a table with its rule set and keeps an undo history of
//! registrations and renames.

pub mod session;

pub use session::*;
