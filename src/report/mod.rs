//! Terminal reporting for raking runs.

pub mod format;

pub use format::*;
