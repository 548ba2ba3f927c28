//! Weighted item scores derived from a raking run.

pub mod apply;

pub use apply::*;
