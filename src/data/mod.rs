//! Synthetic data sources.
//!
//! - seeded survey generator with a known response bias (`sample`)

pub mod sample;

pub use sample::*;
