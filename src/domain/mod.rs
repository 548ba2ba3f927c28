//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - categorical distributions (`CategoryTable`) and census margins (`MarginSpec`)
//! - survey inputs (`Case`, `SurveyFrame`, `ItemScale`)
//! - raking outputs (`WeightVector`, `WeightedCase`, `WeightedSummary`)
//! - run configuration enums and `RunConfig`

pub mod margin;
pub mod table;
pub mod types;

pub use margin::*;
pub use table::*;
pub use types::*;
