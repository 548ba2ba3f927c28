//! Raking (iterative proportional fitting).
//!
//! Responsibilities:
//!
//! - resolve margins against a survey frame and group cases into cells
//! - tally weighted category counts (parallel for large cell tables)
//! - run IPF passes until every margin matches its target
//! - summarize the result (margin comparisons, weight dispersion)

mod cells;
pub mod diagnostics;
pub mod engine;
mod tally;

pub use diagnostics::*;
pub use engine::*;
