//! Input/output helpers.
//!
//! - case CSV ingest + validation (`ingest`)
//! - census target CSV ingest (`targets`)
//! - weighted case exports (`export`)
//! - weights JSON read/write (`weights`)

pub mod export;
pub mod ingest;
pub mod targets;
pub mod weights;

pub use export::*;
pub use ingest::*;
pub use targets::*;
pub use weights::*;
