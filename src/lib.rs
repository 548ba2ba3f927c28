//! `survey-rake` library crate.
//!
//! The binary (`rake`) is a thin wrapper around this library so that:
//!
//! - the raking engine is testable without spawning processes
//! - modules are reusable from other tools (notebook exports, batch jobs)
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod rake;
pub mod report;
pub mod weights;
