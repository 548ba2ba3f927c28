//! Error types.
//!
//! - `ConfigError` / `RakeError`: library errors raised by tables, margins,
//!   the raking engine and the weight applier.
//! - `AppError`: what the binary reports (message + process exit code).

use thiserror::Error;

/// Malformed inputs detected before any raking pass runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("category table is empty")]
    EmptyTable,

    #[error("category '{category}' has invalid value {value} (must be finite and >= 0)")]
    InvalidValue { category: String, value: f64 },

    #[error("proportions sum to {sum:.9}, expected 1 (tolerance {tolerance:e})")]
    ProportionSum { sum: f64, tolerance: f64 },

    #[error("invalid total {total} (must be finite and > 0)")]
    InvalidTotal { total: f64 },

    #[error("margin variable name is empty")]
    EmptyVariable,

    #[error("margin '{variable}' totals {actual}, expected {expected}")]
    TotalMismatch {
        variable: String,
        expected: f64,
        actual: f64,
    },

    #[error("no margins supplied")]
    NoMargins,

    #[error("no cases supplied")]
    NoCases,

    #[error("no cases remain in the raking universe after missing-value handling")]
    EmptyUniverse,

    #[error("margin variable '{variable}' is not a column of the survey frame")]
    UnknownVariable { variable: String },

    #[error("margin variable '{variable}' is supplied more than once")]
    DuplicateVariable { variable: String },

    #[error("case id '{id}' appears more than once")]
    DuplicateCase { id: String },

    #[error("case '{case_id}' has category '{category}' on '{variable}', which the margin does not define")]
    UnknownCategory {
        variable: String,
        category: String,
        case_id: String,
    },

    #[error("case '{case_id}' has {actual} categories, frame declares {expected} variables")]
    CategoryArity {
        case_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("case '{case_id}' has {actual} items, frame declares {expected}")]
    ItemArity {
        case_id: String,
        expected: usize,
        actual: usize,
    },

    #[error("case '{case_id}' item {index} = {value} is outside {min}..={max}")]
    ItemOutOfRange {
        case_id: String,
        index: usize,
        value: u32,
        min: u32,
        max: u32,
    },

    #[error("invalid item scale {min}..={max}")]
    InvalidItemScale { min: u32, max: u32 },

    #[error("case '{case_id}' has invalid weight {weight} (must be finite and >= 0)")]
    InvalidWeight { case_id: String, weight: f64 },

    #[error("case '{case_id}' has no weight and is not listed as excluded")]
    MissingWeight { case_id: String },

    #[error("invalid tolerance {tolerance} (must be finite and > 0)")]
    InvalidTolerance { tolerance: f64 },

    #[error("max_iterations must be >= 1")]
    InvalidIterations,
}

/// Errors produced by a raking run or by applying its weights.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RakeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(
        "category '{category}' of '{variable}' has target {target} but no weighted sample mass; it cannot be raked"
    )]
    ZeroCell {
        variable: String,
        category: String,
        target: f64,
    },

    #[error(
        "raking did not converge after {iterations} passes: worst margin '{variable}' category '{category}' deviates by {deviation:e} (tolerance {tolerance:e})"
    )]
    Convergence {
        iterations: usize,
        variable: String,
        category: String,
        deviation: f64,
        tolerance: f64,
    },

    #[error("raking cancelled after {passes} completed passes")]
    Cancelled { passes: usize },
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<RakeError> for AppError {
    fn from(err: RakeError) -> Self {
        let exit_code = match &err {
            RakeError::Config(ConfigError::NoCases | ConfigError::EmptyUniverse) => 3,
            RakeError::Config(_) => 2,
            RakeError::ZeroCell { .. } | RakeError::Convergence { .. } | RakeError::Cancelled { .. } => 4,
        };
        AppError::new(exit_code, err.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        RakeError::from(err).into()
    }
}
