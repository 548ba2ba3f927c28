//! Command-line parsing for the survey raking tool.
//!
//! Argument parsing and command dispatch stay separate from the raking code:
//! this module only describes flags; `app` turns them into a `RunConfig`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{MissingPolicy, TargetKind, TotalsPolicy};
use crate::rake::{DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rake", version, about = "Survey raking (iterative proportional fitting) to census margins")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rake a cases CSV to census targets, print diagnostics, and optionally export.
    Run(RunArgs),
    /// Apply previously saved weights to a cases CSV.
    Apply(ApplyArgs),
    /// Generate a synthetic, response-biased survey plus its census targets.
    Simulate(SimulateArgs),
}

/// Options for a raking run.
#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Respondent-level CSV (`id`, raking variables, item columns).
    #[arg(long, value_name = "CSV")]
    pub cases: PathBuf,

    /// Long-format targets CSV (`variable,category,value`).
    #[arg(long, value_name = "CSV")]
    pub targets: PathBuf,

    /// Raking variables, in raking order (comma-separated).
    #[arg(long, value_delimiter = ',', required = true)]
    pub vars: Vec<String>,

    /// Item columns are the headers starting with this prefix.
    #[arg(long, default_value = "q")]
    pub items_prefix: String,

    /// Smallest valid item code.
    #[arg(long, default_value_t = 0)]
    pub item_min: u32,

    /// Largest valid item code.
    #[arg(long, default_value_t = 4)]
    pub item_max: u32,

    /// Maximum relative margin deviation accepted as converged.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Maximum number of raking passes.
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Treatment of cases with a missing raking variable.
    #[arg(long, value_enum, default_value_t = MissingPolicy::Drop)]
    pub missing: MissingPolicy,

    /// Treatment of count targets whose totals disagree.
    #[arg(long, value_enum, default_value_t = TotalsPolicy::Strict)]
    pub totals: TotalsPolicy,

    /// Whether target values are proportions or counts.
    #[arg(long, value_enum, default_value_t = TargetKind::Proportion)]
    pub target_kind: TargetKind,

    /// Export weighted cases to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the weight vector to JSON.
    #[arg(long = "export-weights")]
    pub export_weights: Option<PathBuf>,
}

/// Options for applying saved weights.
#[derive(Debug, Parser, Clone)]
pub struct ApplyArgs {
    /// Respondent-level CSV.
    #[arg(long, value_name = "CSV")]
    pub cases: PathBuf,

    /// Weights JSON produced by `rake run --export-weights`.
    #[arg(long, value_name = "JSON")]
    pub weights: PathBuf,

    /// Raking variables to read (defaults to those recorded in the weights file).
    #[arg(long, value_delimiter = ',')]
    pub vars: Vec<String>,

    #[arg(long, default_value = "q")]
    pub items_prefix: String,

    #[arg(long, default_value_t = 0)]
    pub item_min: u32,

    #[arg(long, default_value_t = 4)]
    pub item_max: u32,

    /// Export weighted cases to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,
}

/// Options for synthetic survey generation.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// Output cases CSV.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    /// Output targets CSV (census shares).
    #[arg(long = "targets-out", value_name = "CSV")]
    pub targets_out: PathBuf,

    /// Number of respondents.
    #[arg(short = 'n', long, default_value_t = 400)]
    pub n: usize,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Number of Likert items per respondent.
    #[arg(long, default_value_t = 10)]
    pub items: usize,

    /// Probability that a respondent's region is left blank.
    #[arg(long, default_value_t = 0.0)]
    pub missing_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_args_parse_with_defaults() {
        let cli = Cli::parse_from([
            "rake",
            "run",
            "--cases",
            "c.csv",
            "--targets",
            "t.csv",
            "--vars",
            "gender,region",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.vars, vec!["gender".to_string(), "region".to_string()]);
        assert_eq!(args.max_iterations, 50);
        assert_eq!(args.missing, MissingPolicy::Drop);
        assert_eq!(args.target_kind, TargetKind::Proportion);
        assert!(args.export.is_none());
    }

    #[test]
    fn policies_parse_from_kebab_case() {
        let cli = Cli::parse_from([
            "rake",
            "run",
            "--cases",
            "c.csv",
            "--targets",
            "t.csv",
            "--vars",
            "gender",
            "--missing",
            "unit-weight",
            "--totals",
            "rescale",
            "--target-kind",
            "count",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.missing, MissingPolicy::UnitWeight);
        assert_eq!(args.totals, TotalsPolicy::Rescale);
        assert_eq!(args.target_kind, TargetKind::Count);
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
