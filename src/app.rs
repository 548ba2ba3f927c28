//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and initializes logging
//! - rakes cases to census targets
//! - re-applies saved weights
//! - generates synthetic surveys
//! - prints reports and writes optional exports

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{ApplyArgs, Command, RunArgs, SimulateArgs};
use crate::data::{SimulationConfig, generate_survey};
use crate::domain::{ItemScale, RunConfig};
use crate::error::AppError;
use crate::rake::{RakeOptions, weight_stats};

pub mod pipeline;

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "survey_rake=info";

/// Entry point for the `rake` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_logging();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Apply(args) => handle_apply(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

// Logs go to stderr so reports on stdout stay pipeable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // A second init (tests, embedding) keeps the existing subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let run = pipeline::run_rake(&config)?;

    println!(
        "{}",
        crate::report::format_run_summary(&run.ingest, &run.weights, &config)
    );
    println!("{}", crate::report::format_margins(&run.comparisons));
    println!("{}", crate::report::format_weight_stats(run.stats.as_ref()));
    println!(
        "{}",
        crate::report::format_item_means(run.ingest.frame.items(), &run.summary)
    );

    if let Some(path) = &config.export_cases {
        crate::io::export::write_weighted_csv(path, run.ingest.frame.items(), &run.weighted)?;
        info!(event = "export_written", path = %path.display(), rows = run.weighted.len());
    }
    if let Some(path) = &config.export_weights {
        crate::io::weights::write_weights_json(path, &run.weights, run.ingest.frame.variables(), &config.options)?;
        info!(event = "weights_written", path = %path.display(), weights = run.weights.len());
    }

    Ok(())
}

fn handle_apply(args: ApplyArgs) -> Result<(), AppError> {
    let saved = crate::io::weights::read_weights_json(&args.weights)?;
    let variables = if args.vars.is_empty() {
        saved.variables.clone()
    } else {
        args.vars.clone()
    };
    let scale = ItemScale::new(args.item_min, args.item_max)?;
    let ingest = crate::io::ingest::load_cases(&args.cases, &variables, &args.items_prefix, scale)?;

    let weighted = crate::weights::apply_weights(&ingest.frame, &saved.weights)?;
    let summary = crate::weights::summarize(&weighted);

    println!(
        "Applied weights from {} (generated {}) to {} cases.\n",
        args.weights.display(),
        saved.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        weighted.len()
    );
    println!(
        "{}",
        crate::report::format_weight_stats(weight_stats(&saved.weights).as_ref())
    );
    println!("{}", crate::report::format_item_means(ingest.frame.items(), &summary));

    if let Some(path) = &args.export {
        crate::io::export::write_weighted_csv(path, ingest.frame.items(), &weighted)?;
        info!(event = "export_written", path = %path.display(), rows = weighted.len());
    }
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = SimulationConfig {
        n: args.n,
        seed: args.seed,
        items: args.items,
        scale: ItemScale::default(),
        missing_rate: args.missing_rate,
    };
    let survey = generate_survey(&config)?;

    crate::io::export::write_cases_csv(&args.out, &survey.frame)?;
    crate::io::targets::write_targets_csv(&args.targets_out, &survey.targets)?;
    info!(
        event = "survey_simulated",
        cases = survey.frame.len(),
        seed = config.seed,
        out = %args.out.display(),
        targets = %args.targets_out.display()
    );
    println!(
        "Wrote {} cases to {} and {} targets to {}.",
        survey.frame.len(),
        args.out.display(),
        survey.targets.len(),
        args.targets_out.display()
    );
    Ok(())
}

/// Build a validated `RunConfig` from `rake run` flags.
pub fn run_config_from_args(args: &RunArgs) -> Result<RunConfig, AppError> {
    let item_scale = ItemScale::new(args.item_min, args.item_max)?;
    Ok(RunConfig {
        cases_path: args.cases.clone(),
        targets_path: args.targets.clone(),
        variables: args.vars.clone(),
        items_prefix: args.items_prefix.clone(),
        item_scale,
        target_kind: args.target_kind,
        options: RakeOptions {
            tolerance: args.tolerance,
            max_iterations: args.max_iterations,
            missing: args.missing,
            totals: args.totals,
        },
        export_cases: args.export.clone(),
        export_weights: args.export_weights.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;

    #[test]
    fn run_config_carries_flags() {
        let cli = Cli::parse_from([
            "rake",
            "run",
            "--cases",
            "c.csv",
            "--targets",
            "t.csv",
            "--vars",
            "gender",
            "--tolerance",
            "1e-9",
            "--item-max",
            "6",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = run_config_from_args(&args).unwrap();
        assert_eq!(config.options.tolerance, 1e-9);
        assert_eq!(config.item_scale, ItemScale::new(0, 6).unwrap());
        assert_eq!(config.variables, vec!["gender".to_string()]);
    }

    #[test]
    fn inverted_item_scale_is_a_config_error() {
        let cli = Cli::parse_from([
            "rake", "run", "--cases", "c.csv", "--targets", "t.csv", "--vars", "gender", "--item-min", "5",
        ]);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(run_config_from_args(&args).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn simulate_then_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let cases = dir.path().join("cases.csv");
        let targets = dir.path().join("targets.csv");
        handle_simulate(SimulateArgs {
            out: cases.clone(),
            targets_out: targets.clone(),
            n: 200,
            seed: 7,
            items: 5,
            missing_rate: 0.0,
        })
        .unwrap();

        let weights_path = dir.path().join("weights.json");
        let export_path = dir.path().join("weighted.csv");
        let args = RunArgs {
            cases: cases.clone(),
            targets,
            vars: vec!["gender".to_string(), "education".to_string(), "region".to_string()],
            items_prefix: "q".to_string(),
            item_min: 0,
            item_max: 4,
            tolerance: 1e-7,
            max_iterations: 50,
            missing: Default::default(),
            totals: Default::default(),
            target_kind: Default::default(),
            export: Some(export_path.clone()),
            export_weights: Some(weights_path.clone()),
        };
        handle_run(args).unwrap();
        assert!(export_path.exists());

        // Re-applying the saved weights to the same cases reproduces the export.
        let reapplied = dir.path().join("reapplied.csv");
        handle_apply(ApplyArgs {
            cases,
            weights: weights_path,
            vars: Vec::new(),
            items_prefix: "q".to_string(),
            item_min: 0,
            item_max: 4,
            export: Some(reapplied.clone()),
        })
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&export_path).unwrap(),
            std::fs::read_to_string(&reapplied).unwrap()
        );
    }
}
