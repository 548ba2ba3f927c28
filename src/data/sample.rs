//! Synthetic survey generation.
//!
//! Respondents are drawn from a fixed census population, then kept with a
//! response propensity that favours women and the highly educated. The
//! resulting sample is skewed in a known direction, which makes it a useful
//! fixture for raking: the census shares are the targets, and the weights must
//! undo the skew.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Case, ItemScale, SurveyFrame};
use crate::error::AppError;
use crate::io::targets::TargetRow;

/// Census shares of the synthetic population, per raking variable.
pub const CENSUS: [(&str, &[(&str, f64)]); 3] = [
    ("gender", &[("f", 0.51), ("m", 0.49)]),
    ("education", &[("low", 0.35), ("mid", 0.40), ("high", 0.25)]),
    ("region", &[("north", 0.30), ("south", 0.45), ("west", 0.25)]),
];

/// Maximum draws per requested case before giving up.
const MAX_DRAWS_PER_CASE: usize = 100;

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub n: usize,
    pub seed: u64,
    pub items: usize,
    pub scale: ItemScale,
    /// Probability that a respondent's region is left blank.
    pub missing_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n: 400,
            seed: 42,
            items: 10,
            scale: ItemScale::default(),
            missing_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedSurvey {
    pub frame: SurveyFrame,
    pub targets: Vec<TargetRow>,
}

pub fn generate_survey(config: &SimulationConfig) -> Result<SimulatedSurvey, AppError> {
    if config.n == 0 {
        return Err(AppError::new(2, "Sample size must be > 0."));
    }
    if config.items == 0 {
        return Err(AppError::new(2, "Item count must be > 0."));
    }
    if !(0.0..1.0).contains(&config.missing_rate) {
        return Err(AppError::new(2, "Missing rate must be in [0, 1)."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let noise = Normal::new(0.0, 0.8).map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let mut cases = Vec::with_capacity(config.n);
    let mut draws = 0usize;
    while cases.len() < config.n {
        draws += 1;
        if draws > config.n * MAX_DRAWS_PER_CASE {
            return Err(AppError::new(4, "Response propensity too low to fill the sample."));
        }

        let picks: Vec<&str> = CENSUS.iter().map(|(_, cats)| draw_category(&mut rng, cats)).collect();
        if rng.r#gen::<f64>() >= response_propensity(&picks) {
            continue;
        }

        let level = trait_level(&picks);
        let span = f64::from(config.scale.max - config.scale.min);
        let items = (0..config.items)
            .map(|_| {
                let z = level + noise.sample(&mut rng);
                // Map the latent score onto the code range and clamp.
                let code = (f64::from(config.scale.min) + (z + 1.5) / 3.0 * span).round();
                code.clamp(f64::from(config.scale.min), f64::from(config.scale.max)) as u32
            })
            .collect();

        let mut categories: Vec<Option<String>> = picks.iter().map(|p| Some(p.to_string())).collect();
        if config.missing_rate > 0.0 && rng.r#gen::<f64>() < config.missing_rate {
            categories[2] = None;
        }

        cases.push(Case {
            id: format!("R{:05}", cases.len() + 1),
            categories,
            items,
        });
    }

    let variables = CENSUS.iter().map(|(v, _)| v.to_string()).collect();
    let items = (1..=config.items).map(|i| format!("q{i}")).collect();
    let frame = SurveyFrame::new(variables, items, config.scale, cases)?;

    Ok(SimulatedSurvey {
        frame,
        targets: census_targets(),
    })
}

/// Census shares as targets rows.
pub fn census_targets() -> Vec<TargetRow> {
    CENSUS
        .iter()
        .flat_map(|(variable, cats)| {
            cats.iter().map(move |(category, share)| TargetRow {
                variable: variable.to_string(),
                category: category.to_string(),
                value: *share,
            })
        })
        .collect()
}

fn draw_category<'a>(rng: &mut StdRng, cats: &[(&'a str, f64)]) -> &'a str {
    let roll: f64 = rng.r#gen();
    let mut acc = 0.0;
    for (label, share) in cats {
        acc += share;
        if roll < acc {
            return label;
        }
    }
    cats[cats.len() - 1].0
}

// Women and graduates answer surveys more often.
fn response_propensity(picks: &[&str]) -> f64 {
    let gender = if picks[0] == "f" { 0.9 } else { 0.6 };
    let education = match picks[1] {
        "high" => 1.0,
        "mid" => 0.7,
        _ => 0.4,
    };
    gender * education
}

// Latent attitude that differs between groups, so weighting moves item means.
fn trait_level(picks: &[&str]) -> f64 {
    let education = match picks[1] {
        "high" => 0.8,
        "mid" => 0.2,
        _ => -0.4,
    };
    let region = match picks[2] {
        "north" => 0.2,
        "west" => -0.1,
        _ => 0.0,
    };
    education + region
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::io::targets::build_margins;
    use crate::rake::{RakeOptions, rake};
    use crate::weights::{apply_weights, summarize};

    #[test]
    fn generation_is_deterministic_for_a_seed() {
        let config = SimulationConfig {
            n: 50,
            ..SimulationConfig::default()
        };
        let a = generate_survey(&config).unwrap();
        let b = generate_survey(&config).unwrap();
        assert_eq!(a.frame, b.frame);
        assert_eq!(a.frame.len(), 50);
        assert!(a.frame.cases().iter().all(|c| c.items.len() == 10));
    }

    #[test]
    fn sample_is_skewed_toward_high_education() {
        let survey = generate_survey(&SimulationConfig::default()).unwrap();
        let high = survey.frame.observed("education").unwrap().filter(|e| *e == "high").count();
        let share = high as f64 / survey.frame.len() as f64;
        assert!(share > 0.25, "expected over-representation, got {share}");
    }

    #[test]
    fn raking_undoes_the_skew() {
        let survey = generate_survey(&SimulationConfig::default()).unwrap();
        let frame = &survey.frame;
        let margins = build_margins(
            &survey.targets,
            frame.variables(),
            crate::domain::TargetKind::Proportion,
            frame.complete_count() as f64,
        )
        .unwrap();
        let weights = rake(frame, &margins, &RakeOptions::default()).unwrap();

        // High-education respondents are over-sampled; weighting restores the census share.
        let col = frame.variable_index("education").unwrap();
        let by_id: HashMap<&str, f64> = weights.iter().map(|w| (w.id.as_str(), w.weight)).collect();
        let high: f64 = frame
            .cases()
            .iter()
            .filter(|c| c.categories[col].as_deref() == Some("high"))
            .map(|c| by_id[c.id.as_str()])
            .sum();
        assert!((high / weights.total() - 0.25).abs() < 1e-6);

        // Down-weighting the high-scoring group lowers the mean total.
        let summary = summarize(&apply_weights(frame, &weights).unwrap());
        assert!(summary.total_mean_weighted < summary.total_mean_raw);
        assert!((summary.weighted_n - frame.len() as f64).abs() < 1e-6);
    }

    #[test]
    fn missing_rate_blanks_region() {
        let config = SimulationConfig {
            missing_rate: 0.2,
            ..SimulationConfig::default()
        };
        let survey = generate_survey(&config).unwrap();
        assert!(survey.frame.complete_count() < survey.frame.len());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let config = SimulationConfig {
            n: 0,
            ..SimulationConfig::default()
        };
        assert_eq!(generate_survey(&config).unwrap_err().exit_code(), 2);
    }
}
