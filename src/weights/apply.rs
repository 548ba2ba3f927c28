//! Apply raking weights to raw item scores.
//!
//! Every weighted item is `raw_item × weight`, so for each case
//! `weighted_total = weight × unweighted_total` up to rounding.

use std::collections::{HashMap, HashSet};

use crate::domain::{SurveyFrame, WeightVector, WeightedCase, WeightedSummary};
use crate::error::{ConfigError, RakeError};

/// Combine each weighted case of `frame` with its raw items.
///
/// Cases listed in [`WeightVector::excluded`] are skipped; any other case
/// without a weight is an error.
pub fn apply_weights(frame: &SurveyFrame, weights: &WeightVector) -> Result<Vec<WeightedCase>, RakeError> {
    let lookup: HashMap<&str, f64> = weights.iter().map(|w| (w.id.as_str(), w.weight)).collect();
    let excluded: HashSet<&str> = weights.excluded().iter().map(String::as_str).collect();

    let mut out = Vec::with_capacity(weights.len());
    for case in frame.cases() {
        let Some(&weight) = lookup.get(case.id.as_str()) else {
            if excluded.contains(case.id.as_str()) {
                continue;
            }
            return Err(ConfigError::MissingWeight {
                case_id: case.id.clone(),
            }
            .into());
        };
        out.push(weigh(&case.id, &case.items, weight));
    }
    Ok(out)
}

fn weigh(id: &str, items: &[u32], weight: f64) -> WeightedCase {
    let weighted_items: Vec<f64> = items.iter().map(|&v| f64::from(v) * weight).collect();
    let weighted_total = weighted_items.iter().sum();
    WeightedCase {
        id: id.to_string(),
        weight,
        raw_items: items.to_vec(),
        weighted_items,
        unweighted_total: items.iter().map(|&v| u64::from(v)).sum(),
        weighted_total,
    }
}

/// Aggregate item scores before and after weighting.
///
/// Weighted means divide by the weight sum. When every weight is zero the
/// weighted means are reported as 0 and `weighted_n` is 0.
pub fn summarize(cases: &[WeightedCase]) -> WeightedSummary {
    let n_items = cases.first().map_or(0, |c| c.raw_items.len());
    let n_cases = cases.len();
    let weighted_n: f64 = cases.iter().map(|c| c.weight).sum();

    let mut raw_sums = vec![0.0; n_items];
    let mut weighted_sums = vec![0.0; n_items];
    let mut raw_total = 0.0;
    let mut weighted_total = 0.0;
    for c in cases {
        for (i, (&raw, &w)) in c.raw_items.iter().zip(&c.weighted_items).enumerate().take(n_items) {
            raw_sums[i] += f64::from(raw);
            weighted_sums[i] += w;
        }
        raw_total += c.unweighted_total as f64;
        weighted_total += c.weighted_total;
    }

    let mean = |sum: f64, denom: f64| if denom > 0.0 { sum / denom } else { 0.0 };
    WeightedSummary {
        n_cases,
        weighted_n,
        item_means_raw: raw_sums.iter().map(|&s| mean(s, n_cases as f64)).collect(),
        item_means_weighted: weighted_sums.iter().map(|&s| mean(s, weighted_n)).collect(),
        total_mean_raw: mean(raw_total, n_cases as f64),
        total_mean_weighted: mean(weighted_total, weighted_n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Case, CategoryTable, ItemScale, MarginSpec, MissingPolicy};
    use crate::rake::{RakeOptions, rake};

    fn frame() -> SurveyFrame {
        let rows: [(&str, Option<&str>, [u32; 3]); 5] = [
            ("r1", Some("A"), [4, 3, 2]),
            ("r2", Some("A"), [1, 0, 4]),
            ("r3", Some("B"), [2, 2, 2]),
            ("r4", Some("B"), [0, 1, 3]),
            ("r5", None, [3, 3, 3]),
        ];
        let cases = rows
            .iter()
            .map(|(id, g, items)| Case {
                id: id.to_string(),
                categories: vec![g.map(str::to_string)],
                items: items.to_vec(),
            })
            .collect();
        SurveyFrame::new(
            vec!["gender".to_string()],
            vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
            ItemScale::default(),
            cases,
        )
        .unwrap()
    }

    fn margins() -> Vec<MarginSpec> {
        vec![MarginSpec::new("gender", CategoryTable::from_counts([("A", 3.0), ("B", 1.0)]).unwrap(), 4.0).unwrap()]
    }

    #[test]
    fn weighted_total_is_weight_times_unweighted_total() {
        let f = frame();
        let weights = rake(&f, &margins(), &RakeOptions::default()).unwrap();
        let weighted = apply_weights(&f, &weights).unwrap();

        // r5 is excluded under the default missing policy.
        assert_eq!(weighted.len(), 4);
        for wc in &weighted {
            let expected = wc.weight * wc.unweighted_total as f64;
            assert!((wc.weighted_total - expected).abs() < 1e-9, "{}: {} vs {expected}", wc.id, wc.weighted_total);
            for (raw, w) in wc.raw_items.iter().zip(&wc.weighted_items) {
                assert!((f64::from(*raw) * wc.weight - w).abs() < 1e-12);
            }
        }

        let r1 = &weighted[0];
        assert_eq!(r1.id, "r1");
        assert_eq!(r1.unweighted_total, 9);
        assert!((r1.weight - 1.5).abs() < 1e-6);
        assert!((r1.weighted_total - 13.5).abs() < 1e-5);
    }

    #[test]
    fn raw_inputs_are_untouched() {
        let f = frame();
        let before = f.clone();
        let weights = rake(&f, &margins(), &RakeOptions::default()).unwrap();
        let _ = apply_weights(&f, &weights).unwrap();
        assert_eq!(f, before);
    }

    #[test]
    fn unit_weight_cases_are_kept() {
        let f = frame();
        let options = RakeOptions {
            missing: MissingPolicy::UnitWeight,
            ..RakeOptions::default()
        };
        let weights = rake(&f, &margins(), &options).unwrap();
        let weighted = apply_weights(&f, &weights).unwrap();
        assert_eq!(weighted.len(), 5);
        assert_eq!(weighted[4].weight, 1.0);
        assert_eq!(weighted[4].weighted_total, 9.0);
    }

    #[test]
    fn case_without_weight_is_an_error() {
        let f = frame();
        let other = SurveyFrame::new(
            vec!["gender".to_string()],
            vec!["q1".to_string(), "q2".to_string(), "q3".to_string()],
            ItemScale::default(),
            f.cases()[..4].to_vec(),
        )
        .unwrap();
        let weights = rake(&other, &margins(), &RakeOptions::default()).unwrap();
        let err = apply_weights(&f, &weights).unwrap_err();
        assert_eq!(
            err,
            RakeError::Config(ConfigError::MissingWeight {
                case_id: "r5".to_string()
            })
        );
    }

    #[test]
    fn summary_shifts_means_toward_up_weighted_cases() {
        let f = frame();
        let weights = rake(&f, &margins(), &RakeOptions::default()).unwrap();
        let summary = summarize(&apply_weights(&f, &weights).unwrap());

        assert_eq!(summary.n_cases, 4);
        assert!((summary.weighted_n - 4.0).abs() < 1e-6);
        // q1 raw: (4+1+2+0)/4; weighted: (1.5*5 + 0.5*2)/4.
        assert!((summary.item_means_raw[0] - 1.75).abs() < 1e-12);
        assert!((summary.item_means_weighted[0] - 2.125).abs() < 1e-6);
        // Totals: raw 9,5,6,4 -> 6.0; weighted (1.5*14 + 0.5*10)/4 = 6.5.
        assert!((summary.total_mean_raw - 6.0).abs() < 1e-12);
        assert!((summary.total_mean_weighted - 6.5).abs() < 1e-6);
    }

    #[test]
    fn summary_of_nothing_is_zero() {
        let s = summarize(&[]);
        assert_eq!(s.n_cases, 0);
        assert_eq!(s.weighted_n, 0.0);
        assert!(s.item_means_raw.is_empty());
        assert_eq!(s.total_mean_weighted, 0.0);
    }
}
