//! Weighted category tallies.
//!
//! Summing `count × weight` per category is the only data-parallel step of a
//! raking pass. Cells are split into fixed-size chunks; each chunk produces a
//! partial tally and the partials are merged in chunk order. Because chunk
//! boundaries do not depend on the thread count, the parallel and sequential
//! paths return bit-identical sums.

use rayon::prelude::*;

use crate::rake::cells::CellTable;

/// Below this many cells the tally runs on the calling thread.
pub(crate) const PARALLEL_CELL_THRESHOLD: usize = 4096;

const CHUNK_CELLS: usize = 1024;

/// Weighted count per category code of `margin`.
pub(crate) fn weighted_counts(cells: &CellTable, weights: &[f64], margin: usize, n_categories: usize) -> Vec<f64> {
    let parallel = cells.len() >= PARALLEL_CELL_THRESHOLD;
    tally(cells, weights, margin, n_categories, parallel)
}

fn tally(cells: &CellTable, weights: &[f64], margin: usize, n_categories: usize, parallel: bool) -> Vec<f64> {
    let partial = |chunk: usize| -> Vec<f64> {
        let start = chunk * CHUNK_CELLS;
        let end = (start + CHUNK_CELLS).min(cells.len());
        let mut out = vec![0.0; n_categories];
        for cell in start..end {
            out[cells.code(cell, margin)] += cells.count(cell) * weights[cell];
        }
        out
    };

    let n_chunks = cells.len().div_ceil(CHUNK_CELLS);
    // Collecting into a Vec keeps chunk order; the merge below is the barrier
    // before any factor is computed.
    let partials: Vec<Vec<f64>> = if parallel {
        (0..n_chunks).into_par_iter().map(partial).collect()
    } else {
        (0..n_chunks).map(partial).collect()
    };

    let mut totals = vec![0.0; n_categories];
    for p in partials {
        for (t, v) in totals.iter_mut().zip(p) {
            *t += v;
        }
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Case, CategoryTable, ItemScale, MarginSpec, SurveyFrame};
    use crate::rake::cells::EncodedMargin;

    fn wide_frame(n: usize) -> (SurveyFrame, Vec<EncodedMargin>) {
        // Two variables with enough categories to create many distinct cells.
        let cases: Vec<Case> = (0..n)
            .map(|i| Case {
                id: format!("c{i}"),
                categories: vec![Some(format!("a{}", i % 97)), Some(format!("b{}", i % 89))],
                items: vec![],
            })
            .collect();
        let frame = SurveyFrame::new(
            vec!["a".to_string(), "b".to_string()],
            vec![],
            ItemScale::default(),
            cases,
        )
        .unwrap();
        let margins = ["a", "b"]
            .iter()
            .map(|v| {
                let table = CategoryTable::from_observations(frame.observed(v).unwrap()).unwrap();
                let spec = MarginSpec::from_table(*v, table).unwrap();
                EncodedMargin::encode(&frame, &spec).unwrap()
            })
            .collect();
        (frame, margins)
    }

    #[test]
    fn parallel_and_sequential_tallies_match_exactly() {
        let (frame, margins) = wide_frame(9000);
        let cells = CellTable::build(&frame, &margins).unwrap();
        assert!(cells.len() >= PARALLEL_CELL_THRESHOLD);

        let weights: Vec<f64> = (0..cells.len()).map(|i| 0.5 + (i % 13) as f64 * 0.173).collect();
        for (m, margin) in margins.iter().enumerate() {
            let seq = tally(&cells, &weights, m, margin.categories.len(), false);
            let par = tally(&cells, &weights, m, margin.categories.len(), true);
            assert_eq!(seq, par);
        }
    }

    #[test]
    fn unit_weights_reproduce_sample_counts() {
        let (frame, margins) = wide_frame(500);
        let cells = CellTable::build(&frame, &margins).unwrap();
        let weights = vec![1.0; cells.len()];
        let counts = weighted_counts(&cells, &weights, 0, margins[0].categories.len());
        for (code, label) in margins[0].categories.iter().enumerate() {
            let expected = frame.observed("a").unwrap().filter(|v| v == label).count() as f64;
            assert_eq!(counts[code], expected);
        }
    }
}
