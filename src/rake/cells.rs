//! Cell materialization.
//!
//! A cell is one combination of categories across all margin variables. The
//! engine rakes cell weights rather than case weights: every case in a cell
//! shares the same multiplier, so the per-pass work scales with the number of
//! distinct cells instead of the number of cases.
//!
//! Cells are numbered in lexicographic order of their category codes, which
//! keeps the summation order (and therefore the floating-point result)
//! identical across runs.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{MarginSpec, SurveyFrame};
use crate::error::ConfigError;

/// A margin resolved against a frame: column index plus dense category codes.
#[derive(Debug, Clone)]
pub(crate) struct EncodedMargin {
    pub variable: String,
    /// Column of the variable in the frame.
    pub column: usize,
    /// Category labels; the position is the category code.
    pub categories: Vec<String>,
    /// Target count per category code.
    pub targets: Vec<f64>,
}

impl EncodedMargin {
    pub fn encode(frame: &SurveyFrame, margin: &MarginSpec) -> Result<Self, ConfigError> {
        let column = frame
            .variable_index(margin.variable())
            .ok_or_else(|| ConfigError::UnknownVariable {
                variable: margin.variable().to_string(),
            })?;
        let (categories, targets) = margin
            .targets()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .unzip();
        Ok(Self {
            variable: margin.variable().to_string(),
            column,
            categories,
            targets,
        })
    }

    pub fn total(&self) -> f64 {
        self.targets.iter().sum()
    }

    pub fn scale_targets(&mut self, factor: f64) {
        for t in &mut self.targets {
            *t *= factor;
        }
    }
}

/// Distinct cells with their case counts, plus the case → cell mapping.
#[derive(Debug, Clone)]
pub(crate) struct CellTable {
    n_margins: usize,
    /// Row-major `[cell][margin]` category codes.
    codes: Vec<usize>,
    /// Number of cases in each cell.
    counts: Vec<f64>,
    /// Cell of each frame case; `None` when the case has a missing value.
    case_cells: Vec<Option<usize>>,
}

impl CellTable {
    /// Group the frame's cases into cells.
    ///
    /// Every non-missing category must be defined by its margin. Cases with a
    /// missing value on any margin variable are left unassigned.
    pub fn build(frame: &SurveyFrame, margins: &[EncodedMargin]) -> Result<Self, ConfigError> {
        let lookups: Vec<HashMap<&str, usize>> = margins
            .iter()
            .map(|m| {
                m.categories
                    .iter()
                    .enumerate()
                    .map(|(code, label)| (label.as_str(), code))
                    .collect()
            })
            .collect();

        let mut case_codes: Vec<Option<Vec<usize>>> = Vec::with_capacity(frame.len());
        for case in frame.cases() {
            let mut codes = Vec::with_capacity(margins.len());
            let mut complete = true;
            for (m, margin) in margins.iter().enumerate() {
                match case.categories[margin.column].as_deref() {
                    Some(label) => {
                        let code = lookups[m].get(label).copied().ok_or_else(|| ConfigError::UnknownCategory {
                            variable: margin.variable.clone(),
                            category: label.to_string(),
                            case_id: case.id.clone(),
                        })?;
                        codes.push(code);
                    }
                    None => complete = false,
                }
            }
            case_codes.push(if complete { Some(codes) } else { None });
        }

        let mut distinct: BTreeMap<&[usize], f64> = BTreeMap::new();
        for codes in case_codes.iter().flatten() {
            *distinct.entry(codes.as_slice()).or_insert(0.0) += 1.0;
        }

        let index: HashMap<&[usize], usize> = distinct.keys().enumerate().map(|(i, k)| (*k, i)).collect();
        let mut flat = Vec::with_capacity(distinct.len() * margins.len());
        let mut counts = Vec::with_capacity(distinct.len());
        for (codes, count) in &distinct {
            flat.extend_from_slice(codes);
            counts.push(*count);
        }

        let case_cells = case_codes
            .iter()
            .map(|codes| codes.as_ref().and_then(|c| index.get(c.as_slice()).copied()))
            .collect();

        Ok(Self {
            n_margins: margins.len(),
            codes: flat,
            counts,
            case_cells,
        })
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Category code of `cell` on margin `margin`.
    pub fn code(&self, cell: usize, margin: usize) -> usize {
        self.codes[cell * self.n_margins + margin]
    }

    pub fn count(&self, cell: usize) -> f64 {
        self.counts[cell]
    }

    pub fn case_cell(&self, case: usize) -> Option<usize> {
        self.case_cells[case]
    }

    /// Number of cases assigned to a cell (the raking universe).
    pub fn universe(&self) -> f64 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Case, CategoryTable, ItemScale};

    fn frame(rows: &[(&str, Option<&str>, Option<&str>)]) -> SurveyFrame {
        let cases = rows
            .iter()
            .map(|(id, g, r)| Case {
                id: id.to_string(),
                categories: vec![g.map(str::to_string), r.map(str::to_string)],
                items: vec![],
            })
            .collect();
        SurveyFrame::new(
            vec!["gender".to_string(), "region".to_string()],
            vec![],
            ItemScale::default(),
            cases,
        )
        .unwrap()
    }

    fn margin(variable: &str, cats: &[(&str, f64)]) -> EncodedMargin {
        let table = CategoryTable::from_counts(cats.iter().map(|(k, v)| (*k, *v))).unwrap();
        let spec = MarginSpec::from_table(variable, table).unwrap();
        EncodedMargin::encode(
            &frame(&[("x", Some("f"), Some("n"))]),
            &spec,
        )
        .unwrap()
    }

    #[test]
    fn cases_sharing_categories_share_a_cell() {
        let f = frame(&[
            ("1", Some("m"), Some("s")),
            ("2", Some("f"), Some("n")),
            ("3", Some("m"), Some("s")),
            ("4", Some("f"), None),
        ]);
        let margins = vec![
            margin("gender", &[("f", 2.0), ("m", 2.0)]),
            margin("region", &[("n", 2.0), ("s", 2.0)]),
        ];
        let cells = CellTable::build(&f, &margins).unwrap();

        assert_eq!(cells.len(), 2);
        // (f, n) sorts before (m, s).
        assert_eq!(cells.code(0, 0), 0);
        assert_eq!(cells.code(1, 1), 1);
        assert_eq!(cells.count(1), 2.0);
        assert_eq!(cells.case_cell(0), Some(1));
        assert_eq!(cells.case_cell(1), Some(0));
        assert_eq!(cells.case_cell(3), None);
        assert_eq!(cells.universe(), 3.0);
    }

    #[test]
    fn unknown_category_is_reported_with_case() {
        let f = frame(&[("1", Some("x"), Some("n"))]);
        let margins = vec![margin("gender", &[("f", 1.0), ("m", 1.0)])];
        let err = CellTable::build(&f, &margins).unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnknownCategory {
                variable: "gender".to_string(),
                category: "x".to_string(),
                case_id: "1".to_string(),
            }
        );
    }
}
