//! Tolerance-aware structural equality between produced and expected tables.

use serde::{Deserialize, Serialize};

use crate::core::table::Table;

/// Normalization policy applied during comparison.
///
/// Tolerance and ordering are deliberately configuration, not constants: the
/// right values depend on the document family being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComparePolicy {
    /// Two cells that both parse as f64 are equal within this tolerance.
    pub numeric_tolerance: f64,
    /// When false, rows are compared under a canonical sort instead of
    /// positionally.
    pub ordered_rows: bool,
}

impl Default for ComparePolicy {
    fn default() -> Self {
        Self {
            numeric_tolerance: 1e-9,
            ordered_rows: true,
        }
    }
}

/// One discrepancy between a produced and an expected table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CellDiff {
    ColumnsDiffer {
        produced: Vec<String>,
        expected: Vec<String>,
    },
    RowCountDiffers {
        produced: usize,
        expected: usize,
    },
    CellDiffers {
        row: usize,
        column: String,
        produced: String,
        expected: String,
    },
}

/// Every discrepancy found, not just the first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MismatchReport {
    pub diffs: Vec<CellDiff>,
}

impl MismatchReport {
    /// Render the report as plain text, one discrepancy per line.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.diffs.len());
        for diff in &self.diffs {
            match diff {
                CellDiff::ColumnsDiffer { produced, expected } => lines.push(format!(
                    "columns differ: produced [{}], expected [{}]",
                    produced.join(", "),
                    expected.join(", ")
                )),
                CellDiff::RowCountDiffers { produced, expected } => lines.push(format!(
                    "row count differs: produced {produced}, expected {expected}"
                )),
                CellDiff::CellDiffers {
                    row,
                    column,
                    produced,
                    expected,
                } => lines.push(format!(
                    "row {row}, column '{column}': produced '{produced}', expected '{expected}'"
                )),
            }
        }
        lines.join("\n")
    }
}

/// Outcome of comparing a produced table against the expected one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ComparisonResult {
    Match,
    Mismatch { report: MismatchReport },
}

impl ComparisonResult {
    pub fn is_match(&self) -> bool {
        matches!(self, ComparisonResult::Match)
    }
}

/// Compare two tables structurally under `policy`.
///
/// Column names must match name-for-name in order. Cells are
/// whitespace-trimmed; cells that both parse as f64 compare within
/// `policy.numeric_tolerance`. When row counts differ, the common prefix is
/// still compared cell-by-cell so the report stays exhaustive.
pub fn compare(produced: &Table, expected: &Table, policy: &ComparePolicy) -> ComparisonResult {
    let mut diffs = Vec::new();

    let produced_cols = trimmed(&produced.columns);
    let expected_cols = trimmed(&expected.columns);
    if produced_cols != expected_cols {
        diffs.push(CellDiff::ColumnsDiffer {
            produced: produced_cols,
            expected: expected_cols,
        });
        return ComparisonResult::Mismatch {
            report: MismatchReport { diffs },
        };
    }

    let mut produced_rows: Vec<Vec<String>> = produced.rows.iter().map(|r| trimmed(r)).collect();
    let mut expected_rows: Vec<Vec<String>> = expected.rows.iter().map(|r| trimmed(r)).collect();
    if !policy.ordered_rows {
        produced_rows.sort();
        expected_rows.sort();
    }

    if produced_rows.len() != expected_rows.len() {
        diffs.push(CellDiff::RowCountDiffers {
            produced: produced_rows.len(),
            expected: expected_rows.len(),
        });
    }

    for (row_idx, (prow, erow)) in produced_rows.iter().zip(expected_rows.iter()).enumerate() {
        for (col_idx, column) in expected_cols.iter().enumerate() {
            let pcell = &prow[col_idx];
            let ecell = &erow[col_idx];
            if !cells_equal(pcell, ecell, policy.numeric_tolerance) {
                diffs.push(CellDiff::CellDiffers {
                    row: row_idx + 1,
                    column: column.clone(),
                    produced: pcell.clone(),
                    expected: ecell.clone(),
                });
            }
        }
    }

    if diffs.is_empty() {
        ComparisonResult::Match
    } else {
        ComparisonResult::Mismatch {
            report: MismatchReport { diffs },
        }
    }
}

fn trimmed(cells: &[String]) -> Vec<String> {
    cells.iter().map(|c| c.trim().to_string()).collect()
}

fn cells_equal(produced: &str, expected: &str, tolerance: f64) -> bool {
    if produced == expected {
        return true;
    }
    match (produced.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(p), Ok(e)) => {
            if p.is_nan() && e.is_nan() {
                return true;
            }
            (p - e).abs() <= tolerance
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[&str]]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
        .expect("well-formed table")
    }

    #[test]
    fn identical_tables_match() {
        let t = table(&["a", "b"], &[&["1", "x"], &["2", "y"]]);
        assert!(compare(&t, &t, &ComparePolicy::default()).is_match());
    }

    #[test]
    fn whitespace_is_trimmed_before_comparison() {
        let produced = table(&["a"], &[&[" 1 "]]);
        let expected = table(&["a"], &[&["1"]]);
        assert!(compare(&produced, &expected, &ComparePolicy::default()).is_match());
    }

    #[test]
    fn numeric_cells_compare_within_tolerance() {
        let produced = table(&["amt"], &[&["1.50"]]);
        let expected = table(&["amt"], &[&["1.5"]]);
        assert!(compare(&produced, &expected, &ComparePolicy::default()).is_match());

        let produced = table(&["amt"], &[&["1.5001"]]);
        let policy = ComparePolicy {
            numeric_tolerance: 0.01,
            ordered_rows: true,
        };
        assert!(compare(&produced, &expected, &policy).is_match());
        assert!(!compare(&produced, &expected, &ComparePolicy::default()).is_match());
    }

    #[test]
    fn column_rename_is_a_single_diff() {
        let produced = table(&["a", "b"], &[&["1", "2"]]);
        let expected = table(&["a", "c"], &[&["1", "2"]]);
        match compare(&produced, &expected, &ComparePolicy::default()) {
            ComparisonResult::Mismatch { report } => {
                assert_eq!(report.diffs.len(), 1);
                assert!(matches!(report.diffs[0], CellDiff::ColumnsDiffer { .. }));
            }
            ComparisonResult::Match => panic!("expected mismatch"),
        }
    }

    #[test]
    fn missing_row_is_exactly_one_row_count_diff() {
        let produced = table(&["a", "b"], &[&["1", "x"], &["2", "y"]]);
        let expected = table(&["a", "b"], &[&["1", "x"], &["2", "y"], &["3", "z"]]);
        match compare(&produced, &expected, &ComparePolicy::default()) {
            ComparisonResult::Mismatch { report } => {
                assert_eq!(
                    report.diffs,
                    vec![CellDiff::RowCountDiffers {
                        produced: 2,
                        expected: 3
                    }]
                );
            }
            ComparisonResult::Match => panic!("expected mismatch"),
        }
    }

    #[test]
    fn every_differing_cell_is_enumerated() {
        let produced = table(&["a", "b"], &[&["1", "x"], &["9", "y"]]);
        let expected = table(&["a", "b"], &[&["1", "q"], &["2", "y"]]);
        match compare(&produced, &expected, &ComparePolicy::default()) {
            ComparisonResult::Mismatch { report } => {
                assert_eq!(report.diffs.len(), 2);
                let rendered = report.render();
                assert!(rendered.contains("row 1, column 'b'"));
                assert!(rendered.contains("row 2, column 'a'"));
            }
            ComparisonResult::Match => panic!("expected mismatch"),
        }
    }

    #[test]
    fn row_order_matters_unless_disabled() {
        let produced = table(&["a"], &[&["2"], &["1"]]);
        let expected = table(&["a"], &[&["1"], &["2"]]);
        assert!(!compare(&produced, &expected, &ComparePolicy::default()).is_match());

        let unordered = ComparePolicy {
            numeric_tolerance: 1e-9,
            ordered_rows: false,
        };
        assert!(compare(&produced, &expected, &unordered).is_match());
    }
}
