//! Abstract point-table input.
//!
//! The correlation core only ever consumes ordered `(x, y)` rows; where
//! they come from (ImageJ results tables, custom text formats, direct
//! entry) is a collaborator's concern. [`TableSource`] implements the
//! common case: a whitespace/comma separated text table with comment and
//! header rows.
//!
//! Data rows are numbered from 0; comment and header rows are not counted.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorrError, Result};

/// Zero-based selection of data rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSelect {
    /// Every data row, in file order.
    All,
    /// Half-open range `[start, stop)`.
    Range { start: usize, stop: usize },
    /// Explicit row indices, returned in the given order.
    Rows(Vec<usize>),
}

/// Supplies ordered `(x, y)` rows for a source identifier.
pub trait PositionSource {
    /// Read the selected rows, taking x and y from `xy_columns`.
    ///
    /// Negative column indices count from the end of the row, as in the
    /// table formats this convention comes from.
    fn positions(
        &self,
        id: &str,
        rows: &RowSelect,
        xy_columns: [isize; 2],
    ) -> Result<Vec<[f64; 2]>>;
}

/// Text-table position source rooted at a directory.
///
/// Source identifiers are file paths relative to the root.
#[derive(Debug, Clone)]
pub struct TableSource {
    root: PathBuf,
}

impl TableSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Parse table text: `#`-comments and rows whose selected columns do
    /// not parse as numbers (headers) are skipped and not counted.
    pub fn parse(text: &str, rows: &RowSelect, xy_columns: [isize; 2]) -> Result<Vec<[f64; 2]>> {
        let data: Vec<[f64; 2]> = text
            .lines()
            .filter_map(|line| parse_data_row(line, xy_columns))
            .collect();

        let pick = |i: usize| -> Result<[f64; 2]> {
            data.get(i).copied().ok_or_else(|| {
                CorrError::Source(format!("row {} out of range ({} data rows)", i, data.len()))
            })
        };
        match rows {
            RowSelect::All => Ok(data),
            RowSelect::Range { start, stop } => (*start..*stop).map(pick).collect(),
            RowSelect::Rows(indices) => indices.iter().map(|&i| pick(i)).collect(),
        }
    }
}

impl PositionSource for TableSource {
    fn positions(
        &self,
        id: &str,
        rows: &RowSelect,
        xy_columns: [isize; 2],
    ) -> Result<Vec<[f64; 2]>> {
        let path = self.root.join(id);
        let text = read_table(&path)?;
        Self::parse(&text, rows, xy_columns)
    }
}

/// Read a table file into memory.
pub fn read_table(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| CorrError::Source(format!("{}: {}", path.display(), e)))
}

fn parse_data_row(line: &str, xy_columns: [isize; 2]) -> Option<[f64; 2]> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = trimmed
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect();

    let column = |idx: isize| -> Option<&str> {
        let n = fields.len() as isize;
        let i = if idx < 0 { n + idx } else { idx };
        if (0..n).contains(&i) {
            Some(fields[i as usize])
        } else {
            None
        }
    };
    let x: f64 = column(xy_columns[0])?.parse().ok()?;
    let y: f64 = column(xy_columns[1])?.parse().ok()?;
    Some([x, y])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# ImageJ point selections
 # comment with leading blank
label x_px y_px area
m1 10.0 20.0 3
m2 11.5 21.5 3
m3 13.0 23.0 4
m4 14.5 24.5 4
";

    #[test]
    fn comments_and_header_are_not_counted() {
        let pts = TableSource::parse(TABLE, &RowSelect::All, [1, 2]).unwrap();
        assert_eq!(
            pts,
            vec![[10.0, 20.0], [11.5, 21.5], [13.0, 23.0], [14.5, 24.5]]
        );
    }

    #[test]
    fn range_selects_data_rows_from_zero() {
        let pts =
            TableSource::parse(TABLE, &RowSelect::Range { start: 1, stop: 3 }, [1, 2]).unwrap();
        assert_eq!(pts, vec![[11.5, 21.5], [13.0, 23.0]]);
    }

    #[test]
    fn explicit_rows_keep_requested_order() {
        let pts = TableSource::parse(TABLE, &RowSelect::Rows(vec![3, 0]), [1, 2]).unwrap();
        assert_eq!(pts, vec![[14.5, 24.5], [10.0, 20.0]]);
    }

    #[test]
    fn negative_columns_count_from_row_end() {
        let pts = TableSource::parse(TABLE, &RowSelect::Rows(vec![0]), [-3, -2]).unwrap();
        assert_eq!(pts, vec![[10.0, 20.0]]);
    }

    #[test]
    fn out_of_range_row_is_a_source_error() {
        let err =
            TableSource::parse(TABLE, &RowSelect::Range { start: 3, stop: 6 }, [1, 2]).unwrap_err();
        assert!(matches!(err, CorrError::Source(_)));
    }

    #[test]
    fn comma_separated_tables_parse_too() {
        let text = "x,y\n1.0,2.0\n3.0,4.0\n";
        let pts = TableSource::parse(text, &RowSelect::All, [0, 1]).unwrap();
        assert_eq!(pts, vec![[1.0, 2.0], [3.0, 4.0]]);
    }
}
