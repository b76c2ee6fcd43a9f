//! Ordered tabular data exchanged between parsers, loaders, and the comparator.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// An ordered table: named columns plus rows of string cells.
///
/// Every row holds exactly `columns.len()` cells. Cells stay raw strings;
/// numeric interpretation is a comparison-time concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                bail!(
                    "row {} has {} cells, expected {}",
                    idx + 1,
                    row.len(),
                    columns.len()
                );
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// A table with no columns carries no schema and is treated as empty.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Parse a table from its JSON interchange form (`{columns, rows}`).
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let table: Table = serde_json::from_str(contents).context("parse table json")?;
        Table::new(table.columns, table.rows)
    }

    /// Parse a table from CSV with a header row (RFC 4180 quoting).
    pub fn from_csv_str(contents: &str) -> Result<Self> {
        let mut records = parse_csv(contents)?;
        if records.is_empty() {
            bail!("csv has no header row");
        }
        let columns = records.remove(0);
        Table::new(columns, records)
    }

    /// Load a table from disk, dispatching on extension (`.json` or `.csv`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read table {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let table = match ext {
            "json" => Table::from_json_str(&contents),
            "csv" => Table::from_csv_str(&contents),
            other => bail!("unsupported table extension '{other}' for {}", path.display()),
        };
        table.with_context(|| format!("load table {}", path.display()))
    }

    /// Render the table as CSV (header + rows), quoting only when needed.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, &self.columns);
        for row in &self.rows {
            push_record(&mut out, row);
        }
        out
    }
}

fn push_record(out: &mut String, cells: &[String]) {
    for (idx, cell) in cells.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        out.push_str(&quote_field(cell));
    }
    out.push('\n');
}

fn quote_field(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Minimal RFC 4180 reader: quoted fields, doubled-quote escapes, CRLF rows.
/// Only needs to understand reference tables, not arbitrary dialects.
fn parse_csv(contents: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = contents.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' => {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        in_quotes = false;
                    }
                }
                other => field.push(other),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => in_quotes = true,
            '"' => bail!("unexpected quote inside unquoted field (record {})", records.len() + 1),
            ',' => {
                record.push(std::mem::take(&mut field));
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            other => field.push(other),
        }
    }
    if in_quotes {
        bail!("unterminated quoted field (record {})", records.len() + 1);
    }
    // Final record without a trailing newline.
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_round_trips_with_quoting() {
        let table = Table::new(
            vec!["Date".to_string(), "Narration".to_string()],
            vec![vec!["01-08-2024".to_string(), "UPI, \"coffee\"".to_string()]],
        )
        .expect("table");

        let csv = table.to_csv_string();
        let parsed = Table::from_csv_str(&csv).expect("parse");
        assert_eq!(parsed, table);
    }

    #[test]
    fn csv_handles_crlf_and_trailing_newline() {
        let parsed = Table::from_csv_str("a,b\r\n1,2\r\n").expect("parse");
        assert_eq!(parsed.columns, vec!["a", "b"]);
        assert_eq!(parsed.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn csv_preserves_empty_cells() {
        let parsed = Table::from_csv_str("a,b,c\n1,,3\n").expect("parse");
        assert_eq!(
            parsed.rows,
            vec![vec!["1".to_string(), "".to_string(), "3".to_string()]]
        );
    }

    #[test]
    fn csv_without_header_is_rejected() {
        let err = Table::from_csv_str("").unwrap_err();
        assert!(err.to_string().contains("no header row"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Table::from_csv_str("a,b\n1\n").unwrap_err();
        assert!(err.to_string().contains("row 1 has 1 cells"));
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = Table::from_csv_str("a,b\n\"oops,2\n").unwrap_err();
        assert!(err.to_string().contains("unterminated quoted field"));
    }

    #[test]
    fn json_round_trips() {
        let json = r#"{"columns":["a","b"],"rows":[["1","2"],["3","4"]]}"#;
        let table = Table::from_json_str(json).expect("parse");
        assert_eq!(table.row_count(), 2);

        let serialized = serde_json::to_string(&table).expect("serialize");
        let reparsed = Table::from_json_str(&serialized).expect("reparse");
        assert_eq!(reparsed, table);
    }

    #[test]
    fn json_with_ragged_rows_is_rejected() {
        let json = r#"{"columns":["a","b"],"rows":[["1"]]}"#;
        assert!(Table::from_json_str(json).is_err());
    }

    #[test]
    fn from_path_dispatches_on_extension() {
        let temp = tempfile::tempdir().expect("tempdir");
        let csv_path = temp.path().join("t.csv");
        fs::write(&csv_path, "a\n1\n").expect("write");
        let table = Table::from_path(&csv_path).expect("load");
        assert_eq!(table.columns, vec!["a"]);

        let bad = temp.path().join("t.tsv");
        fs::write(&bad, "a\n").expect("write");
        let err = Table::from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported table extension"));
    }
}
