//! Output formatting for query outcomes.
//!
//! JSON output renders the structured value tree as-is. Table output mimics
//! the MySQL command line client.

use crate::models::{Cell, QueryOutcome, ResultSet};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON value tree (default)
    #[default]
    Json,
    /// ASCII table format (like MySQL CLI)
    Table,
}

/// Render a cell for display. Binary cells are shown as base64.
pub fn format_cell(cell: &Cell) -> String {
    match cell {
        None => "NULL".to_string(),
        Some(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => STANDARD.encode(bytes),
        },
    }
}

fn looks_numeric(s: &str) -> bool {
    !s.is_empty() && s.parse::<f64>().is_ok()
}

/// Format a result set as an ASCII table.
pub fn format_as_table(result: &ResultSet, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if !result.has_columns() {
        return format!(
            "Query OK, {} {} affected ({:.2} sec)\n",
            result.affected,
            if result.affected == 1 { "row" } else { "rows" },
            secs
        );
    }
    if result.rows.is_empty() {
        return format!("Empty set ({:.2} sec)\n", secs);
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_cell).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.width()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(value.width());
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad_right(col, *w)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for (row, raw) in cells.iter().zip(&result.rows) {
        let line: String = row
            .iter()
            .zip(raw)
            .zip(&widths)
            .map(|((value, cell), w)| {
                // Right-align numbers, left-align others
                if cell.is_some() && looks_numeric(value) {
                    format!("| {} ", pad_left(value, *w))
                } else {
                    format!("| {} ", pad_right(value, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);
    let row_count = result.rows.len();
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        if row_count == 1 { "row" } else { "rows" },
        secs
    ));

    output
}

/// Padding by display width; `format!` widths count chars, not columns.
fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

/// Format an outcome in the requested format.
pub fn format_outcome(outcome: &QueryOutcome, format: OutputFormat, elapsed: Duration) -> String {
    match (format, outcome) {
        (OutputFormat::Json, outcome) => {
            serde_json::to_string(&outcome.to_value()).unwrap_or_default() + "\n"
        }
        (OutputFormat::Table, QueryOutcome::Success(result)) => format_as_table(result, elapsed),
        (OutputFormat::Table, QueryOutcome::Failure(err)) => format!("{}\n", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    fn rs(columns: &[&str], rows: Vec<Vec<Cell>>) -> ResultSet {
        ResultSet {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            affected: 0,
        }
    }

    fn cell(s: &str) -> Cell {
        Some(s.as_bytes().to_vec())
    }

    #[test]
    fn test_table_layout() {
        let result = rs(&["id", "name"], vec![vec![cell("1"), cell("alice")], vec![cell("22"), None]]);
        let table = format_as_table(&result, Duration::from_millis(10));
        let expected = "\
+----+-------+
| id | name  |
+----+-------+
|  1 | alice |
| 22 | NULL  |
+----+-------+
2 rows in set (0.01 sec)
";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_table_wide_characters() {
        let result = rs(&["v"], vec![vec![cell("日本")]]);
        let table = format_as_table(&result, Duration::ZERO);
        assert!(table.contains("| 日本 |"));
        assert!(table.starts_with("+------+\n"));
    }

    #[test]
    fn test_empty_set_and_affected() {
        let empty = rs(&["x"], vec![]);
        assert_eq!(format_as_table(&empty, Duration::ZERO), "Empty set (0.00 sec)\n");

        let update = ResultSet::affected(3);
        assert_eq!(
            format_as_table(&update, Duration::ZERO),
            "Query OK, 3 rows affected (0.00 sec)\n"
        );
    }

    #[test]
    fn test_binary_cell_base64() {
        assert_eq!(format_cell(&Some(vec![0xff, 0x00])), "/wA=");
        assert_eq!(format_cell(&None), "NULL");
    }

    #[test]
    fn test_format_outcome_json_and_error() {
        let ok = QueryOutcome::Success(rs(&["x"], vec![vec![cell("1")]]));
        assert_eq!(
            format_outcome(&ok, OutputFormat::Json, Duration::ZERO),
            "{\"result\":[{\"x\":\"1\"}],\"affected\":0}\n"
        );

        let err = QueryOutcome::Failure(ClientError::new(1064, "syntax error", "42000"));
        assert_eq!(
            format_outcome(&err, OutputFormat::Table, Duration::ZERO),
            "ERROR 1064 (42000): syntax error\n"
        );
    }
}
