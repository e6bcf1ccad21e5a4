//! Bounded, serialized query results.

use crate::{Result, error::GatewayError};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fmt::Write as _;

/// Result of one executed statement.
///
/// Every row has exactly one serialized value per column and `row_count`
/// always equals the number of rows; [`QueryResult::new`] refuses to build
/// a value that breaks either rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    columns: Vec<String>,
    column_types: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
    row_count: usize,
    truncated: bool,
    execution_time_ms: u64,
}

impl QueryResult {
    /// Builds a result, checking the shape invariants.
    ///
    /// # Errors
    /// Returns `InternalError` when a row width or the column type list
    /// disagrees with the column count.
    pub fn new(
        columns: Vec<String>,
        column_types: Vec<String>,
        rows: Vec<Vec<JsonValue>>,
        truncated: bool,
        execution_time_ms: u64,
    ) -> Result<Self> {
        if column_types.len() != columns.len() {
            return Err(GatewayError::internal(format!(
                "Result has {} columns but {} column types",
                columns.len(),
                column_types.len()
            )));
        }

        if let Some((index, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(GatewayError::internal(format!(
                "Row {} has {} values, expected {}",
                index,
                row.len(),
                columns.len()
            )));
        }

        Ok(Self {
            row_count: rows.len(),
            columns,
            column_types,
            rows,
            truncated,
            execution_time_ms,
        })
    }

    /// Ordered column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Backend type names, parallel to [`Self::columns`]
    pub fn column_types(&self) -> &[String] {
        &self.column_types
    }

    /// Serialized rows
    pub fn rows(&self) -> &[Vec<JsonValue>] {
        &self.rows
    }

    /// Number of rows returned
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Whether an injected row cap cut the result short.
    ///
    /// True only when the gateway appended `LIMIT max_rows` itself and the
    /// result reached that many rows. A statement that merely gained a
    /// LIMIT but returned fewer rows (`SELECT 1`), or one that carried its
    /// own LIMIT, is never truncated.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Wall-clock execution time in milliseconds
    pub fn execution_time_ms(&self) -> u64 {
        self.execution_time_ms
    }

    /// Renders the first `max_rows` rows as numbered lines, each cell cut to
    /// `max_chars` characters, for handing a result preview to a reviewer.
    pub fn sample(&self, max_rows: usize, max_chars: usize) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }

        let mut out = String::new();
        let _ = writeln!(out, "Columns: {}", self.columns.join(", "));
        for (index, row) in self.rows.iter().take(max_rows).enumerate() {
            let cells: Vec<String> = row.iter().map(|v| preview_cell(v, max_chars)).collect();
            let _ = writeln!(out, "{}. {}", index.saturating_add(1), cells.join(", "));
        }
        if self.row_count > max_rows {
            let _ = writeln!(
                out,
                "... ({} more rows)",
                self.row_count.saturating_sub(max_rows)
            );
        }
        out
    }
}

fn preview_cell(value: &JsonValue, max_chars: usize) -> String {
    let text = match value {
        JsonValue::Null => return "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };

    if text.chars().count() > max_chars {
        let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_row_count_matches_rows() {
        let result = QueryResult::new(
            vec!["id".to_string(), "name".to_string()],
            vec!["INT4".to_string(), "TEXT".to_string()],
            vec![vec![json!(1), json!("a")], vec![json!(2), JsonValue::Null]],
            false,
            3,
        )
        .unwrap();

        assert_eq!(result.row_count(), 2);
        assert_eq!(result.row_count(), result.rows().len());
        assert!(result.rows().iter().all(|r| r.len() == result.columns().len()));
    }

    #[test]
    fn test_empty_result_keeps_columns() {
        let result = QueryResult::new(
            vec!["id".to_string()],
            vec!["INT4".to_string()],
            Vec::new(),
            false,
            0,
        )
        .unwrap();

        assert_eq!(result.row_count(), 0);
        assert_eq!(result.columns(), ["id".to_string()]);
        assert_eq!(result.sample(5, 50), "(no rows)");
    }

    #[test]
    fn test_ragged_rows_are_rejected() {
        let error = QueryResult::new(
            vec!["a".to_string(), "b".to_string()],
            vec!["TEXT".to_string(), "TEXT".to_string()],
            vec![vec![json!("x")]],
            false,
            0,
        )
        .unwrap_err();
        assert_eq!(error.code(), ErrorCode::InternalError);

        let error = QueryResult::new(vec!["a".to_string()], Vec::new(), Vec::new(), false, 0)
            .unwrap_err();
        assert!(error.to_string().contains("column types"));
    }

    #[test]
    fn test_serialized_shape() {
        let result = QueryResult::new(
            vec!["?column?".to_string()],
            vec!["INT4".to_string()],
            vec![vec![json!(1)]],
            false,
            1,
        )
        .unwrap();

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["columns"], json!(["?column?"]));
        assert_eq!(value["rows"], json!([[1]]));
        assert_eq!(value["row_count"], 1);
        assert_eq!(value["truncated"], false);
    }

    #[test]
    fn test_sample_truncates_rows_and_cells() {
        let long = "x".repeat(80);
        let rows = (0..8)
            .map(|i| vec![json!(i), json!(long), JsonValue::Null])
            .collect();
        let result = QueryResult::new(
            vec!["n".to_string(), "text".to_string(), "missing".to_string()],
            vec!["INT8".to_string(), "TEXT".to_string(), "TEXT".to_string()],
            rows,
            false,
            0,
        )
        .unwrap();

        let sample = result.sample(5, 50);
        let lines: Vec<&str> = sample.lines().collect();

        assert_eq!(lines[0], "Columns: n, text, missing");
        assert_eq!(lines.len(), 7);
        assert!(lines[1].starts_with("1. 0, "));
        assert!(lines[1].ends_with("..., NULL"));
        assert!(lines[1].contains(&format!("{}...", "x".repeat(47))));
        assert_eq!(lines[6], "... (3 more rows)");
    }
}
