use crate::core::{Row, Value};

/// Rows returned by a statement executed through a [`Session`](crate::connection::Session).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Builds a result from column names given as string slices.
    pub fn with_columns(columns: &[&str], rows: Vec<Row>) -> Self {
        Self::new(columns.iter().map(|c| c.to_string()).collect(), rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, compared case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value of `column` in row `row`, `None` when either is out of range.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Text of `column` in row `row`; `NULL` reads as `None`.
    pub fn get_text(&self, row: usize, column: &str) -> Option<String> {
        self.get(row, column).and_then(Value::to_text)
    }

    /// First column of the first row, the usual shape of `SELECT @@var`.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|r| r.first())
    }
}
