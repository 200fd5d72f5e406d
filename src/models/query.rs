//! Query-related data models.
//!
//! A query either produces a [`ResultSet`] or a [`ClientError`] state; both
//! convert into the structured value handed back to callers.

use crate::error::ClientError;
use crate::models::Value;

/// One cell: `None` for SQL NULL, otherwise the raw text-protocol bytes.
pub type Cell = Option<Vec<u8>>;

/// Normalized output of a successful statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in result order. Empty when the statement had no result set.
    pub columns: Vec<String>,
    /// Rows, each holding one cell per column in column order.
    pub rows: Vec<Vec<Cell>>,
    pub affected: u64,
}

impl ResultSet {
    /// A result without a row set (INSERT, UPDATE, DELETE, DDL).
    pub fn affected(affected: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected,
        }
    }

    /// Whether the statement produced a result set.
    pub fn has_columns(&self) -> bool {
        !self.columns.is_empty()
    }

    /// Build `{result: [ {col: val, ...}, ... ], affected: n}`.
    ///
    /// Rows are keyed 0, 1, 2, ...; columns appear in result order and NULL
    /// cells become [`Value::None`].
    pub fn to_value(&self) -> Value {
        let mut rows = Value::array();
        for row in &self.rows {
            let mut entry = Value::array();
            for (name, cell) in self.columns.iter().zip(row) {
                entry.insert(name.as_str(), Value::from(cell.clone()));
            }
            rows.push(entry);
        }

        let mut value = Value::array();
        value.insert("result", rows);
        value.insert("affected", Value::Number(self.affected as f64));
        value
    }
}

/// Outcome of one query call. Success and failure are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success(ResultSet),
    Failure(ClientError),
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result_set(&self) -> Option<&ResultSet> {
        match self {
            Self::Success(rs) => Some(rs),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Success(rs) => rs.to_value(),
            Self::Failure(err) => err.to_value(),
        }
    }
}
