//! Tabular dataset loaded from CSV or JSON records.
//!
//! Epistemic foundation:
//! - K_i: Every row has exactly one cell per column
//! - K_i: A dataset has at least one row and one column
//! - B_i: Input may be ragged or malformed → InvalidInput / ParseError

use crate::models::{CodegenieError, Result};
use serde_json::Value;
use std::io::Read;

/// One cell of a dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Interpret a raw CSV field.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_nan() => Self::Missing,
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Display form, used for value counts and duplicate detection.
    pub fn display(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Missing => String::new(),
        }
    }
}

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every present cell is an integer-valued number and none are missing
    Integer,
    /// Every present cell is a number
    Float,
    /// Anything else, including all-missing columns
    Text,
}

impl ColumnKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// dtype label shown in reports.
    pub fn dtype(&self) -> &'static str {
        match self {
            Self::Integer => "int64",
            Self::Float => "float64",
            Self::Text => "object",
        }
    }
}

/// Rows of cells under named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    /// Build a dataset, rejecting empty or ragged input.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(CodegenieError::InvalidInput("dataset has no columns".to_string()));
        }
        if rows.is_empty() {
            return Err(CodegenieError::InvalidInput("dataset has no rows".to_string()));
        }
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(CodegenieError::InvalidInput(format!(
                "row {} has {} cells, expected {}",
                idx + 1,
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Load CSV with a header row.
    pub fn from_csv<R: Read>(reader: R) -> Result<Self> {
        let mut csv = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let columns = csv
            .headers()
            .map_err(|e| CodegenieError::ParseError(format!("CSV header: {e}")))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record.map_err(|e| CodegenieError::ParseError(format!("CSV record: {e}")))?;
            rows.push(record.iter().map(Cell::parse).collect());
        }

        Self::new(columns, rows)
    }

    /// Load an array of JSON objects. Columns appear in first-seen key order.
    pub fn from_json_records(value: &Value) -> Result<Self> {
        let records = value.as_array().ok_or_else(|| {
            CodegenieError::InvalidInput("records must be an array of objects".to_string())
        })?;

        let mut columns: Vec<String> = Vec::new();
        for record in records {
            let object = record.as_object().ok_or_else(|| {
                CodegenieError::InvalidInput("records must be an array of objects".to_string())
            })?;
            for key in object.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .filter_map(Value::as_object)
            .map(|object| {
                columns
                    .iter()
                    .map(|c| object.get(c).map_or(Cell::Missing, Cell::from_json))
                    .collect()
            })
            .collect();

        Self::new(columns, rows)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn total_cells(&self) -> usize {
        self.n_rows() * self.n_columns()
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }

    pub fn kind(&self, idx: usize) -> ColumnKind {
        let mut present = 0usize;
        let mut integral = true;
        let mut missing = false;
        for cell in self.column(idx) {
            match cell {
                Cell::Number(n) => {
                    present += 1;
                    integral &= n.fract() == 0.0;
                }
                Cell::Missing => missing = true,
                Cell::Text(_) => return ColumnKind::Text,
            }
        }
        match (present, integral && !missing) {
            (0, _) => ColumnKind::Text,
            (_, true) => ColumnKind::Integer,
            (_, false) => ColumnKind::Float,
        }
    }

    /// Indices of numeric columns, in column order.
    pub fn numeric_columns(&self) -> Vec<usize> {
        (0..self.n_columns()).filter(|&i| self.kind(i).is_numeric()).collect()
    }

    /// Indices of text columns, in column order.
    pub fn text_columns(&self) -> Vec<usize> {
        (0..self.n_columns()).filter(|&i| !self.kind(i).is_numeric()).collect()
    }

    /// Present values of a numeric column.
    pub fn numbers(&self, idx: usize) -> Vec<f64> {
        self.column(idx).filter_map(Cell::as_number).collect()
    }

    pub fn null_count(&self, idx: usize) -> usize {
        self.column(idx).filter(|c| c.is_missing()).count()
    }

    pub fn total_nulls(&self) -> usize {
        (0..self.n_columns()).map(|i| self.null_count(i)).sum()
    }

    /// Rough in-memory footprint in bytes, pandas-style.
    pub fn approx_memory_bytes(&self) -> usize {
        const INDEX_BYTES: usize = 128;
        const OBJECT_OVERHEAD: usize = 49;

        let per_column: usize = (0..self.n_columns())
            .map(|i| {
                if self.kind(i).is_numeric() {
                    8 * self.n_rows()
                } else {
                    self.column(i)
                        .map(|c| 8 + OBJECT_OVERHEAD + c.display().len())
                        .sum()
                }
            })
            .sum();
        INDEX_BYTES + per_column
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_csv_infers_kinds() {
        let csv = "id,score,name,empty\n1,2.5,alice,\n2,,bob,\n3,4.0,carol,\n";
        let ds = Dataset::from_csv(csv.as_bytes()).unwrap();
        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.columns(), &["id", "score", "name", "empty"]);
        assert_eq!(ds.kind(0), ColumnKind::Integer);
        assert_eq!(ds.kind(1), ColumnKind::Float);
        assert_eq!(ds.kind(2), ColumnKind::Text);
        // all-missing columns are not numeric
        assert_eq!(ds.kind(3), ColumnKind::Text);
        assert_eq!(ds.numeric_columns(), vec![0, 1]);
        assert_eq!(ds.null_count(1), 1);
        assert_eq!(ds.total_nulls(), 4);
    }

    #[test]
    fn test_mixed_column_is_text() {
        let ds = Dataset::from_csv("a\n1\nx\n".as_bytes()).unwrap();
        assert_eq!(ds.kind(0), ColumnKind::Text);
    }

    #[test]
    fn test_from_csv_rejects_empty_and_ragged() {
        assert!(matches!(
            Dataset::from_csv("a,b\n".as_bytes()),
            Err(CodegenieError::InvalidInput(_))
        ));
        assert!(Dataset::from_csv("".as_bytes()).is_err());
        assert!(Dataset::from_csv("a,b\n1,2,3\n".as_bytes()).is_err());
    }

    #[test]
    fn test_from_json_records() {
        let value = json!([
            {"x": 1, "y": "a"},
            {"x": null, "z": true}
        ]);
        let ds = Dataset::from_json_records(&value).unwrap();
        assert_eq!(ds.n_columns(), 3);
        assert_eq!(ds.n_rows(), 2);
        let x = ds.columns().iter().position(|c| c == "x").unwrap();
        assert_eq!(ds.kind(x), ColumnKind::Float);
        assert_eq!(ds.null_count(x), 1);
        let z = ds.columns().iter().position(|c| c == "z").unwrap();
        assert_eq!(ds.rows()[1][z], Cell::Text("true".to_string()));
        assert!(ds.rows()[0][z].is_missing());
    }

    #[test]
    fn test_from_json_records_rejects_bad_shapes() {
        assert!(Dataset::from_json_records(&json!({"x": 1})).is_err());
        assert!(Dataset::from_json_records(&json!([1, 2])).is_err());
        assert!(Dataset::from_json_records(&json!([])).is_err());
        assert!(Dataset::from_json_records(&json!([{}])).is_err());
    }
}
