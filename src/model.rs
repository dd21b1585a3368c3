// 📋 Tabular Model - datasets as handed over by the I/O collaborators
// Dataset = ordered columns + ordered rows; Record = one canonical row with provenance.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// SCALAR VALUE
// ============================================================================

/// A single spreadsheet cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Infer a typed cell from raw text (CSV, prompt input).
    ///
    /// Identifiers with leading zeros ("001") and signed/exponent forms stay text,
    /// so they keep their written shape.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }

        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        let leading_zero = digits.len() > 1
            && digits.starts_with('0')
            && !digits.starts_with("0.");
        let plain_number = digits.chars().all(|c| c.is_ascii_digit() || c == '.')
            && digits.chars().filter(|c| *c == '.').count() <= 1
            && !digits.starts_with('.')
            && !digits.ends_with('.');

        if plain_number && !leading_zero {
            if let Ok(n) = trimmed.parse::<f64>() {
                return Value::Number(n);
            }
        }

        Value::Text(raw.to_string())
    }

    /// Empty, NaN, or whitespace-only text.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Number(n) => n.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Empty => Ok(()),
            Value::Number(n) if n.is_nan() => Ok(()),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{:.0}", n),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Value::Empty
        } else {
            Value::Text(s.to_string())
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::from(s.as_str())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

// ============================================================================
// DATASET (raw input / engine output)
// ============================================================================

/// A parsed sheet: dataset identifier, ordered column list, ordered rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Identifier used as provenance (usually the file name)
    pub id: String,

    pub columns: Vec<String>,

    /// Each row has exactly `columns.len()` cells
    pub rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(id: impl Into<String>, columns: Vec<String>) -> Self {
        Dataset {
            id: id.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builder: append a row, padding or truncating to the column count.
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.push_row(row);
        self
    }

    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Empty);
        self.rows.push(row);
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Add a column (if absent) and return its index.
    pub fn ensure_column(&mut self, column: &str) -> usize {
        if let Some(idx) = self.column_index(column) {
            return idx;
        }
        self.columns.push(column.to_string());
        for row in &mut self.rows {
            row.push(Value::Empty);
        }
        self.columns.len() - 1
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build a dataset from canonical records, in the given field order.
    pub fn from_records(
        id: impl Into<String>,
        fields: &[String],
        records: &[Record],
        provenance_column: Option<&str>,
    ) -> Self {
        let mut columns = fields.to_vec();
        if let Some(col) = provenance_column {
            columns.push(col.to_string());
        }

        let mut dataset = Dataset::new(id, columns);
        for record in records {
            let mut row: Vec<Value> = fields
                .iter()
                .map(|f| record.get(f).cloned().unwrap_or_default())
                .collect();
            if provenance_column.is_some() {
                row.push(Value::text(record.provenance.clone()));
            }
            dataset.push_row(row);
        }
        dataset
    }
}

// ============================================================================
// RECORD (canonical row)
// ============================================================================

/// One canonicalized row: canonical field name → value, plus provenance.
///
/// Records are never mutated after the Schema Reconciler produces them;
/// later stages derive new records with [`Record::with_value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Originating dataset identifier
    pub provenance: String,

    /// Zero-based row index in the originating dataset
    pub source_row: usize,

    values: Vec<(String, Value)>,
}

impl Record {
    pub fn new(provenance: impl Into<String>, source_row: usize, values: Vec<(String, Value)>) -> Self {
        Record {
            provenance: provenance.into(),
            source_row,
            values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    /// Field names in canonical order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// Derive a new record with one field replaced (or appended).
    pub fn with_value(&self, field: &str, value: Value) -> Record {
        let mut next = self.clone();
        match next.values.iter_mut().find(|(name, _)| name == field) {
            Some(slot) => slot.1 = value,
            None => next.values.push((field.to_string(), value)),
        }
        next
    }
}

// ============================================================================
// TESTS
// ============================================================================
