// ⚠️ Error Taxonomy - what can go wrong during a reconciliation run
// Source- and row-scoped variants are collected as warnings; the rest abort the run.

use thiserror::Error;

/// Convenient alias for fallible results returned by the engines.
pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconcileError {
    // ========================================================================
    // SOURCE / ROW SCOPED (reported, never fatal)
    // ========================================================================
    /// A required field could not be mapped for a dataset, even after fuzzy matching.
    #[error("dataset '{dataset}': required field '{field}' could not be mapped")]
    MissingRequiredField { dataset: String, field: String },

    /// Similarity scoring found no candidate at or above the threshold.
    #[error("dataset '{dataset}': no column for '{field}' reached similarity {threshold:.2}{}", best_hint(.best))]
    AmbiguousColumnMatch {
        dataset: String,
        field: String,
        threshold: f64,
        best: Option<(String, f64)>,
    },

    /// Amount-aware comparison could not parse a value; plain comparison was used.
    #[error("field '{field}': '{value}' is not numeric, compared as text")]
    TypeComparisonFailure { field: String, value: String },

    /// A row had no link value and was excluded from lookup or targeting.
    #[error("dataset '{dataset}': row {row} has an empty link value")]
    EmptyLinkValue { dataset: String, row: usize },

    // ========================================================================
    // RUN SCOPED (fatal)
    // ========================================================================
    /// No dataset could be read or every dataset was excluded.
    #[error("no readable input datasets")]
    NoInputDatasets,

    /// Merging produced an empty dataset.
    #[error("no records survived merging")]
    NoSurvivingRecords,

    /// The link field could not be located in a dataset.
    #[error("dataset '{dataset}': link field '{field}' not found")]
    MissingLinkField { dataset: String, field: String },

    /// A key-field pattern matched none of the selected fields.
    #[error("key field '{0}' does not match any selected field")]
    UnknownKeyField(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn best_hint(best: &Option<(String, f64)>) -> String {
    match best {
        Some((column, score)) => format!(" (closest: '{column}' at {score:.2})"),
        None => String::new(),
    }
}

impl ReconcileError {
    /// Whether this error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconcileError::NoInputDatasets
                | ReconcileError::NoSurvivingRecords
                | ReconcileError::MissingLinkField { .. }
                | ReconcileError::UnknownKeyField(_)
                | ReconcileError::InvalidConfig(_)
        )
    }
}
