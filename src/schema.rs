// 📐 Schema Reconciler - map each source's columns onto canonical fields
// Exact → alias → similarity; a column is consumed by at most one field.

use crate::decision::{picked, DecisionProvider, Question};
use crate::error::ReconcileError;
use crate::fields::FieldRegistry;
use crate::model::{Dataset, Record, Value};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::collections::HashMap;
use tracing::debug;

/// Default minimum similarity ratio for a fuzzy column match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

// ============================================================================
// NAME CLEANING + SIMILARITY
// ============================================================================

/// Trim, collapse whitespace, drop everything but letters, digits, `_` and CJK.
pub fn clean_column_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Ratcliff/Obershelp ratio (0.0 - 1.0) of two cleaned, lowercased names:
/// `2 * matched chars / total chars`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = clean_column_name(a).to_lowercase();
    let b = clean_column_name(b).to_lowercase();
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(a.as_str(), b.as_str()).ratio())
}

// ============================================================================
// FIELD MAPPING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatchKind {
    Exact,
    CaseInsensitive,
    Cleaned,
    Alias,
    Similarity(f64),
    Manual,
    Unmapped,
}

/// The column a source uses for one canonical field, or unmapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub field: String,
    pub column: Option<String>,
    pub kind: MatchKind,

    /// Best candidate below threshold, kept for reporting unmapped fields
    pub closest: Option<(String, f64)>,
}

impl FieldMapping {
    fn mapped(field: &str, column: &str, kind: MatchKind) -> Self {
        FieldMapping {
            field: field.to_string(),
            column: Some(column.to_string()),
            kind,
            closest: None,
        }
    }

    fn unmapped(field: &str) -> Self {
        FieldMapping {
            field: field.to_string(),
            column: None,
            kind: MatchKind::Unmapped,
            closest: None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.column.is_some()
    }
}

/// Mapping for one dataset, in required-field order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaMapping {
    pub mappings: Vec<FieldMapping>,
}

impl SchemaMapping {
    pub fn column_for(&self, field: &str) -> Option<&str> {
        self.mappings
            .iter()
            .find(|m| m.field == field)
            .and_then(|m| m.column.as_deref())
    }

    pub fn unmapped(&self) -> Vec<&str> {
        self.mappings
            .iter()
            .filter(|m| !m.is_mapped())
            .map(|m| m.field.as_str())
            .collect()
    }

    /// One `AmbiguousColumnMatch` per unmapped field that had a sub-threshold candidate.
    pub fn issues(&self, dataset: &str, threshold: f64) -> Vec<ReconcileError> {
        self.mappings
            .iter()
            .filter(|m| !m.is_mapped() && m.closest.is_some())
            .map(|m| ReconcileError::AmbiguousColumnMatch {
                dataset: dataset.to_string(),
                field: m.field.clone(),
                threshold,
                best: m.closest.clone(),
            })
            .collect()
    }

    /// Produce canonical records; unmapped fields take `fill` or stay empty.
    pub fn canonicalize(&self, dataset: &Dataset, fill: &HashMap<String, Value>) -> Vec<Record> {
        let indexes: Vec<Option<usize>> = self
            .mappings
            .iter()
            .map(|m| m.column.as_deref().and_then(|c| dataset.column_index(c)))
            .collect();

        dataset
            .rows
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                let values = self
                    .mappings
                    .iter()
                    .zip(&indexes)
                    .map(|(m, idx)| {
                        let value = match idx {
                            Some(i) => row.get(*i).cloned().unwrap_or_default(),
                            None => fill.get(&m.field).cloned().unwrap_or_default(),
                        };
                        (m.field.clone(), value)
                    })
                    .collect();
                Record::new(dataset.id.clone(), row_idx, values)
            })
            .collect()
    }
}

// ============================================================================
// SCHEMA RECONCILER
// ============================================================================

pub struct SchemaReconciler {
    /// Minimum similarity ratio (default: 0.8)
    pub threshold: f64,

    pub registry: FieldRegistry,
}

impl SchemaReconciler {
    pub fn new(registry: FieldRegistry) -> Self {
        SchemaReconciler {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            registry,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Map required fields onto available columns without asking anyone.
    ///
    /// Exact and alias matches are taken for every field first, so a fuzzy
    /// match can never steal a column another field names exactly.
    pub fn reconcile(&self, required: &[String], available: &[String]) -> SchemaMapping {
        let mut consumed = vec![false; available.len()];
        let mut slots: Vec<Option<FieldMapping>> = Vec::with_capacity(required.len());

        // Pass 1: exact, then declared aliases
        for field in required {
            let found = position(available, &consumed, |c| c == field)
                .map(|i| (i, MatchKind::Exact))
                .or_else(|| self.alias_match(field, available, &consumed).map(|i| (i, MatchKind::Alias)));

            slots.push(found.map(|(i, kind)| {
                consumed[i] = true;
                FieldMapping::mapped(field, &available[i], kind)
            }));
        }

        // Pass 2: similarity over the remaining pool
        let mappings = required
            .iter()
            .zip(slots)
            .map(|(field, slot)| match slot {
                Some(mapping) => mapping,
                None => self.similarity_match(field, available, &mut consumed),
            })
            .collect();

        SchemaMapping { mappings }
    }

    /// Like [`reconcile`](Self::reconcile), then ask the provider to pick a column
    /// for every field still unmapped.
    pub fn reconcile_with(
        &self,
        dataset: &str,
        required: &[String],
        available: &[String],
        decider: &mut dyn DecisionProvider,
    ) -> SchemaMapping {
        let mut mapping = self.reconcile(required, available);

        for idx in 0..mapping.mappings.len() {
            if mapping.mappings[idx].is_mapped() {
                continue;
            }

            let options: Vec<String> = available
                .iter()
                .filter(|c| mapping.mappings.iter().all(|m| m.column.as_deref() != Some(c.as_str())))
                .cloned()
                .collect();
            if options.is_empty() {
                break;
            }

            let question = Question::PickColumn {
                dataset: dataset.to_string(),
                field: mapping.mappings[idx].field.clone(),
            };
            if let Some(choice) = picked(decider.ask(&question, &options), &options) {
                debug!(field = %mapping.mappings[idx].field, column = %options[choice], "column picked manually");
                let slot = &mut mapping.mappings[idx];
                slot.column = Some(options[choice].clone());
                slot.kind = MatchKind::Manual;
            }
        }

        mapping
    }

    /// Locate one field's column silently: exact, case-insensitive, cleaned,
    /// alias, then similarity.
    pub fn resolve_silent(&self, field: &str, available: &[String]) -> Option<(String, MatchKind)> {
        let none = vec![false; available.len()];
        let lower = field.to_lowercase();
        let cleaned = clean_column_name(field).to_lowercase();

        let found = position(available, &none, |c| c == field)
            .map(|i| (i, MatchKind::Exact))
            .or_else(|| position(available, &none, |c| c.to_lowercase() == lower).map(|i| (i, MatchKind::CaseInsensitive)))
            .or_else(|| {
                position(available, &none, |c| !cleaned.is_empty() && clean_column_name(c).to_lowercase() == cleaned)
                    .map(|i| (i, MatchKind::Cleaned))
            })
            .or_else(|| self.alias_match(field, available, &none).map(|i| (i, MatchKind::Alias)));

        if let Some((i, kind)) = found {
            return Some((available[i].clone(), kind));
        }

        let mut pool = none;
        let mapping = self.similarity_match(field, available, &mut pool);
        mapping.column.map(|c| (c, mapping.kind))
    }

    /// Each alias in declaration order: exact, then case-insensitive, then cleaned.
    fn alias_match(&self, field: &str, available: &[String], consumed: &[bool]) -> Option<usize> {
        self.registry.aliases(field).iter().find_map(|alias| {
            let lower = alias.to_lowercase();
            let cleaned = clean_column_name(alias).to_lowercase();
            position(available, consumed, |c| c == alias)
                .or_else(|| position(available, consumed, |c| c.to_lowercase() == lower))
                .or_else(|| {
                    position(available, consumed, |c| {
                        !cleaned.is_empty() && clean_column_name(c).to_lowercase() == cleaned
                    })
                })
        })
    }

    fn similarity_match(&self, field: &str, available: &[String], consumed: &mut [bool]) -> FieldMapping {
        let mut best: Option<(usize, f64)> = None;

        for (i, column) in available.iter().enumerate() {
            if consumed[i] {
                continue;
            }
            let score = similarity(field, column);
            // Strict > keeps the first column on ties
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((i, score));
            }
        }

        match best {
            Some((i, score)) if score >= self.threshold => {
                consumed[i] = true;
                debug!(field, column = %available[i], score, "similarity match");
                FieldMapping::mapped(field, &available[i], MatchKind::Similarity(score))
            }
            other => {
                let mut mapping = FieldMapping::unmapped(field);
                mapping.closest = other.map(|(i, score)| (available[i].clone(), score));
                mapping
            }
        }
    }
}

impl Default for SchemaReconciler {
    fn default() -> Self {
        Self::new(FieldRegistry::with_defaults())
    }
}

fn position<F>(available: &[String], consumed: &[bool], pred: F) -> Option<usize>
where
    F: Fn(&str) -> bool,
{
    available
        .iter()
        .enumerate()
        .find(|(i, c)| !consumed[*i] && pred(c))
        .map(|(i, _)| i)
}

// ============================================================================
// TESTS
// ============================================================================
