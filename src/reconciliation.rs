// 🧮 Merge Engine - reconcile N heterogeneous datasets into one canonical dataset
// Schema → canonical records → clusters → classification → resolution → merged + report.

use crate::conflicts::{Classification, ConflictClassifier};
use crate::context::RunContext;
use crate::decision::DecisionProvider;
use crate::deduplication::{group, Cluster};
use crate::error::{ReconcileError, Result};
use crate::model::{Dataset, Record, Value};
use crate::resolution::{ConflictPolicy, ConflictResolver, Resolution};
use crate::schema::SchemaReconciler;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Written into unmapped fields that have no configured or declared default.
pub const MISSING_SENTINEL: &str = "<missing>";

/// What happens to a dataset when a selected field cannot be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingFieldPolicy {
    #[default]
    FillDefault,
    SkipSource,
}

// ============================================================================
// MERGE RESULT
// ============================================================================

/// A duplicate cluster with its classification and how it was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub cluster: Cluster,
    pub classification: Classification,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeStats {
    pub run_id: Uuid,
    pub processed_at: DateTime<Utc>,
    pub input_records: usize,
    pub output_records: usize,
    pub datasets_processed: usize,
    pub datasets_skipped: usize,
    pub selected_fields: usize,
    pub dedup_enabled: bool,
    pub key_fields: usize,
    pub duplicate_clusters: usize,
    pub trivial_clusters: usize,
    pub conflicting_clusters: usize,
    /// Clusters resolved to zero survivors
    pub skipped_clusters: usize,
    pub records_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub field: String,
    pub non_empty: usize,
    pub empty: usize,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: Dataset,
    /// Duplicate clusters only, in cluster order
    pub clusters: Vec<ClusterReport>,
    pub stats: MergeStats,
    pub field_summary: Vec<FieldSummary>,
    pub warnings: Vec<ReconcileError>,
}

// ============================================================================
// MERGE ENGINE
// ============================================================================

pub struct MergeEngine {
    pub selected_fields: Vec<String>,

    /// Resolved key fields; empty disables deduplication
    pub key_fields: Vec<String>,

    pub policy: ConflictPolicy,
    pub missing_field_policy: MissingFieldPolicy,

    /// Column appended to the merged output holding each record's provenance
    pub provenance_column: Option<String>,

    reconciler: SchemaReconciler,
}

impl MergeEngine {
    pub fn new(selected_fields: Vec<String>, key_fields: Vec<String>, reconciler: SchemaReconciler) -> Self {
        MergeEngine {
            selected_fields,
            key_fields,
            policy: ConflictPolicy::default(),
            missing_field_policy: MissingFieldPolicy::default(),
            provenance_column: None,
            reconciler,
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_missing_field_policy(mut self, policy: MissingFieldPolicy) -> Self {
        self.missing_field_policy = policy;
        self
    }

    pub fn with_provenance_column(mut self, column: Option<String>) -> Self {
        self.provenance_column = column;
        self
    }

    /// Fill order: run default, declared default, 0 for amounts, sentinel.
    fn fill_value(&self, field: &str, ctx: &RunContext) -> Value {
        let registry = &self.reconciler.registry;
        if let Some(value) = ctx.field_default(field).or_else(|| registry.default_value(field)) {
            return value.clone();
        }
        if registry.is_amount_like(field) {
            Value::Number(0.0)
        } else {
            Value::text(MISSING_SENTINEL)
        }
    }

    /// Map every dataset onto the selected fields and concatenate, input order kept.
    ///
    /// Returns the records and how many datasets were skipped.
    pub fn canonicalize(
        &self,
        datasets: &[Dataset],
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> (Vec<Record>, usize) {
        let mut records = Vec::new();
        let mut skipped = 0;

        for dataset in datasets {
            let mapping = self
                .reconciler
                .reconcile_with(&dataset.id, &self.selected_fields, &dataset.columns, decider);

            for issue in mapping.issues(&dataset.id, self.reconciler.threshold) {
                ctx.warn(issue);
            }

            let unmapped: Vec<String> = mapping.unmapped().into_iter().map(str::to_string).collect();
            for field in &unmapped {
                ctx.warn(ReconcileError::MissingRequiredField {
                    dataset: dataset.id.clone(),
                    field: field.clone(),
                });
            }

            if !unmapped.is_empty() && self.missing_field_policy == MissingFieldPolicy::SkipSource {
                skipped += 1;
                continue;
            }

            let fill: HashMap<String, Value> = unmapped
                .iter()
                .map(|f| (f.clone(), self.fill_value(f, ctx)))
                .collect();

            let canonical = mapping.canonicalize(dataset, &fill);
            info!(dataset = %dataset.id, rows = canonical.len(), unmapped = unmapped.len(), "dataset canonicalized");
            records.extend(canonical);
        }

        (records, skipped)
    }

    #[instrument(skip_all, fields(datasets = datasets.len(), policy = self.policy.name()))]
    pub fn run(
        &self,
        datasets: &[Dataset],
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> Result<MergeOutcome> {
        if datasets.is_empty() {
            return Err(ReconcileError::NoInputDatasets);
        }

        let (records, datasets_skipped) = self.canonicalize(datasets, ctx, decider);
        if datasets_skipped == datasets.len() {
            return Err(ReconcileError::NoInputDatasets);
        }

        let dedup_enabled = !self.key_fields.is_empty();
        let classifier = ConflictClassifier::new(&self.key_fields, &self.reconciler.registry);
        let resolver = ConflictResolver::new(self.policy, &self.key_fields);

        let mut survivors: Vec<Record> = Vec::new();
        let mut reports: Vec<ClusterReport> = Vec::new();

        if dedup_enabled {
            for cluster in group(&records, &self.key_fields) {
                if !cluster.is_duplicate() {
                    survivors.extend(cluster.members);
                    continue;
                }

                for issue in classifier.type_failures(&cluster) {
                    ctx.warn(issue);
                }

                let classification = classifier.classify(&cluster);
                let resolution = resolver.resolve(&cluster, &classification, ctx, decider);
                debug!(
                    cluster = cluster.id,
                    size = cluster.len(),
                    status = classification.label(),
                    "duplicate cluster"
                );

                survivors.extend(resolution.survivors.iter().cloned());
                reports.push(ClusterReport {
                    cluster,
                    classification,
                    resolution,
                });
            }
        } else {
            survivors = records.clone();
        }

        if survivors.is_empty() {
            return Err(ReconcileError::NoSurvivingRecords);
        }

        let merged = Dataset::from_records(
            "merged",
            &self.selected_fields,
            &survivors,
            self.provenance_column.as_deref(),
        );

        let trivial = reports.iter().filter(|r| r.classification.is_trivial()).count();
        let stats = MergeStats {
            run_id: ctx.run_id,
            processed_at: ctx.started_at,
            input_records: records.len(),
            output_records: survivors.len(),
            datasets_processed: datasets.len() - datasets_skipped,
            datasets_skipped,
            selected_fields: self.selected_fields.len(),
            dedup_enabled,
            key_fields: self.key_fields.len(),
            duplicate_clusters: reports.len(),
            trivial_clusters: trivial,
            conflicting_clusters: reports.len() - trivial,
            skipped_clusters: reports.iter().filter(|r| r.resolution.survivors.is_empty()).count(),
            records_removed: records.len().saturating_sub(survivors.len()),
        };

        info!(
            input = stats.input_records,
            output = stats.output_records,
            duplicates = stats.duplicate_clusters,
            conflicting = stats.conflicting_clusters,
            "merge finished"
        );

        Ok(MergeOutcome {
            field_summary: summarize_fields(&self.selected_fields, &survivors),
            merged,
            clusters: reports,
            stats,
            warnings: ctx.take_warnings(),
        })
    }
}

/// Non-empty / empty counts per field.
pub fn summarize_fields(fields: &[String], records: &[Record]) -> Vec<FieldSummary> {
    fields
        .iter()
        .map(|field| {
            let non_empty = records
                .iter()
                .filter(|r| r.get(field).map_or(false, |v| !v.is_empty()))
                .count();
            FieldSummary {
                field: field.clone(),
                non_empty,
                empty: records.len() - non_empty,
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
