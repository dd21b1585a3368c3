// 🔄 Sync Engine - supplement a target dataset from link-keyed source lookups
// Per (target row, field): no link → unmatched/default → single/multi source → replace or skip.

use crate::context::{RememberScope, ReplaceDecision, RunContext};
use crate::decision::{picked, DecisionProvider, Question};
use crate::error::{ReconcileError, Result};
use crate::model::{Dataset, Value};
use crate::normalize::{normalize, values_equal};
use crate::schema::SchemaReconciler;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

// ============================================================================
// POLICIES
// ============================================================================

/// Whether a sync may overwrite a non-empty target value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementPolicy {
    #[default]
    AskEachTime,
    ReplaceAll,
    SkipAll,
}

/// What to do when sources disagree on a link's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultiSourcePolicy {
    #[default]
    Ask,
    First,
    Last,
    Skip,
}

/// What to do with a target row no source knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    #[default]
    LeaveEmpty,
    UseDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkMatching {
    /// Normalized equality only
    #[default]
    Exact,
    /// Fall back to single-typo matches when no exact key exists
    NearMiss,
}

// ============================================================================
// NEAR-MISS LINK MATCHING
// ============================================================================

/// Transcription-typo heuristic for link values of equal length.
///
/// Numeric values must share every digit but the last, which may differ by
/// at most 2; anything else may differ in at most one position.
pub fn near_miss(a: &str, b: &str) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || a.len() != b.len() {
        return false;
    }

    if a.iter().chain(&b).all(char::is_ascii_digit) {
        let last = a.len() - 1;
        return a[..last] == b[..last] && (a[last] as i32 - b[last] as i32).abs() <= 2;
    }

    a.iter().zip(&b).filter(|(x, y)| x != y).count() <= 1
}

// ============================================================================
// VALUE LOOKUP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceValue {
    pub source: String,
    pub value: Value,
}

/// Every normalized link value any usable source carries, in first-seen order.
///
/// A link lives here even when all of its field values are empty, so a known
/// link never falls through to a near-miss neighbour.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    known: HashSet<String>,
    order: Vec<String>,
}

impl LinkIndex {
    pub fn insert(&mut self, link: &str) {
        if !link.is_empty() && self.known.insert(link.to_string()) {
            self.order.push(link.to_string());
        }
    }

    /// Exact key first; near-miss keys only when enabled and no exact key exists.
    pub fn resolve(&self, link: &str, matching: LinkMatching) -> Option<&str> {
        if let Some(key) = self.known.get(link) {
            return Some(key.as_str());
        }
        if matching == LinkMatching::Exact {
            return None;
        }
        self.order.iter().find(|key| near_miss(link, key)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Normalized link value → every source's non-empty value for one field.
#[derive(Debug, Clone, Default)]
pub struct ValueLookup {
    pub field: String,
    entries: HashMap<String, Vec<SourceValue>>,
}

impl ValueLookup {
    pub fn new(field: impl Into<String>) -> Self {
        ValueLookup {
            field: field.into(),
            entries: HashMap::new(),
        }
    }

    /// Keeps the first value per (link, source); empty links and values are ignored.
    pub fn insert(&mut self, link: &str, source: &str, value: Value) {
        if link.is_empty() || value.is_empty() {
            return;
        }
        let values = self.entries.entry(link.to_string()).or_default();
        if values.iter().all(|v| v.source != source) {
            values.push(SourceValue {
                source: source.to_string(),
                value,
            });
        }
    }

    /// Values for an already resolved link key; empty when no source has one.
    pub fn get(&self, link: &str) -> &[SourceValue] {
        self.entries.get(link).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SYNC RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Updated,
    Unchanged,
    Skipped,
    Defaulted,
    Unmatched,
}

impl SyncOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            SyncOutcome::Updated => "updated",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Skipped => "skipped",
            SyncOutcome::Defaulted => "defaulted",
            SyncOutcome::Unmatched => "unmatched",
        }
    }
}

/// One touched (target row, field) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub row: usize,
    pub link: String,
    /// Lookup key actually matched (differs from `link` on a near-miss)
    pub matched: Option<String>,
    pub field: String,
    pub old: Value,
    pub new: Value,
    pub source: String,
    pub outcome: SyncOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldCounts {
    pub field: String,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub defaulted: usize,
    pub unmatched: usize,
}

impl FieldCounts {
    fn record(&mut self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Updated => self.updated += 1,
            SyncOutcome::Unchanged => self.unchanged += 1,
            SyncOutcome::Skipped => self.skipped += 1,
            SyncOutcome::Defaulted => self.defaulted += 1,
            SyncOutcome::Unmatched => self.unmatched += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStats {
    pub source_datasets: usize,
    pub source_records: usize,
    pub target_rows: usize,
    /// Rows with at least one updated or defaulted field
    pub updated_rows: usize,
    /// Rows with at least one skipped field
    pub skipped_rows: usize,
    /// Rows whose link no source knows
    pub unmatched_rows: usize,
    /// Rows with an empty link value
    pub failed_rows: usize,
    /// updated_rows / target_rows
    pub success_rate: f64,
}

#[derive(Debug, Clone)]
pub struct SyncResult {
    pub target: Dataset,
    pub stats: SyncStats,
    pub changes: Vec<ChangeEntry>,
    pub field_counts: Vec<FieldCounts>,
    /// `EmptyLinkValue` per excluded target row
    pub link_failures: Vec<ReconcileError>,
    pub warnings: Vec<ReconcileError>,
}

// ============================================================================
// SYNC ENGINE
// ============================================================================

const REPLACE_ANSWERS: [(ReplaceDecision, RememberScope); 6] = [
    (ReplaceDecision::Replace, RememberScope::Once),
    (ReplaceDecision::Skip, RememberScope::Once),
    (ReplaceDecision::Replace, RememberScope::Field),
    (ReplaceDecision::Skip, RememberScope::Field),
    (ReplaceDecision::Replace, RememberScope::All),
    (ReplaceDecision::Skip, RememberScope::All),
];

fn replace_labels(field: &str) -> Vec<String> {
    vec![
        "replace".to_string(),
        "skip".to_string(),
        format!("always replace '{}'", field),
        format!("always skip '{}'", field),
        "replace everything".to_string(),
        "skip everything".to_string(),
    ]
}

pub struct SyncEngine {
    pub link_field: String,
    pub fields: Vec<String>,
    pub replacement: ReplacementPolicy,
    pub multi_source: MultiSourcePolicy,
    pub unmatched: UnmatchedPolicy,
    pub link_matching: LinkMatching,
    reconciler: SchemaReconciler,
}

impl SyncEngine {
    pub fn new(link_field: impl Into<String>, fields: Vec<String>, reconciler: SchemaReconciler) -> Self {
        let link_field = link_field.into();
        let fields = fields.into_iter().filter(|f| *f != link_field).collect();
        SyncEngine {
            link_field,
            fields,
            replacement: ReplacementPolicy::default(),
            multi_source: MultiSourcePolicy::default(),
            unmatched: UnmatchedPolicy::default(),
            link_matching: LinkMatching::default(),
            reconciler,
        }
    }

    pub fn with_replacement(mut self, policy: ReplacementPolicy) -> Self {
        self.replacement = policy;
        self
    }

    pub fn with_multi_source(mut self, policy: MultiSourcePolicy) -> Self {
        self.multi_source = policy;
        self
    }

    pub fn with_unmatched(mut self, policy: UnmatchedPolicy) -> Self {
        self.unmatched = policy;
        self
    }

    pub fn with_link_matching(mut self, matching: LinkMatching) -> Self {
        self.link_matching = matching;
        self
    }

    fn locate(&self, field: &str, columns: &[String]) -> Option<usize> {
        let (column, _) = self.reconciler.resolve_silent(field, columns)?;
        columns.iter().position(|c| *c == column)
    }

    fn is_amount_like(&self, field: &str) -> bool {
        self.reconciler.registry.is_amount_like(field)
    }

    /// The shared link index plus one lookup per sync field, sources visited
    /// in the given order.
    ///
    /// Sources without a resolvable link column are skipped with a warning.
    pub fn build_lookups(&self, sources: &[Dataset], ctx: &mut RunContext) -> (LinkIndex, Vec<ValueLookup>, SyncStats) {
        let mut links = LinkIndex::default();
        let mut lookups: Vec<ValueLookup> = self.fields.iter().map(ValueLookup::new).collect();
        let mut stats = SyncStats::default();

        for source in sources {
            let Some(link_idx) = self.locate(&self.link_field, &source.columns) else {
                ctx.warn(ReconcileError::MissingLinkField {
                    dataset: source.id.clone(),
                    field: self.link_field.clone(),
                });
                continue;
            };

            let columns: Vec<Option<usize>> = self
                .fields
                .iter()
                .map(|field| {
                    let idx = self.locate(field, &source.columns);
                    if idx.is_none() {
                        ctx.warn(ReconcileError::MissingRequiredField {
                            dataset: source.id.clone(),
                            field: field.clone(),
                        });
                    }
                    idx
                })
                .collect();

            for row in &source.rows {
                let link = row.get(link_idx).map(normalize).unwrap_or_default();
                if link.is_empty() {
                    continue;
                }
                links.insert(&link);
                for (lookup, idx) in lookups.iter_mut().zip(columns.iter().copied()) {
                    if let Some(value) = idx.and_then(|i| row.get(i)) {
                        lookup.insert(&link, &source.id, value.clone());
                    }
                }
            }

            stats.source_datasets += 1;
            stats.source_records += source.len();
            info!(dataset = %source.id, rows = source.len(), "source indexed");
        }

        (links, lookups, stats)
    }

    /// Supplement `target` from `sources`; the target itself is not modified.
    #[instrument(skip_all, fields(target = %target.id, sources = sources.len()))]
    pub fn run(
        &self,
        target: &Dataset,
        sources: &[Dataset],
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> Result<SyncResult> {
        if sources.is_empty() {
            return Err(ReconcileError::NoInputDatasets);
        }

        let link_idx = self
            .locate(&self.link_field, &target.columns)
            .ok_or_else(|| ReconcileError::MissingLinkField {
                dataset: target.id.clone(),
                field: self.link_field.clone(),
            })?;

        let (links, lookups, mut stats) = self.build_lookups(sources, ctx);
        if stats.source_datasets == 0 {
            return Err(ReconcileError::NoInputDatasets);
        }

        let mut output = target.clone();
        let mut field_columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let idx = match self.locate(field, &output.columns) {
                Some(idx) => idx,
                None => output.ensure_column(field),
            };
            field_columns.push(idx);
        }

        let mut changes = Vec::new();
        let mut link_failures = Vec::new();
        let mut field_counts: Vec<FieldCounts> = self
            .fields
            .iter()
            .map(|f| FieldCounts {
                field: f.clone(),
                ..FieldCounts::default()
            })
            .collect();

        stats.target_rows = output.len();

        for row in 0..output.rows.len() {
            let link = normalize(&output.rows[row][link_idx]);
            if link.is_empty() {
                stats.failed_rows += 1;
                link_failures.push(ReconcileError::EmptyLinkValue {
                    dataset: target.id.clone(),
                    row,
                });
                continue;
            }

            let matched = links.resolve(&link, self.link_matching);
            if matched.is_some_and(|key| key != link) {
                debug!(row, link = %link, matched = ?matched, "near-miss link");
            }
            let (mut updated, mut skipped) = (false, false);

            for (f, field) in self.fields.iter().enumerate() {
                let col = field_columns[f];
                let current = output.rows[row][col].clone();

                let (outcome, incoming) = match matched {
                    None => self.unmatched_value(field, &current, ctx),
                    // Known link, but no source has a value for this field
                    Some(key) if lookups[f].get(key).is_empty() => (SyncOutcome::Unchanged, None),
                    Some(key) => self.decide(&link, field, &current, lookups[f].get(key), ctx, decider),
                };

                field_counts[f].record(outcome);
                updated |= matches!(outcome, SyncOutcome::Updated | SyncOutcome::Defaulted);
                skipped |= outcome == SyncOutcome::Skipped;

                if matches!(outcome, SyncOutcome::Unchanged | SyncOutcome::Unmatched) {
                    continue;
                }

                let (new, source) = match incoming {
                    Some(sv) if outcome != SyncOutcome::Skipped => {
                        output.rows[row][col] = sv.value.clone();
                        (sv.value, sv.source)
                    }
                    Some(sv) => (current.clone(), sv.source),
                    None => (current.clone(), String::new()),
                };

                changes.push(ChangeEntry {
                    row,
                    link: link.clone(),
                    matched: matched.map(str::to_string),
                    field: field.clone(),
                    old: current,
                    new,
                    source,
                    outcome,
                });
            }

            stats.updated_rows += usize::from(updated);
            stats.skipped_rows += usize::from(skipped);
            stats.unmatched_rows += usize::from(matched.is_none());
        }

        stats.success_rate = if stats.target_rows == 0 {
            0.0
        } else {
            stats.updated_rows as f64 / stats.target_rows as f64
        };

        info!(
            updated = stats.updated_rows,
            unmatched = stats.unmatched_rows,
            failed = stats.failed_rows,
            "sync finished"
        );

        Ok(SyncResult {
            target: output,
            stats,
            changes,
            field_counts,
            link_failures,
            warnings: ctx.take_warnings(),
        })
    }

    fn unmatched_value(&self, field: &str, current: &Value, ctx: &RunContext) -> (SyncOutcome, Option<SourceValue>) {
        if self.unmatched != UnmatchedPolicy::UseDefault || !current.is_empty() {
            return (SyncOutcome::Unmatched, None);
        }
        let default = ctx
            .field_default(field)
            .or_else(|| self.reconciler.registry.default_value(field));
        match default {
            Some(value) => (
                SyncOutcome::Defaulted,
                Some(SourceValue {
                    source: "default".to_string(),
                    value: value.clone(),
                }),
            ),
            None => (SyncOutcome::Unmatched, None),
        }
    }

    fn decide(
        &self,
        link: &str,
        field: &str,
        current: &Value,
        candidates: &[SourceValue],
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> (SyncOutcome, Option<SourceValue>) {
        let amount = self.is_amount_like(field);

        // Known skip: no need to settle a multi-source disagreement first
        if !current.is_empty() && self.known_replacement(field, ctx) == Some(ReplaceDecision::Skip) {
            return match candidates.iter().find(|c| values_equal(current, &c.value, amount)) {
                Some(_) => (SyncOutcome::Unchanged, None),
                None => (SyncOutcome::Skipped, candidates.first().cloned()),
            };
        }

        let Some(incoming) = self.pick_incoming(link, field, candidates, decider) else {
            return (SyncOutcome::Skipped, None);
        };

        if values_equal(current, &incoming.value, amount) {
            return (SyncOutcome::Unchanged, None);
        }
        if current.is_empty() {
            return (SyncOutcome::Updated, Some(incoming));
        }

        match self.should_replace(link, field, current, &incoming, ctx, decider) {
            ReplaceDecision::Replace => (SyncOutcome::Updated, Some(incoming)),
            ReplaceDecision::Skip => (SyncOutcome::Skipped, Some(incoming)),
        }
    }

    fn known_replacement(&self, field: &str, ctx: &RunContext) -> Option<ReplaceDecision> {
        match self.replacement {
            ReplacementPolicy::ReplaceAll => Some(ReplaceDecision::Replace),
            ReplacementPolicy::SkipAll => Some(ReplaceDecision::Skip),
            ReplacementPolicy::AskEachTime => ctx.cached_replacement(field),
        }
    }

    /// Settle which source value applies; `None` means skip.
    fn pick_incoming(
        &self,
        link: &str,
        field: &str,
        candidates: &[SourceValue],
        decider: &mut dyn DecisionProvider,
    ) -> Option<SourceValue> {
        let amount = self.is_amount_like(field);
        let first = candidates.first()?;
        if candidates.iter().all(|c| values_equal(&first.value, &c.value, amount)) {
            return Some(first.clone());
        }

        debug!(link, field, sources = candidates.len(), "sources disagree");
        match self.multi_source {
            MultiSourcePolicy::First => Some(first.clone()),
            MultiSourcePolicy::Last => candidates.last().cloned(),
            MultiSourcePolicy::Skip => None,
            MultiSourcePolicy::Ask => {
                let options: Vec<String> = candidates
                    .iter()
                    .map(|c| format!("{} [{}]", c.value, c.source))
                    .collect();
                let question = Question::MultiSourceValue {
                    link: link.to_string(),
                    field: field.to_string(),
                };
                picked(decider.ask(&question, &options), &options).map(|idx| candidates[idx].clone())
            }
        }
    }

    fn should_replace(
        &self,
        link: &str,
        field: &str,
        current: &Value,
        incoming: &SourceValue,
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> ReplaceDecision {
        if let Some(decision) = self.known_replacement(field, ctx) {
            return decision;
        }

        let options = replace_labels(field);
        let question = Question::Replace {
            link: link.to_string(),
            field: field.to_string(),
            current: current.to_string(),
            incoming: incoming.value.to_string(),
        };
        match picked(decider.ask(&question, &options), &options) {
            Some(idx) => {
                let (decision, scope) = REPLACE_ANSWERS[idx];
                ctx.remember_replacement(field, scope, decision);
                decision
            }
            None => ReplaceDecision::Skip,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
