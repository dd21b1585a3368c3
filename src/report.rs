// 📊 Reports - tabular views of merge and sync results for the I/O layer
// Every report is a plain Dataset so any writer can persist it.

use crate::model::{Dataset, Value};
use crate::reconciliation::MergeOutcome;
use crate::sync::SyncResult;

fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

fn count(n: usize) -> Value {
    Value::Number(n as f64)
}

fn labelled(id: &str, rows: Vec<(&str, Value)>) -> Dataset {
    rows.into_iter()
        .fold(Dataset::new(id, vec!["metric".to_string(), "value".to_string()]), |d, (k, v)| {
            d.with_row(vec![text(k), v])
        })
}

// ============================================================================
// MERGE REPORTS
// ============================================================================

/// One row per member of every duplicate cluster.
pub fn duplicate_report(outcome: &MergeOutcome) -> Dataset {
    let fields: Vec<String> = outcome
        .merged
        .columns
        .iter()
        .filter(|c| outcome.clusters.iter().any(|r| r.cluster.members.iter().any(|m| m.get(c).is_some())))
        .cloned()
        .collect();

    let mut columns: Vec<String> = [
        "cluster_id",
        "fingerprint",
        "cluster_size",
        "status",
        "resolution",
        "key",
        "source",
        "source_row",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    columns.extend(fields.iter().cloned());
    columns.push("conflicts".to_string());

    let mut report = Dataset::new("duplicates", columns);

    for entry in &outcome.clusters {
        let conflicts: Vec<String> = entry
            .classification
            .conflicts()
            .iter()
            .map(|c| c.summary())
            .collect();

        for member in &entry.cluster.members {
            let mut row = vec![
                count(entry.cluster.id),
                text(entry.cluster.fingerprint()),
                count(entry.cluster.len()),
                text(entry.classification.label()),
                text(entry.resolution.label()),
                text(entry.cluster.key.join(" | ")),
                text(member.provenance.clone()),
                count(member.source_row + 1),
            ];
            row.extend(fields.iter().map(|f| member.get(f).cloned().unwrap_or_default()));
            row.push(text(conflicts.join("; ")));
            report.push_row(row);
        }
    }

    report
}

pub fn merge_stats_report(outcome: &MergeOutcome) -> Dataset {
    let s = &outcome.stats;
    labelled(
        "merge_stats",
        vec![
            ("output_records", count(s.output_records)),
            ("input_records", count(s.input_records)),
            ("datasets_processed", count(s.datasets_processed)),
            ("datasets_skipped", count(s.datasets_skipped)),
            ("selected_fields", count(s.selected_fields)),
            ("dedup_enabled", text(if s.dedup_enabled { "yes" } else { "no" })),
            ("key_fields", count(s.key_fields)),
            ("duplicate_clusters", count(s.duplicate_clusters)),
            ("trivial_clusters", count(s.trivial_clusters)),
            ("conflicting_clusters", count(s.conflicting_clusters)),
            ("skipped_clusters", count(s.skipped_clusters)),
            ("records_removed", count(s.records_removed)),
            ("warnings", count(outcome.warnings.len())),
            ("run_id", text(s.run_id.to_string())),
            ("processed_at", text(s.processed_at.format("%Y-%m-%d %H:%M:%S").to_string())),
        ],
    )
}

pub fn field_summary_report(outcome: &MergeOutcome) -> Dataset {
    outcome.field_summary.iter().fold(
        Dataset::new(
            "field_summary",
            vec!["field".to_string(), "non_empty".to_string(), "empty".to_string()],
        ),
        |d, s| d.with_row(vec![text(s.field.clone()), count(s.non_empty), count(s.empty)]),
    )
}

// ============================================================================
// SYNC REPORTS
// ============================================================================

pub fn sync_stats_report(result: &SyncResult) -> Dataset {
    let s = &result.stats;
    labelled(
        "sync_stats",
        vec![
            ("source_datasets", count(s.source_datasets)),
            ("source_records", count(s.source_records)),
            ("target_rows", count(s.target_rows)),
            ("updated_rows", count(s.updated_rows)),
            ("skipped_rows", count(s.skipped_rows)),
            ("unmatched_rows", count(s.unmatched_rows)),
            ("failed_rows", count(s.failed_rows)),
            ("success_rate", text(format!("{:.1}%", s.success_rate * 100.0))),
            ("warnings", count(result.warnings.len())),
        ],
    )
}

pub fn sync_changes_report(result: &SyncResult) -> Dataset {
    let columns = ["row", "link", "matched", "field", "old", "new", "source", "outcome"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    result.changes.iter().fold(Dataset::new("sync_changes", columns), |d, c| {
        d.with_row(vec![
            count(c.row + 1),
            text(c.link.clone()),
            c.matched.clone().map(Value::Text).unwrap_or_default(),
            text(c.field.clone()),
            c.old.clone(),
            c.new.clone(),
            text(c.source.clone()),
            text(c.outcome.name()),
        ])
    })
}

pub fn sync_field_report(result: &SyncResult) -> Dataset {
    let columns = ["field", "updated", "unchanged", "skipped", "defaulted", "unmatched"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    result.field_counts.iter().fold(Dataset::new("sync_fields", columns), |d, c| {
        d.with_row(vec![
            text(c.field.clone()),
            count(c.updated),
            count(c.unchanged),
            count(c.skipped),
            count(c.defaulted),
            count(c.unmatched),
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::decision::BatchDecider;
    use crate::fields::FieldRegistry;
    use crate::reconciliation::MergeEngine;
    use crate::schema::SchemaReconciler;
    use crate::sync::{LinkMatching, ReplacementPolicy, SyncEngine};

    fn create_test_outcome() -> MergeOutcome {
        let columns = vec!["id".to_string(), "name".to_string()];
        let datasets = vec![
            Dataset::new("a.csv", columns.clone()).with_row(vec![Value::text("001"), Value::text("Alice")]),
            Dataset::new("b.csv", columns.clone()).with_row(vec![Value::text("001"), Value::text("Bob")]),
            Dataset::new("c.csv", columns.clone()).with_row(vec![Value::text("002"), Value::text("Carol")]),
        ];

        MergeEngine::new(columns, vec!["id".to_string()], SchemaReconciler::new(FieldRegistry::new()))
            .run(&datasets, &mut RunContext::new(), &mut BatchDecider)
            .unwrap()
    }

    #[test]
    fn test_duplicate_report_rows_per_member() {
        let report = duplicate_report(&create_test_outcome());

        assert_eq!(report.len(), 2);
        assert_eq!(report.cell(0, "status"), Some(&Value::text("conflicting")));
        assert_eq!(report.cell(1, "source"), Some(&Value::text("b.csv")));
        assert_eq!(report.cell(0, "resolution"), Some(&Value::text("auto")));
        assert_eq!(
            report.cell(0, "conflicts"),
            Some(&Value::text("name: Alice ×1 [a.csv] | Bob ×1 [b.csv]"))
        );
    }

    #[test]
    fn test_merge_stats_report() {
        let report = merge_stats_report(&create_test_outcome());

        assert_eq!(report.columns, vec!["metric", "value"]);
        assert_eq!(report.cell(0, "value"), Some(&Value::Number(2.0)));
        assert_eq!(report.cell(9, "value"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_field_summary_report() {
        let report = field_summary_report(&create_test_outcome());
        assert_eq!(report.len(), 2);
        assert_eq!(report.cell(1, "non_empty"), Some(&Value::Number(2.0)));
    }

    fn create_test_sync_result() -> SyncResult {
        let columns = vec!["id".to_string(), "score".to_string()];
        let sheet = |id: &str, rows: &[(&str, &str)]| {
            rows.iter().fold(Dataset::new(id, columns.clone()), |d, (link, score)| {
                d.with_row(vec![Value::from(*link), Value::from(*score)])
            })
        };
        let target = sheet("target.csv", &[("001", "60"), ("20230002", ""), ("999", "")]);
        let sources = vec![sheet("s1.csv", &[("001", "65"), ("20230003", "70")])];

        SyncEngine::new("id", vec!["score".to_string()], SchemaReconciler::new(FieldRegistry::new()))
            .with_replacement(ReplacementPolicy::ReplaceAll)
            .with_link_matching(LinkMatching::NearMiss)
            .run(&target, &sources, &mut RunContext::new(), &mut BatchDecider)
            .unwrap()
    }

    #[test]
    fn test_sync_stats_report() {
        let report = sync_stats_report(&create_test_sync_result());

        assert_eq!(report.cell(2, "metric"), Some(&Value::text("target_rows")));
        assert_eq!(report.cell(2, "value"), Some(&Value::Number(3.0)));
        assert_eq!(report.cell(5, "value"), Some(&Value::Number(1.0)));
        assert_eq!(report.cell(7, "value"), Some(&Value::text("66.7%")));
    }

    #[test]
    fn test_sync_changes_report() {
        let report = sync_changes_report(&create_test_sync_result());

        assert_eq!(report.len(), 2);
        assert_eq!(report.cell(0, "row"), Some(&Value::Number(1.0)));
        assert_eq!(report.cell(0, "old"), Some(&Value::text("60")));
        assert_eq!(report.cell(0, "new"), Some(&Value::text("65")));
        assert_eq!(report.cell(0, "outcome"), Some(&Value::text("updated")));
        assert_eq!(report.cell(1, "link"), Some(&Value::text("20230002")));
        assert_eq!(report.cell(1, "matched"), Some(&Value::text("20230003")));
        assert_eq!(report.cell(1, "old"), Some(&Value::Empty));
        assert_eq!(report.cell(1, "source"), Some(&Value::text("s1.csv")));
    }

    #[test]
    fn test_sync_field_report() {
        let report = sync_field_report(&create_test_sync_result());

        assert_eq!(report.len(), 1);
        assert_eq!(report.cell(0, "field"), Some(&Value::text("score")));
        assert_eq!(report.cell(0, "updated"), Some(&Value::Number(2.0)));
        assert_eq!(report.cell(0, "unmatched"), Some(&Value::Number(1.0)));
        assert_eq!(report.cell(0, "skipped"), Some(&Value::Number(0.0)));
    }
}
