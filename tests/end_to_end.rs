use std::fs;

use tabular_reconcile::csv_io::{read_dataset, read_datasets, write_dataset};
use tabular_reconcile::{
    flatten, group, normalize, normalize_amount, BatchDecider, Classification, ConflictClassifier,
    ConflictPolicy, ConflictResolver, Dataset, FieldRegistry, LinkMatching, MergeEngine, MultiSourcePolicy, ReconcileConfig,
    ReconcileError, Record, RunContext, SchemaReconciler, SyncEngine, Value,
};
use tempfile::TempDir;

fn cols(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn sheet(id: &str, columns: &[&str], rows: &[&[&str]]) -> Dataset {
    rows.iter().fold(Dataset::new(id, cols(columns)), |d, row| {
        d.with_row(row.iter().map(|v| Value::from(*v)).collect())
    })
}

fn merge_engine() -> MergeEngine {
    MergeEngine::new(
        cols(&["id", "name"]),
        cols(&["id"]),
        SchemaReconciler::new(FieldRegistry::new()),
    )
}

#[test]
fn merge_collapses_whitespace_duplicate() {
    let datasets = vec![
        sheet("a.csv", &["id", "name"], &[&["001", "Alice"]]),
        sheet("b.csv", &["id", "name"], &[&["001", "Alice "]]),
    ];

    let outcome = merge_engine()
        .run(&datasets, &mut RunContext::new(), &mut BatchDecider)
        .unwrap();

    assert_eq!(outcome.merged.len(), 1);
    assert_eq!(outcome.merged.cell(0, "id"), Some(&Value::text("001")));
    assert_eq!(outcome.merged.cell(0, "name"), Some(&Value::text("Alice")));
    assert_eq!(outcome.clusters[0].classification, Classification::Trivial);
}

#[test]
fn merge_reports_three_way_conflict() {
    let datasets = vec![
        sheet("a.csv", &["id", "name"], &[&["001", "Alice"]]),
        sheet("b.csv", &["id", "name"], &[&["001", "Alice "]]),
        sheet("c.csv", &["id", "name"], &[&["001", "Bob"]]),
    ];

    let outcome = merge_engine()
        .run(&datasets, &mut RunContext::new(), &mut BatchDecider)
        .unwrap();

    let report = &outcome.clusters[0];
    assert_eq!(report.cluster.len(), 3);
    let conflicts = report.classification.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].field, "name");
    assert_eq!(conflicts[0].displays(), vec!["Alice", "Bob"]);
    assert_eq!(outcome.merged.len(), 1);
}

#[test]
fn grouping_resolved_output_is_idempotent() {
    let datasets = vec![
        sheet("a.csv", &["id", "name"], &[&["001", "Alice"], &["002", "Bob"]]),
        sheet("b.csv", &["id", "name"], &[&["001", "Alicia"], &["003", "Carol"]]),
    ];
    let engine = merge_engine().with_policy(ConflictPolicy::MajorityValue);
    let outcome = engine
        .run(&datasets, &mut RunContext::new(), &mut BatchDecider)
        .unwrap();

    let records: Vec<Record> = outcome
        .merged
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            Record::new(
                "merged",
                i,
                outcome.merged.columns.iter().cloned().zip(row.iter().cloned()).collect(),
            )
        })
        .collect();

    let regrouped = group(&flatten(&group(&records, &cols(&["id"]))), &cols(&["id"]));
    assert!(regrouped.iter().all(|c| c.len() == 1));
}

#[test]
fn trivial_clusters_resolve_to_one_equal_record() {
    let records = vec![
        Record::new(
            "a",
            0,
            vec![("id".to_string(), Value::Number(7.0)), ("score".to_string(), Value::Empty)],
        ),
        Record::new(
            "b",
            0,
            vec![("id".to_string(), Value::text("7")), ("score".to_string(), Value::text(" "))],
        ),
    ];
    let keys = cols(&["id"]);
    let cluster = group(&records, &keys).remove(0);
    let classification = ConflictClassifier::new(&keys, &FieldRegistry::new()).classify(&cluster);

    let resolution = ConflictResolver::new(ConflictPolicy::Auto, &keys).resolve(
        &cluster,
        &classification,
        &mut RunContext::new(),
        &mut BatchDecider,
    );

    assert!(classification.is_trivial());
    assert_eq!(resolution.survivors.len(), 1);
    for member in &cluster.members {
        for (field, value) in member.values() {
            assert_eq!(normalize(value), normalize(resolution.survivors[0].get(field).unwrap()));
        }
    }
}

#[test]
fn amount_normalization_uses_tolerance() {
    let a = normalize_amount(&Value::text("¥1,000.00"));
    let b = normalize_amount(&Value::text("1000"));
    let c = normalize_amount(&Value::text("1000.00"));
    let d = normalize_amount(&Value::text("1000.02"));

    assert!(a.matches(&b) && b.matches(&c) && a.matches(&c));
    assert!(!d.matches(&c));
}

#[test]
fn exact_column_wins_over_alias() {
    let reconciler = SchemaReconciler::default();
    let mapping = reconciler.reconcile(&cols(&["学号"]), &cols(&["学号", "学生编号"]));
    assert_eq!(mapping.column_for("学号"), Some("学号"));
}

fn sync_with(policy: MultiSourcePolicy) -> (Dataset, usize) {
    let target = sheet("target.csv", &["id", "score"], &[&["005", ""]]);
    let sources = vec![
        sheet("s1.csv", &["id", "score"], &[&["005", "88"]]),
        sheet("s2.csv", &["id", "score"], &[&["005", "92"]]),
    ];

    let result = SyncEngine::new("id", cols(&["score"]), SchemaReconciler::default())
        .with_multi_source(policy)
        .run(&target, &sources, &mut RunContext::new(), &mut BatchDecider)
        .unwrap();
    (result.target, result.stats.skipped_rows)
}

#[test]
fn sync_multi_source_policies() {
    let (first, _) = sync_with(MultiSourcePolicy::First);
    assert_eq!(first.cell(0, "score"), Some(&Value::text("88")));

    let (last, _) = sync_with(MultiSourcePolicy::Last);
    assert_eq!(last.cell(0, "score"), Some(&Value::text("92")));

    let (skipped, skipped_rows) = sync_with(MultiSourcePolicy::Skip);
    assert_eq!(skipped.cell(0, "score"), Some(&Value::Empty));
    assert_eq!(skipped_rows, 1);
}

#[test]
fn near_miss_link_never_overrides_a_known_link() {
    let target = sheet("target.csv", &["学号", "成绩"], &[&["20230001", ""], &["20230004", ""]]);
    let sources = vec![sheet(
        "s1.csv",
        &["学号", "成绩"],
        &[&["20230001", ""], &["20230003", "90"]],
    )];

    let result = SyncEngine::new("学号", cols(&["成绩"]), SchemaReconciler::default())
        .with_link_matching(LinkMatching::NearMiss)
        .run(&target, &sources, &mut RunContext::new(), &mut BatchDecider)
        .unwrap();

    assert_eq!(result.target.cell(0, "成绩"), Some(&Value::Empty));
    assert_eq!(result.target.cell(1, "成绩"), Some(&Value::text("90")));
    assert_eq!(result.changes.len(), 1);
    assert_eq!(result.changes[0].matched.as_deref(), Some("20230003"));
}

#[test]
fn csv_merge_round_trip_through_config() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("class_a.csv");
    let b = dir.path().join("class_b.csv");
    fs::write(&a, "学号,姓名,成绩\n2020001,张三,90\n2020002,李四,85\n").unwrap();
    fs::write(&b, "学生编号,学生姓名,分数\n2020001,张三,90.0\n2020003,王五,77\n").unwrap();

    let config = ReconcileConfig::from_json_str(
        r#"{
            "selected_fields": ["学号", "学生姓名", "成绩"],
            "key_fields": ["学号"],
            "provenance_column": "来源"
        }"#,
    )
    .unwrap();

    let datasets = read_datasets(&[a, b]);
    let outcome = config
        .merge_engine()
        .unwrap()
        .run(&datasets, &mut config.run_context(), &mut BatchDecider)
        .unwrap();

    assert_eq!(outcome.merged.len(), 3);
    assert_eq!(outcome.stats.trivial_clusters, 1);

    let out = dir.path().join("merged.csv");
    write_dataset(&out, &outcome.merged).unwrap();
    let reread = read_dataset(&out).unwrap();
    assert_eq!(reread.columns, cols(&["学号", "学生姓名", "成绩", "来源"]));
    assert_eq!(reread.cell(2, "学生姓名"), Some(&Value::text("王五")));
    assert_eq!(reread.cell(0, "来源"), Some(&Value::text("class_a.csv")));
}

#[test]
fn no_readable_inputs_is_fatal() {
    let err = merge_engine()
        .run(&[], &mut RunContext::new(), &mut BatchDecider)
        .unwrap_err();
    assert_eq!(err, ReconcileError::NoInputDatasets);
    assert!(err.is_fatal());
}
