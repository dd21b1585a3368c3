// 🛠️ Conflict Resolver - turn a conflicting cluster into surviving records
// Policies never touch key fields, so survivors keep the cluster's key.

use crate::conflicts::{Classification, DistinctValue, FieldConflict};
use crate::context::{RememberScope, RunContext};
use crate::decision::{picked, DecisionProvider, Question};
use crate::deduplication::{key_of, Cluster};
use crate::model::Record;
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Keep the first member
    #[default]
    #[serde(alias = "keep_first")]
    Auto,
    /// The decision provider keeps exactly one member
    ManualPick,
    /// One record per distinct value of the most varied conflicting field
    SplitByDominantField,
    /// Most frequent value per conflicting field
    MajorityValue,
    /// The decision provider picks a value per conflicting field
    ManualFields,
    /// Drop the cluster from the merged output
    Skip,
    /// Ask which policy to apply, with optional "always" escalation
    Ask,
}

impl ConflictPolicy {
    /// Policies offered when asking; `Ask` itself is never offered.
    pub const CHOICES: [ConflictPolicy; 6] = [
        ConflictPolicy::Auto,
        ConflictPolicy::ManualPick,
        ConflictPolicy::SplitByDominantField,
        ConflictPolicy::MajorityValue,
        ConflictPolicy::ManualFields,
        ConflictPolicy::Skip,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::Auto => "auto",
            ConflictPolicy::ManualPick => "manual_pick",
            ConflictPolicy::SplitByDominantField => "split_by_dominant_field",
            ConflictPolicy::MajorityValue => "majority_value",
            ConflictPolicy::ManualFields => "manual_fields",
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Ask => "ask",
        }
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Policy actually applied (never `Ask`)
    pub policy: ConflictPolicy,

    /// Zero or more records, each holding the cluster's key
    pub survivors: Vec<Record>,
}

impl Resolution {
    fn new(policy: ConflictPolicy, survivors: Vec<Record>) -> Self {
        Resolution { policy, survivors }
    }

    pub fn label(&self) -> String {
        match self.survivors.len() {
            0 => format!("{} (dropped)", self.policy.name()),
            1 => self.policy.name().to_string(),
            n => format!("{} ({} records)", self.policy.name(), n),
        }
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

pub struct ConflictResolver {
    pub policy: ConflictPolicy,
    key_fields: Vec<String>,
}

impl ConflictResolver {
    pub fn new(policy: ConflictPolicy, key_fields: &[String]) -> Self {
        ConflictResolver {
            policy,
            key_fields: key_fields.to_vec(),
        }
    }

    /// Resolve one cluster. Trivial clusters always collapse to their first member.
    pub fn resolve(
        &self,
        cluster: &Cluster,
        classification: &Classification,
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> Resolution {
        let conflicts = classification.conflicts();
        if conflicts.is_empty() {
            return Resolution::new(ConflictPolicy::Auto, cluster.first().cloned().into_iter().collect());
        }

        let policy = match self.policy {
            ConflictPolicy::Ask => self.ask_policy(cluster, conflicts, ctx, decider),
            policy => policy,
        };

        let survivors = match policy {
            ConflictPolicy::Auto | ConflictPolicy::Ask => cluster.first().cloned().into_iter().collect(),
            ConflictPolicy::ManualPick => manual_pick(cluster, decider),
            ConflictPolicy::SplitByDominantField => split_by_dominant_field(cluster, conflicts),
            ConflictPolicy::MajorityValue => majority_value(cluster, conflicts),
            ConflictPolicy::ManualFields => manual_fields(cluster, conflicts, decider),
            ConflictPolicy::Skip => Vec::new(),
        };

        debug_assert!(survivors.iter().all(|r| key_of(r, &self.key_fields) == cluster.key));
        debug!(cluster = cluster.id, policy = policy.name(), survivors = survivors.len(), "cluster resolved");

        Resolution::new(policy, survivors)
    }

    /// Cached policy for the primary conflicting field, else ask and maybe remember.
    fn ask_policy(
        &self,
        cluster: &Cluster,
        conflicts: &[FieldConflict],
        ctx: &mut RunContext,
        decider: &mut dyn DecisionProvider,
    ) -> ConflictPolicy {
        let field = conflicts[0].field.as_str();
        if let Some(policy) = ctx.cached_policy(field) {
            return policy;
        }

        let options: Vec<String> = ConflictPolicy::CHOICES.iter().map(|p| p.name().to_string()).collect();
        let question = Question::ResolveCluster {
            cluster_id: cluster.id,
            key: cluster.key.clone(),
            conflicts: conflicts.iter().map(FieldConflict::summary).collect(),
        };
        let policy = match picked(decider.ask(&question, &options), &options) {
            Some(idx) => ConflictPolicy::CHOICES[idx],
            None => ConflictPolicy::Skip,
        };

        let scopes: Vec<String> = RememberScope::SCOPES.iter().map(|s| s.label(field)).collect();
        let remember = Question::RememberPolicy {
            field: field.to_string(),
        };
        if let Some(idx) = picked(decider.ask(&remember, &scopes), &scopes) {
            ctx.remember_policy(field, RememberScope::SCOPES[idx], policy);
        }

        policy
    }
}

// ============================================================================
// POLICIES
// ============================================================================

fn manual_pick(cluster: &Cluster, decider: &mut dyn DecisionProvider) -> Vec<Record> {
    let options: Vec<String> = cluster.members.iter().map(describe).collect();
    let question = Question::PickMember { cluster_id: cluster.id };

    picked(decider.ask(&question, &options), &options)
        .map(|idx| vec![cluster.members[idx].clone()])
        .unwrap_or_default()
}

/// Most distinct values wins; ties go to the earlier field.
fn dominant(conflicts: &[FieldConflict]) -> Option<&FieldConflict> {
    conflicts.iter().fold(None, |best: Option<&FieldConflict>, c| match best {
        Some(b) if b.values.len() >= c.values.len() => Some(b),
        _ => Some(c),
    })
}

fn split_by_dominant_field(cluster: &Cluster, conflicts: &[FieldConflict]) -> Vec<Record> {
    let Some(dominant) = dominant(conflicts) else {
        return cluster.first().cloned().into_iter().collect();
    };

    dominant
        .values
        .iter()
        .filter_map(|group| {
            let lead = *group.members.first()?;
            let mut record = cluster.members[lead].clone();

            // Fill empty conflicting fields from others sharing the dominant value
            for conflict in conflicts.iter().filter(|c| c.field != dominant.field) {
                let empty = record.get(&conflict.field).map_or(true, |v| v.is_empty());
                if !empty {
                    continue;
                }
                let filler = group.members[1..]
                    .iter()
                    .filter_map(|&i| cluster.members[i].get(&conflict.field))
                    .find(|v| !v.is_empty());
                if let Some(value) = filler {
                    record = record.with_value(&conflict.field, value.clone());
                }
            }

            Some(record)
        })
        .collect()
}

fn majority_value(cluster: &Cluster, conflicts: &[FieldConflict]) -> Vec<Record> {
    let Some(first) = cluster.first() else {
        return Vec::new();
    };

    let record = conflicts.iter().fold(first.clone(), |record, conflict| {
        let winner = conflict
            .values
            .iter()
            .fold(None, |best: Option<&DistinctValue>, v| match best {
                Some(b) if b.count >= v.count => Some(b),
                _ => Some(v),
            });
        match winner {
            Some(v) => record.with_value(&conflict.field, v.value.clone()),
            None => record,
        }
    });

    vec![record]
}

fn manual_fields(cluster: &Cluster, conflicts: &[FieldConflict], decider: &mut dyn DecisionProvider) -> Vec<Record> {
    let Some(first) = cluster.first() else {
        return Vec::new();
    };

    let mut record = first.clone();
    for conflict in conflicts {
        let options = conflict.displays();
        let question = Question::PickFieldValue {
            cluster_id: cluster.id,
            field: conflict.field.clone(),
        };
        if let Some(idx) = picked(decider.ask(&question, &options), &options) {
            record = record.with_value(&conflict.field, conflict.values[idx].value.clone());
        }
    }

    vec![record]
}

fn describe(record: &Record) -> String {
    let values: Vec<String> = record
        .values()
        .iter()
        .map(|(field, value)| format!("{}={}", field, value))
        .collect();
    format!("[{} row {}] {}", record.provenance, record.source_row + 1, values.join(", "))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflicts::ConflictClassifier;
    use crate::decision::{BatchDecider, Choice, ScriptedDecider};
    use crate::deduplication::group;
    use crate::fields::FieldRegistry;
    use crate::model::Value;

    fn create_test_record(source: &str, id: &str, name: &str, class: &str) -> Record {
        Record::new(
            source,
            0,
            vec![
                ("id".to_string(), Value::text(id)),
                ("name".to_string(), Value::from(name)),
                ("class".to_string(), Value::from(class)),
            ],
        )
    }

    fn keys() -> Vec<String> {
        vec!["id".to_string()]
    }

    fn classified(records: Vec<Record>) -> (Cluster, Classification) {
        let cluster = group(&records, &keys()).remove(0);
        let classification = ConflictClassifier::new(&keys(), &FieldRegistry::new()).classify(&cluster);
        (cluster, classification)
    }

    fn conflicting() -> (Cluster, Classification) {
        classified(vec![
            create_test_record("a", "001", "Alice", "1"),
            create_test_record("b", "001", "Bob", ""),
            create_test_record("c", "001", "Alice", "2"),
            create_test_record("d", "001", "Bob", "3"),
        ])
    }

    fn resolve(policy: ConflictPolicy, decider: &mut dyn DecisionProvider) -> Resolution {
        let (cluster, classification) = conflicting();
        ConflictResolver::new(policy, &keys()).resolve(&cluster, &classification, &mut RunContext::new(), decider)
    }

    #[test]
    fn test_trivial_collapses_to_first() {
        let (cluster, classification) = classified(vec![
            create_test_record("a", "001", "Alice", "1"),
            create_test_record("b", "001", "Alice ", "1"),
        ]);

        let resolution = ConflictResolver::new(ConflictPolicy::Skip, &keys()).resolve(
            &cluster,
            &classification,
            &mut RunContext::new(),
            &mut BatchDecider,
        );

        assert_eq!(resolution.survivors.len(), 1);
        assert_eq!(resolution.survivors[0].provenance, "a");
    }

    #[test]
    fn test_auto_keeps_first() {
        let resolution = resolve(ConflictPolicy::Auto, &mut BatchDecider);
        assert_eq!(resolution.survivors.len(), 1);
        assert_eq!(resolution.survivors[0].get("name"), Some(&Value::text("Alice")));
    }

    #[test]
    fn test_skip_drops_cluster() {
        let resolution = resolve(ConflictPolicy::Skip, &mut BatchDecider);
        assert!(resolution.survivors.is_empty());
        assert_eq!(resolution.label(), "skip (dropped)");
    }

    #[test]
    fn test_manual_pick() {
        let mut decider = ScriptedDecider::new([Choice::Pick(3)]);
        let resolution = resolve(ConflictPolicy::ManualPick, &mut decider);

        assert_eq!(resolution.survivors[0].provenance, "d");
        assert_eq!(decider.asked[0].1.len(), 4);

        let mut decider = ScriptedDecider::new([Choice::Skip]);
        assert!(resolve(ConflictPolicy::ManualPick, &mut decider).survivors.is_empty());
    }

    #[test]
    fn test_majority_value() {
        let (cluster, classification) = classified(vec![
            create_test_record("a", "001", "A", "x"),
            create_test_record("b", "001", "A", "y"),
            create_test_record("c", "001", "B", "y"),
        ]);

        let resolution = ConflictResolver::new(ConflictPolicy::MajorityValue, &keys()).resolve(
            &cluster,
            &classification,
            &mut RunContext::new(),
            &mut BatchDecider,
        );

        assert_eq!(resolution.survivors.len(), 1);
        assert_eq!(resolution.survivors[0].get("name"), Some(&Value::text("A")));
        assert_eq!(resolution.survivors[0].get("class"), Some(&Value::text("y")));
        assert_eq!(resolution.survivors[0].provenance, "a");
    }

    #[test]
    fn test_majority_tie_takes_first_seen() {
        let resolution = resolve(ConflictPolicy::MajorityValue, &mut BatchDecider);
        assert_eq!(resolution.survivors[0].get("name"), Some(&Value::text("Alice")));
        assert_eq!(resolution.survivors[0].get("class"), Some(&Value::text("1")));
    }

    #[test]
    fn test_split_by_dominant_field() {
        // class has 4 distinct values (incl. empty), name has 2
        let resolution = resolve(ConflictPolicy::SplitByDominantField, &mut BatchDecider);
        assert_eq!(resolution.survivors.len(), 4);
        assert!(resolution.survivors.iter().all(|r| r.get("id") == Some(&Value::text("001"))));
    }

    #[test]
    fn test_split_fills_empty_from_same_group() {
        let (cluster, classification) = classified(vec![
            create_test_record("a", "001", "Alice", ""),
            create_test_record("b", "001", "Bob", "2"),
            create_test_record("c", "001", "Alice", "1"),
            create_test_record("d", "001", "Bob", "3"),
            create_test_record("e", "001", "Carol", "3"),
        ]);
        // name: Alice, Bob, Carol (3) vs class: "", 2, 1, 3 (4) → class dominates
        let resolution = ConflictResolver::new(ConflictPolicy::SplitByDominantField, &keys()).resolve(
            &cluster,
            &classification,
            &mut RunContext::new(),
            &mut BatchDecider,
        );
        assert_eq!(resolution.survivors.len(), 4);

        let (cluster, classification) = classified(vec![
            create_test_record("a", "001", "Alice", ""),
            create_test_record("b", "001", "Bob", "2"),
            create_test_record("c", "001", "Alice", "1"),
        ]);
        // name: Alice, Bob (2) vs class: "", 2, 1 (3) → class dominates, no fill needed
        let resolution = ConflictResolver::new(ConflictPolicy::SplitByDominantField, &keys()).resolve(
            &cluster,
            &classification,
            &mut RunContext::new(),
            &mut BatchDecider,
        );
        assert_eq!(resolution.survivors.len(), 3);

        let (cluster, classification) = classified(vec![
            create_test_record("a", "001", "Alice", ""),
            create_test_record("b", "001", "Alice", "1"),
            create_test_record("c", "001", "Bob", "1"),
            create_test_record("d", "001", "Carol", "1"),
        ]);
        // name dominates (3 vs 2); Alice group leads with empty class, filled from b
        let resolution = ConflictResolver::new(ConflictPolicy::SplitByDominantField, &keys()).resolve(
            &cluster,
            &classification,
            &mut RunContext::new(),
            &mut BatchDecider,
        );
        assert_eq!(resolution.survivors.len(), 3);
        assert_eq!(resolution.survivors[0].get("class"), Some(&Value::text("1")));
        assert_eq!(resolution.survivors[0].provenance, "a");
    }

    #[test]
    fn test_manual_fields() {
        let mut decider = ScriptedDecider::new([Choice::Pick(1), Choice::Skip]);
        let resolution = resolve(ConflictPolicy::ManualFields, &mut decider);

        assert_eq!(resolution.survivors[0].get("name"), Some(&Value::text("Bob")));
        assert_eq!(resolution.survivors[0].get("class"), Some(&Value::text("1")));
    }

    #[test]
    fn test_ask_remembers_field_choice() {
        let (cluster, classification) = conflicting();
        let resolver = ConflictResolver::new(ConflictPolicy::Ask, &keys());
        let mut ctx = RunContext::new();
        // majority_value, then "always for 'name'"
        let mut decider = ScriptedDecider::new([Choice::Pick(3), Choice::Pick(1)]);

        let first = resolver.resolve(&cluster, &classification, &mut ctx, &mut decider);
        let second = resolver.resolve(&cluster, &classification, &mut ctx, &mut decider);

        assert_eq!(first.policy, ConflictPolicy::MajorityValue);
        assert_eq!(second.policy, ConflictPolicy::MajorityValue);
        assert_eq!(decider.asked.len(), 2);
        assert_eq!(ctx.cached_policy("name"), Some(ConflictPolicy::MajorityValue));
    }

    #[test]
    fn test_ask_skip_answer_drops_cluster() {
        let mut decider = ScriptedDecider::new([Choice::Skip, Choice::Pick(0)]);
        let resolution = resolve(ConflictPolicy::Ask, &mut decider);

        assert_eq!(resolution.policy, ConflictPolicy::Skip);
        assert!(resolution.survivors.is_empty());
    }

    #[test]
    fn test_policy_serde_names() {
        let policy: ConflictPolicy = serde_json::from_str("\"keep_first\"").unwrap();
        assert_eq!(policy, ConflictPolicy::Auto);
        let policy: ConflictPolicy = serde_json::from_str("\"split_by_dominant_field\"").unwrap();
        assert_eq!(policy, ConflictPolicy::SplitByDominantField);
    }
}
