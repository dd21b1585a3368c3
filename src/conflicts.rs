// ⚖️ Conflict Classifier - do a cluster's non-key fields really differ?
// Trivial clusters collapse to their first member; conflicting ones go to the resolver.

use crate::deduplication::Cluster;
use crate::error::ReconcileError;
use crate::fields::FieldRegistry;
use crate::model::Value;
use crate::normalize::{normalize, normalize_amount, values_equal};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// One normalized-distinct value observed for a conflicting field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinctValue {
    /// First raw value seen for this group
    pub value: Value,

    /// Normalized display form
    pub display: String,

    pub count: usize,

    /// Contributing provenance, first-seen order, no repeats
    pub sources: Vec<String>,

    /// Indexes of the cluster members holding this value
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,

    /// First-seen order
    pub values: Vec<DistinctValue>,
}

impl FieldConflict {
    pub fn displays(&self) -> Vec<String> {
        self.values.iter().map(|v| v.display.clone()).collect()
    }

    /// `field: value ×count [sources] | ...`
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .values
            .iter()
            .map(|v| format!("{} ×{} [{}]", v.display, v.count, v.sources.join(", ")))
            .collect();
        format!("{}: {}", self.field, parts.join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Classification {
    Trivial,
    /// Differing fields in record field order
    Conflicting(Vec<FieldConflict>),
}

impl Classification {
    pub fn is_trivial(&self) -> bool {
        matches!(self, Classification::Trivial)
    }

    pub fn conflicts(&self) -> &[FieldConflict] {
        match self {
            Classification::Trivial => &[],
            Classification::Conflicting(conflicts) => conflicts,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Classification::Trivial => "trivial",
            Classification::Conflicting(_) => "conflicting",
        }
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct ConflictClassifier {
    key_fields: Vec<String>,
    amount_fields: HashSet<String>,
}

impl ConflictClassifier {
    pub fn new(key_fields: &[String], registry: &FieldRegistry) -> Self {
        let amount_fields = registry
            .names()
            .into_iter()
            .filter(|name| registry.is_amount_like(name))
            .map(str::to_string)
            .collect();

        ConflictClassifier {
            key_fields: key_fields.to_vec(),
            amount_fields,
        }
    }

    fn is_amount_like(&self, field: &str) -> bool {
        self.amount_fields.contains(field)
    }

    /// Compare every member's non-key fields against the first member.
    pub fn classify(&self, cluster: &Cluster) -> Classification {
        let Some(first) = cluster.first() else {
            return Classification::Trivial;
        };
        if !cluster.is_duplicate() {
            return Classification::Trivial;
        }

        let conflicts: Vec<FieldConflict> = first
            .fields()
            .filter(|f| !self.key_fields.iter().any(|k| k == f))
            .filter_map(|field| {
                let amount = self.is_amount_like(field);
                let base = first.get(field).cloned().unwrap_or_default();
                let differs = cluster.members[1..]
                    .iter()
                    .any(|m| !values_equal(&base, &m.get(field).cloned().unwrap_or_default(), amount));
                differs.then(|| self.distinct_values(cluster, field))
            })
            .collect();

        if conflicts.is_empty() {
            Classification::Trivial
        } else {
            Classification::Conflicting(conflicts)
        }
    }

    fn distinct_values(&self, cluster: &Cluster, field: &str) -> FieldConflict {
        let amount = self.is_amount_like(field);
        let mut values: Vec<DistinctValue> = Vec::new();

        for (idx, member) in cluster.members.iter().enumerate() {
            let value = member.get(field).cloned().unwrap_or_default();
            match values.iter_mut().find(|d| values_equal(&d.value, &value, amount)) {
                Some(existing) => {
                    existing.count += 1;
                    existing.members.push(idx);
                    if !existing.sources.contains(&member.provenance) {
                        existing.sources.push(member.provenance.clone());
                    }
                }
                None => values.push(DistinctValue {
                    display: normalize(&value),
                    value,
                    count: 1,
                    sources: vec![member.provenance.clone()],
                    members: vec![idx],
                }),
            }
        }

        FieldConflict {
            field: field.to_string(),
            values,
        }
    }

    /// Amount-like values that had to be compared as text.
    pub fn type_failures(&self, cluster: &Cluster) -> Vec<ReconcileError> {
        let mut failures = Vec::new();
        for member in &cluster.members {
            for (field, value) in member.values() {
                if self.is_amount_like(field) && !value.is_empty() && !normalize_amount(value).is_numeric() {
                    failures.push(ReconcileError::TypeComparisonFailure {
                        field: field.clone(),
                        value: normalize(value),
                    });
                }
            }
        }
        failures
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deduplication::group;
    use crate::fields::FieldDefinition;
    use crate::model::Record;

    fn create_test_record(source: &str, id: &str, name: &str, amount: &str) -> Record {
        Record::new(
            source,
            0,
            vec![
                ("id".to_string(), Value::text(id)),
                ("name".to_string(), Value::from(name)),
                ("amount".to_string(), Value::from(amount)),
            ],
        )
    }

    fn classifier() -> ConflictClassifier {
        let mut registry = FieldRegistry::new();
        registry.register(FieldDefinition::new("amount").amount());
        ConflictClassifier::new(&["id".to_string()], &registry)
    }

    fn cluster_of(records: Vec<Record>) -> Cluster {
        group(&records, &["id".to_string()]).remove(0)
    }

    #[test]
    fn test_trivial_after_normalization() {
        let cluster = cluster_of(vec![
            create_test_record("a", "001", "Alice", "¥1,000.00"),
            create_test_record("b", "001", "Alice ", "1000"),
            create_test_record("c", "001", " Alice", "1000.00"),
        ]);

        assert_eq!(classifier().classify(&cluster), Classification::Trivial);
    }

    #[test]
    fn test_both_empty_is_equal() {
        let cluster = cluster_of(vec![
            create_test_record("a", "001", "Alice", ""),
            create_test_record("b", "001", "Alice", ""),
        ]);

        assert!(classifier().classify(&cluster).is_trivial());
    }

    #[test]
    fn test_conflicting_distinct_values() {
        let cluster = cluster_of(vec![
            create_test_record("a", "001", "Alice", "10"),
            create_test_record("b", "001", "Alice ", "10"),
            create_test_record("c", "001", "Bob", "10"),
        ]);

        let classification = classifier().classify(&cluster);
        let conflicts = classification.conflicts();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].field, "name");
        assert_eq!(conflicts[0].displays(), vec!["Alice", "Bob"]);
        assert_eq!(conflicts[0].values[0].count, 2);
        assert_eq!(conflicts[0].values[0].sources, vec!["a", "b"]);
        assert_eq!(conflicts[0].values[1].members, vec![2]);
    }

    #[test]
    fn test_empty_versus_value_conflicts() {
        let cluster = cluster_of(vec![
            create_test_record("a", "001", "Alice", ""),
            create_test_record("b", "001", "Alice", "5"),
        ]);

        let classification = classifier().classify(&cluster);
        assert_eq!(classification.conflicts()[0].field, "amount");
        assert_eq!(classification.conflicts()[0].displays(), vec!["", "5"]);
    }

    #[test]
    fn test_summary_and_type_failures() {
        let cluster = cluster_of(vec![
            create_test_record("a.csv", "001", "Alice", "n/a"),
            create_test_record("b.csv", "001", "Bob", "n/a"),
        ]);
        let classifier = classifier();

        let classification = classifier.classify(&cluster);
        assert_eq!(
            classification.conflicts()[0].summary(),
            "name: Alice ×1 [a.csv] | Bob ×1 [b.csv]"
        );
        assert_eq!(classifier.type_failures(&cluster).len(), 2);
    }
}
