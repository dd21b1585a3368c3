// 🔍 Identity Grouper - cluster records that share a key-field tuple
// Stable: first appearance decides cluster order, input order decides member order.

use crate::model::Record;
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

// ============================================================================
// CLUSTER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// 1-based, in order of first appearance
    pub id: usize,

    /// Normalized key-field values
    pub key: Vec<String>,

    /// Never empty
    pub members: Vec<Record>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Clusters of size 1 are not duplicate candidates.
    pub fn is_duplicate(&self) -> bool {
        self.members.len() > 1
    }

    pub fn first(&self) -> Option<&Record> {
        self.members.first()
    }

    /// SHA-256 of the key tuple, stable across runs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in &self.key {
            hasher.update(part.as_bytes());
            hasher.update(b"\x1f");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Normalized key tuple of one record.
pub fn key_of(record: &Record, key_fields: &[String]) -> Vec<String> {
    key_fields
        .iter()
        .map(|f| record.get(f).map(normalize).unwrap_or_default())
        .collect()
}

// ============================================================================
// GROUPING
// ============================================================================

/// Bucket records by equal normalized key tuples.
///
/// Records whose key tuple is entirely empty are never grouped with each
/// other; each becomes its own cluster.
pub fn group(records: &[Record], key_fields: &[String]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();

    for record in records {
        let key = key_of(record, key_fields);
        let blank = key.iter().all(String::is_empty);

        if !blank {
            if let Some(&pos) = index.get(&key) {
                clusters[pos].members.push(record.clone());
                continue;
            }
            index.insert(key.clone(), clusters.len());
        }

        clusters.push(Cluster {
            id: clusters.len() + 1,
            key,
            members: vec![record.clone()],
        });
    }

    clusters
}

/// Concatenate cluster members back into a record list, cluster order preserved.
pub fn flatten(clusters: &[Cluster]) -> Vec<Record> {
    clusters
        .iter()
        .flat_map(|c| c.members.iter().cloned())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
