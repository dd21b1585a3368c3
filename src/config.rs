// ⚙️ Configuration - one JSON bundle drives a merge or sync run

use crate::context::RunContext;
use crate::error::{ReconcileError, Result as EngineResult};
use crate::fields::{select_fields, FieldDefinition, FieldRegistry, PatternMatch};
use crate::model::Value;
use crate::reconciliation::{MergeEngine, MissingFieldPolicy};
use crate::resolution::ConflictPolicy;
use crate::schema::{SchemaReconciler, DEFAULT_SIMILARITY_THRESHOLD};
use crate::sync::{LinkMatching, MultiSourcePolicy, ReplacementPolicy, SyncEngine, UnmatchedPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Declared canonical fields, layered over the built-in registry
    pub fields: Vec<FieldDefinition>,

    /// Exact names, `*` wildcards or substrings of selected fields
    pub key_fields: Vec<String>,

    pub selected_fields: Vec<String>,

    /// Join field for sync runs
    pub link_field: Option<String>,

    pub similarity_threshold: f64,
    pub conflict_policy: ConflictPolicy,
    pub replacement_policy: ReplacementPolicy,
    pub multi_source_conflict_policy: MultiSourcePolicy,
    pub field_defaults: BTreeMap<String, Value>,

    pub missing_field_policy: MissingFieldPolicy,
    pub unmatched_policy: UnmatchedPolicy,
    pub link_matching: LinkMatching,

    /// `None` leaves provenance out of the merged output
    pub provenance_column: Option<String>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        ReconcileConfig {
            fields: Vec::new(),
            key_fields: Vec::new(),
            selected_fields: Vec::new(),
            link_field: None,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            conflict_policy: ConflictPolicy::default(),
            replacement_policy: ReplacementPolicy::default(),
            multi_source_conflict_policy: MultiSourcePolicy::default(),
            field_defaults: BTreeMap::new(),
            missing_field_policy: MissingFieldPolicy::default(),
            unmatched_policy: UnmatchedPolicy::default(),
            link_matching: LinkMatching::default(),
            provenance_column: Some("source".to_string()),
        }
    }
}

impl ReconcileConfig {
    /// Load and validate a JSON config file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ReconcileConfig = serde_json::from_str(json).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ReconcileError::InvalidConfig(format!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !self.key_fields.is_empty() && self.selected_fields.is_empty() {
            return Err(ReconcileError::InvalidConfig(
                "key_fields require selected_fields".to_string(),
            ));
        }
        self.resolved_key_fields().map(|_| ())
    }

    /// Key patterns resolved against the selected fields: exact, wildcard, contains.
    pub fn resolved_key_fields(&self) -> EngineResult<Vec<String>> {
        let mut resolved: Vec<String> = Vec::new();
        for pattern in &self.key_fields {
            let (matched, kind) = select_fields(pattern, &self.selected_fields);
            if kind == PatternMatch::NoMatch {
                return Err(ReconcileError::UnknownKeyField(pattern.clone()));
            }
            for field in matched {
                if !resolved.contains(&field) {
                    resolved.push(field);
                }
            }
        }
        Ok(resolved)
    }

    pub fn link_field(&self) -> EngineResult<&str> {
        self.link_field
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| ReconcileError::InvalidConfig("sync requires link_field".to_string()))
    }

    /// Built-in fields overridden by the configured ones
    pub fn field_registry(&self) -> FieldRegistry {
        let mut registry = FieldRegistry::with_defaults();
        for field in &self.fields {
            registry.register(field.clone());
        }
        registry
    }

    pub fn run_context(&self) -> RunContext {
        RunContext::new().with_field_defaults(self.field_defaults.clone().into_iter().collect())
    }

    pub fn schema_reconciler(&self) -> SchemaReconciler {
        SchemaReconciler::new(self.field_registry()).with_threshold(self.similarity_threshold)
    }

    pub fn merge_engine(&self) -> EngineResult<MergeEngine> {
        if self.selected_fields.is_empty() {
            return Err(ReconcileError::InvalidConfig("merge requires selected_fields".to_string()));
        }
        Ok(MergeEngine::new(
            self.selected_fields.clone(),
            self.resolved_key_fields()?,
            self.schema_reconciler(),
        )
        .with_policy(self.conflict_policy)
        .with_missing_field_policy(self.missing_field_policy)
        .with_provenance_column(self.provenance_column.clone()))
    }

    pub fn sync_engine(&self) -> EngineResult<SyncEngine> {
        let link_field = self.link_field()?;
        if self.selected_fields.iter().all(|f| f == link_field) {
            return Err(ReconcileError::InvalidConfig(
                "sync requires at least one selected field besides the link field".to_string(),
            ));
        }
        Ok(
            SyncEngine::new(link_field, self.selected_fields.clone(), self.schema_reconciler())
                .with_replacement(self.replacement_policy)
                .with_multi_source(self.multi_source_conflict_policy)
                .with_unmatched(self.unmatched_policy)
                .with_link_matching(self.link_matching),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::from_json_str("{}").unwrap();

        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.conflict_policy, ConflictPolicy::Auto);
        assert_eq!(config.replacement_policy, ReplacementPolicy::AskEachTime);
        assert_eq!(config.multi_source_conflict_policy, MultiSourcePolicy::Ask);
        assert_eq!(config.link_matching, LinkMatching::Exact);
        assert_eq!(config.provenance_column.as_deref(), Some("source"));
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "fields": [{"name": "fee", "aliases": ["cost"], "amount_like": true}],
            "selected_fields": ["学号", "学生姓名", "fee"],
            "key_fields": ["*号"],
            "link_field": "学号",
            "similarity_threshold": 0.75,
            "conflict_policy": "majority_value",
            "replacement_policy": "replace_all",
            "multi_source_conflict_policy": "last",
            "field_defaults": {"fee": 0, "学生姓名": "unknown"},
            "unmatched_policy": "use_default",
            "link_matching": "near_miss",
            "provenance_column": null
        }"#;

        let config = ReconcileConfig::from_json_str(json).unwrap();

        assert_eq!(config.resolved_key_fields().unwrap(), vec!["学号"]);
        assert_eq!(config.field_defaults.get("fee"), Some(&Value::Number(0.0)));
        assert!(config.field_registry().is_amount_like("fee"));
        assert!(config.provenance_column.is_none());

        let ctx = config.run_context();
        assert_eq!(ctx.field_default("学生姓名"), Some(&Value::text("unknown")));

        let sync = config.sync_engine().unwrap();
        assert_eq!(sync.fields, vec!["学生姓名", "fee"]);
        assert_eq!(sync.link_matching, LinkMatching::NearMiss);
    }

    #[test]
    fn test_validation_errors() {
        let err = ReconcileConfig::from_json_str(r#"{"similarity_threshold": 1.5}"#).unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));

        let config = ReconcileConfig {
            selected_fields: vec!["name".to_string()],
            key_fields: vec!["phone".to_string()],
            ..ReconcileConfig::default()
        };
        assert_eq!(config.validate(), Err(ReconcileError::UnknownKeyField("phone".to_string())));

        assert!(matches!(
            ReconcileConfig::default().sync_engine(),
            Err(ReconcileError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"selected_fields": ["id"], "key_fields": ["id"]}}"#).unwrap();

        let config = ReconcileConfig::from_file(file.path()).unwrap();
        assert_eq!(config.merge_engine().unwrap().key_fields, vec!["id"]);

        assert!(ReconcileConfig::from_file("/nonexistent/config.json").is_err());
    }
}
