// 🧭 Run Context - mutable state scoped to exactly one reconciliation run
// Decision caches, replacement mode, field defaults and collected warnings.

use crate::error::ReconcileError;
use crate::model::Value;
use crate::resolution::ConflictPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cached answer to "replace the existing target value?"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplaceDecision {
    Replace,
    Skip,
}

/// How far a remembered decision reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RememberScope {
    /// Only the current unit
    Once,
    /// Every later unit for the same field
    Field,
    /// Every later unit, whatever the field
    All,
}

impl RememberScope {
    pub const SCOPES: [RememberScope; 3] = [RememberScope::Once, RememberScope::Field, RememberScope::All];

    pub fn label(&self, field: &str) -> String {
        match self {
            RememberScope::Once => "this time only".to_string(),
            RememberScope::Field => format!("always for '{}'", field),
            RememberScope::All => "always for every field".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,

    field_defaults: HashMap<String, Value>,

    replace_all: Option<ReplaceDecision>,
    replace_by_field: HashMap<String, ReplaceDecision>,

    policy_all: Option<ConflictPolicy>,
    policy_by_field: HashMap<String, ConflictPolicy>,

    warnings: Vec<ReconcileError>,
}

impl RunContext {
    pub fn new() -> Self {
        RunContext {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            field_defaults: HashMap::new(),
            replace_all: None,
            replace_by_field: HashMap::new(),
            policy_all: None,
            policy_by_field: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_field_defaults(mut self, defaults: HashMap<String, Value>) -> Self {
        self.field_defaults = defaults;
        self
    }

    // ========================================================================
    // FIELD DEFAULTS
    // ========================================================================

    pub fn field_default(&self, field: &str) -> Option<&Value> {
        self.field_defaults.get(field)
    }

    pub fn set_field_default(&mut self, field: &str, value: Value) {
        self.field_defaults.insert(field.to_string(), value);
    }

    // ========================================================================
    // REPLACEMENT CACHE
    // ========================================================================

    /// A global decision wins over a per-field one.
    pub fn cached_replacement(&self, field: &str) -> Option<ReplaceDecision> {
        self.replace_all.or_else(|| self.replace_by_field.get(field).copied())
    }

    pub fn remember_replacement(&mut self, field: &str, scope: RememberScope, decision: ReplaceDecision) {
        debug!(field, ?scope, ?decision, "replacement decision");
        match scope {
            RememberScope::Once => {}
            RememberScope::Field => {
                self.replace_by_field.insert(field.to_string(), decision);
            }
            RememberScope::All => self.replace_all = Some(decision),
        }
    }

    // ========================================================================
    // CLUSTER POLICY CACHE
    // ========================================================================

    pub fn cached_policy(&self, field: &str) -> Option<ConflictPolicy> {
        self.policy_all.or_else(|| self.policy_by_field.get(field).copied())
    }

    pub fn remember_policy(&mut self, field: &str, scope: RememberScope, policy: ConflictPolicy) {
        debug!(field, ?scope, ?policy, "cluster policy decision");
        match scope {
            RememberScope::Once => {}
            RememberScope::Field => {
                self.policy_by_field.insert(field.to_string(), policy);
            }
            RememberScope::All => self.policy_all = Some(policy),
        }
    }

    // ========================================================================
    // WARNINGS
    // ========================================================================

    pub fn warn(&mut self, issue: ReconcileError) {
        warn!(%issue, "source-scoped issue");
        self.warnings.push(issue);
    }

    pub fn warnings(&self) -> &[ReconcileError] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ReconcileError> {
        std::mem::take(&mut self.warnings)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
