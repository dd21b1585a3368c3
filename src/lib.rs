// Tabular Reconcile - Library
// Merge heterogeneous spreadsheet datasets and supplement one from others

pub mod config;
pub mod conflicts;
pub mod console;
pub mod context;
pub mod csv_io;
pub mod decision;
pub mod deduplication;
pub mod error;
pub mod fields;
pub mod model;
pub mod normalize;
pub mod reconciliation;
pub mod report;
pub mod resolution;
pub mod schema;
pub mod sync;

// Re-export commonly used types
pub use config::ReconcileConfig;
pub use conflicts::{Classification, ConflictClassifier, DistinctValue, FieldConflict};
pub use context::{RememberScope, ReplaceDecision, RunContext};
pub use decision::{BatchDecider, Choice, DecisionProvider, Question, ScriptedDecider};
pub use deduplication::{flatten, group, Cluster};
pub use error::{ReconcileError, Result};
pub use fields::{FieldDefinition, FieldRegistry};
pub use model::{Dataset, Record, Value};
pub use normalize::{normalize, normalize_amount, values_equal, NormalizedAmount, AMOUNT_TOLERANCE};
pub use reconciliation::{MergeEngine, MergeOutcome, MergeStats, MissingFieldPolicy};
pub use resolution::{ConflictPolicy, ConflictResolver, Resolution};
pub use schema::{FieldMapping, MatchKind, SchemaMapping, SchemaReconciler};
pub use sync::{
    near_miss, LinkMatching, MultiSourcePolicy, ReplacementPolicy, SyncEngine, SyncResult, SyncStats,
    LinkIndex, UnmatchedPolicy, ValueLookup,
};
