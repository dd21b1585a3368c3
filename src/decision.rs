// 🤝 Decision Provider - every external choice the engines can ask for
// One synchronous seam: ask(question, options) -> choice.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ============================================================================
// QUESTION
// ============================================================================

/// A choice the engine cannot make on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Question {
    /// A required field has no mapped column; options are the unconsumed columns.
    PickColumn { dataset: String, field: String },

    /// A conflicting cluster needs a resolution policy; options are policy names.
    ResolveCluster {
        cluster_id: usize,
        key: Vec<String>,
        conflicts: Vec<String>,
    },

    /// Whether to remember the policy just chosen; options are the remember scopes.
    RememberPolicy { field: String },

    /// Keep exactly one cluster member; options describe the members.
    PickMember { cluster_id: usize },

    /// Pick a value for one conflicting field; options are the distinct values.
    PickFieldValue { cluster_id: usize, field: String },

    /// Several sources disagree on a link's value; options are `value [source]`.
    MultiSourceValue { link: String, field: String },

    /// Target already holds a value; options are the replacement answers.
    Replace {
        link: String,
        field: String,
        current: String,
        incoming: String,
    },
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Question::PickColumn { dataset, field } => {
                write!(f, "[{}] no column found for field '{}'", dataset, field)
            }
            Question::ResolveCluster {
                cluster_id,
                key,
                conflicts,
            } => write!(
                f,
                "cluster #{} ({}) conflicts on: {}",
                cluster_id,
                key.join(", "),
                conflicts.join("; ")
            ),
            Question::RememberPolicy { field } => {
                write!(f, "apply this choice to later conflicts on '{}'?", field)
            }
            Question::PickMember { cluster_id } => {
                write!(f, "cluster #{}: which record should be kept?", cluster_id)
            }
            Question::PickFieldValue { cluster_id, field } => {
                write!(f, "cluster #{}: which value for '{}'?", cluster_id, field)
            }
            Question::MultiSourceValue { link, field } => {
                write!(f, "sources disagree on '{}' for '{}'", field, link)
            }
            Question::Replace {
                link,
                field,
                current,
                incoming,
            } => write!(
                f,
                "'{}' for '{}' is '{}', incoming '{}'",
                field, link, current, incoming
            ),
        }
    }
}

// ============================================================================
// CHOICE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// Index into the offered options
    Pick(usize),
    /// Skip this unit (cluster, row, field); never fatal
    Skip,
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Synchronous decision callback injected into the engines.
///
/// A `Pick` index outside `options` is treated as `Skip` by every caller.
pub trait DecisionProvider {
    fn ask(&mut self, question: &Question, options: &[String]) -> Choice;
}

// ============================================================================
// BATCH PROVIDER
// ============================================================================

/// Non-interactive provider with fixed, deterministic answers.
///
/// Picks the first option for value and policy questions, leaves unmapped
/// columns unmapped and never overwrites existing target values.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchDecider;

impl DecisionProvider for BatchDecider {
    fn ask(&mut self, question: &Question, options: &[String]) -> Choice {
        match question {
            Question::PickColumn { .. } | Question::Replace { .. } => Choice::Skip,
            _ if options.is_empty() => Choice::Skip,
            _ => Choice::Pick(0),
        }
    }
}

// ============================================================================
// SCRIPTED PROVIDER
// ============================================================================

/// Replays queued answers and records every question asked.
///
/// Once the script runs out, answers fall back to [`BatchDecider`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedDecider {
    answers: VecDeque<Choice>,
    pub asked: Vec<(Question, Vec<String>)>,
}

impl ScriptedDecider {
    pub fn new<I: IntoIterator<Item = Choice>>(answers: I) -> Self {
        ScriptedDecider {
            answers: answers.into_iter().collect(),
            asked: Vec::new(),
        }
    }
}

impl DecisionProvider for ScriptedDecider {
    fn ask(&mut self, question: &Question, options: &[String]) -> Choice {
        self.asked.push((question.clone(), options.to_vec()));
        match self.answers.pop_front() {
            Some(choice) => choice,
            None => BatchDecider.ask(question, options),
        }
    }
}

/// Resolve a choice to a valid option index.
pub fn picked(choice: Choice, options: &[String]) -> Option<usize> {
    match choice {
        Choice::Pick(idx) if idx < options.len() => Some(idx),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_batch_decider_defaults() {
        let mut batch = BatchDecider;
        let column = Question::PickColumn {
            dataset: "a.csv".to_string(),
            field: "score".to_string(),
        };
        let member = Question::PickMember { cluster_id: 1 };

        assert_eq!(batch.ask(&column, &opts(&["x"])), Choice::Skip);
        assert_eq!(batch.ask(&member, &opts(&["a", "b"])), Choice::Pick(0));
        assert_eq!(batch.ask(&member, &[]), Choice::Skip);
    }

    #[test]
    fn test_scripted_decider_records_and_falls_back() {
        let mut scripted = ScriptedDecider::new([Choice::Pick(1)]);
        let question = Question::PickMember { cluster_id: 3 };

        assert_eq!(scripted.ask(&question, &opts(&["a", "b"])), Choice::Pick(1));
        assert_eq!(scripted.ask(&question, &opts(&["a", "b"])), Choice::Pick(0));
        assert_eq!(scripted.asked.len(), 2);
    }

    #[test]
    fn test_picked_out_of_range_is_none() {
        let options = opts(&["a"]);
        assert_eq!(picked(Choice::Pick(0), &options), Some(0));
        assert_eq!(picked(Choice::Pick(4), &options), None);
        assert_eq!(picked(Choice::Skip, &options), None);
    }
}
