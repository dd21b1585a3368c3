// 🏛️ Field Registry - canonical fields and their declared aliases
// Fields exist independently of any source sheet; sources are mapped onto them.

use crate::model::Value;
use serde::{Deserialize, Serialize};

// ============================================================================
// FIELD DEFINITION
// ============================================================================

/// A canonical field: the name engine records use for a concept,
/// independent of any source's column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Canonical name (e.g., "学号")
    pub name: String,

    /// Known alternative column names, in preference order
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Amount-like fields compare with currency stripping and tolerance
    #[serde(default)]
    pub amount_like: bool,

    #[serde(default)]
    pub description: String,

    /// Fill value when a source lacks this field
    #[serde(default)]
    pub default: Option<Value>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        FieldDefinition {
            name: name.into(),
            aliases: Vec::new(),
            amount_like: false,
            description: String::new(),
            default: None,
        }
    }

    /// Builder: add an alias (ignored if it repeats the name or an existing alias)
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if alias != self.name && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
        self
    }

    pub fn with_aliases<I, S>(self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        aliases.into_iter().fold(self, |field, alias| field.with_alias(alias))
    }

    /// Builder: tag as amount-like
    pub fn amount(mut self) -> Self {
        self.amount_like = true;
        self
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

// ============================================================================
// FIELD REGISTRY
// ============================================================================

/// Declared canonical field set, in declaration order.
///
/// Lookups for undeclared names are valid: such fields simply have no aliases
/// and are not amount-like.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<FieldDefinition>,
}

impl FieldRegistry {
    /// Empty registry
    pub fn new() -> Self {
        FieldRegistry { fields: Vec::new() }
    }

    /// Registry pre-loaded with the common roster/score sheet fields
    pub fn with_defaults() -> Self {
        let mut registry = FieldRegistry::new();
        registry.register_common_fields();
        registry
    }

    fn register_common_fields(&mut self) {
        self.register(
            FieldDefinition::new("学号")
                .with_description("Student number")
                .with_aliases(["学号号", "学学号", "xuehao", "student_id", "学生编号", "学生学号"]),
        );
        self.register(
            FieldDefinition::new("学生姓名")
                .with_description("Student name")
                .with_aliases([
                    "学生姓名名",
                    "学学生姓名",
                    "student_name",
                    "姓名",
                    "学生名",
                    "学生姓名（中文）",
                ]),
        );
        self.register(
            FieldDefinition::new("班级")
                .with_description("Class")
                .with_aliases(["班", "class", "班级名称", "class_name"]),
        );
        self.register(
            FieldDefinition::new("成绩")
                .with_description("Score")
                .with_aliases(["分数", "score", "grade", "考试分数"]),
        );
        self.register(
            FieldDefinition::new("课程")
                .with_description("Course")
                .with_aliases(["科目", "course", "subject", "课程名称"]),
        );
        self.register(
            FieldDefinition::new("金额")
                .with_description("Monetary amount")
                .with_aliases(["amount", "价格", "price", "费用", "成本", "money"])
                .amount()
                .with_default(Value::Number(0.0)),
        );
    }

    /// Register a field; a later definition with the same name replaces the earlier one.
    pub fn register(&mut self, field: FieldDefinition) {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn aliases(&self, name: &str) -> &[String] {
        self.get(name).map(|f| f.aliases.as_slice()).unwrap_or(&[])
    }

    pub fn is_amount_like(&self, name: &str) -> bool {
        self.get(name).map_or(false, |f| f.amount_like)
    }

    pub fn default_value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|f| f.default.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// FIELD PATTERN SELECTION
// ============================================================================

/// How a field pattern resolved against a field list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMatch {
    Exact,
    Wildcard,
    Contains,
    NoMatch,
}

/// Case-insensitive wildcard match; `*` matches any (possibly empty) sequence.
pub fn wildcard_matches(pattern: &str, text: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();

    if !pattern.contains('*') {
        return pattern == text;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let first = parts[0];
    let last = parts[parts.len() - 1];

    if text.len() < first.len() + last.len() || !text.starts_with(first) || !text.ends_with(last) {
        return false;
    }

    // Middle parts must appear in order between prefix and suffix
    let mut rest = &text[first.len()..text.len() - last.len()];
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }

    true
}

/// Resolve a pattern against candidate field names: exact, then wildcard, then contains.
pub fn select_fields(pattern: &str, candidates: &[String]) -> (Vec<String>, PatternMatch) {
    let pattern = pattern.trim();

    if candidates.iter().any(|c| c == pattern) {
        return (vec![pattern.to_string()], PatternMatch::Exact);
    }

    if pattern.contains('*') {
        let matched: Vec<String> = candidates
            .iter()
            .filter(|c| wildcard_matches(pattern, c))
            .cloned()
            .collect();
        if !matched.is_empty() {
            return (matched, PatternMatch::Wildcard);
        }
    }

    let needle = pattern.to_lowercase();
    if !needle.is_empty() {
        let matched: Vec<String> = candidates
            .iter()
            .filter(|c| c.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        if !matched.is_empty() {
            return (matched, PatternMatch::Contains);
        }
    }

    (Vec::new(), PatternMatch::NoMatch)
}

// ============================================================================
// TESTS
// ============================================================================
