// 🧽 Value Normalizer - canonical comparison form for scalar cells
// Pure functions: no state, no side effects.

use crate::model::Value;
use std::fmt;

/// Amounts closer than this are considered equal.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Symbols and separators stripped before parsing an amount.
const CURRENCY_MARKS: &[char] = &[',', '，', '￥', '¥', '$', '€', '£', '元', ' '];

/// Canonical comparison string for a cell.
///
/// - empty / NaN → `""`
/// - integral number → integer form (`5.0` and `5` compare equal)
/// - otherwise the trimmed string form
pub fn normalize(value: &Value) -> String {
    match value {
        Value::Empty => String::new(),
        Value::Number(n) if n.is_nan() => String::new(),
        Value::Number(_) => value.to_string(),
        Value::Text(s) => s.trim().to_string(),
    }
}

/// Normalized form of an amount-like cell.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedAmount {
    Number(f64),
    /// Parsing failed; plain normalization is used instead
    Text(String),
}

impl NormalizedAmount {
    /// Tolerance equality for numbers, plain equality otherwise.
    pub fn matches(&self, other: &NormalizedAmount) -> bool {
        match (self, other) {
            (NormalizedAmount::Number(a), NormalizedAmount::Number(b)) => {
                (a - b).abs() < AMOUNT_TOLERANCE
            }
            (a, b) => a.to_string() == b.to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, NormalizedAmount::Number(_))
    }
}

/// Numbers render rounded to cents. Two amounts that [`NormalizedAmount::matches`]
/// may still render differently, so never key on this form.
impl fmt::Display for NormalizedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedAmount::Number(n) => write!(f, "{:.2}", n),
            NormalizedAmount::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Strip currency symbols/separators and parse; falls back to [`normalize`].
pub fn normalize_amount(value: &Value) -> NormalizedAmount {
    match value {
        Value::Number(n) if !n.is_nan() => NormalizedAmount::Number(*n),
        Value::Text(s) => {
            let stripped: String = s.trim().chars().filter(|c| !CURRENCY_MARKS.contains(c)).collect();
            match stripped.parse::<f64>() {
                Ok(n) if n.is_finite() => NormalizedAmount::Number(n),
                _ => NormalizedAmount::Text(normalize(value)),
            }
        }
        _ => NormalizedAmount::Text(String::new()),
    }
}

/// Compare two cells; amount-like fields use tolerance equality.
///
/// Both empty → equal; exactly one empty → different.
pub fn values_equal(a: &Value, b: &Value, amount_like: bool) -> bool {
    if !amount_like {
        return normalize(a) == normalize(b);
    }

    match (a.is_empty(), b.is_empty()) {
        (true, true) => true,
        (true, false) | (false, true) => false,
        (false, false) => normalize_amount(a).matches(&normalize_amount(b)),
    }
}

// ============================================================================
// TESTS
// ============================================================================
