//! Attribute filters for search requests.
//!
//! A filter map associates a column name with either a literal value
//! (equality) or a map of named operators applied to that column:
//!
//! ```json
//! { "filename": "guide.pdf", "page_number": { "$gte": 3, "$lte": 10 } }
//! ```
//!
//! Filters are compiled into flat [`FilterCondition`]s before they reach a
//! store. Unknown operator keys are skipped, not rejected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Maximum nesting depth of a filter tree.
pub const MAX_FILTER_DEPTH: usize = 3;

/// A filter map keyed by column name.
pub type Filters = BTreeMap<String, FilterValue>;

/// Value under a filter key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Sub-map of operator name to operand.
    Operators(BTreeMap<String, FilterValue>),
    /// Plain value, compared for equality.
    Literal(Value),
}

impl FilterValue {
    fn depth(&self) -> usize {
        match self {
            Self::Operators(map) => 1 + map.values().map(Self::depth).max().unwrap_or(0),
            Self::Literal(value) => json_depth(value),
        }
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Operators(
                map.into_iter()
                    .map(|(key, value)| (key, FilterValue::from(value)))
                    .collect(),
            ),
            other => Self::Literal(other),
        }
    }
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Nesting depth of a filter map; the top-level map counts as one level.
pub fn filter_depth(filters: &Filters) -> usize {
    1 + filters.values().map(FilterValue::depth).max().unwrap_or(0)
}

/// Comparison applied by a [`FilterCondition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Gte,
    Lte,
    In,
}

impl FilterOp {
    /// Parse an operator key. Both `$gte` and `>=` spellings are accepted.
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "$eq" | "==" | "eq" => Some(Self::Eq),
            "$gte" | ">=" | "gte" => Some(Self::Gte),
            "$lte" | "<=" | "lte" => Some(Self::Lte),
            "$in" | "in" | "in-set" => Some(Self::In),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Gte => "gte",
            Self::Lte => "lte",
            Self::In => "in",
        }
    }
}

/// One compiled predicate `column <op> value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterCondition {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    /// Evaluate against a column value. A missing column never matches.
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };

        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FilterOp::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            FilterOp::In => match &self.value {
                Value::Array(set) => set.iter().any(|v| values_equal(actual, v)),
                single => values_equal(actual, single),
            },
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Compile a filter map into flat conditions.
///
/// A literal becomes an equality test. An operator map yields one
/// condition per recognised operator; unknown operators and operands that
/// are themselves operator maps are skipped.
pub fn compile_filters(filters: &Filters) -> Vec<FilterCondition> {
    let mut conditions = Vec::new();

    for (column, value) in filters {
        match value {
            FilterValue::Literal(literal) => {
                conditions.push(FilterCondition::new(column, FilterOp::Eq, literal.clone()));
            }
            FilterValue::Operators(ops) => {
                for (key, operand) in ops {
                    let (Some(op), FilterValue::Literal(operand)) = (FilterOp::parse(key), operand)
                    else {
                        tracing::debug!(column = %column, operator = %key, "ignoring unsupported filter operator");
                        continue;
                    };
                    conditions.push(FilterCondition::new(column, op, operand.clone()));
                }
            }
        }
    }

    conditions
}

/// Parse CLI-style `column=value`, `column>=value` and `column<=value`
/// expressions into a filter map.
///
/// Values that parse as JSON (numbers, booleans) keep that type; anything
/// else is a string. A column given once with `=` becomes a literal;
/// otherwise its expressions are combined into an operator map.
pub fn parse_filter_expressions<S: AsRef<str>>(expressions: &[S]) -> Result<Filters, String> {
    let mut grouped: BTreeMap<String, BTreeMap<String, FilterValue>> = BTreeMap::new();

    for expression in expressions {
        let expression = expression.as_ref();
        let (column, op, raw) = [(">=", FilterOp::Gte), ("<=", FilterOp::Lte), ("=", FilterOp::Eq)]
            .into_iter()
            .find_map(|(token, op)| {
                expression
                    .split_once(token)
                    .map(|(column, raw)| (column.trim(), op, raw.trim()))
            })
            .ok_or_else(|| format!("invalid filter '{expression}', expected column=value"))?;

        if column.is_empty() {
            return Err(format!("invalid filter '{expression}', column name is empty"));
        }

        let value = serde_json::from_str::<Value>(raw)
            .ok()
            .filter(|v| !v.is_object() && !v.is_array())
            .unwrap_or_else(|| Value::String(raw.to_string()));
        grouped
            .entry(column.to_string())
            .or_default()
            .insert(format!("${}", op.as_str()), FilterValue::Literal(value));
    }

    Ok(grouped
        .into_iter()
        .map(|(column, mut ops)| {
            let value = match ops.len() {
                1 if ops.contains_key("$eq") => ops
                    .remove("$eq")
                    .unwrap_or(FilterValue::Literal(Value::Null)),
                _ => FilterValue::Operators(ops),
            };
            (column, value)
        })
        .collect())
}
