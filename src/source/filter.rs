//! Row filtering for condition lists
//!
//! Conditions are compiled once per query (operator lookup, LIKE regex) and
//! then evaluated against each row. All conditions must pass.

use std::cmp::Ordering;

use chrono::DateTime;
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::query::{ComparisonType, HandlerError, QueryCondition, QueryConditionList, Row};

#[derive(Debug)]
enum Test {
    Compare(ComparisonType),
    Like { regex: Regex, negate: bool },
    In(Vec<String>),
}

#[derive(Debug)]
pub struct CompiledCondition {
    column: String,
    value: String,
    test: Test,
}

impl CompiledCondition {
    pub fn compile(condition: &QueryCondition) -> Result<Self, HandlerError> {
        let value = condition.value().to_string();
        let test = match condition.comparison_type() {
            op @ (ComparisonType::Eq
            | ComparisonType::NotEq
            | ComparisonType::Lt
            | ComparisonType::LtEq
            | ComparisonType::Gt
            | ComparisonType::GtEq) => Test::Compare(op.clone()),
            ComparisonType::Like => Test::Like {
                regex: like_regex(&value)?,
                negate: false,
            },
            ComparisonType::NotLike => Test::Like {
                regex: like_regex(&value)?,
                negate: true,
            },
            ComparisonType::In => Test::In(
                value
                    .split(',')
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect(),
            ),
            ComparisonType::Custom(other) => {
                return Err(HandlerError::new(format!(
                    "Unsupported comparison type '{}' on column '{}'",
                    other,
                    condition.column_name()
                )))
            }
        };

        Ok(Self {
            column: condition.column_name().to_string(),
            value,
            test,
        })
    }

    pub fn matches(&self, row: &Row) -> bool {
        let field = row.get(&self.column).unwrap_or(&JsonValue::Null);

        match &self.test {
            Test::Compare(op) => {
                let ord = compare(field, &self.value);
                match op {
                    ComparisonType::Eq => ord == Some(Ordering::Equal),
                    ComparisonType::NotEq => ord != Some(Ordering::Equal),
                    ComparisonType::Lt => ord == Some(Ordering::Less),
                    ComparisonType::LtEq => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
                    ComparisonType::Gt => ord == Some(Ordering::Greater),
                    ComparisonType::GtEq => {
                        matches!(ord, Some(Ordering::Greater | Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Test::Like { regex, negate } => {
                let matched = scalar_text(field).map(|s| regex.is_match(&s)).unwrap_or(false);
                matched != *negate
            }
            Test::In(values) => values
                .iter()
                .any(|v| compare(field, v) == Some(Ordering::Equal)),
        }
    }
}

/// Compile every condition, failing on the first unsupported one
pub fn compile_all(conditions: &QueryConditionList) -> Result<Vec<CompiledCondition>, HandlerError> {
    conditions.iter().map(CompiledCondition::compile).collect()
}

pub fn matches_all(filters: &[CompiledCondition], row: &Row) -> bool {
    filters.iter().all(|f| f.matches(row))
}

/// Order a row value against a condition literal.
///
/// Numbers compare numerically, RFC 3339 timestamps chronologically,
/// booleans by value, other strings lexically. `None` when the two are not
/// comparable (null, missing, nested values, type mismatch).
fn compare(field: &JsonValue, literal: &str) -> Option<Ordering> {
    match field {
        JsonValue::Number(n) => {
            let lhs = n.as_f64()?;
            let rhs: f64 = literal.trim().parse().ok()?;
            lhs.partial_cmp(&rhs)
        }
        JsonValue::Bool(b) => {
            let rhs: bool = literal.trim().parse().ok()?;
            Some(b.cmp(&rhs))
        }
        JsonValue::String(s) => {
            if let (Ok(lhs), Ok(rhs)) = (
                DateTime::parse_from_rfc3339(s),
                DateTime::parse_from_rfc3339(literal),
            ) {
                return Some(lhs.cmp(&rhs));
            }
            if let (Ok(lhs), Ok(rhs)) = (s.parse::<f64>(), literal.parse::<f64>()) {
                return lhs.partial_cmp(&rhs);
            }
            Some(s.as_str().cmp(literal))
        }
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn scalar_text(field: &JsonValue) -> Option<String> {
    match field {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// SQL LIKE: `%` matches any run, `_` a single character, the rest literally
fn like_regex(pattern: &str) -> Result<Regex, HandlerError> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                re.push_str(&regex::escape(&literal));
                literal.clear();
                re.push_str(if c == '%' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    re.push_str(&regex::escape(&literal));
    re.push('$');

    Regex::new(&re).map_err(|e| HandlerError::new(format!("Invalid LIKE pattern '{}': {}", pattern, e)))
}
