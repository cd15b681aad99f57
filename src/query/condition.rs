//! Filter predicates handed from a query document to a handler.
//!
//! A [`QueryConditionList`] keeps its predicates in declaration order. The
//! comparison type is carried as declared; interpreting it is left to the
//! handler that receives the list.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison applied by a single condition.
///
/// Known operators get their own variant; anything else is kept verbatim in
/// `Custom` so handlers can support their own operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ComparisonType {
    #[default]
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    NotLike,
    In,
    Custom(String),
}

impl ComparisonType {
    /// Canonical textual form, as handed to handlers.
    pub fn as_str(&self) -> &str {
        match self {
            ComparisonType::Eq => "=",
            ComparisonType::NotEq => "!=",
            ComparisonType::Lt => "<",
            ComparisonType::LtEq => "<=",
            ComparisonType::Gt => ">",
            ComparisonType::GtEq => ">=",
            ComparisonType::Like => "LIKE",
            ComparisonType::NotLike => "NOT LIKE",
            ComparisonType::In => "IN",
            ComparisonType::Custom(s) => s,
        }
    }
}

impl From<&str> for ComparisonType {
    fn from(s: &str) -> Self {
        let normalized = s.trim().split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_uppercase().as_str() {
            "=" | "==" | "EQ" => ComparisonType::Eq,
            "!=" | "<>" | "NEQ" => ComparisonType::NotEq,
            "<" | "LT" => ComparisonType::Lt,
            "<=" | "LTE" => ComparisonType::LtEq,
            ">" | "GT" => ComparisonType::Gt,
            ">=" | "GTE" => ComparisonType::GtEq,
            "LIKE" => ComparisonType::Like,
            "NOT LIKE" => ComparisonType::NotLike,
            "IN" => ComparisonType::In,
            _ => ComparisonType::Custom(s.to_string()),
        }
    }
}

impl From<String> for ComparisonType {
    fn from(s: String) -> Self {
        ComparisonType::from(s.as_str())
    }
}

impl From<ComparisonType> for String {
    fn from(t: ComparisonType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive form of a condition: `(column, value, comparison)`.
pub type ConvertedCondition = (String, String, String);

/// A single filter predicate. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCondition {
    column_name: String,
    value: String,
    comparison_type: ComparisonType,
}

impl QueryCondition {
    pub fn new(
        column_name: impl Into<String>,
        value: impl Into<String>,
        comparison_type: impl Into<ComparisonType>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            value: value.into(),
            comparison_type: comparison_type.into(),
        }
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn comparison_type(&self) -> &ComparisonType {
        &self.comparison_type
    }

    pub fn convert(&self) -> ConvertedCondition {
        (
            self.column_name.clone(),
            self.value.clone(),
            self.comparison_type.as_str().to_string(),
        )
    }
}

/// Ordered list of conditions, ANDed in declaration order unless a handler
/// says otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryConditionList {
    conditions: Vec<QueryCondition>,
}

impl QueryConditionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and append a condition. The comparison type is not checked here.
    pub fn add_condition(
        &mut self,
        column_name: impl Into<String>,
        value: impl Into<String>,
        comparison_type: impl Into<ComparisonType>,
    ) -> &mut Self {
        self.conditions
            .push(QueryCondition::new(column_name, value, comparison_type));
        self
    }

    pub fn add_object_condition(&mut self, condition: QueryCondition) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    /// Conditions as primitive tuples, in insertion order.
    pub fn converted(&self) -> Vec<ConvertedCondition> {
        self.conditions.iter().map(QueryCondition::convert).collect()
    }

    pub fn conditions(&self) -> &[QueryCondition] {
        &self.conditions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryCondition> {
        self.conditions.iter()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

impl<'a> IntoIterator for &'a QueryConditionList {
    type Item = &'a QueryCondition;
    type IntoIter = std::slice::Iter<'a, QueryCondition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

impl FromIterator<QueryCondition> for QueryConditionList {
    fn from_iter<I: IntoIterator<Item = QueryCondition>>(iter: I) -> Self {
        Self {
            conditions: iter.into_iter().collect(),
        }
    }
}
