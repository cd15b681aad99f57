//! Route schemas and argument validation
//!
//! Each route registers a [`SchemaEntry`] describing the fields its query
//! document may carry. Validation turns the loose JSON `data` object into
//! typed [`QueryArguments`] before anything reaches a handler.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;
use serde_json::Value as JsonValue;

use super::condition::{QueryCondition, QueryConditionList};

pub const LIMIT: &str = "limit";
pub const OFFSET: &str = "offset";
pub const CONDITIONS: &str = "conditions";
pub const PROPERTIES: &str = "properties";

/// Expected kind of a single argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Integer,
    UnsignedInteger,
    Number,
    String,
    Boolean,
    StringList,
    Conditions,
    Object,
    Any,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Integer => "integer",
            FieldKind::UnsignedInteger => "unsigned integer",
            FieldKind::Number => "number",
            FieldKind::String => "string",
            FieldKind::Boolean => "boolean",
            FieldKind::StringList => "list of strings",
            FieldKind::Conditions => "list of conditions",
            FieldKind::Object => "object",
            FieldKind::Any => "any value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// Expected shape of one route's arguments
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaEntry {
    fields: Vec<FieldSpec>,
    allow_unknown: bool,
}

impl SchemaEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard listing shape: optional limit, offset, conditions and properties
    pub fn paged() -> Self {
        Self::new()
            .optional(LIMIT, FieldKind::UnsignedInteger)
            .optional(OFFSET, FieldKind::UnsignedInteger)
            .optional(CONDITIONS, FieldKind::Conditions)
            .optional(PROPERTIES, FieldKind::StringList)
    }

    pub fn required(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, true)
    }

    pub fn optional(self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.field(name, kind, false)
    }

    /// Add a field. Re-declaring a name replaces the earlier declaration.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind, required: bool) -> Self {
        let name = name.into();
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldSpec { name, kind, required });
        self
    }

    /// Accept (and pass through untyped) fields that are not declared
    pub fn allow_unknown_fields(mut self) -> Self {
        self.allow_unknown = true;
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Check `data` against this entry, collecting every violation
    pub fn validate(
        &self,
        data: &serde_json::Map<String, JsonValue>,
    ) -> Result<QueryArguments, SchemaError> {
        let mut args = QueryArguments::new();
        let mut violations = Vec::new();

        for spec in &self.fields {
            match data.get(&spec.name) {
                None | Some(JsonValue::Null) => {
                    if spec.required {
                        violations.push(FieldViolation::new(&spec.name, "required field is missing"));
                    }
                }
                Some(value) => match convert(&spec.name, spec.kind, value) {
                    Ok(arg) => {
                        args.insert(spec.name.clone(), arg);
                    }
                    Err(v) => violations.push(v),
                },
            }
        }

        for (name, value) in data {
            if value.is_null() || self.fields.iter().any(|f| &f.name == name) {
                continue;
            }
            if self.allow_unknown {
                args.insert(name.clone(), ArgValue::Json(value.clone()));
            } else {
                violations.push(FieldViolation::new(name, "unknown field"));
            }
        }

        if violations.is_empty() {
            Ok(args)
        } else {
            Err(SchemaError::Validation(violations))
        }
    }
}

fn convert(field: &str, kind: FieldKind, value: &JsonValue) -> Result<ArgValue, FieldViolation> {
    let mismatch = || {
        FieldViolation::new(
            field,
            format!("expected {}, got {}", kind, json_type_name(value)),
        )
    };

    match kind {
        FieldKind::Integer => value.as_i64().map(ArgValue::Integer).ok_or_else(mismatch),
        FieldKind::UnsignedInteger => value.as_u64().map(ArgValue::Unsigned).ok_or_else(mismatch),
        FieldKind::Number => value.as_f64().map(ArgValue::Number).ok_or_else(mismatch),
        FieldKind::String => value
            .as_str()
            .map(|s| ArgValue::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Boolean => value.as_bool().map(ArgValue::Boolean).ok_or_else(mismatch),
        FieldKind::StringList => {
            let items = value.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        FieldViolation::new(
                            format!("{}[{}]", field, i),
                            format!("expected string, got {}", json_type_name(item)),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ArgValue::StringList)
        }
        FieldKind::Conditions => {
            let items = value.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_condition(&format!("{}[{}]", field, i), item))
                .collect::<Result<QueryConditionList, _>>()
                .map(ArgValue::Conditions)
        }
        FieldKind::Object => value
            .as_object()
            .map(|o| ArgValue::Object(o.clone()))
            .ok_or_else(mismatch),
        FieldKind::Any => Ok(ArgValue::Json(value.clone())),
    }
}

/// Accepts `{"column": .., "value": .., "type": ..}` or `[column, value, type]`.
/// A missing comparison type means equality.
fn parse_condition(field: &str, item: &JsonValue) -> Result<QueryCondition, FieldViolation> {
    let (column, value, comparison) = match item {
        JsonValue::Object(obj) => (
            obj.get("column"),
            obj.get("value"),
            obj.get("type").or_else(|| obj.get("comparison")),
        ),
        JsonValue::Array(parts) if (2..=3).contains(&parts.len()) => {
            (parts.first(), parts.get(1), parts.get(2))
        }
        other => {
            return Err(FieldViolation::new(
                field,
                format!("expected condition object or [column, value, type], got {}", json_type_name(other)),
            ))
        }
    };

    let column = column
        .and_then(JsonValue::as_str)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| FieldViolation::new(field, "condition column must be a non-empty string"))?;

    let value = match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(v @ JsonValue::Number(_)) | Some(v @ JsonValue::Bool(_)) => v.to_string(),
        Some(other) => {
            return Err(FieldViolation::new(
                field,
                format!("condition value must be a scalar, got {}", json_type_name(other)),
            ))
        }
        None => return Err(FieldViolation::new(field, "condition value is missing")),
    };

    let comparison = match comparison {
        None | Some(JsonValue::Null) => "=",
        Some(JsonValue::String(s)) => s.as_str(),
        Some(other) => {
            return Err(FieldViolation::new(
                field,
                format!("condition type must be a string, got {}", json_type_name(other)),
            ))
        }
    };

    Ok(QueryCondition::new(column, value, comparison))
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Typed argument produced by validation
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    String(String),
    Boolean(bool),
    StringList(Vec<String>),
    Conditions(QueryConditionList),
    Object(serde_json::Map<String, JsonValue>),
    /// Undeclared or `Any` field, passed through as-is
    Json(JsonValue),
}

/// Validated arguments handed to a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArguments {
    args: BTreeMap<String, ArgValue>,
}

impl QueryArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) -> Option<ArgValue> {
        self.args.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.args.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.args.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.args.iter()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.args.get(name)? {
            ArgValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.args.get(name)? {
            ArgValue::Integer(i) => Some(*i),
            ArgValue::Unsigned(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn get_usize(&self, name: &str) -> Option<usize> {
        match self.args.get(name)? {
            ArgValue::Unsigned(u) => usize::try_from(*u).ok(),
            ArgValue::Integer(i) => usize::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.args.get(name)? {
            ArgValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.get_usize(LIMIT)
    }

    pub fn offset(&self) -> Option<usize> {
        self.get_usize(OFFSET)
    }

    pub fn properties(&self) -> Option<&[String]> {
        match self.args.get(PROPERTIES)? {
            ArgValue::StringList(list) => Some(list),
            _ => None,
        }
    }

    pub fn conditions(&self) -> Option<&QueryConditionList> {
        match self.args.get(CONDITIONS)? {
            ArgValue::Conditions(list) => Some(list),
            _ => None,
        }
    }
}

/// Registry of route name -> expected argument shape.
///
/// Built once at startup; entries are only ever added.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: HashMap<String, SchemaEntry>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent registration
    pub fn with_entry(mut self, name: impl Into<String>, entry: SchemaEntry) -> Self {
        self.add_entry(name, entry);
        self
    }

    pub fn add_entry(&mut self, name: impl Into<String>, entry: SchemaEntry) -> &mut Self {
        let name = name.into();
        tracing::debug!(route = %name, fields = entry.fields.len(), "Registered schema entry");
        self.entries.insert(name, entry);
        self
    }

    pub fn get(&self, name: &str) -> Result<&SchemaEntry, SchemaError> {
        self.entries
            .get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub reason: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.field, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema not found: {0}")]
    NotFound(String),

    #[error("Invalid query data: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::ComparisonType;
    use serde_json::json;

    fn object(value: JsonValue) -> serde_json::Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_lookup_missing_entry() {
        let schema = Schema::new().with_entry("listFoo", SchemaEntry::paged());
        assert!(schema.get("listFoo").is_ok());
        assert_eq!(
            schema.get("listBar").unwrap_err(),
            SchemaError::NotFound("listBar".to_string())
        );
    }

    #[test]
    fn test_validate_paged_arguments() {
        let entry = SchemaEntry::paged();
        let args = entry
            .validate(&object(json!({
                "limit": 5,
                "offset": 10,
                "properties": ["id", "title"],
                "conditions": [
                    {"column": "status", "value": "open", "type": "="},
                    ["size", 42, ">"],
                    {"column": "archived", "value": false}
                ]
            })))
            .unwrap();

        assert_eq!(args.limit(), Some(5));
        assert_eq!(args.offset(), Some(10));
        assert_eq!(args.properties().unwrap(), ["id", "title"]);

        let conditions = args.conditions().unwrap();
        assert_eq!(
            conditions.converted(),
            vec![
                ("status".into(), "open".into(), "=".into()),
                ("size".into(), "42".into(), ">".into()),
                ("archived".into(), "false".into(), "=".into()),
            ]
        );
        assert_eq!(conditions.conditions()[1].comparison_type(), &ComparisonType::Gt);
    }

    #[test]
    fn test_validation_names_offending_fields() {
        let entry = SchemaEntry::new()
            .required("limit", FieldKind::UnsignedInteger)
            .required("offset", FieldKind::UnsignedInteger);

        let err = entry
            .validate(&object(json!({"limit": "five", "extra": true})))
            .unwrap_err();

        let SchemaError::Validation(violations) = &err else {
            panic!("Expected validation error");
        };
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["limit", "offset", "extra"]);

        let message = err.to_string();
        assert!(message.contains("'limit': expected unsigned integer, got string"));
        assert!(message.contains("'offset': required field is missing"));
        assert!(message.contains("'extra': unknown field"));
    }

    #[test]
    fn test_negative_limit_rejected() {
        let err = SchemaEntry::paged()
            .validate(&object(json!({"limit": -1})))
            .unwrap_err();
        assert!(err.to_string().contains("'limit'"));
    }

    #[test]
    fn test_bad_condition_reports_index() {
        let err = SchemaEntry::paged()
            .validate(&object(json!({"conditions": [["a", "1"], {"value": "x"}]})))
            .unwrap_err();
        assert!(err.to_string().contains("'conditions[1]'"));
    }

    #[test]
    fn test_bad_property_reports_index() {
        let err = SchemaEntry::paged()
            .validate(&object(json!({"properties": ["id", 7, "title"]})))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid query data: 'properties[1]': expected string, got integer"
        );

        let err = SchemaEntry::paged()
            .validate(&object(json!({"properties": "id"})))
            .unwrap_err();
        assert!(err.to_string().contains("'properties': expected list of strings, got string"));
    }

    #[test]
    fn test_unknown_fields_pass_through_when_allowed() {
        let entry = SchemaEntry::new()
            .optional("q", FieldKind::String)
            .allow_unknown_fields();
        let args = entry
            .validate(&object(json!({"q": "report", "flags": {"deep": true}})))
            .unwrap();

        assert_eq!(args.get_str("q"), Some("report"));
        assert_eq!(args.get("flags"), Some(&ArgValue::Json(json!({"deep": true}))));
    }

    #[test]
    fn test_null_treated_as_absent() {
        let entry = SchemaEntry::new().required("id", FieldKind::Integer);
        assert!(entry.validate(&object(json!({"id": null}))).is_err());

        let args = SchemaEntry::paged()
            .validate(&object(json!({"limit": null, "sort": null})))
            .unwrap();
        assert_eq!(args.limit(), None);
        assert!(!args.contains("sort"));
    }

    #[test]
    fn test_redeclared_field_replaces_previous() {
        let entry = SchemaEntry::new()
            .required("id", FieldKind::String)
            .optional("id", FieldKind::Integer);
        assert_eq!(entry.fields().len(), 1);
        assert_eq!(entry.fields()[0].kind, FieldKind::Integer);
        assert!(!entry.fields()[0].required);
    }
}
