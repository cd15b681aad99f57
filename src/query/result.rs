//! Success/error envelope returned by every query

use serde_json::{json, Value as JsonValue};

use super::handler::Row;

/// Common envelope behaviour: an error state plus a variant-specific payload.
pub trait ResultEnvelope {
    /// Mark the result as failed. Any payload is no longer emitted.
    fn set_error(&mut self, message: impl Into<String>);

    fn is_error(&self) -> bool;

    fn error_message(&self) -> Option<&str>;

    /// Payload emitted for the success case
    fn success_payload(&self) -> JsonValue;

    /// Structured form of the envelope
    fn process_result(&self) -> JsonValue {
        match self.error_message() {
            Some(message) if self.is_error() => json!({
                "error": 1,
                "errorMessage": message,
            }),
            _ => self.success_payload(),
        }
    }

    /// Serialized envelope; the only output a caller sees
    fn to_json_string(&self) -> String {
        self.process_result().to_string()
    }
}

/// Envelope carrying a row set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    error: Option<String>,
    data: Vec<Row>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(message: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.set_error(message);
        result
    }

    pub fn with_data(data: Vec<Row>) -> Self {
        let mut result = Self::new();
        result.set_result_data(data);
        result
    }

    /// Store the row set. Clears any earlier error; the last setter wins.
    pub fn set_result_data(&mut self, data: Vec<Row>) {
        self.error = None;
        self.data = data;
    }

    pub fn data(&self) -> &[Row] {
        &self.data
    }

    pub fn row_count(&self) -> usize {
        self.data.len()
    }
}

impl ResultEnvelope for QueryResult {
    fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.data.clear();
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn success_payload(&self) -> JsonValue {
        json!({ "data": self.data })
    }
}
