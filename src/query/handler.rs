use super::schema::QueryArguments;

/// A single result record.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A named data source that can answer one kind of declarative query.
///
/// Handlers are shared across requests, so they must be `Send + Sync` and
/// must not keep per-request state.
pub trait QueryHandler: Send + Sync {
    fn execute(&self, args: &QueryArguments) -> Result<Vec<Row>, HandlerError>;
}

impl<F> QueryHandler for F
where
    F: Fn(&QueryArguments) -> Result<Vec<Row>, HandlerError> + Send + Sync,
{
    fn execute(&self, args: &QueryArguments) -> Result<Vec<Row>, HandlerError> {
        self(args)
    }
}

/// Domain error signalled by a handler. Rendered into the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
