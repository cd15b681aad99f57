//! Route name -> handler registry

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::QueryHandler;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Maps route names to shared handler instances.
///
/// Configured once at startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<String, Arc<dyn QueryHandler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ready-made handler. The last registration for a name wins.
    pub fn add_object_route(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn QueryHandler>,
    ) -> &mut Self {
        let name = name.into();
        if self.routes.insert(name.clone(), handler).is_some() {
            tracing::debug!(route = %name, "Replaced existing route");
        } else {
            tracing::debug!(route = %name, "Registered route");
        }
        self
    }

    /// Build a handler through `factory` and register it.
    ///
    /// A failing factory is a setup error: the route is not registered and
    /// the failure comes back as [`RouterError::Construction`].
    pub fn add_route<H, E, F>(&mut self, name: impl Into<String>, factory: F) -> Result<&mut Self, RouterError>
    where
        H: QueryHandler + 'static,
        E: Into<BoxError>,
        F: FnOnce() -> Result<H, E>,
    {
        let name = name.into();
        match factory() {
            Ok(handler) => Ok(self.add_object_route(name, Arc::new(handler))),
            Err(e) => {
                let source: BoxError = e.into();
                tracing::error!(route = %name, error = %source, "Failed to construct route handler");
                Err(RouterError::Construction { name, source })
            }
        }
    }

    /// Fluent form of [`Router::add_object_route`]
    pub fn with_route(mut self, name: impl Into<String>, handler: Arc<dyn QueryHandler>) -> Self {
        self.add_object_route(name, handler);
        self
    }

    pub fn route(&self, name: &str) -> Result<Arc<dyn QueryHandler>, RouterError> {
        self.routes
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| RouterError::RouteNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.routes.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router").field("routes", &self.names()).finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Request-time: nothing is registered under this name
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Setup-time: the handler factory failed
    #[error("Failed to construct handler for route '{name}': {source}")]
    Construction {
        name: String,
        #[source]
        source: BoxError,
    },
}

impl RouterError {
    /// Whether this error comes from engine setup rather than a request
    pub fn is_configuration(&self) -> bool {
        matches!(self, RouterError::Construction { .. })
    }
}
