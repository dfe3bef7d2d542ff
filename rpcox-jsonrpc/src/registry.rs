//! Mapping of URL paths to the services that handle them.
//!
//! This is called "routing", but unlike an HTTP router it only matches exact paths: every service
//! lives at exactly one path, and every call to that path is a call to one of its methods.
use std::collections::HashMap;
use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error;

use crate::service::{BoxedService, Route};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Route '{route}' is already bound to service '{existing}'")]
    DuplicateRoute { route: String, existing: String },
}

/// The route table.
///
/// Built once at startup and then shared read-only by every request.
#[derive(Clone, Default)]
pub struct Registry {
    base_path: String,
    routes: HashMap<String, Arc<dyn Route>>,
}

impl Registry {
    /// An empty registry whose routes all live under `base_path`.
    pub fn new(base_path: impl AsRef<str>) -> Self {
        let base_path = normalize(base_path.as_ref());
        Self {
            // The root path as a base would make every route start with `//`
            base_path: if base_path == "/" { String::new() } else { base_path },
            routes: HashMap::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Bind a service to a path below the base path, returning the full route.
    ///
    /// Fails if the route is already taken; use [`Self::replace`] to override a route on purpose.
    pub fn register(&mut self, service: impl Into<BoxedService>, path: &str) -> Result<String, RegistryError> {
        let service = service.into();
        let route = self.route_for(path);

        if let Some(existing) = self.routes.get(&route) {
            let existing = existing.service_name().to_string();
            tracing::error!(%route, %existing, service = service.service_name(), "Route is already registered");
            return Err(RegistryError::DuplicateRoute { route, existing });
        }

        tracing::info!(service = service.service_name(), %route, "Registered service");
        self.routes.insert(route.clone(), service.0);
        Ok(route)
    }

    /// Bind a service to a path below the base path, replacing whatever was bound there.
    pub fn replace(&mut self, service: impl Into<BoxedService>, path: &str) -> String {
        let service = service.into();
        let route = self.route_for(path);

        match self.routes.insert(route.clone(), service.0.clone()) {
            Some(previous) => tracing::warn!(
                service = service.service_name(),
                previous = previous.service_name(),
                %route,
                "Replaced registered service"
            ),
            None => tracing::info!(service = service.service_name(), %route, "Registered service"),
        }

        route
    }

    /// Register each service under `/<name>`.
    ///
    /// All or nothing: if any route is taken, either already or by an earlier entry in the same
    /// batch, nothing is registered.
    pub fn register_all<I, N, T>(&mut self, services: I) -> Result<Vec<String>, RegistryError>
    where
        I: IntoIterator<Item = (N, T)>,
        N: AsRef<str>,
        T: Into<BoxedService>,
    {
        let mut batch = Registry {
            base_path: self.base_path.clone(),
            routes: self.routes.clone(),
        };
        let routes = services
            .into_iter()
            .map(|(name, service)| batch.register(service, &format!("/{}", name.as_ref())))
            .collect::<Result<Vec<_>, _>>()?;

        *self = batch;
        Ok(routes)
    }

    /// Should a request to this path be handled as an RPC call?
    pub fn is_handled_route(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    pub(crate) fn lookup(&self, path: &str) -> Option<&Arc<dyn Route>> {
        self.routes.get(&normalize(path))
    }

    /// All registered routes, sorted
    pub fn routes(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).sorted().collect()
    }

    fn route_for(&self, path: &str) -> String {
        normalize(&format!("{}/{}", self.base_path, path.trim_start_matches('/')))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("base_path", &self.base_path)
            .field("routes", &self.routes())
            .finish()
    }
}

/// Routes are case-insensitive, always start with `/`, and never end with one (unless the route is
/// just `/`).
fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    let lower = trimmed.to_lowercase();
    if lower.starts_with('/') {
        lower
    } else {
        format!("/{lower}")
    }
}
