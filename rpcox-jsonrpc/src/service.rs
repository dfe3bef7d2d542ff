//! Definitions of the services that a server exposes.
//!
//! A service is a Rust type whose instances are built fresh for every request, plus a table of
//! named methods that can be invoked on such an instance.  See [`ServiceDef`].
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use itertools::Itertools;

use crate::handler::{self, MethodOutcome, Request, RequestContext};

type Factory<S> = Arc<dyn Fn(&RequestContext) -> S + Send + Sync>;

/// Everything needed to serve calls to one service type.
///
/// ```ignore
/// let def = ServiceDef::new("GreeterService", |_cx| Greeter::default())
///     .method("hello", |Instance(svc): Instance<Greeter>, Params((name,)): Params<(String,)>| async move {
///         svc.hello(&name)
///     });
/// ```
///
/// Only the methods added with [`Self::method`] can be invoked remotely; other methods of `S` are
/// invisible to callers.
pub struct ServiceDef<S> {
    name: String,
    factory: Factory<S>,
    methods: HashMap<String, Box<dyn handler::ErasedHandler<S>>>,
}

impl<S: Send + Sync + 'static> ServiceDef<S> {
    /// Define a service.
    ///
    /// `name` is the declared name of the service type, used in logs.  `factory` builds the
    /// instance that serves a single request, from the HTTP request that carried it.
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&RequestContext) -> S + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
            methods: HashMap::new(),
        }
    }

    /// Expose a method under the given name.
    pub fn method<H, HackT>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: handler::Handler<HackT, S>,
        HackT: 'static,
    {
        let name = name.into();
        if self.methods.insert(name.clone(), handler::erase_handler(handler)).is_some() {
            tracing::warn!(service = %self.name, method = %name, "Method defined twice; the last definition wins");
        }
        self
    }
}

impl<S> ServiceDef<S> {
    /// The declared name of the service
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared name without its `Service` suffix, if it has one.
    pub fn service_name(&self) -> &str {
        service_name(&self.name)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// The names of all methods this service exposes, in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.keys().map(String::as_str).sorted().collect()
    }
}

impl<S> fmt::Debug for ServiceDef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDef")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

pub(crate) fn service_name(name: &str) -> &str {
    name.strip_suffix("Service").unwrap_or(name)
}

/// A service with its type erased, so services of different types can share a route table.
pub(crate) trait Route: Send + Sync {
    fn service_name(&self) -> &str;

    fn has_method(&self, method: &str) -> bool;

    /// Build a service instance for this request and invoke the requested method on it.
    ///
    /// Returns `None` without building anything if there is no such method.
    fn invoke(&self, request: Request) -> Option<BoxFuture<'static, MethodOutcome>>;
}

impl<S: Send + Sync + 'static> Route for ServiceDef<S> {
    fn service_name(&self) -> &str {
        ServiceDef::service_name(self)
    }

    fn has_method(&self, method: &str) -> bool {
        ServiceDef::has_method(self, method)
    }

    fn invoke(&self, request: Request) -> Option<BoxFuture<'static, MethodOutcome>> {
        let handler = self.methods.get(&request.method)?;
        let instance = Arc::new((self.factory)(&request.context));
        Some(handler.call(instance, request))
    }
}

/// A [`ServiceDef`] of any service type.
///
/// Used to register services of different types in one go, see
/// [`crate::Registry::register_all`].
#[derive(Clone)]
pub struct BoxedService(pub(crate) Arc<dyn Route>);

impl BoxedService {
    pub fn service_name(&self) -> &str {
        self.0.service_name()
    }
}

impl<S: Send + Sync + 'static> From<ServiceDef<S>> for BoxedService {
    fn from(value: ServiceDef<S>) -> Self {
        BoxedService(Arc::new(value))
    }
}

impl fmt::Debug for BoxedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BoxedService").field(&self.service_name()).finish()
    }
}
