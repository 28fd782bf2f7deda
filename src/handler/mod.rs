//! Handler registration and lookup.
//!
//! Handlers are grouped into named [`Service`]s and registered on the
//! application. A route `service.method` (optionally prefixed with a server
//! type) resolves to the method registered on that service.

mod context;
mod service;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
pub use context::HandlerContext;
pub use service::Service;
use thiserror::Error;

use crate::{
    error::HandlerError,
    route::Route,
    serializer::{JsonSerializer, Serializer},
};

/// An asynchronous message handler.
///
/// Handlers receive the raw message body and return the raw response body.
/// Typed handlers are usually registered through [`Service::request`] and
/// [`Service::notify`], which deserialize and serialize with the
/// application's serializer.
#[async_trait]
pub trait Handler<S: Serializer = JsonSerializer>: Send + Sync + 'static {
    /// Handle one message.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] that is sent back to the client.
    async fn call(&self, ctx: HandlerContext<S>, body: Bytes) -> Result<Bytes, HandlerError>;
}

/// Errors raised while registering services.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A service with this name is already registered.
    #[error("service {0:?} is already registered")]
    DuplicateService(String),
    /// A service or method name is empty or contains a dot.
    #[error("invalid handler name {0:?}")]
    InvalidName(String),
}

/// Table of services keyed by name.
pub(crate) struct HandlerRegistry<S: Serializer> {
    services: HashMap<String, Service<S>>,
}

impl<S: Serializer> Default for HandlerRegistry<S> {
    fn default() -> Self {
        Self {
            services: HashMap::new(),
        }
    }
}

impl<S: Serializer> HandlerRegistry<S> {
    /// Add `service`.
    pub(crate) fn register(&mut self, service: Service<S>) -> Result<(), RegistryError> {
        validate_name(service.name())?;
        service.methods().try_for_each(validate_name)?;
        if self.services.contains_key(service.name()) {
            return Err(RegistryError::DuplicateService(service.name().to_owned()));
        }
        self.services.insert(service.name().to_owned(), service);
        Ok(())
    }

    /// Resolve `route` to its handler.
    pub(crate) fn lookup(&self, route: &Route) -> Result<Arc<dyn Handler<S>>, HandlerError> {
        self.services
            .get(route.service())
            .and_then(|service| service.method(route.method()))
            .ok_or_else(|| HandlerError::route_not_found(route))
    }

    /// Every registered `service.method` key, sorted.
    pub(crate) fn routes(&self) -> Vec<String> {
        let mut routes: Vec<String> = self
            .services
            .values()
            .flat_map(|service| {
                service
                    .methods()
                    .map(move |method| format!("{}.{method}", service.name()))
            })
            .collect();
        routes.sort_unstable();
        routes
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty() || name.contains('.') {
        return Err(RegistryError::InvalidName(name.to_owned()));
    }
    Ok(())
}
