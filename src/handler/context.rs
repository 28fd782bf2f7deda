//! Per-invocation handler context.

use crate::{
    route::Route,
    serializer::{JsonSerializer, Serializer},
    session::Session,
};

/// Context passed to every handler invocation.
pub struct HandlerContext<S: Serializer = JsonSerializer> {
    session: Session<S>,
    route: Route,
    request_id: Option<u64>,
}

impl<S: Serializer> Clone for HandlerContext<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            route: self.route.clone(),
            request_id: self.request_id,
        }
    }
}

impl<S: Serializer> HandlerContext<S> {
    pub(crate) fn new(session: Session<S>, route: Route, request_id: Option<u64>) -> Self {
        Self {
            session,
            route,
            request_id,
        }
    }

    /// Session the message arrived on.
    #[must_use]
    pub fn session(&self) -> &Session<S> { &self.session }

    /// Route the message was sent to.
    #[must_use]
    pub fn route(&self) -> &Route { &self.route }

    /// Correlation id of the request; `None` for notifies.
    #[must_use]
    pub fn request_id(&self) -> Option<u64> { self.request_id }

    /// Returns `true` if no response will be sent.
    #[must_use]
    pub fn is_notify(&self) -> bool { self.request_id.is_none() }

    /// Serializer configured on the application.
    #[must_use]
    pub fn serializer(&self) -> &S { self.session.serializer() }
}
