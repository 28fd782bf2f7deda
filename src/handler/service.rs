//! Services: named groups of handlers.

use std::{collections::HashMap, fmt, future::Future, marker::PhantomData, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

use super::{Handler, HandlerContext};
use crate::{
    error::HandlerError,
    serializer::{JsonSerializer, Serializer},
};

/// A named group of handlers, addressed as `service.method`.
///
/// # Examples
///
/// ```
/// use playwire::{error::HandlerError, handler::Service};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Enter {
///     id: u32,
///     name: String,
/// }
///
/// let room: Service = Service::new("room")
///     .request("enter", |_ctx, req: Enter| async move { Ok::<_, HandlerError>(req) })
///     .notify("leave", |ctx, _: serde_json::Value| async move {
///         ctx.session().close();
///         Ok(())
///     });
/// assert_eq!(room.name(), "room");
/// ```
pub struct Service<S: Serializer = JsonSerializer> {
    name: String,
    methods: HashMap<String, Arc<dyn Handler<S>>>,
}

impl<S: Serializer> fmt::Debug for Service<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: Serializer> Service<S> {
    /// Create an empty service.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Name of the service.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Register `handler` as `method`, replacing any earlier registration.
    #[must_use]
    pub fn handler(mut self, method: impl Into<String>, handler: impl Handler<S>) -> Self {
        self.methods.insert(method.into(), Arc::new(handler));
        self
    }

    /// Register a handler working on raw message bodies.
    #[must_use]
    pub fn raw<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(HandlerContext<S>, Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
    {
        self.handler(method, RawFn(f))
    }

    /// Register a typed request handler.
    ///
    /// The body is deserialized into `Req`; the returned `Resp` is
    /// serialized into the response body.
    #[must_use]
    pub fn request<Req, Resp, F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Resp: Serialize + Send + 'static,
        F: Fn(HandlerContext<S>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    {
        self.handler(
            method,
            RequestFn {
                f,
                _types: PhantomData,
            },
        )
    }

    /// Register a typed notify handler; it produces no response.
    #[must_use]
    pub fn notify<Req, F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        F: Fn(HandlerContext<S>, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.handler(
            method,
            NotifyFn {
                f,
                _types: PhantomData,
            },
        )
    }

    pub(crate) fn method(&self, name: &str) -> Option<Arc<dyn Handler<S>>> { self.methods.get(name).cloned() }

    pub(crate) fn methods(&self) -> impl Iterator<Item = &str> { self.methods.keys().map(String::as_str) }
}

struct RawFn<F>(F);

#[async_trait]
impl<S, F, Fut> Handler<S> for RawFn<F>
where
    S: Serializer,
    F: Fn(HandlerContext<S>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Bytes, HandlerError>> + Send + 'static,
{
    async fn call(&self, ctx: HandlerContext<S>, body: Bytes) -> Result<Bytes, HandlerError> { (self.0)(ctx, body).await }
}

struct RequestFn<F, Req, Resp> {
    f: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

#[async_trait]
impl<S, F, Fut, Req, Resp> Handler<S> for RequestFn<F, Req, Resp>
where
    S: Serializer,
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(HandlerContext<S>, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
{
    async fn call(&self, ctx: HandlerContext<S>, body: Bytes) -> Result<Bytes, HandlerError> {
        let request: Req = ctx
            .serializer()
            .unmarshal(&body)
            .map_err(HandlerError::bad_request)?;
        let session = ctx.session().clone();
        let response = (self.f)(ctx, request).await?;
        let encoded = session
            .serializer()
            .marshal(&response)
            .map_err(HandlerError::plain)?;
        Ok(Bytes::from(encoded))
    }
}

struct NotifyFn<F, Req> {
    f: F,
    _types: PhantomData<fn(Req)>,
}

#[async_trait]
impl<S, F, Fut, Req> Handler<S> for NotifyFn<F, Req>
where
    S: Serializer,
    Req: DeserializeOwned + Send + 'static,
    F: Fn(HandlerContext<S>, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn call(&self, ctx: HandlerContext<S>, body: Bytes) -> Result<Bytes, HandlerError> {
        let request: Req = ctx
            .serializer()
            .unmarshal(&body)
            .map_err(HandlerError::bad_request)?;
        (self.f)(ctx, request).await?;
        Ok(Bytes::new())
    }
}
