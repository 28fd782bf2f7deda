//! Application builder.
//!
//! [`App`] collects everything a server needs to talk to clients: the
//! configuration, the body serializer, the route compression dictionary, the
//! registered services and the session-connected callbacks. Registration
//! methods return [`Result<Self, RegistryError>`] so calls can be chained
//! with `?`.

mod context;

use std::fmt;

pub(crate) use context::AppContext;

use crate::{
    callbacks::CallbackList,
    config::ServerConfig,
    handler::{HandlerRegistry, RegistryError, Service},
    route::RouteDictionary,
    serializer::{JsonSerializer, Serializer},
    session::Session,
};

/// Configures services and lifecycle callbacks for a [`Server`].
///
/// # Examples
///
/// ```
/// use playwire::{app::App, error::HandlerError, handler::Service};
///
/// # fn main() -> Result<(), playwire::handler::RegistryError> {
/// let app = App::new()
///     .service(Service::new("room").request("enter", |_ctx, body: serde_json::Value| async move {
///         Ok::<_, HandlerError>(body)
///     }))?
///     .on_session_connected(|session| {
///         session.on_closed(|s| println!("{} left", s.id()));
///     });
/// assert_eq!(app.routes(), vec!["room.enter".to_owned()]);
/// # Ok(())
/// # }
/// ```
///
/// [`Server`]: crate::server::Server
pub struct App<S: Serializer = JsonSerializer> {
    pub(crate) config: ServerConfig,
    pub(crate) serializer: S,
    pub(crate) dictionary: RouteDictionary,
    pub(crate) handlers: HandlerRegistry<S>,
    pub(crate) on_session: CallbackList<Session<S>>,
}

impl<S: Serializer + Default> Default for App<S> {
    fn default() -> Self { Self::with_serializer(S::default()) }
}

impl App {
    /// Create an application using the JSON serializer.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl<S: Serializer> App<S> {
    /// Create an application using `serializer` for message bodies.
    #[must_use]
    pub fn with_serializer(serializer: S) -> Self {
        Self {
            config: ServerConfig::default(),
            serializer,
            dictionary: RouteDictionary::new(),
            handlers: HandlerRegistry::default(),
            on_session: CallbackList::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the route compression dictionary advertised in the handshake.
    #[must_use]
    pub fn with_route_dictionary(mut self, dictionary: RouteDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }

    /// Register a service.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if a service with the same name exists or a
    /// name is invalid.
    pub fn service(mut self, service: Service<S>) -> Result<Self, RegistryError> {
        self.handlers.register(service)?;
        Ok(self)
    }

    /// Register a callback invoked for every new session before its first
    /// packet is processed.
    ///
    /// This is the place to register per-session handshake and close
    /// callbacks.
    #[must_use]
    pub fn on_session_connected<F>(self, callback: F) -> Self
    where
        F: Fn(&Session<S>) + Send + Sync + 'static,
    {
        self.on_session.add(callback);
        self
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Every registered `service.method` route, sorted.
    #[must_use]
    pub fn routes(&self) -> Vec<String> { self.handlers.routes() }
}

impl<S: Serializer> fmt::Debug for App<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("serializer", &self.serializer.name())
            .field("routes", &self.routes())
            .finish_non_exhaustive()
    }
}
