//! Route names and the route compression dictionary.
//!
//! A route is `service.method`, optionally prefixed by a server type
//! (`connector.room.enter`). Frequently used routes may be given a 16-bit
//! code in a [`RouteDictionary`]; the dictionary is advertised to clients in
//! the handshake so both sides can send the code instead of the string.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    str::FromStr,
};

use thiserror::Error;

/// Errors raised while parsing routes or building a dictionary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The route does not have two or three non-empty dot-separated parts.
    #[error("invalid route: {0:?}")]
    Invalid(String),
    /// The route already has a dictionary code.
    #[error("route {0:?} already has a dictionary code")]
    DuplicateRoute(String),
    /// The dictionary code is already assigned to another route.
    #[error("dictionary code {0} is already assigned")]
    DuplicateCode(u16),
}

/// A parsed route.
///
/// # Examples
///
/// ```
/// use playwire::route::Route;
///
/// let route: Route = "connector.room.enter".parse().expect("valid route");
/// assert_eq!(route.server_type(), Some("connector"));
/// assert_eq!(route.handler_key(), "room.enter");
/// assert_eq!(route.to_string(), "connector.room.enter");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    server_type: Option<String>,
    service: String,
    method: String,
}

impl Route {
    /// Build a route from a service and method name.
    #[must_use]
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            server_type: None,
            service: service.into(),
            method: method.into(),
        }
    }

    /// Server type prefix, if present.
    #[must_use]
    pub fn server_type(&self) -> Option<&str> { self.server_type.as_deref() }

    /// Service component of the route.
    #[must_use]
    pub fn service(&self) -> &str { &self.service }

    /// Method component of the route.
    #[must_use]
    pub fn method(&self) -> &str { &self.method }

    /// `service.method`, the key handlers are registered under.
    #[must_use]
    pub fn handler_key(&self) -> String { format!("{}.{}", self.service, self.method) }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.iter().any(|part| part.is_empty()) {
            return Err(RouteError::Invalid(s.to_owned()));
        }
        match parts.as_slice() {
            [service, method] => Ok(Self::new(*service, *method)),
            [server_type, service, method] => Ok(Self {
                server_type: Some((*server_type).to_owned()),
                service: (*service).to_owned(),
                method: (*method).to_owned(),
            }),
            _ => Err(RouteError::Invalid(s.to_owned())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(server_type) = &self.server_type {
            write!(f, "{server_type}.")?;
        }
        write!(f, "{}.{}", self.service, self.method)
    }
}

/// Bidirectional mapping between route strings and 16-bit codes.
///
/// # Examples
///
/// ```
/// use playwire::route::RouteDictionary;
///
/// let dict = RouteDictionary::from_pairs([("room.enter", 1), ("room.leave", 2)])
///     .expect("unique routes and codes");
/// assert_eq!(dict.code("room.enter"), Some(1));
/// assert_eq!(dict.route(2), Some("room.leave"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteDictionary {
    codes: BTreeMap<String, u16>,
    routes: HashMap<u16, String>,
}

impl RouteDictionary {
    /// Create an empty dictionary.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build a dictionary from `(route, code)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if a route or a code appears twice.
    pub fn from_pairs<I, R>(pairs: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = (R, u16)>,
        R: Into<String>,
    {
        let mut dict = Self::new();
        for (route, code) in pairs {
            dict.insert(route, code)?;
        }
        Ok(dict)
    }

    /// Assign `code` to `route`.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError`] if either side is already mapped.
    pub fn insert(&mut self, route: impl Into<String>, code: u16) -> Result<(), RouteError> {
        let route = route.into();
        if self.codes.contains_key(&route) {
            return Err(RouteError::DuplicateRoute(route));
        }
        if self.routes.contains_key(&code) {
            return Err(RouteError::DuplicateCode(code));
        }
        self.routes.insert(code, route.clone());
        self.codes.insert(route, code);
        Ok(())
    }

    /// Code assigned to `route`.
    #[must_use]
    pub fn code(&self, route: &str) -> Option<u16> { self.codes.get(route).copied() }

    /// Route assigned to `code`.
    #[must_use]
    pub fn route(&self, code: u16) -> Option<&str> { self.routes.get(&code).map(String::as_str) }

    /// Route-to-code map, as advertised in the handshake.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, u16> { &self.codes }

    /// Returns `true` if no routes are mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.codes.is_empty() }
}
