//! Per-request context handed to business handlers.
//!
//! The [`Context`] is an owned snapshot of the request built after binding
//! succeeds, so handler futures do not borrow the engine's request state.

use crate::identity::Identity;
use http::{HeaderMap, Method};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it suitable for request tracking
/// and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read view of a request, passed to the business handler next to its typed
/// input.
///
/// Everything here is owned by the single request being processed and
/// discarded at request end. Mutating the response is not done through the
/// context: the declared response mode renders the handler's typed output.
#[derive(Debug, Clone)]
pub struct Context {
    request_id: RequestId,
    method: Method,
    route: String,
    path: String,
    headers: HeaderMap,
    identity: Option<Identity>,
    values: IndexMap<String, Value>,
}

impl Context {
    /// Creates a context for the given request line.
    #[must_use]
    pub fn new(method: Method, route: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::new(),
            method,
            route: route.into(),
            path: path.into(),
            headers: HeaderMap::new(),
            identity: None,
            values: IndexMap::new(),
        }
    }

    /// Creates a minimal context for tests.
    #[must_use]
    pub fn mock() -> Self {
        Self::new(Method::GET, "/", "/")
    }

    /// Returns this context with the given headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Returns this context with the given identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    /// Returns this context with the given request-scoped values.
    #[must_use]
    pub fn with_values(mut self, values: IndexMap<String, Value>) -> Self {
        self.values = values;
        self
    }

    /// Returns the request ID.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the matched route template (e.g. `/users/:id`).
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Returns the raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the identity stored by the identity gate, if the route is
    /// protected and identification succeeded.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Returns a request-scoped value stored by an earlier step.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns all request-scoped values in insertion order.
    #[must_use]
    pub const fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }
}
