//! Registration-time and binding errors.
//!
//! Registration errors are returned from [`Registry`](crate::Registry)
//! methods and from [`Registry::freeze`](crate::Registry::freeze); they are
//! never recoverable and the host is expected to abort startup on them.
//! [`BindError`] is the request-time failure of mapping a raw request into a
//! handler's typed input; it becomes a 422 response, with diagnostic detail
//! exposed in development mode only.

use http::Method;
use thiserror::Error;

/// Fatal registration error: a contract violation detected at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The handler's documentation contains no descriptor line.
    #[error("{handler} has no descriptor")]
    MissingDescriptor {
        /// The offending handler.
        handler: String,
    },

    /// A route-shaped line names a verb outside the fixed set.
    #[error("{handler} has invalid verb {token}")]
    InvalidVerb {
        /// The offending handler.
        handler: String,
        /// The bracketed token that failed the verb lookup.
        token: String,
    },

    /// The descriptor line is malformed.
    #[error("{handler} has an invalid descriptor: {reason}")]
    InvalidDescriptor {
        /// The offending handler.
        handler: String,
        /// What was wrong with the line.
        reason: String,
    },

    /// The response-mode tag is not in the closed mode set.
    #[error("{handler} declares unacceptable response mode {tag:?}")]
    UnknownMode {
        /// The offending handler.
        handler: String,
        /// The unrecognized tag.
        tag: String,
    },

    /// The handler's output type cannot satisfy the declared response mode.
    #[error("{handler} output cannot satisfy response mode {mode:?}: a {capability} payload is required")]
    PayloadMismatch {
        /// The offending handler.
        handler: String,
        /// The declared mode tag.
        mode: String,
        /// The capability the mode requires.
        capability: &'static str,
    },

    /// A documented decorator name has no entry in the decorator table.
    #[error("{name} decorator does not exist for [{method}] {path}")]
    UnknownDecorator {
        /// The unresolved decorator name.
        name: String,
        /// The route's method.
        method: Method,
        /// The route's path.
        path: String,
    },

    /// A route declares required roles/permissions but no identifier
    /// function is registered.
    #[error("[{method}] {path} requires authorization but no identifier is registered")]
    MissingIdentifier {
        /// The route's method.
        method: Method,
        /// The route's path.
        path: String,
    },
}

/// Request-time failure of mapping a raw request into a typed input.
///
/// Carries the route path, method, and handler identity for diagnostics,
/// formatted the way the registration layer logs them.
#[derive(Debug, Error)]
#[error("{detail}\tAPI={path}\tMethod={method}\tHandler={handler}")]
pub struct BindError {
    /// The route path.
    pub path: String,
    /// The route method.
    pub method: Method,
    /// The handler's type name.
    pub handler: String,
    /// The underlying deserialization failure.
    pub detail: String,
}

impl BindError {
    pub(crate) fn new(
        path: impl Into<String>,
        method: Method,
        handler: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            method,
            handler: handler.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_messages_name_the_handler() {
        let err = RegistryError::MissingDescriptor {
            handler: "widgets::list".to_string(),
        };
        assert_eq!(err.to_string(), "widgets::list has no descriptor");

        let err = RegistryError::UnknownDecorator {
            name: "audit".to_string(),
            method: Method::GET,
            path: "/widgets".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "audit decorator does not exist for [GET] /widgets"
        );
    }

    #[test]
    fn test_bind_error_carries_route_diagnostics() {
        let err = BindError::new(
            "/widgets/:id",
            Method::GET,
            "widgets::get",
            "invalid type: string",
        );
        let formatted = err.to_string();
        assert!(formatted.contains("API=/widgets/:id"));
        assert!(formatted.contains("Method=GET"));
        assert!(formatted.contains("Handler=widgets::get"));
    }
}
