//! Domain error taxonomy.
//!
//! This module provides the [`Fault`] type returned by business handlers,
//! decorators, and identifier functions, together with the fixed
//! [`FaultKind`] → status-code taxonomy and the environment-sensitive
//! formatting rules applied when a fault is written to a response.
//!
//! The taxonomy covers the full HTTP 4xx/5xx sentinel space plus the
//! project-specific [`FaultKind::Retry`] sentinel (status 599) and
//! [`FaultKind::Unclassified`] for errors that arrive without a known kind.
//! Unclassified faults always map to 500 and never expose a structured body
//! in production.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use thiserror::Error;

/// Result type alias using [`Fault`].
pub type FaultResult<T> = Result<T, Fault>;

/// The fixed set of domain error sentinels.
///
/// Every kind has a fixed status code; the mapping is consulted whenever a
/// step in a route's chain returns a [`Fault`]. The set is closed: business
/// code picks a sentinel, it does not invent status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultKind {
    /// 400 Bad Request.
    BadRequest,
    /// 401 Unauthorized.
    Unauthorized,
    /// 402 Payment Required.
    PaymentRequired,
    /// 403 Forbidden.
    Forbidden,
    /// 404 Not Found.
    NotFound,
    /// 405 Method Not Allowed.
    MethodNotAllowed,
    /// 406 Not Acceptable.
    NotAcceptable,
    /// 407 Proxy Authentication Required.
    ProxyAuthRequired,
    /// 408 Request Timeout.
    RequestTimeout,
    /// 409 Conflict.
    Conflict,
    /// 409 Conflict, raised when a resource already exists.
    AlreadyExist,
    /// 410 Gone.
    Gone,
    /// 411 Length Required.
    LengthRequired,
    /// 412 Precondition Failed.
    PreconditionFailed,
    /// 413 Payload Too Large.
    PayloadTooLarge,
    /// 414 URI Too Long.
    UriTooLong,
    /// 415 Unsupported Media Type.
    UnsupportedMediaType,
    /// 416 Range Not Satisfiable.
    RangeNotSatisfiable,
    /// 417 Expectation Failed.
    ExpectationFailed,
    /// 418 I'm a teapot.
    Teapot,
    /// 421 Misdirected Request.
    MisdirectedRequest,
    /// 422 Unprocessable Entity.
    UnprocessableEntity,
    /// 423 Locked.
    Locked,
    /// 424 Failed Dependency.
    FailedDependency,
    /// 425 Too Early.
    TooEarly,
    /// 426 Upgrade Required.
    UpgradeRequired,
    /// 428 Precondition Required.
    PreconditionRequired,
    /// 429 Too Many Requests.
    TooManyRequests,
    /// 431 Request Header Fields Too Large.
    HeaderFieldsTooLarge,
    /// 451 Unavailable For Legal Reasons.
    UnavailableForLegalReasons,
    /// 500 Internal Server Error.
    Internal,
    /// 501 Not Implemented.
    NotImplemented,
    /// 502 Bad Gateway.
    BadGateway,
    /// 503 Service Unavailable.
    ServiceUnavailable,
    /// 504 Gateway Timeout.
    GatewayTimeout,
    /// 505 HTTP Version Not Supported.
    HttpVersionNotSupported,
    /// 506 Variant Also Negotiates.
    VariantAlsoNegotiates,
    /// 507 Insufficient Storage.
    InsufficientStorage,
    /// 508 Loop Detected.
    LoopDetected,
    /// 510 Not Extended.
    NotExtended,
    /// 511 Network Authentication Required.
    NetworkAuthenticationRequired,
    /// 599, the project-specific retry sentinel.
    Retry,
    /// 500, for errors that arrive without a recognized kind.
    ///
    /// Unclassified faults never expose a structured body in production.
    Unclassified,
}

impl FaultKind {
    /// Returns the fixed status code for this sentinel.
    #[must_use]
    pub const fn status_u16(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::PaymentRequired => 402,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
            Self::NotAcceptable => 406,
            Self::ProxyAuthRequired => 407,
            Self::RequestTimeout => 408,
            Self::Conflict | Self::AlreadyExist => 409,
            Self::Gone => 410,
            Self::LengthRequired => 411,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UriTooLong => 414,
            Self::UnsupportedMediaType => 415,
            Self::RangeNotSatisfiable => 416,
            Self::ExpectationFailed => 417,
            Self::Teapot => 418,
            Self::MisdirectedRequest => 421,
            Self::UnprocessableEntity => 422,
            Self::Locked => 423,
            Self::FailedDependency => 424,
            Self::TooEarly => 425,
            Self::UpgradeRequired => 426,
            Self::PreconditionRequired => 428,
            Self::TooManyRequests => 429,
            Self::HeaderFieldsTooLarge => 431,
            Self::UnavailableForLegalReasons => 451,
            Self::Internal | Self::Unclassified => 500,
            Self::NotImplemented => 501,
            Self::BadGateway => 502,
            Self::ServiceUnavailable => 503,
            Self::GatewayTimeout => 504,
            Self::HttpVersionNotSupported => 505,
            Self::VariantAlsoNegotiates => 506,
            Self::InsufficientStorage => 507,
            Self::LoopDetected => 508,
            Self::NotExtended => 510,
            Self::NetworkAuthenticationRequired => 511,
            Self::Retry => 599,
        }
    }

    /// Returns the status code as an [`http::StatusCode`].
    #[must_use]
    pub fn status(self) -> StatusCode {
        StatusCode::from_u16(self.status_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns the machine-readable key written into fault bodies.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::PaymentRequired => "PAYMENT_REQUIRED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            Self::NotAcceptable => "NOT_ACCEPTABLE",
            Self::ProxyAuthRequired => "PROXY_AUTH_REQUIRED",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::AlreadyExist => "ALREADY_EXIST",
            Self::Gone => "GONE",
            Self::LengthRequired => "LENGTH_REQUIRED",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UriTooLong => "URI_TOO_LONG",
            Self::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            Self::RangeNotSatisfiable => "RANGE_NOT_SATISFIABLE",
            Self::ExpectationFailed => "EXPECTATION_FAILED",
            Self::Teapot => "TEAPOT",
            Self::MisdirectedRequest => "MISDIRECTED_REQUEST",
            Self::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
            Self::Locked => "LOCKED",
            Self::FailedDependency => "FAILED_DEPENDENCY",
            Self::TooEarly => "TOO_EARLY",
            Self::UpgradeRequired => "UPGRADE_REQUIRED",
            Self::PreconditionRequired => "PRECONDITION_REQUIRED",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::HeaderFieldsTooLarge => "HEADER_FIELDS_TOO_LARGE",
            Self::UnavailableForLegalReasons => "UNAVAILABLE_FOR_LEGAL_REASONS",
            Self::Internal => "INTERNAL",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::BadGateway => "BAD_GATEWAY",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::GatewayTimeout => "GATEWAY_TIMEOUT",
            Self::HttpVersionNotSupported => "HTTP_VERSION_NOT_SUPPORTED",
            Self::VariantAlsoNegotiates => "VARIANT_ALSO_NEGOTIATES",
            Self::InsufficientStorage => "INSUFFICIENT_STORAGE",
            Self::LoopDetected => "LOOP_DETECTED",
            Self::NotExtended => "NOT_EXTENDED",
            Self::NetworkAuthenticationRequired => "NETWORK_AUTHENTICATION_REQUIRED",
            Self::Retry => "RETRY",
            Self::Unclassified => "UNCLASSIFIED",
        }
    }

    /// Returns `true` for client-facing (status < 500) sentinels.
    #[must_use]
    pub const fn is_client(self) -> bool {
        self.status_u16() < 500
    }
}

/// Controls how much diagnostic detail faults expose to clients.
///
/// The mode is a process-wide switch set during registration. Production
/// strips stacks and normalizes or blanks messages; development preserves
/// full diagnostic payloads including stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMode {
    /// Full messages and stacks are exposed to clients.
    Development,
    /// Stacks are stripped; messages are normalized (< 500) or blanked (>= 500).
    #[default]
    Production,
}

/// A domain error carrying a sentinel kind, a message, and a captured stack.
///
/// Returned by business handlers, decorators, validators, and identifier
/// functions. The registration layer translates a `Fault` into a status code
/// via the taxonomy and a body via [`Fault::to_body`].
///
/// # Example
///
/// ```
/// use stoa_core::{Fault, FaultKind};
/// use http::StatusCode;
///
/// let fault = Fault::bad_request("invalid id");
/// assert_eq!(fault.kind(), FaultKind::BadRequest);
/// assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
/// ```
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct Fault {
    kind: FaultKind,
    message: String,
    stack: Option<String>,
}

impl Fault {
    /// Creates a fault with the given sentinel and message, capturing the
    /// current stack.
    #[must_use]
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Some(Backtrace::force_capture().to_string()),
        }
    }

    /// Wraps an arbitrary error as a fault of the given kind.
    #[must_use]
    pub fn wrap(kind: FaultKind, source: &dyn std::error::Error) -> Self {
        Self::new(kind, source.to_string())
    }

    /// Creates a 400 Bad Request fault.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(FaultKind::BadRequest, message)
    }

    /// Creates a 401 Unauthorized fault.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Unauthorized, message)
    }

    /// Creates a 403 Forbidden fault.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Forbidden, message)
    }

    /// Creates a 404 Not Found fault.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FaultKind::NotFound, message)
    }

    /// Creates a 409 Conflict fault.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Conflict, message)
    }

    /// Creates a 422 Unprocessable Entity fault.
    #[must_use]
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(FaultKind::UnprocessableEntity, message)
    }

    /// Creates a 500 Internal fault.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Internal, message)
    }

    /// Creates a 599 Retry fault.
    #[must_use]
    pub fn retry(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Retry, message)
    }

    /// Returns the sentinel kind.
    #[must_use]
    pub const fn kind(&self) -> FaultKind {
        self.kind
    }

    /// Returns the raw, unformatted message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the captured stack, if any.
    #[must_use]
    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Returns the status code from the taxonomy.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    /// Produces the client-facing body for this fault under the given mode.
    ///
    /// Returns `None` when the response must be status-only: unclassified
    /// faults in production carry no structured body at all.
    ///
    /// Formatting rules:
    /// - production, status < 500: message uppercased with spaces replaced by
    ///   underscores, stack stripped;
    /// - production, status >= 500: message blanked, stack stripped;
    /// - development: stack preserved; messages of client-facing faults are
    ///   normalized the same way, server-side messages pass through verbatim.
    #[must_use]
    pub fn to_body(&self, mode: ErrorMode) -> Option<FaultBody> {
        if self.kind == FaultKind::Unclassified {
            return match mode {
                ErrorMode::Production => None,
                ErrorMode::Development => Some(FaultBody {
                    message: self.message.clone(),
                    key: self.kind.key().to_string(),
                    stack: self.stack.clone(),
                }),
            };
        }

        let message = if self.kind.is_client() {
            normalize_message(&self.message)
        } else {
            match mode {
                ErrorMode::Production => String::new(),
                ErrorMode::Development => self.message.clone(),
            }
        };

        let stack = match mode {
            ErrorMode::Production => None,
            ErrorMode::Development => self.stack.clone(),
        };

        Some(FaultBody {
            message,
            key: self.kind.key().to_string(),
            stack,
        })
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Self::new(FaultKind::Unclassified, err.to_string())
    }
}

/// Uppercases a message and replaces spaces with underscores.
fn normalize_message(message: &str) -> String {
    message.to_uppercase().replace(' ', "_")
}

/// Serializable client-facing form of a fault.
///
/// Written with the route's declared codec when the route is structured,
/// otherwise the response is status-only and this body is never produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultBody {
    /// Formatted message; empty when blanked for server-side faults.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// Machine-readable sentinel key.
    pub key: String,
    /// Captured stack; present in development mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}
