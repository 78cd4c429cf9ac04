//! Descriptor extraction from handler documentation text.
//!
//! A handler's attached documentation carries its routing metadata:
//!
//! ```text
//! @authorize(admin,ops:::read,write)
//! @audit_log
//! [GET] /api/v1/widgets/:id 200 json
//! ```
//!
//! The parser turns that text into a [`RouteDescriptor`], an optional
//! [`IdentityDescriptor`], and an ordered decorator-name list. A line is
//! only treated as the route line when its bracketed first token names a
//! known verb, so ordinary bracketed prose in documentation is never
//! mistaken for a descriptor.

use crate::error::RegistryError;
use http::{Method, StatusCode};

/// Marker opening an authorization line.
const AUTHORIZE_MARKER: &str = "@authorize";

/// Canonical separator between the role list and the permission list.
const ROLE_PERMISSION_SEPARATOR: &str = ":::";

/// The fixed verb set accepted in descriptor lines.
const VERBS: &[(&str, Method)] = &[
    ("GET", Method::GET),
    ("HEAD", Method::HEAD),
    ("POST", Method::POST),
    ("PUT", Method::PUT),
    ("PATCH", Method::PATCH),
    ("DELETE", Method::DELETE),
    ("CONNECT", Method::CONNECT),
    ("OPTIONS", Method::OPTIONS),
    ("TRACE", Method::TRACE),
];

/// Parsed route metadata: method, path, status, response mode, and the
/// optional content type carried by binary/data modes.
///
/// Invariant: method and path are always set; the mode tag is set at most
/// once (an absent tag is the status-only mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDescriptor {
    method: Method,
    path: String,
    status: u16,
    mode_tag: String,
    content_type: Option<String>,
}

impl RouteDescriptor {
    pub(crate) fn new(
        method: Method,
        path: impl Into<String>,
        status: u16,
        mode_tag: impl Into<String>,
        content_type: Option<String>,
    ) -> Self {
        Self {
            method,
            path: path.into(),
            status,
            mode_tag: mode_tag.into(),
            content_type,
        }
    }

    /// Returns the HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the route path with its trailing slash stripped.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the declared status as a raw integer.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Returns the declared status as an [`http::StatusCode`].
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK)
    }

    /// Returns the raw response-mode tag; empty for status-only routes.
    #[must_use]
    pub fn mode_tag(&self) -> &str {
        &self.mode_tag
    }

    /// Returns the declared content type, present only for binary/data
    /// modes.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

/// Required roles and permissions parsed from an `@authorize` line.
///
/// Present only when the documentation carries the authorization marker;
/// absence means the route is unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDescriptor {
    roles: Vec<String>,
    permissions: Vec<String>,
}

impl IdentityDescriptor {
    /// Returns the required roles in source order.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns the required permissions in source order.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }
}

/// Everything extracted from one handler's documentation text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptors {
    /// The route line.
    pub route: RouteDescriptor,
    /// The authorization line, if present.
    pub identity: Option<IdentityDescriptor>,
    /// Decorator names in source order.
    pub decorators: Vec<String>,
}

/// Parses a handler's documentation text.
///
/// `handler` names the offending function in registration errors.
pub fn parse(doc: &str, handler: &str) -> Result<Descriptors, RegistryError> {
    let route = parse_route(doc, handler)?;
    let identity = parse_identity(doc);
    let decorators = parse_decorators(doc);

    Ok(Descriptors {
        route,
        identity,
        decorators,
    })
}

/// Looks a bracketed token up in the fixed verb set, case-insensitively.
fn lookup_verb(token: &str) -> Option<Method> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let upper = inner.to_uppercase();
    VERBS
        .iter()
        .find(|(name, _)| *name == upper)
        .map(|(_, method)| method.clone())
}

fn parse_route(doc: &str, handler: &str) -> Result<RouteDescriptor, RegistryError> {
    // Remembers a bracket-led, route-shaped line whose verb is unknown, for
    // the better diagnostic when no valid line exists.
    let mut bad_verb: Option<String> = None;

    for line in doc.lines().map(str::trim) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = tokens.first() else {
            continue;
        };
        if !(first.starts_with('[') && first.ends_with(']')) {
            continue;
        }

        match lookup_verb(first) {
            Some(method) => return parse_route_tokens(method, &tokens, handler),
            None => {
                let route_shaped = tokens.get(1).is_some_and(|t| t.starts_with('/'));
                if route_shaped && bad_verb.is_none() {
                    bad_verb = Some((*first).to_string());
                }
            }
        }
    }

    Err(bad_verb.map_or_else(
        || RegistryError::MissingDescriptor {
            handler: handler.to_string(),
        },
        |token| RegistryError::InvalidVerb {
            handler: handler.to_string(),
            token,
        },
    ))
}

fn parse_route_tokens(
    method: Method,
    tokens: &[&str],
    handler: &str,
) -> Result<RouteDescriptor, RegistryError> {
    let invalid = |reason: &str| RegistryError::InvalidDescriptor {
        handler: handler.to_string(),
        reason: reason.to_string(),
    };

    let mut path: Option<String> = None;
    let mut status: Option<u16> = None;
    let mut mode_tag: Option<String> = None;
    let mut content_type: Option<String> = None;

    let mut index = 1;
    while index < tokens.len() {
        let token = tokens[index];
        index += 1;

        if token.starts_with('/') {
            let trimmed = token.trim_end_matches('/');
            path = Some(if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            });
            continue;
        }

        if token.chars().all(|c| c.is_ascii_digit()) {
            let parsed: u16 = token
                .parse()
                .map_err(|_| invalid("status does not fit a status code"))?;
            if !(100..=999).contains(&parsed) {
                return Err(invalid("status out of range"));
            }
            status = Some(parsed);
            continue;
        }

        if mode_tag.is_some() {
            return Err(invalid("response mode specified more than once"));
        }

        if let Some((mode, rest)) = token.split_once('@') {
            // Everything after the `@` belongs to the content type,
            // including any following tokens: content types carry
            // parameters like `; charset=utf-8`.
            let mut value = rest.to_string();
            for extra in &tokens[index..] {
                value.push(' ');
                value.push_str(extra);
            }
            index = tokens.len();

            mode_tag = Some(mode.to_string());
            if !value.is_empty() {
                content_type = Some(value);
            }
            continue;
        }

        mode_tag = Some(token.to_string());
    }

    let path = path.ok_or_else(|| invalid("missing path"))?;
    let status = status.ok_or_else(|| invalid("missing status"))?;

    Ok(RouteDescriptor {
        method,
        path,
        status,
        mode_tag: mode_tag.unwrap_or_default(),
        content_type,
    })
}

fn parse_identity(doc: &str) -> Option<IdentityDescriptor> {
    let mut descriptor = None;

    for line in doc.lines().map(str::trim) {
        if !line.starts_with(AUTHORIZE_MARKER) {
            continue;
        }

        let rest: String = line[AUTHORIZE_MARKER.len()..]
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let rest = rest.strip_prefix('(').unwrap_or(&rest);
        let rest = rest.strip_suffix(')').unwrap_or(rest);

        let (before, after) = rest
            .split_once(ROLE_PERMISSION_SEPARATOR)
            .unwrap_or((rest, ""));

        descriptor = Some(IdentityDescriptor {
            roles: split_names(before),
            permissions: split_names(after),
        });
    }

    descriptor
}

fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_decorators(doc: &str) -> Vec<String> {
    doc.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('@') && !line.starts_with(AUTHORIZE_MARKER))
        .filter_map(|line| {
            let name = line[1..].trim();
            if name.is_empty() {
                None
            } else {
                Some(name.to_string())
            }
        })
        .collect()
}

/// Deterministic identifier grouping every step that targets one logical
/// endpoint.
///
/// Encoded as `{method}::{path}::{status}::{mode}`; two registrations that
/// share a key are concatenated into one ordered chain, never replaced.
/// The mounting pass parses method and path back out of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey(String);

impl RouteKey {
    /// Derives the key for a route descriptor.
    #[must_use]
    pub fn new(descriptor: &RouteDescriptor) -> Self {
        Self(format!(
            "{}::{}::{}::{}",
            descriptor.method(),
            descriptor.path(),
            descriptor.status(),
            descriptor.mode_tag(),
        ))
    }

    /// Returns the encoded form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the method and path back out of the key.
    ///
    /// Returns `None` only for keys that were not produced by
    /// [`RouteKey::new`].
    #[must_use]
    pub fn method_and_path(&self) -> Option<(Method, String)> {
        let parts: Vec<&str> = self.0.split("::").collect();
        if parts.len() < 4 {
            return None;
        }
        let method = Method::from_bytes(parts[0].as_bytes()).ok()?;
        let path = parts[1..parts.len() - 2].join("::");
        Some((method, path))
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
