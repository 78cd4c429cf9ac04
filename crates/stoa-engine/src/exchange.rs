//! Per-request engine surface.
//!
//! [`Exchange`] is the object-safe view of one in-flight request that every
//! pipeline step receives: request accessors, the request-scoped key/value
//! store, the chain-abort primitive, and the response writers. A concrete
//! engine adapter implements it once; steps never see the engine's own
//! context type.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by an engine's response writers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Payload serialization failed.
    #[error("codec error: {0}")]
    Codec(String),
    /// Template rendering failed.
    #[error("template error: {0}")]
    Template(String),
    /// Filesystem access failed while serving a file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One in-flight request/response pair.
///
/// All request-side data is buffered by the engine before the chain runs
/// (body parsing is an engine concern); the accessors here are synchronous.
/// Response writers buffer into the engine's response object.
///
/// # Abort semantics
///
/// [`Exchange::abort`] stops invocation of all subsequent steps for this
/// request only; other in-flight requests are unaffected. Engines must check
/// [`Exchange::is_aborted`] before each step (see
/// [`run_chain`](crate::run_chain)).
pub trait Exchange: Send {
    /// Returns the request method.
    fn method(&self) -> &Method;

    /// Returns the raw request path.
    fn path(&self) -> &str;

    /// Returns the matched route template (e.g. `/users/:id`).
    fn route(&self) -> &str;

    /// Returns the request headers.
    fn headers(&self) -> &HeaderMap;

    /// Returns the raw query string, without the leading `?`.
    fn query(&self) -> Option<&str>;

    /// Returns the path parameters extracted by the engine's router.
    fn path_params(&self) -> &IndexMap<String, String>;

    /// Returns the buffered request body.
    fn body(&self) -> &Bytes;

    /// Returns a header value as a string, if present and valid UTF-8.
    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header.
    fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Returns a cookie value from the `Cookie` header.
    fn cookie(&self, name: &str) -> Option<String> {
        let raw = self.header("cookie")?;
        for pair in raw.split(';') {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            if key.trim() == name {
                return Some(value.trim().to_string());
            }
        }
        None
    }

    /// Returns the decoded query parameters in source order.
    fn query_pairs(&self) -> Vec<(String, String)> {
        self.query().map_or_else(Vec::new, parse_query)
    }

    /// Stores a request-scoped value for later steps.
    fn set_value(&mut self, key: &str, value: Value);

    /// Returns a request-scoped value stored by an earlier step.
    fn value(&self, key: &str) -> Option<&Value>;

    /// Returns all request-scoped values in insertion order.
    fn values(&self) -> &IndexMap<String, Value>;

    /// Stops invocation of all subsequent steps for this request.
    fn abort(&mut self);

    /// Returns `true` once [`Exchange::abort`] has been called.
    fn is_aborted(&self) -> bool;

    /// Sets the response status without writing a body.
    fn set_status(&mut self, status: StatusCode);

    /// Sets a response header.
    fn set_header(&mut self, name: &str, value: &str);

    /// Sets the response Content-Type.
    fn set_content_type(&mut self, value: &str);

    /// Writes a JSON body with HTML-sensitive characters escaped.
    fn write_json(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError>;

    /// Writes a JSON body verbatim, without HTML escaping.
    fn write_pure_json(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError>;

    /// Writes an XML body.
    fn write_xml(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError>;

    /// Renders a named template with the given data context.
    fn write_template(
        &mut self,
        status: StatusCode,
        name: &str,
        data: &Value,
    ) -> Result<(), EngineError>;

    /// Writes a plain-text body.
    fn write_text(&mut self, status: StatusCode, text: &str);

    /// Issues a redirect to the given location.
    fn redirect(&mut self, status: StatusCode, location: &str);

    /// Appends raw bytes to the response body without touching the status.
    fn write_bytes(&mut self, chunk: &[u8]);

    /// Writes raw bytes with an explicit status and content type.
    fn write_data(&mut self, status: StatusCode, content_type: &str, data: &[u8]);

    /// Serves a file from the local filesystem; a missing file produces 404.
    fn serve_file(&mut self, path: &str) -> Result<(), EngineError>;

    /// Serves a file as a download with the given filename.
    fn serve_attachment(&mut self, path: &str, filename: &str) -> Result<(), EngineError>;
}

/// Splits and percent-decodes a query string into ordered pairs.
fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (percent_decode(key), percent_decode(value))
        })
        .collect()
}

/// Decodes `%XX` escapes and `+` in a query component.
fn percent_decode(component: &str) -> String {
    let bytes = component.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}
