//! In-memory engine for tests and demos.
//!
//! The loopback engine implements the [`Engine`] and [`Exchange`] surfaces
//! without any networking: requests are plain values dispatched through the
//! mounted chains, responses are buffered values handed back to the caller.
//! Route patterns use `:param` segments, matching the descriptor path
//! syntax.
//!
//! # Example
//!
//! ```ignore
//! let mut engine = LoopbackEngine::new();
//! table.mount(&mut engine);
//!
//! let response = engine
//!     .dispatch(LoopbackRequest::get("/widgets/7"))
//!     .await;
//! assert_eq!(response.status, http::StatusCode::OK);
//! ```

use crate::engine::{run_chain, Engine, RouteChain, Step};
use crate::exchange::{EngineError, Exchange};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tera::Tera;

/// A request value fed into [`LoopbackEngine::dispatch`].
#[derive(Debug, Clone)]
pub struct LoopbackRequest {
    /// Request method.
    pub method: Method,
    /// Request URI: path plus optional `?query`.
    pub uri: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Buffered request body.
    pub body: Bytes,
}

impl LoopbackRequest {
    /// Creates a request with the given method and URI.
    #[must_use]
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Creates a PUT request.
    #[must_use]
    pub fn put(uri: impl Into<String>) -> Self {
        Self::new(Method::PUT, uri)
    }

    /// Creates a DELETE request.
    #[must_use]
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::DELETE, uri)
    }

    /// Adds a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = value.parse() {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets a JSON body and the matching content type.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        self.body = Bytes::from(value.to_string());
        self.header("content-type", "application/json")
    }

    /// Sets a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

/// The buffered response produced by a dispatch.
#[derive(Debug, Clone)]
pub struct LoopbackResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Buffered response body.
    pub body: Bytes,
}

impl LoopbackResponse {
    /// Returns a response header as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the body as a UTF-8 string (lossy).
    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON.
    #[must_use]
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// One segment of a mounted route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A mounted route: method, parsed pattern, and its chain.
struct MountedRoute {
    method: Method,
    pattern: String,
    segments: Vec<Segment>,
    chain: RouteChain,
}

impl MountedRoute {
    fn new(method: Method, pattern: String, chain: RouteChain) -> Self {
        let segments = parse_segments(&pattern);
        Self {
            method,
            pattern,
            segments,
            chain,
        }
    }

    /// Attempts to match this route against a request path.
    fn match_path(&self, path: &str) -> Option<IndexMap<String, String>> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = IndexMap::new();
        for (segment, part) in self.segments.iter().zip(actual.iter()) {
            match segment {
                Segment::Literal(expected) => {
                    if expected != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        Some(params)
    }
}

/// Parses a `:param`-style pattern into segments.
fn parse_segments(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.strip_prefix(':').map_or_else(
                || Segment::Literal(s.to_string()),
                |name| Segment::Param(name.to_string()),
            )
        })
        .collect()
}

/// In-memory engine implementation.
///
/// Routes are checked in mount order; the first match wins. Global steps run
/// before every route chain (and before the fallback chains), honoring the
/// abort primitive throughout.
#[derive(Default)]
pub struct LoopbackEngine {
    routes: Vec<MountedRoute>,
    globals: Vec<Step>,
    static_dirs: Vec<(String, String)>,
    static_files: Vec<(String, String)>,
    no_route: Option<RouteChain>,
    no_method: Option<RouteChain>,
    templates: Arc<Tera>,
}

impl LoopbackEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a raw named template to the engine's template store.
    pub fn add_template(&mut self, name: &str, body: &str) -> Result<(), EngineError> {
        Arc::make_mut(&mut self.templates)
            .add_raw_template(name, body)
            .map_err(|e| EngineError::Template(e.to_string()))
    }

    /// Returns the number of mounted routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Dispatches a request through the mounted chains and returns the
    /// buffered response.
    pub async fn dispatch(&self, request: LoopbackRequest) -> LoopbackResponse {
        let (path, query) = match request.uri.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (request.uri.clone(), None),
        };

        // Static mounts are served by the engine itself, before routing.
        if let Some(response) = self.try_static(&path) {
            return response;
        }

        let matched = self.routes.iter().find_map(|route| {
            if route.method == request.method {
                route.match_path(&path).map(|params| (route, params))
            } else {
                None
            }
        });

        let mut exchange = match &matched {
            Some((route, params)) => LoopbackExchange::new(request.method.clone(), path.clone())
                .with_route(&route.pattern)
                .with_params(params.clone()),
            None => LoopbackExchange::new(request.method.clone(), path.clone()),
        }
        .with_query(query)
        .with_headers(request.headers.clone())
        .with_body(request.body.clone())
        .with_templates(self.templates.clone());

        run_chain(&mut exchange, &self.globals).await;

        if !exchange.is_aborted() {
            match matched {
                Some((route, _)) => {
                    run_chain(&mut exchange, &route.chain).await;
                }
                None => {
                    let path_known = self.routes.iter().any(|r| r.match_path(&path).is_some());
                    if path_known {
                        exchange.set_status(StatusCode::METHOD_NOT_ALLOWED);
                        if let Some(chain) = &self.no_method {
                            run_chain(&mut exchange, chain).await;
                        }
                    } else {
                        exchange.set_status(StatusCode::NOT_FOUND);
                        if let Some(chain) = &self.no_route {
                            run_chain(&mut exchange, chain).await;
                        }
                    }
                }
            }
        }

        exchange.into_response()
    }

    /// Serves static file and directory mounts.
    fn try_static(&self, path: &str) -> Option<LoopbackResponse> {
        for (mount, file) in &self.static_files {
            if mount == path {
                return Some(Self::file_response(file));
            }
        }
        for (prefix, root) in &self.static_dirs {
            if let Some(rest) = path.strip_prefix(prefix.as_str()) {
                let rest = rest.trim_start_matches('/');
                // Path traversal stays inside the root.
                if rest.split('/').any(|part| part == "..") {
                    continue;
                }
                let full = format!("{root}/{rest}");
                return Some(Self::file_response(&full));
            }
        }
        None
    }

    fn file_response(path: &str) -> LoopbackResponse {
        match std::fs::read(path) {
            Ok(data) => LoopbackResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Bytes::from(data),
            },
            Err(_) => LoopbackResponse {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
        }
    }
}

impl Engine for LoopbackEngine {
    fn mount(&mut self, method: Method, path: String, chain: RouteChain) {
        tracing::debug!(%method, %path, steps = chain.len(), "mounting loopback route");
        self.routes.push(MountedRoute::new(method, path, chain));
    }

    fn apply(&mut self, step: Step) {
        self.globals.push(step);
    }

    fn static_dir(&mut self, prefix: String, root: String) {
        self.static_dirs.push((prefix, root));
    }

    fn static_file(&mut self, path: String, file: String) {
        self.static_files.push((path, file));
    }

    fn fallback(&mut self, chain: RouteChain) {
        self.no_route = Some(chain);
    }

    fn method_fallback(&mut self, chain: RouteChain) {
        self.no_method = Some(chain);
    }
}

/// [`Exchange`] implementation backed by in-memory buffers.
///
/// Constructed by [`LoopbackEngine::dispatch`]; also constructible directly
/// for step-level tests.
pub struct LoopbackExchange {
    method: Method,
    path: String,
    route: String,
    query: Option<String>,
    headers: HeaderMap,
    params: IndexMap<String, String>,
    body: Bytes,
    values: IndexMap<String, Value>,
    aborted: bool,
    status: StatusCode,
    response_headers: HeaderMap,
    response_body: Vec<u8>,
    templates: Arc<Tera>,
}

impl LoopbackExchange {
    /// Creates an exchange for the given request line.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            route: String::new(),
            query: None,
            headers: HeaderMap::new(),
            params: IndexMap::new(),
            body: Bytes::new(),
            values: IndexMap::new(),
            aborted: false,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_body: Vec::new(),
            templates: Arc::new(Tera::default()),
        }
    }

    /// Sets the matched route template.
    #[must_use]
    pub fn with_route(mut self, route: &str) -> Self {
        self.route = route.to_string();
        self
    }

    /// Sets the extracted path parameters.
    #[must_use]
    pub fn with_params(mut self, params: IndexMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Sets the raw query string.
    #[must_use]
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    /// Sets the request headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the buffered request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Sets the template store used by the template writer.
    #[must_use]
    pub fn with_templates(mut self, templates: Arc<Tera>) -> Self {
        self.templates = templates;
        self
    }

    /// Consumes the exchange and returns the buffered response.
    #[must_use]
    pub fn into_response(self) -> LoopbackResponse {
        LoopbackResponse {
            status: self.status,
            headers: self.response_headers,
            body: Bytes::from(self.response_body),
        }
    }

    fn insert_header(&mut self, name: &str, value: &str) {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            self.response_headers.insert(name, value);
        }
    }
}

impl Exchange for LoopbackExchange {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn route(&self) -> &str {
        &self.route
    }

    fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    fn path_params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    fn body(&self) -> &Bytes {
        &self.body
    }

    fn set_value(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    fn abort(&mut self) {
        self.aborted = true;
    }

    fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.insert_header(name, value);
    }

    fn set_content_type(&mut self, value: &str) {
        self.insert_header("content-type", value);
    }

    fn write_json(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError> {
        let serialized =
            serde_json::to_string(value).map_err(|e| EngineError::Codec(e.to_string()))?;
        self.status = status;
        self.set_content_type("application/json; charset=utf-8");
        self.response_body = escape_json_html(&serialized).into_bytes();
        Ok(())
    }

    fn write_pure_json(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError> {
        let serialized =
            serde_json::to_string(value).map_err(|e| EngineError::Codec(e.to_string()))?;
        self.status = status;
        self.set_content_type("application/json; charset=utf-8");
        self.response_body = serialized.into_bytes();
        Ok(())
    }

    fn write_xml(&mut self, status: StatusCode, value: &Value) -> Result<(), EngineError> {
        self.status = status;
        self.set_content_type("application/xml; charset=utf-8");
        self.response_body = xml_from_value("response", value).into_bytes();
        Ok(())
    }

    fn write_template(
        &mut self,
        status: StatusCode,
        name: &str,
        data: &Value,
    ) -> Result<(), EngineError> {
        let context = tera::Context::from_value(data.clone())
            .map_err(|e| EngineError::Template(e.to_string()))?;
        let rendered = self
            .templates
            .render(name, &context)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        self.status = status;
        self.set_content_type("text/html; charset=utf-8");
        self.response_body = rendered.into_bytes();
        Ok(())
    }

    fn write_text(&mut self, status: StatusCode, text: &str) {
        self.status = status;
        self.set_content_type("text/plain; charset=utf-8");
        self.response_body = text.as_bytes().to_vec();
    }

    fn redirect(&mut self, status: StatusCode, location: &str) {
        self.status = status;
        self.insert_header("location", location);
    }

    fn write_bytes(&mut self, chunk: &[u8]) {
        self.response_body.extend_from_slice(chunk);
    }

    fn write_data(&mut self, status: StatusCode, content_type: &str, data: &[u8]) {
        self.status = status;
        if !content_type.is_empty() {
            self.set_content_type(content_type);
        }
        self.response_body = data.to_vec();
    }

    fn serve_file(&mut self, path: &str) -> Result<(), EngineError> {
        match std::fs::read(path) {
            Ok(data) => {
                if !self.response_headers.contains_key("content-type") {
                    self.set_content_type("application/octet-stream");
                }
                self.response_body = data;
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                self.status = StatusCode::NOT_FOUND;
                Ok(())
            }
            Err(err) => Err(EngineError::Io(err)),
        }
    }

    fn serve_attachment(&mut self, path: &str, filename: &str) -> Result<(), EngineError> {
        if Path::new(path).is_file() {
            self.insert_header(
                "content-disposition",
                &format!("attachment; filename=\"{filename}\""),
            );
        }
        self.serve_file(path)
    }
}

/// Escapes HTML-sensitive characters in serialized JSON, as browser-facing
/// engines do for their default JSON writer.
fn escape_json_html(serialized: &str) -> String {
    let mut out = String::with_capacity(serialized.len());
    for c in serialized.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            other => out.push(other),
        }
    }
    out
}

/// Renders a JSON value as a minimal XML document.
fn xml_from_value(tag: &str, value: &Value) -> String {
    let mut out = String::new();
    write_xml_element(&mut out, tag, value);
    out
}

fn write_xml_element(out: &mut String, tag: &str, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push_str(&format!("<{tag}>"));
            for (key, child) in map {
                write_xml_element(out, key, child);
            }
            out.push_str(&format!("</{tag}>"));
        }
        Value::Array(items) => {
            for item in items {
                write_xml_element(out, tag, item);
            }
        }
        Value::Null => {
            out.push_str(&format!("<{tag}/>"));
        }
        Value::String(s) => {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape_xml(s)));
        }
        other => {
            out.push_str(&format!("<{tag}>{other}</{tag}>"));
        }
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
