//! Response-mode resolution and output rendering.
//!
//! A route's mode tag is resolved exactly once, at registration time, into
//! the closed [`ResponseMode`] enum; request-time rendering dispatches on
//! the enum and never re-interprets strings. An output type declares what
//! it can be rendered as through the [`Respond`] capability trait, and a
//! mode whose required capability the type lacks is rejected at
//! registration, not at the first request.

use crate::descriptor::RouteDescriptor;
use crate::error::RegistryError;
use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;
use std::path::PathBuf;
use stoa_core::{Fault, FaultResult};
use stoa_engine::{EngineError, Exchange};

/// Rendering capabilities an output type declares.
///
/// The resolver checks the declared capabilities against the mode's
/// requirement when a handler is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RespondCaps {
    /// Can produce a structured value for the JSON/XML/template codecs.
    pub structured: bool,
    /// Can produce a string form (text, redirect location, file path).
    pub text: bool,
    /// Can produce raw bytes (stream/data modes).
    pub raw: bool,
    /// Writes itself into the response (render mode).
    pub passthrough: bool,
}

impl RespondCaps {
    /// No capabilities; only the status-only mode is acceptable.
    pub const NONE: Self = Self {
        structured: false,
        text: false,
        raw: false,
        passthrough: false,
    };

    /// Structured payloads.
    pub const STRUCTURED: Self = Self {
        structured: true,
        text: false,
        raw: false,
        passthrough: false,
    };

    /// String-form payloads.
    pub const TEXT: Self = Self {
        structured: false,
        text: true,
        raw: false,
        passthrough: false,
    };

    /// Raw-byte payloads.
    pub const RAW: Self = Self {
        structured: false,
        text: false,
        raw: true,
        passthrough: false,
    };

    /// Self-rendering payloads.
    pub const PASSTHROUGH: Self = Self {
        structured: false,
        text: false,
        raw: false,
        passthrough: true,
    };

    /// Combines two capability sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            structured: self.structured || other.structured,
            text: self.text || other.text,
            raw: self.raw || other.raw,
            passthrough: self.passthrough || other.passthrough,
        }
    }
}

/// Capability contract of a handler's typed output.
///
/// Methods other than [`Respond::caps`] default to an internal fault; they
/// are unreachable for any mode the resolver accepted at registration.
/// Business structs usually opt in with `#[derive(Respond)]`, which declares
/// the structured capability through serde; `String`, byte buffers, and
/// paths have built-in implementations for the text and raw families.
pub trait Respond: Send + 'static {
    /// Declares this type's rendering capabilities.
    fn caps() -> RespondCaps
    where
        Self: Sized;

    /// Structured view of the output for the JSON/XML/template codecs.
    fn to_value(&self) -> FaultResult<Value> {
        Err(unsupported::<Self>("structured"))
    }

    /// String form of the output for text, redirect, and file-path modes.
    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        Err(unsupported::<Self>("text"))
    }

    /// Raw bytes of the output for stream/data modes.
    fn into_bytes(self) -> FaultResult<Bytes>
    where
        Self: Sized,
    {
        Err(unsupported::<Self>("raw"))
    }

    /// Writes the output into the response directly (render mode).
    ///
    /// The implementation is expected to set its own content type on the
    /// exchange before writing the body.
    fn render(self, ex: &mut (dyn Exchange + '_)) -> FaultResult<()>
    where
        Self: Sized,
    {
        let _ = ex;
        Err(unsupported::<Self>("passthrough"))
    }
}

fn unsupported<T: ?Sized>(capability: &str) -> Fault {
    Fault::internal(format!(
        "{} does not support the {capability} payload capability",
        std::any::type_name::<T>(),
    ))
}

impl Respond for String {
    fn caps() -> RespondCaps {
        RespondCaps::STRUCTURED.union(RespondCaps::TEXT)
    }

    fn to_value(&self) -> FaultResult<Value> {
        Ok(Value::String(self.clone()))
    }

    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        Ok(Cow::Borrowed(self))
    }
}

impl Respond for &'static str {
    fn caps() -> RespondCaps {
        RespondCaps::STRUCTURED.union(RespondCaps::TEXT)
    }

    fn to_value(&self) -> FaultResult<Value> {
        Ok(Value::String((*self).to_string()))
    }

    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        Ok(Cow::Borrowed(*self))
    }
}

impl Respond for Cow<'static, str> {
    fn caps() -> RespondCaps {
        RespondCaps::STRUCTURED.union(RespondCaps::TEXT)
    }

    fn to_value(&self) -> FaultResult<Value> {
        Ok(Value::String(self.clone().into_owned()))
    }

    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        Ok(Cow::Borrowed(self.as_ref()))
    }
}

impl Respond for PathBuf {
    fn caps() -> RespondCaps {
        RespondCaps::TEXT
    }

    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        Ok(self.to_string_lossy())
    }
}

impl Respond for Bytes {
    fn caps() -> RespondCaps {
        RespondCaps::RAW
    }

    fn into_bytes(self) -> FaultResult<Bytes> {
        Ok(self)
    }
}

impl Respond for Vec<u8> {
    fn caps() -> RespondCaps {
        RespondCaps::RAW
    }

    fn into_bytes(self) -> FaultResult<Bytes> {
        Ok(Bytes::from(self))
    }
}

impl Respond for Value {
    fn caps() -> RespondCaps {
        RespondCaps::STRUCTURED.union(RespondCaps::TEXT)
    }

    fn to_value(&self) -> FaultResult<Value> {
        Ok(self.clone())
    }

    fn as_text(&self) -> FaultResult<Cow<'_, str>> {
        match self {
            Value::String(s) => Ok(Cow::Borrowed(s)),
            other => Ok(Cow::Owned(other.to_string())),
        }
    }
}

impl Respond for () {
    fn caps() -> RespondCaps {
        RespondCaps::NONE
    }
}

/// The closed set of response modes, resolved once per route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    /// Write only the status code, no body.
    Empty,
    /// Serialize the output as JSON with HTML-sensitive escaping.
    Json,
    /// Serialize the output as JSON verbatim.
    PureJson,
    /// Serialize the output as XML.
    Xml,
    /// Render the named template with the output as its data context.
    Template(String),
    /// Write the output's string form verbatim.
    Text,
    /// Redirect to the location carried in the output.
    Redirect,
    /// Treat the output as a filesystem path and serve the file.
    File,
    /// Serve the output path as a download.
    Attachment,
    /// Write the output's raw bytes directly.
    Stream,
    /// Write the output's raw bytes wrapped with the declared status.
    Data,
    /// The output writes itself into the response.
    Render,
}

impl ResponseMode {
    /// Resolves a raw mode tag; `None` for tags outside the closed set.
    ///
    /// A tag containing a template-family marker (`html` or `tmpl`) names a
    /// template and resolves before the fixed tags, matching the way
    /// template names like `index.tmpl` appear in descriptor lines.
    #[must_use]
    pub fn parse(tag: &str) -> Option<Self> {
        if tag.contains("html") || tag.contains("tmpl") {
            return Some(Self::Template(tag.to_string()));
        }

        match tag {
            "" => Some(Self::Empty),
            "json" => Some(Self::Json),
            "pure-json" => Some(Self::PureJson),
            "xml" => Some(Self::Xml),
            "text" => Some(Self::Text),
            "redirect" => Some(Self::Redirect),
            "file" => Some(Self::File),
            "attachment" => Some(Self::Attachment),
            "stream" => Some(Self::Stream),
            "data" => Some(Self::Data),
            "render" => Some(Self::Render),
            _ => None,
        }
    }

    /// Names the capability this mode requires, or `None` for status-only.
    #[must_use]
    pub const fn required_capability(&self) -> Option<&'static str> {
        match self {
            Self::Empty => None,
            Self::Json | Self::PureJson | Self::Xml | Self::Template(_) => Some("structured"),
            Self::Text | Self::Redirect | Self::File | Self::Attachment => Some("text"),
            Self::Stream | Self::Data => Some("raw"),
            Self::Render => Some("passthrough"),
        }
    }

    /// Returns `true` when the given capabilities satisfy this mode.
    #[must_use]
    pub const fn satisfied_by(&self, caps: RespondCaps) -> bool {
        match self {
            Self::Empty => true,
            Self::Json | Self::PureJson | Self::Xml | Self::Template(_) => caps.structured,
            Self::Text | Self::Redirect | Self::File | Self::Attachment => caps.text,
            Self::Stream | Self::Data => caps.raw,
            Self::Render => caps.passthrough,
        }
    }

    /// The codec used when a fault body must be written on this route.
    #[must_use]
    pub const fn error_codec(&self) -> ErrorCodec {
        match self {
            Self::Json => ErrorCodec::Json,
            Self::PureJson => ErrorCodec::PureJson,
            Self::Xml => ErrorCodec::Xml,
            _ => ErrorCodec::StatusOnly,
        }
    }
}

/// How fault bodies are serialized on a route.
///
/// Structured routes reuse their declared codec; everything else degrades
/// to a status-only response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCodec {
    /// JSON with HTML-sensitive escaping.
    Json,
    /// Verbatim JSON.
    PureJson,
    /// XML.
    Xml,
    /// No body; status code only.
    StatusOnly,
}

/// Resolves a route's mode tag against the output type's capabilities.
///
/// Called once per registration; both an unknown tag and a capability
/// mismatch are fatal registration errors.
pub(crate) fn resolve_mode<Out: Respond>(
    descriptor: &RouteDescriptor,
    handler: &str,
) -> Result<ResponseMode, RegistryError> {
    let tag = descriptor.mode_tag();
    let mode = ResponseMode::parse(tag).ok_or_else(|| RegistryError::UnknownMode {
        handler: handler.to_string(),
        tag: tag.to_string(),
    })?;

    if !mode.satisfied_by(Out::caps()) {
        return Err(RegistryError::PayloadMismatch {
            handler: handler.to_string(),
            mode: tag.to_string(),
            capability: mode.required_capability().unwrap_or("structured"),
        });
    }

    Ok(mode)
}

/// Renders a handler's output under the route's resolved mode.
pub(crate) fn render_output<Out: Respond>(
    mode: &ResponseMode,
    descriptor: &RouteDescriptor,
    out: Out,
    ex: &mut (dyn Exchange + '_),
) -> FaultResult<()> {
    let status = descriptor.status_code();

    match mode {
        ResponseMode::Empty => {
            ex.set_status(status);
            Ok(())
        }
        ResponseMode::Json => {
            let value = out.to_value()?;
            ex.write_json(status, &value).map_err(engine_fault)
        }
        ResponseMode::PureJson => {
            let value = out.to_value()?;
            ex.write_pure_json(status, &value).map_err(engine_fault)
        }
        ResponseMode::Xml => {
            let value = out.to_value()?;
            ex.write_xml(status, &value).map_err(engine_fault)
        }
        ResponseMode::Template(name) => {
            let value = out.to_value()?;
            ex.write_template(status, name, &value).map_err(engine_fault)
        }
        ResponseMode::Text => {
            let text = out.as_text()?;
            ex.write_text(status, &text);
            Ok(())
        }
        ResponseMode::Redirect => {
            let location = out.as_text()?;
            ex.redirect(status, &location);
            Ok(())
        }
        ResponseMode::File => {
            let path = out.as_text()?;
            ex.serve_file(&path).map_err(engine_fault)
        }
        ResponseMode::Attachment => {
            let path = out.as_text()?;
            let filename = path.rsplit('/').next().unwrap_or(&path).to_string();
            if let Some(content_type) = descriptor.content_type() {
                ex.set_content_type(content_type);
            }
            ex.serve_attachment(&path, &filename).map_err(engine_fault)
        }
        ResponseMode::Stream => {
            if let Some(content_type) = descriptor.content_type() {
                ex.set_content_type(content_type);
            }
            let bytes = out.into_bytes()?;
            ex.write_bytes(&bytes);
            Ok(())
        }
        ResponseMode::Data => {
            let content_type = descriptor.content_type().unwrap_or("");
            let bytes = out.into_bytes()?;
            ex.write_data(status, content_type, &bytes);
            Ok(())
        }
        ResponseMode::Render => out.render(ex),
    }
}

fn engine_fault(err: EngineError) -> Fault {
    Fault::internal(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use stoa_engine::loopback::LoopbackExchange;

    fn descriptor(status: u16, tag: &str, content_type: Option<&str>) -> RouteDescriptor {
        RouteDescriptor::new(
            Method::GET,
            "/x",
            status,
            tag,
            content_type.map(ToString::to_string),
        )
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(ResponseMode::parse(""), Some(ResponseMode::Empty));
        assert_eq!(ResponseMode::parse("json"), Some(ResponseMode::Json));
        assert_eq!(ResponseMode::parse("pure-json"), Some(ResponseMode::PureJson));
        assert_eq!(ResponseMode::parse("xml"), Some(ResponseMode::Xml));
        assert_eq!(ResponseMode::parse("text"), Some(ResponseMode::Text));
        assert_eq!(ResponseMode::parse("redirect"), Some(ResponseMode::Redirect));
        assert_eq!(ResponseMode::parse("file"), Some(ResponseMode::File));
        assert_eq!(ResponseMode::parse("attachment"), Some(ResponseMode::Attachment));
        assert_eq!(ResponseMode::parse("stream"), Some(ResponseMode::Stream));
        assert_eq!(ResponseMode::parse("data"), Some(ResponseMode::Data));
        assert_eq!(ResponseMode::parse("render"), Some(ResponseMode::Render));
        assert_eq!(ResponseMode::parse("yaml"), None);
    }

    #[test]
    fn test_template_marker_detection() {
        assert_eq!(
            ResponseMode::parse("index.tmpl"),
            Some(ResponseMode::Template("index.tmpl".to_string()))
        );
        assert_eq!(
            ResponseMode::parse("template1.html"),
            Some(ResponseMode::Template("template1.html".to_string()))
        );
    }

    #[test]
    fn test_resolve_rejects_unknown_mode() {
        let err = resolve_mode::<String>(&descriptor(200, "yaml", None), "handler").unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMode { .. }));
    }

    #[test]
    fn test_resolve_rejects_capability_mismatch() {
        // Unit output cannot serve a structured mode.
        let err = resolve_mode::<()>(&descriptor(200, "json", None), "handler").unwrap_err();
        assert!(matches!(err, RegistryError::PayloadMismatch { .. }));

        // Byte output cannot serve a text mode.
        let err = resolve_mode::<Vec<u8>>(&descriptor(200, "text", None), "handler").unwrap_err();
        assert!(matches!(err, RegistryError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_resolve_accepts_matching_capability() {
        assert_eq!(
            resolve_mode::<String>(&descriptor(200, "json", None), "handler").unwrap(),
            ResponseMode::Json
        );
        assert_eq!(
            resolve_mode::<()>(&descriptor(204, "", None), "handler").unwrap(),
            ResponseMode::Empty
        );
        assert_eq!(
            resolve_mode::<Vec<u8>>(&descriptor(200, "stream", None), "handler").unwrap(),
            ResponseMode::Stream
        );
    }

    #[test]
    fn test_render_empty_sets_status_only() {
        let mut ex = LoopbackExchange::new(Method::DELETE, "/x");
        render_output(
            &ResponseMode::Empty,
            &descriptor(204, "", None),
            (),
            &mut ex,
        )
        .unwrap();

        let response = ex.into_response();
        assert_eq!(response.status, StatusCode::NO_CONTENT);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_render_text_writes_string_form() {
        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        render_output(
            &ResponseMode::Text,
            &descriptor(200, "text", None),
            "hello".to_string(),
            &mut ex,
        )
        .unwrap();

        let response = ex.into_response();
        assert_eq!(response.body_string(), "hello");
    }

    #[test]
    fn test_render_redirect_uses_declared_status() {
        let mut ex = LoopbackExchange::new(Method::GET, "/old");
        render_output(
            &ResponseMode::Redirect,
            &descriptor(302, "redirect", None),
            "/login".to_string(),
            &mut ex,
        )
        .unwrap();

        let response = ex.into_response();
        assert_eq!(response.status, StatusCode::FOUND);
        assert_eq!(response.header("location"), Some("/login"));
    }

    #[test]
    fn test_render_data_sets_declared_content_type() {
        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        render_output(
            &ResponseMode::Data,
            &descriptor(200, "data", Some("application/yaml; charset=utf-8")),
            b"a: 1".to_vec(),
            &mut ex,
        )
        .unwrap();

        let response = ex.into_response();
        assert_eq!(
            response.header("content-type"),
            Some("application/yaml; charset=utf-8")
        );
        assert_eq!(&response.body[..], b"a: 1");
    }

    #[test]
    fn test_render_passthrough_invokes_output() {
        struct Custom;

        impl Respond for Custom {
            fn caps() -> RespondCaps {
                RespondCaps::PASSTHROUGH
            }

            fn render(self, ex: &mut (dyn Exchange + '_)) -> FaultResult<()> {
                ex.set_content_type("application/x-custom");
                ex.write_bytes(b"custom payload");
                Ok(())
            }
        }

        let mut ex = LoopbackExchange::new(Method::GET, "/x");
        render_output(
            &ResponseMode::Render,
            &descriptor(200, "render", None),
            Custom,
            &mut ex,
        )
        .unwrap();

        let response = ex.into_response();
        assert_eq!(response.header("content-type"), Some("application/x-custom"));
        assert_eq!(response.body_string(), "custom payload");
    }
}
