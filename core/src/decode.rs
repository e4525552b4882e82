//! Content-type driven body decoding.
//!
//! # Design
//! A `DecoderRegistry` maps a normalized content type to a factory producing a
//! fresh `BodyDecoder` per response. Selecting a decoder either yields one or
//! the explicit `DecoderSelection::Passthrough`, in which case the body bytes
//! are kept as they arrived and the outcome is decided by the status code
//! alone.

use std::collections::HashMap;
use std::fmt;

use bytes::{Bytes, BytesMut};
use serde_json::Value;

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// No body bytes were received.
    Empty,
    Json(Value),
    Xml(String),
    Text(String),
    Binary(Bytes),
    /// Bytes of a content type no decoder is registered for.
    Raw(Bytes),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Textual view of the body, if it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Xml(text) | Body::Text(text) => Some(text),
            _ => None,
        }
    }

    /// The body as a JSON value: JSON as-is, text as a string, bytes as lossy
    /// UTF-8 and an empty body as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Body::Empty => Value::Null,
            Body::Json(value) => value.clone(),
            Body::Xml(text) | Body::Text(text) => Value::String(text.clone()),
            Body::Binary(bytes) | Body::Raw(bytes) => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Reason a decoder rejected its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates body chunks and produces a `Body` once the message is complete.
pub trait BodyDecoder: Send {
    /// Feed the next chunk of body bytes.
    fn push(&mut self, chunk: &[u8]);

    /// The embedded message is complete; produce the decoded body.
    fn finish(self: Box<Self>) -> Result<Body, DecodeError>;
}

/// Builds a fresh decoder for one response.
pub type DecoderFactory = fn() -> Box<dyn BodyDecoder>;

/// Outcome of looking up a content type.
pub enum DecoderSelection {
    Decoder(Box<dyn BodyDecoder>),
    /// No decoder matches; keep raw bytes and settle from the status code.
    Passthrough,
}

impl fmt::Debug for DecoderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderSelection::Decoder(_) => f.write_str("Decoder(..)"),
            DecoderSelection::Passthrough => f.write_str("Passthrough"),
        }
    }
}

/// Lower-case a `Content-Type` value and drop everything after the first `;`.
pub fn normalize_content_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Content-type keyed decoder lookup.
#[derive(Clone)]
pub struct DecoderRegistry {
    decoders: HashMap<String, DecoderFactory>,
}

impl DecoderRegistry {
    /// A registry with no decoders; every body passes through.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `factory` for `content_type`, replacing any previous entry.
    #[must_use]
    pub fn with(mut self, content_type: &str, factory: DecoderFactory) -> Self {
        self.register(content_type, factory);
        self
    }

    pub fn register(&mut self, content_type: &str, factory: DecoderFactory) {
        self.decoders
            .insert(normalize_content_type(content_type), factory);
    }

    pub fn contains(&self, content_type: &str) -> bool {
        self.decoders
            .contains_key(&normalize_content_type(content_type))
    }

    /// Pick a decoder for a raw `Content-Type` header value.
    pub fn select(&self, content_type: Option<&str>) -> DecoderSelection {
        let Some(content_type) = content_type else {
            return DecoderSelection::Passthrough;
        };
        match self.decoders.get(&normalize_content_type(content_type)) {
            Some(factory) => DecoderSelection::Decoder(factory()),
            None => DecoderSelection::Passthrough,
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::empty()
            .with("application/json", JsonDecoder::boxed)
            .with("application/xml", XmlDecoder::boxed)
            .with("application/atom+xml", XmlDecoder::boxed)
            .with("text/xml", XmlDecoder::boxed)
            .with("text/plain", TextDecoder::boxed)
            .with("text/html", TextDecoder::boxed)
            .with("application/octet-stream", BinaryDecoder::boxed)
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("DecoderRegistry")
            .field("content_types", &types)
            .finish()
    }
}

/// Parses the accumulated bytes as JSON. An empty body decodes to `Body::Empty`.
#[derive(Debug, Default)]
pub struct JsonDecoder {
    buf: BytesMut,
}

impl JsonDecoder {
    pub fn boxed() -> Box<dyn BodyDecoder> {
        Box::<Self>::default()
    }
}

impl BodyDecoder for JsonDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn finish(self: Box<Self>) -> Result<Body, DecodeError> {
        if self.buf.iter().all(u8::is_ascii_whitespace) {
            return Ok(Body::Empty);
        }
        serde_json::from_slice(&self.buf)
            .map(Body::Json)
            .map_err(|e| DecodeError(e.to_string()))
    }
}

/// Keeps XML documents as text.
#[derive(Debug, Default)]
pub struct XmlDecoder {
    buf: BytesMut,
}

impl XmlDecoder {
    pub fn boxed() -> Box<dyn BodyDecoder> {
        Box::<Self>::default()
    }
}

impl BodyDecoder for XmlDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn finish(self: Box<Self>) -> Result<Body, DecodeError> {
        if self.buf.is_empty() {
            return Ok(Body::Empty);
        }
        String::from_utf8(self.buf.to_vec())
            .map(Body::Xml)
            .map_err(|e| DecodeError(e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct TextDecoder {
    buf: BytesMut,
}

impl TextDecoder {
    pub fn boxed() -> Box<dyn BodyDecoder> {
        Box::<Self>::default()
    }
}

impl BodyDecoder for TextDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn finish(self: Box<Self>) -> Result<Body, DecodeError> {
        if self.buf.is_empty() {
            return Ok(Body::Empty);
        }
        Ok(Body::Text(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}

#[derive(Debug, Default)]
pub struct BinaryDecoder {
    buf: BytesMut,
}

impl BinaryDecoder {
    pub fn boxed() -> Box<dyn BodyDecoder> {
        Box::<Self>::default()
    }
}

impl BodyDecoder for BinaryDecoder {
    fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn finish(self: Box<Self>) -> Result<Body, DecodeError> {
        Ok(Body::Binary(self.buf.freeze()))
    }
}
