//! Decoding of one multipart part into an embedded HTTP response.
//!
//! # Design
//! A part is a MIME header block, a blank line, and then a complete HTTP/1.1
//! response written out verbatim. `ResponseParser` walks that text through a
//! fixed sequence of states:
//!
//! ```text
//! Created -> MimeSplit -> Headers -> Body -> Settled
//! ```
//!
//! The embedded message head is parsed with `httparse`; body framing
//! (`Content-Length`, chunked, bodyless statuses, read-to-end) is handled here
//! and every body chunk is forwarded to the decoder selected from the
//! `DecoderRegistry`. The parser accumulates into its own fields and only
//! produces an immutable `Response` at settlement, so a settled response always
//! carries its body.
//!
//! The embedded message is rebuilt from logical lines joined with CRLF. A body
//! written with bare LF line ends grows by one byte per line on the way, so a
//! `Content-Length` counted against the original bytes frames a shorter body;
//! the cut-off tail is reported with a warning.

use std::collections::HashMap;

use bytes::BytesMut;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::decode::{normalize_content_type, Body, BodyDecoder, DecoderRegistry, DecoderSelection};
use crate::error::BatchError;
use crate::http::HttpRequest;
use crate::multipart::CRLF;

/// Upper bound on header lines in one embedded message.
const MAX_HEADERS: usize = 64;

static XML_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(?:[A-Za-z_][\w.-]*:)?message\b[^>]*>(.*?)</(?:[A-Za-z_][\w.-]*:)?message\s*>")
        .unwrap()
});

/// A decoded embedded HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    raw_mime_headers: Vec<String>,
    raw_http_lines: Vec<String>,
    status: u16,
    reason: String,
    raw_headers: Vec<(String, String)>,
    headers: HashMap<String, String>,
    body: Body,
    request: Option<HttpRequest>,
}

impl Response {
    /// Decode one raw part with `registry`.
    pub fn process(lines: &[String], registry: &DecoderRegistry) -> Result<Response, BatchError> {
        ResponseParser::new(registry).process(lines)
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_success(&self) -> bool {
        self.status < 400
    }

    /// Header map keeping the last occurrence of each name, names as received.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Look up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value);
        }
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Header pairs in the order they were received.
    pub fn raw_headers(&self) -> &[(String, String)] {
        &self.raw_headers
    }

    /// MIME part headers that preceded the embedded message.
    pub fn raw_mime_headers(&self) -> &[String] {
        &self.raw_mime_headers
    }

    /// The embedded HTTP message, one entry per line.
    pub fn raw_http_lines(&self) -> &[String] {
        &self.raw_http_lines
    }

    /// Normalized media type of the embedded message, if declared.
    pub fn content_type(&self) -> Option<String> {
        last_header(&self.raw_headers, "content-type").map(normalize_content_type)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// The logical request this response answers, when decoded through one.
    pub fn request(&self) -> Option<&HttpRequest> {
        self.request.as_ref()
    }

    pub(crate) fn with_request(mut self, request: HttpRequest) -> Self {
        self.request = Some(request);
        self
    }

    /// Unwrap an OData JSON envelope.
    ///
    /// Returns the array at `list_path` when there is one (collection reads),
    /// otherwise the value at `instance_path` (single entity reads), otherwise
    /// the body unchanged. Paths are dot separated, e.g. `d.results`.
    pub fn plain(&self, list_path: &str, instance_path: &str) -> Value {
        let body = self.body.to_value();
        if let Some(list) = lookup(&body, list_path).filter(|v| v.is_array()) {
            return list.clone();
        }
        if let Some(instance) = lookup(&body, instance_path) {
            return instance.clone();
        }
        body
    }

    /// Deserialize the decoded body.
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T, BatchError> {
        serde_json::from_value(self.body.to_value()).map_err(|e| BatchError::Decode {
            content_type: self.content_type().unwrap_or_default(),
            reason: e.to_string(),
        })
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn last_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .rev()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Message of an OData error body.
///
/// XML bodies yield their first `message` element; JSON bodies yield
/// `error.message` (v4) or `error.message.value` (v2).
pub fn error_message(body: &Body) -> Option<String> {
    match body {
        Body::Json(value) => {
            let message = value.pointer("/error/message")?;
            message
                .as_str()
                .or_else(|| message.get("value").and_then(Value::as_str))
                .map(str::to_string)
        }
        Body::Xml(text) | Body::Text(text) => xml_message(text),
        Body::Raw(bytes) => xml_message(&String::from_utf8_lossy(bytes)),
        Body::Binary(_) | Body::Empty => None,
    }
}

fn xml_message(text: &str) -> Option<String> {
    let caps = XML_MESSAGE.captures(text)?;
    let message = caps[1]
        .trim()
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    (!message.is_empty()).then_some(message)
}

/// Progress of a `ResponseParser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Created,
    MimeSplit,
    Headers,
    Body,
    Settled,
}

enum BodySink {
    Unselected,
    Decoder { decoder: Box<dyn BodyDecoder>, raw: BytesMut },
    Passthrough(BytesMut),
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    ToEnd,
}

/// Incremental decoder for one raw part.
pub struct ResponseParser<'r> {
    registry: &'r DecoderRegistry,
    state: ParseState,
    raw_mime_headers: Vec<String>,
    raw_http_lines: Vec<String>,
    status: u16,
    reason: String,
    raw_headers: Vec<(String, String)>,
    headers: HashMap<String, String>,
    content_type: Option<String>,
    sink: BodySink,
}

impl<'r> ResponseParser<'r> {
    pub fn new(registry: &'r DecoderRegistry) -> Self {
        Self {
            registry,
            state: ParseState::Created,
            raw_mime_headers: Vec::new(),
            raw_http_lines: Vec::new(),
            status: 0,
            reason: String::new(),
            raw_headers: Vec::new(),
            headers: HashMap::new(),
            content_type: None,
            sink: BodySink::Unselected,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Split a part on its first blank line into MIME headers and the
    /// embedded HTTP message.
    pub fn parse_divide_response(&mut self, lines: &[String]) {
        match lines.iter().position(|line| line.trim().is_empty()) {
            Some(blank) => {
                self.raw_mime_headers = lines[..blank].to_vec();
                self.raw_http_lines = lines[blank + 1..].to_vec();
            }
            None => {
                self.raw_mime_headers = lines.to_vec();
                self.raw_http_lines = Vec::new();
            }
        }
        self.state = ParseState::MimeSplit;
    }

    /// Decode `lines` completely and settle.
    pub fn process(mut self, lines: &[String]) -> Result<Response, BatchError> {
        self.parse_divide_response(lines);
        if let Err(e) = self.drive() {
            tracing::debug!(error = %e, "embedded message could not be parsed");
            self.state = ParseState::Settled;
            return Err(e);
        }
        let status = self.status;
        let body = match self.on_message_complete() {
            Ok(body) => body,
            Err(e) => {
                self.state = ParseState::Settled;
                return Err(e);
            }
        };
        let message = error_message(&body);
        self.finish_process_response(status, body, message)
    }

    fn drive(&mut self) -> Result<(), BatchError> {
        if self.raw_http_lines.iter().all(|line| line.trim().is_empty()) {
            return Err(unexpected("part carries no embedded HTTP message"));
        }
        let mut text = self.raw_http_lines.join(CRLF);
        text.push_str(CRLF);
        if !self.raw_http_lines.iter().any(String::is_empty) {
            // Head without its terminating blank line, e.g. a bare status line.
            text.push_str(CRLF);
        }
        let bytes = text.as_bytes();

        let mut header_buf = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Response::new(&mut header_buf);
        let head_len = match parsed.parse(bytes) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Err(unexpected("truncated message head")),
            Err(e) => return Err(unexpected(e)),
        };
        let status = parsed.code.ok_or_else(|| unexpected("missing status code"))?;
        let reason = parsed.reason.unwrap_or_default().to_string();
        let pairs: Vec<(String, String)> = parsed
            .headers
            .iter()
            .take_while(|h| !h.name.is_empty())
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).trim().to_string()))
            .collect();

        self.on_headers_complete(status, reason, pairs);

        let rest = &bytes[head_len..];
        match self.framing()? {
            Framing::Empty => {}
            Framing::Length(len) => {
                if rest.len() < len {
                    tracing::warn!(expected = len, received = rest.len(), "embedded body truncated");
                    return Err(unexpected(format!(
                        "body truncated: expected {len} bytes, got {}",
                        rest.len()
                    )));
                }
                if rest[len..].iter().any(|b| !matches!(*b, b'\r' | b'\n')) {
                    tracing::warn!(
                        declared = len,
                        received = rest.len(),
                        "embedded body longer than Content-Length, tail dropped"
                    );
                }
                if len > 0 {
                    self.on_body(&rest[..len]);
                }
            }
            Framing::Chunked => self.read_chunked(rest)?,
            Framing::ToEnd => {
                let end = rest
                    .iter()
                    .rposition(|b| !matches!(*b, b'\r' | b'\n'))
                    .map_or(0, |last| last + 1);
                if end > 0 {
                    self.on_body(&rest[..end]);
                }
            }
        }
        Ok(())
    }

    fn framing(&self) -> Result<Framing, BatchError> {
        if matches!(self.status, 100..=199 | 204 | 304) {
            return Ok(Framing::Empty);
        }
        if last_header(&self.raw_headers, "transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"))
        {
            return Ok(Framing::Chunked);
        }
        match last_header(&self.raw_headers, "content-length") {
            Some(value) => value
                .trim()
                .parse()
                .map(Framing::Length)
                .map_err(|_| unexpected(format!("invalid Content-Length {value:?}"))),
            None => Ok(Framing::ToEnd),
        }
    }

    fn read_chunked(&mut self, mut rest: &[u8]) -> Result<(), BatchError> {
        loop {
            let (offset, size) = match httparse::parse_chunk_size(rest) {
                Ok(httparse::Status::Complete(found)) => found,
                Ok(httparse::Status::Partial) => return Err(unexpected("truncated chunked body")),
                Err(_) => return Err(unexpected("invalid chunk size")),
            };
            rest = &rest[offset..];
            if size == 0 {
                return Ok(());
            }
            let size = usize::try_from(size).map_err(|_| unexpected("chunk too large"))?;
            if rest.len() < size {
                return Err(unexpected("truncated chunk"));
            }
            self.on_body(&rest[..size]);
            rest = &rest[size..];
            rest = rest.strip_prefix(b"\r\n").unwrap_or(rest);
        }
    }

    fn on_headers_complete(&mut self, status: u16, reason: String, pairs: Vec<(String, String)>) {
        self.state = ParseState::Headers;
        self.status = status;
        self.reason = reason;

        let mut headers = HashMap::with_capacity(pairs.len());
        for (name, value) in &pairs {
            headers.insert(name.clone(), value.clone());
        }
        let length_variants: Vec<String> = headers
            .keys()
            .filter(|name| name.eq_ignore_ascii_case("content-length"))
            .cloned()
            .collect();
        if length_variants.len() > 1 {
            for name in &length_variants {
                headers.remove(name);
            }
        }
        self.headers = headers;

        self.content_type = last_header(&pairs, "content-type").map(normalize_content_type);
        self.raw_headers = pairs;
        self.sink = match self.registry.select(self.content_type.as_deref()) {
            DecoderSelection::Decoder(decoder) => BodySink::Decoder {
                decoder,
                raw: BytesMut::new(),
            },
            DecoderSelection::Passthrough => BodySink::Passthrough(BytesMut::new()),
        };
        tracing::trace!(
            status,
            content_type = self.content_type.as_deref().unwrap_or(""),
            "embedded headers complete"
        );
        self.state = ParseState::Body;
    }

    fn on_body(&mut self, chunk: &[u8]) {
        match &mut self.sink {
            BodySink::Decoder { decoder, raw } => {
                decoder.push(chunk);
                raw.extend_from_slice(chunk);
            }
            BodySink::Passthrough(buf) => buf.extend_from_slice(chunk),
            BodySink::Unselected => {}
        }
    }

    /// Finish the body: run the selected decoder, or take the raw bytes.
    ///
    /// A decoder failure on an error status falls back to the raw bytes so the
    /// status still decides the outcome.
    fn on_message_complete(&mut self) -> Result<Body, BatchError> {
        match std::mem::replace(&mut self.sink, BodySink::Unselected) {
            BodySink::Decoder { decoder, raw } => match decoder.finish() {
                Ok(body) => Ok(body),
                Err(e) if self.status >= 400 => {
                    tracing::debug!(status = self.status, error = %e, "keeping undecodable error body raw");
                    Ok(raw_body(raw))
                }
                Err(e) => Err(BatchError::Decode {
                    content_type: self.content_type.clone().unwrap_or_default(),
                    reason: e.to_string(),
                }),
            },
            BodySink::Passthrough(buf) => Ok(raw_body(buf)),
            BodySink::Unselected => Ok(Body::Empty),
        }
    }

    /// The single settlement point: below 400 resolves with the response,
    /// otherwise rejects with a status-prefixed error carrying it.
    pub fn finish_process_response(
        mut self,
        status: u16,
        body: Body,
        message: Option<String>,
    ) -> Result<Response, BatchError> {
        self.state = ParseState::Settled;
        tracing::debug!(status, "embedded response settled");
        let response = Response {
            raw_mime_headers: self.raw_mime_headers,
            raw_http_lines: self.raw_http_lines,
            status,
            reason: self.reason,
            raw_headers: self.raw_headers,
            headers: self.headers,
            body,
            request: None,
        };
        if status < 400 {
            Ok(response)
        } else {
            Err(BatchError::Status {
                status,
                message,
                response: Box::new(response),
            })
        }
    }
}

fn raw_body(buf: BytesMut) -> Body {
    if buf.is_empty() {
        Body::Empty
    } else {
        Body::Raw(buf.freeze())
    }
}

fn unexpected(reason: impl ToString) -> BatchError {
    BatchError::UnexpectedResponse(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::split_lines;

    fn part(text: &str) -> Vec<String> {
        split_lines(text)
    }

    fn decode(text: &str) -> Result<Response, BatchError> {
        Response::process(&part(text), &DecoderRegistry::default())
    }

    #[test]
    fn divide_splits_on_first_blank_line() {
        let registry = DecoderRegistry::default();
        let mut parser = ResponseParser::new(&registry);
        parser.parse_divide_response(&part(
            "Content-Type: application/http\r\n\
             Content-Transfer-Encoding: binary\r\n\
             \r\n\
             HTTP/1.1 204 No Content\r\n\
             \r\n",
        ));
        assert_eq!(parser.state(), ParseState::MimeSplit);
        assert_eq!(parser.raw_mime_headers.len(), 2);
        assert_eq!(parser.raw_http_lines, vec!["HTTP/1.1 204 No Content", ""]);
    }

    #[test]
    fn json_success_resolves_with_decoded_body() {
        let response = decode(
            "Content-Type: application/http\r\n\
             Content-Transfer-Encoding: binary\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: application/json;charset=utf-8\r\n\
             Content-Length: 22\r\n\
             \r\n\
             {\"d\":{\"ID\":\"1\",\"n\":2}}\r\n",
        )
        .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.reason(), "OK");
        assert_eq!(response.content_type().as_deref(), Some("application/json"));
        assert_eq!(
            response.body(),
            &Body::Json(serde_json::json!({"d": {"ID": "1", "n": 2}}))
        );
        assert_eq!(response.raw_mime_headers()[0], "Content-Type: application/http");
    }

    #[test]
    fn uppercase_content_type_selects_json() {
        let response = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: APPLICATION/JSON\r\n\
             \r\n\
             [1,2]\r\n",
        )
        .unwrap();
        assert_eq!(response.body(), &Body::Json(serde_json::json!([1, 2])));
    }

    #[test]
    fn status_at_or_above_400_rejects_with_code_first() {
        let err = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 404 Not Found\r\n\
             Content-Type: application/xml\r\n\
             \r\n\
             <?xml version=\"1.0\"?><error><code>X</code>\
             <message xml:lang=\"en\">Entity &apos;1&apos; missing</message>\
             <message>second</message></error>\r\n",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "404 Entity '1' missing");
        assert_eq!(err.status(), Some(404));
        let body = err.response().unwrap().body();
        assert!(body.as_text().unwrap().contains("<code>X</code>"));
    }

    #[test]
    fn namespaced_message_element_is_found() {
        let body = Body::Xml("<m:error><m:message>boom</m:message></m:error>".to_string());
        assert_eq!(error_message(&body).as_deref(), Some("boom"));
    }

    #[test]
    fn json_error_envelopes_yield_message() {
        let v2 = Body::Json(serde_json::json!({"error": {"message": {"lang": "en", "value": "v2"}}}));
        let v4 = Body::Json(serde_json::json!({"error": {"code": "1", "message": "v4"}}));
        assert_eq!(error_message(&v2).as_deref(), Some("v2"));
        assert_eq!(error_message(&v4).as_deref(), Some("v4"));
    }

    #[test]
    fn error_without_message_is_just_the_status() {
        let err = decode("Content-Type: application/http\r\n\r\nHTTP/1.1 500 Internal Server Error\r\n\r\n")
            .unwrap_err();
        assert_eq!(err.to_string(), "500");
    }

    #[test]
    fn every_status_below_400_resolves() {
        for status in [200, 201, 204, 302, 399] {
            let text = format!("Content-Type: application/http\r\n\r\nHTTP/1.1 {status} X\r\n\r\n");
            assert!(decode(&text).is_ok(), "status {status}");
        }
        for status in [400, 401, 412, 500, 503] {
            let text = format!("Content-Type: application/http\r\n\r\nHTTP/1.1 {status} X\r\n\r\n");
            let err = decode(&text).unwrap_err();
            assert!(err.to_string().starts_with(&status.to_string()));
        }
    }

    #[test]
    fn unknown_content_type_keeps_raw_bytes() {
        let response = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: image/png\r\n\
             Content-Length: 4\r\n\
             \r\n\
             abcd\r\n",
        )
        .unwrap();
        assert_eq!(response.body(), &Body::Raw(bytes::Bytes::from_static(b"abcd")));
    }

    #[test]
    fn malformed_embedded_message_is_unexpected() {
        let err = decode("Content-Type: application/http\r\n\r\nthis is not http\r\n\r\n").unwrap_err();
        assert!(matches!(err, BatchError::UnexpectedResponse(_)));
    }

    #[test]
    fn part_without_embedded_message_is_unexpected() {
        let err = decode("Content-Type: application/http\r\n").unwrap_err();
        assert!(matches!(err, BatchError::UnexpectedResponse(_)));
    }

    #[test]
    fn truncated_body_is_unexpected() {
        let err = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: application/json\r\n\
             Content-Length: 100\r\n\
             \r\n\
             {}\r\n",
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::UnexpectedResponse(_)));
    }

    #[test]
    fn chunked_body_is_reassembled() {
        let response = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Transfer-Encoding: chunked\r\n\
             \r\n\
             5\r\n\
             hello\r\n\
             6\r\n\
             \x20world\r\n\
             0\r\n\
             \r\n",
        )
        .unwrap();
        assert_eq!(response.body(), &Body::Text("hello world".to_string()));
    }

    #[test]
    fn bare_lf_body_is_framed_by_declared_length() {
        let response = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: text/plain\r\n\
             Content-Length: 3\r\n\
             \r\n\
             a\nb\n",
        )
        .unwrap();
        let text = response.body().as_text().unwrap();
        assert!(text.starts_with('a'));
        assert!(!text.contains('b'));
    }

    #[test]
    fn headers_keep_last_value_and_drop_duplicate_length_variants() {
        let response = decode(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             X-Thing: a\r\n\
             X-Thing: b\r\n\
             Content-Length: 2\r\n\
             content-length: 2\r\n\
             \r\n\
             ok\r\n",
        )
        .unwrap();
        assert_eq!(response.header("x-thing"), Some("b"));
        assert_eq!(response.headers().get("X-Thing").map(String::as_str), Some("b"));
        assert!(response.header("content-length").is_none());
        assert_eq!(response.raw_headers().len(), 4);
    }

    #[test]
    fn single_content_length_is_kept() {
        let response = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok\r\n",
        )
        .unwrap();
        assert_eq!(response.header("Content-Length"), Some("2"));
    }

    #[test]
    fn invalid_json_on_success_is_a_decode_error() {
        let err = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{oops\r\n",
        )
        .unwrap_err();
        assert!(matches!(err, BatchError::Decode { .. }));
    }

    #[test]
    fn invalid_json_on_failure_still_reports_status() {
        let err = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 502 Bad Gateway\r\nContent-Type: application/json\r\n\r\n<html>\r\n",
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(502));
        assert_eq!(
            err.response().unwrap().body(),
            &Body::Raw(bytes::Bytes::from_static(b"<html>"))
        );
    }

    #[test]
    fn plain_prefers_list_then_instance_then_body() {
        let list = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"d\":{\"results\":[1]}}\r\n",
        )
        .unwrap();
        assert_eq!(list.plain("d.results", "d"), serde_json::json!([1]));

        let instance = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"d\":{\"ID\":1}}\r\n",
        )
        .unwrap();
        assert_eq!(instance.plain("d.results", "d"), serde_json::json!({"ID": 1}));

        let bare = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"value\":2}\r\n",
        )
        .unwrap();
        assert_eq!(bare.plain("d.results", "d"), serde_json::json!({"value": 2}));
    }

    #[tokio::test]
    async fn json_deserializes_body() {
        let response = decode(
            "Content-Type: application/http\r\n\r\nHTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"n\":3}\r\n",
        )
        .unwrap();
        let value: HashMap<String, u32> = response.json().await.unwrap();
        assert_eq!(value["n"], 3);
    }
}
