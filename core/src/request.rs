//! One logical HTTP call inside a batch.
//!
//! # Design
//! A `Request` is immutable once built. Its pending result is created at
//! construction and settled exactly once, by `process`, when the matching
//! response part arrives.
//!
//! The CSRF token is written in two different places depending on whether the
//! request carries a body: inside the embedded HTTP headers (ahead of
//! `Content-Length`) when it does, as a MIME part header when it does not.
//! Servers validate write operations against exactly this layout.

use serde::Serialize;
use serde_json::Value;

use crate::decode::DecoderRegistry;
use crate::error::BatchError;
use crate::http::{find_header, HttpMethod, HttpRequest};
use crate::multipart::CRLF;
use crate::pending::{self, Pending, Settler};
use crate::response::Response;

/// Header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Outcome of one logical request.
pub type Settlement = Result<Response, BatchError>;

/// A logical HTTP request queued in a `Batch` or `ChangeSet`.
#[derive(Debug)]
pub struct Request {
    method: HttpMethod,
    path: String,
    headers: Vec<(String, String)>,
    content: Option<Value>,
    settler: Settler<Response>,
    pending: Pending<Response>,
}

impl Request {
    /// Create a request. `content` is sent as JSON only when the headers ask
    /// for `Accept: application/json`.
    pub fn new(
        method: HttpMethod,
        path: impl Into<String>,
        headers: Vec<(String, String)>,
        content: Option<Value>,
    ) -> Self {
        let (settler, pending) = pending::channel();
        Self {
            method,
            path: path.into(),
            headers,
            content,
            settler,
            pending,
        }
    }

    /// Create a request with a JSON body serialized from `content`.
    ///
    /// `Accept` and `Content-Type` default to `application/json` when the
    /// caller did not set them.
    pub fn json<T: Serialize>(
        method: HttpMethod,
        path: impl Into<String>,
        mut headers: Vec<(String, String)>,
        content: &T,
    ) -> Result<Self, BatchError> {
        let content =
            serde_json::to_value(content).map_err(|e| BatchError::Serialization(e.to_string()))?;
        for name in ["Accept", "Content-Type"] {
            if find_header(&headers, name).is_none() {
                headers.push((name.to_string(), "application/json".to_string()));
            }
        }
        Ok(Self::new(method, path, headers, Some(content)))
    }

    /// A bodyless `GET`.
    pub fn get(path: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        Self::new(HttpMethod::Get, path, headers, None)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The settle-once result of this request. Clones observe the same outcome.
    pub fn pending(&self) -> Pending<Response> {
        self.pending.clone()
    }

    /// Body lines: empty unless the request accepts JSON and has content,
    /// otherwise the single JSON text.
    pub fn body(&self) -> Result<Vec<String>, BatchError> {
        let Some(content) = self.content.as_ref().filter(|_| accepts_json(&self.headers)) else {
            return Ok(Vec::new());
        };
        let text =
            serde_json::to_string(content).map_err(|e| BatchError::Serialization(e.to_string()))?;
        Ok(vec![text])
    }

    /// Serialize this request as one MIME part, sending the token under
    /// the default `x-csrf-token` header.
    pub fn payload(&self, csrf_token: &str) -> Result<String, BatchError> {
        self.payload_with_header(CSRF_HEADER, csrf_token)
    }

    /// Serialize this request as one MIME part with the token sent under
    /// `csrf_header`.
    pub fn payload_with_header(&self, csrf_header: &str, csrf_token: &str) -> Result<String, BatchError> {
        let body = self.body()?;
        let request_line = format!(
            "{} {} HTTP/1.1",
            self.method,
            self.path.trim_start_matches('/')
        );

        let mut lines: Vec<String> = vec!["Content-Type: application/http".to_string()];
        if body.is_empty() {
            lines.push(format!("{csrf_header}: {csrf_token}"));
            lines.push("Content-Transfer-Encoding: binary".to_string());
            lines.push(String::new());
            lines.push(request_line);
            lines.extend(self.headers.iter().map(|(n, v)| format!("{n}: {v}")));
            lines.push(String::new());
        } else {
            let length: usize = body.iter().map(String::len).sum::<usize>()
                + CRLF.len() * (body.len() - 1);
            lines.push("Content-Transfer-Encoding: binary".to_string());
            lines.push(String::new());
            lines.push(request_line);
            lines.push(format!("{csrf_header}: {csrf_token}"));
            lines.push(format!("Content-Length: {length}"));
            lines.extend(self.headers.iter().map(|(n, v)| format!("{n}: {v}")));
            lines.push(String::new());
            lines.extend(body);
        }
        Ok(lines.join(CRLF))
    }

    /// Decode this request's response part and settle its pending result.
    ///
    /// The settled response (or the response attached to a status error) is
    /// stamped with a description of this request.
    pub fn process(&mut self, lines: &[String], registry: &DecoderRegistry) -> Settlement {
        let origin = self.describe();
        let outcome = match Response::process(lines, registry) {
            Ok(response) => Ok(response.with_request(origin)),
            Err(BatchError::Status {
                status,
                message,
                response,
            }) => Err(BatchError::Status {
                status,
                message,
                response: Box::new(response.with_request(origin)),
            }),
            Err(e) => Err(e),
        };
        tracing::debug!(
            method = %self.method,
            path = %self.path,
            ok = outcome.is_ok(),
            "request settled"
        );
        self.settle(outcome.clone());
        outcome
    }

    pub(crate) fn settle(&mut self, outcome: Settlement) {
        self.settler.settle(outcome);
    }

    /// Plain-data description of this request.
    pub fn describe(&self) -> HttpRequest {
        HttpRequest {
            method: self.method,
            path: self.path.clone(),
            headers: self.headers.clone(),
            body: self.body().ok().and_then(|lines| {
                (!lines.is_empty()).then(|| lines.join(CRLF))
            }),
        }
    }
}

/// Whether the headers ask for `Accept: application/json`.
fn accepts_json(headers: &[(String, String)]) -> bool {
    find_header(headers, "accept").is_some_and(|v| v.trim() == "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::split_lines;

    fn json_headers() -> Vec<(String, String)> {
        vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }

    #[test]
    fn body_requires_json_accept_header() {
        let content = Some(serde_json::json!({"Name": "x"}));
        let without = Request::new(HttpMethod::Post, "/Products", Vec::new(), content.clone());
        assert!(without.body().unwrap().is_empty());

        let with = Request::new(HttpMethod::Post, "/Products", json_headers(), content);
        assert_eq!(with.body().unwrap(), vec![r#"{"Name":"x"}"#.to_string()]);

        let no_content = Request::new(HttpMethod::Post, "/Products", json_headers(), None);
        assert!(no_content.body().unwrap().is_empty());
    }

    #[test]
    fn bodyless_payload_puts_csrf_in_mime_headers() {
        let request = Request::get(
            "/Products('1')",
            vec![("Accept".to_string(), "application/xml".to_string())],
        );
        let payload = request.payload("tok").unwrap();
        assert_eq!(
            payload,
            "Content-Type: application/http\r\n\
             x-csrf-token: tok\r\n\
             Content-Transfer-Encoding: binary\r\n\
             \r\n\
             GET Products('1') HTTP/1.1\r\n\
             Accept: application/xml\r\n"
        );
    }

    #[test]
    fn payload_with_body_puts_csrf_before_content_length() {
        let request = Request::new(
            HttpMethod::Post,
            "/Products",
            json_headers(),
            Some(serde_json::json!({"Name": "Ünï"})),
        );
        let payload = request.payload("tok").unwrap();
        let body = r#"{"Name":"Ünï"}"#;
        assert_eq!(
            payload,
            format!(
                "Content-Type: application/http\r\n\
                 Content-Transfer-Encoding: binary\r\n\
                 \r\n\
                 POST Products HTTP/1.1\r\n\
                 x-csrf-token: tok\r\n\
                 Content-Length: {}\r\n\
                 Accept: application/json\r\n\
                 Content-Type: application/json\r\n\
                 \r\n\
                 {body}",
                body.len()
            )
        );
        // byte length, not character count
        assert_eq!(body.len(), 16);
    }

    #[test]
    fn payload_uses_the_given_csrf_header_name() {
        let bodyless = Request::new(HttpMethod::Delete, "Products('1')", Vec::new(), None);
        let lines = split_lines(&bodyless.payload_with_header("X-Token", "tok").unwrap());
        assert_eq!(lines[1], "X-Token: tok");
        assert!(!lines.iter().any(|l| l.starts_with("x-csrf-token")));

        let with_body = Request::new(
            HttpMethod::Post,
            "Products",
            json_headers(),
            Some(serde_json::json!({"Name": "x"})),
        );
        let lines = split_lines(&with_body.payload_with_header("X-Token", "tok").unwrap());
        assert_eq!(lines[3], "POST Products HTTP/1.1");
        assert_eq!(lines[4], "X-Token: tok");
        assert!(lines[5].starts_with("Content-Length: "));
    }

    #[test]
    fn json_constructor_fills_in_media_headers() {
        #[derive(Serialize)]
        struct Product {
            name: &'static str,
        }
        let request = Request::json(
            HttpMethod::Patch,
            "Products('1')",
            vec![("If-Match".to_string(), "*".to_string())],
            &Product { name: "n" },
        )
        .unwrap();
        assert_eq!(
            request.headers(),
            &[
                ("If-Match".to_string(), "*".to_string()),
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]
        );
        assert_eq!(request.body().unwrap(), vec![r#"{"name":"n"}"#.to_string()]);
    }

    #[test]
    fn json_constructor_reports_serialization_failure() {
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], 1);
        let err = Request::json(HttpMethod::Post, "Things", Vec::new(), &map).unwrap_err();
        assert!(matches!(err, BatchError::Serialization(_)));
        assert!(err.to_string().starts_with("stringifying failed"));
    }

    #[tokio::test]
    async fn process_settles_pending_and_stamps_origin() {
        let mut request = Request::get("Products('1')", Vec::new());
        let pending = request.pending();
        let part = split_lines(
            "Content-Type: application/http\r\n\
             \r\n\
             HTTP/1.1 200 OK\r\n\
             Content-Type: application/json\r\n\
             \r\n\
             {\"d\":{}}\r\n",
        );
        let outcome = request.process(&part, &DecoderRegistry::default());
        assert!(outcome.is_ok());

        let response = pending.await.unwrap();
        let origin = response.request().unwrap();
        assert_eq!(origin.method, HttpMethod::Get);
        assert_eq!(origin.path, "Products('1')");
    }

    #[tokio::test]
    async fn failed_process_stamps_origin_on_error_response() {
        let mut request = Request::new(HttpMethod::Delete, "Products('9')", Vec::new(), None);
        let part = split_lines("Content-Type: application/http\r\n\r\nHTTP/1.1 404 Not Found\r\n\r\n");
        request.process(&part, &DecoderRegistry::default()).unwrap_err();

        let err = request.pending().await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.response().unwrap().request().unwrap().path, "Products('9')");
    }
}
