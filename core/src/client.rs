//! Stateless request builder and response parser for OData `$batch`.
//!
//! # Design
//! `BatchClient` holds only its configuration and carries no mutable state
//! between calls. Each physical exchange is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes the
//! `HttpResponse`. The caller executes the round-trip in between, keeping the
//! core deterministic and free of I/O. `send` strings the two exchanges
//! together for hosts that provide a `Transport`.

use serde_json::Value;

use crate::batch::{Batch, ItemSettlement};
use crate::config::ClientConfig;
use crate::error::BatchError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart::{boundary_from_content_type, split_lines};
use crate::response::Response;
use crate::transport::Transport;

/// Value sent in the CSRF header to ask the server for a token.
const CSRF_FETCH: &str = "Fetch";

/// Synchronous, stateless client for one OData service.
#[derive(Debug, Clone)]
pub struct BatchClient {
    config: ClientConfig,
}

impl BatchClient {
    pub fn new(service_root: &str) -> Self {
        Self::with_config(ClientConfig::new(service_root))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// An empty batch decoding with this client's decoders and sending the
    /// token under this client's CSRF header.
    pub fn batch(&self) -> Batch {
        Batch::with_decoders(self.config.decoders.clone()).with_csrf_header(&self.config.csrf_header)
    }

    pub fn build_fetch_csrf_token(&self) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.config.service_root.clone(),
            headers: vec![(self.config.csrf_header.clone(), CSRF_FETCH.to_string())],
            body: None,
        }
    }

    pub fn parse_csrf_token(&self, response: HttpResponse) -> Result<String, BatchError> {
        check_status(&response, &[200, 204])?;
        match response.header(&self.config.csrf_header) {
            Some(token) if !token.is_empty() && !token.eq_ignore_ascii_case("required") => {
                Ok(token.to_string())
            }
            _ => Err(BatchError::MissingCsrfToken),
        }
    }

    /// Serialize `batch` into the physical `$batch` request.
    pub fn build_batch(&self, batch: &mut Batch, csrf_token: &str) -> Result<HttpRequest, BatchError> {
        let body = batch.payload(csrf_token)?;
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: self.config.batch_url(),
            headers: vec![
                ("Content-Type".to_string(), batch.content_type()),
                (self.config.csrf_header.clone(), csrf_token.to_string()),
            ],
            body: Some(body),
        })
    }

    /// Demultiplex the physical `$batch` response into `batch`.
    ///
    /// Every item of `batch` is settled, also when the physical exchange
    /// itself failed.
    pub fn parse_batch(
        &self,
        batch: &mut Batch,
        response: HttpResponse,
    ) -> Result<Vec<ItemSettlement>, BatchError> {
        if let Err(e) = check_status(&response, &[200, 202]) {
            batch.reject(e.clone());
            return Err(e);
        }
        let lines = split_lines(&response.body);
        let declared = response
            .header("content-type")
            .and_then(boundary_from_content_type);
        Ok(match declared {
            Some(boundary) => batch.process_with_boundary(&boundary, &lines),
            None => batch.process(&lines),
        })
    }

    /// Unwrap a response body using the configured envelope paths.
    pub fn plain(&self, response: &Response) -> Value {
        response.plain(
            &self.config.list_result_path,
            &self.config.instance_result_path,
        )
    }

    /// Fetch a CSRF token, send `batch` and decode the answer.
    pub async fn send(
        &self,
        transport: &dyn Transport,
        batch: &mut Batch,
    ) -> Result<Vec<ItemSettlement>, BatchError> {
        let token_response = transport.send(self.build_fetch_csrf_token()).await?;
        let token = self.parse_csrf_token(token_response)?;
        let request = self.build_batch(batch, &token)?;
        tracing::debug!(url = %request.path, items = batch.len(), "sending batch");
        let response = match transport.send(request).await {
            Ok(response) => response,
            Err(e) => {
                batch.reject(e.clone());
                return Err(e);
            }
        };
        self.parse_batch(batch, response)
    }
}

/// Map a status outside `accepted` to `BatchError::Http`.
fn check_status(response: &HttpResponse, accepted: &[u16]) -> Result<(), BatchError> {
    if accepted.contains(&response.status) {
        return Ok(());
    }
    Err(BatchError::Http {
        status: response.status,
        body: response.body.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    fn client() -> BatchClient {
        BatchClient::new("http://localhost:3000/odata")
    }

    #[test]
    fn build_fetch_csrf_token_produces_correct_request() {
        let req = client().build_fetch_csrf_token();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3000/odata");
        assert_eq!(
            req.headers,
            vec![("x-csrf-token".to_string(), "Fetch".to_string())]
        );
        assert!(req.body.is_none());
    }

    #[test]
    fn parse_csrf_token_reads_header_case_insensitively() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("X-CSRF-Token".to_string(), "abc123".to_string())],
            body: String::new(),
        };
        assert_eq!(client().parse_csrf_token(response).unwrap(), "abc123");
    }

    #[test]
    fn parse_csrf_token_without_header_fails() {
        let response = HttpResponse {
            status: 200,
            headers: vec![("x-csrf-token".to_string(), "Required".to_string())],
            body: String::new(),
        };
        let err = client().parse_csrf_token(response).unwrap_err();
        assert!(matches!(err, BatchError::MissingCsrfToken));
    }

    #[test]
    fn parse_csrf_token_wrong_status() {
        let response = HttpResponse {
            status: 401,
            headers: Vec::new(),
            body: "unauthorized".to_string(),
        };
        let err = client().parse_csrf_token(response).unwrap_err();
        assert!(matches!(err, BatchError::Http { status: 401, .. }));
    }

    #[test]
    fn build_batch_produces_correct_request() {
        let c = client();
        let mut batch = c.batch();
        batch.add_request(Request::get("Products", Vec::new()));
        let req = c.build_batch(&mut batch, "tok").unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3000/odata/$batch");
        assert_eq!(req.header("content-type"), Some(batch.content_type().as_str()));
        assert_eq!(req.header("x-csrf-token"), Some("tok"));
        let body = req.body.unwrap();
        assert!(body.starts_with(&format!("--{}\r\n", batch.boundary())));
        assert!(body.ends_with(&format!("--{}--", batch.boundary())));
    }

    #[test]
    fn configured_csrf_header_reaches_every_part() {
        let c = BatchClient::with_config(
            ClientConfig::new("http://localhost:3000/odata").csrf_header("X-Token"),
        );
        let mut batch = c.batch();
        batch.add_request(Request::get("Products", Vec::new()));
        batch.add_changeset().add_request(
            Request::json(HttpMethod::Post, "Products", Vec::new(), &serde_json::json!({"Name": "a"}))
                .unwrap(),
        );
        let req = c.build_batch(&mut batch, "tok").unwrap();
        assert_eq!(req.header("X-Token"), Some("tok"));

        let body = req.body.unwrap();
        let lines = split_lines(&body);
        assert_eq!(lines.iter().filter(|l| *l == "X-Token: tok").count(), 2);
        assert!(!body.contains("x-csrf-token"));
    }

    #[tokio::test]
    async fn parse_batch_uses_declared_boundary() {
        let c = client();
        let mut batch = c.batch();
        let pending = batch.add_request(Request::get("Products", Vec::new())).pending();
        let response = HttpResponse {
            status: 202,
            headers: vec![(
                "Content-Type".to_string(),
                "multipart/mixed; boundary=resp".to_string(),
            )],
            body: "--resp\r\n\
                   Content-Type: application/http\r\n\
                   \r\n\
                   HTTP/1.1 200 OK\r\n\
                   Content-Type: application/json\r\n\
                   \r\n\
                   {\"d\":{\"results\":[{\"ID\":1}]}}\r\n\
                   --resp--\r\n"
                .to_string(),
        };
        let outcomes = c.parse_batch(&mut batch, response).unwrap();
        assert_eq!(outcomes.len(), 1);
        let response = pending.await.unwrap();
        assert_eq!(c.plain(&response), serde_json::json!([{"ID": 1}]));
    }

    #[tokio::test]
    async fn parse_batch_wrong_status_rejects_items() {
        let c = client();
        let mut batch = c.batch();
        let pending = batch.add_request(Request::get("Products", Vec::new())).pending();
        let response = HttpResponse {
            status: 500,
            headers: Vec::new(),
            body: "internal error".to_string(),
        };
        let err = c.parse_batch(&mut batch, response).unwrap_err();
        assert!(matches!(err, BatchError::Http { status: 500, .. }));
        assert!(matches!(pending.await, Err(BatchError::Http { status: 500, .. })));
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let c = BatchClient::new("http://localhost:3000/odata/");
        assert_eq!(c.build_fetch_csrf_token().path, "http://localhost:3000/odata");
    }
}
