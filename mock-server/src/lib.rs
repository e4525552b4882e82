use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const CSRF_HEADER: &str = "x-csrf-token";

const CRLF: &str = "\r\n";
const MAX_HEADERS: usize = 32;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(rename = "ID")]
    pub id: u32,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Price", default)]
    pub price: f64,
}

#[derive(Deserialize)]
pub struct CreateProduct {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Price", default)]
    pub price: f64,
}

#[derive(Deserialize)]
pub struct UpdateProduct {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Price")]
    pub price: Option<f64>,
}

/// In-memory service state. Cloned to roll back a failed changeset.
#[derive(Clone, Debug)]
pub struct Store {
    pub token: String,
    pub products: BTreeMap<u32, Product>,
    next_id: u32,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            token: Uuid::new_v4().simple().to_string(),
            products: BTreeMap::new(),
            next_id: 1,
        }
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with(Store::default())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    Router::new()
        .route("/odata", get(service_document))
        .route("/odata/$batch", post(batch))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn service_document(State(db): State<Db>, headers: HeaderMap) -> Response {
    let document = Json(serde_json::json!({"d": {"EntitySets": ["Products"]}}));
    let fetch = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("fetch"));
    if !fetch {
        return document.into_response();
    }
    let token = db.read().await.token.clone();
    ([(CSRF_HEADER, token)], document).into_response()
}

async fn batch(State(db): State<Db>, headers: HeaderMap, body: String) -> Response {
    let Some(boundary) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(boundary_of)
    else {
        return (StatusCode::BAD_REQUEST, "multipart/mixed boundary required").into_response();
    };

    let response_boundary = format!("batchresponse_{}", Uuid::new_v4().simple());
    let mut store = db.write().await;
    let mut out = String::new();
    for part in split_multipart(&body, &boundary) {
        out.push_str(&format!("--{response_boundary}{CRLF}"));
        let (mime, content) = split_mime(part);
        match find(&mime, "content-type").and_then(boundary_of) {
            Some(nested) => out.push_str(&changeset(&mut store, content, &nested)),
            None => out.push_str(&http_part(&answer(&mut store, &mime, content))),
        }
    }
    out.push_str(&format!("--{response_boundary}--{CRLF}"));
    tracing::debug!(boundary = %response_boundary, "answered batch");

    (
        StatusCode::ACCEPTED,
        [(
            header::CONTENT_TYPE,
            format!("multipart/mixed; boundary={response_boundary}"),
        )],
        out,
    )
        .into_response()
}

/// Apply every operation of a changeset or none of them.
fn changeset(store: &mut Store, content: &str, boundary: &str) -> String {
    let snapshot = store.clone();
    let mut replies = Vec::new();
    for part in split_multipart(content, boundary) {
        let (mime, request) = split_mime(part);
        let reply = answer(store, &mime, request);
        if reply.status >= 400 {
            *store = snapshot;
            return http_part(&reply);
        }
        replies.push(reply);
    }

    let response_boundary = format!("changesetresponse_{}", Uuid::new_v4().simple());
    let mut out = format!("Content-Type: multipart/mixed; boundary={response_boundary}{CRLF}{CRLF}");
    for reply in &replies {
        out.push_str(&format!("--{response_boundary}{CRLF}"));
        out.push_str(&http_part(reply));
    }
    out.push_str(&format!("--{response_boundary}--{CRLF}"));
    out
}

fn http_part(reply: &Reply) -> String {
    format!(
        "Content-Type: application/http{CRLF}Content-Transfer-Encoding: binary{CRLF}{CRLF}{}{CRLF}",
        reply.render()
    )
}

/// One embedded request as received.
#[derive(Debug)]
pub struct Operation {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// One embedded response.
#[derive(Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: value.to_string(),
        }
    }

    fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    fn error(status: u16, code: &str, message: &str) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/xml".into())],
            body: format!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
                 <error xmlns=\"http://schemas.microsoft.com/ado/2007/08/dataservices/metadata\">\
                 <code>{code}</code><message xml:lang=\"en\">{message}</message></error>"
            ),
        }
    }

    pub fn render(&self) -> String {
        let reason = StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown");
        let mut out = format!("HTTP/1.1 {} {reason}{CRLF}", self.status);
        for (name, value) in &self.headers {
            out.push_str(&format!("{name}: {value}{CRLF}"));
        }
        out.push_str(&format!("Content-Length: {}{CRLF}{CRLF}", self.body.len()));
        out.push_str(&self.body);
        out
    }
}

fn answer(store: &mut Store, mime: &[(String, String)], content: &str) -> Reply {
    let operation = match parse_operation(content) {
        Ok(operation) => operation,
        Err(reason) => return Reply::error(400, "BAD_REQUEST", &reason),
    };
    tracing::debug!(method = %operation.method, path = %operation.path, "executing operation");

    if !matches!(operation.method.as_str(), "GET" | "HEAD") {
        // Bodyless writes carry the token on the part, others in the request.
        let token = match operation.body {
            Some(_) => find(&operation.headers, CSRF_HEADER),
            None => find(mime, CSRF_HEADER),
        };
        if token != Some(store.token.as_str()) {
            return Reply::error(403, "CSRF", "CSRF token validation failed");
        }
    }
    execute(store, &operation)
}

/// Parse an embedded HTTP/1.1 request.
pub fn parse_operation(content: &str) -> Result<Operation, String> {
    let bytes = content.as_bytes();
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);
    let offset = match request.parse(bytes) {
        Ok(httparse::Status::Complete(offset)) => offset,
        Ok(httparse::Status::Partial) => return Err("incomplete request".into()),
        Err(e) => return Err(e.to_string()),
    };
    let headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).trim().to_string()))
        .collect();
    let body = find(&headers, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| {
            let end = (offset + len).min(bytes.len());
            String::from_utf8_lossy(&bytes[offset..end]).into_owned()
        });
    Ok(Operation {
        method: request.method.unwrap_or_default().to_ascii_uppercase(),
        path: request.path.unwrap_or_default().to_string(),
        headers,
        body,
    })
}

fn execute(store: &mut Store, operation: &Operation) -> Reply {
    let Some(key) = parse_path(&operation.path) else {
        return Reply::error(404, "NOT_FOUND", &format!("Resource {} not found", operation.path));
    };
    match (operation.method.as_str(), key) {
        ("GET", None) => {
            let products: Vec<&Product> = store.products.values().collect();
            Reply::json(200, serde_json::json!({"d": {"results": products}}))
        }
        ("GET", Some(id)) => match store.products.get(&id) {
            Some(product) => Reply::json(200, serde_json::json!({"d": product})),
            None => not_found(id),
        },
        ("POST", None) => {
            let input: CreateProduct = match parse_body(operation) {
                Ok(input) => input,
                Err(reply) => return reply,
            };
            let product = Product {
                id: store.next_id,
                name: input.name,
                price: input.price,
            };
            store.next_id += 1;
            store.products.insert(product.id, product.clone());
            Reply::json(201, serde_json::json!({"d": product}))
        }
        ("PUT" | "PATCH" | "MERGE", Some(id)) => {
            let input: UpdateProduct = match parse_body(operation) {
                Ok(input) => input,
                Err(reply) => return reply,
            };
            let Some(product) = store.products.get_mut(&id) else {
                return not_found(id);
            };
            if let Some(name) = input.name {
                product.name = name;
            }
            if let Some(price) = input.price {
                product.price = price;
            }
            Reply::empty(204)
        }
        ("DELETE", Some(id)) => match store.products.remove(&id) {
            Some(_) => Reply::empty(204),
            None => not_found(id),
        },
        (method, _) => Reply::error(405, "METHOD_NOT_ALLOWED", &format!("{method} not supported")),
    }
}

fn not_found(id: u32) -> Reply {
    Reply::error(404, "NOT_FOUND", &format!("Product {id} not found"))
}

fn parse_body<T: serde::de::DeserializeOwned>(operation: &Operation) -> Result<T, Reply> {
    let body = operation.body.as_deref().unwrap_or_default();
    serde_json::from_str(body)
        .map_err(|e| Reply::error(400, "INVALID_BODY", &format!("Invalid body: {e}")))
}

/// `Products` → `Some(None)`, `Products(7)` or `Products('7')` → `Some(Some(7))`.
pub fn parse_path(path: &str) -> Option<Option<u32>> {
    let path = path.trim_start_matches('/');
    let path = path.split_once('?').map_or(path, |(p, _)| p);
    let rest = path.strip_prefix("Products")?;
    if rest.is_empty() {
        return Some(None);
    }
    let key = rest.strip_prefix('(')?.strip_suffix(')')?.trim_matches('\'');
    key.parse().ok().map(Some)
}

/// Parts between `--<boundary>` delimiters, preamble and epilogue dropped.
pub fn split_multipart<'a>(body: &'a str, boundary: &str) -> Vec<&'a str> {
    let delimiter = format!("--{boundary}");
    body.split(delimiter.as_str())
        .skip(1)
        .take_while(|chunk| !chunk.starts_with("--"))
        .map(|chunk| chunk.trim_start_matches([' ', '\t']).trim_start_matches(CRLF))
        .collect()
}

/// MIME headers of a part and whatever follows the blank line.
pub fn split_mime(part: &str) -> (Vec<(String, String)>, &str) {
    let (head, rest) = part.split_once("\r\n\r\n").unwrap_or((part, ""));
    let headers = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();
    (headers, rest)
}

fn find<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn boundary_of(content_type: &str) -> Option<String> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/mixed") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
