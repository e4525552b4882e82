//! The seam to whatever actually performs HTTP.
//!
//! The core never opens connections. A host that wants the convenience of
//! `BatchClient::send` implements `Transport` over its HTTP stack of choice;
//! hosts that prefer to stay in control call the `build_*`/`parse_*` pairs
//! directly.

use async_trait::async_trait;

use crate::error::BatchError;
use crate::http::{HttpRequest, HttpResponse};

/// Executes one physical HTTP exchange.
///
/// Non-success statuses must be returned as data, not as `Err`; the client
/// interprets status codes itself. `Err` is reserved for failures to complete
/// the exchange at all, reported as `BatchError::Transport`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BatchError>;
}
