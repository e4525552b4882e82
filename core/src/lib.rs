//! Client-side engine for OData `$batch` requests.
//!
//! # Overview
//! Many logical HTTP requests are packed into one `multipart/mixed` body and
//! the server's multipart answer is split back into one result per request.
//! Write requests may be grouped into changesets which the server applies
//! atomically.
//!
//! # Design
//! - The core never touches the network (host-does-IO pattern).
//!   `BatchClient` builds `HttpRequest` values and parses `HttpResponse`
//!   values; the caller, or a `Transport`, executes the round-trip.
//! - Every request and changeset owns a settle-once `Pending` handle that can
//!   be awaited independently of the batch that carries it.
//! - Parts are correlated by position only. A missing part settles its item
//!   with `BatchError::MissingResponse` so that nothing waits forever.
//! - Response bodies are decoded through a `DecoderRegistry` keyed by
//!   content type.

pub mod batch;
pub mod changeset;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod http;
pub mod items;
pub mod multipart;
pub mod pending;
pub mod request;
pub mod response;
pub mod transport;

pub use batch::{Batch, BatchItem, ItemSettlement};
pub use changeset::{ChangeSet, ChangeSetOutcome, ChangeSetSettlement};
pub use client::BatchClient;
pub use config::ClientConfig;
pub use decode::{Body, BodyDecoder, DecodeError, DecoderRegistry, DecoderSelection};
pub use error::BatchError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use items::{generate_boundary, generate_id, ItemList};
pub use pending::Pending;
pub use request::{Request, Settlement, CSRF_HEADER};
pub use response::{ParseState, Response, ResponseParser};
pub use transport::Transport;
