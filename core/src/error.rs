//! Error types for the batch engine.
//!
//! # Design
//! A single `Clone` error enum: every logical request settles exactly once,
//! but its outcome may be observed through several handles (the request's own
//! future, its changeset's aggregate and the synchronous `Batch::process`
//! report), so the error has to be shareable by value.
//!
//! Build-time failures (`Serialization`) are returned before anything is
//! sent. Everything else is a decode-time outcome and only ever travels
//! inside a settled result.

use thiserror::Error;

use crate::response::Response;

/// Errors produced while building or decoding a batch.
#[derive(Debug, Clone, Error)]
pub enum BatchError {
    /// A request body could not be serialized to JSON.
    #[error("stringifying failed: {0}")]
    Serialization(String),

    /// The embedded HTTP message of a part could not be parsed.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The embedded response carried a status code of 400 or above.
    ///
    /// The message always starts with the numeric status code so callers can
    /// surface it as-is.
    #[error("{}", status_line(.status, .message))]
    Status {
        status: u16,
        /// First `message` element of an XML error body, or the message of a
        /// JSON error envelope.
        message: Option<String>,
        /// The fully decoded response, body included.
        response: Box<Response>,
    },

    /// A decoder was selected for the body but rejected its bytes.
    #[error("failed to decode {content_type} body: {reason}")]
    Decode { content_type: String, reason: String },

    /// The physical response carried fewer parts than items were sent.
    #[error("no response part for item {index}")]
    MissingResponse { index: usize },

    /// The request was never settled on its own, e.g. because its changeset
    /// received one collapsed response for the whole group.
    #[error("request was not settled individually")]
    Unsettled,

    /// The physical `$batch` exchange returned a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The CSRF fetch response carried no token header.
    #[error("server did not return a CSRF token")]
    MissingCsrfToken,

    /// The host transport failed to execute the physical exchange.
    #[error("transport failed: {0}")]
    Transport(String),
}

fn status_line(status: &u16, message: &Option<String>) -> String {
    match message {
        Some(message) => format!("{status} {message}"),
        None => status.to_string(),
    }
}

impl BatchError {
    /// Status code of an application-level failure, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BatchError::Status { status, .. } | BatchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The decoded response attached to an application-level failure.
    pub fn response(&self) -> Option<&Response> {
        match self {
            BatchError::Status { response, .. } => Some(response),
            _ => None,
        }
    }
}
