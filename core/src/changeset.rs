//! Atomic groups of write requests.
//!
//! A changeset is serialized as a nested `multipart/mixed` document inside
//! one part of the batch. On the way back the server either answers with a
//! nested document holding one part per request, or, when the whole group was
//! rejected, with a single ordinary response. In the second case the group has
//! exactly one outcome and its requests never settle individually.

use crate::decode::DecoderRegistry;
use crate::error::BatchError;
use crate::items::ItemList;
use crate::multipart::{find_nested_boundary, split_parts, CRLF};
use crate::pending::{self, Pending, Settler};
use crate::request::{Request, Settlement, CSRF_HEADER};
use crate::response::Response;

/// Result of a changeset that was answered.
#[derive(Debug, Clone)]
pub enum ChangeSetOutcome {
    /// One outcome per request, in the order the requests were added.
    Parts(Vec<Settlement>),
    /// The server answered the whole group with one successful response.
    Collapsed(Response),
}

impl ChangeSetOutcome {
    /// Per-request outcomes, empty for a collapsed group.
    pub fn parts(&self) -> &[Settlement] {
        match self {
            ChangeSetOutcome::Parts(parts) => parts,
            ChangeSetOutcome::Collapsed(_) => &[],
        }
    }
}

/// Settled value of a changeset's own result. A collapsed failure is the
/// `Err` side.
pub type ChangeSetSettlement = Result<ChangeSetOutcome, BatchError>;

/// An ordered group of requests committed atomically by the server.
#[derive(Debug)]
pub struct ChangeSet {
    requests: ItemList<Request>,
    committed: bool,
    settler: Settler<ChangeSetOutcome>,
    pending: Pending<ChangeSetOutcome>,
}

impl ChangeSet {
    pub fn new() -> Self {
        let (settler, pending) = pending::channel();
        Self {
            requests: ItemList::new("changeset", "changeset"),
            committed: false,
            settler,
            pending,
        }
    }

    /// Queue a request in this changeset.
    pub fn add_request(&mut self, request: Request) -> &mut Request {
        if self.committed {
            tracing::warn!(
                boundary = self.boundary(),
                "adding a request to a committed changeset"
            );
        }
        self.requests.add(request)
    }

    /// Mark the group as complete; no further requests are expected.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn boundary(&self) -> &str {
        self.requests.boundary()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn requests(&self) -> impl Iterator<Item = &Request> {
        self.requests.iter()
    }

    /// The settle-once result of the whole group.
    pub fn pending(&self) -> Pending<ChangeSetOutcome> {
        self.pending.clone()
    }

    /// Serialize the group as a nested multipart document.
    pub fn payload(&self, csrf_token: &str) -> Result<String, BatchError> {
        self.payload_with_header(CSRF_HEADER, csrf_token)
    }

    /// Like `payload`, with every request carrying the token under
    /// `csrf_header`.
    pub fn payload_with_header(&self, csrf_header: &str, csrf_token: &str) -> Result<String, BatchError> {
        let boundary = self.boundary();
        let mut lines = vec![
            format!("Content-Type: multipart/mixed; boundary={boundary}"),
            String::new(),
        ];
        for request in self.requests.iter() {
            lines.push(format!("--{boundary}"));
            lines.push(request.payload_with_header(csrf_header, csrf_token)?);
        }
        lines.push(format!("--{boundary}--"));
        Ok(lines.join(CRLF))
    }

    /// Demultiplex this group's response part and settle every result.
    pub fn process(&mut self, lines: &[String], registry: &DecoderRegistry) -> ChangeSetSettlement {
        let outcome = match find_nested_boundary(lines) {
            Some((at, boundary)) => {
                let parts = split_parts(&lines[at + 1..], &boundary);
                if parts.len() != self.requests.len() {
                    tracing::warn!(
                        expected = self.requests.len(),
                        received = parts.len(),
                        "changeset part count mismatch"
                    );
                }
                let settled = self
                    .requests
                    .iter_mut()
                    .enumerate()
                    .map(|(index, request)| match parts.get(index) {
                        Some(part) => request.process(part, registry),
                        None => {
                            let missing = Err(BatchError::MissingResponse { index });
                            request.settle(missing.clone());
                            missing
                        }
                    })
                    .collect();
                Ok(ChangeSetOutcome::Parts(settled))
            }
            None => {
                tracing::debug!(
                    requests = self.requests.len(),
                    "changeset answered with a single response"
                );
                Response::process(lines, registry).map(ChangeSetOutcome::Collapsed)
            }
        };
        self.settler.settle(outcome.clone());
        outcome
    }

    pub(crate) fn settle(&mut self, outcome: ChangeSetSettlement) {
        self.settler.settle(outcome);
    }
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::new()
    }
}
