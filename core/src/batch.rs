//! The top-level batch document.
//!
//! A `Batch` is an ordered list of requests and changesets behind one
//! boundary. Serialization writes every item as one part; decoding splits the
//! physical response body into parts and hands the n-th part to the n-th item.
//! There are no identifiers on the wire, so that positional pairing is the
//! whole correlation scheme.

use std::sync::Arc;

use crate::changeset::{ChangeSet, ChangeSetSettlement};
use crate::decode::DecoderRegistry;
use crate::error::BatchError;
use crate::items::ItemList;
use crate::multipart::{discover_boundary, split_parts, CRLF};
use crate::request::{Request, Settlement, CSRF_HEADER};

/// One child of a batch, borrowed in send order.
#[derive(Debug, Clone, Copy)]
pub enum BatchItem<'a> {
    Request(&'a Request),
    ChangeSet(&'a ChangeSet),
}

/// Position of a child in its own store.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Request(usize),
    ChangeSet(usize),
}

/// Outcome of one batch item, in send order.
#[derive(Debug, Clone)]
pub enum ItemSettlement {
    Request(Settlement),
    ChangeSet(ChangeSetSettlement),
}

impl ItemSettlement {
    pub fn is_ok(&self) -> bool {
        match self {
            ItemSettlement::Request(outcome) => outcome.is_ok(),
            ItemSettlement::ChangeSet(outcome) => outcome.is_ok(),
        }
    }
}

/// An ordered list of requests and changesets sent as one physical request.
#[derive(Debug)]
pub struct Batch {
    slots: ItemList<Slot>,
    requests: Vec<Request>,
    changesets: Vec<ChangeSet>,
    csrf_header: String,
    decoders: Arc<DecoderRegistry>,
}

impl Batch {
    pub fn new() -> Self {
        Self::with_decoders(Arc::new(DecoderRegistry::default()))
    }

    /// A batch decoding bodies with `decoders`.
    pub fn with_decoders(decoders: Arc<DecoderRegistry>) -> Self {
        Self {
            slots: ItemList::new("batch", "batch"),
            requests: Vec::new(),
            changesets: Vec::new(),
            csrf_header: CSRF_HEADER.to_string(),
            decoders,
        }
    }

    /// Send the token under `name` instead of `x-csrf-token`.
    #[must_use]
    pub fn with_csrf_header(mut self, name: &str) -> Self {
        self.csrf_header = name.to_string();
        self
    }

    pub fn csrf_header(&self) -> &str {
        &self.csrf_header
    }

    pub fn boundary(&self) -> &str {
        self.slots.boundary()
    }

    /// `Content-Type` of the physical request body.
    pub fn content_type(&self) -> String {
        format!("multipart/mixed; boundary={}", self.boundary())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = BatchItem<'_>> {
        self.slots.iter().map(move |slot| match *slot {
            Slot::Request(at) => BatchItem::Request(&self.requests[at]),
            Slot::ChangeSet(at) => BatchItem::ChangeSet(&self.changesets[at]),
        })
    }

    /// Queue a standalone request.
    pub fn add_request(&mut self, request: Request) -> &mut Request {
        let at = self.requests.len();
        self.requests.push(request);
        self.slots.add(Slot::Request(at));
        &mut self.requests[at]
    }

    /// Open a new changeset at the end of the batch.
    pub fn add_changeset(&mut self) -> &mut ChangeSet {
        let at = self.changesets.len();
        self.changesets.push(ChangeSet::new());
        self.slots.add(Slot::ChangeSet(at));
        &mut self.changesets[at]
    }

    /// Serialize the whole batch. Every changeset is committed first.
    pub fn payload(&mut self, csrf_token: &str) -> Result<String, BatchError> {
        let boundary = self.slots.boundary().to_string();
        let header = self.csrf_header.as_str();
        let mut lines = Vec::with_capacity(self.slots.len() * 2 + 1);
        for slot in self.slots.iter() {
            lines.push(format!("--{boundary}"));
            match *slot {
                Slot::Request(at) => {
                    lines.push(self.requests[at].payload_with_header(header, csrf_token)?)
                }
                Slot::ChangeSet(at) => {
                    let changeset = &mut self.changesets[at];
                    changeset.commit();
                    lines.push(changeset.payload_with_header(header, csrf_token)?);
                }
            }
        }
        lines.push(format!("--{boundary}--"));
        tracing::debug!(boundary = %boundary, items = self.slots.len(), "serialized batch");
        Ok(lines.join(CRLF))
    }

    /// Decode a physical response body, discovering its boundary from the
    /// first delimiter line.
    pub fn process(&mut self, lines: &[String]) -> Vec<ItemSettlement> {
        match discover_boundary(lines) {
            Some(boundary) => self.process_with_boundary(&boundary, lines),
            None => {
                tracing::warn!("batch response carries no multipart delimiter");
                let error = BatchError::UnexpectedResponse("no multipart delimiter in batch response".into());
                self.settle_all(|_| error.clone())
            }
        }
    }

    /// Decode a physical response body delimited by `boundary`.
    pub fn process_with_boundary(&mut self, boundary: &str, lines: &[String]) -> Vec<ItemSettlement> {
        let parts = split_parts(lines, boundary);
        if parts.len() != self.slots.len() {
            tracing::warn!(
                expected = self.slots.len(),
                received = parts.len(),
                "batch part count mismatch"
            );
        }
        tracing::debug!(boundary, parts = parts.len(), "demultiplexing batch response");

        let slots: Vec<Slot> = self.slots.iter().copied().collect();
        let mut outcomes = Vec::with_capacity(slots.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let outcome = match (slot, parts.get(index)) {
                (Slot::Request(at), Some(part)) => {
                    ItemSettlement::Request(self.requests[at].process(part, &self.decoders))
                }
                (Slot::ChangeSet(at), Some(part)) => {
                    ItemSettlement::ChangeSet(self.changesets[at].process(part, &self.decoders))
                }
                (slot, None) => self.settle_slot(slot, BatchError::MissingResponse { index }),
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Settle every item with `error` when the physical exchange failed.
    pub(crate) fn reject(&mut self, error: BatchError) {
        tracing::warn!(%error, items = self.slots.len(), "rejecting whole batch");
        self.settle_all(|_| error.clone());
    }

    fn settle_all(&mut self, error: impl Fn(usize) -> BatchError) -> Vec<ItemSettlement> {
        let slots: Vec<Slot> = self.slots.iter().copied().collect();
        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| self.settle_slot(slot, error(index)))
            .collect()
    }

    fn settle_slot(&mut self, slot: Slot, error: BatchError) -> ItemSettlement {
        match slot {
            Slot::Request(at) => {
                self.requests[at].settle(Err(error.clone()));
                ItemSettlement::Request(Err(error))
            }
            Slot::ChangeSet(at) => {
                self.changesets[at].settle(Err(error.clone()));
                ItemSettlement::ChangeSet(Err(error))
            }
        }
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
