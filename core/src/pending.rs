//! Settle-once results that exist before their value does.
//!
//! Every `Request` and `ChangeSet` creates its result at construction time,
//! long before the physical response arrives. `Settler` is the single write
//! side; `Pending` is a cheap, clonable read side that can be awaited from any
//! number of places.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::future::{FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::BatchError;

/// Create a connected settler/pending pair.
pub fn channel<T: Clone>() -> (Settler<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (
        Settler { tx: Some(tx) },
        Pending { inner: rx.shared() },
    )
}

/// Write side of a pending result. Settles at most once.
#[derive(Debug)]
pub struct Settler<T> {
    tx: Option<oneshot::Sender<Result<T, BatchError>>>,
}

impl<T> Settler<T> {
    /// Deliver the outcome. Later calls are ignored.
    pub fn settle(&mut self, outcome: Result<T, BatchError>) {
        match self.tx.take() {
            // The receiver may already be gone; the outcome is still reported
            // synchronously by whoever called us.
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => tracing::warn!("ignoring second settlement of a pending result"),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }
}

/// Read side of a pending result.
///
/// Resolves to `Err(BatchError::Unsettled)` if the settler is dropped without
/// settling.
#[derive(Clone)]
pub struct Pending<T: Clone> {
    inner: Shared<oneshot::Receiver<Result<T, BatchError>>>,
}

impl<T: Clone> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending").finish_non_exhaustive()
    }
}

impl<T: Clone> Future for Pending<T> {
    type Output = Result<T, BatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner
            .poll_unpin(cx)
            .map(|received| received.unwrap_or(Err(BatchError::Unsettled)))
    }
}
