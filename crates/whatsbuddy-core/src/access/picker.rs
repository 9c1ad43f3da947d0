//! Directory picker host interface
//!
//! The picker is user-facing and answers asynchronously. Each launch receives
//! a [`PickerResponder`] bound to its request token; the outcome can only be
//! delivered through that responder, so one request can never complete
//! another.

use crate::error::Result;
use crate::types::{AccessMode, RequestToken, TreeUri};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Pending picker requests by token
pub(crate) type PendingTable = Arc<Mutex<HashMap<RequestToken, oneshot::Sender<PickerOutcome>>>>;

/// What the user chose in the picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Granted(TreeUri),
    Cancelled,
}

/// Parameters for one picker launch
#[derive(Debug, Clone)]
pub struct PickerRequest {
    pub token: RequestToken,
    /// Folder the picker should open at, when known
    pub initial_location: Option<TreeUri>,
    pub access: AccessMode,
}

/// One-shot handle for answering a picker request.
///
/// Dropping it without responding counts as a cancellation.
pub struct PickerResponder {
    token: RequestToken,
    pending: PendingTable,
}

impl PickerResponder {
    pub(crate) fn new(token: RequestToken, pending: PendingTable) -> Self {
        Self { token, pending }
    }

    /// Deliver the outcome; returns false if the request is no longer waiting
    pub fn respond(self, outcome: PickerOutcome) -> bool {
        let sender = self.pending.lock().remove(&self.token);
        match sender {
            Some(tx) => {
                debug!("Picker responded to request {}", self.token);
                tx.send(outcome).is_ok()
            }
            None => {
                warn!("Ignoring picker response for unknown request {}", self.token);
                false
            }
        }
    }
}

impl Drop for PickerResponder {
    fn drop(&mut self) {
        // Unanswered requests resolve as cancelled once the sender is gone
        self.pending.lock().remove(&self.token);
    }
}

/// Host side of the directory picker (native dialog, terminal prompt, ...)
#[async_trait]
pub trait PickerHost: Send + Sync {
    /// Show the picker. The outcome may be delivered before or after this returns.
    async fn launch(&self, request: PickerRequest, responder: PickerResponder) -> Result<()>;
}

/// Picker that answers every request with a fixed outcome
#[derive(Debug, Clone)]
pub struct StaticPicker {
    outcome: PickerOutcome,
}

impl StaticPicker {
    pub fn granting(tree: TreeUri) -> Self {
        Self {
            outcome: PickerOutcome::Granted(tree),
        }
    }

    pub fn cancelling() -> Self {
        Self {
            outcome: PickerOutcome::Cancelled,
        }
    }
}

#[async_trait]
impl PickerHost for StaticPicker {
    async fn launch(&self, _request: PickerRequest, responder: PickerResponder) -> Result<()> {
        responder.respond(self.outcome.clone());
        Ok(())
    }
}
