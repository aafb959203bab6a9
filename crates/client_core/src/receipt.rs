//! Correlates sent messages with the sequence ids the server assigns later.
//!
//! Every outstanding internal id owns one single-shot handle in the registry.
//! Handles are removed when a confirmation arrives, and a [`PendingReceipt`]
//! removes whatever is left when it is dropped, whether it finished, timed
//! out, or was cancelled with the enclosing send.

use std::{
    collections::{hash_map::Entry, HashMap},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use shared::{
    domain::{BotId, Contact, InternalId, SequenceId},
    message::{MessageChain, MessageSource, SequenceIds},
    protocol::ConfirmationEvent,
};
use tokio::{
    sync::oneshot,
    time::{timeout_at, Instant},
};
use tracing::{debug, warn};

use crate::error::CorrelationError;

type WaiterKey = (BotId, InternalId);

#[derive(Default)]
pub struct ReceiptCorrelator {
    waiters: Mutex<HashMap<WaiterKey, oneshot::Sender<SequenceId>>>,
}

impl ReceiptCorrelator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Starts waiting for confirmations of `internal_ids` issued by `issuer`.
    pub fn register(
        self: &Arc<Self>,
        issuer: BotId,
        internal_ids: Vec<InternalId>,
    ) -> Result<PendingReceipt, CorrelationError> {
        let mut waiters = self.waiters.lock();
        let mut receivers = Vec::with_capacity(internal_ids.len());
        for (index, internal_id) in internal_ids.iter().enumerate() {
            match waiters.entry((issuer, *internal_id)) {
                Entry::Occupied(_) => {
                    for registered in &internal_ids[..index] {
                        waiters.remove(&(issuer, *registered));
                    }
                    return Err(CorrelationError::DuplicateInternalId(*internal_id));
                }
                Entry::Vacant(slot) => {
                    let (tx, rx) = oneshot::channel();
                    slot.insert(tx);
                    receivers.push(rx);
                }
            }
        }
        Ok(PendingReceipt {
            correlator: self.clone(),
            issuer,
            internal_ids,
            receivers,
        })
    }

    /// Registers `count` fresh random internal ids.
    pub fn reserve(self: &Arc<Self>, issuer: BotId, count: usize) -> PendingReceipt {
        let mut rng = rand::thread_rng();
        let mut waiters = self.waiters.lock();
        let mut internal_ids = Vec::with_capacity(count);
        let mut receivers = Vec::with_capacity(count);
        while internal_ids.len() < count {
            let internal_id = InternalId(rng.gen_range(1..=i32::MAX));
            if let Entry::Vacant(slot) = waiters.entry((issuer, internal_id)) {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                internal_ids.push(internal_id);
                receivers.push(rx);
            }
        }
        PendingReceipt {
            correlator: self.clone(),
            issuer,
            internal_ids,
            receivers,
        }
    }

    /// Resolves the matching waiter. Unknown and repeated confirmations are ignored.
    pub fn dispatch(&self, event: &ConfirmationEvent) -> bool {
        let waiter = self
            .waiters
            .lock()
            .remove(&(event.issuer, event.internal_id));
        match waiter {
            Some(tx) => tx.send(event.sequence_id).is_ok(),
            None => {
                debug!(
                    issuer = event.issuer.0,
                    internal_id = event.internal_id.0,
                    sequence_id = event.sequence_id.0,
                    "receipt: confirmation without waiter ignored"
                );
                false
            }
        }
    }

    /// Number of internal ids currently awaiting a confirmation.
    pub fn subscription_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn release(&self, issuer: BotId, internal_ids: &[InternalId]) {
        let mut waiters = self.waiters.lock();
        for internal_id in internal_ids {
            waiters.remove(&(issuer, *internal_id));
        }
    }
}

pub struct PendingReceipt {
    correlator: Arc<ReceiptCorrelator>,
    issuer: BotId,
    internal_ids: Vec<InternalId>,
    receivers: Vec<oneshot::Receiver<SequenceId>>,
}

impl PendingReceipt {
    pub fn internal_ids(&self) -> &[InternalId] {
        &self.internal_ids
    }

    /// Waits until every id resolved or `timeout` elapsed, whichever is first.
    ///
    /// Entries follow the order of [`PendingReceipt::internal_ids`] regardless
    /// of the order confirmations arrived in; unresolved ids are `None`.
    pub async fn wait(mut self, timeout: Duration) -> Vec<Option<SequenceId>> {
        let deadline = Instant::now() + timeout;
        let mut resolved = Vec::with_capacity(self.receivers.len());
        for receiver in self.receivers.iter_mut() {
            let sequence_id = match timeout_at(deadline, receiver).await {
                Ok(Ok(sequence_id)) => Some(sequence_id),
                Ok(Err(_)) | Err(_) => None,
            };
            resolved.push(sequence_id);
        }
        let missing = resolved.iter().filter(|id| id.is_none()).count();
        if missing > 0 {
            warn!(
                issuer = self.issuer.0,
                missing,
                expected = resolved.len(),
                timeout_ms = timeout.as_millis() as u64,
                "receipt: sequence id correlation timed out"
            );
        }
        resolved
    }
}

impl Drop for PendingReceipt {
    fn drop(&mut self) {
        self.correlator.release(self.issuer, &self.internal_ids);
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub target: Contact,
    pub source: MessageSource,
}

impl DeliveryReceipt {
    pub fn internal_ids(&self) -> &[InternalId] {
        &self.source.internal_ids
    }

    pub fn sequence_ids(&self) -> &SequenceIds {
        &self.source.sequence_ids
    }

    /// False when some sequence ids were still missing at the deadline.
    pub fn is_resolved(&self) -> bool {
        self.source.sequence_ids.is_resolved()
    }

    /// The chain that was actually transmitted.
    pub fn chain(&self) -> &MessageChain {
        &self.source.original
    }
}

#[cfg(test)]
#[path = "tests/receipt_tests.rs"]
mod tests;
