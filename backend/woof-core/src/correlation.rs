//! Request/response correlation.
//!
//! Each outgoing request registers a [`ResponseSynchronizer`] keyed by a fresh
//! 128-bit message id. The receive loop hands a matching reply to exactly one
//! waiter; dropping the synchronizer (reply, timeout or cancellation) removes
//! the entry, so the table never outlives its callers.

use crate::codec::DecodedMessage;
use crate::registry::TypeContext;
use crate::transport::ConnectionId;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::error::Elapsed;
use uuid::Uuid;

#[derive(Debug)]
pub enum Reply {
    Message(DecodedMessage),
    /// The reply arrived but failed signature validation.
    Unauthorized { context: TypeContext },
    /// Released without a reply (connection-wide error or shutdown).
    Released,
}

struct Pending {
    connection: ConnectionId,
    sender: oneshot::Sender<Reply>,
}

#[derive(Default)]
pub struct ResponseTable {
    pending: Mutex<HashMap<Uuid, Pending>>,
}

impl ResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for a request about to be sent on `connection`.
    pub fn new_synchronizer(self: &Arc<Self>, connection: ConnectionId) -> ResponseSynchronizer {
        let mut pending = self.lock();
        let mut id = Uuid::new_v4();
        while pending.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let (sender, receiver) = oneshot::channel();
        pending.insert(id, Pending { connection, sender });

        ResponseSynchronizer {
            id,
            receiver,
            table: Arc::clone(self),
        }
    }

    /// Claim the waiter for `id` if one exists for the same connection.
    pub fn try_remove(&self, id: &Uuid, connection: ConnectionId) -> Option<PendingReply> {
        let mut pending = self.lock();
        match pending.get(id) {
            Some(entry) if entry.connection == connection => pending
                .remove(id)
                .map(|entry| PendingReply { sender: entry.sender }),
            _ => None,
        }
    }

    /// Release every waiter of `connection` without a reply.
    pub fn drain_connection(&self, connection: ConnectionId) -> usize {
        let released: Vec<Pending> = {
            let mut pending = self.lock();
            let ids: Vec<Uuid> = pending
                .iter()
                .filter(|(_, entry)| entry.connection == connection)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        release(released)
    }

    /// Release every waiter without a reply.
    pub fn drain_all(&self) -> usize {
        let released: Vec<Pending> = self.lock().drain().map(|(_, entry)| entry).collect();
        release(released)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn release(released: Vec<Pending>) -> usize {
    let count = released.len();
    for entry in released {
        let _ = entry.sender.send(Reply::Released);
    }
    count
}

/// A claimed slot; delivering consumes it so a reply is handed over once.
pub struct PendingReply {
    sender: oneshot::Sender<Reply>,
}

impl PendingReply {
    /// False when the waiter already gave up.
    pub fn deliver(self, reply: Reply) -> bool {
        self.sender.send(reply).is_ok()
    }
}

pub struct ResponseSynchronizer {
    id: Uuid,
    receiver: oneshot::Receiver<Reply>,
    table: Arc<ResponseTable>,
}

impl ResponseSynchronizer {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the reply; a dropped sender counts as a release.
    pub async fn wait(&mut self, timeout: Duration) -> Result<Reply, Elapsed> {
        let received = tokio::time::timeout(timeout, &mut self.receiver).await?;
        Ok(received.unwrap_or(Reply::Released))
    }
}

impl Drop for ResponseSynchronizer {
    fn drop(&mut self) {
        self.table.lock().remove(&self.id);
    }
}
