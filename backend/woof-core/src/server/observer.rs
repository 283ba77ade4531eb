use crate::error::endpoint::EndpointError;
use crate::transport::ConnectionId;

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use log::warn;

/// Notified when connections open and close. Observers run one at a time;
/// a failing observer does not stop the others.
#[async_trait]
pub trait ConnectionObserver: Send + Sync {
    async fn on_connected(&self, _connection: ConnectionId) -> Result<(), EndpointError> {
        Ok(())
    }

    async fn on_disconnected(&self, _connection: ConnectionId) -> Result<(), EndpointError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
}

impl ObserverSet {
    pub(crate) fn add(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    fn snapshot(&self) -> Vec<Arc<dyn ConnectionObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) async fn connected(&self, connection: ConnectionId) {
        for observer in self.snapshot() {
            if let Err(e) = observer.on_connected(connection).await {
                warn!("{connection} connect observer failed: {e}");
            }
        }
    }

    pub(crate) async fn disconnected(&self, connection: ConnectionId) {
        for observer in self.snapshot() {
            if let Err(e) = observer.on_disconnected(connection).await {
                warn!("{connection} disconnect observer failed: {e}");
            }
        }
    }
}
