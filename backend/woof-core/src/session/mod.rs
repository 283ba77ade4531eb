//! Per-connection security state.

pub mod auth;

use crate::transport::ConnectionId;

use auth::{ApiClient, ApiUser};

use common::RedactedSecret;

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use tokio::sync::{Mutex, RwLock};

/// Signing key plus the identity established at sign-in.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// `None` means "cannot sign or verify", never "empty key".
    pub key: Option<RedactedSecret>,
    pub user: Option<ApiUser>,
    pub client: Option<ApiClient>,
}

impl Session {
    pub fn is_signed_in(&self) -> bool {
        self.key.is_some() && self.user.is_some()
    }

    pub fn clear(&mut self) {
        self.key = None;
        self.user = None;
        self.client = None;
    }
}

pub type SharedSession = Arc<RwLock<Session>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// One session regardless of connection (clients).
    Single,
    /// One session per connection (servers).
    PerConnection,
}

pub struct SessionProvider {
    mode: SessionMode,
    single: SharedSession,
    sessions: Mutex<HashMap<ConnectionId, SharedSession>>,
}

impl SessionProvider {
    pub fn single() -> Self {
        Self::with_mode(SessionMode::Single)
    }

    pub fn per_connection() -> Self {
        Self::with_mode(SessionMode::PerConnection)
    }

    fn with_mode(mode: SessionMode) -> Self {
        Self {
            mode,
            single: Arc::new(RwLock::new(Session::default())),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Session for `connection`, created on first use.
    pub async fn session(&self, connection: ConnectionId) -> SharedSession {
        match self.mode {
            SessionMode::Single => Arc::clone(&self.single),
            SessionMode::PerConnection => {
                let mut sessions = self.sessions.lock().await;
                Arc::clone(sessions.entry(connection).or_insert_with(|| {
                    debug!("{connection} session opened");
                    Arc::new(RwLock::new(Session::default()))
                }))
            }
        }
    }

    /// Existing session for `connection`; never opens one.
    pub async fn find(&self, connection: ConnectionId) -> Option<SharedSession> {
        match self.mode {
            SessionMode::Single => Some(Arc::clone(&self.single)),
            SessionMode::PerConnection => self.sessions.lock().await.get(&connection).cloned(),
        }
    }

    /// Signing key of an open session. Closed or unknown connections have none.
    pub async fn get_key(&self, connection: ConnectionId) -> Option<RedactedSecret> {
        let session = self.find(connection).await?;
        let key = session.read().await.key.clone();
        key
    }

    /// Forget the session; the single session is reset instead of removed.
    pub async fn close_session(&self, connection: ConnectionId) {
        match self.mode {
            SessionMode::Single => self.single.write().await.clear(),
            SessionMode::PerConnection => {
                if self.sessions.lock().await.remove(&connection).is_some() {
                    debug!("{connection} session closed");
                }
            }
        }
    }

    pub async fn open_sessions(&self) -> usize {
        match self.mode {
            SessionMode::Single => 1,
            SessionMode::PerConnection => self.sessions.lock().await.len(),
        }
    }
}
