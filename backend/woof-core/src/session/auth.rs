//! Authentication backend seam.
//!
//! The server asks the backend three questions while processing a sign-in:
//! which user owns the API key, which secret signs for it, and which client
//! the user belongs to. A `None` answer is a denial, an `Err` is an outage.

use crate::error::auth::AuthBackendError;

use common::RedactedSecret;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    pub user_id: String,
    pub name: String,
    pub client_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiClient {
    pub client_id: String,
    pub name: String,
}

#[async_trait]
pub trait AuthenticationBackend: Send + Sync {
    async fn get_key_for_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<RedactedSecret>, AuthBackendError>;

    async fn get_client_by_id(&self, client_id: &str)
    -> Result<Option<ApiClient>, AuthBackendError>;

    async fn get_user_for_api_key(&self, api_key: &str)
    -> Result<Option<ApiUser>, AuthBackendError>;
}

/// In-memory credential table.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthBackend {
    keys: HashMap<String, RedactedSecret>,
    users: HashMap<String, ApiUser>,
    clients: HashMap<String, ApiClient>,
}

impl StaticAuthBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `api_key`, signed with `secret`, to `user`.
    pub fn with_credential(
        mut self,
        api_key: impl Into<String>,
        secret: RedactedSecret,
        user: ApiUser,
    ) -> Self {
        let api_key = api_key.into();
        self.keys.insert(api_key.clone(), secret);
        self.users.insert(api_key, user);
        self
    }

    pub fn with_client(mut self, client: ApiClient) -> Self {
        self.clients.insert(client.client_id.clone(), client);
        self
    }

    pub fn credential_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl AuthenticationBackend for StaticAuthBackend {
    async fn get_key_for_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<RedactedSecret>, AuthBackendError> {
        Ok(self.keys.get(api_key).cloned())
    }

    async fn get_client_by_id(
        &self,
        client_id: &str,
    ) -> Result<Option<ApiClient>, AuthBackendError> {
        Ok(self.clients.get(client_id).cloned())
    }

    async fn get_user_for_api_key(
        &self,
        api_key: &str,
    ) -> Result<Option<ApiUser>, AuthBackendError> {
        Ok(self.users.get(api_key).cloned())
    }
}
