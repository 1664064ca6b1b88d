// resident-app/src/session.rs
//
// Owns the authenticated/unauthenticated state machine: the credential
// slot, the token store, and the one realtime channel of the process.
// Every other component only reads the credential or subscribes to the
// channel; none of them touch its lifecycle.
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use common::backend::BackendClient;
use common::config::Config;
use common::error::ApiError;
use common::models::resident::LoginResponse;
use common::models::session::CredentialSlot;
use common::realtime::RealtimeChannel;

use crate::session_store::{SessionStore, StoreError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("could not persist the session credential: {0}")]
    Storage(#[from] StoreError),
    #[error("login response did not include a token")]
    MalformedResponse,
}

pub struct SessionController {
    realtime_url: String,
    backend: BackendClient,
    credential: CredentialSlot,
    store: Arc<dyn SessionStore>,
    channel: Mutex<Option<Arc<RealtimeChannel>>>,
}

impl SessionController {
    pub fn new(config: &Config, store: Arc<dyn SessionStore>) -> Self {
        let credential = CredentialSlot::new();
        let backend = BackendClient::new(config, credential.clone());
        Self {
            realtime_url: config.realtime_url.clone(),
            backend,
            credential,
            store,
            channel: Mutex::new(None),
        }
    }

    /// REST client sharing this session's credential
    pub fn backend(&self) -> BackendClient {
        self.backend.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_present()
    }

    /// The live realtime channel, if a session is active
    pub async fn channel(&self) -> Option<Arc<RealtimeChannel>> {
        self.channel.lock().await.clone()
    }

    /// Log in with flat number and password. On success the credential is
    /// persisted, the slot is filled and the realtime channel opened; on
    /// any failure nothing changes: no stored credential, no channel.
    pub async fn sign_in(&self, flat_number: &str, password: &str) -> Result<String, AuthError> {
        let value = self
            .backend
            .post(
                "/api/resident/login",
                &json!({ "flat_number": flat_number, "password": password }),
            )
            .await?;
        let response: LoginResponse =
            serde_json::from_value(value).map_err(|_| AuthError::MalformedResponse)?;

        self.store.save(&response.token)?;
        self.credential.set(response.token.clone());
        self.open_channel().await;

        tracing::info!("signed in as {}", response.name);
        Ok(response.token)
    }

    /// Close the channel, clear the stored credential, return to the
    /// unauthenticated state. Idempotent: calling it again, or when
    /// already signed out, does nothing.
    pub async fn sign_out(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
        if let Err(err) = self.store.clear() {
            tracing::warn!("failed to clear stored credential: {}", err);
        }
        self.credential.clear();
    }

    /// Optimistic restore at process start: a stored credential is
    /// trusted without a network round trip. A stale or revoked token is
    /// only discovered when the first authenticated call comes back
    /// `AuthExpired`, at which point `handle_auth_expired` signs out.
    pub async fn restore_session(&self) -> bool {
        let stored = match self.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("could not read stored credential: {}", err);
                None
            }
        };
        match stored {
            Some(token) => {
                self.credential.set(token);
                self.open_channel().await;
                tracing::info!("restored stored session");
                true
            }
            None => false,
        }
    }

    /// The backend rejected the bearer credential: the session is over
    pub async fn handle_auth_expired(&self) {
        tracing::info!("stored session rejected by the backend, signing out");
        self.sign_out().await;
    }

    async fn open_channel(&self) {
        let mut guard = self.channel.lock().await;
        if let Some(previous) = guard.take() {
            // Exactly one channel per session; never leak the old one.
            previous.close().await;
        }
        *guard = Some(Arc::new(RealtimeChannel::open(&self.realtime_url)));
    }
}
