//! CredentialService auf Basis des Backend-API
//!
//! Der Token-Endpunkt liefert keine Server-Adresse; diese kommt aus der
//! Konfiguration.

use super::client::{ApiClient, ApiError};
use crate::session::{CredentialError, CredentialService, SessionCredential};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

pub struct ApiCredentialService {
    client: Arc<ApiClient>,
    media_server_url: String,
}

impl ApiCredentialService {
    pub fn new(client: Arc<ApiClient>, media_server_url: impl Into<String>) -> Self {
        Self {
            client,
            media_server_url: media_server_url.into(),
        }
    }
}

#[async_trait]
impl CredentialService for ApiCredentialService {
    async fn request(
        &self,
        channel_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<SessionCredential, CredentialError> {
        tracing::debug!("Requesting video token for channel {}", channel_id);

        let response = self
            .client
            .request_video_token(channel_id, user_id, username)
            .await
            .map_err(|e| match e {
                ApiError::NotAuthenticated | ApiError::Forbidden(_) => {
                    CredentialError::Rejected(e.to_string())
                }
                ApiError::InvalidResponse(message) => CredentialError::InvalidResponse(message),
                other => CredentialError::RequestFailed(other.to_string()),
            })?;

        Ok(SessionCredential {
            token: response.token,
            server_address: self.media_server_url.clone(),
            room_name: response.room_name,
            identity: response.identity,
            issued_at: Utc::now(),
        })
    }
}
