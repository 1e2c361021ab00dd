//! HTTP Client für das Backend-API
//!
//! Alle Endpunkte liegen unter `/api/v1`. Nach dem Login wird das
//! Access-Token als Bearer-Header an jede Anfrage gehängt.

use super::messages::*;
use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not authenticated. Please log in.")]
    NotAuthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

// ============================================================================
// API CLIENT
// ============================================================================

/// REST Client für Auth- und Video-Endpunkte
pub struct ApiClient {
    base_url: String,
    access_token: RwLock<Option<String>>,
    http: Client,
}

impl ApiClient {
    /// Erstellt einen neuen ApiClient
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: RwLock::new(None),
            http,
        })
    }

    /// Setzt das Bearer-Token (z.B. aus einer gespeicherten Session)
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.read().is_some()
    }

    // ========================================================================
    // AUTH
    // ========================================================================

    /// Meldet den Benutzer an und speichert das Access-Token
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.post("/api/v1/auth/login").json(&body).send().await?;
        let session: AuthSession = parse_json(response).await?;

        tracing::info!("Logged in as {} ({})", session.user.username, session.user.id);
        self.set_access_token(Some(session.access_token.clone()));
        Ok(session)
    }

    /// Registriert einen neuen Benutzer und speichert das Access-Token
    pub async fn register(
        &self,
        email: &str,
        username: &str,
        password: &str,
    ) -> Result<AuthSession, ApiError> {
        let body = RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        let response = self.post("/api/v1/auth/register").json(&body).send().await?;
        let session: AuthSession = parse_json(response).await?;

        tracing::info!("Registered {} ({})", session.user.username, session.user.id);
        self.set_access_token(Some(session.access_token.clone()));
        Ok(session)
    }

    /// Holt ein neues Access-Token mit dem Refresh-Token und gibt es zurück
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self.post("/api/v1/auth/refresh").json(&body).send().await?;
        let refreshed: RefreshResponse = parse_json(response).await?;

        tracing::debug!("Access token refreshed");
        self.set_access_token(Some(refreshed.access_token.clone()));
        Ok(refreshed.access_token)
    }

    /// Gibt den angemeldeten Benutzer zurück
    pub async fn me(&self) -> Result<CurrentUser, ApiError> {
        let response = self.get("/api/v1/auth/me").send().await?;
        parse_json(response).await
    }

    /// Meldet lokal ab (das Backend hält keine Session)
    pub fn logout(&self) {
        self.set_access_token(None);
    }

    // ========================================================================
    // VIDEO
    // ========================================================================

    /// Fordert ein Video-Token für (Channel, Benutzer) an
    pub async fn request_video_token(
        &self,
        channel_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<VideoTokenResponse, ApiError> {
        let body = VideoTokenRequest {
            channel_id: channel_id.to_string(),
            user_id: user_id.to_string(),
            username: username.to_string(),
        };
        let response = self.post("/api/v1/video/token").json(&body).send().await?;
        let token: VideoTokenResponse = parse_json(response).await?;

        if token.token.is_empty() {
            return Err(ApiError::InvalidResponse("empty video token".to_string()));
        }

        Ok(token)
    }

    /// Legt den Raum für einen Channel an
    pub async fn create_room(&self, channel_id: &str, name: &str) -> Result<RoomStatus, ApiError> {
        let body = RoomRequest {
            channel_id: channel_id.to_string(),
            name: name.to_string(),
        };
        let response = self.post("/api/v1/video/room").json(&body).send().await?;
        parse_json(response).await
    }

    /// Löscht den Raum eines Channels
    pub async fn delete_room(&self, channel_id: &str) -> Result<RoomStatus, ApiError> {
        let path = format!("/api/v1/video/room/{}", channel_id);
        let response = self.delete(&path).send().await?;
        parse_json(response).await
    }

    /// Gibt die Teilnehmer im Raum eines Channels zurück
    pub async fn room_participants(&self, channel_id: &str) -> Result<RoomParticipants, ApiError> {
        let path = format!("/api/v1/video/room/{}/participants", channel_id);
        let response = self.get(&path).send().await?;
        parse_json(response).await
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    fn get(&self, path: &str) -> RequestBuilder {
        self.apply_auth(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.apply_auth(self.http.post(self.url(path)))
    }

    fn delete(&self, path: &str) -> RequestBuilder {
        self.apply_auth(self.http.delete(self.url(path)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.access_token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// Mappt HTTP-Status auf ApiError und parst den Body
async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await?;
        return serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::NotAuthenticated,
        StatusCode::FORBIDDEN => ApiError::Forbidden(body),
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        _ => ApiError::Server {
            status: status.as_u16(),
            body,
        },
    })
}

// ============================================================================
// TESTS
// ============================================================================
