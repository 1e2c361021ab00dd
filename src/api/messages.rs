//! Message Types für das Backend-API
//!
//! Diese Strukturen spiegeln die JSON-Bodies der `/api/v1` Endpunkte
//! wider und ermöglichen typsichere Kommunikation.

use crate::session::SessionUser;
use serde::{Deserialize, Serialize};

// ============================================================================
// CLIENT → SERVER
// ============================================================================

/// Login mit E-Mail und Passwort
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Neuen Benutzer registrieren
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Access-Token erneuern
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Video-Token für einen Channel anfordern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTokenRequest {
    pub channel_id: String,
    pub user_id: String,
    pub username: String,
}

/// Raum für einen Channel anlegen
#[derive(Debug, Clone, Serialize)]
pub struct RoomRequest {
    pub channel_id: String,
    pub name: String,
}

// ============================================================================
// SERVER → CLIENT
// ============================================================================

/// Der angemeldete Benutzer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    #[serde(alias = "_id")]
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl From<CurrentUser> for SessionUser {
    fn from(user: CurrentUser) -> Self {
        SessionUser::new(user.id, user.username)
    }
}

/// Antwort auf Login und Registrierung
#[derive(Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: CurrentUser,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token_type", &self.token_type)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Antwort auf Token-Refresh
#[derive(Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Antwort auf `/video/token`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoTokenResponse {
    pub token: String,
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl std::fmt::Debug for VideoTokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoTokenResponse")
            .field("room_name", &self.room_name)
            .field("identity", &self.identity)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Status nach Anlegen oder Löschen eines Raums
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomStatus {
    pub room_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub deleted_by: Option<String>,
    pub status: String,
}

/// Ein Teilnehmer im Raum
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Participant {
    pub identity: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Teilnehmerliste eines Raums
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RoomParticipants {
    pub room_name: String,
    pub channel_id: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_accepts_mongo_id() {
        let user: CurrentUser = serde_json::from_value(serde_json::json!({
            "_id": "64f0",
            "email": "alice@example.com",
            "username": "alice"
        }))
        .unwrap();
        assert_eq!(user.id, "64f0");
        assert_eq!(user.avatar, None);

        let session_user: SessionUser = user.into();
        assert_eq!(session_user.username, "alice");
    }

    #[test]
    fn test_auth_session_debug_hides_tokens() {
        let session: AuthSession = serde_json::from_value(serde_json::json!({
            "access_token": "acc-123",
            "refresh_token": "ref-456",
            "user": {"id": "u1", "email": "a@b.c", "username": "a"}
        }))
        .unwrap();
        assert_eq!(session.token_type, "bearer");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("acc-123"));
        assert!(!debug.contains("ref-456"));
    }
}
