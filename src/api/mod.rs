//! API Module - REST Client für das Chat-Backend
//!
//! Dieses Modul verwaltet die Kommunikation mit dem Backend:
//! - Login, Registrierung und Token-Refresh
//! - Video-Token für einen Channel anfordern
//! - Raum-Verwaltung (anlegen, löschen, Teilnehmer)

mod client;
mod credentials;
mod messages;

pub use client::{ApiClient, ApiError};
pub use credentials::ApiCredentialService;
pub use messages::*;
