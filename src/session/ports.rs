//! Schnittstellen zu den externen Kollaborateuren der CallSession
//!
//! Capability-Probe, Permission-Probe, Audio-Unlock, Credential-Service
//! und Media-Transport werden nur über diese Traits angesprochen.

use super::state::{CapabilityReport, PermissionFailure, SessionCredential};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Credential request failed: {0}")]
    RequestFailed(String),

    #[error("Credential request was rejected: {0}")]
    Rejected(String),

    #[error("Credential response invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport already connected")]
    AlreadyConnected,
}

#[derive(Error, Debug, Clone)]
pub enum AudioUnlockError {
    #[error("Audio context unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to resume audio context: {0}")]
    Resume(String),

    #[error("Failed to close audio context: {0}")]
    Close(String),
}

// ============================================================================
// CAPABILITY PROBE
// ============================================================================

/// Prüft synchron, ob die Umgebung die benötigten Medien-APIs hat
pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> CapabilityReport;
}

// ============================================================================
// PERMISSION PROBE
// ============================================================================

/// Welche Geräte bei der Permission-Probe angefragt werden
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRequest {
    pub video: bool,
    pub audio: bool,
}

impl MediaRequest {
    pub fn camera_and_microphone() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

/// Ein geöffneter Aufnahme-Stream
pub trait CapturedStream: Send {
    /// Stoppt alle Tracks des Streams
    fn stop(&mut self);
}

/// Fragt transienten Zugriff auf Kamera und Mikrofon an
#[async_trait]
pub trait PermissionProbe: Send + Sync {
    async fn acquire(
        &self,
        request: MediaRequest,
    ) -> Result<Box<dyn CapturedStream>, PermissionFailure>;
}

/// Besitzt einen Probe-Stream und stoppt ihn spätestens beim Drop
pub struct TransientStream {
    stream: Option<Box<dyn CapturedStream>>,
}

impl TransientStream {
    pub fn new(stream: Box<dyn CapturedStream>) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Gibt den Stream sofort frei
    pub fn release(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
    }
}

impl Drop for TransientStream {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

// ============================================================================
// AUDIO UNLOCK
// ============================================================================

/// Ein transienter Audio-Verarbeitungskontext
pub trait AudioContextHandle: Send {
    fn is_suspended(&self) -> bool;
    fn resume(&mut self) -> Result<(), AudioUnlockError>;
    fn close(&mut self) -> Result<(), AudioUnlockError>;
}

/// Erstellt Audio-Kontexte für den Audio-Unlock
pub trait AudioContextFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn AudioContextHandle>, AudioUnlockError>;
}

// ============================================================================
// CREDENTIAL SERVICE
// ============================================================================

#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn request(
        &self,
        channel_id: &str,
        user_id: &str,
        username: &str,
    ) -> Result<SessionCredential, CredentialError>;
}

// ============================================================================
// MEDIA TRANSPORT
// ============================================================================

/// Parameter für den Raum-Beitritt
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub token: String,
    pub server_address: String,
    pub want_video: bool,
    pub want_audio: bool,
}

impl std::fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("server_address", &self.server_address)
            .field("want_video", &self.want_video)
            .field("want_audio", &self.want_audio)
            .finish()
    }
}

/// Events die der Media-Transport auslöst
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected,
    Error(String),
}

#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Gibt einen Event-Receiver zurück
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    /// Startet den Verbindungsaufbau; das Ergebnis kommt als Event
    async fn connect(&self, request: ConnectRequest) -> Result<(), TransportError>;

    /// Trennt die Verbindung (idempotent)
    async fn disconnect(&self);
}

// ============================================================================
// PORT BUNDLE
// ============================================================================

/// Alle Kollaborateure einer CallSession
#[derive(Clone)]
pub struct SessionPorts {
    pub capabilities: Arc<dyn CapabilityProbe>,
    pub permissions: Arc<dyn PermissionProbe>,
    pub audio: Arc<dyn AudioContextFactory>,
    pub credentials: Arc<dyn CredentialService>,
    pub transport: Arc<dyn MediaTransport>,
}

impl std::fmt::Debug for SessionPorts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPorts").finish_non_exhaustive()
    }
}
