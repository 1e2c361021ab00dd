//! Session-Zustände und Fehler-Taxonomie
//!
//! Alle Typen, die der Call Session Controller nach außen gibt:
//! Zustände, Fehlergründe (inkl. der exakten UI-Texte) und die
//! Ergebnisse der Capability- und Permission-Probes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// CAPABILITY REPORT
// ============================================================================

/// Eine fehlende Fähigkeit der Laufzeitumgebung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingCapability {
    /// Geräte-Enumeration fehlt komplett
    MediaDevices,
    /// Aufnahme (Mikrofon/Kamera) nicht möglich
    MediaCapture,
    /// Kein Audio-Kontext für Wiedergabe verfügbar
    AudioContext,
}

impl MissingCapability {
    pub fn description(&self) -> &'static str {
        match self {
            MissingCapability::MediaDevices => "Media devices not supported",
            MissingCapability::MediaCapture => "getUserMedia not supported",
            MissingCapability::AudioContext => "AudioContext not supported",
        }
    }
}

impl fmt::Display for MissingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Ergebnis der Capability-Probe (geordnet, leer = alles vorhanden)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    issues: Vec<MissingCapability>,
}

impl CapabilityReport {
    pub fn capable() -> Self {
        Self::default()
    }

    pub fn with_issues(issues: Vec<MissingCapability>) -> Self {
        let mut deduped: Vec<MissingCapability> = Vec::with_capacity(issues.len());
        for issue in issues {
            if !deduped.contains(&issue) {
                deduped.push(issue);
            }
        }
        Self { issues: deduped }
    }

    pub fn is_capable(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues(&self) -> &[MissingCapability] {
        &self.issues
    }
}

// ============================================================================
// PERMISSION OUTCOME
// ============================================================================

/// Klassifizierter Fehler einer Permission-Probe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionFailure {
    #[error("Permission denied")]
    Denied,

    #[error("No capture device found")]
    NoDevice,

    #[error("Capture not supported on this platform")]
    Unsupported,

    #[error("Capture failed: {0}")]
    Other(String),
}

/// Ergebnis einer einzelnen Permission-Anfrage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOutcome {
    pub granted: bool,
    pub failure: Option<PermissionFailure>,
}

impl PermissionOutcome {
    pub fn granted() -> Self {
        Self {
            granted: true,
            failure: None,
        }
    }

    pub fn failed(failure: PermissionFailure) -> Self {
        Self {
            granted: false,
            failure: Some(failure),
        }
    }

    /// Fehlergrund für den Errored-State (None wenn erteilt)
    pub fn error_reason(&self) -> Option<SessionErrorReason> {
        self.failure.as_ref().map(|failure| match failure {
            PermissionFailure::Denied => SessionErrorReason::PermissionDenied,
            PermissionFailure::NoDevice => SessionErrorReason::NoCaptureDevice,
            PermissionFailure::Unsupported => SessionErrorReason::CaptureUnsupported,
            PermissionFailure::Other(_) => SessionErrorReason::PermissionFailed,
        })
    }
}

// ============================================================================
// SESSION CREDENTIAL
// ============================================================================

/// Zugangstoken + Server-Adresse für genau einen Session-Versuch
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub token: String,
    pub server_address: String,
    pub room_name: Option<String>,
    pub identity: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(token: impl Into<String>, server_address: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            server_address: server_address.into(),
            room_name: None,
            identity: None,
            issued_at: Utc::now(),
        }
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("token", &"<redacted>")
            .field("server_address", &self.server_address)
            .field("room_name", &self.room_name)
            .field("identity", &self.identity)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

// ============================================================================
// CALL SESSION STATE
// ============================================================================

/// Ob mit Kamera/Mikrofon oder ohne Medien beigetreten wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaMode {
    Full,
    NoMedia,
}

impl MediaMode {
    pub fn want_video(&self) -> bool {
        matches!(self, MediaMode::Full)
    }

    pub fn want_audio(&self) -> bool {
        matches!(self, MediaMode::Full)
    }
}

/// Aktuelle Phase einer Call-Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSessionState {
    /// Capability-Probe läuft
    Initializing,
    /// Umgebung unterstützt keine Medien (wartet auf Bypass oder Zurück)
    Incompatible { issues: Vec<MissingCapability> },
    /// Kamera/Mikrofon-Zugriff wird angefragt
    RequestingPermission,
    /// Credential wird vom Backend geholt
    AwaitingCredential { media: MediaMode },
    /// Transport verbindet sich mit dem Raum
    Connecting { media: MediaMode },
    /// Im Raum
    Connected { media: MediaMode },
    /// Fehler mit Grund, wartet auf Retry oder Bypass
    Errored { reason: SessionErrorReason },
    /// Session beendet
    Disconnected,
}

impl CallSessionState {
    pub fn name(&self) -> &'static str {
        match self {
            CallSessionState::Initializing => "initializing",
            CallSessionState::Incompatible { .. } => "incompatible",
            CallSessionState::RequestingPermission => "requesting_permission",
            CallSessionState::AwaitingCredential { .. } => "awaiting_credential",
            CallSessionState::Connecting { .. } => "connecting",
            CallSessionState::Connected { .. } => "connected",
            CallSessionState::Errored { .. } => "errored",
            CallSessionState::Disconnected => "disconnected",
        }
    }

    pub fn error_reason(&self) -> Option<SessionErrorReason> {
        match self {
            CallSessionState::Errored { reason } => Some(*reason),
            _ => None,
        }
    }
}

impl fmt::Display for CallSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ERROR REASONS
// ============================================================================

/// Grund für den Errored-State. Die UI verzweigt auf diese Varianten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionErrorReason {
    PermissionDenied,
    NoCaptureDevice,
    CaptureUnsupported,
    PermissionFailed,
    CredentialUnavailable,
    MediaDeviceStartFailure,
    AudioPermissionRevoked,
    DeviceBusy,
    ConnectionFailed,
}

impl SessionErrorReason {
    /// Text, der dem Benutzer angezeigt wird
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionErrorReason::PermissionDenied => {
                "Camera and microphone access is required to join the call. Please allow permissions and try again."
            }
            SessionErrorReason::NoCaptureDevice => {
                "No camera or microphone found. Please connect a device and try again."
            }
            SessionErrorReason::CaptureUnsupported => {
                "Your browser does not support video calling. Please try a different browser."
            }
            SessionErrorReason::PermissionFailed => {
                "Failed to access camera and microphone. Please check your device settings."
            }
            SessionErrorReason::CredentialUnavailable => "Failed to join call. Please try again.",
            SessionErrorReason::MediaDeviceStartFailure => {
                "Failed to access camera or microphone. Please check your device permissions and try again."
            }
            SessionErrorReason::AudioPermissionRevoked => {
                "Audio access is required. Please allow microphone permissions and try again."
            }
            SessionErrorReason::DeviceBusy => {
                "Camera or microphone is already in use by another application. Please close other apps and try again."
            }
            SessionErrorReason::ConnectionFailed => {
                "Connection failed. Please check your internet connection and try again."
            }
        }
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            SessionErrorReason::MediaDeviceStartFailure
                | SessionErrorReason::AudioPermissionRevoked
                | SessionErrorReason::DeviceBusy
                | SessionErrorReason::ConnectionFailed
        )
    }
}

impl fmt::Display for SessionErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.user_message())
    }
}

/// Ordnet eine Fehlermeldung des Transports einem Fehlergrund zu
pub fn classify_transport_error(details: &str) -> SessionErrorReason {
    if details.contains("Could not start video source")
        || details.contains("Could not start audio source")
    {
        SessionErrorReason::MediaDeviceStartFailure
    } else if details.contains("AudioContext was not allowed to start") {
        SessionErrorReason::AudioPermissionRevoked
    } else if details.contains("NotReadableError") {
        SessionErrorReason::DeviceBusy
    } else {
        SessionErrorReason::ConnectionFailed
    }
}

// ============================================================================
// SESSION EVENTS
// ============================================================================

/// Events die von der CallSession ausgelöst werden
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(CallSessionState),
    Error(SessionErrorReason),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_device_start_failures() {
        assert_eq!(
            classify_transport_error("NotAllowed: Could not start video source"),
            SessionErrorReason::MediaDeviceStartFailure
        );
        assert_eq!(
            classify_transport_error("Could not start audio source"),
            SessionErrorReason::MediaDeviceStartFailure
        );
    }

    #[test]
    fn test_classify_audio_and_busy() {
        assert_eq!(
            classify_transport_error("The AudioContext was not allowed to start."),
            SessionErrorReason::AudioPermissionRevoked
        );
        assert_eq!(
            classify_transport_error("NotReadableError: device in use"),
            SessionErrorReason::DeviceBusy
        );
    }

    #[test]
    fn test_classify_first_match_wins() {
        // Video-Quelle hat Vorrang vor NotReadableError
        assert_eq!(
            classify_transport_error("NotReadableError: Could not start video source"),
            SessionErrorReason::MediaDeviceStartFailure
        );
        assert_eq!(
            classify_transport_error("websocket closed: 1006"),
            SessionErrorReason::ConnectionFailed
        );
        assert_eq!(classify_transport_error(""), SessionErrorReason::ConnectionFailed);
    }

    #[test]
    fn test_permission_outcome_reasons() {
        assert_eq!(PermissionOutcome::granted().error_reason(), None);
        assert_eq!(
            PermissionOutcome::failed(PermissionFailure::Denied).error_reason(),
            Some(SessionErrorReason::PermissionDenied)
        );
        assert_eq!(
            PermissionOutcome::failed(PermissionFailure::NoDevice).error_reason(),
            Some(SessionErrorReason::NoCaptureDevice)
        );
        assert_eq!(
            PermissionOutcome::failed(PermissionFailure::Unsupported).error_reason(),
            Some(SessionErrorReason::CaptureUnsupported)
        );
        assert_eq!(
            PermissionOutcome::failed(PermissionFailure::Other("x".into())).error_reason(),
            Some(SessionErrorReason::PermissionFailed)
        );
    }

    #[test]
    fn test_every_reason_has_distinct_message() {
        let reasons = [
            SessionErrorReason::PermissionDenied,
            SessionErrorReason::NoCaptureDevice,
            SessionErrorReason::CaptureUnsupported,
            SessionErrorReason::PermissionFailed,
            SessionErrorReason::CredentialUnavailable,
            SessionErrorReason::MediaDeviceStartFailure,
            SessionErrorReason::AudioPermissionRevoked,
            SessionErrorReason::DeviceBusy,
            SessionErrorReason::ConnectionFailed,
        ];
        let mut messages: Vec<_> = reasons.iter().map(|r| r.user_message()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), reasons.len());
    }

    #[test]
    fn test_capability_report_keeps_order_and_dedups() {
        let report = CapabilityReport::with_issues(vec![
            MissingCapability::MediaCapture,
            MissingCapability::MediaDevices,
            MissingCapability::MediaCapture,
        ]);
        assert!(!report.is_capable());
        assert_eq!(
            report.issues(),
            &[MissingCapability::MediaCapture, MissingCapability::MediaDevices]
        );
        assert!(CapabilityReport::capable().is_capable());
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = SessionCredential::new("secret-token", "wss://x");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("wss://x"));
    }

    #[test]
    fn test_capability_descriptions() {
        assert_eq!(
            MissingCapability::MediaDevices.description(),
            "Media devices not supported"
        );
        assert_eq!(
            MissingCapability::MediaCapture.to_string(),
            "getUserMedia not supported"
        );
        assert_eq!(
            MissingCapability::AudioContext.description(),
            "AudioContext not supported"
        );
    }

    #[test]
    fn test_transport_failures_are_separated_from_setup_failures() {
        for reason in [
            SessionErrorReason::MediaDeviceStartFailure,
            SessionErrorReason::AudioPermissionRevoked,
            SessionErrorReason::DeviceBusy,
            SessionErrorReason::ConnectionFailed,
        ] {
            assert!(reason.is_transport_failure(), "{reason:?}");
        }
        for reason in [
            SessionErrorReason::PermissionDenied,
            SessionErrorReason::NoCaptureDevice,
            SessionErrorReason::CaptureUnsupported,
            SessionErrorReason::PermissionFailed,
            SessionErrorReason::CredentialUnavailable,
        ] {
            assert!(!reason.is_transport_failure(), "{reason:?}");
        }
    }

    #[test]
    fn test_media_mode_flags() {
        assert!(MediaMode::Full.want_audio() && MediaMode::Full.want_video());
        assert!(!MediaMode::NoMedia.want_audio() && !MediaMode::NoMedia.want_video());
    }
}
