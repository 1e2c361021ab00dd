//! Session Module - Call Session Controller
//!
//! Dieses Modul verwaltet den Beitritt zu einem Video-Call:
//! - Capability-Probe der Umgebung
//! - Transiente Kamera/Mikrofon-Permission-Probe
//! - Credential-Anfrage beim Backend
//! - Verbindung zum Media-Raum und Fehlerklassifizierung

mod controller;
#[cfg(test)]
mod fakes;
mod ports;
mod state;

pub use controller::{CallSession, SessionConfig, SessionError, SessionUser};
pub use ports::{
    AudioContextFactory, AudioContextHandle, AudioUnlockError, CapabilityProbe, CapturedStream,
    ConnectRequest, CredentialError, CredentialService, MediaRequest, MediaTransport,
    PermissionProbe, SessionPorts, TransientStream, TransportError, TransportEvent,
};
pub use state::{
    classify_transport_error, CallSessionState, CapabilityReport, MediaMode, MissingCapability,
    PermissionFailure, PermissionOutcome, SessionCredential, SessionErrorReason, SessionEvent,
};
