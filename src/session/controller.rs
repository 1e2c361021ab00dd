//! Call Session Controller
//!
//! Führt einen Client durch den Beitritt zu einem Audio/Video-Raum:
//! Capability-Probe → Permission-Probe → Credential → Raum-Verbindung.
//!
//! Jeder Versuch hat eine eigene Attempt-ID. Ergebnisse von Netzwerk-
//! Aufrufen und Transport-Events werden verworfen, sobald die ID nicht
//! mehr aktuell ist (Retry, Bypass, Leave, Restart).

use super::ports::{
    ConnectRequest, MediaRequest, SessionPorts, TransientStream, TransportEvent,
};
use super::state::{
    classify_transport_error, CallSessionState, MediaMode, PermissionOutcome,
    SessionCredential, SessionErrorReason, SessionEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Cannot {operation} while {state}")]
    InvalidTransition {
        operation: &'static str,
        state: &'static str,
    },
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Zeitlimits einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub credential_timeout: Duration,
    pub connect_timeout: Duration,
    pub leave_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            credential_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(20),
            leave_timeout: Duration::from_secs(5),
        }
    }
}

/// Der angemeldete Benutzer, explizit an die Session übergeben
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
}

impl SessionUser {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
        }
    }
}

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Debug)]
struct SessionInner {
    state: CallSessionState,
    attempt: u64,
    started: bool,
    join_without_media: bool,
    credential: Option<SessionCredential>,
    /// Transport wurde in diesem Versuch angesprochen
    room_entered: bool,
    listener: Option<JoinHandle<()>>,
}

impl SessionInner {
    /// Beginnt einen neuen Versuch und verwirft alles Versuchs-gebundene
    fn next_attempt(&mut self) -> (u64, bool) {
        self.attempt += 1;
        self.credential = None;
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        let needs_disconnect = std::mem::take(&mut self.room_entered);
        (self.attempt, needs_disconnect)
    }
}

struct Shared {
    id: Uuid,
    inner: Mutex<SessionInner>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn is_current(&self, attempt: u64) -> bool {
        self.inner.lock().attempt == attempt
    }

    /// Setzt den State, falls der Versuch noch aktuell ist
    fn transition(&self, attempt: u64, new_state: CallSessionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt {
            tracing::debug!(
                session = %self.id,
                attempt,
                "Discarding stale transition to {}",
                new_state
            );
            return false;
        }
        self.set_state_locked(&mut inner, new_state);
        true
    }

    /// Wechselt nach Errored und beendet das Transport-Abo
    fn fail(&self, attempt: u64, reason: SessionErrorReason, abort_listener: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt {
            tracing::debug!(session = %self.id, attempt, "Discarding stale failure: {:?}", reason);
            return false;
        }
        if abort_listener {
            if let Some(listener) = inner.listener.take() {
                listener.abort();
            }
        }
        tracing::warn!(session = %self.id, attempt, "Call session failed: {:?}", reason);
        self.set_state_locked(&mut inner, CallSessionState::Errored { reason });
        let _ = self.event_tx.send(SessionEvent::Error(reason));
        true
    }

    fn set_state_locked(&self, inner: &mut SessionInner, new_state: CallSessionState) {
        tracing::info!(
            session = %self.id,
            attempt = inner.attempt,
            "Call session state: {} -> {}",
            inner.state,
            new_state
        );
        inner.state = new_state.clone();
        let _ = self.event_tx.send(SessionEvent::StateChanged(new_state));
    }
}

// ============================================================================
// CALL SESSION
// ============================================================================

/// Zustandsmaschine für genau einen Raum-Beitritt pro Instanz
pub struct CallSession {
    shared: Arc<Shared>,
    channel_id: String,
    user: SessionUser,
    ports: SessionPorts,
    config: SessionConfig,
}

impl CallSession {
    /// Erstellt eine neue CallSession im Zustand Initializing
    pub fn new(
        channel_id: impl Into<String>,
        user: SessionUser,
        ports: SessionPorts,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                inner: Mutex::new(SessionInner {
                    state: CallSessionState::Initializing,
                    attempt: 0,
                    started: false,
                    join_without_media: false,
                    credential: None,
                    room_entered: false,
                    listener: None,
                }),
                event_tx,
            }),
            channel_id: channel_id.into(),
            user,
            ports,
            config,
        }
    }

    /// Gibt einen Event-Receiver zurück
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_tx.subscribe()
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Gibt den aktuellen State zurück
    pub fn state(&self) -> CallSessionState {
        self.shared.inner.lock().state.clone()
    }

    /// Ob der Benutzer ohne Medien beigetreten ist (für die UI)
    pub fn join_without_media_enabled(&self) -> bool {
        self.shared.inner.lock().join_without_media
    }

    pub fn attempt(&self) -> u64 {
        self.shared.inner.lock().attempt
    }

    /// Credential des laufenden Versuchs (falls schon erhalten)
    pub fn credential(&self) -> Option<SessionCredential> {
        self.shared.inner.lock().credential.clone()
    }

    /// Startet die Session
    ///
    /// Läuft bis Connecting (Ergebnis kommt als Transport-Event) oder bis
    /// ein blockierender State erreicht ist.
    pub async fn start(&self) -> Result<CallSessionState, SessionError> {
        let attempt = {
            let mut inner = self.shared.inner.lock();
            if inner.started {
                return Err(SessionError::InvalidTransition {
                    operation: "start",
                    state: inner.state.name(),
                });
            }
            inner.started = true;
            inner.next_attempt().0
        };

        tracing::info!(
            session = %self.shared.id,
            channel = %self.channel_id,
            user = %self.user.username,
            "Starting call session"
        );

        Ok(self.run_from_capability_probe(attempt).await)
    }

    /// Tritt ohne Kamera/Mikrofon bei (Credential wird trotzdem geholt)
    pub async fn join_without_media(&self) -> Result<CallSessionState, SessionError> {
        let (attempt, needs_disconnect) = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                CallSessionState::Incompatible { .. }
                | CallSessionState::RequestingPermission
                | CallSessionState::Errored { .. } => {}
                _ => {
                    return Err(SessionError::InvalidTransition {
                        operation: "join without media",
                        state: inner.state.name(),
                    })
                }
            }
            inner.join_without_media = true;
            inner.next_attempt()
        };

        tracing::info!(session = %self.shared.id, attempt, "Joining without media");

        if needs_disconnect {
            self.disconnect_transport().await;
        }

        // Auch ohne Medien den Audio-Kontext entsperren (Wiedergabe)
        self.unlock_audio();

        Ok(self.join_room(attempt, MediaMode::NoMedia).await)
    }

    /// Neuer Versuch ab RequestingPermission
    pub async fn retry(&self) -> Result<CallSessionState, SessionError> {
        let (attempt, needs_disconnect) = {
            let mut inner = self.shared.inner.lock();
            if !matches!(inner.state, CallSessionState::Errored { .. }) {
                return Err(SessionError::InvalidTransition {
                    operation: "retry",
                    state: inner.state.name(),
                });
            }
            inner.join_without_media = false;
            let next = inner.next_attempt();
            self.shared
                .set_state_locked(&mut inner, CallSessionState::RequestingPermission);
            next
        };

        tracing::info!(session = %self.shared.id, attempt, "Retrying call session");

        if needs_disconnect {
            self.disconnect_transport().await;
        }

        Ok(self.run_permission_and_join(attempt).await)
    }

    /// Setzt alle Versuchs-gebundenen Daten zurück und startet neu
    pub async fn restart(&self) -> CallSessionState {
        let (attempt, needs_disconnect) = {
            let mut inner = self.shared.inner.lock();
            inner.started = true;
            inner.join_without_media = false;
            let next = inner.next_attempt();
            self.shared
                .set_state_locked(&mut inner, CallSessionState::Initializing);
            next
        };

        tracing::info!(session = %self.shared.id, attempt, "Restarting call session");

        if needs_disconnect {
            self.disconnect_transport().await;
        }

        self.run_from_capability_probe(attempt).await
    }

    /// Verlässt den Raum
    ///
    /// Der State ist sofort Disconnected; das Trennen des Transports läuft
    /// im Hintergrund und wird nicht abgewartet.
    pub fn leave(&self) -> Result<CallSessionState, SessionError> {
        let needs_disconnect = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                CallSessionState::AwaitingCredential { .. }
                | CallSessionState::Connecting { .. }
                | CallSessionState::Connected { .. } => {}
                _ => {
                    return Err(SessionError::InvalidTransition {
                        operation: "leave",
                        state: inner.state.name(),
                    })
                }
            }
            let (_, needs_disconnect) = inner.next_attempt();
            self.shared
                .set_state_locked(&mut inner, CallSessionState::Disconnected);
            needs_disconnect
        };

        if needs_disconnect {
            let transport = Arc::clone(&self.ports.transport);
            let leave_timeout = self.config.leave_timeout;
            let session_id = self.shared.id;
            tokio::spawn(async move {
                if tokio::time::timeout(leave_timeout, transport.disconnect())
                    .await
                    .is_err()
                {
                    tracing::warn!(session = %session_id, "Transport did not acknowledge disconnect");
                }
            });
        }

        Ok(CallSessionState::Disconnected)
    }

    // ========================================================================
    // PRIVATE METHODS
    // ========================================================================

    async fn run_from_capability_probe(&self, attempt: u64) -> CallSessionState {
        let report = self.ports.capabilities.probe();

        if !report.is_capable() {
            tracing::warn!(
                session = %self.shared.id,
                "Environment is missing capabilities: {:?}",
                report.issues()
            );
            self.shared.transition(
                attempt,
                CallSessionState::Incompatible {
                    issues: report.issues().to_vec(),
                },
            );
            return self.state();
        }

        if !self
            .shared
            .transition(attempt, CallSessionState::RequestingPermission)
        {
            return self.state();
        }

        self.run_permission_and_join(attempt).await
    }

    async fn run_permission_and_join(&self, attempt: u64) -> CallSessionState {
        self.unlock_audio();

        let outcome = self.probe_permission().await;

        if !self.shared.is_current(attempt) {
            tracing::debug!(session = %self.shared.id, attempt, "Discarding stale permission outcome");
            return self.state();
        }

        if let Some(reason) = outcome.error_reason() {
            self.shared.fail(attempt, reason, true);
            return self.state();
        }

        self.join_room(attempt, MediaMode::Full).await
    }

    /// Transiente Permission-Probe; der Stream wird vor jeder weiteren
    /// Transition freigegeben
    async fn probe_permission(&self) -> PermissionOutcome {
        match self
            .ports
            .permissions
            .acquire(MediaRequest::camera_and_microphone())
            .await
        {
            Ok(stream) => {
                TransientStream::new(stream).release();
                tracing::debug!(session = %self.shared.id, "Media permission granted");
                PermissionOutcome::granted()
            }
            Err(failure) => {
                tracing::warn!(session = %self.shared.id, "Media permission error: {}", failure);
                PermissionOutcome::failed(failure)
            }
        }
    }

    /// Best-effort Audio-Unlock; Fehler werden nur geloggt
    fn unlock_audio(&self) {
        let mut context = match self.ports.audio.create() {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Failed to resume AudioContext: {}", e);
                return;
            }
        };

        if context.is_suspended() {
            if let Err(e) = context.resume() {
                tracing::warn!("Failed to resume AudioContext: {}", e);
            }
        }

        if let Err(e) = context.close() {
            tracing::warn!("Failed to close AudioContext: {}", e);
        }
    }

    async fn join_room(&self, attempt: u64, media: MediaMode) -> CallSessionState {
        if !self
            .shared
            .transition(attempt, CallSessionState::AwaitingCredential { media })
        {
            return self.state();
        }

        let request = self.ports.credentials.request(
            &self.channel_id,
            &self.user.id,
            &self.user.username,
        );
        let result = tokio::time::timeout(self.config.credential_timeout, request).await;

        if !self.shared.is_current(attempt) {
            tracing::debug!(session = %self.shared.id, attempt, "Discarding stale credential response");
            return self.state();
        }

        let credential = match result {
            Ok(Ok(credential)) => credential,
            Ok(Err(e)) => {
                tracing::error!(session = %self.shared.id, "Failed to get video token: {}", e);
                self.shared
                    .fail(attempt, SessionErrorReason::CredentialUnavailable, true);
                return self.state();
            }
            Err(_) => {
                tracing::error!(
                    session = %self.shared.id,
                    "Video token request timed out after {:?}",
                    self.config.credential_timeout
                );
                self.shared
                    .fail(attempt, SessionErrorReason::CredentialUnavailable, true);
                return self.state();
            }
        };

        self.connect(attempt, media, credential).await
    }

    async fn connect(
        &self,
        attempt: u64,
        media: MediaMode,
        credential: SessionCredential,
    ) -> CallSessionState {
        let request = ConnectRequest {
            token: credential.token.clone(),
            server_address: credential.server_address.clone(),
            want_video: media.want_video(),
            want_audio: media.want_audio(),
        };

        // Abo vor connect(), damit kein Event verloren geht
        let events = self.ports.transport.subscribe();
        {
            let mut inner = self.shared.inner.lock();
            if inner.attempt != attempt {
                return inner.state.clone();
            }
            inner.credential = Some(credential);
            inner.room_entered = true;
            self.shared
                .set_state_locked(&mut inner, CallSessionState::Connecting { media });
            inner.listener = Some(tokio::spawn(listen_transport(
                Arc::clone(&self.shared),
                Arc::clone(&self.ports.transport),
                attempt,
                media,
                events,
                self.config.connect_timeout,
            )));
        }

        tracing::info!(
            session = %self.shared.id,
            "Connecting to {} (video: {}, audio: {})",
            request.server_address,
            request.want_video,
            request.want_audio
        );

        let result =
            tokio::time::timeout(self.config.connect_timeout, self.ports.transport.connect(request))
                .await;

        let reason = match result {
            Ok(Ok(())) => {
                // leave()/restart() kamen vor der Verbindung; Raum wieder schließen
                if !self.shared.is_current(attempt) {
                    tracing::debug!(
                        session = %self.shared.id,
                        attempt,
                        "Connection finished for stale attempt, disconnecting"
                    );
                    self.spawn_disconnect();
                }
                None
            }
            Ok(Err(e)) => {
                tracing::error!(session = %self.shared.id, "Media room connection error: {}", e);
                Some(classify_transport_error(&e.to_string()))
            }
            Err(_) => {
                tracing::error!(session = %self.shared.id, "Media room connect timed out");
                Some(SessionErrorReason::ConnectionFailed)
            }
        };

        if let Some(reason) = reason {
            if self.shared.fail(attempt, reason, true) {
                self.spawn_disconnect();
            }
        }

        self.state()
    }

    async fn disconnect_transport(&self) {
        if tokio::time::timeout(self.config.leave_timeout, self.ports.transport.disconnect())
            .await
            .is_err()
        {
            tracing::warn!(session = %self.shared.id, "Transport did not acknowledge disconnect");
        }
    }

    fn spawn_disconnect(&self) {
        let transport = Arc::clone(&self.ports.transport);
        let leave_timeout = self.config.leave_timeout;
        tokio::spawn(async move {
            let _ = tokio::time::timeout(leave_timeout, transport.disconnect()).await;
        });
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        // Späte Antworten sollen nichts mehr bewirken
        inner.attempt += 1;
        if let Some(listener) = inner.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("id", &self.shared.id)
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .field("join_without_media", &self.join_without_media_enabled())
            .finish()
    }
}

// ============================================================================
// TRANSPORT LISTENER
// ============================================================================

/// Verarbeitet Transport-Events für genau einen Versuch
async fn listen_transport(
    shared: Arc<Shared>,
    transport: Arc<dyn super::ports::MediaTransport>,
    attempt: u64,
    media: MediaMode,
    mut events: broadcast::Receiver<TransportEvent>,
    connect_timeout: Duration,
) {
    // Ohne darstellbare Deadline wird nur auf Events gewartet
    let deadline = tokio::time::Instant::now().checked_add(connect_timeout);
    let mut connected = false;

    loop {
        let pending_deadline = if connected { None } else { deadline };
        let next = match pending_deadline {
            None => events.recv().await,
            Some(deadline) => match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::error!(session = %shared.id, "Timed out waiting for media room");
                    if shared.fail(attempt, SessionErrorReason::ConnectionFailed, false) {
                        let _ = tokio::time::timeout(connect_timeout, transport.disconnect()).await;
                    }
                    break;
                }
            },
        };

        match next {
            Ok(TransportEvent::Connected) => {
                if connected {
                    continue;
                }
                if !shared.transition(attempt, CallSessionState::Connected { media }) {
                    break;
                }
                connected = true;
            }
            Ok(TransportEvent::Disconnected) => {
                tracing::info!(session = %shared.id, "Media room disconnected");
                shared.transition(attempt, CallSessionState::Disconnected);
                break;
            }
            Ok(TransportEvent::Error(details)) => {
                tracing::error!(session = %shared.id, "Media room connection error: {}", details);
                let reason = classify_transport_error(&details);
                if shared.fail(attempt, reason, false) {
                    let _ = tokio::time::timeout(connect_timeout, transport.disconnect()).await;
                }
                break;
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(session = %shared.id, "Missed {} transport events", skipped);
            }
            Err(RecvError::Closed) => {
                shared.transition(attempt, CallSessionState::Disconnected);
                break;
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
