//! Test-Doubles für die Session-Ports

use super::ports::*;
use super::state::{CapabilityReport, MissingCapability, PermissionFailure, SessionCredential};
use super::CallSessionState;
use super::CallSession;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

// ============================================================================
// CAPABILITIES
// ============================================================================

#[derive(Default)]
pub struct FakeCapabilities {
    missing: Vec<MissingCapability>,
}

impl CapabilityProbe for FakeCapabilities {
    fn probe(&self) -> CapabilityReport {
        CapabilityReport::with_issues(self.missing.clone())
    }
}

// ============================================================================
// PERMISSIONS
// ============================================================================

struct FakeStream {
    open: Arc<AtomicUsize>,
}

impl CapturedStream for FakeStream {
    fn stop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakePermissions {
    outcomes: Mutex<VecDeque<Result<(), PermissionFailure>>>,
    calls: AtomicUsize,
    open: Arc<AtomicUsize>,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakePermissions {
    pub fn push(&self, outcome: Result<(), PermissionFailure>) {
        self.outcomes.lock().push_back(outcome);
    }

    /// Lässt acquire() warten, bis der Notify ausgelöst wird
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn open_streams(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionProbe for FakePermissions {
    async fn acquire(
        &self,
        _request: MediaRequest,
    ) -> Result<Box<dyn CapturedStream>, PermissionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
        outcome?;
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            open: Arc::clone(&self.open),
        }))
    }
}

// ============================================================================
// AUDIO
// ============================================================================

#[derive(Default)]
pub struct FakeAudio {
    pub created: Arc<AtomicUsize>,
    pub closed: Arc<AtomicUsize>,
    resume_fails: AtomicBool,
    create_fails: AtomicBool,
}

impl FakeAudio {
    pub fn fail_resume(&self) {
        self.resume_fails.store(true, Ordering::SeqCst);
    }

    pub fn fail_create(&self) {
        self.create_fails.store(true, Ordering::SeqCst);
    }
}

struct FakeContext {
    closed: Arc<AtomicUsize>,
    resume_fails: bool,
}

impl AudioContextHandle for FakeContext {
    fn is_suspended(&self) -> bool {
        true
    }

    fn resume(&mut self) -> Result<(), AudioUnlockError> {
        if self.resume_fails {
            Err(AudioUnlockError::Resume("not allowed".into()))
        } else {
            Ok(())
        }
    }

    fn close(&mut self) -> Result<(), AudioUnlockError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl AudioContextFactory for FakeAudio {
    fn create(&self) -> Result<Box<dyn AudioContextHandle>, AudioUnlockError> {
        if self.create_fails.load(Ordering::SeqCst) {
            return Err(AudioUnlockError::Unavailable("no output".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            closed: Arc::clone(&self.closed),
            resume_fails: self.resume_fails.load(Ordering::SeqCst),
        }))
    }
}

// ============================================================================
// CREDENTIALS
// ============================================================================

#[derive(Default)]
pub struct FakeCredentials {
    responses: Mutex<VecDeque<Result<SessionCredential, CredentialError>>>,
    calls: AtomicUsize,
    hang: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCredentials {
    pub fn push_ok(&self, token: &str, server_address: &str) {
        self.responses
            .lock()
            .push_back(Ok(SessionCredential::new(token, server_address)));
    }

    pub fn push_err(&self, message: &str) {
        self.responses
            .lock()
            .push_back(Err(CredentialError::RequestFailed(message.to_string())));
    }

    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Lässt request() warten, bis der Notify ausgelöst wird
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialService for FakeCredentials {
    async fn request(
        &self,
        _channel_id: &str,
        _user_id: &str,
        _username: &str,
    ) -> Result<SessionCredential, CredentialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CredentialError::RequestFailed("no response queued".into())))
    }
}

// ============================================================================
// TRANSPORT
// ============================================================================

pub struct FakeTransport {
    event_tx: broadcast::Sender<TransportEvent>,
    requests: Mutex<Vec<ConnectRequest>>,
    connect_error: Mutex<Option<String>>,
    disconnects: AtomicUsize,
    hang_disconnect: AtomicBool,
    open: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for FakeTransport {
    fn default() -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            event_tx,
            requests: Mutex::new(Vec::new()),
            connect_error: Mutex::new(None),
            disconnects: AtomicUsize::new(0),
            hang_disconnect: AtomicBool::new(false),
            open: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }
}

impl FakeTransport {
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn fail_connect(&self, details: &str) {
        *self.connect_error.lock() = Some(details.to_string());
    }

    pub fn hang_on_disconnect(&self) {
        self.hang_disconnect.store(true, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Ob eine Raum-Verbindung offen ist (connect ok, noch kein disconnect)
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Lässt connect() warten, bis der Notify ausgelöst wird
    pub fn gate(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }
}

#[async_trait]
impl MediaTransport for FakeTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    async fn connect(&self, request: ConnectRequest) -> Result<(), TransportError> {
        self.requests.lock().push(request);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.connect_error.lock().clone() {
            Some(details) => Err(TransportError::ConnectionFailed(details)),
            None => {
                self.open.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        if self.hang_disconnect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// BUNDLE
// ============================================================================

#[derive(Default)]
pub struct Fakes {
    pub capabilities: Arc<FakeCapabilities>,
    pub permissions: Arc<FakePermissions>,
    pub audio: Arc<FakeAudio>,
    pub credentials: Arc<FakeCredentials>,
    pub transport: Arc<FakeTransport>,
}

impl Fakes {
    pub fn with_missing(missing: Vec<MissingCapability>) -> Self {
        Self {
            capabilities: Arc::new(FakeCapabilities { missing }),
            ..Default::default()
        }
    }

    pub fn ports(&self) -> SessionPorts {
        SessionPorts {
            capabilities: self.capabilities.clone(),
            permissions: self.permissions.clone(),
            audio: self.audio.clone(),
            credentials: self.credentials.clone(),
            transport: self.transport.clone(),
        }
    }
}

/// Wartet bis der Session-State das Prädikat erfüllt (max. 5s)
pub async fn wait_for<F>(session: &CallSession, predicate: F)
where
    F: Fn(&CallSessionState) -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if predicate(&session.state()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    assert!(
        result.is_ok(),
        "session never reached expected state, last state: {:?}",
        session.state()
    );
}

/// Wartet bis die Bedingung erfüllt ist (max. 5s)
pub async fn wait_until<F>(predicate: F)
where
    F: Fn() -> bool,
{
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        while !predicate() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;

    assert!(result.is_ok(), "condition never became true");
}
