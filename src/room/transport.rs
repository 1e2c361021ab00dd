//! WebSocket Transport für den Media-Raum
//!
//! Verbindet sich mit `{server}/rtc?access_token=…` und meldet den
//! Verbindungsstatus als TransportEvent:
//! - Connected sobald der Handshake steht
//! - Disconnected bei Close-Frame oder Stream-Ende
//! - Error bei Lese-Fehlern

use crate::session::{ConnectRequest, MediaTransport, TransportError, TransportEvent};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Wie lange disconnect() auf das Close-Echo des Servers wartet
const CLOSE_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// URL BUILDING
// ============================================================================

/// Baut die Raum-URL aus Server-Adresse, Token und Medien-Wunsch
pub fn room_url(
    server_address: &str,
    token: &str,
    want_video: bool,
    want_audio: bool,
) -> Result<Url, TransportError> {
    let mut url = Url::parse(server_address)
        .map_err(|e| TransportError::InvalidAddress(format!("{server_address}: {e}")))?;

    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => {
            return Err(TransportError::InvalidAddress(format!(
                "unsupported scheme {other:?}"
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| TransportError::InvalidAddress(server_address.to_string()))?;

    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidAddress(server_address.to_string()))?
        .pop_if_empty()
        .push("rtc");

    url.query_pairs_mut()
        .append_pair("access_token", token)
        .append_pair("auto_subscribe", "1")
        .append_pair("video", if want_video { "1" } else { "0" })
        .append_pair("audio", if want_audio { "1" } else { "0" });

    Ok(url)
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

#[derive(Debug, Default)]
struct RoomState {
    is_connected: bool,
    server_address: Option<String>,
}

struct Connection {
    tx: mpsc::Sender<Message>,
    reader: JoinHandle<()>,
}

// ============================================================================
// ROOM TRANSPORT
// ============================================================================

/// WebSocket-basierter MediaTransport
pub struct RoomTransport {
    state: Arc<RwLock<RoomState>>,
    connection: Mutex<Option<Connection>>,
    event_tx: broadcast::Sender<TransportEvent>,
}

impl RoomTransport {
    /// Erstellt einen neuen RoomTransport
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            state: Arc::new(RwLock::new(RoomState::default())),
            connection: Mutex::new(None),
            event_tx,
        }
    }

    /// Prüft ob verbunden
    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected
    }
}

impl Default for RoomTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaTransport for RoomTransport {
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }

    async fn connect(&self, request: ConnectRequest) -> Result<(), TransportError> {
        if self.connection.lock().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let url = room_url(
            &request.server_address,
            &request.token,
            request.want_video,
            request.want_audio,
        )?;

        tracing::info!("Connecting to media room: {}", request.server_address);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        // Write-Task starten
        let (tx, mut rx) = mpsc::channel::<Message>(16);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let is_close = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    tracing::debug!("Failed to send room message: {}", e);
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        // Connected vor dem Read-Task, damit Disconnected immer danach kommt
        {
            let mut state = self.state.write();
            state.is_connected = true;
            state.server_address = Some(request.server_address.clone());
        }
        let _ = self.event_tx.send(TransportEvent::Connected);

        // Read-Task starten
        let state = Arc::clone(&self.state);
        let event_tx = self.event_tx.clone();
        let reader = tokio::spawn(async move {
            let mut final_event = TransportEvent::Disconnected;

            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Close(frame)) => {
                        tracing::info!("Media room closed: {:?}", frame);
                        break;
                    }
                    Ok(Message::Text(text)) => {
                        tracing::trace!("Room signal: {} bytes", text.len());
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("Media room error: {}", e);
                        final_event = TransportEvent::Error(e.to_string());
                        break;
                    }
                }
            }

            state.write().is_connected = false;
            let _ = event_tx.send(final_event);
        });

        *self.connection.lock() = Some(Connection { tx, reader });
        Ok(())
    }

    async fn disconnect(&self) {
        let connection = self.connection.lock().take();
        let Some(connection) = connection else {
            return;
        };

        tracing::info!("Leaving media room");

        let _ = connection.tx.send(Message::Close(None)).await;
        drop(connection.tx);

        let mut reader = connection.reader;
        if tokio::time::timeout(CLOSE_GRACE, &mut reader).await.is_err() {
            tracing::debug!("Media room did not echo close, dropping connection");
            reader.abort();
            self.state.write().is_connected = false;
            let _ = self.event_tx.send(TransportEvent::Disconnected);
        }
    }
}

impl std::fmt::Debug for RoomTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomTransport")
            .field("state", &*self.state.read())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================
