//! Room Module - WebSocket Verbindung zum Media-Raum
//!
//! Implementiert den MediaTransport der CallSession:
//! - Verbindung mit Access-Token aufbauen
//! - Connected/Disconnected/Error als Events melden
//! - Sauberes Trennen per Close-Frame

mod transport;

pub use transport::{room_url, RoomTransport};
