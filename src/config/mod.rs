//! Config Module - Anwendungs-Konfiguration
//!
//! Reihenfolge: Defaults → TOML-Datei → Umgebungsvariablen → CLI-Flags.
//! Dazu die gespeicherte Anmeldung im App-Datenverzeichnis.

mod settings;
mod tokens;

pub use settings::{AppConfig, ConfigError, MAX_TIMEOUT_SECS};
pub use tokens::{StoredTokens, TokenStore, TokenStoreError};
