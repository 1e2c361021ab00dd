//! Gespeicherte Anmeldung
//!
//! Access- und Refresh-Token werden nach Login oder Registrierung im
//! App-Datenverzeichnis abgelegt und beim nächsten Start wiederverwendet:
//! - Linux: `~/.local/share/callroom/tokens.json`
//! - macOS: `~/Library/Application Support/com.callroom.callroom/tokens.json`
//! - Windows: `%APPDATA%/callroom/callroom/data/tokens.json`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum TokenStoreError {
    #[error("Token file I/O failed for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Token file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// STORED TOKENS
// ============================================================================

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTokens")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TOKEN STORE
// ============================================================================

#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store im App-Datenverzeichnis (falls ermittelbar)
    pub fn open_default() -> Option<Self> {
        directories::ProjectDirs::from("com", "callroom", "callroom")
            .map(|dirs| Self::new(dirs.data_dir().join("tokens.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lädt die Tokens; keine Datei bedeutet nicht angemeldet
    pub fn load(&self) -> Result<Option<StoredTokens>, TokenStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path).map_err(|source| self.io_error(source))?;
        let tokens = serde_json::from_str(&raw).map_err(|source| TokenStoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(tokens))
    }

    pub fn save(&self, tokens: &StoredTokens) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let encoded = serde_json::to_string_pretty(tokens).map_err(|source| {
            TokenStoreError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        fs::write(&self.path, encoded).map_err(|source| self.io_error(source))?;

        // Nur Owner darf lesen/schreiben
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))
                .map_err(|source| self.io_error(source))?;
        }

        tracing::debug!("Saved tokens to {:?}", self.path);
        Ok(())
    }

    /// Entfernt die gespeicherte Anmeldung
    pub fn clear(&self) -> Result<(), TokenStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    fn io_error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
