//! Anwendungs-Konfiguration
//!
//! Die Datei liegt im App-Konfigurationsverzeichnis:
//! - Windows: `%APPDATA%/callroom/callroom/config/config.toml`
//! - macOS: `~/Library/Application Support/com.callroom.callroom/config.toml`
//! - Linux: `~/.config/callroom/config.toml`

use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

// ============================================================================
// APP CONFIG
// ============================================================================

/// Obergrenze für alle Timeouts in Sekunden
pub const MAX_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Basis-URL des Backend-API
    pub api_url: String,
    /// Adresse des Media-Servers (wird dem Token-Response hinzugefügt)
    pub media_server_url: String,
    pub credential_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub leave_timeout_secs: u64,
    /// tracing EnvFilter Direktiven
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            media_server_url: "ws://localhost:7880".to_string(),
            credential_timeout_secs: 15,
            connect_timeout_secs: 20,
            leave_timeout_secs: 5,
            log_filter: "callroom=debug,callroom_lib=debug,tungstenite=warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Lädt die Konfiguration aus Datei und Umgebung
    ///
    /// Eine explizit angegebene Datei muss existieren, die Standard-Datei
    /// ist optional. Ignorierte Umgebungswerte werden als Warnungen
    /// zurückgegeben, da das Logging zu diesem Zeitpunkt noch nicht läuft.
    pub fn load(explicit_path: Option<&Path>) -> Result<(Self, Vec<String>), ConfigError> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        let warnings = config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok((config, warnings))
    }

    /// Liest eine TOML-Datei; fehlende Felder bleiben auf Default
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        tracing::debug!("Loading config from {:?}", path);

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Ermittelt den Pfad zur Config-Datei
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "callroom", "callroom")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Überschreibt Werte aus Umgebungsvariablen
    ///
    /// Gibt für jeden nicht parsebaren Wert eine Warnung zurück.
    pub fn apply_env<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CALLROOM_API_URL") {
            self.api_url = url;
        }
        if let Some(url) = lookup("CALLROOM_MEDIA_URL").or_else(|| lookup("LIVEKIT_URL")) {
            self.media_server_url = url;
        }
        if let Some(filter) = lookup("RUST_LOG") {
            self.log_filter = filter;
        }

        let timeouts = [
            ("CALLROOM_CREDENTIAL_TIMEOUT_SECS", &mut self.credential_timeout_secs),
            ("CALLROOM_CONNECT_TIMEOUT_SECS", &mut self.connect_timeout_secs),
            ("CALLROOM_LEAVE_TIMEOUT_SECS", &mut self.leave_timeout_secs),
        ];
        let mut warnings = Vec::new();
        for (key, slot) in timeouts {
            if let Some(raw) = lookup(key) {
                match raw.trim().parse::<u64>() {
                    Ok(secs) => *slot = secs,
                    Err(e) => warnings.push(format!("Ignoring {key}={raw:?}: {e}")),
                }
            }
        }
        warnings
    }

    /// Prüft URLs und Timeouts
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("api_url", &self.api_url, &["http", "https"])?;
        check_url(
            "media_server_url",
            &self.media_server_url,
            &["ws", "wss", "http", "https"],
        )?;

        for (key, secs) in [
            ("credential_timeout_secs", self.credential_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("leave_timeout_secs", self.leave_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::InvalidValue {
                    key,
                    message: format!("must be between 1 and {MAX_TIMEOUT_SECS} seconds"),
                });
            }
        }

        Ok(())
    }

    /// Zeitlimits für die CallSession
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            credential_timeout: Duration::from_secs(self.credential_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            leave_timeout: Duration::from_secs(self.leave_timeout_secs),
        }
    }
}

fn check_url(key: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        key,
        message: format!("{value:?} is not a valid URL: {e}"),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidValue {
            key,
            message: format!("unsupported scheme {:?}", url.scheme()),
        });
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.session_config().credential_timeout,
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_url = \"https://chat.example.com\"").unwrap();
        writeln!(file, "connect_timeout_secs = 30").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api_url, "https://chat.example.com");
        assert_eq!(config.connect_timeout_secs, 30);
        assert_eq!(config.media_server_url, "ws://localhost:7880");
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = AppConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CALLROOM_API_URL", "https://api.example.com"),
            ("LIVEKIT_URL", "wss://media.example.com"),
            ("CALLROOM_CREDENTIAL_TIMEOUT_SECS", "7"),
            ("CALLROOM_CONNECT_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        let warnings = config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.media_server_url, "wss://media.example.com");
        assert_eq!(config.credential_timeout_secs, 7);
        // Ungültiger Wert wird ignoriert und gemeldet
        assert_eq!(config.connect_timeout_secs, 20);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("CALLROOM_CONNECT_TIMEOUT_SECS"));
    }

    #[test]
    fn test_media_url_prefers_explicit_key() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "CALLROOM_MEDIA_URL" => Some("wss://a".to_string()),
            "LIVEKIT_URL" => Some("wss://b".to_string()),
            _ => None,
        });
        assert_eq!(config.media_server_url, "wss://a");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = AppConfig {
            api_url: "ftp://example.com".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key: "api_url", .. })
        ));

        let config = AppConfig {
            leave_timeout_secs: 0,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "leave_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_huge_env_timeout_fails_validation() {
        let mut config = AppConfig::default();
        let warnings = config.apply_env(|key| match key {
            "CALLROOM_CONNECT_TIMEOUT_SECS" => Some(u64::MAX.to_string()),
            _ => None,
        });
        assert!(warnings.is_empty());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "connect_timeout_secs",
                ..
            })
        ));

        config.connect_timeout_secs = MAX_TIMEOUT_SECS;
        assert!(config.validate().is_ok());
    }
}
