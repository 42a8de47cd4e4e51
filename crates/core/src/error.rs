//! Fehlertypen fuer Dolmetsch
//!
//! Zentraler Fehler-Enum fuer querschnittliche Fehler (Konfiguration, IO).
//! Die Fach-Crates definieren eigene Fehler (`CryptoError`, `PairingError`,
//! `StreamError`) und werden im Binary via `anyhow` zusammengefuehrt.

use thiserror::Error;

/// Globaler Result-Alias fuer Dolmetsch
pub type Result<T> = std::result::Result<T, DolmetschError>;

/// Querschnittliche Fehler im Dolmetsch-System
#[derive(Debug, Error)]
pub enum DolmetschError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Ungueltige Sprache: '{0}'")]
    UngueltigeSprache(String),

    #[error("Ungueltige ID: {0}")]
    UngueltigeId(String),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl DolmetschError {
    /// Erstellt einen Konfigurationsfehler aus einer beliebigen Nachricht
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}
