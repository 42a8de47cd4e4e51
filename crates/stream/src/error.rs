//! Fehlertypen fuer den Uebersetzungsstrom

use dolmetsch_crypto::CryptoError;
use thiserror::Error;

use crate::phase::{SessionInput, SessionPhase};

/// Fehler im Streaming-Subsystem
#[derive(Debug, Error)]
pub enum StreamError {
    /// Kein Mikrofon verfuegbar oder Zugriff verweigert
    #[error("Kein Mikrofon verfuegbar")]
    NoMicrophone,

    #[error("Media-Fehler: {0}")]
    Media(String),

    #[error("Transport-Fehler: {0}")]
    Transport(String),

    /// Ausgehender Frame konnte nicht verschluesselt werden
    #[error("Verschluesselung: {0}")]
    Crypto(#[from] CryptoError),

    /// Eingabe ist im aktuellen Zustand nicht erlaubt
    #[error("Ungueltiger Uebergang: {input:?} in Zustand {from:?}")]
    InvalidTransition {
        from: SessionPhase,
        input: SessionInput,
    },

    /// Alle Reconnect-Versuche gescheitert
    #[error("Reconnect-Versuche erschoepft")]
    RetriesExhausted,

    /// Session wurde waehrend der Operation gestoppt
    #[error("Session gestoppt")]
    Stopped,
}

impl StreamError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }
}

/// Result-Typ fuer das Streaming-Subsystem
pub type StreamResult<T> = Result<T, StreamError>;
