//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
///
/// `AuthenticationFailed` traegt absichtlich keine Details: der Aufrufer
/// erfaehrt nur, dass der Frame nicht authentisch war.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Ungueltige Hex-Laenge: {0} Zeichen (muss gerade sein)")]
    InvalidHexLength(usize),

    #[error("Ungueltiges Hex-Zeichen: {0}")]
    InvalidHex(String),

    #[error("Keine Session fuer {peer}")]
    SessionNotEstablished { peer: String },

    #[error("Frame-Authentifizierung fehlgeschlagen")]
    AuthenticationFailed,

    #[error("Replay abgewiesen: Zaehler {counter}, Wasserstand {watermark}")]
    ReplayRejected { counter: u64, watermark: u64 },

    #[error("Frame-Zaehler erschoepft fuer {peer}, neuer Schluessel noetig")]
    CounterExhausted { peer: String },

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    InvalidKeyLength { erwartet: usize, erhalten: usize },

    #[error("Ungueltiger Frame: {0}")]
    InvalidFrame(String),

    #[error("Verschluesselung fehlgeschlagen")]
    Encryption,

    #[error("Signatur-Verifikation fehlgeschlagen")]
    SignatureInvalid,

    #[error("Base64-Dekodierung fehlgeschlagen: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl CryptoError {
    pub(crate) fn keine_session(peer: impl std::fmt::Display) -> Self {
        Self::SessionNotEstablished {
            peer: peer.to_string(),
        }
    }

    /// Frame-bezogene Fehler, nach denen der Strom weiterlaufen kann
    /// (einzelner Frame wird verworfen)
    pub fn ist_frame_verwerfbar(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed | Self::ReplayRejected { .. } | Self::InvalidFrame(_)
        )
    }
}

pub type CryptoResult<T> = Result<T, CryptoError>;
