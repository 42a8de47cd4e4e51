//! Fehlertypen fuer das QR-Pairing

use dolmetsch_crypto::CryptoError;
use thiserror::Error;

/// Fehler beim Pairing
#[derive(Debug, Error)]
pub enum PairingError {
    /// QR-Code ist abgelaufen
    #[error("Pairing-Session ist abgelaufen")]
    SessionExpired,

    /// Ein anderer Peer war schneller
    #[error("Pairing-Session wurde bereits verwendet")]
    SessionAlreadyJoined,

    /// Join-Nachweis passt nicht zum Geheimnis aus dem QR-Code
    #[error("Ungueltiges Pairing-Geheimnis")]
    InvalidSecret,

    /// Host hat die Session abgebrochen
    #[error("Pairing-Session wurde abgebrochen")]
    SessionCancelled,

    /// Signaling kennt die Session nicht
    #[error("Unbekannte Pairing-Session")]
    UnknownSession,

    /// Aufruf setzt eine offene Session voraus
    #[error("Keine offene Pairing-Session")]
    NoOpenSession,

    /// Oeffentlicher Schluessel des Hosts weicht vom QR-Code ab
    #[error("Host-Schluessel passt nicht zum QR-Code")]
    HostKeyMismatch,

    /// Lokal abgebrochen (CancellationToken)
    #[error("Pairing abgebrochen")]
    Cancelled,

    /// Transportfehler im Signaling
    #[error("Signaling-Fehler: {0}")]
    Signaling(String),

    #[error("Krypto-Fehler: {0}")]
    Crypto(#[from] CryptoError),
}

impl PairingError {
    pub fn signaling(msg: impl Into<String>) -> Self {
        Self::Signaling(msg.into())
    }

    /// Fehler, die dem Benutzer direkt angezeigt werden (z.B. "QR-Code abgelaufen")
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::SessionAlreadyJoined
                | Self::InvalidSecret
                | Self::SessionCancelled
                | Self::UnknownSession
                | Self::HostKeyMismatch
        )
    }

    /// Nur Transportfehler lohnen einen erneuten Versuch mit demselben QR-Code
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Signaling(_))
    }
}

/// Result-Typ fuer das Pairing
pub type PairingResult<T> = Result<T, PairingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sichtbare_fehler() {
        assert!(PairingError::SessionExpired.is_user_visible());
        assert!(PairingError::SessionAlreadyJoined.is_user_visible());
        assert!(!PairingError::Cancelled.is_user_visible());
        assert!(!PairingError::signaling("weg").is_user_visible());
    }

    #[test]
    fn wiederholbare_fehler() {
        assert!(PairingError::signaling("timeout").is_retryable());
        assert!(!PairingError::InvalidSecret.is_retryable());
        assert!(!PairingError::from(CryptoError::AuthenticationFailed).is_retryable());
    }
}
