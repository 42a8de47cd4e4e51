//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use dolmetsch_core::config::{AeadAlgorithm, KryptoEinstellungen};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Schluessellaenge (AES-256 / ChaCha20)
pub const KEY_LEN: usize = 32;
/// IV-Laenge (96 Bit), fest
pub const IV_LEN: usize = 12;
/// Auth-Tag-Laenge (128 Bit)
pub const TAG_LEN: usize = 16;
/// Groesstes erlaubtes Replay-Fenster (Bitmap in einem u64)
pub const MAX_REPLAY_WINDOW: u64 = 64;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretBytes(Vec<u8>);

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ephemeres X25519-Schluessel-Paar, eines pro Pairing-Versuch
///
/// Der private Schluessel verlaesst das Geraet nie und wird von
/// [`KeyPair::agree`] verbraucht.
pub struct KeyPair {
    private_key: StaticSecret,
    public_key: [u8; 32],
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &::hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Erzeugt ein frisches Schluessel-Paar
    pub fn generate() -> Self {
        let private_key = StaticSecret::random_from_rng(OsRng);
        let public_key = X25519PublicKey::from(&private_key).to_bytes();
        Self {
            private_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// X25519-Diffie-Hellman mit dem oeffentlichen Schluessel der Gegenseite
    ///
    /// Verbraucht das Schluessel-Paar. Nicht-kontributive Ergebnisse
    /// (Low-Order-Punkte) werden abgelehnt.
    pub fn agree(self, remote_public_key: &[u8; 32]) -> CryptoResult<SecretBytes> {
        let remote = X25519PublicKey::from(*remote_public_key);
        let shared = self.private_key.diffie_hellman(&remote);
        if !shared.was_contributory() {
            return Err(CryptoError::KeyDerivation(
                "Oeffentlicher Schluessel der Gegenseite ist ungueltig".to_string(),
            ));
        }
        Ok(SecretBytes::new(shared.as_bytes().to_vec()))
    }
}

/// Rolle des lokalen Geraets in einer gekoppelten Session
///
/// Aus dem gemeinsamen Session-Schluessel entsteht pro Senderichtung ein
/// eigener Frame-Schluessel. Beide Seiten duerfen so dieselbe ssrc und
/// dieselben Zaehlerstaende verwenden, ohne dass ein (Schluessel, IV)-Paar
/// doppelt vorkommt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionRole {
    /// Hat den QR-Code angezeigt
    Host,
    /// Hat den QR-Code gescannt
    Guest,
}

impl SessionRole {
    /// Rolle der Gegenseite
    pub fn remote(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    /// HKDF-Info fuer Frames, die diese Rolle sendet
    pub(crate) fn send_info(self) -> &'static [u8] {
        match self {
            Self::Host => b"dolmetsch-frame-key-v1 host->guest",
            Self::Guest => b"dolmetsch-frame-key-v1 guest->host",
        }
    }
}

/// Statische Konfiguration der Frame-Verschluesselung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct E2eConfig {
    pub algorithm: AeadAlgorithm,
    /// 1 = streng monoton, sonst Breite des Out-of-Order-Fensters (max. 64)
    pub replay_window: u64,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            algorithm: AeadAlgorithm::Aes256Gcm,
            replay_window: 1,
        }
    }
}

impl E2eConfig {
    pub fn aus_einstellungen(einstellungen: &KryptoEinstellungen) -> Self {
        Self {
            algorithm: einstellungen.algorithmus,
            replay_window: einstellungen.replay_fenster.clamp(1, MAX_REPLAY_WINDOW),
        }
    }
}

/// Verschluesselter Media-Frame
///
/// ## Wire-Format
/// ```text
/// [ssrc(4)] [counter(8)] [timestamp(8)] [ciphertext + auth_tag(16)]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFrame {
    /// Media-Source des Senders (Teil der Nonce)
    pub ssrc: u32,
    /// Streng steigender Frame-Zaehler des Senders
    pub counter: u64,
    /// Sendezeitpunkt in ms (als AAD authentifiziert)
    pub timestamp: i64,
    /// Ciphertext inkl. Auth-Tag
    pub data: Vec<u8>,
}

impl EncryptedFrame {
    pub const HEADER_LEN: usize = 4 + 8 + 8;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.data.len());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        out.extend_from_slice(&self.counter.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < Self::HEADER_LEN + TAG_LEN {
            return Err(CryptoError::InvalidFrame(format!(
                "zu kurz: {} Bytes",
                bytes.len()
            )));
        }
        let (ssrc, rest) = bytes.split_at(4);
        let (counter, rest) = rest.split_at(8);
        let (timestamp, data) = rest.split_at(8);

        Ok(Self {
            ssrc: u32::from_be_bytes(ssrc.try_into().map_err(|_| kaputt())?),
            counter: u64::from_be_bytes(counter.try_into().map_err(|_| kaputt())?),
            timestamp: i64::from_be_bytes(timestamp.try_into().map_err(|_| kaputt())?),
            data: data.to_vec(),
        })
    }
}

fn kaputt() -> CryptoError {
    CryptoError::InvalidFrame("Header".to_string())
}
