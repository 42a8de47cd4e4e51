//! QR-Payload
//!
//! ## Format
//! ```text
//! "DM1:" + base64url_ohne_padding(
//!     [version(1)] [session_id(16)] [secret(32)] [host_pub(32)] [expires_at_ms(8)]
//! )
//! ```
//! Der private Schluessel des Hosts ist nie enthalten.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dolmetsch_core::SessionId;
use zeroize::Zeroize;

/// Praefix jedes QR-Payloads
pub const QR_PREFIX: &str = "DM1:";
/// Aktuelle Payload-Version
pub const QR_VERSION: u8 = 1;

const PAYLOAD_LEN: usize = 1 + 16 + 32 + 32 + 8;

/// Inhalt eines gescannten bzw. angezeigten QR-Codes
#[derive(Clone, PartialEq, Eq)]
pub struct QrData {
    pub session_id: SessionId,
    /// Einmal-Geheimnis der Session
    pub secret: [u8; 32],
    /// Ephemerer X25519-Schluessel des Hosts
    pub host_public_key: [u8; 32],
    /// Ablaufzeitpunkt in ms seit Unix-Epoche
    pub expires_at: i64,
}

impl Drop for QrData {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for QrData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QrData")
            .field("session_id", &self.session_id)
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl QrData {
    /// Kodiert den Payload fuer die QR-Anzeige
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(PAYLOAD_LEN);
        raw.push(QR_VERSION);
        raw.extend_from_slice(self.session_id.as_bytes());
        raw.extend_from_slice(&self.secret);
        raw.extend_from_slice(&self.host_public_key);
        raw.extend_from_slice(&self.expires_at.to_be_bytes());

        let encoded = format!("{QR_PREFIX}{}", URL_SAFE_NO_PAD.encode(&raw));
        raw.zeroize();
        encoded
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }
}

/// Parst einen gescannten QR-Payload
///
/// Strikt: falsches Praefix, falsche Laenge oder unbekannte Version ergeben
/// `None`. Panikt nie, auch nicht bei beliebigen Eingaben.
pub fn parse_qr_data(data: &str) -> Option<QrData> {
    let body = data.trim().strip_prefix(QR_PREFIX)?;
    let mut raw = URL_SAFE_NO_PAD.decode(body).ok()?;

    let ergebnis = zerlegen(&raw);
    raw.zeroize();
    ergebnis
}

fn zerlegen(raw: &[u8]) -> Option<QrData> {
    if raw.len() != PAYLOAD_LEN {
        return None;
    }
    let (version, rest) = raw.split_first()?;
    if *version != QR_VERSION {
        return None;
    }
    let (session_id, rest) = rest.split_at(16);
    let (secret, rest) = rest.split_at(32);
    let (host_public_key, expires_at) = rest.split_at(32);

    Some(QrData {
        session_id: SessionId::from_bytes(session_id.try_into().ok()?),
        secret: secret.try_into().ok()?,
        host_public_key: host_public_key.try_into().ok()?,
        expires_at: i64::from_be_bytes(expires_at.try_into().ok()?),
    })
}
