//! Hex-Kodierung fuer Schluessel und Diagnose-Ausgaben

use crate::error::{CryptoError, CryptoResult};

/// Kodiert Bytes als Hex (Kleinbuchstaben)
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    ::hex::encode(bytes)
}

/// Dekodiert einen Hex-String (Gross-/Kleinschreibung egal)
pub fn hex_to_bytes(s: &str) -> CryptoResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(CryptoError::InvalidHexLength(s.len()));
    }
    ::hex::decode(s).map_err(|e| match e {
        ::hex::FromHexError::OddLength => CryptoError::InvalidHexLength(s.len()),
        other => CryptoError::InvalidHex(other.to_string()),
    })
}
