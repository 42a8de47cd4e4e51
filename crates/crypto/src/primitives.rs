//! Krypto-Primitiven
//!
//! - HKDF-SHA256 Key Derivation (deterministisch, beide Peers kommen ohne
//!   weitere Verhandlung auf denselben Schluessel)
//! - Deterministische IV-Konstruktion
//! - Konstantzeit-Vergleich
//!
//! ## IV-Aufbau
//! ```text
//! [ssrc(4)] [counter(8)]
//! ```
//! Der Zeitstempel gehoert NICHT in den IV: zwei Frames in derselben
//! Millisekunde wuerden sonst denselben IV bekommen. Er wird stattdessen
//! als AAD authentifiziert.

use hkdf::Hkdf;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CryptoError, CryptoResult};
use crate::types::{IV_LEN, KEY_LEN};

/// Standard-Salt fuer die Session-Key-Ableitung
pub const DEFAULT_HKDF_SALT: &[u8] = b"dolmetsch-session-salt-v1";
/// Standard-Info fuer die Session-Key-Ableitung
pub const DEFAULT_HKDF_INFO: &[u8] = b"dolmetsch-frame-key-v1";

/// Leitet einen 32-Byte-Session-Schluessel aus einem gemeinsamen Geheimnis ab
///
/// `salt` und `info` fallen auf [`DEFAULT_HKDF_SALT`] / [`DEFAULT_HKDF_INFO`]
/// zurueck. Ein leeres Geheimnis ist ein Fehler.
pub fn derive_key(
    shared_secret: &[u8],
    salt: Option<&[u8]>,
    info: Option<&[u8]>,
) -> CryptoResult<[u8; KEY_LEN]> {
    if shared_secret.is_empty() {
        return Err(CryptoError::KeyDerivation(
            "Gemeinsames Geheimnis ist leer".to_string(),
        ));
    }

    let hk = Hkdf::<Sha256>::new(Some(salt.unwrap_or(DEFAULT_HKDF_SALT)), shared_secret);
    let mut okm = [0u8; KEY_LEN];
    hk.expand(info.unwrap_or(DEFAULT_HKDF_INFO), &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// HKDF-basierte Key Derivation (allgemein verwendbar)
pub fn hkdf_derive(ikm: &[u8], salt: &[u8], info: &[u8], len: usize) -> CryptoResult<Vec<u8>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(okm)
}

/// Baut den 12-Byte-IV eines Frames
///
/// Eindeutig fuer jeden Frame unter einem Schluessel, solange
/// (ssrc, counter) sich nie wiederholt. `timestamp` fliesst nicht ein.
pub fn create_deterministic_iv(_timestamp: i64, ssrc: u32, counter: u64) -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    iv[0..4].copy_from_slice(&ssrc.to_be_bytes());
    iv[4..12].copy_from_slice(&counter.to_be_bytes());
    iv
}

/// Vergleicht zwei Byte-Folgen in konstanter Zeit
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
