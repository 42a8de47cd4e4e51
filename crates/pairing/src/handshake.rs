//! Gemeinsame Ableitungen von Host und Gast
//!
//! Beide Seiten kennen nach dem Scan das QR-Geheimnis und die Session-ID.
//! Daraus entstehen der Join-Nachweis und (zusammen mit dem DH-Ergebnis)
//! der Session-Schluessel.

use dolmetsch_core::SessionId;
use dolmetsch_crypto::primitives::DEFAULT_HKDF_INFO;
use dolmetsch_crypto::types::KEY_LEN;
use dolmetsch_crypto::{derive_key, hkdf_derive, CryptoResult, SecretBytes};

const JOIN_PROOF_SALT: &[u8] = b"dolmetsch-join-proof-v1";

/// Laenge des Join-Nachweises
pub const JOIN_PROOF_LEN: usize = 32;

/// Nachweis, dass der Gast das QR-Geheimnis kennt
///
/// Bindet den ephemeren Schluessel des Gasts und die Session-ID, damit ein
/// mitgeschnittener Nachweis nicht fuer einen anderen Schluessel taugt.
pub fn join_proof(
    secret: &[u8; 32],
    joiner_public_key: &[u8; 32],
    session_id: &SessionId,
) -> CryptoResult<Vec<u8>> {
    let mut info = Vec::with_capacity(32 + 16);
    info.extend_from_slice(joiner_public_key);
    info.extend_from_slice(session_id.as_bytes());
    hkdf_derive(secret, JOIN_PROOF_SALT, &info, JOIN_PROOF_LEN)
}

/// Session-Schluessel aus DH-Ergebnis, QR-Geheimnis (Salt) und Session-ID
pub fn session_key(
    shared_secret: &SecretBytes,
    secret: &[u8; 32],
    session_id: &SessionId,
) -> CryptoResult<[u8; KEY_LEN]> {
    let mut info = DEFAULT_HKDF_INFO.to_vec();
    info.extend_from_slice(session_id.as_bytes());
    derive_key(
        shared_secret.as_bytes(),
        Some(secret.as_slice()),
        Some(info.as_slice()),
    )
}
