//! Frame-Verschluesselung
//!
//! Verschluesselt einzelne Media-Frames mit dem Frame-Schluessel des
//! jeweiligen Peers. Reine CPU-Arbeit ohne I/O, von jedem Thread aus
//! aufrufbar.
//!
//! Gesendet wird unter dem Schluessel der eigenen Richtung, empfangen
//! unter dem der Gegenrichtung. Ein reflektierter eigener Frame scheitert
//! deshalb an der Authentifizierung, auch wenn beide Seiten dieselbe ssrc
//! gewaehlt haben.
//!
//! ## IV-Aufbau
//! ```text
//! [ssrc(4)] [counter(8)]
//! ```
//!
//! ## AAD (Authenticated Additional Data)
//! ```text
//! [ssrc(4)] [timestamp(8)]
//! ```

use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;
use dolmetsch_core::config::AeadAlgorithm;
use dolmetsch_core::{Clock, PeerId, SystemClock};
use std::sync::Arc;

use crate::e2e::key_store::SessionKeyStore;
use crate::error::{CryptoError, CryptoResult};
use crate::primitives::create_deterministic_iv;
use crate::types::{E2eConfig, EncryptedFrame, IV_LEN, KEY_LEN, TAG_LEN};

/// Ver- und Entschluesselung von Frames fuer alle Peers eines Stores
#[derive(Debug, Clone)]
pub struct FrameCipher {
    store: Arc<SessionKeyStore>,
    config: E2eConfig,
    local_ssrc: u32,
    clock: Arc<dyn Clock>,
}

impl FrameCipher {
    pub fn new(store: Arc<SessionKeyStore>, config: E2eConfig, local_ssrc: u32) -> Self {
        Self::with_clock(store, config, local_ssrc, Arc::new(SystemClock))
    }

    /// Wie `new`, mit eigener Zeitquelle fuer die Frame-Zeitstempel
    pub fn with_clock(
        store: Arc<SessionKeyStore>,
        config: E2eConfig,
        local_ssrc: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            local_ssrc,
            clock,
        }
    }

    pub fn local_ssrc(&self) -> u32 {
        self.local_ssrc
    }

    pub fn config(&self) -> &E2eConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SessionKeyStore> {
        &self.store
    }

    /// Verschluesselt einen Frame fuer `peer_id`
    ///
    /// Jeder Aufruf verbraucht genau einen Zaehlerwert des Peers.
    pub fn encrypt_frame(&self, peer_id: &PeerId, plaintext: &[u8]) -> CryptoResult<EncryptedFrame> {
        let state = self.store.require(peer_id)?;
        let counter = state.advance_counter()?;
        let timestamp = self.clock.now_millis();

        let iv = create_deterministic_iv(timestamp, self.local_ssrc, counter);
        let aad = build_aad(self.local_ssrc, timestamp);

        let data = state.with_send_key(|key| seal(self.config.algorithm, key, &iv, plaintext, &aad))?;

        tracing::trace!(peer = %peer_id, counter, laenge = plaintext.len(), "Frame verschluesselt");

        Ok(EncryptedFrame {
            ssrc: self.local_ssrc,
            counter,
            timestamp,
            data,
        })
    }

    /// Entschluesselt einen Frame von `peer_id`
    ///
    /// Replay-Pruefung, Entschluesselung und Fortschreiben des
    /// Wasserstands laufen unter dem Fenster-Lock des Peers: zwei Kopien
    /// desselben Frames koennen nicht beide angenommen werden.
    pub fn decrypt_frame(&self, peer_id: &PeerId, frame: &EncryptedFrame) -> CryptoResult<Vec<u8>> {
        let state = self.store.require(peer_id)?;
        if frame.data.len() < TAG_LEN {
            tracing::warn!(peer = %peer_id, "Frame ohne vollstaendigen Auth-Tag verworfen");
            return Err(CryptoError::AuthenticationFailed);
        }

        let mut window = state.receive_window();
        if let Err(e) = window.check(frame.counter) {
            tracing::debug!(peer = %peer_id, counter = frame.counter, "Replay abgewiesen");
            return Err(e);
        }

        let iv = create_deterministic_iv(frame.timestamp, frame.ssrc, frame.counter);
        let aad = build_aad(frame.ssrc, frame.timestamp);

        let plaintext = state
            .with_receive_key(|key| open(self.config.algorithm, key, &iv, &frame.data, &aad))
            .map_err(|e| match e {
                CryptoError::SessionNotEstablished { .. } => e,
                _ => {
                    tracing::warn!(peer = %peer_id, counter = frame.counter, "Frame-Authentifizierung fehlgeschlagen");
                    CryptoError::AuthenticationFailed
                }
            })?;

        window.commit(frame.counter);
        Ok(plaintext)
    }

    /// `encrypt_frame` mit Serialisierung ins Wire-Format
    pub fn encrypt_frame_bytes(&self, peer_id: &PeerId, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        Ok(self.encrypt_frame(peer_id, plaintext)?.to_bytes())
    }

    /// `decrypt_frame` direkt aus dem Wire-Format
    pub fn decrypt_frame_bytes(&self, peer_id: &PeerId, bytes: &[u8]) -> CryptoResult<Vec<u8>> {
        let frame = EncryptedFrame::from_bytes(bytes)?;
        self.decrypt_frame(peer_id, &frame)
    }
}

fn build_aad(ssrc: u32, timestamp: i64) -> [u8; 12] {
    let mut aad = [0u8; 12];
    aad[0..4].copy_from_slice(&ssrc.to_be_bytes());
    aad[4..12].copy_from_slice(&timestamp.to_be_bytes());
    aad
}

fn seal(
    algorithm: AeadAlgorithm,
    key: &[u8],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    match algorithm {
        AeadAlgorithm::Aes256Gcm => seal_with::<Aes256Gcm>(key, iv, plaintext, aad),
        AeadAlgorithm::ChaCha20Poly1305 => seal_with::<ChaCha20Poly1305>(key, iv, plaintext, aad),
    }
}

fn open(
    algorithm: AeadAlgorithm,
    key: &[u8],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    match algorithm {
        AeadAlgorithm::Aes256Gcm => open_with::<Aes256Gcm>(key, iv, ciphertext, aad),
        AeadAlgorithm::ChaCha20Poly1305 => open_with::<ChaCha20Poly1305>(key, iv, ciphertext, aad),
    }
}

fn cipher_for<C: KeyInit>(key: &[u8]) -> CryptoResult<C> {
    C::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        erwartet: KEY_LEN,
        erhalten: key.len(),
    })
}

fn seal_with<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8; IV_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    cipher_for::<C>(key)?
        .encrypt(Nonce::<C>::from_slice(iv), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encryption)
}

fn open_with<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> CryptoResult<Vec<u8>> {
    cipher_for::<C>(key)?
        .decrypt(Nonce::<C>::from_slice(iv), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::AuthenticationFailed)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
