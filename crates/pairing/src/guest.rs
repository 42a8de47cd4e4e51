//! Pairing-Gast – tritt einer gescannten Session bei

use dolmetsch_core::{Clock, LanguageCode, PeerId, SessionId, SystemClock};
use dolmetsch_crypto::{
    constant_time_eq, generate_security_code, DeviceIdentity, KeyPair, SecurityCode,
    SessionKeyStore, SessionRole,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::{PairingError, PairingResult};
use crate::handshake;
use crate::qr::QrData;
use crate::signaling::{JoinerInfo, SignalingChannel};

/// Ergebnis eines erfolgreichen Beitritts
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub session_id: SessionId,
    /// Unter dieser PeerId liegt der Session-Schluessel im Store
    pub host_peer: PeerId,
    /// Sprachen des Hosts
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    /// Zum Vergleich mit dem Code auf dem Host-Geraet
    pub security_code: SecurityCode,
}

/// Gast-Seite des QR-Pairings
pub struct PairingGuest {
    identity: Arc<DeviceIdentity>,
    signaling: Arc<dyn SignalingChannel>,
    store: Arc<SessionKeyStore>,
    clock: Arc<dyn Clock>,
}

impl PairingGuest {
    pub fn new(
        identity: Arc<DeviceIdentity>,
        signaling: Arc<dyn SignalingChannel>,
        store: Arc<SessionKeyStore>,
    ) -> Self {
        Self::with_clock(identity, signaling, store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        identity: Arc<DeviceIdentity>,
        signaling: Arc<dyn SignalingChannel>,
        store: Arc<SessionKeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity,
            signaling,
            store,
            clock,
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.user_id()
    }

    /// Tritt der Session aus dem QR-Code bei
    ///
    /// Wartet auf die Antwort des Hosts; `cancel` bricht das Warten ab.
    /// Verwirft der Gast die Anfrage vor der Antwort, oeffnet der Host die
    /// Session wieder oder bricht sie ab. Ist die Antwort schon da, gilt
    /// der Beitritt und `cancel` wird ignoriert. Bei Erfolg liegt der
    /// Session-Schluessel unter der PeerId des Hosts im Store.
    pub async fn join_session(
        &self,
        qr: &QrData,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
        cancel: &CancellationToken,
    ) -> PairingResult<JoinedSession> {
        let jetzt = self.clock.now_millis();
        if qr.is_expired(jetzt) {
            return Err(PairingError::SessionExpired);
        }
        if cancel.is_cancelled() {
            return Err(PairingError::Cancelled);
        }

        let key_pair = KeyPair::generate();
        let eigener_schluessel = *key_pair.public_key();
        let joiner = JoinerInfo {
            bundle: self.identity.key_bundle(&eigener_schluessel, jetzt),
            proof: handshake::join_proof(&qr.secret, &eigener_schluessel, &qr.session_id)?,
            source_lang,
            target_lang,
        };

        tracing::debug!(session = %qr.session_id, "Join-Anfrage gesendet");
        // Antwort vor Abbruch: hat der Host schon zugesagt, ist er Established
        let host = tokio::select! {
            biased;
            antwort = self.signaling.join_session(qr.session_id, joiner) => antwort?,
            _ = cancel.cancelled() => {
                tracing::debug!(session = %qr.session_id, "Join abgebrochen");
                return Err(PairingError::Cancelled);
            }
        };

        let host_bundle = host.bundle.verify()?;
        if !constant_time_eq(&host_bundle.ephemeral_key, &qr.host_public_key) {
            tracing::warn!(session = %qr.session_id, "Host-Schluessel weicht vom QR-Code ab");
            return Err(PairingError::HostKeyMismatch);
        }

        let shared = key_pair.agree(&qr.host_public_key)?;
        let session_key = handshake::session_key(&shared, &qr.secret, &qr.session_id)?;
        self.store.establish(
            host_bundle.user_id,
            session_key,
            SessionRole::Guest,
            self.clock.now_millis(),
        )?;

        tracing::info!(session = %qr.session_id, host = %host_bundle.user_id, "Pairing abgeschlossen");
        Ok(JoinedSession {
            session_id: qr.session_id,
            host_peer: host_bundle.user_id,
            source_lang: host.source_lang,
            target_lang: host.target_lang,
            security_code: generate_security_code(&eigener_schluessel, &qr.host_public_key),
        })
    }
}

impl std::fmt::Debug for PairingGuest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingGuest")
            .field("peer_id", &self.peer_id())
            .finish_non_exhaustive()
    }
}
