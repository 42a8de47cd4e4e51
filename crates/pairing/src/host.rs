//! Pairing-Host – zeigt den QR-Code und nimmt genau einen Gast an
//!
//! ## Zustaende
//! ```text
//! Idle -> AwaitingScan -> PeerFound -> Established
//!                      \-> Expired | Cancelled
//! ```
//!
//! Pro Session laeuft ein Task, der Join-Anfragen abarbeitet und den
//! Ablauf-Timer haelt. Join, Abbruch und Ablauf beenden den Task; danach
//! feuert kein Timer mehr.
//!
//! `PeerFound` haelt nur fuer die Dauer des Handshakes unter dem
//! Zustands-Lock. Nach aussen sichtbar wird er als
//! [`PairingEvent::PeerFound`], gefolgt von `PeerJoined` oder `Error`.

use dolmetsch_core::{Clock, LanguageCode, PeerId, SessionId, SystemClock};
use dolmetsch_crypto::{
    constant_time_eq, generate_security_code, DeviceIdentity, KeyPair, SecurityCode,
    SessionKeyStore, SessionRole,
};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

use crate::error::{PairingError, PairingResult};
use crate::handshake;
use crate::qr::QrData;
use crate::signaling::{HostInfo, JoinRequest, SignalingChannel};

/// Groesse des Broadcast-Kanals fuer Pairing-Events
const EVENT_KANAL_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Zustand und Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPhase {
    Idle,
    AwaitingScan,
    /// Gast hat das Geheimnis nachgewiesen, Schluessel wird vereinbart
    ///
    /// Nur innerhalb des Handshakes gesetzt; `phase()` liefert danach
    /// bereits den Folgezustand.
    PeerFound,
    Established,
    Expired,
    Cancelled,
}

/// Events die der PairingHost versendet
#[derive(Debug, Clone)]
pub enum PairingEvent {
    /// Gast hat Bundle und Join-Nachweis erfolgreich vorgelegt
    PeerFound {
        session_id: SessionId,
        peer_id: PeerId,
    },
    /// Gast ist beigetreten, Session-Schluessel liegt im Store
    PeerJoined {
        session_id: SessionId,
        peer_id: PeerId,
        security_code: SecurityCode,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
    },
    /// QR-Code ist abgelaufen ohne Beitritt
    SessionExpired { session_id: SessionId },
    /// Fehlgeschlagener Join-Versuch oder abgebrochener Handshake
    Error {
        session_id: SessionId,
        message: String,
    },
}

/// Vom Host angezeigte Pairing-Session
#[derive(Debug, Clone)]
pub struct QrSession {
    qr: QrData,
    created_at: i64,
    source_lang: LanguageCode,
    target_lang: LanguageCode,
}

impl QrSession {
    pub fn session_id(&self) -> SessionId {
        self.qr.session_id
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn expires_at(&self) -> i64 {
        self.qr.expires_at
    }

    pub fn source_lang(&self) -> &LanguageCode {
        &self.source_lang
    }

    pub fn target_lang(&self) -> &LanguageCode {
        &self.target_lang
    }

    pub fn host_public_key(&self) -> &[u8; 32] {
        &self.qr.host_public_key
    }

    pub fn qr_data(&self) -> &QrData {
        &self.qr
    }
}

struct OffeneSession {
    session: QrSession,
    cancel: CancellationToken,
}

struct HostZustand {
    phase: HostPhase,
    offen: Option<OffeneSession>,
}

impl HostZustand {
    fn ist_aktuell(&self, session_id: SessionId) -> bool {
        self.offen
            .as_ref()
            .is_some_and(|o| o.session.session_id() == session_id)
    }
}

// ---------------------------------------------------------------------------
// PairingHost
// ---------------------------------------------------------------------------

/// Host-Seite des QR-Pairings
///
/// Clone teilt den inneren Zustand. Hoechstens eine Session ist offen;
/// eine neue ersetzt die alte.
#[derive(Clone)]
pub struct PairingHost {
    inner: Arc<HostInner>,
}

struct HostInner {
    identity: Arc<DeviceIdentity>,
    signaling: Arc<dyn SignalingChannel>,
    store: Arc<SessionKeyStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    event_tx: broadcast::Sender<PairingEvent>,
    zustand: Mutex<HostZustand>,
}

impl PairingHost {
    pub fn new(
        identity: Arc<DeviceIdentity>,
        signaling: Arc<dyn SignalingChannel>,
        store: Arc<SessionKeyStore>,
        ttl: Duration,
    ) -> Self {
        Self::with_clock(identity, signaling, store, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        identity: Arc<DeviceIdentity>,
        signaling: Arc<dyn SignalingChannel>,
        store: Arc<SessionKeyStore>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(HostInner {
                identity,
                signaling,
                store,
                clock,
                ttl,
                event_tx,
                zustand: Mutex::new(HostZustand {
                    phase: HostPhase::Idle,
                    offen: None,
                }),
            }),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.inner.identity.user_id()
    }

    pub fn phase(&self) -> HostPhase {
        self.inner.zustand.lock().phase
    }

    /// Neuer Listener; Drop des Receivers meldet ihn wieder ab
    pub fn subscribe(&self) -> broadcast::Receiver<PairingEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Die aktuell offene Session, falls vorhanden
    pub fn current_session(&self) -> Option<QrSession> {
        self.inner
            .zustand
            .lock()
            .offen
            .as_ref()
            .map(|o| o.session.clone())
    }

    /// Erstellt eine neue Session und meldet sie beim Signaling an
    ///
    /// Eine noch offene Session wird vorher abgebrochen.
    pub async fn create_session(
        &self,
        source_lang: LanguageCode,
        target_lang: LanguageCode,
    ) -> PairingResult<QrSession> {
        self.cancel_session().await;

        let key_pair = KeyPair::generate();
        let mut secret = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *secret);
        let session_id = SessionId::new();

        let created_at = self.inner.clock.now_millis();
        let ttl_ms = i64::try_from(self.inner.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = created_at.saturating_add(ttl_ms);

        let anfragen = self.inner.signaling.announce_session(session_id).await?;

        let session = QrSession {
            qr: QrData {
                session_id,
                secret: *secret,
                host_public_key: *key_pair.public_key(),
                expires_at,
            },
            created_at,
            source_lang: source_lang.clone(),
            target_lang: target_lang.clone(),
        };
        let cancel = CancellationToken::new();

        let verdraengt = {
            let mut zustand = self.inner.zustand.lock();
            zustand.phase = HostPhase::AwaitingScan;
            zustand.offen.replace(OffeneSession {
                session: session.clone(),
                cancel: cancel.clone(),
            })
        };
        // Paralleles create_session hat zwischenzeitlich eine Session geoeffnet
        if let Some(alt) = verdraengt {
            alt.cancel.cancel();
            self.inner
                .signaling
                .session_cancelled(alt.session.session_id())
                .await;
        }

        let task = SessionTask {
            inner: Arc::clone(&self.inner),
            session_id,
            secret,
            key_pair: Some(key_pair),
            expires_at,
            source_lang,
            target_lang,
            cancel,
        };
        tokio::spawn(task.run(anfragen, Instant::now() + self.inner.ttl));

        tracing::info!(
            session = %session_id,
            ttl_secs = self.inner.ttl.as_secs(),
            "Pairing-Session erstellt"
        );
        Ok(session)
    }

    /// QR-Payload der offenen Session
    pub fn generate_qr_data(&self) -> PairingResult<String> {
        let zustand = self.inner.zustand.lock();
        match (&zustand.offen, zustand.phase) {
            (Some(offen), HostPhase::AwaitingScan) => Ok(offen.session.qr.encode()),
            _ => Err(PairingError::NoOpenSession),
        }
    }

    /// Bricht die offene Session ab. Idempotent.
    pub async fn cancel_session(&self) {
        let alt = {
            let mut zustand = self.inner.zustand.lock();
            let alt = zustand.offen.take();
            if alt.is_some() {
                zustand.phase = HostPhase::Cancelled;
            }
            alt
        };

        if let Some(alt) = alt {
            let session_id = alt.session.session_id();
            alt.cancel.cancel();
            self.inner.signaling.session_cancelled(session_id).await;
            tracing::info!(session = %session_id, "Pairing-Session abgebrochen");
        }
    }
}

impl std::fmt::Debug for PairingHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingHost")
            .field("peer_id", &self.peer_id())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Session-Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ausgang {
    Weiter,
    Beigetreten,
    Abgelaufen,
    /// Von aussen abgebrochen (cancel_session)
    Gestoppt,
    /// Handshake nach Reservierung gescheitert
    Abgebrochen,
}

impl Ausgang {
    fn fehler(self) -> PairingError {
        match self {
            Self::Beigetreten | Self::Weiter => PairingError::SessionAlreadyJoined,
            Self::Abgelaufen => PairingError::SessionExpired,
            Self::Gestoppt | Self::Abgebrochen => PairingError::SessionCancelled,
        }
    }
}

struct SessionTask {
    inner: Arc<HostInner>,
    session_id: SessionId,
    secret: Zeroizing<[u8; 32]>,
    /// Wird beim erfolgreichen Join verbraucht
    key_pair: Option<KeyPair>,
    expires_at: i64,
    source_lang: LanguageCode,
    target_lang: LanguageCode,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(mut self, mut anfragen: mpsc::Receiver<JoinRequest>, deadline: Instant) {
        let ausgang = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ausgang::Gestoppt,
                _ = tokio::time::sleep_until(deadline) => break Ausgang::Abgelaufen,
                anfrage = anfragen.recv() => match anfrage {
                    Some(anfrage) => match self.bearbeiten(anfrage) {
                        Ausgang::Weiter => continue,
                        ende => break ende,
                    },
                    None => {
                        tracing::warn!(session = %self.session_id, "Signaling hat die Join-Queue geschlossen");
                        break Ausgang::Gestoppt;
                    }
                },
            }
        };

        match ausgang {
            Ausgang::Beigetreten => self.inner.signaling.session_joined(self.session_id).await,
            Ausgang::Abgelaufen => self.ablaufen().await,
            Ausgang::Abgebrochen => self.inner.signaling.session_cancelled(self.session_id).await,
            Ausgang::Gestoppt | Ausgang::Weiter => {}
        }

        // Wartende Gaeste bekommen eine eindeutige Absage
        anfragen.close();
        while let Some(anfrage) = anfragen.recv().await {
            anfrage.respond(Err(ausgang.fehler()));
        }
        tracing::debug!(session = %self.session_id, ?ausgang, "Pairing-Task beendet");
    }

    /// Prueft eine Join-Anfrage und schliesst bei Erfolg den Handshake ab
    ///
    /// Laeuft komplett unter dem Zustands-Lock: Ablauf, Abbruch und ein
    /// zweiter Join koennen nicht dazwischenkommen.
    fn bearbeiten(&mut self, anfrage: JoinRequest) -> Ausgang {
        let mut zustand = self.inner.zustand.lock();

        if !zustand.ist_aktuell(self.session_id) {
            anfrage.respond(Err(PairingError::SessionCancelled));
            return Ausgang::Gestoppt;
        }
        if zustand.phase != HostPhase::AwaitingScan {
            anfrage.respond(Err(PairingError::SessionAlreadyJoined));
            return Ausgang::Weiter;
        }
        // Massgeblich ist der Zeitpunkt der Bearbeitung, nicht des Absendens
        if self.inner.clock.now_millis() >= self.expires_at {
            tracing::debug!(session = %self.session_id, "Join-Anfrage nach Ablauf");
            anfrage.respond(Err(PairingError::SessionExpired));
            return Ausgang::Abgelaufen;
        }

        let gast = match anfrage.joiner.bundle.verify() {
            Ok(gast) => gast,
            Err(e) => {
                tracing::warn!(session = %self.session_id, fehler = %e, "KeyBundle des Gasts ungueltig");
                self.fehler_melden(format!("Ungueltiges KeyBundle: {e}"));
                anfrage.respond(Err(e.into()));
                return Ausgang::Weiter;
            }
        };

        let nachweis_ok = handshake::join_proof(&self.secret, &gast.ephemeral_key, &self.session_id)
            .map(|erwartet| constant_time_eq(&erwartet, &anfrage.joiner.proof))
            .unwrap_or(false);
        if !nachweis_ok {
            tracing::warn!(session = %self.session_id, peer = %gast.user_id, "Join mit falschem Geheimnis");
            self.fehler_melden("Join mit falschem Geheimnis".to_string());
            anfrage.respond(Err(PairingError::InvalidSecret));
            return Ausgang::Weiter;
        }

        zustand.phase = HostPhase::PeerFound;

        if anfrage.is_abandoned() {
            zustand.phase = HostPhase::AwaitingScan;
            tracing::debug!(session = %self.session_id, peer = %gast.user_id, "Gast hat aufgegeben, Session wieder offen");
            return Ausgang::Weiter;
        }

        let Some(key_pair) = self.key_pair.take() else {
            anfrage.respond(Err(PairingError::SessionAlreadyJoined));
            return Ausgang::Weiter;
        };
        let host_public_key = *key_pair.public_key();
        let _ = self.inner.event_tx.send(PairingEvent::PeerFound {
            session_id: self.session_id,
            peer_id: gast.user_id,
        });

        let jetzt = self.inner.clock.now_millis();
        let etabliert = key_pair
            .agree(&gast.ephemeral_key)
            .and_then(|dh| handshake::session_key(&dh, &self.secret, &self.session_id))
            .and_then(|key| {
                self.inner
                    .store
                    .establish(gast.user_id, key, SessionRole::Host, jetzt)
            });
        if let Err(e) = etabliert {
            zustand.phase = HostPhase::Cancelled;
            zustand.offen = None;
            tracing::warn!(session = %self.session_id, fehler = %e, "Schluesselvereinbarung fehlgeschlagen");
            self.fehler_melden(format!("Schluesselvereinbarung fehlgeschlagen: {e}"));
            anfrage.respond(Err(e.into()));
            return Ausgang::Abgebrochen;
        }

        let gast_quelle = anfrage.joiner.source_lang.clone();
        let gast_ziel = anfrage.joiner.target_lang.clone();
        let antwort = HostInfo {
            bundle: self.inner.identity.key_bundle(&host_public_key, jetzt),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        };

        if !anfrage.respond(Ok(antwort)) {
            // Gast ist zwischen Pruefung und Antwort verschwunden
            self.inner.store.destroy(&gast.user_id);
            zustand.phase = HostPhase::Cancelled;
            zustand.offen = None;
            tracing::warn!(session = %self.session_id, peer = %gast.user_id, "Gast nach Schluesselvereinbarung verschwunden");
            self.fehler_melden("Gast nach Schluesselvereinbarung verschwunden".to_string());
            return Ausgang::Abgebrochen;
        }

        zustand.phase = HostPhase::Established;
        zustand.offen = None;

        let security_code = generate_security_code(&host_public_key, &gast.ephemeral_key);
        tracing::info!(session = %self.session_id, peer = %gast.user_id, "Gast beigetreten");
        let _ = self.inner.event_tx.send(PairingEvent::PeerJoined {
            session_id: self.session_id,
            peer_id: gast.user_id,
            security_code,
            source_lang: gast_quelle,
            target_lang: gast_ziel,
        });
        Ausgang::Beigetreten
    }

    async fn ablaufen(&self) {
        let war_offen = {
            let mut zustand = self.inner.zustand.lock();
            if zustand.ist_aktuell(self.session_id) {
                zustand.offen = None;
                zustand.phase = HostPhase::Expired;
                true
            } else {
                false
            }
        };
        if !war_offen {
            return;
        }

        tracing::info!(session = %self.session_id, "Pairing-Session abgelaufen");
        let _ = self.inner.event_tx.send(PairingEvent::SessionExpired {
            session_id: self.session_id,
        });
        self.inner.signaling.session_expired(self.session_id).await;
    }

    fn fehler_melden(&self, message: String) {
        let _ = self.inner.event_tx.send(PairingEvent::Error {
            session_id: self.session_id,
            message,
        });
    }
}
