//! Signaling-Abstraktion fuer das Pairing
//!
//! Der Host meldet seine Session an und bekommt Join-Anfragen ueber eine
//! Queue zugestellt. Jede Anfrage traegt einen One-Shot-Kanal fuer die
//! Antwort an den Gast. Der konkrete Transport (Relay-Server, lokales
//! Netz, ...) liegt ausserhalb dieses Crates; `InMemorySignaling` dient
//! Tests und der CLI.

use async_trait::async_trait;
use dashmap::DashMap;
use dolmetsch_core::{LanguageCode, SessionId};
use dolmetsch_crypto::KeyBundle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{PairingError, PairingResult};

/// Groesse der Join-Queue pro Session
const JOIN_QUEUE_GROESSE: usize = 16;

/// Was der Gast beim Beitritt schickt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinerInfo {
    /// Signiertes Bundle mit dem ephemeren Schluessel des Gasts
    pub bundle: KeyBundle,
    /// HKDF(QR-Geheimnis, Gast-Schluessel | Session-ID)
    pub proof: Vec<u8>,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
}

/// Antwort des Hosts auf einen erfolgreichen Beitritt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub bundle: KeyBundle,
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
}

/// Eine beim Host eingegangene Join-Anfrage
#[derive(Debug)]
pub struct JoinRequest {
    pub session_id: SessionId,
    pub joiner: JoinerInfo,
    antwort: oneshot::Sender<PairingResult<HostInfo>>,
}

impl JoinRequest {
    pub fn new(
        session_id: SessionId,
        joiner: JoinerInfo,
    ) -> (Self, oneshot::Receiver<PairingResult<HostInfo>>) {
        let (antwort, rx) = oneshot::channel();
        (
            Self {
                session_id,
                joiner,
                antwort,
            },
            rx,
        )
    }

    /// `true` wenn der Gast nicht mehr auf eine Antwort wartet
    pub fn is_abandoned(&self) -> bool {
        self.antwort.is_closed()
    }

    /// Schickt die Antwort an den Gast
    ///
    /// Gibt `false` zurueck wenn der Gast inzwischen aufgegeben hat.
    pub fn respond(self, result: PairingResult<HostInfo>) -> bool {
        self.antwort.send(result).is_ok()
    }
}

/// Transport zwischen Host und Gast waehrend des Pairings
#[async_trait]
pub trait SignalingChannel: Send + Sync + 'static {
    /// Meldet eine Session an; Join-Anfragen kommen ueber den Receiver
    async fn announce_session(
        &self,
        session_id: SessionId,
    ) -> PairingResult<mpsc::Receiver<JoinRequest>>;

    /// Stellt eine Join-Anfrage zu und wartet auf die Antwort des Hosts
    async fn join_session(
        &self,
        session_id: SessionId,
        joiner: JoinerInfo,
    ) -> PairingResult<HostInfo>;

    /// Session wurde von genau einem Gast belegt
    async fn session_joined(&self, session_id: SessionId);

    /// Session ist abgelaufen
    async fn session_expired(&self, session_id: SessionId);

    /// Host hat die Session abgebrochen
    async fn session_cancelled(&self, session_id: SessionId);
}

// ---------------------------------------------------------------------------
// InMemorySignaling
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum SessionSlot {
    Offen(mpsc::Sender<JoinRequest>),
    Belegt,
    Abgelaufen,
    Abgebrochen,
}

impl SessionSlot {
    fn fehler(&self) -> PairingError {
        match self {
            Self::Offen(_) => PairingError::SessionCancelled,
            Self::Belegt => PairingError::SessionAlreadyJoined,
            Self::Abgelaufen => PairingError::SessionExpired,
            Self::Abgebrochen => PairingError::SessionCancelled,
        }
    }
}

/// Signaling im selben Prozess (Host und Gast teilen sich eine Instanz)
///
/// Clone teilt den inneren Zustand.
#[derive(Debug, Clone, Default)]
pub struct InMemorySignaling {
    sessions: Arc<DashMap<SessionId, SessionSlot>>,
}

impl InMemorySignaling {
    pub fn neu() -> Self {
        Self::default()
    }

    fn markieren(&self, session_id: SessionId, slot: SessionSlot) {
        if let Some(mut eintrag) = self.sessions.get_mut(&session_id) {
            *eintrag = slot;
        }
    }

    fn fehler_fuer(&self, session_id: &SessionId) -> PairingError {
        self.sessions
            .get(session_id)
            .map(|slot| slot.fehler())
            .unwrap_or(PairingError::UnknownSession)
    }
}

#[async_trait]
impl SignalingChannel for InMemorySignaling {
    async fn announce_session(
        &self,
        session_id: SessionId,
    ) -> PairingResult<mpsc::Receiver<JoinRequest>> {
        let (tx, rx) = mpsc::channel(JOIN_QUEUE_GROESSE);
        self.sessions.insert(session_id, SessionSlot::Offen(tx));
        tracing::debug!(session = %session_id, "Session beim Signaling angemeldet");
        Ok(rx)
    }

    async fn join_session(
        &self,
        session_id: SessionId,
        joiner: JoinerInfo,
    ) -> PairingResult<HostInfo> {
        // Sender klonen, keine DashMap-Referenz ueber ein await halten
        let tx = match self.sessions.get(&session_id).as_deref() {
            Some(SessionSlot::Offen(tx)) => tx.clone(),
            Some(slot) => return Err(slot.fehler()),
            None => return Err(PairingError::UnknownSession),
        };

        let (anfrage, antwort) = JoinRequest::new(session_id, joiner);
        if tx.send(anfrage).await.is_err() {
            return Err(self.fehler_fuer(&session_id));
        }

        match antwort.await {
            Ok(result) => result,
            // Host hat die Anfrage verworfen ohne zu antworten
            Err(_) => Err(self.fehler_fuer(&session_id)),
        }
    }

    async fn session_joined(&self, session_id: SessionId) {
        self.markieren(session_id, SessionSlot::Belegt);
    }

    async fn session_expired(&self, session_id: SessionId) {
        self.markieren(session_id, SessionSlot::Abgelaufen);
    }

    async fn session_cancelled(&self, session_id: SessionId) {
        self.markieren(session_id, SessionSlot::Abgebrochen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dolmetsch_crypto::DeviceIdentity;

    fn joiner() -> JoinerInfo {
        let identity = DeviceIdentity::generate();
        JoinerInfo {
            bundle: identity.key_bundle(&[1u8; 32], 0),
            proof: vec![0u8; 32],
            source_lang: LanguageCode::parse("es").unwrap(),
            target_lang: LanguageCode::parse("en-us").unwrap(),
        }
    }

    #[tokio::test]
    async fn unbekannte_session() {
        let signaling = InMemorySignaling::neu();
        let result = signaling.join_session(SessionId::new(), joiner()).await;
        assert!(matches!(result, Err(PairingError::UnknownSession)));
    }

    #[tokio::test]
    async fn anfrage_wird_zugestellt_und_beantwortet() {
        let signaling = InMemorySignaling::neu();
        let session = SessionId::new();
        let mut anfragen = signaling.announce_session(session).await.unwrap();

        let host = tokio::spawn(async move {
            let anfrage = anfragen.recv().await.unwrap();
            assert_eq!(anfrage.session_id, session);
            assert!(!anfrage.is_abandoned());
            anfrage.respond(Err(PairingError::InvalidSecret))
        });

        let result = signaling.join_session(session, joiner()).await;
        assert!(matches!(result, Err(PairingError::InvalidSecret)));
        assert!(host.await.unwrap());
    }

    #[tokio::test]
    async fn markierte_sessions_lehnen_ab() {
        let signaling = InMemorySignaling::neu();
        let a = SessionId::new();
        let b = SessionId::new();
        let c = SessionId::new();
        let _ra = signaling.announce_session(a).await.unwrap();
        let _rb = signaling.announce_session(b).await.unwrap();
        let _rc = signaling.announce_session(c).await.unwrap();

        signaling.session_joined(a).await;
        signaling.session_expired(b).await;
        signaling.session_cancelled(c).await;

        assert!(matches!(
            signaling.join_session(a, joiner()).await,
            Err(PairingError::SessionAlreadyJoined)
        ));
        assert!(matches!(
            signaling.join_session(b, joiner()).await,
            Err(PairingError::SessionExpired)
        ));
        assert!(matches!(
            signaling.join_session(c, joiner()).await,
            Err(PairingError::SessionCancelled)
        ));
    }

    #[tokio::test]
    async fn host_verschwindet() {
        let signaling = InMemorySignaling::neu();
        let session = SessionId::new();
        let anfragen = signaling.announce_session(session).await.unwrap();
        drop(anfragen);

        let result = signaling.join_session(session, joiner()).await;
        assert!(matches!(result, Err(PairingError::SessionCancelled)));
    }
}
