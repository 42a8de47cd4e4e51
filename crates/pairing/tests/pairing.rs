//! Ende-zu-Ende Tests fuer Host und Gast ueber das In-Memory-Signaling

use async_trait::async_trait;
use dolmetsch_core::{Clock, LanguageCode, ManualClock, SessionId};
use dolmetsch_crypto::{DeviceIdentity, E2eConfig, FrameCipher, KeyPair, SessionKeyStore};
use dolmetsch_pairing::handshake::join_proof;
use dolmetsch_pairing::{
    parse_qr_data, HostInfo, HostPhase, InMemorySignaling, JoinRequest, JoinerInfo, PairingError,
    PairingEvent, PairingGuest, PairingHost, PairingResult, SignalingChannel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const TTL: Duration = Duration::from_secs(300);
const T0: i64 = 1_700_000_000_000;

fn sprache(code: &str) -> LanguageCode {
    LanguageCode::parse(code).unwrap()
}

struct Geraet {
    identity: Arc<DeviceIdentity>,
    store: Arc<SessionKeyStore>,
}

fn geraet() -> Geraet {
    Geraet {
        identity: Arc::new(DeviceIdentity::generate()),
        store: Arc::new(SessionKeyStore::default()),
    }
}

fn host_mit_uhr(
    signaling: Arc<dyn SignalingChannel>,
    clock: Arc<dyn Clock>,
) -> (PairingHost, Geraet) {
    let g = geraet();
    let host = PairingHost::with_clock(
        Arc::clone(&g.identity),
        signaling,
        Arc::clone(&g.store),
        TTL,
        clock,
    );
    (host, g)
}

fn gast_mit_uhr(
    signaling: Arc<dyn SignalingChannel>,
    clock: Arc<dyn Clock>,
) -> (PairingGuest, Geraet) {
    let g = geraet();
    let gast = PairingGuest::with_clock(
        Arc::clone(&g.identity),
        signaling,
        Arc::clone(&g.store),
        clock,
    );
    (gast, g)
}

async fn naechstes_event(events: &mut broadcast::Receiver<PairingEvent>) -> PairingEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("kein Event")
        .unwrap()
}

#[tokio::test]
async fn zwei_peers_pairen_und_tauschen_einen_frame() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, host_geraet) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, gast_geraet) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    assert_eq!(host.phase(), HostPhase::AwaitingScan);
    assert_eq!(session.expires_at(), T0 + 300_000);

    let qr = parse_qr_data(&host.generate_qr_data().unwrap()).unwrap();
    assert_eq!(qr.session_id, session.session_id());
    assert_eq!(&qr.host_public_key, session.host_public_key());

    let joined = gast
        .join_session(&qr, sprache("es"), sprache("en-us"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(joined.host_peer, host.peer_id());
    assert_eq!(joined.source_lang, sprache("en-us"));
    assert_eq!(joined.target_lang, sprache("es"));

    match naechstes_event(&mut events).await {
        PairingEvent::PeerFound {
            session_id,
            peer_id,
        } => {
            assert_eq!(session_id, session.session_id());
            assert_eq!(peer_id, gast.peer_id());
        }
        andere => panic!("unerwartetes Event: {andere:?}"),
    }
    match naechstes_event(&mut events).await {
        PairingEvent::PeerJoined {
            peer_id,
            security_code,
            source_lang,
            ..
        } => {
            assert_eq!(peer_id, gast.peer_id());
            assert_eq!(security_code, joined.security_code);
            assert_eq!(security_code.as_str().len(), 14);
            assert_eq!(source_lang, sprache("es"));
        }
        andere => panic!("unerwartetes Event: {andere:?}"),
    }
    assert_eq!(host.phase(), HostPhase::Established);
    assert!(matches!(
        host.generate_qr_data(),
        Err(PairingError::NoOpenSession)
    ));

    // Passende Richtungsschluessel, selbst bei gleicher ssrc
    let host_cipher = FrameCipher::new(host_geraet.store.clone(), E2eConfig::default(), 1);
    let gast_cipher = FrameCipher::new(gast_geraet.store.clone(), E2eConfig::default(), 1);
    let audio: Vec<u8> = (0..160u32).map(|i| (i % 251) as u8).collect();

    let zustand = host_geraet.store.get(&gast.peer_id()).unwrap();
    assert_eq!(zustand.counter(), 0);
    let frame = host_cipher.encrypt_frame(&gast.peer_id(), &audio).unwrap();
    assert_eq!(frame.counter, 1);
    assert_eq!(zustand.counter(), 1);

    let entschluesselt = gast_cipher.decrypt_frame(&host.peer_id(), &frame).unwrap();
    assert_eq!(entschluesselt.len(), 160);
    assert_eq!(entschluesselt, audio);

    // Und in die Gegenrichtung
    let antwort = gast_cipher.encrypt_frame(&host.peer_id(), b"hola").unwrap();
    assert_eq!(
        host_cipher.decrypt_frame(&gast.peer_id(), &antwort).unwrap(),
        b"hola"
    );
}

#[tokio::test]
async fn abgelaufene_session_auch_bei_anfrage_im_flug() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let host_uhr = Arc::new(ManualClock::new(T0));
    let (host, host_geraet) = host_mit_uhr(signaling.clone(), host_uhr.clone());
    // Die Uhr des Gasts geht nach: er haelt den Code noch fuer gueltig
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    let qr = session.qr_data().clone();

    host_uhr.advance(300_000);

    let result = gast
        .join_session(&qr, sprache("es"), sprache("en-us"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PairingError::SessionExpired)));

    assert!(matches!(
        naechstes_event(&mut events).await,
        PairingEvent::SessionExpired { session_id } if session_id == session.session_id()
    ));
    assert_eq!(host.phase(), HostPhase::Expired);
    assert!(host_geraet.store.is_empty());

    // Weitere Versuche scheitern ebenso
    let nochmal = gast
        .join_session(&qr, sprache("es"), sprache("en-us"), &CancellationToken::new())
        .await;
    assert!(matches!(nochmal, Err(PairingError::SessionExpired)));
}

#[tokio::test(start_paused = true)]
async fn ablauf_timer_schliesst_session() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, _) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();

    tokio::time::advance(TTL + Duration::from_secs(1)).await;

    assert!(matches!(
        naechstes_event(&mut events).await,
        PairingEvent::SessionExpired { .. }
    ));
    assert_eq!(host.phase(), HostPhase::Expired);
    assert!(matches!(
        host.generate_qr_data(),
        Err(PairingError::NoOpenSession)
    ));

    let result = gast
        .join_session(
            session.qr_data(),
            sprache("es"),
            sprache("en-us"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(PairingError::SessionExpired)));
}

#[tokio::test]
async fn genau_ein_gast_wird_angenommen() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, host_geraet) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let (gast, _) = gast_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
            let qr = session.qr_data().clone();
            tokio::spawn(async move {
                gast.join_session(&qr, sprache("es"), sprache("en-us"), &CancellationToken::new())
                    .await
            })
        })
        .collect();

    let mut erfolge = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => erfolge += 1,
            Err(PairingError::SessionAlreadyJoined) => {}
            Err(andere) => panic!("unerwarteter Fehler: {andere}"),
        }
    }
    assert_eq!(erfolge, 1);
    assert_eq!(host_geraet.store.len(), 1);
    assert_eq!(host.phase(), HostPhase::Established);
}

#[tokio::test]
async fn falsches_geheimnis_wird_abgelehnt() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, _) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    let mut falsch = session.qr_data().clone();
    falsch.secret[0] ^= 0xFF;

    let result = gast
        .join_session(&falsch, sprache("es"), sprache("en-us"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PairingError::InvalidSecret)));
    assert!(matches!(
        naechstes_event(&mut events).await,
        PairingEvent::Error { .. }
    ));

    // Session bleibt offen fuer den richtigen Gast
    assert_eq!(host.phase(), HostPhase::AwaitingScan);
    gast.join_session(
        session.qr_data(),
        sprache("es"),
        sprache("en-us"),
        &CancellationToken::new(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn abbrechen_ist_idempotent() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, _) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    host.cancel_session().await;
    host.cancel_session().await;

    assert_eq!(host.phase(), HostPhase::Cancelled);
    assert!(host.current_session().is_none());
    assert!(matches!(
        host.generate_qr_data(),
        Err(PairingError::NoOpenSession)
    ));

    let result = gast
        .join_session(
            session.qr_data(),
            sprache("es"),
            sprache("en-us"),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(PairingError::SessionCancelled)));
    assert!(matches!(
        events.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn neue_session_ersetzt_alte() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, _) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));

    let alt = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    let neu = host
        .create_session(sprache("en-us"), sprache("fr"))
        .await
        .unwrap();
    assert_ne!(alt.session_id(), neu.session_id());

    let result = gast
        .join_session(alt.qr_data(), sprache("es"), sprache("en-us"), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(PairingError::SessionCancelled)));

    let joined = gast
        .join_session(neu.qr_data(), sprache("fr"), sprache("en-us"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(joined.target_lang, sprache("fr"));
}

#[tokio::test]
async fn gast_bricht_vor_dem_senden_ab() {
    let signaling: Arc<dyn SignalingChannel> = Arc::new(InMemorySignaling::neu());
    let (host, _) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, _) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = gast
        .join_session(session.qr_data(), sprache("es"), sprache("en-us"), &cancel)
        .await;
    assert!(matches!(result, Err(PairingError::Cancelled)));
    assert_eq!(host.phase(), HostPhase::AwaitingScan);
}

// ---------------------------------------------------------------------------
// Signaling, bei dem der Test die Join-Anfragen selbst zustellt
// ---------------------------------------------------------------------------

#[derive(Default)]
struct HandSignaling {
    queue: parking_lot::Mutex<Option<mpsc::Sender<JoinRequest>>>,
}

#[async_trait]
impl SignalingChannel for HandSignaling {
    async fn announce_session(
        &self,
        _session_id: SessionId,
    ) -> PairingResult<mpsc::Receiver<JoinRequest>> {
        let (tx, rx) = mpsc::channel(4);
        *self.queue.lock() = Some(tx);
        Ok(rx)
    }

    async fn join_session(
        &self,
        _session_id: SessionId,
        _joiner: JoinerInfo,
    ) -> PairingResult<HostInfo> {
        Err(PairingError::signaling("nur manuell"))
    }

    async fn session_joined(&self, _session_id: SessionId) {}
    async fn session_expired(&self, _session_id: SessionId) {}
    async fn session_cancelled(&self, _session_id: SessionId) {}
}

fn gueltige_anfrage(qr: &dolmetsch_pairing::QrData) -> (DeviceIdentity, JoinerInfo) {
    let identity = DeviceIdentity::generate();
    let key_pair = KeyPair::generate();
    let joiner = JoinerInfo {
        bundle: identity.key_bundle(key_pair.public_key(), T0),
        proof: join_proof(&qr.secret, key_pair.public_key(), &qr.session_id).unwrap(),
        source_lang: sprache("es"),
        target_lang: sprache("en-us"),
    };
    (identity, joiner)
}

#[tokio::test]
async fn aufgegebener_gast_gibt_session_wieder_frei() {
    let signaling = Arc::new(HandSignaling::default());
    let (host, host_geraet) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let mut events = host.subscribe();

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();
    let tx = signaling.queue.lock().clone().unwrap();

    // Erster Gast wartet nicht mehr auf die Antwort
    let (_erster, joiner) = gueltige_anfrage(session.qr_data());
    let (anfrage, antwort) = JoinRequest::new(session.session_id(), joiner);
    drop(antwort);
    tx.send(anfrage).await.unwrap();

    // Zweiter Gast kommt danach dran und wird angenommen
    let (zweiter, joiner) = gueltige_anfrage(session.qr_data());
    let (anfrage, antwort) = JoinRequest::new(session.session_id(), joiner);
    tx.send(anfrage).await.unwrap();

    let host_info = antwort.await.unwrap().unwrap();
    assert_eq!(host_info.bundle.verify().unwrap().user_id, host.peer_id());
    assert_eq!(host.phase(), HostPhase::Established);
    assert_eq!(host_geraet.store.peers(), vec![zweiter.user_id()]);

    // Nur der zweite Gast wurde gefunden
    assert!(matches!(
        naechstes_event(&mut events).await,
        PairingEvent::PeerFound { peer_id, .. } if peer_id == zweiter.user_id()
    ));
    assert!(matches!(
        naechstes_event(&mut events).await,
        PairingEvent::PeerJoined { peer_id, .. } if peer_id == zweiter.user_id()
    ));
}

// ---------------------------------------------------------------------------
// Abbruch, nachdem der Host schon geantwortet hat
// ---------------------------------------------------------------------------

/// Stellt ueber In-Memory-Signaling zu und loest `cancel` aus, sobald die
/// Antwort des Hosts da ist
struct AbbruchNachAntwort {
    inner: InMemorySignaling,
    cancel: CancellationToken,
}

#[async_trait]
impl SignalingChannel for AbbruchNachAntwort {
    async fn announce_session(
        &self,
        session_id: SessionId,
    ) -> PairingResult<mpsc::Receiver<JoinRequest>> {
        self.inner.announce_session(session_id).await
    }

    async fn join_session(
        &self,
        session_id: SessionId,
        joiner: JoinerInfo,
    ) -> PairingResult<HostInfo> {
        let antwort = self.inner.join_session(session_id, joiner).await;
        self.cancel.cancel();
        // Abbruch-Zweig ist jetzt bereit, die Antwort ebenso
        tokio::task::yield_now().await;
        antwort
    }

    async fn session_joined(&self, session_id: SessionId) {
        self.inner.session_joined(session_id).await;
    }
    async fn session_expired(&self, session_id: SessionId) {
        self.inner.session_expired(session_id).await;
    }
    async fn session_cancelled(&self, session_id: SessionId) {
        self.inner.session_cancelled(session_id).await;
    }
}

#[tokio::test]
async fn abbruch_nach_zusage_des_hosts_laesst_beide_seiten_gekoppelt() {
    let cancel = CancellationToken::new();
    let signaling: Arc<dyn SignalingChannel> = Arc::new(AbbruchNachAntwort {
        inner: InMemorySignaling::neu(),
        cancel: cancel.clone(),
    });
    let (host, host_geraet) = host_mit_uhr(signaling.clone(), Arc::new(ManualClock::new(T0)));
    let (gast, gast_geraet) = gast_mit_uhr(signaling, Arc::new(ManualClock::new(T0)));

    let session = host
        .create_session(sprache("en-us"), sprache("es"))
        .await
        .unwrap();

    let joined = gast
        .join_session(session.qr_data(), sprache("es"), sprache("en-us"), &cancel)
        .await
        .unwrap();
    assert!(cancel.is_cancelled());

    assert_eq!(host.phase(), HostPhase::Established);
    assert_eq!(host_geraet.store.peers(), vec![gast.peer_id()]);
    assert_eq!(gast_geraet.store.peers(), vec![joined.host_peer]);

    // Beide Stores sind benutzbar
    let host_cipher = FrameCipher::new(host_geraet.store.clone(), E2eConfig::default(), 1);
    let gast_cipher = FrameCipher::new(gast_geraet.store.clone(), E2eConfig::default(), 2);
    let frame = gast_cipher
        .encrypt_frame(&joined.host_peer, b"noch da")
        .unwrap();
    assert_eq!(
        host_cipher.decrypt_frame(&gast.peer_id(), &frame).unwrap(),
        b"noch da"
    );
}
