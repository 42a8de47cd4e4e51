//! Tests fuer den Session-Treiber mit Fake-Mikrofon und Fake-Transport

use async_trait::async_trait;
use dolmetsch_core::{CallSettings, LanguageCode, PeerId, SettingsStore, Speaker};
use dolmetsch_crypto::{E2eConfig, FrameCipher, SessionKeyStore, SessionRole};
use dolmetsch_stream::{
    ConnectionState, MediaFrame, MediaSource, ReconnectPolicy, SessionEvent, SessionPhase,
    StreamError, StreamResult, StreamingSession, TranscriptSegment, TranscriptUpdate,
    TranslationTransport, TransportEvent,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

#[derive(Default)]
struct FakeMikrofon {
    fehlt: AtomicBool,
    frames: Mutex<Option<mpsc::Sender<MediaFrame>>>,
    freigaben: AtomicU32,
}

impl FakeMikrofon {
    async fn sprechen(&self, frame: MediaFrame) {
        let tx = self.frames.lock().clone().expect("Mikrofon nicht offen");
        tx.send(frame).await.unwrap();
    }
}

#[async_trait]
impl MediaSource for FakeMikrofon {
    async fn acquire(&self) -> StreamResult<mpsc::Receiver<MediaFrame>> {
        if self.fehlt.load(Ordering::SeqCst) {
            return Err(StreamError::NoMicrophone);
        }
        let (tx, rx) = mpsc::channel(32);
        *self.frames.lock() = Some(tx);
        Ok(rx)
    }

    async fn release(&self) {
        self.frames.lock().take();
        self.freigaben.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeDienst {
    verbindungen: AtomicU32,
    /// Verbindungsversuche ab diesem Index scheitern
    fehler_ab: AtomicU32,
    haengt: AtomicBool,
    aktuell: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    gesendet: mpsc::UnboundedSender<MediaFrame>,
}

impl FakeDienst {
    fn neu() -> (Arc<Self>, mpsc::UnboundedReceiver<MediaFrame>) {
        let (gesendet, rx) = mpsc::unbounded_channel();
        let dienst = Arc::new(Self {
            verbindungen: AtomicU32::new(0),
            fehler_ab: AtomicU32::new(u32::MAX),
            haengt: AtomicBool::new(false),
            aktuell: Mutex::new(None),
            gesendet,
        });
        (dienst, rx)
    }

    async fn melden(&self, event: TransportEvent) {
        let tx = self.aktuell.lock().clone().expect("keine Verbindung");
        tx.send(event).await.unwrap();
    }

    fn verbindungen(&self) -> u32 {
        self.verbindungen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationTransport for FakeDienst {
    async fn connect(
        &self,
        _settings: &CallSettings,
    ) -> StreamResult<mpsc::Receiver<TransportEvent>> {
        let n = self.verbindungen.fetch_add(1, Ordering::SeqCst);
        if self.haengt.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if n >= self.fehler_ab.load(Ordering::SeqCst) {
            return Err(StreamError::transport("Dienst nicht erreichbar"));
        }
        let (tx, rx) = mpsc::channel(32);
        *self.aktuell.lock() = Some(tx);
        Ok(rx)
    }

    async fn send_frame(&self, frame: MediaFrame) -> StreamResult<()> {
        self.gesendet
            .send(frame)
            .map_err(|_| StreamError::transport("geschlossen"))
    }

    async fn disconnect(&self) {}
}

fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        connect_timeout: Duration::from_secs(1),
    }
}

fn settings() -> SettingsStore {
    SettingsStore::neu(CallSettings {
        source_lang: LanguageCode::parse("de").unwrap(),
        target_lang: LanguageCode::parse("es").unwrap(),
        auto_reconnect: true,
    })
}

struct Aufbau {
    session: StreamingSession,
    mikro: Arc<FakeMikrofon>,
    dienst: Arc<FakeDienst>,
    gesendet: mpsc::UnboundedReceiver<MediaFrame>,
    settings: SettingsStore,
}

fn aufbauen(policy: ReconnectPolicy) -> Aufbau {
    let mikro = Arc::new(FakeMikrofon::default());
    let (dienst, gesendet) = FakeDienst::neu();
    let settings = settings();
    let session = StreamingSession::new(
        Arc::clone(&mikro) as Arc<dyn MediaSource>,
        Arc::clone(&dienst) as Arc<dyn TranslationTransport>,
        settings.clone(),
        policy,
    );
    Aufbau {
        session,
        mikro,
        dienst,
        gesendet,
        settings,
    }
}

/// Sammelt Zustandswechsel bis `ziel` erreicht ist
async fn phasen_bis(
    events: &mut broadcast::Receiver<SessionEvent>,
    ziel: SessionPhase,
) -> Vec<SessionPhase> {
    tokio::time::timeout(Duration::from_secs(600), async {
        let mut phasen = Vec::new();
        loop {
            if let SessionEvent::StateChanged { phase, .. } = events.recv().await.unwrap() {
                phasen.push(phase);
                if phase == ziel {
                    return phasen;
                }
            }
        }
    })
    .await
    .expect("Zielzustand nicht erreicht")
}

async fn naechstes_transkript(events: &mut broadcast::Receiver<SessionEvent>) -> TranscriptUpdate {
    loop {
        if let SessionEvent::Transcript(update) = events.recv().await.unwrap() {
            return update;
        }
    }
}

#[tokio::test]
async fn start_verbindet() {
    let a = aufbauen(policy());
    let mut events = a.session.subscribe();
    assert_eq!(a.session.phase(), SessionPhase::Idle);
    assert_eq!(a.session.connection_state(), ConnectionState::Disconnected);

    a.session.start().await.unwrap();

    assert_eq!(a.session.connection_state(), ConnectionState::Connected);
    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Connected).await,
        vec![
            SessionPhase::Preparing,
            SessionPhase::Connecting,
            SessionPhase::Connected
        ]
    );
    assert_eq!(a.dienst.verbindungen(), 1);

    // Doppelter Start ist ein ungueltiger Uebergang
    assert!(matches!(
        a.session.start().await,
        Err(StreamError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn transkript_abgleich_ueber_den_dienst() {
    let a = aufbauen(policy());
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();

    let segmente = [
        TranscriptSegment::partial(Speaker::Local, "hel", 1),
        TranscriptSegment::partial(Speaker::Local, "hello", 2),
        TranscriptSegment::final_segment(Speaker::Local, "hello there", Some("hola".into()), 3),
        // verspaetet und doppelt: beides ohne Wirkung
        TranscriptSegment::partial(Speaker::Local, "hello th", 2),
        TranscriptSegment::final_segment(Speaker::Local, "hello there", Some("hola".into()), 3),
        TranscriptSegment::final_segment(Speaker::Local, "bye", None, 5),
    ];
    for segment in segmente {
        a.dienst.melden(TransportEvent::Segment(segment)).await;
    }

    let mut updates = Vec::new();
    loop {
        let update = naechstes_transkript(&mut events).await;
        let fertig = matches!(&update, TranscriptUpdate::Final(s) if s.source_text == "bye");
        updates.push(update);
        if fertig {
            break;
        }
    }

    assert_eq!(updates.len(), 4);
    assert!(matches!(&updates[1], TranscriptUpdate::Partial(s) if s.source_text == "hello"));
    assert!(matches!(&updates[2], TranscriptUpdate::Final(s) if s.source_text == "hello there"));

    let log = a.session.transcript();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].translated_text.as_deref(), Some("hola"));
    assert!(a.session.partials().is_empty());
}

#[tokio::test]
async fn frames_werden_weitergeleitet() {
    let mut a = aufbauen(policy());
    a.session.start().await.unwrap();

    let frame = MediaFrame {
        data: vec![7; 160],
        timestamp: 42,
    };
    a.mikro.sprechen(frame.clone()).await;

    let angekommen = tokio::time::timeout(Duration::from_secs(5), a.gesendet.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(!a.session.is_encrypted());
    assert_eq!(angekommen, frame);
}

#[tokio::test(start_paused = true)]
async fn reconnect_nach_abbruch() {
    let a = aufbauen(policy());
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();
    phasen_bis(&mut events, SessionPhase::Connected).await;

    a.dienst
        .melden(TransportEvent::Segment(TranscriptSegment::partial(
            Speaker::Local,
            "halb",
            1,
        )))
        .await;
    naechstes_transkript(&mut events).await;
    assert_eq!(a.session.partials().len(), 1);

    let beginn = Instant::now();
    a.dienst.melden(TransportEvent::Dropped("Netz weg".into())).await;

    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Connected).await,
        vec![SessionPhase::Reconnecting, SessionPhase::Connected]
    );
    assert!(beginn.elapsed() >= Duration::from_millis(500));
    assert_eq!(a.dienst.verbindungen(), 2);
    // Partials sind nach dem Abbruch verworfen
    assert!(a.session.partials().is_empty());
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn reconnect_erschoepft() {
    let a = aufbauen(policy());
    a.dienst.fehler_ab.store(1, Ordering::SeqCst);
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();
    phasen_bis(&mut events, SessionPhase::Connected).await;

    let beginn = Instant::now();
    a.dienst.melden(TransportEvent::Dropped("Netz weg".into())).await;

    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Disconnected).await,
        vec![SessionPhase::Reconnecting, SessionPhase::Disconnected]
    );
    match events.recv().await.unwrap() {
        SessionEvent::Error(meldung) => assert!(meldung.contains("erschoepft")),
        other => panic!("Fehler-Event erwartet, bekam {other:?}"),
    }

    // 500 + 1000 + 2000 ms Backoff
    assert!(beginn.elapsed() >= Duration::from_millis(3_500));
    assert_eq!(a.dienst.verbindungen(), 1 + 3);
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 1);
    assert_eq!(a.session.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn stop_bricht_backoff_ab() {
    let a = aufbauen(ReconnectPolicy {
        base_delay: Duration::from_secs(10),
        ..policy()
    });
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();
    phasen_bis(&mut events, SessionPhase::Connected).await;

    a.dienst.melden(TransportEvent::Dropped("Netz weg".into())).await;
    phasen_bis(&mut events, SessionPhase::Reconnecting).await;

    a.session.stop().await;
    assert_eq!(a.session.phase(), SessionPhase::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(a.dienst.verbindungen(), 1);
    assert_eq!(a.session.phase(), SessionPhase::Disconnected);
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 1);

    // Idempotent
    a.session.stop().await;
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn ohne_auto_reconnect_direkt_getrennt() {
    let a = aufbauen(policy());
    a.settings.aktualisieren(|s| s.auto_reconnect = false);
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();
    phasen_bis(&mut events, SessionPhase::Connected).await;

    a.dienst.melden(TransportEvent::Dropped("Netz weg".into())).await;

    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Disconnected).await,
        vec![SessionPhase::Reconnecting, SessionPhase::Disconnected]
    );
    assert_eq!(a.dienst.verbindungen(), 1);
}

#[tokio::test]
async fn ohne_mikrofon_fehler_und_neustart() {
    let a = aufbauen(policy());
    a.mikro.fehlt.store(true, Ordering::SeqCst);
    let mut events = a.session.subscribe();

    assert!(matches!(
        a.session.start().await,
        Err(StreamError::NoMicrophone)
    ));
    assert_eq!(a.session.connection_state(), ConnectionState::Error);
    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Error).await,
        vec![SessionPhase::Preparing, SessionPhase::Error]
    );
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Error(_)));
    assert_eq!(a.dienst.verbindungen(), 0);

    a.mikro.fehlt.store(false, Ordering::SeqCst);
    a.session.start().await.unwrap();
    assert_eq!(a.session.phase(), SessionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn verbindungs_timeout_beim_start() {
    let a = aufbauen(policy());
    a.dienst.haengt.store(true, Ordering::SeqCst);

    let beginn = Instant::now();
    assert!(matches!(
        a.session.start().await,
        Err(StreamError::Transport(_))
    ));
    assert!(beginn.elapsed() >= Duration::from_secs(1));
    assert_eq!(a.session.phase(), SessionPhase::Error);
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dienst_beendet_regulaer() {
    let a = aufbauen(policy());
    let mut events = a.session.subscribe();
    a.session.start().await.unwrap();
    phasen_bis(&mut events, SessionPhase::Connected).await;

    a.dienst.melden(TransportEvent::Closed).await;

    assert_eq!(
        phasen_bis(&mut events, SessionPhase::Disconnected).await,
        vec![SessionPhase::Disconnected]
    );
    assert_eq!(a.mikro.freigaben.load(Ordering::SeqCst), 1);

    // Neustart nach Ende
    a.session.start().await.unwrap();
    assert_eq!(a.session.phase(), SessionPhase::Connected);
    assert_eq!(a.dienst.verbindungen(), 2);
}

#[tokio::test]
async fn verschluesselte_frames_nur_fuer_den_peer_lesbar() {
    let host = PeerId::new();
    let gast = PeerId::new();
    let host_store = Arc::new(SessionKeyStore::default());
    host_store
        .establish(gast, [9u8; 32], SessionRole::Host, 0)
        .unwrap();
    let gast_store = Arc::new(SessionKeyStore::default());
    gast_store
        .establish(host, [9u8; 32], SessionRole::Guest, 0)
        .unwrap();
    let gast_cipher = FrameCipher::new(gast_store, E2eConfig::default(), 2);

    let mikro = Arc::new(FakeMikrofon::default());
    let (dienst, mut gesendet) = FakeDienst::neu();
    let session = StreamingSession::with_encryption(
        Arc::clone(&mikro) as Arc<dyn MediaSource>,
        Arc::clone(&dienst) as Arc<dyn TranslationTransport>,
        settings(),
        policy(),
        FrameCipher::new(Arc::clone(&host_store), E2eConfig::default(), 1),
        gast,
    );
    assert!(session.is_encrypted());
    session.start().await.unwrap();

    let audio = MediaFrame {
        data: vec![7; 160],
        timestamp: 42,
    };
    mikro.sprechen(audio.clone()).await;
    let angekommen = tokio::time::timeout(Duration::from_secs(5), gesendet.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(angekommen.timestamp, 42);
    assert_ne!(angekommen.data, audio.data);
    assert_eq!(
        gast_cipher
            .decrypt_frame_bytes(&host, &angekommen.data)
            .unwrap(),
        audio.data
    );

    // Ohne Schluessel geht nichts mehr raus, auch nicht im Klartext
    host_store.destroy(&gast);
    mikro.sprechen(audio).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(200), gesendet.recv())
            .await
            .is_err()
    );
    assert_eq!(session.phase(), SessionPhase::Connected);

    session.stop().await;
}
