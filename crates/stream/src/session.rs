//! Session-Treiber
//!
//! Fuehrt die Zustandsmaschine gegen echte (bzw. injizierte) Mikrofon- und
//! Transport-Implementierungen aus:
//! - `start` oeffnet das Mikrofon, verbindet und startet den Pump-Task
//! - der Pump-Task leitet Frames weiter, gleicht Transkripte ab und
//!   verbindet nach einem Abbruch mit Backoff neu
//! - `stop` bricht alles ab, auch ein laufendes Backoff
//!
//! Zustand per `watch`, Transkript- und Statusaenderungen per `broadcast`.
//!
//! Mit [`StreamingSession::with_encryption`] verlaesst kein Frame den
//! Treiber unverschluesselt: scheitert die Verschluesselung, wird der Frame
//! verworfen.

use dolmetsch_core::{CallSettings, PeerId, SettingsStore};
use dolmetsch_crypto::FrameCipher;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{StreamError, StreamResult};
use crate::media::{MediaFrame, MediaSource, TranslationTransport, TransportEvent};
use crate::phase::{ConnectionState, SessionInput, SessionPhase};
use crate::reconnect::ReconnectPolicy;
use crate::transcript::{TranscriptReconciler, TranscriptSegment, TranscriptUpdate};

/// Groesse des Broadcast-Kanals fuer Session-Events
const EVENT_KANAL_GROESSE: usize = 256;

/// Events die die StreamingSession versendet
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        phase: SessionPhase,
        state: ConnectionState,
    },
    Transcript(TranscriptUpdate),
    Error(String),
}

/// Eine Uebersetzungs-Session
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct StreamingSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    media: Arc<dyn MediaSource>,
    transport: Arc<dyn TranslationTransport>,
    settings: SettingsStore,
    policy: ReconnectPolicy,
    phase_tx: watch::Sender<SessionPhase>,
    event_tx: broadcast::Sender<SessionEvent>,
    transcript: Mutex<TranscriptReconciler>,
    /// Token des laufenden Pump-Tasks
    lauf: Mutex<Option<CancellationToken>>,
    schutz: Option<FrameSchutz>,
}

/// Frame-Schluessel fuer die Gegenseite
struct FrameSchutz {
    cipher: FrameCipher,
    peer: PeerId,
}

impl StreamingSession {
    /// Session ohne Frame-Verschluesselung; der Transport sieht rohes Audio
    pub fn new(
        media: Arc<dyn MediaSource>,
        transport: Arc<dyn TranslationTransport>,
        settings: SettingsStore,
        policy: ReconnectPolicy,
    ) -> Self {
        Self::bauen(media, transport, settings, policy, None)
    }

    /// Session, die jeden Frame vor dem Senden fuer `peer` verschluesselt
    ///
    /// Der Schluessel muss im Store des `cipher` liegen (Pairing). Wird er
    /// zerstoert, verwirft der Treiber die Frames.
    pub fn with_encryption(
        media: Arc<dyn MediaSource>,
        transport: Arc<dyn TranslationTransport>,
        settings: SettingsStore,
        policy: ReconnectPolicy,
        cipher: FrameCipher,
        peer: PeerId,
    ) -> Self {
        Self::bauen(
            media,
            transport,
            settings,
            policy,
            Some(FrameSchutz { cipher, peer }),
        )
    }

    fn bauen(
        media: Arc<dyn MediaSource>,
        transport: Arc<dyn TranslationTransport>,
        settings: SettingsStore,
        policy: ReconnectPolicy,
        schutz: Option<FrameSchutz>,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        let (event_tx, _) = broadcast::channel(EVENT_KANAL_GROESSE);
        Self {
            inner: Arc::new(SessionInner {
                media,
                transport,
                settings,
                policy,
                phase_tx,
                event_tx,
                transcript: Mutex::new(TranscriptReconciler::new()),
                lauf: Mutex::new(None),
                schutz,
            }),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase_tx.borrow()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.phase().connection_state()
    }

    /// `true` wenn Frames verschluesselt gesendet werden
    pub fn is_encrypted(&self) -> bool {
        self.inner.schutz.is_some()
    }

    /// Beobachtet den Zustand
    pub fn watch(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase_tx.subscribe()
    }

    /// Neuer Listener; Drop des Receivers meldet ihn wieder ab
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Alle finalen Segmente bisher
    pub fn transcript(&self) -> Vec<TranscriptSegment> {
        self.inner.transcript.lock().log().to_vec()
    }

    /// Offene vorlaeufige Segmente (eines pro Sprecher)
    pub fn partials(&self) -> Vec<TranscriptSegment> {
        self.inner.transcript.lock().partials().cloned().collect()
    }

    /// Oeffnet das Mikrofon und verbindet zum Uebersetzungsdienst
    ///
    /// Erlaubt aus `Idle`, `Disconnected` und `Error`.
    pub async fn start(&self) -> StreamResult<()> {
        let inner = &self.inner;
        inner.uebergang(SessionInput::Start)?;

        let cancel = CancellationToken::new();
        if let Some(alt) = inner.lauf.lock().replace(cancel.clone()) {
            alt.cancel();
        }

        let frames = match inner.media.acquire().await {
            Ok(frames) => frames,
            Err(e) => {
                inner.fehlschlag(&e);
                return Err(e);
            }
        };
        if cancel.is_cancelled() || inner.uebergang(SessionInput::MediaReady).is_err() {
            inner.media.release().await;
            return Err(StreamError::Stopped);
        }

        let settings = inner.settings.aktuell();
        let events = match inner.verbinden(&settings).await {
            Ok(events) => events,
            Err(e) => {
                inner.media.release().await;
                inner.fehlschlag(&e);
                return Err(e);
            }
        };
        if cancel.is_cancelled() || inner.uebergang(SessionInput::TransportUp).is_err() {
            inner.transport.disconnect().await;
            inner.media.release().await;
            return Err(StreamError::Stopped);
        }

        tracing::info!(
            quelle = %settings.source_lang,
            ziel = %settings.target_lang,
            "Uebersetzungs-Session verbunden"
        );
        tokio::spawn(Arc::clone(inner).pumpen(frames, events, cancel));
        Ok(())
    }

    /// Beendet die Session. Idempotent.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let token = inner.lauf.lock().take();
        if let Some(token) = &token {
            token.cancel();
        }

        let war_aktiv = self.phase().is_active();
        // Stop ist aus jedem Zustand erlaubt
        let _ = inner.uebergang(SessionInput::Stop);

        if token.is_some() || war_aktiv {
            inner.transport.disconnect().await;
            inner.media.release().await;
            tracing::info!("Uebersetzungs-Session gestoppt");
        }
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("phase", &self.phase())
            .field("policy", &self.inner.policy)
            .field("verschluesselt", &self.is_encrypted())
            .finish_non_exhaustive()
    }
}

impl SessionInner {
    /// Fuehrt einen Uebergang atomar aus und meldet Aenderungen
    fn uebergang(&self, input: SessionInput) -> StreamResult<SessionPhase> {
        let mut ergebnis: StreamResult<(SessionPhase, SessionPhase)> = Err(StreamError::Stopped);
        self.phase_tx.send_if_modified(|phase| {
            let von = *phase;
            match von.next(input) {
                Ok(neu) => {
                    *phase = neu;
                    ergebnis = Ok((von, neu));
                    von != neu
                }
                Err(e) => {
                    ergebnis = Err(e);
                    false
                }
            }
        });

        let (von, neu) = ergebnis?;
        if von != neu {
            tracing::debug!(?von, ?neu, ?input, "Zustandswechsel");
            let _ = self.event_tx.send(SessionEvent::StateChanged {
                phase: neu,
                state: neu.connection_state(),
            });
        }
        Ok(neu)
    }

    fn fehlschlag(&self, fehler: &StreamError) {
        self.lauf.lock().take();
        let _ = self.uebergang(SessionInput::Fatal);
        tracing::error!(fehler = %fehler, "Uebersetzungs-Session fehlgeschlagen");
        let _ = self.event_tx.send(SessionEvent::Error(fehler.to_string()));
    }

    async fn verbinden(
        &self,
        settings: &CallSettings,
    ) -> StreamResult<mpsc::Receiver<TransportEvent>> {
        tokio::time::timeout(self.policy.connect_timeout, self.transport.connect(settings))
            .await
            .map_err(|_| StreamError::transport("Timeout beim Verbindungsaufbau"))?
    }

    async fn pumpen(
        self: Arc<Self>,
        frames: mpsc::Receiver<MediaFrame>,
        mut events: mpsc::Receiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let mut frames = Some(frames);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(TransportEvent::Segment(segment)) => self.segment_anwenden(segment),
                    Some(TransportEvent::Closed) => {
                        tracing::info!("Uebersetzungsdienst hat die Verbindung beendet");
                        self.beenden().await;
                        break;
                    }
                    Some(TransportEvent::Dropped(grund)) => {
                        tracing::warn!(%grund, "Verbindung verloren");
                        match self.wiederverbinden(&cancel).await {
                            Some(neu) => events = neu,
                            None => break,
                        }
                    }
                    None => {
                        tracing::warn!("Event-Strom des Transports geschlossen");
                        match self.wiederverbinden(&cancel).await {
                            Some(neu) => events = neu,
                            None => break,
                        }
                    }
                },
                frame = naechster_frame(&mut frames), if frames.is_some() => match frame {
                    Some(frame) => match self.schuetzen(frame) {
                        Ok(frame) => {
                            if let Err(e) = self.transport.send_frame(frame).await {
                                tracing::debug!(fehler = %e, "Frame nicht gesendet");
                            }
                        }
                        Err(e) => tracing::warn!(fehler = %e, "Frame verworfen"),
                    },
                    None => {
                        tracing::warn!("Mikrofon-Strom beendet");
                        frames = None;
                    }
                },
            }
        }
        tracing::debug!("Pump-Task beendet");
    }

    /// Verschluesselt den Frame, falls ein Frame-Schluessel gesetzt ist
    fn schuetzen(&self, frame: MediaFrame) -> StreamResult<MediaFrame> {
        let Some(schutz) = &self.schutz else {
            return Ok(frame);
        };
        let data = schutz
            .cipher
            .encrypt_frame_bytes(&schutz.peer, &frame.data)?;
        Ok(MediaFrame {
            data,
            timestamp: frame.timestamp,
        })
    }

    fn segment_anwenden(&self, segment: TranscriptSegment) {
        let update = self.transcript.lock().apply(segment);
        if let Some(update) = update {
            let _ = self.event_tx.send(SessionEvent::Transcript(update));
        }
    }

    /// Reconnect mit Backoff; `None` wenn aufgegeben oder gestoppt
    async fn wiederverbinden(
        &self,
        cancel: &CancellationToken,
    ) -> Option<mpsc::Receiver<TransportEvent>> {
        if self.uebergang(SessionInput::TransportDropped).is_err() {
            return None;
        }
        self.transcript.lock().clear_partials();
        self.transport.disconnect().await;

        if !self.settings.aktuell().auto_reconnect {
            tracing::info!("Auto-Reconnect deaktiviert");
            self.aufgeben().await;
            return None;
        }

        let mut versuch = 0;
        while self.policy.should_retry(versuch) {
            let wartezeit = self.policy.delay_for_attempt(versuch);
            versuch += 1;
            tracing::debug!(versuch, wartezeit_ms = wartezeit.as_millis() as u64, "Reconnect geplant");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(wartezeit) => {}
            }

            let settings = self.settings.aktuell();
            let ergebnis = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                ergebnis = self.verbinden(&settings) => ergebnis,
            };

            match ergebnis {
                Ok(events) => {
                    if cancel.is_cancelled() || self.uebergang(SessionInput::TransportUp).is_err() {
                        self.transport.disconnect().await;
                        return None;
                    }
                    tracing::info!(versuch, "Verbindung wiederhergestellt");
                    return Some(events);
                }
                Err(e) => tracing::warn!(versuch, fehler = %e, "Reconnect fehlgeschlagen"),
            }
        }

        self.aufgeben().await;
        None
    }

    async fn aufgeben(&self) {
        self.lauf.lock().take();
        let _ = self.uebergang(SessionInput::RetriesExhausted);
        self.media.release().await;
        tracing::warn!("Reconnect aufgegeben");
        let _ = self
            .event_tx
            .send(SessionEvent::Error(StreamError::RetriesExhausted.to_string()));
    }

    async fn beenden(&self) {
        self.lauf.lock().take();
        let _ = self.uebergang(SessionInput::Stop);
        self.transport.disconnect().await;
        self.media.release().await;
    }
}

async fn naechster_frame(frames: &mut Option<mpsc::Receiver<MediaFrame>>) -> Option<MediaFrame> {
    match frames {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
