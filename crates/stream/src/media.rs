//! Schnittstellen zu Mikrofon und Uebersetzungsdienst
//!
//! Die Plattform-Schicht adaptiert echte Geraete-APIs und Netzwerk-Clients
//! auf diese Traits; der Session-Treiber kennt nur sie.

use async_trait::async_trait;
use dolmetsch_core::CallSettings;
use tokio::sync::mpsc;

use crate::error::StreamResult;
use crate::transcript::TranscriptSegment;

/// Ein aufgenommener Audio-Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    pub data: Vec<u8>,
    /// Aufnahmezeitpunkt in ms
    pub timestamp: i64,
}

/// Lokale Audioquelle
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    /// Oeffnet das Mikrofon; die Frames kommen ueber den Receiver
    async fn acquire(&self) -> StreamResult<mpsc::Receiver<MediaFrame>>;

    /// Gibt das Mikrofon frei. Idempotent.
    async fn release(&self);
}

/// Meldungen des Uebersetzungsdienstes
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Segment(TranscriptSegment),
    /// Verbindung unerwartet verloren
    Dropped(String),
    /// Gegenseite hat regulaer beendet
    Closed,
}

/// Verbindung zum Uebersetzungsdienst
#[async_trait]
pub trait TranslationTransport: Send + Sync + 'static {
    /// Baut die Verbindung auf; Events kommen ueber den Receiver
    ///
    /// Ein geschlossener Receiver gilt als `Dropped`.
    async fn connect(
        &self,
        settings: &CallSettings,
    ) -> StreamResult<mpsc::Receiver<TransportEvent>>;

    /// Sendet einen Frame
    ///
    /// Ist am Treiber ein Frame-Schluessel gesetzt
    /// ([`StreamingSession::with_encryption`](crate::StreamingSession::with_encryption)),
    /// enthaelt `frame.data` das Wire-Format eines `EncryptedFrame`,
    /// sonst das rohe Audio.
    async fn send_frame(&self, frame: MediaFrame) -> StreamResult<()>;

    /// Baut die Verbindung ab. Idempotent.
    async fn disconnect(&self);
}
