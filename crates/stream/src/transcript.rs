//! Transkript-Abgleich
//!
//! Der Uebersetzungsdienst schickt pro Sprecher laufend vorlaeufige
//! Segmente (partial), die jeweils das vorige ersetzen, und irgendwann ein
//! endgueltiges (final). Nur finale Segmente landen im Protokoll, jedes
//! genau einmal.

use dolmetsch_core::Speaker;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ein Stueck Transkript eines Sprechers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub speaker: Speaker,
    pub source_text: String,
    pub translated_text: Option<String>,
    pub is_final: bool,
    /// Zeitpunkt in ms
    pub timestamp: i64,
}

impl TranscriptSegment {
    pub fn partial(speaker: Speaker, source_text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            speaker,
            source_text: source_text.into(),
            translated_text: None,
            is_final: false,
            timestamp,
        }
    }

    pub fn final_segment(
        speaker: Speaker,
        source_text: impl Into<String>,
        translated_text: Option<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            speaker,
            source_text: source_text.into(),
            translated_text,
            is_final: true,
            timestamp,
        }
    }
}

/// Sichtbare Aenderung nach einem angewendeten Segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptUpdate {
    /// Vorlaeufiger Text eines Sprechers wurde ersetzt
    Partial(TranscriptSegment),
    /// Neuer Eintrag im Protokoll
    Final(TranscriptSegment),
}

#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    partials: HashMap<Speaker, TranscriptSegment>,
    log: Vec<TranscriptSegment>,
    finals: HashSet<(Speaker, i64)>,
    letzter_final: HashMap<Speaker, i64>,
}

impl TranscriptReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wendet ein Segment an; `None` wenn es nichts aendert
    ///
    /// - doppelte Finals (gleicher Sprecher und Zeitstempel) werden verworfen
    /// - verspaetete Partials, die nicht juenger als das letzte Final des
    ///   Sprechers sind, werden verworfen
    pub fn apply(&mut self, segment: TranscriptSegment) -> Option<TranscriptUpdate> {
        let speaker = segment.speaker;

        if !segment.is_final {
            if self
                .letzter_final
                .get(&speaker)
                .is_some_and(|&ts| segment.timestamp <= ts)
            {
                tracing::trace!(%speaker, timestamp = segment.timestamp, "Veraltetes Partial verworfen");
                return None;
            }
            self.partials.insert(speaker, segment.clone());
            return Some(TranscriptUpdate::Partial(segment));
        }

        if !self.finals.insert((speaker, segment.timestamp)) {
            tracing::debug!(%speaker, timestamp = segment.timestamp, "Doppeltes Final verworfen");
            return None;
        }
        self.partials.remove(&speaker);
        let letzter = self.letzter_final.entry(speaker).or_insert(segment.timestamp);
        *letzter = (*letzter).max(segment.timestamp);
        self.log.push(segment.clone());
        Some(TranscriptUpdate::Final(segment))
    }

    /// Alle finalen Segmente in Eingangsreihenfolge
    pub fn log(&self) -> &[TranscriptSegment] {
        &self.log
    }

    /// Aktueller vorlaeufiger Text eines Sprechers
    pub fn partial(&self, speaker: &Speaker) -> Option<&TranscriptSegment> {
        self.partials.get(speaker)
    }

    pub fn partials(&self) -> impl Iterator<Item = &TranscriptSegment> {
        self.partials.values()
    }

    /// Verwirft offene Partials (z.B. nach Verbindungsabbruch), das Protokoll bleibt
    pub fn clear_partials(&mut self) {
        self.partials.clear();
    }
}
