//! dolmetsch-stream – Lebenszyklus eines Uebersetzungsstroms
//!
//! Enthaelt die reine Zustandsmaschine ([`SessionPhase`]), den
//! Transkript-Abgleich ([`TranscriptReconciler`]), die Backoff-Policy und den
//! Treiber ([`StreamingSession`]), der das alles gegen ein Mikrofon und einen
//! Uebersetzungsdienst ausfuehrt. Beide sind Traits, damit Plattform-Code
//! (und Tests) eigene Implementierungen einsetzen koennen.

pub mod error;
pub mod media;
pub mod phase;
pub mod reconnect;
pub mod session;
pub mod transcript;

pub use error::{StreamError, StreamResult};
pub use media::{MediaFrame, MediaSource, TranslationTransport, TransportEvent};
pub use phase::{ConnectionState, SessionInput, SessionPhase};
pub use reconnect::ReconnectPolicy;
pub use session::{SessionEvent, StreamingSession};
pub use transcript::{TranscriptReconciler, TranscriptSegment, TranscriptUpdate};
