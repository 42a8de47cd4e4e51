//! # dolmetsch-pairing
//!
//! Out-of-band Pairing per QR-Code.
//!
//! ## Ablauf
//! 1. Host: `create_session` erzeugt ephemeres X25519-Paar, Session-ID und
//!    Einmal-Geheimnis; `generate_qr_data` liefert den QR-Payload
//! 2. Gast: `parse_qr_data` + `join_session` schickt sein signiertes
//!    KeyBundle und einen Nachweis ueber das Geheimnis
//! 3. Host prueft (Ablauf, genau ein Gast, Nachweis) und antwortet mit
//!    seinem KeyBundle
//! 4. Beide leiten per X25519 + HKDF denselben Session-Schluessel ab und
//!    zeigen denselben Sicherheitscode an
//!
//! ## Module
//! - `host` - PairingHost mit Session-Task und Events
//! - `guest` - PairingGuest
//! - `qr` - QR-Payload kodieren/parsen
//! - `signaling` - Transport-Trait und In-Memory-Broker
//! - `handshake` - Join-Nachweis und Schluessel-Ableitung

pub mod error;
pub mod guest;
pub mod handshake;
pub mod host;
pub mod qr;
pub mod signaling;

pub use error::{PairingError, PairingResult};
pub use guest::{JoinedSession, PairingGuest};
pub use host::{HostPhase, PairingEvent, PairingHost, QrSession};
pub use qr::{parse_qr_data, QrData};
pub use signaling::{HostInfo, InMemorySignaling, JoinRequest, JoinerInfo, SignalingChannel};
