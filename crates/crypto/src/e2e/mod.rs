//! E2E Verschluesselung (End-to-End)
//!
//! Peer <-> Peer Verschluesselung der Media-Frames. Transport und
//! Signaling sehen nur Ciphertext.
//!
//! ## Ablauf
//! 1. Pairing liefert pro Peer einen 32-Byte Session-Schluessel
//! 2. Der `SessionKeyStore` leitet daraus je Senderichtung einen
//!    Frame-Schluessel ab und haelt Sende-Zaehler und Replay-Fenster
//! 3. Der `FrameCipher` verschluesselt jeden Frame mit frischem IV
//!    (ssrc + Zaehler) und prueft eingehende Frames gegen das Fenster
//! 4. Beim Auflegen: `destroy` nullt den Schluessel

pub mod frame_cipher;
pub mod key_store;
pub mod replay;

pub use frame_cipher::FrameCipher;
pub use key_store::{SessionKeyStore, SessionState};
pub use replay::ReplayWindow;
