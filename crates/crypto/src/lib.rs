//! # dolmetsch-crypto
//!
//! Ende-zu-Ende Verschluesselung fuer Dolmetsch-Gespraeche.
//!
//! ## Module
//! - `primitives` - HKDF, IV-Konstruktion, Konstantzeit-Vergleich
//! - `codec` - Hex-Kodierung
//! - `fingerprint` - Sicherheitscode zur MITM-Erkennung
//! - `identity` - Ed25519 Geraete-Identitaet und KeyBundle
//! - `e2e` - Session-Schluessel und Frame-Verschluesselung
//! - `types` - Gemeinsame Typen (KeyPair, EncryptedFrame, E2eConfig, etc.)
//! - `error` - Fehlertypen

pub mod codec;
pub mod e2e;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod primitives;
pub mod types;

// Bequeme Re-Exports
pub use codec::{bytes_to_hex, hex_to_bytes};
pub use error::{CryptoError, CryptoResult};
pub use fingerprint::{generate_security_code, SecurityCode};
pub use identity::{DeviceIdentity, KeyBundle, VerifiedBundle};
pub use primitives::{constant_time_eq, create_deterministic_iv, derive_key, hkdf_derive};
pub use types::{E2eConfig, EncryptedFrame, KeyPair, SecretBytes, SessionRole};

pub use e2e::{FrameCipher, ReplayWindow, SessionKeyStore, SessionState};
