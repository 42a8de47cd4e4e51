//! Geraete-Identitaet (Ed25519) und KeyBundle
//!
//! Jedes Geraet hat ein langlebiges Ed25519-Schluessel-Paar. Beim Pairing
//! signiert es damit sein `KeyBundle`, d.h. die Bindung des ephemeren
//! X25519-Schluessels an die Geraete-Identitaet.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dolmetsch_core::PeerId;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Langzeit-Identitaet eines Geraets
pub struct DeviceIdentity {
    user_id: PeerId,
    signing_key: SigningKey,
}

impl DeviceIdentity {
    /// Generiert eine neue Identitaet mit frischer PeerId
    pub fn generate() -> Self {
        Self::with_user_id(PeerId::new())
    }

    pub fn with_user_id(user_id: PeerId) -> Self {
        Self {
            user_id,
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Stellt eine Identitaet aus einem gespeicherten privaten Schluessel wieder her
    pub fn from_bytes(user_id: PeerId, bytes: &[u8; 32]) -> Self {
        Self {
            user_id,
            signing_key: SigningKey::from_bytes(bytes),
        }
    }

    pub fn user_id(&self) -> PeerId {
        self.user_id
    }

    /// Privater Schluessel (fuer Persistenz durch die Plattform-Schicht)
    pub fn private_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Erstellt und signiert ein KeyBundle fuer einen ephemeren Schluessel
    pub fn key_bundle(&self, ephemeral_public_key: &[u8; 32], timestamp: i64) -> KeyBundle {
        let mut bundle = KeyBundle {
            identity_key: BASE64.encode(self.public_key_bytes()),
            ephemeral_key: BASE64.encode(ephemeral_public_key),
            user_id: self.user_id.inner().to_string(),
            timestamp,
            signature: String::new(),
        };
        let signature = self.signing_key.sign(&bundle.signed_bytes());
        bundle.signature = BASE64.encode(signature.to_bytes());
        bundle
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DeviceIdentity {{ user_id: {}, public_key: [Ed25519 VerifyingKey] }}",
            self.user_id
        )
    }
}

/// Out-of-band ausgetauschtes Schluessel-Bundle (Base64-kodiert)
///
/// Unveraenderlich nach Erstellung; die Gegenseite verbraucht es genau einmal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Ed25519 Identitaets-Schluessel (Base64)
    pub identity_key: String,
    /// X25519 ephemerer Schluessel (Base64)
    pub ephemeral_key: String,
    /// PeerId als UUID-String
    pub user_id: String,
    /// Erstellungszeitpunkt in ms
    pub timestamp: i64,
    /// Ed25519-Signatur ueber alle anderen Felder (Base64)
    pub signature: String,
}

/// Geprueftes KeyBundle mit dekodierten Schluesseln
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedBundle {
    pub user_id: PeerId,
    pub identity_key: [u8; 32],
    pub ephemeral_key: [u8; 32],
    pub timestamp: i64,
}

impl KeyBundle {
    fn signed_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for feld in [&self.identity_key, &self.ephemeral_key, &self.user_id] {
            out.extend_from_slice(&(feld.len() as u32).to_be_bytes());
            out.extend_from_slice(feld.as_bytes());
        }
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    /// Dekodiert die Felder und prueft die Signatur
    pub fn verify(&self) -> CryptoResult<VerifiedBundle> {
        let identity_key = decode_key(&self.identity_key)?;
        let ephemeral_key = decode_key(&self.ephemeral_key)?;
        let user_id = PeerId::parse(&self.user_id)
            .map_err(|e| CryptoError::InvalidFrame(e.to_string()))?;

        let verifying_key =
            VerifyingKey::from_bytes(&identity_key).map_err(|_| CryptoError::SignatureInvalid)?;
        let signature_bytes: [u8; 64] = BASE64
            .decode(&self.signature)?
            .try_into()
            .map_err(|_| CryptoError::SignatureInvalid)?;
        let signature = Signature::from_bytes(&signature_bytes);
        verifying_key
            .verify(&self.signed_bytes(), &signature)
            .map_err(|_| CryptoError::SignatureInvalid)?;

        Ok(VerifiedBundle {
            user_id,
            identity_key,
            ephemeral_key,
            timestamp: self.timestamp,
        })
    }
}

fn decode_key(encoded: &str) -> CryptoResult<[u8; 32]> {
    let bytes = BASE64.decode(encoded)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            erwartet: 32,
            erhalten: len,
        })
}
