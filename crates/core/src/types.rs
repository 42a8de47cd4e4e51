//! Gemeinsame Identifikationstypen fuer Dolmetsch
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DolmetschError;

/// Eindeutige Peer-ID (ein Geraet bzw. Gespraechspartner)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Erstellt eine neue zufaellige PeerId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Parst eine PeerId aus der nackten UUID-Darstellung
    pub fn parse(s: &str) -> Result<Self, DolmetschError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DolmetschError::UngueltigeId(format!("PeerId '{s}': {e}")))
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer:{}", self.0)
    }
}

/// Eindeutige ID einer Pairing-Session (QR-Code)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }

    /// Die 16 Roh-Bytes (fuer den kompakten QR-Payload)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Sprachcode im Stil von BCP 47 (`en`, `en-us`, `pt-br`)
///
/// Wird beim Parsen auf Kleinbuchstaben normalisiert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageCode(String);

impl LanguageCode {
    pub fn parse(code: &str) -> Result<Self, DolmetschError> {
        let normalisiert = code.trim().to_ascii_lowercase();
        let mut teile = normalisiert.split('-');

        let sprache = teile.next().unwrap_or_default();
        if !(2..=3).contains(&sprache.len()) || !sprache.chars().all(|c| c.is_ascii_lowercase()) {
            return Err(DolmetschError::UngueltigeSprache(code.to_string()));
        }
        for teil in teile {
            if teil.is_empty() || teil.len() > 8 || !teil.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(DolmetschError::UngueltigeSprache(code.to_string()));
            }
        }

        Ok(Self(normalisiert))
    }

    /// Fuer bekannte, gueltige Konstanten
    pub(crate) fn unchecked(code: &str) -> Self {
        Self(code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LanguageCode {
    type Error = DolmetschError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<LanguageCode> for String {
    fn from(code: LanguageCode) -> Self {
        code.0
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sprecher eines Transkript-Segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    /// Der lokale Benutzer (eigenes Mikrofon)
    Local,
    /// Ein entfernter Gespraechspartner
    Remote(PeerId),
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Speaker::Local => f.write_str("local"),
            Speaker::Remote(peer) => write!(f, "remote({peer})"),
        }
    }
}
