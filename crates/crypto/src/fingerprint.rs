//! Sicherheitscode (Fingerprint) zur MITM-Erkennung
//!
//! Beide Peers berechnen aus den zwei oeffentlichen Schluesseln denselben
//! kurzen Zahlencode und vergleichen ihn muendlich oder optisch.
//!
//! ## Verfahren
//! 1. Schluessel byteweise lexikografisch sortieren (kuerzerer Praefix zuerst)
//! 2. Konkatenieren und SHA-256 hashen
//! 3. Erste 8 Bytes als vier u16 (big-endian), jeweils `% 10000`
//! 4. Die ersten drei Gruppen vierstellig, mit Leerzeichen getrennt
//!
//! Ergebnis: `"0421 9377 0052"` (14 Zeichen)

use sha2::{Digest, Sha256};

use crate::primitives::constant_time_eq;

/// Anzahl angezeigter Vierergruppen
pub const SECURITY_CODE_GROUPS: usize = 3;
/// Laenge des angezeigten Codes inkl. Trennzeichen
pub const SECURITY_CODE_LEN: usize = SECURITY_CODE_GROUPS * 5 - 1;

/// Fuer die Anzeige bestimmter Sicherheitscode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecurityCode(String);

impl SecurityCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Die einzelnen Vierergruppen
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }

    /// Vergleicht mit einer Benutzereingabe (Leerzeichen werden ignoriert)
    pub fn matches(&self, eingabe: &str) -> bool {
        let eigene: Vec<u8> = self.0.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        let fremde: Vec<u8> = eingabe.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
        constant_time_eq(&eigene, &fremde)
    }
}

impl std::fmt::Display for SecurityCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Berechnet den reihenfolgeunabhaengigen Sicherheitscode zweier Schluessel
pub fn generate_security_code(local_key: &[u8], remote_key: &[u8]) -> SecurityCode {
    // Slice-Ordnung ist lexikografisch, kuerzerer Praefix zuerst
    let (erster, zweiter) = if local_key <= remote_key {
        (local_key, remote_key)
    } else {
        (remote_key, local_key)
    };

    let mut hasher = Sha256::new();
    hasher.update(erster);
    hasher.update(zweiter);
    let hash = hasher.finalize();

    let gruppen: Vec<String> = hash[..8]
        .chunks_exact(2)
        .map(|paar| u16::from_be_bytes([paar[0], paar[1]]) % 10_000)
        .map(|wert| format!("{wert:04}"))
        .take(SECURITY_CODE_GROUPS)
        .collect();

    SecurityCode(gruppen.join(" "))
}
