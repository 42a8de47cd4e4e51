//! Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass Dolmetsch ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DolmetschError, Result};
use crate::types::LanguageCode;

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DolmetschConfig {
    /// Frame-Verschluesselung
    pub krypto: KryptoEinstellungen,
    /// QR-Pairing
    pub pairing: PairingEinstellungen,
    /// Verbindungsaufbau und Reconnect
    pub verbindung: VerbindungsEinstellungen,
    /// Standard-Sprachen
    pub sprache: SprachEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// AEAD-Algorithmus fuer Media-Frames (256-Bit-Schluessel, 96-Bit-IV, 128-Bit-Tag)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AeadAlgorithm {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
}

/// Frame-Verschluesselung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KryptoEinstellungen {
    pub algorithmus: AeadAlgorithm,
    /// Breite des Replay-Fensters (1 = streng monoton, maximal 64)
    pub replay_fenster: u64,
}

impl Default for KryptoEinstellungen {
    fn default() -> Self {
        Self {
            algorithmus: AeadAlgorithm::Aes256Gcm,
            replay_fenster: 1,
        }
    }
}

/// QR-Pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingEinstellungen {
    /// Gueltigkeit eines QR-Codes in Sekunden
    pub ttl_secs: u64,
}

impl Default for PairingEinstellungen {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

impl PairingEinstellungen {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Verbindungsaufbau und Reconnect mit exponentiellem Backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Maximale Anzahl Reconnect-Versuche bevor aufgegeben wird
    pub max_versuche: u32,
    /// Wartezeit vor dem ersten Versuch
    pub basis_verzoegerung_ms: u64,
    /// Obergrenze fuer die Wartezeit
    pub max_verzoegerung_ms: u64,
    /// Timeout fuer einen einzelnen Verbindungsaufbau
    pub verbindungs_timeout_ms: u64,
}

impl Default for VerbindungsEinstellungen {
    fn default() -> Self {
        Self {
            max_versuche: 5,
            basis_verzoegerung_ms: 500,
            max_verzoegerung_ms: 8_000,
            verbindungs_timeout_ms: 10_000,
        }
    }
}

/// Standard-Sprachen fuer neue Gespraeche
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SprachEinstellungen {
    pub quelle: LanguageCode,
    pub ziel: LanguageCode,
}

impl Default for SprachEinstellungen {
    fn default() -> Self {
        Self {
            quelle: LanguageCode::unchecked("en-us"),
            ziel: LanguageCode::unchecked("es"),
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DolmetschConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .map_err(|e| DolmetschError::konfiguration(format!("'{pfad}': {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Parst und validiert eine Konfiguration aus einem TOML-String
    pub fn aus_toml(inhalt: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(inhalt).map_err(|e| DolmetschError::konfiguration(e.to_string()))?;
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Wertebereiche, die serde nicht ausdruecken kann
    pub fn validieren(&self) -> Result<()> {
        if !(1..=64).contains(&self.krypto.replay_fenster) {
            return Err(DolmetschError::konfiguration(format!(
                "krypto.replay_fenster muss zwischen 1 und 64 liegen, ist {}",
                self.krypto.replay_fenster
            )));
        }
        if self.pairing.ttl_secs == 0 {
            return Err(DolmetschError::konfiguration("pairing.ttl_secs darf nicht 0 sein"));
        }
        if self.verbindung.basis_verzoegerung_ms > self.verbindung.max_verzoegerung_ms {
            return Err(DolmetschError::konfiguration(
                "verbindung.basis_verzoegerung_ms ist groesser als max_verzoegerung_ms",
            ));
        }
        Ok(())
    }
}
