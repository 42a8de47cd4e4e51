//! Structured Logging Setup via tracing-subscriber
//!
//! Umgebungsvariablen haben Vorrang vor der Konfigurationsdatei:
//! - `DM_LOG_LEVEL`: Filter-Direktive (z.B. `debug` oder
//!   `info,dolmetsch_crypto=trace`)
//! - `DM_LOG_FORMAT`: `text` oder `json`

use dolmetsch_core::config::LoggingEinstellungen;
use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "DM_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "DM_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum LoggingFehler {
    #[error("Ungueltiges Log-Format: '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Ungueltiger Log-Filter '{filter}': {grund}")]
    UngueltigerFilter { filter: String, grund: String },

    /// Es ist bereits ein globaler Subscriber gesetzt
    #[error("Logging bereits initialisiert")]
    BereitsInitialisiert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = LoggingFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(LoggingFehler::UngueltigesFormat(other.to_string())),
        }
    }
}

/// Initialisiert das globale Logging.
///
/// `level` und `format` sind Fallbacks fuer `DM_LOG_LEVEL`/`DM_LOG_FORMAT`.
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingFehler> {
    let wirksam = wirksame_einstellungen(&LoggingEinstellungen {
        level: level.to_string(),
        format: format.to_string(),
    });
    let (format, filter) = einstellungen_pruefen(&wirksam)?;

    let ergebnis = match format {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    ergebnis.map_err(|_| LoggingFehler::BereitsInitialisiert)?;

    tracing::debug!(level = %wirksam.level, ?format, "Logging initialisiert");
    Ok(())
}

pub fn logging_aus_config(einstellungen: &LoggingEinstellungen) -> Result<(), LoggingFehler> {
    logging_initialisieren(&einstellungen.level, &einstellungen.format)
}

/// Einstellungen aus der Konfiguration, von der Umgebung uebersteuert
pub fn wirksame_einstellungen(config: &LoggingEinstellungen) -> LoggingEinstellungen {
    LoggingEinstellungen {
        level: log_level_aus_env(&config.level),
        format: log_format_aus_env(&config.format),
    }
}

/// Prueft Filter und Format, ohne einen Subscriber zu setzen
pub fn einstellungen_pruefen(
    einstellungen: &LoggingEinstellungen,
) -> Result<(LogFormat, EnvFilter), LoggingFehler> {
    let format: LogFormat = einstellungen.format.parse()?;
    let filter = EnvFilter::try_new(&einstellungen.level).map_err(|e| {
        LoggingFehler::UngueltigerFilter {
            filter: einstellungen.level.clone(),
            grund: e.to_string(),
        }
    })?;
    Ok((format, filter))
}

/// Log-Level aus der Umgebung, sonst `fallback`
pub fn log_level_aus_env(fallback: &str) -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| fallback.to_string())
}

/// Log-Format aus der Umgebung, sonst `fallback`
pub fn log_format_aus_env(fallback: &str) -> String {
    std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| fallback.to_string())
}
