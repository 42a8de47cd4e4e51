//! Dolmetsch CLI – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und fuehrt die
//! Loopback-Demo aus.

use anyhow::Result;
use dolmetsch_cli::loopback_demo;
use dolmetsch_core::DolmetschConfig;
use dolmetsch_observability::logging_aus_config;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("DOLMETSCH_CONFIG").unwrap_or_else(|_| "dolmetsch.toml".into());

    // Standardwerte falls die Datei fehlt
    let config = DolmetschConfig::laden(&config_pfad)?;
    logging_aus_config(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Dolmetsch wird initialisiert"
    );

    let bericht = loopback_demo(&config).await?;

    tracing::info!(
        sicherheitscode = bericht.security_code.as_str(),
        frames = bericht.frames,
        replay_abgewiesen = bericht.replay_abgewiesen,
        "Loopback-Demo abgeschlossen"
    );
    for segment in &bericht.transkript {
        tracing::info!(
            sprecher = %segment.speaker,
            text = %segment.source_text,
            uebersetzung = segment.translated_text.as_deref().unwrap_or("-"),
            "Transkript"
        );
    }

    Ok(())
}
