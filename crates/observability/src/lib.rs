//! # dolmetsch-observability
//!
//! Structured Logging (Text oder JSON) via tracing-subscriber. Level und
//! Format kommen aus der Konfiguration und lassen sich per Umgebung
//! uebersteuern.

pub mod logging;

pub use logging::{
    einstellungen_pruefen, log_format_aus_env, log_level_aus_env, logging_aus_config,
    logging_initialisieren, wirksame_einstellungen, LogFormat, LoggingFehler,
};
