//! dolmetsch-core – Gemeinsame Typen, Konfiguration und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Dolmetsch-Crates gemeinsam genutzt werden.

pub mod clock;
pub mod config;
pub mod error;
pub mod settings;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DolmetschConfig;
pub use error::{DolmetschError, Result};
pub use settings::{CallSettings, SettingsStore};
pub use types::{LanguageCode, PeerId, SessionId, Speaker};
