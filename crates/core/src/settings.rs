//! Settings-Store
//!
//! Laufzeit-Einstellungen eines Gespraechs (Sprachen, Auto-Reconnect).
//! Der Store wird einmal beim Start erstellt und per Handle (Clone) an die
//! Komponenten weitergegeben. Abonnenten erhalten einen `watch::Receiver`;
//! das Droppen des Receivers beendet das Abonnement.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::config::DolmetschConfig;
use crate::types::LanguageCode;

/// Vom Benutzer aenderbare Gespraechseinstellungen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    pub source_lang: LanguageCode,
    pub target_lang: LanguageCode,
    /// Bei Verbindungsabbruch automatisch neu verbinden
    pub auto_reconnect: bool,
}

impl CallSettings {
    pub fn aus_config(config: &DolmetschConfig) -> Self {
        Self {
            source_lang: config.sprache.quelle.clone(),
            target_lang: config.sprache.ziel.clone(),
            auto_reconnect: true,
        }
    }
}

/// Geteilter Settings-Store
///
/// Clone teilt den inneren Zustand.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    tx: Arc<watch::Sender<CallSettings>>,
}

impl SettingsStore {
    pub fn neu(initial: CallSettings) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Aktueller Stand (Kopie)
    pub fn aktuell(&self) -> CallSettings {
        self.tx.borrow().clone()
    }

    /// Aendert die Einstellungen und benachrichtigt alle Abonnenten,
    /// sofern sich tatsaechlich etwas geaendert hat
    pub fn aktualisieren<F>(&self, f: F)
    where
        F: FnOnce(&mut CallSettings),
    {
        let geaendert = self.tx.send_if_modified(|settings| {
            let vorher = settings.clone();
            f(settings);
            *settings != vorher
        });
        if geaendert {
            tracing::debug!("Gespraechseinstellungen geaendert");
        }
    }

    /// Abonniert Aenderungen. Droppen des Receivers meldet ab.
    pub fn abonnieren(&self) -> watch::Receiver<CallSettings> {
        self.tx.subscribe()
    }

    /// Anzahl aktiver Abonnenten
    pub fn abonnenten(&self) -> usize {
        self.tx.receiver_count()
    }
}
