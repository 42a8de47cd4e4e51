//! Reconnect mit exponentiellem Backoff

use dolmetsch_core::config::VerbindungsEinstellungen;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Anzahl Versuche nach einem Abbruch, danach `RetriesExhausted`
    pub max_attempts: u32,
    /// Wartezeit vor dem ersten Versuch, verdoppelt sich pro Versuch
    pub base_delay: Duration,
    /// Obergrenze der Wartezeit
    pub max_delay: Duration,
    /// Timeout fuer einen einzelnen Verbindungsaufbau
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::aus_einstellungen(&VerbindungsEinstellungen::default())
    }
}

impl ReconnectPolicy {
    pub fn aus_einstellungen(einstellungen: &VerbindungsEinstellungen) -> Self {
        Self {
            max_attempts: einstellungen.max_versuche,
            base_delay: Duration::from_millis(einstellungen.basis_verzoegerung_ms),
            max_delay: Duration::from_millis(einstellungen.max_verzoegerung_ms),
            connect_timeout: Duration::from_millis(einstellungen.verbindungs_timeout_ms),
        }
    }

    /// Wartezeit vor Versuch `attempt` (0-basiert): `base * 2^attempt`, gedeckelt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let faktor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(faktor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
