//! Zeitquelle
//!
//! Ablaufzeiten (QR-Session) und Frame-Zeitstempel werden in Millisekunden
//! seit der Unix-Epoche gefuehrt. Die Uhr wird injiziert, damit Tests die
//! Zeit kontrollieren koennen.

use std::sync::atomic::{AtomicI64, Ordering};

/// Liefert die aktuelle Wanduhrzeit in Millisekunden
pub trait Clock: Send + Sync + std::fmt::Debug + 'static {
    fn now_millis(&self) -> i64;
}

/// Systemuhr (chrono)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manuell gestellte Uhr fuer Tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_millis: i64) {
        self.millis.fetch_add(delta_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
