//! Replay-Schutz fuer eingehende Frames
//!
//! Sliding Window ueber die Frame-Zaehler eines Peers. Bit `i` der Bitmap
//! steht fuer Zaehler `highest - i`.
//!
//! - Breite 1: streng monoton, nur `counter > highest` wird angenommen
//! - Breite W > 1: zusaetzlich bis zu `W - 1` Zaehler unterhalb von
//!   `highest`, jeder genau einmal

use crate::error::{CryptoError, CryptoResult};
use crate::types::MAX_REPLAY_WINDOW;

#[derive(Debug, Clone)]
pub struct ReplayWindow {
    width: u64,
    highest: u64,
    bitmap: u64,
}

impl ReplayWindow {
    pub fn new(width: u64) -> Self {
        Self {
            width: width.clamp(1, MAX_REPLAY_WINDOW),
            highest: 0,
            bitmap: 0,
        }
    }

    /// Hoechster bisher angenommener Zaehler (0 = noch keiner)
    pub fn watermark(&self) -> u64 {
        self.highest
    }

    /// Prueft ohne den Zustand zu veraendern
    pub fn check(&self, counter: u64) -> CryptoResult<()> {
        let abgelehnt = CryptoError::ReplayRejected {
            counter,
            watermark: self.highest,
        };

        // Sender beginnen bei 1
        if counter == 0 {
            return Err(abgelehnt);
        }
        if counter > self.highest {
            return Ok(());
        }

        let abstand = self.highest - counter;
        if abstand >= self.width || self.bitmap & (1u64 << abstand) != 0 {
            return Err(abgelehnt);
        }
        Ok(())
    }

    /// Markiert einen (zuvor geprueften) Zaehler als angenommen
    pub fn commit(&mut self, counter: u64) {
        if counter > self.highest {
            let verschiebung = counter - self.highest;
            self.bitmap = if verschiebung >= MAX_REPLAY_WINDOW {
                0
            } else {
                self.bitmap << verschiebung
            };
            self.bitmap |= 1;
            self.highest = counter;
        } else {
            let abstand = self.highest - counter;
            if abstand < MAX_REPLAY_WINDOW {
                self.bitmap |= 1u64 << abstand;
            }
        }
    }
}
