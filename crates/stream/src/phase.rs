//! Zustandsmaschine einer Uebersetzungs-Session
//!
//! ```text
//! Idle -Start-> Preparing -MediaReady-> Connecting -TransportUp-> Connected
//! Connected -TransportDropped-> Reconnecting -TransportUp-> Connected
//! Reconnecting -RetriesExhausted-> Disconnected
//! *  -Stop-> Disconnected      * -Fatal-> Error
//! Disconnected | Error -Start-> Preparing
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{StreamError, StreamResult};

/// Interner Zustand des Session-Treibers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Preparing,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    Disconnected,
}

/// Eingaben, die einen Uebergang ausloesen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionInput {
    Start,
    MediaReady,
    TransportUp,
    TransportDropped,
    RetriesExhausted,
    Stop,
    Fatal,
}

/// Nach aussen sichtbarer Verbindungsstatus (genau einer pro Session)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

impl SessionPhase {
    /// Reiner Uebergang ohne Seiteneffekte
    pub fn next(self, input: SessionInput) -> StreamResult<SessionPhase> {
        use SessionInput as I;
        use SessionPhase as P;

        match (self, input) {
            (_, I::Stop) => Ok(P::Disconnected),
            (_, I::Fatal) => Ok(P::Error),
            (P::Idle | P::Disconnected | P::Error, I::Start) => Ok(P::Preparing),
            (P::Preparing, I::MediaReady) => Ok(P::Connecting),
            (P::Connecting, I::TransportUp) => Ok(P::Connected),
            (P::Connected, I::TransportDropped) => Ok(P::Reconnecting),
            (P::Reconnecting, I::TransportUp) => Ok(P::Connected),
            (P::Reconnecting, I::RetriesExhausted) => Ok(P::Disconnected),
            (from, input) => Err(StreamError::InvalidTransition { from, input }),
        }
    }

    pub fn connection_state(self) -> ConnectionState {
        match self {
            Self::Idle | Self::Disconnected => ConnectionState::Disconnected,
            Self::Preparing | Self::Connecting => ConnectionState::Connecting,
            Self::Connected => ConnectionState::Connected,
            Self::Reconnecting => ConnectionState::Reconnecting,
            Self::Error => ConnectionState::Error,
        }
    }

    /// Session haelt Mikrofon und/oder Transport
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Preparing | Self::Connecting | Self::Connected | Self::Reconnecting
        )
    }
}
