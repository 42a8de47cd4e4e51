//! Session-Key-Store
//!
//! Haelt pro aktivem Peer einen `SessionState`:
//! - Frame-Schluessel je Senderichtung (werden bei `destroy` genullt)
//! - Sende-Zaehler (atomar, pro Peer, kein globaler Lock)
//! - Empfangs-Fenster fuer den Replay-Schutz
//!
//! Thread-safe durch DashMap. Der Store wird explizit erzeugt und per
//! `Arc` an den `FrameCipher` und das Pairing weitergegeben.

use dashmap::DashMap;
use dolmetsch_core::PeerId;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use zeroize::Zeroize;

use crate::e2e::replay::ReplayWindow;
use crate::error::{CryptoError, CryptoResult};
use crate::primitives::derive_key;
use crate::types::{E2eConfig, SecretBytes, SessionRole, KEY_LEN};

/// Aus dem Session-Schluessel abgeleitete Frame-Schluessel
struct FrameKeys {
    send: SecretBytes,
    receive: SecretBytes,
}

impl FrameKeys {
    fn ableiten(session_key: &[u8], role: SessionRole) -> CryptoResult<Self> {
        let richtung = |absender: SessionRole| -> CryptoResult<SecretBytes> {
            let mut key = derive_key(session_key, None, Some(absender.send_info()))?;
            let bytes = SecretBytes::new(key.to_vec());
            key.zeroize();
            Ok(bytes)
        };
        Ok(Self {
            send: richtung(role)?,
            receive: richtung(role.remote())?,
        })
    }
}

impl Zeroize for FrameKeys {
    fn zeroize(&mut self) {
        self.send.zeroize();
        self.receive.zeroize();
    }
}

/// Zustand einer Peer-Verbindung
pub struct SessionState {
    peer_id: PeerId,
    role: SessionRole,
    /// `None` nach `destroy`; laufende Operationen schlagen dann fehl
    keys: RwLock<Option<FrameKeys>>,
    counter: AtomicU64,
    established: i64,
    receive_window: Mutex<ReplayWindow>,
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("peer_id", &self.peer_id)
            .field("role", &self.role)
            .field("counter", &self.counter())
            .field("established", &self.established)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl SessionState {
    fn new(
        peer_id: PeerId,
        role: SessionRole,
        keys: FrameKeys,
        established: i64,
        replay_window: u64,
    ) -> Self {
        Self {
            peer_id,
            role,
            keys: RwLock::new(Some(keys)),
            counter: AtomicU64::new(0),
            established,
            receive_window: Mutex::new(ReplayWindow::new(replay_window)),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Eigene Rolle gegenueber diesem Peer
    pub fn role(&self) -> SessionRole {
        self.role
    }

    /// Zeitpunkt der Schluessel-Etablierung in ms
    pub fn established(&self) -> i64 {
        self.established
    }

    /// Zuletzt vergebener Sende-Zaehler (0 = noch kein Frame)
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Atomares fetch-and-increment; liefert den neuen Wert (erster Aufruf: 1)
    ///
    /// Der Zaehler laeuft nie ueber: bei `u64::MAX` ist ein neuer
    /// Schluessel noetig.
    pub fn advance_counter(&self) -> CryptoResult<u64> {
        self.counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_add(1))
            .map(|vorher| vorher + 1)
            .map_err(|_| CryptoError::CounterExhausted {
                peer: self.peer_id.to_string(),
            })
    }

    /// Fuehrt `f` mit dem Sende-Schluessel aus (Lesesperre nur fuer diesen Peer)
    pub(crate) fn with_send_key<T>(
        &self,
        f: impl FnOnce(&[u8]) -> CryptoResult<T>,
    ) -> CryptoResult<T> {
        let guard = self.keys.read();
        let keys = guard
            .as_ref()
            .ok_or_else(|| CryptoError::keine_session(self.peer_id))?;
        f(keys.send.as_bytes())
    }

    /// Wie `with_send_key`, mit dem Schluessel der Gegenrichtung
    pub(crate) fn with_receive_key<T>(
        &self,
        f: impl FnOnce(&[u8]) -> CryptoResult<T>,
    ) -> CryptoResult<T> {
        let guard = self.keys.read();
        let keys = guard
            .as_ref()
            .ok_or_else(|| CryptoError::keine_session(self.peer_id))?;
        f(keys.receive.as_bytes())
    }

    pub(crate) fn receive_window(&self) -> MutexGuard<'_, ReplayWindow> {
        self.receive_window.lock()
    }

    /// Hoechster angenommener Empfangs-Zaehler
    pub fn watermark(&self) -> u64 {
        self.receive_window.lock().watermark()
    }

    pub fn is_destroyed(&self) -> bool {
        self.keys.read().is_none()
    }

    fn zeroize_keys(&self) {
        if let Some(mut keys) = self.keys.write().take() {
            keys.zeroize();
        }
    }
}

/// Verwaltet die Session-Schluessel aller Peers
#[derive(Debug)]
pub struct SessionKeyStore {
    sessions: DashMap<PeerId, Arc<SessionState>>,
    replay_window: u64,
}

impl Default for SessionKeyStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl SessionKeyStore {
    /// `replay_window` gilt fuer alle hier etablierten Sessions
    pub fn new(replay_window: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            replay_window,
        }
    }

    pub fn from_config(config: &E2eConfig) -> Self {
        Self::new(config.replay_window)
    }

    /// Legt eine Session mit frischem Schluessel an
    ///
    /// `role` ist die eigene Rolle: gesendet wird unter dem Schluessel
    /// dieser Richtung, empfangen unter dem der Gegenrichtung. Eine
    /// bestehende Session fuer denselben Peer wird ersetzt und ihre
    /// Schluessel genullt; der Zaehler beginnt wieder bei 0.
    pub fn establish(
        &self,
        peer_id: PeerId,
        mut session_key: [u8; KEY_LEN],
        role: SessionRole,
        established: i64,
    ) -> CryptoResult<Arc<SessionState>> {
        let keys = FrameKeys::ableiten(&session_key, role);
        session_key.zeroize();
        let state = Arc::new(SessionState::new(
            peer_id,
            role,
            keys?,
            established,
            self.replay_window,
        ));

        if let Some(alt) = self.sessions.insert(peer_id, Arc::clone(&state)) {
            alt.zeroize_keys();
            tracing::info!(peer = %peer_id, ?role, "Session ersetzt, alter Schluessel verworfen");
        } else {
            tracing::info!(peer = %peer_id, ?role, "Session etabliert");
        }
        Ok(state)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Arc<SessionState>> {
        self.sessions.get(peer_id).map(|entry| Arc::clone(&*entry))
    }

    /// Wie `get`, aber mit `SessionNotEstablished` als Fehler
    pub fn require(&self, peer_id: &PeerId) -> CryptoResult<Arc<SessionState>> {
        self.get(peer_id)
            .ok_or_else(|| CryptoError::keine_session(peer_id))
    }

    /// Atomares fetch-and-increment des Sende-Zaehlers eines Peers
    pub fn advance_counter(&self, peer_id: &PeerId) -> CryptoResult<u64> {
        self.require(peer_id)?.advance_counter()
    }

    /// Nullt den Schluessel und entfernt die Session. Idempotent.
    pub fn destroy(&self, peer_id: &PeerId) {
        if let Some((_, state)) = self.sessions.remove(peer_id) {
            state.zeroize_keys();
            tracing::info!(peer = %peer_id, "Session zerstoert");
        }
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.sessions.iter().map(|entry| *entry.key()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
