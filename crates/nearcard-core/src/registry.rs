//! Peer registry - per-session tracking of visible peers
//!
//! Single source of truth for which peers are visible, invited, or
//! connected during one discovery cycle. The registry is working memory:
//! it is cleared whenever a new browsing cycle starts, so nothing here
//! is persisted. All mutation is routed through the session coordinator;
//! the registry itself is never shared across tasks.
//!
//! Records keep discovery (insertion) order for UI display.

use tracing::trace;

use crate::types::{ConnectionState, PeerIdentity, PeerRecord};

/// In-memory registry of peers for the current discovery cycle.
///
/// Invariant: a [`PeerIdentity`] appears at most once.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update a peer's connection state.
    ///
    /// Idempotent: a no-op if the peer is already present with the same
    /// state. Returns `true` if the registry changed.
    pub fn upsert(&mut self, identity: &PeerIdentity, state: ConnectionState) -> bool {
        match self.position(identity) {
            Some(idx) => {
                if self.peers[idx].state == state {
                    return false;
                }
                trace!(peer = %identity, from = %self.peers[idx].state, to = %state, "Peer state updated");
                self.peers[idx].state = state;
                true
            }
            None => {
                trace!(peer = %identity, %state, "Peer registered");
                self.peers.push(PeerRecord {
                    identity: identity.clone(),
                    state,
                    invited_by_me: false,
                });
                true
            }
        }
    }

    /// Mark whether we initiated the session with this peer.
    ///
    /// Returns `false` if the peer is unknown.
    pub fn set_invited(&mut self, identity: &PeerIdentity, invited: bool) -> bool {
        match self.position(identity) {
            Some(idx) => {
                self.peers[idx].invited_by_me = invited;
                true
            }
            None => false,
        }
    }

    /// Look up a peer's record
    pub fn get(&self, identity: &PeerIdentity) -> Option<&PeerRecord> {
        self.position(identity).map(|idx| &self.peers[idx])
    }

    /// Remove a peer. No error if absent; returns the removed record.
    pub fn remove(&mut self, identity: &PeerIdentity) -> Option<PeerRecord> {
        let idx = self.position(identity)?;
        trace!(peer = %identity, "Peer removed");
        Some(self.peers.remove(idx))
    }

    /// Iterate current records in discovery order
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.iter()
    }

    /// Snapshot copies of all records, in discovery order, for UI display
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        self.peers.clone()
    }

    /// Empty the registry (called at session (re)start)
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn position(&self, identity: &PeerIdentity) -> Option<usize> {
        self.peers.iter().position(|p| &p.identity == identity)
    }
}
