//! In-process loopback transport
//!
//! Wires any number of endpoints together through a shared hub so the
//! whole discovery/invitation/exchange flow can run deterministically
//! inside one process. Used by the integration tests and the CLI demo.
//!
//! The hub honors the same contract a platform transport would: tag
//! filtering on discovery, self-exclusion, invitation round-trips via
//! [`InviteResponder`], `PeerLost` when an advertiser goes away, and
//! reliable delivery only over an established session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{CardError, CardResult};
use crate::transport::{InviteResponder, Transport, TransportEvent};
use crate::types::{ConnectionState, DiscoveryTag, PeerIdentity};

#[derive(Default)]
struct HubState {
    endpoints: HashMap<PeerIdentity, Endpoint>,
}

struct Endpoint {
    events: mpsc::UnboundedSender<TransportEvent>,
    advertising: Option<DiscoveryTag>,
    browsing: Option<DiscoveryTag>,
    connected: HashSet<PeerIdentity>,
}

impl HubState {
    fn emit(&self, to: &PeerIdentity, event: TransportEvent) {
        if let Some(endpoint) = self.endpoints.get(to) {
            // Receiver may already be gone during shutdown
            let _ = endpoint.events.send(event);
        }
    }

    fn sever(&mut self, a: &PeerIdentity, b: &PeerIdentity) {
        let mut was_connected = false;
        if let Some(endpoint) = self.endpoints.get_mut(a) {
            was_connected |= endpoint.connected.remove(b);
        }
        if let Some(endpoint) = self.endpoints.get_mut(b) {
            was_connected |= endpoint.connected.remove(a);
        }
        if was_connected {
            self.emit(
                a,
                TransportEvent::SessionStateChanged {
                    identity: b.clone(),
                    state: ConnectionState::NotConnected,
                },
            );
            self.emit(
                b,
                TransportEvent::SessionStateChanged {
                    identity: a.clone(),
                    state: ConnectionState::NotConnected,
                },
            );
        }
    }
}

/// Shared hub connecting in-process endpoints
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an endpoint under the given identity and return its transport
    pub fn endpoint(&self, identity: impl Into<PeerIdentity>) -> MemoryTransport {
        let identity = identity.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        self.state.lock().endpoints.insert(
            identity.clone(),
            Endpoint {
                events: events_tx,
                advertising: None,
                browsing: None,
                connected: HashSet::new(),
            },
        );

        MemoryTransport {
            identity,
            state: self.state.clone(),
            events: Some(events_rx),
        }
    }

    /// Tear down the session between two endpoints, notifying both sides
    pub fn disconnect(&self, a: &PeerIdentity, b: &PeerIdentity) {
        self.state.lock().sever(a, b);
    }
}

/// One endpoint's view of the [`MemoryHub`]
pub struct MemoryTransport {
    identity: PeerIdentity,
    state: Arc<Mutex<HubState>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
}

impl Transport for MemoryTransport {
    fn start_advertising(&mut self, identity: &PeerIdentity, tag: &DiscoveryTag) -> CardResult<()> {
        debug_assert_eq!(identity, &self.identity);
        let mut state = self.state.lock();

        if let Some(endpoint) = state.endpoints.get_mut(&self.identity) {
            endpoint.advertising = Some(tag.clone());
        }

        // Every matching browser sees us immediately
        let browsers: Vec<PeerIdentity> = state
            .endpoints
            .iter()
            .filter(|(id, ep)| {
                *id != &self.identity
                    && ep.browsing.as_ref().is_some_and(|filter| filter.matches(tag))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for browser in browsers {
            state.emit(
                &browser,
                TransportEvent::PeerFound {
                    identity: self.identity.clone(),
                    tag: tag.clone(),
                },
            );
        }
        Ok(())
    }

    fn stop_advertising(&mut self) {
        let mut state = self.state.lock();

        let was_advertising = state
            .endpoints
            .get_mut(&self.identity)
            .and_then(|ep| ep.advertising.take());
        let Some(tag) = was_advertising else {
            return;
        };

        let browsers: Vec<PeerIdentity> = state
            .endpoints
            .iter()
            .filter(|(id, ep)| {
                *id != &self.identity
                    && ep.browsing.as_ref().is_some_and(|filter| filter.matches(&tag))
            })
            .map(|(id, _)| id.clone())
            .collect();
        for browser in browsers {
            state.emit(
                &browser,
                TransportEvent::PeerLost {
                    identity: self.identity.clone(),
                },
            );
        }
    }

    fn start_browsing(&mut self, tag: &DiscoveryTag) -> CardResult<()> {
        let mut state = self.state.lock();

        if let Some(endpoint) = state.endpoints.get_mut(&self.identity) {
            endpoint.browsing = Some(tag.clone());
        }

        // Surface everyone already advertising under a matching tag
        let visible: Vec<(PeerIdentity, DiscoveryTag)> = state
            .endpoints
            .iter()
            .filter(|(id, _)| *id != &self.identity)
            .filter_map(|(id, ep)| {
                ep.advertising
                    .as_ref()
                    .filter(|advertised| tag.matches(advertised))
                    .map(|advertised| (id.clone(), advertised.clone()))
            })
            .collect();
        for (identity, found_tag) in visible {
            state.emit(
                &self.identity,
                TransportEvent::PeerFound {
                    identity,
                    tag: found_tag,
                },
            );
        }
        Ok(())
    }

    fn stop_browsing(&mut self) {
        let mut state = self.state.lock();
        if let Some(endpoint) = state.endpoints.get_mut(&self.identity) {
            endpoint.browsing = None;
        }
    }

    fn invite(&mut self, peer: &PeerIdentity, _timeout: Duration) {
        let state = self.state.lock();
        if !state.endpoints.contains_key(peer) {
            // Unknown peer: the inviter's own timeout handles it
            debug!(peer = %peer, "Invite to unknown endpoint dropped");
            return;
        }

        let hub = self.state.clone();
        let inviter = self.identity.clone();
        let invitee = peer.clone();
        let responder = InviteResponder::new(move |accept| {
            let mut state = hub.lock();
            if accept {
                for (us, them) in [(&inviter, &invitee), (&invitee, &inviter)] {
                    state.emit(
                        us,
                        TransportEvent::SessionStateChanged {
                            identity: them.clone(),
                            state: ConnectionState::Connecting,
                        },
                    );
                }
                if let Some(ep) = state.endpoints.get_mut(&inviter) {
                    ep.connected.insert(invitee.clone());
                }
                if let Some(ep) = state.endpoints.get_mut(&invitee) {
                    ep.connected.insert(inviter.clone());
                }
                for (us, them) in [(&inviter, &invitee), (&invitee, &inviter)] {
                    state.emit(
                        us,
                        TransportEvent::SessionStateChanged {
                            identity: them.clone(),
                            state: ConnectionState::Connected,
                        },
                    );
                }
            } else {
                state.emit(
                    &inviter,
                    TransportEvent::SessionStateChanged {
                        identity: invitee.clone(),
                        state: ConnectionState::NotConnected,
                    },
                );
            }
        });

        state.emit(
            peer,
            TransportEvent::InvitationReceived {
                identity: self.identity.clone(),
                responder,
            },
        );
    }

    fn send(&mut self, peer: &PeerIdentity, bytes: Vec<u8>) -> CardResult<()> {
        let state = self.state.lock();
        let connected = state
            .endpoints
            .get(&self.identity)
            .is_some_and(|ep| ep.connected.contains(peer));
        if !connected {
            return Err(CardError::Transport(format!("no session with {}", peer)));
        }

        state.emit(
            peer,
            TransportEvent::MessageReceived {
                identity: self.identity.clone(),
                bytes,
            },
        );
        Ok(())
    }

    fn take_events(&mut self) -> CardResult<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events
            .take()
            .ok_or_else(|| CardError::InvalidOperation("event stream already taken".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag() -> DiscoveryTag {
        DiscoveryTag::default()
    }

    #[tokio::test]
    async fn test_browser_sees_existing_advertiser() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");

        alice
            .start_advertising(&"alice".into(), &tag())
            .unwrap();

        let mut events = bob.take_events().unwrap();
        bob.start_browsing(&tag()).unwrap();

        match events.recv().await.unwrap() {
            TransportEvent::PeerFound { identity, .. } => {
                assert_eq!(identity, "alice".into());
            }
            other => panic!("expected PeerFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tag_mismatch_is_invisible() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");

        alice
            .start_advertising(&"alice".into(), &DiscoveryTag::new("app", "other"))
            .unwrap();

        let mut events = bob.take_events().unwrap();
        bob.start_browsing(&tag()).unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_advertising_emits_peer_lost() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");

        let mut events = bob.take_events().unwrap();
        bob.start_browsing(&tag()).unwrap();
        alice
            .start_advertising(&"alice".into(), &tag())
            .unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::PeerFound { .. }
        ));

        alice.stop_advertising();
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::PeerLost { identity } if identity == "alice".into()
        ));

        // Idempotent: a second stop produces nothing
        alice.stop_advertising();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_accepted_invitation_connects_both_sides() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");

        let mut alice_events = alice.take_events().unwrap();
        let mut bob_events = bob.take_events().unwrap();

        alice.invite(&"bob".into(), Duration::from_secs(1));

        match bob_events.recv().await.unwrap() {
            TransportEvent::InvitationReceived { identity, responder } => {
                assert_eq!(identity, "alice".into());
                responder.respond(true);
            }
            other => panic!("expected InvitationReceived, got {:?}", other),
        }

        // Both sides see Connecting then Connected
        for events in [&mut alice_events, &mut bob_events] {
            assert!(matches!(
                events.recv().await.unwrap(),
                TransportEvent::SessionStateChanged {
                    state: ConnectionState::Connecting,
                    ..
                }
            ));
            assert!(matches!(
                events.recv().await.unwrap(),
                TransportEvent::SessionStateChanged {
                    state: ConnectionState::Connected,
                    ..
                }
            ));
        }

        // Session is live in both directions
        alice.send(&"bob".into(), b"hi".to_vec()).unwrap();
        assert!(matches!(
            bob_events.recv().await.unwrap(),
            TransportEvent::MessageReceived { bytes, .. } if bytes == b"hi"
        ));
    }

    #[tokio::test]
    async fn test_rejected_invitation_reports_not_connected() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let mut bob = hub.endpoint("bob");

        let mut alice_events = alice.take_events().unwrap();
        let mut bob_events = bob.take_events().unwrap();

        alice.invite(&"bob".into(), Duration::from_secs(1));
        match bob_events.recv().await.unwrap() {
            TransportEvent::InvitationReceived { responder, .. } => responder.respond(false),
            other => panic!("expected InvitationReceived, got {:?}", other),
        }

        assert!(matches!(
            alice_events.recv().await.unwrap(),
            TransportEvent::SessionStateChanged {
                state: ConnectionState::NotConnected,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_send_without_session_fails() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");
        let _bob = hub.endpoint("bob");

        let err = alice.send(&"bob".into(), b"hi".to_vec()).unwrap_err();
        assert!(matches!(err, CardError::Transport(_)));
    }

    #[tokio::test]
    async fn test_event_stream_taken_once() {
        let hub = MemoryHub::new();
        let mut alice = hub.endpoint("alice");

        assert!(alice.take_events().is_ok());
        assert!(matches!(
            alice.take_events(),
            Err(CardError::InvalidOperation(_))
        ));
    }
}
