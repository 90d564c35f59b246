//! Transport adapter - the platform peer-discovery service seam
//!
//! The physical discovery layer (mDNS, Bluetooth, local Wi-Fi) is provided
//! by the platform; this module defines the interface the coordinator
//! consumes. The platform's delegate callbacks are re-expressed as a single
//! [`TransportEvent`] stream consumed by one coordinating task, so no state
//! is ever mutated from a callback context.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Transport contract                                             │
//! │  coordinator ──► start/stop advertising, start/stop browsing    │
//! │  coordinator ──► invite(peer, timeout)   (fire-and-forget)      │
//! │  coordinator ──► send(peer, bytes)       (reliable session)     │
//! │  transport   ──► PeerFound / PeerLost / InvitationReceived /    │
//! │                  SessionStateChanged / MessageReceived          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Invitation outcomes surface as `SessionStateChanged` events, never as
//! return values; the coordinator owns its own invitation timeout.

pub mod memory;

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::CardResult;
use crate::types::{ConnectionState, DiscoveryTag, PeerIdentity};

/// One-shot reply channel for an incoming invitation.
///
/// Consumed by responding. Dropping it unanswered leaves the invitation
/// pending on the remote side until its own timeout expires - the
/// "silently ignored" arbitration path.
pub struct InviteResponder {
    reply: Option<Box<dyn FnOnce(bool) + Send>>,
}

impl InviteResponder {
    pub fn new(reply: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            reply: Some(Box::new(reply)),
        }
    }

    /// Accept (`true`) or reject (`false`) the invitation
    pub fn respond(mut self, accept: bool) {
        if let Some(reply) = self.reply.take() {
            reply(accept);
        }
    }
}

impl fmt::Debug for InviteResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InviteResponder(pending)")
    }
}

/// Event produced asynchronously by the transport
#[derive(Debug)]
pub enum TransportEvent {
    /// A compatible peer became visible while browsing
    PeerFound {
        identity: PeerIdentity,
        tag: DiscoveryTag,
    },
    /// A previously visible peer disappeared
    PeerLost { identity: PeerIdentity },
    /// A remote peer asked to open a session with us
    InvitationReceived {
        identity: PeerIdentity,
        responder: InviteResponder,
    },
    /// The session to a peer changed state (Connecting/Connected/NotConnected)
    SessionStateChanged {
        identity: PeerIdentity,
        state: ConnectionState,
    },
    /// Data arrived over an established session
    MessageReceived {
        identity: PeerIdentity,
        bytes: Vec<u8>,
    },
}

/// Platform advertise/browse/session primitives.
///
/// Stop calls are idempotent and immediately prevent further events from
/// that channel from being enqueued. All outcomes of `invite` arrive via
/// the event stream.
pub trait Transport: Send + 'static {
    /// Advertise our presence under the given discovery tag
    fn start_advertising(&mut self, identity: &PeerIdentity, tag: &DiscoveryTag) -> CardResult<()>;

    fn stop_advertising(&mut self);

    /// Browse for peers advertising a matching tag
    fn start_browsing(&mut self, tag: &DiscoveryTag) -> CardResult<()>;

    fn stop_browsing(&mut self);

    /// Ask a discovered peer to open a session. Fire-and-forget: success
    /// and failure both arrive later as `SessionStateChanged` events.
    fn invite(&mut self, peer: &PeerIdentity, timeout: Duration);

    /// Send bytes to a connected peer over the reliable session
    fn send(&mut self, peer: &PeerIdentity, bytes: Vec<u8>) -> CardResult<()>;

    /// Take the event stream. May only be taken once.
    fn take_events(&mut self) -> CardResult<mpsc::UnboundedReceiver<TransportEvent>>;
}
