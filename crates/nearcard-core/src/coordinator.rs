//! Session coordinator - the discovery and exchange state machine
//!
//! One coordinator task owns every piece of mutable session state: the
//! peer registry, the pending-offer map, the hosting flag, and the session
//! generation. Transport callbacks and UI calls never touch that state
//! directly; both funnel into the task's single select loop.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SessionHandle ──commands──►┌──────────────────┐                │
//! │                             │ coordinator task │──► Transport   │
//! │  Transport ────events──────►│  (sole mutator)  │──► ContactStore│
//! │                             └────────┬─────────┘                │
//! │                                      └──broadcast──► CardEvent  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Per-peer lifecycle: Discovered → Connecting → Connected →
//! NotConnected, re-entering Discovered on rediscovery. Accepting any
//! offer commits a full cycle restart: offers and registry are cleared,
//! hosting resets, and the advertise/browse cycle begins fresh.
//!
//! Invitation timers carry the session generation at the time they were
//! armed; a timer that fires after a restart is discarded, so a cancelled
//! invitation can never apply its timeout to the new cycle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::arbiter::{arbitrate, InvitationDecision};
use crate::codec;
use crate::config::{ConsentPolicy, SessionConfig};
use crate::error::{CardError, CardResult};
use crate::registry::PeerRegistry;
use crate::store::ContactStore;
use crate::transport::{InviteResponder, Transport, TransportEvent};
use crate::types::{AcceptedContact, ConnectionState, PeerIdentity, PeerRecord, ProfilePayload};

/// Capacity of the UI event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Callback the UI supplies to approve or decline incoming invitations.
///
/// Must not block: it runs on the coordinator task. Hand the responder off
/// to the UI and answer it later; never answering leaves the remote to its
/// own timeout (an implicit reject).
pub type ConsentHandler = Arc<dyn Fn(PeerIdentity, InviteResponder) + Send + Sync>;

/// Events emitted to the UI layer
#[derive(Debug, Clone)]
pub enum CardEvent {
    /// A compatible peer became visible
    PeerDiscovered { identity: PeerIdentity },
    /// A visible peer disappeared
    PeerLost { identity: PeerIdentity },
    /// A peer's connection state changed
    PeerStateChanged {
        identity: PeerIdentity,
        state: ConnectionState,
    },
    /// We auto-accepted an incoming invitation
    InvitationAccepted { identity: PeerIdentity },
    /// An incoming invitation was routed to the consent handler
    InvitationDelegated { identity: PeerIdentity },
    /// An incoming invitation was silently ignored (we are hosting)
    InvitationIgnored { identity: PeerIdentity },
    /// Our outgoing invitation expired without an answer (non-fatal)
    InvitationTimedOut { identity: PeerIdentity },
    /// A card arrived (or was replaced) for this peer
    OfferUpdated { identity: PeerIdentity },
    /// An accepted offer was persisted
    ContactSaved { identity: PeerIdentity },
    /// A received message could not be decoded (non-fatal, dropped)
    DecodeFailed {
        identity: PeerIdentity,
        message: String,
    },
    /// Our card could not be delivered (logged, not retried)
    SendFailed {
        identity: PeerIdentity,
        message: String,
    },
    /// Persisting an accepted offer failed
    StoreFailed {
        identity: PeerIdentity,
        message: String,
    },
    /// A fresh advertise/browse cycle started
    SessionRestarted,
    /// Advertiser or browser failed to start; the session needs an
    /// explicit restart
    Fatal { message: String },
}

enum Command {
    Invite(Vec<PeerIdentity>),
    AcceptOffers(Vec<PeerIdentity>),
    DiscoveredPeers(oneshot::Sender<Vec<PeerRecord>>),
    PendingOffers(oneshot::Sender<HashMap<PeerIdentity, ProfilePayload>>),
    SetConsentHandler(Option<ConsentHandler>),
    InviteTimeout {
        identity: PeerIdentity,
        generation: u64,
    },
    Restart,
    Shutdown,
}

/// Cloneable handle to a running [`SessionCoordinator`] task
#[derive(Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: broadcast::Sender<CardEvent>,
}

impl SessionHandle {
    /// Subscribe to UI events. Only events emitted after subscribing are
    /// delivered.
    pub fn subscribe(&self) -> broadcast::Receiver<CardEvent> {
        self.event_tx.subscribe()
    }

    /// Invite one or more discovered peers to connect
    pub fn invite(&self, peers: Vec<PeerIdentity>) -> CardResult<()> {
        self.send(Command::Invite(peers))
    }

    /// Persist the given pending offers, then restart the cycle
    pub fn accept_offers(&self, peers: Vec<PeerIdentity>) -> CardResult<()> {
        self.send(Command::AcceptOffers(peers))
    }

    /// Snapshot of the current registry, in discovery order
    pub async fn discovered_peers(&self) -> CardResult<Vec<PeerRecord>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::DiscoveredPeers(tx))?;
        rx.await
            .map_err(|_| CardError::InvalidOperation("coordinator stopped".to_string()))
    }

    /// Snapshot of offers received this cycle, keyed by sender
    pub async fn pending_offers(&self) -> CardResult<HashMap<PeerIdentity, ProfilePayload>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::PendingOffers(tx))?;
        rx.await
            .map_err(|_| CardError::InvalidOperation("coordinator stopped".to_string()))
    }

    /// Install (or clear) the consent handler for incoming invitations
    pub fn set_consent_handler(&self, handler: Option<ConsentHandler>) -> CardResult<()> {
        self.send(Command::SetConsentHandler(handler))
    }

    /// Begin a fresh discovery cycle, dropping all session state
    pub fn restart(&self) -> CardResult<()> {
        self.send(Command::Restart)
    }

    /// Stop browsing and advertising and end the coordinator task
    pub fn shutdown(&self) -> CardResult<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, cmd: Command) -> CardResult<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| CardError::InvalidOperation("coordinator stopped".to_string()))
    }
}

/// Entry point: spawns the coordinator task for one sharing session
pub struct SessionCoordinator;

impl SessionCoordinator {
    /// Start browsing and (if configured) advertising, then spawn the
    /// coordinator task.
    ///
    /// # Errors
    ///
    /// Returns [`CardError::DiscoveryStart`] when the advertiser or
    /// browser fails to start - fatal for the session; the caller must
    /// retry explicitly.
    pub fn start<T, S>(
        config: SessionConfig,
        identity: PeerIdentity,
        profile: ProfilePayload,
        mut transport: T,
        store: S,
    ) -> CardResult<SessionHandle>
    where
        T: Transport,
        S: ContactStore,
    {
        let transport_rx = transport.take_events()?;

        if config.advertise {
            transport
                .start_advertising(&identity, &config.tag)
                .map_err(|e| CardError::DiscoveryStart(e.to_string()))?;
        }
        if let Err(e) = transport.start_browsing(&config.tag) {
            // A failed start must leave the transport quiescent
            transport.stop_advertising();
            return Err(CardError::DiscoveryStart(e.to_string()));
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(identity = %identity, "Session coordinator starting");

        let inner = Inner {
            transport,
            store,
            config,
            identity,
            profile,
            registry: PeerRegistry::new(),
            offers: HashMap::new(),
            card_sent: HashSet::new(),
            consent: None,
            is_hosting: false,
            generation: 0,
            cmd_tx: cmd_tx.downgrade(),
            event_tx: event_tx.clone(),
        };
        tokio::spawn(inner.run(cmd_rx, transport_rx));

        Ok(SessionHandle { cmd_tx, event_tx })
    }
}

struct Inner<T: Transport, S: ContactStore> {
    transport: T,
    store: S,
    config: SessionConfig,
    identity: PeerIdentity,
    profile: ProfilePayload,
    registry: PeerRegistry,
    offers: HashMap<PeerIdentity, ProfilePayload>,
    /// Peers our own card was already pushed to this cycle
    card_sent: HashSet<PeerIdentity>,
    consent: Option<ConsentHandler>,
    /// True while any self-initiated invitation flow is outstanding.
    /// Recomputed when an invitation resolves without a session, cleared
    /// by a cycle restart.
    is_hosting: bool,
    /// Bumped on every cycle restart; stale timer results are discarded
    generation: u64,
    /// Weak so in-flight timers never keep the task alive on their own
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    event_tx: broadcast::Sender<CardEvent>,
}

impl<T: Transport, S: ContactStore> Inner<T, S> {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    // All handles dropped
                    None => break,
                },
                Some(event) = transport_rx.recv() => {
                    self.handle_transport(event);
                }
                else => break,
            }
        }

        self.transport.stop_browsing();
        self.transport.stop_advertising();
        info!(identity = %self.identity, "Session coordinator stopped");
    }

    /// Returns `false` when the task should stop
    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Invite(peers) => self.handle_invite(peers),
            Command::AcceptOffers(peers) => self.handle_accept(peers),
            Command::DiscoveredPeers(reply) => {
                let _ = reply.send(self.registry.snapshot());
            }
            Command::PendingOffers(reply) => {
                let _ = reply.send(self.offers.clone());
            }
            Command::SetConsentHandler(handler) => {
                self.consent = handler;
            }
            Command::InviteTimeout {
                identity,
                generation,
            } => self.handle_invite_timeout(identity, generation),
            Command::Restart => self.restart_cycle(),
            Command::Shutdown => return false,
        }
        true
    }

    fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound { identity, tag } => {
                if identity == self.identity {
                    return;
                }
                if !self.config.tag.matches(&tag) {
                    debug!(peer = %identity, "Ignoring peer with foreign discovery tag");
                    return;
                }
                if self.registry.get(&identity).is_none() {
                    self.registry.upsert(&identity, ConnectionState::Discovered);
                    info!(peer = %identity, "Peer discovered");
                    self.emit(CardEvent::PeerDiscovered { identity });
                }
            }
            TransportEvent::PeerLost { identity } => {
                if self.registry.remove(&identity).is_some() {
                    info!(peer = %identity, "Peer lost");
                    self.emit(CardEvent::PeerLost { identity });
                }
            }
            TransportEvent::InvitationReceived {
                identity,
                responder,
            } => self.handle_invitation(identity, responder),
            TransportEvent::SessionStateChanged { identity, state } => {
                self.handle_state_change(identity, state)
            }
            TransportEvent::MessageReceived { identity, bytes } => {
                self.handle_message(identity, bytes)
            }
        }
    }

    fn handle_invite(&mut self, peers: Vec<PeerIdentity>) {
        for peer in peers {
            match self.registry.get(&peer) {
                Some(record) if record.state == ConnectionState::Discovered => {}
                Some(record) => {
                    warn!(peer = %peer, state = %record.state, "Cannot invite peer in this state");
                    continue;
                }
                None => {
                    warn!(peer = %peer, "Cannot invite unknown peer");
                    continue;
                }
            }

            self.is_hosting = true;
            self.registry.upsert(&peer, ConnectionState::Connecting);
            self.registry.set_invited(&peer, true);

            info!(peer = %peer, timeout = ?self.config.invite_timeout, "Inviting peer");
            self.transport.invite(&peer, self.config.invite_timeout);

            // The timeout is enforced here, not by the transport, and is
            // tagged with the current generation so a restart cancels it.
            let cmd_tx = self.cmd_tx.clone();
            let generation = self.generation;
            let timeout = self.config.invite_timeout;
            let identity = peer.clone();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(cmd_tx) = cmd_tx.upgrade() {
                    let _ = cmd_tx.send(Command::InviteTimeout {
                        identity,
                        generation,
                    });
                }
            });

            self.emit(CardEvent::PeerStateChanged {
                identity: peer,
                state: ConnectionState::Connecting,
            });
        }
    }

    fn handle_invite_timeout(&mut self, identity: PeerIdentity, generation: u64) {
        if generation != self.generation {
            debug!(peer = %identity, "Discarding invite timeout from a previous cycle");
            return;
        }
        let still_pending = self
            .registry
            .get(&identity)
            .is_some_and(|r| r.invited_by_me && r.state == ConnectionState::Connecting);
        if !still_pending {
            return;
        }

        warn!(peer = %identity, "Invitation timed out");
        self.registry.upsert(&identity, ConnectionState::Discovered);
        self.registry.set_invited(&identity, false);
        self.refresh_hosting();
        self.emit(CardEvent::InvitationTimedOut { identity });
    }

    /// Hosting lasts exactly as long as a self-initiated invitation is
    /// outstanding; once the last one resolves, incoming invitations are
    /// serviced again.
    fn refresh_hosting(&mut self) {
        self.is_hosting = self
            .registry
            .iter()
            .any(|r| r.invited_by_me && r.state == ConnectionState::Connecting);
    }

    fn handle_invitation(&mut self, identity: PeerIdentity, responder: InviteResponder) {
        match arbitrate(self.is_hosting, self.consent.is_some()) {
            InvitationDecision::Ignore => {
                // Neither accept nor reject: the remote's timeout is the
                // implicit answer
                debug!(peer = %identity, "Ignoring invitation while hosting");
                drop(responder);
                self.emit(CardEvent::InvitationIgnored { identity });
            }
            InvitationDecision::Delegate => {
                let Some(handler) = self.consent.clone() else {
                    return;
                };
                debug!(peer = %identity, "Delegating invitation to consent handler");
                self.emit(CardEvent::InvitationDelegated {
                    identity: identity.clone(),
                });
                handler(identity, responder);
            }
            InvitationDecision::AutoAccept => {
                if self.config.consent == ConsentPolicy::RequireConsent {
                    // Consent required but no handler installed yet: leave
                    // the invitation pending
                    debug!(peer = %identity, "Consent required but no handler set; invitation left pending");
                    drop(responder);
                    self.emit(CardEvent::InvitationIgnored { identity });
                    return;
                }
                info!(peer = %identity, "Auto-accepting invitation");
                responder.respond(true);
                self.emit(CardEvent::InvitationAccepted { identity });
            }
        }
    }

    fn handle_state_change(&mut self, identity: PeerIdentity, state: ConnectionState) {
        match state {
            ConnectionState::Connected => {
                let invited_by_me = self
                    .registry
                    .get(&identity)
                    .map(|r| r.invited_by_me)
                    .unwrap_or(false);
                self.registry.upsert(&identity, ConnectionState::Connected);

                // The advertising channel services one accepted connection
                // at a time
                self.transport.stop_advertising();

                // Send-on-connect: the accepting side pushes its card; the
                // inviting side waits for the push instead
                if !invited_by_me {
                    self.send_own_card(&identity);
                }

                info!(peer = %identity, "Peer connected");
                self.emit(CardEvent::PeerStateChanged {
                    identity,
                    state: ConnectionState::Connected,
                });
            }
            ConnectionState::Connecting => {
                self.registry.upsert(&identity, ConnectionState::Connecting);
                self.emit(CardEvent::PeerStateChanged {
                    identity,
                    state: ConnectionState::Connecting,
                });
            }
            ConnectionState::NotConnected => {
                let was_active = self.registry.get(&identity).is_some_and(|r| {
                    matches!(
                        r.state,
                        ConnectionState::Connecting | ConnectionState::Connected
                    )
                });
                if !was_active {
                    return;
                }

                self.registry
                    .upsert(&identity, ConnectionState::NotConnected);
                self.registry.set_invited(&identity, false);
                self.refresh_hosting();
                info!(peer = %identity, "Peer disconnected");

                if !self.is_hosting && self.config.advertise {
                    if let Err(e) = self
                        .transport
                        .start_advertising(&self.identity, &self.config.tag)
                    {
                        error!(error = %e, "Failed to resume advertising");
                        self.emit(CardEvent::Fatal {
                            message: format!("failed to resume advertising: {}", e),
                        });
                    }
                }

                self.emit(CardEvent::PeerStateChanged {
                    identity,
                    state: ConnectionState::NotConnected,
                });
            }
            // Transports report session states only
            ConnectionState::Discovered => {}
        }
    }

    fn handle_message(&mut self, identity: PeerIdentity, bytes: Vec<u8>) {
        match codec::decode(&bytes) {
            Ok(payload) => {
                debug!(peer = %identity, name = %payload.name, "Offer received");
                self.offers.insert(identity.clone(), payload);
                // Reciprocate once per cycle when configured to share back
                if self.config.share_back && !self.card_sent.contains(&identity) {
                    self.send_own_card(&identity);
                }
                self.emit(CardEvent::OfferUpdated { identity });
            }
            Err(e) => {
                // Recoverable: drop the message, keep the session
                warn!(peer = %identity, error = %e, "Dropping undecodable payload");
                self.emit(CardEvent::DecodeFailed {
                    identity,
                    message: e.to_string(),
                });
            }
        }
    }

    fn send_own_card(&mut self, peer: &PeerIdentity) {
        // One push per peer per cycle, even when the push fails
        self.card_sent.insert(peer.clone());
        let bytes = match codec::encode(&self.profile) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to encode own card");
                self.emit(CardEvent::SendFailed {
                    identity: peer.clone(),
                    message: e.to_string(),
                });
                return;
            }
        };
        debug!(peer = %peer, "Sending own card");
        if let Err(e) = self.transport.send(peer, bytes) {
            // Fire-and-forget: log, never retry
            warn!(peer = %peer, error = %e, "Failed to send own card");
            self.emit(CardEvent::SendFailed {
                identity: peer.clone(),
                message: e.to_string(),
            });
        }
    }

    fn handle_accept(&mut self, peers: Vec<PeerIdentity>) {
        for peer in peers {
            let Some(payload) = self.offers.get(&peer).cloned() else {
                warn!(peer = %peer, "No pending offer to accept");
                continue;
            };

            let contact = AcceptedContact::new(peer.clone(), payload);
            match self.store.upsert(&contact) {
                Ok(()) => {
                    info!(peer = %peer, "Contact saved");
                    self.emit(CardEvent::ContactSaved { identity: peer });
                }
                Err(e) => {
                    error!(peer = %peer, error = %e, "Failed to persist contact");
                    self.emit(CardEvent::StoreFailed {
                        identity: peer,
                        message: e.to_string(),
                    });
                }
            }
        }

        // One accept commits a full cycle restart so no cross-cycle state
        // leaks into the next round of discovery
        self.restart_cycle();
    }

    fn restart_cycle(&mut self) {
        info!("Restarting discovery cycle");
        self.generation += 1;
        self.offers.clear();
        self.registry.clear();
        self.card_sent.clear();
        self.is_hosting = false;

        self.transport.stop_browsing();
        self.transport.stop_advertising();

        let mut failure = None;
        if self.config.advertise {
            if let Err(e) = self
                .transport
                .start_advertising(&self.identity, &self.config.tag)
            {
                failure = Some(format!("advertiser failed to start: {}", e));
            }
        }
        if failure.is_none() {
            if let Err(e) = self.transport.start_browsing(&self.config.tag) {
                failure = Some(format!("browser failed to start: {}", e));
            }
        }

        match failure {
            Some(message) => {
                error!(%message, "Discovery restart failed");
                self.emit(CardEvent::Fatal { message });
            }
            None => self.emit(CardEvent::SessionRestarted),
        }
    }

    fn emit(&self, event: CardEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }
}
