//! Nearcard Core Library
//!
//! Local peer discovery, session negotiation, and business-card exchange.
//!
//! ## Overview
//!
//! A device advertises its presence on the local network, browses for
//! compatible peers, negotiates sessions with them, and pushes a small
//! structured profile record (a "business card") to each peer once
//! connected. The [`SessionCoordinator`] owns the whole per-peer state
//! machine; the physical discovery layer is supplied behind the
//! [`Transport`] trait; accepted cards land in a [`ContactStore`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use nearcard_core::{
//!     MemoryHub, ProfilePayload, RedbContactStore, SessionConfig, SessionCoordinator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = MemoryHub::new();
//!     let store = RedbContactStore::open("~/.nearcard/data/contacts.redb")?;
//!
//!     let handle = SessionCoordinator::start(
//!         SessionConfig::default(),
//!         "My Phone".into(),
//!         ProfilePayload::new("Pinar Olguc", "pinar@domain.com"),
//!         hub.endpoint("My Phone"),
//!         store,
//!     )?;
//!
//!     // Browse, invite, and collect offers
//!     for peer in handle.discovered_peers().await? {
//!         println!("{}: {}", peer.identity, peer.state);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod arbiter;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports
pub use arbiter::{arbitrate, InvitationDecision};
pub use config::{ConsentPolicy, SessionConfig, DEFAULT_INVITE_TIMEOUT, SHORT_INVITE_TIMEOUT};
pub use coordinator::{CardEvent, ConsentHandler, SessionCoordinator, SessionHandle};
pub use error::{CardError, CardResult};
pub use registry::PeerRegistry;
pub use store::{ContactStore, MemoryContactStore, RedbContactStore};
pub use transport::memory::{MemoryHub, MemoryTransport};
pub use transport::{InviteResponder, Transport, TransportEvent};
pub use types::{
    AcceptedContact, ConnectionState, DiscoveryTag, PeerIdentity, PeerRecord, ProfilePayload,
};
