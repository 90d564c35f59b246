//! Core types for peer discovery and card exchange

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable, human-readable identifier for a remote endpoint (its display name).
///
/// Unique within one discovery session. Not globally unique across app
/// reinstalls; treated as best-effort identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerIdentity {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for PeerIdentity {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Connection state of a remote peer, as tracked in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Visible via browsing, no session yet
    Discovered,
    /// Session negotiation in progress
    Connecting,
    /// Reliable session established
    Connected,
    /// Session ended or invitation failed (terminal for the cycle)
    NotConnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Discovered => write!(f, "discovered"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::NotConnected => write!(f, "notConnected"),
        }
    }
}

/// Registry entry for one remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// The peer's display-name identity
    pub identity: PeerIdentity,
    /// Current connection state
    pub state: ConnectionState,
    /// True only for sessions this side initiated, while Connecting/Connected
    pub invited_by_me: bool,
}

impl PeerRecord {
    /// Create a freshly discovered record
    pub fn discovered(identity: PeerIdentity) -> Self {
        Self {
            identity,
            state: ConnectionState::Discovered,
            invited_by_me: false,
        }
    }
}

/// The business card payload exchanged between connected peers.
///
/// `name` and `email` are required on the wire; `phone` and `job` are
/// optional and omitted from the encoded form when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePayload {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
}

impl ProfilePayload {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
            job: None,
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }
}

/// A persisted, locally accepted peer card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedContact {
    /// Display-name identity of the sending peer
    pub identity: PeerIdentity,
    /// The card they shared
    pub payload: ProfilePayload,
    /// Unix timestamp of the accepting exchange
    pub last_seen: i64,
}

impl AcceptedContact {
    /// Create a contact stamped with the current time
    pub fn new(identity: PeerIdentity, payload: ProfilePayload) -> Self {
        Self {
            identity,
            payload,
            last_seen: chrono::Utc::now().timestamp(),
        }
    }
}

/// Key-value marker broadcast during advertising so browsers can filter
/// for compatible peers only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryTag {
    pub key: String,
    pub value: String,
}

impl DiscoveryTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether an advertised tag satisfies this browser's filter
    pub fn matches(&self, other: &DiscoveryTag) -> bool {
        self == other
    }
}

impl Default for DiscoveryTag {
    fn default() -> Self {
        Self::new("app", "nearcard")
    }
}
