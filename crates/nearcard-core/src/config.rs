//! Session configuration

use std::time::Duration;

use crate::types::DiscoveryTag;

/// Default bound on an outgoing invitation before it reverts to Discovered
pub const DEFAULT_INVITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shorter variant for quick interactive flows
pub const SHORT_INVITE_TIMEOUT: Duration = Duration::from_secs(10);

/// How incoming cards are admitted once a session is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsentPolicy {
    /// Accept incoming invitations immediately and notify the UI
    #[default]
    AutoAccept,
    /// Route each invitation to the UI-supplied consent handler. Without a
    /// handler the invitation stays pending until the remote's timeout
    /// expires, which acts as an implicit reject.
    RequireConsent,
}

/// Configuration for one session coordinator
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Discovery-info marker advertised and required of browsed peers
    pub tag: DiscoveryTag,
    /// Bound on outgoing invitations
    pub invite_timeout: Duration,
    /// Incoming-invitation consent policy
    pub consent: ConsentPolicy,
    /// Whether this device advertises itself at all ("allow others to
    /// discover my device")
    pub advertise: bool,
    /// Push our own card back to a peer whose card we received, once per
    /// cycle ("automatically share back my card"). Off by default: only
    /// the accepting side of a session pushes unprompted.
    pub share_back: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tag: DiscoveryTag::default(),
            invite_timeout: DEFAULT_INVITE_TIMEOUT,
            consent: ConsentPolicy::AutoAccept,
            advertise: true,
            share_back: false,
        }
    }
}
