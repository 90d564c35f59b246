//! Invitation arbitration
//!
//! Pure decision function breaking the simultaneous-invitation race: a
//! device that is mid-invitation ("hosting") never services an incoming
//! invitation, so two devices inviting each other end up with exactly one
//! session platform-wide.

/// What to do with an incoming invitation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationDecision {
    /// Silently ignore - neither accept nor reject. The inviter's own
    /// timeout acts as the implicit reject.
    Ignore,
    /// Forward the decision to the UI-supplied consent handler
    Delegate,
    /// Accept immediately
    AutoAccept,
}

/// Decide how to respond to an incoming invitation.
///
/// Rule, in order: hosting wins (ignore), then a configured consent
/// handler (delegate), otherwise auto-accept.
pub fn arbitrate(is_hosting: bool, has_consent_handler: bool) -> InvitationDecision {
    if is_hosting {
        InvitationDecision::Ignore
    } else if has_consent_handler {
        InvitationDecision::Delegate
    } else {
        InvitationDecision::AutoAccept
    }
}
