use std::fmt;

/// Errors surfaced by the realtime session core.
///
/// Setup-phase errors (`Credential`, `MediaAccess`, `Negotiation`) abort the
/// connection attempt and release every partially-acquired resource.
/// `MalformedEvent` is non-fatal: the offending message is logged and
/// dropped. `Finalization` is reported after the connection is already
/// torn down.
#[derive(Debug)]
pub enum SessionError {
    /// Ephemeral credential issuance failed or the credential field was absent
    Credential(String),

    /// Microphone denied or unavailable
    MediaAccess(String),

    /// SDP offer/answer exchange failed (rejected credential, malformed
    /// answer, network failure, or timeout)
    Negotiation(String),

    /// Post-session extraction/evaluation call failed
    Finalization(String),

    /// Unparseable signaling message
    MalformedEvent(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Credential(msg) => write!(f, "credential error: {}", msg),
            SessionError::MediaAccess(msg) => write!(f, "media access error: {}", msg),
            SessionError::Negotiation(msg) => write!(f, "negotiation error: {}", msg),
            SessionError::Finalization(msg) => write!(f, "finalization error: {}", msg),
            SessionError::MalformedEvent(msg) => write!(f, "malformed event: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}
