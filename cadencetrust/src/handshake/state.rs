// Handshake state machine.

use std::fmt;

/// The current state of an access-point handshake.
///
/// Transitions are strictly sequential:
/// `Idle -> SentHello -> ReceivedApResponse -> VerifiedSignature ->
/// SentChallengeResponse -> EstablishedCipher`, with `Failed` reachable from
/// every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No handshake in progress.
    Idle,
    /// ClientHello written, waiting for the AP response.
    SentHello,
    /// AP response read and parsed.
    ReceivedApResponse,
    /// Server DH value checked against the pinned key.
    VerifiedSignature,
    /// Challenge MAC sent, waiting for the connection status.
    SentChallengeResponse,
    /// Keys handed to the encrypted transport. Terminal.
    EstablishedCipher,
    /// Handshake aborted. Terminal.
    Failed,
}

impl HandshakeState {
    /// Human-readable label for the current state (used in error messages).
    pub fn label(&self) -> &'static str {
        match self {
            HandshakeState::Idle => "Idle",
            HandshakeState::SentHello => "SentHello",
            HandshakeState::ReceivedApResponse => "ReceivedApResponse",
            HandshakeState::VerifiedSignature => "VerifiedSignature",
            HandshakeState::SentChallengeResponse => "SentChallengeResponse",
            HandshakeState::EstablishedCipher => "EstablishedCipher",
            HandshakeState::Failed => "Failed",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::EstablishedCipher | HandshakeState::Failed)
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
