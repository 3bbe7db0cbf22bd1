//! Error types for call negotiation

/// Result type alias using the call Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while negotiating or running a call
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling connect/send failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The media engine rejected a session description
    #[error("Negotiation error: {0}")]
    Negotiation(String),

    /// Operation issued in a negotiation state that does not allow it
    #[error("Invalid negotiation state: {0}")]
    InvalidNegotiationState(String),

    /// Signaling payload missing required fields or otherwise unparseable
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// No local audio source is attached to the session
    #[error("No local media source configured")]
    MissingLocalMedia,

    /// ICE candidate could not be applied or encoded
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Underlying peer connection could not be created or closed
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The orchestrator task is no longer running
    #[error("Call orchestrator stopped")]
    OrchestratorStopped,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error means the engine refused a description
    pub fn is_negotiation_error(&self) -> bool {
        matches!(self, Error::Negotiation(_) | Error::MissingLocalMedia)
    }

    /// Check if this error is a protocol/programmer misuse that callers treat as a no-op
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, Error::InvalidNegotiationState(_))
    }

    /// Check if this error came from the signaling transport
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Io(_))
    }
}
