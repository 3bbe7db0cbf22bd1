//! Signaling channel to the rendezvous relay
//!
//! The orchestrator only sees the [`SignalingChannel`] trait and the
//! [`SignalingEvent`]s the channel pushes on the sender it was built with.

pub mod client;
pub mod protocol;
pub mod relay;

pub use client::WebSocketSignalingChannel;
pub use protocol::SignalingMessage;
pub use relay::{RelayHandle, RelayServer};

use crate::media::{IceCandidate, SessionDescription};
use crate::Result;
use async_trait::async_trait;

/// Events pushed by a signaling channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    /// The socket is open and the room join has been sent
    Connected,
    /// The socket closed or could not be opened
    Disconnected,
    /// The relay reports both participants in the room
    PeerReady,
    /// Remote offer or answer
    DescriptionReceived(SessionDescription),
    /// Remote candidate
    CandidateReceived(IceCandidate),
}

/// Operations the orchestrator needs from a signaling transport
#[async_trait]
pub trait SignalingChannel: Send {
    /// Open the connection; no-op while already connecting or connected
    async fn connect(&mut self) -> Result<()>;

    /// Send a local offer or answer to the other participant
    async fn send_description(&mut self, description: &SessionDescription) -> Result<()>;

    /// Send a local candidate to the other participant
    async fn send_candidate(&mut self, candidate: &IceCandidate) -> Result<()>;
}
