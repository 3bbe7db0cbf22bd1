//! Call lifecycle states and their user-facing status

use serde::Serialize;
use std::fmt;

/// Which negotiation path entered [`CallState::Negotiating`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallRole {
    /// Sent the offer and applied the remote answer
    Caller,
    /// Accepted the remote offer and sent the answer
    Answerer,
}

/// Lifecycle of one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallState {
    #[default]
    Idle,
    ConnectingToServer,
    ServerConnected,
    /// Local offer sent, waiting for the answer
    Calling,
    /// Remote offer stored, waiting for the user to answer
    IncomingCall,
    /// Descriptions exchanged, waiting for media connectivity
    Negotiating { role: CallRole },
    Connected,
    /// Media connectivity lost, may recover
    Disconnected,
    Failed,
    /// Signaling connection lost
    Ended,
}

impl CallState {
    /// Human-readable status label
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Idle => "Disconnected",
            CallState::ConnectingToServer => "Connecting...",
            CallState::ServerConnected => "Server Connected",
            CallState::Calling => "Calling...",
            CallState::IncomingCall => "Incoming Call...",
            CallState::Negotiating {
                role: CallRole::Answerer,
            } => "Connecting Audio...",
            // The caller keeps showing "Calling..." until media connects
            CallState::Negotiating {
                role: CallRole::Caller,
            } => "Calling...",
            CallState::Connected => "Audio Connected!",
            CallState::Disconnected => "Audio Disconnected",
            CallState::Failed => "Connection Failed",
            CallState::Ended => "Server Disconnected",
        }
    }

    /// A call is being set up or is in progress
    pub fn is_in_call(&self) -> bool {
        matches!(
            self,
            CallState::Calling
                | CallState::IncomingCall
                | CallState::Negotiating { .. }
                | CallState::Connected
                | CallState::Disconnected
        )
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status published to the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallStatus {
    /// Human-readable label
    pub label: &'static str,

    /// An unanswered remote offer is pending
    pub incoming_call: bool,
}

impl CallStatus {
    pub fn new(state: CallState, incoming_call: bool) -> Self {
        Self {
            label: state.label(),
            incoming_call,
        }
    }
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::new(CallState::Idle, false)
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.incoming_call {
            write!(f, "{} (incoming)", self.label)
        } else {
            f.write_str(self.label)
        }
    }
}
