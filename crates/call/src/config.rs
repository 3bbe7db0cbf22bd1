//! Configuration types for a voice call

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for a call endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// Rendezvous room shared by both participants
    pub room: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Local audio track settings
    pub audio: AudioTrackConfig,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn: or turns:)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Local audio track settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTrackConfig {
    /// Track identifier announced in the SDP (default: "audio0")
    pub track_id: String,

    /// Media stream identifier announced in the SDP (default: "stream0")
    pub stream_id: String,

    /// Opus clock rate in Hz (default: 48000)
    pub clock_rate: u32,

    /// Channel count (default: 2, as Opus is always negotiated as stereo)
    pub channels: u16,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            room: "room1".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            audio: AudioTrackConfig::default(),
        }
    }
}

impl Default for AudioTrackConfig {
    fn default() -> Self {
        Self {
            track_id: "audio0".to_string(),
            stream_id: "stream0".to_string(),
            clock_rate: 48000,
            channels: 2,
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a WebSocket URL
    /// - `room` is empty
    /// - `stun_servers` is empty or contains a non-STUN URL
    /// - a TURN entry is not a turn:/turns: URL
    /// - the audio track ids are empty or the clock rate is zero
    pub fn validate(&self) -> Result<()> {
        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room.trim().is_empty() {
            return Err(Error::InvalidConfig("room must not be empty".to_string()));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if let Some(bad) = self
            .stun_servers
            .iter()
            .find(|url| !url.starts_with("stun:") && !url.starts_with("stuns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "STUN server must start with stun: or stuns:, got {}",
                bad
            )));
        }

        if let Some(bad) = self
            .turn_servers
            .iter()
            .find(|turn| !turn.url.starts_with("turn:") && !turn.url.starts_with("turns:"))
        {
            return Err(Error::InvalidConfig(format!(
                "TURN server must start with turn: or turns:, got {}",
                bad.url
            )));
        }

        if self.audio.track_id.is_empty() || self.audio.stream_id.is_empty() {
            return Err(Error::InvalidConfig(
                "audio track_id and stream_id must not be empty".to_string(),
            ));
        }

        if self.audio.clock_rate == 0 || self.audio.channels == 0 {
            return Err(Error::InvalidConfig(format!(
                "audio clock_rate and channels must be non-zero, got {}Hz/{}ch",
                self.audio.clock_rate, self.audio.channels
            )));
        }

        Ok(())
    }

    /// Parse a configuration from YAML
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Example
    ///
    /// ```
    /// use chitchat_call::CallConfig;
    ///
    /// let config = CallConfig::from_yaml_str("room: lobby\n").unwrap();
    /// assert_eq!(config.room, "lobby");
    /// assert_eq!(config.audio.track_id, "audio0");
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let yaml = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&yaml)
    }

    /// Set the signaling URL
    ///
    /// Useful for chaining with `Default::default()`.
    pub fn with_signaling_url(mut self, url: &str) -> Self {
        self.signaling_url = url.to_string();
        self
    }

    /// Set the rendezvous room
    pub fn with_room(mut self, room: &str) -> Self {
        self.room = room.to_string();
        self
    }

    /// Replace the STUN servers
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Add TURN servers to this configuration
    ///
    /// # Example
    ///
    /// ```
    /// use chitchat_call::config::{CallConfig, TurnServerConfig};
    ///
    /// let config = CallConfig::default().with_turn_servers(vec![TurnServerConfig {
    ///     url: "turn:turn.example.com:3478".to_string(),
    ///     username: "user".to_string(),
    ///     credential: "pass".to_string(),
    /// }]);
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }
}
