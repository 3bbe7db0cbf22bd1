//! Audio device session configuration
//!
//! Device routing is platform specific, so the crate only defines the
//! profile a voice call asks for and the [`AudioSessionConfigurator`] seam.
//! A failure to configure the device never stops a call.

use crate::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Device category requested for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    /// Capture and playback at the same time
    PlayAndRecord,
    /// Playback only
    Playback,
}

/// Processing mode requested for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Echo cancellation and gain control tuned for conversation
    VoiceChat,
    Default,
}

/// Audio session settings requested for a call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSessionProfile {
    pub category: AudioCategory,
    pub mode: AudioMode,

    /// Route output to the loudspeaker instead of the earpiece
    pub default_to_speaker: bool,

    /// Allow Bluetooth headsets for input and output
    pub allow_bluetooth: bool,
}

impl AudioSessionProfile {
    /// Profile used for calls
    pub fn voice_chat() -> Self {
        Self {
            category: AudioCategory::PlayAndRecord,
            mode: AudioMode::VoiceChat,
            default_to_speaker: true,
            allow_bluetooth: true,
        }
    }
}

impl Default for AudioSessionProfile {
    fn default() -> Self {
        Self::voice_chat()
    }
}

/// Applies an [`AudioSessionProfile`] to the audio device
pub trait AudioSessionConfigurator: Send + Sync {
    fn configure(&self, profile: &AudioSessionProfile) -> Result<()>;
}

/// Configurator that records the requested profile in the log
///
/// Used where the host platform manages device routing itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAudioSession;

impl AudioSessionConfigurator for LoggingAudioSession {
    fn configure(&self, profile: &AudioSessionProfile) -> Result<()> {
        info!(
            category = ?profile.category,
            mode = ?profile.mode,
            speaker = profile.default_to_speaker,
            bluetooth = profile.allow_bluetooth,
            "Audio session configured"
        );
        Ok(())
    }
}

/// Configure the audio session once at start
///
/// Returns whether configuration succeeded. Failures are logged only.
pub fn configure_audio_session(configurator: &dyn AudioSessionConfigurator) -> bool {
    match configurator.configure(&AudioSessionProfile::voice_chat()) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to configure audio session, continuing: {}", e);
            false
        }
    }
}
