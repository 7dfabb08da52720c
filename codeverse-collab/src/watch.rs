//! Watch together: one shared playback state per room.
//!
//! Only the state travels. Media is streamed by each browser from its
//! external host.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackCommand {
    /// Switch the room to a new video, paused at the start
    Load { url: String },
    Play { position_secs: f64 },
    Pause { position_secs: f64 },
    /// Jump without changing play/pause
    Seek { position_secs: f64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub media_url: Option<String>,
    /// Position at `updated_at_ms`
    pub position_secs: f64,
    pub playing: bool,
    pub updated_by: Option<Uuid>,
    /// Bumped on every accepted command
    pub clock: u64,
    /// Server time of the last accepted command, unix millis
    pub updated_at_ms: u64,
}

impl PlaybackState {
    pub fn is_loaded(&self) -> bool {
        self.media_url.is_some()
    }

    /// Apply a command. Returns false when it was ignored.
    ///
    /// Transport commands need a loaded video and a finite position.
    pub fn apply(&mut self, command: &PlaybackCommand, by: Option<Uuid>, now_ms: u64) -> bool {
        match command {
            PlaybackCommand::Load { url } => {
                let url = url.trim();
                if url.is_empty() {
                    return false;
                }
                self.media_url = Some(url.to_string());
                self.position_secs = 0.0;
                self.playing = false;
            }
            PlaybackCommand::Play { position_secs }
            | PlaybackCommand::Pause { position_secs }
            | PlaybackCommand::Seek { position_secs } => {
                if !self.is_loaded() || !position_secs.is_finite() {
                    return false;
                }
                self.position_secs = position_secs.max(0.0);
                match command {
                    PlaybackCommand::Play { .. } => self.playing = true,
                    PlaybackCommand::Pause { .. } => self.playing = false,
                    _ => {}
                }
            }
        }
        self.updated_by = by;
        self.updated_at_ms = now_ms;
        self.clock += 1;
        true
    }

    /// Where playback should be at `now_ms`.
    pub fn position_at(&self, now_ms: u64) -> f64 {
        if !self.playing {
            return self.position_secs;
        }
        let elapsed = now_ms.saturating_sub(self.updated_at_ms) as f64 / 1000.0;
        self.position_secs + elapsed
    }
}
