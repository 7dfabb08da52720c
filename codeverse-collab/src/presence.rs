//! Text cursor and selection presence.
//!
//! Awareness frames are relayed by the server untouched; every client keeps
//! its own [`PresenceRoom`] view of the other peers. Positions are character
//! offsets into the shared `content` text.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::protocol::ProtocolError;

/// Minimum gap between two cursor broadcasts from one peer.
pub const CURSOR_INTERVAL: Duration = Duration::from_millis(50);

/// Peers silent for this long are dropped from the view.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Stable `#rrggbb` colour for a peer or user id.
pub fn peer_color(id: Uuid) -> String {
    let hue = (id.as_u128() % 360) as f32 / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
    let byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    format!("#{:02x}{:02x}{:02x}", byte(r), byte(g), byte(b))
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 1.0 / 2.0 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// A selected span. `anchor` stays put while `head` follows the caret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub anchor: u32,
    pub head: u32,
}

impl TextRange {
    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    pub fn start(&self) -> u32 {
        self.anchor.min(self.head)
    }

    pub fn end(&self) -> u32 {
        self.anchor.max(self.head)
    }
}

/// Payload of `Awareness` frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwarenessMessage {
    Join { peer_id: Uuid, name: String, color: String },
    Leave { peer_id: Uuid },
    Cursor { peer_id: Uuid, index: u32, timestamp: u64 },
    Selection { peer_id: Uuid, ranges: Vec<TextRange> },
}

impl AwarenessMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }

    pub fn peer_id(&self) -> Uuid {
        match self {
            AwarenessMessage::Join { peer_id, .. }
            | AwarenessMessage::Leave { peer_id }
            | AwarenessMessage::Cursor { peer_id, .. }
            | AwarenessMessage::Selection { peer_id, .. } => *peer_id,
        }
    }
}

/// What we know about another peer in the room.
#[derive(Debug, Clone)]
pub struct RemotePeer {
    pub peer_id: Uuid,
    pub name: String,
    pub color: String,
    pub cursor: Option<u32>,
    pub selection: Vec<TextRange>,
    last_timestamp: u64,
    last_seen: Instant,
}

impl RemotePeer {
    fn new(peer_id: Uuid, name: String, color: String) -> Self {
        Self {
            peer_id,
            name,
            color,
            cursor: None,
            selection: Vec::new(),
            last_timestamp: 0,
            last_seen: Instant::now(),
        }
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() >= timeout
    }
}

/// Local view of everyone else's cursors in one room.
pub struct PresenceRoom {
    local_peer_id: Uuid,
    peers: HashMap<Uuid, RemotePeer>,
    last_cursor_broadcast: Option<Instant>,
    cursor_interval: Duration,
    timestamp_counter: u64,
    idle_timeout: Duration,
}

impl PresenceRoom {
    pub fn new(local_peer_id: Uuid) -> Self {
        Self {
            local_peer_id,
            peers: HashMap::new(),
            last_cursor_broadcast: None,
            cursor_interval: CURSOR_INTERVAL,
            timestamp_counter: 0,
            idle_timeout: IDLE_TIMEOUT,
        }
    }

    pub fn with_timing(local_peer_id: Uuid, cursor_interval: Duration, idle_timeout: Duration) -> Self {
        Self {
            cursor_interval,
            idle_timeout,
            ..Self::new(local_peer_id)
        }
    }

    pub fn handle_message(&mut self, msg: &AwarenessMessage) {
        let peer_id = msg.peer_id();
        if peer_id == self.local_peer_id {
            return;
        }

        match msg {
            AwarenessMessage::Join { name, color, .. } => {
                self.peers
                    .insert(peer_id, RemotePeer::new(peer_id, name.clone(), color.clone()));
            }
            AwarenessMessage::Leave { .. } => {
                self.peers.remove(&peer_id);
            }
            AwarenessMessage::Cursor { index, timestamp, .. } => {
                let peer = self.peer_entry(peer_id);
                peer.last_seen = Instant::now();
                // Frames can overtake each other through the broadcast fan-out
                if *timestamp > peer.last_timestamp {
                    peer.last_timestamp = *timestamp;
                    peer.cursor = Some(*index);
                }
            }
            AwarenessMessage::Selection { ranges, .. } => {
                let peer = self.peer_entry(peer_id);
                peer.last_seen = Instant::now();
                peer.selection = ranges.clone();
            }
        }
    }

    /// Cursor seen from a peer that joined before us.
    fn peer_entry(&mut self, peer_id: Uuid) -> &mut RemotePeer {
        self.peers.entry(peer_id).or_insert_with(|| {
            let short = peer_id.simple().to_string();
            RemotePeer::new(peer_id, format!("Peer-{}", &short[..8]), peer_color(peer_id))
        })
    }

    /// Returns a frame to send, or `None` while throttled.
    pub fn update_local_cursor(&mut self, index: u32) -> Option<AwarenessMessage> {
        if let Some(last) = self.last_cursor_broadcast {
            if last.elapsed() < self.cursor_interval {
                return None;
            }
        }
        self.last_cursor_broadcast = Some(Instant::now());
        self.timestamp_counter += 1;
        Some(AwarenessMessage::Cursor {
            peer_id: self.local_peer_id,
            index,
            timestamp: self.timestamp_counter,
        })
    }

    pub fn update_local_selection(&mut self, ranges: Vec<TextRange>) -> AwarenessMessage {
        AwarenessMessage::Selection { peer_id: self.local_peer_id, ranges }
    }

    pub fn join_message(&self, name: impl Into<String>) -> AwarenessMessage {
        AwarenessMessage::Join {
            peer_id: self.local_peer_id,
            name: name.into(),
            color: peer_color(self.local_peer_id),
        }
    }

    pub fn leave_message(&self) -> AwarenessMessage {
        AwarenessMessage::Leave { peer_id: self.local_peer_id }
    }

    pub fn peer(&self, peer_id: &Uuid) -> Option<&RemotePeer> {
        self.peers.get(peer_id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &RemotePeer> {
        self.peers.values()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Drop peers that went quiet. Returns who was removed.
    pub fn expire_stale(&mut self) -> Vec<Uuid> {
        let timeout = self.idle_timeout;
        let stale: Vec<Uuid> = self
            .peers
            .values()
            .filter(|p| p.is_idle(timeout))
            .map(|p| p.peer_id)
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_color_format() {
        let color = peer_color(Uuid::new_v4());
        assert_eq!(color.len(), 7);
        assert!(color.starts_with('#'));
        assert!(color[1..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_join_cursor_leave() {
        let mut room = PresenceRoom::new(Uuid::new_v4());
        let bob = Uuid::new_v4();

        room.handle_message(&AwarenessMessage::Join { peer_id: bob, name: "bob".into(), color: "#123456".into() });
        room.handle_message(&AwarenessMessage::Cursor { peer_id: bob, index: 17, timestamp: 1 });
        let peer = room.peer(&bob).unwrap();
        assert_eq!(peer.name, "bob");
        assert_eq!(peer.cursor, Some(17));

        room.handle_message(&AwarenessMessage::Leave { peer_id: bob });
        assert_eq!(room.peer_count(), 0);
    }

    #[test]
    fn test_out_of_order_cursor_ignored() {
        let mut room = PresenceRoom::new(Uuid::new_v4());
        let bob = Uuid::new_v4();
        room.handle_message(&AwarenessMessage::Cursor { peer_id: bob, index: 9, timestamp: 5 });
        room.handle_message(&AwarenessMessage::Cursor { peer_id: bob, index: 2, timestamp: 4 });
        assert_eq!(room.peer(&bob).unwrap().cursor, Some(9));
        assert!(room.peer(&bob).unwrap().name.starts_with("Peer-"));
    }

    #[test]
    fn test_own_messages_ignored() {
        let me = Uuid::new_v4();
        let mut room = PresenceRoom::new(me);
        room.handle_message(&room.join_message("me"));
        assert_eq!(room.peer_count(), 0);
    }

    #[test]
    fn test_cursor_throttled() {
        let mut room = PresenceRoom::with_timing(Uuid::new_v4(), Duration::from_secs(60), IDLE_TIMEOUT);
        assert!(room.update_local_cursor(1).is_some());
        assert!(room.update_local_cursor(2).is_none());

        let mut room = PresenceRoom::with_timing(Uuid::new_v4(), Duration::ZERO, IDLE_TIMEOUT);
        let first = room.update_local_cursor(1).unwrap();
        let second = room.update_local_cursor(2).unwrap();
        match (first, second) {
            (
                AwarenessMessage::Cursor { timestamp: a, .. },
                AwarenessMessage::Cursor { timestamp: b, .. },
            ) => assert!(b > a),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_selection_and_expiry() {
        let mut room = PresenceRoom::with_timing(Uuid::new_v4(), CURSOR_INTERVAL, Duration::ZERO);
        let bob = Uuid::new_v4();
        let range = TextRange { anchor: 10, head: 4 };
        room.handle_message(&AwarenessMessage::Selection { peer_id: bob, ranges: vec![range] });
        assert_eq!(room.peer(&bob).unwrap().selection, vec![range]);
        assert_eq!((range.start(), range.end()), (4, 10));

        assert_eq!(room.expire_stale(), vec![bob]);
        assert_eq!(room.peer_count(), 0);
    }

    #[test]
    fn test_awareness_codec() {
        let msg = AwarenessMessage::Selection {
            peer_id: Uuid::new_v4(),
            ranges: vec![TextRange { anchor: 0, head: 3 }],
        };
        assert_eq!(AwarenessMessage::decode(&msg.encode().unwrap()).unwrap(), msg);
        assert!(AwarenessMessage::decode(&[0xFF]).is_err());
    }
}
