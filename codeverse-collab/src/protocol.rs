//! Binary protocol for room synchronization.
//!
//! Wire format (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ msg_type │ peer_id   │ doc_id   │ clock    │ payload  │
//! │ 1 byte   │ 16 bytes  │ 16 bytes │ 8 bytes  │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! A connection opens with a `PeerJoined` frame carrying a [`JoinRequest`].
//! Frames the server originates use the nil peer id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::presence::{peer_color, AwarenessMessage};
use crate::watch::{PlaybackCommand, PlaybackState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    /// Yrs state vector, asks for the missing diff
    SyncStep1 = 1,
    /// Yrs update answering a state vector (or the full state on join)
    SyncStep2 = 2,
    /// Incremental yrs update
    Delta = 3,
    /// Cursor/selection presence
    Awareness = 4,
    /// Join request from a client, join notice from the server
    PeerJoined = 5,
    PeerLeft = 6,
    Ping = 7,
    Pong = 8,
    /// Playback command from a client, playback state from the server
    Playback = 9,
    /// Join refused; payload is the UTF-8 reason
    Rejected = 10,
}

/// Peer identity shown to the rest of the room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub peer_id: Uuid,
    /// Account behind the peer, filled in by the server after admission
    pub user_id: Option<Uuid>,
    pub name: String,
    /// `#rrggbb`
    pub color: String,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            user_id: None,
            name: name.into(),
            color: peer_color(peer_id),
        }
    }
}

/// First frame of every connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequest {
    pub info: PeerInfo,
    /// Session token handed to the server's join authorizer
    pub token: String,
}

/// Top-level protocol message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub msg_type: MessageType,
    pub peer_id: Uuid,
    pub doc_id: Uuid,
    /// Lamport clock for causal ordering
    pub clock: u64,
    pub payload: Vec<u8>,
}

fn encode_payload<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| ProtocolError::Serialization(e.to_string()))
}

fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    Ok(value)
}

impl SyncMessage {
    fn new(msg_type: MessageType, peer_id: Uuid, doc_id: Uuid, clock: u64, payload: Vec<u8>) -> Self {
        Self { msg_type, peer_id, doc_id, clock, payload }
    }

    pub fn delta(peer_id: Uuid, doc_id: Uuid, clock: u64, yrs_update: Vec<u8>) -> Self {
        Self::new(MessageType::Delta, peer_id, doc_id, clock, yrs_update)
    }

    pub fn sync_step1(peer_id: Uuid, doc_id: Uuid, state_vector: Vec<u8>) -> Self {
        Self::new(MessageType::SyncStep1, peer_id, doc_id, 0, state_vector)
    }

    pub fn sync_step2(peer_id: Uuid, doc_id: Uuid, update: Vec<u8>) -> Self {
        Self::new(MessageType::SyncStep2, peer_id, doc_id, 0, update)
    }

    pub fn awareness(
        peer_id: Uuid,
        doc_id: Uuid,
        clock: u64,
        msg: &AwarenessMessage,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(MessageType::Awareness, peer_id, doc_id, clock, msg.encode()?))
    }

    /// Client join frame.
    pub fn join(doc_id: Uuid, request: &JoinRequest) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            MessageType::PeerJoined,
            request.info.peer_id,
            doc_id,
            0,
            encode_payload(request)?,
        ))
    }

    /// Server notice that `info` entered the room.
    pub fn peer_joined(doc_id: Uuid, info: &PeerInfo) -> Result<Self, ProtocolError> {
        Ok(Self::new(MessageType::PeerJoined, info.peer_id, doc_id, 0, encode_payload(info)?))
    }

    pub fn peer_left(peer_id: Uuid, doc_id: Uuid) -> Self {
        Self::new(MessageType::PeerLeft, peer_id, doc_id, 0, Vec::new())
    }

    pub fn ping(peer_id: Uuid) -> Self {
        Self::new(MessageType::Ping, peer_id, Uuid::nil(), 0, Vec::new())
    }

    pub fn pong(peer_id: Uuid) -> Self {
        Self::new(MessageType::Pong, peer_id, Uuid::nil(), 0, Vec::new())
    }

    pub fn playback_command(
        peer_id: Uuid,
        doc_id: Uuid,
        clock: u64,
        command: &PlaybackCommand,
    ) -> Result<Self, ProtocolError> {
        Ok(Self::new(MessageType::Playback, peer_id, doc_id, clock, encode_payload(command)?))
    }

    pub fn playback_state(doc_id: Uuid, state: &PlaybackState) -> Result<Self, ProtocolError> {
        Ok(Self::new(
            MessageType::Playback,
            Uuid::nil(),
            doc_id,
            state.clock,
            encode_payload(state)?,
        ))
    }

    pub fn rejected(doc_id: Uuid, reason: &str) -> Self {
        Self::new(MessageType::Rejected, Uuid::nil(), doc_id, 0, reason.as_bytes().to_vec())
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        decode_payload(bytes)
    }

    fn expect_type(&self, expected: MessageType) -> Result<(), ProtocolError> {
        if self.msg_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::InvalidMessageType { expected, actual: self.msg_type })
        }
    }

    pub fn join_request(&self) -> Result<JoinRequest, ProtocolError> {
        self.expect_type(MessageType::PeerJoined)?;
        decode_payload(&self.payload)
    }

    pub fn peer_info(&self) -> Result<PeerInfo, ProtocolError> {
        self.expect_type(MessageType::PeerJoined)?;
        decode_payload(&self.payload)
    }

    pub fn awareness_message(&self) -> Result<AwarenessMessage, ProtocolError> {
        self.expect_type(MessageType::Awareness)?;
        AwarenessMessage::decode(&self.payload)
    }

    pub fn playback_command_payload(&self) -> Result<PlaybackCommand, ProtocolError> {
        self.expect_type(MessageType::Playback)?;
        decode_payload(&self.payload)
    }

    pub fn playback_state_payload(&self) -> Result<PlaybackState, ProtocolError> {
        self.expect_type(MessageType::Playback)?;
        decode_payload(&self.payload)
    }

    pub fn rejection_reason(&self) -> Result<String, ProtocolError> {
        self.expect_type(MessageType::Rejected)?;
        Ok(String::from_utf8_lossy(&self.payload).into_owned())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Expected {expected:?} message, got {actual:?}")]
    InvalidMessageType { expected: MessageType, actual: MessageType },

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Join rejected: {0}")]
    Rejected(String),
}
