//! # codeverse-collab
//!
//! Real-time collaborative editing for CodeVerse rooms.
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     Binary Proto    │ (central)   │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────┐
//! │ Yrs Doc     │                     │ Yrs Doc     │
//! │ (local)     │                     │ (authority) │
//! └─────────────┘                     └──────┬──────┘
//!                                            │
//!                              ┌─────────────┼──────────────┐
//!                              ▼             ▼              ▼
//!                       BroadcastGroup  PlaybackState  DocumentStore
//! ```
//!
//! - [`protocol`]: bincode-encoded `SyncMessage` frames
//! - [`broadcast`]: per-room fan-out with bounded buffers
//! - [`server`]: WebSocket sync server with join authorization
//! - [`client`]: WebSocket client with offline queue
//! - [`presence`]: text cursors and selections
//! - [`watch`]: shared video playback state
//! - [`storage`]: RocksDB persistence of snapshots and deltas

pub mod broadcast;
pub mod client;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod watch;

pub use broadcast::{BroadcastGroup, BroadcastStats};
pub use client::{ConnectionState, OfflineQueue, SyncClient, SyncEvent};
pub use presence::{peer_color, AwarenessMessage, PresenceRoom, RemotePeer, TextRange};
pub use protocol::{JoinRequest, MessageType, PeerInfo, ProtocolError, SyncMessage};
pub use server::{
    Admission, AllowAll, DocumentObserver, JoinAuthorizer, ServerConfig, ServerStats, SyncServer,
    TEXT_NAME,
};
pub use storage::{DocStoreError, DocumentMetadata, DocumentStore, StoreConfig};
pub use watch::{PlaybackCommand, PlaybackState};
