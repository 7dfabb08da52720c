//! WebSocket sync server, one room per document.
//!
//! ```text
//! Client A ──┐
//!            ├── Room (doc_id) ── yrs Doc ── BroadcastGroup
//! Client B ──┘        │
//!                     ├── PlaybackState
//!                     └── DocumentStore (deltas, snapshot on close)
//! ```
//!
//! A connection must open with a join frame. The [`JoinAuthorizer`] decides
//! who gets in; the joiner then receives the full document state, the
//! playback state and the current peer list. The room is snapshotted and
//! dropped when its last peer leaves, and the [`DocumentObserver`] sees the
//! final text.

use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::{self, Message};
use uuid::Uuid;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, StateVector, Transact, Update};

use crate::broadcast::BroadcastGroup;
use crate::presence::{peer_color, AwarenessMessage};
use crate::protocol::{JoinRequest, MessageType, PeerInfo, SyncMessage};
use crate::storage::{DocStoreError, DocumentStore, StoreConfig};
use crate::watch::PlaybackState;

/// Name of the shared text in every room document.
pub const TEXT_NAME: &str = "content";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_peers_per_room: usize,
    /// Frames buffered per peer before it starts lagging
    pub broadcast_capacity: usize,
    /// Ping interval; peers silent for two intervals are dropped
    pub heartbeat_interval_secs: u64,
    /// How long a fresh connection may take to send its join frame
    pub join_timeout_secs: u64,
    /// Document store directory (None = in-memory only)
    pub storage_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            max_peers_per_room: 50,
            broadcast_capacity: 256,
            heartbeat_interval_secs: 30,
            join_timeout_secs: 10,
            storage_path: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub rejected_joins: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub persisted_deltas: u64,
    pub persisted_snapshots: u64,
}

/// Identity granted to an admitted peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub user_id: Option<Uuid>,
    /// Display name shown to the room
    pub name: String,
}

/// Decides whether a join request may enter a room.
pub trait JoinAuthorizer: Send + Sync {
    /// `Err` carries the reason sent back in the `Rejected` frame.
    fn authorize(&self, doc_id: Uuid, request: &JoinRequest) -> Result<Admission, String>;
}

/// Admits everyone under the name they asked for.
pub struct AllowAll;

impl JoinAuthorizer for AllowAll {
    fn authorize(&self, _doc_id: Uuid, request: &JoinRequest) -> Result<Admission, String> {
        Ok(Admission {
            user_id: None,
            name: request.info.name.clone(),
        })
    }
}

/// Notified with the final text when a room closes.
pub trait DocumentObserver: Send + Sync {
    fn room_closed(&self, doc_id: Uuid, text: &str);
}

struct DocumentRoom {
    doc: Doc,
    broadcast: Arc<BroadcastGroup>,
    playback: PlaybackState,
}

impl DocumentRoom {
    fn new(broadcast_capacity: usize) -> Self {
        let doc = Doc::new();
        doc.get_or_insert_text(TEXT_NAME);
        Self {
            doc,
            broadcast: Arc::new(BroadcastGroup::new(broadcast_capacity)),
            playback: PlaybackState::default(),
        }
    }

    fn from_updates(broadcast_capacity: usize, doc_id: Uuid, updates: &[Vec<u8>]) -> Self {
        let room = Self::new(broadcast_capacity);
        for update in updates {
            if let Err(e) = room.apply_update(update) {
                log::warn!("Skipping unreadable stored update for doc {doc_id}: {e}");
            }
        }
        room
    }

    fn apply_update(&self, bytes: &[u8]) -> Result<(), String> {
        let update = Update::decode_v1(bytes).map_err(|e| e.to_string())?;
        let mut txn = self.doc.transact_mut();
        txn.apply_update(update).map_err(|e| e.to_string())
    }

    fn full_state(&self) -> Vec<u8> {
        self.doc.transact().encode_state_as_update_v1(&StateVector::default())
    }

    fn diff(&self, state_vector: &[u8]) -> Option<Vec<u8>> {
        let remote = StateVector::decode_v1(state_vector).ok()?;
        Some(self.doc.transact().encode_diff_v1(&remote))
    }

    fn text(&self) -> String {
        let text = self.doc.get_or_insert_text(TEXT_NAME);
        let txn = self.doc.transact();
        text.get_string(&txn)
    }
}

/// What a newly admitted peer is handed.
struct Seat {
    rx: tokio::sync::broadcast::Receiver<Arc<Vec<u8>>>,
    state: Vec<u8>,
    playback: PlaybackState,
    /// Peers already in the room
    others: Vec<PeerInfo>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

async fn send_frame<S>(sink: &mut S, msg: &SyncMessage) -> Result<(), BoxError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::Binary(msg.encode()?.into())).await?;
    Ok(())
}

/// The sync server. Cheap to clone; clones share rooms and storage.
#[derive(Clone)]
pub struct SyncServer {
    config: ServerConfig,
    rooms: Arc<RwLock<HashMap<Uuid, DocumentRoom>>>,
    stats: Arc<RwLock<ServerStats>>,
    store: Option<Arc<DocumentStore>>,
    authorizer: Arc<dyn JoinAuthorizer>,
    observer: Option<Arc<dyn DocumentObserver>>,
}

impl SyncServer {
    pub fn new(config: ServerConfig) -> Result<Self, DocStoreError> {
        let store = match &config.storage_path {
            Some(path) => Some(Arc::new(DocumentStore::open(StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            })?)),
            None => None,
        };
        Ok(Self::with_store(config, store))
    }

    /// Use an already opened store instead of `config.storage_path`.
    pub fn with_store(config: ServerConfig, store: Option<Arc<DocumentStore>>) -> Self {
        Self {
            config,
            rooms: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(ServerStats::default())),
            store,
            authorizer: Arc::new(AllowAll),
            observer: None,
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn JoinAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DocumentObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Fold deltas left over from an unclean shutdown into snapshots.
    ///
    /// Returns the number of documents rewritten.
    pub fn recover(&self) -> Result<usize, DocStoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let doc_ids = store.list_documents()?;
        let mut recovered = 0;
        for doc_id in &doc_ids {
            let pending = store.load_metadata(*doc_id)?.map_or(0, |m| m.delta_count);
            if pending == 0 {
                continue;
            }
            let Some(updates) = store.load_updates(*doc_id)? else {
                continue;
            };
            let room = DocumentRoom::from_updates(1, *doc_id, &updates);
            store.save_snapshot(*doc_id, &room.full_state())?;
            recovered += 1;
            log::info!("Recovered doc {doc_id}: folded {pending} deltas into its snapshot");
        }

        log::info!("Recovery complete: {recovered}/{} documents rewritten", doc_ids.len());
        Ok(recovered)
    }

    /// Bind `config.bind_addr` and serve forever.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        self.recover()?;
        log::info!("Sync server listening on {}", listener.local_addr()?);

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::warn!("Accept failed: {e}");
                    continue;
                }
            };
            log::debug!("New TCP connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, addr).await {
                    log::warn!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(self, stream: TcpStream, addr: SocketAddr) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        {
            let mut s = self.stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result = self.serve_peer(ws_stream, addr).await;

        let mut s = self.stats.write().await;
        s.active_connections = s.active_connections.saturating_sub(1);
        result
    }

    async fn serve_peer(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        addr: SocketAddr,
    ) -> Result<(), BoxError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        // ─── Join handshake ───────────────────────────────────────────
        let join_timeout = Duration::from_secs(self.config.join_timeout_secs);
        let first = match tokio::time::timeout(join_timeout, ws_receiver.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => SyncMessage::decode(&data).ok(),
            Ok(Some(Ok(_))) => None,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Ok(()),
            Err(_) => {
                log::info!("No join frame from {addr} within {join_timeout:?}");
                None
            }
        };

        let Some((doc_id, request)) = first.and_then(|msg| {
            let doc_id = msg.doc_id;
            msg.join_request().ok().map(|req| (doc_id, req))
        }) else {
            return self.reject(&mut ws_sender, Uuid::nil(), "expected a join request").await;
        };

        let admission = match self.authorizer.authorize(doc_id, &request) {
            Ok(admission) => admission,
            Err(reason) => {
                log::info!("Join to doc {doc_id} from {addr} rejected: {reason}");
                return self.reject(&mut ws_sender, doc_id, &reason).await;
            }
        };

        let mut info = request.info;
        info.user_id = admission.user_id;
        info.name = admission.name;
        info.color = peer_color(admission.user_id.unwrap_or(info.peer_id));

        let Some(Seat { rx: mut broadcast_rx, state, playback, others }) =
            self.join_room(doc_id, &mut info).await?
        else {
            return self.reject(&mut ws_sender, doc_id, "room is full").await;
        };
        let peer_id = info.peer_id;

        // The join answer carries the peer id this connection was seated under
        send_frame(&mut ws_sender, &SyncMessage::sync_step2(peer_id, doc_id, state)).await?;
        if playback.is_loaded() {
            send_frame(&mut ws_sender, &SyncMessage::playback_state(doc_id, &playback)?).await?;
        }
        for other in others.iter().filter(|p| p.peer_id != peer_id) {
            send_frame(&mut ws_sender, &SyncMessage::peer_joined(doc_id, other)?).await?;
        }
        log::info!("Peer {} ({peer_id}) joined doc {doc_id}", info.name);

        // ─── Session loop ─────────────────────────────────────────────
        let heartbeat = Duration::from_secs(self.config.heartbeat_interval_secs.max(1));
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;
        let mut last_seen = Instant::now();

        let outcome: Result<(), BoxError> = async {
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Binary(data))) => {
                                last_seen = Instant::now();
                                {
                                    let mut s = self.stats.write().await;
                                    s.total_messages += 1;
                                    s.total_bytes += data.len() as u64;
                                }
                                match SyncMessage::decode(&data) {
                                    Ok(sync_msg) => {
                                        if let Some(reply) = self.handle_message(doc_id, &info, sync_msg).await? {
                                            send_frame(&mut ws_sender, &reply).await?;
                                        }
                                    }
                                    Err(e) => log::warn!("Failed to decode frame from {addr}: {e}"),
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                last_seen = Instant::now();
                                ws_sender.send(Message::Pong(data)).await?;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                log::debug!("Connection closed from {addr}");
                                break;
                            }
                            Some(Ok(_)) => last_seen = Instant::now(),
                            Some(Err(e)) => {
                                log::warn!("WebSocket error from {addr}: {e}");
                                break;
                            }
                        }
                    }

                    frame = broadcast_rx.recv() => {
                        match frame {
                            Ok(data) => {
                                if let Ok(sync_msg) = SyncMessage::decode(&data) {
                                    if sync_msg.peer_id == peer_id {
                                        continue;
                                    }
                                }
                                ws_sender.send(Message::Binary(data.to_vec().into())).await?;
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                                log::warn!("Peer {peer_id} lagged by {n} messages in doc {doc_id}");
                                if let Some(room) = self.rooms.read().await.get(&doc_id) {
                                    room.broadcast.record_lag(n);
                                }
                            }
                            // Room was deleted underneath us
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                                ws_sender.send(Message::Close(None)).await?;
                                break;
                            }
                        }
                    }

                    _ = ticker.tick() => {
                        if last_seen.elapsed() > heartbeat * 2 {
                            log::info!("Dropping silent peer {peer_id} from doc {doc_id}");
                            break;
                        }
                        ws_sender.send(Message::Ping(Vec::new().into())).await?;
                    }
                }
            }
            Ok(())
        }
        .await;

        self.leave_room(doc_id, peer_id).await;
        outcome
    }

    async fn reject<S>(&self, sink: &mut S, doc_id: Uuid, reason: &str) -> Result<(), BoxError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
    {
        self.stats.write().await.rejected_joins += 1;
        send_frame(sink, &SyncMessage::rejected(doc_id, reason)).await?;
        sink.send(Message::Close(None)).await?;
        Ok(())
    }

    /// Seat `info` in the room, loading it from storage if needed.
    ///
    /// A peer id that is already seated is replaced with a fresh one, so a
    /// reconnect racing its own stale connection gets a separate seat.
    /// Returns `None` when the room is full.
    async fn join_room(&self, doc_id: Uuid, info: &mut PeerInfo) -> Result<Option<Seat>, DocStoreError> {
        let mut rooms = self.rooms.write().await;
        if !rooms.contains_key(&doc_id) {
            let room = match &self.store {
                Some(store) => match store.load_updates(doc_id)? {
                    Some(updates) => {
                        log::info!("Loaded doc {doc_id} from storage ({} updates)", updates.len());
                        DocumentRoom::from_updates(self.config.broadcast_capacity, doc_id, &updates)
                    }
                    None => DocumentRoom::new(self.config.broadcast_capacity),
                },
                None => DocumentRoom::new(self.config.broadcast_capacity),
            };
            rooms.insert(doc_id, room);
        }
        let room_count = rooms.len();
        let Some(room) = rooms.get(&doc_id) else {
            return Ok(None);
        };

        if room.broadcast.has_peer(&info.peer_id).await {
            let requested = info.peer_id;
            info.peer_id = Uuid::new_v4();
            log::info!("Peer id {requested} already seated in doc {doc_id}, using {}", info.peer_id);
        }

        let others = room.broadcast.peers().await;
        let Some(rx) = room
            .broadcast
            .try_add_peer(info.clone(), self.config.max_peers_per_room)
            .await
        else {
            log::info!("Doc {doc_id} is full, refusing {}", info.peer_id);
            return Ok(None);
        };

        let announced = SyncMessage::peer_joined(doc_id, info).and_then(|msg| room.broadcast.broadcast(&msg));
        if let Err(e) = announced {
            log::warn!("Failed to announce peer {}: {e}", info.peer_id);
        }
        let state = room.full_state();
        let playback = room.playback.clone();
        drop(rooms);

        self.stats.write().await.active_rooms = room_count;
        Ok(Some(Seat { rx, state, playback, others }))
    }

    /// Handle one frame from an admitted peer. Returns a direct reply, if any.
    async fn handle_message(
        &self,
        doc_id: Uuid,
        info: &PeerInfo,
        msg: SyncMessage,
    ) -> Result<Option<SyncMessage>, BoxError> {
        match msg.msg_type {
            // A client's SyncStep2 carries edits it made while offline
            MessageType::Delta | MessageType::SyncStep2 => {
                self.apply_delta(doc_id, info.peer_id, msg).await;
                Ok(None)
            }

            MessageType::SyncStep1 => {
                let diff = {
                    let rooms = self.rooms.read().await;
                    rooms.get(&doc_id).and_then(|room| room.diff(&msg.payload))
                };
                Ok(diff.map(|diff| SyncMessage::sync_step2(Uuid::nil(), doc_id, diff)))
            }

            MessageType::Awareness => {
                match AwarenessMessage::decode(&msg.payload) {
                    Ok(AwarenessMessage::Join { name, .. }) => {
                        log::debug!("Presence: {name} announced in doc {doc_id}");
                    }
                    Ok(_) => log::trace!("Presence update in doc {doc_id}"),
                    Err(e) => {
                        log::warn!("Dropping bad awareness frame from {}: {e}", info.peer_id);
                        return Ok(None);
                    }
                }
                let mut msg = msg;
                msg.peer_id = info.peer_id;
                msg.doc_id = doc_id;
                if let Some(room) = self.rooms.read().await.get(&doc_id) {
                    room.broadcast.broadcast(&msg)?;
                }
                Ok(None)
            }

            MessageType::Playback => {
                let command = match msg.playback_command_payload() {
                    Ok(command) => command,
                    Err(e) => {
                        log::warn!("Dropping bad playback frame from {}: {e}", info.peer_id);
                        return Ok(None);
                    }
                };
                let mut rooms = self.rooms.write().await;
                if let Some(room) = rooms.get_mut(&doc_id) {
                    let by = info.user_id.or(Some(info.peer_id));
                    if room.playback.apply(&command, by, now_millis()) {
                        log::debug!("Playback in doc {doc_id}: {command:?}");
                        room.broadcast
                            .broadcast(&SyncMessage::playback_state(doc_id, &room.playback)?)?;
                    }
                }
                Ok(None)
            }

            MessageType::Ping => Ok(Some(SyncMessage::pong(info.peer_id))),

            other => {
                log::debug!("Ignoring {other:?} frame from {}", info.peer_id);
                Ok(None)
            }
        }
    }

    async fn apply_delta(&self, doc_id: Uuid, peer_id: Uuid, msg: SyncMessage) {
        let rooms = self.rooms.read().await;
        let Some(room) = rooms.get(&doc_id) else {
            return;
        };
        if let Err(e) = room.apply_update(&msg.payload) {
            log::warn!("Rejected update from {peer_id} for doc {doc_id}: {e}");
            return;
        }

        // Persist while the room is held so a closing snapshot covers it
        let mut persisted = false;
        if let Some(store) = &self.store {
            match store.append_delta(doc_id, &msg.payload) {
                Ok(_) => persisted = true,
                Err(e) => log::error!("Failed to persist delta for doc {doc_id}: {e}"),
            }
        }

        let relay = SyncMessage::delta(peer_id, doc_id, msg.clock, msg.payload);
        if let Err(e) = room.broadcast.broadcast(&relay) {
            log::warn!("Failed to relay delta in doc {doc_id}: {e}");
        }
        drop(rooms);

        if persisted {
            self.stats.write().await.persisted_deltas += 1;
        }
    }

    async fn leave_room(&self, doc_id: Uuid, peer_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get(&doc_id) else {
            return;
        };
        room.broadcast.remove_peer(&peer_id).await;
        let _ = room.broadcast.broadcast(&SyncMessage::peer_left(peer_id, doc_id));
        if room.broadcast.peer_count().await > 0 {
            return;
        }

        let Some(room) = rooms.remove(&doc_id) else {
            return;
        };
        let room_count = rooms.len();
        log::info!("Room {doc_id} closed");

        // Snapshot before releasing the map: a rejoin would append deltas this snapshot drops
        let mut snapshotted = false;
        if let Some(store) = &self.store {
            match store.save_snapshot(doc_id, &room.full_state()) {
                Ok(meta) => {
                    snapshotted = true;
                    log::info!(
                        "Persisted snapshot for doc {doc_id} ({} bytes compressed)",
                        meta.compressed_size
                    );
                }
                Err(e) => log::error!("Failed to persist snapshot for doc {doc_id}: {e}"),
            }
        }
        drop(rooms);

        if let Some(observer) = &self.observer {
            observer.room_closed(doc_id, &room.text());
        }

        let mut s = self.stats.write().await;
        s.active_rooms = room_count;
        if snapshotted {
            s.persisted_snapshots += 1;
        }
    }

    // ─── Read access ──────────────────────────────────────────────────

    /// Current text of a document, live or stored. `None` if it never existed.
    pub async fn document_text(&self, doc_id: Uuid) -> Result<Option<String>, DocStoreError> {
        if let Some(room) = self.rooms.read().await.get(&doc_id) {
            return Ok(Some(room.text()));
        }
        let Some(store) = &self.store else {
            return Ok(None);
        };
        Ok(store
            .load_updates(doc_id)?
            .map(|updates| DocumentRoom::from_updates(1, doc_id, &updates).text()))
    }

    /// Drop a document: live peers are disconnected, storage is cleared.
    pub async fn delete_document(&self, doc_id: Uuid) -> Result<bool, DocStoreError> {
        let live = self.rooms.write().await.remove(&doc_id).is_some();
        let stored = match &self.store {
            Some(store) => store.delete_document(doc_id)?,
            None => false,
        };
        if live {
            log::info!("Room {doc_id} deleted with peers connected");
        }
        Ok(live || stored)
    }

    pub async fn room_peers(&self, doc_id: Uuid) -> Vec<PeerInfo> {
        match self.rooms.read().await.get(&doc_id) {
            Some(room) => room.broadcast.peers().await,
            None => Vec::new(),
        }
    }

    pub async fn playback(&self, doc_id: Uuid) -> Option<PlaybackState> {
        self.rooms.read().await.get(&doc_id).map(|room| room.playback.clone())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> Option<&Arc<DocumentStore>> {
        self.store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yrs::{Text, WriteTxn};

    fn update_with_text(content: &str) -> Vec<u8> {
        let doc = Doc::new();
        {
            let mut txn = doc.transact_mut();
            let text = txn.get_or_insert_text(TEXT_NAME);
            text.insert(&mut txn, 0, content);
        }
        let txn = doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    #[test]
    fn test_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.max_peers_per_room, 50);
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_room_applies_updates() {
        let room = DocumentRoom::from_updates(4, Uuid::new_v4(), &[update_with_text("hello")]);
        assert_eq!(room.text(), "hello");
        assert!(room.apply_update(&[0xFF, 0x00, 0x13]).is_err());

        let copy = DocumentRoom::from_updates(4, Uuid::new_v4(), &[room.full_state()]);
        assert_eq!(copy.text(), "hello");
    }

    #[test]
    fn test_room_diff_against_empty_vector() {
        let room = DocumentRoom::from_updates(4, Uuid::new_v4(), &[update_with_text("abc")]);
        let empty_sv = StateVector::default().encode_v1();
        let diff = room.diff(&empty_sv).unwrap();

        let other = DocumentRoom::new(4);
        other.apply_update(&diff).unwrap();
        assert_eq!(other.text(), "abc");
        assert!(room.diff(&[0xFF, 0xFF, 0xFF, 0xFF]).is_none());
    }

    #[tokio::test]
    async fn test_document_text_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            storage_path: Some(dir.path().join("docs")),
            ..ServerConfig::default()
        };
        let server = SyncServer::new(config).unwrap();
        let doc_id = Uuid::new_v4();
        assert_eq!(server.document_text(doc_id).await.unwrap(), None);

        let store = server.store().unwrap();
        store.append_delta(doc_id, &update_with_text("print(1)")).unwrap();
        assert_eq!(server.document_text(doc_id).await.unwrap().as_deref(), Some("print(1)"));

        assert_eq!(server.recover().unwrap(), 1);
        assert_eq!(store.load_metadata(doc_id).unwrap().unwrap().delta_count, 0);
        assert_eq!(server.document_text(doc_id).await.unwrap().as_deref(), Some("print(1)"));

        assert!(server.delete_document(doc_id).await.unwrap());
        assert_eq!(server.document_text(doc_id).await.unwrap(), None);
    }

    #[test]
    fn test_allow_all_keeps_name() {
        let req = JoinRequest { info: PeerInfo::new("guest"), token: String::new() };
        let admission = AllowAll.authorize(Uuid::new_v4(), &req).unwrap();
        assert_eq!(admission.name, "guest");
        assert_eq!(admission.user_id, None);
    }
}
