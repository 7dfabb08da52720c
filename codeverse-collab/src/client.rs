//! WebSocket client for a CodeVerse room.
//!
//! Handles the join handshake, relays remote frames as [`SyncEvent`]s and
//! queues local edits while offline. Queued edits are replayed on the next
//! successful [`SyncClient::connect`].

use futures_util::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::presence::AwarenessMessage;
use crate::protocol::{JoinRequest, MessageType, PeerInfo, ProtocolError, SyncMessage};
use crate::watch::{PlaybackCommand, PlaybackState};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    Connected,
    Disconnected,
    /// Full room state, sent right after admission
    StateSynced(Vec<u8>),
    RemoteDelta { peer_id: Uuid, clock: u64, update: Vec<u8> },
    RemoteAwareness { peer_id: Uuid, message: AwarenessMessage },
    PeerJoined(PeerInfo),
    PeerLeft(Uuid),
    Playback(PlaybackState),
}

/// Edits made while disconnected, oldest first.
pub struct OfflineQueue {
    queue: VecDeque<(u64, Vec<u8>)>,
    max_size: usize,
}

impl OfflineQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Returns false when the queue is full.
    pub fn enqueue(&mut self, clock: u64, payload: Vec<u8>) -> bool {
        if self.queue.len() >= self.max_size {
            return false;
        }
        self.queue.push_back((clock, payload));
        true
    }

    pub fn drain(&mut self) -> Vec<(u64, Vec<u8>)> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn total_bytes(&self) -> usize {
        self.queue.iter().map(|(_, payload)| payload.len()).sum()
    }
}

pub struct SyncClient {
    peer_info: PeerInfo,
    doc_id: Uuid,
    token: String,
    state: Arc<RwLock<ConnectionState>>,
    /// Lamport clock
    clock: Arc<AtomicU64>,
    offline_queue: Arc<Mutex<OfflineQueue>>,
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
    event_tx: mpsc::Sender<SyncEvent>,
    server_url: String,
}

impl SyncClient {
    pub fn new(
        peer_info: PeerInfo,
        doc_id: Uuid,
        server_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            peer_info,
            doc_id,
            token: token.into(),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            clock: Arc::new(AtomicU64::new(0)),
            offline_queue: Arc::new(Mutex::new(OfflineQueue::new(10_000))),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
        }
    }

    /// Can only be taken once.
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect and join the room.
    ///
    /// Resolves once the server has admitted us and sent the room state, or
    /// fails with [`ProtocolError::Rejected`].
    pub async fn connect(&mut self) -> Result<(), ProtocolError> {
        *self.state.write().await = ConnectionState::Connecting;
        match self.open().await {
            Ok(()) => Ok(()),
            Err(e) => {
                *self.state.write().await = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn open(&mut self) -> Result<(), ProtocolError> {
        let url = format!("{}/{}", self.server_url.trim_end_matches('/'), self.doc_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let join = SyncMessage::join(
            self.doc_id,
            &JoinRequest {
                info: self.peer_info.clone(),
                token: self.token.clone(),
            },
        )?;
        ws_writer
            .send(Message::Binary(join.encode()?.into()))
            .await
            .map_err(|e| ProtocolError::Connection(e.to_string()))?;

        // The server answers a join with either Rejected or the room state
        let initial_state = loop {
            let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, ws_reader.next())
                .await
                .map_err(|_| ProtocolError::Connection("join handshake timed out".into()))?;
            match frame {
                Some(Ok(Message::Binary(data))) => {
                    let msg = SyncMessage::decode(&data)?;
                    match msg.msg_type {
                        MessageType::Rejected => {
                            return Err(ProtocolError::Rejected(msg.rejection_reason()?));
                        }
                        MessageType::SyncStep2 => {
                            if !msg.peer_id.is_nil() && msg.peer_id != self.peer_info.peer_id {
                                log::info!(
                                    "Server seated us as {} instead of {}",
                                    msg.peer_id,
                                    self.peer_info.peer_id
                                );
                                self.peer_info.peer_id = msg.peer_id;
                            }
                            break msg.payload;
                        }
                        other => log::debug!("Ignoring {other:?} before admission"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(ProtocolError::ConnectionClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ProtocolError::Connection(e.to_string())),
            }
        };

        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(256);
        tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    return;
                }
            }
            let _ = ws_writer.send(Message::Close(None)).await;
        });

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;
        let _ = self.event_tx.send(SyncEvent::StateSynced(initial_state)).await;

        let queued = self.offline_queue.lock().await.drain();
        if !queued.is_empty() {
            log::info!("Replaying {} queued deltas", queued.len());
            for (clock, payload) in queued {
                let msg = SyncMessage::delta(self.peer_info.peer_id, self.doc_id, clock, payload);
                let _ = out_tx.send(msg.encode()?).await;
            }
        }
        self.outgoing_tx = Some(out_tx);

        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let clock = self.clock.clone();
        let peer_id = self.peer_info.peer_id;
        tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Binary(data)) => {
                        let Ok(msg) = SyncMessage::decode(&data) else {
                            continue;
                        };
                        if msg.peer_id == peer_id {
                            continue;
                        }
                        clock.fetch_max(msg.clock, Ordering::SeqCst);
                        if let Some(event) = Self::event_for(msg) {
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        });

        Ok(())
    }

    fn event_for(msg: SyncMessage) -> Option<SyncEvent> {
        match msg.msg_type {
            MessageType::Delta => Some(SyncEvent::RemoteDelta {
                peer_id: msg.peer_id,
                clock: msg.clock,
                update: msg.payload,
            }),
            MessageType::SyncStep2 => Some(SyncEvent::StateSynced(msg.payload)),
            MessageType::Awareness => msg
                .awareness_message()
                .ok()
                .map(|message| SyncEvent::RemoteAwareness { peer_id: msg.peer_id, message }),
            MessageType::PeerJoined => msg.peer_info().ok().map(SyncEvent::PeerJoined),
            MessageType::PeerLeft => Some(SyncEvent::PeerLeft(msg.peer_id)),
            MessageType::Playback => msg.playback_state_payload().ok().map(SyncEvent::Playback),
            _ => None,
        }
    }

    /// Close the connection. Later edits are queued.
    pub async fn disconnect(&mut self) {
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn send_encoded(&self, msg: &SyncMessage) -> Result<(), ProtocolError> {
        let tx = self.outgoing_tx.as_ref().ok_or(ProtocolError::ConnectionClosed)?;
        tx.send(msg.encode()?)
            .await
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Send a yrs update, or queue it while disconnected.
    pub async fn send_delta(&self, yrs_update: Vec<u8>) -> Result<(), ProtocolError> {
        let clock = self.tick();
        if *self.state.read().await == ConnectionState::Connected {
            let msg = SyncMessage::delta(self.peer_info.peer_id, self.doc_id, clock, yrs_update);
            match self.send_encoded(&msg).await {
                Ok(()) => return Ok(()),
                Err(_) => {
                    // Writer is gone; keep the edit for the next connection
                    if self.offline_queue.lock().await.enqueue(clock, msg.payload) {
                        return Ok(());
                    }
                    return Err(ProtocolError::ConnectionClosed);
                }
            }
        }
        if self.offline_queue.lock().await.enqueue(clock, yrs_update) {
            Ok(())
        } else {
            Err(ProtocolError::ConnectionClosed)
        }
    }

    /// Presence is dropped while offline.
    pub async fn send_awareness(&self, message: &AwarenessMessage) -> Result<(), ProtocolError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Ok(());
        }
        let clock = self.clock.load(Ordering::SeqCst);
        self.send_encoded(&SyncMessage::awareness(self.peer_info.peer_id, self.doc_id, clock, message)?)
            .await
    }

    pub async fn send_playback(&self, command: &PlaybackCommand) -> Result<(), ProtocolError> {
        let clock = self.tick();
        self.send_encoded(&SyncMessage::playback_command(self.peer_info.peer_id, self.doc_id, clock, command)?)
            .await
    }

    /// Ask for everything missing from `state_vector`.
    pub async fn request_sync(&self, state_vector: Vec<u8>) -> Result<(), ProtocolError> {
        self.send_encoded(&SyncMessage::sync_step1(self.peer_info.peer_id, self.doc_id, state_vector))
            .await
    }

    pub async fn send_ping(&self) -> Result<(), ProtocolError> {
        self.send_encoded(&SyncMessage::ping(self.peer_info.peer_id)).await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn peer_info(&self) -> &PeerInfo {
        &self.peer_info
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    pub fn clock(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub async fn offline_queue_len(&self) -> usize {
        self.offline_queue.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SyncClient {
        SyncClient::new(PeerInfo::new("tester"), Uuid::new_v4(), "ws://127.0.0.1:9", "tok")
    }

    #[tokio::test]
    async fn test_initial_state() {
        let client = client();
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(client.clock(), 0);
        assert_eq!(client.offline_queue_len().await, 0);
        assert_eq!(client.server_url(), "ws://127.0.0.1:9");
    }

    #[tokio::test]
    async fn test_offline_edits_queue() {
        let client = client();
        client.send_delta(vec![1, 2, 3]).await.unwrap();
        client.send_delta(vec![4, 5]).await.unwrap();
        assert_eq!(client.offline_queue_len().await, 2);
        assert_eq!(client.clock(), 2);
    }

    #[tokio::test]
    async fn test_offline_presence_dropped_playback_refused() {
        let client = client();
        let msg = AwarenessMessage::Leave { peer_id: client.peer_info().peer_id };
        client.send_awareness(&msg).await.unwrap();
        assert!(matches!(
            client.send_playback(&PlaybackCommand::Pause { position_secs: 1.0 }).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_resets_state() {
        let mut client = client();
        assert!(matches!(client.connect().await, Err(ProtocolError::Connection(_))));
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }

    #[test]
    fn test_offline_queue_bounds() {
        let mut queue = OfflineQueue::new(2);
        assert!(queue.enqueue(1, vec![1, 2, 3]));
        assert!(queue.enqueue(2, vec![4]));
        assert!(!queue.enqueue(3, vec![5]));
        assert_eq!(queue.total_bytes(), 4);

        assert_eq!(queue.drain(), vec![(1, vec![1, 2, 3]), (2, vec![4])]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_take_event_rx_once() {
        let mut client = client();
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }
}
