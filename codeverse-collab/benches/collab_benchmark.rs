use codeverse_collab::{
    AwarenessMessage, BroadcastGroup, DocumentStore, OfflineQueue, PeerInfo, PlaybackCommand,
    PlaybackState, PresenceRoom, StoreConfig, SyncMessage,
};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use uuid::Uuid;

fn bench_delta_encode(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let doc = Uuid::new_v4();
    let delta = vec![0u8; 64];

    c.bench_function("delta_encode_64B", |b| {
        b.iter(|| {
            let msg = SyncMessage::delta(black_box(peer), black_box(doc), 1, black_box(delta.clone()));
            black_box(msg.encode().unwrap());
        })
    });
}

fn bench_delta_decode(c: &mut Criterion) {
    let encoded = SyncMessage::delta(Uuid::new_v4(), Uuid::new_v4(), 1, vec![0u8; 64])
        .encode()
        .unwrap();

    c.bench_function("delta_decode_64B", |b| {
        b.iter(|| black_box(SyncMessage::decode(black_box(&encoded)).unwrap()))
    });
}

fn bench_cursor_frame(c: &mut Criterion) {
    let peer = Uuid::new_v4();
    let doc = Uuid::new_v4();
    let cursor = AwarenessMessage::Cursor { peer_id: peer, index: 1024, timestamp: 7 };

    c.bench_function("cursor_frame_encode", |b| {
        b.iter(|| black_box(SyncMessage::awareness(peer, doc, 1, black_box(&cursor)).unwrap().encode().unwrap()))
    });
}

fn bench_presence_handle_cursor(c: &mut Criterion) {
    let mut room = PresenceRoom::new(Uuid::new_v4());
    let peers: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();
    let mut ts = 0u64;

    c.bench_function("presence_cursor_32_peers", |b| {
        b.iter(|| {
            ts += 1;
            for peer in &peers {
                room.handle_message(&AwarenessMessage::Cursor { peer_id: *peer, index: 10, timestamp: ts });
            }
        })
    });
}

fn bench_playback_apply(c: &mut Criterion) {
    let mut state = PlaybackState::default();
    state.apply(&PlaybackCommand::Load { url: "https://video.example/a.mp4".into() }, None, 0);
    let mut position = 0.0;

    c.bench_function("playback_seek", |b| {
        b.iter(|| {
            position += 0.5;
            black_box(state.apply(&PlaybackCommand::Seek { position_secs: position }, None, 1));
        })
    });
}

fn bench_broadcast_fan_out(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let group = BroadcastGroup::new(1024);
    let mut receivers = Vec::new();
    rt.block_on(async {
        for i in 0..16 {
            receivers.push(group.add_peer(PeerInfo::new(format!("peer-{i}"))).await);
        }
    });
    let frame = Arc::new(vec![0u8; 128]);

    c.bench_function("broadcast_16_peers_128B", |b| {
        b.iter(|| {
            group.broadcast_raw(frame.clone());
            for rx in receivers.iter_mut() {
                black_box(rx.try_recv().ok());
            }
        })
    });
}

fn bench_offline_queue(c: &mut Criterion) {
    c.bench_function("offline_queue_1000", |b| {
        b.iter(|| {
            let mut queue = OfflineQueue::new(1000);
            for i in 0..1000 {
                queue.enqueue(i, vec![0u8; 32]);
            }
            black_box(queue.drain());
        })
    });
}

fn bench_store_delta(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let doc = Uuid::new_v4();
    let delta = vec![7u8; 256];

    c.bench_function("store_append_delta_256B", |b| {
        b.iter(|| black_box(store.append_delta(doc, &delta).unwrap()))
    });
}

fn bench_snapshot_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = DocumentStore::open(StoreConfig::for_testing(dir.path())).unwrap();
    let doc = Uuid::new_v4();
    store.save_snapshot(doc, &vec![42u8; 64 * 1024]).unwrap();

    c.bench_function("store_load_snapshot_64KB", |b| {
        b.iter(|| black_box(store.load_snapshot(doc).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_delta_encode,
    bench_delta_decode,
    bench_cursor_frame,
    bench_presence_handle_cursor,
    bench_playback_apply,
    bench_broadcast_fan_out,
    bench_offline_queue,
    bench_store_delta,
    bench_snapshot_load,
);
criterion_main!(benches);
