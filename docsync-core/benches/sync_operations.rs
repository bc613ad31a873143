use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docsync_core::core_doc::ReplicatedDoc;
use docsync_core::core_sync::{
    DocumentId, InstanceId, MemoryHub, Message, ProtocolMessage, PubSub, SyncDocument,
    SyncMessage, Target,
};

fn populated_doc(client: u64, ops: usize) -> ReplicatedDoc {
    let doc = ReplicatedDoc::with_client_id(client);
    for i in 0..ops {
        doc.set(format!("key_{}", i % 64), format!("value_{}", i)).unwrap();
    }
    doc
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for size in [16usize, 1_024, 64 * 1_024].iter() {
        let payload = ProtocolMessage::Sync(SyncMessage::Update(vec![7u8; *size]));
        let encoded = payload.encode();
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("encode_update", size), &payload, |b, p| {
            b.iter(|| black_box(p.encode()));
        });
        group.bench_with_input(BenchmarkId::new("decode_update", size), &encoded, |b, e| {
            b.iter(|| black_box(ProtocolMessage::decode(e).unwrap()));
        });
    }

    group.bench_function("ping_roundtrip", |b| {
        b.iter(|| black_box(ProtocolMessage::decode(&ProtocolMessage::Ping.encode()).unwrap()));
    });

    group.finish();
}

fn bench_message_bytes(c: &mut Criterion) {
    let message = Message::new(
        DocumentId::new("bench"),
        ProtocolMessage::Sync(SyncMessage::Update(vec![1u8; 512])).encode(),
        InstanceId::generate(),
        Target::Peer(InstanceId::generate()),
        3,
    );
    let bytes = message.to_bytes().unwrap();

    c.bench_function("message_to_bytes", |b| b.iter(|| black_box(message.to_bytes().unwrap())));
    c.bench_function("message_from_bytes", |b| {
        b.iter(|| black_box(Message::from_bytes(&bytes).unwrap()))
    });
}

fn bench_document_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_sync");

    for ops in [100usize, 1_000, 10_000].iter() {
        let source = populated_doc(1, *ops);
        let empty_sv = ReplicatedDoc::with_client_id(2).encode_state_vector().unwrap();
        let full_update = source.encode_diff(&empty_sv).unwrap().unwrap();
        group.throughput(Throughput::Elements(*ops as u64));

        group.bench_with_input(BenchmarkId::new("encode_diff", ops), &empty_sv, |b, sv| {
            b.iter(|| black_box(source.encode_diff(sv).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("apply_full_update", ops), &full_update, |b, u| {
            b.iter_batched(
                || ReplicatedDoc::with_client_id(2),
                |target| {
                    target.apply_update(u, None).unwrap();
                    black_box(target)
                },
                criterion::BatchSize::SmallInput,
            );
        });

        let synced = populated_doc(1, *ops);
        let synced_sv = synced.encode_state_vector().unwrap();
        group.bench_with_input(BenchmarkId::new("up_to_date_diff", ops), &synced_sv, |b, sv| {
            b.iter(|| black_box(source.encode_diff(sv).unwrap()));
        });
    }

    group.finish();
}

fn bench_memory_hub(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let hub = MemoryHub::new();
    let transport = hub.channel("bench");
    let mut group = c.benchmark_group("memory_hub");

    for subscribers in [1usize, 10, 50].iter() {
        // Drain every subscription so queues stay empty
        let ids: Vec<_> = runtime.block_on(async {
            let mut ids = Vec::new();
            for _ in 0..*subscribers {
                let mut sub = transport.subscribe().await.unwrap();
                ids.push(sub.id);
                tokio::spawn(async move { while sub.receiver.recv().await.is_some() {} });
            }
            ids
        });
        let message = Message::new(
            DocumentId::new("bench"),
            ProtocolMessage::Ping.encode(),
            InstanceId::generate(),
            Target::Broadcast,
            0,
        );

        group.throughput(Throughput::Elements(*subscribers as u64));
        group.bench_with_input(BenchmarkId::new("publish", subscribers), &message, |b, m| {
            b.to_async(&runtime).iter(|| async { transport.publish(m.clone()).await.unwrap() });
        });

        runtime.block_on(async {
            for id in ids {
                transport.unsubscribe(id).await.unwrap();
            }
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_codec,
    bench_message_bytes,
    bench_document_sync,
    bench_memory_hub
);
criterion_main!(benches);
