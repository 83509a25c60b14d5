use broker::InMemoryBroker;
use criterion::{Criterion, criterion_group, criterion_main};
use outbox::{InMemoryOutbox, NewOutboxEvent};
use relay::{OutboxRelay, RelayConfig};

fn bench_drain(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("relay/drain_500_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let outbox = InMemoryOutbox::new();
                for seq in 0..500 {
                    outbox
                        .append(NewOutboxEvent::new(
                            "order-events",
                            serde_json::json!({"eventType": "OrderCreated", "seq": seq}),
                        ))
                        .await
                        .unwrap();
                }

                let relay = OutboxRelay::new(
                    outbox,
                    InMemoryBroker::new(),
                    RelayConfig::default().with_batch_size(50),
                );
                while !relay.run_cycle().await.unwrap().is_idle() {}
            });
        });
    });
}

criterion_group!(benches, bench_drain);
criterion_main!(benches);
