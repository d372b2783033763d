use criterion::{Criterion, criterion_group, criterion_main};
use events::{
    EventEnvelope, EventPayload, LaunchCreated, MemecoinAddress, RawEnvelope, Transfer,
    TransferSide, TxHash,
};
use futures_util::future::join_all;
use ingestion::{ConsistencyCoordinator, IngestionPipeline, PipelineConfig, VecFeed};
use record_store::InMemoryRecordStore;

/// One launch and two buys for each of `tokens` addresses, block-ordered.
fn make_envelopes(tokens: usize) -> Vec<EventEnvelope> {
    let mut envelopes = Vec::with_capacity(tokens * 3);
    for i in 0..tokens {
        let address = MemecoinAddress::new(format!("0x{i:040x}"));
        let block = i as u64 * 10 + 1;

        envelopes.push(
            EventEnvelope::builder()
                .transfer_id(format!("launch_{i}"))
                .block(block)
                .payload(EventPayload::LaunchCreated(LaunchCreated {
                    transaction_hash: TxHash::new(format!("0xt{i}")),
                    memecoin_address: address.clone(),
                    owner_address: "0xowner".to_string(),
                    quote_token: None,
                    total_supply: "1000000".to_string(),
                }))
                .build()
                .unwrap(),
        );
        for n in 1..=2 {
            envelopes.push(
                EventEnvelope::builder()
                    .transfer_id(format!("buy_{i}_{n}"))
                    .block(block + n)
                    .payload(EventPayload::Transfer(Transfer {
                        memecoin_address: address.clone(),
                        owner_address: "0xbuyer".to_string(),
                        side: TransferSide::Buy,
                        amount: "5".to_string(),
                        quote_amount: None,
                    }))
                    .build()
                    .unwrap(),
            );
        }
    }
    envelopes
}

fn bench_apply_sequential(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let envelopes = make_envelopes(100);

    c.bench_function("coordinator/apply_300_sequential", |b| {
        b.iter(|| {
            rt.block_on(async {
                let coordinator = ConsistencyCoordinator::new(InMemoryRecordStore::new());
                for envelope in &envelopes {
                    coordinator.apply(envelope).await.unwrap();
                }
            })
        })
    });
}

fn bench_apply_across_tokens(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let envelopes = make_envelopes(100);

    c.bench_function("coordinator/apply_300_across_100_tokens", |b| {
        b.iter(|| {
            rt.block_on(async {
                let coordinator = ConsistencyCoordinator::new(InMemoryRecordStore::new());
                let coordinator = &coordinator;
                join_all(envelopes.chunks(3).map(|token| async move {
                    for envelope in token {
                        coordinator.apply(envelope).await.unwrap();
                    }
                }))
                .await;
            })
        })
    });
}

fn bench_pipeline_run(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let raws: Vec<RawEnvelope> = make_envelopes(100)
        .iter()
        .map(|envelope| envelope.to_raw().unwrap())
        .collect();

    c.bench_function("pipeline/run_300_envelopes", |b| {
        b.iter(|| {
            rt.block_on(async {
                IngestionPipeline::new(
                    InMemoryRecordStore::new(),
                    VecFeed::new("bench", raws.clone()),
                    PipelineConfig::default(),
                )
                .run()
                .await
                .unwrap();
            })
        })
    });
}

criterion_group!(
    benches,
    bench_apply_sequential,
    bench_apply_across_tokens,
    bench_pipeline_run
);
criterion_main!(benches);
