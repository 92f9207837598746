use criterion::{black_box, BenchmarkId, Criterion};
use criterion::{criterion_group, criterion_main};

use mkts::codec;
use mkts::protocol::{KeyOffsets, MultiQueryResponse, QueryResponse, WireDataset};
use mkts::{Column, QueryReply, Table, EPOCH_COLUMN};

const SYMBOLS: usize = 8;

fn ohlcv(rows: usize) -> Table {
    let epochs: Vec<i64> = (0..rows as i64).map(|i| 1_500_000_000 + i * 60).collect();
    let prices: Vec<f32> = (0..rows).map(|i| i as f32 * 0.25).collect();
    Table::new(vec![
        Column::new(EPOCH_COLUMN, epochs),
        Column::new("Open", prices.clone()),
        Column::new("High", prices.clone()),
        Column::new("Low", prices.clone()),
        Column::new("Close", prices),
        Column::new("Volume", vec![100_i64; rows]),
    ])
    .expect("table")
}

/// One response whose column set is shared by `SYMBOLS` equal windows.
fn envelope(rows_per_symbol: usize) -> MultiQueryResponse {
    let table = ohlcv(rows_per_symbol * SYMBOLS);
    let mut startindex = KeyOffsets::new();
    let mut lengths = KeyOffsets::new();
    for s in 0..SYMBOLS {
        let key = format!("SYM{s}/1Min/OHLCV:Symbol/Timeframe/AttributeGroup");
        startindex.insert(key.clone(), (s * rows_per_symbol) as u64);
        lengths.insert(key, rows_per_symbol as u64);
    }
    MultiQueryResponse {
        responses: vec![QueryResponse {
            result: WireDataset::new(codec::encode(&table).expect("encode"), startindex, lengths),
        }],
        timezone: "UTC".to_string(),
        version: String::new(),
    }
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    for &rows in &[100_usize, 10_000] {
        let response = envelope(rows);
        let bytes = rmp_serde::to_vec_named(&response).expect("pack");
        group.bench_with_input(BenchmarkId::new("reply", rows), &bytes, |b, bytes| {
            b.iter(|| {
                let response: MultiQueryResponse =
                    rmp_serde::from_slice(black_box(bytes)).expect("unpack");
                let reply = QueryReply::from_response(&response).expect("reply");
                black_box(reply.latest_row(None).expect("latest"));
            });
        });
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let table = ohlcv(10_000);
    c.bench_function("encode/10000", |b| {
        b.iter(|| codec::encode(black_box(&table)).expect("encode"));
    });
}

criterion_group!(benches, bench_decode, bench_encode);
criterion_main!(benches);
