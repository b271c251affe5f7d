//! Benchmarks for snapshot delivery
//!
//! Run with: cargo bench -p tripsync-core
//!
//! Every change re-delivers the whole collection, so these measure the cost
//! of one delivery at a few list sizes:
//! - Listing records out of the session document
//! - Normalising stored records into an ordered snapshot
//! - Saving the session document after a write

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tripsync_core::session::SessionDoc;
use tripsync_core::{ChecklistItem, CollectionKind, RecordId, Snapshot, StoredRecord};

const SIZES: [usize; 3] = [10, 100, 1000];

fn session_with(count: usize) -> SessionDoc {
    let mut doc = SessionDoc::new();
    for i in 0..count {
        let record = StoredRecord {
            id: RecordId::new(),
            sequence: i as u64 + 1,
            revision: 1,
            fields: json!({
                "text": format!("Item {}", i),
                "createdAt": "2025-07-01T10:00:00Z",
                "createdBy": "anon_bench",
            }),
        };
        doc.put(CollectionKind::Checklist, &record).unwrap();
    }
    doc
}

// ============================================================================
// Delivery Benchmarks
// ============================================================================

fn bench_list(c: &mut Criterion) {
    let mut group = c.benchmark_group("doc_list");
    for size in SIZES {
        let doc = session_with(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &doc, |b, doc| {
            b.iter(|| black_box(doc.list(CollectionKind::Checklist).unwrap()))
        });
    }
    group.finish();
}

fn bench_normalise(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_from_stored");
    for size in SIZES {
        let records = session_with(size).list(CollectionKind::Checklist).unwrap();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &records, |b, records| {
            b.iter(|| black_box(Snapshot::<ChecklistItem>::from_stored(records)))
        });
    }
    group.finish();
}

fn bench_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("doc_save");
    for size in SIZES {
        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter_batched(
                || session_with(size),
                |mut doc| black_box(doc.save()),
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_list, bench_normalise, bench_save);
criterion_main!(benches);
