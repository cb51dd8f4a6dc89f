//! Write and scan throughput of the row container, in memory.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rowpack::{Cell, RowStore};

fn sample_rows(n: usize) -> Vec<Vec<Cell>> {
    (0..n)
        .map(|i| {
            vec![
                Cell::Int(i as i64),
                Cell::from(format!("name-{i}")),
                Cell::Float(i as f64 * 0.25),
                Cell::Null,
            ]
        })
        .collect()
}

fn write_container(store: &RowStore, rows: &[Vec<Cell>]) {
    let mut w = store.container("bench.rpk").writer().unwrap();
    w.set_headers(&["id", "name", "value", "note"]).unwrap();
    w.insert_rows(rows).unwrap();
    w.finalize().unwrap();
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("container_write");
    for n in [1_000usize, 50_000] {
        let rows = sample_rows(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &rows, |b, rows| {
            b.iter(|| write_container(&RowStore::memory(), black_box(rows)));
        });
    }
    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let n = 50_000usize;
    let store = RowStore::memory();
    write_container(&store, &sample_rows(n));
    let reader = store.container("bench.rpk").reader().unwrap();

    let mut group = c.benchmark_group("container_scan");
    group.throughput(Throughput::Elements(n as u64));
    group.bench_function("rows_full_decode", |b| {
        b.iter(|| reader.rows().unwrap().map(Result::unwrap).count());
    });
    group.bench_function("cursor_first_cell", |b| {
        b.iter(|| {
            let mut cursor = reader.cursor().unwrap();
            let mut sum = 0i64;
            while let Some(view) = cursor.next_record().unwrap() {
                if let Some(Cell::Int(v)) = view.cell(0).unwrap() {
                    sum += v;
                }
            }
            black_box(sum)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_write, bench_scan);
criterion_main!(benches);
