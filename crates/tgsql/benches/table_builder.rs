use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tgsql::{ConnectionHandle, DataSource, QueryBuilder};

fn handle() -> ConnectionHandle {
    ConnectionHandle::open(&DataSource::new("postgres://bench@localhost/bench"))
        .expect("pool config")
}

/// SELECT * FROM t WHERE col0 = $1 AND col1 = $2 ... ORDER BY id DESC LIMIT 20 OFFSET 20
fn build_select(handle: &ConnectionHandle, n: usize) -> QueryBuilder<'static> {
    let mut qb = handle.table("t");
    for i in 0..n {
        qb = qb.where_(&format!("col{i}"), "=", i as i64);
    }
    qb.order("id").page(2, 20)
}

fn bench_to_sql(c: &mut Criterion) {
    let handle = handle();
    let mut group = c.benchmark_group("table_builder/to_sql");

    for n in [1, 5, 10, 50, 100] {
        let qb = build_select(&handle, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &qb, |b, qb| {
            b.iter(|| black_box(qb.to_sql()));
        });
    }

    group.finish();
}

fn bench_build_and_render(c: &mut Criterion) {
    let handle = handle();
    let mut group = c.benchmark_group("table_builder/build_and_render");

    for n in [1, 5, 10, 50, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build_select(&handle, n).to_sql()));
        });
    }

    group.finish();
}

fn bench_where_in(c: &mut Criterion) {
    let handle = handle();
    let mut group = c.benchmark_group("table_builder/where_in");

    for n in [5, 20, 100, 500] {
        let values: Vec<i64> = (0..n).collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &values, |b, values| {
            b.iter(|| {
                let qb = handle.table("t").where_in("id", values.iter().copied());
                black_box(qb.to_sql())
            });
        });
    }

    group.finish();
}

fn bench_debug_sql(c: &mut Criterion) {
    let handle = handle();
    let mut group = c.benchmark_group("table_builder/to_debug_sql");

    for n in [1, 10, 100] {
        let qb = build_select(&handle, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &qb, |b, qb| {
            b.iter(|| black_box(qb.to_debug_sql()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_to_sql,
    bench_build_and_render,
    bench_where_in,
    bench_debug_sql
);
criterion_main!(benches);
