//   Copyright (c) 2024-2026 Anton Kundenko <singaraiona@gmail.com>
//   All rights reserved.
//
//   Permission is hereby granted, free of charge, to any person obtaining a copy
//   of this software and associated documentation files (the "Software"), to deal
//   in the Software without restriction, including without limitation the rights
//   to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
//   copies of the Software, and to permit persons to whom the Software is
//   furnished to do so, subject to the following conditions:
//
//   The above copyright notice and this permission notice shall be included in all
//   copies or substantial portions of the Software.
//
//   THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
//   IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//   FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//   AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//   LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
//   OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
//   SOFTWARE.

//! h2oai-style groupby/sort/join/window benchmark suite (criterion).
//!
//! This crate has no SQL frontend or CSV reader, so unlike the donor's
//! benchmark (which loads the h2oai groupby CSVs through a SQL session),
//! this one builds an equivalently-shaped synthetic table in memory and
//! drives it straight through [`teide_core::graph::Graph`] /
//! [`teide_core::exec`]. Row count is kept modest (`N`) so the suite runs
//! in reasonable time without a dataset on disk; set `TEIDE_BENCH_ROWS`
//! to scale it up.

use criterion::{criterion_group, criterion_main, Criterion, SamplingMode};
use std::time::Duration;

use teide_core::exec::{self, Engine};
use teide_core::graph::Graph;
use teide_core::group::{AggOp, AggSpec};
use teide_core::join::JoinType;
use teide_core::sort::SortKey;
use teide_core::table::{Column, ColumnData, Table};
use teide_core::window::{FrameType, WindowFunc, WindowSpec};

fn row_count() -> usize {
    std::env::var("TEIDE_BENCH_ROWS").ok().and_then(|s| s.parse().ok()).unwrap_or(1_000_000)
}

// Column name symbols, matching the h2oai groupby benchmark's schema
// (id1..id6, v1..v3) with plain small integers standing in for interned
// symbol IDs.
const ID1: i64 = 1;
const ID2: i64 = 2;
const ID3: i64 = 3;
const V1: i64 = 11;
const V2: i64 = 12;
const V3: i64 = 13;

fn groupby_table(n: usize) -> Table {
    let mut id1 = Vec::with_capacity(n);
    let mut id2 = Vec::with_capacity(n);
    let mut id3 = Vec::with_capacity(n);
    let mut v1 = Vec::with_capacity(n);
    let mut v2 = Vec::with_capacity(n);
    let mut v3 = Vec::with_capacity(n);
    for i in 0..n {
        id1.push((i % 100) as i64);
        id2.push((i % 1_000) as i64);
        id3.push((i % 100_000) as i64);
        v1.push((i % 5 + 1) as f64);
        v2.push((i % 15 + 1) as f64);
        v3.push((i as f64 * 0.37) % 100.0);
    }
    let mut t = Table::new();
    t.add_col(ID1, Column::new(ColumnData::I64(id1)));
    t.add_col(ID2, Column::new(ColumnData::I64(id2)));
    t.add_col(ID3, Column::new(ColumnData::I64(id3)));
    t.add_col(V1, Column::new(ColumnData::F64(v1)));
    t.add_col(V2, Column::new(ColumnData::F64(v2)));
    t.add_col(V3, Column::new(ColumnData::F64(v3)));
    t
}

fn bench_groupby(c: &mut Criterion) {
    let n = row_count();
    let table = groupby_table(n);
    let engine = Engine::with_available_parallelism();

    let mut group = c.benchmark_group("groupby");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(1));

    // q1: GROUP BY id1, SUM(v1)
    group.bench_function("q1", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let grouped = g.group(scan, vec![ID1], vec![AggSpec { col: Some(V1), op: AggOp::Sum, out: 100 }]);
            exec::execute(&engine, &g, grouped, &table).unwrap()
        })
    });

    // q2: GROUP BY id1, id2, SUM(v1)
    group.bench_function("q2", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let grouped =
                g.group(scan, vec![ID1, ID2], vec![AggSpec { col: Some(V1), op: AggOp::Sum, out: 100 }]);
            exec::execute(&engine, &g, grouped, &table).unwrap()
        })
    });

    // q3: GROUP BY id3, SUM(v1), AVG(v3)
    group.bench_function("q3", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let grouped = g.group(
                scan,
                vec![ID3],
                vec![
                    AggSpec { col: Some(V1), op: AggOp::Sum, out: 100 },
                    AggSpec { col: Some(V3), op: AggOp::Avg, out: 101 },
                ],
            );
            exec::execute(&engine, &g, grouped, &table).unwrap()
        })
    });

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let n = row_count();
    let table = groupby_table(n);
    let engine = Engine::with_available_parallelism();

    let mut group = c.benchmark_group("sort");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(1));

    group.bench_function("s1", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let sorted = g.sort(scan, vec![SortKey { col: ID1, desc: false }]);
            exec::execute(&engine, &g, sorted, &table).unwrap()
        })
    });

    group.bench_function("s2", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let sorted = g.sort(scan, vec![SortKey { col: V3, desc: true }]);
            exec::execute(&engine, &g, sorted, &table).unwrap()
        })
    });

    group.finish();
}

fn join_tables(n: usize) -> (Table, Table) {
    let mut x_key = Vec::with_capacity(n);
    let mut x_val = Vec::with_capacity(n);
    for i in 0..n {
        x_key.push((i % 50_000) as i64);
        x_val.push(i as f64);
    }
    let mut x = Table::new();
    x.add_col(ID1, Column::new(ColumnData::I64(x_key)));
    x.add_col(V1, Column::new(ColumnData::F64(x_val)));

    let m = n / 10;
    let mut y_key = Vec::with_capacity(m);
    let mut y_val = Vec::with_capacity(m);
    for i in 0..m {
        y_key.push((i % 50_000) as i64);
        y_val.push((i as f64) * 2.0);
    }
    let mut y = Table::new();
    y.add_col(ID1, Column::new(ColumnData::I64(y_key)));
    y.add_col(V2, Column::new(ColumnData::F64(y_val)));
    (x, y)
}

fn bench_join(c: &mut Criterion) {
    let n = row_count();
    let (x, y) = join_tables(n);
    let engine = Engine::with_available_parallelism();

    let mut group = c.benchmark_group("join");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(1));

    group.bench_function("j1", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let left = g.scan();
            let right = g.const_table(y.clone());
            let joined = g.join(left, right, vec![ID1], vec![ID1], JoinType::Inner);
            exec::execute(&engine, &g, joined, &x).unwrap()
        })
    });

    group.bench_function("j2", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let left = g.scan();
            let right = g.const_table(y.clone());
            let joined = g.join(left, right, vec![ID1], vec![ID1], JoinType::Left);
            exec::execute(&engine, &g, joined, &x).unwrap()
        })
    });

    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let n = row_count();
    let table = groupby_table(n);
    let engine = Engine::with_available_parallelism();

    let mut group = c.benchmark_group("window");
    group.sample_size(10);
    group.sampling_mode(SamplingMode::Flat);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(1));

    group.bench_function("w1", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let spec = WindowSpec {
                func: WindowFunc::RowNumber,
                input: None,
                param: 0,
                frame: FrameType::UnboundedToUnbounded,
                out: 100,
            };
            let windowed = g.window(scan, vec![ID1], vec![V1], vec![spec]);
            exec::execute(&engine, &g, windowed, &table).unwrap()
        })
    });

    group.bench_function("w3", |b| {
        b.iter(|| {
            let mut g = Graph::new();
            let scan = g.scan();
            let spec = WindowSpec {
                func: WindowFunc::Sum,
                input: Some(V1),
                param: 0,
                frame: FrameType::UnboundedToCurrent,
                out: 100,
            };
            let windowed = g.window(scan, vec![ID3], vec![V1], vec![spec]);
            exec::execute(&engine, &g, windowed, &table).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_groupby, bench_sort, bench_join, bench_window);
criterion_main!(benches);
