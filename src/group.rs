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

//! GROUP BY (spec.md §4.10): a general hash path over arbitrary key tuples,
//! built as per-worker local accumulation followed by a sequential merge in
//! worker-id order, so AVG/STDDEV/VAR's decomposed (sum, sum-of-squares,
//! count) accumulators can be combined with a plain componentwise add
//! instead of a second pass over the data. An empty `key_cols` is the
//! scalar path (spec.md §4.10.1) — every row falls into one implicit
//! group, equivalent to a whole-table reduce. [`crate::parted`] drives the
//! same accumulate/merge primitives per-partition for parted/MAPCOMMON
//! inputs instead of re-deriving its own accumulator.

use std::collections::HashMap;

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::reduce::MomentAcc;
use crate::symtab::SymbolTable;
use crate::table::{Column, ColumnData, ElemType, NullBitmap, SymWidth, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggOp {
    Sum,
    Prod,
    Min,
    Max,
    Count,
    Avg,
    First,
    Last,
    Stddev,
    StddevPop,
    Var,
    VarPop,
    CountDistinct,
}

#[derive(Debug, Clone, Copy)]
pub struct AggSpec {
    /// `None` only valid for `Count` (`COUNT(*)`).
    pub col: Option<i64>,
    pub op: AggOp,
    pub out: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum KeyPart {
    I64(i64),
    Bits(u64),
    Str(Box<str>),
    Null,
}

fn key_part(col: &Column, row: usize) -> KeyPart {
    if col.is_null(row) {
        return KeyPart::Null;
    }
    match col.elem_type() {
        ElemType::F64 => KeyPart::Bits(col.read_f64(row).to_bits()),
        ElemType::Str => KeyPart::Str(Box::from(col.read_str(row))),
        ElemType::Sym => KeyPart::I64(col.read_sym_id(row)),
        _ => KeyPart::I64(col.read_i64(row)),
    }
}

fn build_key(key_cols: &[&Column], row: usize) -> Vec<KeyPart> {
    key_cols.iter().map(|c| key_part(c, row)).collect()
}

#[derive(Clone)]
pub(crate) enum Acc {
    Sum(f64),
    Prod(f64),
    Min(f64),
    Max(f64),
    Count(i64),
    First(Option<f64>),
    Last(Option<f64>),
    Moment(MomentAcc),
    Distinct(std::collections::HashSet<u64>),
}

impl Acc {
    pub(crate) fn new(op: AggOp) -> Acc {
        match op {
            AggOp::Sum => Acc::Sum(0.0),
            AggOp::Prod => Acc::Prod(1.0),
            AggOp::Min => Acc::Min(f64::INFINITY),
            AggOp::Max => Acc::Max(f64::NEG_INFINITY),
            AggOp::Count => Acc::Count(0),
            AggOp::First => Acc::First(None),
            AggOp::Last => Acc::Last(None),
            AggOp::Avg | AggOp::Stddev | AggOp::StddevPop | AggOp::Var | AggOp::VarPop => {
                Acc::Moment(MomentAcc::default())
            }
            AggOp::CountDistinct => Acc::Distinct(std::collections::HashSet::new()),
        }
    }

    fn push(&mut self, v: Option<f64>) {
        match (self, v) {
            (Acc::Sum(s), Some(v)) => *s += v,
            (Acc::Prod(p), Some(v)) => *p *= v,
            (Acc::Min(m), Some(v)) => *m = m.min(v),
            (Acc::Max(m), Some(v)) => *m = m.max(v),
            (Acc::Count(c), Some(_)) => *c += 1,
            (Acc::First(slot), Some(v)) => {
                if slot.is_none() {
                    *slot = Some(v);
                }
            }
            (Acc::Last(slot), Some(v)) => *slot = Some(v),
            (Acc::Moment(m), Some(v)) => m.push(v),
            (Acc::Distinct(s), Some(v)) => {
                s.insert(v.to_bits());
            }
            (_, None) => {}
        }
    }

    fn merge(self, other: Acc) -> Acc {
        match (self, other) {
            (Acc::Sum(a), Acc::Sum(b)) => Acc::Sum(a + b),
            (Acc::Prod(a), Acc::Prod(b)) => Acc::Prod(a * b),
            (Acc::Min(a), Acc::Min(b)) => Acc::Min(a.min(b)),
            (Acc::Max(a), Acc::Max(b)) => Acc::Max(a.max(b)),
            (Acc::Count(a), Acc::Count(b)) => Acc::Count(a + b),
            (Acc::First(a), Acc::First(b)) => Acc::First(a.or(b)),
            (Acc::Last(a), Acc::Last(b)) => Acc::Last(b.or(a)),
            (Acc::Moment(a), Acc::Moment(b)) => Acc::Moment(MomentAcc::merge(a, b)),
            (Acc::Distinct(mut a), Acc::Distinct(b)) => {
                a.extend(b);
                Acc::Distinct(a)
            }
            (a, _) => a,
        }
    }

    fn finish(self, op: AggOp) -> ReduceVal {
        match self {
            Acc::Sum(v) => ReduceVal::F64(v),
            Acc::Prod(v) => ReduceVal::F64(v),
            Acc::Min(v) => ReduceVal::F64(if v.is_finite() { v } else { 0.0 }),
            Acc::Max(v) => ReduceVal::F64(if v.is_finite() { v } else { 0.0 }),
            Acc::Count(v) => ReduceVal::I64(v),
            Acc::First(v) | Acc::Last(v) => ReduceVal::F64(v.unwrap_or(0.0)),
            Acc::Moment(m) => ReduceVal::F64(match op {
                AggOp::Avg => if m.n == 0 { 0.0 } else { m.sum / m.n as f64 },
                AggOp::Stddev => m.variance(true).sqrt(),
                AggOp::StddevPop => m.variance(false).sqrt(),
                AggOp::Var => m.variance(true),
                AggOp::VarPop => m.variance(false),
                _ => 0.0,
            }),
            Acc::Distinct(s) => ReduceVal::I64(s.len() as i64),
        }
    }
}

enum ReduceVal {
    F64(f64),
    I64(i64),
}

pub(crate) type GroupRow = (Vec<KeyPart>, Vec<Acc>);
pub(crate) type PartialGroup = (HashMap<Vec<KeyPart>, usize>, Vec<GroupRow>);

pub(crate) fn local_accumulate(
    table: &Table,
    key_cols: &[&Column],
    aggs: &[AggSpec],
    range: std::ops::Range<usize>,
) -> PartialGroup {
    let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
    let mut rows: Vec<GroupRow> = Vec::new();
    let agg_cols: Vec<Option<&Column>> = aggs
        .iter()
        .map(|a| a.col.and_then(|name| table.col_by_name(name)))
        .collect();
    for row in range {
        let key = build_key(key_cols, row);
        let gid = *index.entry(key.clone()).or_insert_with(|| {
            rows.push((key, aggs.iter().map(|a| Acc::new(a.op)).collect()));
            rows.len() - 1
        });
        for (i, spec) in aggs.iter().enumerate() {
            let v = match spec.op {
                AggOp::Count => Some(0.0),
                _ => agg_cols[i].and_then(|c| {
                    if c.is_null(row) {
                        None
                    } else {
                        Some(c.read_f64(row))
                    }
                }),
            };
            rows[gid].1[i].push(v);
        }
    }
    (index, rows)
}

/// Merge worker-local partial group tables into one, preserving
/// first-appearance order across workers processed in ascending worker id
/// (matching the ordering [`crate::pool::Pool::dispatch`] guarantees for
/// worker 0's range).
pub(crate) fn merge_partials(parts: Vec<PartialGroup>) -> Vec<GroupRow> {
    let mut index: HashMap<Vec<KeyPart>, usize> = HashMap::new();
    let mut merged: Vec<GroupRow> = Vec::new();
    for (_local_index, local_rows) in parts {
        for (key, accs) in local_rows {
            match index.get(&key) {
                Some(&gid) => {
                    let existing = std::mem::replace(&mut merged[gid].1, vec![]);
                    merged[gid].1 = existing
                        .into_iter()
                        .zip(accs)
                        .map(|(a, b)| a.merge(b))
                        .collect();
                }
                None => {
                    index.insert(key.clone(), merged.len());
                    merged.push((key, accs));
                }
            }
        }
    }
    merged
}

/// GROUP BY over `key_cols`, computing `aggs` per group. Dispatches each
/// worker's row range to an independent local hash accumulation, then
/// merges sequentially — the same accumulate-then-merge split
/// [`crate::reduce`] uses for whole-column reductions, generalized to
/// per-group accumulators.
pub fn group_by(
    table: &Table,
    key_cols: &[i64],
    aggs: &[AggSpec],
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Table> {
    let _ = syms;
    let cols: Vec<&Column> = key_cols
        .iter()
        .map(|name| table.col_by_name(*name).ok_or(Error::Schema))
        .collect::<Result<_>>()?;
    let n = table.nrows();
    if n == 0 {
        if key_cols.is_empty() {
            // Scalar path (spec.md §4.10.1) over zero rows: one implicit
            // group, same as a whole-table reduce — not an empty result.
            let rows: Vec<GroupRow> = vec![(Vec::new(), aggs.iter().map(|a| Acc::new(a.op)).collect())];
            let key_types: Vec<ElemType> = Vec::new();
            return Ok(build_result_table(key_cols, &key_types, aggs, rows));
        }
        return Ok(empty_group_table(table, key_cols, aggs));
    }

    let n_workers = if n < cfg.parallel_threshold {
        1
    } else {
        pool.total_workers().min(n)
    };
    tracing::debug!(rows = n, n_workers, "group-by: local accumulation starting");
    let chunk = n.div_ceil(n_workers.max(1));
    let mut partials = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for w in 0..n_workers {
            let start = w * chunk;
            let end = (start + chunk).min(n);
            if start >= end {
                continue;
            }
            let cols = &cols;
            handles.push(scope.spawn(move || local_accumulate(table, cols, aggs, start..end)));
        }
        for h in handles {
            partials.push(h.join().expect("group worker panicked"));
        }
    });
    let merged = merge_partials(partials);
    tracing::debug!(groups = merged.len(), "group-by: partials merged");
    let key_types: Vec<ElemType> = cols.iter().map(|c| c.elem_type()).collect();
    Ok(build_result_table(key_cols, &key_types, aggs, merged))
}

fn empty_group_table(table: &Table, key_cols: &[i64], aggs: &[AggSpec]) -> Table {
    let mut out = Table::new();
    for &name in key_cols {
        let col = table.col_by_name(name).expect("validated in group_by");
        out.add_col(name, crate::gather::gather_column(col, &[], false));
    }
    for spec in aggs {
        let data = match spec.op {
            AggOp::Count | AggOp::CountDistinct => ColumnData::I64(vec![]),
            _ => ColumnData::F64(vec![]),
        };
        out.add_col(spec.out, Column::new(data));
    }
    out
}

/// Builds the final GROUP BY result table from merged per-group rows.
/// `key_types` is the *logical* element type of each key column — for a
/// parted/MAPCOMMON driver column this is its base type
/// ([`Column::parted_basetype`]), not [`ElemType::Parted`]/[`ElemType::MapCommon`]
/// itself, since the key values [`key_part`] extracted came from the
/// base-typed segments.
pub(crate) fn build_result_table(
    key_cols: &[i64],
    key_types: &[ElemType],
    aggs: &[AggSpec],
    rows: Vec<GroupRow>,
) -> Table {
    let mut out = Table::new();
    for (ki, &name) in key_cols.iter().enumerate() {
        out.add_col(name, rebuild_key_column(key_types[ki], &rows, ki));
    }
    for (ai, spec) in aggs.iter().enumerate() {
        let is_count = matches!(spec.op, AggOp::Count | AggOp::CountDistinct);
        let mut f_out = Vec::with_capacity(if is_count { 0 } else { rows.len() });
        let mut i_out = Vec::with_capacity(if is_count { rows.len() } else { 0 });
        for (_, accs) in rows.iter() {
            match accs[ai].clone().finish(spec.op) {
                ReduceVal::F64(v) => f_out.push(v),
                ReduceVal::I64(v) => i_out.push(v),
            }
        }
        let data = if is_count { ColumnData::I64(i_out) } else { ColumnData::F64(f_out) };
        out.add_col(spec.out, Column::new(data));
    }
    out
}

fn rebuild_key_column(elem_type: ElemType, rows: &[GroupRow], key_idx: usize) -> Column {
    let mut nulls = NullBitmap::new(rows.len());
    let mut any_null = false;
    match elem_type {
        ElemType::Str => {
            let v: Vec<Box<str>> = rows
                .iter()
                .enumerate()
                .map(|(i, (k, _))| match &k[key_idx] {
                    KeyPart::Str(s) => s.clone(),
                    KeyPart::Null => {
                        nulls.set(i);
                        any_null = true;
                        Box::from("")
                    }
                    _ => Box::from(""),
                })
                .collect();
            wrap(ColumnData::Str(v), nulls, any_null)
        }
        ElemType::F64 => {
            let v: Vec<f64> = rows
                .iter()
                .enumerate()
                .map(|(i, (k, _))| match k[key_idx] {
                    KeyPart::Bits(b) => f64::from_bits(b),
                    KeyPart::Null => {
                        nulls.set(i);
                        any_null = true;
                        0.0
                    }
                    _ => 0.0,
                })
                .collect();
            wrap(ColumnData::F64(v), nulls, any_null)
        }
        ElemType::Sym => {
            let ids: Vec<i64> = rows
                .iter()
                .enumerate()
                .map(|(i, (k, _))| match k[key_idx] {
                    KeyPart::I64(v) => v,
                    KeyPart::Null => {
                        nulls.set(i);
                        any_null = true;
                        -1
                    }
                    _ => -1,
                })
                .collect();
            wrap(ColumnData::Sym(SymWidth::from_ids(&ids)), nulls, any_null)
        }
        _ => {
            let v: Vec<i64> = rows
                .iter()
                .enumerate()
                .map(|(i, (k, _))| match k[key_idx] {
                    KeyPart::I64(v) => v,
                    KeyPart::Null => {
                        nulls.set(i);
                        any_null = true;
                        0
                    }
                    _ => 0,
                })
                .collect();
            wrap(ColumnData::I64(v), nulls, any_null)
        }
    }
}

fn wrap(data: ColumnData, nulls: NullBitmap, any_null: bool) -> Column {
    if any_null {
        Column::with_nulls(data, nulls)
    } else {
        Column::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn sample() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 1, 2, 2, 2])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 1.0, 2.0, 3.0])));
        t
    }

    #[test]
    fn sum_and_count_per_group() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let aggs = [
            AggSpec { col: Some(1), op: AggOp::Sum, out: 10 },
            AggSpec { col: None, op: AggOp::Count, out: 11 },
        ];
        let out = group_by(&t, &[0], &aggs, &syms, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 2);
        let mut by_key: HashMap<i64, (f64, i64)> = HashMap::new();
        for r in 0..out.nrows() {
            by_key.insert(out.col(0).read_i64(r), (out.col_by_name(10).unwrap().read_f64(r), out.col_by_name(11).unwrap().read_i64(r)));
        }
        assert_eq!(by_key[&1], (30.0, 2));
        assert_eq!(by_key[&2], (6.0, 3));
    }

    #[test]
    fn avg_uses_decomposed_accumulator() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(4);
        let aggs = [AggSpec { col: Some(1), op: AggOp::Avg, out: 10 }];
        let out = group_by(&t, &[0], &aggs, &syms, &cfg, &pool).unwrap();
        for r in 0..out.nrows() {
            let k = out.col(0).read_i64(r);
            let avg = out.col_by_name(10).unwrap().read_f64(r);
            if k == 1 {
                assert_eq!(avg, 15.0);
            } else {
                assert!((avg - 2.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn empty_table_produces_zero_groups() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![])));
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let aggs = [AggSpec { col: None, op: AggOp::Count, out: 1 }];
        let out = group_by(&t, &[0], &aggs, &syms, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 0);
    }

    #[test]
    fn zero_keys_groups_the_whole_table_into_one_row() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let aggs = [AggSpec { col: Some(1), op: AggOp::Sum, out: 10 }];
        let out = group_by(&t, &[], &aggs, &syms, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 1);
        assert_eq!(out.col_by_name(10).unwrap().read_f64(0), 36.0);
    }

    #[test]
    fn zero_keys_over_empty_table_still_emits_one_row() {
        let mut t = Table::new();
        t.add_col(1, Column::new(ColumnData::F64(vec![])));
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let aggs = [AggSpec { col: Some(1), op: AggOp::Sum, out: 10 }];
        let out = group_by(&t, &[], &aggs, &syms, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 1);
        assert_eq!(out.col_by_name(10).unwrap().read_f64(0), 0.0);
    }

    #[test]
    fn sample_stddev_per_group_is_nan_for_singleton_groups() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 1, 2])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 5.0])));
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let aggs = [AggSpec { col: Some(1), op: AggOp::Stddev, out: 10 }];
        let out = group_by(&t, &[0], &aggs, &syms, &cfg, &pool).unwrap();
        for r in 0..out.nrows() {
            let k = out.col(0).read_i64(r);
            let v = out.col_by_name(10).unwrap().read_f64(r);
            if k == 2 {
                assert!(v.is_nan(), "singleton group's sample stddev must be NaN, got {v}");
            } else {
                assert!(v.is_finite());
            }
        }
    }
}
