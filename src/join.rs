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

//! Hash join (spec.md §4.11): a parallel chain build on the right side
//! (atomic CAS-linked buckets, contention-free per-row `next` pointers)
//! followed by a probe on the left, morsel-dispatched across the pool —
//! each morsel accumulates its own `(l_idx, r_idx)` pairs locally, and the
//! morsels are concatenated back in order once every task has returned.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::gather::gather_table;
use crate::pool::Pool;
use crate::table::{Column, Table};

const JHT_EMPTY: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner = 0,
    Left = 1,
    Full = 2,
}

/// Typed key load per spec.md §4.11: `F64` compares bitwise (no NaN-aware
/// equality — NaN ≠ NaN, matching [`crate::reduce`]'s COUNT_DISTINCT
/// quirk), every other type loads as `i64`.
#[inline]
fn key_bits(col: &Column, row: usize) -> u64 {
    if col.elem_type() == crate::table::ElemType::F64 {
        col.read_f64(row).to_bits()
    } else if col.is_sym() {
        col.read_sym_id(row) as u64
    } else {
        col.read_i64(row) as u64
    }
}

fn hash_row(cols: &[&Column], row: usize) -> u64 {
    let mut h = 0xcbf29ce484222325u64;
    for c in cols {
        let k = key_bits(c, row);
        h ^= k;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

fn row_key_eq(left: &[&Column], lrow: usize, right: &[&Column], rrow: usize) -> bool {
    left.iter()
        .zip(right)
        .all(|(l, r)| key_bits(l, lrow) == key_bits(r, rrow))
}

struct ChainTable {
    head: Vec<AtomicU32>,
    next: Vec<AtomicU32>,
    mask: u64,
}

impl ChainTable {
    fn build(right_cols: &[&Column], right_rows: usize, cfg: &ExecConfig, pool: &Pool) -> Self {
        let cap = (right_rows.max(1) * 2).next_power_of_two();
        let head: Vec<AtomicU32> = (0..cap).map(|_| AtomicU32::new(JHT_EMPTY)).collect();
        let next: Vec<AtomicU32> = (0..right_rows).map(|_| AtomicU32::new(JHT_EMPTY)).collect();
        let mask = (cap as u64) - 1;
        pool.dispatch(right_rows, cfg, |_worker, start, end| {
            for row in start..end {
                let h = hash_row(right_cols, row) & mask;
                let slot = &head[h as usize];
                let mut cur = slot.load(Ordering::Acquire);
                loop {
                    next[row].store(cur, Ordering::Relaxed);
                    match slot.compare_exchange_weak(cur, row as u32, Ordering::AcqRel, Ordering::Acquire) {
                        Ok(_) => break,
                        Err(actual) => cur = actual,
                    }
                }
            }
        });
        ChainTable { head, next, mask }
    }

    fn bucket_rows(&self, h: u64) -> impl Iterator<Item = u32> + '_ {
        let mut cur = self.head[(h & self.mask) as usize].load(Ordering::Acquire);
        std::iter::from_fn(move || {
            if cur == JHT_EMPTY {
                None
            } else {
                let r = cur;
                cur = self.next[r as usize].load(Ordering::Acquire);
                Some(r)
            }
        })
    }
}

/// `INNER (0) / LEFT (1) / FULL OUTER (2)` hash join on `left_keys`/
/// `right_keys`. Output is `left` columns followed by `right` columns
/// (non-key columns only from `right` need to be supplied by the caller
/// via `right_payload`; key columns are emitted once, from `left`).
pub fn hash_join(
    left: &Table,
    left_keys: &[i64],
    right: &Table,
    right_keys: &[i64],
    join_type: JoinType,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Table> {
    if left_keys.len() != right_keys.len() || left_keys.is_empty() {
        return Err(Error::Domain);
    }
    let left_cols: Vec<&Column> = left_keys
        .iter()
        .map(|n| left.col_by_name(*n).ok_or(Error::Schema))
        .collect::<Result<_>>()?;
    let right_cols: Vec<&Column> = right_keys
        .iter()
        .map(|n| right.col_by_name(*n).ok_or(Error::Schema))
        .collect::<Result<_>>()?;

    let right_rows = right.nrows();
    let left_rows = left.nrows();
    if right_rows > (u32::MAX - 1) as usize {
        return Err(Error::Domain);
    }

    if right_rows == 0 {
        return Ok(match join_type {
            JoinType::Inner => empty_join_result(left, right),
            JoinType::Left | JoinType::Full => {
                let l_idx: Vec<i64> = (0..left_rows as i64).collect();
                let r_idx: Vec<i64> = vec![-1; left_rows];
                return Ok(build_join_table(left, right, &l_idx, &r_idx, join_type));
            }
        });
    }
    if left_rows == 0 && join_type != JoinType::Full {
        return Ok(empty_join_result(left, right));
    }

    tracing::debug!(left_rows, right_rows, ?join_type, "hash join: build phase");
    let ht = ChainTable::build(&right_cols, right_rows, cfg, pool);

    let matched_right: Vec<AtomicU32> = if join_type == JoinType::Full {
        (0..right_rows).map(|_| AtomicU32::new(0)).collect()
    } else {
        Vec::new()
    };

    // Two-pass probe, morsels of `join_probe_morsel` rows (spec.md §4.11).
    // Rather than precompute per-morsel offsets into a shared output array,
    // each morsel task builds its own local pair list (no aliasing, no
    // unsafe); the barrier in `dispatch_n` means every task has finished by
    // the time the morsels are concatenated back in order below.
    let morsel = cfg.join_probe_morsel.max(1);
    let n_morsels = left_rows.div_ceil(morsel).max(1);
    let partials: std::sync::Mutex<Vec<(usize, Vec<(i64, i64)>)>> = std::sync::Mutex::new(Vec::new());
    pool.dispatch_n(n_morsels, |_w, m, _| {
        let start = m * morsel;
        let end = (start + morsel).min(left_rows);
        let mut pairs = Vec::new();
        for lrow in start..end {
            let h = hash_row(&left_cols, lrow);
            let mut any = false;
            for r in ht.bucket_rows(h) {
                if row_key_eq(&left_cols, lrow, &right_cols, r as usize) {
                    any = true;
                    if !matched_right.is_empty() {
                        matched_right[r as usize].store(1, Ordering::Relaxed);
                    }
                    pairs.push((lrow as i64, r as i64));
                }
            }
            if !any && join_type != JoinType::Inner {
                pairs.push((lrow as i64, -1));
            }
        }
        partials.lock().unwrap().push((m, pairs));
    });
    let mut ordered = partials.into_inner().unwrap();
    ordered.sort_by_key(|(m, _)| *m);
    let pair_count: usize = ordered.iter().map(|(_, p)| p.len()).sum();
    let mut l_idx = Vec::with_capacity(pair_count);
    let mut r_idx = Vec::with_capacity(pair_count);
    for (_, pairs) in ordered {
        for (l, r) in pairs {
            l_idx.push(l);
            r_idx.push(r);
        }
    }

    if join_type == JoinType::Full {
        let mut extra_l = Vec::new();
        let mut extra_r = Vec::new();
        for r in 0..right_rows {
            if matched_right[r].load(Ordering::Relaxed) == 0 {
                extra_l.push(-1);
                extra_r.push(r as i64);
            }
        }
        l_idx.extend(extra_l);
        r_idx.extend(extra_r);
    }

    tracing::debug!(out_rows = l_idx.len(), "hash join: probe phase complete");
    Ok(build_join_table(left, right, &l_idx, &r_idx, join_type))
}

fn empty_join_result(left: &Table, right: &Table) -> Table {
    build_join_table(left, right, &[], &[], JoinType::Inner)
}

fn build_join_table(left: &Table, right: &Table, l_idx: &[i64], r_idx: &[i64], join_type: JoinType) -> Table {
    let left_nullable = join_type == JoinType::Full;
    let right_nullable = join_type != JoinType::Inner;
    let mut out = gather_table(left, l_idx, left_nullable);
    let right_gathered = gather_table(right, r_idx, right_nullable);
    for (name, col) in right_gathered.cols() {
        if out.col_by_name(*name).is_none() {
            out.add_col(*name, col.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn left_table() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 1, 2, 3])));
        t.add_col(1, Column::new(ColumnData::Str(vec![
            Box::from("l0"), Box::from("l1"), Box::from("l2"), Box::from("l3"),
        ])));
        t
    }

    fn right_table() -> Table {
        let mut t = Table::new();
        t.add_col(2, Column::new(ColumnData::I64(vec![1, 3, 4])));
        t.add_col(3, Column::new(ColumnData::Str(vec![
            Box::from("a"), Box::from("c"), Box::from("d"),
        ])));
        t
    }

    #[test]
    fn inner_join_drops_unmatched_keys() {
        let left = left_table();
        let right = right_table();
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let out = hash_join(&left, &[0], &right, &[2], JoinType::Inner, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 3);
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_with_nulls() {
        let left = left_table();
        let right = right_table();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let out = hash_join(&left, &[0], &right, &[2], JoinType::Left, &cfg, &pool).unwrap();
        assert_eq!(out.nrows(), 4);
        let key2_rows: Vec<usize> = (0..out.nrows()).filter(|&r| out.col(0).read_i64(r) == 2).collect();
        assert_eq!(key2_rows.len(), 1);
        assert!(out.col_by_name(3).unwrap().is_null(key2_rows[0]));
    }

    #[test]
    fn full_join_includes_unmatched_right_rows() {
        let left = left_table();
        let right = right_table();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let out = hash_join(&left, &[0], &right, &[2], JoinType::Full, &cfg, &pool).unwrap();
        // 3 matched (k=1 x2, k=3) + 1 unmatched left (k=2) + 1 unmatched right (k=4)
        assert_eq!(out.nrows(), 5);
    }

    #[test]
    fn empty_right_side_inner_is_empty_left_keeps_all() {
        let left = left_table();
        let mut empty_right = Table::new();
        empty_right.add_col(2, Column::new(ColumnData::I64(vec![])));
        empty_right.add_col(3, Column::new(ColumnData::Str(vec![])));
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let inner = hash_join(&left, &[0], &empty_right, &[2], JoinType::Inner, &cfg, &pool).unwrap();
        assert_eq!(inner.nrows(), 0);
        let left_join = hash_join(&left, &[0], &empty_right, &[2], JoinType::Left, &cfg, &pool).unwrap();
        assert_eq!(left_join.nrows(), 4);
    }
}
