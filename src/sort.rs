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

//! SORT (spec.md §4.9): insertion sort for small inputs, an 8-pass LSB
//! radix sort on a bit-encoded u64 key for the single-key numeric/SYM
//! fast path (extended to multi-key sorts whose per-key ranges bit-pack
//! into a single 64-bit word, primary key in the high bits), a
//! comparator-driven parallel merge sort as the fallback when the
//! combined key width doesn't fit, and a heap-based top-N fusion for
//! SORT∘HEAD.

use std::collections::{BinaryHeap, HashMap};

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::gather::gather_table;
use crate::pool::Pool;
use crate::symtab::SymbolTable;
use crate::table::{Column, ElemType, Table};

#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub col: i64,
    pub desc: bool,
}

/// Monotonic float -> sortable-u64 transform: flips all bits for negative
/// floats, sets the sign bit for non-negative ones, so unsigned comparison
/// matches IEEE-754 total order (NaN maps to the maximum key, sorting
/// last regardless of direction).
fn encode_f64(v: f64) -> u64 {
    if v.is_nan() {
        return u64::MAX;
    }
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

fn encode_i64(v: i64) -> u64 {
    (v as u64) ^ (1 << 63)
}

/// Per-column encoded sort key plus a null mask (nulls always compare as
/// the maximum key, so they sort last under both ASC and DESC).
struct EncodedKey {
    keys: Vec<u64>,
    is_null: Vec<bool>,
}

fn encode_column(col: &Column, syms: &SymbolTable) -> EncodedKey {
    let n = col.len();
    let mut is_null = vec![false; n];
    for row in 0..n {
        is_null[row] = col.is_null(row);
    }
    let keys = match col.elem_type() {
        ElemType::F64 => (0..n).map(|r| if is_null[r] { u64::MAX } else { encode_f64(col.read_f64(r)) }).collect(),
        ElemType::Sym => encode_sym_ranked(col, syms, &is_null),
        ElemType::Str => encode_str_ranked(col, &is_null),
        _ => (0..n).map(|r| if is_null[r] { u64::MAX } else { encode_i64(col.read_i64(r)) }).collect(),
    };
    EncodedKey { keys, is_null }
}

/// SYM rank-mapping: resolve each distinct intern id present to its
/// string once, rank ids by string order, then key each row by its id's
/// rank rather than its (insertion-order) intern id — otherwise SORT on
/// a SYM column would order by interning history, not lexical order.
fn encode_sym_ranked(col: &Column, syms: &SymbolTable, is_null: &[bool]) -> Vec<u64> {
    let n = col.len();
    let mut distinct: Vec<i64> = (0..n)
        .filter(|&r| !is_null[r])
        .map(|r| col.read_sym_id(r))
        .collect();
    distinct.sort_unstable();
    distinct.dedup();
    let mut with_strings: Vec<(i64, Box<str>)> = distinct.iter().map(|&id| (id, syms.str(id))).collect();
    with_strings.sort_by(|a, b| a.1.cmp(&b.1));
    let rank: HashMap<i64, u64> = with_strings
        .into_iter()
        .enumerate()
        .map(|(rank, (id, _))| (id, rank as u64))
        .collect();
    (0..n)
        .map(|r| if is_null[r] { u64::MAX } else { rank[&col.read_sym_id(r)] })
        .collect()
}

fn encode_str_ranked(col: &Column, is_null: &[bool]) -> Vec<u64> {
    let n = col.len();
    let mut distinct: Vec<&str> = (0..n).filter(|&r| !is_null[r]).map(|r| col.read_str(r)).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let rank: HashMap<&str, u64> = distinct.into_iter().enumerate().map(|(i, s)| (s, i as u64)).collect();
    (0..n)
        .map(|r| if is_null[r] { u64::MAX } else { rank[col.read_str(r)] })
        .collect()
}

/// Stable 8-pass LSB radix sort over `keys`, returning the permutation
/// that would sort `keys` ascending. One pass per byte, 256-bucket
/// counting sort each.
fn radix_sort_permutation(keys: &[u64]) -> Vec<i64> {
    let n = keys.len();
    let mut perm: Vec<u32> = (0..n as u32).collect();
    let mut scratch: Vec<u32> = vec![0; n];
    let mut cur = &mut perm[..];
    let mut next = &mut scratch[..];
    for byte in 0..8 {
        let shift = byte * 8;
        let mut counts = [0usize; 257];
        for &p in cur.iter() {
            let b = ((keys[p as usize] >> shift) & 0xff) as usize;
            counts[b + 1] += 1;
        }
        for i in 1..257 {
            counts[i] += counts[i - 1];
        }
        for &p in cur.iter() {
            let b = ((keys[p as usize] >> shift) & 0xff) as usize;
            next[counts[b]] = p;
            counts[b] += 1;
        }
        std::mem::swap(&mut cur, &mut next);
    }
    cur.iter().map(|&p| p as i64).collect()
}

/// Number of bits needed to represent `0..=max` as an unsigned value.
fn bits_for_max(max: u64) -> u32 {
    if max == 0 {
        1
    } else {
        64 - max.leading_zeros()
    }
}

/// Multi-key radix encoder (spec.md §4.9): bit-packs each key's encoded
/// range into its own slice of a 64-bit word, primary key in the high
/// bits, after a per-key min/max prescan over [`encode_column`]'s output.
/// Each key's non-null values are remapped to `0..=range` (DESC keys
/// complemented within that range); a null is remapped to `range + 1`,
/// one past every non-null value, so it sorts last for that key
/// regardless of direction, matching [`compare_rows`]. Returns `None`
/// (falls back to the comparator-based merge sort) when a key column
/// can't be resolved, carries an un-rankable element type, or the
/// combined key width exceeds 64 bits.
fn composite_radix_keys(table: &Table, keys: &[SortKey], syms: &SymbolTable) -> Option<Vec<u64>> {
    let n = table.nrows();
    if n == 0 {
        return Some(Vec::new());
    }
    let mut encoded_per_key = Vec::with_capacity(keys.len());
    for k in keys {
        let col = table.col_by_name(k.col)?;
        if matches!(col.elem_type(), ElemType::Table | ElemType::Parted | ElemType::MapCommon) {
            return None;
        }
        encoded_per_key.push(encode_column(col, syms));
    }

    let mut widths = Vec::with_capacity(keys.len());
    let mut ranges = Vec::with_capacity(keys.len());
    for enc in &encoded_per_key {
        let any_null = enc.is_null.iter().any(|&b| b);
        let mut min = u64::MAX;
        let mut max = 0u64;
        let mut any_non_null = false;
        for (row, &v) in enc.keys.iter().enumerate() {
            if enc.is_null[row] {
                continue;
            }
            any_non_null = true;
            min = min.min(v);
            max = max.max(v);
        }
        let range = if any_non_null { max - min } else { 0 };
        let max_slot = if any_null { range + 1 } else { range };
        widths.push(bits_for_max(max_slot));
        ranges.push((min, range));
    }
    let total_bits: u32 = widths.iter().sum();
    if total_bits > 64 {
        return None;
    }

    let mut packed = vec![0u64; n];
    let mut shift = 64u32;
    for (ki, enc) in encoded_per_key.iter().enumerate() {
        let width = widths[ki];
        shift -= width;
        let (min, range) = ranges[ki];
        let desc = keys[ki].desc;
        for row in 0..n {
            let slot = if enc.is_null[row] {
                range + 1
            } else {
                let v = enc.keys[row] - min;
                if desc {
                    range - v
                } else {
                    v
                }
            };
            packed[row] |= slot << shift;
        }
    }
    Some(packed)
}

/// Build the full permutation for a SORT over `keys`, dispatching to
/// insertion sort / single-key radix / multi-key radix / multi-key merge
/// sort by size and key count (spec.md §4.9).
pub fn sort_indices(
    table: &Table,
    keys: &[SortKey],
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Vec<i64>> {
    if keys.is_empty() {
        return Err(Error::Domain);
    }
    let n = table.nrows();
    if n <= cfg.sort_insertion_cutoff {
        return Ok(insertion_sort_indices(table, keys, syms)?);
    }
    if keys.len() == 1 {
        let col = table.col_by_name(keys[0].col).ok_or(Error::Schema)?;
        let encoded = encode_column(col, syms);
        let mut effective: Vec<u64> = encoded.keys.clone();
        if keys[0].desc {
            for (v, &is_null) in effective.iter_mut().zip(&encoded.is_null) {
                if !is_null {
                    *v = !*v;
                }
            }
        }
        return Ok(radix_sort_permutation(&effective));
    }
    if let Some(packed) = composite_radix_keys(table, keys, syms) {
        return Ok(radix_sort_permutation(&packed));
    }
    Ok(parallel_merge_sort(table, keys, syms, cfg, pool)?)
}

fn compare_rows(table: &Table, keys: &[SortKey], syms: &SymbolTable, a: usize, b: usize) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    for k in keys {
        let col = table.col_by_name(k.col).expect("sort key column resolved at compile time");
        let (na, nb) = (col.is_null(a), col.is_null(b));
        let ord = if na || nb {
            // Nulls sort last regardless of direction.
            match (na, nb) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => unreachable!(),
            }
        } else {
            match col.elem_type() {
                ElemType::Str => col.read_str(a).cmp(col.read_str(b)),
                ElemType::Sym => syms.str(col.read_sym_id(a)).cmp(&syms.str(col.read_sym_id(b))),
                ElemType::F64 => col
                    .read_f64(a)
                    .partial_cmp(&col.read_f64(b))
                    .unwrap_or(Ordering::Equal),
                _ => col.read_i64(a).cmp(&col.read_i64(b)),
            }
        };
        let ord = if k.desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn insertion_sort_indices(table: &Table, keys: &[SortKey], syms: &SymbolTable) -> Result<Vec<i64>> {
    for k in keys {
        table.col_by_name(k.col).ok_or(Error::Schema)?;
    }
    let mut idx: Vec<i64> = (0..table.nrows() as i64).collect();
    idx.sort_by(|&a, &b| compare_rows(table, keys, syms, a as usize, b as usize));
    Ok(idx)
}

/// Comparator-driven parallel merge sort: split rows into `n_workers`
/// chunks, sort each chunk independently (in parallel, via the pool),
/// then merge the sorted chunks sequentially.
fn parallel_merge_sort(
    table: &Table,
    keys: &[SortKey],
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Vec<i64>> {
    for k in keys {
        table.col_by_name(k.col).ok_or(Error::Schema)?;
    }
    let n = table.nrows();
    let n_workers = pool.total_workers().min(n.max(1));
    let chunk = n.div_ceil(n_workers.max(1));
    let mut chunks: Vec<Vec<i64>> = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        for w in 0..n_workers {
            let start = w * chunk;
            let end = (start + chunk).min(n);
            if start >= end {
                continue;
            }
            let table = &table;
            let keys = &keys;
            let syms = &syms;
            handles.push(scope.spawn(move || {
                let mut idx: Vec<i64> = (start as i64..end as i64).collect();
                idx.sort_by(|&a, &b| compare_rows(table, keys, syms, a as usize, b as usize));
                idx
            }));
        }
        for h in handles {
            chunks.push(h.join().expect("sort worker panicked"));
        }
    });
    let _ = cfg;
    Ok(k_way_merge(chunks, |a, b| compare_rows(table, keys, syms, a as usize, b as usize)))
}

fn k_way_merge(chunks: Vec<Vec<i64>>, cmp: impl Fn(i64, i64) -> std::cmp::Ordering) -> Vec<i64> {
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let mut cursors = vec![0usize; chunks.len()];
    let mut out = Vec::with_capacity(total);
    loop {
        let mut best: Option<(usize, i64)> = None;
        for (ci, cursor) in cursors.iter().enumerate() {
            if *cursor >= chunks[ci].len() {
                continue;
            }
            let v = chunks[ci][*cursor];
            best = match best {
                None => Some((ci, v)),
                Some((_, bv)) if cmp(v, bv) == std::cmp::Ordering::Less => Some((ci, v)),
                other => other,
            };
        }
        match best {
            Some((ci, v)) => {
                out.push(v);
                cursors[ci] += 1;
            }
            None => break,
        }
    }
    out
}

pub fn sort_table(table: &Table, keys: &[SortKey], syms: &SymbolTable, cfg: &ExecConfig, pool: &Pool) -> Result<Table> {
    let idx = sort_indices(table, keys, syms, cfg, pool)?;
    Ok(gather_table(table, &idx, false))
}

/// A row's composite sort key, encoded so plain `Vec<u64>` lexicographic
/// comparison matches [`compare_rows`]'s semantics (direction-complemented
/// per key, nulls forced to the maximum so they always sort last).
#[derive(Eq, PartialEq)]
struct RowOrdKey {
    composite: Vec<u64>,
    row: i64,
}

impl PartialOrd for RowOrdKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for RowOrdKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.composite.cmp(&other.composite)
    }
}

fn encode_composite_keys(table: &Table, keys: &[SortKey], syms: &SymbolTable) -> Vec<Vec<u64>> {
    let n = table.nrows();
    let per_key: Vec<EncodedKey> = keys
        .iter()
        .map(|k| encode_column(table.col_by_name(k.col).expect("resolved above"), syms))
        .collect();
    (0..n)
        .map(|row| {
            keys.iter()
                .zip(per_key.iter())
                .map(|(k, enc)| {
                    let v = enc.keys[row];
                    if enc.is_null[row] {
                        u64::MAX
                    } else if k.desc {
                        !v
                    } else {
                        v
                    }
                })
                .collect()
        })
        .collect()
}

/// SORT ∘ HEAD fusion: maintain a bounded max-heap of size `limit` over
/// the predicate's key ordering instead of sorting every row and slicing
/// (spec.md §4.9's "top-N heap fusion"). Triggered by callers when
/// `limit <= cfg.topn_fusion_max_limit` and `n > 8 * limit`.
pub fn sort_topn(
    table: &Table,
    keys: &[SortKey],
    limit: usize,
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Table> {
    for k in keys {
        table.col_by_name(k.col).ok_or(Error::Schema)?;
    }
    if limit == 0 || table.nrows() == 0 {
        return Ok(table.empty_like());
    }
    let n = table.nrows();
    if limit >= n || limit > cfg.topn_fusion_max_limit || n <= 8 * limit {
        let idx = sort_indices(table, keys, syms, cfg, pool)?;
        let top: Vec<i64> = idx.into_iter().take(limit).collect();
        return Ok(gather_table(table, &top, false));
    }
    let composite = encode_composite_keys(table, keys, syms);
    // Max-heap on encoded key: once full, the worst-kept row (the heap's
    // max) is evicted whenever a smaller key arrives.
    let mut heap: BinaryHeap<RowOrdKey> = BinaryHeap::with_capacity(limit);
    for row in 0..n {
        let key = RowOrdKey { composite: composite[row].clone(), row: row as i64 };
        if heap.len() < limit {
            heap.push(key);
        } else if let Some(worst) = heap.peek() {
            if key < *worst {
                heap.pop();
                heap.push(key);
            }
        }
    }
    let mut rows: Vec<i64> = heap.into_iter().map(|k| k.row).collect();
    rows.sort_by(|&a, &b| compare_rows(table, keys, syms, a as usize, b as usize));
    Ok(gather_table(table, &rows, false))
}
