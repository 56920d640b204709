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

//! Parted/MAPCOMMON dispatch (spec.md §4.10, §3): a parted column is a
//! fixed array of segment columns concatenated in logical row order; a
//! MAPCOMMON column is the same idea with the per-partition value held
//! once and paired with a row count instead of being repeated per row.
//! `exec_group_parted` routes `OP_GROUP` here whenever any key or
//! aggregate-input column is parted or MAPCOMMON, processing partitions in
//! batches so only a handful of per-partition sub-tables are ever live at
//! once, then folding every partition's result into the same
//! accumulate-then-merge machinery [`crate::group`] uses for a flat table —
//! decomposed (sum, sum-of-squares, count) accumulators merge with a plain
//! componentwise add, so AVG/STDDEV/VAR never need a dedicated per-partition
//! reconstruction step.

use std::sync::Mutex;

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::gather::gather_table;
use crate::group::{self, AggSpec, PartialGroup};
use crate::pool::Pool;
use crate::symtab::SymbolTable;
use crate::table::{Column, ColumnData, ElemType, Table};

/// Partitions are folded in batches of this size (spec.md §4.10) so the
/// working set stays bounded to a handful of materialized sub-tables
/// rather than one per partition.
const PARTED_BATCH: usize = 8;

fn partition_lengths(col: &Column) -> Option<Vec<usize>> {
    match col.data() {
        ColumnData::Parted(segs) => Some(segs.iter().map(|s| s.len()).collect()),
        ColumnData::MapCommon { counts, .. } => Some(counts.iter().map(|&c| c as usize).collect()),
        _ => None,
    }
}

fn effective_elem_type(col: &Column) -> ElemType {
    col.parted_basetype().unwrap_or_else(|| col.elem_type())
}

/// True when `OP_GROUP` over `key_cols`/`aggs` touches a parted or
/// MAPCOMMON column and should route through [`exec_group_parted`] instead
/// of [`crate::group::group_by`].
pub fn is_parted_group(table: &Table, key_cols: &[i64], aggs: &[AggSpec]) -> bool {
    let touches = |name: i64| {
        table
            .col_by_name(name)
            .is_some_and(|c| c.is_parted() || c.is_mapcommon())
    };
    key_cols.iter().any(|&n| touches(n)) || aggs.iter().any(|a| a.col.is_some_and(touches))
}

/// GROUP BY over a table with at least one parted/MAPCOMMON column.
/// Finds the partition boundaries from the first such column (every
/// parted/MAPCOMMON column on the table is assumed to share the same
/// partitioning — the invariant spec.md §3 names for a parted column's
/// row order), gathers each partition's rows into its own small table,
/// and accumulates it with [`crate::group::local_accumulate`] exactly as
/// a flat worker range would.
pub fn exec_group_parted(
    table: &Table,
    key_cols: &[i64],
    aggs: &[AggSpec],
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Table> {
    if key_cols.is_empty() {
        return Err(Error::Domain);
    }
    let key_col_refs: Vec<&Column> = key_cols
        .iter()
        .map(|&n| table.col_by_name(n).ok_or(Error::Schema))
        .collect::<Result<_>>()?;

    let driver_name = key_cols
        .iter()
        .copied()
        .chain(aggs.iter().filter_map(|a| a.col))
        .find(|&n| {
            table
                .col_by_name(n)
                .is_some_and(|c| c.is_parted() || c.is_mapcommon())
        });
    let Some(driver_name) = driver_name else {
        return group::group_by(table, key_cols, aggs, syms, cfg, pool);
    };
    let driver = table.col_by_name(driver_name).expect("checked above");
    let lengths = partition_lengths(driver).expect("driver column checked parted/mapcommon above");

    if lengths.is_empty() || table.nrows() == 0 {
        let key_types: Vec<ElemType> = key_col_refs.iter().map(|c| effective_elem_type(c)).collect();
        return Ok(group::build_result_table(key_cols, &key_types, aggs, Vec::new()));
    }

    let mut ranges = Vec::with_capacity(lengths.len());
    let mut offset = 0usize;
    for len in lengths {
        ranges.push(offset..offset + len);
        offset += len;
    }
    debug_assert_eq!(offset, table.nrows(), "parted segment lengths must sum to table row count");

    let n_partitions = ranges.len();
    tracing::debug!(n_partitions, "parted group-by: dispatching partitions");
    let mut all_partials: Vec<PartialGroup> = Vec::with_capacity(n_partitions);
    let mut batch_start = 0;
    while batch_start < n_partitions {
        let batch_end = (batch_start + PARTED_BATCH).min(n_partitions);
        let batch_len = batch_end - batch_start;
        tracing::trace!(batch_start, batch_len, "parted group-by: batch dispatched");
        let results: Mutex<Vec<(usize, PartialGroup)>> = Mutex::new(Vec::with_capacity(batch_len));
        pool.dispatch_n(batch_len, |_worker, task, _| {
            let p = batch_start + task;
            let range = ranges[p].clone();
            let idx: Vec<i64> = range.map(|r| r as i64).collect();
            let sub = gather_table(table, &idx, false);
            let sub_key_cols: Vec<&Column> = key_cols
                .iter()
                .map(|&n| sub.col_by_name(n).expect("key column present in gathered partition"))
                .collect();
            let n = sub.nrows();
            let partial = group::local_accumulate(&sub, &sub_key_cols, aggs, 0..n);
            results.lock().unwrap().push((task, partial));
        });
        let mut batch_results = results.into_inner().unwrap();
        batch_results.sort_by_key(|(t, _)| *t);
        all_partials.extend(batch_results.into_iter().map(|(_, p)| p));
        batch_start = batch_end;
    }

    let merged = group::merge_partials(all_partials);
    let key_types: Vec<ElemType> = key_col_refs.iter().map(|c| effective_elem_type(c)).collect();
    Ok(group::build_result_table(key_cols, &key_types, aggs, merged))
}
