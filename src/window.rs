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

//! Window functions (spec.md §4.12): sort by `(partition keys, order
//! keys)` using the same machinery [`crate::sort`] uses for `ORDER BY`,
//! detect partition boundaries in the sorted order, then run one
//! sequential accumulate pass per partition (dispatched across the pool),
//! writing results back by original row index so the output stays
//! row-aligned with the input table.

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::sort::{sort_indices, SortKey};
use crate::symtab::SymbolTable;
use crate::table::{Column, ColumnData, Table};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFunc {
    RowNumber,
    Rank,
    DenseRank,
    Ntile,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Lag,
    Lead,
    FirstValue,
    LastValue,
    NthValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Aggregate over the whole partition.
    UnboundedToUnbounded,
    /// Running aggregate: `UNBOUNDED PRECEDING` to current row.
    UnboundedToCurrent,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    pub func: WindowFunc,
    /// Input column for value-carrying functions; ignored by `RowNumber`/
    /// `Rank`/`DenseRank`.
    pub input: Option<i64>,
    /// `NTILE(n)` bucket count, `LAG`/`LEAD` offset, `NTH_VALUE(n)` index
    /// (1-based).
    pub param: i64,
    pub frame: FrameType,
    pub out: i64,
}

fn is_f64_output(spec: &WindowSpec, table: &Table) -> bool {
    match spec.func {
        WindowFunc::Avg => true,
        WindowFunc::RowNumber | WindowFunc::Rank | WindowFunc::DenseRank | WindowFunc::Ntile | WindowFunc::Count => {
            false
        }
        _ => spec
            .input
            .and_then(|name| table.col_by_name(name))
            .map(|c| c.elem_type() == crate::table::ElemType::F64)
            .unwrap_or(false),
    }
}

fn keys_differ(table: &Table, keys: &[i64], a: usize, b: usize) -> bool {
    keys.iter().any(|&name| {
        let col = table.col_by_name(name).expect("resolved at compile time");
        col.is_null(a) != col.is_null(b)
            || (!col.is_null(a)
                && match col.elem_type() {
                    crate::table::ElemType::Str => col.read_str(a) != col.read_str(b),
                    crate::table::ElemType::F64 => col.read_f64(a).to_bits() != col.read_f64(b).to_bits(),
                    _ => col.read_i64(a) != col.read_i64(b),
                })
    })
}

/// Run every spec in `specs` over `table`, partitioned by `part_keys` and
/// ordered by `order_keys` (both column name lists). Returns `table` with
/// one additional output column per spec.
pub fn exec_window(
    table: &Table,
    part_keys: &[i64],
    order_keys: &[i64],
    specs: &[WindowSpec],
    syms: &SymbolTable,
    cfg: &ExecConfig,
    pool: &Pool,
) -> Result<Table> {
    for &k in part_keys.iter().chain(order_keys) {
        table.col_by_name(k).ok_or(Error::Schema)?;
    }
    let n = table.nrows();
    let sort_keys: Vec<SortKey> = part_keys
        .iter()
        .chain(order_keys)
        .map(|&col| SortKey { col, desc: false })
        .collect();
    let order: Vec<i64> = if sort_keys.is_empty() {
        (0..n as i64).collect()
    } else {
        sort_indices(table, &sort_keys, syms, cfg, pool)?
    };

    // Partition boundaries: a new partition starts wherever any partition
    // key differs from the previous sorted row.
    let mut starts = vec![0usize];
    for i in 1..n {
        let (prev, cur) = (order[i - 1] as usize, order[i] as usize);
        if keys_differ(table, part_keys, prev, cur) {
            starts.push(i);
        }
    }
    starts.push(n);

    let mut out = table.clone();
    for spec in specs {
        let f64_out = is_f64_output(spec, table);
        let mut f_res = vec![0.0f64; if f64_out { n } else { 0 }];
        let mut i_res = vec![0i64; if f64_out { 0 } else { n }];
        let partitions: Vec<(usize, usize)> = starts.windows(2).map(|w| (w[0], w[1])).collect();
        let results: std::sync::Mutex<Vec<(usize, usize, Vec<f64>, Vec<i64>)>> =
            std::sync::Mutex::new(Vec::with_capacity(partitions.len()));
        pool.dispatch_n(partitions.len(), |_w, task, _| {
            let (ps, pe) = partitions[task];
            let (fv, iv) = run_partition(table, &order[ps..pe], spec, order_keys, f64_out);
            results.lock().unwrap().push((ps, pe, fv, iv));
        });
        for (ps, pe, fv, iv) in results.into_inner().unwrap() {
            for (local, global_pos) in (ps..pe).enumerate() {
                let row = order[global_pos] as usize;
                if f64_out {
                    f_res[row] = fv[local];
                } else {
                    i_res[row] = iv[local];
                }
            }
        }
        let data = if f64_out { ColumnData::F64(f_res) } else { ColumnData::I64(i_res) };
        out.add_col(spec.out, Column::new(data));
    }
    Ok(out)
}

/// Sequential per-partition accumulate. `rows` is the partition's slice of
/// the global sorted order (original row indices, in sorted order).
fn run_partition(
    table: &Table,
    rows: &[i64],
    spec: &WindowSpec,
    order_keys: &[i64],
    f64_out: bool,
) -> (Vec<f64>, Vec<i64>) {
    let m = rows.len();
    let mut fv = vec![0.0f64; if f64_out { m } else { 0 }];
    let mut iv = vec![0i64; if f64_out { 0 } else { m }];
    let input = spec.input.and_then(|name| table.col_by_name(name));

    match spec.func {
        WindowFunc::RowNumber => {
            for i in 0..m {
                iv[i] = i as i64 + 1;
            }
        }
        WindowFunc::Rank | WindowFunc::DenseRank => {
            let mut rank = 1i64;
            let mut dense = 1i64;
            for i in 0..m {
                if i > 0 && keys_differ(table, order_keys, rows[i - 1] as usize, rows[i] as usize) {
                    rank = i as i64 + 1;
                    dense += 1;
                }
                iv[i] = if spec.func == WindowFunc::Rank { rank } else { dense };
            }
        }
        WindowFunc::Ntile => {
            let buckets = spec.param.max(1);
            let base = m as i64 / buckets;
            let rem = m as i64 % buckets;
            let mut row = 0usize;
            for b in 0..buckets {
                let size = base + if b < rem { 1 } else { 0 };
                for _ in 0..size {
                    if row < m {
                        iv[row] = b + 1;
                        row += 1;
                    }
                }
            }
        }
        WindowFunc::Count => {
            let mut running = 0i64;
            for i in 0..m {
                let counts = input.map(|c| !c.is_null(rows[i] as usize)).unwrap_or(true);
                if counts {
                    running += 1;
                }
                iv[i] = if spec.frame == FrameType::UnboundedToCurrent {
                    running
                } else {
                    0
                };
            }
            if spec.frame == FrameType::UnboundedToUnbounded {
                let total = running;
                for v in iv.iter_mut() {
                    *v = total;
                }
            }
        }
        WindowFunc::Sum | WindowFunc::Avg => {
            compute_sum_avg(rows, input, spec, &mut fv);
        }
        WindowFunc::Min | WindowFunc::Max => {
            compute_min_max(rows, input, spec, &mut fv);
        }
        WindowFunc::Lag | WindowFunc::Lead => {
            compute_lag_lead(rows, input, spec, f64_out, &mut fv, &mut iv);
        }
        WindowFunc::FirstValue | WindowFunc::LastValue => {
            compute_first_last(rows, input, spec, f64_out, &mut fv, &mut iv);
        }
        WindowFunc::NthValue => {
            compute_nth(rows, input, spec, f64_out, &mut fv, &mut iv);
        }
    }
    (fv, iv)
}

fn compute_sum_avg(rows: &[i64], input: Option<&Column>, spec: &WindowSpec, fv: &mut [f64]) {
    let m = rows.len();
    let running = spec.frame == FrameType::UnboundedToCurrent;
    let mut sum = 0.0;
    let mut count = 0u64;
    let mut per_row = Vec::with_capacity(m);
    for i in 0..m {
        if let Some(c) = input {
            let r = rows[i] as usize;
            if !c.is_null(r) {
                sum += c.read_f64(r);
                count += 1;
            }
        }
        per_row.push((sum, count));
    }
    if !running && count > 0 {
        // Whole-partition aggregate: broadcast the final total to every row.
        let (final_sum, final_count) = per_row[m - 1];
        for i in 0..m {
            fv[i] = match spec.func {
                WindowFunc::Avg => final_sum / final_count as f64,
                _ => final_sum,
            };
        }
        return;
    }
    for i in 0..m {
        let (s, c) = per_row[i];
        fv[i] = match spec.func {
            WindowFunc::Avg => {
                if c == 0 {
                    0.0
                } else {
                    s / c as f64
                }
            }
            _ => s,
        };
    }
}

fn compute_min_max(rows: &[i64], input: Option<&Column>, spec: &WindowSpec, fv: &mut [f64]) {
    let m = rows.len();
    let running = spec.frame == FrameType::UnboundedToCurrent;
    let is_min = spec.func == WindowFunc::Min;
    let mut best = if is_min { f64::INFINITY } else { f64::NEG_INFINITY };
    let mut per_row = Vec::with_capacity(m);
    for i in 0..m {
        if let Some(c) = input {
            let r = rows[i] as usize;
            if !c.is_null(r) {
                let v = c.read_f64(r);
                best = if is_min { best.min(v) } else { best.max(v) };
            }
        }
        per_row.push(best);
    }
    let fill = if best.is_finite() { best } else { 0.0 };
    for i in 0..m {
        fv[i] = if running {
            let v = per_row[i];
            if v.is_finite() { v } else { 0.0 }
        } else {
            fill
        };
    }
}

fn compute_lag_lead(
    rows: &[i64],
    input: Option<&Column>,
    spec: &WindowSpec,
    f64_out: bool,
    fv: &mut [f64],
    iv: &mut [i64],
) {
    let m = rows.len();
    let offset = spec.param.max(1);
    let is_lag = spec.func == WindowFunc::Lag;
    for i in 0..m {
        let src = if is_lag {
            i as i64 - offset
        } else {
            i as i64 + offset
        };
        if src < 0 || src >= m as i64 {
            // Out of partition: NaN for float output, 0 for integer.
            if f64_out {
                fv[i] = f64::NAN;
            } else {
                iv[i] = 0;
            }
            continue;
        }
        let r = rows[src as usize] as usize;
        match input {
            Some(c) if !c.is_null(r) => {
                if f64_out {
                    fv[i] = c.read_f64(r);
                } else {
                    iv[i] = c.read_i64(r);
                }
            }
            _ => {
                if f64_out {
                    fv[i] = f64::NAN;
                } else {
                    iv[i] = 0;
                }
            }
        }
    }
}

fn compute_first_last(
    rows: &[i64],
    input: Option<&Column>,
    spec: &WindowSpec,
    f64_out: bool,
    fv: &mut [f64],
    iv: &mut [i64],
) {
    let m = rows.len();
    let first_idx = 0usize;
    for i in 0..m {
        let src_local = match spec.func {
            WindowFunc::FirstValue => first_idx,
            WindowFunc::LastValue => {
                if spec.frame == FrameType::UnboundedToCurrent {
                    i
                } else {
                    m - 1
                }
            }
            _ => unreachable!(),
        };
        let r = rows[src_local] as usize;
        match input {
            Some(c) if !c.is_null(r) => {
                if f64_out {
                    fv[i] = c.read_f64(r);
                } else {
                    iv[i] = c.read_i64(r);
                }
            }
            _ => {
                if f64_out {
                    fv[i] = 0.0;
                } else {
                    iv[i] = 0;
                }
            }
        }
    }
}

fn compute_nth(
    rows: &[i64],
    input: Option<&Column>,
    spec: &WindowSpec,
    f64_out: bool,
    fv: &mut [f64],
    iv: &mut [i64],
) {
    let m = rows.len();
    let nth = (spec.param - 1).max(0) as usize;
    for i in 0..m {
        if nth >= m {
            if f64_out {
                fv[i] = f64::NAN;
            } else {
                iv[i] = 0;
            }
            continue;
        }
        let r = rows[nth] as usize;
        match input {
            Some(c) if !c.is_null(r) => {
                if f64_out {
                    fv[i] = c.read_f64(r);
                } else {
                    iv[i] = c.read_i64(r);
                }
            }
            _ => {
                if f64_out {
                    fv[i] = 0.0;
                } else {
                    iv[i] = 0;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn sample() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 1, 1, 2, 2])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 30.0, 5.0, 1.0])));
        t
    }

    #[test]
    fn row_number_restarts_per_partition() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let specs = [WindowSpec {
            func: WindowFunc::RowNumber,
            input: None,
            param: 0,
            frame: FrameType::UnboundedToCurrent,
            out: 2,
        }];
        let out = exec_window(&t, &[0], &[1], &specs, &syms, &cfg, &pool).unwrap();
        let vals: Vec<i64> = (0..out.nrows()).map(|r| out.col_by_name(2).unwrap().read_i64(r)).collect();
        assert_eq!(vals.iter().filter(|&&v| v == 1).count(), 2);
    }

    #[test]
    fn running_sum_accumulates_within_partition() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let specs = [WindowSpec {
            func: WindowFunc::Sum,
            input: Some(1),
            param: 0,
            frame: FrameType::UnboundedToCurrent,
            out: 2,
        }];
        let out = exec_window(&t, &[0], &[1], &specs, &syms, &cfg, &pool).unwrap();
        let part1_max: f64 = (0..out.nrows())
            .filter(|&r| out.col(0).read_i64(r) == 1)
            .map(|r| out.col_by_name(2).unwrap().read_f64(r))
            .fold(0.0, f64::max);
        assert_eq!(part1_max, 60.0);
    }

    #[test]
    fn lag_out_of_partition_is_nan() {
        let t = sample();
        let syms = SymbolTable::new();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let specs = [WindowSpec {
            func: WindowFunc::Lag,
            input: Some(1),
            param: 1,
            frame: FrameType::UnboundedToCurrent,
            out: 2,
        }];
        let out = exec_window(&t, &[0], &[1], &specs, &syms, &cfg, &pool).unwrap();
        let first_in_part2 = (0..out.nrows()).find(|&r| out.col(0).read_i64(r) == 2).unwrap();
        assert!(out.col_by_name(2).unwrap().read_f64(first_in_part2).is_nan());
    }
}
