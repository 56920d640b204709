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

//! Whole-column reductions (spec.md §4.7): SUM/PROD/MIN/MAX/COUNT/AVG/
//! FIRST/LAST/STDDEV/STDDEV_POP/VAR/VAR_POP, plus COUNT_DISTINCT
//! (SPEC_FULL.md §3). Each worker accumulates its row range independently;
//! partial accumulators are merged sequentially in worker-id order so
//! FIRST/LAST see the lowest-address range first (same invariant
//! [`crate::pool::Pool::dispatch`] documents for its worker split).

use std::collections::HashSet;

use crate::config::ExecConfig;
use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::table::Column;

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
pub enum ReduceResult {
    F64(f64),
    I64(i64),
}

impl ReduceResult {
    pub fn as_f64(self) -> f64 {
        match self {
            ReduceResult::F64(v) => v,
            ReduceResult::I64(v) => v as f64,
        }
    }
}

/// Decomposed (sum, sum-of-squares, count) accumulator shared with
/// [`crate::group`]'s per-worker AVG/STDDEV paths — merging two partial
/// accumulators is just a componentwise add, which is what makes the
/// parallel accumulate-then-merge split possible.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MomentAcc {
    pub(crate) n: u64,
    pub(crate) sum: f64,
    pub(crate) sum_sq: f64,
}

impl MomentAcc {
    pub(crate) fn push(&mut self, v: f64) {
        self.n += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    pub(crate) fn merge(a: MomentAcc, b: MomentAcc) -> MomentAcc {
        MomentAcc {
            n: a.n + b.n,
            sum: a.sum + b.sum,
            sum_sq: a.sum_sq + b.sum_sq,
        }
    }

    /// Sample/population variance from the two-pass-free sum-of-squares
    /// decomposition: `var = E[x^2] - E[x]^2`, Bessel-corrected for the
    /// sample variant. Population variance of zero rows is 0; sample
    /// variance/stddev with fewer than two rows is `NaN` (spec.md §8
    /// Boundary Behavior: "STDDEV/VAR sample, n < 2").
    pub(crate) fn variance(self, sample: bool) -> f64 {
        if sample && self.n < 2 {
            return f64::NAN;
        }
        if self.n == 0 {
            return 0.0;
        }
        let mean = self.sum / self.n as f64;
        let m2 = (self.sum_sq / self.n as f64 - mean * mean).max(0.0);
        if sample {
            m2 * self.n as f64 / (self.n as f64 - 1.0)
        } else {
            m2
        }
    }
}

/// Apply `op` to every row of `col`, dispatching across `pool` when the
/// column is large enough to be worth it.
pub fn reduce(op: AggOp, col: &Column, cfg: &ExecConfig, pool: &Pool) -> Result<ReduceResult> {
    if op == AggOp::CountDistinct {
        return Ok(ReduceResult::I64(count_distinct(col)));
    }
    let n = col.len();
    if n == 0 {
        return Ok(match op {
            AggOp::Count => ReduceResult::I64(0),
            AggOp::Sum | AggOp::Avg | AggOp::StddevPop | AggOp::VarPop => ReduceResult::F64(0.0),
            AggOp::Stddev | AggOp::Var => ReduceResult::F64(f64::NAN),
            AggOp::Prod => ReduceResult::F64(1.0),
            _ => return Err(Error::Domain),
        });
    }

    match op {
        AggOp::Count => Ok(ReduceResult::I64(count_non_null(col, n, cfg, pool))),
        AggOp::Sum => Ok(ReduceResult::F64(fold_f64(col, n, cfg, pool, 0.0, |a, b| a + b))),
        AggOp::Prod => Ok(ReduceResult::F64(fold_f64(col, n, cfg, pool, 1.0, |a, b| a * b))),
        AggOp::Min => Ok(ReduceResult::F64(fold_f64(col, n, cfg, pool, f64::INFINITY, f64::min))),
        AggOp::Max => Ok(ReduceResult::F64(fold_f64(
            col,
            n,
            cfg,
            pool,
            f64::NEG_INFINITY,
            f64::max,
        ))),
        AggOp::First => Ok(first_or_last(col, n, true)),
        AggOp::Last => Ok(first_or_last(col, n, false)),
        AggOp::Avg | AggOp::Stddev | AggOp::StddevPop | AggOp::Var | AggOp::VarPop => {
            let acc = fold_moments(col, n, cfg, pool);
            Ok(ReduceResult::F64(match op {
                AggOp::Avg => {
                    if acc.n == 0 {
                        0.0
                    } else {
                        acc.sum / acc.n as f64
                    }
                }
                AggOp::Stddev => acc.variance(true).sqrt(),
                AggOp::StddevPop => acc.variance(false).sqrt(),
                AggOp::Var => acc.variance(true),
                AggOp::VarPop => acc.variance(false),
                _ => unreachable!(),
            }))
        }
        AggOp::CountDistinct => unreachable!(),
    }
}

fn count_non_null(col: &Column, n: usize, cfg: &ExecConfig, pool: &Pool) -> i64 {
    let partials = std::sync::Mutex::new(Vec::new());
    pool.dispatch(n, cfg, |worker, start, end| {
        let mut c = 0i64;
        for row in start..end {
            if !col.is_null(row) {
                c += 1;
            }
        }
        partials.lock().unwrap().push((worker, c));
    });
    let mut v = partials.into_inner().unwrap();
    v.sort_by_key(|(w, _)| *w);
    v.into_iter().map(|(_, c)| c).sum()
}

fn fold_f64(
    col: &Column,
    n: usize,
    cfg: &ExecConfig,
    pool: &Pool,
    identity: f64,
    op: impl Fn(f64, f64) -> f64 + Sync,
) -> f64 {
    let partials = std::sync::Mutex::new(Vec::new());
    pool.dispatch(n, cfg, |worker, start, end| {
        let mut acc = identity;
        for row in start..end {
            if !col.is_null(row) {
                acc = op(acc, col.read_f64(row));
            }
        }
        partials.lock().unwrap().push((worker, acc));
    });
    let mut v = partials.into_inner().unwrap();
    v.sort_by_key(|(w, _)| *w);
    v.into_iter().map(|(_, a)| a).fold(identity, &op)
}

fn fold_moments(col: &Column, n: usize, cfg: &ExecConfig, pool: &Pool) -> MomentAcc {
    let partials = std::sync::Mutex::new(Vec::new());
    pool.dispatch(n, cfg, |worker, start, end| {
        let mut acc = MomentAcc::default();
        for row in start..end {
            if !col.is_null(row) {
                acc.push(col.read_f64(row));
            }
        }
        partials.lock().unwrap().push((worker, acc));
    });
    let mut v = partials.into_inner().unwrap();
    v.sort_by_key(|(w, _)| *w);
    v.into_iter().map(|(_, a)| a).fold(MomentAcc::default(), MomentAcc::merge)
}

/// FIRST/LAST: the first (or last) non-null row in row order, scanned
/// sequentially since the ordering requirement rules out a parallel fold.
fn first_or_last(col: &Column, n: usize, first: bool) -> ReduceResult {
    let rows: Box<dyn Iterator<Item = usize>> = if first {
        Box::new(0..n)
    } else {
        Box::new((0..n).rev())
    };
    for row in rows {
        if !col.is_null(row) {
            return ReduceResult::F64(col.read_f64(row));
        }
    }
    ReduceResult::F64(0.0)
}

fn count_distinct(col: &Column) -> i64 {
    let mut seen_sym: HashSet<i64> = HashSet::new();
    let mut seen_str: HashSet<String> = HashSet::new();
    let mut seen_bits: HashSet<u64> = HashSet::new();
    for row in 0..col.len() {
        if col.is_null(row) {
            continue;
        }
        if col.is_sym() {
            seen_sym.insert(col.read_sym_id(row));
        } else if col.elem_type() == crate::table::ElemType::Str {
            seen_str.insert(col.read_str(row).to_string());
        } else {
            // Bitwise key so `-0.0`/`0.0` and NaN payloads are distinguished
            // exactly as they're stored (spec.md §9's F64 equality quirk).
            seen_bits.insert(col.read_f64(row).to_bits());
        }
    }
    (seen_sym.len() + seen_str.len() + seen_bits.len()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn f64_col(v: &[f64]) -> Column {
        Column::new(ColumnData::F64(v.to_vec()))
    }

    #[test]
    fn sum_and_avg() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let col = f64_col(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(reduce(AggOp::Sum, &col, &cfg, &pool).unwrap().as_f64(), 10.0);
        assert_eq!(reduce(AggOp::Avg, &col, &cfg, &pool).unwrap().as_f64(), 2.5);
    }

    #[test]
    fn min_max() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let col = f64_col(&[5.0, -1.0, 8.0, 2.0]);
        assert_eq!(reduce(AggOp::Min, &col, &cfg, &pool).unwrap().as_f64(), -1.0);
        assert_eq!(reduce(AggOp::Max, &col, &cfg, &pool).unwrap().as_f64(), 8.0);
    }

    #[test]
    fn stddev_matches_known_value() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let col = f64_col(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let pop = reduce(AggOp::StddevPop, &col, &cfg, &pool).unwrap().as_f64();
        assert!((pop - 2.0).abs() < 1e-9);
    }

    #[test]
    fn count_distinct_counts_unique_values() {
        let col = f64_col(&[1.0, 2.0, 2.0, 3.0, 1.0]);
        assert_eq!(count_distinct(&col), 3);
    }

    #[test]
    fn empty_column_sum_is_zero() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let col = f64_col(&[]);
        assert_eq!(reduce(AggOp::Sum, &col, &cfg, &pool).unwrap().as_f64(), 0.0);
    }

    #[test]
    fn sample_stddev_and_var_are_nan_below_two_rows() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        for col in [f64_col(&[]), f64_col(&[3.0])] {
            assert!(reduce(AggOp::Stddev, &col, &cfg, &pool).unwrap().as_f64().is_nan());
            assert!(reduce(AggOp::Var, &col, &cfg, &pool).unwrap().as_f64().is_nan());
        }
    }

    #[test]
    fn population_stddev_and_var_stay_zero_below_two_rows() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        for col in [f64_col(&[]), f64_col(&[3.0])] {
            assert_eq!(reduce(AggOp::StddevPop, &col, &cfg, &pool).unwrap().as_f64(), 0.0);
            assert_eq!(reduce(AggOp::VarPop, &col, &cfg, &pool).unwrap().as_f64(), 0.0);
        }
    }
}
