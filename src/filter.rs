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

//! FILTER (spec.md §4.8): a [`Sel`] is lazy — it only gets materialized
//! into a compacted [`Table`] when an operator downstream can't consume a
//! selection directly. `exec_filter_head` fuses a HEAD right after a
//! FILTER so the compaction never runs past the rows the HEAD would keep.

use crate::config::ExecConfig;
use crate::gather::gather_table;
use crate::pool::Pool;
use crate::sel::Sel;
use crate::table::Table;

/// Materialize `sel` against `table`, producing a new table holding only
/// the selected rows in their original order.
pub fn materialize(table: &Table, sel: &Sel) -> Table {
    let idx = sel.match_indices();
    gather_table(table, &idx, false)
}

/// FILTER ∘ HEAD fusion: keep only the first `limit` selected rows,
/// stopping the scan early instead of compacting the whole selection and
/// truncating after.
pub fn filter_head(table: &Table, sel: &Sel, limit: usize) -> Table {
    let mut idx = Vec::with_capacity(limit.min(sel.total_pass()));
    'outer: for seg in 0..crate::morsel::segment_count(sel.len(), sel.morsel_elems()) {
        let seg_start = seg * sel.morsel_elems();
        let seg_end = (seg_start + sel.morsel_elems()).min(sel.len());
        match sel.seg_flag(seg) {
            crate::sel::SegFlag::None => continue,
            crate::sel::SegFlag::All => {
                for r in seg_start..seg_end {
                    idx.push(r as i64);
                    if idx.len() == limit {
                        break 'outer;
                    }
                }
            }
            crate::sel::SegFlag::Mix => {
                for r in seg_start..seg_end {
                    if sel.test(r) {
                        idx.push(r as i64);
                        if idx.len() == limit {
                            break 'outer;
                        }
                    }
                }
            }
        }
    }
    gather_table(table, &idx, false)
}

/// `exec_filter`: build the predicate's [`Sel`] and materialize it in one
/// step, for callers that can't thread a lazy selection through.
pub fn exec_filter(table: &Table, pred: &crate::table::Column, cfg: &ExecConfig, pool: &Pool) -> Table {
    let sel = Sel::from_pred(pred, cfg, pool);
    materialize(table, &sel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnData};

    fn sample() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![10, 20, 30, 40, 50])));
        t
    }

    fn pred(vals: &[bool]) -> Column {
        Column::new(ColumnData::Bool(vals.iter().map(|&b| b as u8).collect()))
    }

    #[test]
    fn materialize_keeps_selected_rows_in_order() {
        let t = sample();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let sel = Sel::from_pred(&pred(&[true, false, true, false, true]), &cfg, &pool);
        let out = materialize(&t, &sel);
        assert_eq!(out.nrows(), 3);
        assert_eq!(out.col(0).read_i64(0), 10);
        assert_eq!(out.col(0).read_i64(1), 30);
        assert_eq!(out.col(0).read_i64(2), 50);
    }

    #[test]
    fn filter_head_stops_at_limit() {
        let t = sample();
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let sel = Sel::from_pred(&pred(&[true, true, true, true, true]), &cfg, &pool);
        let out = filter_head(&t, &sel, 2);
        assert_eq!(out.nrows(), 2);
        assert_eq!(out.col(0).read_i64(1), 20);
    }
}
