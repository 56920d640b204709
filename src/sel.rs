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

//! Selection bitmap, `SEL` (spec.md §3, §4.4): a lazy `WHERE` clause — a
//! per-row bit array plus a per-1024-row-segment `{NONE, ALL, MIX}` flag,
//! so downstream scans can skip whole segments instead of testing every
//! bit.

use crate::config::ExecConfig;
use crate::pool::Pool;
use crate::table::Column;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegFlag {
    None,
    All,
    Mix,
}

#[derive(Debug, Clone)]
pub struct Sel {
    bits: Vec<u64>,
    seg_flags: Vec<SegFlag>,
    len: usize,
    total_pass: usize,
    morsel_elems: usize,
}

impl Sel {
    #[inline]
    pub fn test(&self, row: usize) -> bool {
        (self.bits[row / 64] >> (row % 64)) & 1 != 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_pass(&self) -> usize {
        self.total_pass
    }

    pub fn seg_flag(&self, seg: usize) -> SegFlag {
        self.seg_flags[seg]
    }

    pub fn morsel_elems(&self) -> usize {
        self.morsel_elems
    }

    /// Enumerate set bits into a dense index array, skipping whole `NONE`
    /// segments and skipping the per-row test within `ALL` segments.
    pub fn match_indices(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.total_pass);
        let mut row = 0usize;
        for (seg, &flag) in self.seg_flags.iter().enumerate() {
            let seg_start = seg * self.morsel_elems;
            let seg_end = (seg_start + self.morsel_elems).min(self.len);
            match flag {
                SegFlag::None => {
                    row = seg_end;
                }
                SegFlag::All => {
                    out.extend((seg_start..seg_end).map(|r| r as i64));
                    row = seg_end;
                }
                SegFlag::Mix => {
                    for r in seg_start..seg_end {
                        if self.test(r) {
                            out.push(r as i64);
                        }
                    }
                    row = seg_end;
                }
            }
        }
        debug_assert_eq!(row, self.len);
        out
    }

    /// `sel_from_pred`: build a SEL from a boolean predicate column.
    ///
    /// Parallelized by handing each worker a disjoint, whole-segment slice
    /// of `bits` and `seg_flags` (safe `chunks_mut`, no shared mutable
    /// aliasing) — requires `morsel_elems` to be a multiple of 64 so a
    /// segment never splits a bitmap word across workers.
    pub fn from_pred(pred: &Column, cfg: &ExecConfig, pool: &Pool) -> Sel {
        let n = pred.len();
        let morsel_elems = cfg.morsel_elems;
        assert_eq!(morsel_elems % 64, 0, "morsel_elems must be a multiple of 64");
        let words_per_seg = morsel_elems / 64;
        let n_segs = crate::morsel::segment_count(n, morsel_elems);
        let mut bits = vec![0u64; n_segs * words_per_seg];
        let mut seg_flags = vec![SegFlag::None; n_segs];

        let n_workers = if n_segs < cfg.parallel_threshold / morsel_elems.max(1) {
            1
        } else {
            pool.total_workers().min(n_segs).max(1)
        };
        let segs_per_worker = n_segs.div_ceil(n_workers);

        std::thread::scope(|scope| {
            let mut bits_rest = bits.as_mut_slice();
            let mut flags_rest = seg_flags.as_mut_slice();
            let mut seg_base = 0usize;
            for _ in 0..n_workers {
                let take_segs = segs_per_worker.min(flags_rest.len());
                if take_segs == 0 {
                    break;
                }
                let (bits_chunk, bits_next) = bits_rest.split_at_mut(take_segs * words_per_seg);
                let (flags_chunk, flags_next) = flags_rest.split_at_mut(take_segs);
                bits_rest = bits_next;
                flags_rest = flags_next;
                let seg_start = seg_base;
                seg_base += take_segs;
                let pred = &pred;
                scope.spawn(move || {
                    for (i, flag_slot) in flags_chunk.iter_mut().enumerate() {
                        let seg = seg_start + i;
                        let row_start = seg * morsel_elems;
                        let row_end = (row_start + morsel_elems).min(n);
                        let mut any_true = false;
                        let mut any_false = false;
                        for row in row_start..row_end {
                            let v = pred.read_bool(row);
                            any_true |= v;
                            any_false |= !v;
                            if v {
                                let local_word = (row / 64) - seg_start * words_per_seg;
                                bits_chunk[local_word] |= 1u64 << (row % 64);
                            }
                        }
                        *flag_slot = match (any_true, any_false) {
                            (true, false) => SegFlag::All,
                            (false, _) => SegFlag::None,
                            (true, true) => SegFlag::Mix,
                        };
                    }
                });
            }
        });

        let total_pass = bits.iter().map(|w| w.count_ones() as usize).sum();
        Sel {
            bits,
            seg_flags,
            len: n,
            total_pass,
            morsel_elems,
        }
    }

    /// `sel_and`: intersect two SELs of the same length.
    pub fn and(a: &Sel, b: &Sel) -> Sel {
        assert_eq!(a.len, b.len, "sel_and length mismatch");
        let bits: Vec<u64> = a.bits.iter().zip(&b.bits).map(|(x, y)| x & y).collect();
        let seg_flags = a
            .seg_flags
            .iter()
            .zip(&b.seg_flags)
            .map(|(&x, &y)| match (x, y) {
                (SegFlag::None, _) | (_, SegFlag::None) => SegFlag::None,
                (SegFlag::All, SegFlag::All) => SegFlag::All,
                _ => SegFlag::Mix,
            })
            .collect();
        let total_pass = bits.iter().map(|w| w.count_ones() as usize).sum();
        Sel {
            bits,
            seg_flags,
            len: a.len,
            total_pass,
            morsel_elems: a.morsel_elems,
        }
    }

    pub fn all_true(n: usize, morsel_elems: usize) -> Sel {
        assert_eq!(morsel_elems % 64, 0, "morsel_elems must be a multiple of 64");
        let words_per_seg = morsel_elems / 64;
        let n_segs = crate::morsel::segment_count(n, morsel_elems);
        Sel {
            bits: vec![u64::MAX; n_segs * words_per_seg],
            seg_flags: vec![SegFlag::All; n_segs],
            len: n,
            total_pass: n,
            morsel_elems,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn bool_col(vals: &[bool]) -> Column {
        Column::new(ColumnData::Bool(vals.iter().map(|&b| b as u8).collect()))
    }

    #[test]
    fn from_pred_matches_popcount_invariant() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(2);
        let vals: Vec<bool> = (0..5000).map(|i| i % 7 == 0).collect();
        let expected = vals.iter().filter(|&&b| b).count();
        let col = bool_col(&vals);
        let sel = Sel::from_pred(&col, &cfg, &pool);
        assert_eq!(sel.total_pass(), expected);
        for (i, &v) in vals.iter().enumerate() {
            assert_eq!(sel.test(i), v);
        }
        assert_eq!(sel.match_indices().len(), expected);
    }

    #[test]
    fn and_intersects() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let a = Sel::from_pred(&bool_col(&[true, true, false, true]), &cfg, &pool);
        let b = Sel::from_pred(&bool_col(&[true, false, false, true]), &cfg, &pool);
        let c = Sel::and(&a, &b);
        assert_eq!(c.match_indices(), vec![0, 3]);
    }

    #[test]
    fn all_segment_flag_skips_per_row_test_but_stays_correct() {
        let cfg = ExecConfig::default();
        let pool = Pool::new(1);
        let vals = vec![true; 2048];
        let sel = Sel::from_pred(&bool_col(&vals), &cfg, &pool);
        assert_eq!(sel.seg_flag(0), SegFlag::All);
        assert_eq!(sel.total_pass(), 2048);
    }
}
