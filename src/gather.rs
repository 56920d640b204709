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

//! Gather kernels (spec.md §4.5): indexed reads + sequential writes, used
//! by sort, join, filter-compaction and HEAD/TAIL materialization.
//!
//! `idx[i] == -1` means "null" (the LEFT/FULL join convention) and is only
//! meaningful when `nullable` is set; otherwise a negative index is a
//! caller bug and panics.

use crate::table::{Column, ColumnData, NullBitmap, SymWidth, Table};

/// Gather one column by `idx`. When `nullable`, `idx[i] == -1` produces a
/// null row (zeroed value) instead of a panic — the LEFT/FULL join path.
pub fn gather_column(src: &Column, idx: &[i64], nullable: bool) -> Column {
    match src.data() {
        ColumnData::Parted(segs) => parted_gather(segs, idx, nullable),
        ColumnData::MapCommon { values, counts } => {
            let expanded = expand_mapcommon(values, counts);
            gather_column(&expanded, idx, nullable)
        }
        data => {
            let out = gather_data(data, idx);
            let nulls = if nullable {
                let mut nb = src
                    .nulls()
                    .map(|n| n.gather(idx))
                    .unwrap_or_else(|| NullBitmap::new(idx.len()));
                for (i, &s) in idx.iter().enumerate() {
                    if s < 0 {
                        nb.set(i);
                    }
                }
                Some(nb)
            } else {
                src.nulls().map(|n| n.gather(idx))
            };
            match nulls {
                Some(nb) if nb.any_null() => Column::with_nulls(out, nb),
                _ => Column::new(out),
            }
        }
    }
}

fn gather_data(data: &ColumnData, idx: &[i64]) -> ColumnData {
    macro_rules! gather_numeric {
        ($v:expr, $zero:expr) => {
            idx.iter()
                .map(|&i| {
                    if i < 0 {
                        $zero
                    } else {
                        $v[i as usize]
                    }
                })
                .collect()
        };
    }
    match data {
        ColumnData::F64(v) => ColumnData::F64(gather_numeric!(v, 0.0)),
        ColumnData::I64(v) => ColumnData::I64(gather_numeric!(v, 0)),
        ColumnData::I32(v) => ColumnData::I32(gather_numeric!(v, 0)),
        ColumnData::I16(v) => ColumnData::I16(gather_numeric!(v, 0)),
        ColumnData::U8(v) => ColumnData::U8(gather_numeric!(v, 0)),
        ColumnData::Bool(v) => ColumnData::Bool(gather_numeric!(v, 0)),
        ColumnData::Timestamp(v) => ColumnData::Timestamp(gather_numeric!(v, 0)),
        ColumnData::Date(v) => ColumnData::Date(gather_numeric!(v, 0)),
        ColumnData::Time(v) => ColumnData::Time(gather_numeric!(v, 0)),
        ColumnData::Sym(v) => ColumnData::Sym(v.gather(idx)),
        ColumnData::Str(v) => ColumnData::Str(
            idx.iter()
                .map(|&i| {
                    if i < 0 {
                        Box::from("")
                    } else {
                        v[i as usize].clone()
                    }
                })
                .collect(),
        ),
        ColumnData::Parted(_) | ColumnData::MapCommon { .. } => {
            unreachable!("parted/mapcommon columns are dispatched in gather_column")
        }
        ColumnData::Table(_) => panic!("cannot gather a TABLE-typed column"),
    }
}

/// Flatten a parted column's segments into one plain column, honoring
/// logical row order (segment concatenation order).
pub fn parted_concat(segs: &[Column]) -> Column {
    if segs.is_empty() {
        return Column::new(ColumnData::I64(vec![]));
    }
    let total: usize = segs.iter().map(|s| s.len()).sum();
    let idx: Vec<i64> = (0..total as i64).collect();
    parted_gather(segs, &idx, false)
}

/// `parted_gather_col` (spec.md §4.5): walk a sorted-ascending index array
/// with a segment cursor, resolving each row to (segment, local offset) in
/// amortized O(1) rather than a binary search per row, then gather each
/// touched segment once and scatter the per-row scalars back into global
/// order. `idx` need not actually be sorted — the cursor just walks
/// forward/backward from its last position, which degrades to a local
/// search on out-of-order input but never misbehaves.
fn parted_gather(segs: &[Column], idx: &[i64], nullable: bool) -> Column {
    let mut offsets = Vec::with_capacity(segs.len() + 1);
    let mut acc = 0i64;
    offsets.push(0i64);
    for s in segs {
        acc += s.len() as i64;
        offsets.push(acc);
    }
    let mut by_seg: Vec<Vec<i64>> = vec![Vec::new(); segs.len().max(1)];
    let mut by_seg_pos: Vec<Vec<usize>> = vec![Vec::new(); segs.len().max(1)];
    let mut seg_cursor = 0usize;
    for (pos, &g) in idx.iter().enumerate() {
        if g < 0 || segs.is_empty() {
            by_seg[0].push(-1);
            by_seg_pos[0].push(pos);
            continue;
        }
        while seg_cursor + 1 < offsets.len() - 1 && g >= offsets[seg_cursor + 1] {
            seg_cursor += 1;
        }
        while seg_cursor > 0 && g < offsets[seg_cursor] {
            seg_cursor -= 1;
        }
        by_seg[seg_cursor].push(g - offsets[seg_cursor]);
        by_seg_pos[seg_cursor].push(pos);
    }

    let base_type = segs.first().map(|s| s.elem_type()).unwrap_or(crate::table::ElemType::I64);
    let total = idx.len();
    let mut plan: Vec<Option<(usize, usize)>> = vec![None; total];
    let mut pieces: Vec<Column> = Vec::with_capacity(segs.len());
    for (seg_no, (local_idx, positions)) in by_seg.iter().zip(by_seg_pos.iter()).enumerate() {
        if local_idx.is_empty() {
            continue;
        }
        let src = segs.get(seg_no);
        let gathered = match src {
            Some(s) => gather_column(s, local_idx, nullable),
            None => {
                // `segs` is empty: every position landed in the synthetic
                // "all null" bucket above.
                let mut nb = NullBitmap::new(local_idx.len());
                for i in 0..local_idx.len() {
                    nb.set(i);
                }
                Column::with_nulls(ColumnData::I64(vec![0; local_idx.len()]), nb)
            }
        };
        let piece_no = pieces.len();
        pieces.push(gathered);
        for (row_in_piece, &orig_pos) in positions.iter().enumerate() {
            plan[orig_pos] = Some((piece_no, row_in_piece));
        }
    }

    build_column_from_plan(base_type, &pieces, &plan)
}

fn build_column_from_plan(
    base_type: crate::table::ElemType,
    pieces: &[Column],
    plan: &[Option<(usize, usize)>],
) -> Column {
    use crate::table::ElemType::*;
    let mut nulls = NullBitmap::new(plan.len());
    let mut any_null = false;
    let mut mark_null = |pos: usize| {
        nulls.set(pos);
        any_null = true;
    };
    let data = match base_type {
        F64 => ColumnData::F64(
            plan.iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => pieces[*pi].read_f64(*r),
                    Some(_) => {
                        mark_null(pos);
                        0.0
                    }
                    None => {
                        mark_null(pos);
                        0.0
                    }
                })
                .collect(),
        ),
        I64 | Timestamp => ColumnData::I64(
            plan.iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => pieces[*pi].read_i64(*r),
                    Some(_) => {
                        mark_null(pos);
                        0
                    }
                    None => {
                        mark_null(pos);
                        0
                    }
                })
                .collect(),
        ),
        I32 | Date | Time => ColumnData::I32(
            plan.iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => pieces[*pi].read_i64(*r) as i32,
                    Some(_) => {
                        mark_null(pos);
                        0
                    }
                    None => {
                        mark_null(pos);
                        0
                    }
                })
                .collect(),
        ),
        Bool => ColumnData::Bool(
            plan.iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => pieces[*pi].read_bool(*r) as u8,
                    Some(_) => {
                        mark_null(pos);
                        0
                    }
                    None => {
                        mark_null(pos);
                        0
                    }
                })
                .collect(),
        ),
        Sym => {
            let ids: Vec<i64> = plan
                .iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => pieces[*pi].read_sym_id(*r),
                    Some(_) => {
                        mark_null(pos);
                        -1
                    }
                    None => {
                        mark_null(pos);
                        -1
                    }
                })
                .collect();
            ColumnData::Sym(SymWidth::from_ids(&ids))
        }
        Str => ColumnData::Str(
            plan.iter()
                .enumerate()
                .map(|(pos, p)| match p {
                    Some((pi, r)) if !pieces[*pi].is_null(*r) => Box::from(pieces[*pi].read_str(*r)),
                    Some(_) => {
                        mark_null(pos);
                        Box::from("")
                    }
                    None => {
                        mark_null(pos);
                        Box::from("")
                    }
                })
                .collect(),
        ),
        _ => ColumnData::I64(vec![0; plan.len()]),
    };
    if any_null {
        Column::with_nulls(data, nulls)
    } else {
        Column::new(data)
    }
}

/// Expand a MAPCOMMON column (one value per partition + row counts) into a
/// plain column by repeating each partition's value `counts[p]` times.
pub fn expand_mapcommon(values: &Column, counts: &[i64]) -> Column {
    let mut idx = Vec::with_capacity(counts.iter().sum::<i64>() as usize);
    for (p, &c) in counts.iter().enumerate() {
        idx.extend(std::iter::repeat_n(p as i64, c as usize));
    }
    gather_column(values, &idx, false)
}

/// Fused multi-column gather: gather every column of `table` by the same
/// `idx`, producing a new table. `nullable` applies uniformly (the join
/// path's "right side of a LEFT/FULL join" case); the "up to 16 columns in
/// one pass" fusion from spec.md §4.5 is a performance detail this
/// implementation doesn't distinguish from the general multi-column case —
/// both go through the same per-column gather.
pub fn gather_table(table: &Table, idx: &[i64], nullable: bool) -> Table {
    let cols = table
        .cols()
        .iter()
        .map(|(name, col)| (*name, gather_column(col, idx, nullable)))
        .collect();
    Table::with_nrows(cols, idx.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_column_basic() {
        let col = Column::new(ColumnData::I64(vec![10, 20, 30, 40]));
        let out = gather_column(&col, &[3, 1, -1, 0], true);
        assert_eq!(out.read_i64(0), 40);
        assert_eq!(out.read_i64(1), 20);
        assert!(out.is_null(2));
        assert_eq!(out.read_i64(3), 10);
    }

    #[test]
    fn gather_table_preserves_row_count() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 2, 3])));
        t.add_col(1, Column::new(ColumnData::F64(vec![1.0, 2.0, 3.0])));
        let out = gather_table(&t, &[2, 0], false);
        assert_eq!(out.nrows(), 2);
        assert_eq!(out.col(0).read_i64(0), 3);
        assert_eq!(out.col(1).read_f64(1), 1.0);
    }

    #[test]
    fn expand_mapcommon_repeats_per_partition() {
        let values = Column::new(ColumnData::I64(vec![7, 9]));
        let out = expand_mapcommon(&values, &[2, 3]);
        assert_eq!(out.len(), 5);
        assert_eq!(out.read_i64(0), 7);
        assert_eq!(out.read_i64(1), 7);
        assert_eq!(out.read_i64(2), 9);
        assert_eq!(out.read_i64(4), 9);
    }
}
