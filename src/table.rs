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

//! Data model (spec.md §3): typed columns, tables, parted/MAPCOMMON columns,
//! and the adaptive-width symbol representation.

use std::sync::Arc;

use crate::symtab::SymbolTable;

/// Element type tag. `Parted`/`MapCommon` carry the base type of their
/// segments so `parted_basetype` (spec.md §6) is a cheap field read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    F64,
    I64,
    I32,
    I16,
    U8,
    Bool,
    Sym,
    Timestamp,
    Date,
    Time,
    Str,
    Table,
    Parted,
    MapCommon,
}

impl ElemType {
    /// Element width in bytes for the fixed-width numeric types; symbols
    /// and strings have no single width (see `SymWidth`).
    pub fn elem_size(self) -> Option<usize> {
        use ElemType::*;
        match self {
            F64 | I64 | Timestamp => Some(8),
            I32 | Date | Time => Some(4),
            I16 => Some(2),
            U8 | Bool => Some(1),
            Sym | Str | Table | Parted | MapCommon => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ElemType::F64
                | ElemType::I64
                | ElemType::I32
                | ElemType::I16
                | ElemType::U8
                | ElemType::Bool
                | ElemType::Timestamp
                | ElemType::Date
                | ElemType::Time
        )
    }
}

/// Adaptive-width symbol storage (spec.md §3 invariant: widening happens
/// only at graph construction, never mid-execution).
#[derive(Debug, Clone)]
pub enum SymWidth {
    W8(Vec<u8>),
    W16(Vec<u16>),
    W32(Vec<u32>),
    W64(Vec<i64>),
}

impl SymWidth {
    pub fn len(&self) -> usize {
        match self {
            SymWidth::W8(v) => v.len(),
            SymWidth::W16(v) => v.len(),
            SymWidth::W32(v) => v.len(),
            SymWidth::W64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn get(&self, row: usize) -> i64 {
        match self {
            SymWidth::W8(v) => v[row] as i64,
            SymWidth::W16(v) => v[row] as i64,
            SymWidth::W32(v) => v[row] as i64,
            SymWidth::W64(v) => v[row],
        }
    }

    /// Smallest width that can hold every id in `ids`, matching the
    /// 1/2/4/8-byte convention named in spec.md §3.
    pub fn from_ids(ids: &[i64]) -> Self {
        let max = ids.iter().copied().max().unwrap_or(0);
        if max <= u8::MAX as i64 {
            SymWidth::W8(ids.iter().map(|&x| x as u8).collect())
        } else if max <= u16::MAX as i64 {
            SymWidth::W16(ids.iter().map(|&x| x as u16).collect())
        } else if max <= u32::MAX as i64 {
            SymWidth::W32(ids.iter().map(|&x| x as u32).collect())
        } else {
            SymWidth::W64(ids.to_vec())
        }
    }

    pub fn to_vec_i64(&self) -> Vec<i64> {
        match self {
            SymWidth::W8(v) => v.iter().map(|&x| x as i64).collect(),
            SymWidth::W16(v) => v.iter().map(|&x| x as i64).collect(),
            SymWidth::W32(v) => v.iter().map(|&x| x as i64).collect(),
            SymWidth::W64(v) => v.clone(),
        }
    }

    pub fn gather(&self, idx: &[i64]) -> Self {
        let ids: Vec<i64> = idx
            .iter()
            .map(|&i| if i < 0 { -1 } else { self.get(i as usize) })
            .collect();
        SymWidth::from_ids(&ids)
    }
}

/// A per-row bitset of nulls, `ceil(n/64)` words (spec.md §3).
#[derive(Debug, Clone, Default)]
pub struct NullBitmap {
    words: Vec<u64>,
    len: usize,
}

impl NullBitmap {
    pub fn new(len: usize) -> Self {
        NullBitmap {
            words: vec![0u64; len.div_ceil(64)],
            len,
        }
    }

    pub fn from_flags(flags: &[bool]) -> Self {
        let mut nb = NullBitmap::new(flags.len());
        for (i, &f) in flags.iter().enumerate() {
            if f {
                nb.set(i);
            }
        }
        nb
    }

    #[inline]
    pub fn get(&self, row: usize) -> bool {
        (self.words[row / 64] >> (row % 64)) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, row: usize) {
        self.words[row / 64] |= 1u64 << (row % 64);
    }

    pub fn any_null(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn gather(&self, idx: &[i64]) -> NullBitmap {
        let mut nb = NullBitmap::new(idx.len());
        for (i, &src) in idx.iter().enumerate() {
            if src < 0 || self.get(src as usize) {
                nb.set(i);
            }
        }
        nb
    }
}

/// The typed payload of a column.
#[derive(Debug, Clone)]
pub enum ColumnData {
    F64(Vec<f64>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    I16(Vec<i16>),
    U8(Vec<u8>),
    Bool(Vec<u8>),
    Sym(SymWidth),
    Timestamp(Vec<i64>),
    Date(Vec<i32>),
    Time(Vec<i32>),
    Str(Vec<Box<str>>),
    Table(Table),
    Parted(Vec<Column>),
    MapCommon {
        /// One value per partition.
        values: Box<Column>,
        /// Row count of each partition, same length as `values`.
        counts: Vec<i64>,
    },
}

impl ColumnData {
    pub fn elem_type(&self) -> ElemType {
        match self {
            ColumnData::F64(_) => ElemType::F64,
            ColumnData::I64(_) => ElemType::I64,
            ColumnData::I32(_) => ElemType::I32,
            ColumnData::I16(_) => ElemType::I16,
            ColumnData::U8(_) => ElemType::U8,
            ColumnData::Bool(_) => ElemType::Bool,
            ColumnData::Sym(_) => ElemType::Sym,
            ColumnData::Timestamp(_) => ElemType::Timestamp,
            ColumnData::Date(_) => ElemType::Date,
            ColumnData::Time(_) => ElemType::Time,
            ColumnData::Str(_) => ElemType::Str,
            ColumnData::Table(_) => ElemType::Table,
            ColumnData::Parted(_) => ElemType::Parted,
            ColumnData::MapCommon { .. } => ElemType::MapCommon,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::F64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::I32(v) => v.len(),
            ColumnData::I16(v) => v.len(),
            ColumnData::U8(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Sym(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Date(v) => v.len(),
            ColumnData::Time(v) => v.len(),
            ColumnData::Str(v) => v.len(),
            ColumnData::Table(t) => t.nrows(),
            ColumnData::Parted(segs) => segs.iter().map(|s| s.len()).sum(),
            ColumnData::MapCommon { counts, .. } => counts.iter().sum::<i64>() as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct ColumnInner {
    data: ColumnData,
    nulls: Option<NullBitmap>,
    /// Atom (singleton scalar) columns broadcast their single value across
    /// any row index, matching spec.md §3's negative-type-tag convention.
    is_atom: bool,
}

/// A reference-counted column handle. Cloning is a cheap `Arc` bump —
/// the `retain`/`release` pair named in spec.md §6 as a required
/// collaborator.
#[derive(Clone)]
pub struct Column(Arc<ColumnInner>);

impl Column {
    pub fn new(data: ColumnData) -> Self {
        Column(Arc::new(ColumnInner {
            data,
            nulls: None,
            is_atom: false,
        }))
    }

    pub fn new_atom(data: ColumnData) -> Self {
        Column(Arc::new(ColumnInner {
            data,
            nulls: None,
            is_atom: true,
        }))
    }

    pub fn with_nulls(data: ColumnData, nulls: NullBitmap) -> Self {
        Column(Arc::new(ColumnInner {
            data,
            nulls: Some(nulls),
            is_atom: false,
        }))
    }

    pub fn data(&self) -> &ColumnData {
        &self.0.data
    }

    pub fn elem_type(&self) -> ElemType {
        self.0.data.elem_type()
    }

    pub fn nulls(&self) -> Option<&NullBitmap> {
        self.0.nulls.as_ref()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.0.nulls.as_ref().is_some_and(|n| n.get(row))
    }

    pub fn is_atom(&self) -> bool {
        self.0.is_atom
    }

    pub fn is_parted(&self) -> bool {
        matches!(self.0.data, ColumnData::Parted(_))
    }

    pub fn is_mapcommon(&self) -> bool {
        matches!(self.0.data, ColumnData::MapCommon { .. })
    }

    pub fn is_sym(&self) -> bool {
        matches!(self.0.data, ColumnData::Sym(_))
    }

    pub fn len(&self) -> usize {
        self.0.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `retain`: clone the handle, bumping the refcount.
    pub fn retain(&self) -> Column {
        self.clone()
    }

    /// `release`: explicit drop, named to mirror spec.md §6's interface
    /// even though Rust's `Drop` would do this automatically.
    pub fn release(self) {
        drop(self)
    }

    /// Parted row count: sum of segment lengths (spec.md §3 invariant).
    pub fn parted_nrows(&self) -> usize {
        match &self.0.data {
            ColumnData::Parted(segs) => segs.iter().map(|s| s.len()).sum(),
            ColumnData::MapCommon { counts, .. } => counts.iter().sum::<i64>() as usize,
            _ => self.len(),
        }
    }

    pub fn parted_basetype(&self) -> Option<ElemType> {
        match &self.0.data {
            ColumnData::Parted(segs) => segs.first().map(|s| s.elem_type()),
            ColumnData::MapCommon { values, .. } => Some(values.elem_type()),
            _ => None,
        }
    }

    pub fn parted_segments(&self) -> Option<&[Column]> {
        match &self.0.data {
            ColumnData::Parted(segs) => Some(segs),
            _ => None,
        }
    }

    // -- typed atom readers --------------------------------------------

    pub fn as_f64_atom(&self) -> Option<f64> {
        match &self.0.data {
            ColumnData::F64(v) => v.first().copied(),
            ColumnData::I64(v) => v.first().map(|&x| x as f64),
            _ => None,
        }
    }

    pub fn as_i64_atom(&self) -> Option<i64> {
        match &self.0.data {
            ColumnData::I64(v) => v.first().copied(),
            ColumnData::I32(v) => v.first().map(|&x| x as i64),
            ColumnData::Bool(v) => v.first().map(|&x| x as i64),
            _ => None,
        }
    }

    pub fn as_str_atom(&self) -> Option<&str> {
        match &self.0.data {
            ColumnData::Str(v) => v.first().map(|s| s.as_ref()),
            _ => None,
        }
    }

    // -- generic row accessors (spec.md §4.2) ---------------------------

    /// `read_col_i64`: dispatch on type/width and widen to i64.
    #[inline]
    pub fn read_i64(&self, row: usize) -> i64 {
        let row = if self.0.is_atom { 0 } else { row };
        match &self.0.data {
            ColumnData::I64(v) | ColumnData::Timestamp(v) => v[row],
            ColumnData::I32(v) | ColumnData::Date(v) | ColumnData::Time(v) => v[row] as i64,
            ColumnData::I16(v) => v[row] as i64,
            ColumnData::U8(v) | ColumnData::Bool(v) => v[row] as i64,
            ColumnData::F64(v) => v[row] as i64,
            ColumnData::Sym(v) => v.get(row),
            _ => panic!("read_i64 on non-scalar column type"),
        }
    }

    /// `read_f64`: convert from any numeric type.
    #[inline]
    pub fn read_f64(&self, row: usize) -> f64 {
        let row = if self.0.is_atom { 0 } else { row };
        match &self.0.data {
            ColumnData::F64(v) => v[row],
            ColumnData::I64(v) | ColumnData::Timestamp(v) => v[row] as f64,
            ColumnData::I32(v) | ColumnData::Date(v) | ColumnData::Time(v) => v[row] as f64,
            ColumnData::I16(v) => v[row] as f64,
            ColumnData::U8(v) | ColumnData::Bool(v) => v[row] as f64,
            ColumnData::Sym(v) => v.get(row) as f64,
            _ => panic!("read_f64 on non-numeric column type"),
        }
    }

    pub fn read_bool(&self, row: usize) -> bool {
        let row = if self.0.is_atom { 0 } else { row };
        match &self.0.data {
            ColumnData::Bool(v) => v[row] != 0,
            _ => panic!("read_bool on non-bool column"),
        }
    }

    pub fn read_str(&self, row: usize) -> &str {
        let row = if self.0.is_atom { 0 } else { row };
        match &self.0.data {
            ColumnData::Str(v) => &v[row],
            _ => panic!("read_str on non-str column"),
        }
    }

    pub fn read_sym_id(&self, row: usize) -> i64 {
        let row = if self.0.is_atom { 0 } else { row };
        match &self.0.data {
            ColumnData::Sym(v) => v.get(row),
            _ => self.read_i64(row),
        }
    }

    /// Resolve a STR atom against `syms` to an intern id, per spec.md §4.6
    /// ("A `STR` atom compared to a `SYM` column resolves via `sym_find`").
    pub fn resolve_sym_find(&self, syms: &SymbolTable) -> Option<i64> {
        self.as_str_atom().and_then(|s| syms.find(s))
    }
}

/// An ordered list of (name-sym-id, column) pairs; all columns share a row
/// count (spec.md §3).
#[derive(Clone, Default)]
pub struct Table {
    cols: Vec<(i64, Column)>,
    nrows: usize,
}

impl Table {
    pub fn new() -> Self {
        Table::default()
    }

    pub fn empty_like(&self) -> Table {
        let cols = self
            .cols
            .iter()
            .map(|(name, col)| (*name, empty_column_like(col)))
            .collect();
        Table { cols, nrows: 0 }
    }

    pub fn add_col(&mut self, name: i64, col: Column) {
        if self.cols.is_empty() {
            self.nrows = col.len();
        } else {
            debug_assert_eq!(col.len(), self.nrows, "table column length mismatch");
        }
        self.cols.push((name, col));
    }

    pub fn ncols(&self) -> usize {
        self.cols.len()
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn col_name(&self, idx: usize) -> i64 {
        self.cols[idx].0
    }

    pub fn col(&self, idx: usize) -> &Column {
        &self.cols[idx].1
    }

    pub fn cols(&self) -> &[(i64, Column)] {
        &self.cols
    }

    pub fn col_by_name(&self, name: i64) -> Option<&Column> {
        self.cols.iter().find(|(n, _)| *n == name).map(|(_, c)| c)
    }

    pub fn col_idx_by_name(&self, name: i64) -> Option<usize> {
        self.cols.iter().position(|(n, _)| *n == name)
    }

    pub fn set_col(&mut self, idx: usize, col: Column) {
        self.cols[idx].1 = col;
    }

    pub fn set_col_name(&mut self, idx: usize, name: i64) {
        self.cols[idx].0 = name;
    }

    pub fn with_nrows(cols: Vec<(i64, Column)>, nrows: usize) -> Self {
        Table { cols, nrows }
    }
}

fn empty_column_like(col: &Column) -> Column {
    let data = match col.data() {
        ColumnData::F64(_) => ColumnData::F64(vec![]),
        ColumnData::I64(_) => ColumnData::I64(vec![]),
        ColumnData::I32(_) => ColumnData::I32(vec![]),
        ColumnData::I16(_) => ColumnData::I16(vec![]),
        ColumnData::U8(_) => ColumnData::U8(vec![]),
        ColumnData::Bool(_) => ColumnData::Bool(vec![]),
        ColumnData::Sym(_) => ColumnData::Sym(SymWidth::W8(vec![])),
        ColumnData::Timestamp(_) => ColumnData::Timestamp(vec![]),
        ColumnData::Date(_) => ColumnData::Date(vec![]),
        ColumnData::Time(_) => ColumnData::Time(vec![]),
        ColumnData::Str(_) => ColumnData::Str(vec![]),
        ColumnData::Table(_) => ColumnData::Table(Table::new()),
        ColumnData::Parted(_) => ColumnData::Parted(vec![]),
        ColumnData::MapCommon { values, .. } => ColumnData::MapCommon {
            values: Box::new(empty_column_like(values)),
            counts: vec![],
        },
    };
    Column::new(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sym_width_picks_smallest_width() {
        assert!(matches!(SymWidth::from_ids(&[1, 2, 3]), SymWidth::W8(_)));
        assert!(matches!(
            SymWidth::from_ids(&[1, 300]),
            SymWidth::W16(_)
        ));
        assert!(matches!(
            SymWidth::from_ids(&[1, 70_000]),
            SymWidth::W32(_)
        ));
    }

    #[test]
    fn null_bitmap_roundtrip() {
        let nb = NullBitmap::from_flags(&[false, true, false, true, true]);
        assert!(!nb.get(0));
        assert!(nb.get(1));
        assert!(nb.get(4));
        assert!(nb.any_null());
    }

    #[test]
    fn table_rejects_mismatched_lengths_in_debug() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 2, 3])));
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 1);
    }
}
