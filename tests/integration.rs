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

//! Integration tests for the native graph API.
//!
//! Builds a small in-memory table (~20 rows) shaped like the h2oai groupby
//! benchmark's schema (`id1..id3` symbolic, `v1..v3` numeric) and exercises
//! the graph builder + executor end to end: scan, filter, arithmetic,
//! group-by, sort, join, head/tail, project, alias, string ops, cast,
//! date extraction, and error handling.

use teide_core::exec::{execute, Engine};
use teide_core::expr::{BinOp, Expr, StrFn, UnOp};
use teide_core::graph::{Graph, ProjectCol};
use teide_core::group::{AggOp as GroupAggOp, AggSpec};
use teide_core::join::JoinType;
use teide_core::reduce::AggOp as ReduceAggOp;
use teide_core::sort::SortKey;
use teide_core::symtab::SymbolTable;
use teide_core::table::{Column, ColumnData, ElemType, Table};
use teide_core::Error;

const ID1: i64 = 1;
const ID2: i64 = 2;
const V1: i64 = 11;
const V2: i64 = 12;
const V3: i64 = 13;
const NAME: i64 = 20;

/// `id1`: one of "a","b","c","d" repeating; `id2`: small int group; `v1`:
/// 1..5 repeating; `v2`: 1.0..20.0; `v3`: a row index as f64. 20 rows,
/// matching the donor's inline-dataset row count.
fn sample(syms: &SymbolTable) -> Table {
    let labels = ["a", "b", "c", "d"];
    let mut id1_ids = Vec::with_capacity(20);
    let mut id2 = Vec::with_capacity(20);
    let mut v1 = Vec::with_capacity(20);
    let mut v2 = Vec::with_capacity(20);
    let mut v3 = Vec::with_capacity(20);
    let mut name = Vec::with_capacity(20);
    for i in 0..20i64 {
        let label = labels[(i % 4) as usize];
        id1_ids.push(syms.intern(label));
        id2.push(i % 3);
        v1.push((i % 5) + 1);
        v2.push(((i % 5) + 1) as f64 * 2.0);
        v3.push(i as f64);
        name.push(Box::from(format!("row{i}")) as Box<str>);
    }
    let mut t = Table::new();
    t.add_col(ID1, Column::new(ColumnData::Sym(teide_core::table::SymWidth::from_ids(&id1_ids))));
    t.add_col(ID2, Column::new(ColumnData::I64(id2)));
    t.add_col(V1, Column::new(ColumnData::I64(v1)));
    t.add_col(V2, Column::new(ColumnData::F64(v2)));
    t.add_col(V3, Column::new(ColumnData::F64(v3)));
    t.add_col(NAME, Column::new(ColumnData::Str(name)));
    t
}

fn engine() -> Engine {
    Engine::new(4)
}

#[test]
fn scan_returns_input_unchanged() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let out = execute(&e, &g, scan, &t).unwrap();
    assert_eq!(out.nrows(), 20);
}

#[test]
fn filter_keeps_matching_rows() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let pred = Expr::Bin(BinOp::Gt, Box::new(Expr::Col(V1)), Box::new(Expr::ConstI64(3)));
    let filtered = g.filter(scan, pred);
    let out = execute(&e, &g, filtered, &t).unwrap();
    assert!(out.nrows() > 0);
    for row in 0..out.nrows() {
        assert!(out.col_by_name(V1).unwrap().read_i64(row) > 3);
    }
}

#[test]
fn arithmetic_projection_computes_elementwise() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let expr = Expr::Bin(BinOp::Add, Box::new(Expr::Col(V2)), Box::new(Expr::Col(V3)));
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr }]);
    let out = execute(&e, &g, projected, &t).unwrap();
    assert_eq!(out.nrows(), 20);
    let expected = t.col_by_name(V2).unwrap().read_f64(0) + t.col_by_name(V3).unwrap().read_f64(0);
    assert_eq!(out.col_by_name(100).unwrap().read_f64(0), expected);
}

#[test]
fn group_by_sums_per_key() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let grouped = g.group(scan, vec![ID2], vec![AggSpec { col: Some(V1), op: GroupAggOp::Sum, out: 100 }]);
    let out = execute(&e, &g, grouped, &t).unwrap();
    assert_eq!(out.nrows(), 3);
    let total: f64 = (0..out.nrows()).map(|r| out.col_by_name(100).unwrap().read_f64(r)).sum();
    let expected: i64 = (0..20i64).map(|i| (i % 5) + 1).sum();
    assert_eq!(total, expected as f64);
}

#[test]
fn zero_key_group_by_reduces_the_whole_table() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let grouped = g.group(scan, vec![], vec![AggSpec { col: Some(V1), op: GroupAggOp::Sum, out: 100 }]);
    let out = execute(&e, &g, grouped, &t).unwrap();
    assert_eq!(out.nrows(), 1);
    let expected: i64 = (0..20i64).map(|i| (i % 5) + 1).sum();
    assert_eq!(out.col_by_name(100).unwrap().read_f64(0), expected as f64);
}

#[test]
fn sample_stddev_on_a_single_row_group_is_nan() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let head = g.head(scan, 1);
    let grouped = g.group(head, vec![ID2], vec![AggSpec { col: Some(V1), op: GroupAggOp::Stddev, out: 100 }]);
    let out = execute(&e, &g, grouped, &t).unwrap();
    assert_eq!(out.nrows(), 1);
    assert!(out.col_by_name(100).unwrap().read_f64(0).is_nan());
}

#[test]
fn having_filters_group_result() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let grouped = g.group(scan, vec![ID2], vec![AggSpec { col: Some(V1), op: GroupAggOp::Sum, out: 100 }]);
    let having = Expr::Bin(BinOp::Gt, Box::new(Expr::Col(100)), Box::new(Expr::ConstI64(0)));
    let filtered = g.filter(grouped, having);
    let out = execute(&e, &g, filtered, &t).unwrap();
    assert!(out.nrows() <= 3);
}

#[test]
fn sort_orders_rows_ascending() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let sorted = g.sort(scan, vec![SortKey { col: V1, desc: false }]);
    let out = execute(&e, &g, sorted, &t).unwrap();
    for r in 1..out.nrows() {
        assert!(out.col_by_name(V1).unwrap().read_i64(r - 1) <= out.col_by_name(V1).unwrap().read_i64(r));
    }
}

#[test]
fn sort_then_head_returns_topn() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let sorted = g.sort(scan, vec![SortKey { col: V1, desc: true }]);
    let limited = g.head(sorted, 3);
    let out = execute(&e, &g, limited, &t).unwrap();
    assert_eq!(out.nrows(), 3);
    assert_eq!(out.col_by_name(V1).unwrap().read_i64(0), 5);
}

#[test]
fn join_inner_matches_on_key() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();

    let a_ids: Vec<i64> = ["a", "b"].iter().map(|s| syms.intern(s)).collect();
    let mut right = Table::new();
    right.add_col(ID1, Column::new(ColumnData::Sym(teide_core::table::SymWidth::from_ids(&a_ids))));
    right.add_col(V2, Column::new(ColumnData::F64(vec![1000.0, 2000.0])));

    let mut g = Graph::new();
    let left = g.scan();
    let right_node = g.const_table(right);
    let joined = g.join(left, right_node, vec![ID1], vec![ID1], JoinType::Inner);
    let out = execute(&e, &g, joined, &t).unwrap();
    assert!(out.nrows() > 0);
    assert!(out.nrows() < t.nrows());
}

#[test]
fn join_left_keeps_unmatched_rows() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();

    let a_ids: Vec<i64> = ["a"].iter().map(|s| syms.intern(s)).collect();
    let mut right = Table::new();
    right.add_col(ID1, Column::new(ColumnData::Sym(teide_core::table::SymWidth::from_ids(&a_ids))));
    right.add_col(V2, Column::new(ColumnData::F64(vec![42.0])));

    let mut g = Graph::new();
    let left = g.scan();
    let right_node = g.const_table(right);
    let joined = g.join(left, right_node, vec![ID1], vec![ID1], JoinType::Left);
    let out = execute(&e, &g, joined, &t).unwrap();
    assert_eq!(out.nrows(), t.nrows());
}

#[test]
fn head_and_tail_slice_row_count() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();

    let mut g1 = Graph::new();
    let scan1 = g1.scan();
    let head = g1.head(scan1, 5);
    let out1 = execute(&e, &g1, head, &t).unwrap();
    assert_eq!(out1.nrows(), 5);
    assert_eq!(out1.col_by_name(V3).unwrap().read_f64(0), 0.0);

    let mut g2 = Graph::new();
    let scan2 = g2.scan();
    let tail = g2.tail(scan2, 5);
    let out2 = execute(&e, &g2, tail, &t).unwrap();
    assert_eq!(out2.nrows(), 5);
    assert_eq!(out2.col_by_name(V3).unwrap().read_f64(4), 19.0);
}

#[test]
fn select_projects_a_column_subset() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let selected = g.select(scan, vec![V1, V2]);
    let out = execute(&e, &g, selected, &t).unwrap();
    assert_eq!(out.cols().len(), 2);
    assert!(out.col_by_name(ID1).is_none());
}

#[test]
fn alias_renames_without_changing_values() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let aliased = g.alias(scan, V1, 999);
    let out = execute(&e, &g, aliased, &t).unwrap();
    assert!(out.col_by_name(V1).is_none());
    assert_eq!(out.col_by_name(999).unwrap().read_i64(0), t.col_by_name(V1).unwrap().read_i64(0));
}

#[test]
fn string_functions_operate_on_str_columns() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let upper = Expr::StrFn(StrFn::Upper, vec![Expr::Col(NAME)]);
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr: upper }]);
    let out = execute(&e, &g, projected, &t).unwrap();
    assert_eq!(out.col_by_name(100).unwrap().read_str(0), "ROW0");
}

#[test]
fn strlen_reports_byte_length() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let len = Expr::StrFn(StrFn::Strlen, vec![Expr::Col(NAME)]);
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr: len }]);
    let out = execute(&e, &g, projected, &t).unwrap();
    assert_eq!(out.col_by_name(100).unwrap().read_i64(0), "row0".len() as i64);
}

#[test]
fn cast_converts_elem_type() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let cast = Expr::Cast(ElemType::F64, Box::new(Expr::Col(V1)));
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr: cast }]);
    let out = execute(&e, &g, projected, &t).unwrap();
    assert_eq!(out.col_by_name(100).unwrap().elem_type(), ElemType::F64);
    assert_eq!(out.col_by_name(100).unwrap().read_f64(0), t.col_by_name(V1).unwrap().read_i64(0) as f64);
}

#[test]
fn unary_negation_flips_sign() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let neg = Expr::Un(UnOp::Neg, Box::new(Expr::Col(V3)));
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr: neg }]);
    let out = execute(&e, &g, projected, &t).unwrap();
    assert_eq!(out.col_by_name(100).unwrap().read_f64(1), -1.0);
}

#[test]
fn reduce_sums_a_whole_column() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let sum = g.reduce(scan, Some(V3), ReduceAggOp::Sum, 100);
    let out = execute(&e, &g, sum, &t).unwrap();
    assert_eq!(out.nrows(), 1);
    let expected: f64 = (0..20i64).map(|i| i as f64).sum();
    assert_eq!(out.col_by_name(100).unwrap().read_f64(0), expected);
}

#[test]
fn distinct_deduplicates_keys() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let dedup = g.distinct(scan, vec![ID2]);
    let out = execute(&e, &g, dedup, &t).unwrap();
    assert_eq!(out.nrows(), 3);
}

#[test]
fn scan_on_missing_column_is_a_schema_error() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let pred = Expr::Bin(BinOp::Gt, Box::new(Expr::Col(9999)), Box::new(Expr::ConstI64(0)));
    let filtered = g.filter(scan, pred);
    let err = execute(&e, &g, filtered, &t).unwrap_err();
    assert_eq!(err, Error::Schema);
}

#[test]
fn concat_arity_out_of_range_is_a_domain_error() {
    let syms = SymbolTable::new();
    let t = sample(&syms);
    let e = engine();
    let mut g = Graph::new();
    let scan = g.scan();
    let bad = Expr::StrFn(StrFn::Concat, vec![Expr::Col(NAME)]);
    let projected = g.project(scan, vec![ProjectCol { out: 100, expr: bad }]);
    let err = execute(&e, &g, projected, &t).unwrap_err();
    assert_eq!(err, Error::Domain);
}
