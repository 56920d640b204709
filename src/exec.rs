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

//! Recursive executor (spec.md §4.14): `execute(graph, root)` walks the
//! graph bottom-up, threading a lazily-AND-merged [`Sel`] alongside each
//! intermediate table instead of compacting after every `FILTER`. A
//! handful of node shapes are recognized as fusions before falling back
//! to the general per-opcode dispatch:
//!
//! - `FILTER(GROUP)` is HAVING: the predicate compiles and evaluates
//!   against the `GROUP` node's own result table.
//! - `HEAD(SORT(x))` runs the sort with a limit instead of sorting the
//!   full input and truncating after.
//! - `HEAD(FILTER(x))` stops gathering at the limit ([`crate::filter::filter_head`])
//!   instead of compacting the whole selection first.
//! - `HEAD(GROUP)` passes a `group_limit` through to the group node.
//!
//! Every other relational node compacts any pending selection before it
//! runs — a `SORT`/`JOIN`/`WINDOW`/`GROUP` kernel expects a concrete row
//! set, not a lazy bitmap.

use crate::config::ExecConfig;
pub use crate::error::{Error, Result};
use crate::expr;
use crate::filter;
use crate::gather::gather_table;
use crate::graph::{Graph, Op, OpId};
use crate::group;
use crate::join;
use crate::parted;
use crate::pool::Pool;
use crate::reduce;
use crate::sel::Sel;
use crate::sort;
use crate::symtab::SymbolTable;
use crate::table::{Column, ColumnData, Table};
use crate::window;

/// Runtime resources a query executes against: the symbol table, tunable
/// config, and worker pool. The donor's `Context` owns an arena, a
/// symbol table, and a thread pool behind FFI init/teardown calls;
/// `Column`/`Table` here own their memory directly (no arena to manage),
/// so `Engine` only needs to bundle the other two plus the pool.
pub struct Engine {
    pub syms: SymbolTable,
    pub cfg: ExecConfig,
    pub pool: Pool,
}

impl Engine {
    pub fn new(workers: usize) -> Self {
        Engine { syms: SymbolTable::new(), cfg: ExecConfig::default(), pool: Pool::new(workers) }
    }

    pub fn with_available_parallelism() -> Self {
        Engine { syms: SymbolTable::new(), cfg: ExecConfig::default(), pool: Pool::with_available_parallelism() }
    }
}

struct Ctx<'a> {
    graph: &'a Graph,
    base: &'a Table,
    syms: &'a SymbolTable,
    cfg: &'a ExecConfig,
    pool: &'a Pool,
}

/// Entry point (spec.md §6): `execute(engine, graph, root_op, table)` walks
/// `graph` from `root`, scanning `table` wherever the graph hits a `Scan`
/// node. Clears the pool's cancellation flag on entry; if the root's own
/// evaluation left a selection pending (a `FILTER` with no downstream
/// consumer to fuse into), compacts it before returning.
pub fn execute(engine: &Engine, graph: &Graph, root: OpId, table: &Table) -> Result<Table> {
    let _span = tracing::debug_span!("execute", nodes = graph.len(), root).entered();
    engine.pool.reset_cancellation();
    let ctx = Ctx { graph, base: table, syms: &engine.syms, cfg: &engine.cfg, pool: &engine.pool };
    let (tbl, sel) = eval(&ctx, root)?;
    let out = compact(tbl, sel);
    tracing::debug!(rows = out.nrows(), "execute complete");
    Ok(out)
}

fn compact(table: Table, sel: Option<Sel>) -> Table {
    match sel {
        Some(s) => filter::materialize(&table, &s),
        None => table,
    }
}

fn head_rows(table: &Table, n: usize) -> Table {
    let idx: Vec<i64> = (0..table.nrows().min(n) as i64).collect();
    gather_table(table, &idx, false)
}

fn tail_rows(table: &Table, n: usize) -> Table {
    let start = table.nrows().saturating_sub(n);
    let idx: Vec<i64> = (start as i64..table.nrows() as i64).collect();
    gather_table(table, &idx, false)
}

fn eval_pred(ctx: &Ctx, table: &Table, pred: &expr::Expr) -> Result<Column> {
    let compiled = expr::compile(pred, table)?;
    Ok(expr::eval(&compiled, table, ctx.syms))
}

fn eval_group(ctx: &Ctx, table: &Table, keys: &[i64], aggs: &[group::AggSpec], limit: Option<usize>) -> Result<Table> {
    let grouped = if parted::is_parted_group(table, keys, aggs) {
        parted::exec_group_parted(table, keys, aggs, ctx.syms, ctx.cfg, ctx.pool)?
    } else {
        group::group_by(table, keys, aggs, ctx.syms, ctx.cfg, ctx.pool)?
    };
    Ok(match limit {
        Some(n) => head_rows(&grouped, n),
        None => grouped,
    })
}

/// Evaluates `id`, returning its result table plus any selection that's
/// still only lazily merged (not yet compacted into that table).
fn eval(ctx: &Ctx, id: OpId) -> Result<(Table, Option<Sel>)> {
    if ctx.pool.is_cancelled() {
        return Err(Error::Cancel);
    }
    tracing::trace!(op = id, "eval node");
    match ctx.graph.node(id) {
        Op::Scan => Ok((ctx.base.clone(), None)),
        Op::ConstTable(t) => Ok((t.clone(), None)),

        Op::Filter { input, pred } => {
            let (table, sel) = eval(ctx, *input)?;
            let pred_col = eval_pred(ctx, &table, pred)?;
            let new_sel = Sel::from_pred(&pred_col, ctx.cfg, ctx.pool);
            let merged = match sel {
                Some(s) => Sel::and(&s, &new_sel),
                None => new_sel,
            };
            Ok((table, Some(merged)))
        }

        Op::Sort { input, keys, limit } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            let sorted = match limit {
                Some(n) => sort::sort_topn(&table, keys, *n, ctx.syms, ctx.cfg, ctx.pool)?,
                None => sort::sort_table(&table, keys, ctx.syms, ctx.cfg, ctx.pool)?,
            };
            Ok((sorted, None))
        }

        Op::Group { input, keys, aggs, group_limit } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            Ok((eval_group(ctx, &table, keys, aggs, *group_limit)?, None))
        }

        Op::Distinct { input, keys } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            Ok((eval_group(ctx, &table, keys, &[], None)?, None))
        }

        Op::Join { left, right, left_keys, right_keys, join_type } => {
            let (ltbl, lsel) = eval(ctx, *left)?;
            let ltbl = compact(ltbl, lsel);
            let (rtbl, rsel) = eval(ctx, *right)?;
            let rtbl = compact(rtbl, rsel);
            let out = join::hash_join(&ltbl, left_keys, &rtbl, right_keys, *join_type, ctx.cfg, ctx.pool)?;
            Ok((out, None))
        }

        Op::Window { input, part_keys, order_keys, specs } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            let out = window::exec_window(&table, part_keys, order_keys, specs, ctx.syms, ctx.cfg, ctx.pool)?;
            Ok((out, None))
        }

        Op::Head { input, n } => eval_head(ctx, *input, *n),

        Op::Tail { input, n } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            Ok((tail_rows(&table, *n), None))
        }

        Op::Reduce { input, col, op, out } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            let src = match col {
                Some(name) => table.col_by_name(*name).ok_or(Error::Schema)?,
                None => table.cols().first().map(|(_, c)| c).ok_or(Error::Schema)?,
            };
            let result = reduce::reduce(*op, src, ctx.cfg, ctx.pool)?;
            let mut out_table = Table::new();
            let data = match result {
                reduce::ReduceResult::F64(v) => ColumnData::F64(vec![v]),
                reduce::ReduceResult::I64(v) => ColumnData::I64(vec![v]),
            };
            out_table.add_col(*out, Column::new(data));
            Ok((out_table, None))
        }

        Op::Project { input, cols } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            let mut out = Table::new();
            for pc in cols {
                let compiled = expr::compile(&pc.expr, &table)?;
                let col = expr::eval(&compiled, &table, ctx.syms);
                out.add_col(pc.out, col);
            }
            Ok((out, None))
        }

        Op::Select { input, cols } => {
            let (table, sel) = eval(ctx, *input)?;
            let table = compact(table, sel);
            let mut out = Table::new();
            for &name in cols {
                let col = table.col_by_name(name).ok_or(Error::Schema)?;
                out.add_col(name, col.clone());
            }
            Ok((out, None))
        }

        Op::Alias { input, from, to } => {
            let (table, sel) = eval(ctx, *input)?;
            let mut table = compact(table, sel);
            let idx = table.col_idx_by_name(*from).ok_or(Error::Schema)?;
            table.set_col_name(idx, *to);
            Ok((table, None))
        }

        Op::Materialize { input } => {
            let (table, sel) = eval(ctx, *input)?;
            Ok((compact(table, sel), None))
        }
    }
}

/// `HEAD` fusions (spec.md §4.14): inspect the input node shape before
/// falling back to a plain row-count truncation.
fn eval_head(ctx: &Ctx, input: OpId, n: usize) -> Result<(Table, Option<Sel>)> {
    match ctx.graph.node(input) {
        Op::Sort { input: sort_input, keys, .. } => {
            let (table, sel) = eval(ctx, *sort_input)?;
            let table = compact(table, sel);
            let sorted = sort::sort_topn(&table, keys, n, ctx.syms, ctx.cfg, ctx.pool)?;
            Ok((sorted, None))
        }
        Op::Filter { input: filt_input, pred } => {
            let (table, sel) = eval(ctx, *filt_input)?;
            let pred_col = eval_pred(ctx, &table, pred)?;
            let new_sel = Sel::from_pred(&pred_col, ctx.cfg, ctx.pool);
            let merged = match sel {
                Some(s) => Sel::and(&s, &new_sel),
                None => new_sel,
            };
            Ok((filter::filter_head(&table, &merged, n), None))
        }
        Op::Group { input: grp_input, keys, aggs, .. } => {
            let (table, sel) = eval(ctx, *grp_input)?;
            let table = compact(table, sel);
            Ok((eval_group(ctx, &table, keys, aggs, Some(n))?, None))
        }
        _ => {
            let (table, sel) = eval(ctx, input)?;
            let table = compact(table, sel);
            Ok((head_rows(&table, n), None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinOp, Expr};
    use crate::group::{AggOp, AggSpec};
    use crate::sort::SortKey;
    use crate::table::ColumnData;

    fn sample() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 2, 3, 4, 5])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 30.0, 40.0, 50.0])));
        t
    }

    #[test]
    fn filter_then_head_fuses_into_filter_head() {
        let t = sample();
        let engine = Engine::new(1);
        let mut g = Graph::new();
        let scan = g.scan();
        let pred = Expr::Bin(BinOp::Gt, Box::new(Expr::Col(0)), Box::new(Expr::ConstI64(1)));
        let filtered = g.filter(scan, pred);
        let limited = g.head(filtered, 2);
        let out = execute(&engine, &g, limited, &t).unwrap();
        assert_eq!(out.nrows(), 2);
        assert_eq!(out.col(0).read_i64(0), 2);
        assert_eq!(out.col(0).read_i64(1), 3);
    }

    #[test]
    fn sort_then_head_fuses_into_topn() {
        let t = sample();
        let engine = Engine::new(1);
        let mut g = Graph::new();
        let scan = g.scan();
        let sorted = g.sort(scan, vec![SortKey { col: 1, desc: true }]);
        let limited = g.head(sorted, 2);
        let out = execute(&engine, &g, limited, &t).unwrap();
        assert_eq!(out.nrows(), 2);
        assert_eq!(out.col(1).read_f64(0), 50.0);
        assert_eq!(out.col(1).read_f64(1), 40.0);
    }

    #[test]
    fn having_filters_the_group_result() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 1, 2, 2])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 1.0, 1.0])));
        let engine = Engine::new(1);
        let mut g = Graph::new();
        let scan = g.scan();
        let grouped = g.group(scan, vec![0], vec![AggSpec { col: Some(1), op: AggOp::Sum, out: 10 }]);
        let having = Expr::Bin(BinOp::Gt, Box::new(Expr::Col(10)), Box::new(Expr::ConstF64(10.0)));
        let filtered = g.filter(grouped, having);
        let out = execute(&engine, &g, filtered, &t).unwrap();
        assert_eq!(out.nrows(), 1);
        assert_eq!(out.col(0).read_i64(0), 1);
    }

    #[test]
    fn reduce_node_produces_single_row_table() {
        let t = sample();
        let engine = Engine::new(1);
        let mut g = Graph::new();
        let scan = g.scan();
        let sum = g.reduce(scan, Some(1), reduce::AggOp::Sum, 99);
        let out = execute(&engine, &g, sum, &t).unwrap();
        assert_eq!(out.nrows(), 1);
        assert_eq!(out.col_by_name(99).unwrap().read_f64(0), 150.0);
    }
}
