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

//! Operator graph (spec.md §3, §4.14): nodes with an opcode, up to two
//! table inputs, and an extension record carrying op-specific parameters
//! (group keys/aggs, sort columns, window frame bounds, join keys, ...).
//! `Graph` owns every node in a flat `Vec` addressed by stable `OpId`
//! rather than the donor's arena of raw `td_op_t` pointers — the same
//! "nodes never mutate once built, the executor only reads them" contract,
//! built the safe way since there is no C allocator underneath this crate.
//!
//! Element-wise predicates and projected columns are [`crate::expr::Expr`]
//! trees rather than their own graph nodes: an `Expr::Col` already refers
//! to a table column by name, so it doesn't need a graph input edge the
//! way a relational operator does.

use crate::expr::Expr;
use crate::group::AggSpec;
use crate::join::JoinType;
use crate::reduce::AggOp as ReduceOp;
use crate::sort::SortKey;
use crate::table::Table;
use crate::window::WindowSpec;

pub type OpId = u32;

/// One named output column of a `PROJECT` (spec.md §3 supplemental:
/// `OP_PROJECT`/`OP_SELECT`/`OP_ALIAS` as distinct opcodes).
#[derive(Debug, Clone)]
pub struct ProjectCol {
    pub out: i64,
    pub expr: Expr,
}

/// A graph node. Every variant that consumes a table names its input(s)
/// by `OpId`; `Scan` is the only source (the table `execute` is bound to).
#[derive(Clone)]
pub enum Op {
    /// The bound input table.
    Scan,
    /// A constant table node (spec.md §6's `const_table`), for the side
    /// of a `JOIN` that isn't the bound input — e.g. a small lookup table
    /// built once and reused across queries.
    ConstTable(Table),
    /// `OP_FILTER(input, pred)`.
    Filter { input: OpId, pred: Expr },
    /// `OP_SORT`.
    Sort { input: OpId, keys: Vec<SortKey>, limit: Option<usize> },
    /// `OP_GROUP`. `group_limit` is the `HEAD(GROUP)` fusion parameter
    /// (spec.md §4.14) — truncates the per-partition loop in
    /// [`crate::parted::exec_group_parted`] when set.
    Group { input: OpId, keys: Vec<i64>, aggs: Vec<AggSpec>, group_limit: Option<usize> },
    /// `Table::distinct(keys)` (SPEC_FULL.md §3): `GROUP BY keys` with no
    /// aggregates.
    Distinct { input: OpId, keys: Vec<i64> },
    /// `OP_JOIN`.
    Join { left: OpId, right: OpId, left_keys: Vec<i64>, right_keys: Vec<i64>, join_type: JoinType },
    /// `OP_WINDOW`.
    Window { input: OpId, part_keys: Vec<i64>, order_keys: Vec<i64>, specs: Vec<WindowSpec> },
    /// `OP_HEAD(n)` / `OP_TAIL(n)`.
    Head { input: OpId, n: usize },
    Tail { input: OpId, n: usize },
    /// Whole-column reduction (`SUM`, `COUNT`, ..., `COUNT_DISTINCT`) run
    /// as a root op over one input column, producing a one-row table.
    Reduce { input: OpId, col: Option<i64>, op: ReduceOp, out: i64 },
    /// `OP_PROJECT`: evaluate a list of column expressions against the
    /// bound input table.
    Project { input: OpId, cols: Vec<ProjectCol> },
    /// `OP_SELECT`: `PROJECT` with pass-through column references only.
    Select { input: OpId, cols: Vec<i64> },
    /// `OP_ALIAS`: rename a bound column without copying it.
    Alias { input: OpId, from: i64, to: i64 },
    /// `OP_MATERIALIZE`: force any pending selection to compact now.
    Materialize { input: OpId },
}

/// A lazy operation graph: a flat node arena plus the table the leaf
/// `Scan` nodes are bound to. Built once, executed by [`crate::exec`].
pub struct Graph {
    nodes: Vec<Op>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    fn push(&mut self, op: Op) -> OpId {
        let id = self.nodes.len() as OpId;
        self.nodes.push(op);
        id
    }

    pub fn node(&self, id: OpId) -> &Op {
        &self.nodes[id as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ---- builder methods, one per opcode (spec.md §6's enumerated list) --

    pub fn scan(&mut self) -> OpId {
        self.push(Op::Scan)
    }

    pub fn const_table(&mut self, table: Table) -> OpId {
        self.push(Op::ConstTable(table))
    }

    pub fn filter(&mut self, input: OpId, pred: Expr) -> OpId {
        self.push(Op::Filter { input, pred })
    }

    pub fn sort(&mut self, input: OpId, keys: Vec<SortKey>) -> OpId {
        self.push(Op::Sort { input, keys, limit: None })
    }

    pub fn group(&mut self, input: OpId, keys: Vec<i64>, aggs: Vec<AggSpec>) -> OpId {
        self.push(Op::Group { input, keys, aggs, group_limit: None })
    }

    pub fn distinct(&mut self, input: OpId, keys: Vec<i64>) -> OpId {
        self.push(Op::Distinct { input, keys })
    }

    pub fn join(
        &mut self,
        left: OpId,
        right: OpId,
        left_keys: Vec<i64>,
        right_keys: Vec<i64>,
        join_type: JoinType,
    ) -> OpId {
        self.push(Op::Join { left, right, left_keys, right_keys, join_type })
    }

    pub fn window(
        &mut self,
        input: OpId,
        part_keys: Vec<i64>,
        order_keys: Vec<i64>,
        specs: Vec<WindowSpec>,
    ) -> OpId {
        self.push(Op::Window { input, part_keys, order_keys, specs })
    }

    pub fn head(&mut self, input: OpId, n: usize) -> OpId {
        self.push(Op::Head { input, n })
    }

    pub fn tail(&mut self, input: OpId, n: usize) -> OpId {
        self.push(Op::Tail { input, n })
    }

    pub fn reduce(&mut self, input: OpId, col: Option<i64>, op: ReduceOp, out: i64) -> OpId {
        self.push(Op::Reduce { input, col, op, out })
    }

    pub fn project(&mut self, input: OpId, cols: Vec<ProjectCol>) -> OpId {
        self.push(Op::Project { input, cols })
    }

    pub fn select(&mut self, input: OpId, cols: Vec<i64>) -> OpId {
        self.push(Op::Select { input, cols })
    }

    pub fn alias(&mut self, input: OpId, from: i64, to: i64) -> OpId {
        self.push(Op::Alias { input, from, to })
    }

    pub fn materialize(&mut self, input: OpId) -> OpId {
        self.push(Op::Materialize { input })
    }

    /// `HEAD(SORT(x))` / `HEAD(GROUP)` fusion (spec.md §4.14): attach a
    /// limit to an already-built `SORT`/`GROUP` node instead of wrapping
    /// it in a separate `HEAD`, so the executor can stop early.
    pub fn fuse_head_limit(&mut self, op: OpId, n: usize) -> bool {
        match &mut self.nodes[op as usize] {
            Op::Sort { limit, .. } => {
                *limit = Some(n);
                true
            }
            Op::Group { group_limit, .. } => {
                *group_limit = Some(n);
                true
            }
            _ => false,
        }
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reduce::AggOp;

    #[test]
    fn builder_chains_nodes_by_opid() {
        let mut g = Graph::new();
        let scan = g.scan();
        let filtered = g.filter(scan, Expr::ConstBool(true));
        let sorted = g.sort(filtered, vec![SortKey { col: 0, desc: false }]);
        let limited = g.head(sorted, 10);
        assert_eq!(g.len(), 4);
        match g.node(limited) {
            Op::Head { input, n } => {
                assert_eq!(*input, sorted);
                assert_eq!(*n, 10);
            }
            _ => panic!("expected Head node"),
        }
    }

    #[test]
    fn fuse_head_limit_rewrites_sort_in_place() {
        let mut g = Graph::new();
        let scan = g.scan();
        let sorted = g.sort(scan, vec![SortKey { col: 0, desc: false }]);
        assert!(g.fuse_head_limit(sorted, 5));
        match g.node(sorted) {
            Op::Sort { limit, .. } => assert_eq!(*limit, Some(5)),
            _ => panic!("expected Sort node"),
        }
    }

    #[test]
    fn reduce_node_carries_agg_op() {
        let mut g = Graph::new();
        let scan = g.scan();
        let sum = g.reduce(scan, Some(1), AggOp::Sum, 2);
        match g.node(sum) {
            Op::Reduce { op, col, out, .. } => {
                assert_eq!(*op, AggOp::Sum);
                assert_eq!(*col, Some(1));
                assert_eq!(*out, 2);
            }
            _ => panic!("expected Reduce node"),
        }
    }
}
