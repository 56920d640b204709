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

//! Element-wise expression compiler and VM (spec.md §4.6).
//!
//! An [`Expr`] tree is flattened by an iterative post-order DFS (an
//! explicit stack bounded at 64 frames deep) into a linear [`Instr`] list,
//! capped at 48 instructions with at most 16 values live on the evaluation
//! stack at once — past either cap the expression is rejected with
//! [`Error::Domain`] rather than silently degrading. Mismatched numeric
//! operand types are resolved by inserting `Cast` nodes during a promotion
//! pass that runs before flattening.

use crate::datetime::{self, DatePart};
use crate::error::{Error, Result};
use crate::strings;
use crate::symtab::SymbolTable;
use crate::table::{Column, ElemType, Table};

pub const MAX_REGISTERS: usize = 16;
pub const MAX_INSTRS: usize = 48;
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Abs,
    Sqrt,
    Log,
    Exp,
    Ceil,
    Floor,
    IsNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Min,
    Max,
    Like,
    ILike,
}

impl BinOp {
    fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq
                | BinOp::Ne
                | BinOp::Lt
                | BinOp::Le
                | BinOp::Gt
                | BinOp::Ge
                | BinOp::And
                | BinOp::Or
                | BinOp::Like
                | BinOp::ILike
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrFn {
    Upper,
    Lower,
    Trim,
    Strlen,
    Substr,
    Replace,
    Concat,
}

impl StrFn {
    fn check_arity(self, n: usize) -> Result<()> {
        let ok = match self {
            StrFn::Upper | StrFn::Lower | StrFn::Trim | StrFn::Strlen => n == 1,
            StrFn::Substr => n == 3,
            StrFn::Replace => n == 3,
            StrFn::Concat => (2..=16).contains(&n),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Domain)
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Col(i64),
    ConstF64(f64),
    ConstI64(i64),
    ConstBool(bool),
    ConstStr(Box<str>),
    Un(UnOp, Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    Cast(ElemType, Box<Expr>),
    StrFn(StrFn, Vec<Expr>),
    Extract(DatePart, Box<Expr>),
    DateTrunc(DatePart, Box<Expr>),
}

impl Expr {
    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Col(_)
            | Expr::ConstF64(_)
            | Expr::ConstI64(_)
            | Expr::ConstBool(_)
            | Expr::ConstStr(_) => vec![],
            Expr::Un(_, a) | Expr::Cast(_, a) | Expr::Extract(_, a) | Expr::DateTrunc(_, a) => {
                vec![a]
            }
            Expr::Bin(_, a, b) => vec![a, b],
            Expr::If(c, a, b) => vec![c, a, b],
            Expr::StrFn(_, args) => args.iter().collect(),
        }
    }
}

#[derive(Debug, Clone)]
enum Instr {
    LoadCol(i64),
    LoadConstF64(f64),
    LoadConstI64(i64),
    LoadConstBool(bool),
    LoadConstStr(Box<str>),
    Un(UnOp),
    Bin(BinOp),
    If,
    Cast(ElemType),
    StrFn(StrFn, usize),
    Extract(DatePart),
    DateTrunc(DatePart),
}

/// The output of [`compile`]: a flattened instruction list plus the
/// statically inferred result type, ready for [`eval`].
pub struct CompiledExpr {
    instrs: Vec<Instr>,
    result_type: ElemType,
}

impl CompiledExpr {
    pub fn result_type(&self) -> ElemType {
        self.result_type
    }
}

fn rank(t: ElemType) -> u8 {
    use ElemType::*;
    match t {
        F64 => 4,
        I64 | Timestamp => 3,
        I32 | Date | Time => 2,
        I16 => 2,
        U8 | Bool => 1,
        Sym | Str | Table | Parted | MapCommon => 0,
    }
}

fn common_numeric(a: ElemType, b: ElemType) -> ElemType {
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

fn infer_type(expr: &Expr, table: &Table) -> Result<ElemType> {
    Ok(match expr {
        Expr::Col(name) => table.col_by_name(*name).ok_or(Error::Schema)?.elem_type(),
        Expr::ConstF64(_) => ElemType::F64,
        Expr::ConstI64(_) => ElemType::I64,
        Expr::ConstBool(_) => ElemType::Bool,
        Expr::ConstStr(_) => ElemType::Str,
        Expr::Un(op, a) => match op {
            UnOp::Not | UnOp::IsNull => ElemType::Bool,
            UnOp::Sqrt | UnOp::Log | UnOp::Exp | UnOp::Ceil | UnOp::Floor => ElemType::F64,
            UnOp::Neg | UnOp::Abs => infer_type(a, table)?,
        },
        Expr::Bin(op, a, b) => {
            if op.is_comparison() {
                ElemType::Bool
            } else {
                common_numeric(infer_type(a, table)?, infer_type(b, table)?)
            }
        }
        Expr::If(_, a, b) => common_numeric(infer_type(a, table)?, infer_type(b, table)?),
        Expr::Cast(t, _) => *t,
        Expr::StrFn(kind, _) => match kind {
            StrFn::Strlen => ElemType::I64,
            _ => ElemType::Str,
        },
        Expr::Extract(_, _) => ElemType::I64,
        Expr::DateTrunc(_, _) => ElemType::Timestamp,
    })
}

/// Wrap mismatched numeric operands of `Bin`/`If` nodes in `Cast` so every
/// node downstream of a promotion sees operands of one common type
/// (spec.md §4.6: "CAST insertion for type promotion").
fn promote(expr: &Expr, table: &Table) -> Result<Expr> {
    Ok(match expr {
        Expr::Un(op, a) => Expr::Un(*op, Box::new(promote(a, table)?)),
        Expr::Cast(t, a) => Expr::Cast(*t, Box::new(promote(a, table)?)),
        Expr::Extract(p, a) => Expr::Extract(*p, Box::new(promote(a, table)?)),
        Expr::DateTrunc(p, a) => Expr::DateTrunc(*p, Box::new(promote(a, table)?)),
        Expr::Bin(op, a, b) => {
            let pa = promote(a, table)?;
            let pb = promote(b, table)?;
            if op.is_comparison() && !matches!(op, BinOp::Like | BinOp::ILike | BinOp::And | BinOp::Or) {
                let (ta, tb) = (infer_type(&pa, table)?, infer_type(&pb, table)?);
                if ta != tb && ta != ElemType::Str && tb != ElemType::Str && ta != ElemType::Sym && tb != ElemType::Sym {
                    let common = common_numeric(ta, tb);
                    return Ok(Expr::Bin(
                        *op,
                        Box::new(cast_if_needed(pa, ta, common)),
                        Box::new(cast_if_needed(pb, tb, common)),
                    ));
                }
                Expr::Bin(*op, Box::new(pa), Box::new(pb))
            } else if matches!(op, BinOp::Like | BinOp::ILike | BinOp::And | BinOp::Or) {
                Expr::Bin(*op, Box::new(pa), Box::new(pb))
            } else {
                let (ta, tb) = (infer_type(&pa, table)?, infer_type(&pb, table)?);
                let common = common_numeric(ta, tb);
                Expr::Bin(
                    *op,
                    Box::new(cast_if_needed(pa, ta, common)),
                    Box::new(cast_if_needed(pb, tb, common)),
                )
            }
        }
        Expr::If(c, a, b) => {
            let pc = promote(c, table)?;
            let pa = promote(a, table)?;
            let pb = promote(b, table)?;
            let (ta, tb) = (infer_type(&pa, table)?, infer_type(&pb, table)?);
            let common = common_numeric(ta, tb);
            Expr::If(
                Box::new(pc),
                Box::new(cast_if_needed(pa, ta, common)),
                Box::new(cast_if_needed(pb, tb, common)),
            )
        }
        Expr::StrFn(kind, args) => {
            let promoted: Result<Vec<Expr>> = args.iter().map(|a| promote(a, table)).collect();
            Expr::StrFn(*kind, promoted?)
        }
        leaf => leaf.clone(),
    })
}

fn cast_if_needed(e: Expr, from: ElemType, to: ElemType) -> Expr {
    if from == to {
        e
    } else {
        Expr::Cast(to, Box::new(e))
    }
}

/// Compile `expr` against `table`'s schema, producing a flattened
/// instruction stream ready for repeated [`eval`] calls.
pub fn compile(expr: &Expr, table: &Table) -> Result<CompiledExpr> {
    let promoted = promote(expr, table)?;
    let result_type = infer_type(&promoted, table)?;
    if let Expr::StrFn(kind, args) = &promoted {
        kind.check_arity(args.len())?;
    }
    let instrs = flatten(&promoted)?;
    Ok(CompiledExpr { instrs, result_type })
}

enum StackItem<'a> {
    Expand(&'a Expr, usize),
    Emit(&'a Expr),
}

fn flatten(root: &Expr) -> Result<Vec<Instr>> {
    let mut stack = vec![StackItem::Expand(root, 1)];
    let mut instrs = Vec::new();
    let mut live: i64 = 0;
    let mut max_live: i64 = 0;
    while let Some(item) = stack.pop() {
        match item {
            StackItem::Expand(e, depth) => {
                if depth > MAX_DEPTH {
                    return Err(Error::Domain);
                }
                if let Expr::StrFn(kind, args) = e {
                    kind.check_arity(args.len())?;
                }
                stack.push(StackItem::Emit(e));
                for c in e.children().into_iter().rev() {
                    stack.push(StackItem::Expand(c, depth + 1));
                }
            }
            StackItem::Emit(e) => {
                let arity = e.children().len() as i64;
                instrs.push(to_instr(e));
                if instrs.len() > MAX_INSTRS {
                    return Err(Error::Domain);
                }
                live = live - arity + 1;
                max_live = max_live.max(live);
            }
        }
    }
    if max_live > MAX_REGISTERS as i64 {
        return Err(Error::Domain);
    }
    Ok(instrs)
}

fn to_instr(e: &Expr) -> Instr {
    match e {
        Expr::Col(id) => Instr::LoadCol(*id),
        Expr::ConstF64(v) => Instr::LoadConstF64(*v),
        Expr::ConstI64(v) => Instr::LoadConstI64(*v),
        Expr::ConstBool(v) => Instr::LoadConstBool(*v),
        Expr::ConstStr(v) => Instr::LoadConstStr(v.clone()),
        Expr::Un(op, _) => Instr::Un(*op),
        Expr::Bin(op, _, _) => Instr::Bin(*op),
        Expr::If(..) => Instr::If,
        Expr::Cast(t, _) => Instr::Cast(*t),
        Expr::StrFn(kind, args) => Instr::StrFn(*kind, args.len()),
        Expr::Extract(p, _) => Instr::Extract(*p),
        Expr::DateTrunc(p, _) => Instr::DateTrunc(*p),
    }
}

#[derive(Debug, Clone)]
enum Scalar {
    F64(f64),
    I64(i64),
    Bool(bool),
    Str(Box<str>),
    Sym(i64),
    Null,
}

impl Scalar {
    fn truthy(&self) -> bool {
        matches!(self, Scalar::Bool(true))
    }

    fn as_f64(&self) -> f64 {
        match self {
            Scalar::F64(v) => *v,
            Scalar::I64(v) => *v as f64,
            Scalar::Bool(v) => *v as i64 as f64,
            Scalar::Sym(v) => *v as f64,
            _ => 0.0,
        }
    }

    fn as_i64(&self) -> i64 {
        match self {
            Scalar::I64(v) => *v,
            Scalar::F64(v) => *v as i64,
            Scalar::Bool(v) => *v as i64,
            Scalar::Sym(v) => *v,
            _ => 0,
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Scalar::Str(v) => v,
            _ => "",
        }
    }
}

fn read_scalar(col: &Column, row: usize) -> Scalar {
    if col.is_null(row) {
        return Scalar::Null;
    }
    match col.elem_type() {
        ElemType::F64 => Scalar::F64(col.read_f64(row)),
        ElemType::Bool => Scalar::Bool(col.read_bool(row)),
        ElemType::Sym => Scalar::Sym(col.read_sym_id(row)),
        ElemType::Str => Scalar::Str(Box::from(col.read_str(row))),
        ElemType::Table | ElemType::Parted | ElemType::MapCommon => Scalar::Null,
        _ => Scalar::I64(col.read_i64(row)),
    }
}

fn eval_scalar_row(instrs: &[Instr], table: &Table, syms: &SymbolTable, row: usize) -> Scalar {
    let mut stack: Vec<Scalar> = Vec::with_capacity(MAX_REGISTERS);
    for instr in instrs {
        match instr {
            Instr::LoadCol(name) => {
                let col = table.col_by_name(*name).expect("unresolved column in compiled expr");
                stack.push(read_scalar(col, row));
            }
            Instr::LoadConstF64(v) => stack.push(Scalar::F64(*v)),
            Instr::LoadConstI64(v) => stack.push(Scalar::I64(*v)),
            Instr::LoadConstBool(v) => stack.push(Scalar::Bool(*v)),
            Instr::LoadConstStr(v) => stack.push(Scalar::Str(v.clone())),
            Instr::Un(op) => {
                let a = stack.pop().expect("stack underflow");
                stack.push(eval_un(*op, a));
            }
            Instr::Bin(op) => {
                let b = stack.pop().expect("stack underflow");
                let a = stack.pop().expect("stack underflow");
                stack.push(eval_bin(*op, a, b, syms));
            }
            Instr::If => {
                let else_v = stack.pop().expect("stack underflow");
                let then_v = stack.pop().expect("stack underflow");
                let cond = stack.pop().expect("stack underflow");
                stack.push(if cond.truthy() { then_v } else { else_v });
            }
            Instr::Cast(t) => {
                let a = stack.pop().expect("stack underflow");
                stack.push(eval_cast(*t, a));
            }
            Instr::StrFn(kind, arity) => {
                let n = *arity;
                let mut args = Vec::with_capacity(n);
                for _ in 0..n {
                    args.push(stack.pop().expect("stack underflow"));
                }
                args.reverse();
                stack.push(eval_strfn(*kind, &args));
            }
            Instr::Extract(part) => {
                let a = stack.pop().expect("stack underflow");
                stack.push(match a {
                    Scalar::Null => Scalar::Null,
                    v => Scalar::I64(datetime::extract(*part, v.as_i64())),
                });
            }
            Instr::DateTrunc(part) => {
                let a = stack.pop().expect("stack underflow");
                stack.push(match a {
                    Scalar::Null => Scalar::Null,
                    v => Scalar::I64(datetime::date_trunc(*part, v.as_i64())),
                });
            }
        }
    }
    stack.pop().unwrap_or(Scalar::Null)
}

fn eval_un(op: UnOp, a: Scalar) -> Scalar {
    if matches!(a, Scalar::Null) && !matches!(op, UnOp::IsNull) {
        return Scalar::Null;
    }
    match op {
        UnOp::IsNull => Scalar::Bool(matches!(a, Scalar::Null)),
        UnOp::Not => Scalar::Bool(!a.truthy()),
        UnOp::Neg => match a {
            Scalar::F64(v) => Scalar::F64(-v),
            v => Scalar::I64(-v.as_i64()),
        },
        UnOp::Abs => match a {
            Scalar::F64(v) => Scalar::F64(v.abs()),
            v => Scalar::I64(v.as_i64().abs()),
        },
        UnOp::Sqrt => Scalar::F64(a.as_f64().sqrt()),
        UnOp::Log => Scalar::F64(a.as_f64().ln()),
        UnOp::Exp => Scalar::F64(a.as_f64().exp()),
        UnOp::Ceil => Scalar::F64(a.as_f64().ceil()),
        UnOp::Floor => Scalar::F64(a.as_f64().floor()),
    }
}

fn eval_bin(op: BinOp, a: Scalar, b: Scalar, syms: &SymbolTable) -> Scalar {
    // STR atom vs SYM column: resolve the literal to an intern id rather
    // than comparing representations (spec.md §4.6).
    if let (Scalar::Sym(id), Scalar::Str(s)) | (Scalar::Str(s), Scalar::Sym(id)) = (&a, &b) {
        let resolved = syms.find(s);
        let eq = resolved == Some(*id);
        return match op {
            BinOp::Eq => Scalar::Bool(eq),
            BinOp::Ne => Scalar::Bool(!eq),
            _ => Scalar::Null,
        };
    }
    if matches!(op, BinOp::And | BinOp::Or) {
        let (av, bv) = (a.truthy(), b.truthy());
        return Scalar::Bool(match op {
            BinOp::And => av && bv,
            BinOp::Or => av || bv,
            _ => unreachable!(),
        });
    }
    if matches!(a, Scalar::Null) || matches!(b, Scalar::Null) {
        return if matches!(op, BinOp::Eq | BinOp::Ne) {
            Scalar::Bool(false)
        } else {
            Scalar::Null
        };
    }
    match op {
        BinOp::Like => Scalar::Bool(strings::like_match(a.as_str(), b.as_str(), false)),
        BinOp::ILike => Scalar::Bool(strings::like_match(a.as_str(), b.as_str(), true)),
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ord = if matches!(a, Scalar::Str(_)) {
                a.as_str().cmp(b.as_str())
            } else {
                a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(std::cmp::Ordering::Equal)
            };
            use std::cmp::Ordering::*;
            Scalar::Bool(match op {
                BinOp::Eq => ord == Equal,
                BinOp::Ne => ord != Equal,
                BinOp::Lt => ord == Less,
                BinOp::Le => ord != Greater,
                BinOp::Gt => ord == Greater,
                BinOp::Ge => ord != Less,
                _ => unreachable!(),
            })
        }
        BinOp::Min | BinOp::Max => {
            let take_a = if matches!(op, BinOp::Min) {
                a.as_f64() <= b.as_f64()
            } else {
                a.as_f64() >= b.as_f64()
            };
            if take_a {
                a
            } else {
                b
            }
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            if matches!(a, Scalar::F64(_)) || matches!(b, Scalar::F64(_)) {
                let (x, y) = (a.as_f64(), b.as_f64());
                Scalar::F64(match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    BinOp::Div => x / y,
                    BinOp::Mod => x % y,
                    _ => unreachable!(),
                })
            } else {
                let (x, y) = (a.as_i64(), b.as_i64());
                Scalar::I64(match op {
                    BinOp::Add => x.wrapping_add(y),
                    BinOp::Sub => x.wrapping_sub(y),
                    BinOp::Mul => x.wrapping_mul(y),
                    BinOp::Div => {
                        if y == 0 {
                            0
                        } else if x == i64::MIN && y == -1 {
                            i64::MIN
                        } else {
                            x / y
                        }
                    }
                    BinOp::Mod => {
                        if y == 0 {
                            0
                        } else if x == i64::MIN && y == -1 {
                            0
                        } else {
                            x % y
                        }
                    }
                    _ => unreachable!(),
                })
            }
        }
        BinOp::And | BinOp::Or | BinOp::Like | BinOp::ILike => unreachable!(),
    }
}

fn eval_cast(t: ElemType, a: Scalar) -> Scalar {
    if matches!(a, Scalar::Null) {
        return Scalar::Null;
    }
    match t {
        ElemType::F64 => Scalar::F64(a.as_f64()),
        ElemType::Bool => Scalar::Bool(a.as_f64() != 0.0),
        ElemType::Sym => Scalar::Sym(a.as_i64()),
        ElemType::Str => Scalar::Str(Box::from(a.as_str())),
        _ => Scalar::I64(a.as_i64()),
    }
}

fn eval_strfn(kind: StrFn, args: &[Scalar]) -> Scalar {
    if args.iter().any(|a| matches!(a, Scalar::Null)) {
        return Scalar::Null;
    }
    match kind {
        StrFn::Upper => Scalar::Str(Box::from(strings::upper(args[0].as_str()))),
        StrFn::Lower => Scalar::Str(Box::from(strings::lower(args[0].as_str()))),
        StrFn::Trim => Scalar::Str(Box::from(strings::trim(args[0].as_str()))),
        StrFn::Strlen => Scalar::I64(strings::strlen(args[0].as_str())),
        StrFn::Substr => Scalar::Str(Box::from(strings::substr(
            args[0].as_str(),
            args[1].as_i64(),
            args[2].as_i64(),
        ))),
        StrFn::Replace => Scalar::Str(Box::from(strings::replace(
            args[0].as_str(),
            args[1].as_str(),
            args[2].as_str(),
        ))),
        StrFn::Concat => {
            let refs: Vec<&str> = args.iter().map(|a| a.as_str()).collect();
            Scalar::Str(Box::from(strings::concat(&refs)))
        }
    }
}

/// Evaluate a compiled expression across every row of `table`, writing the
/// result column sequentially (no morsel dispatch — callers that need
/// cross-morsel parallelism drive [`eval_range`] themselves, the way
/// [`crate::filter`] and [`crate::group`] do for their own column builds).
pub fn eval(compiled: &CompiledExpr, table: &Table, syms: &SymbolTable) -> Column {
    eval_range(compiled, table, syms, 0..table.nrows())
}

/// Evaluate over a row sub-range, used by morsel-parallel callers to fill
/// disjoint slices of a shared output column.
pub fn eval_range(
    compiled: &CompiledExpr,
    table: &Table,
    syms: &SymbolTable,
    rows: std::ops::Range<usize>,
) -> Column {
    use crate::table::{ColumnData, NullBitmap, SymWidth};
    let n = rows.len();
    let mut nulls = NullBitmap::new(n);
    let mut any_null = false;
    macro_rules! collect {
        ($extract:expr, $default:expr) => {{
            rows.clone()
                .enumerate()
                .map(|(i, row)| {
                    let s = eval_scalar_row(&compiled.instrs, table, syms, row);
                    if matches!(s, Scalar::Null) {
                        nulls.set(i);
                        any_null = true;
                        $default
                    } else {
                        $extract(s)
                    }
                })
                .collect::<Vec<_>>()
        }};
    }
    let data = match compiled.result_type {
        ElemType::F64 => ColumnData::F64(collect!(|s: Scalar| s.as_f64(), 0.0)),
        ElemType::Bool => ColumnData::Bool(collect!(|s: Scalar| s.truthy() as u8, 0u8)),
        ElemType::Str => ColumnData::Str(collect!(
            |s: Scalar| Box::from(s.as_str()),
            Box::<str>::from("")
        )),
        ElemType::Sym => {
            let ids: Vec<i64> = collect!(|s: Scalar| s.as_i64(), -1i64);
            ColumnData::Sym(SymWidth::from_ids(&ids))
        }
        ElemType::Timestamp => ColumnData::Timestamp(collect!(|s: Scalar| s.as_i64(), 0i64)),
        _ => ColumnData::I64(collect!(|s: Scalar| s.as_i64(), 0i64)),
    };
    if any_null {
        Column::with_nulls(data, nulls)
    } else {
        Column::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ColumnData;

    fn sample_table() -> Table {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![1, 2, 3, 4])));
        t.add_col(1, Column::new(ColumnData::F64(vec![10.0, 20.0, 30.0, 40.0])));
        t
    }

    #[test]
    fn compiles_and_evaluates_arithmetic_with_promotion() {
        let t = sample_table();
        let syms = SymbolTable::new();
        let expr = Expr::Bin(
            BinOp::Add,
            Box::new(Expr::Col(0)),
            Box::new(Expr::Col(1)),
        );
        let compiled = compile(&expr, &t).unwrap();
        assert_eq!(compiled.result_type(), ElemType::F64);
        let out = eval(&compiled, &t, &syms);
        assert_eq!(out.read_f64(0), 11.0);
        assert_eq!(out.read_f64(3), 44.0);
    }

    #[test]
    fn if_then_else_picks_branch() {
        let t = sample_table();
        let syms = SymbolTable::new();
        let expr = Expr::If(
            Box::new(Expr::Bin(BinOp::Gt, Box::new(Expr::Col(0)), Box::new(Expr::ConstI64(2)))),
            Box::new(Expr::ConstI64(100)),
            Box::new(Expr::ConstI64(-100)),
        );
        let compiled = compile(&expr, &t).unwrap();
        let out = eval(&compiled, &t, &syms);
        assert_eq!(out.read_i64(0), -100);
        assert_eq!(out.read_i64(2), 100);
    }

    #[test]
    fn division_by_zero_is_zero_not_panic() {
        let mut t = Table::new();
        t.add_col(0, Column::new(ColumnData::I64(vec![10, 0])));
        let syms = SymbolTable::new();
        let expr = Expr::Bin(BinOp::Div, Box::new(Expr::ConstI64(5)), Box::new(Expr::Col(0)));
        let compiled = compile(&expr, &t).unwrap();
        let out = eval(&compiled, &t, &syms);
        assert_eq!(out.read_i64(1), 0);
    }

    #[test]
    fn concat_requires_at_least_two_args() {
        let t = sample_table();
        let expr = Expr::StrFn(StrFn::Concat, vec![Expr::ConstStr(Box::from("a"))]);
        assert!(compile(&expr, &t).is_err());
    }

    #[test]
    fn str_atom_resolves_against_sym_column_via_symtab() {
        let syms = SymbolTable::new();
        let id = syms.intern("AAPL");
        let mut t = Table::new();
        t.add_col(
            0,
            Column::new(ColumnData::Sym(crate::table::SymWidth::from_ids(&[id, id + 1]))),
        );
        let expr = Expr::Bin(
            BinOp::Eq,
            Box::new(Expr::Col(0)),
            Box::new(Expr::ConstStr(Box::from("AAPL"))),
        );
        let compiled = compile(&expr, &t).unwrap();
        let out = eval(&compiled, &t, &syms);
        assert!(out.read_bool(0));
        assert!(!out.read_bool(1));
    }
}
