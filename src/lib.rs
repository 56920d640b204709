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

//! Vectorized query execution core for a columnar, in-memory analytical
//! engine: tables and columns, a morsel-driven thread pool, and the
//! relational/elementwise kernels (filter, sort, group, join, window,
//! reduce) an operator graph composes into a query.
//!
//! No SQL frontend, no CLI, no network server, no persistence layer —
//! those are external collaborators. This crate only executes a
//! [`graph::Graph`] against a bound [`table::Table`].

pub mod arena;
pub mod config;
pub mod datetime;
pub mod error;
pub mod exec;
pub mod expr;
pub mod filter;
pub mod gather;
pub mod graph;
pub mod group;
pub mod join;
pub mod morsel;
pub mod parted;
pub mod pool;
pub mod reduce;
pub mod sel;
pub mod sort;
pub mod strings;
pub mod symtab;
pub mod table;
pub mod window;

pub use error::{Error, Result};
