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

//! Error kinds produced by the executor and the collaborators it depends on.

/// Closed set of error kinds the executor can return. Mirrors the sentinel
/// kinds a `td_t*` error pointer encodes in the C engine this crate
/// reimplements: the kind code is the whole contract, there is no
/// diagnostic text attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Arena or column allocation failed.
    Oom,
    /// Scan of a missing column, or an operand with no table bound.
    Schema,
    /// Binary op between two non-scalar vectors with differing lengths.
    Length,
    /// Invalid parameter (e.g. CONCAT arg count out of range).
    Domain,
    /// Unsupported opcode/path combination.
    Nyi,
    /// Pool cancellation flag was observed.
    Cancel,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Error::Oom => "out of memory",
            Error::Schema => "schema error",
            Error::Length => "length error",
            Error::Domain => "domain error",
            Error::Nyi => "not yet implemented",
            Error::Cancel => "query cancelled",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
