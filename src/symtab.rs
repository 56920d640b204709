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

//! Interned-string symbol table (spec.md §3 "Symbol table (external)").
//!
//! Addressed by monotonically assigned i64 IDs. Internally synchronized so
//! it can be shared across worker threads without the caller taking a lock.

use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    strings: Vec<Box<str>>,
    ids: HashMap<Box<str>, i64>,
}

/// Process-wide (or per-`Engine`) interned string table.
pub struct SymbolTable {
    inner: RwLock<Inner>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Add `s` if absent and return its id; return the existing id otherwise.
    pub fn intern(&self, s: &str) -> i64 {
        if let Some(id) = self.find(s) {
            return id;
        }
        let mut w = self.inner.write().expect("symtab poisoned");
        // Re-check: another writer may have interned `s` between our read
        // lock drop and taking the write lock.
        if let Some(&id) = w.ids.get(s) {
            return id;
        }
        let id = w.strings.len() as i64;
        let boxed: Box<str> = s.into();
        w.strings.push(boxed.clone());
        w.ids.insert(boxed, id);
        id
    }

    /// Look up `s`, returning `-1` if absent (matches the C API convention
    /// named in spec.md §3 rather than `Option`, since callers compare the
    /// result directly against column-encoded intern IDs).
    pub fn find(&self, s: &str) -> Option<i64> {
        let r = self.inner.read().expect("symtab poisoned");
        r.ids.get(s).copied()
    }

    /// Resolve an id back to its string. Panics on an out-of-range id — the
    /// executor never holds an id it didn't get from `intern`/`find`.
    pub fn str(&self, id: i64) -> Box<str> {
        let r = self.inner.read().expect("symtab poisoned");
        r.strings[id as usize].clone()
    }

    pub fn count(&self) -> usize {
        self.inner.read().expect("symtab poisoned").strings.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let t = SymbolTable::new();
        let a = t.intern("hello");
        let b = t.intern("hello");
        assert_eq!(a, b);
        assert_eq!(t.find("hello"), Some(a));
        assert_eq!(t.find("missing"), None);
        assert_eq!(&*t.str(a), "hello");
    }

    #[test]
    fn ids_are_assigned_monotonically() {
        let t = SymbolTable::new();
        assert_eq!(t.intern("a"), 0);
        assert_eq!(t.intern("b"), 1);
        assert_eq!(t.intern("a"), 0);
        assert_eq!(t.count(), 2);
    }
}
