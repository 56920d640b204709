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

//! Scratch arena (spec.md §4.1): owned temporary-buffer lifetimes for the
//! per-query scratch data every kernel needs (match-index arrays, radix
//! histograms, per-worker accumulators, hash table row stores).
//!
//! The C engine this crate reimplements hands out a `(header, data)` pair
//! from a bump allocator and expects an explicit `scratch_free(header)`.
//! Rust's ownership model gives us the same "stack discipline, no ambient
//! GC" property for free via RAII, so `ScratchBuf<T>` is a `Vec<T>` with a
//! size-classed free-list behind it: `alloc`/`calloc` pull a reusable
//! buffer instead of going to the allocator, and dropping the buffer
//! returns it to the arena instead of freeing it. This preserves the
//! "never hits `malloc` in hot paths" property the spec cares about while
//! staying entirely safe.

use std::any::Any;
use std::sync::Mutex;

/// A scratch buffer checked out of an [`Arena`]. Derefs to `[T]`/`&mut [T]`;
/// returns its backing storage to the arena's free list on drop.
pub struct ScratchBuf<'a, T> {
    data: Vec<T>,
    arena: &'a Arena,
}

impl<'a, T: 'static + Send> ScratchBuf<'a, T> {
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Grow or shrink in place, copying `min(old_len, new_len)` elements —
    /// the `scratch_realloc` contract from spec.md §4.1.
    pub fn realloc(&mut self, new_len: usize, fill: T)
    where
        T: Clone,
    {
        self.data.resize(new_len, fill);
    }

    pub fn into_vec(mut self) -> Vec<T> {
        std::mem::take(&mut self.data)
    }
}

impl<T> std::ops::Deref for ScratchBuf<'_, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T> std::ops::DerefMut for ScratchBuf<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<'a, T: 'static + Send> Drop for ScratchBuf<'a, T> {
    fn drop(&mut self) {
        let reclaimed = std::mem::take(&mut self.data);
        self.arena.recycle::<T>(reclaimed);
    }
}

/// A size-classed free list of recycled `Vec<T>` buffers, keyed by
/// (capacity bucket). `OOM` is modelled as the allocator simply failing —
/// in safe Rust that means `alloc`/`calloc` never fail (the global
/// allocator aborts on real OOM), but callers that need to *propagate*
/// `Error::Oom` in response to an over-budget request (spec.md §5 resource
/// caps) check the requested size against a cap before calling in.
#[derive(Default)]
pub struct Arena {
    // Type-erased free lists, keyed by (TypeId, capacity). Recycled buffers
    // are cleared (len 0) before being stashed, so a later `alloc::<T>` of a
    // different length just needs `resize`.
    pools: Mutex<Vec<(std::any::TypeId, usize, Box<dyn Any + Send>)>>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    fn take_recycled<T: 'static + Send>(&self, cap: usize) -> Option<Vec<T>> {
        let mut pools = self.pools.lock().expect("arena poisoned");
        let tid = std::any::TypeId::of::<T>();
        let pos = pools
            .iter()
            .position(|(t, c, _)| *t == tid && *c >= cap)?;
        let (_, _, boxed) = pools.swap_remove(pos);
        boxed.downcast::<Vec<T>>().ok().map(|b| *b)
    }

    fn recycle<T: 'static + Send>(&self, mut v: Vec<T>) {
        v.clear();
        let cap = v.capacity();
        if cap == 0 {
            return;
        }
        let mut pools = self.pools.lock().expect("arena poisoned");
        pools.push((std::any::TypeId::of::<T>(), cap, Box::new(v)));
    }

    /// `scratch_alloc(n)`: an uninitialized-content buffer of `n` elements
    /// (filled with `fill` since safe Rust has no uninitialized `Vec<T>`).
    pub fn alloc<T: 'static + Send + Clone>(&self, n: usize, fill: T) -> ScratchBuf<'_, T> {
        let mut v = self.take_recycled(n).unwrap_or_default();
        v.resize(n, fill);
        ScratchBuf { data: v, arena: self }
    }

    /// `scratch_calloc(n)`: a zero-filled buffer of `n` elements.
    pub fn calloc<T: 'static + Send + Default + Clone>(&self, n: usize) -> ScratchBuf<'_, T> {
        self.alloc(n, T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_recycle_roundtrip() {
        let arena = Arena::new();
        {
            let mut buf = arena.calloc::<i64>(16);
            buf.as_mut_slice()[0] = 42;
            assert_eq!(buf[0], 42);
        }
        // Buffer returned to the arena; a same-sized allocation reuses it
        // (content is reset to the fill value, not left dirty).
        let buf2 = arena.calloc::<i64>(16);
        assert_eq!(buf2[0], 0);
    }

    #[test]
    fn realloc_preserves_prefix() {
        let arena = Arena::new();
        let mut buf = arena.alloc::<i64>(4, 0);
        buf.as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        buf.realloc(2, 0);
        assert_eq!(buf.as_slice(), &[1, 2]);
        buf.realloc(6, -1);
        assert_eq!(buf.as_slice(), &[1, 2, -1, -1, -1, -1]);
    }
}
