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

//! Morsel iterator (spec.md §4.2): a column as a sequence of ≤1024-row
//! windows, used both for vectorized evaluation and for chunking parallel
//! work across the pool.

/// One `[start, end)` row window, at most `morsel_elems` wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Morsel {
    pub start: usize,
    pub end: usize,
}

impl Morsel {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Iterates `[0, n)` (or a restricted `[start, end)` sub-range, via
/// `morsel_init_range`) in windows of `morsel_elems` rows.
pub struct MorselIter {
    pos: usize,
    end: usize,
    morsel_elems: usize,
}

impl MorselIter {
    pub fn new(n: usize, morsel_elems: usize) -> Self {
        MorselIter {
            pos: 0,
            end: n,
            morsel_elems,
        }
    }

    /// `morsel_init_range`: restrict iteration to `[start, end)`, used to
    /// hand each parallel worker a disjoint sub-range.
    pub fn with_range(start: usize, end: usize, morsel_elems: usize) -> Self {
        MorselIter {
            pos: start,
            end,
            morsel_elems,
        }
    }
}

impl Iterator for MorselIter {
    type Item = Morsel;

    fn next(&mut self) -> Option<Morsel> {
        if self.pos >= self.end {
            return None;
        }
        let start = self.pos;
        let end = (start + self.morsel_elems).min(self.end);
        self.pos = end;
        Some(Morsel { start, end })
    }
}

/// Number of 1024-row segments spanning `n` rows, used by [`crate::sel`]'s
/// per-segment flags.
pub fn segment_count(n: usize, morsel_elems: usize) -> usize {
    n.div_ceil(morsel_elems)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterates_full_morsels_then_remainder() {
        let morsels: Vec<_> = MorselIter::new(2500, 1024).collect();
        assert_eq!(morsels.len(), 3);
        assert_eq!(morsels[0], Morsel { start: 0, end: 1024 });
        assert_eq!(morsels[1], Morsel { start: 1024, end: 2048 });
        assert_eq!(morsels[2], Morsel { start: 2048, end: 2500 });
    }

    #[test]
    fn restricted_range_stays_within_bounds() {
        let morsels: Vec<_> = MorselIter::with_range(500, 1500, 1024).collect();
        assert_eq!(morsels, vec![Morsel { start: 500, end: 1500 }]);
    }
}
