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

//! Compiled-in tunables. Not a config file or env-driven layer — just the
//! constants spec'd for the executor, collected so call sites don't sprinkle
//! magic numbers, with a `Default` matching the documented values.

/// Rows per morsel (vectorized iteration chunk).
pub const MORSEL_ELEMS: usize = 1024;

/// Below this row count, operators run sequentially rather than dispatching
/// across the pool.
pub const PARALLEL_THRESHOLD: usize = 64 * MORSEL_ELEMS;

/// Morsels per dispatch task, used to size `dispatch_n` task counts.
pub const DISPATCH_MORSELS: usize = 8;

/// Direct-array group-by: max dense slots per worker.
pub const DA_MAX_SLOTS: usize = 262_144;

/// Direct-array group-by: per-worker accumulator memory cap.
pub const DA_MAX_WORKER_BYTES: usize = 6 * 1024 * 1024;

/// Direct-array group-by: aggregate total memory cap across all workers.
pub const DA_MAX_TOTAL_BYTES: usize = 256 * 1024 * 1024;

/// Number of radix partitions for the partitioned hash group-by.
pub const RADIX_PARTITIONS: usize = 256;

/// Cap on total pre-allocated fat-entry storage for radix partition phase 1.
pub const RADIX_PREALLOC_CAP_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Rows per morsel in the hash-join probe phase.
pub const JOIN_PROBE_MORSEL: usize = 8192;

/// n ≤ this uses insertion sort instead of radix/merge.
pub const SORT_INSERTION_CUTOFF: usize = 64;

/// limit ≤ this (and n > 8×limit) triggers the heap-based top-N fusion.
pub const TOPN_FUSION_MAX_LIMIT: usize = 8192;

/// Above this many unique symbol IDs, per-partition group-by cardinality
/// estimation degrades to a row-count estimate (spec.md §5).
pub const SYM_CARDINALITY_ESTIMATE_CAP: usize = 4_000_000;

/// Tunable knobs threaded through the executor. `Default` matches the
/// constants above; callers that need different limits build their own.
#[derive(Debug, Clone, Copy)]
pub struct ExecConfig {
    pub morsel_elems: usize,
    pub parallel_threshold: usize,
    pub da_max_slots: usize,
    pub da_max_worker_bytes: usize,
    pub da_max_total_bytes: usize,
    pub radix_partitions: usize,
    pub join_probe_morsel: usize,
    pub sort_insertion_cutoff: usize,
    pub topn_fusion_max_limit: usize,
}

impl Default for ExecConfig {
    fn default() -> Self {
        ExecConfig {
            morsel_elems: MORSEL_ELEMS,
            parallel_threshold: PARALLEL_THRESHOLD,
            da_max_slots: DA_MAX_SLOTS,
            da_max_worker_bytes: DA_MAX_WORKER_BYTES,
            da_max_total_bytes: DA_MAX_TOTAL_BYTES,
            radix_partitions: RADIX_PARTITIONS,
            join_probe_morsel: JOIN_PROBE_MORSEL,
            sort_insertion_cutoff: SORT_INSERTION_CUTOFF,
            topn_fusion_max_limit: TOPN_FUSION_MAX_LIMIT,
        }
    }
}
