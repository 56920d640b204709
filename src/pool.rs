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

//! Pool dispatch contract (spec.md §4.3): `dispatch`/`dispatch_n` are
//! blocking barriers that run a closure across disjoint row ranges (or
//! explicit task ids) on real OS threads, plus a relaxed cancellation flag.
//!
//! spec.md treats the pool's own lifecycle as externally owned; this crate
//! still needs *a* pool to dispatch onto, so `Pool` here is the concrete,
//! minimal implementation of the contract: `std::thread::scope` gives us
//! the "all invocations completed when dispatch returns" barrier for free,
//! with no persistent worker threads to manage shutdown for.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config::ExecConfig;

/// Thread pool handle. Cheap to construct; `total_workers` is fixed at
/// construction (defaults to the available parallelism).
pub struct Pool {
    workers: usize,
    cancelled: AtomicBool,
}

impl Pool {
    pub fn new(workers: usize) -> Self {
        Pool {
            workers: workers.max(1),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn with_available_parallelism() -> Self {
        let n = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Pool::new(n)
    }

    pub fn total_workers(&self) -> usize {
        self.workers
    }

    /// Relaxed load of the cancellation flag (spec.md §5).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Cleared at the top of every `execute()` call (spec.md §4.14).
    pub fn reset_cancellation(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// `dispatch(fn, ctx, n_rows)`: invoke `f(worker_id, start, end)` across
    /// disjoint row ranges covering `[0, n_rows)`. Worker 0 always gets the
    /// lowest-address range (spec.md §5: required for FIRST/LAST merge).
    /// Sequential when `n_rows` is small or only one worker is available —
    /// spawning threads for a handful of rows would cost more than it saves.
    pub fn dispatch<F>(&self, n_rows: usize, cfg: &ExecConfig, f: F)
    where
        F: Fn(usize, usize, usize) + Sync,
    {
        if n_rows == 0 {
            return;
        }
        if self.workers <= 1 || n_rows < cfg.parallel_threshold {
            f(0, 0, n_rows);
            return;
        }
        let n_tasks = self.workers.min(n_rows);
        let chunk = n_rows.div_ceil(n_tasks);
        std::thread::scope(|scope| {
            for w in 0..n_tasks {
                let start = w * chunk;
                let end = (start + chunk).min(n_rows);
                if start >= end {
                    continue;
                }
                let f = &f;
                scope.spawn(move || f(w, start, end));
            }
        });
    }

    /// `dispatch_n(fn, ctx, n_tasks)`: same barrier, but task ids rather
    /// than row ranges — `f(worker_id, task_id, task_id + 1)`.
    pub fn dispatch_n<F>(&self, n_tasks: usize, f: F)
    where
        F: Fn(usize, usize, usize) + Sync,
    {
        if n_tasks == 0 {
            return;
        }
        if self.workers <= 1 || n_tasks == 1 {
            for t in 0..n_tasks {
                f(0, t, t + 1);
            }
            return;
        }
        let next = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            for w in 0..self.workers.min(n_tasks) {
                let f = &f;
                let next = &next;
                scope.spawn(move || loop {
                    let t = next.fetch_add(1, Ordering::Relaxed);
                    if t >= n_tasks {
                        break;
                    }
                    f(w, t, t + 1);
                });
            }
        });
    }
}

impl Default for Pool {
    fn default() -> Self {
        Pool::with_available_parallelism()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    #[test]
    fn dispatch_covers_every_row_exactly_once() {
        let pool = Pool::new(4);
        let cfg = ExecConfig { parallel_threshold: 1, ..ExecConfig::default() };
        let n = 10_000;
        let covered: Vec<AtomicI64> = (0..n).map(|_| AtomicI64::new(0)).collect();
        pool.dispatch(n, &cfg, |_worker, start, end| {
            for i in start..end {
                covered[i].fetch_add(1, Ordering::Relaxed);
            }
        });
        assert!(covered.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn dispatch_n_runs_every_task_once() {
        let pool = Pool::new(4);
        let n_tasks = 37;
        let seen: Vec<AtomicI64> = (0..n_tasks).map(|_| AtomicI64::new(0)).collect();
        pool.dispatch_n(n_tasks, |_w, start, end| {
            assert_eq!(end, start + 1);
            seen[start].fetch_add(1, Ordering::Relaxed);
        });
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
    }

    #[test]
    fn cancellation_flag_is_observable() {
        let pool = Pool::new(2);
        assert!(!pool.is_cancelled());
        pool.cancel();
        assert!(pool.is_cancelled());
        pool.reset_cancellation();
        assert!(!pool.is_cancelled());
    }
}
