//! # Hosted CPU model
//!
//! Runs kernel code on ordinary OS threads: every thread plays one core and
//! one task. Used by the test suites of the memory-management crates and by
//! simulations that want real parallelism without booting the kernel.
//!
//! A thread is bound to a logical core with [`HostCpu::bind`]. Threads that
//! never bind get a fresh core number of their own, so two unbound threads
//! never pretend to be the same core. Code that indexes per-core tables
//! (such as the page allocator) needs explicit bindings below `NCPU`.
//!
//! The preemption depth is tracked per thread. Preemption is of course not
//! really disabled on the host, but the bookkeeping catches the same misuse
//! the kernel scheduler would: unbalanced `pop_off` and yielding while a
//! spin lock is held.

use crate::{Cpu, Scheduler};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Core numbers handed to unbound threads start here, far above any `NCPU`.
const UNBOUND_CORE_BASE: usize = 1 << 16;

static NEXT_UNBOUND_CORE: AtomicUsize = AtomicUsize::new(UNBOUND_CORE_BASE);
static NEXT_TASK: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static CORE: Cell<Option<usize>> = const { Cell::new(None) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static TASK: Cell<usize> = const { Cell::new(0) };
}

/// [`Cpu`] and [`Scheduler`] backed by the calling OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostCpu;

impl HostCpu {
    /// Makes the calling thread run as core `core` from now on.
    pub fn bind(core: usize) {
        CORE.with(|c| c.set(Some(core)));
    }

    /// Current preemption-disable depth of the calling thread.
    #[must_use]
    pub fn preempt_depth() -> usize {
        DEPTH.with(Cell::get)
    }

    fn core() -> usize {
        CORE.with(|c| {
            c.get().unwrap_or_else(|| {
                let core = NEXT_UNBOUND_CORE.fetch_add(1, Ordering::Relaxed);
                c.set(Some(core));
                core
            })
        })
    }
}

impl Cpu for HostCpu {
    fn id(&self) -> usize {
        debug_assert!(
            Self::preempt_depth() > 0,
            "cpu id read with preemption enabled"
        );
        Self::core()
    }

    fn push_off(&self) {
        DEPTH.with(|d| d.set(d.get() + 1));
    }

    fn pop_off(&self) {
        DEPTH.with(|d| {
            let depth = d.get();
            assert!(depth > 0, "pop_off: preemption was not disabled");
            d.set(depth - 1);
        });
    }
}

impl Scheduler for HostCpu {
    fn current_task(&self) -> usize {
        TASK.with(|t| {
            if t.get() == 0 {
                t.set(NEXT_TASK.fetch_add(1, Ordering::Relaxed));
            }
            t.get()
        })
    }

    fn yield_now(&self) {
        debug_assert_eq!(
            Self::preempt_depth(),
            0,
            "yield with preemption disabled"
        );
        thread::yield_now();
    }
}
