//! # Kernel synchronization primitives
//!
//! Locks and the per-core hooks they need:
//!
//! * [`SpinLock`]: busy-waiting mutual exclusion for short critical sections.
//!   [`SpinLock::lock_preempt`] additionally keeps the current core from being
//!   preempted while the lock is held and remembers the owning core.
//! * [`SleepLock`]: an exclusive lock that yields the calling task while it
//!   waits, so it may be held across slow operations such as disk I/O.
//! * [`PreemptGuard`]: nestable "disable preemption" scope.
//!
//! The hardware- and scheduler-facing parts are expressed as the [`Cpu`] and
//! [`Scheduler`] traits so the primitives can run inside the kernel and, with
//! the `std` feature, on host threads ([`hosted::HostCpu`]).

#![cfg_attr(not(any(test, doctest, feature = "std")), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "std")]
pub mod hosted;
pub mod preempt;
mod sleep_lock;
mod spin_lock;

pub use preempt::{PreemptGuard, PreemptSpinGuard};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};

/// The executing core, as seen by lock and allocator code.
pub trait Cpu {
    /// Index of the core the caller runs on (`0..NCPU`).
    ///
    /// Only stable while preemption is disabled: a task may be migrated to a
    /// different core at any preemption point.
    fn id(&self) -> usize;

    /// Disables preemption on this core. Calls nest.
    fn push_off(&self);

    /// Undoes one [`push_off`](Self::push_off). Preemption is re-enabled when
    /// the outermost level is popped.
    ///
    /// Popping without a matching push is a fatal programming error.
    fn pop_off(&self);
}

/// Scheduler hooks for locks that suspend the caller instead of spinning.
pub trait Scheduler: Cpu {
    /// Non-zero identity of the running task.
    fn current_task(&self) -> usize;

    /// Gives the core to another runnable task. Must not be called with
    /// preemption disabled.
    fn yield_now(&self);
}
