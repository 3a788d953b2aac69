use crate::{Cpu, Scheduler, SpinLock};
use core::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

/// Task id recorded while nobody holds the lock.
const NO_TASK: usize = 0;

struct SleepState {
    locked: bool,
    /// Task that holds the lock, [`NO_TASK`] while unlocked.
    holder: usize,
}

/// Long-term exclusive lock.
///
/// Unlike [`SpinLock`], a task waiting for a `SleepLock` gives its core to
/// other tasks instead of spinning, and the holder keeps preemption enabled.
/// That makes it suitable for protecting data across slow operations such as
/// a disk transfer into a cache buffer.
///
/// The short internal state lock is the only spinning involved. It is taken
/// with preemption disabled and never held while the caller waits.
pub struct SleepLock<T: ?Sized> {
    state: SpinLock<SleepState>,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by `state.locked`.
unsafe impl<T: ?Sized + Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            state: SpinLock::new(SleepState {
                locked: false,
                holder: NO_TASK,
            }),
            data: UnsafeCell::new(data),
        }
    }
}

impl<T: ?Sized> SleepLock<T> {
    /// Acquire the lock, yielding the calling task while someone else holds it.
    ///
    /// Must be called with preemption enabled and without any spin lock held.
    pub fn lock<'a, S: Scheduler + ?Sized>(&'a self, sched: &'a S) -> SleepLockGuard<'a, T, S> {
        loop {
            if self.try_acquire(sched) {
                return SleepLockGuard { lock: self, sched };
            }
            sched.yield_now();
        }
    }

    /// Acquire the lock if it is free; never waits.
    pub fn try_lock<'a, S: Scheduler + ?Sized>(
        &'a self,
        sched: &'a S,
    ) -> Option<SleepLockGuard<'a, T, S>> {
        self.try_acquire(sched)
            .then(|| SleepLockGuard { lock: self, sched })
    }

    /// Whether the task running on `sched` currently holds this lock.
    #[must_use]
    pub fn holding<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        let task = sched.current_task();
        let state = self.state.lock_preempt(sched);
        state.locked && state.holder == task
    }

    /// Whether any task holds the lock right now (racy snapshot).
    #[must_use]
    pub fn is_locked<C: Cpu + ?Sized>(&self, cpu: &C) -> bool {
        self.state.lock_preempt(cpu).locked
    }

    fn try_acquire<S: Scheduler + ?Sized>(&self, sched: &S) -> bool {
        let task = sched.current_task();
        let mut state = self.state.lock_preempt(sched);
        if state.locked {
            return false;
        }
        state.locked = true;
        state.holder = task;
        true
    }

    fn unlock<C: Cpu + ?Sized>(&self, cpu: &C) {
        let mut state = self.state.lock_preempt(cpu);
        state.locked = false;
        state.holder = NO_TASK;
    }
}

/// Access to the data of a held [`SleepLock`]; unlocks on drop.
pub struct SleepLockGuard<'a, T: ?Sized, S: Scheduler + ?Sized> {
    lock: &'a SleepLock<T>,
    sched: &'a S,
}

impl<T: ?Sized, S: Scheduler + ?Sized> Deref for SleepLockGuard<'_, T, S> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized, S: Scheduler + ?Sized> DerefMut for SleepLockGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized, S: Scheduler + ?Sized> Drop for SleepLockGuard<'_, T, S> {
    fn drop(&mut self) {
        self.lock.unlock(self.sched);
    }
}
