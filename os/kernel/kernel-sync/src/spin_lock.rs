use crate::Cpu;
use crate::preempt::{PreemptGuard, PreemptSpinGuard};
use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// `owner` value while the lock is free or was taken without a core.
const NO_OWNER: usize = 0;

pub struct SpinLock<T> {
    /// lock state
    /// * `false`: unlocked
    /// * `true`: locked
    locked: AtomicBool,
    /// Core id + 1 of the holder when taken through [`SpinLock::lock_preempt`].
    owner: AtomicUsize,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(inner: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(NO_OWNER),
            inner: UnsafeCell::new(inner),
        }
    }

    /// Try once; returns immediately.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Spin until acquired (TATAS), then return a guard.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Contended path: spin on a read (cheap), then retry CAS.
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
        SpinLockGuard { lock: self }
    }

    /// Acquire with preemption disabled on `cpu` until the guard is dropped.
    ///
    /// The holding core is recorded so that [`holding`](Self::holding) can
    /// answer for it.
    ///
    /// # Panics
    /// If the calling core already holds this lock; spinning would never end.
    #[inline]
    pub fn lock_preempt<'a, C: Cpu + ?Sized>(&'a self, cpu: &'a C) -> PreemptSpinGuard<'a, T, C> {
        let preempt = PreemptGuard::new(cpu);
        assert!(
            !self.holding(cpu),
            "spinlock: recursive acquire on cpu {}",
            cpu.id()
        );
        let guard = self.lock();
        self.owner.store(cpu.id() + 1, Ordering::Relaxed);
        PreemptSpinGuard::new(guard, preempt)
    }

    /// Whether the lock is currently held by the calling core.
    ///
    /// Only meaningful with preemption disabled and for acquisitions made
    /// through [`lock_preempt`](Self::lock_preempt).
    #[inline]
    #[must_use]
    pub fn holding<C: Cpu + ?Sized>(&self, cpu: &C) -> bool {
        self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == cpu.id() + 1
    }

    /// Whether anyone holds the lock right now (racy snapshot).
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Closure convenience, built on the guard.
    #[inline]
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.lock();
        f(&mut g)
    }

    /// Mutable access when you have `&mut self` (no contention possible).
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.owner.store(NO_OWNER, Ordering::Relaxed);
        // Release publishes the critical section.
        self.lock.locked.store(false, Ordering::Release);
    }
}
