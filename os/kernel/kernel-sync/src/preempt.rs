use crate::{Cpu, SpinLockGuard};
use core::ops::{Deref, DerefMut};

/// RAII guard that disables preemption on creation and re-enables it on drop.
///
/// Guards nest: the core becomes preemptible again only when the outermost
/// guard is dropped. While a guard is alive, [`Cpu::id`] is stable, which is
/// what per-core data structures rely on.
///
/// # Examples
///
/// ```
/// use kernel_sync::{Cpu, PreemptGuard};
/// # use core::cell::Cell;
/// # struct OneCore(Cell<usize>);
/// # impl Cpu for OneCore {
/// #     fn id(&self) -> usize { 0 }
/// #     fn push_off(&self) { self.0.set(self.0.get() + 1) }
/// #     fn pop_off(&self) { self.0.set(self.0.get() - 1) }
/// # }
/// let cpu = OneCore(Cell::new(0));
/// {
///     let _outer = PreemptGuard::new(&cpu);
///     let _inner = PreemptGuard::new(&cpu);
///     assert_eq!(cpu.0.get(), 2);
/// }
/// assert_eq!(cpu.0.get(), 0);
/// ```
pub struct PreemptGuard<'a, C: Cpu + ?Sized> {
    cpu: &'a C,
}

impl<'a, C: Cpu + ?Sized> PreemptGuard<'a, C> {
    /// Disables preemption on `cpu` for the guard's lifetime.
    #[inline]
    #[must_use]
    pub fn new(cpu: &'a C) -> Self {
        cpu.push_off();
        Self { cpu }
    }

    /// The core this guard pins the caller to.
    #[inline]
    #[must_use]
    pub fn cpu_id(&self) -> usize {
        self.cpu.id()
    }
}

impl<C: Cpu + ?Sized> Drop for PreemptGuard<'_, C> {
    fn drop(&mut self) {
        self.cpu.pop_off();
    }
}

/// A spin lock guard that also keeps preemption disabled while held.
///
/// Created by [`SpinLock::lock_preempt`](crate::SpinLock::lock_preempt).
/// On drop the lock is released first and preemption restored afterwards,
/// so the core is never preempted while it still owns the lock.
pub struct PreemptSpinGuard<'a, T, C: Cpu + ?Sized> {
    // Field order is drop order.
    guard: SpinLockGuard<'a, T>,
    _preempt: PreemptGuard<'a, C>,
}

impl<'a, T, C: Cpu + ?Sized> PreemptSpinGuard<'a, T, C> {
    pub(crate) const fn new(guard: SpinLockGuard<'a, T>, preempt: PreemptGuard<'a, C>) -> Self {
        Self {
            guard,
            _preempt: preempt,
        }
    }
}

impl<T, C: Cpu + ?Sized> Deref for PreemptSpinGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: Cpu + ?Sized> DerefMut for PreemptSpinGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
