use crate::bcache::Bcache;
use crate::device::{BlockDevice, Clock};
use core::fmt;
use core::ops::{Deref, DerefMut};
use kernel_info::fs::BSIZE;
use kernel_sync::{Scheduler, SleepLockGuard};

/// Content of one cache buffer: exactly one disk block.
#[repr(C, align(8))]
#[derive(Clone, PartialEq, Eq)]
pub struct BufData([u8; BSIZE]);

impl BufData {
    #[must_use]
    pub const fn new() -> Self {
        Self([0; BSIZE])
    }
}

impl Default for BufData {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for BufData {
    type Target = [u8; BSIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for BufData {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl fmt::Debug for BufData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufData({:02X?}..)", &self.0[..8])
    }
}

/// A referenced, content-locked cache buffer.
///
/// Returned by [`Bcache::read`]. While it exists, the buffer keeps its block
/// identity and no other task can read or write its content. Dropping it (or
/// calling [`release`](Self::release)) gives up both.
pub struct Buf<'a, D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    // Field order is drop order: content lock first, then the reference.
    data: SleepLockGuard<'a, BufData, S>,
    handle: BufRef<'a, D, S, C>,
}

impl<'a, D, S, C> Buf<'a, D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    pub(crate) const fn new(
        data: SleepLockGuard<'a, BufData, S>,
        handle: BufRef<'a, D, S, C>,
    ) -> Self {
        Self { data, handle }
    }

    pub(crate) const fn slot(&self) -> usize {
        self.handle.slot
    }

    pub(crate) fn content_mut(&mut self) -> &mut BufData {
        &mut self.data
    }

    #[must_use]
    pub const fn dev(&self) -> u32 {
        self.handle.dev
    }

    #[must_use]
    pub const fn blockno(&self) -> u32 {
        self.handle.blockno
    }

    #[must_use]
    pub fn data(&self) -> &[u8; BSIZE] {
        &self.data
    }

    /// Content for modification. Changes reach the disk only through
    /// [`write`](Self::write).
    #[must_use]
    pub fn data_mut(&mut self) -> &mut [u8; BSIZE] {
        &mut self.data
    }

    /// Whether the content reflects the block on disk.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.handle.cache.is_valid(self.handle.slot)
    }

    /// Current number of references to this buffer, including this one.
    #[must_use]
    pub fn refcnt(&self) -> usize {
        self.handle.cache.refcnt(self.handle.slot, self.dev(), self.blockno())
    }

    /// Writes the content to disk. The buffer stays locked and referenced.
    ///
    /// # Panics
    /// If the calling task does not hold the content lock, i.e. the buffer
    /// was handed to another task.
    pub fn write(&self) {
        self.handle
            .cache
            .write(self.handle.slot, self.dev(), self.blockno(), &self.data);
    }

    /// Unlocks the content and drops this reference.
    pub fn release(self) {
        drop(self);
    }

    /// Adds a reference that outlives this handle, keeping the block cached
    /// until a matching [`unpin`](Self::unpin).
    pub fn pin(&self) {
        self.handle
            .cache
            .pin(self.handle.slot, self.dev(), self.blockno());
    }

    /// Drops a reference taken by [`pin`](Self::pin).
    ///
    /// # Panics
    /// If no pinned reference is left besides this handle's own.
    pub fn unpin(&self) {
        self.handle
            .cache
            .unpin(self.handle.slot, self.dev(), self.blockno());
    }
}

impl<D, S, C> fmt::Debug for Buf<'_, D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf")
            .field("slot", &self.handle.slot)
            .field("dev", &self.handle.dev)
            .field("blockno", &self.handle.blockno)
            .finish_non_exhaustive()
    }
}

/// One counted reference to a cache slot; dropping it releases the count.
pub(crate) struct BufRef<'a, D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    pub(crate) cache: &'a Bcache<D, S, C>,
    pub(crate) slot: usize,
    pub(crate) dev: u32,
    pub(crate) blockno: u32,
}

impl<D, S, C> Drop for BufRef<'_, D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    fn drop(&mut self) {
        self.cache.unref(self.slot, self.dev, self.blockno);
    }
}
