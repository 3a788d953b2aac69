//! # Bucketed buffer cache
//!
//! Slots never move; bucket membership is a singly linked list of slot
//! indices threaded through the slots' `next` fields.

use crate::buf::{Buf, BufData, BufRef};
use crate::device::{BlockDevice, Clock};
use alloc::boxed::Box;
use core::iter;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use kernel_info::fs::{NBUCKET, NBUF};
use kernel_sync::{PreemptSpinGuard, Scheduler, SleepLock, SpinLock};

/// Link value meaning "end of bucket".
const NIL: usize = usize::MAX;

/// Geometry of a [`Bcache`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BcacheConfig {
    /// Number of buffers.
    pub nbuf: usize,
    /// Number of hash buckets.
    pub nbucket: usize,
}

impl BcacheConfig {
    #[must_use]
    pub const fn new(nbuf: usize, nbucket: usize) -> Self {
        Self { nbuf, nbucket }
    }
}

impl Default for BcacheConfig {
    fn default() -> Self {
        Self::new(NBUF, NBUCKET)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BcacheError {
    #[error("a buffer cache needs at least one buffer")]
    NoBuffers,
    #[error("a buffer cache needs at least one bucket")]
    NoBuckets,
}

/// Head of one hash chain.
struct Bucket {
    head: usize,
}

type BucketGuard<'a, S> = PreemptSpinGuard<'a, Bucket, S>;

/// One cache buffer.
///
/// The metadata fields belong to the lock of the bucket the slot is linked
/// into; the lock hand-off orders all accesses, so they are relaxed atomics.
/// `valid` and `data` belong to the content lock.
struct Slot {
    dev: AtomicU32,
    blockno: AtomicU32,
    refcnt: AtomicUsize,
    last_use: AtomicU64,
    next: AtomicUsize,
    valid: AtomicBool,
    data: SleepLock<BufData>,
}

impl Slot {
    fn new(next: usize) -> Self {
        Self {
            dev: AtomicU32::new(0),
            blockno: AtomicU32::new(0),
            refcnt: AtomicUsize::new(0),
            last_use: AtomicU64::new(0),
            next: AtomicUsize::new(next),
            valid: AtomicBool::new(false),
            data: SleepLock::new(BufData::new()),
        }
    }

    fn holds(&self, dev: u32, blockno: u32) -> bool {
        self.dev.load(Ordering::Relaxed) == dev && self.blockno.load(Ordering::Relaxed) == blockno
    }

    fn refcnt(&self) -> usize {
        self.refcnt.load(Ordering::Relaxed)
    }

    fn last_use(&self) -> u64 {
        self.last_use.load(Ordering::Relaxed)
    }

    fn next(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    fn set_next(&self, next: usize) {
        self.next.store(next, Ordering::Relaxed);
    }
}

/// Best eviction candidate found so far.
#[derive(Copy, Clone)]
struct Victim {
    bucket: usize,
    slot: usize,
    /// Predecessor in the bucket chain, [`NIL`] if the slot is the head.
    prev: usize,
    last_use: u64,
}

/// Disk block cache.
///
/// Holds a fixed set of buffers, each caching one `(dev, blockno)` block.
/// Lookups hash into one of several independently locked buckets, so hits on
/// different buckets never contend. A miss takes the global eviction lock and
/// recycles the unreferenced buffer that was released longest ago.
///
/// # Lock order
/// `evict` before any bucket lock. Two bucket locks are held together only
/// by the single task inside `evict`. Spin locks are always dropped before a
/// content lock is waited for.
pub struct Bcache<D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    disk: D,
    sched: S,
    clock: C,
    evict: SpinLock<()>,
    buckets: Box<[SpinLock<Bucket>]>,
    slots: Box<[Slot]>,
}

impl<D, S, C> Bcache<D, S, C>
where
    D: BlockDevice,
    S: Scheduler,
    C: Clock,
{
    /// Creates a cache with `config.nbuf` invalid buffers, all linked into
    /// bucket 0 in slot order.
    ///
    /// # Errors
    /// If the configuration has no buffers or no buckets.
    pub fn new(config: BcacheConfig, disk: D, sched: S, clock: C) -> Result<Self, BcacheError> {
        let BcacheConfig { nbuf, nbucket } = config;
        if nbuf == 0 {
            return Err(BcacheError::NoBuffers);
        }
        if nbucket == 0 {
            return Err(BcacheError::NoBuckets);
        }

        let slots = (0..nbuf)
            .map(|slot| Slot::new(if slot + 1 < nbuf { slot + 1 } else { NIL }))
            .collect();
        let buckets = (0..nbucket)
            .map(|bucket| SpinLock::new(Bucket { head: if bucket == 0 { 0 } else { NIL } }))
            .collect();

        log::info!("bcache: {nbuf} buffers in {nbucket} buckets");
        Ok(Self {
            disk,
            sched,
            clock,
            evict: SpinLock::new(()),
            buckets,
            slots,
        })
    }

    /// Returns the locked buffer for `(dev, blockno)` with the block's
    /// content, reading it from disk if the cache did not have it.
    ///
    /// May wait for another task to release the buffer.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is referenced.
    pub fn read(&self, dev: u32, blockno: u32) -> Buf<'_, D, S, C> {
        let mut buf = self.get(dev, blockno);
        let slot = &self.slots[buf.slot()];
        if !slot.valid.load(Ordering::Relaxed) {
            log::trace!("bcache: loading block {dev}:{blockno}");
            self.disk.read_block(dev, blockno, buf.content_mut());
            slot.valid.store(true, Ordering::Relaxed);
        }
        buf
    }

    /// Returns the locked buffer for `(dev, blockno)` without loading it.
    ///
    /// Check [`Buf::is_valid`] before trusting the content.
    ///
    /// # Panics
    /// If the block is not cached and every buffer is referenced.
    pub(crate) fn get(&self, dev: u32, blockno: u32) -> Buf<'_, D, S, C> {
        let target = self.bucket_of(dev, blockno);

        let hit = {
            let bucket = self.buckets[target].lock_preempt(&self.sched);
            self.take_ref(&bucket, dev, blockno)
        };
        let slot = hit.unwrap_or_else(|| self.recycle(target, dev, blockno));

        // Spin locks are gone; the reference keeps the identity stable while
        // waiting for the content.
        let handle = BufRef {
            cache: self,
            slot,
            dev,
            blockno,
        };
        let data = self.slots[slot].data.lock(&self.sched);
        Buf::new(data, handle)
    }

    /// Miss path: re-checks `target` under the eviction lock, then recycles
    /// the least recently used unreferenced buffer. Returns the slot with
    /// one reference taken.
    fn recycle(&self, target: usize, dev: u32, blockno: u32) -> usize {
        let _evict = self.evict.lock_preempt(&self.sched);

        // Another task may have brought the block in since the fast scan.
        {
            let bucket = self.buckets[target].lock_preempt(&self.sched);
            if let Some(slot) = self.take_ref(&bucket, dev, blockno) {
                return slot;
            }
        }
        log::trace!("bcache: miss on block {dev}:{blockno}");

        // Keeps the lock of the bucket holding the best candidate so the
        // candidate cannot be referenced behind our back.
        let mut best: Option<(Victim, BucketGuard<'_, S>)> = None;
        for (index, lock) in self.buckets.iter().enumerate() {
            let bucket = lock.lock_preempt(&self.sched);
            let mut lru = best.as_ref().map(|(victim, _)| victim.last_use);
            let mut found = None;
            let mut prev = NIL;
            for slot in self.chain(bucket.head) {
                let candidate = &self.slots[slot];
                if candidate.refcnt() == 0
                    && lru.is_none_or(|oldest| candidate.last_use() < oldest)
                {
                    lru = Some(candidate.last_use());
                    found = Some(Victim {
                        bucket: index,
                        slot,
                        prev,
                        last_use: candidate.last_use(),
                    });
                }
                prev = slot;
            }
            if let Some(victim) = found {
                // Replacing the pair unlocks the previous candidate's bucket.
                best = Some((victim, bucket));
            }
        }

        let Some((victim, mut home)) = best else {
            panic!("bget: no buffers");
        };
        let slot = &self.slots[victim.slot];
        log::debug!(
            "bcache: evicting block {}:{} from buffer {} for {dev}:{blockno}",
            slot.dev.load(Ordering::Relaxed),
            slot.blockno.load(Ordering::Relaxed),
            victim.slot
        );

        let _target = if victim.bucket == target {
            home
        } else {
            self.unlink(&mut home, victim);
            drop(home);
            let mut bucket = self.buckets[target].lock_preempt(&self.sched);
            slot.set_next(bucket.head);
            bucket.head = victim.slot;
            bucket
        };

        slot.dev.store(dev, Ordering::Relaxed);
        slot.blockno.store(blockno, Ordering::Relaxed);
        slot.valid.store(false, Ordering::Relaxed);
        slot.refcnt.store(1, Ordering::Relaxed);
        victim.slot
    }

    /// Looks for `(dev, blockno)` in a locked bucket and takes a reference.
    fn take_ref(&self, bucket: &Bucket, dev: u32, blockno: u32) -> Option<usize> {
        let slot = self.find(bucket, dev, blockno)?;
        self.slots[slot].refcnt.fetch_add(1, Ordering::Relaxed);
        Some(slot)
    }

    fn find(&self, bucket: &Bucket, dev: u32, blockno: u32) -> Option<usize> {
        self.chain(bucket.head)
            .find(|&slot| self.slots[slot].holds(dev, blockno))
    }

    fn unlink(&self, bucket: &mut Bucket, victim: Victim) {
        let next = self.slots[victim.slot].next();
        if victim.prev == NIL {
            bucket.head = next;
        } else {
            self.slots[victim.prev].set_next(next);
        }
        self.slots[victim.slot].set_next(NIL);
    }

    /// Slot indices of a bucket chain, head first. Only valid while the
    /// bucket is locked.
    fn chain(&self, head: usize) -> impl Iterator<Item = usize> + '_ {
        iter::successors((head != NIL).then_some(head), move |&slot| {
            let next = self.slots[slot].next();
            (next != NIL).then_some(next)
        })
    }

    /// Bucket index of `(dev, blockno)`.
    #[allow(clippy::cast_possible_truncation)]
    fn bucket_of(&self, dev: u32, blockno: u32) -> usize {
        let key = (u64::from(dev) << 27) | u64::from(blockno);
        // the remainder is below the bucket count, which is a usize
        (key % self.buckets.len() as u64) as usize
    }

    fn lock_bucket_of(&self, dev: u32, blockno: u32) -> BucketGuard<'_, S> {
        self.buckets[self.bucket_of(dev, blockno)].lock_preempt(&self.sched)
    }

    pub(crate) fn is_valid(&self, slot: usize) -> bool {
        self.slots[slot].valid.load(Ordering::Relaxed)
    }

    pub(crate) fn refcnt(&self, slot: usize, dev: u32, blockno: u32) -> usize {
        let _bucket = self.lock_bucket_of(dev, blockno);
        self.slots[slot].refcnt()
    }

    pub(crate) fn write(&self, slot: usize, dev: u32, blockno: u32, data: &BufData) {
        assert!(
            self.slots[slot].data.holding(&self.sched),
            "bwrite: buffer {dev}:{blockno} is not locked by the caller"
        );
        self.disk.write_block(dev, blockno, data);
    }

    pub(crate) fn pin(&self, slot: usize, dev: u32, blockno: u32) {
        let _bucket = self.lock_bucket_of(dev, blockno);
        self.slots[slot].refcnt.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unpin(&self, slot: usize, dev: u32, blockno: u32) {
        let _bucket = self.lock_bucket_of(dev, blockno);
        let refcnt = self.slots[slot].refcnt();
        assert!(refcnt > 1, "bunpin: block {dev}:{blockno} is not pinned");
        self.slots[slot].refcnt.store(refcnt - 1, Ordering::Relaxed);
    }

    /// Drops one reference; the last one stamps the release time used by
    /// eviction.
    pub(crate) fn unref(&self, slot: usize, dev: u32, blockno: u32) {
        let _bucket = self.lock_bucket_of(dev, blockno);
        let slot = &self.slots[slot];
        let refcnt = slot.refcnt();
        assert!(refcnt > 0, "brelse: block {dev}:{blockno} is not referenced");
        slot.refcnt.store(refcnt - 1, Ordering::Relaxed);
        if refcnt == 1 {
            slot.last_use.store(self.clock.ticks(), Ordering::Relaxed);
        }
    }

    /// Whether `(dev, blockno)` currently has a buffer, valid or not.
    #[must_use]
    pub fn is_cached(&self, dev: u32, blockno: u32) -> bool {
        let bucket = self.lock_bucket_of(dev, blockno);
        self.find(&bucket, dev, blockno).is_some()
    }

    /// Number of buffers.
    #[must_use]
    pub fn nbuf(&self) -> usize {
        self.slots.len()
    }

    /// Number of hash buckets.
    #[must_use]
    pub fn nbucket(&self) -> usize {
        self.buckets.len()
    }

    /// The device the cache reads from and writes to.
    #[must_use]
    pub const fn disk(&self) -> &D {
        &self.disk
    }
}
