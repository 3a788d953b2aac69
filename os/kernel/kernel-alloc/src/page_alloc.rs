//! # Per-core page allocator
//!
//! One free list per core, each behind its own spin lock. The fast path pops
//! from the local list; an empty local list triggers a steal from the other
//! cores.

use crate::PhysAddr;
use crate::free_list::{FreeList, Links};
use crate::phys_mapper::PhysMapper;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use kernel_info::memory::{ALLOC_JUNK, FREE_JUNK, NCPU, PAGE_SIZE, STEAL_BATCH};
use kernel_sync::{Cpu, PreemptGuard, SpinLock};

/// Physical page allocator with per-core free lists.
///
/// Every page in the managed range is, at any instant, either on exactly one
/// core's free list or owned by exactly one caller of [`alloc`](Self::alloc).
/// A page that is freed while already free is caught; a page freed by
/// someone other than its owner is not.
pub struct PageAllocator<C: Cpu, M: PhysMapper> {
    cpu: C,
    mapper: M,
    /// First managed page.
    base: PhysAddr,
    links: Links,
    kmem: Box<[SpinLock<FreeList>]>,
}

impl<C: Cpu, M: PhysMapper> PageAllocator<C, M> {
    /// Takes ownership of every whole page in `[start, end)` and puts them on
    /// the calling core's free list.
    ///
    /// `start` is rounded up to a page boundary; a trailing partial page is
    /// ignored.
    ///
    /// # Safety
    /// - The range must be RAM that nothing else uses, for as long as the
    ///   allocator lives.
    /// - `mapper` must map the whole range writable.
    ///
    /// # Errors
    /// - [`PageAllocError::NoCores`] / [`PageAllocError::TooManyCores`] if
    ///   `ncpu` is not in `1..=NCPU`.
    /// - [`PageAllocError::EmptyRange`] if the range holds no whole page.
    pub unsafe fn new(
        cpu: C,
        mapper: M,
        ncpu: usize,
        start: PhysAddr,
        end: PhysAddr,
    ) -> Result<Self, PageAllocError> {
        if ncpu == 0 {
            return Err(PageAllocError::NoCores);
        }
        if ncpu > NCPU {
            return Err(PageAllocError::TooManyCores { ncpu, max: NCPU });
        }

        let base = start.page_round_up();
        let pages = end.as_usize().saturating_sub(base.as_usize()) / PAGE_SIZE;
        if pages == 0 {
            return Err(PageAllocError::EmptyRange { start, end });
        }

        let allocator = Self {
            cpu,
            mapper,
            base,
            links: Links::new(pages),
            kmem: (0..ncpu).map(|_| SpinLock::new(FreeList::new())).collect(),
        };
        for page in 0..pages {
            allocator.free(allocator.page_addr(page));
        }

        log::info!(
            "kalloc: managing {pages} pages at {base}..{} on {ncpu} cores",
            allocator.page_addr(pages)
        );
        Ok(allocator)
    }

    /// Returns the page at `pa` to the calling core's free list.
    ///
    /// The page is filled with [`FREE_JUNK`] first.
    ///
    /// # Panics
    /// If `pa` is not page-aligned, not inside the managed range, or already
    /// free.
    pub fn free(&self, pa: PhysAddr) {
        let Some(page) = self.page_index(pa) else {
            panic!("kfree: {pa} is not a page of this allocator");
        };
        assert!(self.links.mark_free(page), "kfree: {pa} freed twice");

        self.fill(pa, FREE_JUNK);

        let preempt = PreemptGuard::new(&self.cpu);
        let id = self.local_core(&preempt);
        self.kmem[id]
            .lock_preempt(&self.cpu)
            .push(&self.links, page);
    }

    /// Allocates one page, stealing from other cores if the local list is
    /// empty.
    ///
    /// The page is filled with [`ALLOC_JUNK`]. Returns `None` when no core
    /// has a free page left.
    pub fn alloc(&self) -> Option<PhysAddr> {
        let page = {
            let preempt = PreemptGuard::new(&self.cpu);
            let id = self.local_core(&preempt);
            let local = self.kmem[id].lock_preempt(&self.cpu).pop(&self.links);
            local.or_else(|| self.steal(id))
        }?;
        self.links.mark_used(page);

        let pa = self.page_addr(page);
        self.fill(pa, ALLOC_JUNK);
        Some(pa)
    }

    /// Refills core `id` from the other cores and pops one page.
    ///
    /// Must run with preemption disabled and without holding any free-list
    /// lock: only one list lock is held at any time, so two cores stealing
    /// from each other cannot deadlock. Pages collect on a private list while
    /// the local list stays visibly empty, then get spliced in under the local
    /// lock.
    fn steal(&self, id: usize) -> Option<usize> {
        let mut stolen = FreeList::new();
        for victim in (0..self.kmem.len()).filter(|&core| core != id) {
            let mut other = self.kmem[victim].lock_preempt(&self.cpu);
            while stolen.len() < STEAL_BATCH {
                let Some(page) = other.pop(&self.links) else {
                    break;
                };
                stolen.push(&self.links, page);
            }
            drop(other);

            if stolen.len() >= STEAL_BATCH {
                break;
            }
        }

        if stolen.is_empty() {
            log::debug!("kalloc: cpu {id} found no page to steal");
        } else {
            log::debug!("kalloc: cpu {id} stole {} pages", stolen.len());
        }

        let mut local = self.kmem[id].lock_preempt(&self.cpu);
        local.splice(&self.links, stolen);
        local.pop(&self.links)
    }

    /// Total number of free pages, sampled one core at a time.
    #[must_use]
    pub fn free_pages(&self) -> usize {
        self.kmem
            .iter()
            .map(|list| list.lock_preempt(&self.cpu).len())
            .sum()
    }

    /// Number of free pages on `core`'s list.
    ///
    /// # Panics
    /// If `core` is not below the configured core count.
    #[must_use]
    pub fn free_pages_on(&self, core: usize) -> usize {
        self.kmem[core].lock_preempt(&self.cpu).len()
    }

    /// The free pages on `core`'s list, in allocation order.
    ///
    /// # Panics
    /// If `core` is not below the configured core count.
    #[must_use]
    pub fn snapshot(&self, core: usize) -> Vec<PhysAddr> {
        let list = self.kmem[core].lock_preempt(&self.cpu);
        list.pages(&self.links)
            .into_iter()
            .map(|page| self.page_addr(page))
            .collect()
    }

    /// Number of pages the allocator manages.
    #[must_use]
    pub fn page_count(&self) -> usize {
        self.links.len()
    }

    /// Number of per-core free lists.
    #[must_use]
    pub fn cores(&self) -> usize {
        self.kmem.len()
    }

    /// Whether `pa` is the start of a managed page.
    #[must_use]
    pub fn contains(&self, pa: PhysAddr) -> bool {
        self.page_index(pa).is_some()
    }

    /// The mapper used to reach page contents.
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    fn local_core(&self, preempt: &PreemptGuard<'_, C>) -> usize {
        let id = preempt.cpu_id();
        assert!(
            id < self.kmem.len(),
            "kalloc: cpu {id} has no free list ({} configured)",
            self.kmem.len()
        );
        id
    }

    fn page_index(&self, pa: PhysAddr) -> Option<usize> {
        if !pa.is_page_aligned() || pa < self.base {
            return None;
        }
        let page = (pa.as_usize() - self.base.as_usize()) / PAGE_SIZE;
        (page < self.links.len()).then_some(page)
    }

    const fn page_addr(&self, page: usize) -> PhysAddr {
        PhysAddr::new(self.base.as_usize() + page * PAGE_SIZE)
    }

    fn fill(&self, pa: PhysAddr, junk: u8) {
        // SAFETY: `pa` is a managed page (checked by the callers) and the
        // range is exclusively ours and mapped writable, per `new`'s contract.
        unsafe { ptr::write_bytes(self.mapper.phys_to_ptr(pa), junk, PAGE_SIZE) }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PageAllocError {
    #[error("at least one core is required")]
    NoCores,
    #[error("{ncpu} cores requested, at most {max} supported")]
    TooManyCores { ncpu: usize, max: usize },
    #[error("no whole page between {start} and {end}")]
    EmptyRange { start: PhysAddr, end: PhysAddr },
}
