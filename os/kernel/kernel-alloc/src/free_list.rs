use alloc::boxed::Box;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Link value meaning "no next page".
pub(crate) const NIL: usize = usize::MAX;

/// Per-page bookkeeping for every managed page, indexed by page number.
///
/// The `next` link of a page belongs to whichever free list currently holds
/// the page; it is only read or written by the holder of that list (under the
/// list's lock, or exclusively for a private list while stealing). The lock
/// hand-off orders the accesses, so relaxed atomics suffice.
///
/// The `free` bit is set while the page sits on any free list, including a
/// private one in the middle of a steal. It is flipped with a swap so that two
/// cores freeing the same page cannot both succeed.
pub(crate) struct Links {
    next: Box<[AtomicUsize]>,
    free: Box<[AtomicBool]>,
}

impl Links {
    pub(crate) fn new(pages: usize) -> Self {
        Self {
            next: (0..pages).map(|_| AtomicUsize::new(NIL)).collect(),
            free: (0..pages).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Number of pages with a link slot.
    pub(crate) fn len(&self) -> usize {
        self.next.len()
    }

    /// Marks `page` as free. Returns `false` if it already was.
    pub(crate) fn mark_free(&self, page: usize) -> bool {
        !self.free[page].swap(true, Ordering::AcqRel)
    }

    /// Marks `page` as handed out.
    pub(crate) fn mark_used(&self, page: usize) {
        let was_free = self.free[page].swap(false, Ordering::AcqRel);
        debug_assert!(was_free, "page {page} left a free list twice");
    }

    #[inline]
    fn next(&self, page: usize) -> usize {
        self.next[page].load(Ordering::Relaxed)
    }

    #[inline]
    fn set_next(&self, page: usize, next: usize) {
        self.next[page].store(next, Ordering::Relaxed);
    }
}

/// A singly linked LIFO list of free pages, threaded through [`Links`].
///
/// # Invariants
/// - `head == NIL` iff `tail == NIL` iff `len == 0`.
/// - Following `next` from `head` visits exactly `len` pages and ends at `tail`.
/// - A page is on at most one list.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: usize,
    tail: usize,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push(&mut self, links: &Links, page: usize) {
        links.set_next(page, self.head);
        if self.head == NIL {
            self.tail = page;
        }
        self.head = page;
        self.len += 1;
    }

    pub(crate) fn pop(&mut self, links: &Links) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let page = self.head;
        self.head = links.next(page);
        if self.head == NIL {
            self.tail = NIL;
        }
        links.set_next(page, NIL);
        self.len -= 1;
        Some(page)
    }

    /// Moves all pages of `other` to the front of this list in O(1).
    pub(crate) fn splice(&mut self, links: &Links, other: Self) {
        if other.is_empty() {
            return;
        }
        links.set_next(other.tail, self.head);
        if self.is_empty() {
            self.tail = other.tail;
        }
        self.head = other.head;
        self.len += other.len;
    }

    /// Page numbers from head to tail.
    pub(crate) fn pages(&self, links: &Links) -> Vec<usize> {
        let mut pages = Vec::with_capacity(self.len);
        let mut page = self.head;
        while page != NIL {
            pages.push(page);
            page = links.next(page);
        }
        pages
    }
}
