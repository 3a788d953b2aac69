//! # Physical Page Allocation
//!
//! Hands out whole 4 KiB pages of physical RAM to the rest of the kernel:
//! process stacks, page-table pages, pipe buffers and the backing storage of
//! the block cache all come from here.
//!
//! ## Architecture Overview
//!
//! ```text
//!            alloc() / free() on core N
//!                       │
//! ┌─────────────────────▼───────────────────────────────┐
//! │                 PageAllocator                       │
//! │  ┌──────────┐ ┌──────────┐        ┌──────────┐      │
//! │  │ core 0   │ │ core 1   │  ...   │ core N-1 │      │
//! │  │ SpinLock │ │ SpinLock │        │ SpinLock │      │
//! │  │ FreeList │ │ FreeList │        │ FreeList │      │
//! │  └────┬─────┘ └────┬─────┘        └────┬─────┘      │
//! │       └──────┬─────┴───────────────────┘            │
//! │        next-page links (one per managed page)       │
//! └─────────────────────┬───────────────────────────────┘
//!                       │ PhysMapper
//!                       ▼
//!            [end of kernel image, PHYSTOP)
//! ```
//!
//! * **Per-core free lists**: a core allocates from and frees to its own list,
//!   so the common path touches a single, uncontended lock.
//! * **Stealing**: a core whose list ran dry takes up to
//!   [`STEAL_BATCH`](kernel_info::memory::STEAL_BATCH) pages from the other
//!   cores. It never holds its own list lock while taking another core's,
//!   which keeps two starving cores from deadlocking on each other.
//! * **Junk fills**: freed pages are overwritten with
//!   [`FREE_JUNK`](kernel_info::memory::FREE_JUNK), handed-out pages with
//!   [`ALLOC_JUNK`](kernel_info::memory::ALLOC_JUNK), so stale or
//!   uninitialized use shows up as an obvious pattern.
//!
//! Running out of pages is an ordinary condition reported as `None`; handing
//! the allocator an address it does not own is a kernel bug and panics.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kernel_alloc::{DirectMapper, PageAllocator, PhysAddr};
//! use kernel_info::memory::{NCPU, PHYSTOP};
//!
//! let kmem = unsafe {
//!     PageAllocator::new(cpu, DirectMapper::IDENTITY, NCPU, kernel_end, PhysAddr::new(PHYSTOP))
//! }?;
//! let page = kmem.alloc().ok_or(OutOfMemory)?;
//! kmem.free(page);
//! ```
//!
//! ## Requirements
//!
//! The crate is `no_std` but uses `alloc`: the page links, the free bits and
//! the per-core list heads are heap allocations sized in
//! [`PageAllocator::new`]. The embedding kernel must register a
//! `#[global_allocator]` before calling it, for example a small static heap
//! carved out of the kernel image.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod addr;
mod free_list;
pub mod page_alloc;
pub mod phys_mapper;

pub use addr::PhysAddr;
pub use page_alloc::{PageAllocError, PageAllocator};
pub use phys_mapper::{DirectMapper, PhysMapper};
